pub mod memory;
pub mod postgres_customer_directory;
pub mod postgres_transaction_repository;

pub use memory::{InMemoryCustomerDirectory, InMemoryLedger};
pub use postgres_customer_directory::PostgresCustomerDirectory;
pub use postgres_transaction_repository::PostgresTransactionRepository;
