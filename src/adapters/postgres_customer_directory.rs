//! Postgres implementation of CustomerDirectory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Address, BillingProfile, Customer, PreconditionError};
use crate::ports::{CustomerDirectory, DirectoryError, RepositoryError, RepositoryResult};

#[derive(Clone)]
pub struct PostgresCustomerDirectory {
    pool: PgPool,
}

impl PostgresCustomerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn primary_addresses(&self, customer_id: Uuid) -> RepositoryResult<Vec<Address>> {
        let rows = sqlx::query_as::<_, AddressRow>(
            r#"
            SELECT id, customer_id, country, line, city, state, postal_code,
                   building_number, apartment_number, is_primary
            FROM addresses
            WHERE customer_id = $1 AND is_primary
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AddressRow::into_domain).collect())
    }
}

#[async_trait]
impl CustomerDirectory for PostgresCustomerDirectory {
    async fn get_customer(&self, id: Uuid) -> RepositoryResult<Customer> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, email, first_name, last_name, phone_number FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CustomerRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(format!("customer {}", id)))
    }

    async fn primary_address_and_currency(
        &self,
        customer_id: Uuid,
    ) -> Result<BillingProfile, DirectoryError> {
        let customer = match self.get_customer(customer_id).await {
            Ok(customer) => customer,
            Err(RepositoryError::NotFound(_)) => {
                return Err(PreconditionError::CustomerNotFound(customer_id).into())
            }
            Err(e) => return Err(e.into()),
        };

        let addresses = self.primary_addresses(customer_id).await?;
        if addresses.len() > 1 {
            return Err(RepositoryError::Conflict(format!(
                "customer {} has {} primary addresses",
                customer_id,
                addresses.len()
            ))
            .into());
        }

        Ok(BillingProfile::resolve(customer, &addresses)?)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    phone_number: Option<String>,
}

impl CustomerRow {
    fn into_domain(self) -> Customer {
        Customer {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            phone_number: self.phone_number,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    customer_id: Uuid,
    country: String,
    line: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    building_number: Option<String>,
    apartment_number: Option<String>,
    is_primary: bool,
}

impl AddressRow {
    fn into_domain(self) -> Address {
        Address {
            id: self.id,
            customer_id: self.customer_id,
            country: self.country,
            line: self.line,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            building_number: self.building_number,
            apartment_number: self.apartment_number,
            is_primary: self.is_primary,
        }
    }
}
