//! Customer and address data consumed read-only when building provider payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Countries the provider can bill in, keyed by ISO 3166-1 alpha-2 code.
pub const SUPPORTED_COUNTRIES: &[(&str, &str)] = &[
    ("EG", "EGP"),
    ("AE", "AED"),
    ("SA", "SAR"),
    ("OM", "OMR"),
    ("PK", "PKR"),
];

pub fn currency_for_country(country: &str) -> Option<&'static str> {
    let country = country.trim();
    SUPPORTED_COUNTRIES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(country))
        .map(|(_, currency)| *currency)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub country: String,
    pub line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub building_number: Option<String>,
    pub apartment_number: Option<String>,
    pub is_primary: bool,
}

/// Everything the provider client needs to bill a customer.
#[derive(Debug, Clone)]
pub struct BillingProfile {
    pub customer: Customer,
    pub address: Address,
    pub currency: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Customer {0} not found")]
    CustomerNotFound(Uuid),

    #[error("There is no primary address specified for customer {0}")]
    NoPrimaryAddress(Uuid),

    #[error("Country {0} not supported")]
    UnsupportedCountry(String),
}

impl BillingProfile {
    /// Resolves the billing currency from the customer's primary address.
    pub fn resolve(customer: Customer, addresses: &[Address]) -> Result<Self, PreconditionError> {
        let address = addresses
            .iter()
            .find(|a| a.customer_id == customer.id && a.is_primary)
            .cloned()
            .ok_or(PreconditionError::NoPrimaryAddress(customer.id))?;

        let currency = currency_for_country(&address.country)
            .ok_or_else(|| PreconditionError::UnsupportedCountry(address.country.clone()))?;

        Ok(Self {
            customer,
            address,
            currency: currency.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> Customer {
        Customer {
            id: Uuid::new_v4(),
            email: Some("buyer@example.com".into()),
            first_name: Some("Nour".into()),
            last_name: None,
            phone_number: None,
        }
    }

    fn address(customer_id: Uuid, country: &str, is_primary: bool) -> Address {
        Address {
            id: Uuid::new_v4(),
            customer_id,
            country: country.into(),
            line: None,
            city: Some("Cairo".into()),
            state: None,
            postal_code: None,
            building_number: None,
            apartment_number: None,
            is_primary,
        }
    }

    #[test]
    fn test_currency_lookup() {
        assert_eq!(currency_for_country("EG"), Some("EGP"));
        assert_eq!(currency_for_country("eg"), Some("EGP"));
        assert_eq!(currency_for_country("US"), None);
    }

    #[test]
    fn test_resolve_uses_primary_address() {
        let c = customer();
        let addresses = vec![address(c.id, "US", false), address(c.id, "AE", true)];
        let profile = BillingProfile::resolve(c, &addresses).unwrap();
        assert_eq!(profile.currency, "AED");
        assert!(profile.address.is_primary);
    }

    #[test]
    fn test_resolve_without_primary_address() {
        let c = customer();
        let id = c.id;
        let addresses = vec![address(id, "EG", false)];
        let err = BillingProfile::resolve(c, &addresses).unwrap_err();
        assert_eq!(err, PreconditionError::NoPrimaryAddress(id));
    }

    #[test]
    fn test_resolve_unsupported_country() {
        let c = customer();
        let addresses = vec![address(c.id, "FR", true)];
        let err = BillingProfile::resolve(c, &addresses).unwrap_err();
        assert_eq!(err, PreconditionError::UnsupportedCountry("FR".into()));
    }
}
