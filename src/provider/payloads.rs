//! Request bodies for the provider's order and payment-key endpoints.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::Serialize;

use crate::domain::BillingProfile;

const PLACEHOLDER: &str = "NA";
const UNKNOWN_LAST_NAME: &str = "un-known";
const SHIPPING_METHOD: &str = "PKG";

/// Converts a decimal amount to integer minor units (`round(amount * 100)`).
/// Returns `None` when the result does not fit an `i64`.
pub fn amount_to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount.clone() * BigDecimal::from(100)).round(0).to_i64()
}

#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub api_key: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OrderRequest<'a> {
    pub auth_token: &'a str,
    pub delivery_needed: &'static str,
    pub merchant_order_id: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub items: Vec<serde_json::Value>,
}

impl<'a> OrderRequest<'a> {
    pub fn new(
        auth_token: &'a str,
        merchant_order_id: &'a str,
        amount_cents: i64,
        currency: &'a str,
    ) -> Self {
        Self {
            auth_token,
            delivery_needed: "false",
            merchant_order_id,
            amount_cents,
            currency,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentKeyRequest<'a> {
    pub auth_token: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub order_id: &'a str,
    pub billing_data: BillingData,
    pub integration_id: &'a str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BillingData {
    pub apartment: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub building: String,
    pub phone_number: String,
    pub postal_code: String,
    pub city: String,
    pub country: String,
    pub state: String,
    pub floor: String,
    pub shipping_method: String,
}

fn or_placeholder(value: &Option<String>, placeholder: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(placeholder)
        .to_string()
}

impl BillingData {
    /// Missing optional fields degrade to placeholders instead of failing the call.
    pub fn from_profile(profile: &BillingProfile) -> Self {
        let customer = &profile.customer;
        let address = &profile.address;
        let country = Some(address.country.clone());

        Self {
            apartment: or_placeholder(&address.apartment_number, PLACEHOLDER),
            email: or_placeholder(&customer.email, PLACEHOLDER),
            first_name: or_placeholder(&customer.first_name, PLACEHOLDER),
            last_name: or_placeholder(&customer.last_name, UNKNOWN_LAST_NAME),
            street: or_placeholder(&address.line, PLACEHOLDER),
            building: or_placeholder(&address.building_number, PLACEHOLDER),
            phone_number: or_placeholder(&customer.phone_number, PLACEHOLDER),
            postal_code: or_placeholder(&address.postal_code, PLACEHOLDER),
            city: or_placeholder(&address.city, PLACEHOLDER),
            country: or_placeholder(&country, PLACEHOLDER),
            state: or_placeholder(&address.state, PLACEHOLDER),
            floor: PLACEHOLDER.to_string(),
            shipping_method: SHIPPING_METHOD.to_string(),
        }
    }
}
