use crate::error::{FieldErrors, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The buyer of a subscription, as captured by the checkout form.
///
/// Phone and CPF are kept as digits only; the checkout form strips formatting
/// before submitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub cpf: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

impl Customer {
    /// Checks every field and reports all failures at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();

        if self.name.trim().chars().count() < 3 {
            errors.push("name", "must have at least 3 characters");
        }
        if !is_valid_email(&self.email) {
            errors.push("email", "invalid email");
        }
        if !is_digits(&self.phone) || !(10..=11).contains(&self.phone.len()) {
            errors.push("phone", "must have 10 or 11 digits");
        }
        if !is_digits(&self.cpf) || self.cpf.len() != 11 {
            errors.push("cpf", "must have 11 digits");
        }

        errors.into_result()
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2,
        None => false,
    }
}
