//! Card validation (brand detection, Luhn, expiry, CVV)
//!
//! Runs before any gateway is contacted so malformed cards are rejected
//! locally with a field-specific error.

use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::error::{BillingError, BillingResult, PaymentField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Unknown,
}

impl CardBrand {
    /// Detect the brand from the leading digits
    pub fn detect(digits: &str) -> Self {
        let prefix2 = digits.get(..2).and_then(|p| p.parse::<u8>().ok());
        if digits.starts_with('4') {
            CardBrand::Visa
        } else if matches!(prefix2, Some(51..=55)) {
            CardBrand::Mastercard
        } else if matches!(prefix2, Some(34 | 37)) {
            CardBrand::Amex
        } else if digits.starts_with("6011") || digits.starts_with("65") {
            CardBrand::Discover
        } else {
            CardBrand::Unknown
        }
    }

    pub fn valid_length(&self, len: usize) -> bool {
        match self {
            CardBrand::Visa => matches!(len, 13 | 16 | 19),
            CardBrand::Mastercard => len == 16,
            CardBrand::Amex => len == 15,
            CardBrand::Discover => matches!(len, 16..=19),
            CardBrand::Unknown => (13..=19).contains(&len),
        }
    }

    pub fn cvv_length(&self) -> usize {
        match self {
            CardBrand::Amex => 4,
            _ => 3,
        }
    }
}

impl std::fmt::Display for CardBrand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardBrand::Visa => write!(f, "visa"),
            CardBrand::Mastercard => write!(f, "mastercard"),
            CardBrand::Amex => write!(f, "amex"),
            CardBrand::Discover => write!(f, "discover"),
            CardBrand::Unknown => write!(f, "unknown"),
        }
    }
}

/// Validate using Luhn algorithm
pub fn luhn_valid(digits: &str) -> bool {
    let digits: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 2 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Strip spaces and dashes from a card number
pub fn normalize_number(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
}

/// Validated card number with its detected brand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardNumber {
    digits: String,
    brand: CardBrand,
}

impl CardNumber {
    pub fn parse(raw: &str) -> BillingResult<Self> {
        let digits = normalize_number(raw);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(BillingError::validation(
                PaymentField::CardNumber,
                "card number must contain only digits",
            ));
        }

        let brand = CardBrand::detect(&digits);
        if !brand.valid_length(digits.len()) {
            return Err(BillingError::validation(
                PaymentField::CardNumber,
                format!("{} digits is not a valid {} card length", digits.len(), brand),
            ));
        }
        if !luhn_valid(&digits) {
            return Err(BillingError::validation(
                PaymentField::CardNumber,
                "card number failed checksum",
            ));
        }

        Ok(Self { digits, brand })
    }

    pub fn brand(&self) -> CardBrand {
        self.brand
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn last4(&self) -> &str {
        &self.digits[self.digits.len().saturating_sub(4)..]
    }
}

/// Validate an `MM/YY` expiry against `today`. Cards are valid through the
/// last day of their expiry month.
pub fn validate_expiry_on(expiry: &str, today: Date) -> BillingResult<(u8, u16)> {
    let invalid = || BillingError::validation(PaymentField::Expiry, "expiry must be MM/YY");

    let (mm, yy) = expiry.trim().split_once('/').ok_or_else(invalid)?;
    if mm.len() != 2 || yy.len() != 2 {
        return Err(invalid());
    }
    let month: u8 = mm.parse().map_err(|_| invalid())?;
    let year: u16 = yy.parse::<u16>().map_err(|_| invalid())? + 2000;
    if !(1..=12).contains(&month) {
        return Err(BillingError::validation(
            PaymentField::Expiry,
            "expiry month must be between 01 and 12",
        ));
    }

    let current = (today.year(), u8::from(today.month()));
    if (i32::from(year), month) < current {
        return Err(BillingError::validation(PaymentField::Expiry, "card has expired"));
    }
    Ok((month, year))
}

pub fn validate_expiry(expiry: &str) -> BillingResult<(u8, u16)> {
    validate_expiry_on(expiry, OffsetDateTime::now_utc().date())
}

pub fn validate_cvv(cvv: &str, brand: CardBrand) -> BillingResult<()> {
    let expected = brand.cvv_length();
    if cvv.len() != expected || !cvv.chars().all(|c| c.is_ascii_digit()) {
        return Err(BillingError::validation(
            PaymentField::Cvv,
            format!("security code must be {} digits", expected),
        ));
    }
    Ok(())
}
