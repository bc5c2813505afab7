//! Fixed-point amounts.
//!
//! Ledger quantities carry exactly two fractional digits. Inputs with more
//! precision are rejected, never rounded, so stock can't be silently created or
//! lost. Prices go through [`parse_price`], which rounds instead.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServiceError;

/// Number of fractional digits stored for quantities and prices
pub const SCALE: u32 = 2;

/// Largest value a `DECIMAL(12,2)` column holds
pub const MAX_AMOUNT: Decimal = dec!(9999999999.99);

/// A validated, strictly positive ledger amount with scale 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub fn new(value: Decimal) -> Result<Self, ServiceError> {
        if value.normalize().scale() > SCALE {
            return Err(ServiceError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                value.normalize(),
                SCALE
            )));
        }
        if value <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(
                "Amount must be greater than zero".into(),
            ));
        }
        if value > MAX_AMOUNT {
            return Err(ServiceError::InvalidAmount(format!(
                "Amount exceeds the maximum of {}",
                MAX_AMOUNT
            )));
        }
        Ok(Quantity(fixed(value)))
    }

    /// Parse an amount as it arrives on the wire: a JSON number or numeric string.
    /// A missing amount is rejected like any other invalid one.
    pub fn from_json(raw: Option<&Value>) -> Result<Self, ServiceError> {
        let raw = raw.ok_or_else(|| ServiceError::InvalidAmount("Amount is required".into()))?;
        Self::new(decimal_from_json(raw, true)?)
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl TryFrom<Value> for Quantity {
    type Error = ServiceError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Quantity::from_json(Some(&value))
    }
}

impl From<Quantity> for Decimal {
    fn from(q: Quantity) -> Decimal {
        q.0
    }
}

impl FromStr for Quantity {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::new(parse_decimal(s, true)?)
    }
}

/// Parse a decimal literal, optionally in scientific notation.
///
/// `Decimal` keeps at most 28 fractional digits and rounds anything longer on
/// parse. With `exact` set such input is an error, so excess precision can't
/// slip past the scale check as a rounded value.
fn parse_decimal(raw: &str, exact: bool) -> Result<Decimal, ServiceError> {
    let trimmed = raw.trim();
    let mantissa = trimmed
        .split(|c| c == 'e' || c == 'E')
        .next()
        .unwrap_or(trimmed);
    if exact && Decimal::from_str(mantissa).is_ok() && Decimal::from_str_exact(mantissa).is_err() {
        return Err(ServiceError::InvalidAmount(format!(
            "'{}' has more than {} decimal places",
            trimmed, SCALE
        )));
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ServiceError::InvalidAmount(format!("'{}' is not a finite number", trimmed)))
}

fn decimal_from_json(raw: &Value, exact: bool) -> Result<Decimal, ServiceError> {
    match raw {
        Value::Number(n) => parse_decimal(&n.to_string(), exact),
        Value::String(s) if !s.trim().is_empty() => parse_decimal(s, exact),
        _ => Err(ServiceError::InvalidAmount(
            "Amount must be a number".into(),
        )),
    }
}

/// Parse a price, rounding half away from zero to two decimals.
/// The rounded value must still be positive.
pub fn parse_price(raw: Option<&Value>) -> Result<Decimal, ServiceError> {
    let raw = raw.ok_or_else(|| ServiceError::ValidationError("Price is required".into()))?;
    let value = decimal_from_json(raw, false)
        .map_err(|_| ServiceError::ValidationError("Price must be a number".into()))?;
    let rounded = value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Price must be greater than zero".into(),
        ));
    }
    if rounded > MAX_AMOUNT {
        return Err(ServiceError::ValidationError(format!(
            "Price exceeds the maximum of {}",
            MAX_AMOUNT
        )));
    }
    Ok(fixed(rounded))
}

/// Reject a computed balance that no longer fits a `DECIMAL(12,2)` column.
/// Returning `Err` rolls the surrounding transaction back.
pub fn ensure_storable(value: Decimal, what: &str) -> Result<Decimal, ServiceError> {
    if value > MAX_AMOUNT {
        return Err(ServiceError::InvalidAmount(format!(
            "{} would exceed the maximum of {}",
            what, MAX_AMOUNT
        )));
    }
    Ok(value)
}

/// Present `value` with exactly two fractional digits.
///
/// Some backends hand decimals back with a different scale than was written.
pub fn fixed(value: Decimal) -> Decimal {
    let mut value = value.round_dp(SCALE);
    value.rescale(SCALE);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn q(raw: Value) -> Result<Quantity, ServiceError> {
        Quantity::from_json(Some(&raw))
    }

    #[test]
    fn accepts_two_decimal_amounts_exactly() {
        assert_eq!(q(json!(1.50)).unwrap().value(), dec!(1.50));
        assert_eq!(q(json!("2.25")).unwrap().value(), dec!(2.25));
        assert_eq!(q(json!(7)).unwrap().value().to_string(), "7.00");
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        assert_eq!(q(json!("1.500")).unwrap().value(), dec!(1.50));
    }

    #[test]
    fn rejects_excess_precision() {
        assert_matches!(q(json!(1.005)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!("0.001")), Err(ServiceError::InvalidAmount(_)));
    }

    #[test]
    fn rejects_precision_beyond_decimal_storage() {
        // 32 fractional digits: a lossy parse would round this to 1.00
        let raw = "1.00000000000000000000000000000001";
        assert_matches!(q(json!(raw)), Err(ServiceError::InvalidAmount(_)));
        assert!(raw.parse::<Quantity>().is_err());
        assert_matches!(
            q(json!("1.00000000000000000000000000000001e1")),
            Err(ServiceError::InvalidAmount(_))
        );
        // prices still round
        assert_eq!(parse_price(Some(&json!(raw))).unwrap(), dec!(1.00));
    }

    #[test]
    fn rejects_non_positive_and_non_numeric() {
        assert_matches!(q(json!(0)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!(-3)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!("NaN")), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!("Infinity")), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!("ten")), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!(null)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(q(json!(true)), Err(ServiceError::InvalidAmount(_)));
        assert_matches!(
            Quantity::from_json(None),
            Err(ServiceError::InvalidAmount(_))
        );
    }

    #[test]
    fn rejects_values_beyond_column_range() {
        assert!(q(json!("9999999999.99")).is_ok());
        assert_matches!(
            q(json!("10000000000")),
            Err(ServiceError::InvalidAmount(_))
        );
    }

    #[test]
    fn scientific_notation_is_understood() {
        assert_eq!(q(json!("1.5e1")).unwrap().value(), dec!(15.00));
        assert_matches!(q(json!("1e-3")), Err(ServiceError::InvalidAmount(_)));
    }

    #[test]
    fn price_rounds_instead_of_rejecting() {
        assert_eq!(parse_price(Some(&json!(1.005))).unwrap(), dec!(1.01));
        assert_eq!(parse_price(Some(&json!("19.994"))).unwrap(), dec!(19.99));
        assert_matches!(
            parse_price(Some(&json!(0.004))),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn storable_values_stop_at_column_range() {
        assert_eq!(ensure_storable(MAX_AMOUNT, "Total").unwrap(), MAX_AMOUNT);
        assert_matches!(
            ensure_storable(MAX_AMOUNT + dec!(0.01), "Total"),
            Err(ServiceError::InvalidAmount(msg)) if msg.starts_with("Total would exceed")
        );
    }

    #[test]
    fn fixed_pads_to_two_places() {
        assert_eq!(fixed(dec!(15)).to_string(), "15.00");
        assert_eq!(fixed(dec!(2.5)).to_string(), "2.50");
    }

    #[test]
    fn deserializes_from_request_bodies() {
        #[derive(Deserialize)]
        struct Body {
            amount: Quantity,
        }
        let body: Body = serde_json::from_value(json!({"amount": "4.00"})).unwrap();
        assert_eq!(body.amount.value(), dec!(4.00));
        assert!(serde_json::from_value::<Body>(json!({"amount": 1.005})).is_err());
    }
}
