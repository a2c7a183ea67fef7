use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Non-negative price stored as integer cents so edits never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price {
    cents: u64,
}

impl Price {
    pub const fn from_cents(cents: u64) -> Self {
        Self { cents }
    }

    pub const fn cents(&self) -> u64 {
        self.cents
    }

    /// Accepts a finite, non-negative amount; rounds to the nearest cent.
    pub fn from_amount(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents > u64::MAX as f64 {
            return None;
        }
        Some(Self {
            cents: cents as u64,
        })
    }

    pub fn as_amount(&self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePriceError(pub String);

impl fmt::Display for ParsePriceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a non-negative price: {:?}", self.0)
    }
}

impl std::error::Error for ParsePriceError {}

impl FromStr for Price {
    type Err = ParsePriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParsePriceError(s.to_string()));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Price::from_amount)
            .ok_or_else(|| ParsePriceError(s.to_string()))
    }
}

impl TryFrom<&serde_json::Value> for Price {
    type Error = ParsePriceError;

    /// The backend echoes form input, so prices arrive as numbers or strings.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .and_then(Price::from_amount)
                .ok_or_else(|| ParsePriceError(n.to_string())),
            serde_json::Value::String(s) => s.parse(),
            other => Err(ParsePriceError(other.to_string())),
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_amount())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Price::try_from(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strings_and_numbers() {
        assert_eq!("12.5".parse::<Price>().unwrap().cents(), 1250);
        assert_eq!(" 7 ".parse::<Price>().unwrap().cents(), 700);
        assert_eq!(
            Price::try_from(&serde_json::json!(3.99)).unwrap().cents(),
            399
        );
        assert_eq!(
            Price::try_from(&serde_json::json!("0.10")).unwrap().cents(),
            10
        );
    }

    #[test]
    fn test_rejects_negative_and_garbage() {
        assert!("-1".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
        assert!("".parse::<Price>().is_err());
        assert!(Price::try_from(&serde_json::json!(null)).is_err());
        assert!(Price::from_amount(f64::NAN).is_none());
    }

    #[test]
    fn test_display_two_decimals() {
        assert_eq!(Price::from_cents(1205).to_string(), "12.05");
        assert_eq!(Price::from_cents(0).to_string(), "0.00");
    }
}
