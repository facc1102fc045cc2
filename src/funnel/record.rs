//! Answer record: the accumulating answers of one funnel session.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::FunnelError;

/// Field keys written outside of the step list.
pub mod fields {
    pub const ADDRESS: &str = "address";
    pub const PROPERTY_TYPE: &str = "propertyType";
    pub const MONTHLY_BILL: &str = "monthlyBill";
    pub const SAVINGS_PERCENT: &str = "savingsPercent";
}

/// Kind of property the quote is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyType {
    Residential,
    Commercial,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "RESIDENTIAL",
            Self::Commercial => "COMMERCIAL",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESIDENTIAL" => Ok(Self::Residential),
            "COMMERCIAL" => Ok(Self::Commercial),
            other => Err(FunnelError::InvalidStart(format!(
                "propertyType must be RESIDENTIAL or COMMERCIAL, got '{other}'"
            ))),
        }
    }
}

/// Savings tier for a monthly power bill.
///
/// `< 201 → 62`, `201..=350 → 54`, `> 350 → 47`.
pub fn savings_percent_for(monthly_bill: f64) -> u8 {
    if monthly_bill < 201.0 {
        62
    } else if monthly_bill <= 350.0 {
        54
    } else {
        47
    }
}

/// Answers accumulated over one funnel session.
///
/// Keys are step ids (or contact constituent fields). A JSON `null` stands
/// for an answer that was never given and is dropped by [`sanitized`].
///
/// [`sanitized`]: AnswerRecord::sanitized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Browser-scoped visitor id, reused across funnel runs.
    session_id: Uuid,
    answers: Map<String, Value>,
}

impl AnswerRecord {
    /// Seed a record from the landing-page form.
    pub fn start(
        session_id: Uuid,
        address: &str,
        property_type: PropertyType,
    ) -> Result<Self, FunnelError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(FunnelError::InvalidStart("address is required".into()));
        }
        let mut answers = Map::new();
        answers.insert(fields::ADDRESS.into(), Value::String(address.to_string()));
        answers.insert(
            fields::PROPERTY_TYPE.into(),
            Value::String(property_type.as_str().to_string()),
        );
        Ok(Self {
            session_id,
            answers,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Write an answer. Writing `monthlyBill` recomputes `savingsPercent`.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let bill = (key == fields::MONTHLY_BILL)
            .then(|| value.as_f64())
            .flatten();
        self.answers.insert(key, value);
        if let Some(bill) = bill {
            self.answers.insert(
                fields::SAVINGS_PERCENT.into(),
                Value::from(savings_percent_for(bill)),
            );
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.answers.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn property_type(&self) -> Option<PropertyType> {
        self.get_str(fields::PROPERTY_TYPE)?.parse().ok()
    }

    pub fn savings_percent(&self) -> Option<i64> {
        self.get_i64(fields::SAVINGS_PERCENT)
    }

    /// Answers with every undefined (`null`) field removed.
    pub fn sanitized(&self) -> Map<String, Value> {
        self.answers
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Display form of an answer, used for title placeholders.
    pub fn display(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }
}
