//! Persisted document shapes: leads, webhook registrations, settings keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored funnel submission.
///
/// Serializes flat: the answer fields sit next to `id`, `createdAt` and
/// `deleted`, with `createdAt` as an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag; `true` means the lead sits in the trash.
    pub deleted: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// An admin-registered endpoint notified on every new lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Keyed site settings documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    /// Google Tag Manager `<head>` snippet.
    Gtm,
    LogoUrl,
    FaviconUrl,
}

impl SettingKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gtm => "gtm",
            Self::LogoUrl => "logoUrl",
            Self::FaviconUrl => "faviconUrl",
        }
    }

    /// Name of the single string field each document holds.
    pub fn value_field(&self) -> &'static str {
        match self {
            Self::Gtm => "headSnippet",
            Self::LogoUrl | Self::FaviconUrl => "url",
        }
    }

    /// Wrap a value into this key's document shape.
    pub fn document(&self, value: &str) -> Value {
        let mut doc = Map::new();
        doc.insert(self.value_field().into(), Value::String(value.to_string()));
        Value::Object(doc)
    }

    /// Pull this key's value out of a stored document.
    pub fn extract(&self, doc: &Value) -> Option<String> {
        doc.get(self.value_field())
            .and_then(Value::as_str)
            .map(String::from)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gtm" => Ok(Self::Gtm),
            "logoUrl" => Ok(Self::LogoUrl),
            "faviconUrl" => Ok(Self::FaviconUrl),
            other => Err(format!("unknown setting '{other}'")),
        }
    }
}
