// Record store module
// Owns the ticket snapshot loaded at startup; read-only afterwards


use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::{Result, TicketError};

/// Ticket category. Unknown categories from the dataset are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Payment,
    Login,
    Order,
    Shipping,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    Closed,
    Resolved,
}

/// A single support ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Precomputed embedding; empty until the dataset has been embedded
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// A record without its embedding, used in query previews
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketPreview {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

/// Immutable, id-addressable collection of records
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    positions: HashMap<i64, usize>,
}

impl Category {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Payment => "Payment",
            Self::Login => "Login",
            Self::Order => "Order",
            Self::Shipping => "Shipping",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Category {
    #[inline]
    fn from(value: String) -> Self {
        match value.as_str() {
            "Payment" => Self::Payment,
            "Login" => Self::Login,
            "Order" => Self::Order,
            "Shipping" => Self::Shipping,
            _ => Self::Other(value),
        }
    }
}

impl From<Category> for String {
    #[inline]
    fn from(value: Category) -> Self {
        match value {
            Category::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Category {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Priority {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Status {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for Status {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Record {
    /// Text fed to the embedding model for this ticket
    #[inline]
    pub fn embedding_text(&self) -> String {
        format!(
            "{}. {}. Category: {}",
            self.title, self.description, self.category
        )
    }

    #[inline]
    pub fn preview(&self) -> TicketPreview {
        TicketPreview {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            priority: self.priority,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

impl RecordStore {
    /// Build a store from records, rejecting duplicate ids
    #[inline]
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut positions = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if positions.insert(record.id, position).is_some() {
                return Err(TicketError::Load(format!(
                    "Duplicate record id: {}",
                    record.id
                )));
            }
        }

        debug!("Record store built with {} records", records.len());
        Ok(Self { records, positions })
    }

    /// Load a JSON array of records from disk
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading records from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            TicketError::Load(format!("Failed to read dataset {}: {}", path.display(), e))
        })?;

        let records: Vec<Record> = serde_json::from_str(&content).map_err(|e| {
            TicketError::Load(format!("Failed to parse dataset {}: {}", path.display(), e))
        })?;

        let store = Self::from_records(records)?;
        info!("Loaded {} records", store.len());
        Ok(store)
    }

    /// Write the snapshot back out as pretty JSON
    #[inline]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.records)
            .map_err(|e| TicketError::Other(anyhow::anyhow!("Failed to serialize records: {}", e)))?;
        fs::write(path, content)?;

        debug!("Saved {} records to {}", self.len(), path.display());
        Ok(())
    }

    #[inline]
    pub fn get(&self, id: i64) -> Option<&Record> {
        self.positions.get(&id).map(|&position| &self.records[position])
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the store, e.g. to attach embeddings and rebuild it
    #[inline]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Parse an RFC 3339 timestamp, or a naive ISO-8601 one taken as UTC
#[inline]
pub fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("Invalid timestamp '{}': {}", raw, e))
}
