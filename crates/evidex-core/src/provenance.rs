//! Append-only record of where each extracted value came from.
//!
//! Entries are never edited. Recording a value for a field that already has
//! one supersedes it: [`ProvenanceTracker::latest`] returns the newest entry
//! while [`ProvenanceTracker::by_field`] keeps the full history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::types::BoundingBox;

/// How a value was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Entered or selected by a person.
    Manual,
    /// Produced by table or figure geometry.
    Geometric,
    /// Produced by the named expert agent.
    Agent(String),
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Geometric => f.write_str("geometric"),
            Self::Agent(name) => write!(f, "agent({})", name),
        }
    }
}

/// One recorded value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Random v4 id.
    pub id: Uuid,
    /// Field the value belongs to.
    pub field_name: String,
    /// The value as text.
    pub text: String,
    /// 1-based source page.
    pub page: u32,
    /// Region on the page.
    pub coordinates: BoundingBox,
    /// How it was obtained.
    pub method: ExtractionMethod,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe append-only log of [`Extraction`]s.
#[derive(Debug, Default)]
pub struct ProvenanceTracker {
    entries: RwLock<Vec<Extraction>>,
}

impl ProvenanceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns it.
    pub fn record(
        &self,
        field_name: impl Into<String>,
        text: impl Into<String>,
        page: u32,
        coordinates: BoundingBox,
        method: ExtractionMethod,
    ) -> Extraction {
        let extraction = Extraction {
            id: Uuid::new_v4(),
            field_name: field_name.into(),
            text: text.into(),
            page,
            coordinates,
            method,
            timestamp: Utc::now(),
        };

        debug!(
            id = %extraction.id,
            field = %extraction.field_name,
            page,
            method = %extraction.method,
            "Recorded extraction"
        );

        self.entries.write().unwrap_or_else(PoisonError::into_inner).push(extraction.clone());
        extraction
    }

    fn filtered(&self, pred: impl Fn(&Extraction) -> bool) -> Vec<Extraction> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| pred(e))
            .cloned()
            .collect()
    }

    /// Entries recorded for `page`, oldest first.
    pub fn by_page(&self, page: u32) -> Vec<Extraction> {
        self.filtered(|e| e.page == page)
    }

    /// Full history of a field, oldest first.
    pub fn by_field(&self, field_name: &str) -> Vec<Extraction> {
        self.filtered(|e| e.field_name == field_name)
    }

    /// The entry that currently stands for a field.
    pub fn latest(&self, field_name: &str) -> Option<Extraction> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|e| e.field_name == field_name)
            .cloned()
    }

    /// Every entry in recording order.
    pub fn all(&self) -> Vec<Extraction> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
