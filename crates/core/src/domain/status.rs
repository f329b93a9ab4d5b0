use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::offer::OfferId;

pub const UNKNOWN_FAILURE: &str = "unknown failure";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    Processing,
    PendingReview,
    Completed,
    Failed,
}

impl StatusTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::PendingReview => "pending_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StatusTag {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "pending_review" => Ok(Self::PendingReview),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(other.to_owned()),
        }
    }
}

/// Pipeline progress of an offer as last reported by the backend.
///
/// Only poll responses move an offer between these states.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing { percent: u8, current_step: String },
    PendingReview,
    Completed,
    Failed { errors: Vec<String> },
}

impl ProcessingStatus {
    pub fn processing(percent: u8, current_step: impl Into<String>) -> Self {
        Self::Processing { percent: percent.min(100), current_step: current_step.into() }
    }

    /// Builds a failure, substituting a generic message when the list is empty.
    pub fn failed(errors: Vec<String>) -> Self {
        let errors: Vec<String> =
            errors.into_iter().filter(|error| !error.trim().is_empty()).collect();
        if errors.is_empty() {
            Self::Failed { errors: vec![UNKNOWN_FAILURE.to_owned()] }
        } else {
            Self::Failed { errors }
        }
    }

    pub fn tag(&self) -> StatusTag {
        match self {
            Self::Processing { .. } => StatusTag::Processing,
            Self::PendingReview => StatusTag::PendingReview,
            Self::Completed => StatusTag::Completed,
            Self::Failed { .. } => StatusTag::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub offer_id: OfferId,
    pub customer_name: String,
    pub subject: String,
    pub status: ProcessingStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub processing: usize,
    pub pending_review: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a StatusEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |mut summary, entry| {
            match entry.status.tag() {
                StatusTag::Processing => summary.processing += 1,
                StatusTag::PendingReview => summary.pending_review += 1,
                StatusTag::Completed => summary.completed += 1,
                StatusTag::Failed => summary.failed += 1,
            }
            summary
        })
    }

    pub fn total(&self) -> usize {
        self.processing + self.pending_review + self.completed + self.failed
    }
}
