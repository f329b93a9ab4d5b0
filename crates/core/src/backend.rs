use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::offer::{LineId, Offer, OfferId};
use crate::domain::status::{ProcessingStatus, StatusEntry, StatusTag};
use crate::errors::{BackendError, StatusDecodeError};

/// Request/response contract with the offer backend.
///
/// The ERP connector, product matching and mail intake all sit behind this
/// boundary; the review core only ever talks to them through these calls.
#[async_trait]
pub trait OfferBackend: Send + Sync {
    /// `GET pending-offers`
    async fn pending_offers(&self) -> Result<Vec<Offer>, BackendError>;

    /// `GET offers-status`
    async fn offer_statuses(&self) -> Result<Vec<StatusEntryRecord>, BackendError>;

    /// `GET offers/{id}`
    async fn offer(&self, offer_id: &OfferId) -> Result<Offer, BackendError>;

    /// `POST offers/{id}/send`
    async fn send_offer(
        &self,
        offer_id: &OfferId,
        line_ids: &[LineId],
    ) -> Result<SendAck, BackendError>;

    /// `DELETE offers/{id}`
    async fn delete_offer(&self, offer_id: &OfferId) -> Result<(), BackendError>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PendingOffersResponse {
    #[serde(default)]
    pub offers: Vec<Offer>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusFeedResponse {
    #[serde(default)]
    pub offers: Vec<StatusEntryRecord>,
}

/// Status entry as transmitted; validated into a [`StatusEntry`] by the poller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusEntryRecord {
    #[serde(alias = "id")]
    pub offer_id: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub subject: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusEntryRecord {
    pub fn new(offer_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            offer_id: offer_id.into(),
            customer_name: String::new(),
            subject: String::new(),
            status: status.into(),
            progress: None,
            current_step: None,
            errors: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn into_entry(self) -> Result<StatusEntry, StatusDecodeError> {
        let tag = self.status.parse::<StatusTag>().map_err(|status| StatusDecodeError {
            offer_id: self.offer_id.clone(),
            status,
        })?;

        let status = match tag {
            StatusTag::Processing => {
                let percent = self
                    .progress
                    .filter(|value| value.is_finite())
                    .map(|value| value.round().clamp(0.0, 100.0) as u8)
                    .unwrap_or(0);
                ProcessingStatus::processing(percent, self.current_step.unwrap_or_default())
            }
            StatusTag::PendingReview => ProcessingStatus::PendingReview,
            StatusTag::Completed => ProcessingStatus::Completed,
            StatusTag::Failed => ProcessingStatus::failed(self.errors.unwrap_or_default()),
        };

        Ok(StatusEntry {
            offer_id: OfferId(self.offer_id),
            customer_name: self.customer_name,
            subject: self.subject,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOfferRequest {
    pub line_ids: Vec<LineId>,
}

/// Acknowledgement of an accepted submission; the body may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub erp_reference: Option<String>,
}
