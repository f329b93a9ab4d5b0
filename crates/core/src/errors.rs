use serde::Serialize;
use thiserror::Error;

use crate::domain::offer::{LineId, OfferId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("backend rejected request with status {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, code: Option<String>, message: Option<String> },
    #[error("backend response could not be decoded: {0}")]
    Decode(String),
    #[error("backend client misconfigured: {0}")]
    Configuration(String),
}

/// A monetary amount that does not fit the supported `Decimal` range.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("total of line `{0}` exceeds the supported amount range")]
    Line(LineId),
    #[error("face value of offer `{0}` exceeds the supported amount range")]
    Offer(OfferId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("line `{0}` does not belong to the offer under review")]
    UnknownLine(LineId),
    #[error("product code must not be blank")]
    BlankProductCode,
    #[error("offer `{0}` is not pending review")]
    OfferNotFound(OfferId),
    #[error("no offer is focused for review")]
    NoFocusedOffer,
    #[error(transparent)]
    Amount(#[from] AmountError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("status entry for offer `{offer_id}` has unsupported status `{status}`")]
pub struct StatusDecodeError {
    pub offer_id: String,
    pub status: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("no lines selected for offer `{0}`")]
    NoLinesSelected(OfferId),
    #[error("lines {lines:?} do not belong to offer `{offer_id}`")]
    UnknownLines { offer_id: OfferId, lines: Vec<LineId> },
    #[error("offer `{0}` is not pending review")]
    OfferNotFound(OfferId),
    #[error("a request for offer `{0}` is already in flight")]
    AlreadyInFlight(OfferId),
    #[error(transparent)]
    Remote(#[from] BackendError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Validation,
    RemoteRejection,
    Unavailable,
}

/// Operator-facing, recoverable failure message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub correlation_id: String,
    pub retriable: bool,
}

impl SubmissionError {
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Remote(_))
    }

    pub fn into_notice(self, correlation_id: impl Into<String>) -> Notice {
        let mut notice = Notice::from(self);
        notice.correlation_id = correlation_id.into();
        notice
    }
}

impl From<SubmissionError> for Notice {
    fn from(value: SubmissionError) -> Self {
        let (kind, message, retriable) = match value {
            SubmissionError::NoLinesSelected(_) => (
                NoticeKind::Validation,
                "Select at least one line before submitting the offer.".to_owned(),
                false,
            ),
            SubmissionError::UnknownLines { .. } => (
                NoticeKind::Validation,
                "Some selected lines no longer belong to this offer. Refresh and try again."
                    .to_owned(),
                false,
            ),
            SubmissionError::OfferNotFound(_) => (
                NoticeKind::Validation,
                "This offer is no longer pending review.".to_owned(),
                false,
            ),
            SubmissionError::AlreadyInFlight(_) => (
                NoticeKind::Validation,
                "A request for this offer is already in progress.".to_owned(),
                true,
            ),
            SubmissionError::Remote(BackendError::Rejected { message, .. }) => (
                NoticeKind::RemoteRejection,
                message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "The server rejected the request.".to_owned()),
                true,
            ),
            SubmissionError::Remote(BackendError::Transport(_)) => (
                NoticeKind::Unavailable,
                "The server could not be reached. Please retry shortly.".to_owned(),
                true,
            ),
            SubmissionError::Remote(BackendError::Decode(_)) => (
                NoticeKind::Unavailable,
                "The server sent a response that could not be read. Please retry shortly."
                    .to_owned(),
                true,
            ),
            SubmissionError::Remote(BackendError::Configuration(_)) => (
                NoticeKind::Unavailable,
                "The backend connection is misconfigured. Check the configuration and retry."
                    .to_owned(),
                false,
            ),
        };

        Self { kind, message, correlation_id: "unassigned".to_owned(), retriable }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::offer::OfferId;
    use crate::errors::{BackendError, NoticeKind, SubmissionError};

    #[test]
    fn empty_selection_maps_to_validation_notice() {
        let notice =
            SubmissionError::NoLinesSelected(OfferId::from("o-1")).into_notice("req-1");

        assert_eq!(notice.kind, NoticeKind::Validation);
        assert_eq!(notice.correlation_id, "req-1");
        assert!(!notice.retriable);
    }

    #[test]
    fn remote_rejection_surfaces_server_message() {
        let notice = SubmissionError::from(BackendError::Rejected {
            status: 422,
            code: Some("erp_locked".to_owned()),
            message: Some("ERP period is closed".to_owned()),
        })
        .into_notice("req-2");

        assert_eq!(notice.kind, NoticeKind::RemoteRejection);
        assert_eq!(notice.message, "ERP period is closed");
        assert!(notice.retriable);
    }

    #[test]
    fn blank_server_message_falls_back_to_generic_text() {
        let notice = SubmissionError::from(BackendError::Rejected {
            status: 500,
            code: None,
            message: Some("  ".to_owned()),
        })
        .into_notice("req-3");

        assert_eq!(notice.message, "The server rejected the request.");
    }

    #[test]
    fn transport_failure_maps_to_unavailable() {
        let error = SubmissionError::from(BackendError::Transport("connection reset".to_owned()));
        assert!(!error.is_local());

        let notice = error.into_notice("req-4");
        assert_eq!(notice.kind, NoticeKind::Unavailable);
        assert!(notice.message.contains("could not be reached"));
    }

    #[test]
    fn unreadable_response_is_not_reported_as_unreachable() {
        let notice = SubmissionError::from(BackendError::Decode("expected `{`".to_owned()))
            .into_notice("req-5");

        assert_eq!(notice.kind, NoticeKind::Unavailable);
        assert!(notice.message.contains("could not be read"), "{}", notice.message);
        assert!(!notice.message.contains("could not be reached"));
        assert!(notice.retriable);
    }

    #[test]
    fn misconfigured_client_asks_for_a_config_fix_instead_of_a_retry() {
        let notice = SubmissionError::from(BackendError::Configuration("bad header".to_owned()))
            .into_notice("req-6");

        assert!(notice.message.contains("misconfigured"), "{}", notice.message);
        assert!(!notice.message.contains("could not be reached"));
        assert!(!notice.retriable);
    }
}
