use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditOutcome, AuditSink, ReviewEvent};
use crate::backend::OfferBackend;
use crate::domain::offer::{LineId, OfferId};
use crate::errors::{BackendError, SubmissionError};
use crate::review::ReviewWorkspace;
use crate::store::OfferStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Submitted,
    Deleted,
}

impl LifecycleAction {
    fn event_prefix(self) -> &'static str {
        match self {
            Self::Submitted => "review.submit",
            Self::Deleted => "review.delete",
        }
    }

    fn category(self) -> AuditCategory {
        match self {
            Self::Submitted => AuditCategory::Submission,
            Self::Deleted => AuditCategory::Deletion,
        }
    }
}

/// Server-acknowledged outcome of a submit or delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LifecycleReceipt {
    pub offer_id: OfferId,
    pub action: LifecycleAction,
    pub correlation_id: String,
    pub line_ids: Vec<LineId>,
    pub erp_reference: Option<String>,
    pub message: Option<String>,
    /// Offer focused after the removal, if the review workspace is still alive.
    pub next_focus: Option<OfferId>,
}

/// Sends finalized offers to the backend and reconciles local state with the answer.
///
/// The coordinator only holds a weak reference to the review workspace: a workspace
/// dropped while a request is outstanding does not keep the response alive.
pub struct SubmissionCoordinator {
    backend: Arc<dyn OfferBackend>,
    store: Arc<OfferStore>,
    workspace: Weak<Mutex<ReviewWorkspace>>,
    audit: Arc<dyn AuditSink>,
    actor: String,
    in_flight: Mutex<HashSet<OfferId>>,
}

impl SubmissionCoordinator {
    pub fn new(
        backend: Arc<dyn OfferBackend>,
        store: Arc<OfferStore>,
        workspace: &Arc<Mutex<ReviewWorkspace>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            backend,
            store,
            workspace: Arc::downgrade(workspace),
            audit,
            actor: "operator".to_owned(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Submits `line_ids` of an offer to the ERP.
    ///
    /// Validation happens before any I/O: the list must be non-empty and every id must
    /// belong to the offer as currently shown (the working copy when the offer is
    /// focused). On acceptance the offer leaves the store and focus moves on.
    pub async fn submit(
        &self,
        offer_id: &OfferId,
        line_ids: &[LineId],
        correlation_id: &str,
    ) -> Result<LifecycleReceipt, SubmissionError> {
        let action = LifecycleAction::Submitted;
        if line_ids.is_empty() {
            let error = SubmissionError::NoLinesSelected(offer_id.clone());
            return Err(self.reject(action, error, correlation_id));
        }

        let mut line_ids_unique: Vec<LineId> = Vec::with_capacity(line_ids.len());
        for line_id in line_ids {
            if !line_ids_unique.contains(line_id) {
                line_ids_unique.push(line_id.clone());
            }
        }

        let Some(current) = self.current_line_ids(offer_id) else {
            let error = SubmissionError::OfferNotFound(offer_id.clone());
            return Err(self.reject(action, error, correlation_id));
        };
        let unknown: Vec<LineId> = line_ids_unique
            .iter()
            .filter(|line_id| !current.contains(line_id))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            let error =
                SubmissionError::UnknownLines { offer_id: offer_id.clone(), lines: unknown };
            return Err(self.reject(action, error, correlation_id));
        }

        let _claim = self.claim(offer_id, action, correlation_id)?;
        match self.backend.send_offer(offer_id, &line_ids_unique).await {
            Ok(ack) => {
                let next_focus = self.finish(offer_id);
                self.audit.emit(
                    self.event(action, offer_id, correlation_id, "accepted", AuditOutcome::Success)
                        .with_metadata("line_count", line_ids_unique.len().to_string())
                        .with_metadata(
                            "erp_reference",
                            ack.erp_reference.clone().unwrap_or_default(),
                        ),
                );
                info!(
                    event_name = "review.submit.accepted",
                    correlation_id,
                    offer_id = %offer_id,
                    line_count = line_ids_unique.len(),
                    erp_reference = ack.erp_reference.as_deref().unwrap_or(""),
                    "offer submitted to ERP"
                );
                Ok(LifecycleReceipt {
                    offer_id: offer_id.clone(),
                    action,
                    correlation_id: correlation_id.to_owned(),
                    line_ids: line_ids_unique,
                    erp_reference: ack.erp_reference,
                    message: ack.message,
                    next_focus,
                })
            }
            Err(error) => Err(self.remote_failure(action, offer_id, error, correlation_id)),
        }
    }

    /// Submits the selected lines of the offer as the operator currently sees it.
    pub async fn submit_selected(
        &self,
        offer_id: &OfferId,
        correlation_id: &str,
    ) -> Result<LifecycleReceipt, SubmissionError> {
        match self.selected_line_ids(offer_id) {
            Some(line_ids) => self.submit(offer_id, &line_ids, correlation_id).await,
            None => Err(self.reject(
                LifecycleAction::Submitted,
                SubmissionError::OfferNotFound(offer_id.clone()),
                correlation_id,
            )),
        }
    }

    /// Deletes an offer on the server; on success it leaves the store like a submission.
    ///
    /// The offer does not have to be pending review: ids known only from the status
    /// feed are deleted too.
    pub async fn delete(
        &self,
        offer_id: &OfferId,
        correlation_id: &str,
    ) -> Result<LifecycleReceipt, SubmissionError> {
        let action = LifecycleAction::Deleted;
        let _claim = self.claim(offer_id, action, correlation_id)?;
        match self.backend.delete_offer(offer_id).await {
            Ok(()) => {
                let next_focus = self.finish(offer_id);
                self.audit.emit(self.event(
                    action,
                    offer_id,
                    correlation_id,
                    "accepted",
                    AuditOutcome::Success,
                ));
                info!(
                    event_name = "review.delete.accepted",
                    correlation_id,
                    offer_id = %offer_id,
                    "offer deleted"
                );
                Ok(LifecycleReceipt {
                    offer_id: offer_id.clone(),
                    action,
                    correlation_id: correlation_id.to_owned(),
                    line_ids: Vec::new(),
                    erp_reference: None,
                    message: None,
                    next_focus,
                })
            }
            Err(error) => Err(self.remote_failure(action, offer_id, error, correlation_id)),
        }
    }

    pub fn is_in_flight(&self, offer_id: &OfferId) -> bool {
        lock(&self.in_flight).contains(offer_id)
    }

    fn selected_line_ids(&self, offer_id: &OfferId) -> Option<Vec<LineId>> {
        match self.workspace.upgrade() {
            Some(workspace) => lock(&workspace).selected_line_ids(offer_id),
            None => self.store.get(offer_id).map(|offer| offer.selected_line_ids()),
        }
    }

    fn current_line_ids(&self, offer_id: &OfferId) -> Option<Vec<LineId>> {
        match self.workspace.upgrade() {
            Some(workspace) => lock(&workspace).current_line_ids(offer_id),
            None => self.store.get(offer_id).map(|offer| offer.line_ids()),
        }
    }

    fn claim(
        &self,
        offer_id: &OfferId,
        action: LifecycleAction,
        correlation_id: &str,
    ) -> Result<InFlightClaim<'_>, SubmissionError> {
        if !lock(&self.in_flight).insert(offer_id.clone()) {
            let error = SubmissionError::AlreadyInFlight(offer_id.clone());
            return Err(self.reject(action, error, correlation_id));
        }
        Ok(InFlightClaim { in_flight: &self.in_flight, offer_id: offer_id.clone() })
    }

    fn finish(&self, offer_id: &OfferId) -> Option<OfferId> {
        self.store.remove(offer_id);
        match self.workspace.upgrade() {
            Some(workspace) => lock(&workspace).release(offer_id),
            None => {
                debug!(
                    event_name = "review.workspace.gone",
                    offer_id = %offer_id,
                    "review workspace dropped before the response arrived; focus not reassigned"
                );
                None
            }
        }
    }

    fn reject(
        &self,
        action: LifecycleAction,
        error: SubmissionError,
        correlation_id: &str,
    ) -> SubmissionError {
        let offer_id = match &error {
            SubmissionError::NoLinesSelected(offer_id)
            | SubmissionError::OfferNotFound(offer_id)
            | SubmissionError::AlreadyInFlight(offer_id)
            | SubmissionError::UnknownLines { offer_id, .. } => Some(offer_id.clone()),
            SubmissionError::Remote(_) => None,
        };
        debug!(
            event_name = "review.validation.rejected",
            correlation_id,
            offer_id = offer_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            error = %error,
            "request rejected locally"
        );
        self.audit.emit(
            ReviewEvent::new(
                offer_id,
                correlation_id,
                format!("{}.rejected", action.event_prefix()),
                action.category(),
                self.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("reason", error.to_string()),
        );
        error
    }

    fn remote_failure(
        &self,
        action: LifecycleAction,
        offer_id: &OfferId,
        error: BackendError,
        correlation_id: &str,
    ) -> SubmissionError {
        let outcome = match error {
            BackendError::Rejected { .. } => AuditOutcome::Rejected,
            _ => AuditOutcome::Failed,
        };
        warn!(
            event_name = "review.lifecycle.failed",
            action = action.event_prefix(),
            correlation_id,
            offer_id = %offer_id,
            error = %error,
            "backend did not accept the request; local state unchanged"
        );
        self.audit.emit(
            self.event(action, offer_id, correlation_id, "failed", outcome)
                .with_metadata("error", error.to_string()),
        );
        SubmissionError::Remote(error)
    }

    fn event(
        &self,
        action: LifecycleAction,
        offer_id: &OfferId,
        correlation_id: &str,
        suffix: &str,
        outcome: AuditOutcome,
    ) -> ReviewEvent {
        ReviewEvent::new(
            Some(offer_id.clone()),
            correlation_id,
            format!("{}.{suffix}", action.event_prefix()),
            action.category(),
            self.actor.clone(),
            outcome,
        )
    }
}

struct InFlightClaim<'a> {
    in_flight: &'a Mutex<HashSet<OfferId>>,
    offer_id: OfferId,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.offer_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
