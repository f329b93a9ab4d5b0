//! Demo data and in-memory backends for the CLI demo mode and for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::oneshot;

use crate::backend::{OfferBackend, SendAck, StatusEntryRecord};
use crate::catalog::InMemoryCatalog;
use crate::domain::offer::{Line, LineId, Offer, OfferId};
use crate::domain::product::Product;
use crate::errors::BackendError;

pub const DEMO_OFFER_ID: &str = "DEMO-1";

/// Four lines, face value 484.60; the last line is worth 135.00.
pub fn demo_offer() -> Offer {
    Offer {
        id: OfferId::from(DEMO_OFFER_ID),
        offer_number: "ANG-2026-0142".to_owned(),
        customer_name: "Kessler Haustechnik GmbH".to_owned(),
        customer_email: Some("einkauf@kessler-haustechnik.example".to_owned()),
        created_at: Utc.with_ymd_and_hms(2026, 3, 2, 8, 15, 0).single().unwrap_or_default(),
        lines: vec![
            Line::from_cents(LineId::from("L1"), "CU-15", "Copper pipe 15mm", 20, 420)
                .with_original_term("Kupferrohr 15")
                .with_match(92, "Exact diameter match in catalog"),
            Line::from_cents(LineId::from("L2"), "PF-22", "Press fitting 22mm", 12, 980)
                .with_original_term("Pressfitting 22er")
                .with_match(78, "Semantic match on fitting type and size"),
            Line::from_cents(LineId::from("L3"), "VL-34", "Ball valve 3/4\"", 4, 3700)
                .with_original_term("Kugelhahn dreiviertel Zoll")
                .with_match(64, "Size inferred from customer wording"),
            Line::from_cents(LineId::from("L4"), "IS-100", "Pipe insulation 1m", 3, 4500)
                .with_original_term("Isolierung")
                .with_match(41, "Low confidence: generic term"),
        ],
    }
}

/// A second, smaller offer so focus reassignment has somewhere to go.
pub fn second_demo_offer() -> Offer {
    Offer {
        id: OfferId::from("DEMO-2"),
        offer_number: "ANG-2026-0143".to_owned(),
        customer_name: "Brandt Sanitär".to_owned(),
        customer_email: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 40, 0).single().unwrap_or_default(),
        lines: vec![Line::from_cents(LineId::from("L1"), "PF-22", "Press fitting 22mm", 30, 980)
            .with_original_term("Fittings 22")
            .with_match(88, "Exact match on product family")],
    }
}

pub fn demo_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new(vec![
        Product::new("CU-15", "Copper pipe 15mm", Decimal::new(420, 2)),
        Product::new("CU-22", "Copper pipe 22mm", Decimal::new(735, 2)),
        Product::new("PF-22", "Press fitting 22mm", Decimal::new(980, 2)),
        Product::new("VL-34", "Ball valve 3/4\"", Decimal::new(3700, 2)),
        Product::new("IS-100", "Pipe insulation 1m", Decimal::new(4500, 2)),
    ])
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Self-contained backend that behaves like a healthy server.
///
/// Sending an offer removes it from the pending list and marks its status entry
/// completed. Deleting drops both, and also works for offers that only have a status
/// entry.
pub struct DemoBackend {
    offers: Mutex<Vec<Offer>>,
    statuses: Mutex<Vec<StatusEntryRecord>>,
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoBackend {
    pub fn new() -> Self {
        let offers = vec![demo_offer(), second_demo_offer()];
        let mut statuses: Vec<StatusEntryRecord> = offers
            .iter()
            .map(|offer| {
                let mut record = StatusEntryRecord::new(offer.id.0.clone(), "pending_review");
                record.customer_name = offer.customer_name.clone();
                record.subject = format!("Request for quotation {}", offer.offer_number);
                record.created_at = Some(offer.created_at);
                record
            })
            .collect();

        let mut intake = StatusEntryRecord::new("DEMO-3", "processing");
        intake.customer_name = "Vogt Installationen".to_owned();
        intake.subject = "Anfrage Heizungsumbau".to_owned();
        intake.progress = Some(40.0);
        intake.current_step = Some("Matching products".to_owned());
        statuses.push(intake);

        let mut failed = StatusEntryRecord::new("DEMO-4", "failed");
        failed.customer_name = "Hartmann Bau".to_owned();
        failed.subject = "Fwd: Bestellung".to_owned();
        failed.errors = Some(vec!["Attachment could not be parsed".to_owned()]);
        statuses.push(failed);

        Self { offers: Mutex::new(offers), statuses: Mutex::new(statuses) }
    }

    fn close(&self, offer_id: &OfferId, status: &str) -> Result<(), BackendError> {
        let mut offers = lock(&self.offers);
        let position = offers
            .iter()
            .position(|offer| &offer.id == offer_id)
            .ok_or_else(|| not_found(offer_id))?;
        offers.remove(position);

        for record in lock(&self.statuses).iter_mut() {
            if record.offer_id == offer_id.0 {
                record.status = status.to_owned();
                record.updated_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OfferBackend for DemoBackend {
    async fn pending_offers(&self) -> Result<Vec<Offer>, BackendError> {
        Ok(lock(&self.offers).clone())
    }

    async fn offer_statuses(&self) -> Result<Vec<StatusEntryRecord>, BackendError> {
        Ok(lock(&self.statuses).clone())
    }

    async fn offer(&self, offer_id: &OfferId) -> Result<Offer, BackendError> {
        let offers = lock(&self.offers);
        let offer = offers.iter().find(|offer| &offer.id == offer_id);
        offer.cloned().ok_or_else(|| not_found(offer_id))
    }

    async fn send_offer(
        &self,
        offer_id: &OfferId,
        line_ids: &[LineId],
    ) -> Result<SendAck, BackendError> {
        self.close(offer_id, "completed")?;
        Ok(SendAck {
            message: Some(format!("{} lines transferred", line_ids.len())),
            erp_reference: Some(format!("ERP-{offer_id}")),
        })
    }

    async fn delete_offer(&self, offer_id: &OfferId) -> Result<(), BackendError> {
        let mut offers = lock(&self.offers);
        let mut statuses = lock(&self.statuses);
        let known = offers.iter().any(|offer| &offer.id == offer_id)
            || statuses.iter().any(|record| record.offer_id == offer_id.0);
        if !known {
            return Err(not_found(offer_id));
        }
        offers.retain(|offer| &offer.id != offer_id);
        statuses.retain(|record| record.offer_id != offer_id.0);
        Ok(())
    }
}

fn not_found(offer_id: &OfferId) -> BackendError {
    BackendError::Rejected {
        status: 404,
        code: Some("offer_not_found".to_owned()),
        message: Some(format!("Offer {offer_id} does not exist")),
    }
}

enum Reply<T> {
    Ready(Result<T, BackendError>),
    Deferred(oneshot::Receiver<Result<T, BackendError>>),
}

impl<T> Reply<T> {
    async fn resolve(
        reply: Option<Self>,
        fallback: impl FnOnce() -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Deferred(receiver)) => receiver.await.unwrap_or_else(|_| {
                Err(BackendError::Transport("scripted reply was dropped".to_owned()))
            }),
            None => fallback(),
        }
    }
}

struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    calls: AtomicUsize,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self { replies: Mutex::new(VecDeque::new()), calls: AtomicUsize::new(0) }
    }
}

impl<T> Script<T> {
    fn push(&self, result: Result<T, BackendError>) {
        lock(&self.replies).push_back(Reply::Ready(result));
    }

    fn defer(&self) -> oneshot::Sender<Result<T, BackendError>> {
        let (sender, receiver) = oneshot::channel();
        lock(&self.replies).push_back(Reply::Deferred(receiver));
        sender
    }

    /// Counts the call and takes its reply without awaiting, so replies are bound to
    /// calls in the order the calls were made.
    fn take(&self) -> Option<Reply<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.replies).pop_front()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Backend double with queued replies per endpoint.
///
/// Replies are either ready results or deferred ones completed later through a oneshot
/// sender, which lets tests control completion order. An endpoint with nothing queued
/// answers with an empty feed or a plain acknowledgement.
#[derive(Default)]
pub struct ScriptedBackend {
    statuses: Script<Vec<StatusEntryRecord>>,
    offers: Script<Vec<Offer>>,
    sends: Script<SendAck>,
    deletes: Script<()>,
    known_offers: Mutex<Vec<Offer>>,
    sent: Mutex<Vec<(OfferId, Vec<LineId>)>>,
    deleted: Mutex<Vec<OfferId>>,
}

impl ScriptedBackend {
    pub fn with_known_offers(offers: Vec<Offer>) -> Self {
        let backend = Self::default();
        *lock(&backend.known_offers) = offers;
        backend
    }

    pub fn push_statuses(&self, result: Result<Vec<StatusEntryRecord>, BackendError>) {
        self.statuses.push(result);
    }

    pub fn push_offers(&self, result: Result<Vec<Offer>, BackendError>) {
        self.offers.push(result);
    }

    pub fn push_send(&self, result: Result<SendAck, BackendError>) {
        self.sends.push(result);
    }

    pub fn push_delete(&self, result: Result<(), BackendError>) {
        self.deletes.push(result);
    }

    pub fn defer_statuses(&self) -> oneshot::Sender<Result<Vec<StatusEntryRecord>, BackendError>> {
        self.statuses.defer()
    }

    pub fn defer_offers(&self) -> oneshot::Sender<Result<Vec<Offer>, BackendError>> {
        self.offers.defer()
    }

    pub fn defer_send(&self) -> oneshot::Sender<Result<SendAck, BackendError>> {
        self.sends.defer()
    }

    pub fn status_calls(&self) -> usize {
        self.statuses.calls()
    }

    pub fn offer_calls(&self) -> usize {
        self.offers.calls()
    }

    pub fn send_calls(&self) -> usize {
        self.sends.calls()
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.calls()
    }

    /// Number of transport calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.status_calls() + self.offer_calls() + self.send_calls() + self.delete_calls()
    }

    pub fn sent(&self) -> Vec<(OfferId, Vec<LineId>)> {
        lock(&self.sent).clone()
    }

    pub fn deleted(&self) -> Vec<OfferId> {
        lock(&self.deleted).clone()
    }

    /// Yields until at least `calls` transport calls have been made.
    pub async fn wait_for_calls(&self, calls: usize) {
        while self.total_calls() < calls {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl OfferBackend for ScriptedBackend {
    async fn pending_offers(&self) -> Result<Vec<Offer>, BackendError> {
        let reply = self.offers.take();
        Reply::resolve(reply, || Ok(Vec::new())).await
    }

    async fn offer_statuses(&self) -> Result<Vec<StatusEntryRecord>, BackendError> {
        let reply = self.statuses.take();
        Reply::resolve(reply, || Ok(Vec::new())).await
    }

    async fn offer(&self, offer_id: &OfferId) -> Result<Offer, BackendError> {
        lock(&self.known_offers).iter().find(|offer| &offer.id == offer_id).cloned().ok_or(
            BackendError::Rejected { status: 404, code: None, message: None },
        )
    }

    async fn send_offer(
        &self,
        offer_id: &OfferId,
        line_ids: &[LineId],
    ) -> Result<SendAck, BackendError> {
        lock(&self.sent).push((offer_id.clone(), line_ids.to_vec()));
        let reply = self.sends.take();
        Reply::resolve(reply, || Ok(SendAck::default())).await
    }

    async fn delete_offer(&self, offer_id: &OfferId) -> Result<(), BackendError> {
        lock(&self.deleted).push(offer_id.clone());
        let reply = self.deletes.take();
        Reply::resolve(reply, || Ok(())).await
    }
}
