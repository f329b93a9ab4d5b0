use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::OfferBackend;
use crate::domain::offer::{Offer, OfferId};
use crate::domain::status::{StatusEntry, StatusSummary};
use crate::errors::BackendError;
use crate::store::OfferStore;

/// Latest status snapshot, replaced wholesale on every applied poll.
pub struct StatusBoard {
    entries: RwLock<Arc<Vec<StatusEntry>>>,
    revision: watch::Sender<u64>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { entries: RwLock::new(Arc::new(Vec::new())), revision }
    }

    pub fn snapshot(&self) -> Arc<Vec<StatusEntry>> {
        match self.entries.read() {
            Ok(entries) => Arc::clone(&entries),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn get(&self, offer_id: &OfferId) -> Option<StatusEntry> {
        self.snapshot().iter().find(|entry| &entry.offer_id == offer_id).cloned()
    }

    pub fn summary(&self) -> StatusSummary {
        StatusSummary::from_entries(self.snapshot().iter())
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn replace(&self, entries: Vec<StatusEntry>) {
        let entries = Arc::new(entries);
        match self.entries.write() {
            Ok(mut current) => *current = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// What happened to one feed during a refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedOutcome {
    Applied { count: usize },
    Stale,
    Failed(BackendError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollOutcome {
    pub sequence: u64,
    pub statuses: FeedOutcome,
    pub offers: FeedOutcome,
}

/// One offer looked up by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferLookup {
    pub offer: Offer,
    /// False when the offer came from `GET offers/{id}` because it is not pending review.
    pub pending: bool,
}

/// Fetches the status feed and the pending offers, and applies them in request order.
///
/// Every refresh draws a sequence number before it issues its requests. A response is
/// applied only when no refresh with a higher sequence number has been applied to the
/// same feed yet, so a slow, older response can never overwrite a newer one.
pub struct StatusPoller {
    backend: Arc<dyn OfferBackend>,
    store: Arc<OfferStore>,
    board: Arc<StatusBoard>,
    issued: AtomicU64,
    applied_statuses: Mutex<u64>,
    applied_offers: Mutex<u64>,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn OfferBackend>,
        store: Arc<OfferStore>,
        board: Arc<StatusBoard>,
    ) -> Self {
        Self {
            backend,
            store,
            board,
            issued: AtomicU64::new(0),
            applied_statuses: Mutex::new(0),
            applied_offers: Mutex::new(0),
        }
    }

    pub fn store(&self) -> &Arc<OfferStore> {
        &self.store
    }

    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    /// Runs one refresh immediately, independent of the timer.
    ///
    /// Failures leave the previous snapshots in place and are reported in the outcome
    /// only; the next refresh retries.
    pub async fn refresh_now(&self) -> PollOutcome {
        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let observed_revision = self.store.revision();
        debug!(event_name = "sync.poll.issued", sequence, "poll issued");

        let (statuses, offers) =
            tokio::join!(self.backend.offer_statuses(), self.backend.pending_offers());

        let statuses = match statuses {
            Ok(records) => self.apply_statuses(sequence, records),
            Err(error) => {
                warn!(
                    event_name = "sync.poll.failed",
                    feed = "statuses",
                    sequence,
                    error = %error,
                    "status fetch failed; keeping previous snapshot"
                );
                FeedOutcome::Failed(error)
            }
        };

        let offers = match offers {
            Ok(offers) => self.apply_offers(sequence, observed_revision, offers),
            Err(error) => {
                warn!(
                    event_name = "sync.poll.failed",
                    feed = "offers",
                    sequence,
                    error = %error,
                    "pending offers fetch failed; keeping previous snapshot"
                );
                FeedOutcome::Failed(error)
            }
        };

        PollOutcome { sequence, statuses, offers }
    }

    /// Pending offers are served from the store. Anything else is fetched from the
    /// backend and left out of the store, which only mirrors the pending feed.
    pub async fn lookup(&self, offer_id: &OfferId) -> Result<OfferLookup, BackendError> {
        if let Some(offer) = self.store.get(offer_id) {
            return Ok(OfferLookup { offer, pending: true });
        }

        match self.backend.offer(offer_id).await {
            Ok(offer) => {
                debug!(
                    event_name = "sync.offer.fetched",
                    offer_id = %offer_id,
                    "offer fetched outside the pending feed"
                );
                Ok(OfferLookup { offer, pending: false })
            }
            Err(error) => {
                warn!(
                    event_name = "sync.offer.failed",
                    offer_id = %offer_id,
                    error = %error,
                    "offer lookup failed"
                );
                Err(error)
            }
        }
    }

    /// Starts the recurring refresh loop.
    ///
    /// The first tick fires immediately. A tick waits for its refresh to complete
    /// before the next one can start; ticks missed meanwhile are skipped.
    pub fn start(self: Arc<Self>, interval: Duration) -> PollerHandle {
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                event_name = "sync.poller.started",
                interval_ms = interval.as_millis() as u64,
                "status poller started"
            );

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        self.refresh_now().await;
                    }
                }
            }

            info!(event_name = "sync.poller.stopped", "status poller stopped");
        });

        PollerHandle { stop: Some(stop_tx), task }
    }

    fn apply_statuses(
        &self,
        sequence: u64,
        records: Vec<crate::backend::StatusEntryRecord>,
    ) -> FeedOutcome {
        let entries: Vec<StatusEntry> = records
            .into_iter()
            .filter_map(|record| match record.into_entry() {
                Ok(entry) => Some(entry),
                Err(error) => {
                    warn!(
                        event_name = "sync.poll.entry_skipped",
                        sequence,
                        offer_id = %error.offer_id,
                        error = %error,
                        "dropping undecodable status entry"
                    );
                    None
                }
            })
            .collect();

        let mut applied = lock(&self.applied_statuses);
        if sequence <= *applied {
            debug!(
                event_name = "sync.poll.stale_discarded",
                feed = "statuses",
                sequence,
                applied = *applied,
                "discarding stale status response"
            );
            return FeedOutcome::Stale;
        }

        let count = entries.len();
        self.board.replace(entries);
        *applied = sequence;
        debug!(event_name = "sync.poll.applied", feed = "statuses", sequence, count, "applied");
        FeedOutcome::Applied { count }
    }

    fn apply_offers(
        &self,
        sequence: u64,
        observed_revision: u64,
        offers: Vec<crate::domain::offer::Offer>,
    ) -> FeedOutcome {
        let mut applied = lock(&self.applied_offers);
        if sequence <= *applied {
            debug!(
                event_name = "sync.poll.stale_discarded",
                feed = "offers",
                sequence,
                applied = *applied,
                "discarding stale pending offers response"
            );
            return FeedOutcome::Stale;
        }

        let incoming = offers.len();
        let dropped = self.store.reconcile(observed_revision, offers);
        *applied = sequence;
        let count = incoming - dropped;
        debug!(event_name = "sync.poll.applied", feed = "offers", sequence, count, "applied");
        FeedOutcome::Applied { count }
    }
}

fn lock(mutex: &Mutex<u64>) -> MutexGuard<'_, u64> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle to a running poll loop. Dropping it without calling [`stop`](Self::stop)
/// also ends the loop once its current tick completes.
pub struct PollerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signals the loop and waits for it to exit. An in-flight refresh is allowed to
    /// finish first.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(error) = (&mut self.task).await {
            warn!(event_name = "sync.poller.join_failed", error = %error, "poller task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{FeedOutcome, StatusBoard, StatusPoller};
    use crate::backend::StatusEntryRecord;
    use crate::domain::offer::OfferId;
    use crate::domain::status::ProcessingStatus;
    use crate::errors::BackendError;
    use crate::fixtures::{demo_offer, second_demo_offer, ScriptedBackend};
    use crate::store::OfferStore;

    fn poller(backend: Arc<ScriptedBackend>) -> Arc<StatusPoller> {
        Arc::new(StatusPoller::new(
            backend,
            Arc::new(OfferStore::new()),
            Arc::new(StatusBoard::new()),
        ))
    }

    #[tokio::test]
    async fn refresh_replaces_snapshots_wholesale() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_statuses(Ok(vec![
            StatusEntryRecord::new("o-1", "processing"),
            StatusEntryRecord::new("o-2", "pending_review"),
        ]));
        backend.push_statuses(Ok(vec![StatusEntryRecord::new("o-2", "completed")]));
        backend.push_offers(Ok(vec![demo_offer()]));
        let poller = poller(backend.clone());

        poller.refresh_now().await;
        assert_eq!(poller.board().summary().total(), 2);
        assert_eq!(poller.store().len(), 1);

        poller.refresh_now().await;
        let snapshot = poller.board().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, ProcessingStatus::Completed);
        assert!(poller.board().get(&OfferId::from("o-1")).is_none());
        assert!(poller.store().is_empty());
    }

    #[tokio::test]
    async fn lookup_prefers_the_pending_store_and_falls_back_to_the_backend() {
        let backend = Arc::new(ScriptedBackend::with_known_offers(vec![second_demo_offer()]));
        backend.push_offers(Ok(vec![demo_offer()]));
        let poller = poller(backend.clone());
        poller.refresh_now().await;

        let pending = poller.lookup(&OfferId::from("DEMO-1")).await.expect("pending offer");
        assert!(pending.pending);
        assert_eq!(pending.offer, demo_offer());

        let fetched = poller.lookup(&OfferId::from("DEMO-2")).await.expect("known offer");
        assert!(!fetched.pending);
        assert_eq!(fetched.offer.id, OfferId::from("DEMO-2"));
        assert!(!poller.store().contains(&OfferId::from("DEMO-2")), "store mirrors the feed");

        let missing = poller.lookup(&OfferId::from("DEMO-9")).await.expect_err("unknown");
        assert!(matches!(missing, BackendError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_snapshot() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_statuses(Ok(vec![StatusEntryRecord::new("o-1", "pending_review")]));
        backend.push_offers(Ok(vec![demo_offer()]));
        backend.push_statuses(Err(BackendError::Transport("connection refused".to_owned())));
        backend.push_offers(Err(BackendError::Transport("connection refused".to_owned())));
        let poller = poller(backend.clone());

        poller.refresh_now().await;
        let outcome = poller.refresh_now().await;

        assert!(matches!(outcome.statuses, FeedOutcome::Failed(_)));
        assert!(matches!(outcome.offers, FeedOutcome::Failed(_)));
        assert_eq!(poller.board().summary().pending_review, 1);
        assert_eq!(poller.store().len(), 1);
    }

    #[tokio::test]
    async fn undecodable_entries_are_skipped_individually() {
        let backend = Arc::new(ScriptedBackend::default());
        backend.push_statuses(Ok(vec![
            StatusEntryRecord::new("o-1", "archived"),
            StatusEntryRecord::new("o-2", "failed"),
        ]));
        let poller = poller(backend);

        let outcome = poller.refresh_now().await;

        assert_eq!(outcome.statuses, FeedOutcome::Applied { count: 1 });
        assert_eq!(poller.board().summary().failed, 1);
    }

    #[tokio::test]
    async fn later_sequence_wins_even_when_it_arrives_first() {
        let backend = Arc::new(ScriptedBackend::default());
        let older_statuses = backend.defer_statuses();
        let older_offers = backend.defer_offers();
        let newer_statuses = backend.defer_statuses();
        let newer_offers = backend.defer_offers();
        let poller = poller(backend.clone());

        let driver = async {
            backend.wait_for_calls(4).await;
            let _ = newer_statuses.send(Ok(vec![StatusEntryRecord::new("newer", "completed")]));
            let _ = newer_offers.send(Ok(vec![demo_offer()]));
            while poller.store().is_empty() {
                tokio::task::yield_now().await;
            }
            let _ = older_statuses.send(Ok(vec![StatusEntryRecord::new("older", "processing")]));
            let _ = older_offers.send(Ok(Vec::new()));
        };

        let (first, second, ()) =
            tokio::join!(poller.refresh_now(), poller.refresh_now(), driver);
        let (older, newer) =
            if first.sequence < second.sequence { (first, second) } else { (second, first) };

        assert_eq!(newer.sequence, older.sequence + 1);
        assert_eq!(newer.statuses, FeedOutcome::Applied { count: 1 });
        assert_eq!(older.statuses, FeedOutcome::Stale);
        assert_eq!(older.offers, FeedOutcome::Stale);

        let snapshot = poller.board().snapshot();
        assert_eq!(snapshot[0].offer_id, OfferId::from("newer"));
        assert_eq!(poller.store().len(), 1, "older empty offer list must not win");
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_until_stopped() {
        let backend = Arc::new(ScriptedBackend::default());
        let poller = poller(backend.clone());

        let handle = Arc::clone(&poller).start(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(11)).await;
        handle.stop().await;

        assert_eq!(backend.status_calls(), 3);
        assert_eq!(backend.offer_calls(), 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.status_calls(), 3, "no ticks after stop");
    }
}
