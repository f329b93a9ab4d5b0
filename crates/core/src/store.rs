use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::debug;

use crate::domain::offer::{Offer, OfferId};

const REMOVAL_LOG_CAPACITY: usize = 256;

/// Offers pending review, as last synchronized with the backend.
///
/// Readers receive immutable snapshots; a replacement swaps the whole set under a
/// single write lock, so nobody observes a half-applied refresh. Every mutation bumps
/// the revision published on the watch channel.
pub struct OfferStore {
    state: RwLock<StoreState>,
    revision: watch::Sender<u64>,
}

#[derive(Default)]
struct StoreState {
    offers: Arc<Vec<Offer>>,
    revision: u64,
    removals: VecDeque<(u64, OfferId)>,
}

impl Default for OfferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OfferStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { state: RwLock::new(StoreState::default()), revision }
    }

    pub fn with_offers(offers: Vec<Offer>) -> Self {
        let store = Self::new();
        store.replace_all(offers);
        store
    }

    pub fn replace_all(&self, offers: Vec<Offer>) {
        let mut state = self.write();
        state.offers = Arc::new(dedupe(offers));
        self.bump(&mut state);
    }

    /// Replaces the set with a fetch result that was requested at `observed_revision`.
    ///
    /// Offers removed locally after that revision are left out, so a response that
    /// was in flight during a submission cannot resurrect the submitted offer.
    /// Returns the number of offers dropped for that reason.
    pub fn reconcile(&self, observed_revision: u64, offers: Vec<Offer>) -> usize {
        let mut state = self.write();
        let removed_since: HashSet<&OfferId> = state
            .removals
            .iter()
            .filter(|(revision, _)| *revision > observed_revision)
            .map(|(_, offer_id)| offer_id)
            .collect();

        let incoming = offers.len();
        let kept: Vec<Offer> =
            offers.into_iter().filter(|offer| !removed_since.contains(&offer.id)).collect();
        let dropped = incoming - kept.len();
        if dropped > 0 {
            debug!(
                event_name = "sync.store.removed_offers_filtered",
                observed_revision,
                dropped,
                "filtered offers removed after the fetch was issued"
            );
        }

        state.offers = Arc::new(dedupe(kept));
        self.bump(&mut state);
        dropped
    }

    pub fn remove(&self, offer_id: &OfferId) -> Option<Offer> {
        let mut state = self.write();
        let position = state.offers.iter().position(|offer| &offer.id == offer_id)?;

        let mut offers = state.offers.as_ref().clone();
        let removed = offers.remove(position);
        state.offers = Arc::new(offers);
        self.bump(&mut state);

        let revision = state.revision;
        state.removals.push_back((revision, offer_id.clone()));
        while state.removals.len() > REMOVAL_LOG_CAPACITY {
            state.removals.pop_front();
        }

        Some(removed)
    }

    pub fn get(&self, offer_id: &OfferId) -> Option<Offer> {
        self.read().offers.iter().find(|offer| &offer.id == offer_id).cloned()
    }

    pub fn contains(&self, offer_id: &OfferId) -> bool {
        self.read().offers.iter().any(|offer| &offer.id == offer_id)
    }

    pub fn snapshot(&self) -> Arc<Vec<Offer>> {
        Arc::clone(&self.read().offers)
    }

    pub fn first_id(&self) -> Option<OfferId> {
        self.read().offers.first().map(|offer| offer.id.clone())
    }

    pub fn ids(&self) -> Vec<OfferId> {
        self.read().offers.iter().map(|offer| offer.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().offers.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self, state: &mut StoreState) {
        state.revision += 1;
        self.revision.send_replace(state.revision);
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn dedupe(offers: Vec<Offer>) -> Vec<Offer> {
    let mut seen = HashSet::new();
    offers.into_iter().filter(|offer| seen.insert(offer.id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::OfferStore;
    use crate::domain::offer::{Offer, OfferId};

    fn offer(id: &str) -> Offer {
        Offer {
            id: OfferId::from(id),
            offer_number: format!("N-{id}"),
            customer_name: "Acme".to_owned(),
            customer_email: None,
            created_at: Utc::now(),
            lines: Vec::new(),
        }
    }

    #[test]
    fn replace_all_swaps_the_whole_set_and_notifies() {
        let store = OfferStore::with_offers(vec![offer("a"), offer("b")]);
        let mut updates = store.subscribe();
        let before = store.snapshot();

        store.replace_all(vec![offer("c")]);

        assert_eq!(before.len(), 2, "earlier snapshots stay intact");
        assert_eq!(store.ids(), vec![OfferId::from("c")]);
        assert!(updates.has_changed().expect("sender alive"));
        assert_eq!(*updates.borrow_and_update(), store.revision());
    }

    #[test]
    fn duplicate_ids_keep_the_first_occurrence() {
        let mut second = offer("a");
        second.customer_name = "Duplicate".to_owned();
        let store = OfferStore::with_offers(vec![offer("a"), second]);

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&OfferId::from("a")).map(|offer| offer.customer_name),
            Some("Acme".to_owned())
        );
    }

    #[test]
    fn remove_drops_offer_and_reports_absence() {
        let store = OfferStore::with_offers(vec![offer("a"), offer("b")]);

        assert!(store.remove(&OfferId::from("a")).is_some());
        assert!(store.remove(&OfferId::from("a")).is_none());
        assert_eq!(store.first_id(), Some(OfferId::from("b")));
    }

    #[test]
    fn reconcile_filters_offers_removed_after_observation() {
        let store = OfferStore::with_offers(vec![offer("a"), offer("b")]);
        let observed = store.revision();
        store.remove(&OfferId::from("a"));

        let dropped = store.reconcile(observed, vec![offer("a"), offer("b"), offer("c")]);

        assert_eq!(dropped, 1);
        assert_eq!(store.ids(), vec![OfferId::from("b"), OfferId::from("c")]);
    }

    #[test]
    fn reconcile_keeps_offers_removed_before_observation() {
        let store = OfferStore::with_offers(vec![offer("a")]);
        store.remove(&OfferId::from("a"));
        let observed = store.revision();

        let dropped = store.reconcile(observed, vec![offer("a")]);

        assert_eq!(dropped, 0);
        assert!(store.contains(&OfferId::from("a")));
    }
}
