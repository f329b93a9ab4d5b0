use std::sync::Arc;

use tracing::debug;

use crate::catalog::{FallbackCycle, ProductCatalog};
use crate::domain::offer::{LineId, OfferId};
use crate::editor::OfferEditor;
use crate::errors::EditError;
use crate::store::OfferStore;

/// Focus state of the review screen: at most one offer is focused, and that offer
/// has exactly one working copy.
pub struct ReviewWorkspace {
    store: Arc<OfferStore>,
    catalog: Arc<dyn ProductCatalog>,
    fallback: Arc<FallbackCycle>,
    editor: Option<OfferEditor>,
}

impl ReviewWorkspace {
    pub fn new(
        store: Arc<OfferStore>,
        catalog: Arc<dyn ProductCatalog>,
        fallback: Arc<FallbackCycle>,
    ) -> Self {
        Self { store, catalog, fallback, editor: None }
    }

    pub fn store(&self) -> &Arc<OfferStore> {
        &self.store
    }

    /// Focuses an offer and opens a working copy from the store.
    ///
    /// Re-focusing the offer that is already focused keeps its edits; focusing a
    /// different offer discards the previous working copy.
    pub fn focus(&mut self, offer_id: &OfferId) -> Result<&mut OfferEditor, EditError> {
        let already_focused = self.focused_id() == Some(offer_id);
        if !already_focused {
            let offer = self
                .store
                .get(offer_id)
                .ok_or_else(|| EditError::OfferNotFound(offer_id.clone()))?;
            debug!(event_name = "review.focus.changed", offer_id = %offer_id, "offer focused");
            self.editor = Some(OfferEditor::new(
                offer,
                Arc::clone(&self.catalog),
                Arc::clone(&self.fallback),
            ));
        }
        self.editor.as_mut().ok_or(EditError::NoFocusedOffer)
    }

    /// Focuses the first offer in store order, if any.
    pub fn focus_first(&mut self) -> Option<OfferId> {
        let offer_id = self.store.first_id()?;
        self.focus(&offer_id).ok().map(|editor| editor.offer_id().clone())
    }

    pub fn clear_focus(&mut self) {
        self.editor = None;
    }

    pub fn focused_id(&self) -> Option<&OfferId> {
        self.editor.as_ref().map(OfferEditor::offer_id)
    }

    pub fn editor(&self) -> Option<&OfferEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Result<&mut OfferEditor, EditError> {
        self.editor.as_mut().ok_or(EditError::NoFocusedOffer)
    }

    /// Line ids a submission for `offer_id` may reference: the working copy's when
    /// the offer is focused, the store's otherwise.
    pub fn current_line_ids(&self, offer_id: &OfferId) -> Option<Vec<LineId>> {
        match &self.editor {
            Some(editor) if editor.offer_id() == offer_id => Some(editor.offer().line_ids()),
            _ => self.store.get(offer_id).map(|offer| offer.line_ids()),
        }
    }

    /// Selected lines of the focused working copy, or of the stored offer.
    pub fn selected_line_ids(&self, offer_id: &OfferId) -> Option<Vec<LineId>> {
        match &self.editor {
            Some(editor) if editor.offer_id() == offer_id => Some(editor.selected_line_ids()),
            _ => self.store.get(offer_id).map(|offer| offer.selected_line_ids()),
        }
    }

    /// Moves focus away from an offer that has just left the store.
    ///
    /// Focus only changes when the removed offer was the focused one; it then goes
    /// to the first remaining offer, or nowhere. Returns the resulting focus.
    pub fn release(&mut self, removed: &OfferId) -> Option<OfferId> {
        if self.focused_id() == Some(removed) {
            self.editor = None;
            return self.focus_first();
        }
        self.focused_id().cloned()
    }
}
