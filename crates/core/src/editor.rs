use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{FallbackCycle, ProductCatalog};
use crate::domain::offer::{
    clamp_quantity, coerce_quantity, FaceValueTotal, Line, LineId, Offer, OfferId,
    SelectedTotal, SelectionState, MANUAL_ADDITION_REASONING, MANUAL_SELECTION_REASONING,
    MAX_CONFIDENCE,
};
use crate::errors::{AmountError, EditError};

pub const PLACEHOLDER_PRODUCT_CODE: &str = "NEW-ITEM";
pub const PLACEHOLDER_PRODUCT_NAME: &str = "New item";

/// How a product code edit was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductResolution {
    Catalog,
    Fallback,
}

/// Mutable working copy of the offer under review.
///
/// Edits never touch the [`OfferStore`](crate::store::OfferStore); they only become
/// authoritative once the submission coordinator hands the selected lines to the
/// backend. Every line starts out selected.
pub struct OfferEditor {
    baseline: Offer,
    working: Offer,
    catalog: Arc<dyn ProductCatalog>,
    fallback: Arc<FallbackCycle>,
}

impl OfferEditor {
    pub fn new(
        mut offer: Offer,
        catalog: Arc<dyn ProductCatalog>,
        fallback: Arc<FallbackCycle>,
    ) -> Self {
        for line in &mut offer.lines {
            line.set_selected(true);
        }
        Self { baseline: offer.clone(), working: offer, catalog, fallback }
    }

    pub fn offer(&self) -> &Offer {
        &self.working
    }

    pub fn offer_id(&self) -> &OfferId {
        &self.working.id
    }

    pub fn select_line(&mut self, line_id: &LineId) -> Result<(), EditError> {
        self.line_mut(line_id)?.set_selected(true);
        Ok(())
    }

    pub fn deselect_line(&mut self, line_id: &LineId) -> Result<(), EditError> {
        self.line_mut(line_id)?.set_selected(false);
        Ok(())
    }

    pub fn toggle_line(&mut self, line_id: &LineId) -> Result<bool, EditError> {
        let line = self.line_mut(line_id)?;
        let selected = !line.is_selected();
        line.set_selected(selected);
        Ok(selected)
    }

    pub fn select_all(&mut self, selected: bool) {
        for line in &mut self.working.lines {
            line.set_selected(selected);
        }
    }

    pub fn selection_state(&self) -> SelectionState {
        self.working.selection_state()
    }

    pub fn selected_line_ids(&self) -> Vec<LineId> {
        self.working.selected_line_ids()
    }

    pub fn face_value(&self) -> FaceValueTotal {
        self.working.face_value()
    }

    pub fn selected_total(&self) -> SelectedTotal {
        self.working.selected_total()
    }

    /// Sets a quantity, falling back to `1` for anything below one.
    pub fn set_quantity(&mut self, line_id: &LineId, quantity: i64) -> Result<u32, EditError> {
        let quantity = clamp_quantity(quantity);
        self.edit_amount(line_id, |line| line.set_quantity(quantity))?;
        Ok(quantity)
    }

    /// Same as [`set_quantity`](Self::set_quantity) for raw operator input.
    pub fn set_quantity_input(&mut self, line_id: &LineId, raw: &str) -> Result<u32, EditError> {
        let quantity = coerce_quantity(raw);
        self.edit_amount(line_id, |line| line.set_quantity(quantity))?;
        Ok(quantity)
    }

    /// Substitutes the product of a line.
    ///
    /// Codes the catalog does not know are still accepted: the line keeps the typed
    /// code and takes name and price from the next fallback product.
    pub fn set_product_code(
        &mut self,
        line_id: &LineId,
        code: &str,
    ) -> Result<ProductResolution, EditError> {
        let typed = code.trim();
        if typed.is_empty() {
            return Err(EditError::BlankProductCode);
        }
        if self.working.line(line_id).is_none() {
            return Err(EditError::UnknownLine(line_id.clone()));
        }

        let (product_code, product_name, unit_price, resolution) =
            match self.catalog.lookup(typed) {
                Some(product) => {
                    (product.code, product.name, product.unit_price, ProductResolution::Catalog)
                }
                None => {
                    let fallback = self.fallback.next_product();
                    let resolution = ProductResolution::Fallback;
                    (typed.to_owned(), fallback.name, fallback.unit_price, resolution)
                }
            };

        debug!(
            event_name = "review.edit.product_resolved",
            offer_id = %self.working.id,
            line_id = %line_id,
            product_code = %product_code,
            resolution = ?resolution,
            "product code edited"
        );

        self.edit_amount(line_id, |line| {
            line.apply_manual_product(
                product_code,
                product_name,
                unit_price,
                MANUAL_SELECTION_REASONING,
            )
        })?;
        Ok(resolution)
    }

    pub fn add_line(&mut self) -> LineId {
        let line_id = LineId(Uuid::new_v4().to_string());
        let line = Line::from_cents(
            line_id.clone(),
            PLACEHOLDER_PRODUCT_CODE,
            PLACEHOLDER_PRODUCT_NAME,
            1,
            0,
        )
        .with_match(MAX_CONFIDENCE, MANUAL_ADDITION_REASONING);
        self.working.lines.push(line);
        line_id
    }

    pub fn remove_line(&mut self, line_id: &LineId) -> Result<Line, EditError> {
        let position = self
            .working
            .lines
            .iter()
            .position(|line| line.id() == line_id)
            .ok_or_else(|| EditError::UnknownLine(line_id.clone()))?;
        Ok(self.working.lines.remove(position))
    }

    /// True once the working copy differs from the offer it was created from.
    pub fn is_dirty(&self) -> bool {
        self.working != self.baseline
    }

    /// Discards every edit and selection change.
    pub fn reset(&mut self) {
        self.working = self.baseline.clone();
    }

    fn line_mut(&mut self, line_id: &LineId) -> Result<&mut Line, EditError> {
        self.working.line_mut(line_id).ok_or_else(|| EditError::UnknownLine(line_id.clone()))
    }

    /// Applies a price-affecting edit, rolling the line back when either its own
    /// total or the offer's face value would leave the `Decimal` range.
    fn edit_amount(
        &mut self,
        line_id: &LineId,
        edit: impl FnOnce(&mut Line) -> Result<(), AmountError>,
    ) -> Result<(), EditError> {
        let line = self.line_mut(line_id)?;
        let previous = line.clone();
        edit(line)?;

        if self.working.checked_face_value().is_none() {
            *self.line_mut(line_id)? = previous;
            warn!(
                event_name = "review.edit.amount_overflow",
                offer_id = %self.working.id,
                line_id = %line_id,
                "edit rejected: face value out of range"
            );
            return Err(AmountError::Offer(self.working.id.clone()).into());
        }
        Ok(())
    }
}
