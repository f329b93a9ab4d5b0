use offerdesk_core::columns::ColumnProjection;
use offerdesk_core::domain::offer::{Offer, OfferId, SelectionState};
use offerdesk_core::errors::BackendError;
use serde::Serialize;

use super::{columns, CommandResult, Desk, GlobalOptions, EXIT_REJECTED, EXIT_UNAVAILABLE};

#[derive(Debug, Serialize)]
struct OfferRow {
    id: String,
    offer_number: String,
    customer_name: String,
    lines: usize,
    face_value: String,
}

pub fn list(options: &GlobalOptions) -> CommandResult {
    let command = "offers";
    let desk = match Desk::open(command, options) {
        Ok(desk) => desk,
        Err(result) => return result,
    };
    if let Err(result) = desk.refresh(command) {
        return result;
    }

    let rows: Vec<OfferRow> = desk
        .store
        .snapshot()
        .iter()
        .map(|offer| OfferRow {
            id: offer.id.to_string(),
            offer_number: offer.offer_number.clone(),
            customer_name: offer.customer_name.clone(),
            lines: offer.lines.len(),
            face_value: offer.face_value().to_string(),
        })
        .collect();

    CommandResult::success_with(command, format!("{} pending offer(s)", rows.len()), Some(rows))
}

#[derive(Debug, Serialize)]
struct OfferView {
    id: String,
    customer_name: String,
    pending: bool,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    selection: SelectionState,
    face_value: String,
    selected_total: String,
}

impl OfferView {
    fn new(offer: &Offer, projection: &ColumnProjection, pending: bool) -> Self {
        Self {
            id: offer.id.to_string(),
            customer_name: offer.customer_name.clone(),
            pending,
            header: projection.header().into_iter().map(str::to_owned).collect(),
            rows: offer.lines.iter().map(|line| projection.render(line)).collect(),
            selection: offer.selection_state(),
            face_value: offer.face_value().to_string(),
            selected_total: offer.selected_total().to_string(),
        }
    }
}

/// Renders a pending offer through the review workspace; other offers are fetched
/// from the server and shown read-only.
pub fn show(options: &GlobalOptions, offer_id: &str) -> CommandResult {
    let command = "show";
    let desk = match Desk::open(command, options) {
        Ok(desk) => desk,
        Err(result) => return result,
    };
    if let Err(result) = desk.refresh(command) {
        return result;
    }
    let projection = match columns::load_projection(command, &desk.config) {
        Ok((_, projection)) => projection,
        Err(result) => return result,
    };

    let offer_id = OfferId::from(offer_id);
    let focused = desk.workspace().focus(&offer_id).map(|editor| editor.offer().clone());
    let view = match focused {
        Ok(offer) => OfferView::new(&offer, &projection, true),
        Err(_) => match desk.runtime.block_on(desk.poller.lookup(&offer_id)) {
            Ok(lookup) => OfferView::new(&lookup.offer, &projection, lookup.pending),
            Err(BackendError::Rejected { status: 404, .. }) => {
                let message = format!("offer `{offer_id}` does not exist");
                return CommandResult::failure(command, "validation", message, EXIT_REJECTED);
            }
            Err(error @ BackendError::Rejected { .. }) => {
                let message = format!("offer `{offer_id}` could not be fetched: {error}");
                return CommandResult::failure(command, "remote_rejection", message, EXIT_REJECTED);
            }
            Err(error) => {
                let message = format!("offer `{offer_id}` could not be fetched: {error}");
                return CommandResult::failure(
                    command,
                    "backend_unavailable",
                    message,
                    EXIT_UNAVAILABLE,
                );
            }
        },
    };

    let message = format!(
        "offer {} with {} line(s), face value {}",
        view.id,
        view.rows.len(),
        view.face_value
    );
    CommandResult::success_with(command, message, Some(view))
}
