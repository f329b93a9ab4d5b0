use offerdesk_core::domain::offer::{LineId, OfferId};
use offerdesk_core::errors::{NoticeKind, SubmissionError};
use offerdesk_core::submission::LifecycleReceipt;

use super::{correlation_id, CommandResult, Desk, GlobalOptions, EXIT_REJECTED, EXIT_UNAVAILABLE};

/// Focuses the offer, drops the excluded lines from the selection and submits the rest.
pub fn submit(options: &GlobalOptions, offer_id: &str, exclude: &[String]) -> CommandResult {
    let command = "submit";
    let desk = match Desk::open(command, options) {
        Ok(desk) => desk,
        Err(result) => return result,
    };
    if let Err(result) = desk.refresh(command) {
        return result;
    }

    let offer_id = OfferId::from(offer_id);
    if let Err(message) = prepare_selection(&desk, &offer_id, exclude) {
        return CommandResult::failure(command, "validation", message, EXIT_REJECTED);
    }

    let correlation_id = correlation_id();
    let outcome =
        desk.runtime.block_on(desk.coordinator.submit_selected(&offer_id, &correlation_id));
    finish(command, outcome, correlation_id)
}

pub fn delete(options: &GlobalOptions, offer_id: &str) -> CommandResult {
    let command = "delete";
    let desk = match Desk::open(command, options) {
        Ok(desk) => desk,
        Err(result) => return result,
    };
    if let Err(result) = desk.refresh(command) {
        return result;
    }

    let offer_id = OfferId::from(offer_id);
    let correlation_id = correlation_id();
    let outcome = desk.runtime.block_on(desk.coordinator.delete(&offer_id, &correlation_id));
    finish(command, outcome, correlation_id)
}

fn prepare_selection(desk: &Desk, offer_id: &OfferId, exclude: &[String]) -> Result<(), String> {
    let mut workspace = desk.workspace();
    let editor = workspace.focus(offer_id).map_err(|error| error.to_string())?;
    for line_id in exclude {
        editor.deselect_line(&LineId::from(line_id.as_str())).map_err(|error| error.to_string())?;
    }
    Ok(())
}

fn finish(
    command: &str,
    outcome: Result<LifecycleReceipt, SubmissionError>,
    correlation_id: String,
) -> CommandResult {
    match outcome {
        Ok(receipt) => {
            let message = receipt.message.clone().unwrap_or_else(|| {
                format!("offer {} accepted ({} line(s))", receipt.offer_id, receipt.line_ids.len())
            });
            CommandResult::success_with(command, message, Some(receipt))
        }
        Err(error) => {
            let notice = error.into_notice(correlation_id);
            let (error_class, exit_code) = match notice.kind {
                NoticeKind::Validation => ("validation", EXIT_REJECTED),
                NoticeKind::RemoteRejection => ("remote_rejection", EXIT_REJECTED),
                NoticeKind::Unavailable => ("backend_unavailable", EXIT_UNAVAILABLE),
            };
            CommandResult::failure(
                command,
                error_class,
                format!("{} (correlation id {})", notice.message, notice.correlation_id),
                exit_code,
            )
        }
    }
}
