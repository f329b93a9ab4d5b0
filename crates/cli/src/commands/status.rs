use std::time::Duration;

use offerdesk_core::domain::status::{ProcessingStatus, StatusEntry, StatusSummary};
use offerdesk_core::poller::FeedOutcome;
use serde::Serialize;
use tracing::info;

use super::{CommandResult, Desk, GlobalOptions, EXIT_UNAVAILABLE};

#[derive(Debug, Serialize)]
struct StatusReport {
    summary: StatusSummary,
    entries: Vec<StatusLine>,
}

#[derive(Debug, Serialize)]
struct StatusLine {
    offer_id: String,
    customer_name: String,
    status: &'static str,
    detail: String,
}

pub fn run(options: &GlobalOptions) -> CommandResult {
    let command = "status";
    let desk = match Desk::open(command, options) {
        Ok(desk) => desk,
        Err(result) => return result,
    };

    let outcome = desk.runtime.block_on(desk.poller.refresh_now());
    if let FeedOutcome::Failed(error) = outcome.statuses {
        return CommandResult::failure(
            command,
            "backend_unavailable",
            format!("status feed could not be fetched: {error}"),
            EXIT_UNAVAILABLE,
        );
    }

    let entries = desk.board.snapshot();
    let report = StatusReport {
        summary: desk.board.summary(),
        entries: entries.iter().map(status_line).collect(),
    };
    CommandResult::success_with(command, summary_message(&report.summary), Some(report))
}

#[derive(Debug, Serialize)]
struct WatchReport {
    ticks: u32,
    summary: StatusSummary,
    pending_offers: usize,
}

/// Runs the background poller until `ticks` board updates arrive or ctrl-c is pressed.
pub fn watch(options: &GlobalOptions, ticks: Option<u32>) -> CommandResult {
    let command = "watch";
    let desk = match Desk::open(command, options) {
        Ok(desk) => desk,
        Err(result) => return result,
    };
    if !desk.config.polling.enabled {
        return CommandResult::failure(
            command,
            "config_validation",
            "polling is disabled (polling.enabled = false)",
            super::EXIT_CONFIG,
        );
    }

    let interval = desk.config.polling.interval();
    let seen = desk.runtime.block_on(observe(&desk, interval, ticks));
    let report = WatchReport {
        ticks: seen,
        summary: desk.board.summary(),
        pending_offers: desk.store.len(),
    };
    let message = format!("observed {seen} update(s); {}", summary_message(&report.summary));
    CommandResult::success_with(command, message, Some(report))
}

async fn observe(desk: &Desk, interval: Duration, ticks: Option<u32>) -> u32 {
    let mut updates = desk.board.subscribe();
    let handle = std::sync::Arc::clone(&desk.poller).start(interval);
    let mut seen = 0u32;

    loop {
        if ticks.is_some_and(|limit| seen >= limit) {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                seen += 1;
                let summary = desk.board.summary();
                info!(
                    event_name = "sync.watch.update",
                    tick = seen,
                    processing = summary.processing,
                    pending_review = summary.pending_review,
                    completed = summary.completed,
                    failed = summary.failed,
                    "status board updated"
                );
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.stop().await;
    seen
}

fn status_line(entry: &StatusEntry) -> StatusLine {
    let detail = match &entry.status {
        ProcessingStatus::Processing { percent, current_step } => {
            format!("{percent}% {current_step}")
        }
        ProcessingStatus::Failed { errors } => errors.join("; "),
        ProcessingStatus::PendingReview | ProcessingStatus::Completed => String::new(),
    };
    StatusLine {
        offer_id: entry.offer_id.to_string(),
        customer_name: entry.customer_name.clone(),
        status: entry.status.tag().as_str(),
        detail,
    }
}

fn summary_message(summary: &StatusSummary) -> String {
    format!(
        "{} processing, {} pending review, {} completed, {} failed",
        summary.processing, summary.pending_review, summary.completed, summary.failed
    )
}
