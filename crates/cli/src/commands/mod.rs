pub mod columns;
pub mod config;
pub mod lifecycle;
pub mod offers;
pub mod status;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use offerdesk_client::HttpOfferBackend;
use offerdesk_core::audit::TracingAuditSink;
use offerdesk_core::backend::OfferBackend;
use offerdesk_core::catalog::{FallbackCycle, InMemoryCatalog};
use offerdesk_core::config::{AppConfig, LoadOptions};
use offerdesk_core::fixtures::{demo_catalog, DemoBackend};
use offerdesk_core::poller::{FeedOutcome, PollOutcome, StatusBoard, StatusPoller};
use offerdesk_core::review::ReviewWorkspace;
use offerdesk_core::store::OfferStore;
use offerdesk_core::submission::SubmissionCoordinator;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with(command, message, None::<()>)
    }

    pub fn success_with(
        command: &str,
        message: impl Into<String>,
        data: Option<impl Serialize>,
    ) -> Self {
        let data = data.and_then(|data| serde_json::to_value(data).ok());
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_UNAVAILABLE: u8 = 4;
pub const EXIT_REJECTED: u8 = 5;

/// Flags shared by every command.
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    /// Run against the built-in demo backend instead of the configured server.
    pub demo: bool,
}

impl GlobalOptions {
    pub fn demo() -> Self {
        Self { config_path: None, demo: true }
    }
}

pub fn load_config(command: &str, options: &GlobalOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions {
        config_path: options.config_path.clone(),
        require_file: options.config_path.is_some(),
        ..LoadOptions::default()
    })
    .map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

/// Everything a command needs to talk to the backend and review offers.
pub(crate) struct Desk {
    pub config: AppConfig,
    pub runtime: Runtime,
    pub store: Arc<OfferStore>,
    pub board: Arc<StatusBoard>,
    pub poller: Arc<StatusPoller>,
    pub workspace: Arc<Mutex<ReviewWorkspace>>,
    pub coordinator: SubmissionCoordinator,
}

impl Desk {
    pub fn open(command: &str, options: &GlobalOptions) -> Result<Self, CommandResult> {
        let config = load_config(command, options)?;

        let (backend, catalog): (Arc<dyn OfferBackend>, InMemoryCatalog) = if options.demo {
            (Arc::new(DemoBackend::new()), demo_catalog())
        } else {
            let backend = HttpOfferBackend::new(&config.backend).map_err(|error| {
                CommandResult::failure(
                    command,
                    "config_validation",
                    format!("backend client could not be built: {error}"),
                    EXIT_CONFIG,
                )
            })?;
            (Arc::new(backend), InMemoryCatalog::default())
        };

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
            |error| {
                CommandResult::failure(
                    command,
                    "runtime_init",
                    format!("failed to initialize async runtime: {error}"),
                    EXIT_RUNTIME,
                )
            },
        )?;

        let store = Arc::new(OfferStore::new());
        let board = Arc::new(StatusBoard::new());
        let poller = Arc::new(StatusPoller::new(
            Arc::clone(&backend),
            Arc::clone(&store),
            Arc::clone(&board),
        ));
        let workspace = Arc::new(Mutex::new(ReviewWorkspace::new(
            Arc::clone(&store),
            Arc::new(catalog),
            Arc::new(FallbackCycle::default()),
        )));
        let coordinator = SubmissionCoordinator::new(
            backend,
            Arc::clone(&store),
            &workspace,
            Arc::new(TracingAuditSink),
        );

        Ok(Self { config, runtime, store, board, poller, workspace, coordinator })
    }

    /// One out-of-band refresh; a failed offers feed fails the command.
    pub fn refresh(&self, command: &str) -> Result<PollOutcome, CommandResult> {
        let outcome = self.runtime.block_on(self.poller.refresh_now());
        match &outcome.offers {
            FeedOutcome::Failed(error) => Err(CommandResult::failure(
                command,
                "backend_unavailable",
                format!("pending offers could not be fetched: {error}"),
                EXIT_UNAVAILABLE,
            )),
            _ => Ok(outcome),
        }
    }

    pub fn workspace(&self) -> std::sync::MutexGuard<'_, ReviewWorkspace> {
        match self.workspace.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub(crate) fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
