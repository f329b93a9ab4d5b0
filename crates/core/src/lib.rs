pub mod audit;
pub mod backend;
pub mod catalog;
pub mod columns;
pub mod config;
pub mod domain;
pub mod editor;
pub mod errors;
pub mod fixtures;
pub mod poller;
pub mod review;
pub mod store;
pub mod submission;

pub use audit::{AuditSink, InMemoryAuditSink, ReviewEvent, TracingAuditSink};
pub use backend::{OfferBackend, SendAck, StatusEntryRecord};
pub use catalog::{FallbackCycle, InMemoryCatalog, ProductCatalog};
pub use columns::{ClientProfile, ColumnConfig, ColumnKey, ColumnProjection, ProfileStore};
pub use domain::offer::{
    FaceValueTotal, Line, LineId, Offer, OfferId, SelectedTotal, SelectionState,
};
pub use domain::product::Product;
pub use domain::status::{ProcessingStatus, StatusEntry, StatusSummary, StatusTag};
pub use editor::{OfferEditor, ProductResolution};
pub use errors::{AmountError, BackendError, EditError, Notice, NoticeKind, SubmissionError};
pub use poller::{FeedOutcome, OfferLookup, PollOutcome, PollerHandle, StatusBoard, StatusPoller};
pub use review::ReviewWorkspace;
pub use store::OfferStore;
pub use submission::{LifecycleAction, LifecycleReceipt, SubmissionCoordinator};
