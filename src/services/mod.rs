pub mod consent_service;
pub mod redaction;
pub mod search_service;
pub mod visualization_service;
pub mod worker;

pub use consent_service::{ConsentError, ConsentService, Payload};
pub use redaction::{apply_deletion, undo_last};
pub use search_service::{SearchOutcome, SearchQuery, SearchService};
pub use visualization_service::VisualizationService;
pub use worker::{PrepareRequest, PrepareResponse, VisualizationKey, VisualizationStatus, VisualizationWorker};
