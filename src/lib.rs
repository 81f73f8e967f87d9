pub mod components;
pub mod config;
pub mod core;
pub mod logging;
pub mod services;

// Re-export commonly used types
pub use components::TableContainer;
pub use config::Config;
pub use crate::core::{Row, RowId, Table, TableId, TableSource, Translatable, VisualizationDescriptor};
pub use services::{ConsentService, Payload, SearchService, VisualizationService, VisualizationWorker};
