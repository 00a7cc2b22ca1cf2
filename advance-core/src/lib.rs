pub mod config;
pub mod error;
pub mod hierarchy;
pub mod history;
pub mod migrate;
pub mod models;
pub mod numbering;
pub mod progress;
pub mod reconcile;
pub mod storage;

// Re-export commonly used types
pub use config::{get_config_path, Settings};
pub use error::AdvanceError;
pub use hierarchy::{InputShape, NodeId, RequirementNode, RequirementTree};
pub use history::ParsedHistory;
pub use migrate::{apply_migration, migrate_progress, MigrationOutcome};
pub use models::{
    completed_numbers, ApprovalStatus, ChecklistKind, ChecklistVersion, HierarchyMode,
    ProgressFile, ProgressRecord, ProgressStatus, Requirement, ScoutInfo,
};
pub use numbering::{GrammarBranch, RequirementNumber};
pub use progress::CompletionStats;
pub use reconcile::{
    reconcile, Confidence, MappingSummary, ReconcileOptions, RequirementMapping,
};
pub use storage::Storage;
