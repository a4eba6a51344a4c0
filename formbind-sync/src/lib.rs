//! formbind-sync - binding-aware entity synchronization
//!
//! Projects questionnaire submissions onto a technology and its triage and
//! viability stages:
//! - Binding resolution from questionnaire metadata
//! - Value extraction and partitioning by destination entity
//! - Extended-data journal merge patching
//! - Transactional entity writes with optimistic concurrency control
//! - Per-question answer store
//! - Answer freshness classification and form hydration

pub mod answer_store;
pub mod binding;
pub mod db;
pub mod error;
pub mod extract;
pub mod freshness;
pub mod graph;
pub mod patch;
pub mod synchronizer;

pub use binding::{resolve_bindings, BindingMap, BindingMetadata, DataSourceCategory, Questionnaire};
pub use error::{Result, SyncError};
pub use extract::{build_extended_data_updates, extract_bound_values, partition_by_destination, Answers};
pub use freshness::{get_answer_status, AnswerStatus, AnswerStatusDetail};
pub use graph::{hydrate, load_entity_graph, EntityGraph, HydratedForm};
pub use patch::apply_extended_data_patch;
pub use synchronizer::{ApplyOptions, EntitySynchronizer, RowVersionSnapshot, SyncOutcome};
