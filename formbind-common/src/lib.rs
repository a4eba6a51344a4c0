//! # Formbind Common Library
//!
//! Shared code for the questionnaire binding services including:
//! - Database initialization, schema sync and migrations
//! - Entity field registry (typed columns per entity)
//! - Extended-data journal codec (versioned answers)
//! - Configuration loading
//! - Value helpers shared by the write and read paths

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod journal;
pub mod value;

pub use entity::{ColumnKind, EntityKind, FieldColumn};
pub use error::{Error, Result};
pub use journal::{AnswerSource, ExtendedData, VersionedAnswer};
pub use value::has_meaningful_value;
