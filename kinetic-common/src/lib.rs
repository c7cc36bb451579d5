//! # Kinetic Common Library
//!
//! Shared engine for the Kinetic services:
//! - Muscle / motion / delta-table data model
//! - Muscle hierarchy walks and score aggregation
//! - Selectable grouping set and motion grouping
//! - Delta rule matrix (relationships, drafts, trees, family plane)
//! - Exchange codec (delimited text import/export)
//! - Table store collaborator (in-memory and SQLite)
//! - Configuration loading

pub mod codec;
pub mod config;
pub mod error;
pub mod grouping;
pub mod hierarchy;
pub mod matrix;
pub mod model;
pub mod scores;
pub mod selectable;
pub mod store;

pub use error::{Error, Result};
pub use hierarchy::MuscleCatalog;
pub use matrix::DeltaMatrix;
pub use model::{DeltaRow, DeltaTableKey, DeltaValue, Motion, Muscle, Record, ScoreMap};
pub use store::{MemoryStore, TableStore};
