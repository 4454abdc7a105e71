//! Repair passes over an existing document
//!
//! - `integrity`: node/service ID collisions and dangling references
//! - `dedupe`: repeated task IDs

pub mod dedupe;
pub mod integrity;

pub use dedupe::{DedupeReport, DuplicateIdResolver, Rename};
pub use integrity::{Collision, ReferentialIntegrityFixer, RepairReport, Update, UpdateKind};
