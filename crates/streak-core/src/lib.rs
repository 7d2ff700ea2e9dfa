//! # Streak Core
//!
//! The row-retention buffer backing streak's row-pattern-matching
//! (`MATCH_RECOGNIZE`-style) evaluator.
//!
//! As rows stream in, the pattern automaton keeps many concurrent partial
//! matches alive; each one references a contiguous span of historical rows it
//! still needs. This crate provides the storage that makes that cheap:
//!
//! - **[`DenseList`]**: append-only, every row retained, O(1) access. Used
//!   when full retention is acceptable.
//! - **[`SparseList`]**: rows evicted the moment no partial match references
//!   them. Retention is driven by [`Range`] handles.
//! - **[`Range`]**: reference-counted handle over a contiguous index span
//!   `[from, to]`, holding one lock unit per covered row. Cloning locks,
//!   dropping unlocks — a partial match that dies releases its rows on every
//!   exit path.
//! - **[`snapshot`]**: versioned save/restore of the buffer and its live
//!   ranges, so a restarted process resumes in-flight matches with lock
//!   accounting intact.
//!
//! ## Example
//!
//! ```rust
//! use streak_core::rows::SparseList;
//!
//! let mut list = SparseList::new();
//! let a = list.append("A");
//! drop(list.append("B")); // no match references "B" — evicted immediately
//!
//! assert_eq!(list.size(), 2);    // indices ever appended
//! assert_eq!(list.filled(), 1);  // rows still retained
//! assert_eq!(list.get(0), Some("A"));
//! assert_eq!(list.get(1), None);
//! drop(a);
//! assert_eq!(list.filled(), 0);
//! ```
//!
//! ## Threading
//!
//! One buffer instance per evaluation partition, driven by a single
//! synchronous pass. The shared container is an `Rc`, so the types are
//! `!Send` and cross-thread sharing is a compile error rather than a
//! data race.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod rows;
pub mod snapshot;

pub use rows::{DenseList, DenseRange, IndexedRows, Range, RowIndex, RowListView, SparseList, TAG_UNSET};

/// Result type for streak-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for streak-core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Snapshot encode/decode errors.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] snapshot::SnapshotError),
}
