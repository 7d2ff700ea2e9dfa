//! Row lists and range handles.
//!
//! Two interchangeable list flavors share one contract:
//!
//! - [`DenseList`]: append-only, retains every row forever.
//! - [`SparseList`]: retains a row only while at least one [`Range`] covers
//!   its index.
//!
//! Rows are opaque to this module: any `T: Clone` works. A row is identified
//! solely by its append-assigned index, starting at 0 and increasing by one
//! per append. Indices are never reused while a row is live.

mod dense;
pub(crate) mod sparse;
mod view;

pub use dense::{DenseList, DenseRange};
pub use sparse::{Range, SparseList};
pub use view::{IndexedRows, RowListView};

/// Index of a row within a list, assigned at append time.
pub type RowIndex = u64;

/// Sentinel index carried by a released/unbound range.
pub(crate) const INVALID_INDEX: RowIndex = RowIndex::MAX;

/// Sentinel for a range tag that was never set (or predates tags in a
/// loaded snapshot).
pub const TAG_UNSET: u64 = u64::MAX;
