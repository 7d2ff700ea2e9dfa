//! Dense row list: append-only, full retention.
//!
//! Used when retaining every row is acceptable (or bounded by the caller),
//! e.g. patterns whose match length is externally capped. No lock accounting
//! exists here; [`DenseRange`] is a plain span so matcher code can stay
//! generic over either list flavor.

use super::{RowIndex, INVALID_INDEX, TAG_UNSET};

/// A contiguous, non-empty span of row indices in a [`DenseList`].
///
/// Unlike [`Range`](super::Range), this holds no locks — dense rows are never
/// evicted — so it is `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DenseRange {
    from: RowIndex,
    to: RowIndex,
    tag: u64,
}

impl Default for DenseRange {
    fn default() -> Self {
        Self {
            from: INVALID_INDEX,
            to: INVALID_INDEX,
            tag: TAG_UNSET,
        }
    }
}

impl DenseRange {
    pub(crate) fn unit(index: RowIndex) -> Self {
        Self {
            from: index,
            to: index,
            tag: TAG_UNSET,
        }
    }

    /// Returns whether this range covers a span (a default-constructed range
    /// does not).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.from != INVALID_INDEX && self.to != INVALID_INDEX
    }

    /// First covered index.
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid.
    #[must_use]
    pub fn from(&self) -> RowIndex {
        assert!(self.is_valid(), "from() on an invalid range");
        self.from
    }

    /// Last covered index (inclusive).
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid.
    #[must_use]
    pub fn to(&self) -> RowIndex {
        assert!(self.is_valid(), "to() on an invalid range");
        self.to
    }

    /// Number of covered indices.
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid.
    #[must_use]
    pub fn size(&self) -> u64 {
        assert!(self.is_valid(), "size() on an invalid range");
        self.to - self.from + 1
    }

    /// Grows the span by one index.
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid.
    pub fn extend(&mut self) {
        assert!(self.is_valid(), "extend() on an invalid range");
        self.to += 1;
    }

    /// Caller-assigned tag, used only for ordering/identity.
    ///
    /// # Panics
    ///
    /// Panics if the range is invalid.
    #[must_use]
    pub fn tag(&self) -> u64 {
        assert!(self.is_valid(), "tag() on an invalid range");
        self.tag
    }

    /// Sets the caller-assigned tag.
    pub fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }
}

/// Append-only row list retaining every row.
#[derive(Debug, Default)]
pub struct DenseList<T> {
    rows: Vec<T>,
}

impl<T> DenseList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Appends a row, returning a unit range over its index.
    pub fn append(&mut self, row: T) -> DenseRange {
        let index = self.rows.len() as RowIndex;
        self.rows.push(row);
        DenseRange::unit(index)
    }

    /// Returns the row at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.size()`; dense rows are never evicted, so an
    /// out-of-bounds index is a caller bug.
    #[must_use]
    pub fn get(&self, index: RowIndex) -> &T {
        &self.rows[usize::try_from(index).expect("row index exceeds address space")]
    }

    /// Number of rows appended.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Returns whether no row was ever appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
