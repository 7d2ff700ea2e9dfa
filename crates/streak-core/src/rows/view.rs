//! Indexable-view adapter for the engine's generic value layer.
//!
//! The pattern evaluator surfaces its row buffer to generic expressions as an
//! index-addressable value. [`IndexedRows`] is the seam both list flavors
//! implement; [`RowListView`] is the thin pass-through the value layer holds.

use super::{DenseList, RowIndex, SparseList};

/// Lookup-by-index access over a row list.
pub trait IndexedRows {
    /// The row type.
    type Row;

    /// Returns the row at `key`, or `None` if absent (evicted, or never
    /// appended).
    fn lookup(&self, key: RowIndex) -> Option<Self::Row>;

    /// Total indices ever appended (for a sparse list this counts evicted
    /// rows too).
    fn length(&self) -> u64;

    /// Returns whether any row was ever appended.
    fn has_items(&self) -> bool {
        self.length() > 0
    }
}

impl<T: Clone> IndexedRows for DenseList<T> {
    type Row = T;

    fn lookup(&self, key: RowIndex) -> Option<T> {
        (key < self.size()).then(|| self.get(key).clone())
    }

    fn length(&self) -> u64 {
        self.size()
    }
}

impl<T: Clone> IndexedRows for SparseList<T> {
    type Row = T;

    fn lookup(&self, key: RowIndex) -> Option<T> {
        self.get(key)
    }

    fn length(&self) -> u64 {
        self.size()
    }
}

/// Thin adapter exposing a row list to the generic value system.
#[derive(Debug)]
pub struct RowListView<L> {
    list: L,
}

impl<L: IndexedRows> RowListView<L> {
    /// Wraps a list.
    pub fn new(list: L) -> Self {
        Self { list }
    }

    /// Returns the row at `key`, or `None` if absent.
    pub fn lookup(&self, key: RowIndex) -> Option<L::Row> {
        self.list.lookup(key)
    }

    /// Reported list length.
    pub fn length(&self) -> u64 {
        self.list.length()
    }

    /// Whether the length is known without iteration; false only for a list
    /// that never saw a row.
    pub fn has_fast_length(&self) -> bool {
        self.list.has_items()
    }

    /// Whether any row was ever appended.
    pub fn has_items(&self) -> bool {
        self.list.has_items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_view_lookup_and_length() {
        let mut list = DenseList::new();
        list.append("a");
        list.append("b");
        let view = RowListView::new(list);

        assert_eq!(view.length(), 2);
        assert!(view.has_items());
        assert!(view.has_fast_length());
        assert_eq!(view.lookup(1), Some("b"));
        assert_eq!(view.lookup(2), None);
    }

    #[test]
    fn test_sparse_view_reports_absent_for_evicted_rows() {
        let mut list = SparseList::new();
        let a = list.append("a");
        drop(list.append("b"));
        let view = RowListView::new(list);

        assert_eq!(view.length(), 2);
        assert_eq!(view.lookup(0), Some("a"));
        assert_eq!(view.lookup(1), None);
        drop(a);
        assert_eq!(view.lookup(0), None);
    }

    #[test]
    fn test_empty_view_has_no_items() {
        let view = RowListView::new(DenseList::<u32>::new());
        assert_eq!(view.length(), 0);
        assert!(!view.has_items());
        assert!(!view.has_fast_length());
    }
}
