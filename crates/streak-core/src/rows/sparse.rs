//! Sparse row list: retention driven by range locks.
//!
//! The container stores `(row, lock_count)` entries keyed by row index. An
//! entry exists iff its lock count is positive; the moment the last lock is
//! released the entry is evicted, synchronously. Locks are held exclusively
//! by [`Range`] handles: appending yields a unit range with one lock, cloning
//! a range locks its span once more, dropping it unlocks. Storage therefore
//! always reflects exactly the set of live ranges.
//!
//! Lock accounting violations (locking an absent index, re-adding a live
//! index, extending into an evicted index) are bugs in the driving automaton,
//! not recoverable conditions; they panic.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use fxhash::FxHashMap;
use tracing::trace;

use crate::snapshot::{RowCodec, SnapshotError, SnapshotReader, SnapshotWriter};

use super::{RowIndex, INVALID_INDEX, TAG_UNSET};

/// A retained row together with the number of range units covering it.
#[derive(Debug)]
struct Entry<T> {
    row: T,
    locks: u64,
}

/// Shared storage for retained rows.
///
/// Ownership is shared between the [`SparseList`] and every live [`Range`];
/// whichever lives longest keeps the rows reachable.
#[derive(Debug)]
pub(crate) struct Container<T> {
    storage: FxHashMap<RowIndex, Entry<T>>,
}

pub(crate) type ContainerRef<T> = Rc<RefCell<Container<T>>>;

impl<T> Default for Container<T> {
    fn default() -> Self {
        Self {
            storage: FxHashMap::default(),
        }
    }
}

impl<T> Container<T> {
    /// Inserts a new entry with lock count 1.
    ///
    /// # Panics
    ///
    /// Panics if `index` is already present; the list assigns indices
    /// monotonically and never reuses one while live.
    fn add(&mut self, index: RowIndex, row: T) {
        let prev = self.storage.insert(index, Entry { row, locks: 1 });
        assert!(prev.is_none(), "row index {index} added twice");
    }

    fn get(&self, index: RowIndex) -> Option<T>
    where
        T: Clone,
    {
        self.storage.get(&index).map(|entry| entry.row.clone())
    }

    /// Acquires one lock unit on every index in `[from, to]`.
    ///
    /// # Panics
    ///
    /// Panics if any covered index is absent; a range may only lock rows
    /// that are currently retained.
    fn lock_range(&mut self, from: RowIndex, to: RowIndex) {
        for index in from..=to {
            self.storage
                .get_mut(&index)
                .unwrap_or_else(|| panic!("lock on absent row index {index}"))
                .locks += 1;
        }
    }

    /// Releases one lock unit on every index in `[from, to]`, evicting
    /// entries whose count reaches zero.
    ///
    /// # Panics
    ///
    /// Panics if any covered index is absent.
    fn unlock_range(&mut self, from: RowIndex, to: RowIndex) {
        for index in from..=to {
            let entry = self
                .storage
                .get_mut(&index)
                .unwrap_or_else(|| panic!("unlock on absent row index {index}"));
            entry.locks -= 1;
            if entry.locks == 0 {
                self.storage.remove(&index);
                trace!(index, "evicting unreferenced row");
            }
        }
    }

    fn len(&self) -> u64 {
        self.storage.len() as u64
    }

    /// Writes `[count][(index, row, locks)]×count` through the snapshot
    /// writer. Entry order is unobservable, so map iteration order is fine.
    pub(crate) fn save_body<C: RowCodec<Row = T>>(&self, writer: &mut SnapshotWriter<C>) {
        writer.write_u64(self.storage.len() as u64);
        for (index, entry) in &self.storage {
            writer.write_u64(*index);
            writer.write_row(&entry.row);
            writer.write_u64(entry.locks);
        }
    }

    /// Reads a container body written by [`Container::save_body`]. Lock
    /// counts are restored verbatim; they are the sole source of truth for
    /// post-restore accounting.
    pub(crate) fn load_body<C: RowCodec<Row = T>>(
        reader: &mut SnapshotReader<'_, C>,
    ) -> Result<Self, SnapshotError> {
        let count = reader.read_u64()?;
        let mut storage = FxHashMap::default();
        storage.reserve(usize::try_from(count).map_err(|_| SnapshotError::Corrupted {
            reason: "container entry count exceeds address space",
        })?);
        for _ in 0..count {
            let index = reader.read_u64()?;
            let row = reader.read_row()?;
            let locks = reader.read_u64()?;
            if locks == 0 {
                return Err(SnapshotError::Corrupted {
                    reason: "container entry with zero lock count",
                });
            }
            if storage.insert(index, Entry { row, locks }).is_some() {
                return Err(SnapshotError::Corrupted {
                    reason: "duplicate row index in container snapshot",
                });
            }
        }
        Ok(Self { storage })
    }
}

/// Reference-counted handle over a contiguous span of retained rows.
///
/// A valid range covers the non-empty closed interval `[from, to]` and holds
/// one lock unit on every covered index. Cloning acquires another unit per
/// index; dropping (or [`release`](Range::release)) gives them back. A range
/// can also be in a released state, holding no container and no locks: the
/// state of `Range::default()`. Moves transfer the handle without touching
/// lock counts.
///
/// Ranges order and compare by `(from, to, tag)` lexicographically, ignoring
/// which container they belong to. This lets the automaton deduplicate
/// branches that reference identical spans with identical tags.
#[derive(Debug)]
pub struct Range<T> {
    container: Option<ContainerRef<T>>,
    from: RowIndex,
    to: RowIndex,
    tag: u64,
}

impl<T> Default for Range<T> {
    fn default() -> Self {
        Self {
            container: None,
            from: INVALID_INDEX,
            to: INVALID_INDEX,
            tag: TAG_UNSET,
        }
    }
}

impl<T> Range<T> {
    fn unit(container: ContainerRef<T>, index: RowIndex) -> Self {
        Self {
            container: Some(container),
            from: index,
            to: index,
            tag: TAG_UNSET,
        }
    }

    /// Returns whether this range currently owns a non-empty interval.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.container.is_some() && self.from != INVALID_INDEX && self.to != INVALID_INDEX
    }

    /// First covered index.
    ///
    /// # Panics
    ///
    /// Panics if the range is released.
    #[must_use]
    pub fn from(&self) -> RowIndex {
        assert!(self.is_valid(), "from() on a released range");
        self.from
    }

    /// Last covered index (inclusive).
    ///
    /// # Panics
    ///
    /// Panics if the range is released.
    #[must_use]
    pub fn to(&self) -> RowIndex {
        assert!(self.is_valid(), "to() on a released range");
        self.to
    }

    /// Number of covered indices.
    ///
    /// # Panics
    ///
    /// Panics if the range is released.
    #[must_use]
    pub fn size(&self) -> u64 {
        assert!(self.is_valid(), "size() on a released range");
        self.to - self.from + 1
    }

    /// Grows the span by one index, locking the newly covered row.
    ///
    /// # Panics
    ///
    /// Panics if the range is released, or if the new index is not retained
    /// in the container (never appended, or appended and already evicted).
    pub fn extend(&mut self) {
        assert!(self.is_valid(), "extend() on a released range");
        // Lock before widening, so a lock fault leaves the range (and its
        // eventual unlock on drop) covering only what it actually holds.
        let next = self.to + 1;
        self.container
            .as_ref()
            .expect("valid range without container")
            .borrow_mut()
            .lock_range(next, next);
        self.to = next;
    }

    /// Caller-assigned tag, used only for ordering/identity.
    ///
    /// # Panics
    ///
    /// Panics if the range is released.
    #[must_use]
    pub fn tag(&self) -> u64 {
        assert!(self.is_valid(), "tag() on a released range");
        self.tag
    }

    /// Sets the caller-assigned tag. Allowed in any state.
    pub fn set_tag(&mut self, tag: u64) {
        self.tag = tag;
    }

    /// Unlocks the covered span and resets the range to the released state.
    /// Idempotent; dropping a range does the same.
    pub fn release(&mut self) {
        if let Some(container) = self.container.take() {
            container.borrow_mut().unlock_range(self.from, self.to);
        }
        self.from = INVALID_INDEX;
        self.to = INVALID_INDEX;
        self.tag = TAG_UNSET;
    }

    /// Writes `[container:Ref][from][to]` plus, at schema version >= 2,
    /// `[tag]`. A released range writes the null container reference.
    pub fn save<C: RowCodec<Row = T>>(&self, writer: &mut SnapshotWriter<C>) {
        writer.write_container_ref(self.container.as_ref());
        writer.write_u64(self.from);
        writer.write_u64(self.to);
        if writer.version() >= 2 {
            writer.write_u64(self.tag);
        }
    }

    /// Reads a range written by [`Range::save`], re-binding it to the
    /// container instance already restored through the same reader.
    ///
    /// No locks are issued here: the container snapshot carries the
    /// authoritative lock counts, and re-locking on range restore would
    /// double-count. Snapshots older than schema version 2 carry no tag; it
    /// defaults to [`TAG_UNSET`](super::TAG_UNSET).
    ///
    /// # Errors
    ///
    /// Fails on truncated input or a container reference that was never
    /// defined in this snapshot stream.
    pub fn load<C: RowCodec<Row = T>>(
        reader: &mut SnapshotReader<'_, C>,
    ) -> Result<Self, SnapshotError> {
        let container = reader.read_container_ref()?;
        let from = reader.read_u64()?;
        let to = reader.read_u64()?;
        let tag = if reader.version() >= 2 {
            reader.read_u64()?
        } else {
            TAG_UNSET
        };
        Ok(Self {
            container,
            from,
            to,
            tag,
        })
    }
}

impl<T> Clone for Range<T> {
    /// Cloning acquires one more lock unit on every covered index; the clone
    /// has an independent lifetime. Cloning a released range yields another
    /// released range.
    fn clone(&self) -> Self {
        if let Some(container) = &self.container {
            container.borrow_mut().lock_range(self.from, self.to);
        }
        Self {
            container: self.container.clone(),
            from: self.from,
            to: self.to,
            tag: self.tag,
        }
    }
}

impl<T> Drop for Range<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> PartialEq for Range<T> {
    fn eq(&self, other: &Self) -> bool {
        (self.from, self.to, self.tag) == (other.from, other.to, other.tag)
    }
}

impl<T> Eq for Range<T> {}

impl<T> PartialOrd for Range<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Range<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.from, self.to, self.tag).cmp(&(other.from, other.to, other.tag))
    }
}

/// Row list that retains a row only while at least one [`Range`] covers it.
///
/// `size()` counts indices ever appended and never decreases; `filled()`
/// counts rows currently retained.
#[derive(Debug)]
pub struct SparseList<T> {
    container: ContainerRef<T>,
    list_size: u64,
}

impl<T> Default for SparseList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseList<T> {
    /// Creates an empty list with a fresh container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            container: Rc::new(RefCell::new(Container::default())),
            list_size: 0,
        }
    }

    /// Appends a row, returning the unit range that owns its initial lock.
    ///
    /// Dropping the returned range immediately evicts the row.
    pub fn append(&mut self, row: T) -> Range<T> {
        let index = self.list_size;
        self.list_size += 1;
        self.container.borrow_mut().add(index, row);
        Range::unit(Rc::clone(&self.container), index)
    }

    /// Returns the row at `index`, or `None` if it was evicted or never
    /// appended.
    ///
    /// Absence is a normal result here; callers should only query indices
    /// covered by a range they currently hold.
    #[must_use]
    pub fn get(&self, index: RowIndex) -> Option<T>
    where
        T: Clone,
    {
        self.container.borrow().get(index)
    }

    /// Total indices ever appended, including evicted ones.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.list_size
    }

    /// Rows currently retained (`filled() <= size()`).
    #[must_use]
    pub fn filled(&self) -> u64 {
        self.container.borrow().len()
    }

    /// Returns whether no row was ever appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Writes `[container:Ref][list_size]`.
    pub fn save<C: RowCodec<Row = T>>(&self, writer: &mut SnapshotWriter<C>) {
        writer.write_container_ref(Some(&self.container));
        writer.write_u64(self.list_size);
    }

    /// Reads a list written by [`SparseList::save`], sharing the container
    /// with any ranges loaded through the same reader.
    ///
    /// # Errors
    ///
    /// Fails on truncated input, an undefined container reference, or a
    /// null container reference (a list always has one).
    pub fn load<C: RowCodec<Row = T>>(
        reader: &mut SnapshotReader<'_, C>,
    ) -> Result<Self, SnapshotError> {
        let container = reader
            .read_container_ref()?
            .ok_or(SnapshotError::Corrupted {
                reason: "list snapshot with null container reference",
            })?;
        let list_size = reader.read_u64()?;
        Ok(Self {
            container,
            list_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreferenced_rows_are_evicted() {
        let mut list = SparseList::new();
        for row in ["A", "B", "C"] {
            drop(list.append(row));
        }
        assert_eq!(list.size(), 3);
        assert_eq!(list.filled(), 0);
        assert!(!list.is_empty());
    }

    #[test]
    fn test_row_retained_while_range_live() {
        let mut list = SparseList::new();
        let a = list.append("A");
        drop(list.append("B"));
        drop(list.append("C"));

        assert_eq!(list.size(), 3);
        assert_eq!(list.filled(), 1);
        assert_eq!(list.get(0), Some("A"));
        assert_eq!(list.get(1), None);
        assert_eq!(list.get(2), None);

        drop(a);
        assert_eq!(list.filled(), 0);
        assert_eq!(list.get(0), None);
    }

    #[test]
    fn test_clone_then_drop_is_a_lock_noop() {
        let mut list = SparseList::new();
        let a = list.append(1);
        let copy = a.clone();
        assert_eq!(list.filled(), 1);
        drop(copy);
        assert_eq!(list.filled(), 1);
        assert_eq!(list.get(0), Some(1));
        drop(a);
        assert_eq!(list.filled(), 0);
    }

    #[test]
    fn test_overlapping_ranges_share_storage() {
        let mut list = SparseList::new();
        let mut first = list.append("a");
        drop(list.append("b"));
        // Row 1 is gone; first still pins row 0.
        assert_eq!(list.filled(), 1);

        let second = first.clone();
        drop(first);
        assert_eq!(list.get(0), Some("a"));
        drop(second);
        assert_eq!(list.get(0), None);
    }

    #[test]
    fn test_extend_covers_next_appended_row() {
        let mut list = SparseList::new();
        let mut range = list.append("a");
        let b = list.append("b");
        range.extend();
        drop(b);

        assert_eq!(range.from(), 0);
        assert_eq!(range.to(), 1);
        assert_eq!(range.size(), 2);
        // The extension's lock keeps row 1 alive past b's release.
        assert_eq!(list.get(1), Some("b"));
        drop(range);
        assert_eq!(list.filled(), 0);
    }

    #[test]
    #[should_panic(expected = "lock on absent row index 1")]
    fn test_extend_into_evicted_row_panics() {
        let mut list = SparseList::new();
        let mut range = list.append("A");
        drop(list.append("B"));
        drop(list.append("C"));
        // Row 1 was evicted when its append range dropped.
        range.extend();
    }

    #[test]
    #[should_panic(expected = "lock on absent row index 1")]
    fn test_extend_past_never_appended_row_panics() {
        let mut list = SparseList::new();
        let mut range = list.append("A");
        range.extend();
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut list = SparseList::new();
        let mut range = list.append("a");
        range.release();
        assert!(!range.is_valid());
        assert_eq!(list.filled(), 0);
        range.release();
        assert_eq!(list.filled(), 0);
    }

    #[test]
    fn test_move_does_not_touch_lock_counts() {
        let mut list = SparseList::new();
        let range = list.append("a");
        let moved = range;
        assert_eq!(list.filled(), 1);
        drop(moved);
        assert_eq!(list.filled(), 0);
    }

    #[test]
    fn test_equality_and_ordering_by_from_to_tag() {
        let mut list = SparseList::new();
        let mut a = list.append("a");
        let mut b = list.append("b");
        assert!(a < b);
        assert_ne!(a, b);

        let mut a2 = a.clone();
        assert_eq!(a, a2);
        a.set_tag(3);
        a2.set_tag(5);
        assert!(a < a2);
        b.set_tag(0);
        assert!(a < b);
    }

    #[test]
    fn test_default_range_is_released() {
        let range: Range<u32> = Range::default();
        assert!(!range.is_valid());
        assert_eq!(range, Range::default());
    }

    #[test]
    #[should_panic(expected = "from() on a released range")]
    fn test_accessor_panics_on_released_range() {
        let range: Range<u32> = Range::default();
        let _ = range.from();
    }

    #[test]
    fn test_container_outlives_list() {
        let range = {
            let mut list = SparseList::new();
            list.append("kept")
        };
        // The list is gone; the range alone keeps the container and row.
        assert!(range.is_valid());
        assert_eq!(range.size(), 1);
    }

    #[test]
    #[should_panic(expected = "added twice")]
    fn test_container_rejects_duplicate_index() {
        let container: ContainerRef<&str> = Rc::new(RefCell::new(Container::default()));
        container.borrow_mut().add(0, "a");
        container.borrow_mut().add(0, "b");
    }
}
