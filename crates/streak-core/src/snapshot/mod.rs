//! Versioned snapshot protocol for checkpoint/resume.
//!
//! A snapshot stream starts with a `[magic:u32][version:u32]` header and then
//! carries the saved structures in whatever order the checkpointing collaborator
//! composes them: container bodies, list headers, and range headers, all as
//! ordered little-endian primitives. Field order is part of the cross-version
//! contract.
//!
//! ## Shared-container references
//!
//! A [`SparseList`](crate::rows::SparseList) and its live
//! [`Range`](crate::rows::Range)s share one container, and that sharing must
//! survive a round trip. The writer assigns each distinct container a
//! reference id (by pointer identity) and inlines the container body — entry
//! rows *and lock counts* — at its first occurrence only; later occurrences
//! write just the id. On load, the first occurrence materializes the
//! container and every later occurrence re-binds to the same instance.
//! Restored ranges therefore never re-issue locks: the container body is the
//! sole source of truth for post-restore lock accounting.
//!
//! ## Versions
//!
//! - **1**: ranges carry no tag; loads default it to
//!   [`TAG_UNSET`](crate::rows::TAG_UNSET).
//! - **2** (current): ranges carry their tag.
//!
//! Anything outside that window is rejected up front. Truncated or malformed
//! input fails the load before any structure is returned; nothing is
//! partially applied.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Buf, BufMut};
use fxhash::FxHashMap;
use tracing::debug;

use crate::rows::sparse::{Container, ContainerRef};

/// Stream marker preceding every snapshot (`"SKB1"`).
pub const SNAPSHOT_MAGIC: u32 = 0x534B_4231;

/// Oldest schema version this build can load.
pub const MIN_VERSION: u32 = 1;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Errors raised while encoding or decoding snapshots. All are fatal; no
/// snapshot is partially applied.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    /// The stream does not start with [`SNAPSHOT_MAGIC`].
    #[error("Bad snapshot magic: {found:#010x}")]
    BadMagic {
        /// The value found where the magic was expected.
        found: u32,
    },

    /// The stream's schema version is outside `[MIN_VERSION, CURRENT_VERSION]`.
    #[error("Unsupported snapshot schema version {version} (supported: {MIN_VERSION}..={CURRENT_VERSION})")]
    UnsupportedVersion {
        /// The rejected version.
        version: u32,
    },

    /// The stream ended inside a field.
    #[error("Truncated snapshot stream")]
    UnexpectedEof,

    /// The stream decoded but violates a structural invariant.
    #[error("Corrupted snapshot: {reason}")]
    Corrupted {
        /// What was violated.
        reason: &'static str,
    },

    /// A container reference id was used before its body was defined.
    #[error("Unknown container reference {id} in snapshot")]
    UnknownContainerRef {
        /// The undefined reference id.
        id: u64,
    },
}

/// Encodes and decodes the opaque row payload.
///
/// Rows are opaque to the buffer; the checkpointing collaborator supplies the
/// codec. `decode` must consume exactly the bytes `encode` produced for one
/// row (self-framing), since rows are embedded mid-stream.
pub trait RowCodec {
    /// The row type this codec handles.
    type Row;

    /// Appends one encoded row to `buf`.
    fn encode(&self, row: &Self::Row, buf: &mut Vec<u8>);

    /// Decodes one row, advancing `buf` past it.
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed row bytes.
    fn decode(&self, buf: &mut &[u8]) -> Result<Self::Row, SnapshotError>;
}

/// Length-prefixed codec for raw byte-blob rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobCodec;

impl RowCodec for BlobCodec {
    type Row = Vec<u8>;

    fn encode(&self, row: &Self::Row, buf: &mut Vec<u8>) {
        buf.put_u64_le(row.len() as u64);
        buf.extend_from_slice(row);
    }

    fn decode(&self, buf: &mut &[u8]) -> Result<Self::Row, SnapshotError> {
        if buf.remaining() < 8 {
            return Err(SnapshotError::UnexpectedEof);
        }
        let len = usize::try_from(buf.get_u64_le()).map_err(|_| SnapshotError::Corrupted {
            reason: "row length exceeds address space",
        })?;
        if buf.remaining() < len {
            return Err(SnapshotError::UnexpectedEof);
        }
        let mut row = vec![0u8; len];
        buf.copy_to_slice(&mut row);
        Ok(row)
    }
}

/// Ordered snapshot writer with a queryable schema version.
#[derive(Debug)]
pub struct SnapshotWriter<C: RowCodec> {
    codec: C,
    version: u32,
    buf: Vec<u8>,
    /// Container pointer identity -> assigned reference id (ids start at 1;
    /// 0 is the null reference).
    refs: FxHashMap<usize, u64>,
}

impl<C: RowCodec> SnapshotWriter<C> {
    /// Creates a writer targeting `version` and emits the stream header.
    ///
    /// # Errors
    ///
    /// Fails if `version` is outside the supported window.
    pub fn new(codec: C, version: u32) -> Result<Self, SnapshotError> {
        if !(MIN_VERSION..=CURRENT_VERSION).contains(&version) {
            return Err(SnapshotError::UnsupportedVersion { version });
        }
        let mut buf = Vec::new();
        buf.put_u32_le(SNAPSHOT_MAGIC);
        buf.put_u32_le(version);
        Ok(Self {
            codec,
            version,
            buf,
            refs: FxHashMap::default(),
        })
    }

    /// The schema version this writer targets.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Writes one little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Writes one row through the codec.
    pub fn write_row(&mut self, row: &C::Row) {
        self.codec.encode(row, &mut self.buf);
    }

    /// Writes a container reference, inlining the container body at its
    /// first occurrence in this stream. `None` writes the null reference.
    pub(crate) fn write_container_ref(&mut self, container: Option<&ContainerRef<C::Row>>) {
        let Some(container) = container else {
            self.write_u64(0);
            return;
        };
        let key = Rc::as_ptr(container) as usize;
        if let Some(&id) = self.refs.get(&key) {
            self.write_u64(id);
        } else {
            let id = self.refs.len() as u64 + 1;
            self.refs.insert(key, id);
            self.write_u64(id);
            container.borrow().save_body(self);
        }
    }

    /// Finishes the stream and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Ordered snapshot reader over a byte slice.
pub struct SnapshotReader<'a, C: RowCodec> {
    codec: C,
    version: u32,
    buf: &'a [u8],
    /// Reference id -> restored container; ids appear in the stream in
    /// assignment order, so the first use of id `refs.len() + 1` defines it.
    refs: FxHashMap<u64, ContainerRef<C::Row>>,
}

impl<'a, C: RowCodec> SnapshotReader<'a, C> {
    /// Validates the stream header and positions the reader after it.
    ///
    /// # Errors
    ///
    /// Fails on a short header, wrong magic, or unsupported schema version.
    pub fn new(bytes: &'a [u8], codec: C) -> Result<Self, SnapshotError> {
        let mut buf = bytes;
        if buf.remaining() < 8 {
            return Err(SnapshotError::UnexpectedEof);
        }
        let magic = buf.get_u32_le();
        if magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic { found: magic });
        }
        let version = buf.get_u32_le();
        if !(MIN_VERSION..=CURRENT_VERSION).contains(&version) {
            return Err(SnapshotError::UnsupportedVersion { version });
        }
        debug!(version, "reading snapshot stream");
        Ok(Self {
            codec,
            version,
            buf,
            refs: FxHashMap::default(),
        })
    }

    /// The schema version the stream was written under.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Reads one little-endian `u64`.
    ///
    /// # Errors
    ///
    /// Fails if the stream ends first.
    pub fn read_u64(&mut self) -> Result<u64, SnapshotError> {
        if self.buf.remaining() < 8 {
            return Err(SnapshotError::UnexpectedEof);
        }
        Ok(self.buf.get_u64_le())
    }

    /// Reads one row through the codec.
    ///
    /// # Errors
    ///
    /// Fails on truncated or malformed row bytes.
    pub fn read_row(&mut self) -> Result<C::Row, SnapshotError> {
        self.codec.decode(&mut self.buf)
    }

    /// Reads a container reference, materializing the container at its
    /// first occurrence and re-binding to the same instance afterwards.
    pub(crate) fn read_container_ref(
        &mut self,
    ) -> Result<Option<ContainerRef<C::Row>>, SnapshotError> {
        let id = self.read_u64()?;
        if id == 0 {
            return Ok(None);
        }
        if let Some(container) = self.refs.get(&id) {
            return Ok(Some(Rc::clone(container)));
        }
        // Ids are assigned sequentially at first occurrence, so the only
        // admissible unknown id is the next one.
        if id != self.refs.len() as u64 + 1 {
            return Err(SnapshotError::UnknownContainerRef { id });
        }
        let container = Rc::new(RefCell::new(Container::load_body(self)?));
        self.refs.insert(id, Rc::clone(&container));
        Ok(Some(container))
    }
}

impl<C: RowCodec> std::fmt::Debug for SnapshotReader<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotReader")
            .field("version", &self.version)
            .field("remaining", &self.buf.len())
            .field("containers", &self.refs.len())
            .finish_non_exhaustive()
    }
}
