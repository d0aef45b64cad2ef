//! Stored rows.
//!
//! A [`Row`] owns one document: its serialized JSON bytes plus a lazily
//! populated decoded cache. Content is replaced wholesale on patch; the
//! identity never changes except through [`DenseContainer`] compaction.
//!
//! [`DenseContainer`]: crate::container::DenseContainer

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratadoc_core::{Error, Result, RowHandle, RowId};

struct RowContent {
    payload: Arc<[u8]>,
    decoded: Option<Arc<Value>>,
}

/// One stored document.
pub struct Row {
    id: AtomicU64,
    handle: RowHandle,
    content: RwLock<RowContent>,
    patch_lock: Mutex<()>,
}

impl Row {
    /// Create a row from encoded bytes and an optional decoded copy.
    pub fn new(id: RowId, handle: RowHandle, payload: Vec<u8>, decoded: Option<Arc<Value>>) -> Self {
        Row {
            id: AtomicU64::new(id.0),
            handle,
            content: RwLock::new(RowContent {
                payload: payload.into(),
                decoded,
            }),
            patch_lock: Mutex::new(()),
        }
    }

    /// Encode `document` and build a row holding both forms.
    pub fn from_document(id: RowId, handle: RowHandle, document: Value) -> Result<Self> {
        let payload = serde_json::to_vec(&document)?;
        Ok(Self::new(id, handle, payload, Some(Arc::new(document))))
    }

    /// Logical identity.
    #[inline]
    pub fn id(&self) -> RowId {
        RowId(self.id.load(Ordering::Acquire))
    }

    /// Arena slot holding this row.
    #[inline]
    pub fn handle(&self) -> RowHandle {
        self.handle
    }

    /// Serialized document bytes.
    pub fn payload(&self) -> Arc<[u8]> {
        Arc::clone(&self.content.read().payload)
    }

    /// Decoded document, decoding and caching on first access.
    pub fn document(&self) -> Result<Arc<Value>> {
        if let Some(doc) = &self.content.read().decoded {
            return Ok(Arc::clone(doc));
        }

        let mut content = self.content.write();
        if let Some(doc) = &content.decoded {
            return Ok(Arc::clone(doc));
        }
        let doc: Value = serde_json::from_slice(&content.payload)
            .map_err(|e| Error::Serialization(format!("row {}: {}", self.id(), e)))?;
        let doc = Arc::new(doc);
        content.decoded = Some(Arc::clone(&doc));
        Ok(doc)
    }

    /// Replace the stored content.
    pub fn replace(&self, payload: Vec<u8>, decoded: Option<Arc<Value>>) {
        let mut content = self.content.write();
        content.payload = payload.into();
        content.decoded = decoded;
    }

    /// Drop the decoded cache, keeping only the bytes.
    pub fn evict_decoded(&self) {
        self.content.write().decoded = None;
    }

    /// Exclusive guard serializing read-modify-write cycles on this row.
    ///
    /// Collection mutations are already atomic; this lock is for callers that
    /// read a row, do work elsewhere, then patch it.
    pub fn patch_guard(&self) -> MutexGuard<'_, ()> {
        self.patch_lock.lock()
    }

    pub(crate) fn rebind(&self, id: RowId) {
        self.id.store(id.0, Ordering::Release);
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("id", &self.id())
            .field("handle", &self.handle)
            .field("payload_len", &self.content.read().payload.len())
            .finish()
    }
}

/// Shared reference to a row.
pub type RowRef = Arc<Row>;
