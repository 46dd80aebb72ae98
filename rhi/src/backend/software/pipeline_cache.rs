//! Persistent pipeline cache.
//!
//! Blob layout, all integers little-endian:
//!
//! ```text
//! magic   b"RLPC"
//! version u32
//! count   u32
//! count x { key u64, len u32, bytes [u8; len] }
//! ```
//!
//! Keys come from [`crate::pipeline::PipelineCompileDesc::cache_key`] and are
//! stable across processes.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::logging::Logger;
use crate::pipeline::{PipelineCacheStats, PipelineCompileDesc};

const MAGIC: &[u8; 4] = b"RLPC";
const VERSION: u32 = 1;

/// Compiled pipelines keyed by their cache key.
#[derive(Debug, Default)]
pub(crate) struct PipelineCacheStore {
    entries: BTreeMap<u64, Arc<[u8]>>,
    hits: u64,
    misses: u64,
}

/// Why a blob was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BlobError {
    BadMagic,
    Version(u32),
    Truncated,
}

impl std::fmt::Display for BlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not a pipeline cache blob"),
            Self::Version(v) => write!(f, "format version {v}, expected {VERSION}"),
            Self::Truncated => write!(f, "blob is truncated"),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], BlobError> {
        if self.data.len() < n {
            return Err(BlobError::Truncated);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32, BlobError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, BlobError> {
        let lo = self.u32()? as u64;
        let hi = self.u32()? as u64;
        Ok(lo | hi << 32)
    }
}

fn parse(data: &[u8]) -> Result<BTreeMap<u64, Arc<[u8]>>, BlobError> {
    let mut reader = Reader { data };
    if reader.take(MAGIC.len()).map_err(|_| BlobError::BadMagic)? != MAGIC {
        return Err(BlobError::BadMagic);
    }
    let version = reader.u32()?;
    if version != VERSION {
        return Err(BlobError::Version(version));
    }
    let count = reader.u32()?;
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        let key = reader.u64()?;
        let len = reader.u32()? as usize;
        entries.insert(key, Arc::from(reader.take(len)?));
    }
    Ok(entries)
}

impl PipelineCacheStore {
    /// Load a blob. An empty blob gives an empty cache; an incompatible one
    /// is dropped with a warning.
    pub(crate) fn from_blob(data: &[u8], logger: &Logger) -> Self {
        if data.is_empty() {
            return Self::default();
        }
        match parse(data) {
            Ok(entries) => {
                log::debug!("PipelineCache: loaded {} entries", entries.len());
                Self {
                    entries,
                    ..Self::default()
                }
            }
            Err(e) => {
                logger.warn(
                    "pipeline_cache",
                    &format!("ignoring {} byte cache blob: {e}", data.len()),
                );
                Self::default()
            }
        }
    }

    pub(crate) fn to_blob(&self) -> Vec<u8> {
        let payload: usize = self.entries.values().map(|bytes| 12 + bytes.len()).sum();
        let mut blob = Vec::with_capacity(12 + payload);
        blob.extend_from_slice(MAGIC);
        blob.extend_from_slice(&VERSION.to_le_bytes());
        blob.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (key, bytes) in &self.entries {
            blob.extend_from_slice(&key.to_le_bytes());
            blob.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            blob.extend_from_slice(bytes);
        }
        blob
    }

    /// Return the compiled pipeline for `desc`, compiling and inserting it on a miss.
    pub(crate) fn get_or_compile(&mut self, desc: &PipelineCompileDesc) -> Arc<[u8]> {
        let key = desc.cache_key();
        if let Some(bytes) = self.entries.get(&key) {
            self.hits += 1;
            return Arc::clone(bytes);
        }
        self.misses += 1;
        let bytes: Arc<[u8]> = Arc::from(compile(desc));
        self.entries.insert(key, Arc::clone(&bytes));
        bytes
    }

    pub(crate) fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len() as u64,
        }
    }
}

/// "Compile" a pipeline: a deterministic blob of everything the key covers.
pub(crate) fn compile(desc: &PipelineCompileDesc) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(desc.pipeline_type as u8);
    out.extend_from_slice(&(desc.fixed_function.len() as u32).to_le_bytes());
    out.extend_from_slice(&desc.fixed_function);
    for stage in &desc.stages {
        out.extend_from_slice(&stage.stage.bits().to_le_bytes());
        out.extend_from_slice(&(stage.entry_point.len() as u32).to_le_bytes());
        out.extend_from_slice(stage.entry_point.as_bytes());
        out.extend_from_slice(&(stage.bytecode.len() as u32).to_le_bytes());
        out.extend_from_slice(&stage.bytecode);
    }
    out
}
