//! Persisted index reader with memory-mapping support.
//!
//! A lazy open keeps only the mmap handle; an eager open pulls the whole
//! structure into memory and verifies the file checksum up front.

use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::format::*;
use crate::{Error, Result};

enum IndexData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl IndexData {
    fn bytes(&self) -> &[u8] {
        match self {
            IndexData::Mapped(mmap) => mmap,
            IndexData::Owned(vec) => vec,
        }
    }
}

/// Read-only view over a persisted block-list index.
pub struct IndexReader {
    data: IndexData,
}

impl IndexReader {
    /// Open a persisted index.
    ///
    /// `eager` loads the full structure into memory and verifies the
    /// checksum; otherwise only the mapping is established and pages are
    /// faulted in on demand.
    pub fn open(path: &Path, eager: bool) -> Result<Self> {
        let mut file = File::open(path)?;
        let data = if eager {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            IndexData::Owned(buf)
        } else {
            IndexData::Mapped(unsafe { Mmap::map(&file)? })
        };

        let reader = Self { data };
        reader.validate(eager)?;
        Ok(reader)
    }

    /// Open an index from an in-memory serialized form.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let reader = Self {
            data: IndexData::Owned(data),
        };
        reader.validate(true)?;
        Ok(reader)
    }

    /// An index containing no entries.
    pub fn empty() -> Self {
        let data = super::builder::IndexBuilder::new().to_bytes();
        Self {
            data: IndexData::Owned(data),
        }
    }

    fn validate(&self, verify_checksum: bool) -> Result<()> {
        let bytes = self.data.bytes();
        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidHeaderSize {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let header = self.header();
        header.validate()?;

        let bucket_end = header.bucket_offset as usize
            + header.bucket_count as usize * BUCKET_SIZE;
        let payload_end = header.payload_offset as usize + header.payload_size as usize;
        if bucket_end > bytes.len() || payload_end > bytes.len() {
            return Err(Error::Config(format!(
                "index sections exceed file size ({} bytes)",
                bytes.len()
            )));
        }

        if verify_checksum && self.header().checksum != file_checksum(bytes) {
            return Err(Error::ChecksumMismatch);
        }

        Ok(())
    }

    /// The file header, copied out (the backing bytes may be unaligned).
    pub fn header(&self) -> IndexHeader {
        unsafe { std::ptr::read_unaligned(self.data.bytes().as_ptr() as *const IndexHeader) }
    }

    /// Number of unique entries in the index.
    pub fn entry_count(&self) -> u32 {
        self.header().entry_count
    }

    /// Whether `host` or any of its dot-delimited suffixes is indexed,
    /// most specific first.
    pub fn contains(&self, host: &str) -> bool {
        if self.contains_exact(host) {
            return true;
        }
        let mut current = host;
        while let Some(pos) = current.find('.') {
            current = &current[pos + 1..];
            if self.contains_exact(current) {
                return true;
            }
        }
        false
    }

    /// Exact membership probe, O(1) expected.
    pub fn contains_exact(&self, host: &str) -> bool {
        let header = self.header();
        let bucket_count = header.bucket_count as usize;
        if bucket_count == 0 || header.entry_count == 0 {
            return false;
        }

        let bytes = self.data.bytes();
        let bucket_start = header.bucket_offset as usize;
        let payload_start = header.payload_offset as usize;
        let payload_len = header.payload_size as usize;

        let hash = fnv1a_hash(host.as_bytes());
        let mut idx = (hash as usize) % bucket_count;

        for _ in 0..bucket_count {
            let offset = bucket_start + idx * BUCKET_SIZE;
            let entry: BucketEntry =
                unsafe { std::ptr::read_unaligned(bytes[offset..].as_ptr() as *const BucketEntry) };

            if entry.state == SLOT_EMPTY {
                return false;
            }

            if entry.hash == hash {
                // verify against the payload in case of a hash collision
                let start = entry.payload_offset as usize;
                let end = start + entry.host_len as usize;
                if end <= payload_len
                    && &bytes[payload_start + start..payload_start + end] == host.as_bytes()
                {
                    return true;
                }
            }

            idx = (idx + 1) % bucket_count;
        }

        false
    }
}

/// Cheap header-only version check of a persisted index file.
///
/// Returns `false` for missing, truncated, or version-mismatched files; the
/// caller must then treat the index as absent and rebuild.
pub fn check_index_version(path: &Path) -> bool {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return false,
    };
    let mut header_bytes = [0u8; HEADER_SIZE];
    if file.read_exact(&mut header_bytes).is_err() {
        return false;
    }
    let header: IndexHeader =
        unsafe { std::ptr::read_unaligned(header_bytes.as_ptr() as *const IndexHeader) };
    header.validate().is_ok()
}
