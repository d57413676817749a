//! Persisted index format constants and structures.
//!
//! Layout: fixed 96-byte header, then an open-addressing bucket table
//! (FNV-1a hashes, linear probing), then a string payload holding every
//! hostname for collision verification. All integers little-endian; the
//! file is safe to memory-map on the writing platform.

use sha2::{Digest, Sha256};

/// Magic bytes identifying a hostblock index file.
pub const MAGIC: [u8; 8] = *b"HBIDX\x00\x00\x01";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 96;

/// Bucket entry size in bytes.
pub const BUCKET_SIZE: usize = 16;

/// Load factor used to size the bucket table.
pub const LOAD_FACTOR: f64 = 0.7;

/// Minimum bucket count for a usable table.
pub const MIN_BUCKETS: usize = 16;

/// Index file header (96 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IndexHeader {
    /// Magic bytes: "HBIDX\x00\x00\x01"
    pub magic: [u8; 8],
    /// Format version (u32 LE)
    pub version: u32,
    /// Reserved flag bits
    pub flags: u32,
    /// Unix timestamp when the index was persisted
    pub timestamp: i64,
    /// SHA-256 of the entire file with this field zeroed
    pub checksum: [u8; 32],
    /// Number of unique entries stored
    pub entry_count: u32,
    /// Number of bucket slots (power of two)
    pub bucket_count: u32,
    /// Offset to the bucket table
    pub bucket_offset: u32,
    /// Offset to the hostname payload
    pub payload_offset: u32,
    /// Size of the hostname payload
    pub payload_size: u32,
    /// Reserved for future use
    pub reserved: [u8; 20],
}

impl IndexHeader {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            timestamp: 0,
            checksum: [0; 32],
            entry_count: 0,
            bucket_count: 0,
            bucket_offset: HEADER_SIZE as u32,
            payload_offset: HEADER_SIZE as u32,
            payload_size: 0,
            reserved: [0; 20],
        }
    }

    /// Validate the header magic and version.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.magic != MAGIC {
            return Err(crate::Error::InvalidMagic);
        }
        if self.version > FORMAT_VERSION {
            return Err(crate::Error::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for IndexHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Bucket table entry (16 bytes).
///
/// A slot with `state == SLOT_EMPTY` terminates a probe chain. The payload
/// reference resolves hash collisions by exact string comparison.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketEntry {
    /// FNV-1a hash of the hostname
    pub hash: u64,
    /// Offset of the hostname within the payload section
    pub payload_offset: u32,
    /// Length of the hostname
    pub host_len: u16,
    /// Slot state (SLOT_EMPTY / SLOT_OCCUPIED)
    pub state: u8,
    /// Padding
    pub _padding: u8,
}

pub const SLOT_EMPTY: u8 = 0;
pub const SLOT_OCCUPIED: u8 = 1;

/// Byte range of the checksum field within the header.
pub const CHECKSUM_RANGE: std::ops::Range<usize> = 24..56;

/// FNV-1a 64-bit hash function.
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Bucket count for an expected number of entries (load factor 0.7, power of
/// two, never below the minimum).
pub fn bucket_count_for(entries: usize) -> usize {
    ((entries.max(1) as f64 / LOAD_FACTOR) as usize)
        .next_power_of_two()
        .max(MIN_BUCKETS)
}

/// Compute the file checksum with the header checksum field zeroed.
pub fn file_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&data[..CHECKSUM_RANGE.start]);
    hasher.update([0u8; 32]);
    hasher.update(&data[CHECKSUM_RANGE.end..]);
    hasher.finalize().into()
}
