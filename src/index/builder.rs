//! Two-phase in-memory index builder.
//!
//! Phase one collects sizing hints (`prepare_insert`), phase two allocates
//! the table (`final_prepare`) and inserts entries (`add`), which doubles as
//! the authoritative duplicate check. `persist` serializes the finished
//! table into the versioned binary format, write-then-rename.

use std::fs;
use std::io::Write;
use std::path::Path;

use super::format::*;
use crate::Result;

#[derive(Debug, Clone)]
struct Slot {
    hash: u64,
    host: Box<str>,
}

/// In-memory block-list index under construction.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    hint_entries: usize,
    hint_payload: usize,
    slots: Vec<Option<Slot>>,
    len: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizing hint, one call per candidate entry. O(1); no dedup happens here.
    pub fn prepare_insert(&mut self, host: &str) {
        self.hint_entries += 1;
        self.hint_payload += host.len();
    }

    /// Allocate backing storage sized from the accumulated hints.
    ///
    /// Calling without any prior hint still yields a minimal usable table.
    pub fn final_prepare(&mut self) {
        let count = self.hint_entries;
        self.final_prepare_with(count);
    }

    /// Allocate backing storage for a known entry count, bypassing the
    /// sizing pass entirely.
    pub fn final_prepare_with(&mut self, entries: usize) {
        if !self.slots.is_empty() {
            return;
        }
        self.slots = vec![None; bucket_count_for(entries)];
    }

    /// Insert a host. Returns `false` if it was already present.
    pub fn add(&mut self, host: &str) -> bool {
        if self.slots.is_empty() {
            self.final_prepare();
        }
        // the table is grown before it can fill up, so probing terminates
        if (self.len + 1) * 10 > self.slots.len() * 8 {
            self.grow();
        }

        let hash = fnv1a_hash(host.as_bytes());
        let mask = self.slots.len() - 1;
        let mut idx = (hash as usize) & mask;
        loop {
            match &self.slots[idx] {
                Some(slot) => {
                    if slot.hash == hash && &*slot.host == host {
                        return false;
                    }
                    idx = (idx + 1) & mask;
                }
                None => {
                    self.slots[idx] = Some(Slot {
                        hash,
                        host: host.into(),
                    });
                    self.len += 1;
                    return true;
                }
            }
        }
    }

    /// Number of unique entries inserted so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn grow(&mut self) {
        let new_len = (self.slots.len() * 2).max(MIN_BUCKETS);
        let old = std::mem::replace(&mut self.slots, vec![None; new_len]);
        let mask = self.slots.len() - 1;
        for slot in old.into_iter().flatten() {
            let mut idx = (slot.hash as usize) & mask;
            while self.slots[idx].is_some() {
                idx = (idx + 1) & mask;
            }
            self.slots[idx] = Some(slot);
        }
    }

    /// Serialize into the binary index format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let bucket_count = if self.slots.is_empty() {
            MIN_BUCKETS
        } else {
            self.slots.len()
        };

        let bucket_bytes = bucket_count * BUCKET_SIZE;
        let mut buffer = Vec::with_capacity(HEADER_SIZE + bucket_bytes + self.hint_payload);
        buffer.resize(HEADER_SIZE, 0);

        // bucket table, preserving in-memory slot positions so probe
        // sequences stay identical after reopen
        let mut payload = Vec::new();
        for i in 0..bucket_count {
            let entry = match self.slots.get(i).and_then(|s| s.as_ref()) {
                Some(slot) => {
                    let offset = payload.len() as u32;
                    payload.extend_from_slice(slot.host.as_bytes());
                    BucketEntry {
                        hash: slot.hash,
                        payload_offset: offset,
                        host_len: slot.host.len() as u16,
                        state: SLOT_OCCUPIED,
                        _padding: 0,
                    }
                }
                None => BucketEntry::default(),
            };
            write_struct(&mut buffer, &entry);
        }

        let payload_offset = buffer.len() as u32;
        buffer.extend_from_slice(&payload);

        let header = IndexHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64,
            checksum: [0; 32],
            entry_count: self.len as u32,
            bucket_count: bucket_count as u32,
            bucket_offset: HEADER_SIZE as u32,
            payload_offset,
            payload_size: payload.len() as u32,
            reserved: [0; 20],
        };

        let header_bytes = unsafe {
            std::slice::from_raw_parts(&header as *const IndexHeader as *const u8, HEADER_SIZE)
        };
        buffer[..HEADER_SIZE].copy_from_slice(header_bytes);

        let checksum = file_checksum(&buffer);
        buffer[CHECKSUM_RANGE].copy_from_slice(&checksum);

        buffer
    }

    /// Persist the index to `path`, atomically from the caller's view.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let data = self.to_bytes();
        let tmp = path.with_extension("idx.tmp");

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;
        log::debug!(
            "Persisted index: {} entries, {} bytes, {:?}",
            self.len,
            data.len(),
            path
        );
        Ok(())
    }
}

fn write_struct<T>(buffer: &mut Vec<u8>, value: &T) {
    let bytes = unsafe {
        std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>())
    };
    buffer.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dedup() {
        let mut builder = IndexBuilder::new();
        builder.prepare_insert("example.com");
        builder.prepare_insert("example.com");
        builder.final_prepare();

        assert!(builder.add("example.com"));
        assert!(!builder.add("example.com"));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_add_without_prepare_is_usable() {
        let mut builder = IndexBuilder::new();
        assert!(builder.add("a.com"));
        assert!(builder.add("b.com"));
        assert!(!builder.add("a.com"));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_final_prepare_with_known_count() {
        let mut builder = IndexBuilder::new();
        builder.final_prepare_with(1000);
        for i in 0..1000 {
            assert!(builder.add(&format!("host{}.example.com", i)));
        }
        assert_eq!(builder.len(), 1000);
    }

    #[test]
    fn test_growth_beyond_hints() {
        // deliberately under-hinted; the table must grow instead of jamming
        let mut builder = IndexBuilder::new();
        builder.final_prepare_with(4);
        for i in 0..500 {
            assert!(builder.add(&format!("h{}.net", i)));
        }
        for i in 0..500 {
            assert!(!builder.add(&format!("h{}.net", i)));
        }
    }

    #[test]
    fn test_empty_serialization() {
        let builder = IndexBuilder::new();
        let data = builder.to_bytes();
        assert!(data.len() >= HEADER_SIZE + MIN_BUCKETS * BUCKET_SIZE);
        assert_eq!(&data[0..8], &MAGIC);
    }

    #[test]
    fn test_checksum_written() {
        let mut builder = IndexBuilder::new();
        builder.add("example.com");
        let data = builder.to_bytes();
        assert_eq!(data[CHECKSUM_RANGE], file_checksum(&data));
    }
}
