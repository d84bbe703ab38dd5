//! Journaled state store: append-only WAL with checksums
//!
//! Every apply serializes its change-set (publications included) into a
//! length-prefixed entry with a CRC32C checksum and appends it before the
//! in-memory state is touched. On open the journal is replayed into a
//! fresh [`MemoryStore`], which is how the book survives process restart;
//! replay runs before any sink is attached, so replayed publications
//! deliver nowhere and reconnecting subscribers catch up through the
//! snapshot handoff instead.
//!
//! # Binary format (per entry)
//! ```text
//! [total_len: u32]
//! [sequence:  u64]
//! [timestamp: i64]
//! [payload_len: u32][payload: bytes]   // JSON-serialized ChangeSet
//! [checksum: u32]                      // CRC32C over sequence+timestamp+payload
//! ```

use crate::change_set::ChangeSet;
use crate::memory::MemoryStore;
use crate::store::{
    BookSnapshot, EventSink, StateStore, StoreError, SymbolSnapshot,
};
use crc32c::crc32c;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use types::clock;
use types::ids::{OrderId, Symbol, UserId};
use types::order::Order;
use types::trade::Trade;

/// Controls when buffered data reaches the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// Controls when `fsync` is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    OnRotation,
}

/// Journal configuration.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding journal segment files.
    pub dir: PathBuf,
    /// Maximum segment size before rotation.
    pub max_file_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_file_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

/// One persisted apply.
#[derive(Debug, Clone, PartialEq)]
struct JournalEntry {
    sequence: u64,
    timestamp: i64,
    payload: Vec<u8>,
    checksum: u32,
}

impl JournalEntry {
    fn new(sequence: u64, timestamp: i64, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, timestamp, &payload);
        Self {
            sequence,
            timestamp,
            payload,
            checksum,
        }
    }

    fn compute_checksum(sequence: u64, timestamp: i64, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    fn verify_checksum(&self) -> bool {
        self.checksum == Self::compute_checksum(self.sequence, self.timestamp, &self.payload)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let payload_len = self.payload.len() as u32;
        // body = 8 (seq) + 8 (ts) + 4 (len) + payload + 4 (crc)
        let body_len: u32 = 8 + 8 + 4 + payload_len + 4;

        let mut buf = Vec::with_capacity(4 + body_len as usize);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse one entry; `None` means a clean truncated tail (partial write
    /// on crash), an error means corruption.
    fn from_bytes(data: &[u8]) -> Result<Option<(Self, usize)>, StoreError> {
        if data.len() < 4 {
            return Ok(None);
        }
        let body_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if body_len < 24 || body_len > 100_000_000 {
            return Err(StoreError::Corrupted(format!(
                "implausible entry length: {body_len}"
            )));
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Ok(None);
        }

        let body = &data[4..total];
        let sequence = u64::from_le_bytes(body[0..8].try_into().expect("sized slice"));
        let timestamp = i64::from_le_bytes(body[8..16].try_into().expect("sized slice"));
        let payload_len =
            u32::from_le_bytes(body[16..20].try_into().expect("sized slice")) as usize;
        if 20 + payload_len + 4 != body.len() {
            return Err(StoreError::Corrupted(format!(
                "payload length {payload_len} does not fit entry body {}",
                body.len()
            )));
        }
        let payload = body[20..20 + payload_len].to_vec();
        let checksum = u32::from_le_bytes(
            body[20 + payload_len..].try_into().expect("sized slice"),
        );

        let entry = Self {
            sequence,
            timestamp,
            payload,
            checksum,
        };
        if !entry.verify_checksum() {
            return Err(StoreError::Corrupted(format!(
                "checksum mismatch at sequence {sequence}"
            )));
        }
        Ok(Some((entry, total)))
    }
}

/// Append-only segment writer with rotation and flush/fsync control.
struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_file_size: u64,
    next_sequence: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
    file_index: u64,
}

impl JournalWriter {
    fn open(config: JournalConfig, next_sequence: u64) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;
        let file_index = latest_segment_index(&config.dir);
        let path = segment_path(&config.dir, file_index);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_file_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_file_size,
            next_sequence,
            writes_since_flush: 0,
            writes_since_fsync: 0,
            file_index,
        })
    }

    fn append(&mut self, timestamp: i64, payload: Vec<u8>) -> Result<(), StoreError> {
        if self.current_file_size >= self.config.max_file_size {
            self.rotate()?;
        }

        let entry = JournalEntry::new(self.next_sequence, timestamp, payload);
        let bytes = entry.to_bytes();
        self.writer.write_all(&bytes)?;
        self.current_file_size += bytes.len() as u64;
        self.next_sequence += 1;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        if should_flush {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }

        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }

        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), StoreError> {
        self.sync()?;
        self.file_index += 1;
        let path = segment_path(&self.config.dir, self.file_index);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.writer = BufWriter::new(file);
        self.current_file_size = 0;
        Ok(())
    }
}

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("journal-{index:06}.bin"))
}

fn segment_indexes(dir: &Path) -> Vec<u64> {
    let mut indexes: Vec<u64> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.strip_prefix("journal-")?
                .strip_suffix(".bin")?
                .parse::<u64>()
                .ok()
        })
        .collect();
    indexes.sort_unstable();
    indexes
}

fn latest_segment_index(dir: &Path) -> u64 {
    segment_indexes(dir).into_iter().max().unwrap_or(0)
}

/// Replay every committed change-set in segment order.
///
/// A truncated tail on the last segment is tolerated (partial write during
/// a crash); a checksum mismatch is not.
fn replay(dir: &Path, store: &MemoryStore) -> Result<u64, StoreError> {
    let mut next_sequence = 0u64;
    let indexes = segment_indexes(dir);
    let last = indexes.last().copied();

    for index in indexes {
        let mut data = Vec::new();
        File::open(segment_path(dir, index))?.read_to_end(&mut data)?;

        let mut pos = 0usize;
        while pos < data.len() {
            match JournalEntry::from_bytes(&data[pos..])? {
                Some((entry, consumed)) => {
                    let change: ChangeSet = serde_json::from_slice(&entry.payload)
                        .map_err(|e| StoreError::Corrupted(e.to_string()))?;
                    store.apply(&change)?;
                    next_sequence = entry.sequence + 1;
                    pos += consumed;
                }
                None => {
                    if Some(index) == last {
                        warn!(segment = index, offset = pos, "truncated journal tail, stopping replay");
                        break;
                    }
                    return Err(StoreError::Corrupted(format!(
                        "truncated entry in non-final segment {index}"
                    )));
                }
            }
        }
    }

    Ok(next_sequence)
}

/// Durable `StateStore`: an in-memory store fronted by the WAL.
pub struct JournalStore {
    inner: MemoryStore,
    writer: Mutex<JournalWriter>,
}

impl JournalStore {
    /// Open (or create) a journal directory and replay it.
    pub fn open(config: JournalConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;

        let inner = MemoryStore::new();
        let next_sequence = replay(&config.dir, &inner)?;
        info!(
            dir = %config.dir.display(),
            replayed = next_sequence,
            "journal replayed"
        );

        let writer = JournalWriter::open(config, next_sequence)?;
        Ok(Self {
            inner,
            writer: Mutex::new(writer),
        })
    }
}

impl StateStore for JournalStore {
    fn apply(&self, change: &ChangeSet) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(change)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        {
            let mut writer = self.writer.lock().expect("journal mutex poisoned");
            writer.append(clock::unix_nanos(), payload)?;
        }
        self.inner.apply(change)
    }

    fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        self.inner.set_event_sink(sink);
    }

    fn load_symbol(&self, symbol: &Symbol) -> Result<SymbolSnapshot, StoreError> {
        self.inner.load_symbol(symbol)
    }

    fn book_snapshot(&self, symbol: &Symbol, depth: usize) -> Result<BookSnapshot, StoreError> {
        self.inner.book_snapshot(symbol, depth)
    }

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.order(order_id)
    }

    fn user_orders(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        self.inner.user_orders(user_id)
    }

    fn recent_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>, StoreError> {
        self.inner.recent_trades(symbol, limit)
    }

    fn next_order_id(&self) -> Result<u64, StoreError> {
        self.inner.next_order_id()
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.writer.lock().expect("journal mutex poisoned").sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::StateOp;
    use tempfile::TempDir;
    use types::numeric::Price;
    use types::order::{OrderType, Side};

    fn sample_change(id: u64) -> ChangeSet {
        let symbol = Symbol::new("BTC/USD");
        let order = Order::new(
            OrderId::new(id),
            UserId::new(1),
            symbol.clone(),
            Side::Buy,
            OrderType::Limit,
            "1.0".parse().unwrap(),
            Some(Price::from_units(50000)),
            None,
            1_708_123_456_789_000_000,
        );
        let mut change = ChangeSet::new(symbol);
        change.push(StateOp::PutOrder(order.clone()));
        change.push(StateOp::InsertResting {
            side: Side::Buy,
            price: Price::from_units(50000),
            order_id: order.id,
            quantity: order.remaining(),
        });
        change
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = JournalEntry::new(7, 1_708_123_456_789_000_000, vec![1, 2, 3]);
        assert!(entry.verify_checksum());

        let bytes = entry.to_bytes();
        let (parsed, consumed) = JournalEntry::from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_entry_detects_tamper() {
        let entry = JournalEntry::new(7, 1_708_123_456_789_000_000, vec![1, 2, 3]);
        let mut bytes = entry.to_bytes();
        let len = bytes.len();
        bytes[len - 6] ^= 0xFF; // flip a payload byte
        assert!(JournalEntry::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_truncated_tail_is_not_an_entry() {
        let entry = JournalEntry::new(7, 1_708_123_456_789_000_000, vec![1, 2, 3]);
        let bytes = entry.to_bytes();
        assert!(JournalEntry::from_bytes(&bytes[..bytes.len() - 1])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_journal_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path());

        {
            let store = JournalStore::open(config.clone()).unwrap();
            store.apply(&sample_change(1)).unwrap();
            store.apply(&sample_change(2)).unwrap();
            store.sync().unwrap();
        }

        let reopened = JournalStore::open(config).unwrap();
        let snap = reopened.book_snapshot(&Symbol::new("BTC/USD"), 10).unwrap();
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].order_count, 2);
        assert_eq!(reopened.next_order_id().unwrap(), 3);
    }

    #[test]
    fn test_journal_rotation() {
        let dir = TempDir::new().unwrap();
        let mut config = JournalConfig::new(dir.path());
        config.max_file_size = 256; // force rotation quickly

        {
            let store = JournalStore::open(config.clone()).unwrap();
            for i in 1..=10 {
                store.apply(&sample_change(i)).unwrap();
            }
            store.sync().unwrap();
        }

        assert!(segment_indexes(dir.path()).len() > 1);

        let reopened = JournalStore::open(config).unwrap();
        let snap = reopened.load_symbol(&Symbol::new("BTC/USD")).unwrap();
        assert_eq!(snap.bid_queues[0].1.len(), 10);
    }

    #[test]
    fn test_truncated_tail_tolerated_on_reopen() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path());

        {
            let store = JournalStore::open(config.clone()).unwrap();
            store.apply(&sample_change(1)).unwrap();
            store.sync().unwrap();
        }

        // Simulate a crash mid-write: append garbage shorter than a header.
        let path = segment_path(dir.path(), 0);
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(&[0x10, 0x00]).unwrap();

        let reopened = JournalStore::open(config).unwrap();
        let snap = reopened.book_snapshot(&Symbol::new("BTC/USD"), 10).unwrap();
        assert_eq!(snap.bids.len(), 1);
    }
}
