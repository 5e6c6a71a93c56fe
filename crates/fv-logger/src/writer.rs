//! Batched, hash-chained log writer.
//!
//! The writer owns the chain head: every appended sample is serialized
//! with the current head as its prev_hash, and the head advances to the
//! digest of the line just produced. Records are buffered in memory and
//! flushed to the device in batches, so a power loss forfeits at most
//! one unflushed batch while the durable prefix remains a valid chain.

use bytes::Bytes;
use fv_card::BlockDevice;
use fv_chain::{ChainHash, GENESIS, LogRecord, SCHEMA_HEADER, line_hash};
use fv_types::{RecordIndex, Sample};

use crate::{BlockLog, LogError};

/// Tuning for the log writer.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Buffered records that trigger an automatic flush.
    pub batch_threshold: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            batch_threshold: 20,
        }
    }
}

impl LoggerConfig {
    pub fn with_batch_threshold(mut self, records: usize) -> Self {
        assert!(records > 0, "batch threshold must be positive");
        self.batch_threshold = records;
        self
    }
}

/// Appends hash-chained records to a [`BlockLog`].
///
/// Durability is explicit: records accumulate in memory until
/// [`flush`](LogWriter::flush) runs (automatically at the batch
/// threshold, or on demand). Dropping the writer discards whatever is
/// still buffered; that is the crash model, and the durable prefix is
/// a valid chain regardless of where the cut falls.
#[derive(Debug)]
pub struct LogWriter<D> {
    log: BlockLog<D>,
    config: LoggerConfig,
    /// prev_hash for the next record: digest of the last line produced.
    head: ChainHash,
    /// Index the next appended record will receive.
    next_index: RecordIndex,
    /// Canonical lines not yet written to the device.
    pending: Vec<String>,
}

impl<D: BlockDevice> LogWriter<D> {
    /// Opens a device, initialising an empty one and resuming from an
    /// existing log otherwise.
    pub fn open(device: D, config: LoggerConfig) -> Result<Self, LogError> {
        let log = BlockLog::open(device)?;
        if log.is_empty() {
            Self::initialize(log, config)
        } else {
            Self::resume_from(log, config)
        }
    }

    /// Initialises a fresh log on an empty device.
    pub fn create(device: D, config: LoggerConfig) -> Result<Self, LogError> {
        let log = BlockLog::open(device)?;
        if !log.is_empty() {
            return Err(LogError::AlreadyInitialized { len: log.len() });
        }
        Self::initialize(log, config)
    }

    /// Resumes appending to an existing log.
    pub fn resume(device: D, config: LoggerConfig) -> Result<Self, LogError> {
        Self::resume_from(BlockLog::open(device)?, config)
    }

    fn initialize(mut log: BlockLog<D>, config: LoggerConfig) -> Result<Self, LogError> {
        let mut header = String::from(SCHEMA_HEADER);
        header.push('\n');
        log.append(header.as_bytes())?;

        tracing::info!("log initialised");
        Ok(Self {
            log,
            config,
            head: GENESIS,
            next_index: RecordIndex::ZERO,
            pending: Vec::new(),
        })
    }

    /// Re-derives the chain head from the durable tail.
    ///
    /// Resume rehashes only the last stored line; it deliberately does
    /// not verify the whole chain, which is the verifier's job and
    /// would cost a full replay on every boot.
    fn resume_from(mut log: BlockLog<D>, config: LoggerConfig) -> Result<Self, LogError> {
        let content = log.read_all()?;
        let text = std::str::from_utf8(&content).map_err(|e| LogError::InvalidUtf8 {
            offset: e.valid_up_to() as u64,
        })?;

        let mut lines = text.lines();
        let header = lines.next().unwrap_or("");
        if header != SCHEMA_HEADER {
            return Err(LogError::SchemaMismatch {
                found: header.to_string(),
            });
        }

        let mut records = 0u64;
        let mut last = None;
        for line in lines {
            records += 1;
            last = Some(line);
        }

        // Header-only log: the chain has not started yet.
        let head = match last {
            Some(line) => line_hash(line),
            None => GENESIS,
        };

        tracing::info!(records, head = %head, "log resumed");
        Ok(Self {
            log,
            config,
            head,
            next_index: RecordIndex::new(records),
            pending: Vec::new(),
        })
    }

    /// Chains a sample onto the log and returns its record index.
    ///
    /// The record becomes durable at the next flush, which this call
    /// performs itself once the batch threshold is reached.
    pub fn append(&mut self, sample: &Sample) -> Result<RecordIndex, LogError> {
        let record = LogRecord::from_sample(sample, self.head);
        let line = record.canonical_line();
        self.head = line_hash(&line);

        let index = self.next_index;
        self.next_index += 1;
        self.pending.push(line);

        if self.pending.len() >= self.config.batch_threshold {
            self.flush()?;
        }
        Ok(index)
    }

    /// Writes all buffered records to the device.
    ///
    /// On failure the buffer is kept intact, so a later flush retries
    /// the same records in the same order.
    pub fn flush(&mut self) -> Result<(), LogError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut batch = String::new();
        for line in &self.pending {
            batch.push_str(line);
            batch.push('\n');
        }
        self.log.append(batch.as_bytes())?;

        tracing::debug!(records = self.pending.len(), "batch flushed");
        self.pending.clear();
        Ok(())
    }

    /// Current chain head: the prev_hash the next record will carry.
    pub fn head(&self) -> ChainHash {
        self.head
    }

    /// Records buffered but not yet durable.
    pub fn pending_records(&self) -> usize {
        self.pending.len()
    }

    /// Index the next appended record will receive.
    pub fn next_index(&self) -> RecordIndex {
        self.next_index
    }

    /// Reads the durable log content (excluding buffered records).
    pub fn read_durable(&mut self) -> Result<Bytes, LogError> {
        self.log.read_all()
    }

    /// Releases the device, discarding any buffered records.
    pub fn into_device(self) -> D {
        self.log.into_device()
    }
}
