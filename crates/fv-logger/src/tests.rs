//! Log writer and verifier scenarios over in-memory and simulated
//! storage: durability across restarts, batch-loss crash semantics,
//! and first-divergence tamper detection.

use fv_card::{BlockDevice, CardError, SdCard};
use fv_chain::{GENESIS, SCHEMA_HEADER, line_hash};
use fv_sim::{MemBlockDevice, SharedClock, SimCard, SimCardConfig};
use fv_types::{Activity, BlockIndex, RecordIndex, Sample};

use crate::{LogError, LogWriter, LoggerConfig, VerificationResult, verify, verify_device};

fn sample(i: u64) -> Sample {
    Sample {
        timestamp: format!("2026-03-14T09:{:02}:00", i % 60),
        rf_power_dbm: -60.0 - i as f64 * 0.25,
        lat: 51.470012 + i as f64 * 0.000001,
        lon: -0.454299,
        altitude_m: 24.7,
        activity: if i % 2 == 0 {
            Activity::Still
        } else {
            Activity::Moving
        },
    }
}

fn device() -> MemBlockDevice {
    MemBlockDevice::new(64)
}

/// Device that fails exactly one write (the `fail_on`-th, counting
/// from 1) and behaves normally afterwards. Models a transient card
/// error in the middle of a multi-block flush.
struct FlakyDevice {
    inner: MemBlockDevice,
    writes: usize,
    fail_on: Option<usize>,
}

impl FlakyDevice {
    fn new(block_count: u64, fail_on: usize) -> Self {
        Self {
            inner: MemBlockDevice::new(block_count),
            writes: 0,
            fail_on: Some(fail_on),
        }
    }
}

impl BlockDevice for FlakyDevice {
    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn read_blocks(&mut self, start: BlockIndex, buf: &mut [u8]) -> Result<(), CardError> {
        self.inner.read_blocks(start, buf)
    }

    fn write_blocks(&mut self, start: BlockIndex, data: &[u8]) -> Result<(), CardError> {
        self.writes += 1;
        if self.fail_on == Some(self.writes) {
            self.fail_on = None;
            return Err(CardError::WriteTimeout { block: start });
        }
        self.inner.write_blocks(start, data)
    }
}

fn durable_text(device: &MemBlockDevice) -> String {
    let end = device
        .data()
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(device.data().len());
    String::from_utf8(device.data()[..end].to_vec()).unwrap()
}

// ============================================================================
// Writer
// ============================================================================

#[test]
fn create_writes_schema_header() {
    let mut writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    assert_eq!(writer.head(), GENESIS);
    assert_eq!(writer.next_index(), RecordIndex::ZERO);

    let content = writer.read_durable().unwrap();
    assert_eq!(content.as_ref(), format!("{SCHEMA_HEADER}\n").as_bytes());
}

#[test]
fn create_refuses_populated_device() {
    let mut populated = device();
    populated.data_mut()[0] = b'x';

    let result = LogWriter::create(populated, LoggerConfig::default());
    assert!(matches!(result, Err(LogError::AlreadyInitialized { len: 1 })));
}

#[test]
fn first_record_carries_genesis() {
    let mut writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    writer.append(&sample(0)).unwrap();
    writer.flush().unwrap();

    let text = durable_text(&writer.into_device());
    let record_line = text.lines().nth(1).unwrap();
    assert!(record_line.ends_with(&"0".repeat(64)));
}

#[test]
fn records_chain_to_their_predecessor() {
    let mut writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    writer.append(&sample(0)).unwrap();
    writer.append(&sample(1)).unwrap();
    writer.flush().unwrap();

    let text = durable_text(&writer.into_device());
    let mut lines = text.lines().skip(1);
    let first = lines.next().unwrap();
    let second = lines.next().unwrap();

    let stored_prev = second.rsplit(',').next().unwrap();
    assert_eq!(stored_prev, line_hash(first).to_hex());
}

#[test]
fn flush_is_explicit_below_the_threshold() {
    let mut writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    for i in 0..5 {
        writer.append(&sample(i)).unwrap();
    }
    assert_eq!(writer.pending_records(), 5);

    // Nothing past the header is durable yet.
    let content = writer.read_durable().unwrap();
    assert_eq!(content.as_ref(), format!("{SCHEMA_HEADER}\n").as_bytes());

    writer.flush().unwrap();
    assert_eq!(writer.pending_records(), 0);
    let text = durable_text(&writer.into_device());
    assert_eq!(text.lines().count(), 6);
}

#[test]
fn threshold_triggers_automatic_flush() {
    let config = LoggerConfig::default().with_batch_threshold(3);
    let mut writer = LogWriter::create(device(), config).unwrap();

    writer.append(&sample(0)).unwrap();
    writer.append(&sample(1)).unwrap();
    assert_eq!(writer.pending_records(), 2);

    writer.append(&sample(2)).unwrap();
    assert_eq!(writer.pending_records(), 0);

    let text = durable_text(&writer.into_device());
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn flush_retry_after_partial_append_keeps_the_chain() {
    // The header is device write 1; a 12-record batch spans several
    // blocks, and the second block write of that flush fails. The
    // blocks already written must not survive as durable content, or
    // the retry would append the batch a second time after them.
    let device = FlakyDevice::new(64, 3);
    let mut writer = LogWriter::create(device, LoggerConfig::default()).unwrap();
    for i in 0..12 {
        writer.append(&sample(i)).unwrap();
    }

    assert!(matches!(writer.flush(), Err(LogError::Card(_))));
    assert_eq!(writer.pending_records(), 12);

    writer.flush().unwrap();
    assert_eq!(writer.pending_records(), 0);

    let device = writer.into_device();
    assert_eq!(
        verify_device(device.inner).unwrap(),
        VerificationResult::Verified { records: 12 }
    );
}

#[test]
fn capacity_exceeded_on_a_tiny_device() {
    let mut writer = LogWriter::create(MemBlockDevice::new(1), LoggerConfig::default()).unwrap();

    let mut result = Ok(());
    for i in 0..20 {
        writer.append(&sample(i)).unwrap();
        result = writer.flush();
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(
        result,
        Err(LogError::CapacityExceeded { capacity_blocks: 1 })
    ));
}

// ============================================================================
// Resume
// ============================================================================

#[test]
fn resume_continues_the_chain() {
    let mut writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    for i in 0..3 {
        writer.append(&sample(i)).unwrap();
    }
    writer.flush().unwrap();
    let device = writer.into_device();

    let mut resumed = LogWriter::resume(device, LoggerConfig::default()).unwrap();
    assert_eq!(resumed.next_index(), RecordIndex::new(3));
    for i in 3..6 {
        resumed.append(&sample(i)).unwrap();
    }
    resumed.flush().unwrap();

    let result = verify_device(resumed.into_device()).unwrap();
    assert_eq!(result, VerificationResult::Verified { records: 6 });
}

#[test]
fn resume_on_header_only_log_starts_at_genesis() {
    let writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    let resumed = LogWriter::resume(writer.into_device(), LoggerConfig::default()).unwrap();

    assert_eq!(resumed.head(), GENESIS);
    assert_eq!(resumed.next_index(), RecordIndex::ZERO);
}

#[test]
fn resume_rejects_foreign_schema() {
    let mut foreign = device();
    let header = b"time,value\n";
    foreign.data_mut()[..header.len()].copy_from_slice(header);

    let result = LogWriter::resume(foreign, LoggerConfig::default());
    match result {
        Err(LogError::SchemaMismatch { found }) => assert_eq!(found, "time,value"),
        other => panic!("expected schema mismatch, got {other:?}"),
    }
}

#[test]
fn crash_forfeits_only_the_unflushed_batch() {
    let config = LoggerConfig::default().with_batch_threshold(20);
    let mut writer = LogWriter::create(device(), config).unwrap();
    for i in 0..25 {
        writer.append(&sample(i)).unwrap();
    }
    // Records 0..19 flushed at the threshold; 20..24 still buffered.
    assert_eq!(writer.pending_records(), 5);

    // Crash: drop the writer without flushing.
    let device = writer.into_device();
    assert_eq!(
        verify_device(device.clone()).unwrap(),
        VerificationResult::Verified { records: 20 }
    );

    // The survivor resumes from the durable head and stays verifiable.
    let mut resumed = LogWriter::resume(device, LoggerConfig::default()).unwrap();
    assert_eq!(resumed.next_index(), RecordIndex::new(20));
    resumed.append(&sample(99)).unwrap();
    resumed.flush().unwrap();
    assert_eq!(
        verify_device(resumed.into_device()).unwrap(),
        VerificationResult::Verified { records: 21 }
    );
}

// ============================================================================
// Verification
// ============================================================================

/// A verified device with `n` flushed records.
fn populated_device(n: u64) -> MemBlockDevice {
    let mut writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    for i in 0..n {
        writer.append(&sample(i)).unwrap();
    }
    writer.flush().unwrap();
    writer.into_device()
}

/// Byte offset of record line `index` (0-based, after the header).
fn record_offset(device: &MemBlockDevice, index: usize) -> usize {
    let text = durable_text(device);
    let mut offset = 0;
    for (i, line) in text.lines().enumerate() {
        if i == index + 1 {
            return offset;
        }
        offset += line.len() + 1;
    }
    panic!("record {index} not present");
}

#[test]
fn empty_log_verifies_with_zero_records() {
    let writer = LogWriter::create(device(), LoggerConfig::default()).unwrap();
    let result = verify_device(writer.into_device()).unwrap();
    assert_eq!(result, VerificationResult::Verified { records: 0 });
}

#[test]
fn verification_is_idempotent() {
    let device = populated_device(8);
    let first = verify_device(device.clone()).unwrap();
    let second = verify_device(device).unwrap();
    assert_eq!(first, VerificationResult::Verified { records: 8 });
    assert_eq!(first, second);
}

#[test]
fn modified_record_surfaces_at_its_successor() {
    let mut device = populated_device(8);

    // Flip a digit inside record 3's timestamp. Record 3 still parses
    // and still carries a matching prev_hash; its *successor* is the
    // first record whose prev_hash no longer matches the stored bytes.
    let offset = record_offset(&device, 3);
    let byte = &mut device.data_mut()[offset + 12];
    *byte = if *byte == b'0' { b'1' } else { b'0' };

    let result = verify_device(device).unwrap();
    assert_eq!(
        result,
        VerificationResult::Tampered {
            index: RecordIndex::new(4)
        }
    );
}

#[test]
fn modified_prev_hash_surfaces_at_the_record_itself() {
    let mut device = populated_device(8);

    // The prev_hash field is the line's last 64 characters.
    let line_end = record_offset(&device, 6) - 1; // newline of record 5
    let hash_byte = &mut device.data_mut()[line_end - 1];
    *hash_byte = if *hash_byte == b'a' { b'b' } else { b'a' };

    let result = verify_device(device).unwrap();
    assert_eq!(
        result,
        VerificationResult::Tampered {
            index: RecordIndex::new(5)
        }
    );
}

#[test]
fn forged_genesis_is_reported_distinctly() {
    let mut device = populated_device(3);

    let offset = record_offset(&device, 0);
    let text = durable_text(&device);
    let line_len = text.lines().nth(1).unwrap().len();
    // Last character of record 0's genesis hash field.
    device.data_mut()[offset + line_len - 1] = b'1';

    let result = verify_device(device).unwrap();
    assert_eq!(result, VerificationResult::TamperedGenesis);
}

#[test]
fn structurally_corrupt_record_is_tampered_at_its_index() {
    let mut device = populated_device(5);

    // Replace record 2's first field separator with garbage; the
    // timestamp field alone is 19 characters.
    let offset = record_offset(&device, 2);
    for byte in &mut device.data_mut()[offset..offset + 25] {
        if *byte == b',' {
            *byte = b';';
        }
    }

    let result = verify_device(device).unwrap();
    assert_eq!(
        result,
        VerificationResult::Tampered {
            index: RecordIndex::new(2)
        }
    );
}

#[test]
fn deleted_record_breaks_the_chain() {
    let device = populated_device(5);
    let text = durable_text(&device);

    // Splice record 2 out of the text entirely.
    let spliced: Vec<&str> = text
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 3)
        .map(|(_, line)| line)
        .collect();
    let spliced = spliced.join("\n");

    let result = verify(&spliced).unwrap();
    assert_eq!(
        result,
        VerificationResult::Tampered {
            index: RecordIndex::new(2)
        }
    );
}

#[test]
fn verify_rejects_foreign_header() {
    assert!(matches!(
        verify("time,value\n1,2"),
        Err(LogError::SchemaMismatch { .. })
    ));
}

// ============================================================================
// Full stack: writer over the card driver over the simulated card
// ============================================================================

#[test]
fn end_to_end_over_simulated_card() {
    let clock = SharedClock::new();
    let card = SimCard::new(SimCardConfig::high_capacity(), clock.clone());
    let driver = SdCard::connect(card, clock.clone()).unwrap();

    let config = LoggerConfig::default().with_batch_threshold(4);
    let mut writer = LogWriter::open(driver, config).unwrap();
    for i in 0..10 {
        writer.append(&sample(i)).unwrap();
    }
    writer.flush().unwrap();
    let driver = writer.into_device();

    let result = verify_device(driver).unwrap();
    assert_eq!(result, VerificationResult::Verified { records: 10 });
}
