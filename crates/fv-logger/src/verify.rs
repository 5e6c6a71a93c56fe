//! Chain verification: replay the log and find the first divergence.

use fv_card::BlockDevice;
use fv_chain::{GENESIS, LogRecord, SCHEMA_HEADER, line_hash};
use fv_types::RecordIndex;

use crate::{BlockLog, LogError};

/// Outcome of replaying a log's hash chain.
///
/// Verification halts at the first divergence: everything before the
/// reported index is intact, everything from it onward is untrusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// Every record chains correctly to its predecessor.
    Verified {
        /// Number of records checked (header excluded).
        records: u64,
    },
    /// The first record does not carry the genesis sentinel.
    TamperedGenesis,
    /// The chain breaks at this record: its prev_hash disagrees with
    /// the digest of the stored predecessor line, or the line itself
    /// is structurally corrupt.
    Tampered { index: RecordIndex },
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Replays the hash chain over the log text.
///
/// The digest fed forward is computed over the *stored* line bytes,
/// not a re-serialization of the parsed record, so any byte-level
/// mutation of a historical line surfaces at its successor.
pub fn verify(text: &str) -> Result<VerificationResult, LogError> {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or("");
    if header != SCHEMA_HEADER {
        return Err(LogError::SchemaMismatch {
            found: header.to_string(),
        });
    }

    let mut expected = GENESIS;
    let mut records = 0u64;
    for (i, line) in lines.enumerate() {
        let index = RecordIndex::new(i as u64);

        let record = match LogRecord::parse(line) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(%index, %err, "structurally corrupt record");
                return Ok(VerificationResult::Tampered { index });
            }
        };

        if record.prev_hash != expected {
            return Ok(if i == 0 {
                VerificationResult::TamperedGenesis
            } else {
                VerificationResult::Tampered { index }
            });
        }

        expected = line_hash(line);
        records += 1;
    }

    tracing::debug!(records, "chain verified");
    Ok(VerificationResult::Verified { records })
}

/// Opens a device and verifies the log stored on it.
pub fn verify_device<D: BlockDevice>(device: D) -> Result<VerificationResult, LogError> {
    let mut log = BlockLog::open(device)?;
    let content = log.read_all()?;
    let text = std::str::from_utf8(&content).map_err(|e| LogError::InvalidUtf8 {
        offset: e.valid_up_to() as u64,
    })?;
    verify(text)
}
