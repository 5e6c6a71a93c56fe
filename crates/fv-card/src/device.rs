//! Block device abstraction consumed by the log layer.

use fv_types::BlockIndex;

use crate::CardError;

/// Unit of read/write addressing: every transfer is a whole number of
/// 512-byte blocks.
pub const BLOCK_SIZE: usize = 512;

/// Fixed-size block read/write interface.
///
/// Implemented by the real [`SdCard`](crate::SdCard) driver and by the
/// in-memory device in the simulation harness. Buffer lengths must be
/// a non-zero multiple of [`BLOCK_SIZE`]; a violation is a caller bug,
/// not an I/O error.
pub trait BlockDevice {
    /// Number of addressable blocks on the device.
    fn block_count(&self) -> u64;

    /// Reads `buf.len() / 512` blocks starting at `start` into `buf`.
    fn read_blocks(&mut self, start: BlockIndex, buf: &mut [u8]) -> Result<(), CardError>;

    /// Writes `data.len() / 512` blocks starting at `start`.
    fn write_blocks(&mut self, start: BlockIndex, data: &[u8]) -> Result<(), CardError>;
}
