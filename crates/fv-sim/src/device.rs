//! In-memory block device for log-layer tests that do not need the
//! wire protocol underneath.

use fv_card::{BLOCK_SIZE, BlockDevice, CardError};
use fv_types::BlockIndex;

/// A `BlockDevice` backed by a flat zero-initialised buffer.
///
/// Reads and writes always succeed; out-of-range access is a caller
/// bug and panics, mirroring how the driver asserts its preconditions.
#[derive(Debug, Clone)]
pub struct MemBlockDevice {
    data: Vec<u8>,
}

impl MemBlockDevice {
    pub fn new(block_count: u64) -> Self {
        Self {
            data: vec![0u8; block_count as usize * BLOCK_SIZE],
        }
    }

    /// Raw device contents, for direct assertions and tampering.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn byte_range(&self, start: BlockIndex, len: usize) -> std::ops::Range<usize> {
        assert!(len > 0 && len % BLOCK_SIZE == 0, "transfer is whole blocks");
        let offset = start.as_u64() as usize * BLOCK_SIZE;
        assert!(
            offset + len <= self.data.len(),
            "transfer past end of device"
        );
        offset..offset + len
    }
}

impl BlockDevice for MemBlockDevice {
    fn block_count(&self) -> u64 {
        (self.data.len() / BLOCK_SIZE) as u64
    }

    fn read_blocks(&mut self, start: BlockIndex, buf: &mut [u8]) -> Result<(), CardError> {
        let range = self.byte_range(start, buf.len());
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_blocks(&mut self, start: BlockIndex, data: &[u8]) -> Result<(), CardError> {
        let range = self.byte_range(start, data.len());
        self.data[range].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialised() {
        let mut device = MemBlockDevice::new(4);
        let mut buf = [0xAAu8; BLOCK_SIZE];
        device.read_blocks(BlockIndex::new(3), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_then_read_back() {
        let mut device = MemBlockDevice::new(4);
        let data = [0x5Au8; BLOCK_SIZE * 2];
        device.write_blocks(BlockIndex::new(1), &data).unwrap();

        let mut buf = [0u8; BLOCK_SIZE * 2];
        device.read_blocks(BlockIndex::new(1), &mut buf).unwrap();
        assert_eq!(buf, data);

        // Neighbouring blocks untouched.
        let mut edge = [0u8; BLOCK_SIZE];
        device.read_blocks(BlockIndex::new(0), &mut edge).unwrap();
        assert!(edge.iter().all(|&b| b == 0));
    }
}
