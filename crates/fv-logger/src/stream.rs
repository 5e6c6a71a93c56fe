//! Byte-stream view over a block device.
//!
//! The log occupies the device from block 0 upward as a contiguous
//! run of text terminated by the first NUL byte. Blocks are erased to
//! zero, so the terminator is simply the first byte never written;
//! there is no separate superblock or length field to keep in sync
//! with the data.

use bytes::{Bytes, BytesMut};
use fv_card::{BLOCK_SIZE, BlockDevice};
use fv_types::BlockIndex;

use crate::LogError;

/// Blocks fetched per read while scanning for the end of the log.
const SCAN_CHUNK_BLOCKS: usize = 8;

/// Append-only byte stream stored on a [`BlockDevice`].
///
/// [`open`](BlockLog::open) locates the end of existing content by
/// scanning for the first NUL byte; [`append`](BlockLog::append)
/// extends the stream with a read-modify-write of the tail block. The
/// stream itself is encoding-agnostic; the writer above it guarantees
/// the content is newline-separated text that never contains NUL.
#[derive(Debug)]
pub struct BlockLog<D> {
    device: D,
    /// Offset of the first NUL byte, i.e. bytes of content.
    len: u64,
}

impl<D: BlockDevice> BlockLog<D> {
    /// Opens the stream, scanning the device for the end of content.
    pub fn open(mut device: D) -> Result<Self, LogError> {
        let len = scan_end(&mut device)?;
        tracing::debug!(len, "log stream opened");
        Ok(Self { device, len })
    }

    /// Bytes of content currently durable on the device.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total bytes the device can hold.
    pub fn capacity_bytes(&self) -> u64 {
        self.device.block_count() * BLOCK_SIZE as u64
    }

    /// Reads the entire content of the stream.
    pub fn read_all(&mut self) -> Result<Bytes, LogError> {
        if self.len == 0 {
            return Ok(Bytes::new());
        }
        let blocks = self.len.div_ceil(BLOCK_SIZE as u64);
        let mut buf = BytesMut::zeroed((blocks as usize) * BLOCK_SIZE);
        self.device.read_blocks(BlockIndex::ZERO, &mut buf)?;
        buf.truncate(self.len as usize);
        Ok(buf.freeze())
    }

    /// Appends `data` to the end of the stream.
    ///
    /// The tail block is read, merged and rewritten; subsequent full
    /// blocks are written directly. `data` must not contain NUL, which
    /// would truncate the stream on the next open.
    ///
    /// All-or-nothing at the length level: on any device error the
    /// logical length rolls back to where it was, so a retried append
    /// overwrites whatever a failed attempt left behind instead of
    /// extending past it.
    pub fn append(&mut self, data: &[u8]) -> Result<(), LogError> {
        debug_assert!(!data.is_empty(), "empty append");
        debug_assert!(
            !data.contains(&0),
            "NUL in log content would act as a terminator"
        );

        if self.len + data.len() as u64 > self.capacity_bytes() {
            return Err(LogError::CapacityExceeded {
                capacity_blocks: self.device.block_count(),
            });
        }

        let checkpoint = self.len;
        let result = self.append_blocks(data);
        if result.is_err() {
            self.len = checkpoint;
        }
        result
    }

    fn append_blocks(&mut self, data: &[u8]) -> Result<(), LogError> {
        let mut remaining = data;
        while !remaining.is_empty() {
            let block = BlockIndex::new(self.len / BLOCK_SIZE as u64);
            let offset = (self.len % BLOCK_SIZE as u64) as usize;

            let mut scratch = [0u8; BLOCK_SIZE];
            if offset > 0 {
                self.device.read_blocks(block, &mut scratch)?;
            }

            let take = (BLOCK_SIZE - offset).min(remaining.len());
            scratch[offset..offset + take].copy_from_slice(&remaining[..take]);
            self.device.write_blocks(block, &scratch)?;

            self.len += take as u64;
            remaining = &remaining[take..];
        }
        Ok(())
    }

    /// Direct access to the underlying device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }
}

/// Finds the offset of the first NUL byte on the device.
///
/// A device with no NUL at all is completely full; content then runs
/// to the last byte.
fn scan_end<D: BlockDevice>(device: &mut D) -> Result<u64, LogError> {
    let total = device.block_count();
    let mut buf = vec![0u8; SCAN_CHUNK_BLOCKS * BLOCK_SIZE];

    let mut block = 0u64;
    while block < total {
        let count = SCAN_CHUNK_BLOCKS.min((total - block) as usize);
        let chunk = &mut buf[..count * BLOCK_SIZE];
        device.read_blocks(BlockIndex::new(block), chunk)?;

        if let Some(pos) = chunk.iter().position(|&b| b == 0) {
            return Ok(block * BLOCK_SIZE as u64 + pos as u64);
        }
        block += count as u64;
    }
    Ok(total * BLOCK_SIZE as u64)
}
