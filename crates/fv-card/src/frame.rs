//! Wire-level protocol: command frames, response tokens and transfer
//! sentinels.
//!
//! A command is always exactly six bytes: `0x40 | opcode`, a big-endian
//! 32-bit argument, and a checksum byte. The checksum is only enforced
//! by cards for the two bring-up commands issued before CRC checking is
//! switched off; every other command carries a fixed placeholder.

use bitflags::bitflags;

// ============================================================================
// Opcodes
// ============================================================================

/// Command opcodes used by the driver (6-bit values).
pub mod opcode {
    /// CMD0: software reset into idle state.
    pub const GO_IDLE_STATE: u8 = 0;
    /// CMD8: interface condition probe (voltage range + check pattern).
    pub const SEND_IF_COND: u8 = 8;
    /// CMD16: set read/write block length.
    pub const SET_BLOCKLEN: u8 = 16;
    /// CMD17: read a single block.
    pub const READ_SINGLE_BLOCK: u8 = 17;
    /// CMD24: write a single block.
    pub const WRITE_BLOCK: u8 = 24;
    /// ACMD41: operating condition negotiation (after CMD55).
    pub const APP_SEND_OP_COND: u8 = 41;
    /// CMD55: application-command prefix for the following ACMD.
    pub const APP_CMD: u8 = 55;
    /// CMD58: read the operating condition register.
    pub const READ_OCR: u8 = 58;
}

// ============================================================================
// Fixed wire constants
// ============================================================================

/// Valid checksum for CMD0 with argument 0.
pub const CHECKSUM_GO_IDLE: u8 = 0x95;

/// Valid checksum for CMD8 with the standard check pattern argument.
pub const CHECKSUM_SEND_IF_COND: u8 = 0x87;

/// Placeholder checksum for commands where the card ignores it.
pub const CHECKSUM_PLACEHOLDER: u8 = 0x00;

/// CMD8 argument: 2.7-3.6 V range nibble plus the `0xAA` check pattern.
pub const IF_COND_CHECK_PATTERN: u32 = 0x1AA;

/// ACMD41 argument bit advertising high-capacity host support.
pub const OP_COND_HIGH_CAPACITY: u32 = 0x4000_0000;

/// Capacity bit in byte 0 of the OCR payload: set means the card uses
/// block addressing.
pub const OCR_CAPACITY_BIT: u8 = 0x40;

/// Sentinel preceding every 512-byte data block on the wire.
pub const START_BLOCK_TOKEN: u8 = 0xFE;

/// What an idle bus reads as; also the fill byte clocked out while
/// receiving.
pub const BUS_IDLE: u8 = 0xFF;

/// Mask isolating the status nibble of a data-response token.
pub const DATA_RESPONSE_MASK: u8 = 0x1F;

/// Data-response status meaning the block was accepted for programming.
pub const DATA_ACCEPTED: u8 = 0x05;

/// Number of idle bytes clocked out at reduced speed before reset.
pub const RESET_IDLE_BYTES: usize = 10;

// ============================================================================
// Command frame
// ============================================================================

/// A six-byte command as sent over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// 6-bit command index.
    pub opcode: u8,
    /// 32-bit argument, big-endian on the wire.
    pub argument: u32,
    /// Checksum byte; meaningful only for CMD0 and CMD8.
    pub checksum: u8,
}

impl CommandFrame {
    pub fn new(opcode: u8, argument: u32, checksum: u8) -> Self {
        debug_assert!(opcode < 0x40, "opcode is a 6-bit value");
        Self {
            opcode,
            argument,
            checksum,
        }
    }

    /// Encodes the frame into its six wire bytes.
    pub fn encode(&self) -> [u8; 6] {
        let arg = self.argument.to_be_bytes();
        [
            0x40 | self.opcode,
            arg[0],
            arg[1],
            arg[2],
            arg[3],
            self.checksum,
        ]
    }

    /// Decodes six wire bytes back into a frame.
    ///
    /// Returns `None` unless the start/transmission bits are the fixed
    /// `01` pattern of a host command. Used by the simulated card.
    pub fn decode(bytes: &[u8; 6]) -> Option<Self> {
        if bytes[0] & 0xC0 != 0x40 {
            return None;
        }
        Some(Self {
            opcode: bytes[0] & 0x3F,
            argument: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            checksum: bytes[5],
        })
    }
}

// ============================================================================
// Response token
// ============================================================================

bitflags! {
    /// R1 status token: one byte, high bit clear when valid.
    ///
    /// An empty mask is the "ready" response; `IDLE_STATE` alone is the
    /// expected state throughout bring-up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct R1Response: u8 {
        const IDLE_STATE           = 0x01;
        const ERASE_RESET          = 0x02;
        const ILLEGAL_COMMAND      = 0x04;
        const COM_CRC_ERROR        = 0x08;
        const ERASE_SEQUENCE_ERROR = 0x10;
        const ADDRESS_ERROR        = 0x20;
        const PARAMETER_ERROR      = 0x40;
    }
}

impl R1Response {
    /// Interprets a raw bus byte as an R1 token.
    ///
    /// Returns `None` while the card has not answered yet (high bit
    /// still set, i.e. the bus reads idle).
    pub fn from_wire(byte: u8) -> Option<Self> {
        if byte & 0x80 != 0 {
            return None;
        }
        Some(Self::from_bits_truncate(byte))
    }

    /// Whether the card reports ready (no status bits set).
    pub fn is_ready(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let frame = CommandFrame::new(opcode::SEND_IF_COND, IF_COND_CHECK_PATTERN, 0x87);
        assert_eq!(frame.encode(), [0x48, 0x00, 0x00, 0x01, 0xAA, 0x87]);
    }

    #[test]
    fn encode_decode_round_trip() {
        let frame = CommandFrame::new(opcode::WRITE_BLOCK, 0xDEAD_BEEF, CHECKSUM_PLACEHOLDER);
        let decoded = CommandFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_rejects_non_command_bytes() {
        // Idle bus bytes are not commands.
        assert_eq!(CommandFrame::decode(&[0xFF; 6]), None);
        // Transmission bit must be the host pattern.
        assert_eq!(CommandFrame::decode(&[0x11, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn r1_from_wire() {
        assert_eq!(R1Response::from_wire(0xFF), None);
        assert_eq!(R1Response::from_wire(0x01), Some(R1Response::IDLE_STATE));
        assert_eq!(
            R1Response::from_wire(0x05),
            Some(R1Response::IDLE_STATE | R1Response::ILLEGAL_COMMAND)
        );
        assert!(R1Response::from_wire(0x00).unwrap().is_ready());
    }
}
