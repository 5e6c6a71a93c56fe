//! Card bring-up state machine and block-granular I/O.
//!
//! Bring-up is a linear negotiation with one bounded retry loop:
//!
//! ```text
//! BusReset → GoIdle (CMD0) → ProbeInterface (CMD8)
//!     → OperatingConditionPoll (CMD55+ACMD41, ≤1s)
//!     → OCRRead (CMD58, v2 only) → SetBlockLength (CMD16) → Ready
//! ```
//!
//! The probe step determines the card family; the OCR read determines
//! whether block arguments are byte addresses or block indices. Both
//! are fixed in [`CardIdentity`] for the life of the session.

use std::time::Duration;

use fv_types::BlockIndex;

use crate::bus::{BusSpeed, Clock, SpiBus, poll_until};
use crate::device::{BLOCK_SIZE, BlockDevice};
use crate::error::{CardError, InitError};
use crate::frame::{
    BUS_IDLE, CHECKSUM_GO_IDLE, CHECKSUM_PLACEHOLDER, CHECKSUM_SEND_IF_COND, CommandFrame,
    DATA_ACCEPTED, DATA_RESPONSE_MASK, IF_COND_CHECK_PATTERN, OCR_CAPACITY_BIT,
    OP_COND_HIGH_CAPACITY, R1Response, RESET_IDLE_BYTES, START_BLOCK_TOKEN, opcode,
};

/// Window for a response token to follow a command.
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);

/// Window for the operating-condition negotiation to leave idle state.
const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Window for the start-of-block token on a read.
const READ_TOKEN_TIMEOUT: Duration = Duration::from_millis(200);

/// Window for the card to leave busy after accepting a write.
const WRITE_READY_TIMEOUT: Duration = Duration::from_millis(500);

/// Capacity reported to the block layer.
///
/// Register-level capacity discovery is out of scope for this driver
/// generation; the append log bounds itself against this nominal size.
const NOMINAL_CAPACITY_BLOCKS: u64 = 8 * 1024 * 1024;

/// Protocol generation discovered by the interface-condition probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFamily {
    /// Pre-v2 card: rejects CMD8 as an illegal command.
    Legacy,
    /// v2 card: echoes the CMD8 check pattern, may be high-capacity.
    Version2,
}

/// How a logical block index is turned into a command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Argument is the byte offset (index × 512).
    Byte,
    /// Argument is the block index itself (high-capacity cards).
    Block,
}

/// What bring-up learned about the card. Immutable once Ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardIdentity {
    pub family: CardFamily,
    pub addressing: Addressing,
}

/// Driver for a removable flash card on an SPI bus.
///
/// Constructed by [`SdCard::connect`], which runs the full negotiation
/// and fails with a fatal [`InitError`] on any deviation. Afterwards
/// the driver exposes single/multi block read and write; operational
/// failures are typed [`CardError`]s and are never retried internally.
#[derive(Debug)]
pub struct SdCard<B, C> {
    bus: B,
    clock: C,
    identity: CardIdentity,
}

impl<B: SpiBus, C: Clock> SdCard<B, C> {
    /// Negotiates with the card and returns a Ready driver.
    pub fn connect(mut bus: B, clock: C) -> Result<Self, InitError> {
        let identity = negotiate(&mut bus, &clock)?;

        // Negotiation done at reduced rate; raise to operating speed.
        bus.set_speed(BusSpeed::Operating);

        tracing::info!(?identity, "card ready");
        Ok(Self {
            bus,
            clock,
            identity,
        })
    }

    /// The identity established at bring-up.
    pub fn identity(&self) -> CardIdentity {
        self.identity
    }

    /// Converts a logical block index into a command argument.
    fn address(&self, block: BlockIndex) -> u32 {
        match self.identity.addressing {
            Addressing::Block => block.as_u64() as u32,
            Addressing::Byte => (block.as_u64() * BLOCK_SIZE as u64) as u32,
        }
    }

    fn command(&mut self, op: u8, argument: u32) -> Result<R1Response, CardError> {
        send_command(&mut self.bus, &self.clock, op, argument, CHECKSUM_PLACEHOLDER)
            .ok_or(CardError::NoResponse { opcode: op })
    }

    /// Reads one block into `buf` (which must be exactly 512 bytes).
    fn read_single(&mut self, block: BlockIndex, buf: &mut [u8]) -> Result<(), CardError> {
        let argument = self.address(block);

        self.bus.chip_select(true);

        let response = match self.command(opcode::READ_SINGLE_BLOCK, argument) {
            Ok(r) => r,
            Err(e) => {
                self.bus.chip_select(false);
                return Err(e);
            }
        };
        if !response.is_ready() {
            self.bus.chip_select(false);
            return Err(CardError::CommandFailed {
                opcode: opcode::READ_SINGLE_BLOCK,
                response,
            });
        }

        // The card streams idle bytes until the block is staged.
        let token = poll_until(&self.clock, READ_TOKEN_TIMEOUT, || {
            let byte = read_byte(&mut self.bus);
            (byte == START_BLOCK_TOKEN).then_some(())
        });
        if token.is_none() {
            self.bus.chip_select(false);
            return Err(CardError::ReadTimeout { block });
        }

        self.bus.read_into(buf, BUS_IDLE);

        // Trailing CRC is clocked through but not validated. Silent
        // corruption here is caught by the log's hash chain, not the
        // storage layer.
        let mut crc = [0u8; 2];
        self.bus.read_into(&mut crc, BUS_IDLE);

        self.bus.chip_select(false);
        Ok(())
    }

    /// Writes one 512-byte block from `data`.
    fn write_single(&mut self, block: BlockIndex, data: &[u8]) -> Result<(), CardError> {
        let argument = self.address(block);

        self.bus.chip_select(true);

        let response = match self.command(opcode::WRITE_BLOCK, argument) {
            Ok(r) => r,
            Err(e) => {
                self.bus.chip_select(false);
                return Err(e);
            }
        };
        if !response.is_ready() {
            self.bus.chip_select(false);
            return Err(CardError::CommandFailed {
                opcode: opcode::WRITE_BLOCK,
                response,
            });
        }

        self.bus.write(&[START_BLOCK_TOKEN]);
        self.bus.write(data);
        // Dummy CRC; transferred by convention, ignored by the card in
        // this mode.
        self.bus.write(&[BUS_IDLE, BUS_IDLE]);

        let token = poll_until(&self.clock, RESPONSE_TIMEOUT, || {
            let byte = read_byte(&mut self.bus);
            (byte != BUS_IDLE).then_some(byte)
        });
        let Some(token) = token else {
            self.bus.chip_select(false);
            return Err(CardError::NoResponse {
                opcode: opcode::WRITE_BLOCK,
            });
        };
        if token & DATA_RESPONSE_MASK != DATA_ACCEPTED {
            self.bus.chip_select(false);
            return Err(CardError::WriteRejected { block, token });
        }

        // Busy: the card holds the line low until programming finishes.
        let ready = poll_until(&self.clock, WRITE_READY_TIMEOUT, || {
            (read_byte(&mut self.bus) == BUS_IDLE).then_some(())
        });
        self.bus.chip_select(false);

        match ready {
            Some(()) => Ok(()),
            None => Err(CardError::WriteTimeout { block }),
        }
    }
}

impl<B: SpiBus, C: Clock> BlockDevice for SdCard<B, C> {
    fn block_count(&self) -> u64 {
        NOMINAL_CAPACITY_BLOCKS
    }

    fn read_blocks(&mut self, start: BlockIndex, buf: &mut [u8]) -> Result<(), CardError> {
        assert!(
            !buf.is_empty() && buf.len() % BLOCK_SIZE == 0,
            "read buffer must be a non-zero multiple of {BLOCK_SIZE} bytes"
        );

        // Multi-block transfers are a sequence of independently
        // addressed single-block reads.
        let mut block = start;
        for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.read_single(block, chunk)?;
            block += 1;
        }
        Ok(())
    }

    fn write_blocks(&mut self, start: BlockIndex, data: &[u8]) -> Result<(), CardError> {
        assert!(
            !data.is_empty() && data.len() % BLOCK_SIZE == 0,
            "write buffer must be a non-zero multiple of {BLOCK_SIZE} bytes"
        );

        let mut block = start;
        for chunk in data.chunks_exact(BLOCK_SIZE) {
            self.write_single(block, chunk)?;
            block += 1;
        }
        Ok(())
    }
}

// ============================================================================
// Bring-up
// ============================================================================

/// Runs the negotiation state machine at reduced bus speed.
fn negotiate<B: SpiBus, C: Clock>(bus: &mut B, clock: &C) -> Result<CardIdentity, InitError> {
    // BusReset: with the card deselected, clock out idle bytes so the
    // card's state machine synchronizes to the bus.
    bus.chip_select(false);
    bus.set_speed(BusSpeed::Init);
    bus.write(&[BUS_IDLE; RESET_IDLE_BYTES]);

    // GoIdle: CMD0 must be answered with exactly the idle flag.
    bus.chip_select(true);
    let response = send_command(bus, clock, opcode::GO_IDLE_STATE, 0, CHECKSUM_GO_IDLE)
        .ok_or(InitError::Unresponsive {
            opcode: opcode::GO_IDLE_STATE,
        })?;
    bus.chip_select(false);
    if response != R1Response::IDLE_STATE {
        return Err(InitError::NoIdleState { response });
    }
    tracing::debug!("card entered idle state");

    // ProbeInterface: CMD8 distinguishes v2 cards (echo the pattern)
    // from legacy cards (illegal command).
    bus.chip_select(true);
    let response = send_command(
        bus,
        clock,
        opcode::SEND_IF_COND,
        IF_COND_CHECK_PATTERN,
        CHECKSUM_SEND_IF_COND,
    )
    .ok_or(InitError::Unresponsive {
        opcode: opcode::SEND_IF_COND,
    })?;

    let family = if response == R1Response::IDLE_STATE {
        let mut payload = [0u8; 4];
        bus.read_into(&mut payload, BUS_IDLE);
        bus.chip_select(false);
        // Bytes 2-3 echo the voltage nibble and check pattern.
        if payload[2] != 0x01 || payload[3] != 0xAA {
            return Err(InitError::InterfaceMismatch { payload });
        }
        CardFamily::Version2
    } else if response == R1Response::IDLE_STATE | R1Response::ILLEGAL_COMMAND {
        bus.chip_select(false);
        CardFamily::Legacy
    } else {
        bus.chip_select(false);
        return Err(InitError::UnsupportedCard { response });
    };
    tracing::debug!(?family, "interface condition probed");

    // OperatingConditionPoll: CMD55+ACMD41 until the card reports
    // not-idle. High-capacity support is only advertised to v2 cards.
    let op_cond_arg = match family {
        CardFamily::Version2 => OP_COND_HIGH_CAPACITY,
        CardFamily::Legacy => 0,
    };
    let ready = poll_until(clock, NEGOTIATION_TIMEOUT, || {
        bus.chip_select(true);
        let prefix = send_command(bus, clock, opcode::APP_CMD, 0, CHECKSUM_PLACEHOLDER);
        let ready = match prefix {
            Some(r) if r == R1Response::IDLE_STATE || r.is_ready() => send_command(
                bus,
                clock,
                opcode::APP_SEND_OP_COND,
                op_cond_arg,
                CHECKSUM_PLACEHOLDER,
            )
            .is_some_and(|r| r.is_ready()),
            _ => false,
        };
        bus.chip_select(false);
        ready.then_some(())
    });
    if ready.is_none() {
        return Err(InitError::NegotiationTimeout);
    }
    tracing::debug!("card left idle state");

    // OCRRead: only v2 cards can be high-capacity; the OCR capacity
    // bit selects the addressing mode.
    let addressing = match family {
        CardFamily::Legacy => Addressing::Byte,
        CardFamily::Version2 => {
            bus.chip_select(true);
            let response = send_command(bus, clock, opcode::READ_OCR, 0, CHECKSUM_PLACEHOLDER)
                .ok_or(InitError::Unresponsive {
                    opcode: opcode::READ_OCR,
                })?;
            let mut ocr = [0u8; 4];
            bus.read_into(&mut ocr, BUS_IDLE);
            bus.chip_select(false);

            if !response.is_ready() {
                return Err(InitError::UnsupportedCard { response });
            }
            if ocr[0] & OCR_CAPACITY_BIT != 0 {
                Addressing::Block
            } else {
                Addressing::Byte
            }
        }
    };

    // SetBlockLength: pin the transfer unit to 512 bytes. Block
    // addressed cards fix this anyway; byte-addressed cards need it.
    bus.chip_select(true);
    let response = send_command(
        bus,
        clock,
        opcode::SET_BLOCKLEN,
        BLOCK_SIZE as u32,
        CHECKSUM_PLACEHOLDER,
    )
    .ok_or(InitError::Unresponsive {
        opcode: opcode::SET_BLOCKLEN,
    })?;
    bus.chip_select(false);
    if !response.is_ready() {
        return Err(InitError::BlockLengthRejected { response });
    }

    Ok(CardIdentity { family, addressing })
}

/// Sends one command frame and polls for its R1 token.
///
/// Returns `None` if no token (byte with the high bit clear) arrives
/// within the command window.
fn send_command<B: SpiBus, C: Clock>(
    bus: &mut B,
    clock: &C,
    op: u8,
    argument: u32,
    checksum: u8,
) -> Option<R1Response> {
    let frame = CommandFrame::new(op, argument, checksum);
    bus.write(&frame.encode());

    poll_until(clock, RESPONSE_TIMEOUT, || {
        R1Response::from_wire(read_byte(bus))
    })
}

fn read_byte<B: SpiBus>(bus: &mut B) -> u8 {
    let mut byte = [BUS_IDLE];
    bus.read_into(&mut byte, BUS_IDLE);
    byte[0]
}
