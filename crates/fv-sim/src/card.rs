//! Simulated SPI flash card for deterministic driver testing.
//!
//! `SimCard` sits on the far end of the bus trait: it decodes the six
//! byte command frames the driver writes, runs the same idle/ready
//! state machine a real card runs, and produces R1 tokens, payloads
//! and data blocks on the in-line. Protocol faults are injected by
//! configuration, never by chance, so every failing scenario names the
//! deviation it tested.
//!
//! Every transferred byte advances the shared simulated clock, which
//! is how the driver's wall-clock timeouts expire without real time
//! passing.

use std::collections::{HashMap, VecDeque};

use fv_card::frame::{
    BUS_IDLE, CHECKSUM_GO_IDLE, CHECKSUM_SEND_IF_COND, CommandFrame, IF_COND_CHECK_PATTERN,
    OCR_CAPACITY_BIT, R1Response, START_BLOCK_TOKEN, opcode,
};
use fv_card::{BLOCK_SIZE, BusSpeed, SpiBus};
use fv_types::BlockIndex;

use crate::SharedClock;

// ============================================================================
// Configuration
// ============================================================================

/// Which kind of card the simulation presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardVariant {
    /// Pre-v2 card: CMD8 is an illegal command, byte addressing.
    Legacy,
    /// v2 card without the OCR capacity bit: byte addressing.
    StandardCapacity,
    /// v2 card with the OCR capacity bit: block addressing.
    HighCapacity,
}

/// Configuration for simulated card behaviour and fault injection.
#[derive(Debug, Clone)]
pub struct SimCardConfig {
    /// Card variant to present during bring-up.
    pub variant: CardVariant,
    /// Addressable capacity in 512-byte blocks.
    pub capacity_blocks: u64,
    /// Simulated time per transferred byte, in nanoseconds.
    pub byte_time_ns: u64,
    /// Idle bytes clocked before every R1 token.
    pub response_delay_bytes: usize,
    /// Idle bytes clocked before a start-of-block token.
    pub read_latency_bytes: usize,
    /// Busy reads after an accepted write before ready.
    pub busy_reads: u64,
    /// Fault: never answer any command (dead card).
    pub mute: bool,
    /// Fault: operating-condition negotiation never leaves idle.
    pub never_ready: bool,
    /// Negotiation polls answered idle before reporting ready.
    pub ready_after_polls: u64,
    /// Fault: CMD8 echoes the wrong check pattern.
    pub bad_interface_echo: bool,
    /// Fault: reads never produce a start-of-block token.
    pub starve_read_token: bool,
    /// Fault: every write's data-response is the error nibble.
    pub reject_writes: bool,
    /// Fault: writes are accepted but busy never clears.
    pub busy_forever: bool,
}

impl Default for SimCardConfig {
    fn default() -> Self {
        Self {
            variant: CardVariant::HighCapacity,
            capacity_blocks: 1024,
            byte_time_ns: 10_000, // 10 µs per byte
            response_delay_bytes: 1,
            read_latency_bytes: 2,
            busy_reads: 4,
            mute: false,
            never_ready: false,
            ready_after_polls: 2,
            bad_interface_echo: false,
            starve_read_token: false,
            reject_writes: false,
            busy_forever: false,
        }
    }
}

impl SimCardConfig {
    /// A well-behaved high-capacity (block addressed) card.
    pub fn high_capacity() -> Self {
        Self::default()
    }

    /// A well-behaved v2 standard-capacity (byte addressed) card.
    pub fn standard_capacity() -> Self {
        Self {
            variant: CardVariant::StandardCapacity,
            ..Self::default()
        }
    }

    /// A well-behaved legacy (byte addressed) card.
    pub fn legacy() -> Self {
        Self {
            variant: CardVariant::Legacy,
            ..Self::default()
        }
    }

    pub fn with_capacity_blocks(mut self, blocks: u64) -> Self {
        self.capacity_blocks = blocks;
        self
    }

    pub fn with_mute(mut self) -> Self {
        self.mute = true;
        self
    }

    pub fn with_never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    pub fn with_bad_interface_echo(mut self) -> Self {
        self.bad_interface_echo = true;
        self
    }

    pub fn with_starved_read_token(mut self) -> Self {
        self.starve_read_token = true;
        self
    }

    pub fn with_rejected_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    pub fn with_busy_forever(mut self) -> Self {
        self.busy_forever = true;
        self
    }
}

/// Counters for scenario assertions.
#[derive(Debug, Clone, Default)]
pub struct SimCardStats {
    /// Complete command frames decoded.
    pub commands: u64,
    /// Blocks streamed out.
    pub blocks_read: u64,
    /// Blocks programmed.
    pub blocks_written: u64,
}

// ============================================================================
// Simulated card
// ============================================================================

/// What the card is currently doing with incoming bytes.
#[derive(Debug)]
enum Mode {
    /// Accumulating a six-byte command frame.
    Command,
    /// Receiving a write: start token + 512 data bytes + 2 CRC bytes.
    ReceiveBlock { index: u64, received: Vec<u8> },
}

/// In-memory SPI flash card model.
///
/// Implements [`SpiBus`] directly: the card *is* the far end of the
/// transport, so the driver under test is wired to it with no adapter
/// in between.
#[derive(Debug)]
pub struct SimCard {
    config: SimCardConfig,
    clock: SharedClock,
    speed: BusSpeed,
    selected: bool,
    mode: Mode,
    cmd_buf: Vec<u8>,
    output: VecDeque<u8>,
    /// Remaining reads answered with a busy (non-idle) byte.
    busy_remaining: u64,
    /// CMD55 seen; the next command is an ACMD.
    app_cmd: bool,
    /// Card still in idle state (bring-up incomplete).
    idle: bool,
    /// ACMD41 polls answered so far.
    op_cond_polls: u64,
    blocks: HashMap<u64, [u8; BLOCK_SIZE]>,
    stats: SimCardStats,
}

impl SimCard {
    pub fn new(config: SimCardConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            speed: BusSpeed::Init,
            selected: false,
            mode: Mode::Command,
            cmd_buf: Vec::with_capacity(6),
            output: VecDeque::new(),
            busy_remaining: 0,
            app_cmd: false,
            idle: true,
            op_cond_polls: 0,
            blocks: HashMap::new(),
            stats: SimCardStats::default(),
        }
    }

    /// Writes card contents directly, bypassing the wire protocol.
    ///
    /// `data` must be a whole number of blocks. Used to seed a card
    /// with pre-existing log content.
    pub fn preload(&mut self, start: BlockIndex, data: &[u8]) {
        assert!(
            !data.is_empty() && data.len() % BLOCK_SIZE == 0,
            "preload data must be a non-zero multiple of {BLOCK_SIZE} bytes"
        );
        let mut index = start.as_u64();
        for chunk in data.chunks_exact(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.blocks.insert(index, block);
            index += 1;
        }
    }

    /// Returns the durable contents of a block (zero-filled if never
    /// written).
    pub fn block_data(&self, index: u64) -> [u8; BLOCK_SIZE] {
        self.blocks.get(&index).copied().unwrap_or([0u8; BLOCK_SIZE])
    }

    pub fn stats(&self) -> &SimCardStats {
        &self.stats
    }

    pub fn config(&self) -> &SimCardConfig {
        &self.config
    }

    /// Last bus speed selected by the driver.
    pub fn bus_speed(&self) -> BusSpeed {
        self.speed
    }

    // ------------------------------------------------------------------
    // Byte-level protocol
    // ------------------------------------------------------------------

    fn sink_byte(&mut self, byte: u8) {
        match &mut self.mode {
            Mode::Command => {
                // Idle filler between frames is not command data.
                if self.cmd_buf.is_empty() && byte & 0xC0 != 0x40 {
                    return;
                }
                self.cmd_buf.push(byte);
                if self.cmd_buf.len() == 6 {
                    let bytes: [u8; 6] = self.cmd_buf[..].try_into().expect("six bytes buffered");
                    self.cmd_buf.clear();
                    if let Some(frame) = CommandFrame::decode(&bytes) {
                        self.handle_command(frame);
                    }
                }
            }
            Mode::ReceiveBlock { received, .. } => {
                // Wait for the start token; the host may clock idle
                // bytes first.
                if received.is_empty() && byte == BUS_IDLE {
                    return;
                }
                received.push(byte);
                // token + data + 2 CRC bytes
                if received.len() == 1 + BLOCK_SIZE + 2 {
                    self.finish_block_write();
                }
            }
        }
    }

    fn source_byte(&mut self) -> u8 {
        if let Some(byte) = self.output.pop_front() {
            return byte;
        }
        if self.busy_remaining > 0 {
            self.busy_remaining = self.busy_remaining.saturating_sub(1);
            return 0x00;
        }
        BUS_IDLE
    }

    /// Queues an R1 token preceded by the configured response delay.
    fn respond(&mut self, r1: R1Response) {
        for _ in 0..self.config.response_delay_bytes {
            self.output.push_back(BUS_IDLE);
        }
        self.output.push_back(r1.bits());
    }

    fn idle_flag(&self) -> R1Response {
        if self.idle {
            R1Response::IDLE_STATE
        } else {
            R1Response::empty()
        }
    }

    /// Resolves a command argument to a block index per the variant's
    /// addressing mode.
    fn resolve_address(&self, argument: u32) -> Result<u64, R1Response> {
        let index = match self.config.variant {
            CardVariant::HighCapacity => u64::from(argument),
            CardVariant::Legacy | CardVariant::StandardCapacity => {
                if argument as usize % BLOCK_SIZE != 0 {
                    return Err(R1Response::ADDRESS_ERROR);
                }
                u64::from(argument) / BLOCK_SIZE as u64
            }
        };
        if index >= self.config.capacity_blocks {
            return Err(R1Response::ADDRESS_ERROR);
        }
        Ok(index)
    }

    fn handle_command(&mut self, frame: CommandFrame) {
        self.stats.commands += 1;

        if self.config.mute {
            return;
        }

        let is_acmd = std::mem::replace(&mut self.app_cmd, false);
        if is_acmd && frame.opcode == opcode::APP_SEND_OP_COND {
            self.handle_op_cond();
            return;
        }

        match frame.opcode {
            opcode::GO_IDLE_STATE => {
                // The reset checksum is one of the two the card enforces.
                if frame.checksum != CHECKSUM_GO_IDLE {
                    self.respond(R1Response::IDLE_STATE | R1Response::COM_CRC_ERROR);
                    return;
                }
                self.idle = true;
                self.op_cond_polls = 0;
                self.respond(R1Response::IDLE_STATE);
            }

            opcode::SEND_IF_COND => {
                if self.config.variant == CardVariant::Legacy {
                    self.respond(R1Response::IDLE_STATE | R1Response::ILLEGAL_COMMAND);
                    return;
                }
                if frame.checksum != CHECKSUM_SEND_IF_COND
                    || frame.argument != IF_COND_CHECK_PATTERN
                {
                    self.respond(self.idle_flag() | R1Response::COM_CRC_ERROR);
                    return;
                }
                self.respond(R1Response::IDLE_STATE);
                let pattern = if self.config.bad_interface_echo {
                    0x55
                } else {
                    0xAA
                };
                self.output.extend([0x00, 0x00, 0x01, pattern]);
            }

            opcode::APP_CMD => {
                self.app_cmd = true;
                self.respond(self.idle_flag());
            }

            opcode::READ_OCR => {
                self.respond(self.idle_flag());
                let capacity = match self.config.variant {
                    CardVariant::HighCapacity => OCR_CAPACITY_BIT,
                    _ => 0,
                };
                // Power-up-complete bit plus the capacity bit.
                self.output.extend([0x80 | capacity, 0x00, 0x00, 0x00]);
            }

            opcode::SET_BLOCKLEN => {
                if frame.argument as usize == BLOCK_SIZE {
                    self.respond(self.idle_flag());
                } else {
                    self.respond(self.idle_flag() | R1Response::PARAMETER_ERROR);
                }
            }

            opcode::READ_SINGLE_BLOCK => match self.resolve_address(frame.argument) {
                Err(status) => self.respond(status),
                Ok(index) => {
                    self.respond(R1Response::empty());
                    if self.config.starve_read_token {
                        return;
                    }
                    for _ in 0..self.config.read_latency_bytes {
                        self.output.push_back(BUS_IDLE);
                    }
                    let data = self.block_data(index);
                    self.output.push_back(START_BLOCK_TOKEN);
                    self.output.extend(data);
                    // CRC field: transferred, never meaningful here.
                    self.output.extend([0x00, 0x00]);
                    self.stats.blocks_read += 1;
                }
            },

            opcode::WRITE_BLOCK => match self.resolve_address(frame.argument) {
                Err(status) => self.respond(status),
                Ok(index) => {
                    self.respond(R1Response::empty());
                    self.mode = Mode::ReceiveBlock {
                        index,
                        received: Vec::with_capacity(1 + BLOCK_SIZE + 2),
                    };
                }
            },

            _ => {
                self.respond(self.idle_flag() | R1Response::ILLEGAL_COMMAND);
            }
        }
    }

    fn handle_op_cond(&mut self) {
        if self.config.never_ready {
            self.respond(R1Response::IDLE_STATE);
            return;
        }
        if self.op_cond_polls < self.config.ready_after_polls {
            self.op_cond_polls += 1;
            self.respond(R1Response::IDLE_STATE);
            return;
        }
        self.idle = false;
        self.respond(R1Response::empty());
    }

    fn finish_block_write(&mut self) {
        let Mode::ReceiveBlock { index, received } = std::mem::replace(&mut self.mode, Mode::Command)
        else {
            unreachable!("finish_block_write outside a write");
        };

        // Data-response token: 0b000sss1, status nibble 010 = accepted,
        // 110 = write error.
        if self.config.reject_writes {
            self.output.push_back(0x0D);
            return;
        }

        debug_assert_eq!(received[0], START_BLOCK_TOKEN, "write without start token");

        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&received[1..1 + BLOCK_SIZE]);
        self.blocks.insert(index, block);
        self.stats.blocks_written += 1;

        self.output.push_back(0x05);
        self.busy_remaining = if self.config.busy_forever {
            u64::MAX
        } else {
            self.config.busy_reads
        };
    }
}

impl SpiBus for SimCard {
    fn write(&mut self, data: &[u8]) {
        for &byte in data {
            self.clock.advance_by(self.config.byte_time_ns);
            self.sink_byte(byte);
        }
    }

    fn read_into(&mut self, buf: &mut [u8], _fill: u8) {
        for slot in buf.iter_mut() {
            self.clock.advance_by(self.config.byte_time_ns);
            *slot = self.source_byte();
        }
    }

    fn set_speed(&mut self, speed: BusSpeed) {
        self.speed = speed;
    }

    fn chip_select(&mut self, selected: bool) {
        if !selected && self.selected {
            // Deselect aborts any partial exchange.
            self.cmd_buf.clear();
            self.output.clear();
            self.mode = Mode::Command;
        }
        self.selected = selected;
    }
}
