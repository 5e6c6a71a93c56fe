//! Error types for card bring-up and block operations.

use fv_types::BlockIndex;

use crate::frame::R1Response;

/// Fatal bring-up failures.
///
/// Initialization is all-or-nothing: any of these aborts the storage
/// session before it starts. There is no degraded mode.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The card never answered a bring-up command.
    #[error("card unresponsive to CMD{opcode} during bring-up")]
    Unresponsive { opcode: u8 },

    /// CMD0 was answered with something other than a clean idle state.
    #[error("card did not enter idle state after reset (R1 {response:?})")]
    NoIdleState { response: R1Response },

    /// The CMD8 response token fits neither a v2 nor a legacy card.
    #[error("unrecognized interface-condition response (R1 {response:?})")]
    UnsupportedCard { response: R1Response },

    /// A v2 card echoed the wrong check pattern.
    #[error("interface-condition echo mismatch (payload {payload:02x?})")]
    InterfaceMismatch { payload: [u8; 4] },

    /// The card stayed idle past the operating-condition deadline.
    #[error("card not ready within the negotiation window")]
    NegotiationTimeout,

    /// The card refused the 512-byte block length.
    #[error("block length rejected (R1 {response:?})")]
    BlockLengthRejected { response: R1Response },
}

/// Per-operation failures after the driver is Ready.
///
/// These are surfaced to the caller and never retried internally;
/// retry policy belongs to the log writer.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    /// No response token arrived within the command window.
    #[error("no response to CMD{opcode}")]
    NoResponse { opcode: u8 },

    /// The command was answered with a non-ready status.
    #[error("CMD{opcode} failed (R1 {response:?})")]
    CommandFailed { opcode: u8, response: R1Response },

    /// The start-of-block token never arrived.
    #[error("read timeout waiting for data token at block {block}")]
    ReadTimeout { block: BlockIndex },

    /// The card's data-response token did not accept the block.
    #[error("write rejected at block {block} (token {token:#04x})")]
    WriteRejected { block: BlockIndex, token: u8 },

    /// The card stayed busy past the write deadline.
    #[error("write timeout waiting for ready at block {block}")]
    WriteTimeout { block: BlockIndex },
}
