use std::fmt;

use thiserror::Error;

use crate::registers::Registers;

/// Errors raised by the memory unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address {address:#06X} is out of bounds (capacity {capacity:#X})")]
    AddressOutOfRange { address: u16, capacity: usize },
    #[error("image of {len} bytes at {start:#06X} does not fit in {capacity:#X} bytes of memory")]
    ImageTooLarge { start: u16, len: usize, capacity: usize },
}

/// What went wrong while executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FaultKind {
    #[error("unimplemented opcode {opcode:#04X}")]
    UnimplementedOpcode { opcode: u8 },
    #[error("unimplemented extended opcode 0xCB {opcode:#04X}")]
    UnimplementedExtendedOpcode { opcode: u8 },
    #[error("address {address:#06X} is out of bounds (capacity {capacity:#X})")]
    AddressOutOfRange { address: u16, capacity: usize },
    #[error("cpu is halted after an earlier fault")]
    Halted,
}

impl FaultKind {
    /// Short label used for metrics and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            FaultKind::UnimplementedOpcode { .. } => "unimplemented_opcode",
            FaultKind::UnimplementedExtendedOpcode { .. } => "unimplemented_extended_opcode",
            FaultKind::AddressOutOfRange { .. } => "address_out_of_range",
            FaultKind::Halted => "halted",
        }
    }
}

impl From<MemoryError> for FaultKind {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::AddressOutOfRange { address, capacity } => {
                FaultKind::AddressOutOfRange { address, capacity }
            }
            // Not produced by instruction handlers.
            MemoryError::ImageTooLarge { start, capacity, .. } => {
                FaultKind::AddressOutOfRange { address: start, capacity }
            }
        }
    }
}

/// A fatal execution fault. Carries the register state at the moment the
/// faulting instruction was decoded or executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub pc: u16,
    pub instructions_executed: u64,
    pub registers: Registers,
}

impl Fault {
    /// The offending opcode, if the fault came from decoding.
    pub fn opcode(&self) -> Option<u8> {
        match self.kind {
            FaultKind::UnimplementedOpcode { opcode }
            | FaultKind::UnimplementedExtendedOpcode { opcode } => Some(opcode),
            _ => None,
        }
    }

    /// Full diagnostic dump: the fault line followed by every register.
    pub fn dump(&self) -> String {
        format!(
            "{} after {} instructions\n{}",
            self, self.instructions_executed, self.registers
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at PC {:#06X}", self.kind, self.pc)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}
