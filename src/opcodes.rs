//! # Opcode Dispatch Tables
//!
//! Two 256-entry tables indexed by opcode byte: the primary table and the
//! extended table selected by the `0xCB` prefix. Each implemented entry
//! carries its mnemonic, its encoded length in bytes, and the handler that
//! executes it. Unimplemented opcodes are `None`.

use std::fmt;

use crate::cpu::CPU;
use crate::error::FaultKind;

/// Prefix byte that selects the extended table.
pub const PREFIX_CB: u8 = 0xCB;

/// Executes one instruction against the CPU. Handlers read their own
/// operands relative to PC and leave PC pointing at the next instruction.
pub type Handler = fn(&mut CPU) -> Result<(), FaultKind>;

#[derive(Clone, Copy)]
pub struct Opcode {
    pub mnemonic: &'static str,
    /// Total encoded size including the opcode (and prefix) bytes.
    pub length: u8,
    /// Whether the handler writes PC directly instead of stepping over
    /// `length` bytes.
    pub transfers_control: bool,
    pub handler: Handler,
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opcode")
            .field("mnemonic", &self.mnemonic)
            .field("length", &self.length)
            .field("transfers_control", &self.transfers_control)
            .finish_non_exhaustive()
    }
}

const fn op(mnemonic: &'static str, length: u8, handler: Handler) -> Option<Opcode> {
    Some(Opcode {
        mnemonic,
        length,
        transfers_control: false,
        handler,
    })
}

const fn jump(mnemonic: &'static str, length: u8, handler: Handler) -> Option<Opcode> {
    Some(Opcode {
        mnemonic,
        length,
        transfers_control: true,
        handler,
    })
}

const fn build_primary() -> [Option<Opcode>; 256] {
    let mut table: [Option<Opcode>; 256] = [None; 256];

    // 8-bit loads
    table[0x06] = op("LD B,d8", 2, CPU::ld_b_d8);
    table[0x0E] = op("LD C,d8", 2, CPU::ld_c_d8);
    table[0x3E] = op("LD A,d8", 2, CPU::ld_a_d8);
    table[0x4F] = op("LD C,A", 1, CPU::ld_c_a);
    table[0x1A] = op("LD A,(DE)", 1, CPU::ld_a_de_ind);
    table[0x77] = op("LD (HL),A", 1, CPU::ld_hl_ind_a);
    table[0x32] = op("LD (HL-),A", 1, CPU::ld_hl_dec_a);
    table[0xE2] = op("LD (C),A", 1, CPU::ld_io_c_a);
    table[0xE0] = op("LDH (a8),A", 2, CPU::ldh_a8_a);

    // 16-bit loads
    table[0x11] = op("LD DE,d16", 3, CPU::ld_de_d16);
    table[0x21] = op("LD HL,d16", 3, CPU::ld_hl_d16);
    table[0x31] = op("LD SP,d16", 3, CPU::ld_sp_d16);
    table[0xC5] = op("PUSH BC", 1, CPU::push_bc);

    // ALU
    table[0xAF] = op("XOR A", 1, CPU::xor_a);
    table[0x0C] = op("INC C", 1, CPU::inc_c);

    // Control flow
    table[0x20] = jump("JR NZ,r8", 2, CPU::jr_nz_r8);
    table[0xCD] = jump("CALL a16", 3, CPU::call_a16);

    table[PREFIX_CB as usize] = op("PREFIX CB", 2, CPU::prefix_cb);

    table
}

const fn build_extended() -> [Option<Opcode>; 256] {
    let mut table: [Option<Opcode>; 256] = [None; 256];

    table[0x11] = op("RL C", 2, CPU::rl_c);
    table[0x7C] = op("BIT 7,H", 2, CPU::bit_7_h);

    table
}

pub static PRIMARY_TABLE: [Option<Opcode>; 256] = build_primary();
pub static EXTENDED_TABLE: [Option<Opcode>; 256] = build_extended();

pub fn lookup(opcode: u8) -> Option<&'static Opcode> {
    PRIMARY_TABLE[opcode as usize].as_ref()
}

pub fn lookup_extended(opcode: u8) -> Option<&'static Opcode> {
    EXTENDED_TABLE[opcode as usize].as_ref()
}

/// Opcodes with an entry in the primary table, in ascending order.
pub fn implemented_opcodes() -> Vec<u8> {
    PRIMARY_TABLE
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.is_some())
        .map(|(i, _)| i as u8)
        .collect()
}

/// Sub-opcodes with an entry in the extended table, in ascending order.
pub fn implemented_extended_opcodes() -> Vec<u8> {
    EXTENDED_TABLE
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.is_some())
        .map(|(i, _)| i as u8)
        .collect()
}
