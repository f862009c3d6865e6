use std::fmt;

use log::{debug, error, trace};

use crate::config::{Compatibility, ConfigError, CoreConfig};
use crate::error::{Fault, FaultKind, MemoryError};
use crate::memory::Memory;
use crate::metrics::{record_fault, record_instruction, update_cpu_registers, Timer};
use crate::opcodes::{self, PREFIX_CB};
use crate::registers::{
    Registers, CARRY_FLAG, HALF_CARRY_FLAG, LEGACY_ZERO_BIT, SUBTRACT_FLAG, ZERO_FLAG,
};

/// Size of the boot program copied to address 0 on creation and reset.
pub const BOOT_ROM_SIZE: usize = 0x100;

/// Base of the high I/O page addressed by `LD (C),A` and `LDH (a8),A`.
pub const IO_PAGE: u16 = 0xFF00;

/// Metadata for one executed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pc: u16,
    pub opcode: u8,
    /// Sub-opcode when `opcode` is the 0xCB prefix.
    pub extended: Option<u8>,
    pub mnemonic: &'static str,
    pub length: u8,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.extended {
            Some(sub) => write!(
                f,
                "{:04X}: {:02X} {:02X}  {}",
                self.pc, self.opcode, sub, self.mnemonic
            ),
            None => write!(f, "{:04X}: {:02X}     {}", self.pc, self.opcode, self.mnemonic),
        }
    }
}

/// How a bounded run ended when no fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The step budget ran out.
    BudgetExhausted { steps: u64 },
    /// The caller's stop condition became true.
    ConditionMet { steps: u64 },
}

impl RunOutcome {
    pub fn steps(&self) -> u64 {
        match *self {
            RunOutcome::BudgetExhausted { steps } | RunOutcome::ConditionMet { steps } => steps,
        }
    }
}

#[derive(Debug)]
pub struct CPU {
    pub registers: Registers,
    pub memory: Memory,

    config: CoreConfig,
    boot_rom: [u8; BOOT_ROM_SIZE],

    // Internal state
    instructions_executed: u64,
    halted: bool,
}

impl CPU {
    /// Creates a CPU with the default configuration and copies `boot_rom`
    /// into addresses 0x0000-0x00FF.
    pub fn new(boot_rom: &[u8; BOOT_ROM_SIZE]) -> Self {
        let mut memory = Memory::new();
        memory.data_mut()[..BOOT_ROM_SIZE].copy_from_slice(boot_rom);

        CPU {
            registers: Registers::new(),
            memory,
            config: CoreConfig::default(),
            boot_rom: *boot_rom,
            instructions_executed: 0,
            halted: false,
        }
    }

    pub fn with_config(
        config: CoreConfig,
        boot_rom: &[u8; BOOT_ROM_SIZE],
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut memory = Memory::with_capacity(config.memory_size);
        memory
            .load_image(0x0000, boot_rom)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        debug!(
            "created {} cpu with {:#X} bytes of memory",
            config.compatibility.to_string(),
            memory.capacity()
        );

        Ok(CPU {
            registers: Registers::new(),
            memory,
            config,
            boot_rom: *boot_rom,
            instructions_executed: 0,
            halted: false,
        })
    }

    /// Zeroes registers and memory, reloads the boot program and leaves the
    /// halted-on-fault state.
    pub fn reset(&mut self) -> Result<(), MemoryError> {
        self.registers = Registers::new();
        self.memory.clear();
        self.memory.load_image(0x0000, &self.boot_rom)?;
        self.instructions_executed = 0;
        self.halted = false;
        debug!("cpu reset");
        Ok(())
    }

    /// Fetches, decodes and executes one instruction.
    ///
    /// On failure the CPU enters the halted-on-fault state: the fault is
    /// logged with a full register dump, and every later call returns a
    /// [`FaultKind::Halted`] fault without touching registers or memory.
    pub fn step(&mut self) -> Result<Instruction, Fault> {
        if self.halted {
            return Err(self.fault(FaultKind::Halted, self.registers.pc));
        }

        let pc = self.registers.pc;
        let timer = self.config.record_metrics.then(Timer::new);

        match self.execute(pc) {
            Ok(instruction) => {
                self.instructions_executed += 1;
                trace!("{}", instruction);
                if let Some(timer) = timer {
                    record_instruction(instruction.opcode, instruction.mnemonic, timer.elapsed());
                }
                Ok(instruction)
            }
            Err(kind) => {
                self.halted = true;
                let fault = self.fault(kind, pc);
                error!("{}", fault.dump());
                if self.config.record_metrics {
                    record_fault(&kind);
                    update_cpu_registers(&self.registers);
                }
                Err(fault)
            }
        }
    }

    fn execute(&mut self, pc: u16) -> Result<Instruction, FaultKind> {
        let opcode = self.memory.read(pc)?;
        let entry = opcodes::lookup(opcode).ok_or(FaultKind::UnimplementedOpcode { opcode })?;

        let (extended, mnemonic) = if opcode == PREFIX_CB {
            let sub = self.memory.read(pc.wrapping_add(1))?;
            let sub_entry = opcodes::lookup_extended(sub)
                .ok_or(FaultKind::UnimplementedExtendedOpcode { opcode: sub })?;
            (Some(sub), sub_entry.mnemonic)
        } else {
            (None, entry.mnemonic)
        };

        (entry.handler)(self)?;

        Ok(Instruction {
            pc,
            opcode,
            extended,
            mnemonic,
            length: entry.length,
        })
    }

    fn fault(&self, kind: FaultKind, pc: u16) -> Fault {
        Fault {
            kind,
            pc,
            instructions_executed: self.instructions_executed,
            registers: self.registers,
        }
    }

    /// Executes at most `max_steps` instructions.
    pub fn run(&mut self, max_steps: u64) -> Result<RunOutcome, Fault> {
        self.run_until(max_steps, |_| false)
    }

    /// Executes instructions until `stop` returns true or `max_steps`
    /// instructions have run. `stop` is checked before every step and once
    /// more after the last one.
    pub fn run_until<F>(&mut self, max_steps: u64, mut stop: F) -> Result<RunOutcome, Fault>
    where
        F: FnMut(&CPU) -> bool,
    {
        let mut steps = 0;
        while steps < max_steps {
            if stop(self) {
                return Ok(self.finish_run(RunOutcome::ConditionMet { steps }));
            }
            self.step()?;
            steps += 1;
        }

        let outcome = if stop(self) {
            RunOutcome::ConditionMet { steps }
        } else {
            RunOutcome::BudgetExhausted { steps }
        };
        Ok(self.finish_run(outcome))
    }

    fn finish_run(&self, outcome: RunOutcome) -> RunOutcome {
        if self.config.record_metrics {
            update_cpu_registers(&self.registers);
        }
        outcome
    }

    /// The unbounded fetch-decode-execute loop. Returns only when a fault
    /// halts the CPU.
    pub fn run_forever(&mut self) -> Fault {
        loop {
            if let Err(fault) = self.step() {
                return fault;
            }
        }
    }

    // Getters
    pub fn get_pc(&self) -> u16 { self.registers.pc }
    pub fn get_sp(&self) -> u16 { self.registers.sp }
    pub fn is_halted(&self) -> bool { self.halted }
    pub fn instructions_executed(&self) -> u64 { self.instructions_executed }
    pub fn config(&self) -> &CoreConfig { &self.config }
    pub fn compatibility(&self) -> Compatibility { self.config.compatibility }
    pub fn boot_rom(&self) -> &[u8; BOOT_ROM_SIZE] { &self.boot_rom }

    /// Replaces registers and memory contents wholesale and clears the
    /// halted state.
    pub(crate) fn restore_state(&mut self, registers: Registers, memory: &[u8], executed: u64) {
        self.registers = registers;
        self.memory.data_mut().copy_from_slice(memory);
        self.instructions_executed = executed;
        self.halted = false;
    }

    // Operand helpers
    fn imm8(&self) -> Result<u8, FaultKind> {
        Ok(self.memory.read(self.registers.pc.wrapping_add(1))?)
    }

    fn imm16(&self) -> Result<u16, FaultKind> {
        Ok(self.memory.read_u16(self.registers.pc.wrapping_add(1))?)
    }

    fn advance(&mut self, length: u16) {
        self.registers.pc = self.registers.pc.wrapping_add(length);
    }

    /// SP -= 2, then stores `value` little-endian at the new SP.
    fn push_u16(&mut self, value: u16) -> Result<(), FaultKind> {
        let sp = self.registers.sp.wrapping_sub(2);
        self.memory.write_u16(sp, value)?;
        self.registers.sp = sp;
        Ok(())
    }

    fn zero_condition(&self) -> bool {
        match self.config.compatibility {
            Compatibility::Legacy => self.registers.f & LEGACY_ZERO_BIT != 0,
            Compatibility::Accurate => self.registers.get_flag(ZERO_FLAG),
        }
    }

    // Instruction implementations

    // 0x31
    pub(crate) fn ld_sp_d16(&mut self) -> Result<(), FaultKind> {
        self.registers.sp = self.imm16()?;
        self.advance(3);
        Ok(())
    }

    // 0x21
    pub(crate) fn ld_hl_d16(&mut self) -> Result<(), FaultKind> {
        let value = self.imm16()?;
        self.registers.set_hl(value);
        self.advance(3);
        Ok(())
    }

    // 0x11
    pub(crate) fn ld_de_d16(&mut self) -> Result<(), FaultKind> {
        let value = self.imm16()?;
        self.registers.set_de(value);
        self.advance(3);
        Ok(())
    }

    // 0x32
    pub(crate) fn ld_hl_dec_a(&mut self) -> Result<(), FaultKind> {
        let hl = self.registers.hl();
        self.memory.write(hl, self.registers.a)?;
        self.registers.set_hl(hl.wrapping_sub(1));
        self.advance(1);
        Ok(())
    }

    // 0x77
    pub(crate) fn ld_hl_ind_a(&mut self) -> Result<(), FaultKind> {
        self.memory.write(self.registers.hl(), self.registers.a)?;
        self.advance(1);
        Ok(())
    }

    // 0x1A
    pub(crate) fn ld_a_de_ind(&mut self) -> Result<(), FaultKind> {
        self.registers.a = self.memory.read(self.registers.de())?;
        self.advance(1);
        Ok(())
    }

    // 0xE2
    pub(crate) fn ld_io_c_a(&mut self) -> Result<(), FaultKind> {
        let address = IO_PAGE + self.registers.c as u16;
        self.memory.write(address, self.registers.a)?;
        self.advance(1);
        Ok(())
    }

    // 0xE0
    pub(crate) fn ldh_a8_a(&mut self) -> Result<(), FaultKind> {
        let address = IO_PAGE + self.imm8()? as u16;
        self.memory.write(address, self.registers.a)?;
        self.advance(2);
        Ok(())
    }

    // 0x06
    pub(crate) fn ld_b_d8(&mut self) -> Result<(), FaultKind> {
        self.registers.b = self.imm8()?;
        self.advance(2);
        Ok(())
    }

    // 0x0E
    pub(crate) fn ld_c_d8(&mut self) -> Result<(), FaultKind> {
        self.registers.c = self.imm8()?;
        self.advance(2);
        Ok(())
    }

    // 0x3E
    pub(crate) fn ld_a_d8(&mut self) -> Result<(), FaultKind> {
        self.registers.a = self.imm8()?;
        self.advance(2);
        Ok(())
    }

    // 0x4F
    pub(crate) fn ld_c_a(&mut self) -> Result<(), FaultKind> {
        self.registers.c = self.registers.a;
        self.advance(1);
        Ok(())
    }

    // 0xAF
    pub(crate) fn xor_a(&mut self) -> Result<(), FaultKind> {
        self.registers.a ^= self.registers.a;
        if self.config.compatibility == Compatibility::Accurate {
            self.registers.f = ZERO_FLAG;
        }
        self.advance(1);
        Ok(())
    }

    // 0x0C
    pub(crate) fn inc_c(&mut self) -> Result<(), FaultKind> {
        let old = self.registers.c;
        let result = old.wrapping_add(1);
        self.registers.c = result;
        if self.config.compatibility == Compatibility::Accurate {
            self.registers.set_flag(ZERO_FLAG, result == 0);
            self.registers.set_flag(SUBTRACT_FLAG, false);
            self.registers.set_flag(HALF_CARRY_FLAG, (old & 0x0F) == 0x0F);
        }
        self.advance(1);
        Ok(())
    }

    // 0xC5
    pub(crate) fn push_bc(&mut self) -> Result<(), FaultKind> {
        self.push_u16(self.registers.bc())?;
        self.advance(1);
        Ok(())
    }

    // 0x20
    pub(crate) fn jr_nz_r8(&mut self) -> Result<(), FaultKind> {
        let offset = self.imm8()? as i8;
        let next = self.registers.pc.wrapping_add(2);
        self.registers.pc = if self.zero_condition() {
            next
        } else {
            next.wrapping_add(offset as i16 as u16)
        };
        Ok(())
    }

    // 0xCD
    pub(crate) fn call_a16(&mut self) -> Result<(), FaultKind> {
        let target = self.imm16()?;
        let return_address = match self.config.compatibility {
            Compatibility::Legacy => self.registers.pc.wrapping_add(1),
            Compatibility::Accurate => self.registers.pc.wrapping_add(3),
        };
        self.push_u16(return_address)?;
        self.registers.pc = target;
        Ok(())
    }

    // 0xCB
    pub(crate) fn prefix_cb(&mut self) -> Result<(), FaultKind> {
        let sub = self.imm8()?;
        let entry = opcodes::lookup_extended(sub)
            .ok_or(FaultKind::UnimplementedExtendedOpcode { opcode: sub })?;
        (entry.handler)(self)?;
        self.advance(2);
        Ok(())
    }

    // CB 0x7C
    pub(crate) fn bit_7_h(&mut self) -> Result<(), FaultKind> {
        let bit_set = self.registers.h & 0x80 != 0;
        match self.config.compatibility {
            Compatibility::Legacy => {
                self.registers.f = if bit_set { 0x00 } else { LEGACY_ZERO_BIT };
            }
            Compatibility::Accurate => {
                self.registers.set_flag(ZERO_FLAG, !bit_set);
                self.registers.set_flag(SUBTRACT_FLAG, false);
                self.registers.set_flag(HALF_CARRY_FLAG, true);
            }
        }
        Ok(())
    }

    // CB 0x11
    pub(crate) fn rl_c(&mut self) -> Result<(), FaultKind> {
        let old = self.registers.c;
        let carry_in = self.registers.get_flag(CARRY_FLAG) as u8;
        let result = (old << 1) | carry_in;
        self.registers.c = result;

        self.registers.set_flag(CARRY_FLAG, old & 0x80 != 0);
        self.registers.set_flag(HALF_CARRY_FLAG, false);
        self.registers.set_flag(SUBTRACT_FLAG, false);
        self.registers.set_flag(ZERO_FLAG, result == 0);
        Ok(())
    }
}
