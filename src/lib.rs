//! # LR35902 CPU Emulator Core
//!
//! The instruction-execution core of a Game Boy style emulator: an 8-bit
//! CPU with a 16-bit address space, modeled as a flat memory unit owned by
//! a fetch-decode-execute engine.
//!
//! ## Features
//!
//! - Bounds-checked memory unit with configurable capacity
//! - Register file with AF/BC/DE/HL pair access and Z/N/H/C flags
//! - Data-driven primary and `0xCB`-extended opcode tables
//! - Typed faults with a full register dump instead of process exit
//! - Bounded (`run`, `run_until`) and unbounded (`run_forever`) execution
//! - Legacy or hardware-accurate flag behavior, selected by configuration
//! - Prometheus metrics and JSON snapshots of CPU and memory state
//!
//! ## Example
//!
//! ```rust
//! use lr35902_emulator::cpu::{CPU, BOOT_ROM_SIZE};
//!
//! let mut boot = [0u8; BOOT_ROM_SIZE];
//! boot[..4].copy_from_slice(&[0x31, 0xFE, 0xFF, 0xAF]); // LD SP,$FFFE; XOR A
//!
//! let mut cpu = CPU::new(&boot);
//! cpu.run(2).unwrap();
//!
//! assert_eq!(cpu.get_sp(), 0xFFFE);
//! assert_eq!(cpu.registers.a, 0);
//! assert_eq!(cpu.get_pc(), 0x0004);
//! ```

pub mod config;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod opcodes;
pub mod registers;
pub mod snapshots;

pub use config::{Compatibility, CoreConfig};
pub use cpu::{Instruction, RunOutcome, BOOT_ROM_SIZE, CPU};
pub use error::{Fault, FaultKind, MemoryError};
pub use memory::Memory;
pub use registers::{RegisterPair, Registers};
pub use snapshots::{CheckpointReason, Snapshot};
