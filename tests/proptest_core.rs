//! Property-based tests for memory and register invariants.

use lr35902_emulator::cpu::{BOOT_ROM_SIZE, CPU};
use lr35902_emulator::error::FaultKind;
use lr35902_emulator::memory::Memory;
use lr35902_emulator::opcodes;
use lr35902_emulator::registers::{RegisterPair, Registers};
use proptest::prelude::*;

fn any_pair() -> impl Strategy<Value = RegisterPair> {
    prop_oneof![
        Just(RegisterPair::AF),
        Just(RegisterPair::BC),
        Just(RegisterPair::DE),
        Just(RegisterPair::HL),
    ]
}

fn cpu_at(pc: u16, program: &[u8]) -> CPU {
    let mut cpu = CPU::new(&[0u8; BOOT_ROM_SIZE]);
    for (i, &byte) in program.iter().enumerate() {
        cpu.memory.write(pc.wrapping_add(i as u16), byte).unwrap();
    }
    cpu.registers.pc = pc;
    cpu
}

proptest! {
    #[test]
    fn prop_write_then_read(address in any::<u16>(), value in any::<u8>()) {
        let mut memory = Memory::new();
        memory.write(address, value).unwrap();
        prop_assert_eq!(memory.read(address).unwrap(), value);
    }

    #[test]
    fn prop_read_u16_composes_reads(address in 0u16..0xFFFF, low in any::<u8>(), high in any::<u8>()) {
        let mut memory = Memory::new();
        memory.write(address, low).unwrap();
        memory.write(address + 1, high).unwrap();

        let expected = memory.read(address).unwrap() as u16
            | ((memory.read(address + 1).unwrap() as u16) << 8);
        prop_assert_eq!(memory.read_u16(address).unwrap(), expected);
    }

    #[test]
    fn prop_out_of_range_access_is_rejected(capacity in 0x100usize..0x10000, offset in any::<u16>()) {
        let mut memory = Memory::with_capacity(capacity);
        let address = offset as usize;
        if address >= capacity {
            prop_assert!(memory.read(offset).is_err());
            prop_assert!(memory.write(offset, 0x01).is_err());
        } else {
            prop_assert!(memory.write(offset, 0x01).is_ok());
            prop_assert_eq!(memory.read(offset).unwrap(), 0x01);
        }
    }

    #[test]
    fn prop_register_pair_round_trip(pair in any_pair(), value in any::<u16>()) {
        let mut regs = Registers::new();
        regs.set_pair(pair, value);
        prop_assert_eq!(regs.pair(pair), value);
    }

    #[test]
    fn prop_xor_a_always_clears_a(a in any::<u8>()) {
        let mut cpu = cpu_at(0x0200, &[0xAF]);
        cpu.registers.a = a;
        cpu.step().unwrap();
        prop_assert_eq!(cpu.registers.a, 0);
        prop_assert_eq!(cpu.get_pc(), 0x0201);
    }

    #[test]
    fn prop_jr_nz_target(pc in 0x0100u16..0xF000, offset in any::<u8>(), taken in any::<bool>()) {
        let mut cpu = cpu_at(pc, &[0x20, offset]);
        cpu.registers.f = if taken { 0x00 } else { 0x01 };
        cpu.step().unwrap();

        let expected = if taken {
            (pc as i32 + 2 + offset as i8 as i32) as u16
        } else {
            pc + 2
        };
        prop_assert_eq!(cpu.get_pc(), expected);
    }

    #[test]
    fn prop_rl_c(c in any::<u8>(), carry in any::<bool>()) {
        let mut cpu = cpu_at(0x0200, &[0xCB, 0x11]);
        cpu.registers.c = c;
        cpu.registers.f = if carry { 0x10 } else { 0x00 };
        cpu.step().unwrap();

        let expected = (c << 1) | carry as u8;
        prop_assert_eq!(cpu.registers.c, expected);
        prop_assert_eq!(cpu.registers.f & 0x10 != 0, c & 0x80 != 0);
        prop_assert_eq!(cpu.registers.f & 0x80 != 0, expected == 0);
        prop_assert_eq!(cpu.registers.f & 0x60, 0);
    }

    #[test]
    fn prop_unimplemented_opcodes_fault(opcode in any::<u8>()) {
        prop_assume!(opcodes::lookup(opcode).is_none());
        let mut cpu = cpu_at(0x0200, &[opcode]);
        let fault = cpu.step().unwrap_err();
        prop_assert_eq!(fault.kind, FaultKind::UnimplementedOpcode { opcode });
        prop_assert_eq!(fault.pc, 0x0200);
        prop_assert_eq!(cpu.get_pc(), 0x0200);
        prop_assert_eq!(cpu.instructions_executed(), 0);
    }
}
