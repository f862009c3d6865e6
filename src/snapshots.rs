use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Compatibility;
use crate::cpu::CPU;
use crate::registers::Registers;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to (de)serialize snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("truncated RLE data at offset {0}")]
    Truncated(usize),
    #[error("snapshot holds {snapshot:#X} bytes of memory but the cpu has {cpu:#X}")]
    CapacityMismatch { snapshot: usize, cpu: usize },
    #[error("decompressed memory is {actual:#X} bytes, expected {expected:#X}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("memory checksum mismatch (expected {expected}, got {actual})")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointReason {
    Manual,
    Fault,
    BudgetExhausted,
}

/// Complete CPU and memory state, serializable to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub reason: CheckpointReason,
    pub compatibility: Compatibility,
    pub registers: Registers,
    pub instructions_executed: u64,
    pub memory_size: usize,
    /// RLE-compressed memory image.
    #[serde(with = "base64_bytes")]
    pub memory: Vec<u8>,
    /// SHA-256 of the uncompressed memory image, lowercase hex.
    pub checksum: String,
}

impl Snapshot {
    pub fn capture(name: impl Into<String>, cpu: &CPU, reason: CheckpointReason) -> Self {
        let raw = cpu.memory.as_slice();
        let snapshot = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            reason,
            compatibility: cpu.compatibility(),
            registers: cpu.registers,
            instructions_executed: cpu.instructions_executed(),
            memory_size: raw.len(),
            memory: compress_memory(raw),
            checksum: checksum(raw),
        };
        info!(
            "captured snapshot {} ({} bytes compressed from {})",
            snapshot.id,
            snapshot.memory.len(),
            snapshot.memory_size
        );
        snapshot
    }

    /// Writes the saved state into `cpu`. Nothing is modified unless the
    /// memory image decodes, matches the cpu's capacity and its checksum.
    pub fn restore(&self, cpu: &mut CPU) -> Result<(), SnapshotError> {
        if self.memory_size != cpu.memory.capacity() {
            return Err(SnapshotError::CapacityMismatch {
                snapshot: self.memory_size,
                cpu: cpu.memory.capacity(),
            });
        }

        let raw = decompress_memory(&self.memory, self.memory_size)?;
        let actual = checksum(&raw);
        if actual != self.checksum {
            return Err(SnapshotError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            });
        }

        if self.compatibility != cpu.compatibility() {
            warn!(
                "restoring {} snapshot into {} cpu",
                self.compatibility.to_string(),
                cpu.compatibility().to_string()
            );
        }

        cpu.restore_state(self.registers, &raw, self.instructions_executed);
        info!("restored snapshot {}", self.id);
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

const RLE_MARKER: u8 = 0xFF;

// Runs of four or more, and every run of zeros, become MARKER, count, value.
// A literal MARKER byte is escaped as MARKER, 0x00.
fn compress_memory(memory: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut i = 0;

    while i < memory.len() {
        let current = memory[i];
        let mut count = 1;
        while i + count < memory.len() && memory[i + count] == current && count < 255 {
            count += 1;
        }

        if count > 3 || current == 0 {
            compressed.extend_from_slice(&[RLE_MARKER, count as u8, current]);
        } else {
            for _ in 0..count {
                if current == RLE_MARKER {
                    compressed.extend_from_slice(&[RLE_MARKER, 0x00]);
                } else {
                    compressed.push(current);
                }
            }
        }

        i += count;
    }

    compressed
}

fn decompress_memory(compressed: &[u8], expected: usize) -> Result<Vec<u8>, SnapshotError> {
    let mut memory = Vec::with_capacity(expected);
    let mut i = 0;

    while i < compressed.len() {
        if compressed[i] != RLE_MARKER {
            memory.push(compressed[i]);
            i += 1;
            continue;
        }

        let count = *compressed.get(i + 1).ok_or(SnapshotError::Truncated(i))?;
        if count == 0x00 {
            memory.push(RLE_MARKER);
            i += 2;
        } else {
            let value = *compressed.get(i + 2).ok_or(SnapshotError::Truncated(i))?;
            memory.extend(std::iter::repeat(value).take(count as usize));
            i += 3;
        }
    }

    if memory.len() != expected {
        return Err(SnapshotError::SizeMismatch {
            expected,
            actual: memory.len(),
        });
    }

    Ok(memory)
}

mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::BOOT_ROM_SIZE;

    #[test]
    fn test_memory_compression() {
        let mut memory = vec![0u8; 65536];

        memory[0x1000] = 0xFF;
        memory[0x1001] = 0xFF;
        memory[0x1002] = 0xFF;
        memory[0x1003] = 0xFF;

        memory[0x2000] = 0xAA;
        memory[0x2001] = 0xBB;
        memory[0x2002] = 0xCC;

        let compressed = compress_memory(&memory);
        let decompressed = decompress_memory(&compressed, memory.len()).unwrap();

        assert_eq!(memory, decompressed);
        assert!(compressed.len() < memory.len());
    }

    #[test]
    fn test_rle_escape() {
        let mut memory = vec![0x00; 256];
        memory[0] = 0xFF;
        memory[1] = 0xFF;
        memory[2] = 0xAA;
        memory[3] = 0xFF;
        memory[4] = 0x00;

        let compressed = compress_memory(&memory);
        assert_eq!(&compressed[..5], &[0xFF, 0x00, 0xFF, 0x00, 0xAA]);
        let decompressed = decompress_memory(&compressed, memory.len()).unwrap();

        assert_eq!(memory, decompressed);
    }

    #[test]
    fn test_truncated_stream() {
        assert!(matches!(
            decompress_memory(&[0x01, 0xFF], 2),
            Err(SnapshotError::Truncated(1))
        ));
        assert!(matches!(
            decompress_memory(&[0xFF, 0x04], 4),
            Err(SnapshotError::Truncated(0))
        ));
    }

    #[test]
    fn test_size_mismatch() {
        assert!(matches!(
            decompress_memory(&[0xFF, 0x04, 0x00], 8),
            Err(SnapshotError::SizeMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_capture_and_restore() {
        let mut rom = [0u8; BOOT_ROM_SIZE];
        rom[..3].copy_from_slice(&[0x31, 0xFE, 0xFF]);
        let mut cpu = CPU::new(&rom);
        cpu.step().unwrap();
        cpu.memory.write(0xC000, 0x5A).unwrap();

        let snapshot = Snapshot::capture("after sp", &cpu, CheckpointReason::Manual);
        assert_eq!(snapshot.memory_size, 0x10000);
        assert_eq!(snapshot.checksum.len(), 64);

        cpu.reset().unwrap();
        assert_eq!(cpu.get_sp(), 0);

        snapshot.restore(&mut cpu).unwrap();
        assert_eq!(cpu.get_sp(), 0xFFFE);
        assert_eq!(cpu.get_pc(), 0x0003);
        assert_eq!(cpu.memory.read(0xC000).unwrap(), 0x5A);
        assert_eq!(cpu.instructions_executed(), 1);
    }

    #[test]
    fn test_restore_rejects_bad_checksum() {
        let rom = [0u8; BOOT_ROM_SIZE];
        let mut cpu = CPU::new(&rom);
        let mut snapshot = Snapshot::capture("zeros", &cpu, CheckpointReason::Manual);
        snapshot.checksum = "0".repeat(64);

        cpu.registers.a = 0x12;
        assert!(matches!(
            snapshot.restore(&mut cpu),
            Err(SnapshotError::ChecksumMismatch { .. })
        ));
        assert_eq!(cpu.registers.a, 0x12);
    }

    #[test]
    fn test_json_encodes_memory_as_base64() {
        let rom = [0u8; BOOT_ROM_SIZE];
        let cpu = CPU::new(&rom);
        let snapshot = Snapshot::capture("json", &cpu, CheckpointReason::BudgetExhausted);

        let json = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["memory"].is_string());
        assert_eq!(value["reason"], "BudgetExhausted");
        assert_eq!(value["compatibility"], "legacy");

        let parsed = Snapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
