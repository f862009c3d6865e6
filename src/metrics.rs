use std::sync::Once;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::error::FaultKind;
use crate::registers::{Registers, CARRY_FLAG, HALF_CARRY_FLAG, SUBTRACT_FLAG, ZERO_FLAG};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Counter for CPU instructions executed by opcode
    pub static ref CPU_INSTRUCTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cpu_instructions_total", "Total number of CPU instructions executed by opcode"),
        &["opcode", "instruction"]
    ).expect("Failed to create CPU instructions counter");

    /// Histogram for instruction execution time
    pub static ref INSTRUCTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("instruction_duration_seconds", "Time spent executing instructions")
            .buckets(vec![0.0000001, 0.0000005, 0.000001, 0.000005, 0.00001, 0.0001]),
        &["instruction"]
    ).expect("Failed to create instruction duration histogram");

    /// Counter for execution faults by kind
    pub static ref CPU_FAULTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cpu_faults_total", "Total number of execution faults"),
        &["kind"]
    ).expect("Failed to create CPU faults counter");

    /// Gauge for CPU register values
    pub static ref CPU_REGISTER_VALUES: GaugeVec = GaugeVec::new(
        Opts::new("cpu_register_value", "Current CPU register values"),
        &["register"]
    ).expect("Failed to create CPU register values gauge");

    /// Gauge for CPU flags
    pub static ref CPU_FLAGS: GaugeVec = GaugeVec::new(
        Opts::new("cpu_flags", "Current CPU flag states (0 or 1)"),
        &["flag"]
    ).expect("Failed to create CPU flags gauge");
}

static INIT: Once = Once::new();

/// Registers every metric with the global registry. Safe to call repeatedly.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(CPU_INSTRUCTIONS_TOTAL.clone()))
            .expect("Failed to register CPU instructions counter");

        REGISTRY
            .register(Box::new(INSTRUCTION_DURATION.clone()))
            .expect("Failed to register instruction duration histogram");

        REGISTRY
            .register(Box::new(CPU_FAULTS_TOTAL.clone()))
            .expect("Failed to register CPU faults counter");

        REGISTRY
            .register(Box::new(CPU_REGISTER_VALUES.clone()))
            .expect("Failed to register CPU register values gauge");

        REGISTRY
            .register(Box::new(CPU_FLAGS.clone()))
            .expect("Failed to register CPU flags gauge");
    });
}

/// Renders the registry in the Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    init_metrics();
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Record a CPU instruction execution
pub fn record_instruction(opcode: u8, instruction_name: &str, duration: Duration) {
    CPU_INSTRUCTIONS_TOTAL
        .with_label_values(&[&format!("0x{:02X}", opcode), instruction_name])
        .inc();

    INSTRUCTION_DURATION
        .with_label_values(&[instruction_name])
        .observe(duration.as_secs_f64());
}

/// Record an execution fault
pub fn record_fault(kind: &FaultKind) {
    CPU_FAULTS_TOTAL.with_label_values(&[kind.label()]).inc();
}

/// Update CPU register and flag gauges
pub fn update_cpu_registers(registers: &Registers) {
    for (name, value) in registers.named_values() {
        CPU_REGISTER_VALUES
            .with_label_values(&[name])
            .set(value as f64);
    }

    for (name, flag) in [
        ("zero", ZERO_FLAG),
        ("subtract", SUBTRACT_FLAG),
        ("half_carry", HALF_CARRY_FLAG),
        ("carry", CARRY_FLAG),
    ] {
        CPU_FLAGS
            .with_label_values(&[name])
            .set(if registers.get_flag(flag) { 1.0 } else { 0.0 });
    }
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
