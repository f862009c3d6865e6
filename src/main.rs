use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser};
use lr35902_emulator::metrics::{gather_metrics, init_metrics};
use lr35902_emulator::{
    CheckpointReason, Compatibility, CoreConfig, Snapshot, BOOT_ROM_SIZE, CPU,
};

#[derive(Parser, Debug)]
#[command(name = "lr35902-emulator")]
#[command(about = "Run a 256-byte boot program on the LR35902 core", long_about = None)]
struct Args {
    /// Path to the 256-byte boot ROM image
    boot_rom: PathBuf,

    /// Maximum number of instructions to execute
    #[arg(long, default_value_t = 1_000_000)]
    steps: u64,

    /// JSON config file (memory_size, compatibility, record_metrics)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use hardware flag semantics instead of the legacy behavior
    #[arg(long, action = ArgAction::SetTrue)]
    accurate: bool,

    /// Print every executed instruction
    #[arg(long, action = ArgAction::SetTrue)]
    trace: bool,

    /// Record and print Prometheus metrics after the run
    #[arg(long, action = ArgAction::SetTrue)]
    metrics: bool,

    /// Write a JSON snapshot of the final state to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn load_boot_rom(path: &PathBuf) -> Result<[u8; BOOT_ROM_SIZE]> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if data.len() != BOOT_ROM_SIZE {
        bail!(
            "{} is {} bytes, boot ROM must be exactly {} bytes",
            path.display(),
            data.len(),
            BOOT_ROM_SIZE
        );
    }
    let mut rom = [0u8; BOOT_ROM_SIZE];
    rom.copy_from_slice(&data);
    Ok(rom)
}

fn build_cpu(args: &Args) -> Result<CPU> {
    let mut config = match &args.config {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CoreConfig::default(),
    };
    if args.accurate {
        config.compatibility = Compatibility::Accurate;
    }
    if args.metrics {
        config.record_metrics = true;
        init_metrics();
    }

    let rom = load_boot_rom(&args.boot_rom)?;
    Ok(CPU::with_config(config, &rom)?)
}

fn write_snapshot(args: &Args, cpu: &CPU, reason: CheckpointReason) -> Result<()> {
    if let Some(path) = &args.snapshot {
        let snapshot = Snapshot::capture(args.boot_rom.display().to_string(), cpu, reason);
        fs::write(path, snapshot.to_json()?)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        println!("Snapshot written to {}", path.display());
    }
    Ok(())
}

fn run(args: &Args, cpu: &mut CPU) -> Result<bool> {
    let mut executed = 0;
    let mut fault = None;

    while executed < args.steps {
        match cpu.step() {
            Ok(instruction) => {
                executed += 1;
                if args.trace {
                    println!("{}", instruction);
                }
            }
            Err(err) => {
                fault = Some(err);
                break;
            }
        }
    }

    if args.metrics {
        let text = gather_metrics().map_err(|err| anyhow!("gathering metrics: {}", err))?;
        println!("{}", text);
    }

    match fault {
        Some(fault) => {
            eprintln!("{}", fault.dump());
            write_snapshot(args, cpu, CheckpointReason::Fault)?;
            Ok(false)
        }
        None => {
            println!("Step budget exhausted after {} instructions", executed);
            println!("{}", cpu.registers);
            write_snapshot(args, cpu, CheckpointReason::BudgetExhausted)?;
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut cpu = match build_cpu(&args) {
        Ok(cpu) => cpu,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::from(2);
        }
    };

    match run(&args, &mut cpu) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
