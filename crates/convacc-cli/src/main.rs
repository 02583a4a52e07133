//! `convacc` — co-verification of the 2-D convolution accelerator.
//!
//! ```text
//! USAGE:
//!   convacc run [--backend sim|devmem]   Run accelerator and reference, exit 0 on pass
//!   convacc regs [--base 0x4000]         Print the register map
//! ```
//!
//! `run` exits 0 when the distortion is within tolerance and 1 when it is not;
//! setup failures (mapping, shapes, device timeout) are reported and also
//! exit non-zero.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use convacc_chip::regs::{Register, RegisterMap, DEFAULT_BASE};
use convacc_driver::sink::{BinaryFileSink, ResultSink};
use convacc_driver::tolerances::{MAX_DISTORTION_DB, MEAN_DISTORTION_DB};
use convacc_driver::{
    default_clock, Harness, HarnessConfig, HarnessReport, MmioWindow, PollPolicy,
    ReferenceEngine, RegisterIo, SimulatedAccelerator, Tolerance,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convacc", about = "2-D convolution accelerator co-verification", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run one convolution on the accelerator and the reference and compare.
    Run(RunArgs),
    /// Print register offsets and addresses.
    Regs {
        /// Base address of the register window.
        #[arg(long, value_parser = parse_u64, default_value_t = DEFAULT_BASE)]
        base: u64,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// In-process device model.
    Sim,
    /// Register window mapped through /dev/mem (root).
    Devmem,
}

#[derive(Args)]
struct RunArgs {
    /// Register backend.
    #[arg(long, value_enum, default_value_t = Backend::Sim)]
    backend: Backend,

    /// Base address of the register window.
    #[arg(long, value_parser = parse_u64, default_value_t = DEFAULT_BASE)]
    base: u64,

    /// Source data rows.
    #[arg(long, default_value_t = 32)]
    data_rows: usize,

    /// Source data columns.
    #[arg(long, default_value_t = 32)]
    data_cols: usize,

    /// Filter rows.
    #[arg(long, default_value_t = 1)]
    filter_rows: usize,

    /// Filter columns.
    #[arg(long, default_value_t = 32)]
    filter_cols: usize,

    /// PRNG seed for the inputs.
    #[arg(long, value_parser = parse_u64, default_value_t = convacc_driver::harness::DEFAULT_SEED)]
    seed: u64,

    /// Give up after this many BUSY reads.
    #[arg(long, conflicts_with_all = ["max_cycles", "unbounded"])]
    max_polls: Option<u64>,

    /// Give up once this many cycles have passed since START.
    #[arg(long, conflicts_with = "unbounded")]
    max_cycles: Option<u64>,

    /// Wait for BUSY to clear however long it takes.
    #[arg(long)]
    unbounded: bool,

    /// Max distortion limit (dB).
    #[arg(long, default_value_t = MAX_DISTORTION_DB, allow_negative_numbers = true)]
    max_db: f64,

    /// Mean distortion limit (dB).
    #[arg(long, default_value_t = MEAN_DISTORTION_DB, allow_negative_numbers = true)]
    mean_db: f64,

    /// Simulated device: BUSY reads before completion.
    #[arg(long, default_value_t = convacc_driver::backends::simulated::DEFAULT_LATENCY_POLLS)]
    sim_latency: u32,

    /// Simulated device: scale every output by this factor.
    #[arg(long)]
    sim_gain: Option<f32>,

    /// Write the accelerator output here (flat f32).
    #[arg(long)]
    dump_hw: Option<PathBuf>,

    /// Write the reference output here (flat f32).
    #[arg(long)]
    dump_ref: Option<PathBuf>,
}

impl RunArgs {
    fn poll_policy(&self) -> PollPolicy {
        if self.unbounded {
            PollPolicy::Unbounded
        } else if let Some(c) = self.max_cycles {
            PollPolicy::MaxCycles(c)
        } else if let Some(p) = self.max_polls {
            PollPolicy::MaxPolls(p)
        } else {
            PollPolicy::default()
        }
    }

    fn harness_config(&self) -> HarnessConfig {
        HarnessConfig::default()
            .with_data(self.data_rows, self.data_cols)
            .with_filter(self.filter_rows, self.filter_cols)
            .with_seed(self.seed)
            .with_poll_policy(self.poll_policy())
            .with_tolerance(Tolerance::new(self.max_db, self.mean_db))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run(args) => {
            let code = cmd_run(&args)?;
            std::process::exit(code);
        }
        Cmd::Regs { base } => cmd_regs(base),
    }

    Ok(())
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let map = RegisterMap::REFERENCE.with_base(args.base);
    let harness = Harness::new(args.harness_config());
    harness.config().output_dims()?;

    let report = match args.backend {
        Backend::Sim => {
            // SAFETY: the model is only driven through Harness::run, which
            // programs it with live, correctly sized buffers.
            let mut sim =
                unsafe { SimulatedAccelerator::new(map) }.with_latency_polls(args.sim_latency);
            if let Some(gain) = args.sim_gain {
                sim = sim.with_output_gain(gain);
            }
            execute(&harness, sim, map)?
        }
        Backend::Devmem => {
            let window = MmioWindow::map_dev_mem(map.base, map.span())?;
            execute(&harness, window, map)?
        }
    };

    print_report(&report);

    if let Some(path) = &args.dump_hw {
        BinaryFileSink::new(path)
            .persist(report.measured.as_slice())
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &args.dump_ref {
        BinaryFileSink::new(path)
            .persist(report.reference.as_slice())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(report.verdict.exit_code())
}

fn execute<R: RegisterIo>(harness: &Harness, io: R, map: RegisterMap) -> Result<HarnessReport> {
    let mut acc = harness.accelerator(io, map, default_clock());
    let reference = ReferenceEngine::new(default_clock());
    let report = harness.run(&mut acc, &reference)?;
    Ok(report)
}

fn print_report(report: &HarnessReport) {
    println!("HW Accelerator Execution Time = {} Cycles", report.hw_cycles);
    println!("Reference Execution Time = {} Cycles", report.sw_cycles);
    println!("Mean Distortion = {}", report.distortion.mean());
    println!("Max Distortion = {}", report.distortion.max());
    println!("Energy Distortion = {} (informational)", report.distortion.energy());
    println!("Result: {}", report.verdict);
}

fn cmd_regs(base: u64) {
    let map = RegisterMap::REFERENCE.with_base(base);
    println!("Register window @ {:#x} ({:#x} bytes)", map.base, map.span());
    println!();
    println!("  {:<10} {:>6}  {:>12}  {:>5}  access", "name", "offset", "address", "width");
    for reg in Register::ALL {
        let access = match (reg.is_readable(), reg.is_writable()) {
            (true, true) => "rw",
            (true, false) => "ro",
            (false, true) => "wo",
            (false, false) => "--",
        };
        println!(
            "  {:<10} {:>#6x}  {:>#12x}  {:>5}  {access}",
            reg.name(),
            map.offset(reg),
            map.address(reg),
            reg.width().bytes() * 8,
        );
    }
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}
