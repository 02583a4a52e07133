//! bench_conv_shapes — accelerator vs CPU reference across convolution shapes
//!
//! Runs the co-verification harness over a sweep of data/filter shapes and
//! reports cycles and distortion for each. Exits 1 if any shape fails its
//! tolerance or errors.
//!
//! Usage:
//!   cargo run --bin bench_conv_shapes                    # simulated device
//!   cargo run --bin bench_conv_shapes -- --devmem        # live device at 0x4000 (root)
//!   cargo run --bin bench_conv_shapes -- --seed 9 --max-polls 100000

use anyhow::Result;
use convacc_driver::{
    default_clock, Harness, HarnessConfig, HarnessReport, MmioWindow, PollPolicy,
    ReferenceEngine, RegisterIo, RegisterMap, SimulatedAccelerator,
};
use tracing_subscriber::EnvFilter;

/// (data rows, data cols, filter rows, filter cols)
const SHAPES: &[(usize, usize, usize, usize)] = &[
    (32, 32, 1, 32),
    (32, 32, 1, 1),
    (32, 32, 3, 3),
    (32, 32, 5, 5),
    (64, 64, 3, 3),
    (64, 64, 8, 8),
    (16, 128, 1, 64),
    (128, 16, 16, 1),
    (8, 8, 8, 8),
];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let use_devmem = args.iter().any(|a| a == "--devmem");
    let seed = parse_arg(&args, "--seed", convacc_driver::harness::DEFAULT_SEED);
    let max_polls = parse_arg(&args, "--max-polls", convacc_driver::DEFAULT_MAX_POLLS);

    let map = RegisterMap::REFERENCE;
    println!("Convolution shape sweep");
    println!("=======================");
    println!("Backend : {}", if use_devmem { "/dev/mem" } else { "simulated" });
    println!("Seed    : {seed:#x}");
    println!();
    println!(
        "  {:<18} {:>12} {:>12} {:>8} {:>12} {:>12}  verdict",
        "shape", "hw cycles", "sw cycles", "sw/hw", "mean", "max"
    );

    let mut failed = 0usize;
    for &(dr, dc, fr, fc) in SHAPES {
        let config = HarnessConfig::default()
            .with_data(dr, dc)
            .with_filter(fr, fc)
            .with_seed(seed)
            .with_poll_policy(PollPolicy::MaxPolls(max_polls));
        let harness = Harness::new(config);
        let shape = format!("{dr}×{dc} * {fr}×{fc}");

        let result = if use_devmem {
            MmioWindow::map_dev_mem(map.base, map.span()).and_then(|w| run_shape(&harness, w, map))
        } else {
            // SAFETY: only driven through Harness::run.
            let sim = unsafe { SimulatedAccelerator::new(map) };
            run_shape(&harness, sim, map)
        };

        match result {
            Ok(r) => {
                #[allow(clippy::cast_precision_loss)]
                let ratio = r.sw_cycles as f64 / r.hw_cycles.max(1) as f64;
                println!(
                    "  {shape:<18} {:>12} {:>12} {:>7.2}× {:>12} {:>12}  {}",
                    r.hw_cycles,
                    r.sw_cycles,
                    ratio,
                    r.distortion.mean().to_string(),
                    r.distortion.max().to_string(),
                    r.verdict
                );
                if !r.verdict.passed() {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("  {shape:<18} ERROR {e}");
                failed += 1;
            }
        }
    }

    println!();
    if failed == 0 {
        println!("All {} shapes within tolerance", SHAPES.len());
    } else {
        println!("{failed} of {} shapes failed", SHAPES.len());
        std::process::exit(1);
    }
    Ok(())
}

fn run_shape<R: RegisterIo>(
    harness: &Harness,
    io: R,
    map: RegisterMap,
) -> convacc_driver::Result<HarnessReport> {
    let mut acc = harness.accelerator(io, map, default_clock());
    harness.run(&mut acc, &ReferenceEngine::new(default_clock()))
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
