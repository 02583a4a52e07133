//! Matrix-vector multiply microbenchmark on the CPU.
//!
//! N×N matrix times N vector with integer-valued inputs in [0, 100), timed
//! with the target cycle clock. The product is dumped as flat f32 so a later
//! accelerator run can be scored against it.
//!
//! Usage:
//!   cargo run --bin bench_matvec
//!   cargo run --bin bench_matvec -- --n 128 --seed 7 --out ref.bin

use anyhow::{Context, Result};
use convacc_driver::sink::{BinaryFileSink, ResultSink};
use convacc_driver::synth::Xoshiro;
use convacc_driver::{default_clock, matvec, CycleClock, Matrix};
use tracing_subscriber::EnvFilter;

const DEFAULT_N: usize = 64;
const DEFAULT_SEED: u64 = 1;
const DEFAULT_OUT: &str = "ref.bin";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let n = parse_arg(&args, "--n", DEFAULT_N);
    let seed = parse_arg(&args, "--seed", DEFAULT_SEED);
    let out = parse_arg(&args, "--out", DEFAULT_OUT.to_string());

    let mut rng = Xoshiro::new(seed);
    let mut next = || rng.next_below(100) as f32;
    let a = Matrix::from_fn(n, n, |_, _| next())?;
    let v: Vec<f32> = (0..n).map(|_| next()).collect();
    let mut product = vec![0.0f32; n];

    let clock = default_clock();
    let t0 = clock.cycles();
    matvec::multiply_into(&a, &v, &mut product)?;
    let elapsed = clock.since(t0);

    BinaryFileSink::new(&out)
        .persist(&product)
        .with_context(|| format!("writing {out}"))?;

    println!("Matrix-Vector Multiplication completed ({n}×{n}).");
    println!("Cycles taken: {elapsed}");
    println!("Result written to {out}");
    println!("Result vector:");
    let line: Vec<String> = product.iter().map(|x| format!("{x:.6}")).collect();
    println!("{}", line.join(" "));

    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
