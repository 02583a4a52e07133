//! Co-verification of the simulated accelerator against the reference engine
//!
//! Runs the full harness path (driver handshake, reference, distortion,
//! verdict) with the in-process device model.

use convacc_driver::regs::{BUSY, BUSY_IDLE};
use convacc_driver::synth::{uniform_matrix, Xoshiro};
use convacc_driver::{
    read_f32_file, Accelerator, BinaryFileSink, ConvError, Harness, HarnessConfig, HostClock,
    Matrix, PollPolicy, ReferenceEngine, RegisterIo, RegisterMap, ResultSink,
    SimulatedAccelerator, Verdict,
};

fn sim() -> SimulatedAccelerator {
    // SAFETY: driven only through Accelerator::run / Harness::run.
    unsafe { SimulatedAccelerator::new(RegisterMap::REFERENCE) }
}

fn reference() -> ReferenceEngine<HostClock> {
    ReferenceEngine::new(HostClock::new())
}

#[test]
fn acceptance_shape_passes_with_exit_code_zero() {
    let harness = Harness::new(HarnessConfig::default());
    let mut acc = harness.accelerator(sim(), RegisterMap::REFERENCE, HostClock::new());
    let report = harness.run(&mut acc, &reference()).expect("harness run");

    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.verdict.exit_code(), 0);
    assert!(report.distortion.max_db <= -60.0, "max {}", report.distortion.max());
    assert!(report.distortion.mean_db <= -80.0, "mean {}", report.distortion.mean());
    assert_eq!(report.distortion.elements, 32);
    assert_eq!(acc.io().completed(), 1);
}

#[test]
fn acceptance_passes_for_many_seeds() {
    for seed in 0..16 {
        let harness = Harness::new(HarnessConfig::default().with_seed(seed));
        let mut acc = harness.accelerator(sim(), RegisterMap::REFERENCE, HostClock::new());
        let report = harness.run(&mut acc, &reference()).expect("harness run");
        assert_eq!(report.verdict, Verdict::Pass, "seed {seed}: {:?}", report.distortion);
    }
}

#[test]
fn device_and_reference_agree_across_shapes() {
    let mut rng = Xoshiro::new(2024);
    let shapes = [(1, 1, 1, 1), (5, 7, 5, 7), (16, 16, 3, 3), (9, 40, 2, 17), (33, 8, 33, 1)];
    let mut acc = Accelerator::new(sim(), RegisterMap::REFERENCE, HostClock::new());
    for (dr, dc, fr, fc) in shapes {
        let data = uniform_matrix(&mut rng, dr, dc, 1.0).unwrap();
        let filter = uniform_matrix(&mut rng, fr, fc, 1.0).unwrap();
        let expected = reference().convolve(&data, &filter).unwrap().output;

        let mut got = Matrix::zeros(expected.rows(), expected.cols()).unwrap();
        acc.run(&data, &filter, got.as_mut_slice()).unwrap();

        for (g, e) in got.as_slice().iter().zip(expected.as_slice()) {
            assert!(
                (g - e).abs() <= 1e-5 * e.abs().max(1.0),
                "{dr}x{dc} * {fr}x{fc}: {g} vs {e}"
            );
        }
    }
    assert_eq!(acc.io().completed(), shapes.len() as u64);
}

#[test]
fn output_gain_fault_fails_verdict() {
    let harness = Harness::default();
    let faulty = sim().with_output_gain(1.001);
    let mut acc = harness.accelerator(faulty, RegisterMap::REFERENCE, HostClock::new());
    let report = harness.run(&mut acc, &reference()).expect("harness run");

    // 0.1% on every element: max sits at the limit, mean far above it
    assert_eq!(report.verdict, Verdict::Fail);
    assert_eq!(report.verdict.exit_code(), 1);
    assert!(report.distortion.mean_db > -80.0);
}

#[test]
fn hung_device_surfaces_timeout() {
    let config = HarnessConfig::default().with_poll_policy(PollPolicy::MaxPolls(1_000));
    let harness = Harness::new(config);
    let mut acc = harness.accelerator(sim().hung(), RegisterMap::REFERENCE, HostClock::new());
    let err = harness.run(&mut acc, &reference()).unwrap_err();

    assert!(matches!(err, ConvError::DeviceTimeout { polls: 1_000, .. }));
    assert!(err.is_device_fault());
    assert!(acc.is_abandoned());

    let again = harness.run(&mut acc, &reference()).unwrap_err();
    assert!(matches!(again, ConvError::DeviceAbandoned));
}

#[test]
fn cycle_timeout_bounds_wait() {
    let config = HarnessConfig::default().with_poll_policy(PollPolicy::MaxCycles(50_000));
    let harness = Harness::new(config);
    let mut acc = harness.accelerator(sim().hung(), RegisterMap::REFERENCE, HostClock::new());
    match harness.run(&mut acc, &reference()).unwrap_err() {
        ConvError::DeviceTimeout { cycles, .. } => assert!(cycles >= 50_000),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn late_completion_after_timeout_is_memory_safe() {
    let mut slow = sim().with_latency_polls(100);
    {
        let config = HarnessConfig::default().with_poll_policy(PollPolicy::MaxPolls(4));
        let harness = Harness::new(config);
        let mut acc = harness.accelerator(&mut slow, RegisterMap::REFERENCE, HostClock::new());
        let err = harness.run(&mut acc, &reference()).unwrap_err();
        assert!(matches!(err, ConvError::DeviceTimeout { polls: 4, .. }));
        assert_eq!(acc.quarantined(), 1);
    }
    // Harness inputs and the driver are gone; the device is still running
    assert!(slow.is_busy());

    // Churn the allocator so a freed destination would be reused
    let churn: Vec<Vec<f32>> = (0..64).map(|i| vec![i as f32; 32]).collect();

    let mut reads = 0;
    while slow.read32(BUSY) != BUSY_IDLE {
        reads += 1;
        assert!(reads < 1_000, "device never went idle");
    }
    assert_eq!(slow.completed(), 1);
    for (i, v) in churn.iter().enumerate() {
        assert!(v.iter().all(|&x| x == i as f32), "heap block {i} overwritten");
    }
}

#[test]
fn reference_result_persists_through_sink() {
    let dir = tempfile::TempDir::new().unwrap();
    let harness = Harness::default();
    let mut acc = harness.accelerator(sim(), RegisterMap::REFERENCE, HostClock::new());
    let report = harness.run(&mut acc, &reference()).unwrap();

    let mut sink = BinaryFileSink::new(dir.path().join("ref.bin"));
    sink.persist(report.reference.as_slice()).unwrap();
    assert_eq!(read_f32_file(sink.path()).unwrap(), report.reference.as_slice());
}
