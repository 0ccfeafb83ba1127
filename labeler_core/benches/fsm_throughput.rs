use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use crossbeam_channel as xch;
use labeler_core::{BatchFsm, FsmConfig, StabilityDetector, WeightSample};

// Synthetic unloading trace: 9 → 8 → 2 → 0 kg with xorshift noise at `hz`.
fn synth_trace(hz: f64, noise_amp: f64, seed: u32) -> Vec<WeightSample> {
    let mut state = seed.max(1);
    let mut next_unit = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    let segments = [(0.0, 1.0), (9.0, 3.0), (8.0, 3.0), (2.0, 3.0), (0.0, 2.0)];
    let mut out = Vec::new();
    let mut t = 0.0;
    for (weight, secs) in segments {
        let n = (secs * hz) as usize;
        for _ in 0..n {
            let noise = (next_unit() * 2.0 - 1.0) * noise_amp;
            out.push(WeightSample::kg((weight + noise).max(0.0), t));
            t += 1.0 / hz;
        }
    }
    out
}

fn run_trace(trace: &[WeightSample]) -> usize {
    let (tx, rx) = xch::unbounded();
    let mut fsm = BatchFsm::new(tx, StabilityDetector::default(), FsmConfig::default());
    fsm.start_batch("BENCH", "P1", 1.0);
    for s in trace {
        fsm.process_sample(s);
        // Stand in for the service's acknowledge.
        if rx.try_recv().is_ok() {
            fsm.acknowledge_print();
        }
    }
    rx.len()
}

fn bench_fsm(c: &mut Criterion) {
    let mut group = c.benchmark_group("fsm_throughput");
    for hz in [10.0, 100.0] {
        let trace = synth_trace(hz, 0.004, 0xC0FFEE);
        group.bench_function(format!("unloading_trace_{hz}hz"), |b| {
            b.iter_batched(
                || trace.clone(),
                |t| black_box(run_trace(&t)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_detector(c: &mut Criterion) {
    let trace = synth_trace(100.0, 0.004, 7);
    c.bench_function("detector_add_sample_100hz", |b| {
        b.iter(|| {
            let mut det = StabilityDetector::default();
            for s in &trace {
                det.add_sample(s);
            }
            black_box(det.is_stable())
        })
    });
}

criterion_group!(benches, bench_fsm, bench_detector);
criterion_main!(benches);
