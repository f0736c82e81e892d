use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use freeloader_core::mocks::{ScriptedLoadCell, ScriptedMotor};
use freeloader_core::{Acquisition, Rig, Sample, SampleSink, runner, write_csv};
use freeloader_traits::ManualClock;

// Ramp-then-hold force trace, long enough to reach the travel limit.
fn trace(n: usize) -> (Vec<i32>, Vec<f64>) {
    let positions = (1..=n).map(|i| i32::try_from(i).unwrap_or(i32::MAX)).collect();
    let weights = (0..n)
        .map(|i| {
            let x = i as f64 / n as f64;
            (x * 80.0).min(60.0) + 1.0
        })
        .collect();
    (positions, weights)
}

fn acquisition(n: usize, sink: Option<Box<dyn SampleSink + Send>>) -> Acquisition<ScriptedMotor, ScriptedLoadCell> {
    let (positions, weights) = trace(n);
    let mut rig = Rig::new();
    rig.connect_motor(|| Ok(ScriptedMotor::new().with_positions(positions)))
        .unwrap();
    rig.connect_load_cell(|| Ok(ScriptedLoadCell::weights(weights)))
        .unwrap();
    let mut b = Acquisition::builder()
        .with_rig(rig)
        .with_clock(Box::new(ManualClock::new()))
        .with_policy(freeloader_core::StopPolicy {
            travel_limit: i32::try_from(n).unwrap_or(i32::MAX),
            ..Default::default()
        });
    if let Some(s) = sink {
        b = b.with_sink(s);
    }
    b.build().unwrap()
}

struct NullSink;

impl SampleSink for NullSink {
    fn write_sample(&mut self, sample: &Sample) -> std::io::Result<()> {
        black_box(sample);
        Ok(())
    }
}

pub fn bench_run(c: &mut Criterion) {
    let mut g = c.benchmark_group("acquisition");
    if let Ok(n) = std::env::var("BENCH_SAMPLE_SIZE").map(|s| s.parse::<usize>()) {
        g.sample_size(n.unwrap_or(50).max(10));
    } else {
        g.sample_size(50);
    }

    for &n in &[100usize, 1_000] {
        g.bench_function(format!("run_{n}"), |b| {
            b.iter_batched(
                || acquisition(n, None),
                |mut acq| black_box(runner::run(&mut acq).unwrap()),
                BatchSize::SmallInput,
            );
        });
        g.bench_function(format!("run_{n}_with_sink"), |b| {
            b.iter_batched(
                || acquisition(n, Some(Box::new(NullSink))),
                |mut acq| black_box(runner::run(&mut acq).unwrap()),
                BatchSize::SmallInput,
            );
        });
    }
    g.finish();
}

pub fn bench_export(c: &mut Criterion) {
    let mut acq = acquisition(1_000, None);
    runner::run(&mut acq).unwrap();
    let samples = acq.log().snapshot();
    let meta = freeloader_core::RunMetadata::new("bench");
    c.bench_function("write_csv_1000", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(64 * 1024);
            write_csv(&mut buf, &meta, black_box(&samples)).unwrap();
            black_box(buf)
        });
    });
}

criterion_group!(benches, bench_run, bench_export);
criterion_main!(benches);
