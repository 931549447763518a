use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sbitx_iq::{
    audio::RingBuffer,
    constants::{CAPTURE_SAMPLE_RATE, DEFAULT_IF_HZ, DEFAULT_PERIOD_FRAMES, OUTPUT_SAMPLE_RATE},
    dsp::{ComplexSample, DownConverter},
};

/// One default period of stereo S32 with a tone 1 kHz above the IF on the left channel
fn period() -> Vec<i32> {
    let w = 2.0 * std::f64::consts::PI * (DEFAULT_IF_HZ + 1000.0) / CAPTURE_SAMPLE_RATE as f64;
    (0..DEFAULT_PERIOD_FRAMES as usize)
        .flat_map(|n| [((w * n as f64).cos() * 0.5 * i32::MAX as f64) as i32, 0])
        .collect()
}

fn benchmark(c: &mut Criterion) {
    let raw = period();
    let mut ddc = DownConverter::new(DEFAULT_IF_HZ, CAPTURE_SAMPLE_RATE, false);
    let mut out = Vec::with_capacity(raw.len() / 4);

    c.bench_function("ddc period", |b| {
        b.iter(|| {
            out.clear();
            ddc.process(black_box(&raw), &mut out)
        })
    });

    let ring = RingBuffer::for_output_rate(OUTPUT_SAMPLE_RATE);
    let mut read_buf = vec![ComplexSample::default(); DEFAULT_PERIOD_FRAMES as usize / 2];

    c.bench_function("ddc period into ring", |b| {
        b.iter(|| {
            out.clear();
            ddc.process(black_box(&raw), &mut out);
            ring.write(&out);
            ring.read(black_box(&mut read_buf))
        })
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
