use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma};

use cv_stereo_tuner::{prelude::*, sad::sad_factory};

fn texture(x: u32, y: u32) -> u8 {
    let mut h = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503);
    h ^= h >> 13;
    h = h.wrapping_mul(0x5bd1_e995);

    (h >> 24) as u8
}

fn pipeline_bench(c: &mut Criterion) {
    // Synthetic pair with a constant 8 pixel shift
    let left = GrayImage::from_fn(160, 120, |x, y| Luma([texture(x, y)]));
    let right = GrayImage::from_fn(160, 120, |x, y| Luma([texture(x + 8, y)]));
    let frame = StereoFrame::from_gray(left, right).unwrap();

    let mut pipeline = DisparityPipeline::new(frame, sad_factory);
    pipeline.set_param(FieldId::NumDisparities, 32).unwrap();

    c.bench_function("sad recompute 160x120", |b| {
        b.iter(|| black_box(pipeline.recompute().map(|r| r.elapsed_millis())))
    });

    c.bench_function("block size edit 160x120", |b| {
        let mut size = 5;
        b.iter(|| {
            size = if size == 5 { 9 } else { 5 };
            black_box(pipeline.set_param(FieldId::BlockSize, size))
        })
    });
}

criterion_group!(benches, pipeline_bench);
criterion_main!(benches);
