use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use image::{DynamicImage, ImageFormat, RgbImage};
use optipress::engine::memory::WeightedSemaphore;
use optipress::engine::{fit_inside, plan_transform, SourceMetadata};
use optipress::{
    BatchExecutor, BatchOptions, InputItem, ProcessingSettings, ResizeMode, ResizeSettings,
    TargetFormat,
};
use std::hint::black_box;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode bench input");
    buf
}

fn bench_planner(c: &mut Criterion) {
    let settings = ProcessingSettings::new(TargetFormat::WebP)
        .with_resize(ResizeSettings::new(Some(1920), Some(1080), ResizeMode::Both));
    let source = SourceMetadata::new("jpeg", 6000, 4000);

    c.bench_function("fit_inside", |b| {
        b.iter(|| fit_inside(black_box(6000), black_box(4000), Some(1920), Some(1080)))
    });
    c.bench_function("plan_transform", |b| {
        b.iter(|| plan_transform(black_box(&source), black_box(&settings)))
    });
}

fn bench_batch(c: &mut Criterion) {
    let executor = BatchExecutor::new(BatchOptions::default()).expect("worker pool");
    let items: Vec<InputItem> = (0..8)
        .map(|i| InputItem::new(format!("img{i}.png"), png(640, 480)))
        .collect();

    let mut group = c.benchmark_group("batch_8x640x480");
    group.sample_size(10);
    for format in [TargetFormat::Jpeg, TargetFormat::WebP, TargetFormat::Png] {
        let settings = ProcessingSettings::new(format.clone())
            .with_resize(ResizeSettings::new(Some(320), None, ResizeMode::MaxWidth));
        group.bench_function(format.as_str(), |b| {
            b.iter(|| executor.run(black_box(&items), &settings).expect("batch"))
        });
    }
    group.finish();
}

fn bench_memory_semaphore(c: &mut Criterion) {
    const THREADS: usize = 8;
    const ITERS: usize = 2_000;
    const WEIGHT: u64 = 4 * 1024 * 1024;

    c.bench_function("semaphore_contention", |b| {
        b.iter_batched(
            || Arc::new(WeightedSemaphore::new(WEIGHT * 2)),
            |sem| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        let sem = Arc::clone(&sem);
                        thread::spawn(move || {
                            for _ in 0..ITERS {
                                let _permit = sem.acquire(WEIGHT);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().expect("worker");
                }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_planner, bench_batch, bench_memory_semaphore);
criterion_main!(benches);
