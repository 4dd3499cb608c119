//! Criterion benchmarks for preprocessing and the embedding backends.
//!
//! Backend benchmarks need the model files under the crate root
//! (see `Config::default`) and are skipped when they are missing.

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};

use facebench::bench::EmbeddingBackend;
use facebench::config::Config;
use facebench::engine::detector::nms;
use facebench::engine::preprocess::{
    align_face_in_place, estimate_similarity_transform, letterbox, ARCFACE_TEMPLATE,
    DETECTOR_INPUT_SIZE,
};
use facebench::engine::{ArcFaceEmbedder, FaceBox};
use facebench::service::BenchHarness;

fn reference() -> RgbImage {
    RgbImage::from_fn(1280, 720, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 96]))
}

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");
    let image = reference();
    let landmarks = ARCFACE_TEMPLATE.map(|(x, y)| (x * 1.7 + 300.0, y * 1.7 + 120.0));

    group.bench_function("letterbox", |b| {
        b.iter(|| black_box(letterbox(black_box(&image), DETECTOR_INPUT_SIZE)))
    });

    group.bench_function("similarity_transform", |b| {
        b.iter(|| black_box(estimate_similarity_transform(black_box(&landmarks), &ARCFACE_TEMPLATE)))
    });

    group.bench_function("align_face", |b| {
        b.iter(|| {
            let mut aligned = image.clone();
            align_face_in_place(&mut aligned, black_box(&landmarks));
            black_box(aligned)
        })
    });

    let boxes: Vec<FaceBox> = (0..200)
        .map(|i| {
            let x = (i % 20) as f32 * 30.0;
            let y = (i / 20) as f32 * 30.0;
            FaceBox {
                x1: x,
                y1: y,
                x2: x + 60.0,
                y2: y + 60.0,
                confidence: 1.0 - i as f32 / 400.0,
                landmarks: [(x + 30.0, y + 30.0); 5],
            }
        })
        .collect();

    group.bench_function("nms_200", |b| {
        b.iter(|| black_box(nms(black_box(boxes.clone()), 0.4)))
    });

    group.finish();
}

fn bench_backends(c: &mut Criterion) {
    let base_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = Config::load(&base_dir.join(Config::default_file_name())).unwrap_or_default();

    let harness = match BenchHarness::<ArcFaceEmbedder>::setup(&config, base_dir) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Skipping backend benchmarks: {}", e);
            return;
        }
    };

    if harness.fixtures().is_empty() {
        eprintln!("Skipping backend benchmarks: no faces in reference image");
        return;
    }

    if let Err(e) = harness.verify() {
        panic!("Backend check failed: {}", e);
    }

    let mut group = c.benchmark_group("embedding");
    group.sample_size(20);

    for backend in harness.backends() {
        group.bench_function(backend.name(), |b| {
            b.iter(|| {
                for face in harness.fixtures() {
                    let embedding = backend
                        .generate_embedding(black_box(face))
                        .unwrap_or_else(|e| panic!("{} failed: {:#}", backend.name(), e));
                    black_box(embedding);
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_preprocess, bench_backends);
criterion_main!(benches);
