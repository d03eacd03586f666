use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use kornia_style::loss::{gram_matrix, LossComputer};

fn feature(channels: usize, size: usize, seed: f64) -> Tensor {
    let n = channels * size * size;
    Tensor::arange(0f32, n as f32, &Device::Cpu)
        .and_then(|t| t.affine(0.013, seed))
        .and_then(|t| t.sin())
        .and_then(|t| t.reshape((1, channels, size, size)))
        .unwrap()
}

fn bench_gram_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("gram_matrix");

    // channels and spatial size of the default VGG19 capture points at 356x356
    for (channels, size) in [(64, 356), (128, 178), (256, 89), (512, 44), (512, 22)].iter() {
        group.throughput(criterion::Throughput::Elements(
            (*channels * *size * *size) as u64,
        ));

        let parameter_string = format!("{}x{}x{}", channels, size, size);
        let f = feature(*channels, *size, 0.0);

        group.bench_with_input(
            BenchmarkId::new("candle", &parameter_string),
            &f,
            |b, f| b.iter(|| gram_matrix(black_box(f))),
        );
    }
    group.finish();
}

fn bench_total_loss(c: &mut Criterion) {
    let mut group = c.benchmark_group("total_loss");

    let shapes = [(64, 64), (128, 32), (256, 16), (512, 8), (512, 4)];
    let generated = shapes.iter().map(|(c, s)| feature(*c, *s, 0.0)).collect::<Vec<_>>();
    let content = shapes.iter().map(|(c, s)| feature(*c, *s, 0.5)).collect::<Vec<_>>();
    let style = shapes.iter().map(|(c, s)| feature(*c, *s, 1.0)).collect::<Vec<_>>();
    let computer = LossComputer::default();

    group.bench_function("vgg19_64x64", |b| {
        b.iter(|| {
            computer.compute(
                black_box(&generated),
                black_box(&content),
                black_box(&style),
            )
        })
    });
    group.finish();
}

criterion_group!(benches, bench_gram_matrix, bench_total_loss);
criterion_main!(benches);
