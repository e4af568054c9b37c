use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sona_frontend::{
    AgcMode, CmnMode, FeatureAssembler, FeatureScheme, FrontEnd, FrontendConfig,
};
use sona_vad::{Segmenter, VadConfig};

fn make_sine(freq_hz: f64, n_samples: usize, sample_rate: usize) -> Vec<i16> {
    (0..n_samples)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (12000.0 * (freq_hz * 2.0 * std::f64::consts::PI * t).sin()) as i16
        })
        .collect()
}

fn bench_cepstra_1s(c: &mut Criterion) {
    let audio = make_sine(440.0, 16_000, 16_000); // 1s
    let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();

    c.bench_function("frontend_cepstra_1s", |b| {
        b.iter(|| {
            fe.start_utt();
            let _ = black_box(fe.process_utt(black_box(&audio)));
        });
    });
}

fn bench_cepstra_noise_removal_1s(c: &mut Criterion) {
    let cfg = FrontendConfig {
        remove_noise: true,
        ..FrontendConfig::default()
    };
    let audio = make_sine(440.0, 16_000, 16_000); // 1s
    let mut fe = FrontEnd::new(cfg).unwrap();

    c.bench_function("frontend_cepstra_denoised_1s", |b| {
        b.iter(|| {
            fe.start_utt();
            let _ = black_box(fe.process_utt(black_box(&audio)));
        });
    });
}

fn bench_features_s2_4x(c: &mut Criterion) {
    let audio = make_sine(440.0, 16_000, 16_000); // 1s
    let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
    fe.start_utt();
    let cep = fe.process_utt(&audio).unwrap();

    c.bench_function("frontend_features_s2_4x_1s", |b| {
        b.iter(|| {
            let mut fa = FeatureAssembler::new(
                FeatureScheme::S2_4x,
                CmnMode::Current,
                false,
                AgcMode::None,
                13,
            )
            .unwrap();
            let mut frames = cep.clone();
            let _ = black_box(fa.process_block(black_box(&mut frames)));
        });
    });
}

fn bench_vad_feed_1s(c: &mut Criterion) {
    let audio = make_sine(440.0, 16_000, 16_000); // 1s
    let mut seg = Segmenter::new(VadConfig::default()).unwrap();
    let mut buf = vec![0i16; 16_000];

    c.bench_function("vad_feed_read_1s", |b| {
        b.iter(|| {
            seg.reset();
            let mut offered = 0;
            while offered < audio.len() {
                offered += seg.feed(black_box(&audio[offered..]));
                loop {
                    let span = seg.read(&mut buf).unwrap();
                    if span.len == 0 {
                        break;
                    }
                    black_box(span);
                }
            }
        });
    });
}

criterion_group!(
    benches,
    bench_cepstra_1s,
    bench_cepstra_noise_removal_1s,
    bench_features_s2_4x,
    bench_vad_feed_1s,
);
criterion_main!(benches);
