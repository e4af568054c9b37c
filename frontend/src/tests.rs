//! End-to-end pipeline tests: VAD-gated audio through the front end and the
//! feature assembler.

use sona_vad::{Segmenter, SpanKind, VadConfig};

use crate::{
    AgcMode, CmnMode, FeatureAssembler, FeatureScheme, FrontEnd, FrontendConfig,
};

fn noise(len: usize, seed: &mut u32) -> Vec<i16> {
    (0..len)
        .map(|_| {
            *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            ((*seed >> 16) % 61) as i16 - 30
        })
        .collect()
}

fn tone(len: usize, amp: f64, hz: f64, sr: f64) -> Vec<i16> {
    (0..len)
        .map(|i| (amp * (2.0 * std::f64::consts::PI * hz * i as f64 / sr).sin()) as i16)
        .collect()
}

/// Runs raw audio through the segmenter and returns the concatenated speech
/// samples.
fn gate_speech(audio: &[i16]) -> Vec<i16> {
    let mut seg = Segmenter::new(VadConfig::default()).unwrap();
    let mut speech = Vec::new();
    let mut buf = vec![0i16; 8192];
    let mut offered = 0;
    while offered < audio.len() {
        offered += seg.feed(&audio[offered..]);
        loop {
            let span = seg.read(&mut buf).unwrap();
            if span.len == 0 {
                break;
            }
            if span.kind == SpanKind::Speech {
                speech.extend_from_slice(&buf[..span.len]);
            }
        }
    }
    seg.end_of_stream();
    loop {
        let span = seg.read(&mut buf).unwrap();
        if span.len == 0 {
            break;
        }
        if span.kind == SpanKind::Speech {
            speech.extend_from_slice(&buf[..span.len]);
        }
    }
    speech
}

#[test]
fn vad_gated_tone_burst_reaches_features() {
    // 2 s background, 0.5 s of loud 1 kHz tone, 1 s background.
    let mut rng = 5u32;
    let mut audio = noise(32_000, &mut rng);
    audio.extend(tone(8_000, 8000.0, 1000.0, 16_000.0));
    audio.extend(noise(16_000, &mut rng));

    let speech = gate_speech(&audio);
    // The gated span covers the tone plus leader/trailer padding.
    assert!(speech.len() >= 8_000, "gated only {} samples", speech.len());
    assert!(speech.len() <= 8_000 + 40 * 256);

    let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
    fe.start_utt();
    let mut cep = fe.process_utt(&speech).unwrap();
    let mut tail = vec![0.0f32; fe.output_dim()];
    if fe.end_utt(&mut tail).unwrap() == 1 {
        cep.push(tail);
    }
    assert!(!cep.is_empty());

    let mut fa = FeatureAssembler::new(
        FeatureScheme::S3_1x39,
        CmnMode::Current,
        false,
        AgcMode::Max,
        13,
    )
    .unwrap();
    let nframes = cep.len();
    let feats = fa.process_block(&mut cep).unwrap();
    assert_eq!(feats.len(), nframes);
    assert!(feats.iter().all(|f| f.len() == 39));
    // AGC Max pins the utterance C0 max (component 24 here) to zero.
    let max_c0 = feats.iter().map(|f| f[24]).fold(f32::MIN, f32::max);
    assert!(max_c0.abs() < 1e-5, "max C0 after AGC: {max_c0}");
}

#[test]
fn streaming_pipeline_matches_block_pipeline() {
    let audio = tone(24_000, 7000.0, 600.0, 16_000.0);

    // Block: one shot through front end and assembler.
    let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
    fe.start_utt();
    let mut cep = fe.process_utt(&audio).unwrap();
    let mut fa = FeatureAssembler::new(
        FeatureScheme::CepDeltaDelta,
        CmnMode::Prior,
        false,
        AgcMode::None,
        13,
    )
    .unwrap();
    let block = fa.process_block(&mut cep).unwrap();

    // Live: awkward audio chunks into the front end, cepstra dribbled into
    // the assembler.
    let mut fe2 = FrontEnd::new(FrontendConfig::default()).unwrap();
    fe2.start_utt();
    let mut fa2 = FeatureAssembler::new(
        FeatureScheme::CepDeltaDelta,
        CmnMode::Prior,
        false,
        AgcMode::None,
        13,
    )
    .unwrap();

    let dim = fe2.output_dim();
    let mut out = vec![0.0f32; 16 * dim];
    let mut live: Vec<Vec<f32>> = Vec::new();
    let mut first = true;
    let mut pending: Vec<Vec<f32>> = Vec::new();
    for chunk in audio.chunks(931) {
        let mut cursor = chunk;
        while !cursor.is_empty() {
            let n = fe2.process_frames(&mut cursor, &mut out).unwrap();
            if n == 0 {
                break;
            }
            pending.extend(out[..n * dim].chunks_exact(dim).map(|c| c.to_vec()));
        }
        if !pending.is_empty() {
            let (used, feats) = fa2.process_live(&mut pending, first, false).unwrap();
            assert_eq!(used, pending.len());
            pending.clear();
            first = false;
            live.extend(feats);
        }
    }
    let (_, feats) = fa2.process_live(&mut [], first, true).unwrap();
    live.extend(feats);

    assert_eq!(block.len(), live.len());
    for (i, (a, b)) in block.iter().zip(live.iter()).enumerate() {
        for (j, (&x, &y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).abs() < 1e-4, "frame {i} dim {j}: {x} vs {y}");
        }
    }
}
