//! Streaming cepstral front end.

use tracing::debug;

use sona_dsp::{pre_emphasis, samples_to_frame, Dither, HammingWindow, MelBank, MelConfig, RealFft};

use crate::config::{FrontendConfig, SpectrumMode, Transform};
use crate::error::FrontendError;
use crate::noise::NoiseSuppressor;

/// Additive floor before the log, keeping silence out of `ln(0)`.
const LOG_FLOOR: f64 = 1e-4;

/// Converts raw 16-bit PCM into per-frame cepstra (or log mel spectra).
///
/// Frames are `frame_size` samples advancing by `frame_shift`; partial data
/// between calls lives in an overflow buffer so that chunked processing is
/// sample-exact against block processing, regardless of chunk sizes.
pub struct FrontEnd {
    cfg: FrontendConfig,
    frame_size: usize,
    frame_shift: usize,
    output_dim: usize,

    fft: RealFft,
    window: HammingWindow,
    bank: MelBank,
    dither: Option<Dither>,
    noise: Option<NoiseSuppressor>,

    /// Current raw frame, `frame_size` samples.
    spch: Vec<i16>,
    /// FFT work buffer, `fft_size` values.
    frame: Vec<f64>,
    /// Power spectrum, `fft_size/2 + 1` bins.
    spec: Vec<f64>,
    /// Mel spectrum scratch.
    mfspec: Vec<f64>,
    /// Cepstrum scratch for the smoothed-spectrum mode.
    scratch_cep: Vec<f32>,

    overflow: Vec<i16>,
    /// Relevant overflow samples; transiently negative inside the streaming
    /// loop while old history is being consumed.
    num_overflow: isize,
    /// Last input sample of the previous frame, for pre-emphasis.
    prior: i16,
    started: bool,
}

impl FrontEnd {
    pub fn new(cfg: FrontendConfig) -> Result<Self, FrontendError> {
        let frame_size = cfg.frame_size();
        let frame_shift = cfg.frame_shift();
        if frame_size > cfg.fft_size {
            return Err(FrontendError::InvalidConfig(format!(
                "frame size {frame_size} exceeds FFT size {}",
                cfg.fft_size
            )));
        }
        if frame_shift == 0 || frame_shift > frame_size {
            return Err(FrontendError::InvalidConfig(format!(
                "frame shift {frame_shift} out of range for frame size {frame_size}"
            )));
        }

        let fft = RealFft::new(cfg.fft_size)?;
        let bank = MelBank::new(&MelConfig {
            sample_rate: cfg.sample_rate,
            fft_size: cfg.fft_size,
            num_filters: cfg.num_filters,
            num_cepstra: cfg.num_cepstra,
            lower_freq: cfg.lower_freq,
            upper_freq: cfg.upper_freq,
            warp: cfg.warp,
            lifter: cfg.lifter,
            doublewide: cfg.doublewide_filters,
            unit_area: cfg.unit_area,
            round_filters: cfg.round_filters,
        })?;

        debug!(
            frame_size,
            frame_shift,
            fft_size = cfg.fft_size,
            filters = cfg.num_filters,
            cepstra = cfg.num_cepstra,
            "front end initialized"
        );

        Ok(Self {
            frame_size,
            frame_shift,
            output_dim: cfg.output_dim(),
            fft,
            window: HammingWindow::new(frame_size),
            dither: cfg.dither.then(|| Dither::new(cfg.seed)),
            noise: cfg.remove_noise.then(|| NoiseSuppressor::new(cfg.num_filters)),
            spch: vec![0; frame_size],
            frame: vec![0.0; cfg.fft_size],
            spec: vec![0.0; cfg.fft_size / 2 + 1],
            mfspec: vec![0.0; cfg.num_filters],
            scratch_cep: vec![0.0; cfg.num_cepstra],
            overflow: vec![0; frame_size],
            num_overflow: 0,
            prior: 0,
            started: false,
            bank,
            cfg,
        })
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frame_shift(&self) -> usize {
        self.frame_shift
    }

    /// Begins an utterance: clears carried samples, the pre-emphasis prior
    /// and the noise statistics. Idempotent.
    pub fn start_utt(&mut self) {
        self.num_overflow = 0;
        self.overflow.iter_mut().for_each(|s| *s = 0);
        self.prior = 0;
        self.started = true;
        if let Some(noise) = &mut self.noise {
            noise.reset();
        }
    }

    /// Frames that `process_frames` would produce for `nsamps` new samples.
    pub fn frames_ready(&self, nsamps: usize) -> usize {
        let have = nsamps + self.num_overflow.max(0) as usize;
        if have < self.frame_size {
            0
        } else {
            1 + (have - self.frame_size) / self.frame_shift
        }
    }

    fn spch_to_frame(&mut self, len: usize) {
        if self.cfg.pre_emphasis_alpha != 0.0 && len > 0 {
            pre_emphasis(
                &self.spch[..len],
                &mut self.frame[..len],
                self.cfg.pre_emphasis_alpha,
                self.prior,
            );
            self.prior = self.spch[len.min(self.frame_shift) - 1];
        } else {
            samples_to_frame(&self.spch[..len], &mut self.frame[..len]);
        }

        for v in &mut self.frame[len..] {
            *v = 0.0;
        }
        self.window
            .apply(&mut self.frame[..self.frame_size], self.cfg.remove_dc);
    }

    fn read_frame(&mut self, input: &[i16]) {
        let len = input.len().min(self.frame_size);
        self.spch[..len].copy_from_slice(&input[..len]);
        if let Some(d) = &mut self.dither {
            d.apply(&mut self.spch[..len]);
        }
        self.spch_to_frame(len);
    }

    fn shift_frame(&mut self, input: &[i16]) {
        let len = input.len().min(self.frame_shift);
        let offset = self.frame_size - self.frame_shift;
        self.spch.copy_within(self.frame_shift.., 0);
        self.spch[offset..offset + len].copy_from_slice(&input[..len]);
        if let Some(d) = &mut self.dither {
            d.apply(&mut self.spch[offset..offset + len]);
        }
        self.spch_to_frame(offset + len);
    }

    /// Spectral chain for the frame currently in the work buffer.
    fn write_frame(&mut self, out: &mut [f32]) {
        self.fft.transform(&mut self.frame);
        self.fft.power_spectrum(&self.frame, &mut self.spec);
        self.bank.apply(&self.spec, &mut self.mfspec);

        if let Some(noise) = &mut self.noise {
            noise.remove_noise(&mut self.mfspec);
        }

        for v in &mut self.mfspec {
            *v = (*v + LOG_FLOOR).ln();
        }

        match self.cfg.spectrum {
            SpectrumMode::RawLog => {
                for (o, &v) in out.iter_mut().zip(self.mfspec.iter()) {
                    *o = v as f32;
                }
            }
            SpectrumMode::SmoothLog => {
                self.bank.dct2(&self.mfspec, &mut self.scratch_cep, false);
                self.bank.dct3(&self.scratch_cep, &mut self.mfspec);
                for (o, &v) in out.iter_mut().zip(self.mfspec.iter()) {
                    *o = v as f32;
                }
            }
            SpectrumMode::Cepstral => {
                match self.cfg.transform {
                    Transform::Legacy => self.bank.spec_to_cep(&self.mfspec, out),
                    Transform::Dct2 => self.bank.dct2(&self.mfspec, out, false),
                    Transform::Htk => self.bank.dct2(&self.mfspec, out, true),
                }
                self.bank.lifter(out);
            }
        }
    }

    /// Computes one frame from exactly `frame_size` samples (shorter input
    /// is zero-padded). Ignores the overflow buffer; streaming callers want
    /// [`process_frames`](Self::process_frames).
    pub fn process_frame(&mut self, samples: &[i16], out: &mut [f32]) -> Result<(), FrontendError> {
        if out.len() < self.output_dim {
            return Err(FrontendError::OutputTooSmall {
                need: self.output_dim,
                got: out.len(),
            });
        }
        self.read_frame(samples);
        self.write_frame(&mut out[..self.output_dim]);
        Ok(())
    }

    /// Consumes samples from the front of `*samples` and appends cepstral
    /// frames to `out` (one frame per `output_dim` values). Returns the
    /// number of frames written. Up to a frame of unconsumed samples stays
    /// in the overflow buffer; the produced frames are identical to block
    /// processing no matter how the input is chunked.
    pub fn process_frames(
        &mut self,
        samples: &mut &[i16],
        out: &mut [f32],
    ) -> Result<usize, FrontendError> {
        let orig: &[i16] = samples;
        let max_frames = out.len() / self.output_dim;

        // Not enough for a single frame: stash everything.
        if orig.len() + (self.num_overflow.max(0) as usize) < self.frame_size {
            if !orig.is_empty() {
                let n = self.num_overflow.max(0) as usize;
                self.overflow[n..n + orig.len()].copy_from_slice(orig);
                self.num_overflow = (n + orig.len()) as isize;
                *samples = &orig[orig.len()..];
            }
            return Ok(0);
        }
        if max_frames == 0 {
            return Ok(0);
        }

        let orig_n_overflow = self.num_overflow.max(0) as usize;
        let mut frame_count =
            1 + (orig.len() + orig_n_overflow - self.frame_size) / self.frame_shift;
        frame_count = frame_count.min(max_frames);

        let mut cursor: &[i16] = orig;
        let mut outidx = 0usize;
        let mut rows = out.chunks_exact_mut(self.output_dim);

        // First frame, splicing in any carried overflow.
        if orig_n_overflow > 0 {
            let offset = self.frame_size - orig_n_overflow;
            self.overflow[orig_n_overflow..].copy_from_slice(&cursor[..offset]);
            let ovf = std::mem::take(&mut self.overflow);
            self.read_frame(&ovf);
            self.overflow = ovf;
            if let Some(row) = rows.next() {
                self.write_frame(row);
                outidx += 1;
            }
            cursor = &cursor[offset..];
            self.num_overflow -= self.frame_shift as isize;
        } else {
            self.read_frame(&cursor[..self.frame_size]);
            if let Some(row) = rows.next() {
                self.write_frame(row);
                outidx += 1;
            }
            cursor = &cursor[self.frame_size..];
        }

        for _ in 1..frame_count {
            self.shift_frame(&cursor[..self.frame_shift]);
            if let Some(row) = rows.next() {
                self.write_frame(row);
                outidx += 1;
            }
            cursor = &cursor[self.frame_shift..];
            if self.num_overflow > 0 {
                self.num_overflow -= self.frame_shift as isize;
            }
        }

        let consumed = orig.len() - cursor.len();

        if self.num_overflow <= 0 {
            // Keep the trailing window history plus whatever partial shift
            // remains, so the next call can resume mid-stream.
            let extra = cursor.len().min(self.frame_shift);
            let keep = (self.frame_size - self.frame_shift).min(consumed);
            let total = keep + extra;
            self.num_overflow = total as isize;
            if total > 0 {
                let start = consumed - keep;
                self.overflow[..total].copy_from_slice(&orig[start..start + total]);
                cursor = &cursor[extra..];
            }
        } else {
            // Old history still relevant: compact it and append new data.
            let kept = self.num_overflow as usize;
            self.overflow.copy_within(orig_n_overflow - kept..orig_n_overflow, 0);
            let n_over = orig.len().min(self.frame_size - kept);
            self.overflow[kept..kept + n_over].copy_from_slice(&orig[..n_over]);
            self.num_overflow = (kept + n_over) as isize;
            if n_over > consumed {
                cursor = &cursor[n_over - consumed..];
            }
        }

        *samples = cursor;
        Ok(outidx)
    }

    /// Whole-utterance convenience over [`process_frames`](Self::process_frames).
    pub fn process_utt(&mut self, samples: &[i16]) -> Result<Vec<Vec<f32>>, FrontendError> {
        let nframes = self.frames_ready(samples.len());
        let mut flat = vec![0.0f32; nframes.max(1) * self.output_dim];
        let mut cursor = samples;
        let written = self.process_frames(&mut cursor, &mut flat)?;
        Ok(flat[..written * self.output_dim]
            .chunks_exact(self.output_dim)
            .map(|c| c.to_vec())
            .collect())
    }

    /// Flushes the overflow buffer as one final (zero-padded) frame.
    /// Returns the number of frames written, 0 or 1.
    pub fn end_utt(&mut self, out: &mut [f32]) -> Result<usize, FrontendError> {
        let n = if self.num_overflow > 0 {
            if out.len() < self.output_dim {
                return Err(FrontendError::OutputTooSmall {
                    need: self.output_dim,
                    got: out.len(),
                });
            }
            let len = self.num_overflow as usize;
            let ovf = std::mem::take(&mut self.overflow);
            self.read_frame(&ovf[..len]);
            self.overflow = ovf;
            self.write_frame(&mut out[..self.output_dim]);
            1
        } else {
            0
        };
        self.num_overflow = 0;
        self.started = false;
        Ok(n)
    }

    /// Legacy cepstral transform over an externally computed log mel
    /// spectrum.
    pub fn logspec_to_cep(&self, log_spec: &[f32], cep: &mut [f32]) {
        let spec: Vec<f64> = log_spec.iter().map(|&v| v as f64).collect();
        self.bank.spec_to_cep(&spec, cep);
    }

    /// Unitary DCT-II over an externally computed log mel spectrum.
    pub fn logspec_dct2(&self, log_spec: &[f32], cep: &mut [f32]) {
        let spec: Vec<f64> = log_spec.iter().map(|&v| v as f64).collect();
        self.bank.dct2(&spec, cep, false);
    }

    /// Reconstructs a smoothed log mel spectrum from cepstra (DCT-III).
    pub fn cep_to_smoothed_spec(&self, cep: &[f32], log_spec: &mut [f32]) {
        let mut spec = vec![0.0f64; self.cfg.num_filters];
        self.bank.dct3(cep, &mut spec);
        for (o, &v) in log_spec.iter_mut().zip(spec.iter()) {
            *o = v as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, amp: f64, hz: f64, sr: f64) -> Vec<i16> {
        (0..len)
            .map(|i| (amp * (2.0 * std::f64::consts::PI * hz * i as f64 / sr).sin()) as i16)
            .collect()
    }

    #[test]
    fn rejects_frame_larger_than_fft() {
        let cfg = FrontendConfig {
            fft_size: 256, // frame size stays 410
            ..FrontendConfig::default()
        };
        assert!(FrontEnd::new(cfg).is_err());
    }

    #[test]
    fn silence_produces_floor_cepstra() {
        // 1 s of digital silence at the default geometry: 98 frames whose
        // C0 sits at the log floor and whose higher cepstra are near zero.
        let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
        fe.start_utt();
        let silence = vec![0i16; 16_000];
        assert_eq!(fe.frames_ready(16_000), 98);
        let frames = fe.process_utt(&silence).unwrap();
        assert_eq!(frames.len(), 98);

        for (n, frame) in frames.iter().enumerate() {
            assert!(frame[0] < -8.0, "frame {n} C0 = {}", frame[0]);
            for (i, &c) in frame[1..].iter().enumerate() {
                assert!(c.abs() < 0.2, "frame {n} c{} = {c}", i + 1);
            }
        }
    }

    #[test]
    fn chunked_matches_block() {
        let audio = tone(16_000, 8000.0, 440.0, 16_000.0);

        let mut fe_block = FrontEnd::new(FrontendConfig::default()).unwrap();
        fe_block.start_utt();
        let block = fe_block.process_utt(&audio).unwrap();

        let mut fe_chunk = FrontEnd::new(FrontendConfig::default()).unwrap();
        fe_chunk.start_utt();
        let dim = fe_chunk.output_dim();
        let mut chunked: Vec<Vec<f32>> = Vec::new();
        let mut out = vec![0.0f32; 32 * dim];
        // Deliberately awkward chunk sizes.
        for chunk in audio.chunks(373) {
            let mut cursor = chunk;
            while !cursor.is_empty() {
                let n = fe_chunk.process_frames(&mut cursor, &mut out).unwrap();
                chunked.extend(out[..n * dim].chunks_exact(dim).map(|c| c.to_vec()));
                if n == 0 {
                    break;
                }
            }
        }

        assert_eq!(block.len(), chunked.len());
        for (i, (a, b)) in block.iter().zip(chunked.iter()).enumerate() {
            for (j, (&x, &y)) in a.iter().zip(b.iter()).enumerate() {
                assert!((x - y).abs() < 1e-6, "frame {i} dim {j}: {x} vs {y}");
            }
        }
    }

    #[test]
    fn liftering_reweights_cepstra() {
        let audio = tone(16_000, 8000.0, 440.0, 16_000.0);

        let mut plain = FrontEnd::new(FrontendConfig::default()).unwrap();
        plain.start_utt();
        let base = plain.process_utt(&audio).unwrap();

        let cfg = FrontendConfig {
            lifter: 22,
            ..FrontendConfig::default()
        };
        let mut fe = FrontEnd::new(cfg).unwrap();
        fe.start_utt();
        let lifted = fe.process_utt(&audio).unwrap();

        // w[i] = 1 + (L/2)·sin(π·i/L): C0 keeps weight 1, C1 scales up.
        let w1 = 1.0 + 11.0 * (std::f64::consts::PI / 22.0).sin();
        assert_eq!(base.len(), lifted.len());
        for (a, b) in base.iter().zip(lifted.iter()) {
            assert!((a[0] - b[0]).abs() < 1e-6);
            assert!((b[1] as f64 - a[1] as f64 * w1).abs() < 1e-3);
        }
    }

    #[test]
    fn empty_input_yields_a_floor_frame() {
        let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
        fe.start_utt();
        let mut out = vec![0.0f32; fe.output_dim()];
        fe.process_frame(&[], &mut out).unwrap();
        // Zero-padded all the way down: the frame sits at the log floor.
        assert!(out[0] < -8.0, "C0 = {}", out[0]);
    }

    #[test]
    fn start_utt_discards_carried_state() {
        let audio = tone(16_000, 8000.0, 440.0, 16_000.0);

        let mut fresh = FrontEnd::new(FrontendConfig::default()).unwrap();
        fresh.start_utt();
        let want = fresh.process_utt(&audio).unwrap();

        let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
        fe.start_utt();
        let _ = fe.process_utt(&audio[..5000]).unwrap();
        fe.start_utt();
        fe.start_utt();
        let got = fe.process_utt(&audio).unwrap();

        assert_eq!(want.len(), got.len());
        for (a, b) in want.iter().zip(got.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn end_utt_flushes_remainder() {
        let mut fe = FrontEnd::new(FrontendConfig::default()).unwrap();
        fe.start_utt();
        let audio = tone(500, 5000.0, 300.0, 16_000.0);
        let frames = fe.process_utt(&audio).unwrap();
        assert_eq!(frames.len(), 1); // 500 samples = 1 full frame + leftover

        let mut last = vec![0.0f32; fe.output_dim()];
        assert_eq!(fe.end_utt(&mut last).unwrap(), 1);
        // A second flush finds nothing.
        assert_eq!(fe.end_utt(&mut last).unwrap(), 0);
    }

    #[test]
    fn dither_is_reproducible_per_seed() {
        let cfg = FrontendConfig {
            dither: true,
            seed: 1234,
            ..FrontendConfig::default()
        };
        let audio = vec![0i16; 8000];

        let mut fe1 = FrontEnd::new(cfg.clone()).unwrap();
        fe1.start_utt();
        let a = fe1.process_utt(&audio).unwrap();

        let mut fe2 = FrontEnd::new(cfg).unwrap();
        fe2.start_utt();
        let b = fe2.process_utt(&audio).unwrap();

        assert_eq!(a, b);
        // Dithered silence is above the hard log floor.
        assert!(a[5][0] > -9.2);
    }

    #[test]
    fn smooth_log_spec_matches_dct_round_trip() {
        let audio = tone(16_000, 8000.0, 1000.0, 16_000.0);

        let smooth_cfg = FrontendConfig {
            spectrum: SpectrumMode::SmoothLog,
            ..FrontendConfig::default()
        };
        let mut fe_smooth = FrontEnd::new(smooth_cfg).unwrap();
        fe_smooth.start_utt();
        let smooth = fe_smooth.process_utt(&audio).unwrap();

        let cep_cfg = FrontendConfig {
            transform: Transform::Dct2,
            ..FrontendConfig::default()
        };
        let mut fe_cep = FrontEnd::new(cep_cfg).unwrap();
        fe_cep.start_utt();
        let cep = fe_cep.process_utt(&audio).unwrap();

        let mut reconstructed = vec![0.0f32; 40];
        for (i, (s, c)) in smooth.iter().zip(cep.iter()).enumerate() {
            fe_cep.cep_to_smoothed_spec(c, &mut reconstructed);
            for (j, (&a, &b)) in s.iter().zip(reconstructed.iter()).enumerate() {
                assert!((a - b).abs() < 1e-4, "frame {i} band {j}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn noise_suppression_keeps_output_finite() {
        let cfg = FrontendConfig {
            remove_noise: true,
            ..FrontendConfig::default()
        };
        let mut fe = FrontEnd::new(cfg).unwrap();
        fe.start_utt();
        let audio = tone(16_000, 6000.0, 800.0, 16_000.0);
        let frames = fe.process_utt(&audio).unwrap();
        assert!(!frames.is_empty());
        for f in &frames {
            assert!(f.iter().all(|v| v.is_finite()));
        }
    }
}
