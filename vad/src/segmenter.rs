use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::VadError;

/// Frames of raw audio held in the circular buffer.
const BUF_FRAMES: usize = 256;
/// Power histogram bins. ~96 dB full scale for 16-bit input, plus headroom.
const HIST_BINS: usize = 98;
/// Frames consumed by a full calibration pass.
const CALIB_FRAMES: usize = HIST_BINS * 2;
/// Noise re-estimation interval in frames (about 1.6 s at 16 kHz).
const THRESH_UPDATE: i32 = 100;
/// Histogram decay shift applied at every re-estimation.
const HIST_INERTIA: u32 = 3;
/// Reference rate at which one frame is exactly 256 samples.
const REF_RATE: u32 = 16_000;
/// Noise floor assumed before any estimation, dB bin.
const DEFAULT_NOISE: u32 = 30;

/// Segmenter tuning knobs. The defaults are the long-serving values; most
/// callers only ever touch `sample_rate` and `raw_mode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Input sample rate in Hz.
    pub sample_rate: u32,
    /// Pass silence through instead of skipping it.
    pub raw_mode: bool,
    /// Re-estimate the noise floor periodically from the power histogram.
    pub auto_thresh: bool,
    /// Silence threshold offset above the noise floor, dB.
    pub delta_sil: u32,
    /// Speech threshold offset above the noise floor, dB.
    pub delta_speech: u32,
    /// Noise estimates below this bin are ignored.
    pub min_noise: u32,
    /// Noise estimates above this bin indicate a bad input channel.
    pub max_noise: u32,
    /// Analysis window length in frames.
    pub winsize: usize,
    /// Speech frames within the window required to enter SPEECH.
    pub speech_onset: usize,
    /// Silence frames within the window required to leave SPEECH.
    pub sil_onset: usize,
    /// Frames of audio prepended to each speech segment.
    pub leader: usize,
    /// Frames of audio appended to each speech segment.
    pub trailer: usize,
    /// Noise estimate interpolation rate, in [0, 1].
    pub adapt_rate: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: REF_RATE,
            raw_mode: false,
            auto_thresh: true,
            delta_sil: 10,
            delta_speech: 17,
            min_noise: 2,
            max_noise: 70,
            winsize: 21,
            speech_onset: 9,
            sil_onset: 18,
            leader: 5,
            trailer: 10,
            adapt_rate: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Silence,
    Speech,
}

/// One chunk of classified audio returned by [`Segmenter::read`]. A span
/// never straddles a speech/silence boundary. `len` is the number of samples
/// consumed; speech samples (and silence in raw mode) are copied into the
/// caller's buffer, skipped silence is only counted. `len == 0` means no
/// progress was possible.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub kind: SpanKind,
    pub len: usize,
}

/// Pending speech segment, in frames of the circular buffer.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: usize,
    nfrm: usize,
}

/// Energy-based speech/silence segmenter over a 256-frame circular buffer.
///
/// Audio goes in through [`feed`](Self::feed), classified spans come out of
/// [`read`](Self::read). Internally every frame gets a dB power estimate fed
/// into a decaying histogram; the noise floor is the dominant low bin, and
/// the speech/silence thresholds ride `delta_speech` / `delta_sil` above it.
pub struct Segmenter {
    cfg: VadConfig,
    /// Samples per frame (256 at 16 kHz).
    spf: usize,
    buf: Vec<i16>,
    frm_pow: Vec<u8>,
    pow_hist: [u32; HIST_BINS],

    /// Kind of the span returned by the most recent `read`.
    state: SpanKind,
    /// Absolute sample timestamp of data consumed so far.
    read_ts: u64,
    /// Samples consumed in the current same-kind run of spans.
    seglen: usize,
    /// Max frame power of the last span, dB bin.
    siglvl: u8,

    prev_sample: i16,
    /// First frame holding unconsumed data.
    headfrm: usize,
    /// Complete unconsumed frames.
    n_frm: usize,
    /// Unconsumed samples, including a partial tail frame.
    n_sample: usize,
    /// Frames classified since the beginning of the stream.
    tot_frm: u64,

    noise_level: u32,
    thresh_sil: u32,
    thresh_speech: u32,
    thresh_countdown: i32,

    /// Classification state at the tail of the buffer.
    tail_state: SpanKind,
    win_startfrm: usize,
    win_validfrm: usize,
    /// Opposite-kind frames in the analysis window.
    n_other: usize,
    segments: VecDeque<Segment>,
    eof: bool,
}

impl Segmenter {
    pub fn new(cfg: VadConfig) -> Result<Self, VadError> {
        let spf = (cfg.sample_rate as usize * 256) / REF_RATE as usize;
        if spf == 0 {
            return Err(VadError::InvalidConfig(format!(
                "sample rate {} too low",
                cfg.sample_rate
            )));
        }
        if cfg.winsize == 0 || cfg.winsize >= BUF_FRAMES {
            return Err(VadError::InvalidConfig(format!(
                "winsize {} out of range",
                cfg.winsize
            )));
        }
        if cfg.speech_onset == 0 || cfg.speech_onset > cfg.winsize {
            return Err(VadError::InvalidConfig("speech_onset must be in 1..=winsize".into()));
        }
        if cfg.sil_onset == 0 || cfg.sil_onset > cfg.winsize {
            return Err(VadError::InvalidConfig("sil_onset must be in 1..=winsize".into()));
        }
        if cfg.leader == 0 || cfg.trailer == 0 || cfg.leader + cfg.trailer > cfg.winsize {
            return Err(VadError::InvalidConfig(
                "leader and trailer must be positive with leader+trailer <= winsize".into(),
            ));
        }
        if !(0.0..=1.0).contains(&cfg.adapt_rate) {
            return Err(VadError::InvalidConfig(format!(
                "adapt_rate {} not in [0, 1]",
                cfg.adapt_rate
            )));
        }
        if cfg.min_noise >= cfg.max_noise || cfg.max_noise as usize >= HIST_BINS {
            return Err(VadError::InvalidConfig(format!(
                "noise bounds [{}, {}] invalid",
                cfg.min_noise, cfg.max_noise
            )));
        }

        let noise_level = DEFAULT_NOISE;
        Ok(Self {
            spf,
            buf: vec![0; BUF_FRAMES * spf],
            frm_pow: vec![0; BUF_FRAMES],
            pow_hist: [0; HIST_BINS],
            state: SpanKind::Silence,
            read_ts: 0,
            seglen: 0,
            siglvl: 0,
            prev_sample: 0,
            headfrm: 0,
            n_frm: 0,
            n_sample: 0,
            tot_frm: 0,
            noise_level,
            thresh_sil: noise_level + cfg.delta_sil,
            thresh_speech: noise_level + cfg.delta_speech,
            thresh_countdown: THRESH_UPDATE,
            tail_state: SpanKind::Silence,
            win_startfrm: 0,
            win_validfrm: 0,
            n_other: 0,
            segments: VecDeque::new(),
            eof: false,
            cfg,
        })
    }

    /// Samples per analysis frame.
    pub fn frame_samples(&self) -> usize {
        self.spf
    }

    /// Samples required by one [`calibrate`](Self::calibrate) call.
    pub fn calibrate_size(&self) -> usize {
        self.spf * CALIB_FRAMES
    }

    /// Free space in the internal buffer, in samples.
    pub fn space(&self) -> usize {
        self.buf.len() - self.n_sample
    }

    /// Absolute sample timestamp up to the most recent `read`.
    pub fn read_ts(&self) -> u64 {
        self.read_ts
    }

    /// Samples consumed so far in the current segment.
    pub fn seg_len(&self) -> usize {
        self.seglen
    }

    /// Max frame power of the last span, dB bin in 0..98.
    pub fn sig_level(&self) -> u8 {
        self.siglvl
    }

    /// Current noise floor estimate, dB bin.
    pub fn noise_level(&self) -> u32 {
        self.noise_level
    }

    /// dB power of one frame of samples: sum of squared first differences,
    /// scaled to a 0..98 bin.
    fn frame_power(frame: &[i16], prev: &mut i16) -> u8 {
        let mut sumsq = 0.0f64;
        let mut p = *prev;
        for &s in frame {
            let d = (s as f64) - (p as f64);
            sumsq += d * d;
            p = s;
        }
        *prev = p;

        let spf = frame.len() as f64;
        if sumsq < spf {
            sumsq = spf;
        }
        let db = (10.0 * (sumsq.log10() - spf.log10()) + 0.5).floor();
        db.max(0.0) as u8
    }

    fn compute_frame_pow(&mut self, frm: usize) {
        let mut prev = self.prev_sample;
        let p = Self::frame_power(&self.buf[frm * self.spf..(frm + 1) * self.spf], &mut prev);
        self.prev_sample = prev;
        self.frm_pow[frm] = p;
        self.pow_hist[p as usize] += 1;
        self.thresh_countdown -= 1;
    }

    fn decay_hist(&mut self) {
        for h in self.pow_hist.iter_mut() {
            *h -= *h >> HIST_INERTIA;
        }
    }

    /// Re-estimate the noise floor from the power histogram and move the
    /// thresholds. The floor is the dominant bin among the 20 above the first
    /// occupied one, interpolated at `adapt_rate`.
    fn find_thresh(&mut self) -> Result<(), VadError> {
        if !self.cfg.auto_thresh {
            return Ok(());
        }

        let mut i = self.cfg.min_noise as usize;
        while i < HIST_BINS && self.pow_hist[i] == 0 {
            i += 1;
        }
        if i > self.cfg.max_noise as usize {
            return Err(VadError::BadSignal {
                level: i as u32,
                min: self.cfg.min_noise,
                max: self.cfg.max_noise,
            });
        }

        let mut best = 0;
        let mut th = i;
        for j in i..HIST_BINS.min(i + 20) {
            if self.pow_hist[j] > best {
                best = self.pow_hist[j];
                th = j;
            }
        }

        let old = self.noise_level;
        self.noise_level = (old as f32 + self.cfg.adapt_rate * (th as f32 - old as f32) + 0.5)
            .floor() as u32;
        self.thresh_sil = self.noise_level + self.cfg.delta_sil;
        self.thresh_speech = self.noise_level + self.cfg.delta_speech;

        if old != self.noise_level {
            debug!(
                noise = self.noise_level,
                sil = self.thresh_sil,
                speech = self.thresh_speech,
                "noise floor re-estimated"
            );
        }
        if self.noise_level + 5 >= self.cfg.max_noise {
            warn!(
                noise = self.noise_level,
                max = self.cfg.max_noise,
                "noise floor approaching upper bound"
            );
        }
        Ok(())
    }

    /// Recount opposite-kind frames in the analysis window after a threshold
    /// change.
    fn recount_other(&mut self) {
        self.n_other = 0;
        let mut f = self.win_startfrm;
        for _ in 0..self.win_validfrm {
            let p = self.frm_pow[f] as u32;
            let other = match self.tail_state {
                SpanKind::Silence => p >= self.thresh_speech,
                SpanKind::Speech => p <= self.thresh_sil,
            };
            if other {
                self.n_other += 1;
            }
            f = (f + 1) % BUF_FRAMES;
        }
    }

    fn sil2speech(&mut self, frm: usize) {
        let start = (self.win_startfrm + BUF_FRAMES - self.cfg.leader) % BUF_FRAMES;
        self.segments.push_back(Segment {
            start,
            nfrm: self.cfg.leader + self.cfg.winsize,
        });
        self.tail_state = SpanKind::Speech;
        debug!(frame = self.tot_frm, "speech onset");

        // Look for silence starting from the end of this window.
        self.win_validfrm = 1;
        self.win_startfrm = frm;
        self.n_other = usize::from(self.frm_pow[frm] as u32 <= self.thresh_sil);
    }

    fn speech2sil(&mut self, frm: usize) {
        if let Some(seg) = self.segments.back_mut() {
            seg.nfrm += self.cfg.trailer;
        }
        self.tail_state = SpanKind::Silence;
        debug!(frame = self.tot_frm, "speech offset");

        // Resume looking for speech trailer+leader frames later.
        let skip = self.cfg.trailer + self.cfg.leader - 1;
        self.win_validfrm -= skip;
        self.win_startfrm = (self.win_startfrm + skip) % BUF_FRAMES;

        self.n_other = 0;
        let mut f = self.win_startfrm;
        loop {
            if self.frm_pow[f] as u32 >= self.thresh_speech {
                self.n_other += 1;
            }
            if f == frm {
                break;
            }
            f = (f + 1) % BUF_FRAMES;
        }
    }

    /// Slide the analysis window over the newly classified frame and switch
    /// state when the hysteresis counts allow it.
    fn boundary_detect(&mut self, frm: usize) {
        self.win_validfrm += 1;
        let p = self.frm_pow[frm] as u32;
        match self.tail_state {
            SpanKind::Silence => {
                if p >= self.thresh_speech {
                    self.n_other += 1;
                }
            }
            SpanKind::Speech => {
                if p <= self.thresh_sil {
                    self.n_other += 1;
                }
            }
        }

        if self.win_validfrm < self.cfg.winsize {
            return;
        }

        match self.tail_state {
            SpanKind::Silence => {
                if self.n_frm >= self.cfg.winsize + self.cfg.leader
                    && self.n_other >= self.cfg.speech_onset
                {
                    self.sil2speech(frm);
                }
            }
            SpanKind::Speech => {
                if self.n_other >= self.cfg.sil_onset {
                    self.speech2sil(frm);
                } else if let Some(seg) = self.segments.back_mut() {
                    // Staying in speech; this frame joins the segment.
                    seg.nfrm += 1;
                }
            }
        }

        // Drop the oldest frame from the window.
        let p = self.frm_pow[self.win_startfrm] as u32;
        let other = match self.tail_state {
            SpanKind::Silence => p >= self.thresh_speech,
            SpanKind::Speech => p <= self.thresh_sil,
        };
        if other && self.n_other > 0 {
            self.n_other -= 1;
        }
        self.win_validfrm -= 1;
        self.win_startfrm = (self.win_startfrm + 1) % BUF_FRAMES;
    }

    /// Classify every completed frame sitting after the already-classified
    /// region.
    fn classify(&mut self) {
        let mut pending = self.n_sample - self.n_frm * self.spf;
        let mut tailfrm = (self.headfrm + self.n_frm) % BUF_FRAMES;

        while pending >= self.spf {
            self.compute_frame_pow(tailfrm);
            self.n_frm += 1;
            self.tot_frm += 1;
            self.boundary_detect(tailfrm);
            tailfrm = (tailfrm + 1) % BUF_FRAMES;
            pending -= self.spf;

            if self.thresh_countdown <= 0 {
                // A bad estimate mid-stream keeps the previous thresholds
                // rather than dropping buffered audio.
                if let Err(e) = self.find_thresh() {
                    warn!(error = %e, "keeping previous thresholds");
                }
                self.decay_hist();
                self.thresh_countdown = THRESH_UPDATE;
                self.recount_other();
            }
        }
    }

    /// Offers samples to the internal buffer and classifies every frame they
    /// complete. Returns the number of samples consumed; the caller re-offers
    /// the remainder after draining with [`read`](Self::read).
    pub fn feed(&mut self, samples: &[i16]) -> usize {
        let n = samples.len().min(self.space());
        if n > 0 {
            let tail = (self.headfrm * self.spf + self.n_sample) % self.buf.len();
            let first = n.min(self.buf.len() - tail);
            self.buf[tail..tail + first].copy_from_slice(&samples[..first]);
            if first < n {
                self.buf[..n - first].copy_from_slice(&samples[first..n]);
            }
            self.n_sample += n;
        }
        self.classify();
        n
    }

    fn max_siglvl(&self, startfrm: usize, nfrm: usize) -> u8 {
        let mut lvl = 0;
        let mut f = startfrm;
        for _ in 0..nfrm {
            lvl = lvl.max(self.frm_pow[f]);
            f = (f + 1) % BUF_FRAMES;
        }
        lvl
    }

    /// Copies `nfrm` frames starting at `sf` into `out`, handling wraparound.
    /// Returns the frame index after the copied region.
    fn buf_copy(&self, sf: usize, nfrm: usize, out: &mut [i16]) -> usize {
        let mut sf = sf;
        let mut nfrm = nfrm;
        let mut off = 0;
        if sf + nfrm > BUF_FRAMES {
            let f = BUF_FRAMES - sf;
            let l = f * self.spf;
            out[..l].copy_from_slice(&self.buf[sf * self.spf..sf * self.spf + l]);
            off = l;
            sf = 0;
            nfrm -= f;
        }
        if nfrm > 0 {
            let l = nfrm * self.spf;
            out[off..off + l].copy_from_slice(&self.buf[sf * self.spf..sf * self.spf + l]);
        }
        (sf + nfrm) % BUF_FRAMES
    }

    /// Returns the next classified span, copying speech samples (and silence
    /// in raw mode) into `out`. Never crosses a speech/silence boundary and
    /// never returns more than `out` holds.
    pub fn read(&mut self, out: &mut [i16]) -> Result<Span, VadError> {
        if out.len() < self.spf {
            return Err(VadError::BufferTooSmall {
                need: self.spf,
                got: out.len(),
            });
        }

        let first = self.segments.front().copied();
        let (flen, kind) = match first {
            Some(seg) if seg.start == self.headfrm => {
                ((out.len() / self.spf).min(seg.nfrm), SpanKind::Speech)
            }
            _ => {
                let mut flen = match first {
                    // Hold back the frames the analysis window may still
                    // fold into a speech segment.
                    None if !self.eof => self
                        .n_frm
                        .saturating_sub(self.cfg.winsize + self.cfg.leader - 1),
                    None => self.n_frm,
                    Some(seg) => (seg.start + BUF_FRAMES - self.headfrm) % BUF_FRAMES,
                };
                if self.cfg.raw_mode {
                    flen = flen.min(out.len() / self.spf);
                }
                (flen, SpanKind::Silence)
            }
        };

        let len = flen * self.spf;
        self.siglvl = self.max_siglvl(self.headfrm, flen);

        if kind == SpanKind::Silence && !self.cfg.raw_mode {
            self.headfrm = (self.headfrm + flen) % BUF_FRAMES;
        } else {
            self.headfrm = self.buf_copy(self.headfrm, flen, out);
        }

        self.n_frm -= flen;
        self.n_sample -= len;

        if self.state == kind {
            self.seglen += len;
        } else {
            self.seglen = len;
        }
        self.state = kind;

        if kind == SpanKind::Speech {
            let drop = {
                let seg = self.segments.front_mut().ok_or_else(|| {
                    VadError::InvalidConfig("speech span without a segment".into())
                })?;
                seg.start = self.headfrm;
                seg.nfrm -= flen;
                seg.nfrm == 0 && (self.segments.len() > 1 || self.tail_state == SpanKind::Silence)
            };
            if drop {
                self.segments.pop_front();
            }
        }

        self.read_ts = (self.tot_frm - self.n_frm as u64) * self.spf as u64;
        Ok(Span { kind, len })
    }

    /// Marks the end of the input stream. A segment still open is closed by
    /// absorbing the frames left in the analysis window, so the tail of a
    /// final utterance is not lost.
    pub fn end_of_stream(&mut self) {
        self.eof = true;
        if self.tail_state == SpanKind::Speech {
            if let Some(seg) = self.segments.back_mut() {
                seg.nfrm += self.win_validfrm;
            }
            self.tail_state = SpanKind::Silence;
        }
        self.win_startfrm = (self.win_startfrm + self.win_validfrm) % BUF_FRAMES;
        self.win_validfrm = 0;
        self.n_other = 0;
    }

    /// Seeds the power histogram from [`calibrate_size`](Self::calibrate_size)
    /// samples of assumed background audio and sets the thresholds from it.
    /// The samples are consumed by calibration, not forwarded to `read`.
    pub fn calibrate(&mut self, samples: &[i16]) -> Result<(), VadError> {
        let need = self.calibrate_size();
        if samples.len() < need {
            return Err(VadError::ShortCalibration {
                need,
                got: samples.len(),
            });
        }

        self.pow_hist = [0; HIST_BINS];
        let mut prev = self.prev_sample;
        for frame in samples[..need].chunks_exact(self.spf) {
            let p = Self::frame_power(frame, &mut prev);
            self.pow_hist[p as usize] += 1;
        }
        self.prev_sample = prev;
        self.thresh_countdown = THRESH_UPDATE;
        self.find_thresh()
    }

    /// Overrides both thresholds, bypassing estimation until the next
    /// periodic update (or permanently when `auto_thresh` is off).
    pub fn set_thresholds(&mut self, sil: u32, speech: u32) {
        self.thresh_sil = sil;
        self.thresh_speech = speech;
        self.recount_other();
    }

    /// Discards buffered audio and pending segments and returns to SILENCE.
    /// The learned noise floor and thresholds survive. Idempotent.
    pub fn reset(&mut self) {
        self.segments.clear();
        self.headfrm = 0;
        self.n_frm = 0;
        self.n_sample = 0;
        self.win_startfrm = 0;
        self.win_validfrm = 0;
        self.n_other = 0;
        self.tail_state = SpanKind::Silence;
        self.state = SpanKind::Silence;
        self.read_ts = 0;
        self.tot_frm = 0;
        self.seglen = 0;
        self.siglvl = 0;
        self.prev_sample = 0;
        self.eof = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Deterministic background noise around the default 30 dB floor.
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

    #[test]
    fn rejects_bad_params() {
        let mut cfg = VadConfig::default();
        cfg.leader = 15;
        cfg.trailer = 15; // leader + trailer > winsize
        assert!(Segmenter::new(cfg).is_err());

        let mut cfg = VadConfig::default();
        cfg.adapt_rate = 1.5;
        assert!(Segmenter::new(cfg).is_err());
    }

    #[test]
    fn pure_silence_yields_no_speech() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let mut rng = 1u32;
        let audio = noise(32_000, &mut rng);
        assert_eq!(seg.feed(&audio), 32_000);
        seg.end_of_stream();

        let mut buf = vec![0i16; 4096];
        let mut total = 0;
        loop {
            let span = seg.read(&mut buf).unwrap();
            if span.len == 0 {
                break;
            }
            assert_eq!(span.kind, SpanKind::Silence);
            total += span.len;
        }
        assert_eq!(total, 32_000);
        assert_eq!(seg.read_ts(), 32_000);
    }

    #[test]
    fn tone_burst_yields_one_segment() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let spf = seg.frame_samples();
        let mut rng = 7u32;

        // 2 s noise floor, 0.5 s loud tone, 1 s noise floor.
        let mut audio = noise(32_000, &mut rng);
        audio.extend(tone(8_000, 8000.0, 1000.0, 16_000.0));
        audio.extend(noise(16_000, &mut rng));

        let mut speech = 0usize;
        let mut runs = 0usize;
        let mut last_was_speech = false;
        let mut drain = |seg: &mut Segmenter| {
            let mut buf = vec![0i16; 8192];
            loop {
                let span = seg.read(&mut buf).unwrap();
                if span.len == 0 {
                    break;
                }
                if span.kind == SpanKind::Speech {
                    speech += span.len;
                    if !last_was_speech {
                        runs += 1;
                    }
                    last_was_speech = true;
                } else {
                    last_was_speech = false;
                }
            }
        };

        let mut offered = 0;
        while offered < audio.len() {
            offered += seg.feed(&audio[offered..]);
            drain(&mut seg);
        }
        seg.end_of_stream();
        drain(&mut seg);

        assert_eq!(runs, 1, "expected exactly one speech run");
        // 8000 tone samples plus leader/trailer/window padding, in frames.
        let lo = 8_000;
        let hi = 8_000 + 40 * spf;
        assert!(
            (lo..=hi).contains(&speech),
            "speech run of {speech} samples outside [{lo}, {hi}]"
        );
    }

    #[test]
    fn calibration_rejects_dead_input() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let dead = vec![0i16; seg.calibrate_size()];
        match seg.calibrate(&dead) {
            Err(VadError::BadSignal { .. }) => {}
            other => panic!("expected BadSignal, got {other:?}"),
        }
    }

    #[test]
    fn calibration_tracks_noise_floor() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let mut rng = 3u32;
        let background = noise(seg.calibrate_size(), &mut rng);
        seg.calibrate(&background).unwrap();
        // One adapt_rate step from the default 30 toward the measured floor.
        assert!(seg.noise_level() <= 35, "noise {}", seg.noise_level());
    }

    #[test]
    fn short_calibration_is_an_error() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let short = vec![0i16; seg.calibrate_size() - 1];
        assert!(matches!(
            seg.calibrate(&short),
            Err(VadError::ShortCalibration { .. })
        ));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let audio = tone(16_000, 8000.0, 1000.0, 16_000.0);
        seg.feed(&audio);
        seg.reset();
        seg.reset();
        assert_eq!(seg.read_ts(), 0);
        assert_eq!(seg.space(), 256 * seg.frame_samples());

        let mut buf = vec![0i16; 1024];
        let span = seg.read(&mut buf).unwrap();
        assert_eq!(span.len, 0);
    }

    #[test]
    fn feed_reports_partial_consumption_when_full() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        let cap = 256 * seg.frame_samples();
        let audio = vec![0i16; cap + 1000];
        let consumed = seg.feed(&audio);
        assert_eq!(consumed, cap);
        // Unread data is intact; nothing further fits.
        assert_eq!(seg.feed(&audio[consumed..]), 0);
    }

    #[test]
    fn raw_mode_passes_silence_through() {
        let cfg = VadConfig {
            raw_mode: true,
            ..VadConfig::default()
        };
        let mut seg = Segmenter::new(cfg).unwrap();
        let mut rng = 11u32;
        let audio = noise(16_000, &mut rng);
        seg.feed(&audio);
        seg.end_of_stream();

        let mut buf = vec![0i16; 16_000];
        let mut total = 0;
        loop {
            let span = seg.read(&mut buf).unwrap();
            if span.len == 0 {
                break;
            }
            assert_eq!(span.kind, SpanKind::Silence);
            total += span.len;
        }
        assert_eq!(total, 16_000 - 16_000 % seg.frame_samples());
    }

    #[test]
    fn manual_thresholds_apply() {
        let mut seg = Segmenter::new(VadConfig::default()).unwrap();
        seg.set_thresholds(5, 12);
        // Background noise around 28 dB now classifies as speech.
        let mut rng = 9u32;
        let audio = noise(32_000, &mut rng);
        seg.feed(&audio);
        seg.end_of_stream();

        let mut buf = vec![0i16; 8192];
        let mut got_speech = false;
        loop {
            let span = seg.read(&mut buf).unwrap();
            if span.len == 0 {
                break;
            }
            if span.kind == SpanKind::Speech {
                got_speech = true;
            }
        }
        assert!(got_speech);
    }
}
