//! Dynamic feature assembly from cepstral frames.
//!
//! Each scheme turns a context window of cepstral frames into one output
//! feature vector (cepstra plus difference-based deltas). Block mode pads an
//! utterance by replicating its edge frames; live mode keeps a circular
//! cepstrum buffer so features stream out with bounded latency. Both modes
//! produce identical numbers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FrontendError;
use crate::norm::{Agc, AgcMode, Cmn, CmnMode};

/// Slots in the live-mode circular cepstrum buffer.
const LIVE_BUF: usize = 256;
/// Base delta window, in frames.
const DCEP_WIN: usize = 2;

/// Closed set of feature compositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureScheme {
    /// Classic 4-stream layout: 12 cepstra, 24 short+long deltas,
    /// 3 power terms, 12 delta-deltas. Requires 13 input cepstra.
    S2_4x,
    /// Single 39-wide stream: 12 cepstra, 12 deltas, 3 power terms,
    /// 12 delta-deltas. Requires 13 input cepstra.
    S3_1x39,
    /// Cepstra, deltas and delta-deltas.
    CepDeltaDelta,
    /// Cepstra, deltas, long-term deltas and delta-deltas.
    CepDeltaLongDelta,
    /// Cepstra and deltas.
    CepDelta,
    /// Cepstra passed through unchanged.
    Cep,
    /// The context window concatenated into one vector.
    CepWin(usize),
}

impl FeatureScheme {
    /// Context frames needed on each side of the current frame.
    pub fn window(&self) -> usize {
        match self {
            FeatureScheme::S2_4x => 4,
            FeatureScheme::S3_1x39 => 3,
            FeatureScheme::CepDeltaDelta => DCEP_WIN + 1,
            FeatureScheme::CepDeltaLongDelta => DCEP_WIN * 2,
            FeatureScheme::CepDelta => DCEP_WIN,
            FeatureScheme::Cep => 0,
            FeatureScheme::CepWin(w) => *w,
        }
    }

    fn stream_lens(&self, cepsize: usize) -> Vec<usize> {
        match self {
            FeatureScheme::S2_4x => vec![12, 24, 3, 12],
            FeatureScheme::S3_1x39 => vec![39],
            FeatureScheme::CepDeltaDelta => vec![cepsize * 3],
            FeatureScheme::CepDeltaLongDelta => vec![cepsize * 4],
            FeatureScheme::CepDelta => vec![cepsize * 2],
            FeatureScheme::Cep => vec![cepsize],
            FeatureScheme::CepWin(w) => vec![cepsize * (2 * w + 1)],
        }
    }
}

/// Row-major linear transform (LDA/MLLT) applied after composition.
#[derive(Debug, Clone)]
pub struct LinearTransform {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl LinearTransform {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, FrontendError> {
        if data.len() != rows * cols || rows == 0 || rows > cols {
            return Err(FrontendError::InvalidTransform(format!(
                "{rows}x{cols} matrix with {} values",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }
}

/// Turns normalized cepstral frames into composed feature vectors.
pub struct FeatureAssembler {
    scheme: FeatureScheme,
    cepsize: usize,
    window: usize,
    stream_lens: Vec<usize>,
    /// Composed width before LDA and subvector projection.
    composed_dim: usize,
    /// Final output width.
    out_dim: usize,

    cmn_mode: CmnMode,
    agc_mode: AgcMode,
    varnorm: bool,
    cmn: Cmn,
    agc: Agc,

    cepbuf: Vec<Vec<f32>>,
    bufpos: usize,
    curpos: usize,

    lda: Option<LinearTransform>,
    subvecs: Option<Vec<Vec<usize>>>,
}

impl FeatureAssembler {
    pub fn new(
        scheme: FeatureScheme,
        cmn_mode: CmnMode,
        varnorm: bool,
        agc_mode: AgcMode,
        cepsize: usize,
    ) -> Result<Self, FrontendError> {
        match scheme {
            FeatureScheme::S2_4x | FeatureScheme::S3_1x39 if cepsize != 13 => {
                return Err(FrontendError::InvalidConfig(format!(
                    "{scheme:?} requires 13 cepstra, got {cepsize}"
                )));
            }
            FeatureScheme::CepWin(0) => {
                return Err(FrontendError::InvalidConfig(
                    "cepwin window must be at least 1".into(),
                ));
            }
            _ => {}
        }
        if cepsize == 0 {
            return Err(FrontendError::InvalidConfig("cepsize must be positive".into()));
        }

        let window = scheme.window();
        let stream_lens = scheme.stream_lens(cepsize);
        let composed_dim = stream_lens.iter().sum();

        let mut agc = Agc::new();
        // Conventional starting points for the cross-utterance max estimate.
        if agc_mode == AgcMode::Emax {
            agc.emax_set(if cmn_mode != CmnMode::None { 5.0 } else { 10.0 });
        }

        debug!(?scheme, cepsize, window, composed_dim, "feature assembler ready");

        Ok(Self {
            scheme,
            cepsize,
            window,
            stream_lens,
            composed_dim,
            out_dim: composed_dim,
            cmn_mode,
            agc_mode,
            varnorm,
            cmn: Cmn::new(cepsize),
            agc,
            cepbuf: vec![vec![0.0; cepsize]; LIVE_BUF],
            bufpos: 0,
            curpos: 0,
            lda: None,
            subvecs: None,
        })
    }

    /// Final width of each feature vector.
    pub fn dimension(&self) -> usize {
        self.out_dim
    }

    /// Context frames needed on each side of a frame.
    pub fn window_size(&self) -> usize {
        self.window
    }

    pub fn stream_lengths(&self) -> &[usize] {
        &self.stream_lens
    }

    pub fn cmn_mut(&mut self) -> &mut Cmn {
        &mut self.cmn
    }

    pub fn agc_mut(&mut self) -> &mut Agc {
        &mut self.agc
    }

    /// Installs an LDA/MLLT transform. Single-stream schemes only; the
    /// matrix maps the composed width down to `rows` values.
    pub fn set_lda(&mut self, lda: LinearTransform) -> Result<(), FrontendError> {
        if self.stream_lens.len() != 1 {
            return Err(FrontendError::InvalidTransform(
                "linear transforms require a single-stream scheme".into(),
            ));
        }
        if lda.cols != self.composed_dim {
            return Err(FrontendError::InvalidTransform(format!(
                "matrix has {} columns, features have {}",
                lda.cols, self.composed_dim
            )));
        }
        self.out_dim = lda.rows;
        if let Some(sv) = self.subvecs.take() {
            // Re-validate against the new output width.
            self.lda = Some(lda);
            return self.set_subvecs(sv);
        }
        self.lda = Some(lda);
        Ok(())
    }

    /// Installs a subvector projection: each inner list selects indices of
    /// the (post-LDA) feature vector, concatenated in order.
    pub fn set_subvecs(&mut self, subvecs: Vec<Vec<usize>>) -> Result<(), FrontendError> {
        if self.stream_lens.len() != 1 {
            return Err(FrontendError::InvalidSubvectors(
                "subvectors require a single-stream scheme".into(),
            ));
        }
        let base = self.lda.as_ref().map_or(self.composed_dim, |l| l.rows);
        let total: usize = subvecs.iter().map(Vec::len).sum();
        if total == 0 || total > base {
            return Err(FrontendError::InvalidSubvectors(format!(
                "{total} selected indices for {base}-wide features"
            )));
        }
        for (i, sv) in subvecs.iter().enumerate() {
            if let Some(&d) = sv.iter().find(|&&d| d >= base) {
                return Err(FrontendError::InvalidSubvectors(format!(
                    "subvector {i} selects index {d} of {base}"
                )));
            }
        }
        self.out_dim = total;
        self.subvecs = Some(subvecs);
        Ok(())
    }

    /// Empties the live cepstrum buffer. Normalizer state survives, as it
    /// spans utterances.
    pub fn reset(&mut self) {
        self.bufpos = 0;
        self.curpos = 0;
    }

    fn do_cmn(&mut self, frames: &mut [Vec<f32>], begin: bool, end: bool) {
        let mut mode = self.cmn_mode;
        // Only the running prior works without full utterance boundaries.
        if !(begin && end) && mode != CmnMode::None {
            mode = CmnMode::Prior;
        }
        match mode {
            CmnMode::Current => self.cmn.calc(frames, self.varnorm),
            CmnMode::Prior => {
                self.cmn.prior(frames);
                if end {
                    self.cmn.prior_update();
                }
            }
            CmnMode::None => {}
        }
    }

    fn do_agc(&mut self, frames: &mut [Vec<f32>], begin: bool, end: bool) {
        let mut mode = self.agc_mode;
        if !(begin && end) && mode != AgcMode::None {
            mode = AgcMode::Emax;
        }
        match mode {
            AgcMode::Max => self.agc.calc_max(frames),
            AgcMode::Emax => {
                self.agc.emax(frames);
                if end {
                    self.agc.emax_update();
                }
            }
            AgcMode::Noise => self.agc.noise(frames),
            AgcMode::None => {}
        }
    }

    /// Composes one feature vector from a `2*window+1` context.
    fn compose(&self, ctx: &[&[f32]], out: &mut [f32]) {
        let w = self.window;
        let c = self.cepsize;
        let mfc = |i: isize| ctx[(w as isize + i) as usize];

        match self.scheme {
            FeatureScheme::Cep => out[..c].copy_from_slice(mfc(0)),
            FeatureScheme::CepWin(win) => {
                for i in 0..=2 * win {
                    out[i * c..(i + 1) * c].copy_from_slice(ctx[i]);
                }
            }
            FeatureScheme::CepDelta => {
                out[..c].copy_from_slice(mfc(0));
                let (w2, wm2) = (mfc(2), mfc(-2));
                for i in 0..c {
                    out[c + i] = w2[i] - wm2[i];
                }
            }
            FeatureScheme::CepDeltaDelta => {
                out[..c].copy_from_slice(mfc(0));
                let d = DCEP_WIN as isize;
                let (wd, wmd) = (mfc(d), mfc(-d));
                for i in 0..c {
                    out[c + i] = wd[i] - wmd[i];
                }
                let (w1, wm1) = (mfc(d + 1), mfc(-d + 1));
                let (w_1, wm_1) = (mfc(d - 1), mfc(-d - 1));
                for i in 0..c {
                    out[2 * c + i] = (w1[i] - wm1[i]) - (w_1[i] - wm_1[i]);
                }
            }
            FeatureScheme::CepDeltaLongDelta => {
                out[..c].copy_from_slice(mfc(0));
                let d = DCEP_WIN as isize;
                let (wd, wmd) = (mfc(d), mfc(-d));
                for i in 0..c {
                    out[c + i] = wd[i] - wmd[i];
                }
                let (wl, wml) = (mfc(2 * d), mfc(-2 * d));
                for i in 0..c {
                    out[2 * c + i] = wl[i] - wml[i];
                }
                let (w1, wm1) = (mfc(d + 1), mfc(-d + 1));
                let (w_1, wm_1) = (mfc(d - 1), mfc(-d - 1));
                for i in 0..c {
                    out[3 * c + i] = (w1[i] - wm1[i]) - (w_1[i] - wm_1[i]);
                }
            }
            FeatureScheme::S3_1x39 => {
                // 12 cepstra (C0 excluded), 12 deltas, 3 power terms,
                // 12 delta-deltas.
                out[..12].copy_from_slice(&mfc(0)[1..13]);
                let (w2, wm2) = (mfc(2), mfc(-2));
                for i in 0..12 {
                    out[12 + i] = w2[1 + i] - wm2[1 + i];
                }
                out[24] = mfc(0)[0];
                out[25] = mfc(2)[0] - mfc(-2)[0];
                out[26] = (mfc(3)[0] - mfc(-1)[0]) - (mfc(1)[0] - mfc(-3)[0]);
                let (w3, wm1) = (mfc(3), mfc(-1));
                let (w1, wm3) = (mfc(1), mfc(-3));
                for i in 0..12 {
                    out[27 + i] = (w3[1 + i] - wm1[1 + i]) - (w1[1 + i] - wm3[1 + i]);
                }
            }
            FeatureScheme::S2_4x => {
                // Stream 0: 12 cepstra, C0 excluded.
                out[..12].copy_from_slice(&mfc(0)[1..13]);
                // Stream 1: 12 short-term + 12 long-term deltas.
                let (w2, wm2) = (mfc(2), mfc(-2));
                for i in 0..12 {
                    out[12 + i] = w2[1 + i] - wm2[1 + i];
                }
                let (w4, wm4) = (mfc(4), mfc(-4));
                for i in 0..12 {
                    out[24 + i] = w4[1 + i] - wm4[1 + i];
                }
                // Stream 2: C0, its delta and delta-delta.
                out[36] = mfc(0)[0];
                out[37] = mfc(2)[0] - mfc(-2)[0];
                out[38] = (mfc(3)[0] - mfc(-1)[0]) - (mfc(1)[0] - mfc(-3)[0]);
                // Stream 3: 12 delta-deltas.
                let (w3, wm1) = (mfc(3), mfc(-1));
                let (w1, wm3) = (mfc(1), mfc(-3));
                for i in 0..12 {
                    out[39 + i] = (w3[1 + i] - wm1[1 + i]) - (w1[1 + i] - wm3[1 + i]);
                }
            }
        }
    }

    fn lda_transform(&self, feats: &mut [Vec<f32>]) {
        if let Some(lda) = &self.lda {
            let mut tmp = vec![0.0f32; lda.rows];
            for f in feats.iter_mut() {
                for (j, t) in tmp.iter_mut().enumerate() {
                    *t = f
                        .iter()
                        .zip(&lda.data[j * lda.cols..(j + 1) * lda.cols])
                        .map(|(&v, &m)| v * m)
                        .sum();
                }
                f.clear();
                f.extend_from_slice(&tmp);
            }
        }
    }

    fn subvec_project(&self, feats: &mut [Vec<f32>]) {
        if let Some(subvecs) = &self.subvecs {
            for f in feats.iter_mut() {
                let mut buf = Vec::with_capacity(self.out_dim);
                for sv in subvecs {
                    buf.extend(sv.iter().map(|&d| f[d]));
                }
                *f = buf;
            }
        }
    }

    fn finish(&self, feats: &mut [Vec<f32>]) {
        self.lda_transform(feats);
        self.subvec_project(feats);
    }

    fn check_frames(&self, frames: &[Vec<f32>]) -> Result<(), FrontendError> {
        for f in frames {
            if f.len() != self.cepsize {
                return Err(FrontendError::BadFrameSize {
                    expected: self.cepsize,
                    got: f.len(),
                });
            }
        }
        Ok(())
    }

    /// Whole-utterance composition: normalizes `cep` in place, pads by
    /// replicating the edge frames `window` times on each side and emits one
    /// feature vector per input frame.
    pub fn process_block(&mut self, cep: &mut [Vec<f32>]) -> Result<Vec<Vec<f32>>, FrontendError> {
        self.check_frames(cep)?;
        if cep.is_empty() {
            return Ok(Vec::new());
        }

        self.do_cmn(cep, true, true);
        self.do_agc(cep, true, true);

        let w = self.window;
        let mut padded: Vec<&[f32]> = Vec::with_capacity(cep.len() + 2 * w);
        for _ in 0..w {
            padded.push(&cep[0]);
        }
        padded.extend(cep.iter().map(|f| f.as_slice()));
        for _ in 0..w {
            padded.push(&cep[cep.len() - 1]);
        }

        let mut feats = vec![vec![0.0f32; self.composed_dim]; cep.len()];
        for (i, out) in feats.iter_mut().enumerate() {
            self.compose(&padded[i..i + 2 * w + 1], out);
        }
        self.finish(&mut feats);
        Ok(feats)
    }

    /// Streaming composition over the circular cepstrum buffer. Normalizes
    /// `cep` in place and enqueues it; `begin`/`end` replicate the edge
    /// frames so no output is lost at utterance boundaries. Returns the
    /// number of input frames consumed (the buffer never overwrites frames
    /// still inside the trailing context window) and the composed features.
    pub fn process_live(
        &mut self,
        cep: &mut [Vec<f32>],
        begin: bool,
        end: bool,
    ) -> Result<(usize, Vec<Vec<f32>>), FrontendError> {
        self.check_frames(cep)?;

        // Whole utterances take the block path.
        if begin && end && !cep.is_empty() {
            let feats = self.process_block(cep)?;
            return Ok((cep.len(), feats));
        }

        if begin {
            self.bufpos = self.curpos;
        }

        let mut nbufcep = (self.bufpos + LIVE_BUF - self.curpos) % LIVE_BUF;
        let w = self.window;
        if begin && !cep.is_empty() {
            nbufcep += w;
        }
        let mut end = end;
        if end {
            nbufcep += w;
        }

        // Consume only what fits without clobbering the trailing window.
        let mut ncep = cep.len();
        if nbufcep + ncep > LIVE_BUF {
            ncep = (LIVE_BUF - nbufcep).saturating_sub(w);
            // End-of-utterance handling must wait for the next call.
            if end {
                nbufcep -= w;
                end = false;
            }
        }

        self.do_cmn(&mut cep[..ncep], begin, end);
        self.do_agc(&mut cep[..ncep], begin, end);

        if begin && ncep > 0 {
            for _ in 0..w {
                self.cepbuf[self.bufpos].copy_from_slice(&cep[0]);
                self.bufpos = (self.bufpos + 1) % LIVE_BUF;
            }
            self.curpos = self.bufpos;
            nbufcep -= w;
        }

        for f in cep[..ncep].iter() {
            self.cepbuf[self.bufpos].copy_from_slice(f);
            self.bufpos = (self.bufpos + 1) % LIVE_BUF;
            nbufcep += 1;
        }

        if end {
            let tpos = (self.bufpos + LIVE_BUF - 1) % LIVE_BUF;
            for _ in 0..w {
                let last = self.cepbuf[tpos].clone();
                self.cepbuf[self.bufpos].copy_from_slice(&last);
                self.bufpos = (self.bufpos + 1) % LIVE_BUF;
            }
        }

        // The trailing window must stay in the buffer.
        let nfeat = nbufcep.saturating_sub(w);
        let mut feats = vec![vec![0.0f32; self.composed_dim]; nfeat];
        for out in feats.iter_mut() {
            let ctx: Vec<&[f32]> = (-(w as isize)..=w as isize)
                .map(|j| {
                    let idx =
                        (self.curpos as isize + j + LIVE_BUF as isize) as usize % LIVE_BUF;
                    self.cepbuf[idx].as_slice()
                })
                .collect();
            self.compose(&ctx, out);
            self.curpos = (self.curpos + 1) % LIVE_BUF;
        }

        self.finish(&mut feats);
        Ok((ncep, feats))
    }
}
