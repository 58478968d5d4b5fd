//! Converts mixer-rate stereo samples to the host's output rate.

use itertools::Itertools;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResamplerKind {
    Nearest,
    Cosine,
    Cubic,
    Sinc(usize),
}

pub struct Resampler {
    kind: ResamplerKind,
    in_rate: u32,
    out_rate: u32,
    position: f64,
    history: Vec<(f32, f32)>,
    sinc_lut: Vec<f32>,
}

impl Resampler {
    pub fn new(kind: ResamplerKind, in_rate: u32, out_rate: u32) -> Self {
        let taps = match kind {
            ResamplerKind::Sinc(n) => n,
            _ => 4,
        };
        let sinc_lut = build_sinc_lut(taps);
        Self { kind, in_rate, out_rate, position: 0.0, history: Vec::with_capacity(taps.max(4)), sinc_lut }
    }

    pub fn set_rates(&mut self, in_rate: u32, out_rate: u32) {
        self.in_rate = in_rate;
        self.out_rate = out_rate;
    }

    fn ratio(&self) -> f64 {
        self.in_rate as f64 / self.out_rate as f64
    }

    /// Push one mixer-rate sample; may emit zero or more host-rate samples via `emit`.
    pub fn push(&mut self, sample: (f32, f32), mut emit: impl FnMut((f32, f32))) {
        self.history.push(sample);
        let cap = self.history.capacity().max(4);
        if self.history.len() > cap {
            self.history.remove(0);
        }

        self.position += 1.0;
        let ratio = self.ratio();
        while self.position >= ratio {
            self.position -= ratio;
            emit(self.interpolate());
        }
    }

    fn interpolate(&self) -> (f32, f32) {
        match self.kind {
            ResamplerKind::Nearest => *self.history.last().unwrap_or(&(0.0, 0.0)),
            ResamplerKind::Cosine => cosine_interp(&self.history),
            ResamplerKind::Cubic => cubic_interp(&self.history),
            ResamplerKind::Sinc(_) => sinc_interp(&self.history, &self.sinc_lut),
        }
    }
}

fn cosine_interp(history: &[(f32, f32)]) -> (f32, f32) {
    if history.len() < 2 {
        return *history.last().unwrap_or(&(0.0, 0.0));
    }
    let (a, b) = (history[history.len() - 2], history[history.len() - 1]);
    let mu = 0.5f32;
    let mu2 = (1.0 - (mu * std::f32::consts::PI).cos()) / 2.0;
    (a.0 * (1.0 - mu2) + b.0 * mu2, a.1 * (1.0 - mu2) + b.1 * mu2)
}

fn cubic_interp(history: &[(f32, f32)]) -> (f32, f32) {
    if history.len() < 4 {
        return *history.last().unwrap_or(&(0.0, 0.0));
    }
    let n = history.len();
    let (p0, p1, p2, p3) = (history[n - 4], history[n - 3], history[n - 2], history[n - 1]);
    let f = |a: f32, b: f32, c: f32, d: f32| -> f32 { (a + b + c + d) / 4.0 };
    (f(p0.0, p1.0, p2.0, p3.0), f(p0.1, p1.1, p2.1, p3.1))
}

fn sinc_interp(history: &[(f32, f32)], lut: &[f32]) -> (f32, f32) {
    let mut out = (0.0f32, 0.0f32);
    for (i, (l, r)) in history.iter().rev().enumerate() {
        let coeff = lut.get(i).copied().unwrap_or(0.0);
        out.0 += l * coeff;
        out.1 += r * coeff;
    }
    out
}

fn build_sinc_lut(taps: usize) -> Vec<f32> {
    (0..taps)
        .map(|i| {
            let x = i as f32 - taps as f32 / 2.0;
            let sinc = if x == 0.0 { 1.0 } else { (std::f32::consts::PI * x).sin() / (std::f32::consts::PI * x) };
            let window = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / taps as f32).cos();
            sinc * window
        })
        .collect_vec()
}
