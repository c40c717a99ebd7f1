//! Phase vocoder for pitch-preserving time-stretching.
//!
//! Interpolates magnitudes between analysis frames at the requested rate and
//! re-accumulates phase from each bin's measured instantaneous frequency.
//! Identity phase locking keeps bins around a spectral peak coherent with it,
//! and frames with a strong spectral flux jump reset to their analysis phase
//! so attacks stay sharp.

use super::stft::{FftSize, Spectrum, Stft};
use rustfft::num_complex::Complex;
use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Phase locking modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseLockMode {
    /// Every bin accumulates its own phase (most phasiness)
    None,
    /// Bins inherit the phase rotation of the nearest spectral peak
    #[default]
    Identity,
}

/// Time-stretching parameters
#[derive(Debug, Clone, Copy)]
pub struct TimeStretchParams {
    pub fft_size: FftSize,
    pub phase_lock: PhaseLockMode,
    /// Rectified flux over frame energy (0.0 - 1.0) above which a frame
    /// counts as a transient. None disables transient handling.
    pub transient_threshold: Option<f32>,
}

impl Default for TimeStretchParams {
    fn default() -> Self {
        Self {
            fft_size: FftSize::Medium,
            phase_lock: PhaseLockMode::Identity,
            transient_threshold: Some(0.5),
        }
    }
}

/// Offline phase vocoder
pub struct PhaseVocoder {
    stft: Stft,
    params: TimeStretchParams,
    /// Expected phase advance per bin per hop
    omega: Vec<f32>,
}

impl PhaseVocoder {
    pub fn new(params: TimeStretchParams) -> Self {
        let stft = Stft::new(params.fft_size);
        let hop = stft.hop_size() as f32;
        let size = stft.size() as f32;
        let omega = (0..stft.num_bins())
            .map(|k| TWO_PI * k as f32 * hop / size)
            .collect();

        Self {
            stft,
            params,
            omega,
        }
    }

    /// Stretch one channel in time by `rate` without changing its pitch
    ///
    /// `rate > 1.0` plays faster (shorter output), `rate < 1.0` slower.
    /// Output length is `round(len / rate)`.
    pub fn stretch(&self, signal: &[f32], rate: f64) -> Vec<f32> {
        let out_len = ((signal.len() as f64 / rate).round() as usize).max(1);
        if (rate - 1.0).abs() < f64::EPSILON {
            return signal.to_vec();
        }

        let frames = self.stft.analyze(signal);
        let stretched = self.stretch_frames(&frames, rate);
        self.stft.synthesize(&stretched, out_len)
    }

    fn stretch_frames(&self, frames: &[Spectrum], rate: f64) -> Vec<Spectrum> {
        let num_bins = self.stft.num_bins();
        let silent = vec![Complex::new(0.0f32, 0.0); num_bins];
        let frame_at = |i: usize| frames.get(i).unwrap_or(&silent);

        let mut phase_acc: Vec<f32> = frames[0].iter().map(|c| c.arg()).collect();
        let mut prev_mag: Vec<f32> = vec![0.0; num_bins];
        let mut output = Vec::with_capacity((frames.len() as f64 / rate).ceil() as usize);

        let mut step = 0.0f64;
        while step < frames.len() as f64 {
            let index = step.floor() as usize;
            let alpha = (step - index as f64) as f32;
            let left = frame_at(index);
            let right = frame_at(index + 1);

            let mags: Vec<f32> = left
                .iter()
                .zip(right)
                .map(|(l, r)| (1.0 - alpha) * l.norm() + alpha * r.norm())
                .collect();

            if self.is_transient(&mags, &prev_mag) {
                for (acc, c) in phase_acc.iter_mut().zip(left) {
                    *acc = c.arg();
                }
            }

            let mut out: Spectrum = mags
                .iter()
                .zip(&phase_acc)
                .map(|(&m, &p)| Complex::from_polar(m, p))
                .collect();

            if self.params.phase_lock == PhaseLockMode::Identity {
                Self::lock_to_peaks(&mut out, &mags, left);
            }
            output.push(out);

            // Advance each bin by its measured instantaneous frequency
            for k in 0..num_bins {
                let deviation = wrap_phase(right[k].arg() - left[k].arg() - self.omega[k]);
                phase_acc[k] += self.omega[k] + deviation;
            }

            prev_mag = mags;
            step += rate;
        }

        output
    }

    /// Spectral flux relative to frame energy above the configured threshold
    fn is_transient(&self, mags: &[f32], prev_mag: &[f32]) -> bool {
        let Some(threshold) = self.params.transient_threshold else {
            return false;
        };

        let mut flux = 0.0f32;
        let mut total = 0.0f32;
        for (m, p) in mags.iter().zip(prev_mag) {
            let diff = m - p;
            if diff > 0.0 {
                flux += diff * diff;
            }
            total += m * m;
        }

        total > 1e-6 && flux.sqrt() / total.sqrt() > threshold
    }

    /// Identity phase locking (Laroche & Dolson)
    ///
    /// Each bin keeps its analysis phase offset from the peak that dominates
    /// its region and takes the peak's synthesized phase rotation.
    fn lock_to_peaks(out: &mut Spectrum, mags: &[f32], analysis: &[Complex<f32>]) {
        let n = mags.len();
        if n < 5 {
            return;
        }

        let peaks: Vec<usize> = (2..n - 2)
            .filter(|&k| {
                mags[k] > mags[k - 1]
                    && mags[k] > mags[k - 2]
                    && mags[k] >= mags[k + 1]
                    && mags[k] >= mags[k + 2]
            })
            .collect();
        if peaks.is_empty() {
            return;
        }

        let locked: Vec<f32> = out.iter().map(|c| c.arg()).collect();
        let mut peak_idx = 0;

        for k in 0..n {
            // Region boundary is the midpoint between neighbouring peaks
            while peak_idx + 1 < peaks.len() && k > (peaks[peak_idx] + peaks[peak_idx + 1]) / 2 {
                peak_idx += 1;
            }
            let peak = peaks[peak_idx];
            if k == peak {
                continue;
            }

            let rotation = locked[peak] - analysis[peak].arg();
            let phase = analysis[k].arg() + rotation;
            out[k] = Complex::from_polar(mags[k], phase);
        }
    }
}

/// Wrap phase to [-π, π]
#[inline(always)]
fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * (phase / TWO_PI).round()
}
