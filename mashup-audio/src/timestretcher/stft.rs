//! Offline Short-Time Fourier Transform
//!
//! Frames are centered: the signal is zero-padded by half a window on both
//! sides so the first frame is centered on sample 0. Synthesis is windowed
//! overlap-add normalized by the summed squared window.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// FFT size options for time-stretching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftSize {
    /// 1024 samples - better transients, less frequency resolution
    Small = 1024,
    /// 2048 samples - balanced (recommended)
    #[default]
    Medium = 2048,
    /// 4096 samples - smoother tones, smeared attacks
    Large = 4096,
}

impl FftSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn hop_size(self) -> usize {
        // 75% overlap
        self.as_usize() / 4
    }
}

/// One analysis frame: the positive-frequency bins (size/2 + 1)
pub type Spectrum = Vec<Complex<f32>>;

/// Short-Time Fourier Transform processor
pub struct Stft {
    size: usize,
    hop_size: usize,
    /// Pre-computed periodic Hann window
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(fft_size: FftSize) -> Self {
        let size = fft_size.as_usize();
        let mut planner = FftPlanner::new();

        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();

        Self {
            size,
            hop_size: fft_size.hop_size(),
            window,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of positive frequency bins (size/2 + 1)
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Forward transform of a whole signal into overlapping frames
    pub fn analyze(&self, signal: &[f32]) -> Vec<Spectrum> {
        let pad = self.size / 2;
        let mut padded = vec![0.0f32; signal.len() + 2 * pad];
        padded[pad..pad + signal.len()].copy_from_slice(signal);

        let num_frames = 1 + (padded.len() - self.size) / self.hop_size;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.size];
        let mut frames = Vec::with_capacity(num_frames);

        for f in 0..num_frames {
            let start = f * self.hop_size;
            for (slot, (s, w)) in buffer
                .iter_mut()
                .zip(padded[start..start + self.size].iter().zip(&self.window))
            {
                *slot = Complex::new(s * w, 0.0);
            }

            self.forward.process(&mut buffer);
            frames.push(buffer[..self.num_bins()].to_vec());
        }

        frames
    }

    /// Inverse transform and overlap-add, trimmed or padded to `len` samples
    pub fn synthesize(&self, frames: &[Spectrum], len: usize) -> Vec<f32> {
        if frames.is_empty() {
            return vec![0.0; len];
        }

        let out_len = self.size + self.hop_size * (frames.len() - 1);
        let mut output = vec![0.0f32; out_len];
        let mut window_sum = vec![0.0f32; out_len];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.size];
        let norm = 1.0 / self.size as f32;

        for (f, frame) in frames.iter().enumerate() {
            // Rebuild the full spectrum from the positive half (Hermitian symmetry)
            buffer[..self.num_bins()].copy_from_slice(&frame[..self.num_bins()]);
            for k in 1..self.size / 2 {
                buffer[self.size - k] = frame[k].conj();
            }

            self.inverse.process(&mut buffer);

            let start = f * self.hop_size;
            for i in 0..self.size {
                let w = self.window[i];
                output[start + i] += buffer[i].re * norm * w;
                window_sum[start + i] += w * w;
            }
        }

        for (s, w) in output.iter_mut().zip(&window_sum) {
            if *w > 1e-6 {
                *s /= w;
            }
        }

        let pad = self.size / 2;
        let mut trimmed: Vec<f32> = output.into_iter().skip(pad).take(len).collect();
        trimmed.resize(len, 0.0);
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count() {
        let stft = Stft::new(FftSize::Small);
        let frames = stft.analyze(&vec![0.0; 4096]);
        // 4096 + 1024 padding = 5120 samples, hop 256
        assert_eq!(frames.len(), 1 + (5120 - 1024) / 256);
        assert_eq!(frames[0].len(), 513);
    }

    #[test]
    fn test_reconstruction() {
        let stft = Stft::new(FftSize::Small);
        let signal: Vec<f32> = (0..8000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 48000.0).sin() * 0.5)
            .collect();

        let frames = stft.analyze(&signal);
        let rebuilt = stft.synthesize(&frames, signal.len());

        assert_eq!(rebuilt.len(), signal.len());
        let max_err = signal
            .iter()
            .zip(&rebuilt)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "reconstruction error {max_err}");
    }

    #[test]
    fn test_short_signal() {
        let stft = Stft::new(FftSize::Medium);
        let frames = stft.analyze(&[0.5; 10]);
        assert!(!frames.is_empty());
        assert_eq!(stft.synthesize(&frames, 10).len(), 10);
    }
}
