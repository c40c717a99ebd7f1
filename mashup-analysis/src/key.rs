//! Key detection using chromagram analysis
//!
//! 1. Compute a chromagram (12-bin pitch class energy) for every STFT frame
//! 2. Average the frames over the whole track
//! 3. The pitch class with the largest mean energy is the key

use crate::pitch::PitchClass;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Detected key with the chroma it was derived from
#[derive(Debug, Clone, Copy)]
pub struct DetectedKey {
    /// Dominant pitch class
    pub key: PitchClass,
    /// Share of the total chroma energy held by the dominant pitch class (0.0 - 1.0)
    pub strength: f32,
    /// Mean chroma, normalized to unit sum (all zeros for silence)
    pub chroma: [f32; 12],
}

/// Reference frequency for A4 (440 Hz)
const A4_FREQ: f32 = 440.0;

/// Key analyzer using chromagram-based detection
pub struct KeyAnalyzer {
    fft_size: usize,
    hop_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
    /// Pre-computed bin-to-pitch-class mapping
    bin_to_pitch_class: Vec<Option<u8>>,
    /// Pre-computed bin weights (includes harmonic emphasis AND octave decay)
    bin_weights: Vec<f32>,
    /// Pre-allocated FFT buffer (reused per frame to avoid allocation)
    fft_buffer: Vec<Complex<f32>>,
}

impl KeyAnalyzer {
    /// Create a new key analyzer
    ///
    /// Uses a 4096-sample FFT for good frequency resolution at low frequencies.
    pub fn new(sample_rate: u32) -> Self {
        let fft_size = 4096;
        let hop_size = 2048; // 50% overlap

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        let (bin_to_pitch_class, bin_weights) =
            Self::compute_pitch_class_mapping(fft_size, sample_rate);

        Self {
            fft_size,
            hop_size,
            fft,
            window,
            bin_to_pitch_class,
            bin_weights,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Compute the mapping from FFT bins to pitch classes
    ///
    /// Each bin in 55 Hz - 4 kHz is mapped to its closest pitch class (0-11, 0=C).
    /// Weights combine harmonic emphasis (detune) and ~6dB/octave decay above 500Hz.
    fn compute_pitch_class_mapping(
        fft_size: usize,
        sample_rate: u32,
    ) -> (Vec<Option<u8>>, Vec<f32>) {
        let nyquist = sample_rate as f32 / 2.0;
        let bin_freq = |bin: usize| -> f32 { bin as f32 * sample_rate as f32 / fft_size as f32 };

        let mut mapping = Vec::with_capacity(fft_size / 2);
        let mut weights = Vec::with_capacity(fft_size / 2);

        let min_freq = 55.0; // A1
        let max_freq = 4000.0; // Roughly B7

        for bin in 0..fft_size / 2 {
            let freq = bin_freq(bin);

            if freq < min_freq || freq > max_freq || freq >= nyquist {
                mapping.push(None);
                weights.push(0.0);
                continue;
            }

            // MIDI note number: 12 * log2(freq / 440) + 69
            let midi_note = 12.0 * (freq / A4_FREQ).log2() + 69.0;
            let exact_note = midi_note.round();
            let pitch_class = (exact_note as i32).rem_euclid(12) as u8;

            // 1.0 at exact pitch, 0.0 at +/-0.5 semitone
            let detune = (midi_note - exact_note).abs();
            let harmonic_weight = 1.0 - detune.min(0.5) * 2.0;
            let octave_decay = (500.0 / freq.max(500.0)).sqrt();

            mapping.push(Some(pitch_class));
            weights.push(harmonic_weight.max(0.0) * octave_decay);
        }

        (mapping, weights)
    }

    /// Analyze mono samples and return the dominant pitch class
    ///
    /// Input shorter than one analysis frame is zero-padded to a single frame.
    /// Silence yields C with zero strength.
    pub fn analyze(&mut self, mono: &[f32]) -> DetectedKey {
        let chroma = self.compute_chromagram(mono);

        // First maximum wins, so an all-zero chroma lands on C
        let (index, &peak) = chroma
            .iter()
            .enumerate()
            .fold((0, &chroma[0]), |best, cur| if cur.1 > best.1 { cur } else { best });

        DetectedKey {
            key: PitchClass::wrapping(index as i32),
            strength: peak,
            chroma,
        }
    }

    /// Compute the mean chromagram (12-bin pitch class distribution), unit-sum normalized
    pub fn compute_chromagram(&mut self, mono: &[f32]) -> [f32; 12] {
        let mut chroma = [0.0f32; 12];
        let mut frame_count = 0;

        if mono.len() < self.fft_size {
            let mut padded = mono.to_vec();
            padded.resize(self.fft_size, 0.0);
            let frame_chroma = self.analyze_frame(&padded);
            chroma = frame_chroma;
            frame_count = 1;
        } else {
            let mut pos = 0;
            while pos + self.fft_size <= mono.len() {
                let frame_chroma = self.analyze_frame(&mono[pos..pos + self.fft_size]);
                for (acc, v) in chroma.iter_mut().zip(frame_chroma) {
                    *acc += v;
                }
                frame_count += 1;
                pos += self.hop_size;
            }
        }

        for v in &mut chroma {
            *v /= frame_count as f32;
        }

        let sum: f32 = chroma.iter().sum();
        if sum > 0.0 {
            for v in &mut chroma {
                *v /= sum;
            }
        }

        chroma
    }

    /// Analyze a single frame and return its chromagram contribution
    fn analyze_frame(&mut self, frame: &[f32]) -> [f32; 12] {
        for (i, (s, w)) in frame.iter().zip(&self.window).enumerate() {
            self.fft_buffer[i] = Complex::new(s * w, 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let mut chroma = [0.0f32; 12];

        for (bin, complex) in self.fft_buffer[..self.fft_size / 2].iter().enumerate() {
            if let Some(pitch_class) = self.bin_to_pitch_class[bin] {
                // Squared magnitude is enough for relative energy
                chroma[pitch_class as usize] += complex.norm_sqr() * self.bin_weights[bin];
            }
        }

        chroma
    }
}
