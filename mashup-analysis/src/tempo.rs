//! Tempo and beat detection
//!
//! Estimates BPM from a spectral flux onset function via autocorrelation, then
//! lays a beat grid over the whole track and snaps each beat to a nearby onset.

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Tempo estimate for a full track
#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    /// Beats per minute
    pub bpm: f64,
    /// Beat timestamps in seconds, ascending
    pub beat_times: Vec<f64>,
    /// Confidence score (0.0 - 1.0) from the autocorrelation peak
    pub confidence: f32,
}

/// Tempo analyzer using spectral flux onset detection
pub struct TempoAnalyzer {
    sample_rate: u32,
    hop_size: usize,
    fft_size: usize,
    fft: Arc<dyn rustfft::Fft<f32>>,
    window: Vec<f32>,
}

impl TempoAnalyzer {
    /// Slowest tempo considered by the autocorrelation search
    pub const MIN_BPM: f32 = 60.0;
    /// Fastest tempo considered by the autocorrelation search
    pub const MAX_BPM: f32 = 200.0;

    /// Create a new tempo analyzer
    pub fn new(sample_rate: u32) -> Self {
        let fft_size = 2048;
        let hop_size = 512; // ~11.6ms at 44.1kHz - good for transient detection
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        // Pre-compute Hann window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            sample_rate,
            hop_size,
            fft_size,
            fft,
            window,
        }
    }

    /// Seconds covered by one onset function frame
    fn seconds_per_frame(&self) -> f64 {
        self.hop_size as f64 / self.sample_rate as f64
    }

    /// Analyze mono samples and estimate tempo and beat positions
    ///
    /// Returns None when the input is too short or has no periodic onsets
    /// (silence, drones).
    pub fn analyze(&self, mono: &[f32]) -> Option<TempoEstimate> {
        // Need at least 4 seconds of audio
        if mono.len() < self.sample_rate as usize * 4 {
            return None;
        }

        // 1. Compute spectral flux onset detection function
        let onset_function = self.compute_onset_function(mono);

        // 2. Estimate BPM using autocorrelation
        let (bpm, confidence) = self.estimate_bpm_autocorrelation(&onset_function)?;

        // 3. Find onset peaks and lay the beat grid over them
        let onsets = self.find_onset_peaks(&onset_function);
        let beat_times = self.track_beats(&onsets, onset_function.len(), bpm);

        tracing::debug!(
            bpm,
            confidence,
            beats = beat_times.len(),
            onsets = onsets.len(),
            "Tempo analysis finished"
        );

        Some(TempoEstimate {
            bpm: bpm as f64,
            beat_times,
            confidence,
        })
    }

    /// Compute spectral flux onset detection function
    ///
    /// Spectral flux measures the change in magnitude spectrum between consecutive frames.
    /// Transients (kicks, snares) cause large positive flux values.
    fn compute_onset_function(&self, mono: &[f32]) -> Vec<f32> {
        let mut onset_fn = Vec::with_capacity(mono.len() / self.hop_size);
        let mut prev_spectrum: Option<Vec<f32>> = None;
        let mut buffer = vec![Complex::new(0.0f32, 0.0); self.fft_size];

        let mut frame_start = 0;
        while frame_start + self.fft_size <= mono.len() {
            let frame = &mono[frame_start..frame_start + self.fft_size];

            for (slot, (s, w)) in buffer.iter_mut().zip(frame.iter().zip(&self.window)) {
                *slot = Complex::new(s * w, 0.0);
            }

            self.fft.process(&mut buffer);

            // Magnitude spectrum (only positive frequencies)
            let spectrum: Vec<f32> = buffer[..self.fft_size / 2]
                .iter()
                .map(|c| c.norm())
                .collect();

            // Half-wave rectified difference: only increases indicate onsets
            if let Some(ref prev) = prev_spectrum {
                let flux: f32 = spectrum
                    .iter()
                    .zip(prev.iter())
                    .map(|(curr, prev)| (curr - prev).max(0.0))
                    .sum();
                onset_fn.push(flux);
            }

            prev_spectrum = Some(spectrum);
            frame_start += self.hop_size;
        }

        let max = onset_fn.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for v in &mut onset_fn {
                *v /= max;
            }
        }

        onset_fn
    }

    /// Find peaks in the onset detection function
    fn find_onset_peaks(&self, onset_fn: &[f32]) -> Vec<usize> {
        if onset_fn.len() < 3 {
            return Vec::new();
        }

        // Adaptive threshold: mean + 0.5 * std_dev
        let mean: f32 = onset_fn.iter().sum::<f32>() / onset_fn.len() as f32;
        let variance: f32 =
            onset_fn.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / onset_fn.len() as f32;
        let threshold = (mean + 0.5 * variance.sqrt()).max(0.1);

        // Minimum distance between peaks: 50ms
        let min_distance = ((self.sample_rate as f32 * 0.05) as usize / self.hop_size).max(1);

        let mut peaks = Vec::new();
        let mut last_peak: isize = -(min_distance as isize);

        for i in 1..onset_fn.len() - 1 {
            if onset_fn[i] > threshold
                && onset_fn[i] > onset_fn[i - 1]
                && onset_fn[i] >= onset_fn[i + 1]
                && (i as isize - last_peak) >= min_distance as isize
            {
                peaks.push(i);
                last_peak = i as isize;
            }
        }

        peaks
    }

    /// Normalized correlation of the onset function with itself at `lag`
    fn correlation_at_lag(&self, onset_fn: &[f32], lag: usize) -> f32 {
        if lag == 0 || lag >= onset_fn.len() / 2 {
            return 0.0;
        }

        let mut correlation: f32 = 0.0;
        let mut norm_a: f32 = 0.0;
        let mut norm_b: f32 = 0.0;

        for i in 0..(onset_fn.len() - lag) {
            correlation += onset_fn[i] * onset_fn[i + lag];
            norm_a += onset_fn[i] * onset_fn[i];
            norm_b += onset_fn[i + lag] * onset_fn[i + lag];
        }

        let norm = (norm_a * norm_b).sqrt();
        if norm > 0.0 {
            correlation / norm
        } else {
            0.0
        }
    }

    /// Estimate BPM using autocorrelation of the onset function
    ///
    /// The lag with highest correlation corresponds to the beat period.
    fn estimate_bpm_autocorrelation(&self, onset_fn: &[f32]) -> Option<(f32, f32)> {
        let frames_per_second = self.sample_rate as f32 / self.hop_size as f32;
        let min_lag = ((frames_per_second * 60.0 / Self::MAX_BPM) as usize).max(1);
        let max_lag = (frames_per_second * 60.0 / Self::MIN_BPM) as usize;

        // Use the first ~8 beat periods at the slowest tempo
        let analysis_len = onset_fn.len().min(max_lag * 8);
        let analysis = &onset_fn[..analysis_len];
        let upper = max_lag.min(analysis_len / 2);
        if upper <= min_lag {
            return None;
        }

        let mut best_lag = min_lag;
        let mut best_correlation = 0.0f32;

        for lag in min_lag..upper {
            let correlation = self.correlation_at_lag(analysis, lag);
            if correlation > best_correlation {
                best_correlation = correlation;
                best_lag = lag;
            }
        }

        if best_correlation <= 0.0 {
            return None;
        }

        let seconds_per_beat = best_lag as f32 / frames_per_second;
        let raw_bpm = 60.0 / seconds_per_beat;
        let final_bpm = self.disambiguate_octave(analysis, raw_bpm, frames_per_second);

        Some((final_bpm, best_correlation.clamp(0.0, 1.0)))
    }

    /// Disambiguate between octave-related BPM values (e.g., 77 vs 154)
    ///
    /// In the ambiguous 65-95 range the doubled tempo wins when its
    /// correlation is at least 70% as strong; in 170-185 the halved tempo
    /// wins only when it is clearly stronger.
    fn disambiguate_octave(&self, onset_fn: &[f32], raw_bpm: f32, frames_per_second: f32) -> f32 {
        if raw_bpm < 65.0 {
            return raw_bpm * 2.0;
        }

        if raw_bpm > 185.0 {
            return raw_bpm / 2.0;
        }

        let lag_for = |bpm: f32| (frames_per_second * 60.0 / bpm) as usize;

        if (65.0..=95.0).contains(&raw_bpm) {
            let doubled_bpm = raw_bpm * 2.0;
            let original_corr = self.correlation_at_lag(onset_fn, lag_for(raw_bpm));
            let doubled_corr = self.correlation_at_lag(onset_fn, lag_for(doubled_bpm));

            let doubled_is_reasonable = (120.0..=180.0).contains(&doubled_bpm);
            if doubled_is_reasonable && doubled_corr / original_corr.max(0.001) > 0.7 {
                return doubled_bpm;
            }
        }

        if (170.0..=185.0).contains(&raw_bpm) {
            let halved_bpm = raw_bpm / 2.0;
            let original_corr = self.correlation_at_lag(onset_fn, lag_for(raw_bpm));
            let halved_corr = self.correlation_at_lag(onset_fn, lag_for(halved_bpm));

            if halved_corr > original_corr * 1.2 {
                return halved_bpm;
            }
        }

        raw_bpm
    }

    /// Pick the onset that best anchors a grid at the given tempo
    fn find_first_beat(&self, onsets: &[usize], beat_interval: f64) -> usize {
        let candidates = onsets.len().min(32);
        let tolerance = beat_interval / 6.0; // ~16% tolerance
        let mut best_onset = onsets[0];
        let mut best_score = 0.0f32;

        for &onset in &onsets[..candidates] {
            let mut score = 0.0;

            for beat_num in 0..16 {
                let expected = onset as f64 + beat_num as f64 * beat_interval;
                let aligned = onsets
                    .iter()
                    .any(|&actual| (actual as f64 - expected).abs() <= tolerance);
                if aligned {
                    // Weight earlier beats more heavily
                    score += 1.0 / (beat_num as f32 + 1.0);
                }
            }

            if score > best_score {
                best_score = score;
                best_onset = onset;
            }
        }

        best_onset
    }

    /// Lay a beat grid across the whole onset function
    ///
    /// Grid positions within tolerance of a detected onset snap to it; the
    /// grid then continues from the snapped position so slow drift is followed.
    fn track_beats(&self, onsets: &[usize], num_frames: usize, bpm: f32) -> Vec<f64> {
        if onsets.is_empty() || bpm <= 0.0 {
            return Vec::new();
        }

        let frames_per_second = self.sample_rate as f64 / self.hop_size as f64;
        let beat_interval = frames_per_second * 60.0 / bpm as f64;
        if beat_interval < 1.0 {
            return Vec::new();
        }
        let tolerance = beat_interval / 6.0;

        let mut beats = Vec::new();
        let mut position = self.find_first_beat(onsets, beat_interval) as f64;
        let mut last = f64::NEG_INFINITY;

        while position < num_frames as f64 {
            let snapped = onsets
                .iter()
                .map(|&o| o as f64)
                .filter(|o| (o - position).abs() <= tolerance)
                .min_by(|a, b| (a - position).abs().total_cmp(&(b - position).abs()))
                .unwrap_or(position);

            if snapped > last {
                // Onset frame i measures the change into analysis frame i + 1
                beats.push((snapped + 1.0) * self.seconds_per_frame());
                last = snapped;
            }
            position = snapped + beat_interval;
        }

        beats
    }
}
