// Volume metering from frequency-domain energy
//
// Mirrors a typical analyser node: Hann-windowed FFT over the most recent
// samples, bin magnitudes mapped from a decibel range onto 0..255, averaged,
// and rescaled to a 0..100 level.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Number of samples analysed per reading
pub const FFT_SIZE: usize = 1024;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

pub struct VolumeMeter {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    size: usize,
}

impl VolumeMeter {
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(size);
        let window = (0..size)
            .map(|i| {
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()
            })
            .collect();

        Self { fft, window, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Level 0..=100 for normalized samples in [-1, 1]
    ///
    /// Uses the last `size` samples; shorter input is zero-padded at the front.
    pub fn level(&self, samples: &[f32]) -> u8 {
        if samples.is_empty() {
            return 0;
        }

        let tail = &samples[samples.len().saturating_sub(self.size)..];
        let offset = self.size - tail.len();

        let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); self.size];
        for (i, &sample) in tail.iter().enumerate() {
            let idx = offset + i;
            buffer[idx] = Complex::new(sample * self.window[idx], 0.0);
        }

        self.fft.process(&mut buffer);

        let bins = self.size / 2;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        let total: f32 = buffer[..bins]
            .iter()
            .map(|c| {
                let magnitude = c.norm() / self.size as f32;
                if magnitude <= f32::EPSILON {
                    return 0.0;
                }
                let db = 20.0 * magnitude.log10();
                ((db - MIN_DECIBELS) / range * 255.0).clamp(0.0, 255.0)
            })
            .sum();

        let average = total / bins as f32;
        (average / 255.0 * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new(FFT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(amplitude: f32, freq: f32, rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin())
            .collect()
    }

    #[test]
    fn test_silence_is_zero() {
        let meter = VolumeMeter::default();
        assert_eq!(meter.level(&[]), 0);
        assert_eq!(meter.level(&vec![0.0; FFT_SIZE]), 0);
    }

    #[test]
    fn test_louder_signal_reads_higher() {
        let meter = VolumeMeter::default();
        let quiet = meter.level(&sine(0.01, 1000.0, 48000.0, FFT_SIZE));
        let loud = meter.level(&sine(0.8, 1000.0, 48000.0, FFT_SIZE));

        assert!(loud > 0);
        assert!(loud > quiet, "loud={} quiet={}", loud, quiet);
        assert!(loud <= 100);
    }

    #[test]
    fn test_short_input_is_padded() {
        let meter = VolumeMeter::default();
        let level = meter.level(&sine(0.8, 440.0, 48000.0, 128));
        assert!(level <= 100);
    }
}
