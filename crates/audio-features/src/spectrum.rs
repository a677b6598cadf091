//! Short-time Fourier transform magnitudes.

use std::f32::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitude spectrogram, one row per analysis frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub frame_size: usize,
    pub hop: usize,
    pub sample_rate: u32,
    /// `frames[i][bin]`, bins `0..=frame_size / 2`.
    pub frames: Vec<Vec<f32>>,
}

impl Spectrogram {
    pub fn bin_count(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Centre frequency of an FFT bin in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.frame_size as f32
    }
}

/// Number of complete frames that fit in `len` samples.
pub fn frame_count(len: usize, frame_size: usize, hop: usize) -> usize {
    if frame_size == 0 || hop == 0 || len < frame_size {
        0
    } else {
        (len - frame_size) / hop + 1
    }
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Hann-windowed STFT magnitudes. Trailing samples that don't fill a frame are ignored.
pub fn stft(samples: &[f32], sample_rate: u32, frame_size: usize, hop: usize) -> Spectrogram {
    let n_frames = frame_count(samples.len(), frame_size, hop);
    let mut frames = Vec::with_capacity(n_frames);

    if n_frames > 0 {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let window = hann_window(frame_size);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); frame_size];

        for i in 0..n_frames {
            let start = i * hop;
            for (slot, (&s, &w)) in buffer
                .iter_mut()
                .zip(samples[start..start + frame_size].iter().zip(&window))
            {
                *slot = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer[..=frame_size / 2].iter().map(|c| c.norm()).collect());
        }
    }

    Spectrogram {
        frame_size,
        hop,
        sample_rate,
        frames,
    }
}

/// Magnitude-weighted mean frequency of one spectrum frame, 0 for silence.
pub fn spectral_centroid(frame: &[f32], spec: &Spectrogram) -> f32 {
    let (weighted, total) = frame
        .iter()
        .enumerate()
        .fold((0.0f32, 0.0f32), |(w, t), (bin, &mag)| {
            (w + spec.bin_frequency(bin) * mag, t + mag)
        });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}
