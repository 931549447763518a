//! Digital down-converter
//!
//! Mixes the real IF (left channel of the codec) against a complex local
//! oscillator at the IF offset, then averages each pair of mixed samples.
//! The pair average is the 2:1 decimation, so a 96 kHz capture yields
//! 48 kHz complex output and a tone exactly at the IF lands on DC.

use std::f64::consts::{PI, TAU};

use super::ComplexSample;

/// Full scale of a signed 32-bit PCM sample
const PCM_S32_SCALE: f32 = 1.0 / 2_147_483_648.0;

/// Interleaved channels per capture frame
const FRAME_CHANNELS: usize = 2;

/// Quadrature mixer plus pair-averaging decimator
///
/// The oscillator phase survives across calls, so a tone stays continuous
/// over chunk boundaries.
#[derive(Debug, Clone)]
pub struct DownConverter {
    /// Phase advance per input sample (radians)
    step: f64,
    /// Current oscillator phase, kept in (-pi, pi]
    phase: f64,
    iq_swap: bool,
}

impl DownConverter {
    pub fn new(if_hz: f64, capture_rate: u32, iq_swap: bool) -> Self {
        Self {
            step: TAU * if_hz / capture_rate as f64,
            phase: 0.0,
            iq_swap,
        }
    }

    /// Convert interleaved stereo S32 frames, appending complex samples to `out`
    ///
    /// Only the left channel is used. A trailing unpaired frame is dropped
    /// without advancing the oscillator. Returns the number of samples appended.
    pub fn process(&mut self, interleaved: &[i32], out: &mut Vec<ComplexSample>) -> usize {
        let frames = interleaved.len() / FRAME_CHANNELS;
        let pairs = frames / 2;
        out.reserve(pairs);

        for pair in interleaved[..pairs * 2 * FRAME_CHANNELS].chunks_exact(2 * FRAME_CHANNELS) {
            let x0 = pair[0] as f32 * PCM_S32_SCALE;
            let x1 = pair[FRAME_CHANNELS] as f32 * PCM_S32_SCALE;
            out.push(self.mix_pair(x0, x1));
        }

        pairs
    }

    /// Same as [`process`](Self::process) for real samples already scaled to ±1.0
    pub fn process_real(&mut self, samples: &[f32], out: &mut Vec<ComplexSample>) -> usize {
        let pairs = samples.len() / 2;
        out.reserve(pairs);

        for pair in samples.chunks_exact(2) {
            out.push(self.mix_pair(pair[0], pair[1]));
        }

        pairs
    }

    fn mix_pair(&mut self, x0: f32, x1: f32) -> ComplexSample {
        let z0 = self.mix(x0);
        let z1 = self.mix(x1);
        let y = (z0 + z1) * 0.5;

        if self.iq_swap {
            ComplexSample::new(y.im, y.re)
        } else {
            y
        }
    }

    #[inline]
    fn mix(&mut self, x: f32) -> ComplexSample {
        let (s, c) = self.phase.sin_cos();
        let z = ComplexSample::new(x * c as f32, -x * s as f32);

        self.phase += self.step;
        if self.phase > PI {
            self.phase -= TAU;
        } else if self.phase <= -PI {
            self.phase += TAU;
        }

        z
    }

    /// Current oscillator phase in radians
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Phase advance per input sample in radians
    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn iq_swap(&self) -> bool {
        self.iq_swap
    }

    /// Restart the oscillator at zero phase
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: u32 = 96_000;
    const IF_HZ: f64 = 24_000.0;

    /// Interleaved stereo S32 frames: left = tone, right = junk the DDC must ignore
    fn tone_frames(freq: f64, amplitude: f64, frames: usize) -> Vec<i32> {
        let mut buf = Vec::with_capacity(frames * 2);
        for n in 0..frames {
            let x = amplitude * (TAU * freq * n as f64 / FS as f64).cos();
            buf.push((x * i32::MAX as f64) as i32);
            buf.push(i32::MAX / 3);
        }
        buf
    }

    fn phase_deltas(samples: &[ComplexSample]) -> Vec<f64> {
        samples
            .windows(2)
            .map(|w| {
                let mut d = (w[1].arg() - w[0].arg()) as f64;
                if d > PI {
                    d -= TAU;
                } else if d <= -PI {
                    d += TAU;
                }
                d
            })
            .collect()
    }

    #[test]
    fn test_if_tone_lands_on_dc() {
        let mut ddc = DownConverter::new(IF_HZ, FS, false);
        let mut out = Vec::new();
        let produced = ddc.process(&tone_frames(IF_HZ, 0.5, 4800), &mut out);

        assert_eq!(produced, 2400);
        for d in phase_deltas(&out) {
            assert!(d.abs() < 1e-3, "phase moved by {d}");
        }
        for z in &out {
            assert!((z.norm() - 0.25).abs() < 1e-3, "magnitude {}", z.norm());
        }
    }

    #[test]
    fn test_offset_tone_maps_to_difference() {
        let mut ddc = DownConverter::new(IF_HZ, FS, false);
        let mut out = Vec::new();
        ddc.process(&tone_frames(IF_HZ + 1000.0, 0.5, 96_000), &mut out);

        let deltas = phase_deltas(&out);
        let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
        let expected = TAU * 1000.0 / 48_000.0;
        assert!((mean - expected).abs() < 1e-3, "mean step {mean}, expected {expected}");
    }

    #[test]
    fn test_zero_input_gives_zero_output() {
        let mut ddc = DownConverter::new(IF_HZ, FS, true);
        let mut out = Vec::new();
        ddc.process(&vec![0i32; 2000], &mut out);

        assert_eq!(out.len(), 500);
        assert!(out.iter().all(|z| z.re == 0.0 && z.im == 0.0));
    }

    #[test]
    fn test_odd_frame_count_drops_last_frame() {
        let mut ddc = DownConverter::new(12_000.0, FS, false);
        let mut out = Vec::new();
        let produced = ddc.process(&tone_frames(12_000.0, 0.5, 3), &mut out);

        assert_eq!(produced, 1);
        assert_eq!(out.len(), 1);
        // Two mixes happened, the third frame never touched the oscillator
        assert!((ddc.phase() - 2.0 * ddc.step()).abs() < 1e-9);
    }

    #[test]
    fn test_phase_continuous_across_chunks() {
        let input = tone_frames(IF_HZ + 3000.0, 0.7, 2000);

        let mut whole = DownConverter::new(IF_HZ, FS, false);
        let mut expected = Vec::new();
        whole.process(&input, &mut expected);

        let mut chunked = DownConverter::new(IF_HZ, FS, false);
        let mut actual = Vec::new();
        for chunk in input.chunks(2 * 250) {
            chunked.process(chunk, &mut actual);
        }

        assert_eq!(actual.len(), expected.len());
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).norm() < 1e-6);
        }
    }

    #[test]
    fn test_iq_swap_exchanges_components() {
        let input = tone_frames(IF_HZ + 500.0, 0.5, 64);

        let mut plain = DownConverter::new(IF_HZ, FS, false);
        let mut swapped = DownConverter::new(IF_HZ, FS, true);
        let (mut a, mut b) = (Vec::new(), Vec::new());
        plain.process(&input, &mut a);
        swapped.process(&input, &mut b);

        for (p, s) in a.iter().zip(&b) {
            assert_eq!(p.re, s.im);
            assert_eq!(p.im, s.re);
        }
    }

    #[test]
    fn test_phase_stays_wrapped() {
        let mut ddc = DownConverter::new(17_123.0, FS, false);
        let mut out = Vec::new();
        ddc.process_real(&vec![0.1; 10_001], &mut out);

        assert_eq!(out.len(), 5000);
        assert!(ddc.phase() > -PI && ddc.phase() <= PI);
    }
}
