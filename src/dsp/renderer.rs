//! WAV renderer — plays a formula through the engine offline.

use serde::{Deserialize, Serialize};

use crate::compiler::compile;
use crate::config::EngineConfig;
use crate::error::RenderError;

use super::encoder::EncodingMode;
use super::engine::Engine;

const BLOCK_SIZE: usize = 128;

/// Longest render accepted, in seconds.
pub const MAX_RENDER_SECONDS: f64 = 600.0;

/// Highest output rate accepted, in Hz.
pub const MAX_NATIVE_RATE: u32 = 768_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Emulated rate the formula runs at.
    pub sample_rate: f64,
    pub mode: EncodingMode,
    /// Output rate of the rendered audio.
    pub native_rate: u32,
    pub seconds: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            sample_rate: 8000.0,
            mode: EncodingMode::Uint8,
            native_rate: 44100,
            seconds: 1.0,
        }
    }
}

impl RenderOptions {
    /// Number of stereo frames to render. Negative durations render none.
    pub fn frames(&self) -> Result<usize, RenderError> {
        if self.native_rate == 0 || self.native_rate > MAX_NATIVE_RATE {
            return Err(RenderError::Rate {
                rate: self.native_rate,
            });
        }
        if self.seconds.is_nan() || self.seconds > MAX_RENDER_SECONDS {
            return Err(RenderError::Duration {
                seconds: self.seconds,
            });
        }
        Ok((self.seconds.max(0.0) * f64::from(self.native_rate)).round() as usize)
    }
}

/// Render a formula to interleaved stereo f32 at `options.native_rate`.
/// Blocks that fail at run time come out silent, as they would live.
pub fn render_samples(formula: &str, options: &RenderOptions) -> Result<Vec<f32>, RenderError> {
    let frames = options.frames()?;
    let config = EngineConfig {
        native_rate: f64::from(options.native_rate),
        ..Default::default()
    };
    let sample_rate = Some(options.sample_rate)
        .filter(|r| r.is_finite() && *r > 0.0)
        .unwrap_or(config.target_rate);
    let program = compile(formula, sample_rate)?;

    let (mut engine, _handle) = Engine::new(config);
    engine.load(program, options.mode);

    let len = frames
        .checked_mul(2)
        .ok_or(RenderError::TooLarge { samples: frames })?;
    let mut out = Vec::with_capacity(len);
    let mut left = [0.0f32; BLOCK_SIZE];
    let mut right = [0.0f32; BLOCK_SIZE];
    let mut remaining = frames;
    while remaining > 0 {
        let n = remaining.min(BLOCK_SIZE);
        engine.process(&mut left[..n], Some(&mut right[..n]));
        for i in 0..n {
            out.push(left[i]);
            out.push(right[i]);
        }
        remaining -= n;
    }
    Ok(out)
}

/// Render a formula to a WAV file as bytes (16-bit stereo PCM).
pub fn render_wav(formula: &str, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
    let samples = render_samples(formula, options)?;
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (f64::from(s) * 32767.0).round().clamp(-32768.0, 32767.0) as i16)
        .collect();
    encode_wav(&pcm, options.native_rate, 2).ok_or(RenderError::TooLarge {
        samples: pcm.len(),
    })
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer. `None` when a
/// header field would overflow its 32 bits.
fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Option<Vec<u8>> {
    let bits_per_sample: u16 = 16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate.checked_mul(u32::from(block_align))?;
    let data_size = u32::try_from(samples.len().checked_mul(2)?).ok()?;
    let file_size = data_size.checked_add(36)?;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;

    fn options(seconds: f64) -> RenderOptions {
        RenderOptions {
            seconds,
            ..Default::default()
        }
    }

    #[test]
    fn wav_header_valid() {
        let wav = render_wav("t*(t>>8)", &options(0.1)).unwrap();

        // Check RIFF header
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 44100);

        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 2);
    }

    #[test]
    fn wav_size_correct() {
        let wav = render_wav("t", &options(0.5)).unwrap();

        // 0.5s at 44.1 kHz = 22050 frames * 2 channels * 2 bytes
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 88200);
        assert_eq!(wav.len(), 44 + 88200);
    }

    #[test]
    fn samples_are_interleaved_stereo() {
        let opts = RenderOptions {
            sample_rate: 8000.0,
            mode: EncodingMode::Float,
            native_rate: 8000,
            seconds: 0.01,
        };
        let samples = render_samples("[0.5, -0.5]", &opts).unwrap();
        assert_eq!(samples.len(), 160);
        for frame in samples.chunks(2) {
            assert_eq!(frame, [0.5, -0.5]);
        }
    }

    #[test]
    fn render_matches_live_ramp() {
        let opts = RenderOptions {
            native_rate: 8000,
            seconds: 0.05,
            ..Default::default()
        };
        let samples = render_samples("t", &opts).unwrap();
        for (t, frame) in samples.chunks(2).enumerate() {
            let expected = ((t & 0xFF) as f32 - 128.0) / 128.0;
            assert_eq!(frame[0], expected, "t={t}");
        }
    }

    #[test]
    fn compile_errors_surface() {
        let err = render_wav("t >>> ", &options(0.1)).unwrap_err();
        assert!(matches!(err, RenderError::Compile(CompileError::Parse(_))));
    }

    #[test]
    fn absurd_durations_are_rejected() {
        for seconds in [1e30, f64::INFINITY, f64::NAN, MAX_RENDER_SECONDS + 1.0] {
            let err = render_wav("t", &options(seconds)).unwrap_err();
            assert!(matches!(err, RenderError::Duration { .. }), "{seconds}");
        }
        assert_eq!(options(f64::NEG_INFINITY).frames(), Ok(0));
    }

    #[test]
    fn output_rate_is_bounded() {
        for native_rate in [0, MAX_NATIVE_RATE + 1, u32::MAX] {
            let opts = RenderOptions {
                native_rate,
                ..options(0.1)
            };
            assert_eq!(render_samples("t", &opts), Err(RenderError::Rate { rate: native_rate }));
        }
    }

    #[test]
    fn longest_render_fits_a_wav_header() {
        let opts = RenderOptions {
            native_rate: MAX_NATIVE_RATE,
            seconds: MAX_RENDER_SECONDS,
            ..Default::default()
        };
        let bytes = opts.frames().unwrap() * 4;
        assert!(bytes + 36 <= u32::MAX as usize);
    }

    #[test]
    fn wav_header_overflow_is_refused() {
        assert_eq!(encode_wav(&[0; 4], u32::MAX, 2), None);
        assert_eq!(encode_wav(&[0; 4], 8000, 2).map(|wav| wav.len()), Some(52));
    }

    #[test]
    fn invalid_emulated_rate_falls_back() {
        let opts = RenderOptions {
            sample_rate: f64::NAN,
            native_rate: 8000,
            seconds: 0.001,
            ..Default::default()
        };
        let expected = render_samples("SR", &RenderOptions { sample_rate: 8000.0, ..opts.clone() });
        assert_eq!(render_samples("SR", &opts), expected);
    }

    #[test]
    fn full_pipeline_is_not_silent() {
        let wav = render_wav("t*(t>>5|t>>8)", &options(0.25)).unwrap();
        let mut has_nonzero = false;
        for i in (44..wav.len()).step_by(2) {
            if i + 1 < wav.len() && i16::from_le_bytes([wav[i], wav[i + 1]]) != 0 {
                has_nonzero = true;
                break;
            }
        }
        assert!(has_nonzero, "Rendered WAV should contain non-silent audio");
    }

    #[test]
    fn negative_duration_renders_nothing() {
        assert!(render_samples("t", &options(-1.0)).unwrap().is_empty());
    }
}
