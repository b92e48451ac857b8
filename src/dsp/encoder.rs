//! Sample encoder — maps raw formula output to audio-range samples.

use serde::{Deserialize, Serialize};

use crate::value::to_int32;

/// How raw formula values become samples in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "serde_json::Value")]
pub enum EncodingMode {
    /// Low 8 bits as an unsigned byte centred on 128 (classic bytebeat).
    #[default]
    Uint8,
    /// Low 8 bits as a signed byte.
    Int8,
    /// The value itself, clamped.
    Float,
}

impl EncodingMode {
    /// Parse a mode name. Anything unrecognised is `Uint8`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "int8" => EncodingMode::Int8,
            "float" => EncodingMode::Float,
            _ => EncodingMode::Uint8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncodingMode::Uint8 => "uint8",
            EncodingMode::Int8 => "int8",
            EncodingMode::Float => "float",
        }
    }

    /// Encode one raw channel value.
    #[inline]
    pub fn encode(self, raw: f64) -> f32 {
        match self {
            EncodingMode::Uint8 => byte_to_sample(to_int32(raw) & 0xFF),
            EncodingMode::Int8 => byte_to_sample(to_int32(raw + 128.0) & 0xFF),
            EncodingMode::Float => {
                if raw.is_nan() {
                    0.0
                } else {
                    raw.clamp(-1.0, 1.0) as f32
                }
            }
        }
    }

    /// Encode a raw `(left, right)` pair.
    #[inline]
    pub fn encode_frame(self, (left, right): (f64, f64)) -> (f32, f32) {
        (self.encode(left), self.encode(right))
    }
}

impl From<&str> for EncodingMode {
    fn from(name: &str) -> Self {
        EncodingMode::from_name(name)
    }
}

/// Collaborators may send anything as the mode; non-strings fall back too.
impl From<serde_json::Value> for EncodingMode {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(name) => EncodingMode::from_name(&name),
            _ => EncodingMode::Uint8,
        }
    }
}

#[inline]
fn byte_to_sample(byte: i32) -> f32 {
    (byte - 128) as f32 / 128.0
}
