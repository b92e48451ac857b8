//! Messages between the control context and the audio engine.
//!
//! Both directions are serde-tagged enums so the same shapes work as JSON,
//! through `serde-wasm-bindgen` from an AudioWorklet port, or as plain Rust
//! values pushed through the engine's ring buffers.

use rtrb::{Consumer, Producer, PushError};
use serde::{Deserialize, Deserializer, Serialize};

use crate::dsp::encoder::EncodingMode;

/// Control → engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Compile and play a new formula.
    #[serde(rename_all = "camelCase")]
    SetExpression {
        #[serde(default)]
        expression: String,
        /// Applied only when finite and positive.
        #[serde(default, deserialize_with = "lenient_rate")]
        sample_rate: Option<f64>,
        /// Missing or unrecognised modes mean `uint8`.
        #[serde(default)]
        mode: Option<EncodingMode>,
    },
    /// Back to time zero and silence; forget formula globals.
    Reset,
}

impl Command {
    pub fn set_expression(expression: impl Into<String>) -> Self {
        Command::SetExpression {
            expression: expression.into(),
            sample_rate: None,
            mode: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Engine → control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    CompileError { message: String },
    RuntimeError { message: String },
    Level { rms: f64 },
}

impl Notification {
    pub fn to_json(&self) -> String {
        // Plain data with string keys; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Accept any JSON value for the sample rate; only usable numbers survive.
fn lenient_rate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|rate| rate.is_finite() && *rate > 0.0))
}

/// The control side of an engine: sends commands, receives notifications.
pub struct EngineHandle {
    commands: Producer<Command>,
    notifications: Consumer<Notification>,
}

impl EngineHandle {
    pub(crate) fn new(commands: Producer<Command>, notifications: Consumer<Notification>) -> Self {
        EngineHandle {
            commands,
            notifications,
        }
    }

    /// Queue a command for the next audio block. A full queue hands the
    /// command back.
    pub fn send(&mut self, command: Command) -> Result<(), Command> {
        self.commands.push(command).map_err(|PushError::Full(c)| c)
    }

    pub fn set_expression(
        &mut self,
        expression: impl Into<String>,
        sample_rate: Option<f64>,
        mode: Option<EncodingMode>,
    ) -> Result<(), Command> {
        self.send(Command::SetExpression {
            expression: expression.into(),
            sample_rate,
            mode,
        })
    }

    pub fn reset(&mut self) -> Result<(), Command> {
        self.send(Command::Reset)
    }

    /// Next pending notification, if any.
    pub fn poll(&mut self) -> Option<Notification> {
        self.notifications.pop().ok()
    }

    /// Every pending notification, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.poll()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_expression_from_json() {
        let cmd = Command::from_json(
            r#"{"type":"setExpression","expression":"t*(t>>8)","sampleRate":11025,"mode":"float"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SetExpression {
                expression: "t*(t>>8)".into(),
                sample_rate: Some(11025.0),
                mode: Some(EncodingMode::Float),
            }
        );
    }

    #[test]
    fn optional_fields_are_lenient() {
        let cmd = Command::from_json(
            r#"{"type":"setExpression","expression":"t","sampleRate":"fast","mode":"stereo"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SetExpression {
                expression: "t".into(),
                sample_rate: None,
                mode: Some(EncodingMode::Uint8),
            }
        );

        let cmd = Command::from_json(r#"{"type":"setExpression","sampleRate":-5}"#).unwrap();
        assert_eq!(cmd, Command::set_expression(""));
    }

    #[test]
    fn reset_from_json() {
        assert_eq!(Command::from_json(r#"{"type":"reset"}"#).unwrap(), Command::Reset);
        assert!(Command::from_json(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn notification_json_shapes() {
        assert_eq!(
            Notification::Level { rms: 0.5 }.to_json(),
            r#"{"type":"level","rms":0.5}"#
        );
        assert_eq!(
            Notification::CompileError { message: "bad".into() }.to_json(),
            r#"{"type":"compileError","message":"bad"}"#
        );
    }

    #[test]
    fn full_queue_hands_command_back() {
        let (producer, _consumer) = rtrb::RingBuffer::new(1);
        let (_unused, notifications) = rtrb::RingBuffer::new(1);
        let mut handle = EngineHandle::new(producer, notifications);
        assert!(handle.reset().is_ok());
        assert_eq!(handle.reset(), Err(Command::Reset));
        assert!(handle.poll().is_none());
    }
}
