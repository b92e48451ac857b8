pub mod ast;
pub mod command;
pub mod compiler;
pub mod config;
pub mod dsp;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod program;
pub mod token;
pub mod value;

use crate::command::{Command, EngineHandle};
use crate::config::EngineConfig;
use crate::dsp::encoder::EncodingMode;
use crate::dsp::engine::Engine;
use crate::dsp::renderer::RenderOptions;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::parser::Parser;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the bytebeat-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Parse formula text into a `Formula` AST.
pub fn parse(input: &str) -> Result<ast::Formula, CompileError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    Ok(parser.parse_formula()?)
}

/// WASM-exposed: check a formula for the editor. Returns the annotated
/// diagnostic when it does not compile, nothing when it does.
#[wasm_bindgen]
pub fn compile_check(formula: &str) -> Option<String> {
    compiler::compile(formula, 8000.0)
        .err()
        .map(|e| e.report(formula))
}

/// WASM-exposed: render a formula to a WAV byte array.
#[wasm_bindgen]
pub fn render_formula_wav(
    formula: &str,
    sample_rate: f64,
    mode: &str,
    native_rate: u32,
    seconds: f64,
) -> Result<Vec<u8>, JsValue> {
    let options = RenderOptions {
        sample_rate,
        mode: EncodingMode::from_name(mode),
        native_rate,
        seconds,
    };
    dsp::renderer::render_wav(formula, &options).map_err(|e| JsValue::from_str(&e.report(formula)))
}

/// WASM-exposed: an engine for an AudioWorklet's `process` callback.
///
/// The worklet forwards port messages to `post_message`; they take effect
/// at the start of the next `process` call. Notifications accumulate until
/// `take_notifications` collects them.
#[wasm_bindgen]
pub struct BytebeatProcessor {
    engine: Engine,
    handle: EngineHandle,
}

#[wasm_bindgen]
impl BytebeatProcessor {
    #[wasm_bindgen(constructor)]
    pub fn new(native_rate: f64) -> BytebeatProcessor {
        let (engine, handle) = Engine::new(EngineConfig::with_native_rate(native_rate));
        BytebeatProcessor { engine, handle }
    }

    /// Queue a `{ type: "setExpression" | "reset", ... }` message.
    pub fn post_message(&mut self, message: JsValue) -> Result<(), JsValue> {
        let command: Command = serde_wasm_bindgen::from_value(message)
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        self.handle
            .send(command)
            .map_err(|_| JsValue::from_str("command queue is full"))
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.engine.process(left, Some(right));
    }

    pub fn process_mono(&mut self, out: &mut [f32]) {
        self.engine.process(out, None);
    }

    /// Drain pending notifications as an array of `{ type, ... }` objects.
    pub fn take_notifications(&mut self) -> Result<JsValue, JsValue> {
        let notifications = self.handle.drain();
        serde_wasm_bindgen::to_value(&notifications).map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}
