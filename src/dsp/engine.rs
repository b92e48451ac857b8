//! Audio Engine — runs a compiled formula inside the host's audio callback.
//!
//! The engine owns the playback clock, the sample encoder, the level meter
//! and the two program slots. Commands from the control context arrive over
//! an SPSC ring and are applied at the start of the next block; notifications
//! go back over a second ring. Nothing here blocks or locks.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::command::{Command, EngineHandle, Notification};
use crate::compiler::compile;
use crate::config::EngineConfig;
use crate::error::RuntimeError;
use crate::program::{Program, Scope};

use super::clock::{PlaybackClock, rate_ratio};
use super::encoder::EncodingMode;
use super::meter::LevelMeter;
use super::supervisor::{Health, ProgramSlots};

pub struct Engine {
    native_rate: f64,
    target_rate: f64,
    mode: EncodingMode,
    clock: PlaybackClock,
    slots: ProgramSlots,
    silence: Arc<Program>,
    scope: Scope,
    /// Raw `(left, right)` values held between evaluations.
    held: (f64, f64),
    meter: LevelMeter,
    commands: Consumer<Command>,
    notifications: Producer<Notification>,
}

impl Engine {
    /// Create an engine and the handle the control context drives it with.
    pub fn new(config: EngineConfig) -> (Engine, EngineHandle) {
        let config = config.validated();
        let (command_tx, command_rx) = RingBuffer::new(config.command_capacity);
        let (notification_tx, notification_rx) = RingBuffer::new(config.notification_capacity);

        let silence = Arc::new(Program::silence());
        let engine = Engine {
            native_rate: config.native_rate,
            target_rate: config.target_rate,
            mode: EncodingMode::default(),
            clock: PlaybackClock::new(),
            slots: ProgramSlots::new(Arc::clone(&silence)),
            silence,
            scope: Scope::new(),
            held: (0.0, 0.0),
            meter: LevelMeter::new(config.level_window),
            commands: command_rx,
            notifications: notification_tx,
        };
        (engine, EngineHandle::new(command_tx, notification_rx))
    }

    pub fn native_rate(&self) -> f64 {
        self.native_rate
    }

    pub fn target_rate(&self) -> f64 {
        self.target_rate
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn health(&self) -> Health {
        self.slots.health()
    }

    /// The formula the next block will run.
    pub fn active_source(&self) -> &str {
        self.slots.active().source()
    }

    /// Apply a command immediately. `process` calls this for everything
    /// queued on the command ring.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetExpression {
                expression,
                sample_rate,
                mode,
            } => self.set_expression(&expression, sample_rate, mode),
            Command::Reset => self.reset(),
        }
    }

    fn set_expression(&mut self, expression: &str, sample_rate: Option<f64>, mode: Option<EncodingMode>) {
        // SR must see the new rate even if compilation fails
        if let Some(rate) = sample_rate.filter(|r| r.is_finite() && *r > 0.0) {
            self.target_rate = rate;
        }

        match compile(expression, self.target_rate) {
            Ok(program) => self.load(program, mode.unwrap_or_default()),
            Err(err) => {
                self.slots.compile_failed();
                warn!("Compile error: {}", err);
                self.notify(Notification::CompileError {
                    message: err.to_string(),
                });
            }
        }
    }

    /// Switch to an already compiled program: its `SR` becomes the target
    /// rate, playback restarts from the current time at phase zero, and the
    /// level window starts over.
    pub fn load(&mut self, program: Program, mode: EncodingMode) {
        self.target_rate = program.sample_rate();
        let chars = program.source().len();
        self.slots.install(Arc::new(program));
        self.clock.reset_phase();
        self.mode = mode;
        if let Some(rms) = self.meter.flush() {
            self.notify(Notification::Level { rms });
        }
        self.meter.clear();
        debug!(
            "Accepted expression ({} chars) at {} Hz, mode {}",
            chars,
            self.target_rate,
            self.mode.as_str()
        );
    }

    fn reset(&mut self) {
        self.clock.reset();
        self.held = (0.0, 0.0);
        self.slots.reset(Arc::clone(&self.silence));
        self.scope.clear();
        debug!("Engine reset");
    }

    /// Fill one block. `right` is `None` for a mono host; otherwise it must
    /// be as long as `left`.
    pub fn process(&mut self, left: &mut [f32], mut right: Option<&mut [f32]>) {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }

        let program = Arc::clone(self.slots.active());
        match self.render(&program, left, right.as_deref_mut()) {
            Ok(()) => self.slots.commit(),
            Err(err) => {
                left.fill(0.0);
                if let Some(right) = right {
                    right.fill(0.0);
                }
                warn!("Runtime error: {}", err);
                self.notify(Notification::RuntimeError {
                    message: err.to_string(),
                });
                self.slots.rollback();
            }
        }

        for &sample in left.iter() {
            if let Some(rms) = self.meter.push(sample) {
                self.notify(Notification::Level { rms });
            }
        }
    }

    /// Run the clock across the block: write the held frame, then advance
    /// and re-evaluate on every phase crossing.
    fn render(
        &mut self,
        program: &Program,
        left: &mut [f32],
        mut right: Option<&mut [f32]>,
    ) -> Result<(), RuntimeError> {
        if self.clock.at_origin() {
            self.held = program
                .frame(0, &mut self.scope)
                .map_err(|cause| RuntimeError { time: 0, cause })?;
        }

        let ratio = rate_ratio(self.target_rate, self.native_rate);
        for (i, out) in left.iter_mut().enumerate() {
            let (l, r) = self.mode.encode_frame(self.held);
            *out = l;
            if let Some(sample) = right.as_deref_mut().and_then(|ch| ch.get_mut(i)) {
                *sample = r;
            }

            if let Some(time) = self.clock.tick(ratio) {
                self.held = program
                    .frame(time, &mut self.scope)
                    .map_err(|cause| RuntimeError { time, cause })?;
            }
        }
        Ok(())
    }

    fn notify(&mut self, notification: Notification) {
        // A full ring drops the notification; the audio thread never waits
        let _ = self.notifications.push(notification);
    }
}
