//! Fault isolation — the two-slot program register.
//!
//! `active` is what the next block runs. `last_good` is the most recent
//! program that got through a whole block without failing; a failed block
//! rolls `active` back to it.

use std::sync::Arc;

use crate::program::Program;

/// Where the engine stands after its last compile or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// The active program ran (or is ready to run) cleanly.
    Active,
    /// The last formula failed to compile; the previous program plays on.
    CompileFailed,
    /// The last block failed; the next block runs the last-good program.
    RuntimeFailed,
}

#[derive(Debug, Clone)]
pub struct ProgramSlots {
    active: Arc<Program>,
    last_good: Arc<Program>,
    health: Health,
}

impl ProgramSlots {
    pub fn new(initial: Arc<Program>) -> Self {
        ProgramSlots {
            last_good: Arc::clone(&initial),
            active: initial,
            health: Health::Active,
        }
    }

    pub fn active(&self) -> &Arc<Program> {
        &self.active
    }

    pub fn last_good(&self) -> &Arc<Program> {
        &self.last_good
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// A freshly compiled program takes over. Last-good is untouched until
    /// it survives a block.
    pub fn install(&mut self, program: Arc<Program>) {
        self.active = program;
        self.health = Health::Active;
    }

    /// Compilation failed; keep playing whatever is active.
    pub fn compile_failed(&mut self) {
        self.health = Health::CompileFailed;
    }

    /// A block finished cleanly: the program that ran it is now last-good.
    pub fn commit(&mut self) {
        self.last_good = Arc::clone(&self.active);
        self.health = Health::Active;
    }

    /// A block failed: the next one runs the last-good program.
    pub fn rollback(&mut self) {
        self.active = Arc::clone(&self.last_good);
        self.health = Health::RuntimeFailed;
    }

    /// Put both slots back to `program`.
    pub fn reset(&mut self, program: Arc<Program>) {
        *self = ProgramSlots::new(program);
    }
}
