//! Step-count instrumentation.
//!
//! A pure observer on the execution backend: it counts instructions and
//! records nothing that could influence control flow. One counter value is
//! owned by one transaction execution; nothing is process-global.

use revm::{
    bytecode::opcode::OpCode,
    context::{
        result::{ExecutionResult, HaltReason},
        ContextTr,
    },
    inspector::Inspector,
    interpreter::{
        interpreter::EthInterpreter, interpreter_types::Jumps, CallInputs, CallOutcome,
        CreateInputs, CreateOutcome, Interpreter,
    },
};
use tracing::trace;

use crate::{ExecOutcome, ExecutionTrace};

/// Counts executed instructions globally and per call frame.
#[derive(Debug, Default)]
pub struct StepCounter {
    global: u64,
    calls: Vec<u64>,
    frames: Vec<usize>,
}

impl StepCounter {
    /// Creates a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes all counters. Counters are never shared between executions.
    pub fn reset(&mut self) {
        self.global = 0;
        self.calls.clear();
        self.frames.clear();
    }

    /// Total instructions executed so far.
    pub fn global_steps(&self) -> u64 {
        self.global
    }

    /// Instructions executed per call frame, in frame-entry order.
    pub fn call_steps(&self) -> &[u64] {
        &self.calls
    }

    /// Folds the counters and the backend result into an [`ExecutionTrace`].
    pub fn into_trace(self, result: &ExecutionResult<HaltReason>) -> ExecutionTrace {
        ExecutionTrace {
            global_steps: self.global,
            call_steps: self.calls,
            outcome: ExecOutcome::from_result(result),
            gas_used: result.gas_used(),
        }
    }

    fn enter_frame(&mut self) {
        self.calls.push(0);
        self.frames.push(self.calls.len() - 1);
    }

    fn exit_frame(&mut self) {
        self.frames.pop();
    }
}

impl<CTX: ContextTr> Inspector<CTX> for StepCounter {
    fn step(&mut self, interp: &mut Interpreter<EthInterpreter>, _context: &mut CTX) {
        self.global += 1;
        if let Some(&frame) = self.frames.last() {
            self.calls[frame] += 1;
        }
        trace!(
            step = self.global,
            pc = interp.bytecode.pc(),
            opcode = ?OpCode::new(interp.bytecode.opcode()),
            "step"
        );
    }

    fn call(&mut self, _context: &mut CTX, _inputs: &mut CallInputs) -> Option<CallOutcome> {
        self.enter_frame();
        None
    }

    fn call_end(&mut self, _context: &mut CTX, _inputs: &CallInputs, _outcome: &mut CallOutcome) {
        self.exit_frame();
    }

    fn create(&mut self, _context: &mut CTX, _inputs: &mut CreateInputs) -> Option<CreateOutcome> {
        self.enter_frame();
        None
    }

    fn create_end(
        &mut self,
        _context: &mut CTX,
        _inputs: &CreateInputs,
        _outcome: &mut CreateOutcome,
    ) {
        self.exit_frame();
    }
}
