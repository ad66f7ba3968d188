//! Evaluation of nested predicate blocks.

use std::sync::Arc;

use crate::program::Program;
use crate::value::RawData;

use super::{Environment, Executor};

/// Receives the result of one block evaluation.
pub type BlockCallback = Box<dyn FnOnce(RawData) + Send>;

/// Schedules predicate block evaluations.
///
/// `on_complete` must be invoked exactly once per scheduled block. No
/// ordering between blocks is promised.
pub trait BlockRunner: Send + Sync {
    fn run_block(
        &self,
        env: Environment,
        input: RawData,
        program: Arc<Program>,
        on_complete: BlockCallback,
    );
}

/// Evaluate `program` against `input` and hand its result to `on_complete`.
///
/// A block with one entrypoint yields that entrypoint's value; otherwise it
/// yields whether every entrypoint is truthy.
pub fn evaluate_block(env: Environment, input: RawData, program: Arc<Program>, on_complete: BlockCallback) {
    let executor = Executor::new(env, program, Some(input));
    executor.run_collect(move |mut values| {
        let result = if values.len() == 1 {
            values.remove(0)
        } else {
            RawData::bool(values.iter().all(RawData::is_truthy))
        };
        on_complete(result);
    });
}

/// Evaluates blocks synchronously on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineBlockRunner;

impl BlockRunner for InlineBlockRunner {
    fn run_block(
        &self,
        env: Environment,
        input: RawData,
        program: Arc<Program>,
        on_complete: BlockCallback,
    ) {
        evaluate_block(env, input, program, on_complete);
    }
}

/// Evaluates each block as a blocking task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioBlockRunner {
    handle: tokio::runtime::Handle,
}

impl TokioBlockRunner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Runner on the runtime of the calling task, if there is one.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl BlockRunner for TokioBlockRunner {
    fn run_block(
        &self,
        env: Environment,
        input: RawData,
        program: Arc<Program>,
        on_complete: BlockCallback,
    ) {
        self.handle.spawn_blocking(move || {
            evaluate_block(env, input, program, on_complete);
        });
    }
}
