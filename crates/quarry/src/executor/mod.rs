//! Callback-driven evaluation of compiled programs.
//!
//! Chunks are resolved on demand. A handler that needs a value which is not
//! ready yet returns [`Step::Wait`]; the chunk subscribes to that dependency
//! and is re-driven by [`Executor::trigger_chain`] once the dependency is
//! stored. Nothing in here blocks: asynchronous work (predicate blocks)
//! reports back through callbacks that may arrive on any thread.

pub mod blocks;
pub mod builtins;
pub mod cache;
pub mod registry;
pub mod resource;

pub use blocks::{BlockCallback, BlockRunner, InlineBlockRunner, TokioBlockRunner};
pub use cache::{Cache, CacheEntry};
pub use registry::{Call, Handler, HandlerRegistry, Step, TypeFamily};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::{ExecError, ExecResult};
use crate::program::{ChunkKind, Primitive, Program, Ref, INPUT_REF};
use crate::runtime::Runtime;
use crate::types::TypeTag;
use crate::value::RawData;

/// Outcome of asking for a ref's value.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Ready(RawData),
    /// The value is not available yet; the named ref will be triggered when it is.
    Pending(Ref),
}

/// Unwrap a [`Resolved`] inside a handler, suspending on pending refs.
macro_rules! ready {
    ($resolved:expr) => {
        match $resolved {
            $crate::executor::Resolved::Ready(data) => data,
            $crate::executor::Resolved::Pending(dep) => {
                return Ok($crate::executor::Step::Wait(dep));
            }
        }
    };
}
pub(crate) use ready;

/// Everything an executor needs besides the program itself.
#[derive(Clone)]
pub struct Environment {
    pub runtime: Arc<dyn Runtime>,
    pub registry: Arc<HandlerRegistry>,
    pub blocks: Arc<dyn BlockRunner>,
}

impl Environment {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        registry: Arc<HandlerRegistry>,
        blocks: Arc<dyn BlockRunner>,
    ) -> Self {
        Self {
            runtime,
            registry,
            blocks,
        }
    }
}

type ResultCallback = Box<dyn Fn(Ref, RawData) + Send + Sync>;

/// Evaluates one program, memoizing every chunk result.
pub struct Executor {
    env: Environment,
    program: Arc<Program>,
    input: Option<RawData>,
    cache: Cache,
    on_result: OnceLock<ResultCallback>,
    /// Entrypoint refs already handed to `on_result`.
    reported: Mutex<HashSet<Ref>>,
}

impl Executor {
    /// Create an executor; `input` is the value ref 0 resolves to.
    pub fn new(env: Environment, program: Arc<Program>, input: Option<RawData>) -> Arc<Self> {
        let cache = Cache::new(program.len());
        Arc::new(Self {
            env,
            program,
            input,
            cache,
            on_result: OnceLock::new(),
            reported: Mutex::new(HashSet::new()),
        })
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn runtime(&self) -> &dyn Runtime {
        self.env.runtime.as_ref()
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Start evaluating every entrypoint. `on_result` is called exactly once
    /// per entrypoint ref, possibly from another thread and possibly after
    /// this returns.
    pub fn run<F>(self: &Arc<Self>, on_result: F)
    where
        F: Fn(Ref, RawData) + Send + Sync + 'static,
    {
        if self.on_result.set(Box::new(on_result)).is_err() {
            tracing::warn!("Executor was already started, ignoring second run");
            return;
        }

        for &r in &self.program.entrypoints {
            if r == INPUT_REF {
                let data = self.input.clone().unwrap_or_else(|| {
                    RawData::error(TypeTag::Nil, ExecError::MissingInput(r).to_string())
                });
                self.report(r, data);
                continue;
            }
            if let Some(entry) = self.cache.get(r) {
                self.report(r, entry.data.clone());
                continue;
            }
            self.drive(r);
        }
    }

    /// Run every entrypoint and hand over their values, in entrypoint
    /// order, once all of them are resolved.
    pub fn run_collect<F>(self: &Arc<Self>, done: F)
    where
        F: FnOnce(Vec<RawData>) + Send + 'static,
    {
        let collector = Arc::new(EntrypointCollector::new(
            self.program.entrypoints.clone(),
            Box::new(done),
        ));
        if collector.is_complete() {
            collector.finish();
            return;
        }
        self.run(move |r, data| collector.report(r, data));
    }

    /// Resolve `r`, running its handler if it has not been resolved yet.
    pub fn resolve_value(self: &Arc<Self>, r: Ref) -> ExecResult<Resolved> {
        if r == INPUT_REF {
            return self
                .input
                .clone()
                .map(Resolved::Ready)
                .ok_or(ExecError::MissingInput(r));
        }
        if let Some(entry) = self.cache.get(r) {
            tracing::trace!("Cache hit for chunk {r}");
            return Ok(Resolved::Ready(entry.data.clone()));
        }
        if self.program.chunk(r).is_none() {
            return Err(ExecError::UnknownChunk(r));
        }

        self.drive(r);
        Ok(match self.cache.get(r) {
            Some(entry) => Resolved::Ready(entry.data.clone()),
            None => Resolved::Pending(r),
        })
    }

    /// Resolve an operand.
    pub fn resolve_primitive(self: &Arc<Self>, primitive: &Primitive) -> ExecResult<Resolved> {
        match primitive {
            Primitive::Literal { typ, value } => {
                Ok(Resolved::Ready(RawData::new(typ.clone(), value.clone())))
            }
            Primitive::Ref { chunk, .. } => self.resolve_value(*chunk),
            Primitive::Function { program, .. } => Err(ExecError::Shape {
                chunk: 0,
                expected: "a value",
                actual: format!("function {program}"),
            }),
        }
    }

    /// Store the result of `r` and wake everything waiting on it.
    pub fn store(self: &Arc<Self>, r: Ref, data: RawData) {
        let is_static = matches!(
            self.program.chunk(r).map(|c| &c.kind),
            Some(ChunkKind::Value(Primitive::Literal { .. }))
        );
        if let Err(e) = self.cache.store(r, CacheEntry { data: data.clone(), is_static }) {
            tracing::error!("{e}");
            return;
        }
        if self.program.is_entrypoint(r) {
            self.report(r, data);
        }
        self.trigger_chain(r);
    }

    /// Re-drive every chunk subscribed to `r`.
    pub fn trigger_chain(self: &Arc<Self>, r: Ref) {
        let waiters = self.cache.take_waiters(r);
        if !waiters.is_empty() {
            tracing::debug!("Chunk {r} resolved, triggering {waiters:?}");
        }
        for waiter in waiters {
            self.drive(waiter);
        }
    }

    fn report(&self, r: Ref, data: RawData) {
        let Some(on_result) = self.on_result.get() else {
            return;
        };
        if !self.reported.lock().unwrap_or_else(PoisonError::into_inner).insert(r) {
            return;
        }
        on_result(r, data);
    }

    /// Run the handler of `r` until it completes, suspends or schedules work.
    fn drive(self: &Arc<Self>, r: Ref) {
        if !self.cache.begin(r) {
            return;
        }

        loop {
            let step = match self.execute(r) {
                Ok(step) => step,
                Err(e) => {
                    tracing::error!("Failed to execute chunk {r}: {e}");
                    let typ = self
                        .program
                        .chunk(r)
                        .map(|c| c.result_type())
                        .unwrap_or(TypeTag::Nil);
                    Step::Done(RawData::error(typ, e.to_string()))
                }
            };

            match step {
                Step::Done(data) => {
                    self.store(r, data);
                    return;
                }
                Step::Wait(dep) => {
                    tracing::trace!("Chunk {r} waits on {dep}");
                    if !self.cache.subscribe(dep, r) {
                        continue;
                    }
                    if self.cache.suspend(r) {
                        continue;
                    }
                    return;
                }
                Step::Scheduled => {
                    self.cache.mark_scheduled(r);
                    return;
                }
            }
        }
    }

    fn execute(self: &Arc<Self>, r: Ref) -> ExecResult<Step> {
        let chunk = self.program.chunk(r).ok_or(ExecError::UnknownChunk(r))?;
        let function = match &chunk.kind {
            ChunkKind::Value(primitive) => {
                return Ok(match self.resolve_primitive(primitive)? {
                    Resolved::Ready(data) => Step::Done(data),
                    Resolved::Pending(dep) => Step::Wait(dep),
                });
            }
            ChunkKind::Call(None) => return resource::create(self, chunk, None),
            ChunkKind::Call(Some(function)) => function,
        };

        let Some(binding) = function.binding else {
            return resource::create(self, chunk, Some(function));
        };
        let bound = ready!(self.resolve_value(binding)?);
        if let Some(msg) = bound.error_message() {
            return Ok(Step::Done(RawData::error(function.typ.clone(), msg)));
        }

        let handler = self
            .env
            .registry
            .lookup(&chunk.id, &bound.typ)
            .ok_or_else(|| ExecError::UnknownFunction {
                call: chunk.id.clone(),
                typ: bound.typ.label(),
            })?;
        tracing::debug!("Dispatching chunk {r}: {} on {}", chunk.id, bound.typ);

        let call = Call {
            chunk_ref: r,
            id: &chunk.id,
            function,
            bound,
        };
        handler(self, &call)
    }
}

/// Gathers entrypoint results and fires once every distinct ref reported.
struct EntrypointCollector {
    entrypoints: Vec<Ref>,
    results: Mutex<HashMap<Ref, RawData>>,
    remaining: AtomicUsize,
    done: Mutex<Option<Box<dyn FnOnce(Vec<RawData>) + Send>>>,
}

impl EntrypointCollector {
    fn new(entrypoints: Vec<Ref>, done: Box<dyn FnOnce(Vec<RawData>) + Send>) -> Self {
        let mut distinct = entrypoints.clone();
        distinct.sort_unstable();
        distinct.dedup();
        Self {
            entrypoints,
            results: Mutex::new(HashMap::new()),
            remaining: AtomicUsize::new(distinct.len()),
            done: Mutex::new(Some(done)),
        }
    }

    fn is_complete(&self) -> bool {
        self.remaining.load(Ordering::SeqCst) == 0
    }

    fn report(&self, r: Ref, data: RawData) {
        {
            let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
            if results.contains_key(&r) {
                return;
            }
            results.insert(r, data);
        }
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        let Some(done) = self.done.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };
        let values = {
            let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
            self.entrypoints
                .iter()
                .map(|r| results.get(r).cloned().unwrap_or_else(RawData::nil))
                .collect()
        };
        done(values);
    }
}

/// Evaluate `program` and wait for every entrypoint value, in entrypoint order.
pub async fn evaluate(env: Environment, program: Arc<Program>) -> ExecResult<Vec<RawData>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let executor = Executor::new(env, program, None);
    executor.run_collect(move |values| {
        let _ = tx.send(values);
    });
    drop(executor);
    rx.await.map_err(|_| ExecError::Incomplete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Chunk;
    use crate::runtime::MockRuntime;
    use crate::schema::{ResourceDef, Schema};

    fn runtime() -> Arc<MockRuntime> {
        let schema = Schema::new().with(
            ResourceDef::new("os")
                .field("name", TypeTag::String)
                .field("release", TypeTag::String),
        );
        let fixture = r#"{ "resources": { "os": { "name": "arch" } } }"#;
        Arc::new(MockRuntime::from_json(schema, fixture).unwrap())
    }

    fn env_with(registry: HandlerRegistry) -> Environment {
        Environment::new(runtime(), Arc::new(registry), Arc::new(InlineBlockRunner))
    }

    fn os_name_program() -> Arc<Program> {
        let mut program = Program::new();
        let os = program.add_chunk(Chunk::resource("os"));
        let name = program.add_chunk(Chunk::call("name", TypeTag::String, Some(os), vec![]));
        program.entrypoints.push(name);
        Arc::new(program)
    }

    #[test]
    fn test_resolved_handler_never_runs_twice() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = HandlerRegistry::builtin();
        registry.register("name", TypeFamily::Resource, move |exec, call| {
            counter.fetch_add(1, Ordering::SeqCst);
            resource::field(exec, call)
        });

        let exec = Executor::new(env_with(registry), os_name_program(), None);
        let first = exec.resolve_value(2).unwrap();
        let second = exec.resolve_value(2).unwrap();
        assert_eq!(first, Resolved::Ready(RawData::string("arch")));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_reports_each_entrypoint_once() {
        let exec = Executor::new(env_with(HandlerRegistry::builtin()), os_name_program(), None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        exec.run(move |r, data| sink.lock().unwrap().push((r, data)));
        exec.trigger_chain(2);
        assert_eq!(*seen.lock().unwrap(), vec![(2, RawData::string("arch"))]);
    }

    #[test]
    fn test_run_reports_entrypoints_resolved_beforehand() {
        let exec = Executor::new(env_with(HandlerRegistry::builtin()), os_name_program(), None);
        exec.resolve_value(2).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        exec.run_collect(move |values| sink.lock().unwrap().push(values));
        assert_eq!(*seen.lock().unwrap(), vec![vec![RawData::string("arch")]]);
    }

    #[test]
    fn test_runtime_errors_become_error_data() {
        let mut program = Program::new();
        let os = program.add_chunk(Chunk::resource("os"));
        let release = program.add_chunk(Chunk::call("release", TypeTag::String, Some(os), vec![]));
        let upper = program.add_chunk(Chunk::call("upcase", TypeTag::String, Some(release), vec![]));
        program.entrypoints.push(upper);

        let exec = Executor::new(env_with(HandlerRegistry::builtin()), Arc::new(program), None);
        let Resolved::Ready(data) = exec.resolve_value(upper).unwrap() else {
            panic!("expected a ready value");
        };
        assert_eq!(data.typ, TypeTag::String);
        assert_eq!(data.error_message(), Some("field 'release' of resource 'os' is not set"));
    }

    #[test]
    fn test_second_store_is_rejected() {
        let exec = Executor::new(env_with(HandlerRegistry::builtin()), os_name_program(), None);
        exec.resolve_value(2).unwrap();
        exec.store(2, RawData::string("other"));
        assert_eq!(exec.cache().get(2).unwrap().data, RawData::string("arch"));
    }

    #[test]
    fn test_unknown_handler_is_error_data() {
        let mut program = Program::new();
        let lit = program.add_chunk(Chunk::value(Primitive::literal(RawData::int(3))));
        let bad = program.add_chunk(Chunk::call("upcase", TypeTag::String, Some(lit), vec![]));
        program.entrypoints.push(bad);

        let exec = Executor::new(env_with(HandlerRegistry::builtin()), Arc::new(program), None);
        let Resolved::Ready(data) = exec.resolve_value(bad).unwrap() else {
            panic!("expected a ready value");
        };
        assert_eq!(data.error_message(), Some("cannot find handler for 'upcase' on int"));
        assert!(exec.cache().get(lit).unwrap().is_static);
    }

    #[tokio::test]
    async fn test_evaluate_collects_in_order() {
        let mut program = Program::new();
        let os = program.add_chunk(Chunk::resource("os"));
        let name = program.add_chunk(Chunk::call("name", TypeTag::String, Some(os), vec![]));
        let truth = program.add_chunk(Chunk::value(Primitive::literal(RawData::bool(true))));
        program.entrypoints = vec![truth, name];

        let values = evaluate(env_with(HandlerRegistry::builtin()), Arc::new(program))
            .await
            .unwrap();
        assert_eq!(values, vec![RawData::bool(true), RawData::string("arch")]);
    }

    #[tokio::test]
    async fn test_evaluate_empty_program() {
        let values = evaluate(env_with(HandlerRegistry::builtin()), Arc::new(Program::new()))
            .await
            .unwrap();
        assert!(values.is_empty());
    }
}
