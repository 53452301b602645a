//! Debug engine
//!
//! Routes every debugger call through a [`CommandSerializer`], so the
//! engine's debug API is only ever touched by one worker thread with the
//! context entered. Each operation returns a [`PendingResult`], except the
//! fire-and-forget async break request.
//!
//! The worker enters the context like any other thread: a command that runs
//! while a host thread holds the context fails with `ContextBusy`.

use std::sync::Arc;

use parking_lot::Mutex;
use tether_sdk::{
    Breakpoint, DebugService, EngineError, EngineResult, SourceCode, StackFrame, StackProperties,
    StepType, Variable, VariableProperties,
};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::debug::queue::{CommandSerializer, PendingResult, SerializerState};
use crate::error::BridgeResult;

/// Highest property index fetched by `object_properties_default`
pub const DEFAULT_PROPERTY_RANGE_END: u32 = 99;

/// Options for starting a DebugEngine
#[derive(Debug, Clone)]
pub struct DebugEngineOptions {
    /// Name of the worker thread
    pub worker_name: String,

    /// Maximum number of queued commands (None = unbounded)
    pub queue_bound: Option<usize>,
}

impl Default for DebugEngineOptions {
    fn default() -> Self {
        Self {
            worker_name: "tether-debug".to_string(),
            queue_bound: None,
        }
    }
}

/// Serialized front end to an engine's [`DebugService`].
pub struct DebugEngine {
    serializer: CommandSerializer,
    service: Arc<dyn DebugService>,
    step_type: Arc<Mutex<StepType>>,
}

impl DebugEngine {
    /// Start a debug engine with default options
    pub fn start(
        context: Arc<ExecutionContext>,
        service: Arc<dyn DebugService>,
    ) -> BridgeResult<Self> {
        Self::with_options(context, service, DebugEngineOptions::default())
    }

    /// Start a debug engine with options
    pub fn with_options(
        context: Arc<ExecutionContext>,
        service: Arc<dyn DebugService>,
        options: DebugEngineOptions,
    ) -> BridgeResult<Self> {
        let serializer =
            CommandSerializer::start(context, &options.worker_name, options.queue_bound)?;
        Ok(Self {
            serializer,
            service,
            step_type: Arc::new(Mutex::new(StepType::default())),
        })
    }

    /// Queue a call against the debug service
    fn call<T, F>(&self, f: F) -> BridgeResult<PendingResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DebugService) -> EngineResult<T> + Send + 'static,
    {
        let service = Arc::clone(&self.service);
        self.serializer.submit(move |_| Ok(f(&*service)?))
    }

    /// Set a breakpoint
    pub fn set_breakpoint(
        &self,
        script_id: u32,
        line: u32,
        column: u32,
    ) -> BridgeResult<PendingResult<Breakpoint>> {
        self.call(move |service| service.set_breakpoint(script_id, line, column))
    }

    /// Remove a breakpoint
    pub fn remove_breakpoint(&self, breakpoint_id: u32) -> BridgeResult<PendingResult<()>> {
        self.call(move |service| service.remove_breakpoint(breakpoint_id))
    }

    /// Ask the engine to break as soon as possible.
    ///
    /// Fire-and-forget: queued in order with everything else, but nobody
    /// waits on it. A failure is logged.
    pub fn request_async_break(&self) -> BridgeResult<()> {
        let service = Arc::clone(&self.service);
        self.serializer
            .submit_detached("request_async_break", move |_| Ok(service.request_async_break()?))
    }

    /// List loaded scripts
    pub fn scripts(&self) -> BridgeResult<PendingResult<Vec<SourceCode>>> {
        self.call(|service| service.scripts())
    }

    /// List breakpoints
    pub fn breakpoints(&self) -> BridgeResult<PendingResult<Vec<Breakpoint>>> {
        self.call(|service| service.breakpoints())
    }

    /// Current call stack
    pub fn stack_trace(&self) -> BridgeResult<PendingResult<Vec<StackFrame>>> {
        self.call(|service| service.stack_trace())
    }

    /// Variables of a stack frame
    pub fn stack_properties(
        &self,
        frame_index: u32,
    ) -> BridgeResult<PendingResult<StackProperties>> {
        self.call(move |service| service.stack_properties(frame_index))
    }

    /// Remove every breakpoint of a script, returning how many were removed.
    ///
    /// Runs as one command, so no other debug command interleaves between
    /// listing and removal.
    pub fn clear_breakpoints_for_script(
        &self,
        script_id: u32,
    ) -> BridgeResult<PendingResult<usize>> {
        self.call(move |service| {
            let doomed: Vec<u32> = service
                .breakpoints()?
                .into_iter()
                .filter(|bp| bp.script_id == script_id)
                .map(|bp| bp.breakpoint_id)
                .collect();
            for id in &doomed {
                service.remove_breakpoint(*id)?;
            }
            debug!(script_id, removed = doomed.len(), "cleared script breakpoints");
            Ok(doomed.len())
        })
    }

    /// Fetch a script with its source
    pub fn script_source(&self, script_id: u32) -> BridgeResult<PendingResult<SourceCode>> {
        self.call(move |service| service.script_source(script_id))
    }

    /// Resolve a debugger handle
    pub fn object_from_handle(&self, handle: u32) -> BridgeResult<PendingResult<Variable>> {
        self.call(move |service| service.object_from_handle(handle))
    }

    /// Properties of an object with index in `from..=to`
    pub fn object_properties(
        &self,
        handle: u32,
        from: u32,
        to: u32,
    ) -> BridgeResult<PendingResult<VariableProperties>> {
        self.call(move |service| service.properties(handle, from, to))
    }

    /// Properties of an object with index in `0..=99`
    pub fn object_properties_default(
        &self,
        handle: u32,
    ) -> BridgeResult<PendingResult<VariableProperties>> {
        self.object_properties(handle, 0, DEFAULT_PROPERTY_RANGE_END)
    }

    /// Evaluate `expression` in a stack frame; yields the result as JSON text
    pub fn evaluate(
        &self,
        expression: &str,
        frame_index: u32,
        force_set_value_prop: bool,
    ) -> BridgeResult<PendingResult<String>> {
        let expression = expression.to_string();
        self.call(move |service| {
            let result = service.evaluate(&expression, frame_index, force_set_value_prop)?;
            serde_json::to_string(&result).map_err(|err| EngineError::Operation(err.to_string()))
        })
    }

    /// Step type last applied by the engine
    pub fn step_type(&self) -> StepType {
        *self.step_type.lock()
    }

    /// Change the step type; takes effect once the command has run
    pub fn set_step_type(&self, step: StepType) -> BridgeResult<PendingResult<()>> {
        let current = Arc::clone(&self.step_type);
        self.call(move |service| {
            service.set_step_type(step)?;
            *current.lock() = step;
            Ok(())
        })
    }

    /// Lifecycle state of the worker
    pub fn state(&self) -> SerializerState {
        self.serializer.state()
    }

    /// Context the worker enters
    pub fn context(&self) -> &Arc<ExecutionContext> {
        self.serializer.context()
    }

    /// Stop accepting commands, finish the queued ones and stop the worker
    pub fn shutdown(&self) {
        self.serializer.shutdown();
    }
}

impl std::fmt::Debug for DebugEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugEngine")
            .field("serializer", &self.serializer)
            .field("step_type", &self.step_type())
            .finish()
    }
}
