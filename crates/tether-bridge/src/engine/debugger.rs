//! In-process debugger for `MemoryEngine`
//!
//! Models the paused state of a script: loaded scripts, breakpoints, a call
//! stack whose frames hold local variables, and a handle table for
//! expanding objects. Variable values are JSON values. The host builds the
//! state with `add_script` and `push_frame`; every `DebugService` call
//! requires the engine context to be current, as it would on a real engine.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use tether_sdk::{
    Breakpoint, DebugService, EngineError, EngineResult, SourceCode, StackFrame, StackProperties,
    StepType, Variable, VariableProperties,
};

use super::memory::MemoryEngine;

/// Property attribute bit: the value has children to expand
pub const ATTRIBUTE_HAVE_CHILDREN: u32 = 0x1;

struct Script {
    file_name: Option<String>,
    source: String,
}

impl Script {
    fn describe(&self, script_id: u32, with_source: bool) -> SourceCode {
        SourceCode {
            script_id,
            file_name: self.file_name.clone(),
            line_count: self.source.lines().count() as u32,
            source_length: self.source.chars().count() as u32,
            source: with_source.then(|| self.source.clone()),
        }
    }
}

struct Frame {
    frame: StackFrame,
    locals: Vec<(Variable, Json)>,
}

struct HandleEntry {
    variable: Variable,
    children: Vec<Variable>,
}

struct DebuggerState {
    scripts: BTreeMap<u32, Script>,
    breakpoints: BTreeMap<u32, Breakpoint>,
    frames: Vec<Frame>,
    handles: FxHashMap<u32, HandleEntry>,
    step_type: StepType,
    next_script: u32,
    next_breakpoint: u32,
    next_handle: u32,
}

impl DebuggerState {
    fn new() -> Self {
        Self {
            scripts: BTreeMap::new(),
            breakpoints: BTreeMap::new(),
            frames: Vec::new(),
            handles: FxHashMap::default(),
            step_type: StepType::default(),
            next_script: 1,
            next_breakpoint: 1,
            next_handle: 1,
        }
    }

    /// Describe `value` as a debugger variable, registering handles for it
    /// and everything it contains
    fn define(&mut self, name: &str, value: &Json) -> Variable {
        let handle = self.next_handle;
        self.next_handle += 1;

        let children: Vec<Variable> = match value {
            Json::Object(map) => map.iter().map(|(key, child)| self.define(key, child)).collect(),
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, child)| self.define(&index.to_string(), child))
                .collect(),
            _ => Vec::new(),
        };

        let (type_name, class_name, display) = match value {
            Json::Null => ("null", None, "null".to_string()),
            Json::Bool(b) => ("boolean", None, b.to_string()),
            Json::Number(n) => ("number", None, n.to_string()),
            Json::String(s) => ("string", None, s.clone()),
            Json::Array(items) => ("object", Some("Array"), format!("Array({})", items.len())),
            Json::Object(_) => ("object", Some("Object"), "{...}".to_string()),
        };
        let variable = Variable {
            name: name.to_string(),
            type_name: type_name.to_string(),
            class_name: class_name.map(str::to_string),
            display: Some(display),
            handle,
            property_attributes: if children.is_empty() {
                0
            } else {
                ATTRIBUTE_HAVE_CHILDREN
            },
        };
        self.handles.insert(
            handle,
            HandleEntry {
                variable: variable.clone(),
                children,
            },
        );
        variable
    }

    fn frame(&self, frame_index: u32) -> EngineResult<&Frame> {
        self.frames
            .get(frame_index as usize)
            .ok_or_else(|| EngineError::Operation(format!("no stack frame {}", frame_index)))
    }
}

/// Debugger attached to a [`MemoryEngine`].
pub struct MemoryDebugger {
    engine: Arc<MemoryEngine>,
    state: Mutex<DebuggerState>,
    async_breaks: AtomicU64,
}

impl MemoryDebugger {
    /// Attach a debugger to `engine`
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(DebuggerState::new()),
            async_breaks: AtomicU64::new(0),
        }
    }

    /// Load a script, returning its ID
    pub fn add_script(&self, file_name: Option<&str>, source: &str) -> u32 {
        let mut state = self.state.lock();
        let script_id = state.next_script;
        state.next_script += 1;
        state.scripts.insert(
            script_id,
            Script {
                file_name: file_name.map(str::to_string),
                source: source.to_string(),
            },
        );
        script_id
    }

    /// Push a frame executing `script_id` at `line`/`column` with the given
    /// locals. Returns the frame's index; the most recent frame is index 0.
    pub fn push_frame(
        &self,
        script_id: u32,
        line: u32,
        column: u32,
        locals: Vec<(&str, Json)>,
    ) -> EngineResult<u32> {
        let mut state = self.state.lock();
        let source_text = state
            .scripts
            .get(&script_id)
            .ok_or_else(|| EngineError::Operation(format!("unknown script {}", script_id)))?
            .source
            .lines()
            .nth(line as usize)
            .unwrap_or_default()
            .to_string();

        let function_handle = state.define("function", &Json::Null).handle;
        let locals = locals
            .into_iter()
            .map(|(name, value)| (state.define(name, &value), value))
            .collect();

        let frame = StackFrame {
            index: 0,
            script_id,
            line,
            column,
            source_length: source_text.chars().count() as u32,
            source_text,
            function_handle,
        };
        state.frames.insert(0, Frame { frame, locals });
        for (index, frame) in state.frames.iter_mut().enumerate() {
            frame.frame.index = index as u32;
        }
        Ok(0)
    }

    /// Drop every frame, as when execution resumes.
    ///
    /// Handles only live while the program is paused, so they go too.
    pub fn clear_frames(&self) {
        let mut state = self.state.lock();
        state.frames.clear();
        state.handles.clear();
    }

    /// Number of object handles currently resolvable
    pub fn live_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Number of `request_async_break` calls received
    pub fn async_break_requests(&self) -> u64 {
        self.async_breaks.load(Ordering::SeqCst)
    }

    /// Step type last set through `set_step_type`
    pub fn current_step_type(&self) -> StepType {
        self.state.lock().step_type
    }
}

impl std::fmt::Debug for MemoryDebugger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDebugger")
            .field("scripts", &state.scripts.len())
            .field("breakpoints", &state.breakpoints.len())
            .field("frames", &state.frames.len())
            .finish()
    }
}

/// Resolve a dotted path (`a.b.0`) against a JSON value
fn lookup_path<'a>(root: &'a Json, path: &[&str]) -> Option<&'a Json> {
    path.iter().try_fold(root, |value, key| match value {
        Json::Object(map) => map.get(*key),
        Json::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

impl DebugService for MemoryDebugger {
    fn set_breakpoint(&self, script_id: u32, line: u32, column: u32) -> EngineResult<Breakpoint> {
        self.engine.ensure_current()?;
        let mut state = self.state.lock();
        let script = state
            .scripts
            .get(&script_id)
            .ok_or_else(|| EngineError::Operation(format!("unknown script {}", script_id)))?;
        if line as usize >= script.source.lines().count() {
            return Err(EngineError::Operation(format!(
                "line {} is outside script {}",
                line, script_id
            )));
        }

        let breakpoint = Breakpoint {
            breakpoint_id: state.next_breakpoint,
            script_id,
            line,
            column,
        };
        state.next_breakpoint += 1;
        state.breakpoints.insert(breakpoint.breakpoint_id, breakpoint.clone());
        Ok(breakpoint)
    }

    fn remove_breakpoint(&self, breakpoint_id: u32) -> EngineResult<()> {
        self.engine.ensure_current()?;
        self.state
            .lock()
            .breakpoints
            .remove(&breakpoint_id)
            .map(|_| ())
            .ok_or_else(|| EngineError::Operation(format!("unknown breakpoint {}", breakpoint_id)))
    }

    fn request_async_break(&self) -> EngineResult<()> {
        self.engine.ensure_current()?;
        self.async_breaks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_step_type(&self, step: StepType) -> EngineResult<()> {
        self.engine.ensure_current()?;
        self.state.lock().step_type = step;
        Ok(())
    }

    fn scripts(&self) -> EngineResult<Vec<SourceCode>> {
        self.engine.ensure_current()?;
        let state = self.state.lock();
        Ok(state
            .scripts
            .iter()
            .map(|(id, script)| script.describe(*id, false))
            .collect())
    }

    fn breakpoints(&self) -> EngineResult<Vec<Breakpoint>> {
        self.engine.ensure_current()?;
        Ok(self.state.lock().breakpoints.values().cloned().collect())
    }

    fn stack_trace(&self) -> EngineResult<Vec<StackFrame>> {
        self.engine.ensure_current()?;
        Ok(self
            .state
            .lock()
            .frames
            .iter()
            .map(|frame| frame.frame.clone())
            .collect())
    }

    fn stack_properties(&self, frame_index: u32) -> EngineResult<StackProperties> {
        self.engine.ensure_current()?;
        let state = self.state.lock();
        let frame = state.frame(frame_index)?;
        Ok(StackProperties {
            locals: frame.locals.iter().map(|(variable, _)| variable.clone()).collect(),
            ..StackProperties::default()
        })
    }

    fn script_source(&self, script_id: u32) -> EngineResult<SourceCode> {
        self.engine.ensure_current()?;
        let state = self.state.lock();
        state
            .scripts
            .get(&script_id)
            .map(|script| script.describe(script_id, true))
            .ok_or_else(|| EngineError::Operation(format!("unknown script {}", script_id)))
    }

    fn object_from_handle(&self, handle: u32) -> EngineResult<Variable> {
        self.engine.ensure_current()?;
        self.state
            .lock()
            .handles
            .get(&handle)
            .map(|entry| entry.variable.clone())
            .ok_or_else(|| EngineError::Operation(format!("unknown handle {}", handle)))
    }

    fn properties(&self, handle: u32, from: u32, to: u32) -> EngineResult<VariableProperties> {
        self.engine.ensure_current()?;
        let state = self.state.lock();
        let entry = state
            .handles
            .get(&handle)
            .ok_or_else(|| EngineError::Operation(format!("unknown handle {}", handle)))?;
        let count = if to < from { 0 } else { (to - from) as usize + 1 };
        Ok(VariableProperties {
            properties: entry
                .children
                .iter()
                .skip(from as usize)
                .take(count)
                .cloned()
                .collect(),
            debugger_only_properties: Vec::new(),
        })
    }

    fn evaluate(
        &self,
        expression: &str,
        frame_index: u32,
        force_set_value_prop: bool,
    ) -> EngineResult<Json> {
        self.engine.ensure_current()?;
        let state = self.state.lock();
        let frame = state.frame(frame_index)?;

        let path: Vec<&str> = expression.trim().split('.').collect();
        let (variable, root) = frame
            .locals
            .iter()
            .find(|(variable, _)| variable.name == path[0])
            .ok_or_else(|| EngineError::Script {
                message: format!("'{}' is not defined", path[0]),
            })?;
        let value = lookup_path(root, &path[1..]).ok_or_else(|| EngineError::Script {
            message: format!("cannot evaluate '{}'", expression),
        })?;

        let variable = if path.len() == 1 {
            variable.clone()
        } else {
            // nested results are described like the engine does for new temporaries
            let handle = lookup_handle(&state, variable.handle, &path[1..]).unwrap_or(0);
            let mut nested = state
                .handles
                .get(&handle)
                .map(|entry| entry.variable.clone())
                .ok_or_else(|| EngineError::Operation(format!("unknown handle {}", handle)))?;
            nested.name = expression.to_string();
            nested
        };

        let mut result = serde_json::to_value(&variable)
            .map_err(|err| EngineError::Operation(err.to_string()))?;
        let primitive = !matches!(value, Json::Object(_) | Json::Array(_));
        if primitive || force_set_value_prop {
            if let Json::Object(map) = &mut result {
                map.insert("value".to_string(), value.clone());
            }
        }
        Ok(result)
    }
}

/// Follow child names from `handle` down the handle table
fn lookup_handle(state: &DebuggerState, handle: u32, path: &[&str]) -> Option<u32> {
    path.iter().try_fold(handle, |handle, key| {
        state
            .handles
            .get(&handle)?
            .children
            .iter()
            .find(|child| child.name == *key)
            .map(|child| child.handle)
    })
}
