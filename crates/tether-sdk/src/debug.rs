//! DebugService trait and debugger value records
//!
//! Records are plain values copied out of the engine on every call. Field
//! names serialize in camelCase to match the engine's debugger protocol.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// A breakpoint set in a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Breakpoint ID assigned by the engine
    pub breakpoint_id: u32,
    /// Script the breakpoint belongs to
    pub script_id: u32,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column
    pub column: u32,
}

/// A script known to the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCode {
    /// Script ID
    pub script_id: u32,
    /// File name the script was loaded from, if any
    #[serde(default)]
    pub file_name: Option<String>,
    /// Number of lines in the script
    pub line_count: u32,
    /// Length of the source in characters
    pub source_length: u32,
    /// Source text (present when fetched with `script_source`)
    #[serde(default)]
    pub source: Option<String>,
}

/// One frame of the current call stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Frame index, 0 is the innermost frame
    pub index: u32,
    /// Script the frame is executing
    pub script_id: u32,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column
    pub column: u32,
    /// Length of the current statement
    pub source_length: u32,
    /// Source text of the current statement
    #[serde(default)]
    pub source_text: String,
    /// Debugger handle of the executing function
    pub function_handle: u32,
}

/// A variable or property as seen by the debugger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable or property name
    pub name: String,
    /// Engine type name (`number`, `object`, ...)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Class name for objects
    #[serde(default)]
    pub class_name: Option<String>,
    /// Display string of the value
    #[serde(default)]
    pub display: Option<String>,
    /// Debugger handle used to expand the value
    pub handle: u32,
    /// Property attribute bits
    #[serde(default)]
    pub property_attributes: u32,
}

/// Variables visible in a stack frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackProperties {
    /// `this` of the frame
    #[serde(default)]
    pub this_object: Option<Variable>,
    /// Exception being thrown, if stopped on one
    #[serde(default)]
    pub exception: Option<Variable>,
    /// `arguments` object
    #[serde(default)]
    pub arguments: Option<Variable>,
    /// Value returned by the last step
    #[serde(default)]
    pub return_value: Option<Variable>,
    /// Local variables
    #[serde(default)]
    pub locals: Vec<Variable>,
    /// Enclosing scopes
    #[serde(default)]
    pub scopes: Vec<Variable>,
    /// Global object
    #[serde(default)]
    pub globals: Option<Variable>,
}

/// Properties of an object, split by visibility
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableProperties {
    /// Ordinary properties
    #[serde(default)]
    pub properties: Vec<Variable>,
    /// Internal properties only the debugger can see
    #[serde(default)]
    pub debugger_only_properties: Vec<Variable>,
}

/// How execution proceeds after a break
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Run until the next breakpoint
    #[default]
    Continue,
    /// Step into calls
    StepIn,
    /// Run until the current function returns
    StepOut,
    /// Step over calls
    StepOver,
    /// Step back one statement (time travel debugging)
    StepBack,
    /// Run backwards to the previous breakpoint (time travel debugging)
    ReverseContinue,
}

/// Debugging API of a script engine.
///
/// None of these calls are safe to make concurrently; the bridge routes all
/// of them through a single worker with the engine context current.
pub trait DebugService: Send + Sync {
    /// Set a breakpoint at a script location
    fn set_breakpoint(&self, script_id: u32, line: u32, column: u32) -> EngineResult<Breakpoint>;

    /// Remove a breakpoint by ID
    fn remove_breakpoint(&self, breakpoint_id: u32) -> EngineResult<()>;

    /// Ask the engine to break at the next opportunity
    fn request_async_break(&self) -> EngineResult<()>;

    /// Set the step behavior used when execution resumes
    fn set_step_type(&self, step: StepType) -> EngineResult<()>;

    /// List loaded scripts
    fn scripts(&self) -> EngineResult<Vec<SourceCode>>;

    /// List all breakpoints
    fn breakpoints(&self) -> EngineResult<Vec<Breakpoint>>;

    /// Current call stack, innermost frame first
    fn stack_trace(&self) -> EngineResult<Vec<StackFrame>>;

    /// Variables visible in a stack frame
    fn stack_properties(&self, frame_index: u32) -> EngineResult<StackProperties>;

    /// Source of a script
    fn script_source(&self, script_id: u32) -> EngineResult<SourceCode>;

    /// Resolve a debugger handle to a variable
    fn object_from_handle(&self, handle: u32) -> EngineResult<Variable>;

    /// Properties of an object in the index range `from..=to`
    fn properties(&self, handle: u32, from: u32, to: u32) -> EngineResult<VariableProperties>;

    /// Evaluate an expression in a stack frame
    fn evaluate(
        &self,
        expression: &str,
        frame_index: u32,
        force_set_value_prop: bool,
    ) -> EngineResult<serde_json::Value>;
}
