//! Script argument binding and script execution.
//!
//! - [`convert`]: the registry converting textual argument values per data type
//! - [`binding`]: effective arguments of executable scripts and their inheritance chains
//! - [`evaluator`]: the injected script evaluation capability
//! - [`executor`]: execution of executable scripts with closed variable bindings
//! - [`context`]: filter, transform and lookup scripts of one rule evaluation

pub mod binding;
pub mod context;
pub mod convert;
pub mod evaluator;
pub mod executor;
pub mod value;
pub mod variables;
pub mod writable;

pub use binding::{
    ArgumentOrigin, BoundOverride, ChainLevel, ExecutableScriptInfo, NamedArg, ResolvedArgument,
    ResolvedArguments, merge_overrides, resulting_args, validate_executable_script,
};
pub use context::ScriptExecutionContext;
pub use convert::{ARRAY_DELIMITER, Converter, ConverterRegistry, split_array};
pub use evaluator::{NativeScriptEvaluator, ScriptBindings, ScriptEvaluationError, ScriptEvaluator};
pub use executor::{ScriptExecutor, ScriptRepository};
pub use value::ScriptValue;
pub use variables::ScriptVariables;
pub use writable::{ReadOnlyScriptedResource, WritableScriptedResource};
