//! Tool system: trait, schemas, registry and runtime-discovered tools.

pub mod arguments;
pub mod dynamic;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dynamic::{DynamicTool, DynamicToolAdapter, DynamicToolProvider};
pub use registry::{ExecutionToolsGuard, ToolRegistry};
pub use tool::{FunctionTool, Tool, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolParameters};
