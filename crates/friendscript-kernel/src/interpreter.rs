//! Tree-walking evaluation of Friendscript programs.
//!
//! The interpreter is split by concern:
//!
//! - [`scope`]: the frame stack and its ownership rules
//! - [`ops`]: arithmetic, comparison and compound assignment on values
//! - [`control_flow`]: break / continue signals
//! - [`context`]: execution contexts and their observers
//! - `environment`: the evaluator itself, [`Environment`]

mod context;
mod control_flow;
mod environment;
pub mod ops;
mod scope;

pub use context::{Context, ContextState, ObserverId, ObserverRegistry};
pub use control_flow::{Flow, Signal};
pub use environment::{Completion, Environment, CORE_MODULE, FORCED_OUTPUT, LOOP_INDEX};
pub use scope::{FrameId, Scope, MAX_INTERPOLATION_PASSES, PLACEHOLDER};
