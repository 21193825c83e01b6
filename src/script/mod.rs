//! Script front-end: tokenization, the interpreter stack, the operator
//! registry, and the interpreter driver.

mod interp;
mod lexer;
mod ops;
mod stack;

pub use interp::run_script;
pub use ops::{MAX_OP_NAME, OpCtx, OpFn, OperatorRegistry, SamplerConfig};
pub use stack::{Cell, STACK_HEIGHT, ScriptStack};
