//! External process invocation
//!
//! [`CommandSpec`] describes what to run, [`ProcessInvoker`] runs it and
//! produces one [`InvocationResult`] per spec.

mod environment;
mod invoker;
mod spec;

pub use environment::{EnvironmentSnapshot, RUNTIME_ROOT_VAR};
pub use invoker::{InvokeOptions, Launcher, ProcessInvoker, TERMINAL_COMMAND};
pub use spec::{CommandSpec, FailureCause, InvocationResult};
