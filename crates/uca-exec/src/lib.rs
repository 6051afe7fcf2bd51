//! # uca-exec
//!
//! Child-process execution facility for uca.
//!
//! Every external command (probes, version checks, updates) goes through a
//! [`CommandRunner`], which returns combined output, an [`Exit`] and the
//! wall-clock duration. Timeouts and run-scoped cancellation are structural
//! outcomes, never inferred from output text.

mod command;
mod mock;

pub use command::{display_command, CommandOutput, CommandRunner, Exit, SystemRunner, SPAWN_FAILURE_CODE};
pub use mock::{Invocation, MockResponse, MockRunner};
pub use tokio_util::sync::CancellationToken;
