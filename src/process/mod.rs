//! External command execution
//!
//! Everything the pipeline spawns (clones, build tools, probe compilers,
//! verifiers) goes through a [`CommandRunner`]. [`SystemRunner`] is the real
//! one; [`RecordingRunner`] spawns nothing and is used for dry runs.

mod error;
mod outcome;
mod recording;
mod runner;

pub use error::{ProcessError, Result};
pub(crate) use error::display_code;
pub use outcome::{BuildOutcome, Invocation, OutcomeStatus};
pub use recording::{RecordingRunner, Reply};
pub use runner::{CommandRunner, SystemRunner};
pub(crate) use runner::MeteredRunner;
