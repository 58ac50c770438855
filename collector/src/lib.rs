pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod local;
pub mod orchestrator;
pub mod progress;
pub mod remote;
pub mod retry;
pub mod store;
pub mod task;

pub use error::{RunError, SampleError};
pub use orchestrator::{Orchestrator, RunReport};
pub use task::{StartedSignal, Task};
