pub mod execution;
pub mod handle;
pub mod signal;
pub mod supervisor;


pub use execution::{ExecutionContext, run_execution};
pub use handle::ExecutionHandle;
pub use supervisor::Supervisor;
