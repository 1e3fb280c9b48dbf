pub mod manager;

pub use manager::{ExitOutcome, ProcessHandle, SpawnFailed, TerminateOutcome};
