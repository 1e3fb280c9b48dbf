pub mod execution;
pub mod registry;
pub mod ring;

pub use execution::{ExecutionStateMachine, InvalidTransition, is_legal_transition};
pub use registry::{SessionHandle, SessionRegistry, new_execution};
pub use ring::OutputRing;
