pub mod estimator;

pub use estimator::{MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS, TimeoutEstimate, estimate};
