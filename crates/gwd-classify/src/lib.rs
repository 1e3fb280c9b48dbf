pub mod classifier;

pub use classifier::{Classification, Fingerprint, classify, is_llm_command};
