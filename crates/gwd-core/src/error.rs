/// Closed error taxonomy surfaced to RPC clients (spec §7, §6).
///
/// Each variant carries the application error code from the `1000` range
/// defined in the wire protocol. Standard JSON-RPC framing errors
/// (`-32600`/`-32601`/`-32602`) are produced directly by `gwd-rpc` and are
/// not represented here.
#[derive(thiserror::Error, Debug, Clone)]
pub enum GatewayError {
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("session is busy with another execution")]
    Busy,

    #[error("no execution matching '{0}'")]
    NotFound(String),

    #[error("execution already terminated")]
    AlreadyTerminated,

    #[error("session capacity exceeded")]
    CapacityExceeded,

    #[error("hook '{hook}' refused the execution: {reason}")]
    HookRefused { hook: String, reason: String },

    #[error("failed to spawn child process: {0}")]
    SpawnFailed(String),
}

impl GatewayError {
    /// Integer code from spec §6's application error range.
    pub fn code(&self) -> i64 {
        match self {
            GatewayError::InvalidParams(_) => -32602,
            GatewayError::Busy => 1000,
            GatewayError::CapacityExceeded => 1001,
            GatewayError::NotFound(_) => 1002,
            GatewayError::AlreadyTerminated => 1003,
            GatewayError::HookRefused { .. } => 1004,
            GatewayError::SpawnFailed(_) => 1005,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_table() {
        assert_eq!(GatewayError::Busy.code(), 1000);
        assert_eq!(GatewayError::CapacityExceeded.code(), 1001);
        assert_eq!(GatewayError::NotFound("x".into()).code(), 1002);
        assert_eq!(GatewayError::AlreadyTerminated.code(), 1003);
        assert_eq!(
            GatewayError::HookRefused {
                hook: "h".into(),
                reason: "r".into()
            }
            .code(),
            1004
        );
        assert_eq!(GatewayError::SpawnFailed("boom".into()).code(), 1005);
    }

    #[test]
    fn display_messages_are_human_readable() {
        let err = GatewayError::HookRefused {
            hook: "lint-gate".into(),
            reason: "required hook failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "hook 'lint-gate' refused the execution: required hook failed"
        );
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GatewayError>();
    }
}
