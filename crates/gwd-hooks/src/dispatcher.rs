use std::collections::HashMap;

use gwd_core::{Execution, HookPhase, HookSpec};
use regex::Regex;
use tracing::{debug, warn};

use crate::runner::run_hook;

/// Outcome of the pre-execution phase. `Proceed` carries the final
/// environment merge and command wrap after every matching hook has run;
/// `Refused` means a `required=true` hook failed or timed out.
#[derive(Debug, Clone)]
pub enum PreHookOutcome {
    Proceed { env_additions: HashMap<String, String>, command: String },
    Refused { hook: String, reason: String },
}

/// In-process dispatcher that *may* shell out per hook, but always returns
/// within the sum of its hooks' timeouts — never fire-and-forget (spec §9).
pub struct HookDispatcher {
    hooks: Vec<HookSpec>,
}

impl HookDispatcher {
    pub fn new(hooks: Vec<HookSpec>) -> Self {
        Self { hooks }
    }

    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    fn matching(&self, phase: HookPhase, command: &str) -> Vec<&HookSpec> {
        self.hooks
            .iter()
            .filter(|h| h.phase == phase)
            .filter(|h| {
                Regex::new(&h.trigger)
                    .map(|re| re.is_match(command))
                    .unwrap_or_else(|e| {
                        warn!(hook = %h.name, trigger = %h.trigger, error = %e, "invalid hook trigger regex, skipping");
                        false
                    })
            })
            .collect()
    }

    /// Run every matching `pre` hook in declaration order. Environment
    /// mutations merge with last-writer-wins on key collision; command
    /// wrapping composes in declaration order (spec §9 resolution).
    pub async fn run_pre(&self, command: &str, variables: &HashMap<String, String>) -> PreHookOutcome {
        let mut env_additions = HashMap::new();
        let mut wrapped = command.to_string();

        for hook in self.matching(HookPhase::Pre, command) {
            let mut hook_vars = variables.clone();
            hook_vars.insert("command".to_string(), wrapped.clone());

            match run_hook(&hook.command_template, hook.timeout_secs, &hook_vars).await {
                Ok(()) => {
                    for (k, v) in &hook.env_additions {
                        env_additions.insert(k.clone(), v.clone());
                    }
                    if let Some(wrap) = &hook.command_wrap {
                        wrapped = wrap.replace("{command}", &wrapped);
                    }
                    debug!(hook = %hook.name, "pre-hook passed");
                }
                Err(e) => {
                    if hook.required {
                        warn!(hook = %hook.name, error = %e, "required pre-hook refused execution");
                        return PreHookOutcome::Refused {
                            hook: hook.name.clone(),
                            reason: e.to_string(),
                        };
                    }
                    warn!(hook = %hook.name, error = %e, "non-fatal pre-hook failure, proceeding");
                }
            }
        }

        PreHookOutcome::Proceed {
            env_additions,
            command: wrapped,
        }
    }

    /// Run every matching `post` hook. Always best-effort: a post hook
    /// never blocks or reverses a completed execution (spec §4.5).
    pub async fn run_post(&self, execution: &Execution, variables: &HashMap<String, String>) {
        for hook in self.matching(HookPhase::Post, &execution.command) {
            let mut hook_vars = variables.clone();
            hook_vars.insert("exit_code".to_string(), execution.exit_code.map(|c| c.to_string()).unwrap_or_default());
            hook_vars.insert("bytes_out".to_string(), execution.bytes_out.to_string());
            hook_vars.insert("bytes_err".to_string(), execution.bytes_err.to_string());

            if let Err(e) = run_hook(&hook.command_template, hook.timeout_secs, &hook_vars).await {
                warn!(hook = %hook.name, error = %e, "post-hook failed (non-fatal)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gwd_core::{Category, Complexity, ExecutionState};

    fn hook(name: &str, trigger: &str, command: &str, required: bool) -> HookSpec {
        HookSpec {
            phase: HookPhase::Pre,
            name: name.to_string(),
            trigger: trigger.to_string(),
            command_template: command.to_string(),
            timeout_secs: 5,
            required,
            env_additions: HashMap::new(),
            command_wrap: None,
        }
    }

    #[tokio::test]
    async fn non_matching_hook_does_not_run() {
        let dispatcher = HookDispatcher::new(vec![hook("only-claude", "claude", "exit 1", true)]);
        let outcome = dispatcher.run_pre("echo hi", &HashMap::new()).await;
        assert!(matches!(outcome, PreHookOutcome::Proceed { .. }));
    }

    #[tokio::test]
    async fn required_hook_failure_refuses() {
        let dispatcher = HookDispatcher::new(vec![hook("gate", "echo", "exit 1", true)]);
        let outcome = dispatcher.run_pre("echo hi", &HashMap::new()).await;
        match outcome {
            PreHookOutcome::Refused { hook, .. } => assert_eq!(hook, "gate"),
            other => panic!("expected Refused, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_required_hook_failure_proceeds() {
        let dispatcher = HookDispatcher::new(vec![hook("advisory", "echo", "exit 1", false)]);
        let outcome = dispatcher.run_pre("echo hi", &HashMap::new()).await;
        assert!(matches!(outcome, PreHookOutcome::Proceed { .. }));
    }

    #[tokio::test]
    async fn env_additions_merge_last_writer_wins() {
        let mut first = hook("a", "echo", "true", false);
        first.env_additions.insert("KEY".to_string(), "from-a".to_string());
        let mut second = hook("b", "echo", "true", false);
        second.env_additions.insert("KEY".to_string(), "from-b".to_string());

        let dispatcher = HookDispatcher::new(vec![first, second]);
        match dispatcher.run_pre("echo hi", &HashMap::new()).await {
            PreHookOutcome::Proceed { env_additions, .. } => {
                assert_eq!(env_additions.get("KEY"), Some(&"from-b".to_string()));
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn command_wraps_compose_in_declaration_order() {
        let mut first = hook("outer", "echo", "true", false);
        first.command_wrap = Some("outer({command})".to_string());
        let mut second = hook("inner", "echo", "true", false);
        second.command_wrap = Some("inner({command})".to_string());

        let dispatcher = HookDispatcher::new(vec![first, second]);
        match dispatcher.run_pre("echo hi", &HashMap::new()).await {
            PreHookOutcome::Proceed { command, .. } => {
                assert_eq!(command, "inner(outer(echo hi))");
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_hook_failure_never_propagates() {
        let post_hook = HookSpec {
            phase: HookPhase::Post,
            name: "receipt".to_string(),
            trigger: "echo".to_string(),
            command_template: "exit 1".to_string(),
            timeout_secs: 5,
            required: true,
            env_additions: HashMap::new(),
            command_wrap: None,
        };
        let dispatcher = HookDispatcher::new(vec![post_hook]);
        let execution = Execution {
            execution_id: gwd_core::new_execution_id(),
            session_id: gwd_core::new_session_id(),
            command: "echo hi".to_string(),
            env_overrides: HashMap::new(),
            cwd: None,
            started_at: Utc::now(),
            ended_at: Some(Utc::now()),
            exit_code: Some(0),
            signal: None,
            category: Category::General,
            complexity: Complexity::Trivial,
            execution_timeout_secs: 15,
            stall_timeout_secs: 5,
            pgid: None,
            bytes_out: 0,
            bytes_err: 0,
            last_output_at: Utc::now(),
            cancel_reason: None,
            timeout_hit: false,
            state: ExecutionState::Terminated,
        };
        // Should not panic even though the `required` post-hook fails.
        dispatcher.run_post(&execution, &HashMap::new()).await;
    }
}
