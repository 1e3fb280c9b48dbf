use std::path::Path;

use gwd_core::HookSpec;
use serde::{Deserialize, Serialize};

/// On-disk shape of the file pointed to by `HOOKS_CONFIG` (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksFile {
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

impl HooksFile {
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_hooks_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hooks.toml");
        tokio::fs::write(
            &path,
            r#"
[[hooks]]
phase = "pre"
name = "lint-gate"
trigger = "claude"
command_template = "true"
timeout_secs = 5
required = true
"#,
        )
        .await
        .unwrap();

        let file = HooksFile::load(&path).await.unwrap();
        assert_eq!(file.hooks.len(), 1);
        assert_eq!(file.hooks[0].name, "lint-gate");
        assert!(file.hooks[0].required);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let result = HooksFile::load("/nonexistent/path/hooks.toml").await;
        assert!(result.is_err());
    }
}
