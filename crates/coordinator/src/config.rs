//! Pipeline configuration.
//!
//! One immutable record injected into the orchestrator at construction.
//! Every field has a default, so an empty TOML file is a valid config.
//!
//! # File security
//!
//! - Config file permission validation on Unix systems
//! - Rejects world-readable files containing API keys
//! - Warns about API keys stored in config files

use lumen_agents::{AgentSettings, AnalysisSettings, SynthesisSettings, ToolServerConfig};
use lumen_common::{LumenError, Result};
use lumen_llm::{LlmConfig, RetryPolicy};
use lumen_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retry policy for every reasoner, analysis and synthesis call
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Tool loop budgets
    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub synthesis: SynthesisSettings,

    #[serde(default)]
    pub tools: ToolServerConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix systems, this validates that:
    /// - The file is a regular file
    /// - The file is not world-writable
    /// - The file is not world-readable if it contains an API key
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;

        if config.llm.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use the OPENAI_API_KEY environment variable instead.",
                path.display()
            );
        }

        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.memory.memory_window == 0 {
            return Err(LumenError::Config("memory.memory_window must be at least 1".into()));
        }
        if self.memory.rebuild_interval == 0 {
            return Err(LumenError::Config("memory.rebuild_interval must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(LumenError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(LumenError::Config("retry.backoff_multiplier must be at least 1.0".into()));
        }
        if self.agent.max_sources == 0 {
            return Err(LumenError::Config("agent.max_sources must be at least 1".into()));
        }
        Ok(())
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file
/// - File must not be world-writable (mode & 0o002 == 0)
/// - If file contains an API key, must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!("Config path '{}' is not a regular file.", path.display());
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_api_key = content.contains("api_key")
        && (content.contains("sk-") || content.contains("key ="));

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
