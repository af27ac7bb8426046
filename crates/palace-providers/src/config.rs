//! Configuration and backend roster factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use palace_core::prompt::{DEFAULT_QUIZ_SIZE, SYSTEM_PROMPT};
use palace_core::traits::GenerativeBackend;
use palace_core::{BackendDescriptor, BackendRoster, Cascade, CascadeConfig, Pipeline, PipelineConfig};

use crate::anthropic::AnthropicBackend;
use crate::gemini::GeminiBackend;
use crate::ollama::{OllamaBackend, DEFAULT_BASE_URL as DEFAULT_OLLAMA_URL};
use crate::openai::OpenAiBackend;

/// Provider-specific connection settings.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl ProviderConfig {
    /// The `type` tag as written in the config file.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Gemini { .. } => "gemini",
            ProviderConfig::OpenAI { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::Ollama { .. } => "ollama",
        }
    }

    fn api_key(&self) -> Option<&str> {
        match self {
            ProviderConfig::Gemini { api_key, .. }
            | ProviderConfig::OpenAI { api_key, .. }
            | ProviderConfig::Anthropic { api_key, .. } => Some(api_key),
            ProviderConfig::Ollama { .. } => None,
        }
    }

    fn api_key_mut(&mut self) -> Option<&mut String> {
        match self {
            ProviderConfig::Gemini { api_key, .. }
            | ProviderConfig::OpenAI { api_key, .. }
            | ProviderConfig::Anthropic { api_key, .. } => Some(api_key),
            ProviderConfig::Ollama { .. } => None,
        }
    }
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

/// One entry of the `[[backends]]` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEntry {
    /// Unique name shown in diagnostics.
    pub name: String,
    pub model: String,
    /// Lower runs first; defaults to the entry's position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(flatten)]
    pub provider: ProviderConfig,
}

/// Top-level palace configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PalaceConfig {
    /// Per-backend attempt bound, in seconds.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Extra whole-pipeline attempts on transient failures.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Max concurrent ingestions.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_max_source_chars")]
    pub max_source_chars: usize,
    #[serde(default = "default_min_source_chars")]
    pub min_source_chars: usize,
    /// Directory holding stored analyses.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Backends in declaration order.
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

fn default_attempt_timeout() -> u64 {
    60
}
fn default_retries() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}
fn default_max_source_chars() -> usize {
    20_000
}
fn default_min_source_chars() -> usize {
    20
}
fn default_store_dir() -> PathBuf {
    PathBuf::from("./palace-data")
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> u32 {
    8192
}

impl Default for PalaceConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            parallelism: default_parallelism(),
            max_source_chars: default_max_source_chars(),
            min_source_chars: default_min_source_chars(),
            store_dir: default_store_dir(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            backends: Vec::new(),
        }
    }
}

impl PalaceConfig {
    pub fn cascade_config(&self) -> CascadeConfig {
        CascadeConfig {
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_source_chars: self.max_source_chars,
            min_source_chars: self.min_source_chars,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            quiz_count: DEFAULT_QUIZ_SIZE,
        }
    }

    /// Entries in cascade order with their resolved descriptors, without
    /// constructing any client.
    pub fn ordered_backends(&self) -> Vec<(BackendDescriptor, &BackendEntry)> {
        let mut ordered: Vec<_> = self
            .backends
            .iter()
            .enumerate()
            .map(|(i, entry)| (descriptor(i, entry), entry))
            .collect();
        ordered.sort_by_key(|(d, _)| d.priority);
        ordered
    }
}

fn descriptor(index: usize, entry: &BackendEntry) -> BackendDescriptor {
    BackendDescriptor {
        name: entry.name.clone(),
        model: entry.model.clone(),
        priority: entry.priority.unwrap_or(index as u32),
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result.replace_range(start..start + end + 1, &value);
        from = start + value.len();
    }
    result
}

fn resolve_provider_config(config: &mut ProviderConfig) {
    match config {
        ProviderConfig::Gemini { api_key, base_url }
        | ProviderConfig::Anthropic { api_key, base_url } => {
            *api_key = resolve_env_vars(api_key);
            if let Some(url) = base_url {
                *url = resolve_env_vars(url);
            }
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            *api_key = resolve_env_vars(api_key);
            if let Some(url) = base_url {
                *url = resolve_env_vars(url);
            }
            if let Some(org) = org_id {
                *org = resolve_env_vars(org);
            }
        }
        ProviderConfig::Ollama { base_url } => *base_url = resolve_env_vars(base_url),
    }
}

/// Env var that fills empty keys for each provider type.
fn key_env_var(kind: &str) -> Option<&'static str> {
    match kind {
        "gemini" => Some("PALACE_GEMINI_KEY"),
        "openai" => Some("PALACE_OPENAI_KEY"),
        "anthropic" => Some("PALACE_ANTHROPIC_KEY"),
        _ => None,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `palace.toml` in the current directory
/// 2. `~/.config/palace/config.toml`
///
/// Environment variable fallbacks for empty keys: `PALACE_GEMINI_KEY`,
/// `PALACE_OPENAI_KEY`, `PALACE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<PalaceConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PalaceConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("palace.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PalaceConfig::default(),
    };

    Ok(config)
}

/// Parse, resolve env references, and validate a config document.
pub fn parse_config(content: &str) -> Result<PalaceConfig> {
    let mut config: PalaceConfig = toml::from_str(content)?;

    for entry in &mut config.backends {
        resolve_provider_config(&mut entry.provider);
        let fallback = key_env_var(entry.provider.kind()).and_then(|var| std::env::var(var).ok());
        if let (Some(key), Some(value)) = (entry.provider.api_key_mut(), fallback) {
            if key.is_empty() {
                *key = value;
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &PalaceConfig) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for entry in &config.backends {
        if entry.name.trim().is_empty() {
            anyhow::bail!("backend entries need a non-empty name");
        }
        if !seen.insert(entry.name.as_str()) {
            anyhow::bail!("duplicate backend name '{}'", entry.name);
        }
    }
    if config.parallelism == 0 {
        anyhow::bail!("parallelism must be at least 1");
    }
    if config.attempt_timeout_secs == 0 {
        anyhow::bail!("attempt_timeout_secs must be at least 1");
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("palace"))
}

/// Create a backend instance from its configuration.
pub fn create_backend(config: &ProviderConfig) -> Result<Arc<dyn GenerativeBackend>> {
    Ok(match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            Arc::new(GeminiBackend::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiBackend::new(api_key, base_url.clone(), org_id.clone())?),
        ProviderConfig::Anthropic { api_key, base_url } => {
            Arc::new(AnthropicBackend::new(api_key, base_url.clone())?)
        }
        ProviderConfig::Ollama { base_url } => Arc::new(OllamaBackend::new(base_url)?),
    })
}

/// Build the immutable roster from every configured backend.
pub fn build_roster(config: &PalaceConfig) -> Result<BackendRoster> {
    if config.backends.is_empty() {
        anyhow::bail!("no backends configured; run `palace init` and edit palace.toml");
    }

    let entries = config
        .backends
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let backend = create_backend(&entry.provider)
                .with_context(|| format!("failed to create backend '{}'", entry.name))?;
            if entry.provider.api_key().is_some_and(str::is_empty) {
                let var = key_env_var(entry.provider.kind()).unwrap_or("an api_key");
                tracing::warn!(backend = %entry.name, "no API key configured (set {var})");
            }
            Ok((descriptor(i, entry), backend))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BackendRoster::new(entries))
}

/// Build a ready-to-run pipeline from configuration.
pub fn build_pipeline(config: &PalaceConfig) -> Result<Pipeline> {
    let roster = build_roster(config)?;
    Ok(Pipeline::new(
        Cascade::new(roster, config.cascade_config()),
        config.pipeline_config(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_PALACE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_PALACE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_PALACE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_PALACE_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env_vars("open ${never closed"), "open ${never closed");
        std::env::remove_var("_PALACE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = PalaceConfig::default();
        assert_eq!(config.attempt_timeout_secs, 60);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.min_source_chars, 20);
        assert!(config.backends.is_empty());
    }

    #[test]
    fn parse_backend_entries() {
        let toml_str = r#"
attempt_timeout_secs = 30
store_dir = "/tmp/palace"

[[backends]]
name = "primary"
type = "gemini"
model = "gemini-2.5-flash-lite"
api_key = "g-key"

[[backends]]
name = "backup"
type = "openai"
model = "gpt-4.1-mini"
api_key = "sk-openai"
base_url = "http://localhost:8080"

[[backends]]
name = "local"
type = "ollama"
model = "llama3.1:8b"
priority = 0
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.attempt_timeout_secs, 30);
        assert_eq!(config.store_dir, PathBuf::from("/tmp/palace"));
        assert_eq!(config.backends.len(), 3);
        assert!(matches!(
            config.backends[0].provider,
            ProviderConfig::Gemini { ref api_key, .. } if api_key == "g-key"
        ));
        assert!(matches!(
            config.backends[2].provider,
            ProviderConfig::Ollama { ref base_url } if base_url == "http://localhost:11434"
        ));

        // Explicit priority 0 ties with "primary" (index 0) and keeps declaration order.
        let order: Vec<_> = config
            .ordered_backends()
            .into_iter()
            .map(|(d, _)| d.name)
            .collect();
        assert_eq!(order, ["primary", "local", "backup"]);
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::Gemini {
            api_key: "super-secret".into(),
            base_url: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn env_key_fills_empty_api_key() {
        std::env::set_var("PALACE_ANTHROPIC_KEY", "from-env");
        let config = parse_config(
            r#"
[[backends]]
name = "claude"
type = "anthropic"
model = "claude-sonnet-4-20250514"

[[backends]]
name = "claude-explicit"
type = "anthropic"
model = "claude-sonnet-4-20250514"
api_key = "explicit"
"#,
        )
        .unwrap();
        std::env::remove_var("PALACE_ANTHROPIC_KEY");

        assert!(matches!(
            config.backends[0].provider,
            ProviderConfig::Anthropic { ref api_key, .. } if api_key == "from-env"
        ));
        assert!(matches!(
            config.backends[1].provider,
            ProviderConfig::Anthropic { ref api_key, .. } if api_key == "explicit"
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = parse_config(
            r#"
[[backends]]
name = "a"
type = "ollama"
model = "m"

[[backends]]
name = "a"
type = "ollama"
model = "m"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate backend name"));
    }

    #[test]
    fn roster_requires_backends() {
        assert!(build_roster(&PalaceConfig::default()).is_err());

        let config = parse_config(
            r#"
[[backends]]
name = "local"
type = "ollama"
model = "llama3.1:8b"
"#,
        )
        .unwrap();
        let roster = build_roster(&config).unwrap();
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn explicit_missing_config_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn load_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("palace.toml");
        std::fs::write(&path, "max_retries = 0\nparallelism = 2\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.parallelism, 2);
    }
}
