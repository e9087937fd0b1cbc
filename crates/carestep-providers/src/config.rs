//! Configuration loading and grader factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use carestep_core::cycle::CycleCalendar;
use carestep_core::error::TransportError;
use carestep_core::grader::{Grader, GraderConfig};
use carestep_core::progression::{PassRules, ProgressionEvaluator};
use carestep_core::report::WorkType;
use carestep_core::rubric::RubricScorer;
use carestep_core::traits::JudgeProvider;
use carestep_core::vocabulary::Vocabulary;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::mock::MockJudge;

/// Configuration for a single judge backend.
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
        #[serde(default)]
        model: Option<String>,
    },
    Anthropic {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    /// Offline judge for dry runs.
    Mock {
        #[serde(default)]
        response: Option<String>,
        /// Fail every call with a network error.
        #[serde(default)]
        fail: bool,
        #[serde(default)]
        delay_ms: u64,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            ProviderConfig::Mock {
                response,
                fail,
                delay_ms,
            } => f
                .debug_struct("Mock")
                .field("response", response)
                .field("fail", fail)
                .field("delay_ms", delay_ms)
                .finish(),
        }
    }
}

impl ProviderConfig {
    /// Whether the backend has what it needs to be called.
    pub fn has_credential(&self) -> bool {
        match self {
            ProviderConfig::Gemini { api_key, .. } | ProviderConfig::Anthropic { api_key, .. } => {
                !api_key.trim().is_empty()
            }
            ProviderConfig::Mock { .. } => true,
        }
    }

    /// Model configured for this backend, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            ProviderConfig::Gemini { model, .. } | ProviderConfig::Anthropic { model, .. } => {
                model.as_deref()
            }
            ProviderConfig::Mock { .. } => None,
        }
    }
}

/// Top-level carestep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarestepConfig {
    /// Judge backends keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Backend used for remote grading.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Low by default for repeatable verdicts.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Hard bound on one remote call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Max concurrent gradings in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Work pattern assumed by monthly reports.
    #[serde(default)]
    pub work_type: WorkType,
    #[serde(default)]
    pub vocabulary: Vocabulary,
    #[serde(default)]
    pub pass_rules: PassRules,
    #[serde(default)]
    pub calendar: CycleCalendar,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_parallelism() -> usize {
    4
}

impl Default for CarestepConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            parallelism: default_parallelism(),
            work_type: WorkType::default(),
            vocabulary: Vocabulary::default(),
            pass_rules: PassRules::default(),
            calendar: CycleCalendar::default(),
        }
    }
}

impl CarestepConfig {
    pub fn evaluator(&self) -> ProgressionEvaluator {
        ProgressionEvaluator::new(self.pass_rules.clone())
    }

    pub fn scorer(&self) -> Result<RubricScorer> {
        RubricScorer::new(&self.vocabulary).context("invalid [vocabulary] in configuration")
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini {
            api_key,
            base_url,
            model,
        } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            model: model.clone(),
        },
        ProviderConfig::Anthropic {
            api_key,
            base_url,
            model,
        } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            model: model.clone(),
        },
        mock @ ProviderConfig::Mock { .. } => mock.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `carestep.toml` in the current directory
/// 2. `~/.config/carestep/config.toml`
///
/// Environment variable overrides: `CARESTEP_GEMINI_KEY` (or `GEMINI_API_KEY`),
/// `CARESTEP_ANTHROPIC_KEY`.
pub fn load_config() -> Result<CarestepConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CarestepConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("carestep.toml");
            if local.exists() {
                Some(local)
            } else {
                config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => CarestepConfig::default(),
    };

    // Apply env var overrides
    let gemini_key = std::env::var("CARESTEP_GEMINI_KEY").or_else(|_| std::env::var("GEMINI_API_KEY"));
    if let Ok(key) = gemini_key {
        let entry = config
            .providers
            .entry("gemini".into())
            .or_insert(ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
                model: None,
            });
        if let ProviderConfig::Gemini { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("CARESTEP_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
                model: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    Ok(config)
}

/// Parse a config file body and resolve `${VAR}` references.
pub fn parse_config(content: &str) -> Result<CarestepConfig> {
    let mut config: CarestepConfig = toml::from_str(content)?;
    config
        .calendar
        .validate()
        .context("invalid [calendar] in configuration")?;
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    Ok(config)
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("carestep"))
}

/// Create a judge instance from its configuration.
pub fn create_judge(config: &ProviderConfig) -> Arc<dyn JudgeProvider> {
    match config {
        ProviderConfig::Gemini {
            api_key, base_url, ..
        } => Arc::new(GeminiProvider::new(api_key, base_url.clone())),
        ProviderConfig::Anthropic {
            api_key, base_url, ..
        } => Arc::new(AnthropicProvider::new(api_key, base_url.clone())),
        ProviderConfig::Mock {
            response,
            fail,
            delay_ms,
        } => {
            let judge = if *fail {
                MockJudge::failing(TransportError::NetworkError("mock judge set to fail".into()))
            } else if let Some(response) = response {
                MockJudge::with_fixed_response(response)
            } else {
                MockJudge::new(HashMap::new())
            };
            Arc::new(judge.with_delay(Duration::from_millis(*delay_ms)))
        }
    }
}

/// Options that override the configured judge.
#[derive(Debug, Clone, Default)]
pub struct GraderOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Skip the remote judge entirely.
    pub local_only: bool,
}

/// Build the grading pipeline from configuration.
///
/// A missing provider entry or credential yields a local-only grader; only
/// an invalid vocabulary is an error.
pub fn build_grader(config: &CarestepConfig, options: &GraderOptions) -> Result<Grader> {
    let scorer = config.scorer()?;
    let provider_name = options
        .provider
        .as_deref()
        .unwrap_or(&config.default_provider);
    let provider = config.providers.get(provider_name);

    let model = options
        .model
        .as_deref()
        .or_else(|| provider.and_then(|p| p.model()))
        .unwrap_or(&config.default_model)
        .to_string();
    let grader_config = GraderConfig {
        model,
        max_output_tokens: config.max_output_tokens,
        temperature: config.temperature,
        timeout: Duration::from_secs(config.timeout_secs),
        parallelism: config.parallelism,
    };

    if options.local_only {
        return Ok(Grader::local_only(scorer, grader_config));
    }

    match provider {
        Some(p) if p.has_credential() => {
            tracing::debug!(provider = provider_name, ?p, "remote judge configured");
            Ok(Grader::new(create_judge(p), scorer, grader_config))
        }
        Some(_) => {
            tracing::warn!(
                provider = provider_name,
                "no API key for provider, grading with local rules only"
            );
            Ok(Grader::local_only(scorer, grader_config))
        }
        None => {
            tracing::warn!(
                provider = provider_name,
                "provider not configured, grading with local rules only"
            );
            Ok(Grader::local_only(scorer, grader_config))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_CARESTEP_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_CARESTEP_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_CARESTEP_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_CARESTEP_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_CARESTEP_TEST_VAR");
    }

    #[test]
    fn resolved_values_are_not_expanded_again() {
        std::env::set_var("_CARESTEP_SELF_REF", "${_CARESTEP_SELF_REF}");
        std::env::set_var("_CARESTEP_NESTED", "${_CARESTEP_TEST_NESTED_INNER}");
        assert_eq!(
            resolve_env_vars("${_CARESTEP_SELF_REF}"),
            "${_CARESTEP_SELF_REF}"
        );
        assert_eq!(
            resolve_env_vars("a${_CARESTEP_NESTED}b${_CARESTEP_SELF_REF}c"),
            "a${_CARESTEP_TEST_NESTED_INNER}b${_CARESTEP_SELF_REF}c"
        );
        std::env::remove_var("_CARESTEP_SELF_REF");
        std::env::remove_var("_CARESTEP_NESTED");
    }

    #[test]
    fn invalid_calendar_is_rejected_on_load() {
        let err = parse_config("[calendar]\ninput_end = 0\n").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("invalid [calendar]"));
        assert!(message.contains("input_end = 0"));

        let err = parse_config("[calendar]\nevaluation_start = 20\nevaluation_end = 15\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("out of order"));
    }

    #[test]
    fn default_config() {
        let config = CarestepConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.0-flash");
        assert_eq!(config.max_output_tokens, 1024);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.pass_rules.first_attempt_score, 80);
        assert_eq!(config.calendar.input_start, 26);
    }

    #[test]
    fn parse_full_config() {
        std::env::set_var("_CARESTEP_TEST_GEMINI", "g-key");
        let toml_str = r#"
default_provider = "anthropic"
timeout_secs = 10
work_type = "night_once"

[providers.gemini]
type = "gemini"
api_key = "${_CARESTEP_TEST_GEMINI}"

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"
model = "claude-haiku-4-5-20251001"

[providers.offline]
type = "mock"
fail = true

[vocabulary]
place = ["ホール", "居室"]

[pass_rules]
stagnation_months = 6

[calendar]
input_end = 12
evaluation_start = 13
"#;
        let config = parse_config(toml_str).unwrap();
        std::env::remove_var("_CARESTEP_TEST_GEMINI");

        assert_eq!(config.providers.len(), 3);
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { api_key, .. }) if api_key == "g-key"
        ));
        assert_eq!(
            config.providers["anthropic"].model(),
            Some("claude-haiku-4-5-20251001")
        );
        assert_eq!(config.work_type, WorkType::NightOnce);
        assert_eq!(config.vocabulary.place, vec!["ホール", "居室"]);
        assert_eq!(config.vocabulary.time, Vocabulary::default().time);
        assert_eq!(config.pass_rules.stagnation_months, 6);
        assert_eq!(config.pass_rules.stagnation_penalty, 2);
        assert_eq!(config.calendar.input_end, 12);
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::Gemini {
            api_key: "super-secret".into(),
            base_url: None,
            model: None,
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn missing_credential_builds_local_grader() {
        let mut config = CarestepConfig::default();
        config.providers.insert(
            "gemini".into(),
            ProviderConfig::Gemini {
                api_key: "  ".into(),
                base_url: None,
                model: None,
            },
        );
        let grader = build_grader(&config, &GraderOptions::default()).unwrap();
        assert!(grader.judge_name().is_none());

        let grader = build_grader(&CarestepConfig::default(), &GraderOptions::default()).unwrap();
        assert!(grader.judge_name().is_none());
    }

    #[test]
    fn configured_provider_and_model_precedence() {
        let mut config = CarestepConfig::default();
        config.providers.insert(
            "anthropic".into(),
            ProviderConfig::Anthropic {
                api_key: "sk".into(),
                base_url: None,
                model: Some("claude-haiku-4-5-20251001".into()),
            },
        );
        let options = GraderOptions {
            provider: Some("anthropic".into()),
            ..GraderOptions::default()
        };
        let grader = build_grader(&config, &options).unwrap();
        assert_eq!(grader.judge_name(), Some("anthropic"));
        assert_eq!(grader.config().model, "claude-haiku-4-5-20251001");

        let options = GraderOptions {
            model: Some("claude-sonnet-4-20250514".into()),
            ..options
        };
        let grader = build_grader(&config, &options).unwrap();
        assert_eq!(grader.config().model, "claude-sonnet-4-20250514");

        let options = GraderOptions {
            local_only: true,
            ..options
        };
        assert!(build_grader(&config, &options).unwrap().judge_name().is_none());
    }

    #[test]
    fn invalid_vocabulary_is_an_error() {
        let config = CarestepConfig {
            vocabulary: Vocabulary {
                reaction: vec!["[".into()],
                ..Vocabulary::default()
            },
            ..CarestepConfig::default()
        };
        let err = build_grader(&config, &GraderOptions::default()).err().expect("expected build_grader to fail");
        assert!(format!("{err:#}").contains("vocabulary"));
    }

    #[test]
    fn explicit_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carestep.toml");
        std::fs::write(&path, "parallelism = 2\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.parallelism, 2);

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());

        std::fs::write(&path, "parallelism = \"many\"\n").unwrap();
        assert!(load_config_from(Some(&path)).is_err());
    }

    #[tokio::test]
    async fn mock_provider_from_config() {
        let judge = create_judge(&ProviderConfig::Mock {
            response: Some("{\"judgement\":\"○\",\"score\":90}".into()),
            fail: false,
            delay_ms: 0,
        });
        assert_eq!(judge.name(), "mock");
        let failing = create_judge(&ProviderConfig::Mock {
            response: None,
            fail: true,
            delay_ms: 0,
        });
        let request = carestep_core::traits::JudgeRequest {
            model: "mock-model".into(),
            prompt: "x".into(),
            system_prompt: None,
            max_output_tokens: 10,
            temperature: 0.3,
            json_response: true,
        };
        assert!(judge.complete(&request).await.is_ok());
        assert!(failing.complete(&request).await.is_err());
    }
}
