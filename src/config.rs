use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::changelog::OutputFormat;
use crate::error::{Error, Result};
use crate::git::CommitOrder;
use crate::llm::ollama::{DEFAULT_CONTEXT_TOKENS, DEFAULT_ENDPOINT};
use crate::llm::prompts::PROMPT_OVERHEAD_TOKENS;
use crate::llm::RetryPolicy;

pub const DEFAULT_MODEL: &str = "llama3.2";
/// Smallest batch budget that still leaves room for a commit subject.
pub const MIN_BATCH_TOKENS: usize = 64;

/// Settings that can come from the environment (or a `.env` file).
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub model: String,
    pub concurrency_limit: usize,
    pub timeout_secs: u64,
    pub max_batch_tokens: usize,
    pub context_tokens: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let endpoint = env::var("OLLAMA_HOST")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize_endpoint(&v))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let model = env::var("AI_CHANGELOG_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            endpoint,
            model,
            concurrency_limit: env_parse("AI_CHANGELOG_CONCURRENCY", 1)?,
            timeout_secs: env_parse("AI_CHANGELOG_TIMEOUT_SECS", 60)?,
            max_batch_tokens: env_parse("AI_CHANGELOG_MAX_BATCH_TOKENS", 6_000)?,
            context_tokens: env_parse("AI_CHANGELOG_CONTEXT_TOKENS", DEFAULT_CONTEXT_TOKENS)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            concurrency_limit: 1,
            timeout_secs: 60,
            max_batch_tokens: 6_000,
            context_tokens: DEFAULT_CONTEXT_TOKENS,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, value))),
        Err(_) => Ok(default),
    }
}

/// Port Ollama listens on when `OLLAMA_HOST` names only a host.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// `OLLAMA_HOST` is often given as a bare `host` or `host:port`. Without a
/// scheme the port defaults to Ollama's; with one, the scheme's default applies.
pub fn normalize_endpoint(value: &str) -> String {
    let value = value.trim().trim_end_matches('/');
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }

    let (authority, path) = match value.find('/') {
        Some(idx) => value.split_at(idx),
        None => (value, ""),
    };
    if has_port(authority) {
        format!("http://{}", value)
    } else {
        format!("http://{}:{}{}", authority, DEFAULT_OLLAMA_PORT, path)
    }
}

fn has_port(authority: &str) -> bool {
    match authority.rfind(':') {
        Some(idx) => {
            let port = &authority[idx + 1..];
            let host = &authority[..idx];
            !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit())
                && (!host.starts_with('[') || host.ends_with(']'))
        }
        None => false,
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub repo_path: PathBuf,
    pub from: Option<String>,
    pub to: String,
    pub order: CommitOrder,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_response_tokens: u32,
    pub max_batch_tokens: usize,
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    pub format: OutputFormat,
    pub release: Option<String>,
    pub output: Option<PathBuf>,
    pub offline: bool,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model name must not be empty".to_string()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(Error::Config(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.to.trim().is_empty() {
            return Err(Error::Config("target revision must not be empty".to_string()));
        }
        if self.from.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(Error::Config("starting revision must not be empty".to_string()));
        }
        if self.concurrency_limit == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.max_batch_tokens < MIN_BATCH_TOKENS {
            return Err(Error::Config(format!(
                "max batch size must be at least {} tokens",
                MIN_BATCH_TOKENS
            )));
        }
        if self.retry.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_response_tokens == 0 {
            return Err(Error::Config("max response tokens must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Context a full batch needs: the batch itself, instructions and the reply.
    pub fn required_context_tokens(&self) -> usize {
        self.max_batch_tokens + PROMPT_OVERHEAD_TOKENS + self.max_response_tokens as usize
    }

    /// Rejects batch and reply budgets the model cannot hold.
    pub fn check_context_limit(&self, context_limit: usize) -> Result<()> {
        let required = self.required_context_tokens();
        if required > context_limit {
            return Err(Error::Config(format!(
                "max batch tokens ({}) plus {} prompt tokens and {} response tokens need a {}-token context, but the model allows {}",
                self.max_batch_tokens,
                PROMPT_OVERHEAD_TOKENS,
                self.max_response_tokens,
                required,
                context_limit
            )));
        }
        Ok(())
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            repo_path: PathBuf::from("."),
            from: None,
            to: "HEAD".to_string(),
            order: CommitOrder::OldestFirst,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: 0.2,
            max_response_tokens: 1_024,
            max_batch_tokens: config.max_batch_tokens,
            concurrency_limit: config.concurrency_limit,
            retry: RetryPolicy {
                timeout: Duration::from_secs(config.timeout_secs),
                ..RetryPolicy::default()
            },
            format: OutputFormat::Markdown,
            release: None,
            output: None,
            offline: false,
            show_progress: false,
        }
    }
}
