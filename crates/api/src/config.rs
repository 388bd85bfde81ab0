use anyhow::{Context, Result, bail};
use extract::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Path of the optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "EXTRACTOR_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub output_dir: PathBuf,
    pub log_format: LogFormat,
    /// Delete input files that are too short to extract from
    pub remove_rejected_inputs: bool,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    Groq,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: Option<String>,
    pub model: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            output_dir: PathBuf::from("./output"),
            log_format: LogFormat::Pretty,
            remove_rejected_inputs: false,
            cache: CacheConfig::default(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            base_url: None,
            model: None,
            api_key: None,
            temperature: extract::groq::DEFAULT_TEMPERATURE,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmConfig {
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, LlmProvider::Ollama) => extract::OllamaClient::DEFAULT_BASE_URL,
            (None, LlmProvider::Groq) => extract::groq::DEFAULT_BASE_URL,
        }
    }

    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, LlmProvider::Ollama) => "llama3",
            (None, LlmProvider::Groq) => extract::groq::DEFAULT_MODEL,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file named by `EXTRACTOR_CONFIG`, then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// `lookup` stands in for `std::env::var` so tests never touch the
    /// process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GROQ_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        self.bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind_addr {:?}", self.bind_addr))?;

        if self.cache.enabled && self.cache.max_entries == 0 {
            bail!("cache.max_entries must be greater than zero when the cache is enabled");
        }

        if self.llm.provider == LlmProvider::Groq
            && self.llm.api_key.as_deref().is_none_or(str::is_empty)
        {
            bail!("the groq provider needs an API key (set GROQ_API_KEY)");
        }

        Ok(())
    }
}
