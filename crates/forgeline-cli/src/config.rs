use std::path::PathBuf;

use serde::Deserialize;

/// On-disk configuration, loaded from `--config` (default `forgeline.toml`)
/// and then overridden field-by-field by the environment variables named
/// in the external-interfaces section: `USE_REAL_LM`, `LM_API_KEY`,
/// `LM_MODEL`, `BACKEND_HOST`, `BACKEND_PORT`, `OUTPUT_DIR`, `LOG_LEVEL`.
#[derive(Debug, Deserialize)]
pub struct ForgelineConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub lm: LmConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { output_dir: default_output_dir() }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { corpus_dir: default_corpus_dir() }
    }
}

#[derive(Debug, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_prompts_dir")]
    pub dir: PathBuf,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self { dir: default_prompts_dir() }
    }
}

#[derive(Debug, Deserialize)]
pub struct LmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Never logged; overridden by `LM_API_KEY` at process start, not
    /// persisted back to the config file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub use_real: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
            api_key: None,
            use_real: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./docs/rag")
}
fn default_prompts_dir() -> PathBuf {
    PathBuf::from("./prompts")
}
fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

impl Default for ForgelineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            retrieval: RetrievalConfig::default(),
            prompts: PromptsConfig::default(),
            lm: LmConfig::default(),
        }
    }
}

impl ForgelineConfig {
    /// Load from `path` if it exists, falling back to defaults otherwise,
    /// then apply environment overrides.
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(text) => toml::from_str(&text)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("USE_REAL_LM") {
            self.lm.use_real = value == "1" || value.eq_ignore_ascii_case("true");
        }
        if let Ok(value) = std::env::var("LM_API_KEY") {
            self.lm.api_key = Some(value);
        }
        if let Ok(value) = std::env::var("LM_MODEL") {
            self.lm.default_model = value;
        }
        if let Ok(value) = std::env::var("BACKEND_HOST") {
            self.server.host = value;
        }
        if let Ok(value) = std::env::var("BACKEND_PORT") {
            if let Ok(port) = value.parse() {
                self.server.port = port;
            }
        }
        if let Ok(value) = std::env::var("OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(value);
        }
    }
}
