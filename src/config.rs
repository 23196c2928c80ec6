use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::CategorySet;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no category labels configured")]
    NoLabels,
    #[error("duplicate category label: {0}")]
    DuplicateLabel(String),
    #[error("precedence must list every label exactly once, got {0:?}")]
    PrecedenceMismatch(Vec<String>),
    #[error("classifier input_size must be positive")]
    InvalidInputSize,
}

fn default_duration_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Tie-break order. Defaults to the classifier label order.
    #[serde(default)]
    pub precedence: Option<Vec<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            precedence: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub device: i32,
}

fn default_model_path() -> String {
    "models/gender.onnx".to_string()
}

fn default_labels() -> Vec<String> {
    vec!["Woman".to_string(), "Man".to_string()]
}

fn default_input_size() -> u32 {
    224
}

fn default_min_face_size() -> i32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_mean() -> [f32; 3] {
    [0.0, 0.0, 0.0]
}

fn default_std() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_intra_threads() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Local path or http(s) URL of an ONNX model.
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// Category labels in model output order.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Haar cascade XML. Without it the whole frame is classified.
    #[serde(default)]
    pub face_cascade: Option<PathBuf>,
    #[serde(default = "default_min_face_size")]
    pub min_face_size: i32,
    #[serde(default = "default_true")]
    pub apply_softmax: bool,
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    #[serde(default = "default_std")]
    pub std: [f32; 3],
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            labels: default_labels(),
            input_size: default_input_size(),
            face_cascade: None,
            min_face_size: default_min_face_size(),
            apply_softmax: true,
            mean: default_mean(),
            std: default_std(),
            intra_threads: default_intra_threads(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_results_path() -> PathBuf {
    PathBuf::from("data/sessions.jsonl")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_results_path")]
    pub path: PathBuf,
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_results_path(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    /// Loads `config.toml` from the working directory, falling back to
    /// defaults when it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        if !Path::new(DEFAULT_CONFIG_PATH).exists() {
            tracing::info!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
            let config = Config::default();
            config.categories()?;
            return Ok(config);
        }
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        if config.classifier.input_size == 0 {
            return Err(ConfigError::InvalidInputSize);
        }
        config.categories()?;

        Ok(config)
    }

    /// Category set in tie-break order.
    pub fn categories(&self) -> Result<CategorySet, ConfigError> {
        let labels = &self.classifier.labels;
        if labels.is_empty() {
            return Err(ConfigError::NoLabels);
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(ConfigError::DuplicateLabel(label.clone()));
            }
        }

        let order = match &self.session.precedence {
            Some(precedence) => {
                let is_permutation = precedence.len() == labels.len()
                    && labels.iter().all(|l| precedence.contains(l));
                if !is_permutation {
                    return Err(ConfigError::PrecedenceMismatch(precedence.clone()));
                }
                precedence.clone()
            }
            None => labels.clone(),
        };

        CategorySet::new(order).ok_or(ConfigError::NoLabels)
    }
}
