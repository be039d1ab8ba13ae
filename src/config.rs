use crate::heuristics::NoiseFilter;
use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{DocumentMut, value};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = ".config/receipts.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub noise: NoiseConfig,
}

fn default_db_path() -> String {
    "receipts/receipts.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

fn default_ocr_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_health_timeout_secs() -> u64 {
    3
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: default_ocr_url(),
            timeout_secs: default_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

/// Vocabulary for lines that are never items (totals, tax, headers, ...).
#[derive(Debug, Deserialize)]
pub struct NoiseConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Appended to `keywords`, so a config can extend the defaults without restating them.
    #[serde(default)]
    pub extra_keywords: Vec<String>,
}

fn default_keywords() -> Vec<String> {
    crate::heuristics::DEFAULT_KEYWORDS
        .iter()
        .map(|k| k.to_string())
        .collect()
}

fn default_patterns() -> Vec<String> {
    crate::heuristics::DEFAULT_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            patterns: default_patterns(),
            extra_keywords: Vec::new(),
        }
    }
}

impl NoiseConfig {
    pub fn build_filter(&self) -> Result<NoiseFilter, regex::Error> {
        NoiseFilter::new(
            self.keywords.iter().chain(&self.extra_keywords),
            &self.patterns,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ocr: OcrConfig::default(),
            db_path: default_db_path(),
            log_level: default_log_level(),
            noise: NoiseConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like `load`, but a missing file means "all defaults".
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// `OCR_API_URL` wins over the file, same as the web front end's env var.
    pub fn apply_env_override(&mut self, ocr_api_url: Option<String>) {
        if let Some(url) = ocr_api_url.filter(|u| !u.trim().is_empty()) {
            self.ocr.base_url = url;
        }
    }

    pub fn update_ocr_url(
        path: impl AsRef<Path>,
        new_url: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        let content = if path.exists() {
            fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        if !doc.contains_key("ocr") {
            doc["ocr"] = toml_edit::table();
        }
        doc["ocr"]["base_url"] = value(new_url);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, doc.to_string())?;
        info!(path = %path.display(), url = %new_url, "OCR base URL updated");
        Ok(())
    }
}
