use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::category::{parse_category_list, FallbackCategory};
use crate::services::filing_service::CategoryPathResolver;

pub const DEFAULT_CONFIG_FILE: &str = "config.ini";
pub const DEFAULT_BATCH_SIZE: usize = 30;
pub const DEFAULT_PORT: u16 = 5180;
const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

const DEFAULT_CONFIG_TEMPLATE: &str = "[API]
api_key = your_api_key_here
base_url = https://api.deepseek.com
model = deepseek-chat

[CLASSIFICATION]
# Comma-separated labels. The last one receives files that cannot be classified.
categories = notes,essays,history,math,computing,courses,other
category_descriptions =
# label:path pairs separated by ';' or on indented lines below. Relative paths resolve against the working directory.
category_paths = notes:../notes; math:../study/math

[PATHS]
source_folder = ./source_files
target_base_folder = ./classified_files

[SETTINGS]
api_timeout = 30
max_retries = 3
batch_size = 30
# Comma-separated extensions to scan, empty scans every file.
extensions =
port = 5180
";

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_source_folder() -> PathBuf {
    PathBuf::from("./source_files")
}

fn default_target_base_folder() -> PathBuf {
    PathBuf::from("./classified_files")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ClassificationSection {
    #[serde(default)]
    categories: String,
    #[serde(default)]
    category_descriptions: String,
    #[serde(default)]
    category_paths: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PathsSection {
    #[serde(default = "default_source_folder")]
    source_folder: PathBuf,
    #[serde(default = "default_target_base_folder")]
    target_base_folder: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            source_folder: default_source_folder(),
            target_base_folder: default_target_base_folder(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingsSection {
    /// Seconds allowed for one classification request.
    #[serde(default = "SettingsSection::default_api_timeout")]
    pub api_timeout: u64,
    #[serde(default = "SettingsSection::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "SettingsSection::default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub fallback_category: Option<String>,
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    #[serde(default)]
    pub extensions: String,
    #[serde(default = "SettingsSection::default_port")]
    pub port: u16,
}

impl SettingsSection {
    fn default_api_timeout() -> u64 {
        30
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_batch_size() -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn default_port() -> u16 {
        DEFAULT_PORT
    }
}

impl Default for SettingsSection {
    fn default() -> Self {
        Self {
            api_timeout: Self::default_api_timeout(),
            max_retries: Self::default_max_retries(),
            batch_size: Self::default_batch_size(),
            fallback_category: None,
            journal_path: None,
            extensions: String::new(),
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default, alias = "API")]
    api: Option<ApiSection>,
    #[serde(default, alias = "CLASSIFICATION")]
    classification: ClassificationSection,
    #[serde(default, alias = "PATHS")]
    paths: PathsSection,
    #[serde(default, alias = "SETTINGS")]
    settings: SettingsSection,
}

impl RawConfig {
    fn with_api_key(mut self, api_key: Option<&str>) -> Self {
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let api = self.api.get_or_insert_with(|| ApiSection {
                api_key: String::new(),
                base_url: default_base_url(),
                model: default_model(),
            });
            api.api_key = key.to_string();
        }
        self
    }
}

/// Validated configuration for one process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiSection,
    pub categories: Vec<String>,
    pub category_descriptions: String,
    pub category_paths: BTreeMap<String, String>,
    pub source_folder: PathBuf,
    pub target_base_folder: PathBuf,
    pub settings: SettingsSection,
    pub fallback: FallbackCategory,
}

impl AppConfig {
    /// Loads `path`. A missing file is replaced by a template and reported as an error.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        Self::load_with_api_key(path, None)
    }

    /// Like [`AppConfig::load`], with `api_key` taking precedence over the file's key.
    pub fn load_with_api_key(path: &Path, api_key: Option<&str>) -> Result<Self, AppError> {
        if !path.exists() {
            write_default_config(path)?;
            return Err(AppError::Config(format!(
                "{} did not exist; a template was written, set api_key and categories before running again",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        Self::from_raw(read_raw(&text)?.with_api_key(api_key))
    }

    pub fn from_ini_str(text: &str) -> Result<Self, AppError> {
        Self::from_raw(read_raw(text)?)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, AppError> {
        let api = raw
            .api
            .ok_or_else(|| AppError::Config("missing [API] section".to_string()))?;
        let key = api.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            return Err(AppError::Config(
                "api_key is not set in the [API] section".to_string(),
            ));
        }

        let categories = parse_category_list(&raw.classification.categories);
        if categories.is_empty() {
            return Err(AppError::Config(
                "no categories configured in [CLASSIFICATION]".to_string(),
            ));
        }

        let fallback = FallbackCategory::from_setting(raw.settings.fallback_category.as_deref());
        if fallback.resolve(&categories).is_none() {
            return Err(AppError::Config(format!(
                "fallback_category {fallback:?} is not one of the configured categories"
            )));
        }

        if raw.settings.batch_size == 0 {
            return Err(AppError::Config("batch_size must be at least 1".to_string()));
        }

        Ok(Self {
            api,
            categories,
            category_descriptions: raw.classification.category_descriptions.trim().to_string(),
            category_paths: parse_category_paths(&raw.classification.category_paths),
            source_folder: raw.paths.source_folder,
            target_base_folder: raw.paths.target_base_folder,
            settings: raw.settings,
            fallback,
        })
    }

    pub fn resolver(&self) -> CategoryPathResolver {
        CategoryPathResolver::new(&self.target_base_folder, self.category_paths.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.api_timeout.max(1))
    }

    /// Extension filter for scans; empty means every file.
    pub fn extensions(&self) -> Vec<String> {
        parse_category_list(&self.settings.extensions)
    }

    pub fn fallback_index(&self) -> usize {
        self.fallback
            .resolve(&self.categories)
            .unwrap_or(self.categories.len().saturating_sub(1))
    }

    /// Configuration as shown to HTTP clients, with the API key masked.
    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "api": {
                "api_key": mask_key(&self.api.api_key),
                "base_url": self.api.base_url,
                "model": self.api.model,
            },
            "classification": {
                "categories": self.categories,
                "category_descriptions": self.category_descriptions,
                "category_paths": self.category_paths,
            },
            "paths": {
                "source_folder": self.source_folder,
                "target_base_folder": self.target_base_folder,
            },
            "settings": self.settings,
        })
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn read_raw(text: &str) -> Result<RawConfig, AppError> {
    let text = join_continuation_lines(text);
    Ok(Config::builder()
        .add_source(File::from_str(&text, FileFormat::Ini))
        .build()?
        .try_deserialize()?)
}

/// Folds indented lines without `=` into the value of the key above them and
/// drops comment lines.
///
/// The INI reader has no continuation lines, so a multi-line `category_paths`
/// would otherwise lose everything after its first line. Continuations of
/// `category_paths` are joined with `;`, other keys with a space.
fn join_continuation_lines(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut open_key: Option<(usize, bool)> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(['#', ';']) {
            continue;
        }
        let indented = line.starts_with([' ', '\t']);

        if let Some((at, paths)) = open_key {
            if indented && !trimmed.is_empty() && !trimmed.contains('=') {
                let value = &mut lines[at];
                let separator = match value.trim_end().ends_with('=') {
                    false if paths => "; ",
                    _ => " ",
                };
                value.push_str(separator);
                value.push_str(trimmed);
                continue;
            }
        }

        open_key = match trimmed.split_once('=') {
            Some((key, _)) if !trimmed.starts_with('[') => {
                Some((lines.len(), key.trim() == "category_paths"))
            }
            _ if trimmed.is_empty() => open_key,
            _ => None,
        };
        lines.push(line.to_string());
    }

    let mut joined = lines.join("\n");
    joined.push('\n');
    joined
}

/// Parses `label:path` pairs separated by newlines or `;`. Entries without a label or path are ignored.
pub fn parse_category_paths(text: &str) -> BTreeMap<String, String> {
    text.split(['\n', ';'])
        .filter_map(|entry| {
            let (label, path) = entry.trim().split_once(':')?;
            let (label, path) = (label.trim(), path.trim());
            if label.is_empty() || path.is_empty() {
                return None;
            }
            Some((label.to_string(), path.to_string()))
        })
        .collect()
}

pub fn write_default_config(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!(path = %path.display(), "wrote default configuration");
    Ok(())
}
