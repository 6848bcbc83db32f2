use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Manages config directory and config file operations
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager with a custom config directory (primarily for testing)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Create a new ConfigManager for the given app name
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get path to a specific config file
    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    /// Ensure the config directory exists
    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// Generate default configuration template as a string with comments.
    /// All fields are commented out so defaults are used, but users can uncomment to override
    pub fn generate_default_config(&self) -> String {
        let config = AppConfig::default();
        // Inline arrays keep every field on one line so it can be commented out
        let toml_str = toml::to_string(&config)
            .unwrap_or_else(|e| panic!("Failed to serialize default config: {}", e));

        Self::comment_all_fields(toml_str, Self::collect_all_comments())
    }

    /// Collect all field comments from section constants into a map keyed by `section.field`
    fn collect_all_comments() -> HashMap<String, String> {
        let mut comments = HashMap::new();

        for (field, comment) in APP_COMMENTS {
            comments.insert(field.to_string(), comment.to_string());
        }
        for (field, comment) in REGISTRY_COMMENTS {
            comments.insert(format!("registry.{}", field), comment.to_string());
        }
        for (field, comment) in LOADING_COMMENTS {
            comments.insert(format!("loading.{}", field), comment.to_string());
        }
        for (field, comment) in QUERY_COMMENTS {
            comments.insert(format!("query.{}", field), comment.to_string());
        }
        for (field, comment) in LOGGING_COMMENTS {
            comments.insert(format!("logging.{}", field), comment.to_string());
        }

        comments
    }

    /// Comment out all fields in TOML and add comments.
    /// Also adds missing Option fields as commented-out `# field = null`
    fn comment_all_fields(toml: String, comments: HashMap<String, String>) -> String {
        let mut result = String::new();
        result.push_str("# dsbrowse configuration file\n");
        result
            .push_str("# This file uses TOML format. See https://toml.io/ for syntax reference.\n");
        result.push('\n');

        let mut current_section = String::new();
        let mut seen_fields: HashSet<String> = HashSet::new();

        for line in toml.lines() {
            if let Some(section) = Self::extract_section_name(line) {
                current_section = section.clone();
                if let Some(header) = SECTION_HEADERS.iter().find(|(s, _)| s == &section) {
                    result.push_str(header.1);
                    result.push('\n');
                }
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
                continue;
            }

            if let Some(field_path) = Self::extract_field_path(line, &current_section) {
                if let Some(comment) = comments.get(&field_path) {
                    for comment_line in comment.lines() {
                        result.push_str("# ");
                        result.push_str(comment_line);
                        result.push('\n');
                    }
                }
                seen_fields.insert(field_path);
                result.push_str("# ");
                result.push_str(line);
                result.push('\n');
            } else {
                result.push_str(line);
                result.push('\n');
            }
        }

        Self::add_missing_option_fields(result, &comments, &seen_fields)
    }

    /// Add Option fields that weren't serialized (because they're None)
    fn add_missing_option_fields(
        mut result: String,
        comments: &HashMap<String, String>,
        seen_fields: &HashSet<String>,
    ) -> String {
        let option_fields = ["registry.path", "loading.infer_schema_length"];

        for field_path in option_fields {
            if seen_fields.contains(field_path) {
                continue;
            }
            let Some((section, field_name)) = field_path.split_once('.') else {
                continue;
            };
            let section_header = format!("# [{}]\n", section);
            let Some(section_pos) = result.find(&section_header) else {
                continue;
            };

            let mut new_content = String::new();
            if let Some(comment) = comments.get(field_path) {
                for comment_line in comment.lines() {
                    new_content.push_str("# ");
                    new_content.push_str(comment_line);
                    new_content.push('\n');
                }
            }
            new_content.push_str(&format!("# {} = null\n", field_name));

            result.insert_str(section_pos + section_header.len(), &new_content);
        }

        result
    }

    /// Extract section name from TOML line like "[loading]"
    fn extract_section_name(line: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            Some(trimmed[1..trimmed.len() - 1].to_string())
        } else {
            None
        }
    }

    /// Extract `section.field` from a line like `default_page_size = 10`
    fn extract_field_path(line: &str, current_section: &str) -> Option<String> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('[') {
            return None;
        }

        let (field_name, _) = trimmed.split_once('=')?;
        let field_name = field_name.trim();
        if current_section.is_empty() {
            Some(field_name.to_string())
        } else {
            Some(format!("{}.{}", current_section, field_name))
        }
    }

    /// Write default configuration to config file
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, self.generate_default_config())?;

        Ok(config_path)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration format version (for future compatibility)
    pub version: String,
    pub registry: RegistryConfig,
    pub loading: LoadingConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

const APP_COMMENTS: &[(&str, &str)] = &[(
    "version",
    "Configuration format version (for future compatibility)",
)];

const SECTION_HEADERS: &[(&str, &str)] = &[
    (
        "registry",
        "# ============================================================================\n# Dataset Registry\n# ============================================================================",
    ),
    (
        "loading",
        "# ============================================================================\n# Table Loading\n# ============================================================================",
    ),
    (
        "query",
        "# ============================================================================\n# Queries\n# ============================================================================",
    ),
    (
        "logging",
        "# ============================================================================\n# Logging\n# ============================================================================",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry flat file. null = <data dir>/dsbrowse/datasets.json
    pub path: Option<String>,
}

const REGISTRY_COMMENTS: &[(&str, &str)] = &[(
    "path",
    "Path of the dataset registry file\nnull = <data dir>/dsbrowse/datasets.json",
)];

/// Source files that are known duplicates of other metadata files or are known to be broken
pub const DEFAULT_EXCLUDED_FILES: &[&str] = &["meta_clips.csv", "meta_info_fmin1_fmax1.csv"];

/// Column names recognised as a source file's identifying column, in priority order
pub const DEFAULT_ID_COLUMNS: &[&str] = &["path", "video_path", "filename", "file"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    pub excluded_files: Vec<String>,
    pub id_columns: Vec<String>,
    pub infer_schema_length: Option<usize>,
    pub sort_sources: bool,
}

const LOADING_COMMENTS: &[(&str, &str)] = &[
    (
        "excluded_files",
        "Source file names that are never merged into a table",
    ),
    (
        "id_columns",
        "Column names treated as a source file's identifying column (renamed to \"path\")\nThe first column of the file is used when none of these is present",
    ),
    (
        "infer_schema_length",
        "Number of rows used to infer CSV column types\n0 = scan the whole file",
    ),
    (
        "sort_sources",
        "Merge source files in file-name order so that merge precedence is deterministic",
    ),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: usize,
}

const QUERY_COMMENTS: &[(&str, &str)] = &[(
    "default_page_size",
    "Page size used when a query does not specify page_size",
)];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

const LOGGING_COMMENTS: &[(&str, &str)] = &[(
    "level",
    "Log level (trace, debug, info, warn, error, off) or a filter such as \"info,dsbrowse=debug\"\nRUST_LOG overrides this when set",
)];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            registry: RegistryConfig::default(),
            loading: LoadingConfig::default(),
            query: QueryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            excluded_files: DEFAULT_EXCLUDED_FILES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            id_columns: DEFAULT_ID_COLUMNS.iter().map(|s| s.to_string()).collect(),
            infer_schema_length: Some(10_000),
            sort_sources: true,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// Configuration loading and merging
impl AppConfig {
    /// Load configuration from all layers (default → user)
    pub fn load(app_name: &str) -> Result<Self> {
        let config_path = ConfigManager::new(app_name)?.config_path("config.toml");
        Self::load_from(&config_path)
    }

    /// Load defaults merged with the config file at `config_path`, if it exists
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = AppConfig::default();

        if config_path.exists() {
            let content = std::fs::read_to_string(config_path).map_err(|e| {
                eyre!(
                    "Failed to read config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            let user_config: AppConfig = toml::from_str(&content).map_err(|e| {
                eyre!(
                    "Failed to parse config file at {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            config.merge(user_config);
        }

        config.validate().map_err(|e| {
            eyre!(
                "Invalid configuration in {}: {}",
                config_path.display(),
                e
            )
        })?;

        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        self.registry.merge(other.registry);
        self.loading.merge(other.loading);
        self.query.merge(other.query);
        self.logging.merge(other.logging);
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        if self.query.default_page_size == 0 {
            return Err(eyre!("query.default_page_size must be greater than 0"));
        }

        if self.loading.id_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(eyre!("loading.id_columns must not contain empty names"));
        }

        if let Err(e) = crate::logging::level_filter(&self.logging.level) {
            return Err(eyre!("logging.level: {}", e));
        }

        Ok(())
    }

    /// Registry file location: configured path, or the platform data directory
    pub fn registry_path(&self, app_name: &str) -> Result<PathBuf> {
        if let Some(path) = &self.registry.path {
            return Ok(PathBuf::from(path));
        }
        Ok(dirs::data_dir()
            .ok_or_else(|| eyre!("Could not determine data directory"))?
            .join(app_name)
            .join("datasets.json"))
    }
}

// Merge implementations for each config section
impl RegistryConfig {
    pub fn merge(&mut self, other: Self) {
        if other.path.is_some() {
            self.path = other.path;
        }
    }
}

impl LoadingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = LoadingConfig::default();
        if other.excluded_files != default.excluded_files {
            self.excluded_files = other.excluded_files;
        }
        if other.id_columns != default.id_columns {
            self.id_columns = other.id_columns;
        }
        if other.infer_schema_length != default.infer_schema_length {
            self.infer_schema_length = other.infer_schema_length;
        }
        if other.sort_sources != default.sort_sources {
            self.sort_sources = other.sort_sources;
        }
    }
}

impl QueryConfig {
    pub fn merge(&mut self, other: Self) {
        let default = QueryConfig::default();
        if other.default_page_size != default.default_page_size {
            self.default_page_size = other.default_page_size;
        }
    }
}

impl LoggingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = LoggingConfig::default();
        if other.level != default.level {
            self.level = other.level;
        }
    }
}
