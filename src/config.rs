//! Engine configuration and file filtering rules.
//!
//! Configuration is stored in TOML. Every key is optional; omitted keys take
//! the defaults shown below.
//!
//! ```toml
//! log_dir = "logs"
//! workers = 8
//!
//! [size]
//! buckets = [
//!   { name = "Small", below_mb = 10 },
//!   { name = "Medium", below_mb = 100 },
//!   { name = "Large" },
//! ]
//!
//! [videos]
//! long_threshold_minutes = 20
//! target_dir = "LongVideos"
//!
//! [probe]
//! signature_bytes = 8192
//!
//! [collisions]
//! max_attempts = 10000
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```
//!
//! Filter patterns are matched against paths relative to the folder being
//! organized.

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Smallest prefix that still covers every signature `infer` knows about.
const MIN_SIGNATURE_BYTES: usize = 262;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// A configured folder name is not a single plain path component.
    #[error("Invalid folder name '{value}' for {field}: must be a single folder name")]
    InvalidFolderName { field: &'static str, value: String },
    /// The size bucket list is malformed.
    #[error("Invalid size buckets: {0}")]
    InvalidBuckets(&'static str),
    /// A numeric setting is out of range.
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: &'static str,
    },
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Complete configuration for a reorganization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where audit logs are written. Relative paths resolve against the
    /// working directory.
    pub log_dir: PathBuf,
    /// Worker threads for probing and execution. Defaults to min(8, CPUs).
    pub workers: Option<usize>,
    pub size: SizeSettings,
    pub videos: VideoSettings,
    pub probe: ProbeSettings,
    pub collisions: CollisionSettings,
    pub filters: FilterRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            workers: None,
            size: SizeSettings::default(),
            videos: VideoSettings::default(),
            probe: ProbeSettings::default(),
            collisions: CollisionSettings::default(),
            filters: FilterRules::default(),
        }
    }
}

/// One size bucket. Files smaller than `below_mb` MiB land here; the last
/// bucket has no bound and takes everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBucket {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below_mb: Option<u64>,
}

impl SizeBucket {
    fn new(name: &str, below_mb: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            below_mb,
        }
    }

    /// Upper bound in bytes, exclusive.
    pub fn below_bytes(&self) -> Option<u64> {
        self.below_mb.map(|mb| mb.saturating_mul(MIB))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeSettings {
    pub buckets: Vec<SizeBucket>,
}

impl Default for SizeSettings {
    fn default() -> Self {
        Self {
            buckets: vec![
                SizeBucket::new("Small", Some(10)),
                SizeBucket::new("Medium", Some(100)),
                SizeBucket::new("Large", None),
            ],
        }
    }
}

impl SizeSettings {
    /// Returns the bucket a file of `size` bytes belongs to.
    pub fn bucket_for(&self, size: u64) -> Option<&SizeBucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.below_bytes().is_none_or(|limit| size < limit))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let Some((last, bounded)) = self.buckets.split_last() else {
            return Err(ConfigError::InvalidBuckets("at least one bucket is required"));
        };
        if last.below_mb.is_some() {
            return Err(ConfigError::InvalidBuckets(
                "the last bucket must have no upper bound",
            ));
        }

        let mut previous = 0;
        for bucket in bounded {
            match bucket.below_mb {
                None => {
                    return Err(ConfigError::InvalidBuckets(
                        "only the last bucket may omit below_mb",
                    ));
                }
                Some(limit) if limit <= previous => {
                    return Err(ConfigError::InvalidBuckets(
                        "bucket limits must be strictly increasing and above zero",
                    ));
                }
                Some(limit) => previous = limit,
            }
        }

        let mut seen = HashSet::new();
        for bucket in &self.buckets {
            validate_folder_name("size.buckets.name", &bucket.name)?;
            if !seen.insert(bucket.name.as_str()) {
                return Err(ConfigError::InvalidBuckets("bucket names must be unique"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Videos at least this long are moved.
    pub long_threshold_minutes: u64,
    /// Folder under the root that receives long videos.
    pub target_dir: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            long_threshold_minutes: 20,
            target_dir: "LongVideos".to_string(),
        }
    }
}

impl VideoSettings {
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.long_threshold_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// How many leading bytes are read for signature detection.
    pub signature_bytes: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            signature_bytes: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionSettings {
    /// Numbered alternatives tried before a file is given up on.
    pub max_attempts: u32,
}

impl Default for CollisionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10_000,
        }
    }
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

fn default_enable_hidden_files() -> bool {
    false
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp", "node_modules/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp", "log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns to exclude, matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.reshelfrc.toml` in the current directory
    /// 3. Look for `~/.config/reshelf/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// The loaded configuration is validated before it is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any loaded file fails to parse or validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::discover() {
                Some(path) => Self::load_from_file(&path)?,
                None => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let local_config = PathBuf::from(".reshelfrc.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let home = std::env::var("HOME").ok()?;
        let home_config = PathBuf::from(home)
            .join(".config")
            .join("reshelf")
            .join("config.toml");
        home_config.exists().then_some(home_config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text without validating it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Checks every setting that the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.size.validate()?;
        validate_folder_name("videos.target_dir", &self.videos.target_dir)?;

        if self.workers == Some(0) {
            return Err(ConfigError::InvalidSetting {
                field: "workers",
                reason: "must be at least 1",
            });
        }
        if self.probe.signature_bytes < MIN_SIGNATURE_BYTES {
            return Err(ConfigError::InvalidSetting {
                field: "probe.signature_bytes",
                reason: "must be at least 262",
            });
        }
        if self.collisions.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "collisions.max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "log_dir",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// Worker count after applying the default.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(8)
        })
    }

    /// Compile filter rules into optimized structures for matching.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Accepts only a single, plain folder name: no separators, no `.`/`..`,
/// nothing absolute.
fn validate_folder_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let mut components = Path::new(value).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == value
    );
    if single_normal && !value.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFolderName {
            field,
            value: value.to_string(),
        })
    }
}

/// Compiled, optimized filter structures for efficient file matching.
///
/// This struct pre-processes all filter rules (glob patterns, regex patterns, etc.)
/// into efficient data structures so that matching is O(1) or O(n) where n is the
/// number of rules, rather than reparsing patterns on each file.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Check if a file should be included in organization (not excluded).
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.matches_include_patterns(file_path) {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self.matches_exclude_patterns(file_path) {
            return false;
        }

        !self.matches_exclude_regex(&file_name)
    }

    /// Whether the walk should enter a directory (relative to the root).
    pub fn should_descend(&self, dir_path: &Path) -> bool {
        let hidden = dir_path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        self.enable_hidden_files || !hidden
    }

    fn matches_include_patterns(&self, file_path: &Path) -> bool {
        self.include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_patterns(&self, file_path: &Path) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
    }

    fn matches_exclude_regex(&self, file_name: &str) -> bool {
        self.exclude_regexes
            .iter()
            .any(|regex| regex.is_match(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(rules: FilterRules) -> CompiledFilters {
        Config {
            filters: rules,
            ..Config::default()
        }
        .compile_filters()
        .unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.filters.enable_hidden_files);
        assert_eq!(config.videos.threshold(), Duration::from_secs(20 * 60));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.log_dir, PathBuf::from("logs"));
        assert_eq!(config.size.buckets.len(), 3);
        assert_eq!(config.collisions.max_attempts, 10_000);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            workers = 2

            [videos]
            long_threshold_minutes = 8

            [size]
            buckets = [{ name = "FOLDER_10", below_mb = 10 }, { name = "FOLDER_MORE" }]

            [filters.exclude]
            extensions = ["bak"]
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count(), 2);
        assert_eq!(config.videos.threshold(), Duration::from_secs(480));
        assert_eq!(config.videos.target_dir, "LongVideos");
        assert_eq!(config.filters.exclude.extensions, vec!["bak".to_string()]);
    }

    #[test]
    fn test_bucket_for() {
        let size = SizeSettings::default();
        assert_eq!(size.bucket_for(0).unwrap().name, "Small");
        assert_eq!(size.bucket_for(10 * MIB - 1).unwrap().name, "Small");
        assert_eq!(size.bucket_for(10 * MIB).unwrap().name, "Medium");
        assert_eq!(size.bucket_for(100 * MIB).unwrap().name, "Large");
        assert_eq!(size.bucket_for(u64::MAX).unwrap().name, "Large");
    }

    #[test]
    fn test_bucket_validation() {
        let mut size = SizeSettings {
            buckets: vec![SizeBucket::new("A", Some(10)), SizeBucket::new("B", Some(5))],
        };
        assert!(size.validate().is_err());

        size.buckets = vec![
            SizeBucket::new("A", Some(10)),
            SizeBucket::new("B", Some(5)),
            SizeBucket::new("C", None),
        ];
        assert!(size.validate().is_err());

        size.buckets = vec![SizeBucket::new("A", None), SizeBucket::new("B", None)];
        assert!(size.validate().is_err());

        size.buckets = vec![SizeBucket::new("A", Some(1)), SizeBucket::new("A", None)];
        assert!(size.validate().is_err());

        size.buckets = vec![];
        assert!(size.validate().is_err());
    }

    #[test]
    fn test_folder_names_cannot_escape_root() {
        for bad in ["..", ".", "a/b", "/abs", "", "x\\y"] {
            assert!(
                validate_folder_name("test", bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
        assert!(validate_folder_name("test", "LongVideos").is_ok());
        assert!(validate_folder_name("test", "Long Videos").is_ok());

        let config = Config::from_toml("[videos]\ntarget_dir = \"../outside\"").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFolderName { .. })
        ));
    }

    #[test]
    fn test_out_of_range_settings() {
        let config = Config::from_toml("workers = 0").unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_toml("[probe]\nsignature_bytes = 16").unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_toml("[collisions]\nmax_attempts = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = Config::load(Some(Path::new("/non/existent/reshelf.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("workers = \"many\""),
            Err(ConfigError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let compiled = filters(FilterRules::default());

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new("sub/.gitignore")));
        assert!(!compiled.should_descend(Path::new(".git")));
        assert!(compiled.should_descend(Path::new("2019")));
    }

    #[test]
    fn test_hidden_file_included_when_enabled() {
        let compiled = filters(FilterRules {
            enable_hidden_files: true,
            ..FilterRules::default()
        });

        assert!(compiled.should_include(Path::new(".DS_Store")));
        assert!(compiled.should_descend(Path::new(".cache")));
    }

    #[test]
    fn test_exclude_exact_filename_and_extension() {
        let compiled = filters(FilterRules {
            enable_hidden_files: true,
            exclude: ExcludeRules {
                filenames: vec!["Thumbs.db".to_string()],
                extensions: vec!["bak".to_string()],
                ..Default::default()
            },
            include: IncludeRules::default(),
        });

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(!compiled.should_include(Path::new("file.BAK")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn test_glob_pattern_directory_boundary_semantics() {
        let compiled = filters(FilterRules {
            enable_hidden_files: true,
            exclude: ExcludeRules {
                patterns: vec!["**/logs/**".to_string()],
                ..Default::default()
            },
            include: IncludeRules::default(),
        });

        assert!(!compiled.should_include(Path::new("logs/file.txt")));
        assert!(!compiled.should_include(Path::new("app/logs/file.txt")));
        assert!(compiled.should_include(Path::new("my_logs/file.txt")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = filters(FilterRules {
            enable_hidden_files: false,
            exclude: ExcludeRules::default(),
            include: IncludeRules {
                patterns: vec![".important".to_string()],
            },
        });

        assert!(compiled.should_include(Path::new(".important")));
        assert!(!compiled.should_include(Path::new(".other")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = filters(FilterRules {
            enable_hidden_files: true,
            exclude: ExcludeRules {
                regex: vec![r"^test_.*\.txt$".to_string()],
                ..Default::default()
            },
            include: IncludeRules::default(),
        });

        assert!(!compiled.should_include(Path::new("test_file.txt")));
        assert!(compiled.should_include(Path::new("file.txt")));
    }

    #[test]
    fn test_invalid_patterns_return_error() {
        let mut config = Config::default();
        config.filters.exclude.regex = vec!["[invalid(".to_string()];
        assert!(matches!(
            config.compile_filters(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let mut config = Config::default();
        config.filters.exclude.patterns = vec!["[invalid".to_string()];
        assert!(matches!(
            config.compile_filters(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}
