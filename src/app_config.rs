//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use consearch_core::Settings;

/// Prefix of every environment variable the binary reads.
pub const ENV_PREFIX: &str = "CONSEARCH_";

/// File configuration for resolver credentials and defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// ISBNdb API key; the ISBNdb resolver is only registered when set.
    pub isbndb_api_key: Option<String>,
    pub google_books_api_key: Option<String>,
    /// Semantic Scholar API key; the resolver is only registered when set.
    pub semantic_scholar_api_key: Option<String>,
    /// Contact email sent to Crossref.
    pub crossref_email: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Requests per second applied to every resolver instead of its own limit.
    pub default_rate_limit_rps: Option<f64>,
    /// Deadline for a whole fallback chain in seconds.
    pub total_timeout_secs: Option<u64>,
    pub min_reliability: Option<f64>,
    /// Minimum title similarity for the best match.
    pub fuzzy_match_threshold: Option<f64>,
    /// Query every source instead of stopping at the first hit.
    pub all_sources: Option<bool>,
    /// Run sources concurrently when querying all of them.
    pub parallel: Option<bool>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs, 3600)?;
        validate_timeout_secs("request_timeout_secs", self.request_timeout_secs, 3600)?;
        validate_timeout_secs("total_timeout_secs", self.total_timeout_secs, 600)?;

        if let Some(rps) = self.default_rate_limit_rps
            && !(rps > 0.0 && rps <= 1000.0)
        {
            bail!("Invalid config value for `default_rate_limit_rps`: {rps}. Expected range: (0, 1000]");
        }
        validate_unit_interval("min_reliability", self.min_reliability)?;
        validate_unit_interval("fuzzy_match_threshold", self.fuzzy_match_threshold)?;
        if let Some(email) = &self.crossref_email
            && email.chars().any(char::is_control)
        {
            bail!("Invalid config value for `crossref_email`: control characters are not allowed");
        }

        Ok(())
    }

    /// Overlays `CONSEARCH_*` variables looked up through `lookup`.
    ///
    /// Empty variables are ignored. The result is validated again.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|value| (name, value))
        };

        if let Some((_, value)) = var("ISBNDB_API_KEY") {
            self.isbndb_api_key = Some(value);
        }
        if let Some((_, value)) = var("GOOGLE_BOOKS_API_KEY") {
            self.google_books_api_key = Some(value);
        }
        if let Some((_, value)) = var("SEMANTIC_SCHOLAR_API_KEY") {
            self.semantic_scholar_api_key = Some(value);
        }
        if let Some((_, value)) = var("CROSSREF_EMAIL") {
            self.crossref_email = Some(value);
        }
        if let Some((name, value)) = var("DEFAULT_RATE_LIMIT_RPS") {
            let parsed = parse_float(&value).with_context(|| format!("Invalid `{name}` value"))?;
            self.default_rate_limit_rps = Some(parsed);
        }
        if let Some((name, value)) = var("TOTAL_TIMEOUT_SECS") {
            let parsed = parse_integer_u64(&value).with_context(|| format!("Invalid `{name}` value"))?;
            self.total_timeout_secs = Some(parsed);
        }

        self.validate()
    }

    /// Library settings with every configured value applied over the defaults.
    #[must_use]
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings {
            isbndb_api_key: self.isbndb_api_key.clone(),
            google_books_api_key: self.google_books_api_key.clone(),
            semantic_scholar_api_key: self.semantic_scholar_api_key.clone(),
            crossref_email: self.crossref_email.clone(),
            default_rate_limit_rps: self.default_rate_limit_rps,
            ..Settings::default()
        };
        if let Some(secs) = self.connect_timeout_secs {
            settings.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.total_timeout_secs {
            settings.fallback.total_timeout = Duration::from_secs(secs);
        }
        if let Some(score) = self.min_reliability {
            settings.fallback.min_reliability_score = score;
        }
        if let Some(threshold) = self.fuzzy_match_threshold {
            settings.fuzzy_match_threshold = threshold;
        }
        if self.all_sources == Some(true) {
            settings.fallback = settings.fallback.all_sources(self.parallel == Some(true));
        }
        settings
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..={max}");
    }
    Ok(())
}

fn validate_unit_interval(field: &str, value: Option<f64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(0.0..=1.0).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 0.0..=1.0");
    }
    Ok(())
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config, or the defaults when no file was read.
    pub config: FileConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/consearch/config.toml`
/// 2. `$HOME/.config/consearch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("consearch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("consearch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` or, without one, from the default path if present.
///
/// An explicit path must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    let Some(path_ref) = path.as_deref().filter(|path| path.exists()) else {
        return Ok(LoadedConfig {
            path,
            config: FileConfig::default(),
            loaded_from_file: false,
        });
    };

    let config = load_file_config(path_ref)?;
    Ok(LoadedConfig {
        path,
        config,
        loaded_from_file: true,
    })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "isbndb_api_key" => {
                cfg.isbndb_api_key = Some(parse_string_literal(value).with_context(context)?);
            }
            "google_books_api_key" => {
                cfg.google_books_api_key = Some(parse_string_literal(value).with_context(context)?);
            }
            "semantic_scholar_api_key" => {
                cfg.semantic_scholar_api_key =
                    Some(parse_string_literal(value).with_context(context)?);
            }
            "crossref_email" => {
                cfg.crossref_email = Some(parse_string_literal(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "total_timeout_secs" => {
                cfg.total_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "default_rate_limit_rps" => {
                cfg.default_rate_limit_rps = Some(parse_float(value).with_context(context)?);
            }
            "min_reliability" => {
                cfg.min_reliability = Some(parse_float(value).with_context(context)?);
            }
            "fuzzy_match_threshold" => {
                cfg.fuzzy_match_threshold = Some(parse_float(value).with_context(context)?);
            }
            "all_sources" => {
                cfg.all_sources = Some(parse_boolean(value).with_context(context)?);
            }
            "parallel" => {
                cfg.parallel = Some(parse_boolean(value).with_context(context)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let Some(inner) = raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        bail!("Expected double-quoted string");
    };
    Ok(inner.to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_float(raw_value: &str) -> Result<f64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected numeric value");
    }
    let value = token.parse::<f64>()?;
    if !value.is_finite() {
        bail!("Expected a finite number");
    }
    Ok(value)
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
