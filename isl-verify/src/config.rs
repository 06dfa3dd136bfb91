//! Verification options
//!
//! Options deserialize from TOML with per-field defaults, so a file only
//! needs the keys it changes.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    #[default]
    Terminal,
    Junit,
    Markdown,
}

impl ReportFormat {
    pub fn names() -> &'static [&'static str] {
        &["json", "terminal", "junit", "markdown"]
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "terminal" | "text" => Ok(ReportFormat::Terminal),
            "junit" | "junit-xml" | "xml" => Ok(ReportFormat::Junit),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => bail!(
                "unknown report format '{}', expected one of {}",
                other,
                Self::names().join(", ")
            ),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Json => "json",
            ReportFormat::Terminal => "terminal",
            ReportFormat::Junit => "junit",
            ReportFormat::Markdown => "markdown",
        };
        write!(f, "{}", name)
    }
}

/// Score thresholds for the gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_ship")]
    pub ship: f64,
    #[serde(default = "default_warn")]
    pub warn: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ship: default_ship(),
            warn: default_warn(),
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.ship) || !(0.0..=100.0).contains(&self.warn) {
            bail!("thresholds must be within 0..=100 (ship {}, warn {})", self.ship, self.warn);
        }
        if self.warn > self.ship {
            bail!("warn threshold {} exceeds ship threshold {}", self.warn, self.ship);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOptions {
    #[serde(default)]
    pub spec_path: PathBuf,

    /// Module that holds the target exports, one per behavior
    #[serde(default)]
    pub impl_path: String,

    #[serde(default)]
    pub project_root: Option<PathBuf>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_true")]
    pub parallel: bool,

    #[serde(default)]
    pub report_format: ReportFormat,

    #[serde(default = "default_true")]
    pub color: bool,

    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            spec_path: PathBuf::new(),
            impl_path: String::new(),
            project_root: None,
            timeout_ms: default_timeout_ms(),
            parallel: default_true(),
            report_format: ReportFormat::default(),
            color: default_true(),
            thresholds: Thresholds::default(),
        }
    }
}

impl VerifyOptions {
    pub fn new(spec_path: impl Into<PathBuf>, impl_path: impl Into<String>) -> Self {
        Self {
            spec_path: spec_path.into(),
            impl_path: impl_path.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be positive");
        }
        Ok(())
    }
}

fn default_ship() -> f64 { 80.0 }
fn default_warn() -> f64 { 50.0 }
fn default_timeout_ms() -> u64 { 5000 }
fn default_true() -> bool { true }

/// Load options from a TOML file, or defaults when no path is given
pub fn load_options(path: Option<&Path>) -> Result<VerifyOptions> {
    let options = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading options from {}", path.display()))?;
            toml::from_str::<VerifyOptions>(&content)
                .with_context(|| format!("parsing options in {}", path.display()))?
        }
        None => VerifyOptions::default(),
    };
    options.validate()?;
    Ok(options)
}

/// Save options as TOML
pub fn save_options(options: &VerifyOptions, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(options)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let options = load_options(None).unwrap();
        assert_eq!(options.thresholds.ship, 80.0);
        assert_eq!(options.thresholds.warn, 50.0);
        assert_eq!(options.timeout_ms, 5000);
        assert!(options.parallel);
        assert!(options.color);
        assert_eq!(options.report_format, ReportFormat::Terminal);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "impl_path = \"./src/bank\"\nreport_format = \"junit\"\n\n[thresholds]\nship = 90"
        )
        .unwrap();

        let options = load_options(Some(file.path())).unwrap();
        assert_eq!(options.impl_path, "./src/bank");
        assert_eq!(options.report_format, ReportFormat::Junit);
        assert_eq!(options.thresholds.ship, 90.0);
        assert_eq!(options.thresholds.warn, 50.0);
        assert_eq!(options.timeout_ms, 5000);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[thresholds]\nship = 40\nwarn = 60").unwrap();
        let err = load_options(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("exceeds ship threshold"));

        let over = Thresholds { ship: 120.0, warn: 50.0 };
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("isl.toml");
        let mut options = VerifyOptions::new("bank.isl", "./src/bank");
        options.parallel = false;
        save_options(&options, &path).unwrap();
        assert_eq!(load_options(Some(&path)).unwrap(), options);
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("XML".parse::<ReportFormat>().unwrap(), ReportFormat::Junit);
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert!("yaml".parse::<ReportFormat>().is_err());
    }
}
