pub mod cli;
pub mod toml_config;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";

#[cfg(feature = "cli")]
use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::utils::validation::{
    self, Validate,
};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "reqlint")]
#[command(about = "A small audit tool for pip-style requirements manifests")]
pub struct CliConfig {
    #[arg(long, default_value = "requirements-dev.txt")]
    pub manifest: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    /// 排除清單，逗號分隔
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    #[arg(long, default_value = DEFAULT_INDEX_URL)]
    pub index_url: String,

    #[arg(long, help = "Verify every package exists on the package index")]
    pub check_registry: bool,

    #[arg(long, help = "Verify every git source is fetchable")]
    pub check_sources: bool,

    #[arg(long, help = "Freeze snapshot file for the exclusion scan")]
    pub freeze_file: Option<String>,

    #[arg(long, help = "Capture the snapshot by running 'python -m pip freeze'")]
    pub freeze_from_env: bool,

    #[arg(long, default_value = "5")]
    pub concurrent_requests: usize,

    #[arg(long, default_value = "20")]
    pub git_timeout: u64,

    #[arg(long, help = "Write plain report files instead of a zip bundle")]
    pub no_compress: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Enable system monitoring")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> crate::utils::error::Result<()> {
        validation::validate_path("manifest", &self.manifest)?;
        validation::validate_path("output_path", &self.output_path)?;
        validation::validate_url("index_url", &self.index_url)?;
        validation::validate_package_names("exclude", &self.exclude)?;
        validation::validate_positive_number("concurrent_requests", self.concurrent_requests, 1)?;
        validation::validate_range("git_timeout", self.git_timeout, 1, 600)?;
        if let Some(freeze_file) = &self.freeze_file {
            validation::validate_path("freeze_file", freeze_file)?;
        }
        Ok(())
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn manifest_path(&self) -> &str {
        &self.manifest
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn excluded_packages(&self) -> &[String] {
        &self.exclude
    }

    fn index_url(&self) -> &str {
        &self.index_url
    }

    fn check_registry(&self) -> bool {
        self.check_registry
    }

    fn check_sources(&self) -> bool {
        self.check_sources
    }

    fn freeze_file(&self) -> Option<&str> {
        self.freeze_file.as_deref()
    }

    fn freeze_from_env(&self) -> bool {
        self.freeze_from_env
    }

    fn concurrent_requests(&self) -> usize {
        self.concurrent_requests
    }

    fn git_timeout_seconds(&self) -> u64 {
        self.git_timeout
    }

    fn compress_output(&self) -> bool {
        !self.no_compress
    }
}
