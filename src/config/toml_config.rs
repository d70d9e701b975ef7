use crate::config::DEFAULT_INDEX_URL;
use crate::core::ConfigProvider;
use crate::utils::error::{LintError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub audit: AuditConfig,
    pub manifest: ManifestConfig,
    pub checks: Option<ChecksConfig>,
    pub exclusions: Option<ExclusionsConfig>,
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    pub path: String,
    pub freeze_file: Option<String>,
    pub freeze_from_env: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksConfig {
    pub registry: Option<RegistryConfig>,
    pub sources: Option<SourcesConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub enabled: bool,
    pub index_url: Option<String>,
    pub concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub enabled: bool,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionsConfig {
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    pub compress: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LintError::ConfigError {
            message: format!("cannot read '{}': {}", path, e),
        })?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LintError::ConfigError {
            message: format!("invalid TOML: {}", e),
        })
    }

    fn registry(&self) -> Option<&RegistryConfig> {
        self.checks.as_ref()?.registry.as_ref()
    }

    fn sources(&self) -> Option<&SourcesConfig> {
        self.checks.as_ref()?.sources.as_ref()
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().is_some_and(|m| m.enabled)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("audit.name", &self.audit.name)?;
        validation::validate_path("manifest.path", &self.manifest.path)?;
        validation::validate_path("output.path", &self.output.path)?;

        if let Some(exclusions) = &self.exclusions {
            validation::validate_package_names("exclusions.packages", &exclusions.packages)?;
        }
        if let Some(registry) = self.registry() {
            if let Some(index_url) = &registry.index_url {
                validation::validate_url("checks.registry.index_url", index_url)?;
            }
            if let Some(n) = registry.concurrent_requests {
                validation::validate_positive_number("checks.registry.concurrent_requests", n, 1)?;
            }
        }
        if let Some(sources) = self.sources() {
            if let Some(timeout) = sources.timeout_seconds {
                validation::validate_range("checks.sources.timeout_seconds", timeout, 1, 600)?;
            }
        }
        if let Some(freeze_file) = &self.manifest.freeze_file {
            validation::validate_path("manifest.freeze_file", freeze_file)?;
        }

        Ok(())
    }
}

impl ConfigProvider for TomlConfig {
    fn manifest_path(&self) -> &str {
        &self.manifest.path
    }

    fn output_path(&self) -> &str {
        &self.output.path
    }

    fn excluded_packages(&self) -> &[String] {
        self.exclusions
            .as_ref()
            .map(|e| e.packages.as_slice())
            .unwrap_or(&[])
    }

    fn index_url(&self) -> &str {
        self.registry()
            .and_then(|r| r.index_url.as_deref())
            .unwrap_or(DEFAULT_INDEX_URL)
    }

    fn check_registry(&self) -> bool {
        self.registry().is_some_and(|r| r.enabled)
    }

    fn check_sources(&self) -> bool {
        self.sources().is_some_and(|s| s.enabled)
    }

    fn freeze_file(&self) -> Option<&str> {
        self.manifest.freeze_file.as_deref()
    }

    fn freeze_from_env(&self) -> bool {
        self.manifest.freeze_from_env.unwrap_or(false)
    }

    fn concurrent_requests(&self) -> usize {
        self.registry()
            .and_then(|r| r.concurrent_requests)
            .unwrap_or(5)
    }

    fn git_timeout_seconds(&self) -> u64 {
        self.sources().and_then(|s| s.timeout_seconds).unwrap_or(20)
    }

    fn compress_output(&self) -> bool {
        self.output.compress.unwrap_or(true)
    }
}
