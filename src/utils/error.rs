use thiserror::Error;

#[derive(Error, Debug)]
pub enum LintError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Registry request failed: {0}")]
    RegistryError(#[from] reqwest::Error),

    #[error("CSV report error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Manifest error in '{path}': {message}")]
    ManifestError { path: String, message: String },

    #[error("Subprocess '{command}' failed: {message}")]
    ProcessError { command: String, message: String },

    #[error("Report generation error: {message}")]
    ReportError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Manifest,
    Network,
    Process,
    Io,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl LintError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LintError::ConfigError { .. }
            | LintError::MissingConfigError { .. }
            | LintError::InvalidConfigValueError { .. }
            | LintError::ValidationError { .. } => ErrorCategory::Configuration,
            LintError::ManifestError { .. } => ErrorCategory::Manifest,
            LintError::RegistryError(_) => ErrorCategory::Network,
            LintError::ProcessError { .. } => ErrorCategory::Process,
            LintError::IoError(_) => ErrorCategory::Io,
            LintError::ZipError(_)
            | LintError::CsvError(_)
            | LintError::SerializationError(_)
            | LintError::ReportError { .. } => ErrorCategory::Report,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 配置錯誤使用者可以自行修正
            LintError::ConfigError { .. }
            | LintError::MissingConfigError { .. }
            | LintError::InvalidConfigValueError { .. }
            | LintError::ValidationError { .. } => ErrorSeverity::High,
            // 網路錯誤通常重試即可
            LintError::RegistryError(_) => ErrorSeverity::Medium,
            LintError::ManifestError { .. } => ErrorSeverity::High,
            LintError::ProcessError { .. } => ErrorSeverity::Medium,
            LintError::IoError(_) => ErrorSeverity::Critical,
            LintError::ZipError(_)
            | LintError::CsvError(_)
            | LintError::SerializationError(_)
            | LintError::ReportError { .. } => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            LintError::ConfigError { .. } | LintError::InvalidConfigValueError { .. } => {
                "Check the configuration values and try again".to_string()
            }
            LintError::MissingConfigError { field } => {
                format!("Provide a value for '{}'", field)
            }
            LintError::ValidationError { .. } => {
                "Fix the reported configuration problem before rerunning".to_string()
            }
            LintError::ManifestError { path, .. } => {
                format!(
                    "Verify that '{}' exists and is a readable requirements file",
                    path
                )
            }
            LintError::RegistryError(_) => {
                "Check network connectivity and the configured index URL, then retry".to_string()
            }
            LintError::ProcessError { command, .. } => {
                format!("Make sure '{}' is installed and on PATH", command)
            }
            LintError::IoError(_) => {
                "Check file permissions and available disk space".to_string()
            }
            LintError::ZipError(_) | LintError::CsvError(_) | LintError::SerializationError(_) => {
                "Retry with a writable output directory".to_string()
            }
            LintError::ReportError { .. } => "Rerun with --verbose to see details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Manifest => format!("Could not read the manifest: {}", self),
            ErrorCategory::Network => format!("Package index unreachable: {}", self),
            ErrorCategory::Process => format!("External command failed: {}", self),
            ErrorCategory::Io => format!("File system problem: {}", self),
            ErrorCategory::Report => format!("Could not write the report: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, LintError>;
