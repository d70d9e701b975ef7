pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::cli::LocalStorage;
pub use config::toml_config::TomlConfig;

pub use crate::core::{engine::LintEngine, pipeline::ManifestPipeline};
pub use utils::error::{LintError, Result};
