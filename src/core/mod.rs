pub mod checks;
pub mod engine;
pub mod manifest;
pub mod pipeline;

pub use crate::domain::model::{Finding, LintReport, ManifestEntry};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
