use crate::domain::model::{LintReport, ManifestEntry};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn manifest_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn excluded_packages(&self) -> &[String];
    fn index_url(&self) -> &str;
    fn check_registry(&self) -> bool;
    fn check_sources(&self) -> bool;
    fn freeze_file(&self) -> Option<&str>;
    fn freeze_from_env(&self) -> bool;
    fn concurrent_requests(&self) -> usize;
    fn git_timeout_seconds(&self) -> u64;
    fn compress_output(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<ManifestEntry>>;
    async fn transform(&self, entries: Vec<ManifestEntry>) -> Result<LintReport>;
    async fn load(&self, report: LintReport) -> Result<String>;
}
