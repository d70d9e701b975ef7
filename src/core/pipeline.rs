use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use zip::write::{SimpleFileOptions, ZipWriter};

use crate::core::checks;
use crate::core::manifest;
use crate::core::{ConfigProvider, Finding, LintReport, ManifestEntry, Pipeline, Storage};
use crate::domain::model::{CheckCode, EntryKind, FindingSeverity, FreezeSnapshot, LintSummary};
use crate::utils::error::{LintError, Result};

pub struct ManifestPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> ManifestPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    // 凍結快照：檔案優先，其次才是現行環境
    async fn resolve_snapshot(&self) -> (Option<FreezeSnapshot>, Option<Finding>) {
        if let Some(path) = self.config.freeze_file() {
            return match std::fs::read_to_string(path) {
                Ok(content) => (Some(checks::parse_freeze(&content, path)), None),
                Err(e) => (
                    None,
                    Some(Finding {
                        file: path.to_string(),
                        line_no: None,
                        check: CheckCode::Exclusion,
                        severity: FindingSeverity::Warning,
                        package: None,
                        message: format!("cannot read freeze file: {}", e),
                    }),
                ),
            };
        }

        if self.config.freeze_from_env() {
            return match checks::freeze_from_environment().await {
                Ok(snapshot) => (Some(snapshot), None),
                Err(e) => (
                    None,
                    Some(Finding {
                        file: "environment".to_string(),
                        line_no: None,
                        check: CheckCode::Exclusion,
                        severity: FindingSeverity::Warning,
                        package: None,
                        message: format!("could not capture environment snapshot: {}", e),
                    }),
                ),
            };
        }

        (None, None)
    }

    fn summarize(&self, entries: &[ManifestEntry], findings: &[Finding]) -> LintSummary {
        let mut files: HashSet<&str> = entries.iter().map(|e| e.file.as_str()).collect();
        files.insert(self.config.manifest_path());

        let mut summary = LintSummary {
            files_scanned: files.len(),
            ..LintSummary::default()
        };
        for entry in entries {
            match &entry.kind {
                EntryKind::Package(_) => summary.packages += 1,
                EntryKind::Source(_) => summary.sources += 1,
                EntryKind::Include { .. } => summary.includes += 1,
                EntryKind::Invalid { .. } => summary.invalid_lines += 1,
            }
        }
        for finding in findings {
            match finding.severity {
                FindingSeverity::Error => summary.errors += 1,
                FindingSeverity::Warning => summary.warnings += 1,
                FindingSeverity::Info => {}
            }
        }
        summary
    }

    fn render_csv(&self, findings: &[Finding]) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["file", "line", "check", "severity", "package", "message"])?;
        for finding in findings {
            let line = finding
                .line_no
                .map(|n| n.to_string())
                .unwrap_or_default();
            let check = finding.check.to_string();
            let severity = finding.severity.to_string();
            writer.write_record([
                finding.file.as_str(),
                line.as_str(),
                check.as_str(),
                severity.as_str(),
                finding.package.as_deref().unwrap_or(""),
                finding.message.as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| LintError::ReportError {
                message: format!("csv buffer: {}", e),
            })?;
        String::from_utf8(bytes).map_err(|e| LintError::ReportError {
            message: format!("csv not utf-8: {}", e),
        })
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for ManifestPipeline<S, C> {
    async fn extract(&self) -> Result<Vec<ManifestEntry>> {
        let path = self.config.manifest_path();
        tracing::debug!("Reading manifest tree from: {}", path);

        let entries = manifest::load_manifest(Path::new(path))?;
        tracing::debug!("Parsed {} entries", entries.len());
        Ok(entries)
    }

    async fn transform(&self, entries: Vec<ManifestEntry>) -> Result<LintReport> {
        let mut findings = checks::check_syntax(&entries);
        findings.extend(checks::check_constraints(&entries));
        findings.extend(checks::check_duplicates(&entries));

        let excluded = self.config.excluded_packages();
        if !excluded.is_empty() {
            let (snapshot, snapshot_finding) = self.resolve_snapshot().await;
            findings.extend(snapshot_finding);
            findings.extend(checks::check_exclusions(
                &entries,
                excluded,
                snapshot.as_ref(),
            ));
        }

        if self.config.check_registry() {
            tracing::debug!("Registry check against: {}", self.config.index_url());
            findings.extend(
                checks::check_registry(
                    &entries,
                    self.config.index_url(),
                    self.config.concurrent_requests(),
                )
                .await?,
            );
        }

        if self.config.check_sources() {
            let timeout = Duration::from_secs(self.config.git_timeout_seconds());
            findings.extend(checks::check_sources(&entries, timeout).await);
        }

        // 快照發現排在所有行之後
        findings.sort_by(|a, b| {
            let key = |f: &Finding| (f.file.clone(), f.line_no.unwrap_or(usize::MAX));
            key(a).cmp(&key(b))
        });

        let summary = self.summarize(&entries, &findings);
        let csv_output = self.render_csv(&findings)?;
        let json_output = serde_json::to_string_pretty(&serde_json::json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "manifest": self.config.manifest_path(),
            "summary": summary,
            "findings": findings,
        }))?;

        Ok(LintReport {
            findings,
            summary,
            csv_output,
            json_output,
        })
    }

    async fn load(&self, report: LintReport) -> Result<String> {
        if self.config.compress_output() {
            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

                zip.start_file("findings.csv", SimpleFileOptions::default())?;
                zip.write_all(report.csv_output.as_bytes())?;

                zip.start_file("report.json", SimpleFileOptions::default())?;
                zip.write_all(report.json_output.as_bytes())?;

                let cursor = zip.finish()?;
                cursor.into_inner()
            };

            tracing::debug!("Writing report bundle ({} bytes)", zip_data.len());
            self.storage.write_file("lint_report.zip", &zip_data).await?;
            Ok(format!("{}/lint_report.zip", self.config.output_path()))
        } else {
            self.storage
                .write_file("findings.csv", report.csv_output.as_bytes())
                .await?;
            self.storage
                .write_file("report.json", report.json_output.as_bytes())
                .await?;
            Ok(self.config.output_path().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CheckCode;
    use httpmock::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                LintError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct MockConfig {
        manifest_path: String,
        output_path: String,
        excluded: Vec<String>,
        index_url: String,
        check_registry: bool,
        check_sources: bool,
        freeze_file: Option<String>,
        compress: bool,
    }

    impl MockConfig {
        fn new(manifest_path: String) -> Self {
            Self {
                manifest_path,
                output_path: "test_output".to_string(),
                excluded: vec![],
                index_url: "http://index.invalid".to_string(),
                check_registry: false,
                check_sources: false,
                freeze_file: None,
                compress: true,
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn manifest_path(&self) -> &str {
            &self.manifest_path
        }

        fn output_path(&self) -> &str {
            &self.output_path
        }

        fn excluded_packages(&self) -> &[String] {
            &self.excluded
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
            false
        }

        fn concurrent_requests(&self) -> usize {
            4
        }

        fn git_timeout_seconds(&self) -> u64 {
            20
        }

        fn compress_output(&self) -> bool {
            self.compress
        }
    }

    fn write_manifest(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_extract_parses_manifest_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "requirements-dev.txt",
            "# dev tooling\ncoverage >= 4.0.1\nmock >= 2.0.0\n\ngit+https://github.com/org/repo.git#egg=repo\n",
        );

        let pipeline = ManifestPipeline::new(MockStorage::new(), MockConfig::new(path));
        let entries = pipeline.extract().await.unwrap();

        assert_eq!(3, entries.len());
        assert!(matches!(&entries[0].kind, EntryKind::Package(r) if r.name == "coverage"));
        assert!(matches!(&entries[2].kind, EntryKind::Source(_)));
    }

    #[tokio::test]
    async fn test_extract_missing_manifest_fails() {
        let pipeline = ManifestPipeline::new(
            MockStorage::new(),
            MockConfig::new("does/not/exist.txt".to_string()),
        );
        assert!(matches!(
            pipeline.extract().await,
            Err(LintError::ManifestError { .. })
        ));
    }

    #[tokio::test]
    async fn test_transform_clean_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(&dir, "r.txt", "coverage >= 4.0.1\npytest\n");

        let pipeline = ManifestPipeline::new(MockStorage::new(), MockConfig::new(path));
        let entries = pipeline.extract().await.unwrap();
        let report = pipeline.transform(entries).await.unwrap();

        assert!(report.findings.is_empty());
        assert_eq!(2, report.summary.packages);
        assert_eq!(0, report.summary.errors);
        assert_eq!(1, report.summary.files_scanned);
        // CSV 只剩表頭
        assert_eq!(1, report.csv_output.trim_end().lines().count());
    }

    #[tokio::test]
    async fn test_transform_collects_offline_findings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "r.txt",
            "coverage >= banana\n-e .\nsix\nSix\n",
        );

        let pipeline = ManifestPipeline::new(MockStorage::new(), MockConfig::new(path));
        let entries = pipeline.extract().await.unwrap();
        let report = pipeline.transform(entries).await.unwrap();

        let codes: Vec<CheckCode> = report.findings.iter().map(|f| f.check).collect();
        assert!(codes.contains(&CheckCode::Constraint));
        assert!(codes.contains(&CheckCode::Syntax));
        assert!(codes.contains(&CheckCode::Duplicate));
        assert_eq!(2, report.summary.errors);
        assert_eq!(1, report.summary.warnings);

        // findings 依行號排序
        let lines: Vec<_> = report.findings.iter().map(|f| f.line_no).collect();
        assert_eq!(vec![Some(1), Some(2), Some(4)], lines);
    }

    #[tokio::test]
    async fn test_transform_exclusions_from_manifest_and_freeze() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(&dir, "r.txt", "tensorflow >= 1.0\nsix\n");
        let freeze = write_manifest(&dir, "freeze.txt", "six==1.11.0\nTensorFlow==1.8.0\n");

        let mut config = MockConfig::new(path);
        config.excluded = vec!["tensorflow".to_string()];
        config.freeze_file = Some(freeze.clone());

        let pipeline = ManifestPipeline::new(MockStorage::new(), config);
        let entries = pipeline.extract().await.unwrap();
        let report = pipeline.transform(entries).await.unwrap();

        assert_eq!(2, report.summary.errors);
        let in_snapshot = report
            .findings
            .iter()
            .find(|f| f.line_no.is_none())
            .unwrap();
        assert_eq!(freeze, in_snapshot.file);
    }

    #[tokio::test]
    async fn test_transform_with_registry_check() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/pypi/coverage/json");
            then.status(200)
                .json_body(serde_json::json!({"releases": {"4.0.1": []}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/pypi/ghost/json");
            then.status(404);
        });

        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(&dir, "r.txt", "coverage >= 4.0.1\nghost\n");

        let mut config = MockConfig::new(path);
        config.check_registry = true;
        config.index_url = server.url("/pypi");

        let pipeline = ManifestPipeline::new(MockStorage::new(), config);
        let entries = pipeline.extract().await.unwrap();
        let report = pipeline.transform(entries).await.unwrap();

        assert_eq!(1, report.findings.len());
        assert_eq!(CheckCode::Registry, report.findings[0].check);
        assert_eq!(Some("ghost".to_string()), report.findings[0].package);
    }

    #[tokio::test]
    async fn test_load_compressed_bundle() {
        let storage = MockStorage::new();
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(&dir, "r.txt", "six\n");
        let pipeline = ManifestPipeline::new(storage.clone(), MockConfig::new(path));

        let report = LintReport {
            findings: vec![],
            summary: LintSummary::default(),
            csv_output: "file,line,check,severity,package,message\n".to_string(),
            json_output: "{}".to_string(),
        };

        let output_path = pipeline.load(report).await.unwrap();
        assert_eq!("test_output/lint_report.zip", output_path);

        let zip_data = storage.get_file("lint_report.zip").await.unwrap();
        let cursor = std::io::Cursor::new(zip_data);
        let mut archive = zip::ZipArchive::new(cursor).unwrap();
        assert_eq!(2, archive.len());

        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(vec!["findings.csv", "report.json"], names);
    }

    #[tokio::test]
    async fn test_load_plain_files() {
        let storage = MockStorage::new();
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_manifest(&dir, "r.txt", "six\n");

        let mut config = MockConfig::new(path);
        config.compress = false;
        let pipeline = ManifestPipeline::new(storage.clone(), config);

        let report = LintReport {
            findings: vec![],
            summary: LintSummary::default(),
            csv_output: "file,line,check,severity,package,message\n".to_string(),
            json_output: "{\"findings\": []}".to_string(),
        };

        let output_path = pipeline.load(report).await.unwrap();
        assert_eq!("test_output", output_path);
        assert!(storage.get_file("findings.csv").await.is_some());
        assert!(storage.get_file("report.json").await.is_some());
    }
}
