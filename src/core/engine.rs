use crate::core::Pipeline;
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct LintOutcome {
    pub output_path: String,
    pub errors: usize,
    pub warnings: usize,
}

impl LintOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors == 0 && self.warnings == 0
    }
}

pub struct LintEngine<P: Pipeline> {
    pipeline: P,
    monitor_enabled: bool,
}

impl<P: Pipeline> LintEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor_enabled: false,
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor_enabled,
        }
    }

    pub async fn run(&self) -> Result<LintOutcome> {
        #[cfg(feature = "cli")]
        let mut monitor = crate::utils::monitor::SystemMonitor::new(self.monitor_enabled);
        #[cfg(not(feature = "cli"))]
        let _ = self.monitor_enabled;

        tracing::info!("Reading manifest...");
        let entries = self.pipeline.extract().await?;
        tracing::info!("Parsed {} entries", entries.len());

        tracing::info!("Running checks...");
        let report = self.pipeline.transform(entries).await?;
        tracing::info!(
            "Checks finished: {} errors, {} warnings across {} files",
            report.summary.errors,
            report.summary.warnings,
            report.summary.files_scanned
        );
        for finding in &report.findings {
            match finding.line_no {
                Some(line_no) => tracing::info!(
                    "  [{}] {}:{} {}",
                    finding.severity,
                    finding.file,
                    line_no,
                    finding.message
                ),
                None => tracing::info!("  [{}] {} {}", finding.severity, finding.file, finding.message),
            }
        }

        let errors = report.summary.errors;
        let warnings = report.summary.warnings;

        tracing::info!("Writing report...");
        let output_path = self.pipeline.load(report).await?;
        tracing::info!("Report saved to: {}", output_path);

        #[cfg(feature = "cli")]
        monitor.log_summary();

        Ok(LintOutcome {
            output_path,
            errors,
            warnings,
        })
    }
}
