use clap::Parser;
use reqlint::utils::{logger, validation::Validate};
use reqlint::{CliConfig, LintEngine, LocalStorage, ManifestPipeline};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting reqlint CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 創建存儲和管道
    let storage = LocalStorage::new(config.output_path.clone());
    let pipeline = ManifestPipeline::new(storage, config);

    // 創建審核引擎並運行
    let engine = LintEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(outcome) => {
            if outcome.errors > 0 {
                tracing::warn!(
                    "⚠️ Audit finished with {} errors, {} warnings",
                    outcome.errors,
                    outcome.warnings
                );
                eprintln!(
                    "⚠️ Audit found {} errors, {} warnings",
                    outcome.errors, outcome.warnings
                );
                println!("📁 Report saved to: {}", outcome.output_path);
                std::process::exit(1);
            }

            tracing::info!("✅ Audit completed successfully!");
            tracing::info!("📁 Report saved to: {}", outcome.output_path);
            println!("✅ Audit completed: {} warnings", outcome.warnings);
            println!("📁 Report saved to: {}", outcome.output_path);
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Audit failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            // 輸出用戶友好的錯誤信息
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                reqlint::utils::error::ErrorSeverity::Low => 0, // 警告，但成功
                reqlint::utils::error::ErrorSeverity::Medium => 2, // 重試錯誤
                reqlint::utils::error::ErrorSeverity::High => 1, // 處理錯誤
                reqlint::utils::error::ErrorSeverity::Critical => 3, // 系統錯誤
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
