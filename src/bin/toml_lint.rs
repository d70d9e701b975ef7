use anyhow::Context;
use clap::Parser;
use reqlint::config::toml_config::TomlConfig;
use reqlint::core::ConfigProvider;
use reqlint::utils::{logger, validation::Validate};
use reqlint::{LintEngine, LocalStorage, ManifestPipeline};

#[derive(Parser)]
#[command(name = "toml-lint")]
#[command(about = "Requirements manifest audit driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "reqlint.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show what would be checked without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    tracing::info!("🚀 Starting TOML-based manifest audit");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入 TOML 配置
    let config = TomlConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config file '{}'", args.config))?;

    config
        .validate()
        .context("configuration validation failed")?;

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());

    if args.dry_run {
        println!("🔎 Audit plan for '{}':", config.audit.name);
        println!("  manifest:        {}", config.manifest_path());
        println!("  output:          {}", config.output_path());
        println!(
            "  exclusions:      {}",
            if config.excluded_packages().is_empty() {
                "(none)".to_string()
            } else {
                config.excluded_packages().join(", ")
            }
        );
        println!(
            "  registry check:  {}",
            if config.check_registry() {
                config.index_url().to_string()
            } else {
                "off".to_string()
            }
        );
        println!(
            "  sources check:   {}",
            if config.check_sources() {
                format!("on (timeout {}s)", config.git_timeout_seconds())
            } else {
                "off".to_string()
            }
        );
        println!("  compression:     {}", config.compress_output());
        println!("  monitoring:      {}", monitor_enabled);
        return Ok(());
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = ManifestPipeline::new(storage, config);
    let engine = LintEngine::new_with_monitoring(pipeline, monitor_enabled);

    let outcome = engine.run().await.context("audit failed")?;

    if outcome.errors > 0 {
        eprintln!(
            "⚠️ Audit found {} errors, {} warnings",
            outcome.errors, outcome.warnings
        );
        println!("📁 Report saved to: {}", outcome.output_path);
        std::process::exit(1);
    }

    println!("✅ Audit completed: {} warnings", outcome.warnings);
    println!("📁 Report saved to: {}", outcome.output_path);

    Ok(())
}
