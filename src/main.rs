//! CLI entry point for the data cloner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cloner_core::{
    AppConfig, Classifier, RateLimiter, RetryPolicy, SyncOptions, SyncOrchestrator, SyncSummary,
    build_default_source_registry, load_config,
};
use tracing::{debug, error, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref()).context("failed to load configuration")?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config log_level > info
    let default_level = if args.quiet {
        "error".to_string()
    } else {
        match args.verbose {
            0 => loaded
                .config
                .log_level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!(
        config_path = ?loaded.path,
        from_file = loaded.loaded_from_file,
        "Data cloner starting"
    );

    let config = apply_cli_overrides(loaded.config, &args)?;
    let run_sources = select_sources(&config, &args.sources)?;
    if run_sources.is_empty() {
        info!("No sources enabled. Add one to enabled_sources in the config file.");
        return Ok(());
    }

    let registry = build_default_source_registry();
    let authenticators = registry
        .build_enabled(&config, &run_sources)
        .context("failed to set up sources")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
            warn!("Interrupt received, finishing the current step");
        }
    });

    // One limiter for the whole process: every source paces against the same clock.
    let rate_limiter = if config.delay_per_action_ms == 0 {
        debug!("rate limiting disabled");
        Arc::new(RateLimiter::disabled())
    } else {
        debug!(rate_limit_ms = config.delay_per_action_ms, "rate limiting enabled");
        Arc::new(RateLimiter::new(config.delay_per_action()))
    };

    let destination_root = config.destination_root_or_default();
    let mut auth_failures = Vec::new();

    for authenticator in &authenticators {
        let name = authenticator.descriptor().name;
        if interrupted.load(Ordering::SeqCst) {
            warn!(source = name, "Interrupted, not starting source");
            break;
        }

        let retire_remote = !args.no_retire && config.retirement_enabled(name);
        let options = SyncOptions {
            destination_root: destination_root.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages,
            retry: RetryPolicy::with_max_retries(config.max_retries),
            retire_remote,
            classifier: Classifier::default(),
        };
        info!(
            source = name,
            destination = %destination_root.display(),
            retire_remote,
            "Syncing source"
        );

        let orchestrator =
            SyncOrchestrator::new(options, Arc::clone(&rate_limiter), Arc::clone(&interrupted));
        match orchestrator.run(authenticator.as_ref()).await {
            Ok(summary) => print_summary(authenticator.descriptor().display_name, &summary),
            Err(err) => {
                error!(source = name, error = %err, "Sync aborted");
                auth_failures.push(name);
            }
        }
    }

    if !auth_failures.is_empty() {
        bail!("authentication failed for: {}", auth_failures.join(", "));
    }
    Ok(())
}

/// Folds CLI flags into the loaded config and re-validates.
fn apply_cli_overrides(mut config: AppConfig, args: &Args) -> Result<AppConfig> {
    if let Some(dir) = &args.output_dir {
        config.destination_root = Some(dir.clone());
    }
    if let Some(ms) = args.rate_limit {
        config.delay_per_action_ms = ms;
    }
    if let Some(pages) = args.max_pages {
        config.max_pages = usize::try_from(pages).context("--max-pages out of range")?;
    }
    if let Some(retries) = args.max_retries {
        config.max_retries = u32::from(retries);
    }
    if args.no_retire {
        config.retire_remote.clear();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Returns the sources to run: `requested` if given (each must be enabled),
/// else every enabled source.
fn select_sources(config: &AppConfig, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(config.enabled_sources.clone());
    }
    for name in requested {
        if !config.enabled_sources.contains(name) {
            bail!(
                "source `{name}` is not enabled (enabled: {})",
                config.enabled_sources.join(", ")
            );
        }
    }
    Ok(requested.to_vec())
}

fn print_summary(display_name: &str, summary: &SyncSummary) {
    println!("{display_name}:");
    println!("  pages fetched:  {}", summary.pages_fetched);
    println!("  items seen:     {}", summary.items_seen);
    println!("  persisted:      {}", summary.persisted);
    println!("  skipped:        {}", summary.skipped_total());
    for (reason, count) in &summary.skipped {
        println!("    {reason}: {count}");
    }
    println!("  failed:         {}", summary.failed_total());
    for (category, count) in &summary.failed {
        println!("    {category}: {count}");
    }
    println!("  retired:        {}", summary.retired);
    if summary.retirement_failed > 0 {
        println!("  retire failed:  {}", summary.retirement_failed);
    }
    if summary.page_failures > 0 {
        println!("  page failures:  {}", summary.page_failures);
    }
    if summary.page_limit_reached {
        println!("  page limit reached; rerun or raise max_pages to continue");
    }
    if summary.interrupted {
        println!("  interrupted");
    }
}
