//! IRQ affinity analyzer for hosts running CPU-isolated containers.
//!
//! This is the entry point. It initializes logging and configuration,
//! builds the analysis context over the live host or a captured snapshot,
//! runs the one-shot analysis, and renders the report.

use tracing::info;
use tracing_subscriber::fmt;

use container_irq_analyzer::{
    analysis::run_analysis,
    config::Config,
    context::AnalysisContext,
    error::Result,
    report::{render_json, render_text},
};

fn main() -> Result<()> {
    // Load configuration before logging so the log format is configurable.
    let config = Config::load()?;

    let subscriber = fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let ctx = match &config.snapshot_dir {
        Some(dir) => {
            info!("analyzing snapshot at {}", dir.display());
            AnalysisContext::for_snapshot(dir)?
        }
        None => {
            info!("analyzing live host");
            AnalysisContext::live()?
        }
    };

    let report = run_analysis(&ctx)?;

    let rendered = match config.output_format.as_str() {
        "json" => render_json(&report)?,
        _ => render_text(&report, &config),
    };
    println!("{}", rendered);

    Ok(())
}
