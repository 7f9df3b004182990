use std::fs;

use anyhow::{Context, Result};
use log::info;

use crate::app::config::Args;
use crate::app::progress::ProgressLine;
use crate::sweep::driver::run_sweep;

pub fn run_cli(args: Args) -> Result<()> {
    let config = args.sweep_config();
    info!(
        "Sweeping {} point(s) of {} with a ceiling of {} locales.",
        config.grid.len(),
        args.file_name,
        config.scheduler.ceiling
    );

    if config.dry_run {
        println!("{}", config.invocation.compile_command().join(" "));
    }

    let mut progress = ProgressLine::new();
    let report = run_sweep(&config, |p| progress.update(p));
    progress.finish();
    let report = report.context("benchmark sweep failed")?;

    if config.dry_run {
        for command in &report.commands {
            println!("{}", command);
        }
    } else {
        info!("{} run(s) finished.", report.launched);
    }

    for line in report.results.summary_lines() {
        println!("{}", line);
    }

    if let Some(path) = &args.results_json {
        let json = serde_json::to_string_pretty(&report.results)
            .context("failed to serialize results")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        info!("Results written to {}.", path.display());
    }
    Ok(())
}
