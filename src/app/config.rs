use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::manager::scheduler::SchedulerConfig;
use crate::sweep::driver::SweepConfig;
use crate::sweep::grid::{
    BenchmarkInvocation, SweepGrid, DEFAULT_LOCALES, DEFAULT_NUM_OPERATIONS, DEFAULT_NUM_TRIALS,
    DEFAULT_TARGETS, DEFAULT_WRITES,
};
use crate::worker::worker::OutputMode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Runs a benchmark over a grid of targets, locale counts and write ratios."
)]
pub struct Args {
    /// The benchmark to run (without the .chpl extension)
    pub file_name: String,

    /// Number of trials to run each benchmark
    #[arg(long, default_value_t = DEFAULT_NUM_TRIALS)]
    pub num_trials: u32,

    /// Number of operations per run
    #[arg(long, default_value_t = DEFAULT_NUM_OPERATIONS)]
    pub num_operations: u64,

    /// Maximum number of locales in use at the same time
    #[arg(long, default_value_t = 32)]
    pub ceiling: u32,

    /// How often to re-check for finished runs while waiting for capacity
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// How long the dispatch worker waits for new work between reaps
    #[arg(long, default_value_t = 1000)]
    pub pop_timeout_ms: u64,

    /// Locale counts to sweep
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_LOCALES)]
    pub locales: Vec<u32>,

    /// Write percentages to sweep
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_WRITES)]
    pub writes: Vec<u32>,

    /// Benchmark targets to sweep
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_TARGETS.map(String::from))]
    pub targets: Vec<String>,

    /// Directory the runs write their result files into
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Word placed in front of every run; repeat for each word,
    /// e.g. --launcher srun --launcher=--exclusive
    #[arg(long, value_name = "WORD", allow_hyphen_values = true)]
    pub launcher: Vec<String>,

    /// What to do with the output of the runs
    #[arg(long, value_enum, default_value_t)]
    pub output_mode: OutputMode,

    /// Compile the benchmark with chpl before running it
    #[arg(long)]
    pub compile: bool,

    /// Print the commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Write the collected results as JSON
    #[arg(long, value_name = "PATH")]
    pub results_json: Option<PathBuf>,
}

pub fn validate_args(args: &Args) -> Result<(), String> {
    if args.ceiling == 0 {
        return Err("--ceiling must be at least 1".into());
    }
    if args.locales.is_empty() || args.writes.is_empty() || args.targets.is_empty() {
        return Err("--locales, --writes and --targets must not be empty".into());
    }
    if args.locales.contains(&0) {
        return Err("--locales must be positive".into());
    }
    let grid = args.grid();
    if let Some(repeated) = grid.duplicate() {
        return Err(format!("{} is listed more than once", repeated));
    }
    if let Some(max) = grid.max_locales() {
        if max > args.ceiling {
            return Err(format!(
                "locale count {} can never fit under --ceiling {}",
                max, args.ceiling
            ));
        }
    }
    Ok(())
}

impl Args {
    pub fn grid(&self) -> SweepGrid {
        SweepGrid {
            targets: self.targets.clone(),
            locales: self.locales.clone(),
            writes: self.writes.clone(),
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        let mut invocation = BenchmarkInvocation::new(self.file_name.clone());
        invocation.num_trials = self.num_trials;
        invocation.num_operations = self.num_operations;
        invocation.output_dir = self.output_dir.clone();
        invocation.launcher = self.launcher.clone();

        SweepConfig {
            grid: self.grid(),
            invocation,
            scheduler: SchedulerConfig {
                ceiling: self.ceiling,
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                pop_timeout: Duration::from_millis(self.pop_timeout_ms),
                output_mode: self.output_mode,
            },
            compile: self.compile,
            dry_run: self.dry_run,
        }
    }
}
