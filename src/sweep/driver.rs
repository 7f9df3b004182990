use std::{collections::HashMap, process::Command};

use log::{info, warn};

use crate::collector::result::{collect, ResultGrid};
use crate::error::SweepError;
use crate::manager::scheduler::{Scheduler, SchedulerConfig};
use crate::sweep::grid::{BenchmarkInvocation, GridPoint, SweepGrid};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub grid: SweepGrid,
    pub invocation: BenchmarkInvocation,
    pub scheduler: SchedulerConfig,
    pub compile: bool,
    /// Only list the commands, launch nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepProgress {
    pub submitted: usize,
    pub total: usize,
    pub used_capacity: u32,
    pub ceiling: u32,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub results: ResultGrid,
    pub launched: usize,
    /// Every command line, in submission order.
    pub commands: Vec<String>,
}

pub fn run_sweep<F>(config: &SweepConfig, mut observer: F) -> Result<SweepReport, SweepError>
where
    F: FnMut(&SweepProgress),
{
    let mut report = SweepReport::default();

    if config.compile && !config.dry_run {
        compile(&config.invocation)?;
    }

    if config.dry_run {
        for point in config.grid.points() {
            report
                .commands
                .push(config.invocation.command(&point).join(" "));
            report.results.insert(&point, 0.0);
        }
        return Ok(report);
    }

    let total = config.grid.len();
    let mut scheduler = Scheduler::new(config.scheduler);
    scheduler.start();

    let mut points: HashMap<u64, GridPoint> = HashMap::with_capacity(total);
    for (index, point) in config.grid.points().enumerate() {
        let command = config.invocation.command(&point);
        report.commands.push(command.join(" "));
        let task = scheduler.create_task(
            command,
            config.invocation.resource_requirement(&point),
            config.invocation.artifact_path(&point),
        )?;
        points.insert(task.id, point);
        scheduler.submit(task)?;
        report.launched += 1;

        observer(&SweepProgress {
            submitted: index + 1,
            total,
            used_capacity: scheduler.used_capacity(),
            ceiling: scheduler.ceiling(),
        });
    }

    let finished = scheduler.drain()?;
    observer(&SweepProgress {
        submitted: total,
        total,
        used_capacity: scheduler.used_capacity(),
        ceiling: scheduler.ceiling(),
    });
    scheduler.shutdown();
    info!("All {} task(s) finished, collecting results.", finished.len());

    for task in &finished {
        let point = points
            .get(&task.id)
            .ok_or(SweepError::UnknownTask(task.id))?;
        let value = collect(task)?;
        report.results.insert(point, value);
    }

    if report.results.len() != total {
        warn!(
            "Collected {} result(s) for {} grid point(s).",
            report.results.len(),
            total
        );
    }
    Ok(report)
}

fn compile(invocation: &BenchmarkInvocation) -> Result<(), SweepError> {
    let command = invocation.compile_command();
    let display = command.join(" ");
    info!("Compiling: {}", display);

    let Some((program, args)) = command.split_first() else {
        return Err(SweepError::Compile {
            command: display,
            reason: "empty command".to_string(),
        });
    };
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| SweepError::Compile {
            command: display.clone(),
            reason: e.to_string(),
        })?;
    if !status.success() {
        return Err(SweepError::Compile {
            command: display,
            reason: status.to_string(),
        });
    }
    Ok(())
}
