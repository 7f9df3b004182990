use std::{collections::BTreeMap, fs, io::ErrorKind};

use log::debug;
use serde::Serialize;

use crate::error::CollectError;
use crate::models::task::{Task, TaskOutcome, TaskStatus};
use crate::sweep::grid::GridPoint;

/// Reads the numeric result a finished task left in its artifact.
///
/// A missing or empty artifact means "no result" and yields `0.0`; content
/// that is not a number is a corrupted run and is an error.
pub fn collect(task: &Task) -> Result<f64, CollectError> {
    match &task.status {
        TaskStatus::Done(TaskOutcome::Exited { .. }) => {}
        TaskStatus::Done(TaskOutcome::SpawnFailed { reason }) => {
            return Err(CollectError::SpawnFailed {
                id: task.id,
                reason: reason.clone(),
            })
        }
        TaskStatus::Pending | TaskStatus::Running => return Err(CollectError::NotDone(task.id)),
    }

    let path = &task.output_artifact_path;
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No artifact for task '{}' at {:?}.", task.id, path);
            return Ok(0.0);
        }
        Err(source) => {
            return Err(CollectError::Io {
                path: path.clone(),
                source,
            })
        }
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed.parse::<f64>().map_err(|_| CollectError::Malformed {
        path: path.clone(),
        content: trimmed.to_string(),
    })
}

/// Results keyed target -> locale count -> write ratio.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultGrid {
    results: BTreeMap<String, BTreeMap<u32, BTreeMap<u32, f64>>>,
}

impl ResultGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, point: &GridPoint, value: f64) {
        self.results
            .entry(point.target.clone())
            .or_default()
            .entry(point.locales)
            .or_default()
            .insert(point.writes, value);
    }

    pub fn get(&self, target: &str, locales: u32, writes: u32) -> Option<f64> {
        self.results.get(target)?.get(&locales)?.get(&writes).copied()
    }

    pub fn len(&self) -> usize {
        self.results
            .values()
            .flat_map(|by_locales| by_locales.values())
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One line per target and write ratio, values ordered by locale count.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (target, by_locales) in &self.results {
            let mut rows: BTreeMap<u32, Vec<String>> = BTreeMap::new();
            for by_writes in by_locales.values() {
                for (writes, value) in by_writes {
                    rows.entry(*writes).or_default().push(value.to_string());
                }
            }
            for (writes, values) in rows {
                lines.push(format!("{target} writes={writes}: {}", values.join(" ")));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn finished_task(path: PathBuf) -> Task {
        let mut task = Task::new(1, vec!["./bench".to_string()], 1, path).unwrap();
        task.advance(TaskStatus::Running).unwrap();
        task.advance(TaskStatus::Done(TaskOutcome::Exited { code: Some(0) }))
            .unwrap();
        task
    }

    fn point(target: &str, locales: u32, writes: u32) -> GridPoint {
        GridPoint {
            target: target.to_string(),
            locales,
            writes,
        }
    }

    #[test]
    fn missing_artifact_is_zero() {
        let tmp = TempDir::new().unwrap();
        let task = finished_task(tmp.path().join("absent"));
        assert_eq!(collect(&task).unwrap(), 0.0);
    }

    #[test]
    fn empty_artifact_is_zero() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        fs::write(&path, "  \n").unwrap();
        assert_eq!(collect(&finished_task(path)).unwrap(), 0.0);
    }

    #[test]
    fn numeric_artifact_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("QSBR-20-4");
        fs::write(&path, "3.14\n").unwrap();
        let value = collect(&finished_task(path)).unwrap();
        assert!((value - 3.14).abs() < 1e-9);
    }

    #[test]
    fn garbage_artifact_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad");
        fs::write(&path, "abc").unwrap();
        match collect(&finished_task(path)) {
            Err(CollectError::Malformed { content, .. }) => assert_eq!(content, "abc"),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn unfinished_task_is_not_collected() {
        let task = Task::new(4, vec!["./bench".to_string()], 1, PathBuf::from("x")).unwrap();
        assert!(matches!(collect(&task), Err(CollectError::NotDone(4))));
    }

    #[test]
    fn task_that_never_ran_is_an_error() {
        let mut task = Task::new(5, vec!["./bench".to_string()], 1, PathBuf::from("x")).unwrap();
        task.advance(TaskStatus::Done(TaskOutcome::SpawnFailed {
            reason: "not found".to_string(),
        }))
        .unwrap();
        assert!(matches!(
            collect(&task),
            Err(CollectError::SpawnFailed { id: 5, .. })
        ));
    }

    #[test]
    fn grid_summary_follows_locale_order() {
        let mut grid = ResultGrid::new();
        grid.insert(&point("EBR", 4, 20), 4.5);
        grid.insert(&point("EBR", 1, 20), 1.5);
        grid.insert(&point("EBR", 1, 0), 1.0);
        grid.insert(&point("EBR", 4, 0), 4.0);

        assert_eq!(grid.len(), 4);
        assert_eq!(grid.get("EBR", 4, 20), Some(4.5));
        assert_eq!(grid.get("QSBR", 4, 20), None);
        assert_eq!(
            grid.summary_lines(),
            vec!["EBR writes=0: 1 4".to_string(), "EBR writes=20: 1.5 4.5".to_string()]
        );
    }

    #[test]
    fn grid_serializes_as_nested_maps() {
        let mut grid = ResultGrid::new();
        grid.insert(&point("QSBR", 2, 40), 0.25);
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(json, r#"{"QSBR":{"2":{"40":0.25}}}"#);
    }
}
