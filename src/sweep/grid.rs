use std::{collections::BTreeSet, path::PathBuf};

pub const DEFAULT_TARGETS: [&str; 3] = ["QSBR", "EBR", "ChapelArray"];
pub const DEFAULT_LOCALES: [u32; 6] = [1, 2, 4, 8, 16, 32];
pub const DEFAULT_WRITES: [u32; 6] = [0, 20, 40, 60, 80, 100];
pub const DEFAULT_NUM_TRIALS: u32 = 4;
pub const DEFAULT_NUM_OPERATIONS: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridPoint {
    pub target: String,
    pub locales: u32,
    pub writes: u32,
}

#[derive(Debug, Clone)]
pub struct SweepGrid {
    pub targets: Vec<String>,
    pub locales: Vec<u32>,
    pub writes: Vec<u32>,
}

impl Default for SweepGrid {
    fn default() -> Self {
        SweepGrid {
            targets: DEFAULT_TARGETS.iter().map(|t| t.to_string()).collect(),
            locales: DEFAULT_LOCALES.to_vec(),
            writes: DEFAULT_WRITES.to_vec(),
        }
    }
}

impl SweepGrid {
    /// Target-major, then locale count, then write ratio.
    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        self.targets.iter().flat_map(move |target| {
            self.locales.iter().flat_map(move |&locales| {
                self.writes.iter().map(move |&writes| GridPoint {
                    target: target.clone(),
                    locales,
                    writes,
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len() * self.locales.len() * self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_locales(&self) -> Option<u32> {
        self.locales.iter().copied().max()
    }

    /// First value listed twice in any dimension. Repeated points would
    /// launch runs writing the same artifact.
    pub fn duplicate(&self) -> Option<String> {
        fn first_repeat<T: Ord + Clone + ToString>(values: &[T]) -> Option<String> {
            let mut seen = BTreeSet::new();
            values
                .iter()
                .find(|value| !seen.insert((*value).clone()))
                .map(ToString::to_string)
        }
        first_repeat(&self.targets)
            .or_else(|| first_repeat(&self.locales))
            .or_else(|| first_repeat(&self.writes))
    }
}

/// How one grid point turns into a benchmark command line.
#[derive(Debug, Clone)]
pub struct BenchmarkInvocation {
    pub program: String,
    pub num_trials: u32,
    pub num_operations: u64,
    pub output_dir: PathBuf,
    /// Words placed before the program, e.g. a batch launcher.
    pub launcher: Vec<String>,
}

impl BenchmarkInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        BenchmarkInvocation {
            program: program.into(),
            num_trials: DEFAULT_NUM_TRIALS,
            num_operations: DEFAULT_NUM_OPERATIONS,
            output_dir: PathBuf::from("."),
            launcher: Vec::new(),
        }
    }

    pub fn artifact_path(&self, point: &GridPoint) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}-{}", point.target, point.writes, point.locales))
    }

    pub fn executable(&self) -> String {
        if self.program.contains('/') {
            self.program.clone()
        } else {
            format!("./{}", self.program)
        }
    }

    pub fn command(&self, point: &GridPoint) -> Vec<String> {
        let mut command = self.launcher.clone();
        command.extend([
            self.executable(),
            "-nl".to_string(),
            point.locales.to_string(),
            format!("--numWrites={}", point.writes),
            format!("--numTrials={}", self.num_trials),
            format!("--outputFile={}", self.artifact_path(point).display()),
            format!("--target={}", point.target),
            format!("--numOperations={}", self.num_operations),
        ]);
        command
    }

    /// Capacity units a point occupies: one per locale.
    pub fn resource_requirement(&self, point: &GridPoint) -> u32 {
        point.locales
    }

    pub fn compile_command(&self) -> Vec<String> {
        vec![
            "chpl".to_string(),
            "--fast".to_string(),
            format!("{}.chpl", self.program),
            "-o".to_string(),
            self.program.clone(),
        ]
    }
}
