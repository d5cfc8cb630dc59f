use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::GradeError;

pub const GRADE_DIR_NAME: &str = ".checkpoint";
pub const GRADE_FILE_NAME: &str = "results.json";
pub const TRANSCRIPT_LOG_NAME: &str = "session.log";
pub const SERVER_LOG_NAME: &str = "server.log";

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// Locations of every grading artifact under a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradePaths {
    pub dir: PathBuf,
    pub grade_file: PathBuf,
    pub transcript_log: PathBuf,
    pub server_log: PathBuf,
}

impl GradePaths {
    pub fn for_workdir(workdir: &Path) -> Self {
        Self::in_dir(workdir.join(GRADE_DIR_NAME))
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self {
            grade_file: dir.join(GRADE_FILE_NAME),
            transcript_log: dir.join(TRANSCRIPT_LOG_NAME),
            server_log: dir.join(SERVER_LOG_NAME),
            dir,
        }
    }

    fn scratch_file(&self) -> PathBuf {
        self.dir.join(format!("{GRADE_FILE_NAME}.tmp"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeFeedback {
    pub completed_missions: usize,
    pub total_missions: usize,
    pub message: String,
}

/// The graded artifact collected by the embedding platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub score: f64,
    pub max_points: f64,
    pub feedback: GradeFeedback,
}

impl GradeRecord {
    pub fn new(completed: usize, total: usize) -> Self {
        let completed = completed.min(total);
        let score = if total > 0 {
            completed as f64 / total as f64
        } else {
            0.0
        };
        Self {
            score,
            max_points: 1.0,
            feedback: GradeFeedback {
                completed_missions: completed,
                total_missions: total,
                message: format!("Completed {completed} out of {total} missions"),
            },
        }
    }
}

/// Durable, best-effort persistence of session progress.
///
/// `init` and `update` never fail: errors are logged and the session carries
/// on with in-memory state. The `try_*` variants surface the error.
#[derive(Debug, Clone)]
pub struct GradeStore {
    paths: GradePaths,
    total: usize,
}

impl GradeStore {
    pub fn new(paths: GradePaths, total: usize) -> Self {
        Self { paths, total }
    }

    pub fn paths(&self) -> &GradePaths {
        &self.paths
    }

    /// Creates the grading directory, owner-only.
    pub fn prepare_dir(&self) -> Result<(), GradeError> {
        fs::create_dir_all(&self.paths.dir).map_err(|err| GradeError::io(&self.paths.dir, err))?;
        restrict(&self.paths.dir, DIR_MODE)
    }

    pub fn init(&self) {
        match self.try_init() {
            Ok(()) => info!(
                path = %self.paths.grade_file.display(),
                total = self.total,
                "grade file initialised"
            ),
            Err(err) => error!(error = %err, "failed to initialise grade file"),
        }
    }

    pub fn try_init(&self) -> Result<(), GradeError> {
        self.prepare_dir()?;
        self.try_update(0)?;
        self.secure_artifacts()
    }

    pub fn update(&self, completed: usize) {
        if let Err(err) = self.try_update(completed) {
            error!(error = %err, completed, "failed to update grade file");
        }
    }

    pub fn try_update(&self, completed: usize) -> Result<(), GradeError> {
        let record = GradeRecord::new(completed, self.total);
        let body = serde_json::to_vec(&record)?;
        write_replace(&self.paths.scratch_file(), &self.paths.grade_file, &body)?;
        debug!(completed, total = self.total, "grade file written");
        Ok(())
    }

    pub fn read(&self) -> Result<GradeRecord, GradeError> {
        let raw = fs::read(&self.paths.grade_file)
            .map_err(|err| GradeError::io(&self.paths.grade_file, err))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Tightens permissions on every artifact that currently exists.
    pub fn secure_artifacts(&self) -> Result<(), GradeError> {
        for path in [
            &self.paths.grade_file,
            &self.paths.transcript_log,
            &self.paths.server_log,
        ] {
            if path.exists() {
                restrict(path, FILE_MODE)?;
            }
        }
        Ok(())
    }
}

/// Opens (or creates) an append-only log artifact with owner-only permissions.
pub fn open_private_log(path: &Path) -> Result<File, GradeError> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let file = options.open(path).map_err(|err| GradeError::io(path, err))?;
    restrict(path, FILE_MODE)?;
    Ok(file)
}

fn write_replace(scratch: &Path, target: &Path, body: &[u8]) -> Result<(), GradeError> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    let mut file = options
        .open(scratch)
        .map_err(|err| GradeError::io(scratch, err))?;
    file.write_all(body)
        .and_then(|_| file.sync_all())
        .map_err(|err| GradeError::io(scratch, err))?;
    drop(file);
    restrict(scratch, FILE_MODE)?;
    fs::rename(scratch, target).map_err(|err| GradeError::io(target, err))
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> Result<(), GradeError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|err| GradeError::io(path, err))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> Result<(), GradeError> {
    Ok(())
}
