use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{AgentError, AgentResult};
use crate::id::{ExecutorId, FrameworkId, SlaveId};

pub fn slaves_root(work_dir: &Path) -> PathBuf {
    work_dir.join("slaves")
}

fn executor_runs_root(
    work_dir: &Path,
    slave_id: &SlaveId,
    framework_id: &FrameworkId,
    executor_id: &ExecutorId,
) -> PathBuf {
    slaves_root(work_dir)
        .join(slave_id.as_str())
        .join("frameworks")
        .join(framework_id.as_str())
        .join("executors")
        .join(executor_id.as_str())
        .join("runs")
}

/// Allocate a unique run directory for an executor by incrementing the
/// run number until an unused path is found. An executor id can be
/// reused across incarnations, so earlier run directories may still
/// exist (possibly scheduled for deletion).
///
/// When `no_create` is set the first candidate path is returned verbatim
/// without touching the filesystem.
pub fn create_unique_work_directory(
    work_dir: &Path,
    slave_id: &SlaveId,
    framework_id: &FrameworkId,
    executor_id: &ExecutorId,
    no_create: bool,
) -> AgentResult<PathBuf> {
    let root = executor_runs_root(work_dir, slave_id, framework_id, executor_id);
    for run in 0u64.. {
        let candidate = root.join(run.to_string());
        if no_create {
            return Ok(candidate);
        }
        if !candidate.exists() {
            std::fs::create_dir_all(&candidate)?;
            return Ok(candidate);
        }
    }
    Err(AgentError::InternalError(format!(
        "ran out of run directories for executor '{executor_id}' of framework {framework_id}"
    )))
}

/// Find direct children of the slaves work root that belong to other
/// (older) agent incarnations and have not been modified within the
/// timeout. The caller is expected to delete them right away.
pub fn find_stale_slave_directories(
    work_dir: &Path,
    slave_id: &SlaveId,
    timeout: Duration,
) -> Vec<PathBuf> {
    let root = slaves_root(work_dir);
    let Ok(entries) = std::fs::read_dir(&root) else {
        return vec![];
    };
    let now = SystemTime::now();
    let mut stale = vec![];
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if entry.file_name().to_str() == Some(slave_id.as_str()) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if now
            .duration_since(modified)
            .is_ok_and(|age| age > timeout)
        {
            stale.push(path);
        }
    }
    stale
}
