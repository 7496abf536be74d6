//! Run-directory manager (spec §4.6): creates and lays out the per-run
//! filesystem tree and stages declared inputs into it. No teacher
//! counterpart exists (`vwf-core` writes directly into a single working
//! directory); the glob-then-materialise staging step is enriched from
//! `Alb-O-xeno`'s `globset` dependency.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use indexmap::IndexMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunDirError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid input glob `{pattern}`: {source}")]
    BadGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

fn io(path: &Path, source: std::io::Error) -> RunDirError {
    RunDirError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The on-disk tree for a single run (spec §4.6):
/// `base_dir/runs/<workflow_name>/<version>/<run_id>/{workflow.yaml, inputs/, outputs/, logs/, tmp/}`.
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    pub fn new(base_dir: &Path, workflow_name: &str, version: &str, run_id: &str) -> Self {
        Self {
            root: base_dir
                .join("runs")
                .join(workflow_name)
                .join(version)
                .join(run_id),
        }
    }

    /// Reopen a run directory whose path is already known (e.g. loaded back
    /// from the repository for `resume`), without recomputing it from its
    /// components.
    pub fn from_existing(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.root.join("inputs")
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn log_path_for_step(&self, step_name: &str) -> PathBuf {
        self.logs_dir().join(format!("{step_name}.log"))
    }

    /// Create the directory tree. Must run before the first StepExecution
    /// transitions to `RUNNING` (spec §3 invariant).
    pub fn create(&self) -> Result<(), RunDirError> {
        for dir in [
            self.root.clone(),
            self.inputs_dir(),
            self.outputs_dir(),
            self.logs_dir(),
            self.tmp_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| io(&dir, e))?;
        }
        Ok(())
    }

    /// Remove the run's `tmp/` tree (spec §4.6: "cleaned at run end").
    /// Tolerates the directory already being gone.
    pub fn cleanup_tmp(&self) -> Result<(), RunDirError> {
        match std::fs::remove_dir_all(self.tmp_dir()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io(&self.tmp_dir(), e)),
        }
    }

    /// Write the copy of the validated workflow document (spec §4.6).
    pub fn write_workflow_copy(&self, yaml: &str) -> Result<(), RunDirError> {
        let path = self.root.join("workflow.yaml");
        std::fs::write(&path, yaml).map_err(|e| io(&path, e))
    }

    /// Expand each declared input's glob against `cwd` and materialise every
    /// match into `inputs/`, preferring a symlink and falling back to a
    /// byte-wise copy (spec §4.6). Absolute input paths are used as-is,
    /// without glob expansion.
    pub fn stage_inputs(
        &self,
        inputs: &IndexMap<String, String>,
        cwd: &Path,
    ) -> Result<Vec<PathBuf>, RunDirError> {
        let mut staged = Vec::new();
        for pattern in inputs.values() {
            for src in expand(cwd, pattern)? {
                let file_name = src
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| src.as_os_str().to_os_string());
                let dest = self.inputs_dir().join(file_name);
                materialize(&src, &dest)?;
                staged.push(dest);
            }
        }
        Ok(staged)
    }

    /// Snapshot every file currently under `outputs/`, for later diffing
    /// against what a step produced (spec §4.4 step 6).
    pub fn snapshot_outputs(&self) -> HashSet<PathBuf> {
        let mut seen = HashSet::new();
        walk_all(&self.outputs_dir(), &mut seen);
        seen
    }

    /// Files under `outputs/` absent from `before`, as paths relative to
    /// `outputs/`. Best-effort: an unreadable directory yields no entries,
    /// never an error (spec §4.4: "absence is not an error").
    pub fn diff_outputs(&self, before: &HashSet<PathBuf>) -> Vec<String> {
        let mut after = HashSet::new();
        walk_all(&self.outputs_dir(), &mut after);
        let outputs_dir = self.outputs_dir();
        let mut produced: Vec<String> = after
            .difference(before)
            .filter_map(|p| p.strip_prefix(&outputs_dir).ok())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        produced.sort();
        produced
    }
}

fn expand(cwd: &Path, pattern: &str) -> Result<Vec<PathBuf>, RunDirError> {
    let candidate = Path::new(pattern);
    if candidate.is_absolute() {
        return Ok(vec![candidate.to_path_buf()]);
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| RunDirError::BadGlob {
            pattern: pattern.to_string(),
            source,
        })?
        .compile_matcher();

    let mut matches = Vec::new();
    walk_matching(cwd, cwd, &matcher, &mut matches);
    matches.sort();
    Ok(matches)
}

fn walk_matching(root: &Path, dir: &Path, matcher: &GlobMatcher, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_matching(root, &path, matcher, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            if matcher.is_match(rel) {
                out.push(path);
            }
        }
    }
}

fn walk_all(dir: &Path, out: &mut HashSet<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_all(&path, out);
        } else {
            out.insert(path);
        }
    }
}

#[cfg(unix)]
fn materialize(src: &Path, dest: &Path) -> Result<(), RunDirError> {
    if std::os::unix::fs::symlink(src, dest).is_ok() {
        return Ok(());
    }
    std::fs::copy(src, dest)
        .map(|_| ())
        .map_err(|e| io(dest, e))
}

#[cfg(not(unix))]
fn materialize(src: &Path, dest: &Path) -> Result<(), RunDirError> {
    std::fs::copy(src, dest)
        .map(|_| ())
        .map_err(|e| io(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_expected_subtree() {
        let base = TempDir::new().unwrap();
        let rd = RunDirectory::new(base.path(), "demo", "1", "20260101_000000_abcd1234");
        rd.create().unwrap();
        assert!(rd.inputs_dir().is_dir());
        assert!(rd.outputs_dir().is_dir());
        assert!(rd.logs_dir().is_dir());
        assert!(rd.tmp_dir().is_dir());
    }

    #[test]
    fn cleanup_tmp_removes_the_directory() {
        let base = TempDir::new().unwrap();
        let rd = RunDirectory::new(base.path(), "demo", "1", "run1");
        rd.create().unwrap();
        std::fs::write(rd.tmp_dir().join("scratch.bin"), b"x").unwrap();

        rd.cleanup_tmp().unwrap();
        assert!(!rd.tmp_dir().exists());
        // Idempotent: a second call on an already-gone directory is not an error.
        rd.cleanup_tmp().unwrap();
    }

    #[test]
    fn stages_glob_matched_inputs() {
        let base = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join("a.fastq"), b"A").unwrap();
        std::fs::write(cwd.path().join("b.fastq"), b"B").unwrap();
        std::fs::write(cwd.path().join("c.txt"), b"C").unwrap();

        let rd = RunDirectory::new(base.path(), "demo", "1", "run1");
        rd.create().unwrap();

        let mut inputs = IndexMap::new();
        inputs.insert("reads".to_string(), "*.fastq".to_string());
        let staged = rd.stage_inputs(&inputs, cwd.path()).unwrap();

        assert_eq!(staged.len(), 2);
        assert!(rd.inputs_dir().join("a.fastq").exists());
        assert!(rd.inputs_dir().join("b.fastq").exists());
        assert!(!rd.inputs_dir().join("c.txt").exists());
    }

    #[test]
    fn diff_outputs_finds_only_new_files() {
        let base = TempDir::new().unwrap();
        let rd = RunDirectory::new(base.path(), "demo", "1", "run1");
        rd.create().unwrap();
        std::fs::write(rd.outputs_dir().join("pre.txt"), b"old").unwrap();

        let before = rd.snapshot_outputs();
        std::fs::write(rd.outputs_dir().join("new.txt"), b"new").unwrap();

        let produced = rd.diff_outputs(&before);
        assert_eq!(produced, vec!["new.txt".to_string()]);
    }
}
