//! Pipeline diagnostic dump: writes intermediate artifacts to disk.
//!
//! Disabled unless `MEDCODER_DUMP_DIR` is set. Each run gets its own
//! directory:
//!
//! ```text
//! {dump_dir}/{run_id}/{report_id}/
//!   01-model-prompt.txt
//!   02-model-response.txt
//!   03-model-suggestions.json
//!   04-final-result.json
//! ```

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Environment variable enabling the dump.
pub const DUMP_DIR_ENV: &str = "MEDCODER_DUMP_DIR";

/// Dump directory of one pipeline run.
#[derive(Debug, Clone)]
pub struct DiagnosticRun {
    dir: PathBuf,
}

impl DiagnosticRun {
    /// Start a run under `$MEDCODER_DUMP_DIR`, or `None` when it is unset.
    pub fn from_env() -> Option<Self> {
        let base = std::env::var_os(DUMP_DIR_ENV)?;
        Self::start_in(Path::new(&base))
    }

    /// Start a run under `base`. Returns `None` (with a warning) if the
    /// directory cannot be created.
    pub fn start_in(base: &Path) -> Option<Self> {
        let dir = base.join(Uuid::new_v4().to_string());
        create_dir(&dir)?;
        tracing::info!(path = %dir.display(), "Diagnostic dump enabled");
        Some(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Per-report subdirectory, created on demand.
    pub fn report_dir(&self, report_id: &str) -> Option<PathBuf> {
        let dir = self.dir.join(report_id);
        create_dir(&dir)?;
        Some(dir)
    }
}

fn create_dir(dir: &Path) -> Option<()> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }
    Some(())
}

/// Write a JSON artifact (any serde-serializable value). Never panics.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(&path, json.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = json.len(),
                "Diagnostic dump: JSON written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write JSON"
            ),
        },
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (prompt, raw model response). Never panics.
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_creates_unique_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let a = DiagnosticRun::start_in(tmp.path()).unwrap();
        let b = DiagnosticRun::start_in(tmp.path()).unwrap();

        assert!(a.dir().exists());
        assert_ne!(a.dir(), b.dir());
    }

    #[test]
    fn report_dir_nests_under_run() {
        let tmp = tempfile::tempdir().unwrap();
        let run = DiagnosticRun::start_in(tmp.path()).unwrap();

        let dir = run.report_dir("report_1").unwrap();
        assert!(dir.exists());
        assert!(dir.starts_with(run.dir()));
        assert!(dir.ends_with("report_1"));
    }

    #[test]
    fn uncreatable_base_disables_dump() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        assert!(DiagnosticRun::start_in(&file).is_none());
    }

    #[test]
    fn dump_json_writes_pretty_json() {
        let tmp = tempfile::tempdir().unwrap();

        dump_json(tmp.path(), "codes.json", &serde_json::json!({"CPT": ["45378"]}));

        let content = std::fs::read_to_string(tmp.path().join("codes.json")).unwrap();
        assert!(content.contains("\"CPT\""));
        assert!(content.contains('\n'));
    }

    #[test]
    fn dump_text_writes_text() {
        let tmp = tempfile::tempdir().unwrap();
        dump_text(tmp.path(), "prompt.txt", "Extract codes");

        let content = std::fs::read_to_string(tmp.path().join("prompt.txt")).unwrap();
        assert_eq!(content, "Extract codes");
    }

    #[test]
    fn write_failures_do_not_panic() {
        let bad_dir = Path::new("/nonexistent/path");
        dump_json(bad_dir, "test.json", &"data");
        dump_text(bad_dir, "test.txt", "data");
    }
}
