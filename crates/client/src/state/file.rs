use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};

pub const STATE_FILE_NEXT: &str = "client_state_next.xml";
pub const STATE_FILE_NAME: &str = "client_state.xml";
pub const STATE_FILE_PREV: &str = "client_state_prev.xml";

/// The three generations of the state file in the data directory.
pub struct StateFiles {
    data_dir: PathBuf,
    rename_attempts: u32,
    rename_retry_delay: Duration,
}

impl StateFiles {
    pub fn new(data_dir: &Path, rename_attempts: u32, rename_retry_delay: Duration) -> Self {
        StateFiles {
            data_dir: PathBuf::new().join(data_dir),
            rename_attempts: rename_attempts.max(1),
            rename_retry_delay,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Load order: a finished-but-unrenamed write wins over the current
    /// file, which wins over the previous generation.
    pub fn candidates(&self) -> [PathBuf; 3] {
        [
            self.path(STATE_FILE_NEXT),
            self.path(STATE_FILE_NAME),
            self.path(STATE_FILE_PREV),
        ]
    }

    /// Contents of `path` if it exists and is structurally complete.
    pub fn read_valid(&self, path: &Path) -> Option<String> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("state file {:#?} does not exist", path);
                return None;
            }
            Err(err) => {
                tracing::warn!("can't read state file {:#?}: {}", path, err);
                return None;
            }
        };

        if is_valid_state_file(&contents) {
            Some(contents)
        } else {
            tracing::warn!("state file {:#?} is incomplete; skipping it", path);
            None
        }
    }

    /// Writes `contents` as the next generation and rotates it into place.
    /// Each step is retried up to `rename_attempts` times.
    pub fn write_rotate(&self, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| ClientError::io(&self.data_dir, e))?;

        let next = self.path(STATE_FILE_NEXT);
        let current = self.path(STATE_FILE_NAME);
        let prev = self.path(STATE_FILE_PREV);

        tracing::debug!("writing state to {:#?}", next);
        self.with_retry("write", &next, || write_synced(&next, contents))
            .map_err(|(attempts, source)| ClientError::FileOpen {
                path: next.clone(),
                attempts,
                source,
            })?;

        if current.exists() {
            self.rename_with_retry(&current, &prev)?;
        }
        self.rename_with_retry(&next, &current)?;

        tracing::debug!("state file {:#?} successfully written", current);
        Ok(())
    }

    fn rename_with_retry(&self, from: &Path, to: &Path) -> Result<()> {
        self.with_retry("rename", from, || std::fs::rename(from, to))
            .map_err(|(attempts, source)| ClientError::Rename {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                attempts,
                source,
            })
    }

    /// Runs `op` up to `rename_attempts` times. The error carries the number
    /// of attempts made and the last failure.
    fn with_retry(
        &self,
        what: &str,
        path: &Path,
        mut op: impl FnMut() -> std::io::Result<()>,
    ) -> std::result::Result<(), (u32, std::io::Error)> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.rename_attempts => {
                    tracing::warn!(
                        "{} {:#?} failed (attempt {}): {}",
                        what,
                        path,
                        attempt,
                        err
                    );
                    std::thread::sleep(self.rename_retry_delay);
                    attempt += 1;
                }
                Err(err) => return Err((attempt, err)),
            }
        }
    }
}

fn write_synced(path: &Path, contents: &str) -> std::io::Result<()> {
    let fd = std::fs::File::create(path)?;
    let mut fd = std::io::BufWriter::new(fd);
    fd.write_all(contents.as_bytes())?;
    fd.flush()?;
    fd.get_ref().sync_all()
}

/// A state file is usable when it opens with the wrapper tag and the
/// closing wrapper was written before the end of the file.
pub fn is_valid_state_file(contents: &str) -> bool {
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some(first) if first.starts_with("<client_state>") => {}
        _ => return false,
    }
    lines.any(|l| l.starts_with("</client_state>"))
}
