mod active_task;
mod app;
mod file;
mod host;
mod project;
mod proxy;
mod result;
mod workunit;

pub use active_task::{parse_active_task_set, ActiveTask};
pub use app::{App, AppVersion, CoprocUsage};
pub use file::{FileInfo, FileRef, PersistentFileXfer, FILE_NOT_PRESENT, FILE_PRESENT};
pub use host::{Coproc, HostInfo, NetStats, TimeStats};
pub use project::{canonicalize_master_url, escape_project_url, Project};
pub use proxy::ProxyInfo;
pub use result::{ResultPhase, ResultState, TaskResult};
pub use workunit::Workunit;

/// Which consumer a record is serialized for. GUI-RPC output leaves out
/// secrets and bulky diagnostic fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    StateFile,
    GuiRpc,
}

/// Scheduling mode requested by the user, stored as its legacy code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Always,
    #[default]
    Auto,
    Never,
    Restore,
}

impl RunMode {
    pub fn code(self) -> i32 {
        match self {
            RunMode::Always => 1,
            RunMode::Auto => 2,
            RunMode::Never => 3,
            RunMode::Restore => 4,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => RunMode::Always,
            3 => RunMode::Never,
            4 => RunMode::Restore,
            _ => RunMode::Auto,
        }
    }
}
