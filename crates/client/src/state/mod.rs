//! The authoritative in-memory model of the client and its persistence.
//!
//! Parsed records only carry names. The linker resolves those names into
//! typed ids before a record is moved into the store, so everything a
//! consumer can see through [`ClientState`] is fully linked.

mod app_info;
mod file;
mod linker;
mod statefile;

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::scheduler_reply::TrickleUpEndpoint;
use crate::types::{
    canonicalize_master_url, ActiveTask, App, AppVersion, FileInfo, HostInfo, NetStats, Project,
    ProxyInfo, ResultPhase, RunMode, TaskResult, TimeStats, Workunit,
};

pub use app_info::APP_INFO_FILE_NAME;
pub use file::{is_valid_state_file, StateFiles, STATE_FILE_NAME, STATE_FILE_NEXT, STATE_FILE_PREV};
pub use linker::Discard;
pub use statefile::LoadReport;
pub(crate) use statefile::record as parse_record;

macro_rules! entity_id {
    ($($name:ident),* $(,)?) => {$(
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    )*};
}

entity_id!(ProjectId, AppId, AppVersionId, WorkunitId, ResultId, FileId);

#[derive(Debug)]
pub struct ProjectEntry {
    pub id: ProjectId,
    pub project: Project,
    pub(crate) trickle_up: Vec<TrickleUpEndpoint>,
}

impl ProjectEntry {
    pub fn trickle_up_endpoints(&self) -> &[TrickleUpEndpoint] {
        &self.trickle_up
    }
}

#[derive(Debug)]
pub struct AppEntry {
    pub id: AppId,
    pub project: ProjectId,
    pub app: App,
}

#[derive(Debug)]
pub struct AppVersionEntry {
    pub id: AppVersionId,
    pub project: ProjectId,
    pub app: AppId,
    pub files: Vec<FileId>,
    /// Coprocessor type this version needs but the host lacks.
    pub missing_coproc: Option<String>,
    pub version: AppVersion,
}

#[derive(Debug)]
pub struct WorkunitEntry {
    pub id: WorkunitId,
    pub project: ProjectId,
    pub app: AppId,
    pub input_files: Vec<FileId>,
    pub wu: Workunit,
}

#[derive(Debug)]
pub struct ResultEntry {
    pub id: ResultId,
    pub project: ProjectId,
    pub wu: WorkunitId,
    pub app_version: AppVersionId,
    pub output_files: Vec<FileId>,
    pub result: TaskResult,
}

#[derive(Debug)]
pub struct FileEntry {
    pub id: FileId,
    pub project: ProjectId,
    /// Supplied locally by `app_info.xml` rather than downloaded.
    pub from_app_info: bool,
    pub file: FileInfo,
}

#[derive(Debug)]
pub struct ActiveTaskEntry {
    pub result: ResultId,
    pub project: ProjectId,
    pub task: ActiveTask,
    pub have_trickle_down: bool,
}

/// Client-wide scalars persisted after the per-project records.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientMeta {
    pub platform_name: String,
    pub alt_platforms: Vec<String>,
    pub core_client_major_version: i32,
    pub core_client_minor_version: i32,
    pub core_client_release: i32,
    pub user_run_request: RunMode,
    pub user_gpu_request: RunMode,
    pub user_network_request: RunMode,
    pub host_venue: String,
    pub new_version_check_time: f64,
    pub all_projects_list_check_time: f64,
    pub newer_version: String,
}

impl ClientMeta {
    fn current(config: &ClientConfig) -> Self {
        let (major, minor, release) = crate_version();
        ClientMeta {
            platform_name: config.primary_platform.clone(),
            alt_platforms: config.alt_platforms.clone(),
            core_client_major_version: major,
            core_client_minor_version: minor,
            core_client_release: release,
            user_run_request: RunMode::default(),
            user_gpu_request: RunMode::default(),
            user_network_request: RunMode::default(),
            host_venue: String::new(),
            new_version_check_time: 0.0,
            all_projects_list_check_time: 0.0,
            newer_version: String::new(),
        }
    }
}

fn crate_version() -> (i32, i32, i32) {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|p| p.parse().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Seconds since the epoch, the time base of every persisted timestamp.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub struct ClientState {
    config: ClientConfig,
    files: StateFiles,
    pub host_info: HostInfo,
    pub time_stats: TimeStats,
    pub net_stats: NetStats,
    pub proxy_info: ProxyInfo,
    pub meta: ClientMeta,
    projects: Vec<ProjectEntry>,
    apps: Vec<AppEntry>,
    app_versions: Vec<AppVersionEntry>,
    workunits: Vec<WorkunitEntry>,
    results: Vec<ResultEntry>,
    file_infos: Vec<FileEntry>,
    active_tasks: Vec<ActiveTaskEntry>,
    pers_file_xfers: Vec<FileId>,
    dirty: Option<String>,
    next_id: u32,
}

impl ClientState {
    pub fn new(config: ClientConfig) -> Self {
        let files = StateFiles::new(
            &config.data_directory,
            config.rename_attempts,
            config.rename_retry_delay,
        );
        ClientState {
            meta: ClientMeta::current(&config),
            config,
            files,
            host_info: HostInfo::default(),
            time_stats: TimeStats::default(),
            net_stats: NetStats::default(),
            proxy_info: ProxyInfo::default(),
            projects: Vec::new(),
            apps: Vec::new(),
            app_versions: Vec::new(),
            workunits: Vec::new(),
            results: Vec::new(),
            file_infos: Vec::new(),
            active_tasks: Vec::new(),
            pers_file_xfers: Vec::new(),
            dirty: None,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state_files(&self) -> &StateFiles {
        &self.files
    }

    fn alloc_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn set_dirty(&mut self, reason: &str) {
        if self.config.log_flags.state_debug {
            tracing::debug!("[state] marked dirty: {}", reason);
        }
        self.dirty = Some(reason.to_string());
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    pub fn projects(&self) -> &[ProjectEntry] {
        &self.projects
    }

    pub fn apps(&self) -> &[AppEntry] {
        &self.apps
    }

    pub fn app_versions(&self) -> &[AppVersionEntry] {
        &self.app_versions
    }

    pub fn workunits(&self) -> &[WorkunitEntry] {
        &self.workunits
    }

    pub fn results(&self) -> &[ResultEntry] {
        &self.results
    }

    pub fn file_infos(&self) -> &[FileEntry] {
        &self.file_infos
    }

    pub fn active_tasks(&self) -> &[ActiveTaskEntry] {
        &self.active_tasks
    }

    /// Files with a transfer in progress, in the order they were queued.
    pub fn pers_file_xfers(&self) -> &[FileId] {
        &self.pers_file_xfers
    }

    pub fn project(&self, id: ProjectId) -> Option<&ProjectEntry> {
        self.projects.iter().find(|e| e.id == id)
    }

    pub(crate) fn project_mut(&mut self, id: ProjectId) -> Option<&mut ProjectEntry> {
        self.projects.iter_mut().find(|e| e.id == id)
    }

    pub fn app(&self, id: AppId) -> Option<&AppEntry> {
        self.apps.iter().find(|e| e.id == id)
    }

    pub(crate) fn app_mut(&mut self, id: AppId) -> Option<&mut AppEntry> {
        self.apps.iter_mut().find(|e| e.id == id)
    }

    pub fn app_version(&self, id: AppVersionId) -> Option<&AppVersionEntry> {
        self.app_versions.iter().find(|e| e.id == id)
    }

    pub(crate) fn app_version_mut(&mut self, id: AppVersionId) -> Option<&mut AppVersionEntry> {
        self.app_versions.iter_mut().find(|e| e.id == id)
    }

    pub fn workunit(&self, id: WorkunitId) -> Option<&WorkunitEntry> {
        self.workunits.iter().find(|e| e.id == id)
    }

    pub fn result(&self, id: ResultId) -> Option<&ResultEntry> {
        self.results.iter().find(|e| e.id == id)
    }

    pub(crate) fn result_mut(&mut self, id: ResultId) -> Option<&mut ResultEntry> {
        self.results.iter_mut().find(|e| e.id == id)
    }

    pub fn file_info(&self, id: FileId) -> Option<&FileEntry> {
        self.file_infos.iter().find(|e| e.id == id)
    }

    pub(crate) fn file_info_mut(&mut self, id: FileId) -> Option<&mut FileEntry> {
        self.file_infos.iter_mut().find(|e| e.id == id)
    }

    pub fn project_by_url(&self, url: &str) -> Option<&ProjectEntry> {
        let url = canonicalize_master_url(url);
        self.projects.iter().find(|e| e.project.master_url == url)
    }

    pub fn lookup_app(&self, project: ProjectId, name: &str) -> Option<&AppEntry> {
        self.apps
            .iter()
            .find(|e| e.project == project && e.app.name == name)
    }

    pub fn lookup_app_version(
        &self,
        app: AppId,
        platform: &str,
        version_num: i32,
        plan_class: &str,
    ) -> Option<&AppVersionEntry> {
        self.app_versions.iter().find(|e| {
            e.app == app
                && e.version.platform == platform
                && e.version.version_num == version_num
                && e.version.plan_class == plan_class
        })
    }

    /// Highest-numbered version of `app` for a platform and plan class.
    pub fn newest_app_version(
        &self,
        app: AppId,
        platform: &str,
        plan_class: &str,
    ) -> Option<&AppVersionEntry> {
        self.app_versions
            .iter()
            .filter(|e| {
                e.app == app && e.version.platform == platform && e.version.plan_class == plan_class
            })
            .max_by_key(|e| e.version.version_num)
    }

    pub fn lookup_workunit(&self, project: ProjectId, name: &str) -> Option<&WorkunitEntry> {
        self.workunits
            .iter()
            .find(|e| e.project == project && e.wu.name == name)
    }

    pub fn lookup_result(&self, project: ProjectId, name: &str) -> Option<&ResultEntry> {
        self.results
            .iter()
            .find(|e| e.project == project && e.result.name == name)
    }

    pub fn lookup_file_info(&self, project: ProjectId, name: &str) -> Option<&FileEntry> {
        self.file_infos
            .iter()
            .find(|e| e.project == project && e.file.name == name)
    }

    pub fn active_task_for(&self, result: ResultId) -> Option<&ActiveTaskEntry> {
        self.active_tasks.iter().find(|e| e.result == result)
    }

    pub(crate) fn active_task_for_mut(&mut self, result: ResultId) -> Option<&mut ActiveTaskEntry> {
        self.active_tasks.iter_mut().find(|e| e.result == result)
    }

    pub fn result_phase(&self, id: ResultId) -> Option<ResultPhase> {
        let entry = self.result(id)?;
        Some(entry.result.phase(self.active_task_for(id).is_some()))
    }

    /// Adds a project the user asked to join. Its apps and work arrive with
    /// the first scheduler reply.
    pub fn attach_project(&mut self, url: &str, authenticator: &str) -> Result<ProjectId> {
        let mut project = Project::new(url);
        project.authenticator = authenticator.to_string();
        let url = project.master_url.clone();
        let id = self.link_project(project)?;
        self.load_app_info(id, &mut LoadReport::default());
        tracing::info!("attached to project {}", url);
        self.set_dirty("attach_project");
        Ok(id)
    }

    /// Removes a project and everything that belongs to it. Every id of the
    /// project is invalid afterwards.
    pub fn detach_project(&mut self, id: ProjectId) -> Result<()> {
        let Some(pos) = self.projects.iter().position(|e| e.id == id) else {
            return Err(ClientError::NotFound(format!("project {id}")));
        };
        let entry = self.projects.remove(pos);

        self.active_tasks.retain(|e| e.project != id);
        self.results.retain(|e| e.project != id);
        self.workunits.retain(|e| e.project != id);
        self.app_versions.retain(|e| e.project != id);
        self.apps.retain(|e| e.project != id);
        self.file_infos.retain(|e| e.project != id);
        let file_infos = &self.file_infos;
        self.pers_file_xfers
            .retain(|fid| file_infos.iter().any(|e| e.id == *fid));

        tracing::info!("detached from project {}", entry.project.master_url);
        self.set_dirty("detach_project");
        Ok(())
    }

    /// A total share of zero would starve every project; treat it as equal
    /// shares instead.
    pub fn fix_zero_resource_shares(&mut self) {
        let total: f64 = self.projects.iter().map(|e| e.project.resource_share).sum();
        if total == 0.0 && !self.projects.is_empty() {
            tracing::info!("total resource share is zero; setting every project to 100");
            for entry in &mut self.projects {
                entry.project.resource_share = 100.0;
            }
        }
    }

    /// Orders results by arrival. Results of one reply share a timestamp;
    /// among those the reverse name order matches how they were issued.
    pub fn sort_results(&mut self) {
        self.results.sort_by(|a, b| {
            a.result
                .received_time
                .total_cmp(&b.result.received_time)
                .then_with(|| b.result.name.cmp(&a.result.name))
        });
    }

    pub fn summary(&self) -> StateSummary {
        let projects = self
            .projects
            .iter()
            .map(|p| ProjectSummary {
                master_url: p.project.master_url.clone(),
                project_name: p.project.project_name.clone(),
                resource_share: p.project.resource_share,
                anonymous_platform: p.project.anonymous_platform,
                apps: self.apps.iter().filter(|e| e.project == p.id).count(),
                app_versions: self.app_versions.iter().filter(|e| e.project == p.id).count(),
                workunits: self.workunits.iter().filter(|e| e.project == p.id).count(),
                results: self.results.iter().filter(|e| e.project == p.id).count(),
                file_infos: self.file_infos.iter().filter(|e| e.project == p.id).count(),
            })
            .collect();

        let results = self
            .results
            .iter()
            .filter_map(|e| {
                Some(ResultSummary {
                    name: e.result.name.clone(),
                    project: self.project(e.project)?.project.master_url.clone(),
                    phase: self.result_phase(e.id)?,
                    received_time: e.result.received_time,
                })
            })
            .collect();

        StateSummary {
            platform_name: self.config.primary_platform.clone(),
            projects,
            results,
            active_tasks: self.active_tasks.len(),
            pending_transfers: self.pers_file_xfers.len(),
            dirty: self.is_dirty(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StateSummary {
    pub platform_name: String,
    pub projects: Vec<ProjectSummary>,
    pub results: Vec<ResultSummary>,
    pub active_tasks: usize,
    pub pending_transfers: usize,
    pub dirty: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProjectSummary {
    pub master_url: String,
    pub project_name: String,
    pub resource_share: f64,
    pub anonymous_platform: bool,
    pub apps: usize,
    pub app_versions: usize,
    pub workunits: usize,
    pub results: usize,
    pub file_infos: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResultSummary {
    pub name: String,
    pub project: String,
    pub phase: ResultPhase,
    pub received_time: f64,
}
