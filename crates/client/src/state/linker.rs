//! Resolution of name references into ids.
//!
//! Every `link_*` function takes ownership of a freshly parsed record,
//! checks that the keys it refers to exist and that its own key is unique,
//! and only then moves it into the store. A failed link leaves the store
//! untouched.

use serde::Serialize;

use super::{
    ActiveTaskEntry, AppEntry, AppId, AppVersionEntry, AppVersionId, ClientState, FileEntry,
    FileId, ProjectEntry, ProjectId, ResultEntry, ResultId, WorkunitEntry, WorkunitId,
};
use crate::error::{ClientError, Result};
use crate::types::{
    canonicalize_master_url, ActiveTask, App, AppVersion, FileInfo, FileRef, PersistentFileXfer,
    Project, TaskResult, Workunit,
};

/// A record that was dropped instead of being linked.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Discard {
    pub kind: &'static str,
    pub name: String,
    pub project: Option<String>,
    pub reason: String,
}

impl ClientState {
    pub fn link_project(&mut self, mut project: Project) -> Result<ProjectId> {
        project.master_url = canonicalize_master_url(&project.master_url);
        if self.project_by_url(&project.master_url).is_some() {
            return Err(ClientError::NotUnique(format!(
                "project {}",
                project.master_url
            )));
        }
        let id = ProjectId(self.alloc_id());
        self.projects.push(ProjectEntry {
            id,
            project,
            trickle_up: Vec::new(),
        });
        Ok(id)
    }

    fn require_project(&self, project: ProjectId) -> Result<&ProjectEntry> {
        self.project(project)
            .ok_or_else(|| ClientError::NoProject(project.to_string()))
    }

    pub fn link_app(&mut self, project: ProjectId, app: App) -> Result<AppId> {
        self.require_project(project)?;
        if self.lookup_app(project, &app.name).is_some() {
            return Err(ClientError::NotUnique(format!("app {}", app.name)));
        }
        let id = AppId(self.alloc_id());
        self.apps.push(AppEntry { id, project, app });
        Ok(id)
    }

    /// Links a file and queues its transfer when one is still needed.
    pub fn link_file_info(
        &mut self,
        project: ProjectId,
        mut file: FileInfo,
        now: f64,
    ) -> Result<FileId> {
        self.require_project(project)?;
        if self.lookup_file_info(project, &file.name).is_some() {
            return Err(ClientError::NotUnique(format!("file_info {}", file.name)));
        }

        let id = FileId(self.alloc_id());
        if file.needs_transfer() {
            let is_upload = file.is_upload();
            file.pers_file_xfer
                .get_or_insert_with(|| PersistentFileXfer::new(is_upload, now));
            self.pers_file_xfers.push(id);
        } else {
            file.pers_file_xfer = None;
        }

        self.file_infos.push(FileEntry {
            id,
            project,
            from_app_info: false,
            file,
        });
        Ok(id)
    }

    fn resolve_file_refs(
        &self,
        project: ProjectId,
        refs: &[FileRef],
        owner: &str,
    ) -> Result<Vec<FileId>> {
        refs.iter()
            .map(|file_ref| {
                self.lookup_file_info(project, &file_ref.file_name)
                    .map(|e| e.id)
                    .ok_or_else(|| {
                        ClientError::NotFound(format!(
                            "file {} referenced by {}",
                            file_ref.file_name, owner
                        ))
                    })
            })
            .collect()
    }

    pub fn link_app_version(
        &mut self,
        project: ProjectId,
        mut version: AppVersion,
    ) -> Result<AppVersionId> {
        self.require_project(project)?;

        if version.platform.is_empty() {
            version.platform = self.config.primary_platform.clone();
        } else if !self.config.is_supported_platform(&version.platform) {
            tracing::warn!(
                "app version {} {} has unsupported platform {}; using {}",
                version.app_name,
                version.version_num,
                version.platform,
                self.config.primary_platform
            );
            version.platform = self.config.primary_platform.clone();
        }

        let app = self
            .lookup_app(project, &version.app_name)
            .map(|e| e.id)
            .ok_or_else(|| ClientError::NotFound(format!("app {}", version.app_name)))?;

        if self
            .lookup_app_version(
                app,
                &version.platform,
                version.version_num,
                &version.plan_class,
            )
            .is_some()
        {
            return Err(ClientError::NotUnique(format!(
                "app version {} {} {} {}",
                version.app_name, version.version_num, version.platform, version.plan_class
            )));
        }

        let owner = format!("app version {} {}", version.app_name, version.version_num);
        let files = self.resolve_file_refs(project, &version.file_refs, &owner)?;

        let missing_coproc = version
            .coproc
            .as_ref()
            .filter(|usage| !self.host_info.has_coproc(&usage.kind))
            .map(|usage| usage.kind.clone());
        if let Some(kind) = &missing_coproc {
            tracing::warn!("{} needs a {} device this host doesn't have", owner, kind);
        }

        let id = AppVersionId(self.alloc_id());
        self.app_versions.push(AppVersionEntry {
            id,
            project,
            app,
            files,
            missing_coproc,
            version,
        });
        Ok(id)
    }

    pub fn link_workunit(&mut self, project: ProjectId, mut wu: Workunit) -> Result<WorkunitId> {
        self.require_project(project)?;
        if self.lookup_workunit(project, &wu.name).is_some() {
            return Err(ClientError::NotUnique(format!("workunit {}", wu.name)));
        }

        let app = self
            .lookup_app(project, &wu.app_name)
            .map(|e| e.id)
            .ok_or_else(|| ClientError::NotFound(format!("app {}", wu.app_name)))?;
        let input_files =
            self.resolve_file_refs(project, &wu.input_files, &format!("workunit {}", wu.name))?;

        if wu.version_num == 0 {
            if let Some(newest) = self
                .app_versions
                .iter()
                .filter(|e| e.app == app)
                .map(|e| e.version.version_num)
                .max()
            {
                wu.version_num = newest;
            }
        }

        let id = WorkunitId(self.alloc_id());
        self.workunits.push(WorkunitEntry {
            id,
            project,
            app,
            input_files,
            wu,
        });
        Ok(id)
    }

    pub fn link_result(&mut self, project: ProjectId, mut result: TaskResult) -> Result<ResultId> {
        self.require_project(project)?;
        if self.lookup_result(project, &result.name).is_some() {
            return Err(ClientError::NotUnique(format!("result {}", result.name)));
        }

        let (wu, app, wu_version) = self
            .lookup_workunit(project, &result.wu_name)
            .map(|e| (e.id, e.app, e.wu.version_num))
            .ok_or_else(|| {
                ClientError::NotFound(format!(
                    "workunit {} of result {}",
                    result.wu_name, result.name
                ))
            })?;

        if result.version_num == 0 {
            result.version_num = wu_version;
        }
        if result.platform.is_empty() {
            result.platform = self.config.primary_platform.clone();
        }

        let found = self
            .lookup_app_version(
                app,
                &result.platform,
                result.version_num,
                &result.plan_class,
            )
            .map(|e| e.id);
        let app_version = match found {
            Some(id) => id,
            None => self
                .migrate_anonymous_result(project, app, &mut result)
                .ok_or_else(|| {
                    ClientError::NotFound(format!(
                        "app version {} {} {} for result {}",
                        result.platform, result.version_num, result.plan_class, result.name
                    ))
                })?,
        };

        let output_files = self.resolve_file_refs(
            project,
            &result.output_files,
            &format!("result {}", result.name),
        )?;

        let id = ResultId(self.alloc_id());
        self.results.push(ResultEntry {
            id,
            project,
            wu,
            app_version,
            output_files,
            result,
        });
        Ok(id)
    }

    /// Anonymous-platform projects may have switched platform or version
    /// between runs. Looks for a replacement on the primary platform, first
    /// with the same version number and then the newest one, and rewrites
    /// the result to match.
    fn migrate_anonymous_result(
        &self,
        project: ProjectId,
        app: AppId,
        result: &mut TaskResult,
    ) -> Option<AppVersionId> {
        if !self.project(project)?.project.anonymous_platform {
            return None;
        }
        let primary = &self.config.primary_platform;
        let found = self
            .lookup_app_version(app, primary, result.version_num, &result.plan_class)
            .or_else(|| self.newest_app_version(app, primary, &result.plan_class))?;

        tracing::info!(
            "result {}: moving from {} {} to {} {}",
            result.name,
            result.platform,
            result.version_num,
            found.version.platform,
            found.version.version_num
        );
        result.platform = found.version.platform.clone();
        result.version_num = found.version.version_num;
        Some(found.id)
    }

    pub fn link_active_task(&mut self, task: ActiveTask) -> Result<ResultId> {
        let project = self
            .project_by_url(&task.project_master_url)
            .map(|e| e.id)
            .ok_or_else(|| ClientError::NoProject(task.project_master_url.clone()))?;
        let result = self
            .lookup_result(project, &task.result_name)
            .map(|e| e.id)
            .ok_or_else(|| ClientError::NotFound(format!("result {}", task.result_name)))?;
        if self.active_task_for(result).is_some() {
            return Err(ClientError::NotUnique(format!(
                "active task for {}",
                task.result_name
            )));
        }

        self.active_tasks.push(ActiveTaskEntry {
            result,
            project,
            task,
            have_trickle_down: false,
        });
        Ok(result)
    }

    /// Turns a failed link into a diagnostic. Anonymous-platform projects
    /// list their apps both in the state file and in `app_info.xml`, so
    /// duplicates of those kinds are dropped without one.
    pub(crate) fn discard(
        &self,
        project: Option<ProjectId>,
        kind: &'static str,
        name: &str,
        err: ClientError,
    ) -> Option<Discard> {
        let entry = project.and_then(|id| self.project(id));
        let anonymous = entry.is_some_and(|e| e.project.anonymous_platform);
        if anonymous
            && matches!(err, ClientError::NotUnique(_))
            && matches!(kind, "app" | "app_version" | "file_info")
        {
            tracing::debug!("ignoring duplicate {} {} of anonymous project", kind, name);
            return None;
        }

        let url = entry.map(|e| e.project.master_url.clone());
        tracing::warn!(
            "discarding {} {} of {}: {}",
            kind,
            name,
            url.as_deref().unwrap_or("<no project>"),
            err
        );
        Some(Discard {
            kind,
            name: name.to_string(),
            project: url,
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::types::{Coproc, CoprocUsage, ResultState};

    const PRIMARY: &str = "x86_64-pc-linux-gnu";

    fn state() -> (ClientState, ProjectId) {
        let config = ClientConfig::new("/nonexistent").with_platform(PRIMARY, &["i686-pc-linux-gnu"]);
        let mut state = ClientState::new(config);
        let project = state.link_project(Project::new("http://a.org/")).unwrap();
        (state, project)
    }

    fn app(name: &str) -> App {
        App {
            name: name.into(),
            user_friendly_name: name.into(),
            ..Default::default()
        }
    }

    fn version(app_name: &str, version_num: i32, platform: &str) -> AppVersion {
        AppVersion {
            app_name: app_name.into(),
            version_num,
            platform: platform.into(),
            avg_ncpus: 1.0,
            ..Default::default()
        }
    }

    fn workunit(name: &str, app_name: &str) -> Workunit {
        Workunit {
            name: name.into(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    fn result(name: &str, wu_name: &str, version_num: i32) -> TaskResult {
        TaskResult {
            name: name.into(),
            wu_name: wu_name.into(),
            version_num,
            state: ResultState::FilesDownloaded,
            ..Default::default()
        }
    }

    #[test]
    fn test_link_chain() {
        let (mut state, project) = state();
        let app_id = state.link_app(project, app("sim")).unwrap();
        let av = state
            .link_app_version(project, version("sim", 300, ""))
            .unwrap();
        assert_eq!(state.app_version(av).unwrap().version.platform, PRIMARY);
        assert_eq!(state.app_version(av).unwrap().app, app_id);

        let wu = state.link_workunit(project, workunit("wu1", "sim")).unwrap();
        assert_eq!(state.workunit(wu).unwrap().wu.version_num, 300);

        let rid = state.link_result(project, result("r1", "wu1", 0)).unwrap();
        let entry = state.result(rid).unwrap();
        assert_eq!(entry.wu, wu);
        assert_eq!(entry.app_version, av);
        assert_eq!(entry.result.version_num, 300);
    }

    #[test]
    fn test_unsupported_platform_coerced() {
        let (mut state, project) = state();
        state.link_app(project, app("sim")).unwrap();
        let av = state
            .link_app_version(project, version("sim", 1, "sparc-sun-solaris"))
            .unwrap();
        assert_eq!(state.app_version(av).unwrap().version.platform, PRIMARY);

        let alt = state
            .link_app_version(project, version("sim", 1, "i686-pc-linux-gnu"))
            .unwrap();
        assert_eq!(
            state.app_version(alt).unwrap().version.platform,
            "i686-pc-linux-gnu"
        );
    }

    #[test]
    fn test_forward_reference_rejected() {
        let (mut state, project) = state();
        let err = state
            .link_workunit(project, workunit("wu1", "later"))
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert!(state.workunits().is_empty());
    }

    #[test]
    fn test_missing_file_ref() {
        let (mut state, project) = state();
        state.link_app(project, app("sim")).unwrap();
        let mut v = version("sim", 1, PRIMARY);
        v.file_refs.push(FileRef {
            file_name: "sim_1".into(),
            ..Default::default()
        });
        assert!(matches!(
            state.link_app_version(project, v.clone()),
            Err(ClientError::NotFound(_))
        ));

        let file = FileInfo {
            name: "sim_1".into(),
            status: crate::types::FILE_PRESENT,
            ..Default::default()
        };
        let fid = state.link_file_info(project, file, 0.0).unwrap();
        let av = state.link_app_version(project, v).unwrap();
        assert_eq!(state.app_version(av).unwrap().files, vec![fid]);
    }

    #[test]
    fn test_missing_coproc() {
        let (mut state, project) = state();
        state.host_info.coprocs.push(Coproc {
            kind: "NVIDIA".into(),
            count: 1,
            ..Default::default()
        });
        state.link_app(project, app("sim")).unwrap();

        let mut cuda = version("sim", 1, PRIMARY);
        cuda.plan_class = "cuda".into();
        cuda.coproc = Some(CoprocUsage {
            kind: "NVIDIA".into(),
            count: 1.0,
        });
        let mut ati = version("sim", 1, PRIMARY);
        ati.plan_class = "ati".into();
        ati.coproc = Some(CoprocUsage {
            kind: "ATI".into(),
            count: 1.0,
        });

        let cuda = state.link_app_version(project, cuda).unwrap();
        let ati = state.link_app_version(project, ati).unwrap();
        assert_eq!(state.app_version(cuda).unwrap().missing_coproc, None);
        assert_eq!(
            state.app_version(ati).unwrap().missing_coproc.as_deref(),
            Some("ATI")
        );
    }

    #[test]
    fn test_download_queues_transfer() {
        let (mut state, project) = state();
        let file = FileInfo {
            name: "in".into(),
            download_urls: vec!["http://a.org/dl/in".into()],
            ..Default::default()
        };
        let fid = state.link_file_info(project, file, 1000.0).unwrap();
        assert_eq!(state.pers_file_xfers(), &[fid]);
        let pfx = state.file_info(fid).unwrap().file.pers_file_xfer.clone().unwrap();
        assert_eq!(pfx.first_request_time, 1000.0);
        assert!(!pfx.is_upload);
    }

    #[test]
    fn test_anonymous_migration() {
        let (mut state, project) = state();
        state.project_mut(project).unwrap().project.anonymous_platform = true;
        state.link_app(project, app("sim")).unwrap();
        state
            .link_app_version(project, version("sim", 500, PRIMARY))
            .unwrap();
        let newest = state
            .link_app_version(project, version("sim", 510, PRIMARY))
            .unwrap();
        state.link_workunit(project, workunit("wu1", "sim")).unwrap();

        let mut r = result("r1", "wu1", 400);
        r.platform = "i686-pc-linux-gnu".into();
        let rid = state.link_result(project, r).unwrap();
        let entry = state.result(rid).unwrap();
        assert_eq!(entry.app_version, newest);
        assert_eq!(entry.result.version_num, 510);
        assert_eq!(entry.result.platform, PRIMARY);
    }

    #[test]
    fn test_unresolvable_result_without_anonymous_platform() {
        let (mut state, project) = state();
        state.link_app(project, app("sim")).unwrap();
        state
            .link_app_version(project, version("sim", 500, PRIMARY))
            .unwrap();
        state.link_workunit(project, workunit("wu1", "sim")).unwrap();
        let err = state
            .link_result(project, result("r1", "wu1", 400))
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[test]
    fn test_discard_silent_for_anonymous_duplicates() {
        let (mut state, project) = state();
        let dup = || ClientError::NotUnique("app sim".into());
        assert!(state.discard(Some(project), "app", "sim", dup()).is_some());

        state.project_mut(project).unwrap().project.anonymous_platform = true;
        assert!(state.discard(Some(project), "app", "sim", dup()).is_none());
        assert!(state.discard(Some(project), "result", "r1", dup()).is_some());
    }

    #[test]
    fn test_active_task_requires_result() {
        let (mut state, _) = state();
        let task = ActiveTask {
            project_master_url: "http://a.org/".into(),
            result_name: "nope".into(),
            ..Default::default()
        };
        assert!(matches!(
            state.link_active_task(task),
            Err(ClientError::NotFound(_))
        ));

        let task = ActiveTask {
            project_master_url: "http://b.org/".into(),
            ..Default::default()
        };
        assert!(matches!(
            state.link_active_task(task),
            Err(ClientError::NoProject(_))
        ));
    }
}
