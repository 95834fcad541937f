use super::{SchedulerReply, ServerMessage};
use crate::error::{ClientError, Result};
use crate::state::{ClientState, Discard, ProjectId, ResultId};
use crate::types::{App, AppVersion, FileInfo};

/// What a scheduler reply changed.
#[derive(Debug, Default)]
pub struct MergeReport {
    pub new_results: Vec<ResultId>,
    pub acked_results: usize,
    pub messages: Vec<ServerMessage>,
    pub trickle_downs_delivered: usize,
    pub trickle_up_replaced: bool,
    pub discarded: Vec<Discard>,
}

impl ClientState {
    /// Folds a reply from the scheduler of `url` into the state. New records
    /// go through the same linker as the state file; records the client
    /// already has are updated in place.
    pub fn handle_scheduler_reply(
        &mut self,
        url: &str,
        reply: SchedulerReply,
        now: f64,
    ) -> Result<MergeReport> {
        let Some(project) = self.project_by_url(url).map(|e| e.id) else {
            tracing::error!("scheduler reply for {} which isn't attached", url);
            return Err(ClientError::NoProject(url.to_string()));
        };

        self.update_project_from_reply(project, &reply, now);
        let mut report = MergeReport {
            discarded: reply.discarded,
            ..Default::default()
        };

        let project_name = self
            .project(project)
            .map(|e| e.project.project_name.clone())
            .unwrap_or_default();
        for msg in reply.messages {
            tracing::info!("[{}] message ({}): {}", project_name, msg.priority, msg.body);
            report.messages.push(msg);
        }

        for app in reply.apps {
            self.merge_app(project, app, &mut report);
        }
        for file in reply.file_infos {
            self.merge_file_info(project, file, now, &mut report);
        }
        for version in reply.app_versions {
            self.merge_app_version(project, version, &mut report);
        }

        for wu in reply.workunits {
            if self.lookup_workunit(project, &wu.name).is_some() {
                tracing::debug!("already have workunit {}", wu.name);
                continue;
            }
            let name = wu.name.clone();
            if let Err(err) = self.link_workunit(project, wu) {
                report.discarded.extend(self.discard(Some(project), "workunit", &name, err));
            }
        }

        for mut result in reply.results {
            if self.lookup_result(project, &result.name).is_some() {
                tracing::debug!("already have result {}", result.name);
                continue;
            }
            result.received_time = now;
            let name = result.name.clone();
            match self.link_result(project, result) {
                Ok(id) => report.new_results.push(id),
                Err(err) => report.discarded.extend(self.discard(Some(project), "result", &name, err)),
            }
        }
        if !report.new_results.is_empty() {
            self.sort_results();
        }

        for name in &reply.result_acks {
            let id = self.lookup_result(project, name).map(|e| e.id);
            match id.and_then(|id| self.result_mut(id)) {
                Some(entry) => {
                    entry.result.got_server_ack = true;
                    report.acked_results += 1;
                }
                None => tracing::warn!("got ack for unknown result {}", name),
            }
        }

        for td in &reply.trickle_downs {
            if self.deliver_trickle_down(project, td, now).is_some() {
                report.trickle_downs_delivered += 1;
            }
        }
        report.trickle_up_replaced = self.update_trickle_up_urls(project, &reply.trickle_up_urls);

        self.set_dirty("scheduler reply");
        Ok(report)
    }

    fn update_project_from_reply(&mut self, project: ProjectId, reply: &SchedulerReply, now: f64) {
        let Some(entry) = self.project_mut(project) else {
            return;
        };
        let p = &mut entry.project;

        p.nrpc_failures = 0;
        p.rpc_seqno += 1;
        if let Some(hostid) = reply.hostid.filter(|id| *id != 0) {
            if hostid != p.hostid {
                tracing::info!(
                    "{}: host ID changed from {} to {}",
                    p.master_url,
                    p.hostid,
                    hostid
                );
                p.hostid = hostid;
                p.rpc_seqno = 0;
            }
        }
        if reply.request_delay > 0.0 {
            p.min_rpc_time = now + reply.request_delay;
        }
        if let Some(name) = &reply.project_name {
            p.project_name = name.clone();
        }
        if let Some(name) = &reply.user_name {
            p.user_name = name.clone();
        }
        if let Some(name) = &reply.team_name {
            p.team_name = name.clone();
        }
        if let Some(credit) = reply.user_total_credit {
            p.user_total_credit = credit;
        }
        if let Some(credit) = reply.host_total_credit {
            p.host_total_credit = credit;
        }
        if let Some(prefs) = &reply.project_prefs {
            p.project_prefs = prefs.clone();
        }
    }

    fn merge_app(&mut self, project: ProjectId, app: App, report: &mut MergeReport) {
        match self.lookup_app(project, &app.name).map(|e| e.id) {
            Some(id) => {
                if let Some(entry) = self.app_mut(id) {
                    entry.app.user_friendly_name = app.user_friendly_name;
                    entry.app.non_cpu_intensive = app.non_cpu_intensive;
                }
            }
            None => {
                let name = app.name.clone();
                if let Err(err) = self.link_app(project, app) {
                    report.discarded.extend(self.discard(Some(project), "app", &name, err));
                }
            }
        }
    }

    fn merge_file_info(
        &mut self,
        project: ProjectId,
        file: FileInfo,
        now: f64,
        report: &mut MergeReport,
    ) {
        match self.lookup_file_info(project, &file.name).map(|e| e.id) {
            Some(id) => {
                if let Some(entry) = self.file_info_mut(id) {
                    if !file.download_urls.is_empty() {
                        entry.file.download_urls = file.download_urls;
                    }
                    if !file.upload_urls.is_empty() {
                        entry.file.upload_urls = file.upload_urls;
                    }
                    if !file.file_signature.is_empty() {
                        entry.file.file_signature = file.file_signature;
                    }
                }
            }
            None => {
                let name = file.name.clone();
                if let Err(err) = self.link_file_info(project, file, now) {
                    report.discarded.extend(self.discard(Some(project), "file_info", &name, err));
                }
            }
        }
    }

    fn merge_app_version(&mut self, project: ProjectId, version: AppVersion, report: &mut MergeReport) {
        let platform = if version.platform.is_empty() {
            self.config().primary_platform.clone()
        } else {
            version.platform.clone()
        };
        let existing = self
            .lookup_app(project, &version.app_name)
            .and_then(|app| {
                self.lookup_app_version(app.id, &platform, version.version_num, &version.plan_class)
            })
            .map(|e| e.id);

        match existing {
            Some(id) => {
                if let Some(entry) = self.app_version_mut(id) {
                    let v = &mut entry.version;
                    v.avg_ncpus = version.avg_ncpus;
                    v.max_ncpus = version.max_ncpus;
                    v.flops = version.flops;
                    v.gpu_ram = version.gpu_ram;
                    v.cmdline = version.cmdline;
                }
            }
            None => {
                let name = format!("{} {}", version.app_name, version.version_num);
                if let Err(err) = self.link_app_version(project, version) {
                    report.discarded.extend(self.discard(Some(project), "app_version", &name, err));
                }
            }
        }
    }
}
