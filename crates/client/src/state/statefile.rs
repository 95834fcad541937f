use std::path::PathBuf;

use super::{now, ClientState, Discard, ProjectId};
use crate::error::{ClientError, Result};
use crate::types::{
    parse_active_task_set, App, AppVersion, FileInfo, HostInfo, NetStats, Project, ProxyInfo,
    RunMode, TaskResult, TimeStats, WriteMode, Workunit,
};
use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

/// Outcome of a load: which generation was used and what was dropped.
#[derive(Clone, Debug, Default)]
pub struct LoadReport {
    pub source: Option<PathBuf>,
    pub discarded: Vec<Discard>,
}

/// Parses one record. A malformed line costs only that record; running out
/// of input is fatal for the whole stream.
pub(crate) fn record<'a, T>(
    r: &mut XmlReader<'a>,
    parse: impl FnOnce(&mut XmlReader<'a>) -> std::result::Result<T, ParseError>,
    kind: &'static str,
    discarded: &mut Vec<Discard>,
) -> std::result::Result<Option<T>, ParseError> {
    match parse(r) {
        Ok(value) => Ok(Some(value)),
        Err(err @ ParseError::Malformed { .. }) => {
            tracing::warn!("discarding {}: {}", kind, err);
            discarded.push(Discard {
                kind,
                name: String::new(),
                project: None,
                reason: err.to_string(),
            });
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn in_project(current: Option<ProjectId>, kind: &str) -> Result<ProjectId> {
    current.ok_or_else(|| ClientError::NoProject(format!("{kind} precedes any <project>")))
}

impl ClientState {
    /// Replaces the graph with the newest usable state file. Finding none is
    /// the normal first-run case and leaves the state empty.
    pub fn load(&mut self) -> LoadReport {
        for path in self.files.candidates() {
            let Some(contents) = self.files.read_valid(&path) else {
                continue;
            };

            let mut fresh = ClientState::new(self.config.clone());
            match fresh.load_from_str(&contents) {
                Ok(mut report) => {
                    tracing::info!(
                        "loaded {} projects and {} results from {:#?}",
                        fresh.projects.len(),
                        fresh.results.len(),
                        path
                    );
                    if !report.discarded.is_empty() {
                        fresh.set_dirty("records discarded during load");
                    }
                    report.source = Some(path);
                    *self = fresh;
                    return report;
                }
                Err(err) => tracing::warn!("state file {:#?} is unusable: {}", path, err),
            }
        }

        tracing::info!(
            "no usable state file in {:#?}; starting with an empty state",
            self.files.data_dir()
        );
        LoadReport::default()
    }

    /// Single pass over a state file: each record is parsed and linked
    /// before the next one is read, so projects must precede their
    /// dependents.
    pub fn load_from_str(&mut self, contents: &str) -> std::result::Result<LoadReport, ParseError> {
        let flags = self.config.log_flags;
        let mut r = XmlReader::new(contents).log_unparsed(flags.unparsed_xml);
        match r.next()? {
            Some(tok) if tok.matches_start("client_state") => {}
            _ => return Err(ParseError::MissingWrapper("client_state".into())),
        }

        let now = now();
        let mut report = LoadReport::default();
        let mut current: Option<ProjectId> = None;
        let mut stored_version = (0, 0, 0);

        loop {
            let tok = match r.next() {
                Ok(Some(tok)) => tok,
                Ok(None) => return Err(ParseError::MissingWrapper("/client_state".into())),
                Err(err @ ParseError::Malformed { .. }) => {
                    tracing::warn!("skipping {}", err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            match tok {
                Token::Close {
                    tag: "client_state",
                } => break,
                Token::Open { tag: "project", .. } => {
                    current = None;
                    let parsed = record(&mut r, Project::parse, "project", &mut report.discarded)?;
                    if let Some(project) = parsed {
                        let url = project.master_url.clone();
                        match self.link_project(project) {
                            Ok(id) => {
                                self.load_app_info(id, &mut report);
                                current = Some(id);
                            }
                            Err(err) => report.discarded.extend(self.discard(None, "project", &url, err)),
                        }
                    }
                }
                Token::Open { tag: "app", .. } => {
                    if let Some(app) = record(&mut r, App::parse, "app", &mut report.discarded)? {
                        let name = app.name.clone();
                        let linked = in_project(current, "app").and_then(|p| self.link_app(p, app));
                        if let Err(err) = linked {
                            report.discarded.extend(self.discard(current, "app", &name, err));
                        }
                    }
                }
                Token::Open {
                    tag: "file_info", ..
                } => {
                    let parsed = record(&mut r, FileInfo::parse, "file_info", &mut report.discarded)?;
                    if let Some(file) = parsed {
                        let name = file.name.clone();
                        let linked = in_project(current, "file_info")
                            .and_then(|p| self.link_file_info(p, file, now));
                        if let Err(err) = linked {
                            report.discarded.extend(self.discard(current, "file_info", &name, err));
                        }
                    }
                }
                Token::Open {
                    tag: "app_version", ..
                } => {
                    let parsed =
                        record(&mut r, AppVersion::parse, "app_version", &mut report.discarded)?;
                    if let Some(version) = parsed {
                        let name = format!("{} {}", version.app_name, version.version_num);
                        let linked = in_project(current, "app_version")
                            .and_then(|p| self.link_app_version(p, version));
                        if let Err(err) = linked {
                            report.discarded.extend(self.discard(current, "app_version", &name, err));
                        }
                    }
                }
                Token::Open { tag: "workunit", .. } => {
                    let parsed = record(&mut r, Workunit::parse, "workunit", &mut report.discarded)?;
                    if let Some(wu) = parsed {
                        let name = wu.name.clone();
                        let linked = in_project(current, "workunit")
                            .and_then(|p| self.link_workunit(p, wu));
                        if let Err(err) = linked {
                            report.discarded.extend(self.discard(current, "workunit", &name, err));
                        }
                    }
                }
                Token::Open { tag: "result", .. } => {
                    let parsed = record(&mut r, TaskResult::parse, "result", &mut report.discarded)?;
                    if let Some(result) = parsed {
                        let name = result.name.clone();
                        let linked = in_project(current, "result")
                            .and_then(|p| self.link_result(p, result));
                        if let Err(err) = linked {
                            report.discarded.extend(self.discard(current, "result", &name, err));
                        }
                    }
                }
                Token::Open {
                    tag: "active_task_set",
                    ..
                } => {
                    let parsed = record(
                        &mut r,
                        parse_active_task_set,
                        "active_task_set",
                        &mut report.discarded,
                    )?;
                    for task in parsed.unwrap_or_default() {
                        let name = task.result_name.clone();
                        let project = self.project_by_url(&task.project_master_url).map(|e| e.id);
                        if let Err(err) = self.link_active_task(task) {
                            report.discarded.extend(self.discard(project, "active_task", &name, err));
                        }
                    }
                }
                Token::Open { tag: "host_info", .. } => {
                    if let Some(host) = record(&mut r, HostInfo::parse, "host_info", &mut report.discarded)? {
                        self.host_info = host;
                    }
                }
                Token::Open { tag: "time_stats", .. } => {
                    if let Some(ts) = record(&mut r, TimeStats::parse, "time_stats", &mut report.discarded)? {
                        self.time_stats = ts;
                    }
                }
                Token::Open { tag: "net_stats", .. } => {
                    if let Some(ns) = record(&mut r, NetStats::parse, "net_stats", &mut report.discarded)? {
                        self.net_stats = ns;
                    }
                }
                Token::Open {
                    tag: "proxy_info", ..
                } => {
                    if let Some(pi) = record(&mut r, ProxyInfo::parse, "proxy_info", &mut report.discarded)? {
                        self.proxy_info = pi;
                    }
                }
                Token::Scalar { tag, value, .. } => match tag {
                    "platform_name" => {
                        let stored = xml::text(value);
                        if stored != self.config.primary_platform {
                            tracing::info!(
                                "platform changed from {} to {}",
                                stored,
                                self.config.primary_platform
                            );
                        }
                    }
                    // Recomputed from the running build.
                    "alt_platform" => {}
                    "core_client_major_version" => stored_version.0 = xml::num(value),
                    "core_client_minor_version" => stored_version.1 = xml::num(value),
                    "core_client_release" => stored_version.2 = xml::num(value),
                    "user_run_request" => {
                        self.meta.user_run_request = RunMode::from_code(xml::num(value))
                    }
                    "user_gpu_request" => {
                        self.meta.user_gpu_request = RunMode::from_code(xml::num(value))
                    }
                    "user_network_request" => {
                        self.meta.user_network_request = RunMode::from_code(xml::num(value))
                    }
                    "host_venue" => self.meta.host_venue = xml::text(value),
                    "new_version_check_time" => self.meta.new_version_check_time = xml::num(value),
                    "all_projects_list_check_time" => {
                        self.meta.all_projects_list_check_time = xml::num(value)
                    }
                    "newer_version" => self.meta.newer_version = xml::text(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                other => r.skip_unrecognized(other)?,
            }
        }

        let running = (
            self.meta.core_client_major_version,
            self.meta.core_client_minor_version,
            self.meta.core_client_release,
        );
        if stored_version != (0, 0, 0) && stored_version != running {
            tracing::info!(
                "version change ({}.{}.{} -> {}.{}.{})",
                stored_version.0,
                stored_version.1,
                stored_version.2,
                running.0,
                running.1,
                running.2
            );
        }

        self.fix_zero_resource_shares();
        self.sort_results();

        if flags.state_debug {
            tracing::debug!(
                "[state] {} projects, {} apps, {} app versions, {} workunits, {} results, {} files, {} discarded",
                self.projects.len(),
                self.apps.len(),
                self.app_versions.len(),
                self.workunits.len(),
                self.results.len(),
                self.file_infos.len(),
                report.discarded.len()
            );
        }
        Ok(report)
    }

    /// Serializes the whole graph. Each project is followed by its own
    /// records, dependents after what they reference, so the output loads
    /// in a single pass.
    pub fn write_state(&self, mode: WriteMode) -> String {
        let mut w = XmlWriter::new();
        w.open("client_state");
        self.host_info.write(&mut w, mode);
        self.time_stats.write(&mut w, mode);
        self.net_stats.write(&mut w, mode);

        for p in &self.projects {
            p.project.write(&mut w, mode);
            for e in self.apps.iter().filter(|e| e.project == p.id) {
                e.app.write(&mut w, mode);
            }
            for e in self.file_infos.iter().filter(|e| e.project == p.id) {
                // Reloaded from app_info.xml on the next start.
                if mode == WriteMode::StateFile && p.project.anonymous_platform && e.from_app_info {
                    continue;
                }
                e.file.write(&mut w, mode);
            }
            for e in self.app_versions.iter().filter(|e| e.project == p.id) {
                e.version.write(&mut w, mode);
            }
            for e in self.workunits.iter().filter(|e| e.project == p.id) {
                e.wu.write(&mut w, mode);
            }
            for e in self.results.iter().filter(|e| e.project == p.id) {
                e.result.write(&mut w, mode);
            }
        }

        w.open("active_task_set");
        for e in &self.active_tasks {
            e.task.write(&mut w, mode);
        }
        w.close("active_task_set");

        w.text("platform_name", &self.meta.platform_name);
        for alt in &self.meta.alt_platforms {
            w.text("alt_platform", alt);
        }
        w.num("core_client_major_version", self.meta.core_client_major_version)
            .num("core_client_minor_version", self.meta.core_client_minor_version)
            .num("core_client_release", self.meta.core_client_release)
            .num("user_run_request", self.meta.user_run_request.code())
            .num("user_gpu_request", self.meta.user_gpu_request.code())
            .num("user_network_request", self.meta.user_network_request.code());
        self.proxy_info.write(&mut w, mode);
        w.opt_text("host_venue", &self.meta.host_venue)
            .num("new_version_check_time", self.meta.new_version_check_time)
            .num(
                "all_projects_list_check_time",
                self.meta.all_projects_list_check_time,
            )
            .opt_text("newer_version", &self.meta.newer_version);
        w.close("client_state");
        w.into_string()
    }

    /// Writes the state file. On failure the store stays dirty so a later
    /// attempt writes it again.
    pub fn save(&mut self) -> Result<()> {
        if self.config.log_flags.state_debug {
            tracing::debug!(
                "[state] writing state file ({})",
                self.dirty.as_deref().unwrap_or("explicit save")
            );
        }
        let contents = self.write_state(WriteMode::StateFile);
        self.files.write_rotate(&contents)?;
        self.dirty = None;
        Ok(())
    }

    /// Returns whether a write happened.
    pub fn save_if_needed(&mut self) -> Result<bool> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}
