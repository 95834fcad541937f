use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::TrickleDown;
use crate::state::{ClientState, ProjectId};

/// Server endpoint that accepts trickle-up messages from running tasks.
/// Each endpoint carries one request at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrickleUpEndpoint {
    pub url: String,
    busy: bool,
}

impl TrickleUpEndpoint {
    pub fn new(url: &str) -> Self {
        TrickleUpEndpoint {
            url: url.to_string(),
            busy: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

impl ClientState {
    /// Replaces the endpoints of a project when the announced set differs
    /// from the registered one. Order doesn't matter; an empty announcement
    /// leaves the registration alone.
    pub(crate) fn update_trickle_up_urls(&mut self, project: ProjectId, urls: &[String]) -> bool {
        if urls.is_empty() {
            return false;
        }
        let Some(entry) = self.project_mut(project) else {
            return false;
        };

        let announced: BTreeSet<&str> = urls.iter().map(String::as_str).collect();
        let registered: BTreeSet<&str> = entry.trickle_up.iter().map(|e| e.url.as_str()).collect();
        if announced == registered {
            return false;
        }

        tracing::info!(
            "{}: trickle-up endpoints changed to {:?}",
            entry.project.master_url,
            announced
        );
        entry.trickle_up = announced.into_iter().map(TrickleUpEndpoint::new).collect();
        true
    }

    /// Claims an endpoint for one outgoing request. Returns false when it is
    /// unknown or already in use.
    pub fn begin_trickle_up(&mut self, project: ProjectId, url: &str) -> bool {
        let Some(entry) = self.project_mut(project) else {
            return false;
        };
        match entry.trickle_up.iter_mut().find(|e| e.url == url) {
            Some(endpoint) if !endpoint.busy => {
                endpoint.busy = true;
                true
            }
            _ => false,
        }
    }

    pub fn finish_trickle_up(&mut self, project: ProjectId, url: &str) {
        if let Some(endpoint) = self
            .project_mut(project)
            .and_then(|e| e.trickle_up.iter_mut().find(|e| e.url == url))
        {
            endpoint.busy = false;
        }
    }

    /// Hands a trickle-down message to the task it's addressed to by
    /// writing it into the task's slot directory. Messages for results that
    /// aren't running are dropped.
    pub(crate) fn deliver_trickle_down(
        &mut self,
        project: ProjectId,
        td: &TrickleDown,
        now: f64,
    ) -> Option<PathBuf> {
        let Some(result) = self.lookup_result(project, &td.result_name).map(|e| e.id) else {
            tracing::debug!("trickle-down for unknown result {}", td.result_name);
            return None;
        };
        let slot = match self.active_task_for(result) {
            Some(at) => at.task.slot,
            None => {
                tracing::debug!("trickle-down for {} which isn't running", td.result_name);
                return None;
            }
        };

        let dir = self
            .state_files()
            .data_dir()
            .join("slots")
            .join(slot.to_string());
        let path = match std::fs::create_dir_all(&dir)
            .and_then(|_| write_new_trickle_file(&dir, now as i64, &td.body))
        {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!("can't write trickle-down file in {:#?}: {}", dir, err);
                return None;
            }
        };

        if let Some(at) = self.active_task_for_mut(result) {
            at.have_trickle_down = true;
        }
        tracing::debug!("trickle-down for {} written to {:#?}", td.result_name, path);
        Some(path)
    }
}

/// Writes `body` to `trickle_down_<stamp>`, or to `trickle_down_<stamp>_<n>`
/// when earlier messages of the same second are still in the slot.
fn write_new_trickle_file(dir: &Path, stamp: i64, body: &str) -> std::io::Result<PathBuf> {
    let mut seq = 0u32;
    loop {
        let name = match seq {
            0 => format!("trickle_down_{stamp}"),
            n => format!("trickle_down_{stamp}_{n}"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut fd) => {
                fd.write_all(body.as_bytes())?;
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => seq += 1,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::types::Project;

    fn state() -> (ClientState, ProjectId) {
        let mut state = ClientState::new(ClientConfig::new("/nonexistent"));
        let id = state.link_project(Project::new("http://a.org/")).unwrap();
        (state, id)
    }

    #[test]
    fn test_replacement_is_order_independent() {
        let (mut state, id) = state();
        let ab = vec!["http://a.org/t1".to_string(), "http://a.org/t2".to_string()];
        let ba: Vec<String> = ab.iter().rev().cloned().collect();

        assert!(state.update_trickle_up_urls(id, &ab));
        assert!(state.begin_trickle_up(id, "http://a.org/t1"));
        assert!(!state.update_trickle_up_urls(id, &ba));
        // Unchanged set keeps the in-flight request.
        assert!(state.project(id).unwrap().trickle_up_endpoints()[0].is_busy());

        assert!(state.update_trickle_up_urls(id, &["http://a.org/t3".to_string()]));
        let endpoints = state.project(id).unwrap().trickle_up_endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].url, "http://a.org/t3");
    }

    #[test]
    fn test_busy_flag_per_endpoint() {
        let (mut state, id) = state();
        let urls = vec!["http://a.org/t1".to_string(), "http://a.org/t2".to_string()];
        state.update_trickle_up_urls(id, &urls);

        assert!(state.begin_trickle_up(id, "http://a.org/t1"));
        assert!(!state.begin_trickle_up(id, "http://a.org/t1"));
        assert!(state.begin_trickle_up(id, "http://a.org/t2"));
        state.finish_trickle_up(id, "http://a.org/t1");
        assert!(state.begin_trickle_up(id, "http://a.org/t1"));
        assert!(!state.begin_trickle_up(id, "http://a.org/unknown"));
    }

    #[test]
    fn test_trickle_down_for_unknown_result_is_ignored() {
        let (mut state, id) = state();
        let td = TrickleDown {
            result_name: "nope".into(),
            body: "<x>1</x>".into(),
        };
        assert!(state.deliver_trickle_down(id, &td, 100.0).is_none());
    }
}
