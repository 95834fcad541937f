use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::{canonicalize_master_url, WriteMode};

/// Persisted part of a running task. The result is referenced by project
/// URL and name until the linker resolves it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActiveTask {
    pub project_master_url: String,
    pub result_name: String,
    pub task_state: i32,
    pub app_version_num: i32,
    pub slot: u32,
    pub checkpoint_cpu_time: f64,
    pub checkpoint_elapsed_time: f64,
    pub fraction_done: f64,
    pub current_cpu_time: f64,
}

impl ActiveTask {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut at = ActiveTask::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "active_task" } => {
                    at.project_master_url = canonicalize_master_url(&at.project_master_url);
                    return Ok(at);
                }
                Token::Scalar { tag, value, .. } => match tag {
                    "project_master_url" => at.project_master_url = xml::text(value),
                    "result_name" => at.result_name = xml::text(value),
                    "active_task_state" => at.task_state = xml::num(value),
                    "app_version_num" => at.app_version_num = xml::num(value),
                    "slot" => at.slot = xml::num(value),
                    "checkpoint_cpu_time" => at.checkpoint_cpu_time = xml::num(value),
                    "checkpoint_elapsed_time" => at.checkpoint_elapsed_time = xml::num(value),
                    "fraction_done" => at.fraction_done = xml::num(value),
                    "current_cpu_time" => at.current_cpu_time = xml::num(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("active_task"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("active_task")
            .text("project_master_url", &self.project_master_url)
            .text("result_name", &self.result_name)
            .num("active_task_state", self.task_state)
            .num("app_version_num", self.app_version_num)
            .num("slot", self.slot)
            .num("checkpoint_cpu_time", self.checkpoint_cpu_time)
            .num("checkpoint_elapsed_time", self.checkpoint_elapsed_time)
            .num("fraction_done", self.fraction_done)
            .num("current_cpu_time", self.current_cpu_time)
            .close("active_task");
    }
}

/// Parses an `<active_task_set>` body into unlinked records.
pub fn parse_active_task_set(r: &mut XmlReader) -> Result<Vec<ActiveTask>, ParseError> {
    let mut tasks = Vec::new();
    while let Some(tok) = r.next()? {
        match tok {
            Token::Close {
                tag: "active_task_set",
            } => return Ok(tasks),
            Token::Open {
                tag: "active_task", ..
            } => tasks.push(ActiveTask::parse(r)?),
            other => r.skip_unrecognized(other)?,
        }
    }
    Err(r.eof_in("active_task_set"))
}
