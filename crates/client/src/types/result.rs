use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::{FileRef, WriteMode};

/// File-transfer state of a result, stored as its legacy integer code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResultState {
    #[default]
    New,
    FilesDownloading,
    FilesDownloaded,
    ComputeError,
    FilesUploading,
    FilesUploaded,
    Aborted,
    UploadFailed,
}

impl ResultState {
    pub fn code(self) -> i32 {
        match self {
            ResultState::New => 0,
            ResultState::FilesDownloading => 1,
            ResultState::FilesDownloaded => 2,
            ResultState::ComputeError => 3,
            ResultState::FilesUploading => 4,
            ResultState::FilesUploaded => 5,
            ResultState::Aborted => 6,
            ResultState::UploadFailed => 7,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ResultState::FilesDownloading,
            2 => ResultState::FilesDownloaded,
            3 => ResultState::ComputeError,
            4 => ResultState::FilesUploading,
            5 => ResultState::FilesUploaded,
            6 => ResultState::Aborted,
            7 => ResultState::UploadFailed,
            _ => ResultState::New,
        }
    }

    pub fn computation_done(self) -> bool {
        self >= ResultState::ComputeError
    }
}

/// Where a task sits in its lifecycle, derived from the persisted state,
/// its flags and whether an active task exists for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultPhase {
    Queued,
    Running,
    Suspended,
    ComputeDone,
    ReadyToReport,
    ServerAcknowledged,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskResult {
    pub name: String,
    pub wu_name: String,
    pub platform: String,
    pub version_num: i32,
    pub plan_class: String,
    pub final_cpu_time: f64,
    pub final_elapsed_time: f64,
    pub exit_status: i32,
    pub state: ResultState,
    pub ready_to_report: bool,
    pub got_server_ack: bool,
    pub suspended_via_gui: bool,
    pub report_deadline: f64,
    pub received_time: f64,
    pub completed_time: f64,
    pub output_files: Vec<FileRef>,
    pub stderr_out: String,
}

impl TaskResult {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut result = TaskResult::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "result" } => return Ok(result),
                Token::Scalar { tag, value, .. } => match tag {
                    "name" => result.name = xml::text(value),
                    "wu_name" => result.wu_name = xml::text(value),
                    "platform" => result.platform = xml::text(value),
                    "version_num" => result.version_num = xml::num(value),
                    "plan_class" => result.plan_class = xml::text(value),
                    "final_cpu_time" => result.final_cpu_time = xml::num(value),
                    "final_elapsed_time" => result.final_elapsed_time = xml::num(value),
                    "exit_status" => result.exit_status = xml::num(value),
                    "state" => result.state = ResultState::from_code(xml::num(value)),
                    "report_deadline" => result.report_deadline = xml::num(value),
                    "received_time" => result.received_time = xml::num(value),
                    "completed_time" => result.completed_time = xml::num(value),
                    "ready_to_report" => result.ready_to_report = tok.flag(),
                    "got_server_ack" => result.got_server_ack = tok.flag(),
                    "suspended_via_gui" => result.suspended_via_gui = tok.flag(),
                    "stderr_out" => result.stderr_out = r.raw_block(tok)?,
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Empty { tag } => match tag {
                    "ready_to_report" => result.ready_to_report = true,
                    "got_server_ack" => result.got_server_ack = true,
                    "suspended_via_gui" => result.suspended_via_gui = true,
                    _ => r.skip_unrecognized(tok)?,
                },
                // Task output may itself look like tags; take it verbatim.
                Token::Open {
                    tag: "stderr_out", ..
                } => result.stderr_out = r.raw_block(tok)?,
                Token::Open { tag: "file_ref", .. } => {
                    result.output_files.push(FileRef::parse(r)?)
                }
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("result"))
    }

    pub fn write(&self, w: &mut XmlWriter, mode: WriteMode) {
        w.open("result")
            .text("name", &self.name)
            .text("wu_name", &self.wu_name)
            .text("platform", &self.platform)
            .num("version_num", self.version_num)
            .opt_text("plan_class", &self.plan_class)
            .num("final_cpu_time", self.final_cpu_time)
            .num("final_elapsed_time", self.final_elapsed_time)
            .num("exit_status", self.exit_status)
            .num("state", self.state.code())
            .num("report_deadline", self.report_deadline)
            .num("received_time", self.received_time)
            .num("completed_time", self.completed_time)
            .flag("ready_to_report", self.ready_to_report)
            .flag("got_server_ack", self.got_server_ack)
            .flag("suspended_via_gui", self.suspended_via_gui);
        for file_ref in &self.output_files {
            file_ref.write(w);
        }
        if mode == WriteMode::StateFile && !self.stderr_out.is_empty() {
            w.raw("stderr_out", &self.stderr_out);
        }
        w.close("result");
    }

    pub fn phase(&self, running: bool) -> ResultPhase {
        if self.got_server_ack {
            ResultPhase::ServerAcknowledged
        } else if self.ready_to_report {
            ResultPhase::ReadyToReport
        } else if self.state.computation_done() {
            ResultPhase::ComputeDone
        } else if self.suspended_via_gui {
            ResultPhase::Suspended
        } else if running {
            ResultPhase::Running
        } else {
            ResultPhase::Queued
        }
    }
}
