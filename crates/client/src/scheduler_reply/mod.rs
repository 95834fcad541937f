//! Scheduler replies and how they are folded into the client state.

mod merge;
mod trickle;

use crate::state::{parse_record as record, Discard};
use crate::types::{App, AppVersion, FileInfo, TaskResult, Workunit};
use crate::xml::{self, ParseError, Token, XmlReader};

pub use merge::MergeReport;
pub use trickle::TrickleUpEndpoint;

/// User-visible notice sent by a project.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ServerMessage {
    pub priority: String,
    pub body: String,
}

/// Opaque payload addressed to the running task of one result.
#[derive(Clone, Debug, PartialEq)]
pub struct TrickleDown {
    pub result_name: String,
    pub body: String,
}

#[derive(Clone, Debug, Default)]
pub struct SchedulerReply {
    pub master_url: String,
    pub request_delay: f64,
    pub hostid: Option<i32>,
    pub project_name: Option<String>,
    pub user_name: Option<String>,
    pub team_name: Option<String>,
    pub user_total_credit: Option<f64>,
    pub host_total_credit: Option<f64>,
    pub project_prefs: Option<String>,
    pub messages: Vec<ServerMessage>,
    pub apps: Vec<App>,
    pub file_infos: Vec<FileInfo>,
    pub app_versions: Vec<AppVersion>,
    pub workunits: Vec<Workunit>,
    pub results: Vec<TaskResult>,
    pub result_acks: Vec<String>,
    pub trickle_downs: Vec<TrickleDown>,
    pub trickle_up_urls: Vec<String>,
    /// Records that failed to parse.
    pub discarded: Vec<Discard>,
}

impl SchedulerReply {
    pub fn parse_str(contents: &str) -> Result<Self, ParseError> {
        Self::parse(&mut XmlReader::new(contents))
    }

    /// Parses a reply, including its `<scheduler_reply>` wrapper.
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        loop {
            match r.next()? {
                Some(tok) if tok.matches_start("scheduler_reply") => break,
                // Leading declarations and blank text.
                Some(Token::Text(_)) => continue,
                _ => return Err(ParseError::MissingWrapper("scheduler_reply".into())),
            }
        }

        let mut reply = SchedulerReply::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close {
                    tag: "scheduler_reply",
                } => return Ok(reply),
                Token::Open { tag: "app", .. } => {
                    if let Some(app) = record(r, App::parse, "app", &mut reply.discarded)? {
                        reply.apps.push(app);
                    }
                }
                Token::Open {
                    tag: "file_info", ..
                } => {
                    if let Some(file) = record(r, FileInfo::parse, "file_info", &mut reply.discarded)? {
                        reply.file_infos.push(file);
                    }
                }
                Token::Open {
                    tag: "app_version", ..
                } => {
                    if let Some(version) =
                        record(r, AppVersion::parse, "app_version", &mut reply.discarded)?
                    {
                        reply.app_versions.push(version);
                    }
                }
                Token::Open { tag: "workunit", .. } => {
                    if let Some(wu) = record(r, Workunit::parse, "workunit", &mut reply.discarded)? {
                        reply.workunits.push(wu);
                    }
                }
                Token::Open { tag: "result", .. } => {
                    if let Some(result) = record(r, TaskResult::parse, "result", &mut reply.discarded)? {
                        reply.results.push(result);
                    }
                }
                Token::Open {
                    tag: "result_ack", ..
                } => {
                    if let Some(name) = parse_result_ack(r)? {
                        reply.result_acks.push(name);
                    }
                }
                Token::Open {
                    tag: "project_preferences",
                    ..
                } => reply.project_prefs = Some(r.raw_block(tok)?),
                Token::Open {
                    tag: "trickle_down",
                    ..
                } => {
                    let body = r.raw_block(tok)?;
                    let result_name = trickle_result_name(&body);
                    reply.trickle_downs.push(TrickleDown { result_name, body });
                }
                Token::Open { tag: "message", .. } | Token::Scalar { tag: "message", .. } => {
                    let priority = tok.attr("priority").unwrap_or("low").to_string();
                    let body = match tok {
                        Token::Scalar { value, .. } => xml::text(value),
                        _ => r.raw_block(tok)?,
                    };
                    reply.messages.push(ServerMessage { priority, body });
                }
                Token::Scalar { tag, value, .. } => match tag {
                    "master_url" => reply.master_url = xml::text(value),
                    "request_delay" => reply.request_delay = xml::num(value),
                    "hostid" => reply.hostid = Some(xml::num(value)),
                    "project_name" => reply.project_name = Some(xml::text(value)),
                    "user_name" => reply.user_name = Some(xml::text(value)),
                    "team_name" => reply.team_name = Some(xml::text(value)),
                    "user_total_credit" => reply.user_total_credit = Some(xml::num(value)),
                    "host_total_credit" => reply.host_total_credit = Some(xml::num(value)),
                    "trickle_up_url" => reply.trickle_up_urls.push(xml::text(value)),
                    _ => r.skip_unrecognized(tok)?,
                },
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("scheduler_reply"))
    }
}

fn parse_result_ack(r: &mut XmlReader) -> Result<Option<String>, ParseError> {
    let mut name = None;
    while let Some(tok) = r.next()? {
        match tok {
            Token::Close { tag: "result_ack" } => return Ok(name),
            Token::Scalar { tag: "name", value, .. } => name = Some(xml::text(value)),
            other => r.skip_unrecognized(other)?,
        }
    }
    Err(r.eof_in("result_ack"))
}

fn trickle_result_name(body: &str) -> String {
    let mut name = String::new();
    let mut r = XmlReader::new(body);
    while let Ok(Some(tok)) = r.next() {
        if tok.parse_str("result_name", &mut name) {
            break;
        }
    }
    name
}
