//! Line-oriented tagged-text format shared by the state file, scheduler
//! replies, the app-info file and GUI-RPC.
//!
//! This isn't XML: every statement lives on its own line, unknown tags are
//! skipped and attributes are tolerated but mostly ignored.

mod reader;
mod writer;

use std::str::FromStr;
use thiserror::Error;

pub use reader::{Token, XmlReader};
pub use writer::XmlWriter;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing <{0}> wrapper")]
    MissingWrapper(String),

    #[error("unexpected end of stream inside <{tag}> (line {line_no})")]
    UnexpectedEof { tag: String, line_no: usize },

    #[error("malformed line {line_no}: {line}")]
    Malformed { line_no: usize, line: String },
}

/// Numeric field value; garbage decodes to the type's default like `atoi`.
pub fn num<T: FromStr + Default>(value: &str) -> T {
    value.trim().parse().unwrap_or_default()
}

pub fn text(value: &str) -> String {
    decode_entities(value)
}

pub fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn encode_entities(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
