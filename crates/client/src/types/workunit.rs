use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::{FileRef, WriteMode};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workunit {
    pub name: String,
    pub app_name: String,
    pub version_num: i32,
    pub command_line: String,
    pub rsc_fpops_est: f64,
    pub rsc_fpops_bound: f64,
    pub rsc_memory_bound: f64,
    pub rsc_disk_bound: f64,
    pub input_files: Vec<FileRef>,
}

impl Workunit {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut wu = Workunit::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "workunit" } => return Ok(wu),
                Token::Scalar { tag, value, .. } => match tag {
                    "name" => wu.name = xml::text(value),
                    "app_name" => wu.app_name = xml::text(value),
                    "version_num" => wu.version_num = xml::num(value),
                    "command_line" => wu.command_line = xml::text(value),
                    "rsc_fpops_est" => wu.rsc_fpops_est = xml::num(value),
                    "rsc_fpops_bound" => wu.rsc_fpops_bound = xml::num(value),
                    "rsc_memory_bound" => wu.rsc_memory_bound = xml::num(value),
                    "rsc_disk_bound" => wu.rsc_disk_bound = xml::num(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Open { tag: "file_ref", .. } => wu.input_files.push(FileRef::parse(r)?),
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("workunit"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("workunit")
            .text("name", &self.name)
            .text("app_name", &self.app_name)
            .num("version_num", self.version_num)
            .opt_text("command_line", &self.command_line)
            .num("rsc_fpops_est", self.rsc_fpops_est)
            .num("rsc_fpops_bound", self.rsc_fpops_bound)
            .num("rsc_memory_bound", self.rsc_memory_bound)
            .num("rsc_disk_bound", self.rsc_disk_bound);
        for file_ref in &self.input_files {
            file_ref.write(w);
        }
        w.close("workunit");
    }
}
