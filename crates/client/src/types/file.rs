use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::WriteMode;

pub const FILE_NOT_PRESENT: i32 = 0;
pub const FILE_PRESENT: i32 = 1;

/// Reference from an app version, workunit or result to a file of the same
/// project.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileRef {
    pub file_name: String,
    pub open_name: String,
    pub main_program: bool,
    pub copy_file: bool,
}

impl FileRef {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut file_ref = FileRef::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "file_ref" } => return Ok(file_ref),
                Token::Scalar {
                    tag: "file_name",
                    value,
                    ..
                } => file_ref.file_name = xml::text(value),
                Token::Scalar {
                    tag: "open_name",
                    value,
                    ..
                } => file_ref.open_name = xml::text(value),
                Token::Empty {
                    tag: "main_program",
                }
                | Token::Scalar {
                    tag: "main_program",
                    ..
                } => file_ref.main_program = tok.flag(),
                Token::Empty { tag: "copy_file" } | Token::Scalar { tag: "copy_file", .. } => {
                    file_ref.copy_file = tok.flag()
                }
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("file_ref"))
    }

    pub fn write(&self, w: &mut XmlWriter) {
        w.open("file_ref")
            .text("file_name", &self.file_name)
            .opt_text("open_name", &self.open_name)
            .flag("main_program", self.main_program)
            .flag("copy_file", self.copy_file)
            .close("file_ref");
    }
}

/// Retry bookkeeping of a transfer that survives client restarts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PersistentFileXfer {
    pub num_retries: i32,
    pub first_request_time: f64,
    pub next_request_time: f64,
    pub time_so_far: f64,
    pub last_bytes_xferred: f64,
    pub is_upload: bool,
}

impl PersistentFileXfer {
    pub fn new(is_upload: bool, now: f64) -> Self {
        PersistentFileXfer {
            first_request_time: now,
            next_request_time: now,
            is_upload,
            ..Default::default()
        }
    }

    fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut pfx = PersistentFileXfer::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close {
                    tag: "persistent_file_xfer",
                } => return Ok(pfx),
                Token::Scalar { tag, value, .. } => match tag {
                    "num_retries" => pfx.num_retries = xml::num(value),
                    "first_request_time" => pfx.first_request_time = xml::num(value),
                    "next_request_time" => pfx.next_request_time = xml::num(value),
                    "time_so_far" => pfx.time_so_far = xml::num(value),
                    "last_bytes_xferred" => pfx.last_bytes_xferred = xml::num(value),
                    "is_upload" => pfx.is_upload = tok.flag(),
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Empty { tag: "is_upload" } => pfx.is_upload = true,
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("persistent_file_xfer"))
    }

    fn write(&self, w: &mut XmlWriter) {
        w.open("persistent_file_xfer")
            .num("num_retries", self.num_retries)
            .num("first_request_time", self.first_request_time)
            .num("next_request_time", self.next_request_time)
            .num("time_so_far", self.time_so_far)
            .num("last_bytes_xferred", self.last_bytes_xferred)
            .flag("is_upload", self.is_upload)
            .close("persistent_file_xfer");
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub md5_cksum: String,
    pub nbytes: f64,
    pub max_nbytes: f64,
    pub status: i32,
    pub executable: bool,
    pub uploaded: bool,
    pub sticky: bool,
    pub upload_when_present: bool,
    pub signature_required: bool,
    pub file_signature: String,
    pub download_urls: Vec<String>,
    pub upload_urls: Vec<String>,
    pub error_msg: String,
    pub pers_file_xfer: Option<PersistentFileXfer>,
}

impl FileInfo {
    /// Parses a `<file_info>` body. A record carrying a failure status never
    /// keeps its transfer object.
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut fi = FileInfo::default();
        let mut legacy_urls = Vec::new();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "file_info" } | Token::Close { tag: "file" } => {
                    // `<url>` predates the split into download and upload lists.
                    if fi.upload_when_present {
                        fi.upload_urls.extend(legacy_urls);
                    } else {
                        fi.download_urls.extend(legacy_urls);
                    }
                    if fi.had_failure() && fi.pers_file_xfer.take().is_some() {
                        tracing::debug!("dropping transfer of failed file {}", fi.name);
                    }
                    return Ok(fi);
                }
                Token::Scalar { tag, value, .. } => match tag {
                    "name" => fi.name = xml::text(value),
                    "md5_cksum" => fi.md5_cksum = xml::text(value),
                    "nbytes" => fi.nbytes = xml::num(value),
                    "max_nbytes" => fi.max_nbytes = xml::num(value),
                    "status" => fi.status = xml::num(value),
                    "download_url" => fi.download_urls.push(xml::text(value)),
                    "upload_url" => fi.upload_urls.push(xml::text(value)),
                    "url" => legacy_urls.push(xml::text(value)),
                    "error_msg" => fi.error_msg = xml::text(value),
                    "executable" => fi.executable = tok.flag(),
                    "uploaded" => fi.uploaded = tok.flag(),
                    "sticky" => fi.sticky = tok.flag(),
                    "upload_when_present" => fi.upload_when_present = tok.flag(),
                    "signature_required" => fi.signature_required = tok.flag(),
                    "file_signature" => fi.file_signature = r.raw_block(tok)?,
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Empty { tag } => match tag {
                    "executable" => fi.executable = true,
                    "uploaded" => fi.uploaded = true,
                    "sticky" => fi.sticky = true,
                    "upload_when_present" => fi.upload_when_present = true,
                    "signature_required" => fi.signature_required = true,
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Open {
                    tag: "file_signature",
                    ..
                } => fi.file_signature = r.raw_block(tok)?,
                Token::Open {
                    tag: "error_msg", ..
                } => fi.error_msg = r.raw_block(tok)?,
                Token::Open {
                    tag: "persistent_file_xfer",
                    ..
                } => fi.pers_file_xfer = Some(PersistentFileXfer::parse(r)?),
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("file_info"))
    }

    pub fn write(&self, w: &mut XmlWriter, mode: WriteMode) {
        w.open("file_info")
            .text("name", &self.name)
            .opt_text("md5_cksum", &self.md5_cksum)
            .num("nbytes", self.nbytes)
            .num("max_nbytes", self.max_nbytes)
            .num("status", self.status)
            .flag("executable", self.executable)
            .flag("uploaded", self.uploaded)
            .flag("sticky", self.sticky)
            .flag("upload_when_present", self.upload_when_present)
            .flag("signature_required", self.signature_required);
        for url in &self.download_urls {
            w.text("download_url", url);
        }
        for url in &self.upload_urls {
            w.text("upload_url", url);
        }
        if mode == WriteMode::StateFile && !self.file_signature.is_empty() {
            w.raw("file_signature", &self.file_signature);
        }
        if !self.error_msg.is_empty() {
            w.raw("error_msg", &self.error_msg);
        }
        if let Some(pfx) = &self.pers_file_xfer {
            pfx.write(w);
        }
        w.close("file_info");
    }

    pub fn had_failure(&self) -> bool {
        self.status != FILE_NOT_PRESENT && self.status != FILE_PRESENT
    }

    /// Whether the file still has to move over the network.
    pub fn needs_transfer(&self) -> bool {
        if self.had_failure() {
            return false;
        }
        let download = self.status == FILE_NOT_PRESENT && !self.download_urls.is_empty();
        let upload = self.status == FILE_PRESENT && self.upload_when_present && !self.uploaded;
        download || upload
    }

    pub fn is_upload(&self) -> bool {
        self.upload_when_present && self.status == FILE_PRESENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_WITH_XFER: &str = r#"<name>input_1</name>
<nbytes>1024</nbytes>
<status>STATUS</status>
<download_url>http://a.org/dl/input_1</download_url>
<persistent_file_xfer>
    <num_retries>3</num_retries>
    <first_request_time>100</first_request_time>
    <next_request_time>160</next_request_time>
    <time_so_far>12.5</time_so_far>
    <last_bytes_xferred>512</last_bytes_xferred>
</persistent_file_xfer>
</file_info>"#;

    #[test]
    fn test_transfer_kept_for_healthy_file() {
        let input = FILE_WITH_XFER.replace("STATUS", "0");
        let mut r = XmlReader::new(&input);
        let fi = FileInfo::parse(&mut r).unwrap();
        assert!(fi.needs_transfer());
        let pfx = fi.pers_file_xfer.as_ref().expect("transfer kept");
        assert_eq!(pfx.num_retries, 3);
        assert_eq!(pfx.time_so_far, 12.5);
    }

    #[test]
    fn test_transfer_dropped_after_failure() {
        let input = FILE_WITH_XFER.replace("STATUS", "-161");
        let mut r = XmlReader::new(&input);
        let fi = FileInfo::parse(&mut r).unwrap();
        assert!(fi.had_failure());
        assert!(fi.pers_file_xfer.is_none());
        assert!(!fi.needs_transfer());
    }

    #[test]
    fn test_legacy_url_follows_direction() {
        let input = "<name>out</name>\n<upload_when_present/>\n<url>http://a.org/upload</url>\n</file_info>";
        let mut r = XmlReader::new(input);
        let fi = FileInfo::parse(&mut r).unwrap();
        assert_eq!(fi.upload_urls, vec!["http://a.org/upload".to_string()]);
        assert!(fi.download_urls.is_empty());
    }

    #[test]
    fn test_single_line_signature_is_verbatim() {
        let input = "<name>sig</name>\n<file_signature>ab&amp;<cd></file_signature>\n</file_info>";
        let mut r = XmlReader::new(input);
        let fi = FileInfo::parse(&mut r).unwrap();
        assert_eq!(fi.file_signature, "ab&amp;<cd>");
    }
}
