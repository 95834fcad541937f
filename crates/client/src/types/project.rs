use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::WriteMode;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Project {
    pub master_url: String,
    pub project_name: String,
    pub user_name: String,
    pub team_name: String,
    pub authenticator: String,
    pub resource_share: f64,
    pub rpc_seqno: i32,
    pub hostid: i32,
    pub nrpc_failures: i32,
    pub master_fetch_failures: i32,
    pub min_rpc_time: f64,
    pub user_total_credit: f64,
    pub host_total_credit: f64,
    pub anonymous_platform: bool,
    pub dont_request_more_work: bool,
    pub suspended_via_gui: bool,
    pub detach_when_done: bool,
    pub project_prefs: String,
}

impl Project {
    pub fn new(master_url: &str) -> Self {
        Project {
            master_url: canonicalize_master_url(master_url),
            resource_share: 100.0,
            ..Default::default()
        }
    }

    /// Parses the body of a `<project>` block; the start tag has already
    /// been consumed.
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut p = Project::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "project" } => {
                    p.master_url = canonicalize_master_url(&p.master_url);
                    return Ok(p);
                }
                Token::Scalar { tag, value, .. } => match tag {
                    "master_url" => p.master_url = xml::text(value),
                    "project_name" => p.project_name = xml::text(value),
                    "user_name" => p.user_name = xml::text(value),
                    "team_name" => p.team_name = xml::text(value),
                    "authenticator" => p.authenticator = xml::text(value),
                    "resource_share" => p.resource_share = xml::num(value),
                    "rpc_seqno" => p.rpc_seqno = xml::num(value),
                    "hostid" => p.hostid = xml::num(value),
                    "nrpc_failures" => p.nrpc_failures = xml::num(value),
                    "master_fetch_failures" => p.master_fetch_failures = xml::num(value),
                    "min_rpc_time" => p.min_rpc_time = xml::num(value),
                    "user_total_credit" => p.user_total_credit = xml::num(value),
                    "host_total_credit" => p.host_total_credit = xml::num(value),
                    "anonymous_platform" => p.anonymous_platform = tok.flag(),
                    "dont_request_more_work" => p.dont_request_more_work = tok.flag(),
                    "suspended_via_gui" => p.suspended_via_gui = tok.flag(),
                    "detach_when_done" => p.detach_when_done = tok.flag(),
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Empty { tag } => match tag {
                    "anonymous_platform" => p.anonymous_platform = true,
                    "dont_request_more_work" => p.dont_request_more_work = true,
                    "suspended_via_gui" => p.suspended_via_gui = true,
                    "detach_when_done" => p.detach_when_done = true,
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Open {
                    tag: "project_preferences",
                    ..
                } => p.project_prefs = r.raw_block(tok)?,
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("project"))
    }

    pub fn write(&self, w: &mut XmlWriter, mode: WriteMode) {
        w.open("project")
            .text("master_url", &self.master_url)
            .text("project_name", &self.project_name)
            .text("user_name", &self.user_name)
            .text("team_name", &self.team_name);
        if mode == WriteMode::StateFile {
            w.opt_text("authenticator", &self.authenticator);
        }
        w.num("resource_share", self.resource_share)
            .num("rpc_seqno", self.rpc_seqno)
            .num("hostid", self.hostid)
            .num("nrpc_failures", self.nrpc_failures)
            .num("master_fetch_failures", self.master_fetch_failures)
            .num("min_rpc_time", self.min_rpc_time)
            .num("user_total_credit", self.user_total_credit)
            .num("host_total_credit", self.host_total_credit)
            .flag("anonymous_platform", self.anonymous_platform)
            .flag("dont_request_more_work", self.dont_request_more_work)
            .flag("suspended_via_gui", self.suspended_via_gui)
            .flag("detach_when_done", self.detach_when_done);
        if mode == WriteMode::StateFile && !self.project_prefs.is_empty() {
            w.raw("project_preferences", &self.project_prefs);
        }
        w.close("project");
    }
}

/// Normalizes a master URL so that trivially different spellings map to the
/// same project: scheme kept (http by default), doubled slashes collapsed,
/// trailing slash added.
pub fn canonicalize_master_url(url: &str) -> String {
    let url = url.trim();
    let (https, rest) = if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else {
        (false, url)
    };

    let mut path = String::with_capacity(rest.len() + 1);
    for c in rest.chars() {
        if c == '/' && path.ends_with('/') {
            continue;
        }
        path.push(c);
    }
    if !path.ends_with('/') {
        path.push('/');
    }

    format!("http{}://{}", if https { "s" } else { "" }, path)
}

/// Directory name of a project below `projects/`.
pub fn escape_project_url(url: &str) -> String {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let mut out: String = rest
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_master_url() {
        assert_eq!(
            canonicalize_master_url("http://example.org//alpha"),
            "http://example.org/alpha/"
        );
        assert_eq!(
            canonicalize_master_url("https://example.org/alpha/"),
            "https://example.org/alpha/"
        );
        assert_eq!(
            canonicalize_master_url(" example.org "),
            "http://example.org/"
        );
    }

    #[test]
    fn test_escape_project_url() {
        assert_eq!(
            escape_project_url("http://setiathome.berkeley.edu/"),
            "setiathome.berkeley.edu"
        );
        assert_eq!(
            escape_project_url("https://www.example.org/p/x~y/"),
            "www.example.org_p_x_y"
        );
    }

    #[test]
    fn test_parse_project_block() {
        let input = "<master_url>http://a.org</master_url>\n<resource_share>50</resource_share>\n<anonymous_platform/>\n<gui_urls>\n<gui_url>x</gui_url>\n</gui_urls>\n<project_preferences>\n<max_jobs>3</max_jobs>\n</project_preferences>\n</project>";
        let mut r = XmlReader::new(input);
        let p = Project::parse(&mut r).expect("parse project");
        assert_eq!(p.master_url, "http://a.org/");
        assert_eq!(p.resource_share, 50.0);
        assert!(p.anonymous_platform);
        assert_eq!(p.project_prefs, "<max_jobs>3</max_jobs>");
    }

    #[test]
    fn test_gui_rpc_omits_authenticator() {
        let mut p = Project::new("http://a.org/");
        p.authenticator = "secret".into();
        let mut w = XmlWriter::new();
        p.write(&mut w, WriteMode::GuiRpc);
        assert!(!w.as_str().contains("secret"));

        let mut w = XmlWriter::new();
        p.write(&mut w, WriteMode::StateFile);
        assert!(w.as_str().contains("<authenticator>secret</authenticator>"));
    }
}
