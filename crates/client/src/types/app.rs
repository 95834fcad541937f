use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::{FileRef, WriteMode};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct App {
    pub name: String,
    pub user_friendly_name: String,
    pub non_cpu_intensive: bool,
}

impl App {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut app = App::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "app" } => {
                    if app.user_friendly_name.is_empty() {
                        app.user_friendly_name = app.name.clone();
                    }
                    return Ok(app);
                }
                Token::Scalar { tag: "name", value, .. } => app.name = xml::text(value),
                Token::Scalar {
                    tag: "user_friendly_name",
                    value,
                    ..
                } => app.user_friendly_name = xml::text(value),
                Token::Empty {
                    tag: "non_cpu_intensive",
                }
                | Token::Scalar {
                    tag: "non_cpu_intensive",
                    ..
                } => app.non_cpu_intensive = tok.flag(),
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("app"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("app")
            .text("name", &self.name)
            .text("user_friendly_name", &self.user_friendly_name)
            .flag("non_cpu_intensive", self.non_cpu_intensive)
            .close("app");
    }
}

/// Coprocessor requirement of an app version.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoprocUsage {
    pub kind: String,
    pub count: f64,
}

impl CoprocUsage {
    fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut usage = CoprocUsage::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "coproc" } => return Ok(usage),
                Token::Scalar { tag: "type", value, .. } => usage.kind = xml::text(value),
                Token::Scalar { tag: "count", value, .. } => usage.count = xml::num(value),
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("coproc"))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppVersion {
    pub app_name: String,
    pub version_num: i32,
    pub platform: String,
    pub plan_class: String,
    pub api_version: String,
    pub avg_ncpus: f64,
    pub max_ncpus: f64,
    pub flops: f64,
    pub cmdline: String,
    pub gpu_ram: f64,
    pub coproc: Option<CoprocUsage>,
    pub file_refs: Vec<FileRef>,
}

impl AppVersion {
    /// Parses an `<app_version>` body. An empty platform is left empty
    /// here; the linker fills in the host's primary platform.
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut avp = AppVersion {
            avg_ncpus: 1.0,
            ..Default::default()
        };
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "app_version" } => return Ok(avp),
                Token::Scalar { tag, value, .. } => match tag {
                    "app_name" => avp.app_name = xml::text(value),
                    "version_num" => avp.version_num = xml::num(value),
                    "platform" => avp.platform = xml::text(value),
                    "plan_class" => avp.plan_class = xml::text(value),
                    "api_version" => avp.api_version = xml::text(value),
                    "avg_ncpus" => avp.avg_ncpus = xml::num(value),
                    "max_ncpus" => avp.max_ncpus = xml::num(value),
                    "flops" => avp.flops = xml::num(value),
                    "cmdline" => avp.cmdline = xml::text(value),
                    "gpu_ram" => avp.gpu_ram = xml::num(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Open { tag: "file_ref", .. } => avp.file_refs.push(FileRef::parse(r)?),
                Token::Open { tag: "coproc", .. } => avp.coproc = Some(CoprocUsage::parse(r)?),
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("app_version"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("app_version")
            .text("app_name", &self.app_name)
            .num("version_num", self.version_num)
            .text("platform", &self.platform)
            .opt_text("plan_class", &self.plan_class)
            .opt_text("api_version", &self.api_version)
            .num("avg_ncpus", self.avg_ncpus)
            .num("max_ncpus", self.max_ncpus)
            .num("flops", self.flops)
            .opt_text("cmdline", &self.cmdline);
        if self.gpu_ram > 0.0 {
            w.num("gpu_ram", self.gpu_ram);
        }
        if let Some(coproc) = &self.coproc {
            w.open("coproc")
                .text("type", &coproc.kind)
                .num("count", coproc.count)
                .close("coproc");
        }
        for file_ref in &self.file_refs {
            file_ref.write(w);
        }
        w.close("app_version");
    }
}
