use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::WriteMode;

/// One detected coprocessor type. Detection itself happens elsewhere; the
/// core only consumes the populated list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Coproc {
    pub kind: String,
    pub count: i32,
    pub model: String,
}

impl Coproc {
    fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut coproc = Coproc::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "coproc" } => return Ok(coproc),
                Token::Scalar { tag: "type", value, .. } => coproc.kind = xml::text(value),
                Token::Scalar { tag: "count", value, .. } => coproc.count = xml::num(value),
                Token::Scalar { tag: "model", value, .. } => coproc.model = xml::text(value),
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("coproc"))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostInfo {
    pub timezone: i32,
    pub domain_name: String,
    pub ip_addr: String,
    pub host_cpid: String,
    pub p_ncpus: i32,
    pub p_vendor: String,
    pub p_model: String,
    pub p_fpops: f64,
    pub p_iops: f64,
    pub p_membw: f64,
    pub p_calculated: f64,
    pub m_nbytes: f64,
    pub m_cache: f64,
    pub m_swap: f64,
    pub d_total: f64,
    pub d_free: f64,
    pub os_name: String,
    pub os_version: String,
    pub coprocs: Vec<Coproc>,
}

impl HostInfo {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut host = HostInfo::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "host_info" } => return Ok(host),
                Token::Scalar { tag, value, .. } => match tag {
                    "timezone" => host.timezone = xml::num(value),
                    "domain_name" => host.domain_name = xml::text(value),
                    "ip_addr" => host.ip_addr = xml::text(value),
                    "host_cpid" => host.host_cpid = xml::text(value),
                    "p_ncpus" => host.p_ncpus = xml::num(value),
                    "p_vendor" => host.p_vendor = xml::text(value),
                    "p_model" => host.p_model = xml::text(value),
                    "p_fpops" => host.p_fpops = xml::num(value),
                    "p_iops" => host.p_iops = xml::num(value),
                    "p_membw" => host.p_membw = xml::num(value),
                    "p_calculated" => host.p_calculated = xml::num(value),
                    "m_nbytes" => host.m_nbytes = xml::num(value),
                    "m_cache" => host.m_cache = xml::num(value),
                    "m_swap" => host.m_swap = xml::num(value),
                    "d_total" => host.d_total = xml::num(value),
                    "d_free" => host.d_free = xml::num(value),
                    "os_name" => host.os_name = xml::text(value),
                    "os_version" => host.os_version = xml::text(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Open { tag: "coprocs", .. } => {
                    while let Some(inner) = r.next()? {
                        match inner {
                            Token::Close { tag: "coprocs" } => break,
                            Token::Open { tag: "coproc", .. } => {
                                host.coprocs.push(Coproc::parse(r)?)
                            }
                            other => r.skip_unrecognized(other)?,
                        }
                    }
                }
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("host_info"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("host_info")
            .num("timezone", self.timezone)
            .text("domain_name", &self.domain_name)
            .text("ip_addr", &self.ip_addr)
            .text("host_cpid", &self.host_cpid)
            .num("p_ncpus", self.p_ncpus)
            .text("p_vendor", &self.p_vendor)
            .text("p_model", &self.p_model)
            .num("p_fpops", self.p_fpops)
            .num("p_iops", self.p_iops)
            .num("p_membw", self.p_membw)
            .num("p_calculated", self.p_calculated)
            .num("m_nbytes", self.m_nbytes)
            .num("m_cache", self.m_cache)
            .num("m_swap", self.m_swap)
            .num("d_total", self.d_total)
            .num("d_free", self.d_free)
            .text("os_name", &self.os_name)
            .text("os_version", &self.os_version);
        if !self.coprocs.is_empty() {
            w.open("coprocs");
            for coproc in &self.coprocs {
                w.open("coproc")
                    .text("type", &coproc.kind)
                    .num("count", coproc.count)
                    .opt_text("model", &coproc.model)
                    .close("coproc");
            }
            w.close("coprocs");
        }
        w.close("host_info");
    }

    pub fn has_coproc(&self, kind: &str) -> bool {
        self.coprocs
            .iter()
            .any(|c| c.count > 0 && c.kind.eq_ignore_ascii_case(kind))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeStats {
    pub on_frac: f64,
    pub connected_frac: f64,
    pub cpu_and_network_available_frac: f64,
    pub active_frac: f64,
    pub gpu_active_frac: f64,
    pub last_update: f64,
    pub previous_uptime: f64,
}

impl TimeStats {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut ts = TimeStats::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "time_stats" } => return Ok(ts),
                Token::Scalar { tag, value, .. } => match tag {
                    "on_frac" => ts.on_frac = xml::num(value),
                    "connected_frac" => ts.connected_frac = xml::num(value),
                    "cpu_and_network_available_frac" => {
                        ts.cpu_and_network_available_frac = xml::num(value)
                    }
                    "active_frac" => ts.active_frac = xml::num(value),
                    "gpu_active_frac" => ts.gpu_active_frac = xml::num(value),
                    "last_update" => ts.last_update = xml::num(value),
                    "previous_uptime" => ts.previous_uptime = xml::num(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("time_stats"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("time_stats")
            .num("on_frac", self.on_frac)
            .num("connected_frac", self.connected_frac)
            .num(
                "cpu_and_network_available_frac",
                self.cpu_and_network_available_frac,
            )
            .num("active_frac", self.active_frac)
            .num("gpu_active_frac", self.gpu_active_frac)
            .num("last_update", self.last_update)
            .num("previous_uptime", self.previous_uptime)
            .close("time_stats");
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetStats {
    pub bwup: f64,
    pub avg_up: f64,
    pub avg_time_up: f64,
    pub bwdown: f64,
    pub avg_down: f64,
    pub avg_time_down: f64,
}

impl NetStats {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut ns = NetStats::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "net_stats" } => return Ok(ns),
                Token::Scalar { tag, value, .. } => match tag {
                    "bwup" => ns.bwup = xml::num(value),
                    "avg_up" => ns.avg_up = xml::num(value),
                    "avg_time_up" => ns.avg_time_up = xml::num(value),
                    "bwdown" => ns.bwdown = xml::num(value),
                    "avg_down" => ns.avg_down = xml::num(value),
                    "avg_time_down" => ns.avg_time_down = xml::num(value),
                    _ => r.skip_unrecognized(tok)?,
                },
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("net_stats"))
    }

    pub fn write(&self, w: &mut XmlWriter, _mode: WriteMode) {
        w.open("net_stats")
            .num("bwup", self.bwup)
            .num("avg_up", self.avg_up)
            .num("avg_time_up", self.avg_time_up)
            .num("bwdown", self.bwdown)
            .num("avg_down", self.avg_down)
            .num("avg_time_down", self.avg_time_down)
            .close("net_stats");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_info_with_device_list() {
        let input = r#"<p_ncpus>8</p_ncpus>
<os_name>Linux</os_name>
<coprocs>
    <coproc>
        <type>NVIDIA</type>
        <count>2</count>
    </coproc>
</coprocs>
<virtualbox>
    <vbox_version>7.0</vbox_version>
</virtualbox>
</host_info>"#;
        let mut r = XmlReader::new(input);
        let host = HostInfo::parse(&mut r).unwrap();
        assert_eq!(host.p_ncpus, 8);
        assert!(host.has_coproc("nvidia"));
        assert!(!host.has_coproc("ATI"));
    }
}
