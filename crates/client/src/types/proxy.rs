use crate::xml::{self, ParseError, Token, XmlReader, XmlWriter};

use super::WriteMode;

/// HTTP/SOCKS proxy settings. The handshake itself lives elsewhere.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProxyInfo {
    pub use_http_proxy: bool,
    pub use_socks_proxy: bool,
    pub use_http_auth: bool,
    pub http_server_name: String,
    pub http_server_port: i32,
    pub http_user_name: String,
    pub http_user_passwd: String,
    pub socks_server_name: String,
    pub socks_server_port: i32,
    pub socks5_user_name: String,
    pub socks5_user_passwd: String,
    pub no_proxy_hosts: String,
}

impl ProxyInfo {
    pub fn parse(r: &mut XmlReader) -> Result<Self, ParseError> {
        let mut pi = ProxyInfo::default();
        while let Some(tok) = r.next()? {
            match tok {
                Token::Close { tag: "proxy_info" } => return Ok(pi),
                Token::Scalar { tag, value, .. } => match tag {
                    "http_server_name" => pi.http_server_name = xml::text(value),
                    "http_server_port" => pi.http_server_port = xml::num(value),
                    "http_user_name" => pi.http_user_name = xml::text(value),
                    "http_user_passwd" => pi.http_user_passwd = xml::text(value),
                    "socks_server_name" => pi.socks_server_name = xml::text(value),
                    "socks_server_port" => pi.socks_server_port = xml::num(value),
                    "socks5_user_name" => pi.socks5_user_name = xml::text(value),
                    "socks5_user_passwd" => pi.socks5_user_passwd = xml::text(value),
                    "no_proxy" => pi.no_proxy_hosts = xml::text(value),
                    "use_http_proxy" => pi.use_http_proxy = tok.flag(),
                    "use_socks_proxy" => pi.use_socks_proxy = tok.flag(),
                    "use_http_auth" => pi.use_http_auth = tok.flag(),
                    _ => r.skip_unrecognized(tok)?,
                },
                Token::Empty { tag } => match tag {
                    "use_http_proxy" => pi.use_http_proxy = true,
                    "use_socks_proxy" => pi.use_socks_proxy = true,
                    "use_http_auth" => pi.use_http_auth = true,
                    // Derived, never taken from the wire.
                    "present" => {}
                    _ => r.skip_unrecognized(tok)?,
                },
                other => r.skip_unrecognized(other)?,
            }
        }
        Err(r.eof_in("proxy_info"))
    }

    pub fn write(&self, w: &mut XmlWriter, mode: WriteMode) {
        w.open("proxy_info")
            .flag("use_http_proxy", self.use_http_proxy)
            .flag("use_socks_proxy", self.use_socks_proxy)
            .flag("use_http_auth", self.use_http_auth)
            .text("http_server_name", &self.http_server_name)
            .num("http_server_port", self.http_server_port)
            .text("socks_server_name", &self.socks_server_name)
            .num("socks_server_port", self.socks_server_port)
            .opt_text("no_proxy", &self.no_proxy_hosts);
        if mode == WriteMode::StateFile {
            w.opt_text("http_user_name", &self.http_user_name)
                .opt_text("http_user_passwd", &self.http_user_passwd)
                .opt_text("socks5_user_name", &self.socks5_user_name)
                .opt_text("socks5_user_passwd", &self.socks5_user_passwd);
        }
        w.close("proxy_info");
    }

    /// True iff any proxy server is configured.
    pub fn present(&self) -> bool {
        !self.http_server_name.is_empty() || !self.socks_server_name.is_empty()
    }
}
