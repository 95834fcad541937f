use std::fmt::Display;

use super::encode_entities;

const INDENT: &str = "    ";

/// Inverse of [`super::XmlReader`]: emits one statement per line.
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
    }

    pub fn open(&mut self, tag: &str) -> &mut Self {
        self.indent();
        self.buf.push('<');
        self.buf.push_str(tag);
        self.buf.push_str(">\n");
        self.depth += 1;
        self
    }

    pub fn close(&mut self, tag: &str) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.buf.push_str("</");
        self.buf.push_str(tag);
        self.buf.push_str(">\n");
        self
    }

    pub fn num(&mut self, tag: &str, value: impl Display) -> &mut Self {
        self.indent();
        self.buf.push_str(&format!("<{tag}>{value}</{tag}>\n"));
        self
    }

    pub fn text(&mut self, tag: &str, value: &str) -> &mut Self {
        self.indent();
        self.buf
            .push_str(&format!("<{tag}>{}</{tag}>\n", encode_entities(value)));
        self
    }

    /// Writes `value` only when it's non-empty.
    pub fn opt_text(&mut self, tag: &str, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.text(tag, value);
        }
        self
    }

    pub fn flag(&mut self, tag: &str, value: bool) -> &mut Self {
        if value {
            self.indent();
            self.buf.push_str(&format!("<{tag}/>\n"));
        }
        self
    }

    /// Block whose body is written verbatim, one source line per line.
    pub fn raw(&mut self, tag: &str, body: &str) -> &mut Self {
        self.indent();
        self.buf.push_str(&format!("<{tag}>\n"));
        self.buf.push_str(body);
        self.buf.push('\n');
        self.indent();
        self.buf.push_str(&format!("</{tag}>\n"));
        self
    }

    pub fn line(&mut self, line: &str) -> &mut Self {
        self.indent();
        self.buf.push_str(line);
        self.buf.push('\n');
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_output() {
        let mut w = XmlWriter::new();
        w.open("app")
            .text("name", "a<b")
            .num("version_num", 7)
            .flag("sticky", true)
            .flag("uploaded", false)
            .close("app");
        assert_eq!(
            w.into_string(),
            "<app>\n    <name>a&lt;b</name>\n    <version_num>7</version_num>\n    <sticky/>\n</app>\n"
        );
    }
}
