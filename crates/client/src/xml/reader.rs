use std::str::{FromStr, Lines};

use super::{decode_entities, ParseError};

/// One logical unit of the line-oriented tag stream.
///
/// The format has one statement per physical line, so a line is either a
/// bare start tag, an end tag, a self-closing flag, a complete
/// `<tag>value</tag>` scalar or free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Open {
        tag: &'a str,
        attrs: &'a str,
        rest: &'a str,
    },
    Close {
        tag: &'a str,
    },
    Empty {
        tag: &'a str,
    },
    Scalar {
        tag: &'a str,
        attrs: &'a str,
        value: &'a str,
        /// Everything up to the end tag, including tag-like text.
        body: &'a str,
    },
    Text(&'a str),
}

impl<'a> Token<'a> {
    pub fn tag(&self) -> Option<&'a str> {
        match *self {
            Token::Open { tag, .. }
            | Token::Close { tag }
            | Token::Empty { tag }
            | Token::Scalar { tag, .. } => Some(tag),
            Token::Text(_) => None,
        }
    }

    pub fn matches_start(&self, name: &str) -> bool {
        match *self {
            Token::Open { tag, .. } | Token::Empty { tag } | Token::Scalar { tag, .. } => {
                tag == name
            }
            _ => false,
        }
    }

    pub fn matches_end(&self, name: &str) -> bool {
        matches!(*self, Token::Close { tag } if tag == name)
    }

    /// Value of a boolean field: `<tag/>` is true, `<tag>0</tag>` is false.
    pub fn flag(&self) -> bool {
        match *self {
            Token::Empty { .. } | Token::Open { .. } => true,
            Token::Scalar { value, .. } => {
                let value = value.trim();
                !(value == "0" || value.eq_ignore_ascii_case("false"))
            }
            _ => false,
        }
    }

    /// Attribute value from the start tag, e.g. `priority` of
    /// `<message priority="high">`.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        let attrs = match *self {
            Token::Open { attrs, .. } | Token::Scalar { attrs, .. } => attrs,
            _ => return None,
        };
        let pos = attrs.find(name)?;
        let after = attrs[pos + name.len()..].trim_start().strip_prefix('=')?;
        let after = after.trim_start();
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let inner = &after[1..];
        inner.find(quote).map(|end| &inner[..end])
    }

    /// Extracts a number if this unit is `<tag>...</tag>`. Returns false and
    /// leaves `out` untouched when the tag is absent. An unparseable value
    /// counts as present but keeps the previous value.
    pub fn parse_num<T: FromStr>(&self, tag: &str, out: &mut T) -> bool {
        match *self {
            Token::Scalar { tag: t, value, .. } if t == tag => {
                match value.trim().parse() {
                    Ok(v) => *out = v,
                    Err(_) => tracing::debug!("bad numeric value for <{}>: {:?}", tag, value),
                }
                true
            }
            _ => false,
        }
    }

    pub fn parse_str(&self, tag: &str, out: &mut String) -> bool {
        match *self {
            Token::Scalar { tag: t, value, .. } if t == tag => {
                *out = decode_entities(value);
                true
            }
            Token::Empty { tag: t } if t == tag => {
                out.clear();
                true
            }
            _ => false,
        }
    }

    pub fn parse_bool(&self, tag: &str, out: &mut bool) -> bool {
        if self.matches_start(tag) {
            *out = self.flag();
            return true;
        }
        false
    }
}

/// Forward-only reader over a tag stream.
pub struct XmlReader<'a> {
    lines: Lines<'a>,
    line_no: usize,
    log_unparsed: bool,
}

impl<'a> XmlReader<'a> {
    pub fn new(input: &'a str) -> Self {
        XmlReader {
            lines: input.lines(),
            line_no: 0,
            log_unparsed: false,
        }
    }

    pub fn log_unparsed(mut self, enabled: bool) -> Self {
        self.log_unparsed = enabled;
        self
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }

    /// Next non-blank unit; `None` once the stream is exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Token<'a>>, ParseError> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return tokenize(line, self.line_no).map(Some);
        }
        Ok(None)
    }

    /// Consumes the remainder of an unrecognized block. Blocks of the same
    /// name are never nested in this format, so the first matching end tag
    /// terminates the skip.
    pub fn skip_unrecognized(&mut self, token: Token<'a>) -> Result<(), ParseError> {
        if self.log_unparsed {
            tracing::info!(
                "[unparsed_xml] line {}: unrecognized {:?}",
                self.line_no,
                token
            );
        }

        let Token::Open { tag, .. } = token else {
            return Ok(());
        };
        // Lines inside are not tokenized; they may hold anything.
        let end_tag = format!("</{tag}>");
        let opened_on = self.line_no;
        for line in self.lines.by_ref() {
            self.line_no += 1;
            if line.contains(&end_tag) {
                return Ok(());
            }
        }
        Err(ParseError::UnexpectedEof {
            tag: tag.to_string(),
            line_no: opened_on,
        })
    }

    /// Collects the body of a block verbatim, without interpreting tag-like
    /// text inside it.
    pub fn raw_block(&mut self, token: Token<'a>) -> Result<String, ParseError> {
        let (tag, first) = match token {
            Token::Scalar { body, .. } => return Ok(body.to_string()),
            Token::Empty { .. } => return Ok(String::new()),
            Token::Open { tag, rest, .. } => (tag, rest),
            _ => return Ok(String::new()),
        };

        let end_tag = format!("</{tag}>");
        let opened_on = self.line_no;
        let mut lines: Vec<&str> = Vec::new();
        if !first.is_empty() {
            lines.push(first);
        }

        for line in self.lines.by_ref() {
            self.line_no += 1;
            if let Some(pos) = line.find(&end_tag) {
                let head = &line[..pos];
                if !head.trim().is_empty() {
                    lines.push(head);
                }
                return Ok(lines.join("\n"));
            }
            lines.push(line);
        }

        Err(ParseError::UnexpectedEof {
            tag: tag.to_string(),
            line_no: opened_on,
        })
    }

    /// Reports an entity block that ran past the end of the stream.
    pub fn eof_in(&self, tag: &str) -> ParseError {
        ParseError::UnexpectedEof {
            tag: tag.to_string(),
            line_no: self.line_no,
        }
    }
}

fn tokenize(line: &str, line_no: usize) -> Result<Token<'_>, ParseError> {
    let Some(body) = line.strip_prefix('<') else {
        return Ok(Token::Text(line));
    };

    if body.starts_with('?') || body.starts_with('!') {
        return Ok(Token::Text(line));
    }

    let malformed = || ParseError::Malformed {
        line_no,
        line: line.to_string(),
    };

    if let Some(close) = body.strip_prefix('/') {
        let end = close.find('>').ok_or_else(malformed)?;
        let tag = close[..end].trim();
        if tag.is_empty() {
            return Err(malformed());
        }
        return Ok(Token::Close { tag });
    }

    let end = body.find('>').ok_or_else(malformed)?;
    let head = &body[..end];
    let rest = &body[end + 1..];

    if let Some(head) = head.strip_suffix('/') {
        let (tag, _) = split_head(head);
        if tag.is_empty() {
            return Err(malformed());
        }
        return Ok(Token::Empty { tag });
    }

    let (tag, attrs) = split_head(head);
    if tag.is_empty() {
        return Err(malformed());
    }

    let closing = format!("</{tag}");
    if let Some(body_end) = rest.rfind(&closing) {
        // The value runs up to the first '<' after the start tag.
        let value_end = rest.find('<').unwrap_or(rest.len());
        return Ok(Token::Scalar {
            tag,
            attrs,
            value: &rest[..value_end],
            body: &rest[..body_end],
        });
    }

    Ok(Token::Open { tag, attrs, rest })
}

fn split_head(head: &str) -> (&str, &str) {
    let head = head.trim();
    match head.find(char::is_whitespace) {
        Some(pos) => (&head[..pos], head[pos..].trim()),
        None => (head, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        let mut r = XmlReader::new(input);
        let mut out = vec![];
        while let Some(t) = r.next().expect("tokenize") {
            out.push(t);
        }
        out
    }

    #[test]
    fn test_classifies_lines() {
        let input = "<project>\n  <name>x</name>  \n<anonymous_platform/>\n\n</project>\nhello";
        assert_eq!(
            tokens(input),
            vec![
                Token::Open {
                    tag: "project",
                    attrs: "",
                    rest: ""
                },
                Token::Scalar {
                    tag: "name",
                    attrs: "",
                    value: "x",
                    body: "x"
                },
                Token::Empty {
                    tag: "anonymous_platform"
                },
                Token::Close { tag: "project" },
                Token::Text("hello"),
            ]
        );
    }

    #[test]
    fn test_start_tag_tolerates_attributes() {
        let toks = tokens("<message priority=\"high\">Server down</message>");
        assert!(toks[0].matches_start("message"));
        assert_eq!(toks[0].attr("priority"), Some("high"));
        let mut s = String::new();
        assert!(toks[0].parse_str("message", &mut s));
        assert_eq!(s, "Server down");
    }

    #[test]
    fn test_extraction_leaves_output_untouched_when_absent() {
        let toks = tokens("<version_num>712</version_num>");
        let mut n: i32 = 5;
        assert!(!toks[0].parse_num("rpc_seqno", &mut n));
        assert_eq!(n, 5);
        assert!(toks[0].parse_num("version_num", &mut n));
        assert_eq!(n, 712);

        let mut d = 1.5f64;
        assert!(!toks[0].parse_num("flops", &mut d));
        assert_eq!(d, 1.5);
    }

    #[test]
    fn test_string_value_truncates_at_first_angle_bracket() {
        let toks = tokens("<name>abc<x></name>");
        let mut s = String::new();
        assert!(toks[0].parse_str("name", &mut s));
        assert_eq!(s, "abc");
    }

    #[test]
    fn test_string_value_is_entity_decoded() {
        let toks = tokens("<user_name>A &amp; B &lt;3</user_name>");
        let mut s = String::new();
        toks[0].parse_str("user_name", &mut s);
        assert_eq!(s, "A & B <3");
    }

    #[test]
    fn test_bool_forms() {
        let toks = tokens("<sticky/>\n<sticky>0</sticky>\n<sticky>1</sticky>");
        let mut b = false;
        assert!(toks[0].parse_bool("sticky", &mut b));
        assert!(b);
        assert!(toks[1].parse_bool("sticky", &mut b));
        assert!(!b);
        assert!(toks[2].parse_bool("sticky", &mut b));
        assert!(b);
    }

    #[test]
    fn test_single_line_raw_block_is_verbatim() {
        let mut r = XmlReader::new("<stderr_out><![CDATA[x]]> a<b </stderr_out>");
        let t = r.next().unwrap().unwrap();
        assert!(matches!(t, Token::Scalar { value: "", .. }));
        assert_eq!(r.raw_block(t).unwrap(), "<![CDATA[x]]> a<b ");
    }

    #[test]
    fn test_skip_unrecognized_block() {
        let mut r = XmlReader::new("<future_block>\n<a>1</a>\n</future_block>\n<after>2</after>");
        let t = r.next().unwrap().unwrap();
        r.skip_unrecognized(t).unwrap();
        let t = r.next().unwrap().unwrap();
        assert!(t.matches_start("after"));
    }

    #[test]
    fn test_skip_unrecognized_ignores_malformed_lines() {
        let mut r = XmlReader::new("<future_block>\n<truncated banner\n</future_block>\n<after>2</after>");
        let t = r.next().unwrap().unwrap();
        r.skip_unrecognized(t).unwrap();
        assert_eq!(r.line_no(), 3);
        assert!(r.next().unwrap().unwrap().matches_start("after"));
    }

    #[test]
    fn test_skip_unrecognized_reports_truncation() {
        let mut r = XmlReader::new("<future_block>\n<a>1</a>\n");
        let t = r.next().unwrap().unwrap();
        assert!(matches!(
            r.skip_unrecognized(t),
            Err(ParseError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_raw_block_keeps_tag_like_text() {
        let mut r = XmlReader::new("<stderr_out>\n<core_client_version>7</core_client_version>\n  indented\n</stderr_out>\n<x/>");
        let t = r.next().unwrap().unwrap();
        let raw = r.raw_block(t).unwrap();
        assert_eq!(raw, "<core_client_version>7</core_client_version>\n  indented");
        assert!(r.next().unwrap().unwrap().matches_start("x"));
    }

    #[test]
    fn test_missing_angle_bracket_is_malformed() {
        let mut r = XmlReader::new("<project");
        assert!(matches!(r.next(), Err(ParseError::Malformed { line_no: 1, .. })));
    }
}
