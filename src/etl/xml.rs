//! Minimal XML extraction for the government vote and roster feeds.
//!
//! The feeds are flat, well-known documents, so elements are located with
//! pre-compiled patterns rather than a full parser. Nested elements of the
//! same name are not supported.

use regex::Regex;

/// One occurrence of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    /// Raw attribute text between the tag name and `>`.
    pub attrs: &'a str,
    /// Raw content between the start and end tags; empty when self-closing.
    pub body: &'a str,
}

impl<'a> Element<'a> {
    /// Decoded value of attribute `name`.
    pub fn attr(&self, name: &str) -> Option<String> {
        let bytes = self.attrs.as_bytes();
        for quote in ['"', '\''] {
            let needle = format!("{}={}", name, quote);
            let mut from = 0;
            while let Some(pos) = self.attrs[from..].find(&needle) {
                let start = from + pos;
                let boundary = start == 0 || bytes[start - 1].is_ascii_whitespace();
                let value_start = start + needle.len();
                if boundary {
                    let rest = &self.attrs[value_start..];
                    let end = rest.find(quote)?;
                    return Some(decode(&rest[..end]));
                }
                from = value_start;
            }
        }
        None
    }

    /// Decoded, trimmed text content with any markup removed.
    pub fn text(&self) -> String {
        decode(&strip_tags(self.body)).trim().to_string()
    }
}

/// A compiled matcher for one element name.
#[derive(Debug, Clone)]
pub struct Tag {
    re: Regex,
}

impl Tag {
    pub fn new(name: &str) -> Result<Self, regex::Error> {
        let name = regex::escape(name);
        let pattern = format!(r"(?s)<{name}(\s[^>]*?)?(?:/>|>(.*?)</{name}\s*>)");
        Ok(Self {
            re: Regex::new(&pattern)?,
        })
    }

    /// Every occurrence in document order.
    pub fn find_all<'a>(&self, doc: &'a str) -> Vec<Element<'a>> {
        self.re
            .captures_iter(doc)
            .map(|caps| Element {
                attrs: caps.get(1).map_or("", |m| m.as_str()),
                body: caps.get(2).map_or("", |m| m.as_str()),
            })
            .collect()
    }

    pub fn first<'a>(&self, doc: &'a str) -> Option<Element<'a>> {
        self.re.captures(doc).map(|caps| Element {
            attrs: caps.get(1).map_or("", |m| m.as_str()),
            body: caps.get(2).map_or("", |m| m.as_str()),
        })
    }

    /// Text of the first non-empty occurrence.
    pub fn text(&self, doc: &str) -> Option<String> {
        self.find_all(doc)
            .into_iter()
            .map(|e| e.text())
            .find(|t| !t.is_empty())
    }
}

fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(cdata) = tail.strip_prefix("<![CDATA[") {
            match cdata.find("]]>") {
                Some(end) => {
                    // CDATA is literal text; escape so decode leaves it intact.
                    out.push_str(&cdata[..end].replace('&', "&amp;"));
                    rest = &cdata[end + 3..];
                }
                None => {
                    out.push_str(cdata);
                    rest = "";
                }
            }
            continue;
        }
        match tail.find('>') {
            Some(end) => rest = &tail[end + 1..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Replace the predefined and numeric character references.
pub fn decode(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|i| *i <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
