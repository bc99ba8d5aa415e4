//! MIME tree and the displayable-body selection walk.
//!
//! A message body is converted into a [`MimeNode`] tree first, so the
//! selection policy in [`ContentResolver`] runs over plain values and can be
//! exercised with hand-built trees.
use std::collections::BTreeMap;

use mailparse::{parse_content_type, ParsedContentType, ParsedMail as MimeMessage};
use serde::Serialize;
use tracing::debug;

use crate::charset::CharsetRegistry;
use crate::errors::ContentError;
use crate::sanitize::HtmlSanitizer;

pub const TEXT_HTML: &str = "text/html";
pub const TEXT_PLAIN: &str = "text/plain";

/// Shown in place of a body when nothing displayable could be resolved.
pub const CONTENT_PLACEHOLDER: &str = "failed to parse content. view in gmail";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeNode {
    pub media_type: String,
    pub params: BTreeMap<String, String>,
    pub body: MimeBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeBody {
    /// Part bytes with the transfer encoding already removed.
    Leaf(Vec<u8>),
    /// The transfer encoding could not be undone.
    Undecodable(String),
    Parts(Vec<MimeNode>),
}

impl MimeNode {
    pub fn leaf(content_type: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let (media_type, params) = split_content_type(content_type);
        Self {
            media_type,
            params,
            body: MimeBody::Leaf(bytes.into()),
        }
    }

    pub fn multipart(content_type: &str, parts: Vec<MimeNode>) -> Self {
        let (media_type, params) = split_content_type(content_type);
        Self {
            media_type,
            params,
            body: MimeBody::Parts(parts),
        }
    }

    pub fn from_parsed(part: &MimeMessage) -> Self {
        let media_type = part.ctype.mimetype.to_ascii_lowercase();
        let params = content_type_params(&part.ctype);
        let body = if media_type.starts_with("multipart/") {
            MimeBody::Parts(part.subparts.iter().map(MimeNode::from_parsed).collect())
        } else {
            match part.get_body_raw() {
                Ok(bytes) => MimeBody::Leaf(bytes),
                Err(e) => MimeBody::Undecodable(e.to_string()),
            }
        };
        Self {
            media_type,
            params,
            body,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type.starts_with("multipart/")
    }
}

fn split_content_type(header: &str) -> (String, BTreeMap<String, String>) {
    let parsed = parse_content_type(header);
    (parsed.mimetype.to_ascii_lowercase(), content_type_params(&parsed))
}

// mailparse reports a missing charset as "us-ascii"; only a declared one is
// kept so undeclared parts decode as UTF-8.
fn content_type_params(ctype: &ParsedContentType) -> BTreeMap<String, String> {
    let mut params = ctype.params.clone();
    if !params.contains_key("charset") && !ctype.charset.eq_ignore_ascii_case("us-ascii") {
        params.insert("charset".to_string(), ctype.charset.clone());
    }
    params
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    Html,
    Plain,
}

impl BodyKind {
    pub fn media_type(self) -> &'static str {
        match self {
            BodyKind::Html => TEXT_HTML,
            BodyKind::Plain => TEXT_PLAIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBody {
    pub body: String,
    pub kind: BodyKind,
}

/// Picks the best displayable body out of a [`MimeNode`] tree.
pub struct ContentResolver<'a> {
    charsets: &'a CharsetRegistry,
    sanitizer: &'a dyn HtmlSanitizer,
}

impl<'a> ContentResolver<'a> {
    pub fn new(charsets: &'a CharsetRegistry, sanitizer: &'a dyn HtmlSanitizer) -> Self {
        Self {
            charsets,
            sanitizer,
        }
    }

    pub fn resolve(&self, node: &MimeNode) -> Result<ResolvedBody, ContentError> {
        match node.media_type.as_str() {
            TEXT_HTML => self.resolve_text(node, BodyKind::Html),
            TEXT_PLAIN => self.resolve_text(node, BodyKind::Plain),
            _ if node.is_multipart() => self.resolve_multipart(node),
            _ => Err(ContentError::NoDisplayableContent),
        }
    }

    fn resolve_text(&self, node: &MimeNode, kind: BodyKind) -> Result<ResolvedBody, ContentError> {
        let bytes = match &node.body {
            MimeBody::Leaf(bytes) => bytes,
            MimeBody::Undecodable(reason) => {
                return Err(ContentError::Undecodable(reason.clone()))
            }
            MimeBody::Parts(_) => return Err(ContentError::NoDisplayableContent),
        };

        let text = self
            .charsets
            .decode(node.param("charset").unwrap_or_default(), bytes)?;
        let body = match kind {
            BodyKind::Html => self.sanitizer.sanitize(&text)?,
            BodyKind::Plain => text,
        };
        Ok(ResolvedBody { body, kind })
    }

    fn resolve_multipart(&self, node: &MimeNode) -> Result<ResolvedBody, ContentError> {
        if node.param("boundary").map_or(true, str::is_empty) {
            return Err(ContentError::MissingBoundary);
        }
        let MimeBody::Parts(parts) = &node.body else {
            return Err(ContentError::NoDisplayableContent);
        };

        let mut candidate = None;
        let mut failure = None;
        for (index, part) in parts.iter().enumerate() {
            match self.resolve(part) {
                Ok(resolved) if resolved.kind == BodyKind::Html => return Ok(resolved),
                Ok(resolved) => candidate = Some(resolved),
                Err(ContentError::NoDisplayableContent) => {}
                Err(e) => {
                    debug!(part = index, media_type = %part.media_type, error = %e, "skipping MIME part");
                    failure = Some(e);
                }
            }
        }

        match (candidate, failure) {
            (Some(resolved), _) => Ok(resolved),
            (None, Some(e)) => Err(e),
            (None, None) => Err(ContentError::NoDisplayableContent),
        }
    }
}
