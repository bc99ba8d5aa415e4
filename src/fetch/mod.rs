//! Turns a thread's UIDs into display-ready [`ParsedMail`] records.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mailparse::{dateparse, MailHeaderMap, ParsedMail as MimeMessage};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::address::extract_recipients;
use crate::charset::{CharsetRegistry, DEFAULT_CHARSETS};
use crate::errors::{MailError, MailResult};
use crate::fragment::FragmentCache;
use crate::mailbox::{uid_set, MailboxSession};
use crate::mime::{BodyKind, ContentResolver, MimeNode, ResolvedBody, CONTENT_PLACEHOLDER};
use crate::sanitize::{plain_to_html, AmmoniaSanitizer, HtmlSanitizer};
use crate::types::{HeaderSnapshot, MailContent, ParsedMail, RawMessage, Thread};

pub const DEFAULT_WEB_BASE: &str = "https://mail.google.com";

/// Builds the web UI link for a decimal `X-GM-MSGID`.
pub fn deep_link(web_base: &str, msgid: &str) -> MailResult<String> {
    // Plain decimal digits only; `u64::from_str` would also take a leading '+'.
    let id = Some(msgid)
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| MailError::BadMessageId(msgid.to_string()))?;
    Ok(format!(
        "{}/mail/u/0/#inbox/{:x}",
        web_base.trim_end_matches('/'),
        id
    ))
}

#[derive(Clone, Debug)]
pub struct FetchSettings {
    pub web_base: String,
    /// Mailbox owner, left out of recipient lists unless they sent the message.
    pub owner: Option<String>,
    /// Escaped plain bodies up to this many bytes are returned inline.
    /// HTML bodies always go to the fragment cache.
    pub inline_limit: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            web_base: DEFAULT_WEB_BASE.to_string(),
            owner: None,
            inline_limit: 0,
        }
    }
}

/// Body after resolution, before it is placed inline or in the cache.
enum Rendered {
    Sanitized(String),
    Escaped(String),
}

#[derive(Clone)]
pub struct MailFetcher {
    charsets: Arc<CharsetRegistry>,
    sanitizer: Arc<dyn HtmlSanitizer>,
    fragments: Arc<FragmentCache>,
    settings: Arc<FetchSettings>,
}

impl MailFetcher {
    pub fn new(fragments: Arc<FragmentCache>, settings: FetchSettings) -> Self {
        Self {
            charsets: Arc::clone(&DEFAULT_CHARSETS),
            sanitizer: Arc::new(AmmoniaSanitizer),
            fragments,
            settings: Arc::new(settings),
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn HtmlSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_charsets(mut self, charsets: Arc<CharsetRegistry>) -> Self {
        self.charsets = charsets;
        self
    }

    pub fn fragments(&self) -> &Arc<FragmentCache> {
        &self.fragments
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches and resolves every message of `thread` in one batch.
    ///
    /// The first message that cannot be turned into a [`ParsedMail`] fails the
    /// whole batch.
    pub async fn fetch<S: MailboxSession>(
        &self,
        session: &mut S,
        thread: &Thread,
    ) -> MailResult<Vec<ParsedMail>> {
        if thread.is_empty() {
            return Ok(Vec::new());
        }

        let set = uid_set(&thread.uids);
        let raws = session.fetch_messages(&set).await.map_err(|e| {
            warn!(thread = %thread.id, uids = %set, error = %e, "UID FETCH (BODY[]) failed");
            MailError::BadConnection
        })?;
        debug!(thread = %thread.id, count = raws.len(), "fetched raw messages");

        let fetcher = self.clone();
        tokio::task::spawn_blocking(move || {
            raws.into_par_iter()
                .map(|raw| fetcher.parse_message(raw))
                .collect::<MailResult<Vec<_>>>()
        })
        .await
        .map_err(|e| MailError::Unexpected(format!("message parsing task failed: {e}")))?
    }

    /// Resolves a single fetched message.
    pub fn parse_message(&self, raw: RawMessage) -> MailResult<ParsedMail> {
        let gmail_link = deep_link(
            &self.settings.web_base,
            raw.gm_msgid.as_deref().unwrap_or_default(),
        )?;
        let thread_id = raw
            .gm_thrid
            .clone()
            .ok_or(MailError::MissingThreadId(raw.uid))?;

        let parsed = mailparse::parse_mail(&raw.body)
            .map_err(|e| MailError::MalformedMessage(format!("UID {}: {e}", raw.uid)))?;

        let headers = HeaderSnapshot::new(
            parsed
                .headers
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect(),
        );
        let date = parsed
            .headers
            .get_first_value("Date")
            .and_then(|value| dateparse(&value).ok())
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
        let recipients = extract_recipients(&parsed.headers, self.settings.owner.as_deref());
        let content = self.place(self.render(raw.uid, &parsed));

        Ok(ParsedMail {
            uid: raw.uid,
            headers,
            date,
            content,
            gmail_link,
            thread_id,
            recipients: recipients.addresses,
            named_recipients: recipients.named,
        })
    }

    fn render(&self, uid: u32, parsed: &MimeMessage) -> Rendered {
        let tree = MimeNode::from_parsed(parsed);
        let resolver = ContentResolver::new(&self.charsets, self.sanitizer.as_ref());
        match resolver.resolve(&tree) {
            Ok(ResolvedBody {
                body,
                kind: BodyKind::Html,
            }) => Rendered::Sanitized(body),
            Ok(ResolvedBody {
                body,
                kind: BodyKind::Plain,
            }) => Rendered::Escaped(plain_to_html(&body)),
            Err(e) => {
                debug!(uid, error = %e, "no displayable body");
                Rendered::Escaped(CONTENT_PLACEHOLDER.to_string())
            }
        }
    }

    fn place(&self, rendered: Rendered) -> MailContent {
        match rendered {
            Rendered::Escaped(html) if html.len() <= self.settings.inline_limit => {
                MailContent::Inline { html }
            }
            Rendered::Escaped(html) | Rendered::Sanitized(html) => {
                let key = self.fragments.store(html);
                MailContent::Fragment {
                    link: format!("fragment?key={key}"),
                    key,
                }
            }
        }
    }
}
