use chrono::{DateTime, Utc};
use serde::Serialize;

/// Messages sharing one `X-GM-THRID`, in the order they were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub id: String,
    pub uids: Vec<u32>,
}

impl Thread {
    pub fn new(id: impl Into<String>, uids: Vec<u32>) -> Self {
        Self {
            id: id.into(),
            uids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }
}

/// A message as returned by the batched body fetch.
#[derive(Clone, Debug, Default)]
pub struct RawMessage {
    pub uid: u32,
    pub body: Vec<u8>,
    pub gm_msgid: Option<String>,
    pub gm_thrid: Option<String>,
}

/// Mailbox plus the mode it was opened in (SELECT vs EXAMINE).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MailboxContext {
    pub name: String,
    pub read_only: bool,
}

impl MailboxContext {
    pub fn read_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: true,
        }
    }

    pub fn read_write(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: false,
        }
    }
}

/// Ordered header list with case-insensitive lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HeaderSnapshot(Vec<(String, String)>);

impl HeaderSnapshot {
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self(headers)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> + '_ {
        let key = key.to_string();
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where a resolved body lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MailContent {
    /// Already safe to embed directly.
    Inline { html: String },
    /// Deferred to the fragment cache; `link` redeems it once.
    Fragment { key: String, link: String },
}

/// Display-ready projection of one fetched message.
#[derive(Clone, Debug, Serialize)]
pub struct ParsedMail {
    pub uid: u32,
    pub headers: HeaderSnapshot,
    pub date: Option<DateTime<Utc>>,
    pub content: MailContent,
    pub gmail_link: String,
    pub thread_id: String,
    pub recipients: Vec<String>,
    pub named_recipients: Vec<String>,
}

impl ParsedMail {
    pub fn subject(&self) -> &str {
        self.headers.get("Subject").unwrap_or_default()
    }

    pub fn from(&self) -> &str {
        self.headers.get("From").unwrap_or_default()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("Message-ID")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive_and_ordered() {
        let headers = HeaderSnapshot::new(vec![
            ("Received".into(), "a".into()),
            ("subject".into(), "Hi".into()),
            ("RECEIVED".into(), "b".into()),
        ]);
        assert_eq!(headers.get("Subject"), Some("Hi"));
        assert_eq!(headers.get_all("received").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(headers.get("Cc"), None);
    }

    #[test]
    fn lookups_outlive_the_key() {
        let mail = ParsedMail {
            uid: 1,
            headers: HeaderSnapshot::new(vec![
                ("Subject".into(), "launch".into()),
                ("From".into(), "ada@example.com".into()),
            ]),
            date: None,
            content: MailContent::Inline { html: String::new() },
            gmail_link: String::new(),
            thread_id: "1".into(),
            recipients: Vec::new(),
            named_recipients: Vec::new(),
        };
        let subject = {
            let key = String::from("subject");
            mail.headers.get_all(&key).next()
        };
        assert_eq!(subject, Some("launch"));
        assert_eq!(mail.subject(), "launch");
        assert_eq!(mail.from(), "ada@example.com");
        assert_eq!(mail.message_id(), None);
    }
}
