//! Mailbox-level operations over an abstract IMAP session.
//!
//! Everything here talks to the server through [`MailboxSession`] so the
//! command sequencing can be tested against a scripted session.
use anyhow::Result;

use crate::types::{MailboxContext, RawMessage};

pub mod archive;
pub mod threads;

pub use archive::archive;
pub use threads::{assemble_threads, get_threads};

/// The subset of an IMAP session the mailbox operations rely on.
///
/// UID arguments are already formatted sets (see [`uid_set`]). Calls on one
/// session are strictly sequential; the selected mailbox is shared state.
#[allow(async_fn_in_trait)]
pub trait MailboxSession {
    /// Mailbox currently selected, if any.
    fn current_mailbox(&self) -> Option<&MailboxContext>;

    /// `SELECT` or `EXAMINE`, depending on `mailbox.read_only`.
    async fn select(&mut self, mailbox: &MailboxContext) -> Result<()>;

    async fn unselect(&mut self) -> Result<()>;

    /// `FETCH <range> (X-GM-THRID UID)`, in server order.
    async fn fetch_thread_index(&mut self, range: &str) -> Result<Vec<(String, u32)>>;

    /// `UID FETCH <uids> (X-GM-MSGID)`.
    async fn fetch_message_ids(&mut self, uids: &str) -> Result<Vec<(u32, String)>>;

    /// `UID FETCH <uids> (UID BODY.PEEK[] X-GM-MSGID X-GM-THRID)`.
    async fn fetch_messages(&mut self, uids: &str) -> Result<Vec<RawMessage>>;

    /// `UID SEARCH <query>`; matches in ascending order.
    async fn uid_search(&mut self, query: &str) -> Result<Vec<u32>>;

    /// `UID STORE <uids> <op>`.
    async fn uid_store(&mut self, uids: &str, op: &str) -> Result<()>;

    async fn logout(&mut self) -> Result<()>;
}

/// Formats UIDs as a compact IMAP sequence set, e.g. `40477:40478,40491`.
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for uid in sorted {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(uid) => *end = uid,
            _ => ranges.push((uid, uid)),
        }
    }

    ranges
        .iter()
        .map(|&(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}:{end}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
