//! Archiving: removing the Inbox label from every message of a thread.
//!
//! Gmail only lets labels be changed from a mailbox that contains the
//! messages under stable ids, so the UIDs from the current mailbox are
//! translated to `X-GM-MSGID`s and looked up again in All Mail.
use tracing::{debug, info, warn};

use crate::errors::{MailError, MailResult};
use crate::mailbox::{uid_set, MailboxSession};
use crate::types::{MailboxContext, Thread};

/// Store operation that drops the Inbox label without deleting anything.
pub const REMOVE_INBOX_LABEL: &str = "-X-GM-LABELS \\Inbox";

/// Removes the Inbox label from every message in `thread`.
///
/// The mailbox selected before the call is selected again afterwards,
/// whether or not the label change succeeded.
pub async fn archive<S: MailboxSession>(
    session: &mut S,
    thread: &Thread,
    all_mail: &str,
) -> MailResult<()> {
    if thread.is_empty() {
        return Ok(());
    }

    let set = uid_set(&thread.uids);
    let msgids: Vec<String> = session
        .fetch_message_ids(&set)
        .await
        .map_err(|e| {
            warn!(thread = %thread.id, uids = %set, error = %e, "UID FETCH (X-GM-MSGID) failed");
            MailError::BadConnection
        })?
        .into_iter()
        .map(|(_, msgid)| msgid)
        .collect();

    if msgids.is_empty() {
        return Err(MailError::DataConsistency(format!(
            "no X-GM-MSGID returned for UIDs {set}"
        )));
    }

    let previous = session.current_mailbox().cloned();
    let outcome = relabel_in_all_mail(session, &msgids, all_mail).await;
    let restored = restore(session, previous.as_ref()).await;

    outcome?;
    restored?;
    info!(thread = %thread.id, messages = msgids.len(), "thread archived");
    Ok(())
}

/// `UID SEARCH` criteria matching any of `msgids`.
pub fn msgid_search_query(msgids: &[String]) -> String {
    let mut query = String::from("CHARSET UTF-8");
    for _ in 1..msgids.len() {
        query.push_str(" OR");
    }
    for msgid in msgids {
        query.push_str(" X-GM-MSGID ");
        query.push_str(msgid);
    }
    query
}

async fn relabel_in_all_mail<S: MailboxSession>(
    session: &mut S,
    msgids: &[String],
    all_mail: &str,
) -> MailResult<()> {
    session
        .select(&MailboxContext::read_write(all_mail))
        .await
        .map_err(|e| {
            warn!(mailbox = %all_mail, error = %e, "SELECT failed");
            MailError::BadConnection
        })?;

    let query = msgid_search_query(msgids);
    let matches = session.uid_search(&query).await.map_err(|e| {
        warn!(query = %query, error = %e, "UID SEARCH failed");
        MailError::BadConnection
    })?;

    if matches.is_empty() {
        return Err(MailError::DataConsistency(format!(
            "{} X-GM-MSGID(s) not found in {all_mail}",
            msgids.len()
        )));
    }

    let set = uid_set(&matches);
    debug!(uids = %set, "removing Inbox label");
    session
        .uid_store(&set, REMOVE_INBOX_LABEL)
        .await
        .map_err(|e| {
            warn!(uids = %set, error = %e, "UID STORE failed");
            MailError::BadConnection
        })
}

async fn restore<S: MailboxSession>(
    session: &mut S,
    previous: Option<&MailboxContext>,
) -> MailResult<()> {
    let result = match previous {
        Some(mailbox) => session.select(mailbox).await,
        None => session.unselect().await,
    };
    result.map_err(|e| {
        warn!(mailbox = ?previous.map(|m| &m.name), error = %e, "restoring mailbox failed");
        MailError::BadConnection
    })
}
