#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use quickmail::mailbox::MailboxSession;
use quickmail::types::{MailboxContext, RawMessage};

pub type CommandLog = Arc<Mutex<Vec<String>>>;

/// In-memory session that answers from canned data and records every
/// command in IMAP syntax.
#[derive(Default)]
pub struct ScriptedSession {
    log: CommandLog,
    current: Option<MailboxContext>,
    thread_index: Vec<(String, u32)>,
    message_ids: BTreeMap<u32, String>,
    messages: Vec<RawMessage>,
    search_results: Vec<u32>,
    fail_on: Vec<String>,
    stall_on: Option<String>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with `name` already examined, as after login.
    pub fn examining(name: &str) -> Self {
        Self {
            current: Some(MailboxContext::read_only(name)),
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, index: &[(&str, u32)]) -> Self {
        self.thread_index = index.iter().map(|(t, u)| (t.to_string(), *u)).collect();
        self
    }

    pub fn with_message_ids(mut self, ids: &[(u32, &str)]) -> Self {
        self.message_ids = ids.iter().map(|(u, m)| (*u, m.to_string())).collect();
        self
    }

    pub fn with_messages(mut self, messages: Vec<RawMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_search_results(mut self, uids: &[u32]) -> Self {
        self.search_results = uids.to_vec();
        self
    }

    /// Commands starting with `prefix` answer `NO`.
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.fail_on.push(prefix.to_string());
        self
    }

    /// The first command starting with `prefix` never completes.
    pub fn stalling_on(mut self, prefix: &str) -> Self {
        self.stall_on = Some(prefix.to_string());
        self
    }

    pub fn log(&self) -> CommandLog {
        Arc::clone(&self.log)
    }

    async fn step(&mut self, command: String) -> Result<()> {
        self.log.lock().unwrap().push(command.clone());
        if self
            .stall_on
            .as_deref()
            .is_some_and(|p| command.starts_with(p))
        {
            self.stall_on = None;
            std::future::pending::<()>().await;
        }
        if self.fail_on.iter().any(|p| command.starts_with(p.as_str())) {
            bail!("NO {command} failed");
        }
        Ok(())
    }
}

pub fn commands(log: &CommandLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn raw_message(uid: u32, msgid: &str, thrid: &str, body: &str) -> RawMessage {
    RawMessage {
        uid,
        body: body.as_bytes().to_vec(),
        gm_msgid: Some(msgid.to_string()),
        gm_thrid: Some(thrid.to_string()),
    }
}

/// Expands `1:3,5` into `[1, 2, 3, 5]`.
fn parse_uid_set(set: &str) -> Vec<u32> {
    set.split(',')
        .filter(|s| !s.is_empty())
        .flat_map(|range| match range.split_once(':') {
            Some((a, b)) => (a.parse::<u32>().unwrap()..=b.parse::<u32>().unwrap()).collect(),
            None => vec![range.parse::<u32>().unwrap()],
        })
        .collect()
}

impl MailboxSession for ScriptedSession {
    fn current_mailbox(&self) -> Option<&MailboxContext> {
        self.current.as_ref()
    }

    async fn select(&mut self, mailbox: &MailboxContext) -> Result<()> {
        let verb = if mailbox.read_only { "EXAMINE" } else { "SELECT" };
        self.current = None;
        self.step(format!("{verb} \"{}\"", mailbox.name)).await?;
        self.current = Some(mailbox.clone());
        Ok(())
    }

    async fn unselect(&mut self) -> Result<()> {
        self.step("UNSELECT".to_string()).await?;
        self.current = None;
        Ok(())
    }

    async fn fetch_thread_index(&mut self, range: &str) -> Result<Vec<(String, u32)>> {
        self.step(format!("FETCH {range} (X-GM-THRID UID)")).await?;
        Ok(self.thread_index.clone())
    }

    async fn fetch_message_ids(&mut self, uids: &str) -> Result<Vec<(u32, String)>> {
        self.step(format!("UID FETCH {uids} (X-GM-MSGID)")).await?;
        Ok(parse_uid_set(uids)
            .into_iter()
            .filter_map(|uid| self.message_ids.get(&uid).map(|m| (uid, m.clone())))
            .collect())
    }

    async fn fetch_messages(&mut self, uids: &str) -> Result<Vec<RawMessage>> {
        self.step(format!("UID FETCH {uids} (UID BODY.PEEK[] X-GM-MSGID X-GM-THRID)"))
            .await?;
        let wanted = parse_uid_set(uids);
        Ok(self
            .messages
            .iter()
            .filter(|m| wanted.contains(&m.uid))
            .cloned()
            .collect())
    }

    async fn uid_search(&mut self, query: &str) -> Result<Vec<u32>> {
        self.step(format!("UID SEARCH {query}")).await?;
        Ok(self.search_results.clone())
    }

    async fn uid_store(&mut self, uids: &str, op: &str) -> Result<()> {
        self.step(format!("UID STORE {uids} {op}")).await
    }

    async fn logout(&mut self) -> Result<()> {
        self.step("LOGOUT".to_string()).await?;
        self.current = None;
        Ok(())
    }
}
