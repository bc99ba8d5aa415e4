//! Session-scoped operations: each call owns one session, runs under a
//! deadline and a cancellation token, and always logs the session out.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MailerConfig;
use crate::errors::{MailError, MailResult};
use crate::fetch::MailFetcher;
use crate::fragment::FragmentCache;
use crate::mailbox::{archive, get_threads, MailboxSession};
use crate::sanitize::CommandSanitizer;
use crate::types::{MailboxContext, ParsedMail, Thread};

/// Thread list plus the first thread's messages.
#[derive(Debug, Serialize)]
pub struct InboxView {
    pub threads: Vec<Thread>,
    pub messages: Vec<ParsedMail>,
}

#[derive(Clone)]
pub struct Mailer {
    fetcher: MailFetcher,
    inbox: String,
    all_mail: String,
    op_timeout: Duration,
    logout_timeout: Duration,
}

impl Mailer {
    pub fn new(config: &MailerConfig) -> MailResult<Self> {
        let mut fetcher = MailFetcher::new(Arc::new(FragmentCache::new()), config.fetch_settings());
        if let Some(line) = &config.sanitizer_command {
            let sanitizer = CommandSanitizer::from_command_line(line)
                .ok_or_else(|| MailError::Config(format!("empty sanitizer command {line:?}")))?;
            fetcher = fetcher.with_sanitizer(Arc::new(sanitizer));
        }
        Ok(Self::with_fetcher(fetcher, config))
    }

    pub fn with_fetcher(fetcher: MailFetcher, config: &MailerConfig) -> Self {
        Self {
            fetcher,
            inbox: config.inbox.clone(),
            all_mail: config.all_mail.clone(),
            op_timeout: config.op_timeout,
            logout_timeout: config.logout_timeout,
        }
    }

    pub fn fetcher(&self) -> &MailFetcher {
        &self.fetcher
    }

    /// Threads of the inbox, opened read-only.
    pub async fn list_threads<S: MailboxSession>(
        &self,
        mut session: S,
        cancel: &CancellationToken,
    ) -> MailResult<Vec<Thread>> {
        let result = self
            .bounded(cancel, async {
                self.select(&mut session, MailboxContext::read_only(&self.inbox))
                    .await?;
                get_threads(&mut session).await
            })
            .await;
        self.release(&mut session).await;
        result
    }

    pub async fn open_inbox<S: MailboxSession>(
        &self,
        mut session: S,
        cancel: &CancellationToken,
    ) -> MailResult<InboxView> {
        let result = self
            .bounded(cancel, async {
                self.select(&mut session, MailboxContext::read_only(&self.inbox))
                    .await?;
                let threads = get_threads(&mut session).await?;
                let messages = match threads.first() {
                    Some(first) => self.fetcher.fetch(&mut session, first).await?,
                    None => Vec::new(),
                };
                Ok(InboxView { threads, messages })
            })
            .await;
        self.release(&mut session).await;
        result
    }

    pub async fn open_thread<S: MailboxSession>(
        &self,
        mut session: S,
        thread_id: &str,
        cancel: &CancellationToken,
    ) -> MailResult<Vec<ParsedMail>> {
        let result = self
            .bounded(cancel, async {
                self.select(&mut session, MailboxContext::read_only(&self.inbox))
                    .await?;
                let thread = find_thread(&mut session, thread_id).await?;
                self.fetcher.fetch(&mut session, &thread).await
            })
            .await;
        self.release(&mut session).await;
        result
    }

    /// Removes the Inbox label from every message of `thread_id`.
    pub async fn archive_thread<S: MailboxSession>(
        &self,
        mut session: S,
        thread_id: &str,
        cancel: &CancellationToken,
    ) -> MailResult<()> {
        let result = self
            .bounded(cancel, async {
                self.select(&mut session, MailboxContext::read_write(&self.inbox))
                    .await?;
                let thread = find_thread(&mut session, thread_id).await?;
                archive(&mut session, &thread, &self.all_mail).await
            })
            .await;
        self.release(&mut session).await;
        result
    }

    pub fn store_fragment(&self, content: impl Into<String>) -> String {
        self.fetcher.fragments().store(content)
    }

    /// One-shot: a second call with the same key returns an empty string.
    pub fn take_fragment(&self, key: &str) -> String {
        self.fetcher.fragments().take(key)
    }

    async fn select<S: MailboxSession>(
        &self,
        session: &mut S,
        mailbox: MailboxContext,
    ) -> MailResult<()> {
        session.select(&mailbox).await.map_err(|e| {
            warn!(mailbox = %mailbox.name, error = %e, "SELECT failed");
            MailError::BadConnection
        })
    }

    async fn bounded<T, F>(&self, cancel: &CancellationToken, op: F) -> MailResult<T>
    where
        F: Future<Output = MailResult<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("mail operation cancelled");
                Err(MailError::Cancelled)
            }
            outcome = tokio::time::timeout(self.op_timeout, op) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout = ?self.op_timeout, "mail operation timed out");
                    Err(MailError::Timeout)
                }
            },
        }
    }

    async fn release<S: MailboxSession>(&self, session: &mut S) {
        match tokio::time::timeout(self.logout_timeout, session.logout()).await {
            Ok(Ok(())) => debug!("session logged out"),
            Ok(Err(e)) => warn!(error = %e, "LOGOUT failed"),
            Err(_) => warn!(timeout = ?self.logout_timeout, "LOGOUT timed out"),
        }
    }
}

async fn find_thread<S: MailboxSession>(session: &mut S, thread_id: &str) -> MailResult<Thread> {
    get_threads(session)
        .await?
        .into_iter()
        .find(|t| t.id == thread_id)
        .ok_or_else(|| MailError::ThreadNotFound(thread_id.to_string()))
}
