//! Gmail IMAP connector (XOAUTH2) using async-imap 0.11 with tokio-rustls.
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_imap::imap_proto::{AttributeValue, Response, Status};
use async_imap::{Authenticator, Client};
use futures::StreamExt;
use rustls_native_certs::load_native_certs;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, warn};

use crate::config::MailerConfig;
use crate::mailbox::MailboxSession;
use crate::types::{MailboxContext, RawMessage};

pub type ImapSession = async_imap::Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

pub struct ImapClient;

impl ImapClient {
    pub async fn connect(config: &MailerConfig, user: &str, access_token: &str) -> Result<GmailSession> {
        let host = config.imap_host.as_str();

        // Create TLS config with native root certificates
        let mut root_store = RootCertStore::empty();
        for cert in load_native_certs().context("failed to load native certs")? {
            root_store
                .add(&tokio_rustls::rustls::Certificate(cert.0))
                .context("failed to add cert to root store")?;
        }

        let tls_config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(tls_config));

        let tcp = TcpStream::connect((host, config.imap_port))
            .await
            .with_context(|| format!("connecting to {host}:{}", config.imap_port))?;

        let server_name = ServerName::try_from(host).context("invalid DNS name")?;
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .context("starting TLS for IMAP")?;

        // async-imap wants futures AsyncRead/AsyncWrite
        let mut client = Client::new(tls_stream.compat());

        let _greeting = client
            .read_response()
            .await
            .context("reading IMAP greeting")?
            .ok_or_else(|| anyhow::anyhow!("unexpected end of stream, expected greeting"))?;

        let xoauth = Xoauth2 {
            user: user.to_string(),
            access_token: access_token.to_string(),
        };

        let session = client
            .authenticate("XOAUTH2", xoauth)
            .await
            .map_err(|(err, _client)| err)
            .context("XOAUTH2 authenticate")?;

        debug!(host, user, "IMAP session authenticated");
        Ok(GmailSession::new(session))
    }
}

/// SASL XOAUTH2 initial response, shared by every protocol that speaks it.
pub fn xoauth2_response(user: &str, access_token: &str) -> String {
    format!("user={user}\x01auth=Bearer {access_token}\x01\x01")
}

struct Xoauth2 {
    user: String,
    access_token: String,
}

impl Authenticator for Xoauth2 {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> String {
        xoauth2_response(&self.user, &self.access_token)
    }
}

/// Gmail attributes and body of one untagged `FETCH` response.
#[derive(Debug, Default, PartialEq, Eq)]
struct GmailAttrs {
    uid: Option<u32>,
    thrid: Option<String>,
    msgid: Option<String>,
    body: Option<Vec<u8>>,
}

/// Pulls the attributes we use out of a `* n FETCH (...)` response.
fn gmail_attrs(response: &Response<'_>) -> Option<GmailAttrs> {
    let Response::Fetch(_, values) = response else {
        return None;
    };
    let mut attrs = GmailAttrs::default();
    for value in values {
        match value {
            AttributeValue::Uid(uid) => attrs.uid = Some(*uid),
            AttributeValue::GmailThrId(id) => attrs.thrid = Some(id.to_string()),
            AttributeValue::GmailMsgId(id) => attrs.msgid = Some(id.to_string()),
            AttributeValue::BodySection {
                section: None,
                data,
                ..
            } => attrs.body = Some(data.as_deref().unwrap_or_default().to_vec()),
            _ => {}
        }
    }
    Some(attrs)
}

/// [`MailboxSession`] over a live async-imap session.
pub struct GmailSession {
    session: ImapSession,
    current: Option<MailboxContext>,
    exists: u32,
}

impl GmailSession {
    pub fn new(session: ImapSession) -> Self {
        Self {
            session,
            current: None,
            exists: 0,
        }
    }

    /// Runs a FETCH-family command and collects its untagged FETCH
    /// responses until the tagged completion.
    ///
    /// The typed `Fetch` stream does not carry `X-GM-THRID`, so these
    /// commands read the parsed responses directly.
    async fn fetch_gmail_attrs(&mut self, command: String) -> Result<Vec<GmailAttrs>> {
        let tag = self
            .session
            .run_command(&command)
            .await
            .with_context(|| format!("sending {command}"))?;

        let mut collected = Vec::new();
        loop {
            let response = self
                .session
                .read_response()
                .await
                .with_context(|| format!("reading response to {command}"))?
                .ok_or_else(|| anyhow!("connection closed during {command}"))?;
            match response.parsed() {
                Response::Done {
                    tag: done,
                    status,
                    information,
                    ..
                } if *done == tag => {
                    if *status != Status::Ok {
                        bail!(
                            "{command} failed: {status:?} {}",
                            information.as_deref().unwrap_or_default()
                        );
                    }
                    return Ok(collected);
                }
                parsed => collected.extend(gmail_attrs(parsed)),
            }
        }
    }
}

impl MailboxSession for GmailSession {
    fn current_mailbox(&self) -> Option<&MailboxContext> {
        self.current.as_ref()
    }

    async fn select(&mut self, mailbox: &MailboxContext) -> Result<()> {
        let result = if mailbox.read_only {
            self.session.examine(&mailbox.name).await
        } else {
            self.session.select(&mailbox.name).await
        };
        // A failed SELECT leaves no mailbox selected.
        self.current = None;
        let selected = result.with_context(|| format!("selecting {}", mailbox.name))?;
        self.exists = selected.exists;
        self.current = Some(mailbox.clone());
        debug!(mailbox = %mailbox.name, read_only = mailbox.read_only, exists = selected.exists, "mailbox selected");
        Ok(())
    }

    async fn unselect(&mut self) -> Result<()> {
        self.session
            .run_command_and_check_ok("UNSELECT")
            .await
            .context("UNSELECT")?;
        self.current = None;
        self.exists = 0;
        Ok(())
    }

    async fn fetch_thread_index(&mut self, range: &str) -> Result<Vec<(String, u32)>> {
        // "1:*" is an error on an empty mailbox.
        if self.exists == 0 {
            return Ok(Vec::new());
        }
        let attrs = self
            .fetch_gmail_attrs(format!("FETCH {range} (X-GM-THRID UID)"))
            .await?;
        Ok(attrs
            .into_iter()
            .filter_map(|a| match (a.thrid, a.uid) {
                (Some(thrid), Some(uid)) => Some((thrid, uid)),
                (thrid, uid) => {
                    warn!(?thrid, ?uid, "FETCH response without X-GM-THRID/UID");
                    None
                }
            })
            .collect())
    }

    async fn fetch_message_ids(&mut self, uids: &str) -> Result<Vec<(u32, String)>> {
        let attrs = self
            .fetch_gmail_attrs(format!("UID FETCH {uids} (X-GM-MSGID)"))
            .await?;
        Ok(attrs
            .into_iter()
            .filter_map(|a| Some((a.uid?, a.msgid?)))
            .collect())
    }

    async fn fetch_messages(&mut self, uids: &str) -> Result<Vec<RawMessage>> {
        let attrs = self
            .fetch_gmail_attrs(format!(
                "UID FETCH {uids} (UID BODY.PEEK[] X-GM-MSGID X-GM-THRID)"
            ))
            .await?;
        Ok(attrs
            .into_iter()
            .filter_map(|a| {
                let Some(uid) = a.uid else {
                    warn!("FETCH response without UID");
                    return None;
                };
                Some(RawMessage {
                    uid,
                    body: a.body.unwrap_or_default(),
                    gm_msgid: a.msgid,
                    gm_thrid: a.thrid,
                })
            })
            .collect())
    }

    async fn uid_search(&mut self, query: &str) -> Result<Vec<u32>> {
        let found = self
            .session
            .uid_search(query)
            .await
            .with_context(|| format!("UID SEARCH {query}"))?;
        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn uid_store(&mut self, uids: &str, op: &str) -> Result<()> {
        let mut responses = self
            .session
            .uid_store(uids, op)
            .await
            .with_context(|| format!("UID STORE {uids} {op}"))?;
        while let Some(response) = responses.next().await {
            response.context("reading STORE response")?;
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.session.logout().await.context("LOGOUT")?;
        self.current = None;
        Ok(())
    }
}
