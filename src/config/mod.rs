use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::errors::{MailError, MailResult};
use crate::fetch::{FetchSettings, DEFAULT_WEB_BASE};

pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_INBOX: &str = "INBOX";
pub const DEFAULT_ALL_MAIL: &str = "[Gmail]/All Mail";

/// Runtime settings. Defaults work against Gmail without any config file;
/// an optional TOML file and then env vars override them.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub web_base: Url,
    pub inbox: String,
    pub all_mail: String,
    pub owner: Option<String>,
    pub op_timeout: Duration,
    pub logout_timeout: Duration,
    pub inline_limit: usize,
    /// External sanitizer command line; `None` uses the built-in one.
    pub sanitizer_command: Option<String>,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            imap_host: DEFAULT_IMAP_HOST.to_string(),
            imap_port: 993,
            web_base: Url::parse(DEFAULT_WEB_BASE).expect("default web base is a valid URL"),
            inbox: DEFAULT_INBOX.to_string(),
            all_mail: DEFAULT_ALL_MAIL.to_string(),
            owner: None,
            op_timeout: Duration::from_secs(30),
            logout_timeout: Duration::from_secs(15),
            inline_limit: 0,
            sanitizer_command: None,
        }
    }
}

/// On-disk shape of `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    imap_host: Option<String>,
    imap_port: Option<u16>,
    web_base: Option<String>,
    inbox: Option<String>,
    all_mail: Option<String>,
    owner: Option<String>,
    op_timeout_secs: Option<u64>,
    logout_timeout_secs: Option<u64>,
    inline_limit: Option<usize>,
    sanitizer_command: Option<String>,
}

impl MailerConfig {
    pub fn load() -> MailResult<Self> {
        let mut config = Self::default();
        if let Some(path) = config_path().filter(|p| p.exists()) {
            config.apply_file(&path)?;
        }
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> MailResult<Self> {
        let mut config = Self::default();
        config.apply_toml(text)?;
        Ok(config)
    }

    /// Falls back to the authenticated user when no owner is configured.
    pub fn default_owner(&mut self, user: &str) {
        if self.owner.is_none() && !user.trim().is_empty() {
            self.owner = Some(user.trim().to_string());
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            web_base: self.web_base.as_str().trim_end_matches('/').to_string(),
            owner: self.owner.clone(),
            inline_limit: self.inline_limit,
        }
    }

    fn apply_file(&mut self, path: &Path) -> MailResult<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MailError::Config(format!("reading {}: {e}", path.display())))?;
        self.apply_toml(&text)
    }

    fn apply_toml(&mut self, text: &str) -> MailResult<()> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| MailError::Config(format!("invalid config: {e}")))?;

        if let Some(v) = file.imap_host {
            self.imap_host = v;
        }
        if let Some(v) = file.imap_port {
            self.imap_port = v;
        }
        if let Some(v) = file.web_base {
            self.web_base = parse_web_base(&v)?;
        }
        if let Some(v) = file.inbox {
            self.inbox = v;
        }
        if let Some(v) = file.all_mail {
            self.all_mail = v;
        }
        if file.owner.is_some() {
            self.owner = file.owner;
        }
        if let Some(v) = file.op_timeout_secs {
            self.op_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.logout_timeout_secs {
            self.logout_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.inline_limit {
            self.inline_limit = v;
        }
        if file.sanitizer_command.is_some() {
            self.sanitizer_command = file.sanitizer_command;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> MailResult<()> {
        if let Some(v) = var("QUICKMAIL_IMAP_HOST") {
            self.imap_host = v;
        }
        if let Some(v) = var("QUICKMAIL_IMAP_PORT") {
            self.imap_port = parse_number("QUICKMAIL_IMAP_PORT", &v)?;
        }
        if let Some(v) = var("QUICKMAIL_WEB_BASE") {
            self.web_base = parse_web_base(&v)?;
        }
        if let Some(v) = var("QUICKMAIL_INBOX") {
            self.inbox = v;
        }
        if let Some(v) = var("QUICKMAIL_ALL_MAIL") {
            self.all_mail = v;
        }
        if let Some(v) = var("QUICKMAIL_OWNER") {
            self.owner = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = var("QUICKMAIL_OP_TIMEOUT_SECS") {
            self.op_timeout = Duration::from_secs(parse_number("QUICKMAIL_OP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("QUICKMAIL_LOGOUT_TIMEOUT_SECS") {
            self.logout_timeout =
                Duration::from_secs(parse_number("QUICKMAIL_LOGOUT_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = var("QUICKMAIL_INLINE_LIMIT") {
            self.inline_limit = parse_number("QUICKMAIL_INLINE_LIMIT", &v)?;
        }
        if let Some(v) = var("QUICKMAIL_SANITIZER_COMMAND") {
            self.sanitizer_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    env::var_os("QUICKMAIL_CONFIG")
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|dir| dir.join("quickmail").join("config.toml")))
}

fn parse_web_base(raw: &str) -> MailResult<Url> {
    let url = Url::parse(raw).map_err(|e| MailError::Config(format!("web_base {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MailError::Config(format!(
            "web_base must be http(s), got {raw:?}"
        )));
    }
    Ok(url)
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> MailResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| MailError::Config(format!("{key}: not a number: {raw:?}")))
}
