use thiserror::Error;

pub type MailResult<T> = Result<T, MailError>;

/// Failures surfaced to callers of the mailbox operations.
///
/// Transport-level problems collapse into [`MailError::BadConnection`]; the
/// underlying protocol text is logged where it happens and never carried here.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Encountered error while communicating with the mail server")]
    BadConnection,
    #[error("bad value for X-GM-MSGID: {0:?}")]
    BadMessageId(String),
    #[error("missing X-GM-THRID for UID {0}")]
    MissingThreadId(u32),
    #[error("failed to parse message: {0}")]
    MalformedMessage(String),
    #[error("Data consistency error: {0}")]
    DataConsistency(String),
    #[error("no thread with id {0}")]
    ThreadNotFound(String),
    #[error("mail server operation timed out")]
    Timeout,
    #[error("mail server operation cancelled")]
    Cancelled,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl MailError {
    /// True for errors that should render as "service unavailable".
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            MailError::BadConnection | MailError::Timeout | MailError::Cancelled
        )
    }
}

/// Failures local to resolving one message body or one MIME part.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("unsupported charset: {0:?}")]
    UnsupportedCharset(String),
    #[error("multipart body without a boundary parameter")]
    MissingBoundary,
    #[error("no displayable content")]
    NoDisplayableContent,
    #[error("undecodable part: {0}")]
    Undecodable(String),
    #[error("sanitizer failed: {0}")]
    Sanitize(String),
}
