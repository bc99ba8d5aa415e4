use std::io::{Read, Write};
use std::process::{Command, Stdio};

use html2text::from_read;

use crate::errors::ContentError;

/// Turns untrusted message HTML into markup that is safe to embed.
pub trait HtmlSanitizer: Send + Sync {
    fn sanitize(&self, html: &str) -> Result<String, ContentError>;
}

/// In-process sanitizer backed by `ammonia`'s default allow-list.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmmoniaSanitizer;

impl HtmlSanitizer for AmmoniaSanitizer {
    fn sanitize(&self, html: &str) -> Result<String, ContentError> {
        Ok(ammonia::clean(html))
    }
}

/// Pipes HTML through an external program (stdin -> stdout).
#[derive(Debug, Clone)]
pub struct CommandSanitizer {
    program: String,
    args: Vec<String>,
}

impl CommandSanitizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace, e.g. `"node sanitize.js"`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(program, words.collect()))
    }
}

impl HtmlSanitizer for CommandSanitizer {
    fn sanitize(&self, html: &str) -> Result<String, ContentError> {
        let fail = |what: &str, e: std::io::Error| {
            ContentError::Sanitize(format!("{} {}: {e}", what, self.program))
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| fail("spawning", e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ContentError::Sanitize("sanitizer stdin unavailable".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ContentError::Sanitize("sanitizer stdout unavailable".into()))?;

        // Feed stdin from a separate thread so a large document cannot fill
        // both pipes at once.
        let input = html.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let mut output = Vec::new();
        stdout
            .read_to_end(&mut output)
            .map_err(|e| fail("reading from", e))?;

        writer
            .join()
            .map_err(|_| ContentError::Sanitize("sanitizer writer panicked".into()))?
            .map_err(|e| fail("writing to", e))?;

        let status = child.wait().map_err(|e| fail("waiting for", e))?;
        if !status.success() {
            return Err(ContentError::Sanitize(format!(
                "{} exited with {status}",
                self.program
            )));
        }

        String::from_utf8(output)
            .map_err(|e| ContentError::Sanitize(format!("non UTF-8 output: {e}")))
    }
}

/// Escapes plain text and wraps it so it keeps its line breaks when embedded.
pub fn plain_to_html(text: &str) -> String {
    format!(
        "<pre style=\"word-wrap: break-word; white-space: pre-wrap;\">{}</pre>",
        html_escape::encode_quoted_attribute(text)
    )
}

/// Terminal rendering of resolved HTML.
pub fn html_to_text(html: &str, width: usize) -> String {
    from_read(html.as_bytes(), width).unwrap_or_default()
}
