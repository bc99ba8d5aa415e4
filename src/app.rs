use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::config::MailerConfig;
use crate::imap::ImapClient;
use crate::sanitize::html_to_text;
use crate::service::Mailer;
use crate::types::{MailContent, ParsedMail, Thread};

const TEXT_WIDTH: usize = 100;

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = MailerConfig::load()?;
    config.default_owner(&cli.user);
    let mailer = Mailer::new(&config)?;
    let session = ImapClient::connect(&config, &cli.user, &cli.access_token).await?;
    info!(host = %config.imap_host, user = %cli.user, "connected");

    // Ctrl-C cancels the running operation; the session is still logged out.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Threads => {
            let threads = mailer.list_threads(session, &cancel).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&threads)?);
            } else {
                print_threads(&threads);
            }
        }
        Command::Show { thread: None } => {
            let view = mailer.open_inbox(session, &cancel).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                print_threads(&view.threads);
                println!();
                print_messages(&mailer, &view.messages);
            }
        }
        Command::Show {
            thread: Some(thread_id),
        } => {
            let messages = mailer.open_thread(session, &thread_id, &cancel).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                print_messages(&mailer, &messages);
            }
        }
        Command::Archive { thread } => {
            mailer
                .archive_thread(session, &thread, &cancel)
                .await
                .with_context(|| format!("archiving thread {thread}"))?;
            if cli.json {
                println!("{}", serde_json::json!({ "archived": thread }));
            } else {
                println!("Archived thread {thread}");
            }
        }
    }

    Ok(())
}

fn print_threads(threads: &[Thread]) {
    if threads.is_empty() {
        println!("Inbox is empty");
        return;
    }
    for thread in threads {
        println!("{}  ({} messages)", thread.id, thread.len());
    }
}

fn print_messages(mailer: &Mailer, messages: &[ParsedMail]) {
    println!("{}", "=".repeat(TEXT_WIDTH));
    for mail in messages {
        let date = mail
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let subject = match mail.subject() {
            "" => "(No Subject)",
            s => s,
        };

        println!("[{date}] {subject}");
        println!("From: {}", mail.from());
        if !mail.named_recipients.is_empty() {
            println!("To: {}", mail.named_recipients.join(", "));
        }
        println!("Link: {}", mail.gmail_link);
        println!();

        // Fragments are one-shot; this is the only place the CLI redeems them.
        let html = match &mail.content {
            MailContent::Inline { html } => html.clone(),
            MailContent::Fragment { key, .. } => mailer.take_fragment(key),
        };
        println!("{}", html_to_text(&html, TEXT_WIDTH).trim_end());
        println!("{}", "=".repeat(TEXT_WIDTH));
    }
}
