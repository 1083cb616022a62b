//! Confirmation-code retrieval
//!
//! The login flow sometimes asks for a code mailed to the account's email.
//! Mail access sits behind `MailboxConnector`/`MailboxSession` so the
//! transport (IMAP or otherwise) is supplied by the caller. `CodePrompt`
//! covers manual mode, where an operator types the code.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::account::Account;
use crate::constants::NOTIFICATION_SENDERS;
use crate::error::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Headers of one mail message; bodies are never needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
}

/// Opens authenticated mailbox sessions.
pub trait MailboxConnector: Send + Sync {
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn MailboxSession>>>;
}

/// An open mailbox. Sequence numbers run 1..=count, oldest first.
pub trait MailboxSession: Send {
    /// Select the inbox and return its message count.
    fn select_inbox(&mut self) -> BoxFuture<'_, Result<u32>>;

    fn fetch(&mut self, seq: u32) -> BoxFuture<'_, Result<Option<MailMessage>>>;
}

/// Source of codes typed by an operator.
pub trait CodePrompt: Send + Sync {
    fn prompt<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, Result<String>>;
}

/// Reads the code from standard input.
pub struct StdinPrompt;

impl CodePrompt for StdinPrompt {
    fn prompt<'a>(&'a self, account: &'a Account) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut stdout = tokio::io::stdout();
            let question = format!(
                "Enter email code for {} / {}: ",
                account.username, account.email
            );
            stdout
                .write_all(question.as_bytes())
                .await
                .map_err(|e| Error::Io(format!("writing prompt: {e}")))?;
            stdout
                .flush()
                .await
                .map_err(|e| Error::Io(format!("writing prompt: {e}")))?;

            let mut line = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut line)
                .await
                .map_err(|e| Error::Io(format!("reading code: {e}")))?;
            let code = line.trim().to_owned();
            if code.is_empty() {
                return Err(Error::VerificationUnavailable("no code entered".into()));
            }
            Ok(code)
        })
    }
}

/// Extract the code from a provider notification: the subject's last token.
pub fn code_from_message(message: &MailMessage) -> Option<String> {
    let from = message.from.to_ascii_lowercase();
    if !NOTIFICATION_SENDERS.iter().any(|s| from.contains(s)) {
        return None;
    }
    message
        .subject
        .split_whitespace()
        .next_back()
        .map(str::to_owned)
}

/// Poll the inbox until a notification newer than `cutoff` yields a code.
///
/// Each pass scans newest to oldest and stops at the first message older
/// than `cutoff`. Gives up with `VerificationUnavailable` after `timeout`.
pub async fn wait_for_code(
    session: &mut dyn MailboxSession,
    email: &str,
    cutoff: DateTime<Utc>,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<String> {
    let poll = poll_inbox(session, email, cutoff, poll_interval);
    match tokio::time::timeout(timeout, poll).await {
        Ok(result) => {
            if result.is_ok() {
                info!(email, "confirmation code received");
            }
            result
        }
        Err(_) => Err(Error::VerificationUnavailable(format!(
            "no code for {email} within {}s",
            timeout.as_secs()
        ))),
    }
}

async fn poll_inbox(
    session: &mut dyn MailboxSession,
    email: &str,
    cutoff: DateTime<Utc>,
    poll_interval: Duration,
) -> Result<String> {
    loop {
        if let Some(code) = scan_inbox(session, cutoff).await? {
            return Ok(code);
        }
        debug!(email, "no confirmation code yet, waiting");
        tokio::time::sleep(poll_interval).await;
    }
}

async fn scan_inbox(
    session: &mut dyn MailboxSession,
    cutoff: DateTime<Utc>,
) -> Result<Option<String>> {
    let count = session.select_inbox().await?;
    for seq in (1..=count).rev() {
        let Some(message) = session.fetch(seq).await? else {
            continue;
        };
        if message.received_at < cutoff {
            break;
        }
        if let Some(code) = code_from_message(&message) {
            return Ok(Some(code));
        }
    }
    Ok(None)
}
