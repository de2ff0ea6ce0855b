use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Email
///
/// A single plain-text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// The message that delivers a signup confirmation code.
    pub fn confirmation(from: &str, to: &str, username: &str, code: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: format!("Confirmation code for {username}"),
            body: format!(
                "Hello {username},\n\nyour confirmation code is: {code}\n\n\
                 Exchange it at /api/v1/auth/token to obtain your access token."
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected the message with status {0}")]
    Rejected(u16),

    #[error("simulated mail failure")]
    Simulated,
}

/// Mailer
///
/// Outbound mail collaborator. Handlers only see this trait, so delivery can be a
/// real HTTP relay, a log line, or a recording mock.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

/// HttpMailer
///
/// Posts each message as JSON to a transactional mail relay, authenticating with
/// a bearer key when one is configured. A relay that does not answer within
/// `timeout` fails the send with `MailError::Transport`.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let mut request = self.client.post(&self.endpoint).json(email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::info!(to = %email.to, subject = %email.subject, "mail relayed");
        Ok(())
    }
}

/// LogMailer
///
/// Local development delivery: the message is written to the log instead of sent.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "mail (not sent, no relay configured)"
        );
        Ok(())
    }
}

/// MockMailer
///
/// Records every message for assertions. With `should_fail` set, every send fails.
#[derive(Clone, Default)]
pub struct MockMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<Email>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Email> {
        self.sent.lock().await.clone()
    }

    /// The code inside the most recent confirmation mail to `to`, if any.
    pub async fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|email| email.to == to)
            .and_then(|email| {
                email
                    .body
                    .split("confirmation code is: ")
                    .nth(1)
                    .and_then(|rest| rest.split_whitespace().next())
                    .map(str::to_string)
            })
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Simulated);
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
