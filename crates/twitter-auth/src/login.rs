//! Login state machine
//!
//! Drives the onboarding flow for one account: activate a guest token,
//! initiate the `login` flow, then answer whatever subtask the server issues
//! until it stops issuing them. Every response's `Set-Cookie` headers are
//! absorbed, and once the `ct0` cookie exists the CSRF headers are applied
//! before the next request.
//!
//! On success the account's cookies and headers are replaced with the
//! session built during the flow and the account is marked active. A 403 at
//! any step leaves the account inactive and is reported as
//! `LoginOutcome::Rejected`; other failures record `error_msg` and surface
//! as `Error::Step`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use upstream::{ClientConfig, Session};

use crate::account::Account;
use crate::constants::{
    CODE_CUTOFF_SECS, CONFIRMATION_CODE_HINT, LOGIN_FLOW_NAME, MAX_LOGIN_STEPS,
};
use crate::error::{Error, Result};
use crate::mailbox::{self, CodePrompt, MailboxConnector, MailboxSession, StdinPrompt};
use crate::subtask::{self, Subtask};
use crate::totp;

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Login behaviour knobs.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// Ask an operator for confirmation codes instead of reading mail.
    pub manual: bool,
    /// Open the mailbox before the flow starts, failing fast on bad mail credentials.
    pub email_first: bool,
    pub code_timeout: Duration,
    pub code_poll_interval: Duration,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            manual: false,
            email_first: false,
            code_timeout: Duration::from_secs(30),
            code_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Where a login attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Init,
    GuestTokenObtained,
    FlowInitiated,
    Step(Subtask),
    Success,
    Failed,
}

/// Result of a login attempt that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    /// Account was already active; nothing was sent.
    AlreadyActive,
    /// The server refused the account (403).
    Rejected { message: String },
}

/// Per-attempt mutable state.
struct LoginContext {
    session: Session,
    state: LoginState,
    mailbox: Option<Box<dyn MailboxSession>>,
}

impl LoginContext {
    fn transition(&mut self, username: &str, next: LoginState) {
        debug!(username, from = ?self.state, to = ?next, "login state");
        self.state = next;
    }
}

/// Runs login flows against the onboarding endpoints.
pub struct Authenticator {
    http: reqwest::Client,
    client: ClientConfig,
    config: LoginConfig,
    mailbox: Option<Arc<dyn MailboxConnector>>,
    prompt: Arc<dyn CodePrompt>,
}

impl Authenticator {
    pub fn new(http: reqwest::Client, client: ClientConfig, config: LoginConfig) -> Self {
        Self {
            http,
            client,
            config,
            mailbox: None,
            prompt: Arc::new(StdinPrompt),
        }
    }

    pub fn with_mailbox(mut self, mailbox: Arc<dyn MailboxConnector>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CodePrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Log `account` in, updating it in place.
    pub async fn login(&self, account: &mut Account) -> Result<LoginOutcome> {
        if account.active {
            info!(username = %account.username, "account already active");
            return Ok(LoginOutcome::AlreadyActive);
        }

        info!(username = %account.username, "logging in");
        let mut ctx = LoginContext {
            session: Session::default(),
            state: LoginState::Init,
            mailbox: None,
        };

        match self.run(&mut ctx, account).await {
            Ok(()) => {
                ctx.transition(&account.username, LoginState::Success);
                account.set_session(ctx.session);
                account.active = true;
                account.error_msg = None;
                info!(username = %account.username, "logged in");
                Ok(LoginOutcome::Success)
            }
            Err(err) if err.is_forbidden() => {
                ctx.transition(&account.username, LoginState::Failed);
                let message = error_message(&err);
                error!(username = %account.username, error = %err, "login rejected");
                account.active = false;
                account.error_msg = Some(message.clone());
                Ok(LoginOutcome::Rejected { message })
            }
            Err(err) => {
                ctx.transition(&account.username, LoginState::Failed);
                warn!(username = %account.username, error = %err, "login failed");
                account.error_msg = Some(error_message(&err));
                Err(err)
            }
        }
    }

    async fn run(&self, ctx: &mut LoginContext, account: &Account) -> Result<()> {
        let username = account.username.as_str();
        let step = |name: &str| {
            let name = name.to_owned();
            move |e: Error| Error::Step {
                step: name,
                username: username.to_owned(),
                source: Box::new(e),
            }
        };

        if self.config.email_first && !self.config.manual {
            self.open_mailbox(ctx, account)
                .await
                .map_err(step("email_first"))?;
        }

        let guest_token = self.guest_token(ctx).await.map_err(step("guest_token"))?;
        ctx.session
            .headers
            .insert("x-guest-token".into(), guest_token);
        ctx.transition(username, LoginState::GuestTokenObtained);

        let mut response = self
            .post(
                ctx,
                &self.client.login_url,
                Some(LOGIN_FLOW_NAME),
                Some(&subtask::initiate_payload()),
            )
            .await
            .map_err(step("login_initiate"))?;
        ctx.transition(username, LoginState::FlowInitiated);

        for _ in 0..MAX_LOGIN_STEPS {
            ctx.session.apply_csrf();

            let tasks = response
                .get("subtasks")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if tasks.is_empty() {
                if ctx.session.csrf_token().is_none() {
                    return Err(step("login_success")(Error::Protocol(
                        "flow finished without a ct0 cookie".into(),
                    )));
                }
                return Ok(());
            }
            let flow_token = response
                .get("flow_token")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| Error::Protocol("response carries no flow_token".into()))
                .map_err(step("flow"))?;

            // First recognized id wins; unrecognized ones are skipped.
            let known = tasks.iter().find_map(|task| {
                let id = task.get("subtask_id").and_then(Value::as_str)?;
                Subtask::from_id(id).map(|subtask| (subtask, task))
            });
            let Some((subtask, task)) = known else {
                let ids: Vec<&str> = tasks
                    .iter()
                    .filter_map(|t| t.get("subtask_id").and_then(Value::as_str))
                    .collect();
                let first = ids.first().copied().unwrap_or_default();
                return Err(step(first)(Error::Protocol(format!(
                    "no known login subtask in {ids:?}"
                ))));
            };
            let task_id = subtask.id();

            ctx.transition(username, LoginState::Step(subtask));
            response = self
                .answer(ctx, account, subtask, task, &flow_token)
                .await
                .map_err(step(task_id))?;
        }

        Err(step("flow")(Error::Protocol(format!(
            "login did not finish within {MAX_LOGIN_STEPS} steps"
        ))))
    }

    /// Send the input for one subtask and return the server's next response.
    async fn answer(
        &self,
        ctx: &mut LoginContext,
        account: &Account,
        subtask: Subtask,
        task: &Value,
        flow_token: &str,
    ) -> Result<Value> {
        let inputs = match subtask {
            Subtask::JsInstrumentation => vec![subtask::instrumentation_input()],
            Subtask::EnterUsername => vec![subtask::username_input(&account.username)],
            Subtask::EnterPassword => vec![subtask::password_input(&account.password)],
            Subtask::TwoFactor => {
                let secret = account.mfa_secret.as_deref().ok_or_else(|| {
                    Error::Protocol("two-factor challenge but no mfa_secret stored".into())
                })?;
                vec![subtask::two_factor_input(&totp::generate_now(secret)?)]
            }
            Subtask::DuplicationCheck => vec![subtask::duplication_check_input()],
            Subtask::EmailConfirm => {
                let text = if asks_for_code(task) {
                    self.confirmation_code(ctx, account).await?
                } else {
                    account.email.clone()
                };
                vec![subtask::email_confirm_input(&text)]
            }
            Subtask::Success => vec![],
        };

        let body = subtask::flow_payload(flow_token, inputs);
        self.post(ctx, &self.client.login_url, None, Some(&body))
            .await
    }

    async fn guest_token(&self, ctx: &mut LoginContext) -> Result<String> {
        let response = self
            .post(ctx, &self.client.guest_token_url, None, None)
            .await?;
        response
            .get("guest_token")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::Protocol("guest activation returned no guest_token".into()))
    }

    async fn confirmation_code(&self, ctx: &mut LoginContext, account: &Account) -> Result<String> {
        if self.config.manual {
            return self.prompt.prompt(account).await;
        }

        let cutoff = Utc::now() - chrono::Duration::seconds(CODE_CUTOFF_SECS);
        self.open_mailbox(ctx, account).await?;
        let session = ctx
            .mailbox
            .as_mut()
            .ok_or_else(|| Error::VerificationUnavailable("mailbox not open".into()))?;
        mailbox::wait_for_code(
            &mut **session,
            &account.email,
            cutoff,
            self.config.code_poll_interval,
            self.config.code_timeout,
        )
        .await
    }

    async fn open_mailbox(&self, ctx: &mut LoginContext, account: &Account) -> Result<()> {
        if ctx.mailbox.is_some() {
            return Ok(());
        }
        let connector = self.mailbox.as_ref().ok_or_else(|| {
            Error::VerificationUnavailable("no mailbox configured for email codes".into())
        })?;
        let session = connector
            .login(&account.email, &account.email_password)
            .await?;
        debug!(username = %account.username, "mailbox opened");
        ctx.mailbox = Some(session);
        Ok(())
    }

    async fn post(
        &self,
        ctx: &mut LoginContext,
        url: &str,
        flow_name: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let headers = ctx.session.header_map(&self.client)?;
        let mut request = self.http.post(url).headers(headers);
        if let Some(flow_name) = flow_name {
            request = request.query(&[("flow_name", flow_name)]);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        ctx.session.absorb_set_cookies(response.headers());

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading response body: {e}")))?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: truncate(text),
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Protocol(format!("response is not JSON: {e}")))
    }
}

fn asks_for_code(task: &Value) -> bool {
    task.pointer("/enter_text/hint_text")
        .and_then(Value::as_str)
        .is_some_and(|hint| hint.to_lowercase() == CONFIRMATION_CODE_HINT)
}

fn error_message(err: &Error) -> String {
    match err {
        Error::Step { step, source, .. } => format!("login_step={step} err={source}"),
        other => other.to_string(),
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
