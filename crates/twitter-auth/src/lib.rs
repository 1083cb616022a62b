//! Account records, durable storage, and the login flow
//!
//! An `Account` is one scraping identity. `AccountStore` persists accounts
//! as one JSON file each. `Authenticator` walks the server-driven onboarding
//! flow to turn stored credentials into an active session:
//!
//! 1. Activate a guest token
//! 2. Initiate the `login` flow
//! 3. Answer each issued subtask (username, password, TOTP, email code, ...)
//! 4. Capture the resulting cookies and CSRF headers on the account
//!
//! Confirmation codes come from a `MailboxConnector` supplied by the caller,
//! or from a `CodePrompt` in manual mode.

pub mod account;
pub mod constants;
pub mod error;
pub mod login;
pub mod mailbox;
pub mod store;
pub mod subtask;
pub mod totp;

pub use account::Account;
pub use error::{Error, Result};
pub use login::{Authenticator, LoginConfig, LoginOutcome, LoginState};
pub use mailbox::{
    CodePrompt, MailMessage, MailboxConnector, MailboxSession, StdinPrompt, wait_for_code,
};
pub use store::AccountStore;
pub use subtask::Subtask;
