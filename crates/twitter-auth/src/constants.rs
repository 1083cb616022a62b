//! Login flow constants
//!
//! Subtask identifiers are assigned by the server; the client only recognizes
//! them. Notification senders are the addresses the provider mails
//! confirmation codes from.

pub const SUBTASK_JS_INSTRUMENTATION: &str = "LoginJsInstrumentationSubtask";
pub const SUBTASK_ENTER_USERNAME: &str = "LoginEnterUserIdentifierSSO";
pub const SUBTASK_ENTER_PASSWORD: &str = "LoginEnterPassword";
pub const SUBTASK_TWO_FACTOR: &str = "LoginTwoFactorAuthChallenge";
pub const SUBTASK_DUPLICATION_CHECK: &str = "AccountDuplicationCheck";
pub const SUBTASK_EMAIL_CONFIRM: &str = "LoginAcid";
pub const SUBTASK_SUCCESS: &str = "LoginSuccessSubtask";

/// Captured browser instrumentation result sent for the JS instrumentation step.
pub const JS_INSTRUMENTATION_RESPONSE: &str = r#"{"rf":{"ee9d114bd114827ce8d4cca456f19b3374321d65f0c52660b185810fef13f85e":-8,"a1a6293fd3b347788d825c22dc3f5da69e314776cd4e10978f0508c1727c471e":124,"ad9f941bbb8b0a8bbc18aeebb8d5b2b3ee363c68fbde149b7f9ee9945abfe522":-214,"c32d5d4020fe0180a3afdee9e931d1c38a436cfa58e511be8f0be534934beba1":203},"s":"WCdLUtsnS3qdTPMQrei9PN3O7Ln86ojKdsZyfMmr5q0jEsdXE6KR7qrF1eOaKlf75eReaup2xTEuBSAXd55oPEDL79NZtoM5tr33sVgNhL2N2YVLPI7X3h-0Ah2NvS6WaQTbLXK0ShEiGS9z48qalQ-oM5smlxhZhLRL7rS-y9IB_euQooEmwC3Dyn-Ka8uXybagc8C6ENaKBk9cBDkw7CFHBKekunjnKElUr0VGCYuuWJtX2PL4AMkZgBtpD_2PVbl_RN8mZkw7cx5Qbr_dGvo8vNKSmHdCwYFwKz6q38TMXXEEgQw_3BnYpqnhC4P-xDwrR_b3W7S2zZ8rSp6wUgAAAYj7_CMQ"}"#;

/// Flow name passed on the first onboarding request.
pub const LOGIN_FLOW_NAME: &str = "login";

/// Prompt text that marks a `LoginAcid` step as asking for a mailed code.
pub const CONFIRMATION_CODE_HINT: &str = "confirmation code";

/// Senders of confirmation-code mail.
pub const NOTIFICATION_SENDERS: &[&str] = &["info@twitter.com", "info@x.com"];

/// How far back a confirmation mail may predate the code request.
pub const CODE_CUTOFF_SECS: i64 = 30;

/// Upper bound on server-driven steps in one attempt.
pub const MAX_LOGIN_STEPS: usize = 32;
