//! Onboarding subtasks and their request payloads

use serde_json::{Value, json};

use crate::constants::{
    JS_INSTRUMENTATION_RESPONSE, SUBTASK_DUPLICATION_CHECK, SUBTASK_EMAIL_CONFIRM,
    SUBTASK_ENTER_PASSWORD, SUBTASK_ENTER_USERNAME, SUBTASK_JS_INSTRUMENTATION, SUBTASK_SUCCESS,
    SUBTASK_TWO_FACTOR,
};

/// A server-issued login step the client knows how to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtask {
    JsInstrumentation,
    EnterUsername,
    EnterPassword,
    TwoFactor,
    DuplicationCheck,
    EmailConfirm,
    Success,
}

impl Subtask {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            SUBTASK_JS_INSTRUMENTATION => Some(Self::JsInstrumentation),
            SUBTASK_ENTER_USERNAME => Some(Self::EnterUsername),
            SUBTASK_ENTER_PASSWORD => Some(Self::EnterPassword),
            SUBTASK_TWO_FACTOR => Some(Self::TwoFactor),
            SUBTASK_DUPLICATION_CHECK => Some(Self::DuplicationCheck),
            SUBTASK_EMAIL_CONFIRM => Some(Self::EmailConfirm),
            SUBTASK_SUCCESS => Some(Self::Success),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::JsInstrumentation => SUBTASK_JS_INSTRUMENTATION,
            Self::EnterUsername => SUBTASK_ENTER_USERNAME,
            Self::EnterPassword => SUBTASK_ENTER_PASSWORD,
            Self::TwoFactor => SUBTASK_TWO_FACTOR,
            Self::DuplicationCheck => SUBTASK_DUPLICATION_CHECK,
            Self::EmailConfirm => SUBTASK_EMAIL_CONFIRM,
            Self::Success => SUBTASK_SUCCESS,
        }
    }
}

/// Body of the first onboarding request.
pub fn initiate_payload() -> Value {
    json!({
        "input_flow_data": {
            "flow_context": {
                "debug_overrides": {},
                "start_location": { "location": "unknown" },
            }
        },
        "subtask_versions": {},
    })
}

/// Body answering the current step: the flow token plus zero or one input.
pub fn flow_payload(flow_token: &str, inputs: Vec<Value>) -> Value {
    json!({
        "flow_token": flow_token,
        "subtask_inputs": inputs,
    })
}

pub fn instrumentation_input() -> Value {
    json!({
        "subtask_id": SUBTASK_JS_INSTRUMENTATION,
        "js_instrumentation": {
            "response": JS_INSTRUMENTATION_RESPONSE,
            "link": "next_link",
        },
    })
}

pub fn username_input(username: &str) -> Value {
    json!({
        "subtask_id": SUBTASK_ENTER_USERNAME,
        "settings_list": {
            "setting_responses": [{
                "key": "user_identifier",
                "response_data": { "text_data": { "result": username } },
            }],
            "link": "next_link",
        },
    })
}

pub fn password_input(password: &str) -> Value {
    json!({
        "subtask_id": SUBTASK_ENTER_PASSWORD,
        "enter_password": { "password": password, "link": "next_link" },
    })
}

pub fn two_factor_input(code: &str) -> Value {
    json!({
        "subtask_id": SUBTASK_TWO_FACTOR,
        "enter_text": { "text": code, "link": "next_link" },
    })
}

pub fn duplication_check_input() -> Value {
    json!({
        "subtask_id": SUBTASK_DUPLICATION_CHECK,
        "check_logged_in_account": { "link": "AccountDuplicationCheck_false" },
    })
}

pub fn email_confirm_input(text: &str) -> Value {
    json!({
        "subtask_id": SUBTASK_EMAIL_CONFIRM,
        "enter_text": { "text": text, "link": "next_link" },
    })
}
