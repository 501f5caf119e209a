use crate::errors::ApiError;
use tracing::debug;

pub const TOKEN_LEN: usize = 6;

const DEFAULT_REJECTION: &str = "Invalid token. Please try again.";

/// One field per digit, with the focus following input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenInput {
    digits: [Option<char>; TOKEN_LEN],
    focus: usize,
}

impl TokenInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn digits(&self) -> &[Option<char>; TOKEN_LEN] {
        &self.digits
    }

    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.digits.iter().all(Option::is_none)
    }

    pub fn value(&self) -> Option<String> {
        self.digits.iter().copied().collect()
    }

    /// Set field `index` to `value`. Non-digits are ignored. A digit moves
    /// focus forward, an empty value moves it back.
    pub fn set_field(&mut self, index: usize, value: &str) {
        if index >= TOKEN_LEN {
            return;
        }
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (None, _) => {
                self.digits[index] = None;
                if index > 0 {
                    self.focus = index - 1;
                } else {
                    self.focus = 0;
                }
            }
            (Some(c), None) if c.is_ascii_digit() => {
                self.digits[index] = Some(c);
                self.focus = (index + 1).min(TOKEN_LEN - 1);
            }
            _ => {}
        }
    }

    pub fn type_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.set_field(self.focus, c.encode_utf8(&mut buf));
    }

    pub fn backspace(&mut self) {
        if self.digits[self.focus].is_none() && self.focus > 0 {
            self.focus -= 1;
            self.digits[self.focus] = None;
        } else {
            self.set_field(self.focus, "");
        }
    }

    /// Fill every field from pasted text. Only the first six characters are
    /// considered and all of them must be digits; otherwise nothing changes.
    pub fn paste(&mut self, text: &str) -> bool {
        let head: Vec<char> = text.trim().chars().take(TOKEN_LEN).collect();
        if head.len() != TOKEN_LEN || !head.iter().all(char::is_ascii_digit) {
            return false;
        }
        for (slot, c) in self.digits.iter_mut().zip(head) {
            *slot = Some(c);
        }
        self.focus = TOKEN_LEN - 1;
        true
    }

    pub fn clear(&mut self) {
        self.digits = [None; TOKEN_LEN];
        self.focus = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    CollectingCredentials,
    AwaitingToken,
    Verified,
    Done,
}

/// Confirmation state shared by registration and password reset.
#[derive(Debug, Clone)]
pub struct TokenFlow {
    state: FlowState,
    input: TokenInput,
    verifying: bool,
    error: Option<String>,
    /// Token accepted by the server, kept for the password change request.
    confirmed_token: Option<String>,
}

impl Default for TokenFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenFlow {
    pub fn new() -> Self {
        Self {
            state: FlowState::CollectingCredentials,
            input: TokenInput::new(),
            verifying: false,
            error: None,
            confirmed_token: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn input(&self) -> &TokenInput {
        &self.input
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying
    }

    pub fn confirmed_token(&self) -> Option<&str> {
        self.confirmed_token.as_deref()
    }

    pub fn credentials_accepted(&mut self) {
        if self.state == FlowState::CollectingCredentials {
            self.state = FlowState::AwaitingToken;
            self.input.clear();
            self.error = None;
        }
    }

    fn accepting_input(&self) -> bool {
        self.state == FlowState::AwaitingToken && !self.verifying
    }

    /// Returns the token to verify when this keystroke completed it.
    pub fn type_char(&mut self, c: char) -> Option<String> {
        if !self.accepting_input() {
            return None;
        }
        self.input.type_char(c);
        self.maybe_start_verification()
    }

    pub fn backspace(&mut self) {
        if self.accepting_input() {
            self.input.backspace();
        }
    }

    pub fn paste(&mut self, text: &str) -> Option<String> {
        if !self.accepting_input() || !self.input.paste(text) {
            return None;
        }
        self.maybe_start_verification()
    }

    fn maybe_start_verification(&mut self) -> Option<String> {
        let token = self.input.value()?;
        self.verifying = true;
        self.error = None;
        debug!("token complete, verifying");
        Some(token)
    }

    pub fn verification_finished(&mut self, token: &str, result: Result<(), ApiError>) {
        self.verifying = false;
        match result {
            Ok(()) => {
                self.state = FlowState::Verified;
                self.confirmed_token = Some(token.to_string());
                self.error = None;
            }
            Err(err) if err.is_cancelled() => {}
            Err(err) => {
                self.input.clear();
                self.error = Some(
                    err.server_message()
                        .map(str::to_string)
                        .unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
                );
            }
        }
    }

    pub fn can_resend(&self) -> bool {
        self.accepting_input()
    }

    pub fn finish(&mut self) {
        if self.state == FlowState::Verified {
            self.state = FlowState::Done;
        }
    }
}
