use crate::api::{AuthService, Registration};
use crate::errors::{ApiError, AuthError, ValidationError};
use crate::session::Session;
use crate::token_flow::{FlowState, TokenFlow};
use crate::validation;
use tracing::{info, warn};

const DUMMY_PASSWORD: &str = "dummyPassword";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Stay,
    Login,
    Workspace,
}

fn rejected(err: ApiError, fallback: &str) -> AuthError {
    let message = match &err {
        ApiError::Transport(_) | ApiError::Cancelled => err.user_message(),
        other => other
            .server_message()
            .filter(|m| !m.is_empty())
            .unwrap_or(fallback)
            .to_string(),
    };
    AuthError::Rejected {
        message,
        source: err,
    }
}

// ── login / logout ───────────────────────────────────────────────────

pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    validation::require_all(&[email, password])?;
    validation::validate_email(email)
}

/// Word a failed login by status code.
pub fn login_error(err: ApiError) -> AuthError {
    let message = match err.status() {
        Some(409) => "Your account is not confirmed yet. Check your email for the token.",
        Some(404) => "No account exists for that email.",
        Some(401) => "Wrong password.",
        _ => return rejected(err, "Could not log in."),
    };
    AuthError::Rejected {
        message: message.to_string(),
        source: err,
    }
}

pub fn complete_login(session: &Session, token: &str) -> Result<(), AuthError> {
    session.store(token)?;
    info!("logged in");
    Ok(())
}

pub async fn login(
    api: &dyn AuthService,
    session: &Session,
    email: &str,
    password: &str,
) -> Result<(), AuthError> {
    validate_login(email, password)?;
    let token = api
        .login(email.trim(), password)
        .await
        .map_err(login_error)?;
    complete_login(session, &token)
}

pub fn logout(session: &Session) -> Result<(), AuthError> {
    session.clear()?;
    info!("logged out");
    Ok(())
}

// ── registration ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RegistrationFlow {
    pub form: Registration,
    pub token: TokenFlow,
    submitting: bool,
    notice: Option<String>,
}

impl RegistrationFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlowState {
        self.token.state()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let f = &self.form;
        validation::require_all(&[
            f.name.as_str(),
            f.email.as_str(),
            f.password.as_str(),
            f.confirm_password.as_str(),
        ])?;
        validation::validate_email(&f.email)?;
        validation::validate_new_password(&f.password, &f.confirm_password)
    }

    pub fn begin_submit(&mut self) -> Result<Registration, AuthError> {
        if self.submitting {
            return Err(AuthError::Busy);
        }
        self.validate()?;
        self.submitting = true;
        let mut form = self.form.clone();
        form.email = form.email.trim().to_string();
        Ok(form)
    }

    pub fn finish_submit(&mut self, result: Result<(), ApiError>) -> Result<Next, AuthError> {
        self.submitting = false;
        match result {
            Ok(()) => {
                info!(email = %self.form.email, "account created, awaiting token");
                self.token.credentials_accepted();
                self.notice = Some(format!("We sent a 6-digit token to {}.", self.form.email));
                Ok(Next::Stay)
            }
            Err(err) if err.status() == Some(404) && err.code() == Some("USER_NOT_CONFIRMED") => {
                let message = err.server_message().unwrap_or("Account not confirmed.").to_string();
                self.notice = Some(message.clone());
                Err(AuthError::Unconfirmed { message })
            }
            Err(err) if err.status() == Some(409) => Err(AuthError::Rejected {
                message: "That email is already registered. Use another one.".into(),
                source: err,
            }),
            Err(err) => Err(rejected(err, "Could not register the account.")),
        }
    }

    /// After a successful verification the flow is over and the user logs in.
    pub fn finish_verification(&mut self, token: &str, result: Result<(), ApiError>) -> Next {
        self.token.verification_finished(token, result);
        if self.token.state() == FlowState::Verified {
            self.token.finish();
            self.notice = Some("Account verified. You can log in now.".into());
            return Next::Login;
        }
        Next::Stay
    }

    pub fn begin_resend(&mut self) -> Option<String> {
        if !self.token.can_resend() || self.submitting {
            return None;
        }
        self.submitting = true;
        Some(self.form.email.trim().to_string())
    }

    pub fn finish_resend(&mut self, result: Result<(), ApiError>) {
        self.submitting = false;
        match result {
            Ok(()) => self.notice = Some("A new token is on its way.".into()),
            Err(err) => self.token.set_error(rejected(err, "Could not send a new token.").to_string()),
        }
    }
}

// ── password reset ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PasswordResetFlow {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub token: TokenFlow,
    busy: bool,
    notice: Option<String>,
    signed_in: bool,
}

/// Token request for an account already known to be confirmed.
pub async fn request_account_token(api: &dyn AuthService, email: &str) -> Result<(), AuthError> {
    api.request_password_change(email)
        .await
        .map_err(|err| rejected(err, "Could not request the token. Try again."))
}

/// Probe the account with a throwaway login, then ask for a reset token.
/// A 409 from the probe means the account was never confirmed.
pub async fn request_reset_token(api: &dyn AuthService, email: &str) -> Result<(), AuthError> {
    if let Err(err) = api.login(email, DUMMY_PASSWORD).await {
        if err.status() == Some(409) {
            return Err(AuthError::Unconfirmed {
                message: "Your account is not confirmed. Confirm it from the login screen first."
                    .into(),
            });
        }
    }
    request_account_token(api, email).await
}

impl PasswordResetFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Password change from the profile screen. The email is the account's
    /// own, so the unconfirmed-account probe is skipped.
    pub fn for_account(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            signed_in: true,
            ..Self::default()
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.signed_in
    }

    pub fn state(&self) -> FlowState {
        self.token.state()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn begin_request(&mut self) -> Result<String, AuthError> {
        if self.busy {
            return Err(AuthError::Busy);
        }
        validation::validate_email(&self.email)?;
        self.busy = true;
        Ok(self.email.trim().to_string())
    }

    /// Also used for resend; a resend leaves the state where it is.
    pub fn finish_request(&mut self, result: Result<(), AuthError>) -> Result<(), AuthError> {
        self.busy = false;
        result?;
        if self.token.state() == FlowState::CollectingCredentials {
            self.token.credentials_accepted();
        }
        self.notice = Some(format!("We sent a 6-digit token to {}.", self.email.trim()));
        Ok(())
    }

    pub fn begin_resend(&mut self) -> Option<String> {
        if !self.token.can_resend() {
            return None;
        }
        self.begin_request().ok()
    }

    pub fn finish_verification(&mut self, token: &str, result: Result<(), ApiError>) {
        self.token.verification_finished(token, result);
        if self.token.state() == FlowState::Verified {
            self.notice = Some("Token verified. Choose a new password.".into());
        }
    }

    /// Token, password and confirmation for `change-password`.
    pub fn begin_change(&mut self) -> Result<(String, String, String), AuthError> {
        if self.busy {
            return Err(AuthError::Busy);
        }
        let token = self
            .token
            .confirmed_token()
            .ok_or(ValidationError::MalformedToken)?
            .to_string();
        validation::validate_new_password(&self.password, &self.confirm_password)?;
        self.busy = true;
        Ok((token, self.password.clone(), self.confirm_password.clone()))
    }

    pub fn finish_change(&mut self, result: Result<(), ApiError>) -> Result<Next, AuthError> {
        self.busy = false;
        match result {
            Ok(()) => {
                self.token.finish();
                info!(signed_in = self.signed_in, "password changed");
                if self.signed_in {
                    self.notice = Some("Password changed.".into());
                    return Ok(Next::Stay);
                }
                self.notice = Some("Password changed. You can log in now.".into());
                Ok(Next::Login)
            }
            Err(err) => {
                warn!(error = %err, "password change rejected");
                Err(rejected(
                    err,
                    "Could not change the password. It needs at least 8 characters.",
                ))
            }
        }
    }
}

// ── profile ──────────────────────────────────────────────────────────

pub fn validate_profile_name(name: &str) -> Result<(), ValidationError> {
    validation::require("Name", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::User;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAuth {
        login_status: Option<StatusCode>,
        create_status: Option<(StatusCode, Option<&'static str>)>,
        valid_token: &'static str,
        calls: Mutex<Vec<String>>,
    }

    fn status_err(status: StatusCode, code: Option<&str>) -> ApiError {
        ApiError::from_status(status, Some(format!("server says {}", status.as_u16())), code.map(String::from))
    }

    #[async_trait]
    impl AuthService for FakeAuth {
        async fn create_user(&self, r: &Registration) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("create {}", r.email));
            match self.create_status {
                Some((s, code)) => Err(status_err(s, code)),
                None => Ok(()),
            }
        }

        async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
            self.calls.lock().unwrap().push(format!("login {email} {password}"));
            match self.login_status {
                Some(s) => Err(status_err(s, None)),
                None => Ok("jwt-token".into()),
            }
        }

        async fn request_auth_token(&self, email: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("resend {email}"));
            Ok(())
        }

        async fn confirm_user(&self, token: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("confirm {token}"));
            if token == self.valid_token {
                Ok(())
            } else {
                Err(status_err(StatusCode::UNAUTHORIZED, None))
            }
        }

        async fn request_password_change(&self, email: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("reset {email}"));
            Ok(())
        }

        async fn confirm_password_token(&self, token: &str) -> Result<(), ApiError> {
            self.confirm_user(token).await
        }

        async fn change_password(&self, token: &str, _p: &str, _c: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("change {token}"));
            Ok(())
        }

        async fn get_profile(&self) -> Result<User, ApiError> {
            Ok(User {
                id: "u1".into(),
                name: "Ana".into(),
                email: "ana@example.com".into(),
                confirmed: true,
            })
        }

        async fn update_profile(&self, _name: &str) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn calls(api: &FakeAuth) -> Vec<String> {
        api.calls.lock().unwrap().clone()
    }

    fn filled_registration() -> RegistrationFlow {
        let mut flow = RegistrationFlow::new();
        flow.form = Registration {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "longenough".into(),
            confirm_password: "longenough".into(),
        };
        flow
    }

    #[tokio::test]
    async fn login_stores_token_in_session() {
        let api = FakeAuth::default();
        let session = Session::in_memory();
        login(&api, &session, "ana@example.com", "secret").await.unwrap();
        assert_eq!(session.token().as_deref(), Some("jwt-token"));

        logout(&session).unwrap();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn login_errors_are_worded_per_status() {
        for (status, expected) in [
            (StatusCode::CONFLICT, "Your account is not confirmed yet. Check your email for the token."),
            (StatusCode::NOT_FOUND, "No account exists for that email."),
            (StatusCode::UNAUTHORIZED, "Wrong password."),
            (StatusCode::INTERNAL_SERVER_ERROR, "server says 500"),
        ] {
            let api = FakeAuth {
                login_status: Some(status),
                ..Default::default()
            };
            let session = Session::in_memory();
            let err = login(&api, &session, "ana@example.com", "pw").await.unwrap_err();
            assert_eq!(err.user_message(), expected);
            assert!(!session.is_authenticated());
        }
    }

    #[tokio::test]
    async fn malformed_login_never_hits_network() {
        let api = FakeAuth::default();
        let err = login(&api, &Session::in_memory(), "ana", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Validation(ValidationError::InvalidEmail)));
        assert!(calls(&api).is_empty());
    }

    fn rejected_with(status: StatusCode, code: Option<&str>) -> Result<(), ApiError> {
        Err(status_err(status, code))
    }

    #[test]
    fn registration_validates_before_submitting() {
        let mut flow = filled_registration();
        flow.form.confirm_password = "different1".into();
        let err = flow.begin_submit().unwrap_err();
        assert!(matches!(err, AuthError::Validation(ValidationError::PasswordMismatch)));
        assert!(!flow.is_submitting());
        assert_eq!(flow.state(), FlowState::CollectingCredentials);
    }

    #[test]
    fn registration_happy_path() {
        let mut flow = filled_registration();
        flow.form.email = " ana@example.com ".into();
        let sent = flow.begin_submit().unwrap();
        assert_eq!(sent.email, "ana@example.com");
        assert!(matches!(flow.begin_submit(), Err(AuthError::Busy)));

        assert_eq!(flow.finish_submit(Ok(())).unwrap(), Next::Stay);
        assert_eq!(flow.state(), FlowState::AwaitingToken);

        assert_eq!(flow.begin_resend().as_deref(), Some("ana@example.com"));
        assert_eq!(flow.begin_resend(), None);
        flow.finish_resend(Ok(()));
        assert_eq!(flow.notice(), Some("A new token is on its way."));

        for c in "12345".chars() {
            assert_eq!(flow.token.type_char(c), None);
        }
        let token = flow.token.type_char('6').unwrap();
        assert_eq!(flow.finish_verification(&token, Ok(())), Next::Login);
        assert_eq!(flow.state(), FlowState::Done);
    }

    #[test]
    fn wrong_token_clears_digits() {
        let mut flow = filled_registration();
        flow.begin_submit().unwrap();
        flow.finish_submit(Ok(())).unwrap();
        let token = flow.token.paste("000000").unwrap();
        let next = flow.finish_verification(&token, rejected_with(StatusCode::UNAUTHORIZED, None));
        assert_eq!(next, Next::Stay);
        assert!(flow.token.input().is_empty());
        assert_eq!(flow.token.error(), Some("server says 401"));
        assert_eq!(flow.state(), FlowState::AwaitingToken);
    }

    #[test]
    fn duplicate_email_and_unconfirmed_account() {
        let mut flow = filled_registration();
        flow.begin_submit().unwrap();
        let err = flow
            .finish_submit(rejected_with(StatusCode::CONFLICT, None))
            .unwrap_err();
        assert_eq!(err.user_message(), "That email is already registered. Use another one.");
        assert_eq!(flow.state(), FlowState::CollectingCredentials);

        flow.begin_submit().unwrap();
        let err = flow
            .finish_submit(rejected_with(StatusCode::NOT_FOUND, Some("USER_NOT_CONFIRMED")))
            .unwrap_err();
        assert!(matches!(err, AuthError::Unconfirmed { .. }));
    }

    #[tokio::test]
    async fn password_reset_full_flow() {
        let api = FakeAuth {
            login_status: Some(StatusCode::UNAUTHORIZED),
            ..Default::default()
        };
        let mut flow = PasswordResetFlow::new();
        flow.email = "ana@example.com".into();
        let email = flow.begin_request().unwrap();
        let result = request_reset_token(&api, &email).await;
        flow.finish_request(result).unwrap();
        assert_eq!(flow.state(), FlowState::AwaitingToken);
        assert_eq!(
            calls(&api),
            vec!["login ana@example.com dummyPassword", "reset ana@example.com"]
        );

        let token = flow.token.paste("654321").unwrap();
        flow.finish_verification(&token, Ok(()));
        assert_eq!(flow.state(), FlowState::Verified);

        flow.password = "newpassword".into();
        flow.confirm_password = "newpassword".into();
        let (token, password, _) = flow.begin_change().unwrap();
        assert_eq!((token.as_str(), password.as_str()), ("654321", "newpassword"));
        assert_eq!(flow.finish_change(Ok(())).unwrap(), Next::Login);
        assert_eq!(flow.state(), FlowState::Done);
    }

    #[tokio::test]
    async fn password_reset_stops_for_unconfirmed_account() {
        let api = FakeAuth {
            login_status: Some(StatusCode::CONFLICT),
            ..Default::default()
        };
        let mut flow = PasswordResetFlow::new();
        flow.email = "ana@example.com".into();
        let email = flow.begin_request().unwrap();
        let err = flow
            .finish_request(request_reset_token(&api, &email).await)
            .unwrap_err();
        assert!(matches!(err, AuthError::Unconfirmed { .. }));
        assert!(!flow.is_busy());
        assert_eq!(flow.state(), FlowState::CollectingCredentials);
        assert!(!calls(&api).iter().any(|c| c.starts_with("reset")));
    }

    #[tokio::test]
    async fn account_password_change_skips_the_probe_and_stays() {
        let api = FakeAuth::default();
        let mut flow = PasswordResetFlow::for_account("ana@example.com");
        assert!(flow.is_signed_in());
        let email = flow.begin_request().unwrap();
        flow.finish_request(request_account_token(&api, &email).await)
            .unwrap();
        assert_eq!(calls(&api), vec!["reset ana@example.com"]);

        let token = flow.token.paste("111222").unwrap();
        flow.finish_verification(&token, Ok(()));
        flow.password = "newpassword".into();
        flow.confirm_password = "newpassword".into();
        flow.begin_change().unwrap();
        assert_eq!(flow.finish_change(Ok(())).unwrap(), Next::Stay);
        assert_eq!(flow.notice(), Some("Password changed."));
    }

    #[test]
    fn change_requires_verified_token() {
        let mut flow = PasswordResetFlow::new();
        flow.password = "newpassword".into();
        flow.confirm_password = "newpassword".into();
        let err = flow.begin_change().unwrap_err();
        assert!(matches!(err, AuthError::Validation(ValidationError::MalformedToken)));
        assert!(!flow.is_busy());
    }

    #[test]
    fn failed_change_keeps_the_verified_token() {
        let mut flow = PasswordResetFlow::new();
        flow.token.credentials_accepted();
        let token = flow.token.paste("654321").unwrap();
        flow.finish_verification(&token, Ok(()));
        flow.password = "newpassword".into();
        flow.confirm_password = "newpassword".into();
        flow.begin_change().unwrap();
        let err = flow
            .finish_change(Err(status_err(StatusCode::BAD_REQUEST, None)))
            .unwrap_err();
        assert_eq!(err.user_message(), "server says 400");
        assert_eq!(flow.state(), FlowState::Verified);
        assert!(flow.begin_change().is_ok());
    }

    #[test]
    fn profile_name_cannot_be_blank() {
        assert!(validate_profile_name("  ").is_err());
        assert!(validate_profile_name("Ana Maria").is_ok());
    }
}
