use super::ApiClient;
use crate::errors::ApiError;
use crate::member::User;
use crate::session::parse_token;
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::json;

/// Body of `create-user`.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn create_user(&self, registration: &Registration) -> Result<(), ApiError>;

    /// Returns the bearer token; storing it is the caller's job.
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError>;

    async fn request_auth_token(&self, email: &str) -> Result<(), ApiError>;

    async fn confirm_user(&self, token: &str) -> Result<(), ApiError>;

    async fn request_password_change(&self, email: &str) -> Result<(), ApiError>;

    async fn confirm_password_token(&self, token: &str) -> Result<(), ApiError>;

    async fn change_password(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError>;

    async fn get_profile(&self) -> Result<User, ApiError>;

    async fn update_profile(&self, name: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl AuthService for ApiClient {
    async fn create_user(&self, registration: &Registration) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, "create-user").json(registration))
            .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let body = self
            .send_text(
                self.request(Method::POST, "login")
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        parse_token(&body).ok_or_else(|| ApiError::Decode("login response carried no token".into()))
    }

    async fn request_auth_token(&self, email: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::POST, "request-auth-token")
                .json(&json!({ "email": email })),
        )
        .await
    }

    async fn confirm_user(&self, token: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::POST, "confirm-user")
                .json(&json!({ "token": token })),
        )
        .await
    }

    async fn request_password_change(&self, email: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::POST, "request-password-change")
                .json(&json!({ "email": email })),
        )
        .await
    }

    async fn confirm_password_token(&self, token: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::POST, "confirm-password-token")
                .json(&json!({ "token": token })),
        )
        .await
    }

    async fn change_password(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, "change-password").json(&json!({
            "token": token,
            "password": password,
            "confirm_password": confirm_password,
        })))
        .await
    }

    async fn get_profile(&self) -> Result<User, ApiError> {
        self.send_json(self.request(Method::GET, "get-profile"))
            .await
    }

    async fn update_profile(&self, name: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::PUT, "update-profile")
                .json(&json!({ "name": name })),
        )
        .await
    }
}
