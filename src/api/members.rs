use super::ApiClient;
use crate::errors::ApiError;
use crate::member::{Member, User};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

#[async_trait]
pub trait MemberService: Send + Sync {
    async fn find_user(&self, email: &str) -> Result<User, ApiError>;

    async fn add_member(&self, project_id: &str, user_id: &str) -> Result<(), ApiError>;

    async fn get_members(&self, project_id: &str) -> Result<Vec<Member>, ApiError>;

    async fn delete_member(&self, project_id: &str, user_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl MemberService for ApiClient {
    async fn find_user(&self, email: &str) -> Result<User, ApiError> {
        self.send_json(
            self.request(Method::POST, "find-user")
                .json(&json!({ "email": email })),
        )
        .await
    }

    async fn add_member(&self, project_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::POST, &format!("add-member/{project_id}"))
                .json(&json!({ "id": user_id })),
        )
        .await
    }

    async fn get_members(&self, project_id: &str) -> Result<Vec<Member>, ApiError> {
        self.send_json(self.request(Method::GET, &format!("get-members/{project_id}")))
            .await
    }

    async fn delete_member(&self, project_id: &str, user_id: &str) -> Result<(), ApiError> {
        self.send_empty(
            self.request(Method::DELETE, &format!("delete-member/{project_id}"))
                .json(&json!({ "id": user_id })),
        )
        .await
    }
}
