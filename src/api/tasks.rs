use super::ApiClient;
use crate::errors::ApiError;
use crate::task::{Task, TaskPayload};
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create_task(&self, project_id: &str, task: &TaskPayload) -> Result<Task, ApiError>;

    async fn get_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError>;

    async fn get_task(&self, project_id: &str, task_id: &str) -> Result<Task, ApiError>;

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        task: &TaskPayload,
    ) -> Result<Task, ApiError>;

    async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl TaskService for ApiClient {
    async fn create_task(&self, project_id: &str, task: &TaskPayload) -> Result<Task, ApiError> {
        self.send_json(
            self.request(Method::POST, &format!("create-task/{project_id}"))
                .json(task),
        )
        .await
    }

    async fn get_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError> {
        self.send_json(self.request(Method::GET, &format!("get-tasks/{project_id}")))
            .await
    }

    async fn get_task(&self, project_id: &str, task_id: &str) -> Result<Task, ApiError> {
        self.send_json(self.request(Method::GET, &format!("get-task/{project_id}/{task_id}")))
            .await
    }

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        task: &TaskPayload,
    ) -> Result<Task, ApiError> {
        self.send_json(
            self.request(Method::PUT, &format!("update-task/{project_id}/{task_id}"))
                .json(task),
        )
        .await
    }

    async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::DELETE, &format!("delete-task/{project_id}/{task_id}")))
            .await
    }
}
