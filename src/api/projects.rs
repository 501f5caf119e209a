use super::ApiClient;
use crate::errors::ApiError;
use crate::project::{NewProject, Project, ProjectUpdate};
use async_trait::async_trait;
use reqwest::Method;

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError>;

    async fn get_projects(&self) -> Result<Vec<Project>, ApiError>;

    async fn get_project(&self, project_id: &str) -> Result<Project, ApiError>;

    async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError>;

    /// Soft delete: the project is marked inactive.
    async fn delete_project(&self, project_id: &str) -> Result<(), ApiError>;

    async fn recover_project(&self, project_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl ProjectService for ApiClient {
    async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
        self.send_json(self.request(Method::POST, "create-project").json(project))
            .await
    }

    async fn get_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.send_json(self.request(Method::GET, "get-projects"))
            .await
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ApiError> {
        self.send_json(self.request(Method::GET, &format!("get-project/{project_id}")))
            .await
    }

    async fn update_project(
        &self,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<Project, ApiError> {
        self.send_json(
            self.request(Method::PUT, &format!("update-project/{project_id}"))
                .json(update),
        )
        .await
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::PATCH, &format!("delete-project/{project_id}")))
            .await
    }

    async fn recover_project(&self, project_id: &str) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::PATCH, &format!("recover-project/{project_id}")))
            .await
    }
}
