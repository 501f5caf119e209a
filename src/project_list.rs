use crate::api::ProjectService;
use crate::errors::{ApiError, BoardError};
use crate::project::{NewProject, Project, ProjectUpdate};
use crate::validation;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectTab {
    #[default]
    Active,
    Inactive,
}

impl ProjectTab {
    pub fn toggled(self) -> Self {
        match self {
            ProjectTab::Active => ProjectTab::Inactive,
            ProjectTab::Inactive => ProjectTab::Active,
        }
    }

    fn shows(self, project: &Project) -> bool {
        match self {
            ProjectTab::Active => project.active,
            ProjectTab::Inactive => !project.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToggle {
    pub project_id: String,
    /// Active flag after the toggle; decides between delete and recover.
    pub activate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProjectEdit {
    pub project_id: String,
    pub update: ProjectUpdate,
}

#[derive(Debug, Default)]
pub struct ProjectList {
    projects: Vec<Project>,
    pub tab: ProjectTab,
    pub selected: usize,
    user_id: Option<String>,
    loading: bool,
    creating: bool,
    error: Option<String>,
    generation: u64,
    in_flight: HashSet<String>,
}

impl ProjectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_user(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn visible(&self) -> Vec<&Project> {
        self.projects.iter().filter(|p| self.tab.shows(p)).collect()
    }

    pub fn selected_project(&self) -> Option<&Project> {
        self.visible().get(self.selected).copied()
    }

    pub fn select(&mut self, delta: isize) {
        let len = self.visible().len();
        self.selected = (self.selected as isize + delta).clamp(0, len.saturating_sub(1) as isize) as usize;
    }

    pub fn switch_tab(&mut self) {
        self.tab = self.tab.toggled();
        self.selected = 0;
    }

    /// Whether edit and activate/deactivate are offered for `project`.
    /// The server still decides; this only hides the controls.
    pub fn can_manage(&self, project: &Project) -> bool {
        project.is_managed_by(self.user_id.as_deref())
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    fn fail(&mut self, err: ApiError) -> BoardError {
        if !err.is_cancelled() {
            self.error = Some(err.user_message());
        }
        BoardError::Api(err)
    }

    fn clamp_selection(&mut self) {
        let len = self.visible().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        self.generation
    }

    pub fn finish_load(
        &mut self,
        generation: u64,
        result: Result<Vec<Project>, ApiError>,
    ) -> Result<(), BoardError> {
        if generation != self.generation {
            return Ok(());
        }
        self.loading = false;
        match result {
            Ok(projects) => {
                info!(count = projects.len(), "projects loaded");
                self.projects = projects;
                self.clamp_selection();
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn begin_create(&mut self, project: NewProject) -> Result<NewProject, BoardError> {
        validation::require_all(&[
            project.title.as_str(),
            project.client.as_str(),
            project.description.as_str(),
        ])?;
        if self.creating {
            return Err(BoardError::Busy {
                id: "new project".into(),
            });
        }
        self.creating = true;
        self.error = None;
        Ok(project)
    }

    /// On success the caller reloads the list.
    pub fn finish_create(&mut self, result: Result<Project, ApiError>) -> Result<(), BoardError> {
        self.creating = false;
        match result {
            Ok(project) => {
                info!(project = %project.id, "project created");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn begin_edit(
        &mut self,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<PendingProjectEdit, BoardError> {
        let project = self
            .project(project_id)
            .ok_or_else(|| BoardError::UnknownProject {
                id: project_id.to_string(),
            })?;
        if !self.can_manage(project) {
            return Err(BoardError::NotManager);
        }
        for value in [&update.title, &update.client, &update.description]
            .into_iter()
            .flatten()
        {
            validation::require_all(&[value.as_str()])?;
        }
        if !self.in_flight.insert(project_id.to_string()) {
            return Err(BoardError::Busy {
                id: project_id.to_string(),
            });
        }
        Ok(PendingProjectEdit {
            project_id: project_id.to_string(),
            update,
        })
    }

    pub fn finish_edit(
        &mut self,
        pending: PendingProjectEdit,
        result: Result<Project, ApiError>,
    ) -> Result<(), BoardError> {
        self.in_flight.remove(&pending.project_id);
        match result {
            Ok(server) => {
                if let Some(slot) = self.projects.iter_mut().find(|p| p.id == pending.project_id) {
                    *slot = server;
                }
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn begin_toggle(&mut self, project_id: &str) -> Result<PendingToggle, BoardError> {
        let project = self
            .project(project_id)
            .ok_or_else(|| BoardError::UnknownProject {
                id: project_id.to_string(),
            })?;
        if !self.can_manage(project) {
            return Err(BoardError::NotManager);
        }
        if !self.in_flight.insert(project_id.to_string()) {
            return Err(BoardError::Busy {
                id: project_id.to_string(),
            });
        }
        let slot = self
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| BoardError::UnknownProject {
                id: project_id.to_string(),
            })?;
        slot.active = !slot.active;
        let activate = slot.active;
        self.clamp_selection();
        self.error = None;
        Ok(PendingToggle {
            project_id: project_id.to_string(),
            activate,
        })
    }

    pub fn finish_toggle(
        &mut self,
        pending: PendingToggle,
        result: Result<(), ApiError>,
    ) -> Result<(), BoardError> {
        self.in_flight.remove(&pending.project_id);
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(project = %pending.project_id, error = %err, "toggle rejected, rolling back");
                if let Some(slot) = self.projects.iter_mut().find(|p| p.id == pending.project_id) {
                    slot.active = !pending.activate;
                }
                self.clamp_selection();
                Err(self.fail(err))
            }
        }
    }
}

/// `recover-project` when activating, `delete-project` otherwise.
pub async fn toggle_request(api: &dyn ProjectService, pending: &PendingToggle) -> Result<(), ApiError> {
    if pending.activate {
        api.recover_project(&pending.project_id).await
    } else {
        api.delete_project(&pending.project_id).await
    }
}
