use crate::api::MemberService;
use crate::errors::ApiError;
use crate::member::{Member, User};
use crate::validation;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberAction {
    Load,
    Search { email: String },
    Add { user_id: String },
    Remove { user_id: String },
}

#[derive(Debug)]
pub enum MemberOutcome {
    Members(Result<Vec<Member>, ApiError>),
    Found(Result<User, ApiError>),
    /// Add or remove failed before the list could be reloaded.
    Changed {
        action: MemberAction,
        error: ApiError,
    },
}

impl MemberAction {
    /// Perform the calls. Add and remove reload the member list afterwards.
    pub async fn run(self, api: &dyn MemberService, project_id: &str) -> MemberOutcome {
        match &self {
            MemberAction::Load => MemberOutcome::Members(api.get_members(project_id).await),
            MemberAction::Search { email } => MemberOutcome::Found(api.find_user(email).await),
            MemberAction::Add { user_id } => match api.add_member(project_id, user_id).await {
                Ok(()) => MemberOutcome::Members(api.get_members(project_id).await),
                Err(error) => MemberOutcome::Changed {
                    action: self.clone(),
                    error,
                },
            },
            MemberAction::Remove { user_id } => {
                match api.delete_member(project_id, user_id).await {
                    Ok(()) => MemberOutcome::Members(api.get_members(project_id).await),
                    Err(error) => MemberOutcome::Changed {
                        action: self.clone(),
                        error,
                    },
                }
            }
        }
    }

    fn failure_message(&self) -> &'static str {
        match self {
            MemberAction::Load => "Could not load members.",
            MemberAction::Search { .. } => "User not found.",
            MemberAction::Add { .. } => "Could not add member.",
            MemberAction::Remove { .. } => "Could not remove member.",
        }
    }
}

#[derive(Debug)]
pub struct MembersPanel {
    project_id: String,
    members: Vec<Member>,
    found: Option<User>,
    pub selected: usize,
    loading: bool,
    last_action: Option<MemberAction>,
    error: Option<String>,
}

impl MembersPanel {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            members: Vec::new(),
            found: None,
            selected: 0,
            loading: false,
            last_action: None,
            error: None,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn found(&self) -> Option<&User> {
        self.found.as_ref()
    }

    pub fn selected_member(&self) -> Option<&Member> {
        self.members.get(self.selected)
    }

    pub fn select(&mut self, delta: isize) {
        let len = self.members.len();
        self.selected = (self.selected as isize + delta).clamp(0, len.saturating_sub(1) as isize) as usize;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Claim the panel for `action`. `None` while another action is running.
    pub fn begin(&mut self, action: MemberAction) -> Option<MemberAction> {
        if self.loading {
            return None;
        }
        self.loading = true;
        self.error = None;
        self.last_action = Some(action.clone());
        Some(action)
    }

    pub fn search(&mut self, email: &str) -> Option<MemberAction> {
        if let Err(e) = validation::validate_email(email) {
            self.error = Some(e.to_string());
            return None;
        }
        self.begin(MemberAction::Search {
            email: email.trim().to_string(),
        })
    }

    pub fn add_found(&mut self) -> Option<MemberAction> {
        let user_id = self.found.as_ref()?.id.clone();
        self.begin(MemberAction::Add { user_id })
    }

    pub fn remove_selected(&mut self) -> Option<MemberAction> {
        let user_id = self.selected_member()?.id.clone();
        self.begin(MemberAction::Remove { user_id })
    }

    pub fn finish(&mut self, outcome: MemberOutcome) {
        self.loading = false;
        let action = self.last_action.take().unwrap_or(MemberAction::Load);
        match outcome {
            MemberOutcome::Members(Ok(members)) => {
                info!(project = %self.project_id, count = members.len(), "members loaded");
                if matches!(action, MemberAction::Add { .. }) {
                    self.found = None;
                }
                self.members = members;
                self.select(0);
            }
            MemberOutcome::Found(Ok(user)) => self.found = Some(user),
            MemberOutcome::Found(Err(err)) => {
                self.found = None;
                self.report(&action, err);
            }
            MemberOutcome::Members(Err(err)) => self.report(&action, err),
            MemberOutcome::Changed { action, error } => self.report(&action, error),
        }
    }

    fn report(&mut self, action: &MemberAction, err: ApiError) {
        if err.is_cancelled() {
            return;
        }
        warn!(project = %self.project_id, ?action, error = %err, "member action failed");
        self.error = Some(match err {
            ApiError::Transport(_) => err.user_message(),
            _ => action.failure_message().to_string(),
        });
    }
}
