//! Interactive application state. Requests run on the tokio runtime and
//! report back as [`Msg`] values, applied on the UI thread.

use crate::api::{ApiClient, AuthService, ProjectService, TaskService};
use crate::auth::{self, Next, PasswordResetFlow, RegistrationFlow};
use crate::errors::{ApiError, AuthError, BoardError};
use crate::form::{Field, Form};
use crate::kanban_board::{KanbanBoard, PendingDelete, PendingUpdate};
use crate::member::User;
use crate::members::{MemberAction, MemberOutcome, MembersPanel};
use crate::project::{NewProject, Project, ProjectUpdate};
use crate::project_list::{self, PendingProjectEdit, PendingToggle, ProjectList};
use crate::route::Route;
use crate::task::{Task, TaskPayload, TaskStatus};
use crate::token_flow::FlowState;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::future::Future;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum Msg {
    LoggedIn(Result<String, ApiError>),
    Profile(Result<User, ApiError>),
    ProfileUpdated(String, Result<(), ApiError>),
    Registered(Result<(), ApiError>),
    UserConfirmed(String, Result<(), ApiError>),
    AuthTokenResent(Result<(), ApiError>),
    ResetRequested(Result<(), AuthError>),
    ResetTokenChecked(String, Result<(), ApiError>),
    PasswordChanged(Result<(), ApiError>),
    Projects(u64, Result<Vec<Project>, ApiError>),
    ProjectCreated(Result<Project, ApiError>),
    ProjectEdited(PendingProjectEdit, Result<Project, ApiError>),
    ProjectToggled(PendingToggle, Result<(), ApiError>),
    Tasks {
        project_id: String,
        generation: u64,
        result: Result<Vec<Task>, ApiError>,
    },
    TaskCreated(Result<Task, ApiError>),
    TaskUpdated {
        pending: PendingUpdate,
        from_edit: bool,
        result: Result<Task, ApiError>,
    },
    TaskDeleted(PendingDelete, Result<(), ApiError>),
    Members(String, MemberOutcome),
}

#[derive(Debug)]
pub struct LoginView {
    pub form: Form,
    pub busy: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl Default for LoginView {
    fn default() -> Self {
        Self {
            form: Form::new("Login TaskMate", vec![Field::new("Email"), Field::secret("Password")]),
            busy: false,
            error: None,
            notice: None,
        }
    }
}

#[derive(Debug)]
pub struct RegisterView {
    pub flow: RegistrationFlow,
    pub form: Form,
    pub error: Option<String>,
}

impl Default for RegisterView {
    fn default() -> Self {
        Self {
            flow: RegistrationFlow::new(),
            form: Form::new(
                "Create account",
                vec![
                    Field::new("Name"),
                    Field::new("Email"),
                    Field::secret("Password"),
                    Field::secret("Confirm password"),
                ],
            ),
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct ResetView {
    pub flow: PasswordResetFlow,
    pub email: Form,
    pub passwords: Form,
    pub error: Option<String>,
}

impl Default for ResetView {
    fn default() -> Self {
        Self {
            flow: PasswordResetFlow::new(),
            email: Form::new("Change password", vec![Field::new("Email")]),
            passwords: Form::new(
                "Change password",
                vec![Field::secret("New password"), Field::secret("Confirm password")],
            ),
            error: None,
        }
    }
}

impl ResetView {
    fn for_account(email: String) -> Self {
        Self {
            flow: PasswordResetFlow::for_account(email),
            ..Self::default()
        }
    }

    fn focused_form(&mut self) -> Option<&mut Form> {
        match self.flow.state() {
            FlowState::CollectingCredentials if !self.flow.is_signed_in() => Some(&mut self.email),
            FlowState::Verified => Some(&mut self.passwords),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileView {
    pub form: Form,
    pub busy: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
    /// Open while the user changes their password.
    pub password: Option<ResetView>,
}

#[derive(Debug)]
pub enum ProjectModal {
    Create { form: Form, error: Option<String> },
    Edit { project_id: String, form: Form, error: Option<String> },
}

#[derive(Debug)]
pub enum BoardModal {
    AddTask { form: Form, error: Option<String> },
    EditTask {
        task_id: String,
        form: Form,
        status: TaskStatus,
        error: Option<String>,
    },
    ConfirmDelete,
    Members { panel: MembersPanel, email: String },
}

#[derive(Debug)]
pub struct BoardView {
    pub project: Project,
    pub board: KanbanBoard,
    pub modal: Option<BoardModal>,
}

pub struct App {
    api: ApiClient,
    scope: CancellationToken,
    scoped: ApiClient,
    runtime: Handle,
    tx: UnboundedSender<Msg>,
    rx: UnboundedReceiver<Msg>,
    pub route: Route,
    pub user: Option<User>,
    pub login: LoginView,
    pub register: RegisterView,
    pub reset: ResetView,
    pub projects: ProjectList,
    pub project_modal: Option<ProjectModal>,
    pub board: Option<BoardView>,
    pub profile: ProfileView,
    pub should_quit: bool,
}

fn task_form(title: &str, description: &str) -> Form {
    Form::new(
        "Task",
        vec![
            Field::new("Title").with_value(title),
            Field::new("Description").with_value(description),
        ],
    )
}

fn project_form(project: Option<&Project>) -> Form {
    let (title, client, description) = project
        .map(|p| (p.title.as_str(), p.client.as_str(), p.description.as_str()))
        .unwrap_or_default();
    Form::new(
        "Project",
        vec![
            Field::new("Title").with_value(title),
            Field::new("Client").with_value(client),
            Field::new("Description").with_value(description),
        ],
    )
}

fn ctrl(key: &KeyEvent, c: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(c)
}

impl App {
    pub fn new(api: ApiClient, runtime: Handle, start: Route) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scope = CancellationToken::new();
        let scoped = api.scoped(&scope);
        let mut app = Self {
            api,
            scope,
            scoped,
            runtime,
            tx,
            rx,
            route: Route::Login,
            user: None,
            login: LoginView::default(),
            register: RegisterView::default(),
            reset: ResetView::default(),
            projects: ProjectList::new(),
            project_modal: None,
            board: None,
            profile: ProfileView::default(),
            should_quit: false,
        };
        app.navigate(start);
        app
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = Msg> + Send + 'static,
    {
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            // receiver gone means the app is shutting down
            let _ = tx.send(fut.await);
        });
    }

    fn is_authenticated(&self) -> bool {
        self.api.session().is_authenticated()
    }

    /// Switch screens. Requests started by the previous screen are cancelled.
    pub fn navigate(&mut self, requested: Route) {
        let route = requested.resolve(self.is_authenticated());
        if route != requested {
            debug!(from = %requested, to = %route, "route redirected");
        }
        self.scope.cancel();
        self.scope = CancellationToken::new();
        self.scoped = self.api.scoped(&self.scope);
        self.route = route;
        self.board = None;
        self.project_modal = None;
        info!(route = %route, "navigate");

        match route {
            Route::Login => {
                let notice = self.login.notice.take();
                self.login = LoginView {
                    notice,
                    ..LoginView::default()
                };
            }
            Route::Create => self.register = RegisterView::default(),
            Route::Change => self.reset = ResetView::default(),
            Route::Workspace | Route::Dash => {
                self.load_profile();
                self.load_projects();
            }
            Route::Profile => {
                self.profile = ProfileView {
                    form: Form::new(
                        "Profile",
                        vec![Field::new("Name").with_value(
                            self.user.as_ref().map(|u| u.name.as_str()).unwrap_or(""),
                        )],
                    ),
                    ..ProfileView::default()
                };
                self.load_profile();
            }
        }
    }

    fn session_expired(&mut self) {
        warn!("session rejected by server, logging out");
        if let Err(e) = auth::logout(self.api.session()) {
            warn!(error = %e, "could not clear session");
        }
        self.user = None;
        self.login.notice = Some("Your session has expired. Please log in again.".into());
        self.navigate(Route::Login);
    }

    fn logout(&mut self) {
        if let Err(e) = auth::logout(self.api.session()) {
            warn!(error = %e, "could not clear session");
        }
        self.user = None;
        self.navigate(Route::Login);
    }

    // ── requests ─────────────────────────────────────────────────────

    fn load_profile(&self) {
        let api = self.scoped.clone();
        self.spawn(async move { Msg::Profile(api.get_profile().await) });
    }

    fn load_projects(&mut self) {
        let generation = self.projects.begin_load();
        let api = self.scoped.clone();
        self.spawn(async move { Msg::Projects(generation, api.get_projects().await) });
    }

    fn load_tasks(&mut self) {
        let Some(view) = self.board.as_mut() else {
            return;
        };
        let generation = view.board.begin_load();
        let project_id = view.project.id.clone();
        let api = self.scoped.clone();
        self.spawn(async move {
            let result = api.get_tasks(&project_id).await;
            Msg::Tasks {
                project_id,
                generation,
                result,
            }
        });
    }

    fn send_update(&self, project_id: String, pending: PendingUpdate, from_edit: bool) {
        let api = self.scoped.clone();
        self.spawn(async move {
            let result = api
                .update_task(&project_id, &pending.task_id, &pending.payload)
                .await;
            Msg::TaskUpdated {
                pending,
                from_edit,
                result,
            }
        });
    }

    fn send_members(&self, project_id: String, action: MemberAction) {
        let api = self.scoped.clone();
        self.spawn(async move {
            let outcome = action.run(&api, &project_id).await;
            Msg::Members(project_id, outcome)
        });
    }

    // ── results ──────────────────────────────────────────────────────

    pub fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            self.handle_msg(msg);
        }
    }

    /// `true` when the error ended the session and the screen changed.
    fn check_session(&mut self, err: Option<&ApiError>) -> bool {
        if err.is_some_and(ApiError::is_unauthorized) && self.route.requires_auth() {
            self.session_expired();
            return true;
        }
        false
    }

    fn check_board_error(&mut self, result: &Result<(), BoardError>) -> bool {
        match result {
            Err(BoardError::Api(err)) => self.check_session(Some(err)),
            _ => false,
        }
    }

    pub fn handle_msg(&mut self, msg: Msg) {
        match msg {
            Msg::LoggedIn(result) => {
                self.login.busy = false;
                match result.map_err(auth::login_error).and_then(|token| {
                    auth::complete_login(self.api.session(), &token)
                }) {
                    Ok(()) => self.navigate(Route::Dash),
                    Err(e) => self.login.error = Some(e.user_message()),
                }
            }
            Msg::Profile(result) => match result {
                Ok(user) => {
                    self.projects.set_user(Some(user.id.clone()));
                    if let Some(field) = self.profile.form.fields.first_mut() {
                        if field.value.is_empty() {
                            field.value = user.name.clone();
                        }
                    }
                    self.user = Some(user);
                }
                Err(err) => {
                    if !self.check_session(Some(&err)) && !err.is_cancelled() {
                        warn!(error = %err, "could not load profile");
                        self.profile.error = Some(err.user_message());
                    }
                }
            },
            Msg::ProfileUpdated(name, result) => {
                self.profile.busy = false;
                match result {
                    Ok(()) => {
                        if let Some(user) = self.user.as_mut() {
                            user.name = name;
                        }
                        self.profile.notice = Some("Name updated.".into());
                    }
                    Err(err) => {
                        if !self.check_session(Some(&err)) {
                            self.profile.error = Some(err.user_message());
                        }
                    }
                }
            }
            Msg::Registered(result) => match self.register.flow.finish_submit(result) {
                Ok(_) => self.register.error = None,
                Err(AuthError::Unconfirmed { message }) => {
                    self.login.notice = Some(message);
                    self.navigate(Route::Login);
                }
                Err(e) => self.register.error = Some(e.user_message()),
            },
            Msg::UserConfirmed(token, result) => {
                if self.register.flow.finish_verification(&token, result) == Next::Login {
                    self.login.notice = self.register.flow.notice().map(str::to_string);
                    self.navigate(Route::Login);
                }
            }
            Msg::AuthTokenResent(result) => self.register.flow.finish_resend(result),
            Msg::ResetRequested(result) => {
                if let Some(view) = self.reset_view() {
                    view.error = view.flow.finish_request(result).err().map(|e| e.user_message());
                }
            }
            Msg::ResetTokenChecked(token, result) => {
                if let Some(view) = self.reset_view() {
                    view.flow.finish_verification(&token, result);
                }
            }
            Msg::PasswordChanged(result) => {
                let Some(view) = self.reset_view() else {
                    return;
                };
                match view.flow.finish_change(result) {
                    Ok(next) => {
                        let notice = view.flow.notice().map(str::to_string);
                        if next == Next::Login {
                            self.login.notice = notice;
                            self.navigate(Route::Login);
                        } else {
                            self.profile.password = None;
                            self.profile.notice = notice;
                        }
                    }
                    Err(e) => view.error = Some(e.user_message()),
                }
            }
            Msg::Projects(generation, result) => {
                let outcome = self.projects.finish_load(generation, result);
                self.check_board_error(&outcome);
            }
            Msg::ProjectCreated(result) => {
                let outcome = self.projects.finish_create(result);
                if self.check_board_error(&outcome) {
                    return;
                }
                match outcome {
                    Ok(()) => {
                        self.project_modal = None;
                        self.load_projects();
                    }
                    Err(e) => {
                        if let Some(ProjectModal::Create { error, .. }) = self.project_modal.as_mut() {
                            *error = Some(e.user_message());
                        }
                    }
                }
            }
            Msg::ProjectEdited(pending, result) => {
                let outcome = self.projects.finish_edit(pending, result);
                if self.check_board_error(&outcome) {
                    return;
                }
                match outcome {
                    Ok(()) => self.project_modal = None,
                    Err(e) => {
                        if let Some(ProjectModal::Edit { error, .. }) = self.project_modal.as_mut() {
                            *error = Some(e.user_message());
                        }
                    }
                }
            }
            Msg::ProjectToggled(pending, result) => {
                let outcome = self.projects.finish_toggle(pending, result);
                self.check_board_error(&outcome);
            }
            Msg::Tasks {
                project_id,
                generation,
                result,
            } => {
                let Some(view) = self.board.as_mut().filter(|v| v.project.id == project_id) else {
                    debug!(project = %project_id, "dropping tasks for a board that is not open");
                    return;
                };
                let outcome = view.board.finish_load(generation, result);
                self.check_board_error(&outcome);
            }
            Msg::TaskCreated(result) => {
                let Some(view) = self.board.as_mut() else {
                    return;
                };
                let outcome = view.board.finish_create(result);
                match &outcome {
                    Ok(()) => view.modal = None,
                    Err(e) => {
                        if let Some(BoardModal::AddTask { error, .. }) = view.modal.as_mut() {
                            *error = Some(e.user_message());
                        }
                    }
                }
                if self.check_board_error(&outcome) {
                    return;
                }
                if outcome.is_ok() {
                    self.load_tasks();
                }
            }
            Msg::TaskUpdated {
                pending,
                from_edit,
                result,
            } => {
                let Some(view) = self.board.as_mut() else {
                    return;
                };
                let outcome = view.board.finish_update(pending, result);
                if from_edit {
                    match &outcome {
                        Ok(()) => view.modal = None,
                        Err(e) => {
                            if let Some(BoardModal::EditTask { error, .. }) = view.modal.as_mut() {
                                *error = Some(e.user_message());
                            }
                        }
                    }
                }
                self.check_board_error(&outcome);
            }
            Msg::TaskDeleted(pending, result) => {
                if let Some(view) = self.board.as_mut() {
                    let outcome = view.board.finish_delete(pending, result);
                    self.check_board_error(&outcome);
                }
            }
            Msg::Members(project_id, outcome) => {
                let unauthorized = match &outcome {
                    MemberOutcome::Members(Err(e)) | MemberOutcome::Found(Err(e)) => e.is_unauthorized(),
                    MemberOutcome::Changed { error, .. } => error.is_unauthorized(),
                    _ => false,
                };
                if unauthorized {
                    self.session_expired();
                    return;
                }
                if let Some(BoardView {
                    modal: Some(BoardModal::Members { panel, .. }),
                    ..
                }) = self.board.as_mut()
                {
                    if panel.project_id() == project_id {
                        panel.finish(outcome);
                    }
                }
            }
        }
    }

    // ── input ────────────────────────────────────────────────────────

    pub fn handle_paste(&mut self, text: &str) {
        if self.route == Route::Create && self.register.flow.state() == FlowState::AwaitingToken {
            if let Some(token) = self.register.flow.token.paste(text) {
                self.verify_registration(token);
            }
            return;
        }
        if let Some(view) = self.reset_view() {
            if view.flow.state() == FlowState::AwaitingToken {
                if let Some(token) = view.flow.token.paste(text) {
                    self.verify_reset(token);
                }
                return;
            }
        }
        for c in text.chars().filter(|c| !c.is_control()) {
            if let Some(form) = self.focused_form() {
                form.push(c);
            }
        }
    }

    fn reset_view(&mut self) -> Option<&mut ResetView> {
        match self.route {
            Route::Change => Some(&mut self.reset),
            Route::Profile => self.profile.password.as_mut(),
            _ => None,
        }
    }

    fn focused_form(&mut self) -> Option<&mut Form> {
        if self.board.is_some() {
            return match self.board.as_mut().and_then(|view| view.modal.as_mut()) {
                Some(BoardModal::AddTask { form, .. }) | Some(BoardModal::EditTask { form, .. }) => Some(form),
                _ => None,
            };
        }
        match self.route {
            Route::Login => Some(&mut self.login.form),
            Route::Create => Some(&mut self.register.form),
            Route::Change => self.reset.focused_form(),
            Route::Profile => match self.profile.password.as_mut() {
                Some(view) => view.focused_form(),
                None => Some(&mut self.profile.form),
            },
            Route::Workspace | Route::Dash => match self.project_modal.as_mut() {
                Some(ProjectModal::Create { form, .. }) | Some(ProjectModal::Edit { form, .. }) => Some(form),
                None => None,
            },
        }
    }

    // true when the key was consumed
    fn edit_form(form: &mut Form, key: &KeyEvent) -> bool {
        match key.code {
            KeyCode::Tab | KeyCode::Down => form.next(),
            KeyCode::BackTab | KeyCode::Up => form.prev(),
            KeyCode::Backspace => form.pop(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => form.push(c),
            _ => return false,
        }
        true
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if ctrl(&key, 'c') {
            self.should_quit = true;
            return;
        }
        match self.route {
            Route::Login => self.login_key(key),
            Route::Create => self.register_key(key),
            Route::Change => self.reset_key(key),
            Route::Workspace | Route::Dash => {
                if self.board.is_some() {
                    self.board_key(key);
                } else {
                    self.projects_key(key);
                }
            }
            Route::Profile => self.profile_key(key),
        }
    }

    fn login_key(&mut self, key: KeyEvent) {
        if ctrl(&key, 'r') {
            return self.navigate(Route::Create);
        }
        if ctrl(&key, 'p') {
            return self.navigate(Route::Change);
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => {
                if self.login.busy {
                    return;
                }
                let email = self.login.form.value(0).trim().to_string();
                let password = self.login.form.value(1).to_string();
                if let Err(e) = auth::validate_login(&email, &password) {
                    self.login.error = Some(e.to_string());
                    return;
                }
                self.login.busy = true;
                self.login.error = None;
                let api = self.scoped.clone();
                self.spawn(async move { Msg::LoggedIn(api.login(&email, &password).await) });
            }
            _ => {
                Self::edit_form(&mut self.login.form, &key);
            }
        }
    }

    fn verify_registration(&self, token: String) {
        let api = self.scoped.clone();
        self.spawn(async move {
            let result = api.confirm_user(&token).await;
            Msg::UserConfirmed(token, result)
        });
    }

    fn register_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            return self.navigate(Route::Login);
        }
        match self.register.flow.state() {
            FlowState::CollectingCredentials => {
                if key.code != KeyCode::Enter {
                    Self::edit_form(&mut self.register.form, &key);
                    return;
                }
                let view = &mut self.register;
                view.flow.form = crate::api::Registration {
                    name: view.form.value(0).to_string(),
                    email: view.form.value(1).to_string(),
                    password: view.form.value(2).to_string(),
                    confirm_password: view.form.value(3).to_string(),
                };
                match view.flow.begin_submit() {
                    Ok(registration) => {
                        view.error = None;
                        let api = self.scoped.clone();
                        self.spawn(async move { Msg::Registered(api.create_user(&registration).await) });
                    }
                    Err(e) => view.error = Some(e.user_message()),
                }
            }
            FlowState::AwaitingToken => {
                if ctrl(&key, 'r') {
                    if let Some(email) = self.register.flow.begin_resend() {
                        let api = self.scoped.clone();
                        self.spawn(async move {
                            Msg::AuthTokenResent(api.request_auth_token(&email).await)
                        });
                    }
                    return;
                }
                match key.code {
                    KeyCode::Backspace => self.register.flow.token.backspace(),
                    KeyCode::Char(c) => {
                        if let Some(token) = self.register.flow.token.type_char(c) {
                            self.verify_registration(token);
                        }
                    }
                    _ => {}
                }
            }
            FlowState::Verified | FlowState::Done => {
                if key.code == KeyCode::Enter {
                    self.navigate(Route::Login);
                }
            }
        }
    }

    fn verify_reset(&self, token: String) {
        let api = self.scoped.clone();
        self.spawn(async move {
            let result = api.confirm_password_token(&token).await;
            Msg::ResetTokenChecked(token, result)
        });
    }

    fn request_reset(&mut self, resend: bool) {
        let Some(view) = self.reset_view() else {
            return;
        };
        let signed_in = view.flow.is_signed_in();
        let email = if resend {
            view.flow.begin_resend().ok_or(AuthError::Busy)
        } else {
            if !signed_in {
                view.flow.email = view.email.value(0).to_string();
            }
            view.flow.begin_request()
        };
        match email {
            Ok(email) => {
                view.error = None;
                let api = self.scoped.clone();
                self.spawn(async move {
                    let result = if signed_in {
                        auth::request_account_token(&api, &email).await
                    } else {
                        auth::request_reset_token(&api, &email).await
                    };
                    Msg::ResetRequested(result)
                });
            }
            Err(e) => view.error = Some(e.user_message()),
        }
    }

    fn leave_reset(&mut self) {
        if self.route == Route::Profile {
            self.profile.password = None;
        } else {
            self.navigate(Route::Login);
        }
    }

    fn reset_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc {
            return self.leave_reset();
        }
        let Some(view) = self.reset_view() else {
            return;
        };
        match view.flow.state() {
            FlowState::CollectingCredentials => {
                if key.code == KeyCode::Enter {
                    self.request_reset(false);
                } else {
                    Self::edit_form(&mut view.email, &key);
                }
            }
            FlowState::AwaitingToken => {
                if ctrl(&key, 'r') {
                    return self.request_reset(true);
                }
                match key.code {
                    KeyCode::Backspace => view.flow.token.backspace(),
                    KeyCode::Char(c) => {
                        if let Some(token) = view.flow.token.type_char(c) {
                            self.verify_reset(token);
                        }
                    }
                    _ => {}
                }
            }
            FlowState::Verified => {
                if key.code != KeyCode::Enter {
                    Self::edit_form(&mut view.passwords, &key);
                    return;
                }
                view.flow.password = view.passwords.value(0).to_string();
                view.flow.confirm_password = view.passwords.value(1).to_string();
                match view.flow.begin_change() {
                    Ok((token, password, confirm)) => {
                        view.error = None;
                        let api = self.scoped.clone();
                        self.spawn(async move {
                            Msg::PasswordChanged(api.change_password(&token, &password, &confirm).await)
                        });
                    }
                    Err(e) => view.error = Some(e.user_message()),
                }
            }
            FlowState::Done => self.leave_reset(),
        }
    }

    fn open_password_change(&mut self) {
        let Some(email) = self.user.as_ref().map(|u| u.email.clone()) else {
            self.profile.error = Some("Your profile is still loading.".into());
            return;
        };
        self.profile.error = None;
        self.profile.notice = None;
        self.profile.password = Some(ResetView::for_account(email));
        self.request_reset(false);
    }

    fn profile_key(&mut self, key: KeyEvent) {
        if self.profile.password.is_some() {
            return self.reset_key(key);
        }
        if ctrl(&key, 'p') {
            return self.open_password_change();
        }
        match key.code {
            KeyCode::Esc => self.navigate(Route::Dash),
            KeyCode::Enter => {
                if self.profile.busy {
                    return;
                }
                let name = self.profile.form.value(0).trim().to_string();
                if let Err(e) = auth::validate_profile_name(&name) {
                    self.profile.error = Some(e.to_string());
                    return;
                }
                self.profile.busy = true;
                self.profile.error = None;
                self.profile.notice = None;
                let api = self.scoped.clone();
                self.spawn(async move {
                    let result = api.update_profile(&name).await;
                    Msg::ProfileUpdated(name, result)
                });
            }
            _ => {
                Self::edit_form(&mut self.profile.form, &key);
            }
        }
    }

    fn projects_key(&mut self, key: KeyEvent) {
        if self.project_modal.is_some() {
            return self.project_modal_key(key);
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => self.projects.select(-1),
            KeyCode::Down | KeyCode::Char('j') => self.projects.select(1),
            KeyCode::Tab => self.projects.switch_tab(),
            KeyCode::Char('r') => self.load_projects(),
            KeyCode::Char('p') => self.navigate(Route::Profile),
            KeyCode::Char('L') => self.logout(),
            KeyCode::Char('n') => {
                self.projects.clear_error();
                self.project_modal = Some(ProjectModal::Create {
                    form: project_form(None),
                    error: None,
                });
            }
            KeyCode::Char('e') => {
                let Some(project) = self.projects.selected_project() else {
                    return;
                };
                if !self.projects.can_manage(project) {
                    return;
                }
                self.project_modal = Some(ProjectModal::Edit {
                    project_id: project.id.clone(),
                    form: project_form(Some(project)),
                    error: None,
                });
            }
            KeyCode::Char('t') => {
                let Some(id) = self.projects.selected_project().map(|p| p.id.clone()) else {
                    return;
                };
                match self.projects.begin_toggle(&id) {
                    Ok(pending) => {
                        let api = self.scoped.clone();
                        self.spawn(async move {
                            let result = project_list::toggle_request(&api, &pending).await;
                            Msg::ProjectToggled(pending, result)
                        });
                    }
                    Err(e) => debug!(error = %e, "toggle refused"),
                }
            }
            KeyCode::Enter => {
                let Some(project) = self.projects.selected_project().cloned() else {
                    return;
                };
                self.open_board(project);
            }
            _ => {}
        }
    }

    fn project_modal_key(&mut self, key: KeyEvent) {
        let Some(modal) = self.project_modal.as_mut() else {
            return;
        };
        let form = match modal {
            ProjectModal::Create { form, .. } | ProjectModal::Edit { form, .. } => form,
        };
        match key.code {
            KeyCode::Esc => self.project_modal = None,
            KeyCode::Enter => {
                let values = NewProject {
                    title: form.value(0).trim().to_string(),
                    client: form.value(1).trim().to_string(),
                    description: form.value(2).trim().to_string(),
                };
                match modal {
                    ProjectModal::Create { error, .. } => match self.projects.begin_create(values) {
                        Ok(project) => {
                            *error = None;
                            let api = self.scoped.clone();
                            self.spawn(async move {
                                Msg::ProjectCreated(api.create_project(&project).await)
                            });
                        }
                        Err(e) => *error = Some(e.user_message()),
                    },
                    ProjectModal::Edit {
                        project_id, error, ..
                    } => {
                        let update = ProjectUpdate {
                            title: Some(values.title),
                            client: Some(values.client),
                            description: Some(values.description),
                        };
                        match self.projects.begin_edit(project_id, update) {
                            Ok(pending) => {
                                *error = None;
                                let api = self.scoped.clone();
                                self.spawn(async move {
                                    let result =
                                        api.update_project(&pending.project_id, &pending.update).await;
                                    Msg::ProjectEdited(pending, result)
                                });
                            }
                            Err(e) => *error = Some(e.user_message()),
                        }
                    }
                }
            }
            _ => {
                Self::edit_form(form, &key);
            }
        }
    }

    fn open_board(&mut self, project: Project) {
        info!(project = %project.id, "opening board");
        self.scope.cancel();
        self.scope = CancellationToken::new();
        self.scoped = self.api.scoped(&self.scope);
        self.board = Some(BoardView {
            board: KanbanBoard::new(project.id.clone()),
            project,
            modal: None,
        });
        self.load_tasks();
    }

    fn close_board(&mut self) {
        self.navigate(Route::Dash);
    }

    fn board_key(&mut self, key: KeyEvent) {
        let Some(view) = self.board.as_mut() else {
            return;
        };
        if view.modal.is_some() {
            return self.board_modal_key(key);
        }
        let project_id = view.project.id.clone();
        let board = &mut view.board;

        if board.carrying().is_some() {
            match key.code {
                KeyCode::Left | KeyCode::Char('h') => board.move_selection(-1, 0),
                KeyCode::Right | KeyCode::Char('l') => board.move_selection(1, 0),
                KeyCode::Esc => board.cancel_carry(),
                KeyCode::Char(' ') | KeyCode::Enter => match board.drop_carried() {
                    Ok(Some(pending)) => self.send_update(project_id, pending, false),
                    Ok(None) => {}
                    Err(e) => {
                        debug!(error = %e, "drop refused");
                        board.set_error(e.user_message());
                    }
                },
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc | KeyCode::Char('b') => self.close_board(),
            KeyCode::Left | KeyCode::Char('h') => board.move_selection(-1, 0),
            KeyCode::Right | KeyCode::Char('l') => board.move_selection(1, 0),
            KeyCode::Up | KeyCode::Char('k') => board.move_selection(0, -1),
            KeyCode::Down | KeyCode::Char('j') => board.move_selection(0, 1),
            KeyCode::Char(' ') => {
                board.clear_error();
                board.pick_up();
            }
            KeyCode::Char('r') => self.load_tasks(),
            KeyCode::Char('a') => {
                view.modal = Some(BoardModal::AddTask {
                    form: task_form("", ""),
                    error: None,
                });
            }
            KeyCode::Char('e') | KeyCode::Enter => {
                if let Some(task) = board.selected() {
                    let modal = BoardModal::EditTask {
                        task_id: task.id.clone(),
                        form: task_form(&task.title, &task.description),
                        status: task.status,
                        error: None,
                    };
                    view.modal = Some(modal);
                }
            }
            KeyCode::Char('d') => {
                if let Some(id) = board.selected().map(|t| t.id.clone()) {
                    if board.request_delete(&id).is_ok() {
                        view.modal = Some(BoardModal::ConfirmDelete);
                    }
                }
            }
            KeyCode::Char('m') => {
                let mut panel = MembersPanel::new(project_id.clone());
                let action = panel.begin(MemberAction::Load);
                view.modal = Some(BoardModal::Members {
                    panel,
                    email: String::new(),
                });
                if let Some(action) = action {
                    self.send_members(project_id, action);
                }
            }
            _ => {}
        }
    }

    fn board_modal_key(&mut self, key: KeyEvent) {
        let Some(view) = self.board.as_mut() else {
            return;
        };
        let project_id = view.project.id.clone();
        let Some(modal) = view.modal.as_mut() else {
            return;
        };
        match modal {
            BoardModal::ConfirmDelete => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    view.modal = None;
                    match view.board.confirm_delete() {
                        Ok(pending) => {
                            let api = self.scoped.clone();
                            self.spawn(async move {
                                let result = api.delete_task(&project_id, &pending.task_id).await;
                                Msg::TaskDeleted(pending, result)
                            });
                        }
                        Err(e) => {
                            debug!(error = %e, "delete refused");
                            view.board.set_error(e.user_message());
                        }
                    }
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    view.board.cancel_delete();
                    view.modal = None;
                }
                _ => {}
            },
            BoardModal::AddTask { form, error } => match key.code {
                KeyCode::Esc => view.modal = None,
                KeyCode::Enter => {
                    let payload = TaskPayload::new(form.value(0).trim(), form.value(1).trim());
                    match view.board.begin_create(payload) {
                        Ok(payload) => {
                            *error = None;
                            let api = self.scoped.clone();
                            self.spawn(async move {
                                Msg::TaskCreated(api.create_task(&project_id, &payload).await)
                            });
                        }
                        Err(e) => *error = Some(e.user_message()),
                    }
                }
                _ => {
                    Self::edit_form(form, &key);
                }
            },
            BoardModal::EditTask {
                task_id,
                form,
                status,
                error,
            } => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    match key.code {
                        KeyCode::Left => *status = status.shifted(-1),
                        KeyCode::Right => *status = status.shifted(1),
                        _ => {}
                    }
                    return;
                }
                match key.code {
                    KeyCode::Esc => view.modal = None,
                    KeyCode::Enter => {
                        let payload = TaskPayload {
                            title: form.value(0).trim().to_string(),
                            description: form.value(1).trim().to_string(),
                            status: *status,
                        };
                        let task_id = task_id.clone();
                        match view.board.begin_edit(&task_id, payload) {
                            Ok(pending) => {
                                *error = None;
                                self.send_update(project_id, pending, true);
                            }
                            Err(e) => *error = Some(e.user_message()),
                        }
                    }
                    _ => {
                        Self::edit_form(form, &key);
                    }
                }
            }
            BoardModal::Members { panel, email } => {
                let action = match key.code {
                    KeyCode::Esc => {
                        view.modal = None;
                        return;
                    }
                    KeyCode::Enter => panel.search(email),
                    KeyCode::Up => {
                        panel.select(-1);
                        None
                    }
                    KeyCode::Down => {
                        panel.select(1);
                        None
                    }
                    KeyCode::Delete => panel.remove_selected(),
                    KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        panel.add_found()
                    }
                    KeyCode::Backspace => {
                        email.pop();
                        None
                    }
                    KeyCode::Char(c) => {
                        email.push(c);
                        None
                    }
                    _ => None,
                };
                if let Some(action) = action {
                    self.send_members(project_id, action);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use std::sync::Arc;

    fn app(session: Session, start: Route) -> (tokio::runtime::Runtime, App) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let api = ApiClient::with_http(
            reqwest::Client::new(),
            "http://127.0.0.1:9/api",
            Arc::new(session),
        );
        let app = App::new(api, runtime.handle().clone(), start);
        (runtime, app)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.into(),
            title: format!("task {id}"),
            description: String::new(),
            status,
            project: "p1".into(),
            created_at: None,
            updated_at: None,
        }
    }

    fn ctrl_press(app: &mut App, c: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn server_error() -> ApiError {
        ApiError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, Some("boom".into()), None)
    }

    fn project() -> Project {
        project_with_id("p1")
    }

    fn project_with_id(id: &str) -> Project {
        Project {
            id: id.into(),
            title: "Site".into(),
            client: "ACME".into(),
            description: "d".into(),
            active: true,
            manager: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn gated_start_without_session_lands_on_login() {
        let (_rt, app) = app(Session::in_memory(), Route::Dash);
        assert_eq!(app.route, Route::Login);
    }

    #[test]
    fn auth_screens_skip_ahead_with_session() {
        let (_rt, app) = app(Session::with_token("t"), Route::Create);
        assert_eq!(app.route, Route::Dash);
    }

    #[test]
    fn invalid_login_is_reported_without_sending() {
        let (_rt, mut app) = app(Session::in_memory(), Route::Login);
        for c in "nope".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Tab);
        for c in "password1".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.login.form.value(0), "nope");
        assert!(!app.login.busy);
        assert_eq!(
            app.login.error.as_deref(),
            Some("Please enter a valid email address.")
        );
    }

    #[test]
    fn unauthorized_on_gated_screen_logs_out() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        app.handle_msg(Msg::Profile(Err(ApiError::Unauthorized {
            message: "jwt expired".into(),
        })));
        assert_eq!(app.route, Route::Login);
        assert!(!app.api.session().is_authenticated());
        assert!(app.login.notice.is_some());
    }

    fn open_loaded_board(app: &mut App, tasks: Vec<Task>) {
        app.open_board(project());
        let generation = app.board.as_mut().unwrap().board.begin_load();
        app.handle_msg(Msg::Tasks {
            project_id: "p1".into(),
            generation,
            result: Ok(tasks),
        });
    }

    fn board(app: &App) -> &KanbanBoard {
        &app.board.as_ref().unwrap().board
    }

    #[test]
    fn carrying_a_card_moves_it_before_the_server_answers() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        open_loaded_board(
            &mut app,
            vec![
                task("t1", TaskStatus::Pending),
                task("t2", TaskStatus::InProgress),
                task("t3", TaskStatus::Completed),
            ],
        );

        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Char(' '));

        let board = &app.board.as_ref().unwrap().board;
        assert!(board.carrying().is_none());
        assert_eq!(board.task("t1").unwrap().status, TaskStatus::UnderReview);
        assert!(board.is_busy("t1"));
        assert!(board.get_tasks_by_status(TaskStatus::Pending).is_empty());
    }

    #[test]
    fn escape_cancels_a_carry() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        open_loaded_board(&mut app, vec![task("t1", TaskStatus::Pending)]);

        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Esc);

        let view = app.board.as_ref().unwrap();
        assert!(view.board.carrying().is_none());
        assert_eq!(view.board.task("t1").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn add_task_without_title_stays_open_with_error() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        app.open_board(project());
        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Enter);
        match &app.board.as_ref().unwrap().modal {
            Some(BoardModal::AddTask { error, .. }) => {
                assert_eq!(error.as_deref(), Some("Title is required."))
            }
            other => panic!("unexpected modal {other:?}"),
        }
    }

    #[test]
    fn tasks_for_a_board_that_was_closed_are_dropped() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        app.open_board(project());
        app.open_board(project_with_id("p2"));

        // both boards issued generation 1
        app.handle_msg(Msg::Tasks {
            project_id: "p1".into(),
            generation: 1,
            result: Ok(vec![task("t1", TaskStatus::Pending)]),
        });
        assert!(board(&app).tasks().is_empty());
        assert!(board(&app).is_loading());

        app.handle_msg(Msg::Tasks {
            project_id: "p2".into(),
            generation: 1,
            result: Ok(vec![task("t9", TaskStatus::Pending)]),
        });
        assert!(board(&app).task("t9").is_some());
    }

    #[test]
    fn members_for_another_project_are_dropped() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        app.open_board(project_with_id("p2"));
        press(&mut app, KeyCode::Char('m'));

        let member = crate::member::Member {
            id: "u2".into(),
            name: "Bo".into(),
            email: "bo@example.com".into(),
            role: Default::default(),
            avatar: None,
            joined_at: None,
        };
        app.handle_msg(Msg::Members("p1".into(), MemberOutcome::Members(Ok(vec![member.clone()]))));
        let panel = match &app.board.as_ref().unwrap().modal {
            Some(BoardModal::Members { panel, .. }) => panel,
            other => panic!("unexpected modal {other:?}"),
        };
        assert!(panel.members().is_empty());
        assert!(panel.is_loading());

        app.handle_msg(Msg::Members("p2".into(), MemberOutcome::Members(Ok(vec![member]))));
        match &app.board.as_ref().unwrap().modal {
            Some(BoardModal::Members { panel, .. }) => assert_eq!(panel.members().len(), 1),
            other => panic!("unexpected modal {other:?}"),
        }
    }

    #[test]
    fn deleting_a_card_with_a_change_in_flight_explains_why() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        open_loaded_board(&mut app, vec![task("t1", TaskStatus::Pending)]);

        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Char(' '));
        assert!(board(&app).is_busy("t1"));

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.board.as_ref().unwrap().modal.is_none());
        assert_eq!(
            board(&app).error(),
            Some("Please wait for the previous change to finish.")
        );
        assert!(board(&app).task("t1").is_some());
    }

    #[test]
    fn failed_edit_rolls_back_and_reports_in_the_modal() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        open_loaded_board(&mut app, vec![task("t1", TaskStatus::Pending)]);
        press(&mut app, KeyCode::Char('e'));

        let view = app.board.as_mut().unwrap();
        let payload = TaskPayload {
            title: "renamed".into(),
            description: String::new(),
            status: TaskStatus::Completed,
        };
        let pending = view.board.begin_edit("t1", payload).unwrap();
        assert_eq!(view.board.task("t1").unwrap().title, "renamed");

        app.handle_msg(Msg::TaskUpdated {
            pending,
            from_edit: true,
            result: Err(server_error()),
        });
        let view = app.board.as_ref().unwrap();
        let restored = view.board.task("t1").unwrap();
        assert_eq!(restored.title, "task t1");
        assert_eq!(restored.status, TaskStatus::Pending);
        assert!(!view.board.is_busy("t1"));
        match &view.modal {
            Some(BoardModal::EditTask { error, .. }) => assert_eq!(error.as_deref(), Some("boom")),
            other => panic!("unexpected modal {other:?}"),
        }
    }

    #[test]
    fn created_task_closes_the_modal_and_reloads() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        open_loaded_board(&mut app, Vec::new());
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "Write docs");
        press(&mut app, KeyCode::Enter);
        assert!(board(&app).is_creating());
        assert!(!board(&app).is_loading());

        app.handle_msg(Msg::TaskCreated(Ok(task("t9", TaskStatus::Pending))));
        let view = app.board.as_ref().unwrap();
        assert!(view.modal.is_none());
        assert!(!view.board.is_creating());
        assert!(view.board.is_loading());
    }

    #[test]
    fn deleted_card_disappears_only_when_the_server_agrees() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Dash);
        open_loaded_board(&mut app, vec![task("t1", TaskStatus::Pending)]);

        let view = app.board.as_mut().unwrap();
        view.board.request_delete("t1").unwrap();
        let pending = view.board.confirm_delete().unwrap();
        app.handle_msg(Msg::TaskDeleted(pending, Err(server_error())));
        assert!(board(&app).task("t1").is_some());
        assert_eq!(board(&app).error(), Some("boom"));

        let view = app.board.as_mut().unwrap();
        view.board.request_delete("t1").unwrap();
        let pending = view.board.confirm_delete().unwrap();
        app.handle_msg(Msg::TaskDeleted(pending, Ok(())));
        assert!(board(&app).task("t1").is_none());
    }

    fn reset_state(app: &App) -> FlowState {
        app.profile.password.as_ref().unwrap().flow.state()
    }

    #[test]
    fn password_change_from_the_profile() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Profile);
        app.handle_msg(Msg::Profile(Ok(User {
            id: "u1".into(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            confirmed: true,
        })));

        ctrl_press(&mut app, 'p');
        let section = app.profile.password.as_ref().unwrap();
        assert!(section.flow.is_busy());
        assert_eq!(section.flow.email, "ana@example.com");

        app.handle_msg(Msg::ResetRequested(Ok(())));
        assert_eq!(reset_state(&app), FlowState::AwaitingToken);

        app.handle_paste("123456");
        app.handle_msg(Msg::ResetTokenChecked("123456".into(), Ok(())));
        assert_eq!(reset_state(&app), FlowState::Verified);

        type_text(&mut app, "newpassword");
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "newpassword");
        press(&mut app, KeyCode::Enter);
        assert!(app.profile.password.as_ref().unwrap().flow.is_busy());

        app.handle_msg(Msg::PasswordChanged(Ok(())));
        assert_eq!(app.route, Route::Profile);
        assert!(app.profile.password.is_none());
        assert_eq!(app.profile.notice.as_deref(), Some("Password changed."));
        assert!(app.api.session().is_authenticated());
    }

    #[test]
    fn profile_password_section_closes_on_escape() {
        let (_rt, mut app) = app(Session::with_token("t"), Route::Profile);
        ctrl_press(&mut app, 'p');
        assert!(app.profile.password.is_none());
        assert!(app.profile.error.is_some());

        app.handle_msg(Msg::Profile(Ok(User {
            id: "u1".into(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            confirmed: true,
        })));
        ctrl_press(&mut app, 'p');
        app.handle_msg(Msg::ResetRequested(Ok(())));
        press(&mut app, KeyCode::Esc);
        assert!(app.profile.password.is_none());
        assert_eq!(app.route, Route::Profile);
    }
}
