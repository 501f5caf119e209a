use crate::api::TaskService;
use crate::errors::{ApiError, BoardError};
use crate::task::{Task, TaskPayload, TaskStatus};
use crate::validation;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carry {
    pub task_id: String,
    pub from: TaskStatus,
    pub target: TaskStatus,
}

/// An optimistic update waiting for the server.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub task_id: String,
    pub payload: TaskPayload,
    previous: Task,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub task_id: String,
}

#[derive(Debug, Default)]
pub struct KanbanBoard {
    project_id: String,
    tasks: Vec<Task>,
    pub selected_status: usize,
    pub selected_task: usize,
    carrying: Option<Carry>,
    confirm_delete: Option<String>,
    loading: bool,
    creating: bool,
    error: Option<String>,
    generation: u64,
    in_flight: HashSet<String>,
}

impl KanbanBoard {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_tasks_by_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    pub fn column_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for task in &self.tasks {
            counts[task.status.column()] += 1;
        }
        counts
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    pub fn is_busy(&self, task_id: &str) -> bool {
        self.in_flight.contains(task_id)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    fn fail(&mut self, err: ApiError) -> BoardError {
        if !err.is_cancelled() {
            self.error = Some(err.user_message());
        }
        BoardError::Api(err)
    }

    fn index_of(&self, task_id: &str) -> Result<usize, BoardError> {
        self.tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| BoardError::UnknownTask {
                id: task_id.to_string(),
            })
    }

    fn claim(&mut self, task_id: &str) -> Result<(), BoardError> {
        if !self.in_flight.insert(task_id.to_string()) {
            return Err(BoardError::Busy {
                id: task_id.to_string(),
            });
        }
        Ok(())
    }

    // ── load ──────────────────────────────────────────────────────────

    // answers carrying an older generation are dropped
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        self.generation
    }

    pub fn finish_load(
        &mut self,
        generation: u64,
        result: Result<Vec<Task>, ApiError>,
    ) -> Result<(), BoardError> {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale task list");
            return Ok(());
        }
        self.loading = false;
        match result {
            Ok(tasks) => {
                info!(project = %self.project_id, count = tasks.len(), "tasks loaded");
                self.tasks = tasks;
                self.clamp_selection();
                Ok(())
            }
            Err(err) => {
                warn!(project = %self.project_id, error = %err, "failed to load tasks");
                Err(self.fail(err))
            }
        }
    }

    // ── status change and edit ───────────────────────────────────────

    /// Move a task to `status` right away. Returns `None` when the task is
    /// already in that column and nothing needs sending.
    pub fn begin_move(
        &mut self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<Option<PendingUpdate>, BoardError> {
        let idx = self.index_of(task_id)?;
        if self.tasks[idx].status == status {
            return Ok(None);
        }
        let mut payload = self.tasks[idx].payload();
        payload.status = status;
        self.begin_update(idx, payload).map(Some)
    }

    pub fn begin_edit(
        &mut self,
        task_id: &str,
        payload: TaskPayload,
    ) -> Result<PendingUpdate, BoardError> {
        validation::require("Title", &payload.title)?;
        let idx = self.index_of(task_id)?;
        self.begin_update(idx, payload)
    }

    fn begin_update(
        &mut self,
        idx: usize,
        payload: TaskPayload,
    ) -> Result<PendingUpdate, BoardError> {
        let task_id = self.tasks[idx].id.clone();
        self.claim(&task_id)?;
        let previous = self.tasks[idx].clone();
        self.tasks[idx].apply(&payload);
        self.error = None;
        debug!(task = %task_id, status = %payload.status, "optimistic update applied");
        Ok(PendingUpdate {
            task_id,
            payload,
            previous,
        })
    }

    /// Confirm with the server's copy, or restore the snapshot.
    pub fn finish_update(
        &mut self,
        pending: PendingUpdate,
        result: Result<Task, ApiError>,
    ) -> Result<(), BoardError> {
        self.in_flight.remove(&pending.task_id);
        let slot = self.tasks.iter_mut().find(|t| t.id == pending.task_id);
        match result {
            Ok(server) => {
                if let Some(slot) = slot {
                    *slot = server;
                }
                Ok(())
            }
            Err(err) => {
                warn!(task = %pending.task_id, error = %err, "update rejected, rolling back");
                if let Some(slot) = slot {
                    *slot = pending.previous;
                }
                self.clamp_selection();
                Err(self.fail(err))
            }
        }
    }

    // ── create ───────────────────────────────────────────────────────

    pub fn begin_create(&mut self, payload: TaskPayload) -> Result<TaskPayload, BoardError> {
        validation::require("Title", &payload.title)?;
        if self.creating {
            return Err(BoardError::Busy {
                id: "new task".into(),
            });
        }
        self.creating = true;
        self.error = None;
        Ok(payload)
    }

    /// On success the caller reloads the list; nothing is spliced in locally.
    pub fn finish_create(&mut self, result: Result<Task, ApiError>) -> Result<(), BoardError> {
        self.creating = false;
        match result {
            Ok(task) => {
                info!(task = %task.id, "task created");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    // ── delete ───────────────────────────────────────────────────────

    pub fn request_delete(&mut self, task_id: &str) -> Result<(), BoardError> {
        self.index_of(task_id)?;
        self.confirm_delete = Some(task_id.to_string());
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.confirm_delete = None;
    }

    pub fn delete_prompt(&self) -> Option<&Task> {
        self.confirm_delete.as_deref().and_then(|id| self.task(id))
    }

    /// The user confirmed. The task stays visible until the server agrees.
    pub fn confirm_delete(&mut self) -> Result<PendingDelete, BoardError> {
        let task_id = self.confirm_delete.take().ok_or_else(|| BoardError::UnknownTask {
            id: String::new(),
        })?;
        self.index_of(&task_id)?;
        self.claim(&task_id)?;
        self.error = None;
        Ok(PendingDelete { task_id })
    }

    pub fn finish_delete(
        &mut self,
        pending: PendingDelete,
        result: Result<(), ApiError>,
    ) -> Result<(), BoardError> {
        self.in_flight.remove(&pending.task_id);
        match result {
            Ok(()) => {
                self.tasks.retain(|t| t.id != pending.task_id);
                self.clamp_selection();
                info!(task = %pending.task_id, "task deleted");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    // ── selection and carrying ───────────────────────────────────────

    pub fn selected_column(&self) -> TaskStatus {
        TaskStatus::from_column(self.selected_status).unwrap_or(TaskStatus::Pending)
    }

    pub fn selected(&self) -> Option<&Task> {
        self.get_tasks_by_status(self.selected_column())
            .get(self.selected_task)
            .copied()
    }

    pub fn move_selection(&mut self, columns: isize, rows: isize) {
        if let Some(carry) = &mut self.carrying {
            carry.target = carry.target.shifted(columns);
            self.selected_status = carry.target.column();
            return;
        }
        self.selected_status = self.selected_column().shifted(columns).column();
        let len = self.get_tasks_by_status(self.selected_column()).len();
        let row = (self.selected_task as isize + rows).clamp(0, len.saturating_sub(1) as isize);
        self.selected_task = row as usize;
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.get_tasks_by_status(self.selected_column()).len();
        if self.selected_task >= len {
            self.selected_task = len.saturating_sub(1);
        }
        if let Some(carry) = &self.carrying {
            if self.task(&carry.task_id).is_none() {
                self.carrying = None;
            }
        }
    }

    pub fn pick_up(&mut self) -> bool {
        let Some(task) = self.selected() else {
            return false;
        };
        self.carrying = Some(Carry {
            task_id: task.id.clone(),
            from: task.status,
            target: task.status,
        });
        true
    }

    pub fn carrying(&self) -> Option<&Carry> {
        self.carrying.as_ref()
    }

    pub fn cancel_carry(&mut self) {
        if let Some(carry) = self.carrying.take() {
            self.selected_status = carry.from.column();
            self.clamp_selection();
        }
    }

    pub fn drop_carried(&mut self) -> Result<Option<PendingUpdate>, BoardError> {
        let Some(carry) = self.carrying.take() else {
            return Ok(None);
        };
        let pending = self.begin_move(&carry.task_id, carry.target)?;
        self.selected_status = carry.target.column();
        if let Some(row) = self
            .get_tasks_by_status(carry.target)
            .iter()
            .position(|t| t.id == carry.task_id)
        {
            self.selected_task = row;
        }
        Ok(pending)
    }

    pub async fn load(&mut self, api: &dyn TaskService) -> Result<(), BoardError> {
        let generation = self.begin_load();
        let result = api.get_tasks(&self.project_id).await;
        self.finish_load(generation, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

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

    fn scenario() -> Vec<Task> {
        vec![
            task("a", TaskStatus::Pending),
            task("b", TaskStatus::InProgress),
            task("c", TaskStatus::Completed),
        ]
    }

    fn server_error() -> ApiError {
        ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, Some("boom".into()), None)
    }

    fn loaded(tasks: Vec<Task>) -> KanbanBoard {
        let mut board = KanbanBoard::new("p1");
        let gen = board.begin_load();
        board.finish_load(gen, Ok(tasks)).unwrap();
        board
    }

    #[test]
    fn every_task_renders_in_its_status_column() {
        let board = loaded(scenario());
        for status in TaskStatus::ALL {
            for t in board.get_tasks_by_status(status) {
                assert_eq!(t.status, status);
            }
        }
        assert_eq!(board.column_counts(), [1, 1, 0, 1]);
    }

    #[test]
    fn drop_updates_status_before_response() {
        let mut board = loaded(scenario());
        let pending = board.begin_move("a", TaskStatus::UnderReview).unwrap().unwrap();

        assert_eq!(board.task("a").unwrap().status, TaskStatus::UnderReview);
        assert_eq!(pending.payload.title, "task a");
        assert_eq!(pending.payload.status, TaskStatus::UnderReview);
        assert!(board.is_busy("a"));
    }

    #[test]
    fn failed_move_restores_previous_status() {
        let mut board = loaded(scenario());
        let pending = board.begin_move("a", TaskStatus::Completed).unwrap().unwrap();
        let err = board.finish_update(pending, Err(server_error())).unwrap_err();

        assert!(matches!(err, BoardError::Api(_)));
        assert_eq!(board.task("a").unwrap().status, TaskStatus::Pending);
        assert_eq!(board.error(), Some("boom"));
        assert!(!board.is_busy("a"));
    }

    #[test]
    fn second_mutation_on_same_task_is_rejected() {
        let mut board = loaded(scenario());
        let _pending = board.begin_move("a", TaskStatus::InProgress).unwrap();
        assert!(matches!(
            board.begin_move("a", TaskStatus::Completed),
            Err(BoardError::Busy { .. })
        ));
    }

    #[test]
    fn dropping_into_same_column_is_a_noop() {
        let mut board = loaded(scenario());
        assert!(board.begin_move("b", TaskStatus::InProgress).unwrap().is_none());
        assert!(!board.is_busy("b"));
    }

    #[test]
    fn stale_load_is_ignored() {
        let mut board = KanbanBoard::new("p1");
        let first = board.begin_load();
        let second = board.begin_load();
        board.finish_load(second, Ok(scenario())).unwrap();
        board.finish_load(first, Ok(vec![])).unwrap();
        assert_eq!(board.tasks().len(), 3);
        assert!(!board.is_loading());
    }

    #[test]
    fn load_failure_keeps_previous_list() {
        let mut board = loaded(scenario());
        let gen = board.begin_load();
        assert!(board.finish_load(gen, Err(server_error())).is_err());
        assert_eq!(board.tasks().len(), 3);
        assert_eq!(board.error(), Some("boom"));
    }

    #[test]
    fn delete_waits_for_confirmation_and_success() {
        let mut board = loaded(scenario());
        board.request_delete("b").unwrap();
        assert_eq!(board.delete_prompt().unwrap().id, "b");

        let pending = board.confirm_delete().unwrap();
        assert!(board.task("b").is_some(), "still visible while in flight");

        board.finish_delete(pending, Ok(())).unwrap();
        assert!(board.task("b").is_none());
    }

    #[test]
    fn failed_delete_keeps_task() {
        let mut board = loaded(scenario());
        board.request_delete("c").unwrap();
        let pending = board.confirm_delete().unwrap();
        assert!(board.finish_delete(pending, Err(server_error())).is_err());
        assert!(board.task("c").is_some());
        assert_eq!(board.error(), Some("boom"));
    }

    #[test]
    fn cancelled_delete_prompt_sends_nothing() {
        let mut board = loaded(scenario());
        board.request_delete("a").unwrap();
        board.cancel_delete();
        assert!(board.delete_prompt().is_none());
        assert!(board.confirm_delete().is_err());
    }

    #[test]
    fn carry_and_drop_moves_card_and_selection() {
        let mut board = loaded(scenario());
        assert!(board.pick_up());
        board.move_selection(2, 0);
        assert_eq!(board.carrying().unwrap().target, TaskStatus::UnderReview);

        let pending = board.drop_carried().unwrap().unwrap();
        assert_eq!(pending.task_id, "a");
        assert_eq!(board.selected_column(), TaskStatus::UnderReview);
        assert_eq!(board.selected().unwrap().id, "a");
        assert!(board.carrying().is_none());
    }

    #[test]
    fn cancel_carry_returns_to_origin() {
        let mut board = loaded(scenario());
        board.pick_up();
        board.move_selection(1, 0);
        board.cancel_carry();
        assert_eq!(board.selected_column(), TaskStatus::Pending);
        assert_eq!(board.task("a").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn edit_with_blank_title_never_mutates() {
        let mut board = loaded(scenario());
        let err = board.begin_edit("a", TaskPayload::new("  ", "x")).unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
        assert_eq!(board.task("a").unwrap().title, "task a");
    }

    #[test]
    fn scenario_move_pending_to_under_review() {
        let mut board = loaded(scenario());
        let non_empty = board.column_counts().iter().filter(|c| **c > 0).count();
        assert_eq!(non_empty, 3);

        let pending = board.begin_move("a", TaskStatus::UnderReview).unwrap().unwrap();
        let mut server = task("a", TaskStatus::UnderReview);
        server.updated_at = Some(chrono::Utc::now());
        board.finish_update(pending, Ok(server)).unwrap();

        assert_eq!(board.get_tasks_by_status(TaskStatus::UnderReview).len(), 1);
        assert_eq!(board.get_tasks_by_status(TaskStatus::Pending).len(), 0);
        assert!(board.task("a").unwrap().updated_at.is_some(), "server copy reconciled");
    }

    #[test]
    fn failed_edit_rolls_back_and_reports() {
        let mut board = loaded(scenario());
        let mut edit = board.task("b").unwrap().payload();
        edit.title = "renamed".into();

        let pending = board.begin_edit("b", edit).unwrap();
        assert_eq!(board.task("b").unwrap().title, "renamed");
        let err = board.finish_update(pending, Err(server_error())).unwrap_err();
        assert_eq!(err.user_message(), "boom");
        assert_eq!(board.task("b").unwrap().title, "task b");
    }

    #[test]
    fn create_leaves_list_alone_until_reload() {
        let mut board = loaded(scenario());
        let payload = board.begin_create(TaskPayload::new("fresh", "desc")).unwrap();
        assert!(board.is_creating());
        assert!(matches!(
            board.begin_create(payload.clone()),
            Err(BoardError::Busy { .. })
        ));

        board.finish_create(Ok(task("n1", TaskStatus::Pending))).unwrap();
        assert!(!board.is_creating());
        assert_eq!(board.tasks().len(), 3);
    }

    #[test]
    fn create_without_title_is_refused() {
        let mut board = KanbanBoard::new("p1");
        assert!(board.begin_create(TaskPayload::new("", "")).is_err());
        assert!(!board.is_creating());
    }

    #[test]
    fn delete_of_busy_task_is_refused() {
        let mut board = loaded(scenario());
        let _pending = board.begin_move("a", TaskStatus::Completed).unwrap();
        board.request_delete("a").unwrap();
        assert!(matches!(board.confirm_delete(), Err(BoardError::Busy { .. })));
        assert!(board.task("a").is_some());
    }
}
