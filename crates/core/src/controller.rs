use tracing::Instrument;

use crate::gateway::StoreBackend;
use crate::records::{UserId, UserRecord};
use crate::repository::{RepositoryError, UserRepository};
use crate::view_model::UserListView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAction {
    Add,
    Delete,
    Edit,
    Refresh,
}

impl UserAction {
    pub const ALL: [UserAction; 4] = [Self::Add, Self::Delete, Self::Edit, Self::Refresh];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Add => "Add User",
            Self::Delete => "Delete User",
            Self::Edit => "Edit User",
            Self::Refresh => "Refresh",
        }
    }

    fn span_name(self) -> &'static str {
        match self {
            Self::Add => "add-user",
            Self::Delete => "delete-user",
            Self::Edit => "update-user",
            Self::Refresh => "fetch-users",
        }
    }

    fn failure_verb(self) -> &'static str {
        match self {
            Self::Add => "add user",
            Self::Delete => "delete user",
            Self::Edit => "update user",
            Self::Refresh => "fetch users",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerPhase {
    #[default]
    Idle,
    Validating,
    Executing,
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Modal message for the presentation shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Notification {
    fn selection_required(action: UserAction) -> Self {
        let verb = match action {
            UserAction::Delete => "delete",
            _ => "edit",
        };
        Self {
            severity: Severity::Warning,
            title: action.title().to_string(),
            message: format!("Select the user you want to {verb}."),
        }
    }

    fn store_failure(action: UserAction, error: &RepositoryError) -> Self {
        let title = match error {
            RepositoryError::Connectivity(_) => "Connection Error",
            RepositoryError::Query(_) | RepositoryError::Validation => "Database Error",
        };
        Self {
            severity: Severity::Error,
            title: title.to_string(),
            message: format!("Failed to {}: {error}", action.failure_verb()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePrompt {
    pub action: UserAction,
    pub title: String,
    pub label: String,
    pub initial_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The store was touched and the view rebuilt.
    Completed,
    /// Pre-flight checks ended the action without a store call.
    Skipped,
    Notify(Notification),
}

/// What the shell must ask before `add`/`edit` can run. `Ok(None)`
/// means the action needs no text input.
pub fn prompt_for(
    action: UserAction,
    view: &UserListView,
) -> Result<Option<NamePrompt>, Notification> {
    match action {
        UserAction::Add => Ok(Some(NamePrompt {
            action,
            title: action.title().to_string(),
            label: "Enter user name:".to_string(),
            initial_value: String::new(),
        })),
        UserAction::Edit => {
            let selected = view
                .selected()
                .ok_or_else(|| Notification::selection_required(action))?;
            Ok(Some(NamePrompt {
                action,
                title: action.title().to_string(),
                label: "Enter new name:".to_string(),
                initial_value: selected.name.clone(),
            }))
        }
        UserAction::Delete => {
            if view.selected().is_none() {
                return Err(Notification::selection_required(action));
            }
            Ok(None)
        }
        UserAction::Refresh => Ok(None),
    }
}

/// Runs one user intent at a time against the repository and keeps the
/// caller-owned view in step with the store.
#[derive(Debug)]
pub struct UserController<B: StoreBackend> {
    repository: UserRepository<B>,
    phase: ControllerPhase,
}

impl<B: StoreBackend> UserController<B> {
    #[must_use]
    pub fn new(repository: UserRepository<B>) -> Self {
        Self {
            repository,
            phase: ControllerPhase::Idle,
        }
    }

    #[must_use]
    pub fn repository(&self) -> &UserRepository<B> {
        &self.repository
    }

    #[must_use]
    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    /// `input` is `None` when the prompt was cancelled.
    pub async fn add(&mut self, view: &mut UserListView, input: Option<&str>) -> ActionOutcome {
        let action = UserAction::Add;
        self.enter(ControllerPhase::Validating);
        let Some(name) = input.filter(|name| !name.trim().is_empty()) else {
            return self.finish(ActionOutcome::Skipped);
        };

        self.enter(ControllerPhase::Executing);
        let result = self
            .repository
            .insert(name)
            .instrument(tracing::info_span!("add-user"))
            .await;
        match result {
            Ok(id) => {
                tracing::info!(?id, "user added");
                self.refresh_after(action, view).await
            }
            Err(error) => self.fail(action, &error),
        }
    }

    pub async fn delete(&mut self, view: &mut UserListView) -> ActionOutcome {
        let action = UserAction::Delete;
        self.enter(ControllerPhase::Validating);
        let Some(id) = view.selected().map(|record| record.id) else {
            return self.finish(ActionOutcome::Notify(Notification::selection_required(
                action,
            )));
        };

        self.enter(ControllerPhase::Executing);
        let result = self
            .repository
            .delete(id)
            .instrument(tracing::info_span!("delete-user", id))
            .await;
        match result {
            Ok(()) => {
                tracing::info!(id, "user deleted");
                self.refresh_after(action, view).await
            }
            Err(error) => self.fail(action, &error),
        }
    }

    /// Cancelled or unchanged input ends the action without a store call.
    pub async fn edit(&mut self, view: &mut UserListView, input: Option<&str>) -> ActionOutcome {
        let action = UserAction::Edit;
        self.enter(ControllerPhase::Validating);
        let Some(UserRecord { id, name: current }) = view.selected().cloned() else {
            return self.finish(ActionOutcome::Notify(Notification::selection_required(
                action,
            )));
        };
        let Some(new_name) = input.filter(|name| !name.trim().is_empty() && *name != current)
        else {
            return self.finish(ActionOutcome::Skipped);
        };

        self.enter(ControllerPhase::Executing);
        let result = self.update(id, new_name).await;
        match result {
            Ok(()) => {
                tracing::info!(id, "user renamed");
                self.refresh_after(action, view).await
            }
            Err(error) => self.fail(action, &error),
        }
    }

    pub async fn refresh(&mut self, view: &mut UserListView) -> ActionOutcome {
        self.refresh_after(UserAction::Refresh, view).await
    }

    async fn update(&self, id: UserId, name: &str) -> Result<(), RepositoryError> {
        self.repository
            .update_name(id, name)
            .instrument(tracing::info_span!("update-user", id))
            .await
    }

    async fn refresh_after(&mut self, action: UserAction, view: &mut UserListView) -> ActionOutcome {
        self.enter(ControllerPhase::Refreshing);
        let result = self
            .repository
            .list_all()
            .instrument(tracing::info_span!("fetch-users", trigger = action.span_name()))
            .await;
        match result {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), "view refreshed");
                view.replace(rows);
                self.finish(ActionOutcome::Completed)
            }
            Err(error) => self.fail(UserAction::Refresh, &error),
        }
    }

    fn fail(&mut self, action: UserAction, error: &RepositoryError) -> ActionOutcome {
        tracing::error!(action = action.span_name(), %error, "action failed");
        self.finish(ActionOutcome::Notify(Notification::store_failure(
            action, error,
        )))
    }

    fn enter(&mut self, phase: ControllerPhase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "controller transition");
        self.phase = phase;
    }

    fn finish(&mut self, outcome: ActionOutcome) -> ActionOutcome {
        self.enter(ControllerPhase::Idle);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::{
        prompt_for, ActionOutcome, ControllerPhase, Severity, UserAction, UserController,
    };
    use crate::config::StoreConfig;
    use crate::gateway::testing::FakeBackend;
    use crate::gateway::{ConnectionGateway, Statement};
    use crate::records::UserRecord;
    use crate::repository::UserRepository;
    use crate::view_model::UserListView;

    fn controller(backend: FakeBackend) -> UserController<FakeBackend> {
        UserController::new(UserRepository::new(ConnectionGateway::new(
            backend,
            StoreConfig::default(),
        )))
    }

    fn seeded() -> FakeBackend {
        FakeBackend::with_rows(vec![UserRecord::new(1, "A"), UserRecord::new(2, "B")])
    }

    fn connect_calls(controller: &UserController<FakeBackend>) -> usize {
        controller
            .repository()
            .gateway()
            .backend()
            .connect_calls
            .load(Ordering::Relaxed)
    }

    async fn loaded(controller: &mut UserController<FakeBackend>) -> UserListView {
        let mut view = UserListView::new();
        assert_eq!(controller.refresh(&mut view).await, ActionOutcome::Completed);
        view
    }

    #[tokio::test]
    async fn add_inserts_and_refreshes_view() {
        let mut controller = controller(FakeBackend::default());
        let mut view = loaded(&mut controller).await;
        assert!(view.is_empty());

        let outcome = controller.add(&mut view, Some("Alice")).await;

        assert_eq!(outcome, ActionOutcome::Completed);
        assert_eq!(view.len(), 1);
        assert_eq!(view.rows()[0].name, "Alice");
        assert_eq!(controller.phase(), ControllerPhase::Idle);
    }

    #[tokio::test]
    async fn add_with_cancelled_or_empty_input_skips_store() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        let before = view.clone();
        let calls = connect_calls(&controller);

        assert_eq!(controller.add(&mut view, None).await, ActionOutcome::Skipped);
        assert_eq!(controller.add(&mut view, Some("")).await, ActionOutcome::Skipped);
        assert_eq!(
            controller.add(&mut view, Some("  ")).await,
            ActionOutcome::Skipped
        );

        assert_eq!(connect_calls(&controller), calls);
        assert_eq!(view, before);
    }

    #[tokio::test]
    async fn delete_and_edit_without_selection_warn_without_store_calls() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        let calls = connect_calls(&controller);

        for outcome in [
            controller.delete(&mut view).await,
            controller.edit(&mut view, Some("Bob")).await,
        ] {
            let ActionOutcome::Notify(notification) = &outcome else {
                panic!("expected selection warning, got {outcome:?}");
            };
            assert_eq!(notification.severity, Severity::Warning);
        }

        assert_eq!(connect_calls(&controller), calls);
    }

    #[tokio::test]
    async fn edit_prompt_prefills_current_name() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;

        let warning = prompt_for(UserAction::Edit, &view)
            .expect_err("edit without selection should warn");
        assert_eq!(warning.title, "Edit User");

        assert!(view.select_index(1));
        let prompt = prompt_for(UserAction::Edit, &view)
            .expect("edit prompt")
            .expect("edit needs input");
        assert_eq!(prompt.initial_value, "B");

        assert!(prompt_for(UserAction::Refresh, &view)
            .expect("refresh needs nothing")
            .is_none());
        assert!(prompt_for(UserAction::Delete, &view)
            .expect("delete with selection needs no input")
            .is_none());
    }

    #[tokio::test]
    async fn edit_updates_selected_row_only() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        assert!(view.select_index(0));

        let outcome = controller.edit(&mut view, Some("Bob")).await;

        assert_eq!(outcome, ActionOutcome::Completed);
        assert_eq!(
            view.rows(),
            &[UserRecord::new(1, "Bob"), UserRecord::new(2, "B")]
        );
        assert!(view.selected().is_none());
    }

    #[tokio::test]
    async fn edit_with_unchanged_name_skips_store() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        assert!(view.select_index(0));
        let calls = connect_calls(&controller);

        assert_eq!(
            controller.edit(&mut view, Some("A")).await,
            ActionOutcome::Skipped
        );
        assert_eq!(controller.edit(&mut view, None).await, ActionOutcome::Skipped);
        assert_eq!(connect_calls(&controller), calls);
    }

    #[tokio::test]
    async fn delete_removes_selected_row() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        assert!(view.select_index(0));

        assert_eq!(controller.delete(&mut view).await, ActionOutcome::Completed);
        assert_eq!(view.rows(), &[UserRecord::new(2, "B")]);
        assert!(controller
            .repository()
            .gateway()
            .backend()
            .executed()
            .contains(&Statement::DeleteUser { id: 1 }));
    }

    #[tokio::test]
    async fn connectivity_failure_leaves_view_untouched() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        assert!(view.select_index(0));
        let before = view.clone();
        controller
            .repository()
            .gateway()
            .backend()
            .fail_connect
            .store(1, Ordering::Relaxed);

        let outcome = controller.delete(&mut view).await;

        let ActionOutcome::Notify(notification) = &outcome else {
            panic!("expected error notification, got {outcome:?}");
        };
        assert_eq!(notification.severity, Severity::Error);
        assert!(notification.message.contains("connection refused"));
        assert_eq!(view, before);
        assert_eq!(controller.phase(), ControllerPhase::Idle);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        assert!(view.select_index(1));
        let before = view.clone();
        controller
            .repository()
            .gateway()
            .backend()
            .fail_execute
            .store(1, Ordering::Relaxed);

        let outcome = controller.refresh(&mut view).await;

        let ActionOutcome::Notify(notification) = &outcome else {
            panic!("expected error notification, got {outcome:?}");
        };
        assert_eq!(notification.title, "Database Error");
        assert!(notification.message.starts_with("Failed to fetch users"));
        assert_eq!(view, before);
    }

    #[tokio::test]
    async fn add_during_outage_notifies_and_keeps_view() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        let before = view.clone();
        controller
            .repository()
            .gateway()
            .backend()
            .fail_connect
            .store(1, Ordering::Relaxed);

        let outcome = controller.add(&mut view, Some("Carol")).await;

        let ActionOutcome::Notify(notification) = &outcome else {
            panic!("expected error notification, got {outcome:?}");
        };
        assert_eq!(notification.severity, Severity::Error);
        assert_eq!(notification.title, "Connection Error");
        assert!(notification.message.starts_with("Failed to add user"));
        assert_eq!(view, before);
        assert_eq!(controller.repository().gateway().backend().snapshot().len(), 2);
        assert_eq!(controller.phase(), ControllerPhase::Idle);
    }

    #[tokio::test]
    async fn edit_during_outage_notifies_and_keeps_view() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        assert!(view.select_index(1));
        let before = view.clone();
        controller
            .repository()
            .gateway()
            .backend()
            .fail_connect
            .store(1, Ordering::Relaxed);

        let outcome = controller.edit(&mut view, Some("Bob")).await;

        let ActionOutcome::Notify(notification) = &outcome else {
            panic!("expected error notification, got {outcome:?}");
        };
        assert_eq!(notification.severity, Severity::Error);
        assert!(notification.message.starts_with("Failed to update user"));
        assert_eq!(view, before);
        assert_eq!(
            controller.repository().gateway().backend().snapshot(),
            vec![UserRecord::new(1, "A"), UserRecord::new(2, "B")]
        );
    }

    #[tokio::test]
    async fn committed_insert_with_failed_relisting_keeps_previous_snapshot() {
        let mut controller = controller(seeded());
        let mut view = loaded(&mut controller).await;
        let before = view.clone();
        controller
            .repository()
            .gateway()
            .backend()
            .fail_list
            .store(1, Ordering::Relaxed);

        let outcome = controller.add(&mut view, Some("Carol")).await;

        let ActionOutcome::Notify(notification) = &outcome else {
            panic!("expected error notification, got {outcome:?}");
        };
        assert_eq!(notification.severity, Severity::Error);
        assert!(notification.message.contains("listing rejected"));
        assert_eq!(view, before);
        assert!(controller
            .repository()
            .gateway()
            .backend()
            .snapshot()
            .contains(&UserRecord::new(3, "Carol")));

        assert_eq!(controller.refresh(&mut view).await, ActionOutcome::Completed);
        assert_eq!(view.len(), 3);
    }
}
