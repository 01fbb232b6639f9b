use crate::records::UserRecord;

/// Snapshot of the rows currently on screen. Only ever rebuilt from a
/// fresh listing; never written back to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserListView {
    rows: Vec<UserRecord>,
    selected: Option<usize>,
}

impl UserListView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rows(&self) -> &[UserRecord] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Swaps in a new snapshot and drops any selection.
    pub fn replace(&mut self, rows: Vec<UserRecord>) {
        self.rows = rows;
        self.selected = None;
    }

    #[must_use]
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    #[must_use]
    pub fn selected(&self) -> Option<&UserRecord> {
        self.selected.and_then(|index| self.rows.get(index))
    }

    pub fn select_index(&mut self, index: usize) -> bool {
        if index >= self.rows.len() {
            return false;
        }
        self.selected = Some(index);
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn select_next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let max_index = self.rows.len() - 1;
        self.selected = Some(match self.selected {
            Some(index) => (index + 1).min(max_index),
            None => 0,
        });
    }

    pub fn select_previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.selected = Some(match self.selected {
            Some(index) => index.saturating_sub(1),
            None => 0,
        });
    }
}
