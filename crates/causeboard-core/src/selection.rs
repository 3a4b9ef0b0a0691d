//! Row selection and the detail drawer.

use serde::Serialize;
use tracing::debug;

use crate::models::{EntityId, ListPage};

/// Which record the detail drawer shows, and whether it is open.
///
/// Closing keeps the selection so reopening shows the same record; only
/// `deselect` (or a refetch that no longer contains the record) clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SelectionState {
    selected_id: Option<EntityId>,
    drawer_open: bool,
}

impl SelectionState {
    pub fn selected_id(&self) -> Option<&EntityId> {
        self.selected_id.as_ref()
    }

    pub fn is_drawer_open(&self) -> bool {
        self.drawer_open
    }

    pub fn is_selected(&self, id: &EntityId) -> bool {
        self.selected_id.as_ref() == Some(id)
    }

    /// Open the drawer on `id`.
    pub fn select(&mut self, id: EntityId) {
        self.selected_id = Some(id);
        self.drawer_open = true;
    }

    pub fn close(&mut self) {
        self.drawer_open = false;
    }

    /// Reopen on the retained selection. Returns false if nothing is selected.
    pub fn reopen(&mut self) -> bool {
        self.drawer_open = self.selected_id.is_some();
        self.drawer_open
    }

    pub fn deselect(&mut self) {
        self.selected_id = None;
        self.drawer_open = false;
    }

    /// Clear the selection if `page` no longer contains it.
    /// Returns true when the selection was cleared.
    pub fn reconcile(&mut self, page: &ListPage) -> bool {
        match &self.selected_id {
            Some(id) if !page.contains(id) => {
                debug!(id = %id, "Selected record no longer listed, closing drawer");
                self.deselect();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;

    fn page(ids: &[i64]) -> ListPage {
        ListPage::new(
            ids.iter()
                .map(|&id| user(id, "Test", "User", "t@example.org"))
                .collect(),
        )
    }

    #[test]
    fn test_close_retains_selection() {
        let mut selection = SelectionState::default();
        selection.select(EntityId::from(7));
        assert!(selection.is_drawer_open());

        selection.close();
        assert!(!selection.is_drawer_open());
        assert!(selection.is_selected(&EntityId::from(7)));

        assert!(selection.reopen());
        assert!(selection.is_drawer_open());
    }

    #[test]
    fn test_reopen_without_selection() {
        let mut selection = SelectionState::default();
        assert!(!selection.reopen());
        assert!(!selection.is_drawer_open());
    }

    #[test]
    fn test_deselect_clears_both() {
        let mut selection = SelectionState::default();
        selection.select(EntityId::from(7));
        selection.deselect();
        assert_eq!(selection, SelectionState::default());
    }

    #[test]
    fn test_reconcile_clears_missing_selection() {
        let mut selection = SelectionState::default();
        selection.select(EntityId::from(7));

        assert!(!selection.reconcile(&page(&[5, 7, 9])));
        assert!(selection.is_drawer_open());

        assert!(selection.reconcile(&page(&[5, 9])));
        assert_eq!(selection.selected_id(), None);
        assert!(!selection.is_drawer_open());
    }

    #[test]
    fn test_reconcile_keeps_closed_selection_when_present() {
        let mut selection = SelectionState::default();
        selection.select(EntityId::from(7));
        selection.close();
        assert!(!selection.reconcile(&page(&[7])));
        assert!(selection.is_selected(&EntityId::from(7)));
        assert!(!selection.is_drawer_open());
    }
}
