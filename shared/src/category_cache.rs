use tracing::debug;

use crate::model::{Category, CategoryId, DisplayMode, UserId};

/// Ordered categories as rendered, favorites first.
///
/// Invariants held by every mutator:
/// - at most one entry is in `DisplayMode::Show`;
/// - at most one entry is the favorites category, and when present it sits at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCache {
    categories: Vec<Category>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale replacement after a list fetch.
    ///
    /// Every entry restarts in `List`; repeated ids keep their first occurrence.
    /// With an active session the first entry
    /// titled `favorites_title` is tagged and moved to the front; the rest keep
    /// the order the server sent.
    pub fn replace_all(
        &mut self,
        categories: impl IntoIterator<Item = Category>,
        favorites_title: &str,
        session_active: bool,
    ) {
        self.categories.clear();
        for mut category in categories {
            if self.get(category.id).is_some() {
                debug!(category_id = %category.id, "duplicate category id in list, keeping first");
                continue;
            }
            category.display_mode = DisplayMode::List;
            category.is_favorites_category = false;
            self.categories.push(category);
        }

        if !session_active {
            return;
        }

        if let Some(index) = self
            .categories
            .iter()
            .position(|c| c.title == favorites_title)
        {
            let mut favorites = self.categories.remove(index);
            favorites.is_favorites_category = true;
            self.categories.insert(0, favorites);
        }
    }

    /// Adds a freshly created category, replacing any stale entry with the same id.
    pub fn upsert_on_create(&mut self, mut category: Category) {
        category.display_mode = DisplayMode::List;
        // Only `replace_all` may designate the favorites category.
        category.is_favorites_category = false;
        match self.get_mut(category.id) {
            Some(existing) => *existing = category,
            None => self.categories.push(category),
        }
    }

    pub fn remove_by_id(&mut self, id: CategoryId) -> bool {
        let before = self.categories.len();
        self.categories.retain(|c| c.id != id);
        let removed = self.categories.len() != before;
        if !removed {
            debug!(category_id = %id, "remove skipped, category not cached");
        }
        removed
    }

    pub fn rename_by_id(&mut self, id: CategoryId, title: &str) -> bool {
        match self.get_mut(id) {
            Some(category) => {
                category.title = title.to_owned();
                true
            }
            None => {
                debug!(category_id = %id, "rename skipped, category not cached");
                false
            }
        }
    }

    /// Sets one category's mode. Moving to `Show` collapses any other shown
    /// category to `List` in the same step; `Edit` and `List` touch only `id`.
    pub fn set_display_mode(&mut self, id: CategoryId, mode: DisplayMode) -> bool {
        if self.get(id).is_none() {
            debug!(category_id = %id, %mode, "display mode change skipped, category not cached");
            return false;
        }

        for category in &mut self.categories {
            if category.id == id {
                category.display_mode = mode;
            } else if mode == DisplayMode::Show && category.display_mode == DisplayMode::Show {
                category.display_mode = DisplayMode::List;
            }
        }
        true
    }

    /// Global edit toggle: categories `user` owns (never favorites) that are not
    /// already in `Edit` switch to `Edit`; every other category goes to `List`.
    pub fn toggle_edit_mode(&mut self, user: Option<UserId>) {
        for category in &mut self.categories {
            let eligible = user.is_some_and(|u| category.is_editable_by(u))
                && category.display_mode != DisplayMode::Edit;
            category.display_mode = if eligible {
                DisplayMode::Edit
            } else {
                DisplayMode::List
            };
        }
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn favorites(&self) -> Option<&Category> {
        self.categories.first().filter(|c| c.is_favorites_category)
    }

    pub fn favorites_id(&self) -> Option<CategoryId> {
        self.favorites().map(|c| c.id)
    }

    pub fn shown(&self) -> Option<CategoryId> {
        self.categories
            .iter()
            .find(|c| c.display_mode == DisplayMode::Show)
            .map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn get_mut(&mut self, id: CategoryId) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == id)
    }
}
