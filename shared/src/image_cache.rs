use tracing::debug;

use crate::favorites::FavoritesShadowCache;
use crate::model::{CategoryId, GalleryImage, ImageId};

/// Working set of images for the category currently on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCache {
    category: Option<CategoryId>,
    images: Vec<GalleryImage>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the working set wholesale.
    ///
    /// Favorite status is reconciled against `favorites` first: every incoming
    /// image is reset to not-favorite, then flagged if the shadow cache holds its id.
    pub fn replace_current(
        &mut self,
        category: CategoryId,
        images: impl IntoIterator<Item = GalleryImage>,
        favorites: &FavoritesShadowCache,
    ) {
        self.images = favorites.reconcile(images);
        self.category = Some(category);
    }

    /// Upsert: an id already in the working set is replaced where it stands.
    pub fn append(&mut self, image: GalleryImage) {
        match self.get_mut(image.id) {
            Some(existing) => *existing = image,
            None => self.images.push(image),
        }
    }

    /// No-op when absent: a delete can race with a fetch that already dropped the id.
    pub fn remove_by_id(&mut self, id: ImageId) -> bool {
        let before = self.images.len();
        self.images.retain(|i| i.id != id);
        let removed = self.images.len() != before;
        if !removed {
            debug!(image_id = %id, "remove skipped, image not loaded");
        }
        removed
    }

    pub fn update_caption(&mut self, id: ImageId, caption: &str) -> bool {
        match self.get_mut(id) {
            Some(image) => {
                image.caption = caption.to_owned();
                true
            }
            None => {
                debug!(image_id = %id, "caption update skipped, image not loaded");
                false
            }
        }
    }

    pub fn set_favorite(&mut self, id: ImageId, value: bool) -> bool {
        match self.get_mut(id) {
            Some(image) => {
                image.is_favorite = value;
                true
            }
            None => {
                debug!(image_id = %id, "favorite update skipped, image not loaded");
                false
            }
        }
    }

    /// Drops the working set and forgets which category it belonged to.
    pub fn clear(&mut self) {
        self.images.clear();
        self.category = None;
    }

    pub fn current_category(&self) -> Option<CategoryId> {
        self.category
    }

    pub fn images(&self) -> &[GalleryImage] {
        &self.images
    }

    pub fn get(&self, id: ImageId) -> Option<&GalleryImage> {
        self.images.iter().find(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn get_mut(&mut self, id: ImageId) -> Option<&mut GalleryImage> {
        self.images.iter_mut().find(|i| i.id == id)
    }
}
