//! Local projection of every image the session has liked.
//!
//! Maintained independently of whatever category is on screen, so the
//! favorites view can be rebuilt when its own endpoint is unavailable.

use crate::model::{GalleryImage, ImageId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoritesShadowCache {
    images: Vec<GalleryImage>,
}

impl FavoritesShadowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert: an image whose id is already present replaces the stored entry
    /// in place, so an id never appears twice.
    pub fn add(&mut self, image: GalleryImage) {
        let image = image.favorited(true);
        match self.images.iter_mut().find(|i| i.id == image.id) {
            Some(existing) => *existing = image,
            None => self.images.push(image),
        }
    }

    /// Returns false when the id was not cached.
    pub fn remove(&mut self, id: ImageId) -> bool {
        let before = self.images.len();
        self.images.retain(|i| i.id != id);
        self.images.len() != before
    }

    /// Wholesale replacement, deduplicating by id (later entries win).
    pub fn replace_all(&mut self, images: impl IntoIterator<Item = GalleryImage>) {
        self.images.clear();
        for image in images {
            self.add(image);
        }
    }

    pub fn update_caption(&mut self, id: ImageId, caption: &str) -> bool {
        match self.images.iter_mut().find(|i| i.id == id) {
            Some(image) => {
                image.caption = caption.to_owned();
                true
            }
            None => false,
        }
    }

    /// Resets every favorite flag in `images` to whether this cache holds the id.
    pub fn reconcile(&self, images: impl IntoIterator<Item = GalleryImage>) -> Vec<GalleryImage> {
        images
            .into_iter()
            .map(|image| {
                let liked = self.contains(image.id);
                image.favorited(liked)
            })
            .collect()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.iter().any(|i| i.id == id)
    }

    pub fn all(&self) -> &[GalleryImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}
