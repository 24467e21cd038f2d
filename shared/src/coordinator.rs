//! Orchestrates session, caches and remote calls.
//!
//! Every mutation follows the same recipe: check the session, call the
//! remote, and only on success apply the result to the caches and publish
//! fresh snapshots. A failed call leaves every cache as it was.
//!
//! Lock order is session, categories, images, favorites. No lock is held
//! across a remote call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::category_cache::CategoryCache;
use crate::config::{ClientConfig, ConfigError};
use crate::favorites::FavoritesShadowCache;
use crate::image_cache::ImageCache;
use crate::model::{AuthToken, Category, CategoryId, DisplayMode, GalleryImage, ImageId, Session, UserId};
use crate::remote::GalleryApi;
use crate::session::SessionState;
use crate::Outcome;

struct Inner<A> {
    api: A,
    config: ClientConfig,
    session: RwLock<SessionState>,
    categories: RwLock<CategoryCache>,
    images: RwLock<ImageCache>,
    favorites: RwLock<FavoritesShadowCache>,
    categories_tx: watch::Sender<Vec<Category>>,
    images_tx: watch::Sender<Vec<GalleryImage>>,
    warmup: Mutex<Option<JoinHandle<()>>>,
}

/// Credentials captured when a mutation starts.
struct Credentials {
    user: UserId,
    token: AuthToken,
    generation: u64,
}

/// Handle to the gallery state. Clones share the same caches.
pub struct SyncCoordinator<A> {
    inner: Arc<Inner<A>>,
}

impl<A> Clone for SyncCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: GalleryApi + 'static> SyncCoordinator<A> {
    pub fn new(api: A, config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let (categories_tx, _) = watch::channel(Vec::new());
        let (images_tx, _) = watch::channel(Vec::new());
        Ok(Self {
            inner: Arc::new(Inner {
                api,
                config,
                session: RwLock::new(SessionState::new()),
                categories: RwLock::new(CategoryCache::new()),
                images: RwLock::new(ImageCache::new()),
                favorites: RwLock::new(FavoritesShadowCache::new()),
                categories_tx,
                images_tx,
                warmup: Mutex::new(None),
            }),
        })
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // --- Observables and snapshots ---

    /// Receives the ordered category list after every committed change.
    pub fn subscribe_categories(&self) -> watch::Receiver<Vec<Category>> {
        self.inner.categories_tx.subscribe()
    }

    /// Receives the current image set after every committed change.
    pub fn subscribe_images(&self) -> watch::Receiver<Vec<GalleryImage>> {
        self.inner.images_tx.subscribe()
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.inner.categories.read().await.categories().to_vec()
    }

    pub async fn images(&self) -> Vec<GalleryImage> {
        self.inner.images.read().await.images().to_vec()
    }

    pub async fn favorites(&self) -> Vec<GalleryImage> {
        self.inner.favorites.read().await.all().to_vec()
    }

    pub async fn current_category(&self) -> Option<CategoryId> {
        self.inner.images.read().await.current_category()
    }

    pub async fn favorites_category_id(&self) -> Option<CategoryId> {
        self.inner.categories.read().await.favorites_id()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.session.read().await.is_authenticated()
    }

    pub async fn current_user(&self) -> Option<UserId> {
        self.inner.session.read().await.user_id()
    }

    // --- Session ---

    /// Authenticates and starts a fresh session. All caches are emptied so
    /// nothing from a previous identity survives. On failure the existing
    /// session, if any, is kept.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &SecretString) -> Outcome<Session> {
        let session = self.inner.api.authenticate(username, password).await?;
        self.abort_warmup();

        let mut state = self.inner.session.write().await;
        state.begin(session.clone());
        self.reset_caches().await;

        info!(user_id = %session.user_id, "Session started");
        Ok(session)
    }

    /// Ends the session and empties every cache. Never fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.abort_warmup();

        let mut state = self.inner.session.write().await;
        state.clear();
        self.reset_caches().await;

        info!("Session cleared");
    }

    // --- Categories ---

    /// Replaces the category list from the server. With a session, also
    /// starts the favorites warm-up in the background.
    #[instrument(skip(self))]
    pub async fn fetch_categories(&self) -> Outcome<Vec<Category>> {
        let (token, generation) = {
            let session = self.inner.session.read().await;
            (session.token(), session.generation())
        };

        let fetched = self.inner.api.list_categories(token.as_ref()).await?;

        let session = self.inner.session.read().await;
        if session.generation() != generation {
            debug!("session changed during category fetch, result dropped");
            return Ok(fetched);
        }
        let session_active = session.is_authenticated();

        let mut categories = self.inner.categories.write().await;
        let previously_shown = categories.shown();
        categories.replace_all(fetched, &self.inner.config.favorites_title, session_active);

        if let Some(shown) = previously_shown {
            if !categories.set_display_mode(shown, DisplayMode::Show) {
                let mut images = self.inner.images.write().await;
                if images.current_category() == Some(shown) {
                    images.clear();
                    self.publish_images(&images);
                }
            }
        }
        self.publish_categories(&categories);
        let snapshot = categories.categories().to_vec();
        let has_favorites = categories.favorites_id().is_some();
        drop(categories);
        drop(session);

        info!(count = snapshot.len(), "Categories refreshed");
        if session_active && has_favorites {
            self.spawn_favorites_warmup();
        }
        Ok(snapshot)
    }

    /// One-shot, best-effort fill of the shadow cache from the favorites
    /// category. Returns true when the cache was populated.
    ///
    /// Does nothing without a session, without a favorites category, when the
    /// shadow cache is already non-empty, or once it has run for this session.
    /// A failed fetch leaves the cache empty and is only logged.
    #[instrument(skip(self))]
    pub async fn prime_favorites_shadow(&self) -> bool {
        let (favorites_id, generation) = {
            let mut session = self.inner.session.write().await;
            if !session.is_authenticated() {
                return false;
            }
            let Some(favorites_id) = self.inner.categories.read().await.favorites_id() else {
                debug!("no favorites category, warm-up skipped");
                return false;
            };
            if !self.inner.favorites.read().await.is_empty() {
                return false;
            }
            if !session.claim_favorites_warmup() {
                debug!("warm-up already ran for this session");
                return false;
            }
            (favorites_id, session.generation())
        };

        let images = match self.inner.api.list_images(favorites_id).await {
            Ok(images) => images,
            Err(e) => {
                debug!(error = %e, "favorites warm-up failed");
                return false;
            }
        };

        let session = self.inner.session.read().await;
        if session.generation() != generation {
            debug!("session changed during warm-up, result dropped");
            return false;
        }
        let mut favorites = self.inner.favorites.write().await;
        if !favorites.is_empty() {
            return false;
        }
        favorites.replace_all(images);
        info!(count = favorites.len(), "Favorites shadow cache primed");
        true
    }

    /// Waits for a favorites warm-up still in flight.
    pub async fn settle(&self) {
        let handle = lock(&self.inner.warmup).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "favorites warm-up task failed");
                }
            }
        }
    }

    /// Shows `id`, collapsing any other shown category, then loads its images.
    /// An unknown id is a no-op returning an empty list.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn select_category(&self, id: CategoryId) -> Outcome<Vec<GalleryImage>> {
        {
            let mut categories = self.inner.categories.write().await;
            if !categories.set_display_mode(id, DisplayMode::Show) {
                return Ok(Vec::new());
            }
            self.publish_categories(&categories);
        }
        self.load_images(id, true).await
    }

    /// Returns a shown category to `List` and drops the current image set.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn collapse_category(&self, id: CategoryId) -> bool {
        let mut categories = self.inner.categories.write().await;
        if categories.shown() != Some(id) {
            debug!("collapse skipped, category not shown");
            return false;
        }
        categories.set_display_mode(id, DisplayMode::List);
        self.publish_categories(&categories);

        let mut images = self.inner.images.write().await;
        images.clear();
        self.publish_images(&images);
        true
    }

    /// Flips every category the current user may edit into `Edit` and every
    /// other one to `List`, in one step. Nothing stays shown, so the current
    /// image set is dropped.
    #[instrument(skip(self))]
    pub async fn toggle_edit_mode(&self) {
        let session = self.inner.session.read().await;
        let mut categories = self.inner.categories.write().await;
        categories.toggle_edit_mode(session.user_id());
        self.publish_categories(&categories);

        let mut images = self.inner.images.write().await;
        images.clear();
        self.publish_images(&images);
    }

    #[instrument(skip(self))]
    pub async fn add_category(&self, title: &str) -> Outcome<Category> {
        let credentials = self.credentials("add_category").await?;
        let mut created = self
            .inner
            .api
            .create_category(title, &credentials.token)
            .await?;
        created.owner_id = credentials.user;
        created.display_mode = DisplayMode::List;
        created.is_favorites_category = false;

        let session = self.inner.session.read().await;
        if session.generation() == credentials.generation {
            let mut categories = self.inner.categories.write().await;
            categories.upsert_on_create(created.clone());
            self.publish_categories(&categories);
        }
        info!(category_id = %created.id, "Category created");
        Ok(created)
    }

    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn rename_category(&self, id: CategoryId, title: &str) -> Outcome<()> {
        let credentials = self.credentials("rename_category").await?;
        self.inner
            .api
            .rename_category(id, title, &credentials.token)
            .await?;

        let session = self.inner.session.read().await;
        if session.generation() == credentials.generation {
            let mut categories = self.inner.categories.write().await;
            if categories.rename_by_id(id, title) {
                self.publish_categories(&categories);
            }
        }
        info!("Category renamed");
        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete_category(&self, id: CategoryId) -> Outcome<()> {
        let credentials = self.credentials("delete_category").await?;
        self.inner
            .api
            .delete_category(id, &credentials.token)
            .await?;

        let session = self.inner.session.read().await;
        if session.generation() == credentials.generation {
            let mut categories = self.inner.categories.write().await;
            if categories.remove_by_id(id) {
                self.publish_categories(&categories);
            }
            let mut images = self.inner.images.write().await;
            if images.current_category() == Some(id) {
                images.clear();
                self.publish_images(&images);
            }
        }
        info!("Category deleted");
        Ok(())
    }

    // --- Images ---

    /// Loads the images of `category` and returns them with favorite flags
    /// reconciled against the shadow cache.
    ///
    /// The result becomes the current set when `category` is the shown one,
    /// or when nothing is shown at all. Otherwise the caches are left alone.
    /// If the favorites category cannot be fetched but the shadow cache has
    /// entries, the shadow cache is served instead and the call succeeds.
    #[instrument(skip(self), fields(category_id = %category))]
    pub async fn fetch_images(&self, category: CategoryId) -> Outcome<Vec<GalleryImage>> {
        self.load_images(category, false).await
    }

    /// `selected` is set when the caller made `category` the shown one; the
    /// result is then dropped if that selection no longer holds.
    async fn load_images(&self, category: CategoryId, selected: bool) -> Outcome<Vec<GalleryImage>> {
        let generation = self.inner.session.read().await.generation();
        let result = self.inner.api.list_images(category).await;

        let session = self.inner.session.read().await;
        let categories = self.inner.categories.read().await;
        let mut images = self.inner.images.write().await;
        let favorites = self.inner.favorites.read().await;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) if categories.favorites_id() == Some(category) && !favorites.is_empty() => {
                warn!(error = %e, count = favorites.len(), "Favorites fetch failed, serving shadow cache");
                favorites.all().to_vec()
            }
            Err(e) => {
                warn!(error = %e, "Image fetch failed");
                return Err(e);
            }
        };

        let shown = categories.shown();
        let applicable = shown == Some(category) || (!selected && shown.is_none());
        if session.generation() != generation {
            debug!("session changed during image fetch, result dropped");
            return Ok(favorites.reconcile(fetched));
        }
        if !applicable {
            debug!(shown = ?shown, "category no longer shown, result dropped");
            return Ok(favorites.reconcile(fetched));
        }

        images.replace_current(category, fetched, &favorites);
        self.publish_images(&images);
        info!(count = images.len(), "Images loaded");
        Ok(images.images().to_vec())
    }

    /// Uploads an image reference. It joins the current set only when
    /// `category` is the one loaded.
    #[instrument(skip(self, url), fields(category_id = %category))]
    pub async fn add_image(
        &self,
        category: CategoryId,
        caption: &str,
        url: &str,
    ) -> Outcome<GalleryImage> {
        let credentials = self.credentials("add_image").await?;
        let added = self
            .inner
            .api
            .add_image(category, caption, url, &credentials.token)
            .await?;

        let session = self.inner.session.read().await;
        let mut images = self.inner.images.write().await;
        let favorites = self.inner.favorites.read().await;
        let liked = favorites.contains(added.id);
        let added = added.favorited(liked);
        if session.generation() == credentials.generation
            && images.current_category() == Some(category)
        {
            images.append(added.clone());
            self.publish_images(&images);
        }
        info!(image_id = %added.id, "Image added");
        Ok(added)
    }

    #[instrument(skip(self), fields(image_id = %id))]
    pub async fn edit_image_caption(&self, id: ImageId, caption: &str) -> Outcome<GalleryImage> {
        let credentials = self.credentials("edit_image_caption").await?;
        let edited = self
            .inner
            .api
            .edit_image_caption(id, caption, &credentials.token)
            .await?;

        let session = self.inner.session.read().await;
        let mut images = self.inner.images.write().await;
        let mut favorites = self.inner.favorites.write().await;
        let edited = edited.favorited(favorites.contains(id));
        if session.generation() == credentials.generation {
            if images.update_caption(id, &edited.caption) {
                self.publish_images(&images);
            }
            favorites.update_caption(id, &edited.caption);
        }
        info!("Image caption updated");
        Ok(edited)
    }

    /// Deletes an image; it also leaves the shadow cache so the favorites
    /// fallback cannot resurrect it.
    #[instrument(skip(self), fields(image_id = %id))]
    pub async fn delete_image(&self, id: ImageId) -> Outcome<()> {
        let credentials = self.credentials("delete_image").await?;
        self.inner.api.delete_image(id, &credentials.token).await?;

        let session = self.inner.session.read().await;
        if session.generation() == credentials.generation {
            let mut images = self.inner.images.write().await;
            let mut favorites = self.inner.favorites.write().await;
            if images.remove_by_id(id) {
                self.publish_images(&images);
            }
            favorites.remove(id);
        }
        info!("Image deleted");
        Ok(())
    }

    /// Moves an image to another category. It leaves the current set and is
    /// not added anywhere locally until the destination is fetched.
    #[instrument(skip(self), fields(image_id = %id, category_id = %category))]
    pub async fn reassign_image_category(
        &self,
        id: ImageId,
        category: CategoryId,
    ) -> Outcome<GalleryImage> {
        let credentials = self.credentials("reassign_image_category").await?;
        let moved = self
            .inner
            .api
            .reassign_image_category(id, category, &credentials.token)
            .await?;

        let session = self.inner.session.read().await;
        if session.generation() == credentials.generation {
            let mut images = self.inner.images.write().await;
            if images.remove_by_id(id) {
                self.publish_images(&images);
            }
        }
        info!("Image reassigned");
        Ok(moved)
    }

    /// Marks an image as favorite in the current set and the shadow cache together.
    #[instrument(skip(self), fields(image_id = %id))]
    pub async fn like_image(&self, id: ImageId) -> Outcome<GalleryImage> {
        let credentials = self.credentials("like_image").await?;
        let liked = self.inner.api.like_image(id, &credentials.token).await?;

        let session = self.inner.session.read().await;
        let mut images = self.inner.images.write().await;
        let mut favorites = self.inner.favorites.write().await;
        let liked = images.get(id).cloned().unwrap_or(liked).favorited(true);
        if session.generation() == credentials.generation {
            if images.set_favorite(id, true) {
                self.publish_images(&images);
            }
            favorites.add(liked.clone());
        }
        info!("Image liked");
        Ok(liked)
    }

    #[instrument(skip(self), fields(image_id = %id))]
    pub async fn unlike_image(&self, id: ImageId) -> Outcome<GalleryImage> {
        let credentials = self.credentials("unlike_image").await?;
        let unliked = self.inner.api.unlike_image(id, &credentials.token).await?;

        let session = self.inner.session.read().await;
        let mut images = self.inner.images.write().await;
        let mut favorites = self.inner.favorites.write().await;
        let unliked = images.get(id).cloned().unwrap_or(unliked).favorited(false);
        if session.generation() == credentials.generation {
            if images.set_favorite(id, false) {
                self.publish_images(&images);
            }
            favorites.remove(id);
        }
        info!("Image unliked");
        Ok(unliked)
    }

    // --- Internals ---

    async fn credentials(&self, operation: &'static str) -> Outcome<Credentials> {
        let session = self.inner.session.read().await;
        let (user, token) = match session.require(operation) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(operation, "mutation attempted without a session");
                return Err(e);
            }
        };
        Ok(Credentials {
            user,
            token,
            generation: session.generation(),
        })
    }

    /// Empties every cache. Callers hold the session write lock.
    async fn reset_caches(&self) {
        let mut categories = self.inner.categories.write().await;
        let mut images = self.inner.images.write().await;
        let mut favorites = self.inner.favorites.write().await;
        categories.clear();
        images.clear();
        favorites.clear();
        self.publish_categories(&categories);
        self.publish_images(&images);
    }

    fn spawn_favorites_warmup(&self) {
        let mut slot = lock(&self.inner.warmup);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let this = self.clone();
        *slot = Some(tokio::spawn(async move {
            this.prime_favorites_shadow().await;
        }));
    }

    fn abort_warmup(&self) {
        if let Some(handle) = lock(&self.inner.warmup).take() {
            handle.abort();
        }
    }

    fn publish_categories(&self, cache: &CategoryCache) {
        self.inner
            .categories_tx
            .send_replace(cache.categories().to_vec());
    }

    fn publish_images(&self, cache: &ImageCache) {
        self.inner.images_tx.send_replace(cache.images().to_vec());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ApiCall, FakeGallery};
    use crate::{GalleryError, FAVORITES_TITLE};

    const FAVORITES: CategoryId = CategoryId(100);

    fn image(id: i64, owner: i64) -> GalleryImage {
        GalleryImage::new(ImageId(id), UserId(owner), format!("img {id}"), format!("https://img/{id}.jpg"))
    }

    fn gallery() -> FakeGallery {
        FakeGallery::new()
            .with_account("alice", "secret", UserId(1))
            .with_favorites_category(FAVORITES)
            .with_category(CategoryId(1), "Voyages", UserId(1))
            .with_category(CategoryId(2), "Animaux", UserId(2))
            .with_image(CategoryId(1), image(7, 1))
            .with_image(CategoryId(1), image(8, 1))
            .with_image(CategoryId(2), image(9, 2))
    }

    fn coordinator(gallery: FakeGallery) -> SyncCoordinator<FakeGallery> {
        SyncCoordinator::new(gallery, ClientConfig::default()).unwrap()
    }

    async fn signed_in() -> SyncCoordinator<FakeGallery> {
        let coordinator = coordinator(gallery());
        coordinator
            .login("alice", &SecretString::new("secret".into()))
            .await
            .unwrap();
        coordinator
    }

    /// Signed in, categories fetched and the warm-up finished.
    async fn loaded() -> SyncCoordinator<FakeGallery> {
        let coordinator = signed_in().await;
        coordinator.fetch_categories().await.unwrap();
        coordinator.settle().await;
        coordinator
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_state() {
        let coordinator = coordinator(gallery());
        let err = coordinator
            .login("alice", &SecretString::new("wrong".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Rejected { status: 401, .. }));
        assert!(!coordinator.is_authenticated().await);
    }

    #[tokio::test]
    async fn anonymous_fetch_tags_no_favorites_and_skips_warmup() {
        let coordinator = coordinator(gallery());
        let categories = coordinator.fetch_categories().await.unwrap();
        coordinator.settle().await;

        assert_eq!(categories.len(), 3);
        assert!(categories.iter().all(|c| !c.is_favorites_category));
        assert_eq!(coordinator.api().calls(ApiCall::ListImages), 0);
    }

    #[tokio::test]
    async fn fetch_with_session_puts_favorites_first_and_primes_shadow() {
        let coordinator = signed_in().await;

        let categories = coordinator.fetch_categories().await.unwrap();
        assert_eq!(categories[0].id, FAVORITES);
        assert_eq!(categories[0].title, FAVORITES_TITLE);
        assert!(categories[0].is_favorites_category);

        coordinator.settle().await;
        assert_eq!(coordinator.api().calls(ApiCall::ListImages), 1);
    }

    #[tokio::test]
    async fn warmup_is_one_shot_per_session() {
        let coordinator = loaded().await;
        coordinator.fetch_categories().await.unwrap();
        coordinator.settle().await;

        assert_eq!(coordinator.api().calls(ApiCall::ListImages), 1);
        assert!(!coordinator.prime_favorites_shadow().await);
    }

    #[tokio::test]
    async fn failed_category_fetch_leaves_cache() {
        let coordinator = loaded().await;
        coordinator
            .api()
            .fail(ApiCall::ListCategories, GalleryError::transport("offline"));

        assert!(coordinator.fetch_categories().await.is_err());
        assert_eq!(coordinator.categories().await.len(), 3);
    }

    #[tokio::test]
    async fn select_shows_one_category_and_loads_images() {
        let coordinator = loaded().await;

        coordinator.select_category(CategoryId(2)).await.unwrap();
        let images = coordinator.select_category(CategoryId(1)).await.unwrap();

        assert_eq!(images.iter().map(|i| i.id).collect::<Vec<_>>(), vec![ImageId(7), ImageId(8)]);
        let shown: Vec<_> = coordinator
            .categories()
            .await
            .into_iter()
            .filter(|c| c.display_mode == DisplayMode::Show)
            .map(|c| c.id)
            .collect();
        assert_eq!(shown, vec![CategoryId(1)]);
    }

    #[tokio::test]
    async fn select_unknown_category_is_noop() {
        let coordinator = loaded().await;
        let before = coordinator.api().calls(ApiCall::ListImages);
        assert!(coordinator.select_category(CategoryId(404)).await.unwrap().is_empty());
        assert_eq!(coordinator.api().calls(ApiCall::ListImages), before);
    }

    #[tokio::test]
    async fn collapse_clears_images() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();

        assert!(!coordinator.collapse_category(CategoryId(2)).await);
        assert!(coordinator.collapse_category(CategoryId(1)).await);
        assert!(coordinator.images().await.is_empty());
        assert_eq!(coordinator.current_category().await, None);
    }

    async fn park_images(coordinator: &SyncCoordinator<FakeGallery>, id: CategoryId) {
        while !coordinator.api().is_parked(id) {
            tokio::task::yield_now().await;
        }
    }

    fn shown(categories: &[Category]) -> Vec<CategoryId> {
        categories
            .iter()
            .filter(|c| c.display_mode == DisplayMode::Show)
            .map(|c| c.id)
            .collect()
    }

    #[tokio::test]
    async fn late_images_of_superseded_selection_are_dropped() {
        let coordinator = loaded().await;
        coordinator.api().hold_images(CategoryId(1));

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.select_category(CategoryId(1)).await }
        });
        park_images(&coordinator, CategoryId(1)).await;

        coordinator.select_category(CategoryId(2)).await.unwrap();
        coordinator.api().release_images(CategoryId(1));
        let late = first.await.unwrap().unwrap();

        assert_eq!(late.iter().map(|i| i.id).collect::<Vec<_>>(), vec![ImageId(7), ImageId(8)]);
        assert_eq!(coordinator.current_category().await, Some(CategoryId(2)));
        assert_eq!(
            coordinator.images().await.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![ImageId(9)]
        );
        assert_eq!(shown(&coordinator.categories().await), vec![CategoryId(2)]);
    }

    #[tokio::test]
    async fn late_images_after_collapse_are_dropped() {
        let coordinator = loaded().await;
        coordinator.api().hold_images(CategoryId(1));

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.select_category(CategoryId(1)).await }
        });
        park_images(&coordinator, CategoryId(1)).await;

        assert!(coordinator.collapse_category(CategoryId(1)).await);
        coordinator.api().release_images(CategoryId(1));
        assert_eq!(pending.await.unwrap().unwrap().len(), 2);

        assert!(coordinator.images().await.is_empty());
        assert_eq!(coordinator.current_category().await, None);
        assert!(shown(&coordinator.categories().await).is_empty());
    }

    #[tokio::test]
    async fn direct_fetch_only_replaces_when_nothing_else_is_shown() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(2)).await.unwrap();

        let other = coordinator.fetch_images(CategoryId(1)).await.unwrap();
        assert_eq!(other.len(), 2);
        assert_eq!(coordinator.current_category().await, Some(CategoryId(2)));

        coordinator.collapse_category(CategoryId(2)).await;
        coordinator.fetch_images(CategoryId(1)).await.unwrap();
        assert_eq!(coordinator.current_category().await, Some(CategoryId(1)));
        assert_eq!(coordinator.images().await.len(), 2);
    }

    #[tokio::test]
    async fn fetch_across_logout_returns_reconciled_flags() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();
        coordinator.like_image(ImageId(7)).await.unwrap();
        coordinator.api().hold_images(CategoryId(1));

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.fetch_images(CategoryId(1)).await }
        });
        park_images(&coordinator, CategoryId(1)).await;

        coordinator.logout().await;
        coordinator.api().release_images(CategoryId(1));
        let images = pending.await.unwrap().unwrap();

        // The server still reports the like; the emptied shadow cache wins.
        assert!(coordinator.api().is_liked(ImageId(7)));
        assert!(images.iter().all(|i| !i.is_favorite));
        assert!(coordinator.images().await.is_empty());
    }

    #[tokio::test]
    async fn refresh_keeps_shown_category() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();

        let categories = coordinator.fetch_categories().await.unwrap();
        let voyages = categories.iter().find(|c| c.id == CategoryId(1)).unwrap();
        assert_eq!(voyages.display_mode, DisplayMode::Show);
        assert_eq!(coordinator.images().await.len(), 2);
    }

    #[tokio::test]
    async fn refresh_drops_images_of_vanished_category() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();

        // Removed behind our back by another client.
        let other = coordinator
            .api()
            .authenticate("alice", &SecretString::new("secret".into()))
            .await
            .unwrap();
        coordinator
            .api()
            .delete_category(CategoryId(1), &other.token)
            .await
            .unwrap();

        coordinator.fetch_categories().await.unwrap();
        assert!(coordinator.images().await.is_empty());
    }

    #[tokio::test]
    async fn toggle_edit_mode_targets_owned_categories() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(2)).await.unwrap();

        coordinator.toggle_edit_mode().await;
        let modes: Vec<_> = coordinator
            .categories()
            .await
            .iter()
            .map(|c| (c.id, c.display_mode))
            .collect();
        assert_eq!(
            modes,
            vec![
                (FAVORITES, DisplayMode::List),
                (CategoryId(1), DisplayMode::Edit),
                (CategoryId(2), DisplayMode::List),
            ]
        );
        assert!(coordinator.images().await.is_empty());

        coordinator.toggle_edit_mode().await;
        assert!(coordinator
            .categories()
            .await
            .iter()
            .all(|c| c.display_mode == DisplayMode::List));
    }

    #[tokio::test]
    async fn add_category_is_owned_and_listed() {
        let coordinator = loaded().await;

        let created = coordinator.add_category("Montagne").await.unwrap();
        assert_eq!(created.owner_id, UserId(1));
        assert_eq!(created.display_mode, DisplayMode::List);
        assert_eq!(coordinator.categories().await.last().unwrap().title, "Montagne");
    }

    #[tokio::test]
    async fn rename_failure_leaves_cache() {
        let coordinator = loaded().await;
        coordinator
            .api()
            .fail(ApiCall::RenameCategory, GalleryError::rejected(500, "boom"));

        assert!(coordinator.rename_category(CategoryId(1), "Nouveau").await.is_err());
        let titles: Vec<_> = coordinator.categories().await.into_iter().map(|c| c.title).collect();
        assert!(titles.contains(&"Voyages".to_string()));

        coordinator.api().heal(ApiCall::RenameCategory);
        coordinator.rename_category(CategoryId(1), "Nouveau").await.unwrap();
        let renamed = coordinator.categories().await;
        assert!(renamed.iter().any(|c| c.title == "Nouveau"));
    }

    #[tokio::test]
    async fn delete_loaded_category_clears_images() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();

        coordinator.delete_category(CategoryId(1)).await.unwrap();
        assert!(coordinator.categories().await.iter().all(|c| c.id != CategoryId(1)));
        assert!(coordinator.images().await.is_empty());
    }

    #[tokio::test]
    async fn add_image_appends_only_to_loaded_category() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();

        coordinator.add_image(CategoryId(1), "Lac", "https://img/lac.jpg").await.unwrap();
        assert_eq!(coordinator.images().await.len(), 3);

        coordinator.add_image(CategoryId(2), "Chat", "https://img/chat.jpg").await.unwrap();
        assert_eq!(coordinator.images().await.len(), 3);
    }

    #[tokio::test]
    async fn edit_caption_updates_view_and_shadow() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();
        coordinator.like_image(ImageId(7)).await.unwrap();

        coordinator.edit_image_caption(ImageId(7), "Coucher de soleil").await.unwrap();
        assert_eq!(coordinator.images().await[0].caption, "Coucher de soleil");
        assert_eq!(coordinator.favorites().await[0].caption, "Coucher de soleil");
    }

    #[tokio::test]
    async fn delete_image_also_leaves_shadow() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();
        coordinator.like_image(ImageId(8)).await.unwrap();

        coordinator.delete_image(ImageId(8)).await.unwrap();
        assert!(coordinator.images().await.iter().all(|i| i.id != ImageId(8)));
        assert!(coordinator.favorites().await.is_empty());

        // Deleting something no longer cached locally is still fine.
        assert!(coordinator.delete_image(ImageId(9)).await.is_ok());
    }

    #[tokio::test]
    async fn reassign_removes_from_current_view_only() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();

        coordinator
            .reassign_image_category(ImageId(7), CategoryId(2))
            .await
            .unwrap();
        assert_eq!(coordinator.images().await.len(), 1);
        assert_eq!(coordinator.api().image_ids(CategoryId(2)), vec![ImageId(9), ImageId(7)]);
    }

    #[tokio::test]
    async fn failed_like_touches_nothing() {
        let coordinator = loaded().await;
        coordinator.select_category(CategoryId(1)).await.unwrap();
        coordinator
            .api()
            .fail(ApiCall::LikeImage, GalleryError::transport("offline"));

        assert!(coordinator.like_image(ImageId(7)).await.is_err());
        assert!(coordinator.images().await.iter().all(|i| !i.is_favorite));
        assert!(coordinator.favorites().await.is_empty());
    }

    #[tokio::test]
    async fn observers_see_committed_snapshots() {
        let coordinator = signed_in().await;
        let mut categories_rx = coordinator.subscribe_categories();
        let mut images_rx = coordinator.subscribe_images();

        coordinator.fetch_categories().await.unwrap();
        assert!(categories_rx.has_changed().unwrap());
        assert_eq!(categories_rx.borrow_and_update().len(), 3);

        coordinator.select_category(CategoryId(1)).await.unwrap();
        assert!(images_rx.has_changed().unwrap());
        assert_eq!(images_rx.borrow_and_update().len(), 2);
    }
}
