//! In-process stand-ins for the network, used by the test suites and by demo
//! shells that want to run without a server.
//!
//! [`ScriptedTransport`] sits below [`RemoteClient`](crate::RemoteClient) and
//! replays canned HTTP responses. [`FakeGallery`] replaces the whole
//! [`GalleryApi`] with an in-memory service and supports failure injection per
//! call.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Semaphore;

use crate::capabilities::{HttpError, HttpHeaders, HttpRequest, HttpResponse, HttpResult, HttpTransport};
use crate::model::{AuthToken, Category, CategoryId, GalleryImage, ImageId, Session, UserId};
use crate::remote::GalleryApi;
use crate::{GalleryError, Outcome, FAVORITES_TITLE};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Scripted transport ---

/// Replays queued responses in order and records every request it receives.
/// An exhausted script answers with a connection error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<HttpResult>>,
    received: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        let body = serde_json::to_vec(&body).unwrap_or_default();
        lock(&self.script).push_back(Ok(HttpResponse::new(
            status,
            HttpHeaders::new(),
            body,
            String::new(),
        )));
    }

    pub fn push_status(&self, status: u16) {
        lock(&self.script).push_back(Ok(HttpResponse::new(
            status,
            HttpHeaders::new(),
            Vec::new(),
            String::new(),
        )));
    }

    pub fn push_error(&self, error: HttpError) {
        lock(&self.script).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.received).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        let request_id = request.request_id().to_owned();
        let host = request.url().host().to_owned();
        lock(&self.received).push(request);

        match lock(&self.script).pop_front() {
            Some(Ok(response)) => Ok(HttpResponse::new(
                response.status(),
                response.headers().clone(),
                response.body().to_vec(),
                request_id,
            )),
            Some(Err(error)) => Err(error),
            None => Err(HttpError::ConnectionError {
                host,
                message: "no scripted response left".into(),
            }),
        }
    }
}

// --- In-memory gallery ---

/// Names each [`GalleryApi`] method, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    Authenticate,
    ListCategories,
    ListImages,
    CreateCategory,
    RenameCategory,
    DeleteCategory,
    AddImage,
    EditImageCaption,
    DeleteImage,
    LikeImage,
    UnlikeImage,
    ReassignImageCategory,
}

#[derive(Debug, Default)]
struct FakeState {
    accounts: HashMap<String, (String, UserId)>,
    tokens: HashMap<String, UserId>,
    categories: Vec<Category>,
    images: HashMap<CategoryId, Vec<GalleryImage>>,
    liked: HashSet<ImageId>,
    favorites_category: Option<CategoryId>,
    next_id: i64,
    failures: HashMap<ApiCall, GalleryError>,
    calls: HashMap<ApiCall, usize>,
}

impl FakeState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_for(&self, token: &AuthToken) -> Outcome<UserId> {
        self.tokens
            .get(token.expose())
            .copied()
            .ok_or_else(|| GalleryError::rejected(401, "invalid token"))
    }

    fn category(&self, id: CategoryId) -> Outcome<&Category> {
        self.categories
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| GalleryError::rejected(404, format!("category {id} not found")))
    }

    fn owned_category(&mut self, id: CategoryId, user: UserId) -> Outcome<&mut Category> {
        let category = self
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| GalleryError::rejected(404, format!("category {id} not found")))?;
        if category.owner_id != user {
            return Err(GalleryError::rejected(403, "not the category owner"));
        }
        Ok(category)
    }

    fn locate_image(&self, id: ImageId) -> Outcome<(CategoryId, usize)> {
        self.images
            .iter()
            .find_map(|(category, images)| {
                images
                    .iter()
                    .position(|i| i.id == id)
                    .map(|index| (*category, index))
            })
            .ok_or_else(|| GalleryError::rejected(404, format!("image {id} not found")))
    }

    fn image(&self, id: ImageId) -> Outcome<GalleryImage> {
        let (category, index) = self.locate_image(id)?;
        Ok(self.images[&category][index]
            .clone()
            .favorited(self.liked.contains(&id)))
    }

    fn image_mut(&mut self, id: ImageId) -> Outcome<&mut GalleryImage> {
        let (category, index) = self.locate_image(id)?;
        self.images
            .get_mut(&category)
            .and_then(|images| images.get_mut(index))
            .ok_or_else(|| GalleryError::rejected(404, format!("image {id} not found")))
    }
}

/// An in-memory gallery service.
///
/// Seed it with accounts, categories and images, then hand it to a
/// [`SyncCoordinator`](crate::SyncCoordinator). Each [`ApiCall`] can be made to
/// fail with a chosen error until [`heal`](Self::heal) is called, and every
/// call is counted whether or not it fails.
#[derive(Debug, Default)]
pub struct FakeGallery {
    state: Mutex<FakeState>,
    held: Mutex<HashMap<CategoryId, Arc<Semaphore>>>,
}

impl FakeGallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, username: &str, password: &str, user: UserId) -> Self {
        lock(&self.state)
            .accounts
            .insert(username.to_owned(), (password.to_owned(), user));
        self
    }

    pub fn with_category(self, id: CategoryId, title: &str, owner: UserId) -> Self {
        {
            let mut state = lock(&self.state);
            state.next_id = state.next_id.max(id.get());
            state.categories.push(Category::new(id, title, owner));
            state.images.entry(id).or_default();
        }
        self
    }

    /// Adds the server-managed favorites category. Its image list is derived
    /// from liked images, never stored.
    pub fn with_favorites_category(self, id: CategoryId) -> Self {
        let this = self.with_category(id, FAVORITES_TITLE, UserId(0));
        lock(&this.state).favorites_category = Some(id);
        this
    }

    pub fn with_image(self, category: CategoryId, image: GalleryImage) -> Self {
        {
            let mut state = lock(&self.state);
            state.next_id = state.next_id.max(image.id.get());
            if image.is_favorite {
                state.liked.insert(image.id);
            }
            state
                .images
                .entry(category)
                .or_default()
                .push(image.favorited(false));
        }
        self
    }

    /// Makes every subsequent `call` fail with `error`.
    pub fn fail(&self, call: ApiCall, error: GalleryError) {
        lock(&self.state).failures.insert(call, error);
    }

    pub fn heal(&self, call: ApiCall) {
        lock(&self.state).failures.remove(&call);
    }

    /// Parks every `list_images(category)` until [`release_images`](Self::release_images).
    pub fn hold_images(&self, category: CategoryId) {
        lock(&self.held).insert(category, Arc::new(Semaphore::new(0)));
    }

    /// True once a `list_images(category)` call is waiting on the hold.
    pub fn is_parked(&self, category: CategoryId) -> bool {
        lock(&self.held)
            .get(&category)
            .is_some_and(|gate| Arc::strong_count(gate) > 1)
    }

    /// Lets parked and future `list_images(category)` calls through.
    pub fn release_images(&self, category: CategoryId) {
        if let Some(gate) = lock(&self.held).remove(&category) {
            gate.close();
        }
    }

    pub fn calls(&self, call: ApiCall) -> usize {
        lock(&self.state).calls.get(&call).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.values().sum()
    }

    pub fn is_liked(&self, id: ImageId) -> bool {
        lock(&self.state).liked.contains(&id)
    }

    pub fn category_titles(&self) -> Vec<String> {
        lock(&self.state)
            .categories
            .iter()
            .map(|c| c.title.clone())
            .collect()
    }

    pub fn image_ids(&self, category: CategoryId) -> Vec<ImageId> {
        lock(&self.state)
            .images
            .get(&category)
            .map(|images| images.iter().map(|i| i.id).collect())
            .unwrap_or_default()
    }

    /// Counts the call, applies any injected failure, then runs `op` on the state.
    fn serve<R>(&self, call: ApiCall, op: impl FnOnce(&mut FakeState) -> Outcome<R>) -> Outcome<R> {
        let mut state = lock(&self.state);
        *state.calls.entry(call).or_default() += 1;
        if let Some(error) = state.failures.get(&call) {
            return Err(error.clone());
        }
        op(&mut state)
    }
}

#[async_trait::async_trait]
impl GalleryApi for FakeGallery {
    async fn authenticate(&self, username: &str, password: &SecretString) -> Outcome<Session> {
        self.serve(ApiCall::Authenticate, |state| {
            let user = match state.accounts.get(username) {
                Some((expected, user)) if expected == password.expose_secret() => *user,
                _ => return Err(GalleryError::rejected(401, "bad credentials")),
            };
            let token = format!("token-{user}-{}", state.next_id());
            state.tokens.insert(token.clone(), user);
            Ok(Session::new(user, AuthToken::new(token)))
        })
    }

    async fn list_categories(&self, _token: Option<&AuthToken>) -> Outcome<Vec<Category>> {
        self.serve(ApiCall::ListCategories, |state| Ok(state.categories.clone()))
    }

    async fn list_images(&self, category: CategoryId) -> Outcome<Vec<GalleryImage>> {
        let gate = lock(&self.held).get(&category).cloned();
        if let Some(gate) = gate {
            // A closed gate fails the acquire; that is the release signal.
            let _ = gate.acquire().await;
        }
        self.serve(ApiCall::ListImages, |state| {
            state.category(category)?;
            if state.favorites_category == Some(category) {
                let mut liked: Vec<_> = state
                    .images
                    .values()
                    .flatten()
                    .filter(|i| state.liked.contains(&i.id))
                    .map(|i| i.clone().favorited(true))
                    .collect();
                liked.sort_by_key(|i| i.id);
                return Ok(liked);
            }
            Ok(state
                .images
                .get(&category)
                .map(|images| {
                    images
                        .iter()
                        .map(|i| i.clone().favorited(state.liked.contains(&i.id)))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    async fn create_category(&self, title: &str, token: &AuthToken) -> Outcome<Category> {
        self.serve(ApiCall::CreateCategory, |state| {
            let user = state.user_for(token)?;
            let id = CategoryId(state.next_id());
            let category = Category::new(id, title, user);
            state.categories.push(category.clone());
            state.images.insert(id, Vec::new());
            Ok(category)
        })
    }

    async fn rename_category(
        &self,
        id: CategoryId,
        title: &str,
        token: &AuthToken,
    ) -> Outcome<()> {
        self.serve(ApiCall::RenameCategory, |state| {
            let user = state.user_for(token)?;
            state.owned_category(id, user)?.title = title.to_owned();
            Ok(())
        })
    }

    async fn delete_category(&self, id: CategoryId, token: &AuthToken) -> Outcome<()> {
        self.serve(ApiCall::DeleteCategory, |state| {
            let user = state.user_for(token)?;
            state.owned_category(id, user)?;
            state.categories.retain(|c| c.id != id);
            if let Some(images) = state.images.remove(&id) {
                for image in images {
                    state.liked.remove(&image.id);
                }
            }
            Ok(())
        })
    }

    async fn add_image(
        &self,
        category: CategoryId,
        caption: &str,
        url: &str,
        token: &AuthToken,
    ) -> Outcome<GalleryImage> {
        self.serve(ApiCall::AddImage, |state| {
            let user = state.user_for(token)?;
            state.category(category)?;
            let image = GalleryImage::new(ImageId(state.next_id()), user, caption, url);
            state.images.entry(category).or_default().push(image.clone());
            Ok(image)
        })
    }

    async fn edit_image_caption(
        &self,
        id: ImageId,
        caption: &str,
        token: &AuthToken,
    ) -> Outcome<GalleryImage> {
        self.serve(ApiCall::EditImageCaption, |state| {
            state.user_for(token)?;
            state.image_mut(id)?.caption = caption.to_owned();
            state.image(id)
        })
    }

    async fn delete_image(&self, id: ImageId, token: &AuthToken) -> Outcome<()> {
        self.serve(ApiCall::DeleteImage, |state| {
            state.user_for(token)?;
            let (category, index) = state.locate_image(id)?;
            if let Some(images) = state.images.get_mut(&category) {
                images.remove(index);
            }
            state.liked.remove(&id);
            Ok(())
        })
    }

    async fn like_image(&self, id: ImageId, token: &AuthToken) -> Outcome<GalleryImage> {
        self.serve(ApiCall::LikeImage, |state| {
            state.user_for(token)?;
            state.locate_image(id)?;
            state.liked.insert(id);
            state.image(id)
        })
    }

    async fn unlike_image(&self, id: ImageId, token: &AuthToken) -> Outcome<GalleryImage> {
        self.serve(ApiCall::UnlikeImage, |state| {
            state.user_for(token)?;
            state.locate_image(id)?;
            state.liked.remove(&id);
            state.image(id)
        })
    }

    async fn reassign_image_category(
        &self,
        id: ImageId,
        category: CategoryId,
        token: &AuthToken,
    ) -> Outcome<GalleryImage> {
        self.serve(ApiCall::ReassignImageCategory, |state| {
            state.user_for(token)?;
            state.category(category)?;
            let (from, index) = state.locate_image(id)?;
            let image = state
                .images
                .get_mut(&from)
                .map(|images| images.remove(index))
                .ok_or_else(|| GalleryError::rejected(404, format!("image {id} not found")))?;
            state.images.entry(category).or_default().push(image);
            state.image(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery() -> FakeGallery {
        FakeGallery::new()
            .with_account("alice", "secret", UserId(1))
            .with_favorites_category(CategoryId(100))
            .with_category(CategoryId(1), "Voyages", UserId(1))
            .with_image(
                CategoryId(1),
                GalleryImage::new(ImageId(7), UserId(1), "Plage", "https://img/7.jpg"),
            )
    }

    async fn login(gallery: &FakeGallery) -> Session {
        gallery
            .authenticate("alice", &SecretString::new("secret".into()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let gallery = gallery();
        let err = gallery
            .authenticate("alice", &SecretString::new("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn favorites_listing_follows_likes() {
        let gallery = gallery();
        let session = login(&gallery).await;

        assert!(gallery.list_images(CategoryId(100)).await.unwrap().is_empty());
        gallery.like_image(ImageId(7), &session.token).await.unwrap();

        let favorites = gallery.list_images(CategoryId(100)).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert!(favorites[0].is_favorite);
    }

    #[tokio::test]
    async fn injected_failure_persists_until_healed() {
        let gallery = gallery();
        gallery.fail(ApiCall::ListImages, GalleryError::transport("offline"));

        assert!(gallery.list_images(CategoryId(1)).await.is_err());
        assert!(gallery.list_images(CategoryId(1)).await.is_err());
        gallery.heal(ApiCall::ListImages);
        assert!(gallery.list_images(CategoryId(1)).await.is_ok());
        assert_eq!(gallery.calls(ApiCall::ListImages), 3);
    }

    #[tokio::test]
    async fn rename_requires_ownership() {
        let gallery = gallery().with_category(CategoryId(2), "Autre", UserId(9));
        let session = login(&gallery).await;

        let err = gallery
            .rename_category(CategoryId(2), "Mine", &session.token)
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn reassign_moves_image() {
        let gallery = gallery().with_category(CategoryId(2), "Autre", UserId(1));
        let session = login(&gallery).await;

        gallery
            .reassign_image_category(ImageId(7), CategoryId(2), &session.token)
            .await
            .unwrap();
        assert!(gallery.image_ids(CategoryId(1)).is_empty());
        assert_eq!(gallery.image_ids(CategoryId(2)), vec![ImageId(7)]);
    }

    #[tokio::test]
    async fn held_listing_waits_for_release() {
        let gallery = std::sync::Arc::new(gallery());
        gallery.hold_images(CategoryId(1));

        let parked = tokio::spawn({
            let gallery = std::sync::Arc::clone(&gallery);
            async move { gallery.list_images(CategoryId(1)).await }
        });
        while !gallery.is_parked(CategoryId(1)) {
            tokio::task::yield_now().await;
        }
        assert!(!parked.is_finished());
        assert_eq!(gallery.calls(ApiCall::ListImages), 0);

        gallery.release_images(CategoryId(1));
        assert_eq!(parked.await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scripted_transport_runs_dry_with_connection_error() {
        let transport = ScriptedTransport::new();
        let url = crate::capabilities::ValidatedUrl::new("https://example.com/").unwrap();
        let err = transport.execute(HttpRequest::new(crate::capabilities::HttpMethod::Get, url)).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(transport.remaining(), 0);
    }
}
