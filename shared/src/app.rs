//! Crux shell boundary.
//!
//! The shell sends [`Event`]s, performs the HTTP and render effects the core
//! asks for, and draws the [`ViewModel`]. Requests and wire decoding come from
//! [`GalleryRoutes`] and the cache rules match
//! [`SyncCoordinator`](crate::SyncCoordinator): nothing changes until the
//! server has answered, and answers from a previous session are ignored.

use crux_core::render::Render;
use crux_http::Http;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capabilities::{HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult};
use crate::category_cache::CategoryCache;
use crate::config::ClientConfig;
use crate::event::Event;
use crate::favorites::FavoritesShadowCache;
use crate::image_cache::ImageCache;
use crate::model::{AuthToken, Category, CategoryId, DisplayMode, GalleryImage, ImageId, UserId};
use crate::remote::{
    accept, decode_categories, decode_category, decode_image, decode_images, decode_session,
    GalleryRoutes,
};
use crate::session::SessionState;
use crate::{GalleryError, Outcome};

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: Http<Event>,
    pub render: Render<Event>,
}

#[derive(Default)]
pub struct App;

#[derive(Debug, Default)]
pub struct Model {
    pub config: ClientConfig,
    pub session: SessionState,
    pub categories: CategoryCache,
    pub images: ImageCache,
    pub favorites: FavoritesShadowCache,
    pub last_error: Option<GalleryError>,
}

impl Model {
    fn reset_caches(&mut self) {
        self.categories.clear();
        self.images.clear();
        self.favorites.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewModel {
    pub user_id: Option<UserId>,
    pub categories: Vec<Category>,
    pub images: Vec<GalleryImage>,
    pub current_category: Option<CategoryId>,
    pub error: Option<String>,
}

/// Session data captured when a mutation is sent.
struct Pending {
    user: UserId,
    token: AuthToken,
    generation: u64,
    routes: GalleryRoutes,
}

impl App {
    fn routes(model: &Model) -> Outcome<GalleryRoutes> {
        Ok(GalleryRoutes::new(&model.config)?)
    }

    fn credentials(model: &Model, operation: &'static str) -> Outcome<Pending> {
        let (user, token) = model.session.require(operation)?;
        Ok(Pending {
            user,
            token,
            generation: model.session.generation(),
            routes: Self::routes(model)?,
        })
    }

    /// Credentials for a mutating event, or `None` after reporting the
    /// missing session.
    fn pending(model: &mut Model, caps: &Capabilities, operation: &'static str) -> Option<Pending> {
        match Self::credentials(model, operation) {
            Ok(pending) => Some(pending),
            Err(e) => {
                Self::fail(model, caps, operation, e);
                None
            }
        }
    }

    fn fail(model: &mut Model, caps: &Capabilities, operation: &'static str, error: GalleryError) {
        warn!(operation, error = %error, "operation failed");
        model.last_error = Some(error);
        caps.render.render();
    }

    /// Hands `request` to `crux_http`; the result comes back as `make_event(result)`.
    fn send<F>(model: &mut Model, caps: &Capabilities, request: Outcome<HttpRequest>, make_event: F)
    where
        F: Fn(HttpResult) -> Event + Send + 'static,
    {
        let request = match request {
            Ok(request) => request,
            Err(e) => return Self::fail(model, caps, "build_request", e),
        };

        let url = request.url().as_str();
        let mut builder = match request.method() {
            HttpMethod::Get => caps.http.get(url),
            HttpMethod::Post => caps.http.post(url),
            HttpMethod::Put => caps.http.put(url),
            HttpMethod::Delete => caps.http.delete(url),
        };
        for (name, value) in request.headers().iter() {
            builder = builder.header(name, value);
        }

        let host = request.url().host().to_owned();
        let request_id = request.request_id().to_owned();
        debug!(method = request.method().as_str(), path = request.url().path(), %request_id, "sending request");
        builder.send(move |result| {
            let result = match result {
                Ok(mut response) => {
                    let status: u16 = response.status().into();
                    let body = response.take_body().unwrap_or_default();
                    Ok(HttpResponse::new(status, HttpHeaders::new(), body, request_id.clone()))
                }
                Err(e) => Err(HttpError::ConnectionError {
                    host: host.clone(),
                    message: e.to_string(),
                }),
            };
            make_event(result)
        });
    }

    fn fetch_images(model: &mut Model, caps: &Capabilities, category: CategoryId, selected: bool) {
        let generation = model.session.generation();
        let request = Self::routes(model).and_then(|routes| routes.list_images(category));
        Self::send(model, caps, request, move |result| Event::ImagesResponse {
            category,
            selected,
            generation,
            result: Box::new(result),
        });
    }

    /// One-shot, best-effort fill of the shadow cache after a category refresh.
    fn prime_favorites(model: &mut Model, caps: &Capabilities) {
        if !model.session.is_authenticated() || !model.favorites.is_empty() {
            return;
        }
        let Some(favorites_id) = model.categories.favorites_id() else {
            return;
        };
        if !model.session.claim_favorites_warmup() {
            return;
        }
        let generation = model.session.generation();
        match Self::routes(model).and_then(|routes| routes.list_images(favorites_id)) {
            Ok(request) => Self::send(model, caps, Ok(request), move |result| Event::FavoritesPrimed {
                generation,
                result: Box::new(result),
            }),
            Err(e) => debug!(error = %e, "favorites warm-up skipped"),
        }
    }

    fn set_liked(model: &mut Model, caps: &Capabilities, image: ImageId, liked: bool) {
        let operation = if liked { "like_image" } else { "unlike_image" };
        let Some(pending) = Self::pending(model, caps, operation) else {
            return;
        };
        let generation = pending.generation;
        let request = pending.routes.set_liked(image, liked, &pending.token);
        Self::send(model, caps, request, move |result| Event::LikeResponse {
            generation,
            image,
            liked,
            result: Box::new(result),
        });
    }

    fn apply_categories(model: &mut Model, fetched: Vec<Category>) {
        let session_active = model.session.is_authenticated();
        let previously_shown = model.categories.shown();
        model
            .categories
            .replace_all(fetched, &model.config.favorites_title, session_active);

        if let Some(shown) = previously_shown {
            if !model.categories.set_display_mode(shown, DisplayMode::Show)
                && model.images.current_category() == Some(shown)
            {
                model.images.clear();
            }
        }
        info!(count = model.categories.len(), "Categories refreshed");
    }

    fn apply_images(
        model: &mut Model,
        category: CategoryId,
        selected: bool,
        generation: u64,
        result: Outcome<Vec<GalleryImage>>,
    ) -> Outcome<()> {
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) if model.categories.favorites_id() == Some(category) && !model.favorites.is_empty() => {
                warn!(error = %e, count = model.favorites.len(), "Favorites fetch failed, serving shadow cache");
                model.favorites.all().to_vec()
            }
            Err(e) => return Err(e),
        };

        if generation != model.session.generation() {
            debug!("session changed during image fetch, result dropped");
            return Ok(());
        }
        let shown = model.categories.shown();
        if shown == Some(category) || (!selected && shown.is_none()) {
            model.images.replace_current(category, fetched, &model.favorites);
            info!(count = model.images.len(), "Images loaded");
        } else {
            debug!(shown = ?shown, "category no longer shown, result dropped");
        }
        Ok(())
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[allow(clippy::too_many_lines)]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(event = event.name(), "update");
        if event.is_user_initiated() {
            model.last_error = None;
        }

        match event {
            Event::Configure { config } => {
                match config.validate() {
                    Ok(()) => model.config = config,
                    Err(e) => return Self::fail(model, caps, "configure", e.into()),
                }
                caps.render.render();
            }

            // --- Session ---
            Event::Login { username, password } => {
                let request = Self::routes(model).and_then(|routes| routes.authenticate(&username, &password));
                Self::send(model, caps, request, |result| Event::LoginResponse {
                    result: Box::new(result),
                });
            }
            Event::LoginResponse { result } => {
                match accept(*result).and_then(|response| decode_session(&response)) {
                    Ok(session) => {
                        info!(user_id = %session.user_id, "Session started");
                        model.session.begin(session);
                        model.reset_caches();
                        caps.render.render();
                    }
                    Err(e) => Self::fail(model, caps, "login", e),
                }
            }
            Event::Logout => {
                model.session.clear();
                model.reset_caches();
                info!("Session cleared");
                caps.render.render();
            }

            // --- Categories ---
            Event::FetchCategories => {
                let generation = model.session.generation();
                let token = model.session.token();
                let request = Self::routes(model).and_then(|routes| routes.list_categories(token.as_ref()));
                Self::send(model, caps, request, move |result| Event::CategoriesResponse {
                    generation,
                    result: Box::new(result),
                });
            }
            Event::CategoriesResponse { generation, result } => {
                let fetched = match accept(*result).and_then(|response| decode_categories(&response)) {
                    Ok(fetched) => fetched,
                    Err(e) => return Self::fail(model, caps, "fetch_categories", e),
                };
                if generation != model.session.generation() {
                    debug!("session changed during category fetch, result dropped");
                    return;
                }
                Self::apply_categories(model, fetched);
                Self::prime_favorites(model, caps);
                caps.render.render();
            }
            Event::FavoritesPrimed { generation, result } => {
                match accept(*result).and_then(|response| decode_images(&response)) {
                    Ok(images) if generation == model.session.generation() && model.favorites.is_empty() => {
                        model.favorites.replace_all(images);
                        info!(count = model.favorites.len(), "Favorites shadow cache primed");
                    }
                    Ok(_) => debug!("favorites warm-up result dropped"),
                    Err(e) => debug!(error = %e, "favorites warm-up failed"),
                }
            }
            Event::SelectCategory { category } => {
                if !model.categories.set_display_mode(category, DisplayMode::Show) {
                    return;
                }
                caps.render.render();
                Self::fetch_images(model, caps, category, true);
            }
            Event::CollapseCategory { category } => {
                if model.categories.shown() != Some(category) {
                    debug!("collapse skipped, category not shown");
                    return;
                }
                model.categories.set_display_mode(category, DisplayMode::List);
                model.images.clear();
                caps.render.render();
            }
            Event::ToggleEditMode => {
                model.categories.toggle_edit_mode(model.session.user_id());
                model.images.clear();
                caps.render.render();
            }
            Event::AddCategory { title } => {
                let Some(pending) = Self::pending(model, caps, "add_category") else {
                    return;
                };
                let (user, generation) = (pending.user, pending.generation);
                let request = pending.routes.create_category(&title, &pending.token);
                Self::send(model, caps, request, move |result| Event::CategoryCreated {
                    generation,
                    user,
                    result: Box::new(result),
                });
            }
            Event::CategoryCreated { generation, user, result } => {
                let mut created = match accept(*result).and_then(|response| decode_category(&response)) {
                    Ok(created) => created,
                    Err(e) => return Self::fail(model, caps, "add_category", e),
                };
                created.owner_id = user;
                created.display_mode = DisplayMode::List;
                created.is_favorites_category = false;
                if generation == model.session.generation() {
                    info!(category_id = %created.id, "Category created");
                    model.categories.upsert_on_create(created);
                    caps.render.render();
                }
            }
            Event::RenameCategory { category, title } => {
                let Some(pending) = Self::pending(model, caps, "rename_category") else {
                    return;
                };
                let generation = pending.generation;
                let request = pending.routes.rename_category(category, &title, &pending.token);
                Self::send(model, caps, request, move |result| Event::CategoryRenamed {
                    generation,
                    category,
                    title: title.clone(),
                    result: Box::new(result),
                });
            }
            Event::CategoryRenamed { generation, category, title, result } => {
                if let Err(e) = accept(*result) {
                    return Self::fail(model, caps, "rename_category", e);
                }
                if generation == model.session.generation() && model.categories.rename_by_id(category, &title) {
                    caps.render.render();
                }
            }
            Event::DeleteCategory { category } => {
                let Some(pending) = Self::pending(model, caps, "delete_category") else {
                    return;
                };
                let generation = pending.generation;
                let request = pending.routes.delete_category(category, &pending.token);
                Self::send(model, caps, request, move |result| Event::CategoryDeleted {
                    generation,
                    category,
                    result: Box::new(result),
                });
            }
            Event::CategoryDeleted { generation, category, result } => {
                if let Err(e) = accept(*result) {
                    return Self::fail(model, caps, "delete_category", e);
                }
                if generation == model.session.generation() {
                    model.categories.remove_by_id(category);
                    if model.images.current_category() == Some(category) {
                        model.images.clear();
                    }
                    caps.render.render();
                }
            }

            // --- Images ---
            Event::FetchImages { category } => Self::fetch_images(model, caps, category, false),
            Event::ImagesResponse { category, selected, generation, result } => {
                let fetched = accept(*result).and_then(|response| decode_images(&response));
                match Self::apply_images(model, category, selected, generation, fetched) {
                    Ok(()) => caps.render.render(),
                    Err(e) => Self::fail(model, caps, "fetch_images", e),
                }
            }
            Event::AddImage { category, caption, url } => {
                let Some(pending) = Self::pending(model, caps, "add_image") else {
                    return;
                };
                let generation = pending.generation;
                let request = pending.routes.add_image(category, &caption, &url, &pending.token);
                Self::send(model, caps, request, move |result| Event::ImageAdded {
                    generation,
                    category,
                    result: Box::new(result),
                });
            }
            Event::ImageAdded { generation, category, result } => {
                let added = match accept(*result).and_then(|response| decode_image(&response)) {
                    Ok(added) => added,
                    Err(e) => return Self::fail(model, caps, "add_image", e),
                };
                let liked = model.favorites.contains(added.id);
                if generation == model.session.generation() && model.images.current_category() == Some(category) {
                    model.images.append(added.favorited(liked));
                    caps.render.render();
                }
            }
            Event::EditImageCaption { image, caption } => {
                let Some(pending) = Self::pending(model, caps, "edit_image_caption") else {
                    return;
                };
                let generation = pending.generation;
                let request = pending.routes.edit_image_caption(image, &caption, &pending.token);
                Self::send(model, caps, request, move |result| Event::CaptionEdited {
                    generation,
                    image,
                    result: Box::new(result),
                });
            }
            Event::CaptionEdited { generation, image, result } => {
                let edited = match accept(*result).and_then(|response| decode_image(&response)) {
                    Ok(edited) => edited,
                    Err(e) => return Self::fail(model, caps, "edit_image_caption", e),
                };
                if generation == model.session.generation() {
                    model.images.update_caption(image, &edited.caption);
                    model.favorites.update_caption(image, &edited.caption);
                    caps.render.render();
                }
            }
            Event::DeleteImage { image } => {
                let Some(pending) = Self::pending(model, caps, "delete_image") else {
                    return;
                };
                let generation = pending.generation;
                let request = pending.routes.delete_image(image, &pending.token);
                Self::send(model, caps, request, move |result| Event::ImageDeleted {
                    generation,
                    image,
                    result: Box::new(result),
                });
            }
            Event::ImageDeleted { generation, image, result } => {
                if let Err(e) = accept(*result) {
                    return Self::fail(model, caps, "delete_image", e);
                }
                if generation == model.session.generation() {
                    model.images.remove_by_id(image);
                    model.favorites.remove(image);
                    caps.render.render();
                }
            }
            Event::ReassignImageCategory { image, category } => {
                let Some(pending) = Self::pending(model, caps, "reassign_image_category") else {
                    return;
                };
                let generation = pending.generation;
                let request = pending.routes.reassign_image_category(image, category, &pending.token);
                Self::send(model, caps, request, move |result| Event::ImageReassigned {
                    generation,
                    image,
                    result: Box::new(result),
                });
            }
            Event::ImageReassigned { generation, image, result } => {
                if let Err(e) = accept(*result).and_then(|response| decode_image(&response)) {
                    return Self::fail(model, caps, "reassign_image_category", e);
                }
                if generation == model.session.generation() && model.images.remove_by_id(image) {
                    caps.render.render();
                }
            }
            Event::LikeImage { image } => Self::set_liked(model, caps, image, true),
            Event::UnlikeImage { image } => Self::set_liked(model, caps, image, false),
            Event::LikeResponse { generation, image, liked, result } => {
                let operation = if liked { "like_image" } else { "unlike_image" };
                let remote = match accept(*result).and_then(|response| decode_image(&response)) {
                    Ok(remote) => remote,
                    Err(e) => return Self::fail(model, caps, operation, e),
                };
                if generation != model.session.generation() {
                    return;
                }
                let local = model.images.get(image).cloned().unwrap_or(remote).favorited(liked);
                model.images.set_favorite(image, liked);
                if liked {
                    model.favorites.add(local);
                } else {
                    model.favorites.remove(image);
                }
                caps.render.render();
            }
        }
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel {
            user_id: model.session.user_id(),
            categories: model.categories.categories().to_vec(),
            images: model.images.images().to_vec(),
            current_category: model.images.current_category(),
            error: model.last_error.as_ref().map(ToString::to_string),
        }
    }
}
