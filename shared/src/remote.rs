//! Typed access to the gallery service.
//!
//! [`GalleryApi`] is the contract the coordinator consumes; [`RemoteClient`]
//! implements it over an async [`HttpTransport`]. [`GalleryRoutes`] and the
//! `decode_*` functions are shared with the crux shell boundary, so both
//! paths speak the same wire format. Every call resolves to an [`Outcome`]:
//! transport errors, non-2xx statuses and undecodable bodies all come back as
//! values. Nothing here retries.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument, warn};

use crate::capabilities::{
    HttpMethod, HttpRequest, HttpResponse, HttpResult, HttpTransport, ValidatedUrl,
};
use crate::config::{ClientConfig, ConfigError};
use crate::model::{AuthToken, Category, CategoryId, GalleryImage, ImageId, Session, UserId};
use crate::{GalleryError, Outcome};

#[async_trait::async_trait]
pub trait GalleryApi: Send + Sync {
    async fn authenticate(&self, username: &str, password: &SecretString) -> Outcome<Session>;

    /// Anonymous listing when `token` is `None`.
    async fn list_categories(&self, token: Option<&AuthToken>) -> Outcome<Vec<Category>>;

    async fn list_images(&self, category: CategoryId) -> Outcome<Vec<GalleryImage>>;

    async fn create_category(&self, title: &str, token: &AuthToken) -> Outcome<Category>;

    async fn rename_category(
        &self,
        id: CategoryId,
        title: &str,
        token: &AuthToken,
    ) -> Outcome<()>;

    async fn delete_category(&self, id: CategoryId, token: &AuthToken) -> Outcome<()>;

    async fn add_image(
        &self,
        category: CategoryId,
        caption: &str,
        url: &str,
        token: &AuthToken,
    ) -> Outcome<GalleryImage>;

    async fn edit_image_caption(
        &self,
        id: ImageId,
        caption: &str,
        token: &AuthToken,
    ) -> Outcome<GalleryImage>;

    async fn delete_image(&self, id: ImageId, token: &AuthToken) -> Outcome<()>;

    async fn like_image(&self, id: ImageId, token: &AuthToken) -> Outcome<GalleryImage>;

    async fn unlike_image(&self, id: ImageId, token: &AuthToken) -> Outcome<GalleryImage>;

    async fn reassign_image_category(
        &self,
        id: ImageId,
        category: CategoryId,
        token: &AuthToken,
    ) -> Outcome<GalleryImage>;
}

// --- Wire DTOs ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginDto {
    id_user: i64,
    hash: String,
}

#[derive(Debug, Deserialize)]
struct CategoryListDto {
    categories: Vec<CategoryDto>,
}

#[derive(Debug, Deserialize)]
struct SingleCategoryDto {
    categorie: CategoryDto,
}

#[derive(Debug, Deserialize)]
struct CategoryDto {
    id: i64,
    titre: String,
    #[serde(rename = "idUser", default)]
    id_user: Option<i64>,
    #[serde(default, deserialize_with = "lenient_flag")]
    coupdecoeur: bool,
}

impl From<CategoryDto> for Category {
    fn from(dto: CategoryDto) -> Self {
        let mut category = Category::new(
            CategoryId(dto.id),
            dto.titre,
            UserId(dto.id_user.unwrap_or_default()),
        );
        category.is_favorites_category = dto.coupdecoeur;
        category
    }
}

#[derive(Debug, Deserialize)]
struct ImageListDto {
    images: Vec<ImageDto>,
}

#[derive(Debug, Deserialize)]
struct SingleImageDto {
    image: ImageDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageDto {
    id: i64,
    #[serde(default)]
    id_user: i64,
    #[serde(default)]
    legende: Option<String>,
    url: String,
    #[serde(default, deserialize_with = "lenient_flag")]
    is_liked: bool,
}

impl From<ImageDto> for GalleryImage {
    fn from(dto: ImageDto) -> Self {
        GalleryImage::new(
            ImageId(dto.id),
            UserId(dto.id_user),
            dto.legende.unwrap_or_default(),
            dto.url,
        )
        .favorited(dto.is_liked)
    }
}

/// The service encodes booleans as `true`, `1` or `"1"` depending on the endpoint.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(serde_json::Value::String(s)) => matches!(s.as_str(), "1" | "true"),
        _ => false,
    })
}

// --- Routes ---

/// Builds the request for each endpoint. Used by [`RemoteClient`] and by the
/// crux [`App`](crate::App), which hands the same requests to `crux_http`.
#[derive(Debug, Clone)]
pub struct GalleryRoutes {
    base: ValidatedUrl,
    auth_header: String,
    timeout_ms: u64,
}

impl GalleryRoutes {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            base: config.base_url()?,
            auth_header: config.auth_header.clone(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    pub fn authenticate(&self, username: &str, password: &SecretString) -> Outcome<HttpRequest> {
        self.request(
            HttpMethod::Post,
            "authenticate",
            &[("user", username), ("password", password.expose_secret().as_str())],
            None,
        )
    }

    /// Anonymous listing when `token` is `None`.
    pub fn list_categories(&self, token: Option<&AuthToken>) -> Outcome<HttpRequest> {
        self.request(HttpMethod::Get, "categories", &[], token)
    }

    pub fn list_images(&self, category: CategoryId) -> Outcome<HttpRequest> {
        let path = format!("categories/{category}/images");
        self.request(HttpMethod::Get, &path, &[], None)
    }

    pub fn create_category(&self, title: &str, token: &AuthToken) -> Outcome<HttpRequest> {
        self.request(HttpMethod::Post, "categories", &[("titre", title)], Some(token))
    }

    pub fn rename_category(&self, id: CategoryId, title: &str, token: &AuthToken) -> Outcome<HttpRequest> {
        let path = format!("categories/{id}");
        self.request(HttpMethod::Put, &path, &[("titre", title)], Some(token))
    }

    pub fn delete_category(&self, id: CategoryId, token: &AuthToken) -> Outcome<HttpRequest> {
        // This endpoint reads the token from the query string, not the header.
        let path = format!("categories/{id}");
        self.request(
            HttpMethod::Delete,
            &path,
            &[(self.auth_header.as_str(), token.expose())],
            None,
        )
    }

    pub fn add_image(
        &self,
        category: CategoryId,
        caption: &str,
        url: &str,
        token: &AuthToken,
    ) -> Outcome<HttpRequest> {
        let path = format!("categories/{category}/images");
        self.request(
            HttpMethod::Post,
            &path,
            &[("legende", caption), ("url", url)],
            Some(token),
        )
    }

    pub fn edit_image_caption(&self, id: ImageId, caption: &str, token: &AuthToken) -> Outcome<HttpRequest> {
        let path = format!("images/{id}");
        self.request(HttpMethod::Put, &path, &[("legende", caption)], Some(token))
    }

    pub fn delete_image(&self, id: ImageId, token: &AuthToken) -> Outcome<HttpRequest> {
        let path = format!("images/{id}");
        self.request(HttpMethod::Delete, &path, &[], Some(token))
    }

    /// `PUT` likes, `DELETE` unlikes.
    pub fn set_liked(&self, id: ImageId, liked: bool, token: &AuthToken) -> Outcome<HttpRequest> {
        let path = format!("images/{id}/coupdecoeur");
        let method = if liked { HttpMethod::Put } else { HttpMethod::Delete };
        self.request(method, &path, &[], Some(token))
    }

    pub fn reassign_image_category(
        &self,
        id: ImageId,
        category: CategoryId,
        token: &AuthToken,
    ) -> Outcome<HttpRequest> {
        let path = format!("images/{id}");
        let category = category.to_string();
        self.request(
            HttpMethod::Put,
            &path,
            &[("idCategorie", category.as_str())],
            Some(token),
        )
    }

    fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, &str)],
        token: Option<&AuthToken>,
    ) -> Outcome<HttpRequest> {
        let url = self.base.join(path, query)?;
        let mut request = HttpRequest::new(method, url).with_timeout_ms(self.timeout_ms)?;
        if let Some(token) = token {
            request = request.with_header(self.auth_header.as_str(), token.expose())?;
        }
        Ok(request)
    }
}

// --- Responses ---

/// Keeps 2xx responses; anything else becomes the error it stands for.
pub fn accept(result: HttpResult) -> Outcome<HttpResponse> {
    match result {
        Ok(response) if response.is_success() => Ok(response),
        Ok(response) => Err(GalleryError::from_status(response.status(), Some(response.body()))),
        Err(e) => Err(e.into()),
    }
}

fn decode<R: DeserializeOwned>(response: &HttpResponse) -> Outcome<R> {
    response
        .json::<R>()
        .map_err(|e| GalleryError::malformed(e.to_string()))
}

pub fn decode_session(response: &HttpResponse) -> Outcome<Session> {
    let dto: LoginDto = decode(response)?;
    Ok(Session::new(UserId(dto.id_user), AuthToken::new(dto.hash)))
}

pub fn decode_categories(response: &HttpResponse) -> Outcome<Vec<Category>> {
    let dto: CategoryListDto = decode(response)?;
    Ok(dto.categories.into_iter().map(Category::from).collect())
}

pub fn decode_category(response: &HttpResponse) -> Outcome<Category> {
    let dto: SingleCategoryDto = decode(response)?;
    Ok(dto.categorie.into())
}

pub fn decode_images(response: &HttpResponse) -> Outcome<Vec<GalleryImage>> {
    let dto: ImageListDto = decode(response)?;
    Ok(dto.images.into_iter().map(GalleryImage::from).collect())
}

pub fn decode_image(response: &HttpResponse) -> Outcome<GalleryImage> {
    let dto: SingleImageDto = decode(response)?;
    Ok(dto.image.into())
}

// --- HTTP implementation ---

/// [`GalleryApi`] over an async [`HttpTransport`].
pub struct RemoteClient<T> {
    transport: T,
    routes: GalleryRoutes,
}

impl<T: HttpTransport> RemoteClient<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            transport,
            routes: GalleryRoutes::new(config)?,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send(&self, request: HttpRequest) -> Outcome<HttpResponse> {
        let method = request.method().as_str();
        let path = request.url().path().to_owned();
        let request_id = request.request_id().to_owned();
        debug!(method, %path, %request_id, "sending request");

        let result = self.transport.execute(request).await;
        match &result {
            Ok(response) if !response.is_success() => {
                warn!(method, %path, %request_id, status = response.status(), "request rejected");
            }
            Err(e) => warn!(method, %path, %request_id, error = %e, "request failed without response"),
            Ok(_) => {}
        }
        accept(result)
    }
}

#[async_trait::async_trait]
impl<T: HttpTransport> GalleryApi for RemoteClient<T> {
    #[instrument(skip(self, password))]
    async fn authenticate(&self, username: &str, password: &SecretString) -> Outcome<Session> {
        let request = self.routes.authenticate(username, password)?;
        decode_session(&self.send(request).await?)
    }

    #[instrument(skip(self, token), fields(authenticated = token.is_some()))]
    async fn list_categories(&self, token: Option<&AuthToken>) -> Outcome<Vec<Category>> {
        let request = self.routes.list_categories(token)?;
        decode_categories(&self.send(request).await?)
    }

    #[instrument(skip(self))]
    async fn list_images(&self, category: CategoryId) -> Outcome<Vec<GalleryImage>> {
        let request = self.routes.list_images(category)?;
        decode_images(&self.send(request).await?)
    }

    #[instrument(skip(self, token))]
    async fn create_category(&self, title: &str, token: &AuthToken) -> Outcome<Category> {
        let request = self.routes.create_category(title, token)?;
        decode_category(&self.send(request).await?)
    }

    #[instrument(skip(self, token))]
    async fn rename_category(
        &self,
        id: CategoryId,
        title: &str,
        token: &AuthToken,
    ) -> Outcome<()> {
        let request = self.routes.rename_category(id, title, token)?;
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, token))]
    async fn delete_category(&self, id: CategoryId, token: &AuthToken) -> Outcome<()> {
        let request = self.routes.delete_category(id, token)?;
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, token, url))]
    async fn add_image(
        &self,
        category: CategoryId,
        caption: &str,
        url: &str,
        token: &AuthToken,
    ) -> Outcome<GalleryImage> {
        let request = self.routes.add_image(category, caption, url, token)?;
        decode_image(&self.send(request).await?)
    }

    #[instrument(skip(self, token))]
    async fn edit_image_caption(
        &self,
        id: ImageId,
        caption: &str,
        token: &AuthToken,
    ) -> Outcome<GalleryImage> {
        let request = self.routes.edit_image_caption(id, caption, token)?;
        decode_image(&self.send(request).await?)
    }

    #[instrument(skip(self, token))]
    async fn delete_image(&self, id: ImageId, token: &AuthToken) -> Outcome<()> {
        let request = self.routes.delete_image(id, token)?;
        self.send(request).await.map(drop)
    }

    #[instrument(skip(self, token))]
    async fn like_image(&self, id: ImageId, token: &AuthToken) -> Outcome<GalleryImage> {
        let request = self.routes.set_liked(id, true, token)?;
        decode_image(&self.send(request).await?)
    }

    #[instrument(skip(self, token))]
    async fn unlike_image(&self, id: ImageId, token: &AuthToken) -> Outcome<GalleryImage> {
        let request = self.routes.set_liked(id, false, token)?;
        decode_image(&self.send(request).await?)
    }

    #[instrument(skip(self, token))]
    async fn reassign_image_category(
        &self,
        id: ImageId,
        category: CategoryId,
        token: &AuthToken,
    ) -> Outcome<GalleryImage> {
        let request = self.routes.reassign_image_category(id, category, token)?;
        decode_image(&self.send(request).await?)
    }
}
