use secrecy::SecretString;
use serde::Deserialize;

use crate::capabilities::HttpResult;
use crate::config::ClientConfig;
use crate::model::{CategoryId, ImageId, UserId};

/// Everything that drives the [`App`](crate::App).
///
/// Shells send the user-initiated variants as JSON tagged by `type`, e.g.
/// `{"type": "like_image", "image": 7}`. The response variants carry HTTP
/// results back from `crux_http`; they are never deserialized, so a shell
/// cannot forge one.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Configure {
        config: ClientConfig,
    },
    Login {
        username: String,
        password: SecretString,
    },
    Logout,
    FetchCategories,
    FetchImages {
        category: CategoryId,
    },
    SelectCategory {
        category: CategoryId,
    },
    CollapseCategory {
        category: CategoryId,
    },
    ToggleEditMode,
    AddCategory {
        title: String,
    },
    RenameCategory {
        category: CategoryId,
        title: String,
    },
    DeleteCategory {
        category: CategoryId,
    },
    AddImage {
        category: CategoryId,
        caption: String,
        url: String,
    },
    EditImageCaption {
        image: ImageId,
        caption: String,
    },
    DeleteImage {
        image: ImageId,
    },
    ReassignImageCategory {
        image: ImageId,
        category: CategoryId,
    },
    LikeImage {
        image: ImageId,
    },
    UnlikeImage {
        image: ImageId,
    },

    // --- HTTP responses ---
    #[serde(skip)]
    LoginResponse {
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    CategoriesResponse {
        generation: u64,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    FavoritesPrimed {
        generation: u64,
        result: Box<HttpResult>,
    },
    /// `selected` is set when the request came from `SelectCategory`.
    #[serde(skip)]
    ImagesResponse {
        category: CategoryId,
        selected: bool,
        generation: u64,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    CategoryCreated {
        generation: u64,
        user: UserId,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    CategoryRenamed {
        generation: u64,
        category: CategoryId,
        title: String,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    CategoryDeleted {
        generation: u64,
        category: CategoryId,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    ImageAdded {
        generation: u64,
        category: CategoryId,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    CaptionEdited {
        generation: u64,
        image: ImageId,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    ImageDeleted {
        generation: u64,
        image: ImageId,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    ImageReassigned {
        generation: u64,
        image: ImageId,
        result: Box<HttpResult>,
    },
    #[serde(skip)]
    LikeResponse {
        generation: u64,
        image: ImageId,
        liked: bool,
        result: Box<HttpResult>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::FetchCategories => "fetch_categories",
            Self::FetchImages { .. } => "fetch_images",
            Self::SelectCategory { .. } => "select_category",
            Self::CollapseCategory { .. } => "collapse_category",
            Self::ToggleEditMode => "toggle_edit_mode",
            Self::AddCategory { .. } => "add_category",
            Self::RenameCategory { .. } => "rename_category",
            Self::DeleteCategory { .. } => "delete_category",
            Self::AddImage { .. } => "add_image",
            Self::EditImageCaption { .. } => "edit_image_caption",
            Self::DeleteImage { .. } => "delete_image",
            Self::ReassignImageCategory { .. } => "reassign_image_category",
            Self::LikeImage { .. } => "like_image",
            Self::UnlikeImage { .. } => "unlike_image",
            Self::LoginResponse { .. } => "login_response",
            Self::CategoriesResponse { .. } => "categories_response",
            Self::FavoritesPrimed { .. } => "favorites_primed",
            Self::ImagesResponse { .. } => "images_response",
            Self::CategoryCreated { .. } => "category_created",
            Self::CategoryRenamed { .. } => "category_renamed",
            Self::CategoryDeleted { .. } => "category_deleted",
            Self::ImageAdded { .. } => "image_added",
            Self::CaptionEdited { .. } => "caption_edited",
            Self::ImageDeleted { .. } => "image_deleted",
            Self::ImageReassigned { .. } => "image_reassigned",
            Self::LikeResponse { .. } => "like_response",
        }
    }

    /// Sent by the shell rather than produced by a completed request.
    pub fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::LoginResponse { .. }
                | Self::CategoriesResponse { .. }
                | Self::FavoritesPrimed { .. }
                | Self::ImagesResponse { .. }
                | Self::CategoryCreated { .. }
                | Self::CategoryRenamed { .. }
                | Self::CategoryDeleted { .. }
                | Self::ImageAdded { .. }
                | Self::CaptionEdited { .. }
                | Self::ImageDeleted { .. }
                | Self::ImageReassigned { .. }
                | Self::LikeResponse { .. }
        )
    }

    /// Whether this event needs an authenticated session.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::AddCategory { .. }
                | Self::RenameCategory { .. }
                | Self::DeleteCategory { .. }
                | Self::AddImage { .. }
                | Self::EditImageCaption { .. }
                | Self::DeleteImage { .. }
                | Self::ReassignImageCategory { .. }
                | Self::LikeImage { .. }
                | Self::UnlikeImage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn parses_tagged_events() {
        let event: Event = serde_json::from_value(json!({
            "type": "reassign_image_category", "image": 4, "category": 9
        }))
        .unwrap();
        assert!(matches!(
            event,
            Event::ReassignImageCategory {
                image: ImageId(4),
                category: CategoryId(9)
            }
        ));

        let event: Event = serde_json::from_value(json!({"type": "toggle_edit_mode"})).unwrap();
        assert!(matches!(event, Event::ToggleEditMode));
    }

    #[test]
    fn configure_accepts_partial_config() {
        let event: Event = serde_json::from_value(json!({
            "type": "configure", "config": {"base_url": "https://gallery.example.com/api/"}
        }))
        .unwrap();
        let Event::Configure { config } = event else {
            panic!("expected configure");
        };
        assert_eq!(config.base_url, "https://gallery.example.com/api/");
        assert_eq!(config.auth_header, "hash");
    }

    #[test]
    fn login_password_is_redacted() {
        let event: Event = serde_json::from_value(json!({
            "type": "login", "username": "alice", "password": "hunter2"
        }))
        .unwrap();
        assert!(!format!("{event:?}").contains("hunter2"));
        let Event::Login { password, .. } = event else {
            panic!("expected login");
        };
        assert_eq!(password.expose_secret(), "hunter2");
    }

    #[test]
    fn shells_cannot_send_responses() {
        assert!(serde_json::from_value::<Event>(json!({"type": "format_disk"})).is_err());
        assert!(serde_json::from_value::<Event>(json!({
            "type": "categories_response", "generation": 1, "result": {"Ok": null}
        }))
        .is_err());
    }

    #[test]
    fn classification() {
        assert!(Event::LikeImage { image: ImageId(1) }.is_mutation());
        assert!(!Event::FetchCategories.is_mutation());
        assert!(!Event::Logout.is_mutation());
        assert!(Event::Logout.is_user_initiated());

        let response = Event::LoginResponse {
            result: Box::new(Err(crate::capabilities::HttpError::Cancelled {
                request_id: "r".into(),
            })),
        };
        assert!(!response.is_user_initiated());
        assert_eq!(response.name(), "login_response");
    }
}
