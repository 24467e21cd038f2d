use serde::{Deserialize, Serialize};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

typed_id!(UserId);
typed_id!(CategoryId);
typed_id!(ImageId);

// --- Auth token: redacts Debug, zeroized on drop by `secrecy` ---

pub struct AuthToken(SecretString);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for AuthToken {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned())
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

impl PartialEq for AuthToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

/// Authenticated identity returned by the service.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub user_id: UserId,
    pub token: AuthToken,
}

impl Session {
    pub fn new(user_id: UserId, token: AuthToken) -> Self {
        Self { user_id, token }
    }
}

#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    List,
    Edit,
    Show,
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub title: String,
    pub owner_id: UserId,
    pub display_mode: DisplayMode,
    pub is_favorites_category: bool,
}

impl Category {
    pub fn new(id: CategoryId, title: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            id,
            title: title.into(),
            owner_id,
            display_mode: DisplayMode::List,
            is_favorites_category: false,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }

    /// Categories the edit-mode toggle may switch into `Edit`.
    pub fn is_editable_by(&self, user_id: UserId) -> bool {
        self.is_owned_by(user_id) && !self.is_favorites_category
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GalleryImage {
    pub id: ImageId,
    pub owner_id: UserId,
    pub caption: String,
    pub url: String,
    pub is_favorite: bool,
}

impl GalleryImage {
    pub fn new(id: ImageId, owner_id: UserId, caption: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            caption: caption.into(),
            url: url.into(),
            is_favorite: false,
        }
    }

    #[must_use]
    pub fn favorited(mut self, value: bool) -> Self {
        self.is_favorite = value;
        self
    }
}
