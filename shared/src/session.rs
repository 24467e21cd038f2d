use crate::model::{AuthToken, Session, UserId};
use crate::{GalleryError, Outcome};

/// The authenticated identity, if any, plus per-session bookkeeping.
///
/// `generation` increases on every login and logout so that work started
/// under one session can tell, on completion, that it has been superseded.
#[derive(Debug, Default)]
pub struct SessionState {
    session: Option<Session>,
    generation: u64,
    favorites_primed: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, session: Session) {
        self.session = Some(session);
        self.generation = self.generation.wrapping_add(1);
        self.favorites_primed = false;
    }

    pub fn clear(&mut self) {
        self.session = None;
        self.generation = self.generation.wrapping_add(1);
        self.favorites_primed = false;
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(|s| s.user_id)
    }

    pub fn token(&self) -> Option<AuthToken> {
        self.session.as_ref().map(|s| s.token.clone())
    }

    /// Credentials for a mutating call, or `PreconditionViolation` naming `operation`.
    pub fn require(&self, operation: &'static str) -> Outcome<(UserId, AuthToken)> {
        self.session
            .as_ref()
            .map(|s| (s.user_id, s.token.clone()))
            .ok_or(GalleryError::precondition(operation))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Claims the single favorites warm-up allowed per session.
    /// Returns false if it was already claimed.
    pub fn claim_favorites_warmup(&mut self) -> bool {
        !std::mem::replace(&mut self.favorites_primed, true)
    }
}
