use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Source of the signed-in user. Sign-in itself happens elsewhere; the data
/// access layer only asks who, if anyone, is currently authenticated.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;
}

/// Session holder whose user is set and cleared by the host application.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<AuthUser>>,
}

impl StaticSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: AuthUser) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: AuthUser) {
        info!(target: "app::session", user_id = %user.id, "session started");
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn sign_out(&self) {
        info!(target: "app::session", "session ended");
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<AuthUser> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub type SharedSession = Arc<dyn SessionProvider>;

pub fn require_user(session: &dyn SessionProvider) -> AppResult<AuthUser> {
    match session.current_user() {
        Some(user) => {
            debug!(target: "app::session", user_id = %user.id, "session verified");
            Ok(user)
        }
        None => Err(AppError::unauthorized()),
    }
}
