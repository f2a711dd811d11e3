//! Data sources the gallery pulls from.
//!
//! Implementations live in the host shell (database client, auth-aware REST
//! wrappers). The core only sees these traits.

use crate::error::AppResult;
use crate::model::{GenerationRecord, Preferences, Profile, UnixTimeMs, UserId};

#[async_trait::async_trait]
pub trait GenerationsRepository: Send + Sync {
    /// One page of the public gallery, newest first. `page` is zero-based.
    async fn public_page(&self, page: u32, limit: u32) -> AppResult<Vec<GenerationRecord>>;

    /// Public generations strictly newer than `cursor`, newest first.
    async fn public_after(&self, cursor: UnixTimeMs) -> AppResult<Vec<GenerationRecord>>;
}

#[async_trait::async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load_profile(&self, user_id: &UserId) -> AppResult<Option<Profile>>;

    async fn update_preferences(&self, user_id: &UserId, preferences: &Preferences)
        -> AppResult<()>;
}
