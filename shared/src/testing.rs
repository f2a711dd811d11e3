//! In-memory collaborators for driving the gallery in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

use crate::error::{AppError, AppResult, ErrorKind};
use crate::model::{GenerationId, GenerationRecord, Preferences, Profile, UnixTimeMs, UserId};
use crate::repository::{GenerationsRepository, ProfileRepository};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Public record with a predictable prompt and URL derived from `id`.
#[must_use]
pub fn record(id: &str, created_at: u64) -> GenerationRecord {
    GenerationRecord {
        id: GenerationId::new(id),
        user_id: None,
        training_id: None,
        prompt: format!("prompt {id}"),
        url: format!("https://cdn.example.com/{id}.png"),
        created_at: UnixTimeMs(created_at),
        is_public: true,
        parent_generation_id: None,
    }
}

/// `count` records named `{prefix}{n}`, newest first, starting at `newest`.
#[must_use]
pub fn records(prefix: &str, count: u64, newest: u64) -> Vec<GenerationRecord> {
    (0..count)
        .map(|n| record(&format!("{prefix}{n}"), newest.saturating_sub(n)))
        .collect()
}

/// Releases calls parked on a gated repository, one permit per call.
#[derive(Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
}

impl Gate {
    fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            entered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn release(&self, calls: usize) {
        self.permits.add_permits(calls);
    }

    /// Calls currently parked or already let through.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Yields until `calls` callers have reached the gate.
    pub async fn wait_entered(&self, calls: usize) {
        while self.entered() < calls {
            tokio::task::yield_now().await;
        }
    }

    async fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// Answers with queued responses; an empty queue answers with no records.
#[derive(Default)]
pub struct ScriptedGenerations {
    pages: Mutex<VecDeque<AppResult<Vec<GenerationRecord>>>>,
    after: Mutex<VecDeque<AppResult<Vec<GenerationRecord>>>>,
    page_calls: Mutex<Vec<(u32, u32)>>,
    after_calls: Mutex<Vec<UnixTimeMs>>,
    gate: Option<Gate>,
}

impl ScriptedGenerations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call parks until the returned gate releases it.
    #[must_use]
    pub fn gated() -> (Self, Gate) {
        let gate = Gate::new();
        let repo = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (repo, gate)
    }

    pub fn push_page(&self, response: AppResult<Vec<GenerationRecord>>) {
        lock(&self.pages).push_back(response);
    }

    pub fn push_after(&self, response: AppResult<Vec<GenerationRecord>>) {
        lock(&self.after).push_back(response);
    }

    #[must_use]
    pub fn page_calls(&self) -> Vec<(u32, u32)> {
        lock(&self.page_calls).clone()
    }

    #[must_use]
    pub fn after_calls(&self) -> Vec<UnixTimeMs> {
        lock(&self.after_calls).clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
    }
}

#[async_trait::async_trait]
impl GenerationsRepository for ScriptedGenerations {
    async fn public_page(&self, page: u32, limit: u32) -> AppResult<Vec<GenerationRecord>> {
        lock(&self.page_calls).push((page, limit));
        self.pass_gate().await;
        lock(&self.pages).pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn public_after(&self, cursor: UnixTimeMs) -> AppResult<Vec<GenerationRecord>> {
        lock(&self.after_calls).push(cursor);
        self.pass_gate().await;
        lock(&self.after).pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    profiles: Mutex<HashMap<UserId, Profile>>,
    fail_loads: AtomicBool,
    fail_updates: AtomicBool,
    load_calls: AtomicUsize,
    updates: Mutex<Vec<(UserId, Preferences)>>,
}

impl MemoryProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_profile(profile: Profile) -> Self {
        let profiles = Self::new();
        profiles.insert(profile);
        profiles
    }

    pub fn insert(&self, profile: Profile) {
        lock(&self.profiles).insert(profile.user_id.clone(), profile);
    }

    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<Profile> {
        lock(&self.profiles).get(user_id).cloned()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn updates(&self) -> Vec<(UserId, Preferences)> {
        lock(&self.updates).clone()
    }
}

#[async_trait::async_trait]
impl ProfileRepository for MemoryProfiles {
    async fn load_profile(&self, user_id: &UserId) -> AppResult<Option<Profile>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AppError::new(ErrorKind::Network, "profile unavailable"));
        }
        Ok(self.get(user_id))
    }

    async fn update_preferences(
        &self,
        user_id: &UserId,
        preferences: &Preferences,
    ) -> AppResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::new(ErrorKind::Server, "profile write rejected"));
        }
        lock(&self.updates).push((user_id.clone(), preferences.clone()));
        if let Some(profile) = lock(&self.profiles).get_mut(user_id) {
            profile.preferences = preferences.clone();
        }
        Ok(())
    }
}
