//! Public gallery controller.
//!
//! Owns the published [`GalleryState`], runs forward pagination and backward
//! refresh against the repositories, and applies optimistic local edits. All
//! writes go through one `watch::Sender`, so observers only ever see whole
//! snapshots and precondition checks are atomic with the flag they set.

mod state;

pub use state::GalleryState;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigError, GalleryConfig};
use crate::error::{AppError, AppResult, Cancelled};
use crate::model::{GenerationId, GenerationRecord, Preferences, UserId};
use crate::repository::{GenerationsRepository, ProfileRepository};
use crate::session::{AuthSession, AuthStatus};

/// What the user did on the gallery screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GalleryIntent {
    Appeared,
    PullToRefresh,
    ScrolledTo { last_visible_index: usize },
    DismissErrorPopup,
    DismissTooltip,
}

/// Seed handed to the generate screen when a public photo is tapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSeed {
    pub generation_id: GenerationId,
    pub text: String,
    pub url: String,
}

pub struct GalleryController<G, P> {
    generations: Arc<G>,
    profiles: Arc<P>,
    session: AuthSession,
    config: GalleryConfig,
    state: watch::Sender<GalleryState>,
    closed: watch::Sender<bool>,
}

impl<G, P> GalleryController<G, P>
where
    G: GenerationsRepository + 'static,
    P: ProfileRepository + 'static,
{
    pub fn new(
        generations: Arc<G>,
        profiles: Arc<P>,
        session: AuthSession,
        config: GalleryConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(GalleryState::new());
        let (closed, _) = watch::channel(false);
        Ok(Self {
            generations,
            profiles,
            session,
            config,
            state,
            closed,
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GalleryState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> GalleryState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Tears the controller down. In-flight fetches stop at their next await
    /// and leave the error fields alone; later calls return [`Cancelled`].
    pub fn shutdown(&self) {
        if !self.closed.send_replace(true) {
            info!("gallery controller shut down");
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn ensure_open(&self) -> Result<(), Cancelled> {
        if self.is_closed() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    fn apply(&self, transition: impl FnOnce(&GalleryState) -> GalleryState) {
        self.state.send_modify(|state| *state = transition(state));
    }

    fn try_apply(&self, transition: impl FnOnce(&GalleryState) -> Option<GalleryState>) -> bool {
        self.state.send_if_modified(|state| match transition(state) {
            Some(next) => {
                *state = next;
                true
            }
            None => false,
        })
    }

    // Test-and-set: the precondition check and the in-flight flag land in
    // the same write.
    fn claim<T>(&self, transition: impl FnOnce(&GalleryState) -> Option<(GalleryState, T)>) -> Option<T> {
        let mut claimed = None;
        self.state.send_if_modified(|state| match transition(state) {
            Some((next, value)) => {
                *state = next;
                claimed = Some(value);
                true
            }
            None => false,
        });
        claimed
    }

    async fn until_closed<T>(
        &self,
        operation: impl Future<Output = AppResult<T>>,
    ) -> Result<AppResult<T>, Cancelled> {
        tokio::select! {
            biased;
            () = wait_closed(self.closed.subscribe()) => Err(Cancelled),
            result = operation => match result {
                Err(error) if error.is_cancelled() => Err(Cancelled),
                other => Ok(other),
            },
        }
    }

    /// Fetches the page at the cursor and appends it.
    ///
    /// No-op while a forward fetch is running or once an empty page has been
    /// seen. Failures land in `loading_error`.
    #[instrument(skip(self))]
    pub async fn load_next_page(&self) -> Result<(), Cancelled> {
        self.ensure_open()?;
        let Some(page) = self.claim(GalleryState::begin_next_page) else {
            debug!("next page skipped");
            return Ok(());
        };

        info!(page, limit = self.config.page_size, "loading public gallery page");
        let fetched = self
            .until_closed(self.generations.public_page(page, self.config.page_size))
            .await;

        match fetched {
            Err(cancelled) => {
                debug!(page, "next page cancelled");
                self.apply(GalleryState::next_page_aborted);
                return Err(cancelled);
            }
            Ok(Ok(records)) => {
                info!(page, count = records.len(), "public gallery page loaded");
                if records.is_empty() {
                    info!(page, "end of public gallery reached");
                }
                self.apply(|state| state.next_page_loaded(records));
            }
            Ok(Err(e)) => {
                error!(page, error = %e, "loading public gallery page failed");
                self.apply(|state| state.next_page_failed(e));
            }
        }
        Ok(())
    }

    /// Pulls generations newer than the newest shown photo and prepends them.
    ///
    /// Requires at least one photo. A silent refresh never shows the spinner.
    /// Failures land in `error_popup`.
    #[instrument(skip(self))]
    pub async fn refresh(&self, silent: bool) -> Result<(), Cancelled> {
        self.ensure_open()?;
        let Some(cursor) = self.claim(|state| state.begin_refresh(silent)) else {
            debug!("refresh skipped");
            return Ok(());
        };

        info!(cursor = cursor.0, "refreshing public gallery");
        let fetched = self
            .until_closed(self.generations.public_after(cursor))
            .await;

        match fetched {
            Err(cancelled) => {
                debug!("refresh cancelled");
                self.apply(GalleryState::refresh_aborted);
                return Err(cancelled);
            }
            Ok(Ok(records)) => {
                info!(count = records.len(), "public gallery refreshed");
                self.apply(|state| state.refreshed(records));
            }
            Ok(Err(e)) => {
                error!(error = %e, "refreshing public gallery failed");
                self.apply(|state| state.refresh_failed(e));
            }
        }
        Ok(())
    }

    /// Merges freshly created generations in, keeping what is already shown
    /// on id collisions, and re-sorts newest first.
    pub fn add_local(&self, records: &[GenerationRecord]) {
        if self.try_apply(|state| state.with_local_additions(records)) {
            debug!(count = records.len(), "local generations added");
        }
    }

    pub fn remove_local(&self, ids: &HashSet<GenerationId>) {
        if self.try_apply(|state| state.without_ids(ids)) {
            debug!(count = ids.len(), "local generations removed");
        }
    }

    pub fn hide_error_popup(&self) {
        self.try_apply(GalleryState::error_popup_dismissed);
    }

    /// Shows or hides the tooltip. Hiding also records that the user has seen
    /// it, in a detached task whose failure is only logged.
    ///
    /// # Panics
    ///
    /// Hiding with a signed-in user spawns onto the current Tokio runtime and
    /// panics when called outside one.
    pub fn toggle_tooltip(&self, show: bool) -> Option<JoinHandle<()>> {
        self.apply(|state| state.with_tooltip(show));
        if show {
            return None;
        }
        let Some(user_id) = self.session.current_user() else {
            debug!("no signed-in user, tooltip flag not saved");
            return None;
        };

        let profiles = Arc::clone(&self.profiles);
        let closed = self.closed.subscribe();
        Some(tokio::spawn(async move {
            tokio::select! {
                biased;
                () = wait_closed(closed) => debug!("tooltip flag save cancelled"),
                saved = mark_tooltip_shown(profiles.as_ref(), &user_id) => {
                    if let Err(e) = saved {
                        warn!(user_id = %user_id, error = %e, "saving tooltip flag failed");
                    }
                }
            }
        }))
    }

    /// Reads the signed-in user's preferences and shows the tooltip if it
    /// has not been seen yet.
    pub async fn load_profile(&self) -> Result<(), Cancelled> {
        self.ensure_open()?;
        match self.session.current_user() {
            Some(user_id) => self.load_profile_for(&user_id).await,
            None => Ok(()),
        }
    }

    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    async fn load_profile_for(&self, user_id: &UserId) -> Result<(), Cancelled> {
        match self.until_closed(self.profiles.load_profile(user_id)).await? {
            Ok(profile) => {
                let seen = profile.is_some_and(|p| p.preferences.public_tooltip_shown);
                if !seen {
                    self.toggle_tooltip(true);
                }
            }
            Err(e) => {
                error!(error = %e, "loading profile failed");
                self.apply(|state| state.with_error_popup(e));
            }
        }
        Ok(())
    }

    /// First load for a signed-in user. Profile and first page load
    /// concurrently when there is nothing on screen yet or the user changed.
    #[instrument(skip(self, user_id), fields(user_id = %user_id))]
    pub async fn initialize_for_user(
        &self,
        user_id: &UserId,
        user_changed: bool,
    ) -> Result<(), Cancelled> {
        self.ensure_open()?;
        let has_photos = !self.state.borrow().photos.is_empty();
        if has_photos {
            self.apply(GalleryState::content_ready);
        }
        if user_changed || !has_photos {
            let (profile, page) =
                tokio::join!(self.load_profile_for(user_id), self.load_next_page());
            profile?;
            page?;
        }
        Ok(())
    }

    pub fn on_auth_initializing(&self) {
        self.apply(GalleryState::auth_initializing);
    }

    pub async fn on_authenticated(
        &self,
        user_id: &UserId,
        user_changed: bool,
    ) -> Result<(), Cancelled> {
        self.initialize_for_user(user_id, user_changed).await
    }

    pub fn on_auth_error(&self, error: AppError) {
        warn!(error = %error, "authentication failed");
        self.apply(|state| state.auth_failed(error));
    }

    /// Follows the session and forwards each status change to the auth hooks
    /// until shutdown. A load cancelled by a collaborator does not stop it.
    ///
    /// # Panics
    ///
    /// Spawns onto the current Tokio runtime and panics when called outside one.
    pub fn attach_session(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut status = self.session.subscribe();
        tokio::spawn(async move {
            let mut last_user: Option<UserId> = None;
            loop {
                let current = status.borrow_and_update().clone();
                match current {
                    AuthStatus::Initializing => controller.on_auth_initializing(),
                    AuthStatus::Authenticated(user_id) => {
                        let user_changed = last_user.as_ref() != Some(&user_id);
                        last_user = Some(user_id.clone());
                        if controller
                            .on_authenticated(&user_id, user_changed)
                            .await
                            .is_err()
                        {
                            if controller.is_closed() {
                                break;
                            }
                            debug!(user_id = %user_id, "initial load cancelled by a collaborator");
                        }
                    }
                    AuthStatus::Failed(e) => controller.on_auth_error(e),
                    AuthStatus::SignedOut => {}
                }

                tokio::select! {
                    biased;
                    () = wait_closed(controller.closed.subscribe()) => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("session listener stopped");
        })
    }

    /// Whether scrolling to `last_visible_index` should fetch another page.
    #[must_use]
    pub fn should_load_next_page(&self, last_visible_index: usize) -> bool {
        let state = self.state.borrow();
        !state.is_loading_next_page
            && !state.paging_limit_reach
            && last_visible_index.saturating_add(self.config.prefetch_threshold)
                >= state.photos.len()
    }

    #[must_use]
    pub fn prompt_for(&self, id: &GenerationId) -> Option<PromptSeed> {
        self.state
            .borrow()
            .photos
            .iter()
            .find(|photo| &photo.id == id)
            .map(|photo| PromptSeed {
                generation_id: photo.id.clone(),
                text: photo.prompt.clone(),
                url: photo.url.clone(),
            })
    }

    /// Dispatches a screen event. Fetches run on spawned tasks; the handle is
    /// returned so hosts and tests can await them.
    ///
    /// # Panics
    ///
    /// Every intent except `DismissErrorPopup` may spawn onto the current
    /// Tokio runtime and panics when called outside one.
    pub fn handle_intent(self: &Arc<Self>, intent: GalleryIntent) -> Option<JoinHandle<()>> {
        debug!(?intent, "gallery intent");
        match intent {
            GalleryIntent::Appeared => Some(self.spawn_refresh(true)),
            GalleryIntent::PullToRefresh => Some(self.spawn_refresh(false)),
            GalleryIntent::ScrolledTo { last_visible_index } => {
                if !self.should_load_next_page(last_visible_index) {
                    return None;
                }
                let controller = Arc::clone(self);
                Some(tokio::spawn(async move {
                    if controller.load_next_page().await.is_err() {
                        debug!("scroll-triggered page load cancelled");
                    }
                }))
            }
            GalleryIntent::DismissErrorPopup => {
                self.hide_error_popup();
                None
            }
            GalleryIntent::DismissTooltip => self.toggle_tooltip(false),
        }
    }

    fn spawn_refresh(self: &Arc<Self>, silent: bool) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if controller.refresh(silent).await.is_err() {
                debug!(silent, "refresh cancelled");
            }
        })
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    // A dropped sender means the controller itself is gone.
    let _ = closed.wait_for(|closed| *closed).await;
}

async fn mark_tooltip_shown<P: ProfileRepository + ?Sized>(
    profiles: &P,
    user_id: &UserId,
) -> AppResult<()> {
    let Some(profile) = profiles.load_profile(user_id).await? else {
        return Ok(());
    };
    let preferences = Preferences {
        public_tooltip_shown: true,
        ..profile.preferences
    };
    profiles.update_preferences(user_id, &preferences).await
}
