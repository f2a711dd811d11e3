use std::collections::HashSet;

use crate::error::AppError;
use crate::model::{GenerationId, GenerationRecord, Photo, UnixTimeMs};

/// Snapshot of everything the public gallery screen renders.
///
/// Transitions never mutate a snapshot in place: each one builds the next
/// value and the controller publishes it whole.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryState {
    pub photos: Vec<Photo>,
    /// Zero-based index of the next page to request.
    pub page: u32,
    pub is_loading: bool,
    pub is_loading_next_page: bool,
    /// Drives the pull-to-refresh spinner; stays false during silent refreshes.
    pub is_refreshing: bool,
    pub paging_limit_reach: bool,
    pub loading_error: Option<AppError>,
    pub error_popup: Option<AppError>,
    pub show_tooltip_popup: bool,
    pub(crate) refresh_in_flight: bool,
}

impl Default for GalleryState {
    fn default() -> Self {
        Self {
            photos: Vec::new(),
            page: 0,
            is_loading: true,
            is_loading_next_page: false,
            is_refreshing: false,
            paging_limit_reach: false,
            loading_error: None,
            error_popup: None,
            show_tooltip_popup: false,
            refresh_in_flight: false,
        }
    }
}

impl GalleryState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while any refresh, silent or not, is awaiting the repository.
    #[must_use]
    pub fn is_refresh_in_flight(&self) -> bool {
        self.refresh_in_flight
    }

    #[must_use]
    pub fn newest_created_at(&self) -> Option<UnixTimeMs> {
        self.photos.first().map(|photo| photo.created_at)
    }

    // --- forward pagination ---

    pub(crate) fn begin_next_page(&self) -> Option<(Self, u32)> {
        if self.is_loading_next_page || self.paging_limit_reach {
            return None;
        }
        let next = Self {
            is_loading_next_page: true,
            ..self.clone()
        };
        Some((next, self.page))
    }

    pub(crate) fn next_page_loaded(&self, records: Vec<GenerationRecord>) -> Self {
        let reached_end = records.is_empty();
        let photos = dedupe_by_id(
            self.photos
                .iter()
                .cloned()
                .chain(records.into_iter().map(Photo::from)),
        );
        Self {
            photos,
            page: self.page + 1,
            paging_limit_reach: self.paging_limit_reach || reached_end,
            loading_error: None,
            is_loading_next_page: false,
            is_loading: false,
            ..self.clone()
        }
    }

    pub(crate) fn next_page_failed(&self, error: AppError) -> Self {
        Self {
            is_loading_next_page: false,
            loading_error: Some(error),
            ..self.clone()
        }
    }

    pub(crate) fn next_page_aborted(&self) -> Self {
        Self {
            is_loading_next_page: false,
            ..self.clone()
        }
    }

    // --- backward refresh ---

    pub(crate) fn begin_refresh(&self, silent: bool) -> Option<(Self, UnixTimeMs)> {
        if self.refresh_in_flight || self.is_refreshing {
            return None;
        }
        let cursor = self.newest_created_at()?;
        let next = Self {
            is_refreshing: !silent,
            refresh_in_flight: true,
            ..self.clone()
        };
        Some((next, cursor))
    }

    pub(crate) fn refreshed(&self, records: Vec<GenerationRecord>) -> Self {
        let photos = dedupe_by_id(
            records
                .into_iter()
                .map(Photo::from)
                .chain(self.photos.iter().cloned()),
        );
        Self {
            photos,
            is_refreshing: false,
            refresh_in_flight: false,
            loading_error: None,
            ..self.clone()
        }
    }

    pub(crate) fn refresh_failed(&self, error: AppError) -> Self {
        Self {
            is_refreshing: false,
            refresh_in_flight: false,
            error_popup: Some(error),
            ..self.clone()
        }
    }

    pub(crate) fn refresh_aborted(&self) -> Self {
        Self {
            is_refreshing: false,
            refresh_in_flight: false,
            ..self.clone()
        }
    }

    // --- optimistic local mutation ---

    pub(crate) fn with_local_additions(&self, records: &[GenerationRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let mut photos = dedupe_by_id(
            self.photos
                .iter()
                .cloned()
                .chain(records.iter().map(Photo::from)),
        );
        photos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Some(Self {
            photos,
            ..self.clone()
        })
    }

    pub(crate) fn without_ids(&self, ids: &HashSet<GenerationId>) -> Option<Self> {
        if !self.photos.iter().any(|photo| ids.contains(&photo.id)) {
            return None;
        }
        let photos = self
            .photos
            .iter()
            .filter(|photo| !ids.contains(&photo.id))
            .cloned()
            .collect();
        Some(Self {
            photos,
            ..self.clone()
        })
    }

    // --- popups and auth lifecycle ---

    pub(crate) fn with_tooltip(&self, show: bool) -> Self {
        Self {
            show_tooltip_popup: show,
            ..self.clone()
        }
    }

    pub(crate) fn with_error_popup(&self, error: AppError) -> Self {
        Self {
            error_popup: Some(error),
            ..self.clone()
        }
    }

    pub(crate) fn error_popup_dismissed(&self) -> Option<Self> {
        self.error_popup.as_ref()?;
        Some(Self {
            error_popup: None,
            ..self.clone()
        })
    }

    pub(crate) fn auth_initializing(&self) -> Self {
        Self {
            is_loading: true,
            ..self.clone()
        }
    }

    pub(crate) fn auth_failed(&self, error: AppError) -> Self {
        Self {
            loading_error: Some(error),
            ..self.clone()
        }
    }

    pub(crate) fn content_ready(&self) -> Self {
        Self {
            is_loading: false,
            ..self.clone()
        }
    }
}

/// Keeps the first photo seen for every id, preserving input order.
pub(crate) fn dedupe_by_id(photos: impl IntoIterator<Item = Photo>) -> Vec<Photo> {
    let mut seen = HashSet::new();
    photos
        .into_iter()
        .filter(|photo| seen.insert(photo.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn record(id: &str, created_at: u64) -> GenerationRecord {
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

    fn ids(state: &GalleryState) -> Vec<&str> {
        state.photos.iter().map(|p| p.id.as_str()).collect()
    }

    fn loaded(records: Vec<GenerationRecord>) -> GalleryState {
        let (state, _) = GalleryState::new().begin_next_page().unwrap();
        state.next_page_loaded(records)
    }

    #[test]
    fn test_initial_state() {
        let state = GalleryState::new();
        assert!(state.photos.is_empty());
        assert_eq!(state.page, 0);
        assert!(state.is_loading);
        assert!(!state.paging_limit_reach);
        assert_eq!(state.newest_created_at(), None);
    }

    #[test]
    fn test_begin_next_page_is_exclusive() {
        let (state, page) = GalleryState::new().begin_next_page().unwrap();
        assert_eq!(page, 0);
        assert!(state.is_loading_next_page);
        assert!(state.begin_next_page().is_none());
    }

    #[test]
    fn test_next_page_appends_and_dedupes() {
        let state = loaded(vec![record("p3", 3), record("p2", 2)]);
        let (state, page) = state.begin_next_page().unwrap();
        assert_eq!(page, 1);
        let state = state.next_page_loaded(vec![record("p2", 2), record("p1", 1)]);

        assert_eq!(ids(&state), vec!["p3", "p2", "p1"]);
        assert_eq!(state.page, 2);
        assert!(!state.is_loading_next_page);
        assert!(!state.is_loading);
    }

    #[test]
    fn test_empty_page_sets_limit_and_still_advances_cursor() {
        let state = loaded(vec![record("p1", 1)]);
        let (state, _) = state.begin_next_page().unwrap();
        let state = state.next_page_loaded(Vec::new());

        assert!(state.paging_limit_reach);
        assert_eq!(state.page, 2);
        assert_eq!(ids(&state), vec!["p1"]);
        assert!(state.begin_next_page().is_none());
    }

    #[test]
    fn test_next_page_failure_sets_loading_error() {
        let (state, _) = GalleryState::new().begin_next_page().unwrap();
        let state = state.next_page_failed(AppError::new(ErrorKind::Network, "offline"));
        assert!(!state.is_loading_next_page);
        assert_eq!(state.loading_error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
        assert_eq!(state.error_popup, None);
        assert_eq!(state.page, 0);
    }

    #[test]
    fn test_refresh_requires_a_cursor() {
        assert!(GalleryState::new().begin_refresh(false).is_none());
        assert!(GalleryState::new().begin_refresh(true).is_none());
    }

    #[test]
    fn test_silent_refresh_hides_spinner_but_blocks_second_refresh() {
        let state = loaded(vec![record("p1", 10)]);
        let (state, cursor) = state.begin_refresh(true).unwrap();
        assert_eq!(cursor, UnixTimeMs(10));
        assert!(!state.is_refreshing);
        assert!(state.is_refresh_in_flight());
        assert!(state.begin_refresh(false).is_none());
    }

    #[test]
    fn test_refresh_prepends_new_photos() {
        let state = loaded(vec![record("p3", 3), record("p2", 2), record("p1", 1)]);
        let (state, _) = state.begin_refresh(false).unwrap();
        assert!(state.is_refreshing);
        let state = state.refreshed(vec![record("p4", 4), record("p3", 3)]);

        assert_eq!(ids(&state), vec!["p4", "p3", "p2", "p1"]);
        assert!(!state.is_refreshing);
        assert!(!state.is_refresh_in_flight());
    }

    #[test]
    fn test_refresh_failure_goes_to_popup() {
        let state = loaded(vec![record("p1", 1)]);
        let before = state.photos.clone();
        let (state, _) = state.begin_refresh(false).unwrap();
        let state = state.refresh_failed(AppError::new(ErrorKind::Timeout, "slow"));

        assert!(!state.is_refreshing);
        assert_eq!(state.photos, before);
        assert_eq!(state.loading_error, None);
        assert_eq!(state.error_popup.as_ref().map(|e| e.kind), Some(ErrorKind::Timeout));
    }

    #[test]
    fn test_local_additions_resort_descending() {
        let state = loaded(vec![record("p5", 5), record("p1", 1)]);
        let state = state
            .with_local_additions(&[record("p3", 3), record("p9", 9)])
            .unwrap();
        assert_eq!(ids(&state), vec!["p9", "p5", "p3", "p1"]);
    }

    #[test]
    fn test_local_additions_keep_existing_on_collision() {
        let state = loaded(vec![record("p1", 1)]);
        let mut changed = record("p1", 100);
        changed.prompt = "edited".into();
        let state = state.with_local_additions(&[changed]).unwrap();

        assert_eq!(state.photos.len(), 1);
        assert_eq!(state.photos[0].prompt, "prompt p1");
        assert_eq!(state.photos[0].created_at, UnixTimeMs(1));
    }

    #[test]
    fn test_local_additions_empty_is_noop() {
        assert!(GalleryState::new().with_local_additions(&[]).is_none());
    }

    #[test]
    fn test_remove_filters_ids() {
        let state = loaded(vec![record("p3", 3), record("p2", 2), record("p1", 1)]);
        let remove: HashSet<_> = [GenerationId::new("p2")].into_iter().collect();
        let state = state.without_ids(&remove).unwrap();
        assert_eq!(ids(&state), vec!["p3", "p1"]);

        let unknown: HashSet<_> = [GenerationId::new("nope")].into_iter().collect();
        assert!(state.without_ids(&unknown).is_none());
    }

    #[test]
    fn test_error_popup_dismissal() {
        assert!(GalleryState::new().error_popup_dismissed().is_none());
        let state = GalleryState::new().with_error_popup(AppError::new(ErrorKind::Server, "x"));
        let state = state.error_popup_dismissed().unwrap();
        assert_eq!(state.error_popup, None);
    }

    fn arb_records() -> impl Strategy<Value = Vec<GenerationRecord>> {
        arb_page(0)
    }

    // A first page must be non-empty or the paging limit blocks the next one.
    fn arb_first_page() -> impl Strategy<Value = Vec<GenerationRecord>> {
        arb_page(1)
    }

    fn arb_page(min: usize) -> impl Strategy<Value = Vec<GenerationRecord>> {
        prop::collection::vec((0u8..20, 0u64..1_000), min..40).prop_map(|rows| {
            rows.into_iter()
                .map(|(id, ts)| record(&format!("g{id}"), ts))
                .collect()
        })
    }

    fn has_unique_ids(state: &GalleryState) -> bool {
        let mut seen = HashSet::new();
        state.photos.iter().all(|p| seen.insert(p.id.clone()))
    }

    proptest! {
        #[test]
        fn merges_never_duplicate_ids(
            first in arb_first_page(),
            second in arb_records(),
            fresh in arb_records(),
            local in arb_records(),
        ) {
            let state = loaded(first);
            prop_assert!(has_unique_ids(&state));

            let (state, _) = state.begin_next_page().unwrap();
            let state = state.next_page_loaded(second);
            prop_assert!(has_unique_ids(&state));

            if let Some((state, _)) = state.begin_refresh(true) {
                let state = state.refreshed(fresh);
                prop_assert!(has_unique_ids(&state));
            }

            if let Some(state) = state.with_local_additions(&local) {
                prop_assert!(has_unique_ids(&state));
            }
        }

        #[test]
        fn next_page_preserves_existing_order(first in arb_first_page(), second in arb_records()) {
            let state = loaded(first);
            let before: Vec<_> = state.photos.iter().map(|p| p.id.clone()).collect();
            let (state, _) = state.begin_next_page().unwrap();
            let state = state.next_page_loaded(second);
            let prefix: Vec<_> = state.photos.iter().take(before.len()).map(|p| p.id.clone()).collect();
            prop_assert_eq!(prefix, before);
        }

        #[test]
        fn refresh_puts_fresh_first_and_keeps_everything(
            first in arb_first_page(),
            fresh in arb_records(),
        ) {
            let state = loaded(first);
            let before: HashSet<_> = state.photos.iter().map(|p| p.id.clone()).collect();
            let fresh_ids: Vec<_> = dedupe_by_id(fresh.iter().map(Photo::from))
                .into_iter()
                .map(|p| p.id)
                .collect();
            let (state, _) = state.begin_refresh(false).unwrap();
            let state = state.refreshed(fresh);
            let after: Vec<_> = state.photos.iter().map(|p| p.id.clone()).collect();

            prop_assert!(after.starts_with(&fresh_ids));
            prop_assert!(before.iter().all(|id| after.contains(id)));
        }

        #[test]
        fn local_additions_sorted_descending(first in arb_records(), local in arb_records()) {
            prop_assume!(!local.is_empty());
            let state = loaded(first).with_local_additions(&local).unwrap();
            prop_assert!(state.photos.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        }
    }
}
