//! Render-ready projection of [`GalleryState`] for the host UI.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GalleryConfig;
use crate::error::AppError;
use crate::gallery::GalleryState;
use crate::model::{GenerationId, Photo};

const RESIZING_CDN_SUFFIX: &str = "b-cdn.net";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Android,
    Ios,
    Desktop,
    WebDesktop,
    WebMobile,
}

impl Platform {
    #[must_use]
    pub const fn is_web(self) -> bool {
        matches!(self, Self::WebDesktop | Self::WebMobile)
    }

    /// Browsers stall on decoding while a long grid scrolls.
    #[must_use]
    pub const fn defers_image_loading_while_scrolling(self) -> bool {
        self.is_web()
    }

    #[must_use]
    pub const fn supports_pull_to_refresh(self) -> bool {
        !matches!(self, Self::Desktop | Self::WebDesktop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub message: String,
    pub code: String,
    pub is_retryable: bool,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            code: e.code().to_string(),
            is_retryable: e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoTile {
    pub id: GenerationId,
    pub display_url: String,
    pub prompt: String,
    pub defer_while_scrolling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GalleryScreen {
    Error(UserFacingError),
    Loading,
    Photos {
        tiles: Vec<PhotoTile>,
        is_refreshing: bool,
        pull_to_refresh_enabled: bool,
        show_next_page_spinner: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryViewModel {
    pub screen: GalleryScreen,
    pub error_popup: Option<UserFacingError>,
    pub show_tooltip: bool,
}

impl GalleryViewModel {
    /// An error beats the loading placeholder, which beats the grid.
    #[must_use]
    pub fn project(state: &GalleryState, config: &GalleryConfig, platform: Platform) -> Self {
        let screen = if let Some(error) = &state.loading_error {
            GalleryScreen::Error(error.into())
        } else if state.is_loading {
            GalleryScreen::Loading
        } else {
            GalleryScreen::Photos {
                tiles: state
                    .photos
                    .iter()
                    .map(|photo| tile(photo, config.thumbnail_width, platform))
                    .collect(),
                is_refreshing: state.is_refreshing,
                pull_to_refresh_enabled: platform.supports_pull_to_refresh(),
                show_next_page_spinner: state.is_loading_next_page && !state.paging_limit_reach,
            }
        };

        Self {
            screen,
            error_popup: state.error_popup.as_ref().map(UserFacingError::from),
            show_tooltip: state.show_tooltip_popup,
        }
    }
}

fn tile(photo: &Photo, width: u32, platform: Platform) -> PhotoTile {
    PhotoTile {
        id: photo.id.clone(),
        display_url: thumbnail_url(&photo.url, width),
        prompt: photo.prompt.clone(),
        defer_while_scrolling: platform.defers_image_loading_while_scrolling(),
    }
}

/// Asks the resizing CDN for a grid-sized rendition. Other hosts are served
/// as-is.
#[must_use]
pub fn thumbnail_url(raw: &str, width: u32) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let on_cdn = url
        .host_str()
        .is_some_and(|host| host.ends_with(RESIZING_CDN_SUFFIX));
    if !on_cdn {
        return raw.to_string();
    }
    url.query_pairs_mut()
        .append_pair("width", &width.to_string());
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::UnixTimeMs;

    fn photo(id: &str, url: &str) -> Photo {
        Photo {
            id: GenerationId::new(id),
            url: url.to_string(),
            prompt: format!("prompt {id}"),
            created_at: UnixTimeMs(1),
        }
    }

    fn ready(photos: Vec<Photo>) -> GalleryState {
        GalleryState {
            photos,
            is_loading: false,
            ..GalleryState::new()
        }
    }

    #[test]
    fn test_cdn_urls_get_width() {
        assert_eq!(
            thumbnail_url("https://pics.b-cdn.net/a/b.png", 420),
            "https://pics.b-cdn.net/a/b.png?width=420"
        );
        assert_eq!(
            thumbnail_url("https://pics.b-cdn.net/a.png?v=2", 420),
            "https://pics.b-cdn.net/a.png?v=2&width=420"
        );
    }

    #[test]
    fn test_other_urls_untouched() {
        assert_eq!(
            thumbnail_url("https://storage.example.com/a.png", 420),
            "https://storage.example.com/a.png"
        );
        assert_eq!(thumbnail_url("not a url", 420), "not a url");
    }

    #[test]
    fn test_initial_state_renders_loading() {
        let view = GalleryViewModel::project(
            &GalleryState::new(),
            &GalleryConfig::default(),
            Platform::Android,
        );
        assert_eq!(view.screen, GalleryScreen::Loading);
        assert_eq!(view.error_popup, None);
    }

    #[test]
    fn test_error_beats_loading() {
        let state = GalleryState {
            loading_error: Some(AppError::new(ErrorKind::Network, "offline")),
            ..GalleryState::new()
        };
        let view = GalleryViewModel::project(&state, &GalleryConfig::default(), Platform::Ios);
        match view.screen {
            GalleryScreen::Error(error) => {
                assert_eq!(error.code, ErrorKind::Network.code());
                assert!(error.is_retryable);
            }
            other => panic!("expected error screen, got {other:?}"),
        }
    }

    #[test]
    fn test_photos_projection_per_platform() {
        let state = ready(vec![photo("p1", "https://x.b-cdn.net/p1.png")]);

        let web = GalleryViewModel::project(&state, &GalleryConfig::default(), Platform::WebDesktop);
        let GalleryScreen::Photos {
            tiles,
            pull_to_refresh_enabled,
            ..
        } = web.screen
        else {
            panic!("expected photos");
        };
        assert!(!pull_to_refresh_enabled);
        assert!(tiles[0].defer_while_scrolling);
        assert_eq!(tiles[0].display_url, "https://x.b-cdn.net/p1.png?width=420");

        let phone = GalleryViewModel::project(&state, &GalleryConfig::default(), Platform::Android);
        let GalleryScreen::Photos {
            tiles,
            pull_to_refresh_enabled,
            ..
        } = phone.screen
        else {
            panic!("expected photos");
        };
        assert!(pull_to_refresh_enabled);
        assert!(!tiles[0].defer_while_scrolling);
    }

    #[test]
    fn test_popup_and_tooltip_projected_over_grid() {
        let state = GalleryState {
            error_popup: Some(AppError::new(ErrorKind::Server, "boom")),
            show_tooltip_popup: true,
            ..ready(Vec::new())
        };
        let view = GalleryViewModel::project(&state, &GalleryConfig::default(), Platform::WebMobile);
        assert!(matches!(view.screen, GalleryScreen::Photos { .. }));
        assert!(view.show_tooltip);
        assert!(view.error_popup.is_some());
    }
}
