// lib.rs - Shared core for the photo generation client

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod config;
pub mod error;
pub mod functions;
pub mod gallery;
pub mod http;
pub mod model;
pub mod repository;
pub mod session;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{ClientConfig, ConfigError, FunctionsConfig, GalleryConfig};
pub use error::{AppError, AppResult, Cancelled, ErrorKind, ErrorSeverity};
pub use functions::{FunctionCall, FunctionInvoker, RemoteGenerationGateway};
pub use gallery::{GalleryController, GalleryIntent, GalleryState, PromptSeed};
pub use http::{HttpError, HttpFunctionInvoker, HttpRequest, HttpResponse, HttpTransport};
pub use model::{
    GenerationId, GenerationRecord, Photo, Preferences, Profile, TrainingId, UnixTimeMs, UserId,
};
pub use repository::{GenerationsRepository, ProfileRepository};
pub use session::{AuthSession, AuthStatus};
pub use view::{GalleryScreen, GalleryViewModel, PhotoTile, Platform, UserFacingError};

pub const PUBLIC_GALLERY_PAGE_SIZE: u32 = 100;
pub const NEXT_PAGE_PREFETCH_THRESHOLD: usize = 30;
pub const THUMBNAIL_WIDTH: u32 = 420;
pub const DEFAULT_FUNCTION_TIMEOUT_MS: u64 = 30_000;
pub const MAX_FUNCTION_TIMEOUT_MS: u64 = 300_000;
