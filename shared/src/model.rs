use serde::{Deserialize, Serialize};
use std::fmt;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

typed_id!(GenerationId);
typed_id!(UserId);
typed_id!(TrainingId);

/// Unix timestamp in milliseconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        )
    }
}

/// A generation row as served by the backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenerationRecord {
    pub id: GenerationId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub training_id: Option<TrainingId>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub url: String,
    pub created_at: UnixTimeMs,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub parent_generation_id: Option<GenerationId>,
}

/// What the gallery renders for one generation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Photo {
    pub id: GenerationId,
    pub url: String,
    pub prompt: String,
    pub created_at: UnixTimeMs,
}

impl From<GenerationRecord> for Photo {
    fn from(record: GenerationRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            prompt: record.prompt,
            created_at: record.created_at,
        }
    }
}

impl From<&GenerationRecord> for Photo {
    fn from(record: &GenerationRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.url.clone(),
            prompt: record.prompt.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Preferences {
    pub public_tooltip_shown: bool,
    pub generate_tooltip_shown: bool,
    pub upload_tooltip_shown: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    #[serde(default)]
    pub preferences: Preferences,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_projection_keeps_identity_fields() {
        let record = GenerationRecord {
            id: GenerationId::new("gen-1"),
            user_id: Some(UserId::new("user-1")),
            training_id: Some(TrainingId::new("tr-1")),
            prompt: "a cat in a spacesuit".into(),
            url: "https://cdn.example.com/gen-1.png".into(),
            created_at: UnixTimeMs(1_700_000_000_000),
            is_public: true,
            parent_generation_id: None,
        };

        let photo = Photo::from(&record);
        assert_eq!(photo.id.as_str(), "gen-1");
        assert_eq!(photo.prompt, "a cat in a spacesuit");
        assert_eq!(photo.created_at, record.created_at);
    }

    #[test]
    fn test_record_tolerates_sparse_rows() {
        let record: GenerationRecord =
            serde_json::from_str(r#"{"id":"g","created_at":42}"#).unwrap();
        assert_eq!(record.id, GenerationId::new("g"));
        assert_eq!(record.created_at, UnixTimeMs(42));
        assert!(record.url.is_empty());
        assert!(!record.is_public);
    }

    #[test]
    fn test_profile_without_preferences_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"user_id":"u"}"#).unwrap();
        assert!(!profile.preferences.public_tooltip_shown);

        let profile: Profile =
            serde_json::from_str(r#"{"user_id":"u","preferences":{"public_tooltip_shown":true,"theme":"dark"}}"#)
                .unwrap();
        assert!(profile.preferences.public_tooltip_shown);
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(UnixTimeMs(2) > UnixTimeMs(1));
        assert!(UnixTimeMs::now().0 > 0);
    }
}
