//! Track references and resolved track metadata

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A queued track: an opaque source locator plus display metadata cached
/// from an earlier resolution during this process lifetime.
///
/// Equality is by locator only; two references to the same URL are equal
/// even if only one of them carries a cached title.
#[derive(Debug, Clone, Eq)]
pub struct TrackReference {
    pub locator: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
}

impl TrackReference {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            title: None,
            thumbnail: None,
        }
    }

    /// Reference carrying the display fields of resolved metadata
    pub fn with_metadata(metadata: &TrackMetadata) -> Self {
        Self {
            locator: metadata.locator.clone(),
            title: Some(metadata.title.clone()),
            thumbnail: metadata.thumbnail.clone(),
        }
    }

    /// Title if one has been cached, the locator otherwise
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.locator)
    }

    pub fn matches(&self, locator: &str) -> bool {
        self.locator == locator
    }
}

impl PartialEq for TrackReference {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator
    }
}

impl std::hash::Hash for TrackReference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.locator.hash(state);
    }
}

impl From<&str> for TrackReference {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

impl From<String> for TrackReference {
    fn from(locator: String) -> Self {
        Self::new(locator)
    }
}

/// On-disk form of a reference.
///
/// References are always written as bare locator strings, so a snapshot is a
/// plain `guild -> [url]` mapping. Cached display metadata lives in memory
/// only. The object form is still accepted when reading older snapshots.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredReference {
    Locator(String),
    Detailed {
        url: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        thumbnail: Option<String>,
    },
}

impl Serialize for TrackReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.locator)
    }
}

impl<'de> Deserialize<'de> for TrackReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StoredReference::deserialize(deserializer)? {
            StoredReference::Locator(locator) => Self::new(locator),
            StoredReference::Detailed {
                url,
                title,
                thumbnail,
            } => Self {
                locator: url,
                title,
                thumbnail,
            },
        })
    }
}

/// Display metadata reported by a track resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    /// Locator the metadata was resolved from
    pub locator: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Length in whole seconds, if the provider knows it (live streams do not)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_cached_metadata() {
        let plain = TrackReference::new("https://youtu.be/a");
        let cached = TrackReference {
            locator: "https://youtu.be/a".to_string(),
            title: Some("Song A".to_string()),
            thumbnail: None,
        };
        assert_eq!(plain, cached);
        assert_ne!(plain, TrackReference::new("https://youtu.be/b"));
    }

    #[test]
    fn test_plain_reference_is_stored_as_string() {
        let json = serde_json::to_string(&TrackReference::new("https://youtu.be/a")).unwrap();
        assert_eq!(json, "\"https://youtu.be/a\"");
    }

    #[test]
    fn test_cached_reference_is_stored_as_string() {
        let track = TrackReference {
            locator: "https://youtu.be/a".to_string(),
            title: Some("Song A".to_string()),
            thumbnail: Some("https://i.ytimg.com/a.jpg".to_string()),
        };
        let value = serde_json::to_value(&track).unwrap();
        assert_eq!(value, serde_json::json!("https://youtu.be/a"));
    }

    #[test]
    fn test_object_form_still_loads() {
        let value = serde_json::json!({
            "url": "https://youtu.be/a",
            "title": "Song A",
            "thumbnail": "https://i.ytimg.com/a.jpg"
        });
        let back: TrackReference = serde_json::from_value(value).unwrap();
        assert_eq!(back.locator, "https://youtu.be/a");
        assert_eq!(back.title.as_deref(), Some("Song A"));
        assert_eq!(back.thumbnail.as_deref(), Some("https://i.ytimg.com/a.jpg"));
    }

    #[test]
    fn test_display_title_falls_back_to_locator() {
        let track = TrackReference::new("https://youtu.be/a");
        assert_eq!(track.display_title(), "https://youtu.be/a");
    }
}
