//! Metadata records returned by `yt-dlp --dump-single-json` and the
//! per-process cache in front of them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The fields this tool reads from yt-dlp's info dict. Everything else is
/// kept in `extra` so `infodump` can write the full record back out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulltitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_live: Option<bool>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VideoInfo {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn display_title(&self) -> Option<&str> {
        self.fulltitle.as_deref().or(self.title.as_deref())
    }

    pub fn is_live(&self) -> bool {
        self.is_live.unwrap_or(false)
    }

    pub fn is_playlist(&self) -> bool {
        let present = |value: &Option<Value>| value.as_ref().is_some_and(|v| !v.is_null());
        self.kind.as_deref() == Some("playlist")
            || present(&self.playlist)
            || present(&self.playlist_title)
            || present(&self.playlist_id)
    }
}

/// URL -> metadata. Live records are never served from the cache since
/// liveness goes stale.
#[derive(Debug, Default)]
pub struct InfoCache {
    entries: HashMap<String, VideoInfo>,
}

impl InfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self, url: &str) -> Option<&VideoInfo> {
        self.entries.get(url).filter(|info| !info.is_live())
    }

    pub fn insert(&mut self, url: &str, info: VideoInfo) {
        self.entries.insert(url.to_string(), info);
    }

    pub fn evict(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_fields_and_keeps_the_rest() {
        let info = VideoInfo::from_json(
            r#"{"id":"abc","title":"T","fulltitle":"Full T","is_live":null,"duration":12}"#,
        )
        .unwrap();
        assert_eq!(info.id.as_deref(), Some("abc"));
        assert_eq!(info.display_title(), Some("Full T"));
        assert!(!info.is_live());
        assert!(!info.is_playlist());
        assert_eq!(info.extra.get("duration"), Some(&Value::from(12)));

        let round = serde_json::to_value(&info).unwrap();
        assert_eq!(round["duration"], 12);
        assert_eq!(round["id"], "abc");
    }

    #[test]
    fn playlist_detection_uses_type_and_playlist_fields() {
        let flat = VideoInfo::from_json(r#"{"_type":"playlist","id":"PL1"}"#).unwrap();
        assert!(flat.is_playlist());
        let entry = VideoInfo::from_json(r#"{"id":"v","playlist_id":"PL1"}"#).unwrap();
        assert!(entry.is_playlist());
        let single = VideoInfo::from_json(r#"{"id":"v","playlist":null}"#).unwrap();
        assert!(!single.is_playlist());
    }

    #[test]
    fn live_records_are_never_fresh() {
        let mut cache = InfoCache::new();
        cache.insert(
            "https://live",
            VideoInfo {
                is_live: Some(true),
                ..VideoInfo::default()
            },
        );
        cache.insert("https://vod", VideoInfo::default());
        assert!(cache.fresh("https://live").is_none());
        assert!(cache.fresh("https://vod").is_some());
        assert!(cache.evict("https://vod"));
        assert!(!cache.evict("https://vod"));
        assert_eq!(cache.len(), 1);
    }
}
