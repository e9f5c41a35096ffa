//! URL heuristics: a validity floor, cleanup of tracking fluff and mirror
//! hosts, and the site/category checks that pick option templates.

use regex::Regex;
use std::sync::LazyLock;

/// Shorter candidates are rejected outright by `add`.
pub const MIN_URL_LEN: usize = 5;

static IS_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#].[^\s]*$").expect("valid regex"));
static YT_VIDEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v=[\w\-]+").expect("valid regex"));
static YT_VIDEO_MANGLED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/watch&v=[\w\-]+").expect("valid regex"));
static YT_FLUFF: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    ["list", "index", "pp", "si"].map(|param| {
        Regex::new(&format!(r"[?&]{param}=[\w\-%]+")).expect("valid regex")
    })
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    Crunchyroll,
    Twitter,
    Twitch,
    Youtube,
}

impl Site {
    /// Template name holding this site's options and credentials.
    pub fn template(self) -> &'static str {
        match self {
            Site::Crunchyroll => "crunchyroll",
            Site::Twitter => "twitter",
            Site::Twitch => "twitch",
            Site::Youtube => "youtube",
        }
    }

    pub fn detect(url: &str) -> Option<Site> {
        if url.contains("crunchyroll") {
            Some(Site::Crunchyroll)
        } else if url.contains("twitter.com") {
            Some(Site::Twitter)
        } else if url.contains("twitch.tv") {
            Some(Site::Twitch)
        } else if is_youtube(url) {
            Some(Site::Youtube)
        } else {
            None
        }
    }
}

pub fn is_url(candidate: &str) -> bool {
    IS_URL.is_match(candidate)
}

pub fn is_youtube(url: &str) -> bool {
    url.contains("youtube.com/") || url.contains("youtu.be/")
}

/// Shows get the series/season/episode folder layout.
pub fn is_show(url: &str) -> bool {
    Site::detect(url) == Some(Site::Crunchyroll)
}

pub fn is_podcast(url: &str) -> bool {
    url.contains("podcast")
}

/// Playlist check that needs no metadata.
pub fn looks_like_playlist(url: &str) -> bool {
    url.contains("playlist") || url.contains("youtube.com/c/")
}

/// Strips tracking parameters and rewrites known mirror hosts.
///
/// YouTube query parameters are only dropped while a `v=` id survives, so
/// playlist-only links keep their `list=`.
pub fn clean_url(url: &str) -> String {
    let mut url = url.to_string();
    if url.contains("youtube.com") || (url.contains("youtu.be") && !url.contains("playlist")) {
        for fluff in YT_FLUFF.iter() {
            let stripped = fluff.replace_all(&url, "").into_owned();
            if YT_VIDEO.is_match(&stripped) {
                url = stripped;
            }
        }
        if YT_VIDEO_MANGLED.is_match(&url) {
            url = url.replace("/watch&v=", "/watch?v=");
        }
    }
    if url.contains("youtube.com/shorts/") {
        url = url.replacen("/shorts/", "/watch?v=", 1);
    }
    if url.contains("piped.kavin.rocks/") {
        url = url.replacen("piped.kavin.rocks/", "youtube.com/", 1);
    }
    if url.contains("imgur.artemislena.eu/gallery/") {
        url = url.replacen("imgur.artemislena.eu/gallery/", "imgur.com/gallery/", 1);
    } else if url.contains("imgur.artemislena.eu/") {
        url = url.replacen("imgur.artemislena.eu/", "i.imgur.com/", 1);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_url_requires_scheme_and_host() {
        assert!(is_url("https://youtu.be/abc"));
        assert!(is_url("HTTP://example.com/path?q=1"));
        assert!(!is_url("youtube.com/watch?v=abc"));
        assert!(!is_url("https://"));
        assert!(!is_url("https://exa mple.com"));
    }

    #[test]
    fn clean_url_strips_tracking_but_keeps_video_id() {
        assert_eq!(
            clean_url("https://www.youtube.com/watch?v=abc123&list=PLxyz&index=4&si=track"),
            "https://www.youtube.com/watch?v=abc123"
        );
        assert_eq!(
            clean_url("https://youtu.be/abc123?v=abc123&si=AbC-9"),
            "https://youtu.be/abc123?v=abc123"
        );
    }

    #[test]
    fn clean_url_keeps_playlist_only_links() {
        let url = "https://www.youtube.com/playlist?list=PLxyz";
        assert_eq!(clean_url(url), url);
    }

    #[test]
    fn clean_url_fixes_mangled_watch_links() {
        assert_eq!(
            clean_url("https://www.youtube.com/watch&v=abc123"),
            "https://www.youtube.com/watch?v=abc123"
        );
    }

    #[test]
    fn clean_url_rewrites_shorts_and_mirrors() {
        assert_eq!(
            clean_url("https://youtube.com/shorts/abc123"),
            "https://youtube.com/watch?v=abc123"
        );
        assert_eq!(
            clean_url("https://piped.kavin.rocks/watch?v=abc123"),
            "https://youtube.com/watch?v=abc123"
        );
        assert_eq!(
            clean_url("https://imgur.artemislena.eu/gallery/xyz"),
            "https://imgur.com/gallery/xyz"
        );
        assert_eq!(
            clean_url("https://imgur.artemislena.eu/xyz.mp4"),
            "https://i.imgur.com/xyz.mp4"
        );
    }

    #[test]
    fn clean_url_leaves_other_sites_alone() {
        let url = "https://example.com/video?si=keep";
        assert_eq!(clean_url(url), url);
    }

    #[test]
    fn site_detection() {
        assert_eq!(
            Site::detect("https://www.crunchyroll.com/watch/X"),
            Some(Site::Crunchyroll)
        );
        assert_eq!(Site::detect("https://twitter.com/u/status/1"), Some(Site::Twitter));
        assert_eq!(Site::detect("https://www.twitch.tv/someone"), Some(Site::Twitch));
        assert_eq!(Site::detect("https://youtu.be/abc"), Some(Site::Youtube));
        assert_eq!(Site::detect("https://example.com"), None);
        assert!(is_show("https://www.crunchyroll.com/watch/X"));
        assert!(is_podcast("https://example.com/podcast/1"));
        assert!(looks_like_playlist("https://www.youtube.com/c/channel"));
    }
}
