//! yt-dlp backed resolver
//!
//! Runs `yt-dlp -J` for a single video and reads the selected audio format
//! URL and display metadata from its JSON output. The child process is
//! killed if the resolution is cancelled or times out.

use super::resolver::{PlayableStream, ResolveFailure, ResolvedTrack, TrackResolver};
use crate::config::ResolverConfig;
use async_trait::async_trait;
use saori_common::{TrackMetadata, TrackReference};
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Availability values that mean the video needs an account to play
const RESTRICTED_AVAILABILITY: &[&str] = &["needs_auth", "premium_only", "subscriber_only"];

pub struct YtDlpResolver {
    program: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            program: config.program.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.timeout(),
        }
    }

    fn command(&self, locator: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["-J", "--no-playlist", "--no-warnings", "-f", "bestaudio/best"])
            .args(&self.extra_args)
            .arg("--")
            .arg(locator)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, track: &TrackReference) -> Result<ResolvedTrack, ResolveFailure> {
        debug!("Resolving {} with {}", track.locator, self.program);

        let output = tokio::time::timeout(self.timeout, self.command(&track.locator).output())
            .await
            .map_err(|_| {
                ResolveFailure::new(format!(
                    "provider timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ResolveFailure::new(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{} failed for {}: {}", self.program, track.locator, stderr.trim());
            return Err(ResolveFailure::new(provider_error(&stderr)));
        }

        parse_info(&track.locator, &output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    duration: Option<f64>,
    url: Option<String>,
    #[serde(default)]
    requested_formats: Vec<Format>,
    availability: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
}

/// Build a resolved track from `yt-dlp -J` output
fn parse_info(locator: &str, json: &[u8]) -> Result<ResolvedTrack, ResolveFailure> {
    let info: VideoInfo = serde_json::from_slice(json)
        .map_err(|e| ResolveFailure::new(format!("unreadable provider output: {}", e)))?;

    if info.kind.as_deref() == Some("playlist") {
        return Err(ResolveFailure::new("locator is a playlist, not a single track"));
    }
    if let Some(availability) = info.availability.as_deref() {
        if RESTRICTED_AVAILABILITY.contains(&availability) {
            return Err(ResolveFailure::new(format!(
                "video is not publicly playable ({})",
                availability
            )));
        }
    }

    let url = info
        .url
        .or_else(|| info.requested_formats.into_iter().find_map(|f| f.url))
        .ok_or_else(|| ResolveFailure::new("no playable audio format"))?;

    let duration_seconds = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d.round() as u64);
    let thumbnail = info
        .thumbnail
        .or_else(|| info.thumbnails.into_iter().last().map(|t| t.url));

    Ok(ResolvedTrack {
        stream: PlayableStream {
            url,
            duration_seconds,
        },
        metadata: TrackMetadata {
            locator: locator.to_string(),
            title: info.title.unwrap_or_else(|| locator.to_string()),
            thumbnail,
            duration_seconds,
        },
    })
}

/// Last `ERROR:` line of provider stderr, or a generic message
fn provider_error(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
        .map(|msg| msg.trim().to_string())
        .filter(|msg| !msg.is_empty())
        .unwrap_or_else(|| "provider could not resolve the locator".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATOR: &str = "https://www.youtube.com/watch?v=abc";

    #[test]
    fn test_parse_full_info() {
        let json = br#"{
            "title": "Song A",
            "thumbnail": "https://i.ytimg.com/a.jpg",
            "duration": 212.4,
            "url": "https://media.example/a.webm",
            "availability": "public"
        }"#;

        let resolved = parse_info(LOCATOR, json).unwrap();
        assert_eq!(resolved.stream.url, "https://media.example/a.webm");
        assert_eq!(resolved.metadata.title, "Song A");
        assert_eq!(resolved.metadata.locator, LOCATOR);
        assert_eq!(resolved.metadata.duration_seconds, Some(212));
        assert_eq!(
            resolved.metadata.thumbnail.as_deref(),
            Some("https://i.ytimg.com/a.jpg")
        );
    }

    #[test]
    fn test_parse_falls_back_to_requested_formats_and_thumbnail_list() {
        let json = br#"{
            "title": "Song B",
            "thumbnails": [{"url": "https://i.ytimg.com/small.jpg"}, {"url": "https://i.ytimg.com/large.jpg"}],
            "requested_formats": [{"url": null}, {"url": "https://media.example/b.m4a"}]
        }"#;

        let resolved = parse_info(LOCATOR, json).unwrap();
        assert_eq!(resolved.stream.url, "https://media.example/b.m4a");
        assert_eq!(
            resolved.metadata.thumbnail.as_deref(),
            Some("https://i.ytimg.com/large.jpg")
        );
        assert_eq!(resolved.metadata.duration_seconds, None);
    }

    #[test]
    fn test_parse_rejects_restricted_video() {
        let json = br#"{"title": "Members only", "url": "https://x", "availability": "subscriber_only"}"#;
        let err = parse_info(LOCATOR, json).unwrap_err();
        assert!(err.reason.contains("subscriber_only"));
    }

    #[test]
    fn test_parse_rejects_playlist() {
        let json = br#"{"_type": "playlist", "title": "Mix"}"#;
        assert!(parse_info(LOCATOR, json).is_err());
    }

    #[test]
    fn test_parse_without_stream_url_fails() {
        let json = br#"{"title": "No formats"}"#;
        let err = parse_info(LOCATOR, json).unwrap_err();
        assert_eq!(err.reason, "no playable audio format");
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_info(LOCATOR, b"not json").is_err());
    }

    #[test]
    fn test_provider_error_uses_last_error_line() {
        let stderr = "WARNING: something\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(provider_error(stderr), "[youtube] abc: Video unavailable");
        assert_eq!(
            provider_error(""),
            "provider could not resolve the locator"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_resolve_failure() {
        let resolver = YtDlpResolver::new(&ResolverConfig {
            program: "saori-definitely-not-installed".to_string(),
            timeout_secs: 5,
            extra_args: Vec::new(),
        });

        let err = resolver
            .resolve(&TrackReference::new(LOCATOR))
            .await
            .unwrap_err();
        assert!(err.reason.starts_with("failed to run"));
    }
}
