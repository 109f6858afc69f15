//! YouTube Music search through the InnerTube web client API
//!
//! The response is a deeply nested renderer tree. It is decoded into typed
//! structs that only name the fields we read; a response that doesn't fit
//! them yields no candidates instead of an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::SearchService;
use crate::pipeline::MatchCandidate;
use crate::pipeline::duration;

const SEARCH_URL: &str = "https://music.youtube.com/youtubei/v1/search?prettyPrint=false";
const ORIGIN: &str = "https://music.youtube.com";
const CLIENT_NAME: &str = "WEB_REMIX";
const CLIENT_VERSION: &str = "1.20250203.01.00";

/// Default number of candidates handed to the selector
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// HTTP client for YouTube Music search
#[derive(Clone)]
pub struct YtMusicClient {
    http_client: Client,
    max_candidates: usize,
}

impl YtMusicClient {
    pub fn new() -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        })
    }

    async fn raw_search(&self, query: &str) -> Result<serde_json::Value> {
        let body = json!({
            "context": {
                "client": {
                    "clientName": CLIENT_NAME,
                    "clientVersion": CLIENT_VERSION,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "query": query,
        });

        let response = self
            .http_client
            .post(SEARCH_URL)
            .header("Origin", ORIGIN)
            .header("Referer", format!("{}/", ORIGIN))
            .json(&body)
            .send()
            .await
            .context("Failed to connect to YouTube Music")?;

        if !response.status().is_success() {
            anyhow::bail!("YouTube Music search failed with {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to read search response")
    }
}

#[async_trait]
impl SearchService for YtMusicClient {
    async fn search(&self, query: &str) -> Result<Vec<MatchCandidate>> {
        debug!("Searching YouTube Music: {}", query);
        let value = self.raw_search(query).await?;
        let candidates = parse_candidates(value, self.max_candidates);
        debug!("{} candidates for {}", candidates.len(), query);
        Ok(candidates)
    }
}

/// Candidates from a search response, top result first
///
/// Returns an empty list when the response doesn't have the expected shape.
pub fn parse_candidates(value: serde_json::Value, limit: usize) -> Vec<MatchCandidate> {
    let response: SearchResponse = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            warn!("Unexpected search response shape: {}", e);
            return Vec::new();
        }
    };

    let Some(tab) = response.contents.tabbed_search_results_renderer.tabs.into_iter().next() else {
        warn!("Search response has no result tabs");
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for section in tab.tab_renderer.content.section_list_renderer.contents {
        // "Did you mean" and similar notices
        if section.item_section_renderer.is_some() {
            continue;
        }
        if let Some(card) = section.music_card_shelf_renderer {
            candidates.extend(card.candidate());
        }
        if let Some(shelf) = section.music_shelf_renderer {
            candidates.extend(
                shelf
                    .contents
                    .into_iter()
                    .filter_map(|item| item.music_responsive_list_item_renderer)
                    .filter_map(ListItem::candidate),
            );
        }
        if candidates.len() >= limit {
            break;
        }
    }

    candidates.truncate(limit);
    candidates
}

/// Duration of a result, 0 when the text isn't a timestamp
fn duration_of(text: &str) -> u64 {
    duration::to_millis(text).unwrap_or_else(|| {
        debug!("Unparsable duration '{}'", text);
        0
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    contents: ResponseContents,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseContents {
    tabbed_search_results_renderer: TabbedResults,
}

#[derive(Debug, Deserialize)]
struct TabbedResults {
    tabs: Vec<Tab>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tab {
    tab_renderer: TabRenderer,
}

#[derive(Debug, Deserialize)]
struct TabRenderer {
    content: TabContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TabContent {
    section_list_renderer: SectionList,
}

#[derive(Debug, Deserialize)]
struct SectionList {
    #[serde(default)]
    contents: Vec<Section>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Section {
    item_section_renderer: Option<serde::de::IgnoredAny>,
    music_card_shelf_renderer: Option<CardShelf>,
    music_shelf_renderer: Option<Shelf>,
}

/// The "Top result" card
#[derive(Debug, Deserialize)]
struct CardShelf {
    title: Runs,
    subtitle: Option<Runs>,
}

impl CardShelf {
    fn candidate(self) -> Option<MatchCandidate> {
        let duration = self
            .subtitle
            .as_ref()
            .and_then(|s| s.runs.last())
            .map(|run| duration_of(&run.text))
            .unwrap_or(0);
        let run = self.title.runs.into_iter().next()?;
        let video_id = run.navigation_endpoint?.watch_endpoint?.video_id;
        Some(MatchCandidate {
            video_id,
            title: run.text,
            duration_ms: duration,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Shelf {
    #[serde(default)]
    contents: Vec<ShelfItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShelfItem {
    music_responsive_list_item_renderer: Option<ListItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListItem {
    #[serde(default)]
    flex_columns: Vec<FlexColumn>,
    overlay: Option<Overlay>,
    playlist_item_data: Option<PlaylistItemData>,
}

impl ListItem {
    /// Title from the first column, duration from the end of the second
    fn candidate(self) -> Option<MatchCandidate> {
        let video_id = self
            .overlay
            .and_then(|o| {
                o.music_item_thumbnail_overlay_renderer
                    .content
                    .music_play_button_renderer
            })
            .and_then(|b| b.play_navigation_endpoint)
            .and_then(|e| e.watch_endpoint)
            .map(|w| w.video_id)
            .or_else(|| self.playlist_item_data.map(|d| d.video_id))?;

        let mut columns = self
            .flex_columns
            .into_iter()
            .map(|c| c.music_responsive_list_item_flex_column_renderer.text.runs);
        let title = columns.next()?.into_iter().next()?.text;
        let duration = columns
            .next()
            .and_then(|runs| runs.into_iter().last())
            .map(|run| duration_of(&run.text))
            .unwrap_or(0);

        Some(MatchCandidate {
            video_id,
            title,
            duration_ms: duration,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlexColumn {
    music_responsive_list_item_flex_column_renderer: FlexColumnRenderer,
}

#[derive(Debug, Deserialize)]
struct FlexColumnRenderer {
    text: Runs,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Overlay {
    music_item_thumbnail_overlay_renderer: OverlayRenderer,
}

#[derive(Debug, Deserialize)]
struct OverlayRenderer {
    content: OverlayContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlayContent {
    music_play_button_renderer: Option<PlayButton>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayButton {
    play_navigation_endpoint: Option<NavigationEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemData {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Runs {
    #[serde(default)]
    runs: Vec<Run>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Run {
    text: String,
    navigation_endpoint: Option<NavigationEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationEndpoint {
    watch_endpoint: Option<WatchEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchEndpoint {
    video_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn card(video_id: &str, title: &str, duration: &str) -> Value {
        json!({
            "musicCardShelfRenderer": {
                "title": {"runs": [{
                    "text": title,
                    "navigationEndpoint": {"watchEndpoint": {"videoId": video_id}}
                }]},
                "subtitle": {"runs": [
                    {"text": "Song"}, {"text": " • "}, {"text": "Artist X"},
                    {"text": " • "}, {"text": duration}
                ]}
            }
        })
    }

    fn list_item(video_id: &str, title: &str, duration: &str) -> Value {
        json!({
            "musicResponsiveListItemRenderer": {
                "flexColumns": [
                    {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": title}]}}},
                    {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [
                        {"text": "Artist X"}, {"text": " • "}, {"text": "Album"},
                        {"text": " • "}, {"text": duration}
                    ]}}}
                ],
                "overlay": {"musicItemThumbnailOverlayRenderer": {"content": {
                    "musicPlayButtonRenderer": {
                        "playNavigationEndpoint": {"watchEndpoint": {"videoId": video_id}}
                    }
                }}}
            }
        })
    }

    fn response(sections: Vec<Value>) -> Value {
        json!({
            "contents": {"tabbedSearchResultsRenderer": {"tabs": [{
                "tabRenderer": {"content": {"sectionListRenderer": {"contents": sections}}}
            }]}}
        })
    }

    #[test]
    fn test_top_result_first() {
        let value = response(vec![
            card("top", "Song A", "3:20"),
            json!({"musicShelfRenderer": {"contents": [
                list_item("s1", "Song A (Live)", "4:10"),
                list_item("s2", "Song A", "3:18"),
            ]}}),
        ]);

        let candidates = parse_candidates(value, 5);
        let ids: Vec<&str> = candidates.iter().map(|c| c.video_id.as_str()).collect();
        assert_eq!(ids, vec!["top", "s1", "s2"]);
        assert_eq!(candidates[0].duration_ms, 200_000);
        assert_eq!(candidates[1].title, "Song A (Live)");
        assert_eq!(candidates[2].duration_ms, 198_000);
    }

    #[test]
    fn test_did_you_mean_skipped() {
        let value = response(vec![
            json!({"itemSectionRenderer": {"contents": [{"didYouMeanRenderer": {}}]}}),
            card("top", "Song A", "3:20"),
        ]);

        let candidates = parse_candidates(value, 5);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].video_id, "top");
    }

    #[test]
    fn test_limit() {
        let items: Vec<Value> = (0..10)
            .map(|i| list_item(&format!("s{}", i), "Song", "3:00"))
            .collect();
        let value = response(vec![json!({"musicShelfRenderer": {"contents": items}})]);

        assert_eq!(parse_candidates(value, 5).len(), 5);
    }

    #[test]
    fn test_unparsable_duration_is_zero() {
        let value = response(vec![card("top", "Song A", "Artist X")]);
        let candidates = parse_candidates(value, 5);
        assert_eq!(candidates[0].duration_ms, 0);
    }

    #[test]
    fn test_items_without_video_id_dropped() {
        let value = response(vec![json!({"musicShelfRenderer": {"contents": [
            {"musicResponsiveListItemRenderer": {"flexColumns": []}},
            {"messageRenderer": {}},
            list_item("s1", "Song A", "3:00"),
        ]}})]);

        let candidates = parse_candidates(value, 5);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].video_id, "s1");
    }

    #[test]
    fn test_shape_mismatch_yields_nothing() {
        assert!(parse_candidates(json!({"error": {"code": 400}}), 5).is_empty());
        let empty = json!({"contents": {"tabbedSearchResultsRenderer": {"tabs": []}}});
        assert!(parse_candidates(empty, 5).is_empty());
        assert!(parse_candidates(json!("nope"), 5).is_empty());
    }
}
