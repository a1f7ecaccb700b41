//! Bilibili adapter.
//!
//! Search goes through the category search API (two passes, because live
//! action and movies share one category while anime has its own), episode
//! lists come from the season endpoint, and danmaku from the XML comment
//! endpoint keyed by the episode's cid.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use flate2::read::DeflateDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::{debug, info, warn};

use danmaku::adapter::{AdapterError, AdapterResult, PlatformAdapter};
use danmaku::matcher::{self, TitleMatcher};
use danmaku::model::{
    DanmakuMode, EpisodeCandidate, MatchQuery, MediaCandidate, MediaKind, StandardDanmaku,
    WHITE_COLOR,
};

use crate::http::PlatformHttp;

pub const PLATFORM: &str = "bilibili";

const SEARCH_API: &str = "https://api.bilibili.com/x/web-interface/search/type";
const SEASON_API: &str = "https://api.bilibili.com/pgc/view/web/season";
const COMMENT_API: &str = "https://api.bilibili.com/x/v1/dm/list.so";

/// media_type code for movies; live action series are 5, anime series 4.
const MEDIA_TYPE_MOVIE: i32 = 2;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    result: Vec<SearchEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchEntry {
    media_type: i32,
    season_id: i64,
    cover: String,
    season_type_name: String,
    /// Carries highlight markup around the hit keyword.
    title: String,
    /// For single movies the episode id only appears in this play URL.
    url: String,
    #[serde(rename = "pubtime")]
    pub_time: i64,
    desc: String,
    eps: Vec<SearchEpisode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchEpisode {
    id: i64,
    /// Episode number as displayed ("13"), or a version label for movies.
    title: String,
    long_title: String,
}

#[derive(Debug, Deserialize)]
struct SeasonResponse {
    code: i32,
    #[serde(default)]
    message: String,
    result: Option<SeasonResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeasonResult {
    cover: String,
    season_id: i64,
    title: String,
    evaluate: String,
    #[serde(rename = "type")]
    kind: i32,
    episodes: Vec<SeasonEpisode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeasonEpisode {
    cid: i64,
    ep_id: i64,
    /// 1 marks trailers and other non-episode sections.
    section_type: i32,
    title: String,
    show_title: String,
    pub_time: i64,
}

pub struct BilibiliAdapter {
    http: PlatformHttp,
    matcher: Arc<TitleMatcher>,
}

impl BilibiliAdapter {
    pub fn new(http: PlatformHttp, matcher: Arc<TitleMatcher>) -> Self {
        Self { http, matcher }
    }

    async fn search_by_type(
        &self,
        search_type: &str,
        keyword: &str,
    ) -> AdapterResult<Vec<SearchEntry>> {
        let response = self
            .http
            .get(SEARCH_API)
            .query(&[
                ("search_type", search_type),
                ("page", "1"),
                ("page_size", "30"),
                ("platform", "pc"),
                ("highlight", "1"),
                ("keyword", keyword),
            ])
            .send()
            .await
            .map_err(|error| AdapterError::http(error.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::http(format!(
                "search status {}",
                response.status()
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|error| AdapterError::decode(error.to_string()))?;
        if result.code != 0 {
            return Err(AdapterError::platform(format!(
                "search code {}: {}",
                result.code, result.message
            )));
        }
        Ok(result.data.result)
    }

    async fn season_info(
        &self,
        ep_id: Option<&str>,
        season_id: Option<&str>,
    ) -> AdapterResult<SeasonResult> {
        let mut request = self.http.get(SEASON_API);
        if let Some(ep_id) = ep_id {
            request = request.query(&[("ep_id", ep_id)]);
        }
        if let Some(season_id) = season_id {
            request = request.query(&[("season_id", season_id)]);
        }

        let response = request
            .send()
            .await
            .map_err(|error| AdapterError::http(error.to_string()))?;
        let result: SeasonResponse = response
            .json()
            .await
            .map_err(|error| AdapterError::decode(error.to_string()))?;
        if result.code != 0 {
            return Err(AdapterError::platform(format!(
                "season code {}: {}",
                result.code, result.message
            )));
        }
        result
            .result
            .ok_or_else(|| AdapterError::platform("empty season payload"))
    }

    async fn comment_xml(&self, cid: i64) -> AdapterResult<String> {
        let response = self
            .http
            .get(COMMENT_API)
            .query(&[("oid", cid.to_string())])
            .send()
            .await
            .map_err(|error| AdapterError::http(error.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::http(format!(
                "comment status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| AdapterError::http(error.to_string()))?;

        // The endpoint serves raw DEFLATE below the transport encoding; some
        // mirrors serve plain XML instead.
        let mut xml = String::new();
        let mut decoder = DeflateDecoder::new(&bytes[..]);
        if decoder.read_to_string(&mut xml).is_ok() {
            return Ok(xml);
        }
        String::from_utf8(bytes.to_vec()).map_err(|error| AdapterError::decode(error.to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for BilibiliAdapter {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn match_media(&self, query: MatchQuery) -> AdapterResult<Vec<MediaCandidate>> {
        // The search API cannot find "S02" style markers; spell the season
        // out in Chinese instead.
        let keyword = match matcher::chinese_numeral_str(query.season) {
            Some(numeral) if query.season > 1 => format!("{}第{numeral}季", query.title),
            _ => query.title.clone(),
        };

        // Live action series and movies are both media_ft while anime is
        // media_bangumi, so one keyword needs two category passes.
        let mut entries = Vec::new();
        for search_type in ["media_ft", "media_bangumi"] {
            match self.search_by_type(search_type, &keyword).await {
                Ok(mut result) => entries.append(&mut result),
                Err(error) => {
                    warn!(search_type, error = %error, "bilibili search failed");
                }
            }
        }
        if entries.is_empty() {
            debug!(keyword = %keyword, "bilibili search no result");
            return Ok(Vec::new());
        }

        let mut media = Vec::new();
        for entry in entries {
            let year = Utc
                .timestamp_opt(entry.pub_time, 0)
                .single()
                .map(|datetime| datetime.year())
                .unwrap_or(0);
            if !query.matches_year(year) {
                continue;
            }
            if !self.matcher.matches(&query, &entry.title) {
                continue;
            }
            let clear_title = matcher::normalize_title(&entry.title);

            let episodes = if !entry.eps.is_empty() {
                if entry.media_type == MEDIA_TYPE_MOVIE {
                    // Multiple movie entries are language/cut versions.
                    entry
                        .eps
                        .iter()
                        .enumerate()
                        .map(|(index, ep)| EpisodeCandidate {
                            id: ep.id.to_string(),
                            number: index.to_string(),
                            title: ep.title.clone(),
                        })
                        .collect()
                } else {
                    build_series_episodes(&entry.eps)
                }
            } else if !entry.url.is_empty() {
                episode_id_from_url(&entry.url)
                    .map(|id| {
                        vec![EpisodeCandidate {
                            id,
                            number: clear_title.clone(),
                            title: clear_title.clone(),
                        }]
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            media.push(MediaCandidate {
                kind: if entry.media_type == MEDIA_TYPE_MOVIE {
                    MediaKind::Movie
                } else {
                    MediaKind::Series
                },
                id: entry.season_id.to_string(),
                title: clear_title,
                description: entry.desc,
                cover: entry.cover,
                type_desc: entry.season_type_name,
                year,
                pub_time: entry.pub_time,
                platform: PLATFORM.to_owned(),
                episodes,
            });
        }
        Ok(media)
    }

    async fn fetch_danmaku(&self, episode_id: &str) -> AdapterResult<Vec<StandardDanmaku>> {
        let season = self.season_info(Some(episode_id), None).await?;
        let episode = season
            .episodes
            .iter()
            .find(|ep| ep.ep_id.to_string() == episode_id)
            .ok_or_else(|| AdapterError::invalid_id(format!("unknown episode {episode_id}")))?;

        let xml = self.comment_xml(episode.cid).await?;
        let data = parse_comment_xml(&xml)?;
        info!(episode_id, size = data.len(), "bilibili danmaku fetched");
        Ok(data)
    }

    async fn media_detail(&self, season_id: &str) -> AdapterResult<MediaCandidate> {
        let season = self.season_info(None, Some(season_id)).await?;
        let pub_time = season.episodes.first().map(|ep| ep.pub_time).unwrap_or(0);
        let episodes = season
            .episodes
            .iter()
            .filter(|ep| ep.section_type != 1 && !matcher::is_junk_episode_title(&ep.show_title))
            .map(|ep| EpisodeCandidate {
                id: ep.ep_id.to_string(),
                number: ep.title.clone(),
                title: ep.show_title.clone(),
            })
            .collect();
        Ok(MediaCandidate {
            kind: if season.kind == 2 {
                MediaKind::Movie
            } else {
                MediaKind::Series
            },
            id: season.season_id.to_string(),
            title: season.title.clone(),
            description: season.evaluate,
            cover: season.cover,
            type_desc: String::new(),
            year: Utc
                .timestamp_opt(pub_time, 0)
                .single()
                .map(|datetime| datetime.year())
                .unwrap_or(0),
            pub_time,
            platform: PLATFORM.to_owned(),
            episodes,
        })
    }
}

/// Build episode candidates for a series search hit. Later seasons often keep
/// counting from episode 1 of the whole show; when numbers do not start at 1
/// the array index takes over.
fn build_series_episodes(eps: &[SearchEpisode]) -> Vec<EpisodeCandidate> {
    let mut episodes = Vec::with_capacity(eps.len());
    for (index, ep) in eps.iter().enumerate() {
        if matcher::is_junk_episode_title(&ep.title) {
            continue;
        }
        let mut number = ep.title.clone();
        if let Ok(parsed) = number.parse::<i64>()
            && parsed > 1
        {
            number = (index + 1).to_string();
        }
        episodes.push(EpisodeCandidate {
            id: ep.id.to_string(),
            number,
            title: ep.long_title.clone(),
        });
    }
    episodes
}

/// Extract the episode id from a play URL such as
/// `https://www.bilibili.com/bangumi/play/ep747309?theme=movie`.
fn episode_id_from_url(url: &str) -> Option<String> {
    let base = url.rsplit('/').next()?;
    let id = base.strip_prefix("ep")?.split('?').next()?;
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| id.to_owned())
}

/// Parse the XML comment payload: `<d p="offset,mode,fontsize,color,...">`.
fn parse_comment_xml(xml: &str) -> AdapterResult<Vec<StandardDanmaku>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    reader.config_mut().trim_text(true);

    let mut result = Vec::new();
    let mut buf = Vec::new();
    let mut pending_attribute: Option<String> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) if tag.name().as_ref() == b"d" => {
                pending_attribute = match tag.try_get_attribute("p") {
                    Ok(Some(attribute)) => attribute
                        .unescape_value()
                        .ok()
                        .map(|value| value.into_owned()),
                    _ => None,
                };
            }
            Ok(Event::Text(text)) => {
                if let Some(attribute) = pending_attribute.take() {
                    let content = text.unescape().unwrap_or_default();
                    if let Some(danmaku) = parse_comment_line(&attribute, &content) {
                        result.push(danmaku);
                    }
                }
            }
            Ok(Event::End(tag)) if tag.name().as_ref() == b"d" => {
                pending_attribute = None;
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(AdapterError::decode(error.to_string())),
            Ok(_) => {}
        }
        buf.clear();
    }
    Ok(result)
}

fn parse_comment_line(attribute: &str, content: &str) -> Option<StandardDanmaku> {
    let mut parts = attribute.split(',');
    let offset_secs: f64 = parts.next()?.parse().ok()?;
    let mode_code: i32 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(1);
    let font_size: i32 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(25);
    let color: i32 = parts.next().and_then(|v| v.parse().ok()).unwrap_or(WHITE_COLOR);
    Some(StandardDanmaku {
        offset_ms: (offset_secs * 1000.0).round() as i64,
        mode: DanmakuMode::from_code(mode_code),
        color,
        content: content.to_owned(),
        font_size,
        platform: PLATFORM.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_id_from_url() {
        assert_eq!(
            episode_id_from_url("https://www.bilibili.com/bangumi/play/ep747309?theme=movie"),
            Some("747309".to_owned())
        );
        assert_eq!(
            episode_id_from_url("https://www.bilibili.com/bangumi/play/ep747309"),
            Some("747309".to_owned())
        );
        assert_eq!(episode_id_from_url("https://www.bilibili.com/video/BV1xx"), None);
    }

    #[test]
    fn test_series_episode_renumbering() {
        // A second season counting from 36 is renumbered by index.
        let eps: Vec<SearchEpisode> = (0..3)
            .map(|i| SearchEpisode {
                id: 100 + i,
                title: (36 + i).to_string(),
                long_title: format!("长标题{i}"),
            })
            .collect();
        let episodes = build_series_episodes(&eps);
        let numbers: Vec<&str> = episodes.iter().map(|ep| ep.number.as_str()).collect();
        assert_eq!(numbers, ["1", "2", "3"]);
    }

    #[test]
    fn test_series_episode_junk_filtered() {
        let eps = vec![
            SearchEpisode {
                id: 1,
                title: "1".to_owned(),
                long_title: "第一话".to_owned(),
            },
            SearchEpisode {
                id: 2,
                title: "预告".to_owned(),
                long_title: "PV".to_owned(),
            },
        ];
        let episodes = build_series_episodes(&eps);
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].number, "1");
    }

    #[test]
    fn test_parse_comment_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<i>
  <chatserver>chat.bilibili.com</chatserver>
  <d p="2.603,1,25,16777215,1715077975,0,abc,1">看看</d>
  <d p="13.37,5,25,255,1715077975,0,def,2">前方高能</d>
  <d p="bad,attr">忽略</d>
</i>"#;
        let data = parse_comment_xml(xml).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].offset_ms, 2603);
        assert_eq!(data[0].mode, DanmakuMode::Normal);
        assert_eq!(data[0].content, "看看");
        assert_eq!(data[1].mode, DanmakuMode::Top);
        assert_eq!(data[1].color, 255);
    }
}
