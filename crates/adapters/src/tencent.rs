//! Tencent Video adapter.
//!
//! Search is a POST to the multi-terminal search service, episode lists come
//! from the page server (following every episode-range tab), and danmaku is
//! fetched per time segment after reading the segment index. Segment fetches
//! fan out through the shared worker pool.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use danmaku::adapter::{AdapterError, AdapterResult, PlatformAdapter};
use danmaku::matcher::TitleMatcher;
use danmaku::model::{
    DanmakuMode, EpisodeCandidate, MatchQuery, MediaCandidate, MediaKind, StandardDanmaku,
    WHITE_COLOR,
};
use danmaku::pool;

use crate::http::PlatformHttp;

pub const PLATFORM: &str = "tencent";

const SEARCH_API: &str = "https://pbaccess.video.qq.com/trpc.videosearch.mobile_search.MultiTerminalSearch/MbSearch?vversion_platform=2";
const PAGE_API: &str = "https://pbaccess.video.qq.com/trpc.universal_backend_service.page_server_rpc.PageServer/GetPageData?video_appid=3000010&vversion_name=8.2.96&vversion_platform=2";
const SEGMENT_CONFIG_API: &str =
    "https://pbaccess.video.qq.com/trpc.barrage.custom_barrage.CustomBarrage/GetDMStartUpConfig";

const SERIES_EP_PAGE: &str = "vsite_episode_list";
const SERIES_INFO_PAGE: &str = "detail_page_introduction";

/// The platform rate-limits the page server; four workers are enough.
const SERIES_FETCH_WORKERS: usize = 4;

/// Hits carrying these markers point at off-site content the platform cannot
/// actually play.
static EXCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("全网搜|外站").unwrap());

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    version: &'a str,
    #[serde(rename = "clientType")]
    client_type: i32,
    /// Required even when empty; the service rejects requests without it.
    #[serde(rename = "filterValue")]
    filter_value: &'a str,
    query: &'a str,
    pagenum: i32,
    #[serde(rename = "isPrefetch")]
    is_prefetch: bool,
    pagesize: i32,
    #[serde(rename = "queryFrom")]
    query_from: i32,
    uuid: &'a str,
    retry: i32,
    #[serde(rename = "searchDatakey")]
    search_data_key: &'a str,
    #[serde(rename = "transInfo")]
    trans_info: &'a str,
    #[serde(rename = "isneedQc")]
    need_qc: bool,
    #[serde(rename = "preQid")]
    pre_qid: &'a str,
    #[serde(rename = "adClientInfo")]
    ad_client_info: &'a str,
    #[serde(rename = "extraInfo")]
    extra_info: SearchExtraInfo<'a>,
}

#[derive(Debug, Serialize)]
struct SearchExtraInfo<'a> {
    #[serde(rename = "isNewMarkLabel")]
    is_new_mark_label: &'a str,
    multi_terminal_pc: &'a str,
    #[serde(rename = "themeType")]
    theme_type: &'a str,
    #[serde(rename = "sugRelatedIds")]
    sug_related_ids: &'a str,
    #[serde(rename = "appVersion")]
    app_version: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    ret: i32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default, rename = "normalList")]
    normal_list: SearchItemList,
    #[serde(default, rename = "areaBoxList")]
    area_box_list: Vec<AreaBox>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchItemList {
    #[serde(default, rename = "itemList")]
    item_list: Vec<SearchItem>,
}

#[derive(Debug, Default, Deserialize)]
struct AreaBox {
    #[serde(default, rename = "boxId")]
    box_id: String,
    #[serde(default, rename = "itemList")]
    item_list: Vec<SearchItem>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct SearchItem {
    #[serde(default)]
    doc: SearchDoc,
    #[serde(default, rename = "videoInfo")]
    video_info: VideoInfo,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct SearchDoc {
    /// The cid, key to everything else.
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct VideoInfo {
    #[serde(rename = "descrip")]
    desc: String,
    #[serde(rename = "imgUrl")]
    img_url: String,
    #[serde(rename = "typeName")]
    type_name: String,
    year: i32,
    title: String,
    /// Carries the "full web search" marker for external content.
    #[serde(rename = "subTitle")]
    sub_title: String,
    #[serde(rename = "subjectDoc")]
    subject_doc: SubjectDoc,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct SubjectDoc {
    #[serde(default, rename = "videoNum")]
    video_num: i32,
}

#[derive(Debug, Serialize)]
struct SeriesRequest<'a> {
    has_cache: i32,
    page_params: PageParams<'a>,
}

#[derive(Debug, Serialize)]
struct PageParams<'a> {
    req_from: &'a str,
    page_id: &'a str,
    page_type: &'a str,
    id_type: &'a str,
    page_size: &'a str,
    cid: &'a str,
    vid: &'a str,
    lid: &'a str,
    page_num: &'a str,
    page_context: &'a str,
    detail_page_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    ret: i32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: SeriesData,
}

#[derive(Debug, Default, Deserialize)]
struct SeriesData {
    #[serde(default, rename = "module_list_datas")]
    module_list_data: Vec<ModuleListData>,
}

#[derive(Debug, Default, Deserialize)]
struct ModuleListData {
    #[serde(default, rename = "module_datas")]
    module_data: Vec<ModuleData>,
}

#[derive(Debug, Default, Deserialize)]
struct ModuleData {
    #[serde(default, rename = "module_params")]
    module_params: ModuleParams,
    #[serde(default, rename = "item_data_lists")]
    item_data_lists: ItemDataLists,
}

#[derive(Debug, Default, Deserialize)]
struct ModuleParams {
    /// JSON string describing the episode-range tabs ("1-30", "31-50", ...).
    #[serde(default)]
    tabs: String,
}

#[derive(Debug, Default, Deserialize)]
struct ItemDataLists {
    #[serde(default, rename = "item_datas")]
    item_data: Vec<SeriesItem>,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct SeriesItem {
    #[serde(default, rename = "item_params")]
    params: SeriesItemParams,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
struct SeriesItemParams {
    vid: String,
    /// Episode number as displayed, usually zero-padded ("01").
    c_title_output: String,
    /// Episode title on the episode list page, series title on the detail
    /// page.
    title: String,
    is_trailer: String,
    /// "1" = movie, "2" = series, "3" = anime, ...
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct SeriesTab {
    #[serde(default)]
    selected: bool,
    #[serde(default)]
    page_context: String,
}

#[derive(Debug, Deserialize)]
struct SegmentConfigResponse {
    ret: i32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: SegmentConfigData,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentConfigData {
    #[serde(default)]
    segment_index: FxHashMap<String, SegmentIndexEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentIndexEntry {
    #[serde(default)]
    segment_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct BarrageResponse {
    #[serde(default)]
    barrage_list: Vec<BarrageItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BarrageItem {
    content: String,
    /// JSON string with color and position.
    content_style: String,
    /// Offset in milliseconds, as a string.
    time_offset: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContentStyle {
    color: String,
    gradient_colors: Vec<String>,
    position: i32,
}

pub struct TencentAdapter {
    http: PlatformHttp,
    matcher: Arc<TitleMatcher>,
    max_workers: usize,
}

impl TencentAdapter {
    pub fn new(mut http: PlatformHttp, matcher: Arc<TitleMatcher>, max_workers: usize) -> Self {
        http.set_origin_and_referer("https://v.qq.com/");
        Self {
            http,
            matcher,
            max_workers,
        }
    }
}

#[async_trait]
impl PlatformAdapter for TencentAdapter {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn match_media(&self, query: MatchQuery) -> AdapterResult<Vec<MediaCandidate>> {
        let body = SearchRequest {
            version: "25101301",
            client_type: 1,
            filter_value: "",
            query: &query.title,
            pagenum: 0,
            is_prefetch: true,
            pagesize: 30,
            query_from: 102,
            uuid: "",
            retry: 0,
            search_data_key: "",
            trans_info: "",
            need_qc: true,
            pre_qid: "",
            ad_client_info: "",
            extra_info: SearchExtraInfo {
                is_new_mark_label: "1",
                multi_terminal_pc: "1",
                theme_type: "1",
                sug_related_ids: "",
                app_version: "",
            },
        };
        let response = self
            .http
            .post(SEARCH_API)
            .json(&body)
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
        if result.ret != 0 {
            return Err(AdapterError::platform(format!(
                "search ret {}: {}",
                result.ret, result.msg
            )));
        }

        let mut items = result.data.normal_list.item_list;
        // Some queries only come back through the area boxes.
        for area_box in result.data.area_box_list {
            if area_box.box_id == "MainNeed" {
                items.extend(area_box.item_list);
            }
        }
        let items = dedup_by_title(items);

        let mut survivors = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            if EXCLUDE_RE.is_match(&item.video_info.sub_title) {
                debug!(title = %item.video_info.title, "tencent hit is external content");
                continue;
            }
            if item.video_info.year <= 0 || !query.matches_year(item.video_info.year) {
                continue;
            }
            if !self.matcher.matches(&query, &item.video_info.title) {
                continue;
            }
            let kind = if item.video_info.type_name == "电影" {
                MediaKind::Movie
            } else if item.video_info.subject_doc.video_num <= 0 {
                continue;
            } else {
                MediaKind::Series
            };
            survivors.push((index, item, kind));
        }
        if survivors.is_empty() {
            return Ok(Vec::new());
        }

        // One episode-list request per hit.
        let http = self.http.clone();
        let season = query.season;
        let mut built = pool::fan_out(
            SERIES_FETCH_WORKERS,
            survivors,
            move |(index, item, kind): (usize, SearchItem, MediaKind)| {
                let http = http.clone();
                async move {
                    let series = match fetch_series_episodes(&http, &item.doc.id).await {
                        Ok(series) => series,
                        Err(error) => {
                            warn!(cid = %item.doc.id, error = %error, "tencent series fetch failed");
                            return None;
                        }
                    };
                    let episodes = build_episodes(&series, season);
                    Some((
                        index,
                        MediaCandidate {
                            kind,
                            id: item.doc.id,
                            title: item.video_info.title,
                            description: item.video_info.desc,
                            cover: item.video_info.img_url,
                            type_desc: item.video_info.type_name,
                            year: item.video_info.year,
                            pub_time: 0,
                            platform: PLATFORM.to_owned(),
                            episodes,
                        },
                    ))
                }
            },
        )
        .await;

        // The pool reports in completion order; restore search order.
        built.sort_by_key(|(index, _)| *index);
        Ok(built.into_iter().map(|(_, media)| media).collect())
    }

    async fn fetch_danmaku(&self, episode_id: &str) -> AdapterResult<Vec<StandardDanmaku>> {
        let body = serde_json::json!({
            "vid": episode_id,
            "engine_version": "2.1.10",
        });
        let response = self
            .http
            .post(SEGMENT_CONFIG_API)
            .json(&body)
            .send()
            .await
            .map_err(|error| AdapterError::http(error.to_string()))?;
        let config: SegmentConfigResponse = response
            .json()
            .await
            .map_err(|error| AdapterError::decode(error.to_string()))?;
        if config.ret != 0 {
            return Err(AdapterError::platform(format!(
                "segment config ret {}: {}",
                config.ret, config.msg
            )));
        }

        let segments: Vec<String> = config
            .data
            .segment_index
            .into_values()
            .map(|entry| entry.segment_name)
            .filter(|name| !name.is_empty())
            .collect();
        if segments.is_empty() {
            warn!(vid = episode_id, "tencent video has no danmaku segments");
            return Ok(Vec::new());
        }
        debug!(vid = episode_id, segments = segments.len(), "tencent segment index loaded");

        let http = self.http.clone();
        let vid = episode_id.to_owned();
        let chunks = pool::fan_out(self.max_workers, segments, move |segment: String| {
            let http = http.clone();
            let vid = vid.clone();
            async move {
                match fetch_segment(&http, &vid, &segment).await {
                    Ok(data) => Some(data),
                    Err(error) => {
                        warn!(vid = %vid, segment = %segment, error = %error, "tencent segment fetch failed");
                        None
                    }
                }
            }
        })
        .await;

        let mut result: Vec<StandardDanmaku> = chunks.into_iter().flatten().collect();
        // Workers finish out of order; restore playback order.
        result.sort_by_key(|danmaku| danmaku.offset_ms);
        info!(vid = episode_id, size = result.len(), "tencent danmaku fetched");
        Ok(result)
    }

    async fn media_detail(&self, season_id: &str) -> AdapterResult<MediaCandidate> {
        let info = do_series_request(&self.http, season_id, "", SERIES_INFO_PAGE, "").await?;
        let info_items = series_items(&info)?;
        let first = info_items
            .first()
            .ok_or_else(|| AdapterError::platform("empty detail payload"))?;
        let kind = if first.params.kind == "1" {
            MediaKind::Movie
        } else {
            MediaKind::Series
        };
        let title = first.params.title.clone();

        let series = fetch_series_episodes(&self.http, season_id).await?;
        Ok(MediaCandidate {
            kind,
            id: season_id.to_owned(),
            title,
            description: String::new(),
            cover: String::new(),
            type_desc: String::new(),
            year: 0,
            pub_time: 0,
            platform: PLATFORM.to_owned(),
            episodes: build_episodes(&series, -1),
        })
    }
}

async fn do_series_request(
    http: &PlatformHttp,
    cid: &str,
    vid: &str,
    page_id: &str,
    page_context: &str,
) -> AdapterResult<SeriesResponse> {
    let body = SeriesRequest {
        has_cache: 1,
        page_params: PageParams {
            req_from: "web_vsite",
            page_id,
            page_type: "detail_operation",
            id_type: "1",
            page_size: "",
            cid,
            vid,
            lid: "",
            page_num: "",
            page_context,
            detail_page_type: "1",
        },
    };
    let response = http
        .post(PAGE_API)
        .json(&body)
        .send()
        .await
        .map_err(|error| AdapterError::http(error.to_string()))?;
    response
        .json()
        .await
        .map_err(|error| AdapterError::decode(error.to_string()))
}

fn series_items(response: &SeriesResponse) -> AdapterResult<Vec<SeriesItem>> {
    if response.ret != 0 {
        return Err(AdapterError::platform(format!(
            "series ret {}: {}",
            response.ret, response.msg
        )));
    }
    let module = response
        .data
        .module_list_data
        .first()
        .and_then(|list| list.module_data.first())
        .ok_or_else(|| AdapterError::platform("empty series payload"))?;
    Ok(module.item_data_lists.item_data.clone())
}

/// Fetch the complete episode list for a cid, following every non-selected
/// episode-range tab.
async fn fetch_series_episodes(
    http: &PlatformHttp,
    cid: &str,
) -> AdapterResult<Vec<SeriesItem>> {
    let first = do_series_request(http, cid, "", SERIES_EP_PAGE, "").await?;
    let mut items = series_items(&first)?;

    let tabs_raw = first
        .data
        .module_list_data
        .first()
        .and_then(|list| list.module_data.first())
        .map(|module| module.module_params.tabs.clone())
        .unwrap_or_default();
    if tabs_raw.is_empty() {
        return Ok(items);
    }
    let tabs: Vec<SeriesTab> = serde_json::from_str(&tabs_raw)
        .map_err(|error| AdapterError::decode(format!("series tabs: {error}")))?;

    for tab in tabs.iter().filter(|tab| !tab.selected) {
        match do_series_request(http, cid, "", SERIES_EP_PAGE, &tab.page_context).await {
            Ok(response) => match series_items(&response) {
                Ok(mut more) => items.append(&mut more),
                Err(error) => warn!(cid, error = %error, "tencent series tab decode failed"),
            },
            Err(error) => warn!(cid, error = %error, "tencent series tab fetch failed"),
        }
    }
    Ok(items)
}

async fn fetch_segment(
    http: &PlatformHttp,
    vid: &str,
    segment: &str,
) -> AdapterResult<Vec<StandardDanmaku>> {
    let url = format!("https://dm.video.qq.com/barrage/segment/{vid}/{segment}");
    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|error| AdapterError::http(error.to_string()))?;
    let result: BarrageResponse = response
        .json()
        .await
        .map_err(|error| AdapterError::decode(error.to_string()))?;
    Ok(result
        .barrage_list
        .into_iter()
        .filter_map(parse_barrage)
        .collect())
}

fn parse_barrage(item: BarrageItem) -> Option<StandardDanmaku> {
    let offset_ms = item.time_offset.parse::<i64>().ok()?;

    let mut mode = DanmakuMode::Normal;
    let mut color = WHITE_COLOR;
    if !item.content_style.is_empty()
        && let Ok(style) = serde_json::from_str::<ContentStyle>(&item.content_style)
    {
        mode = match style.position {
            2 => DanmakuMode::Top,
            3 => DanmakuMode::Bottom,
            _ => DanmakuMode::Normal,
        };
        let hex = style
            .gradient_colors
            .first()
            .cloned()
            .unwrap_or(style.color);
        if let Ok(value) = u32::from_str_radix(&hex, 16) {
            color = value as i32;
        }
    }

    Some(StandardDanmaku {
        offset_ms,
        mode,
        color,
        content: item.content,
        font_size: 25,
        platform: PLATFORM.to_owned(),
    })
}

/// The search result mixes the same work from several boxes; keep the first
/// occurrence of each title.
fn dedup_by_title(items: Vec<SearchItem>) -> Vec<SearchItem> {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    items
        .into_iter()
        .filter(|item| seen.insert(item.video_info.title.clone()))
        .collect()
}

/// Map raw series items onto episode candidates. For specials (season 0) the
/// platform lists newest first, so numbering runs back to front.
fn build_episodes(items: &[SeriesItem], season: i32) -> Vec<EpisodeCandidate> {
    let mut episodes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let params = &item.params;
        if params.is_trailer == "1" || params.vid.is_empty() {
            continue;
        }
        let mut number = params.c_title_output.trim().to_owned();
        if let Ok(parsed) = number.parse::<i64>() {
            // Strip zero padding: "01" and "1" must compare equal.
            number = parsed.to_string();
        }
        if number.is_empty() {
            number = (index + 1).to_string();
        }
        episodes.push(EpisodeCandidate {
            id: params.vid.clone(),
            number,
            title: params.title.clone(),
        });
    }

    if season == 0 {
        let total = episodes.len();
        for (index, episode) in episodes.iter_mut().enumerate() {
            episode.number = (total - index).to_string();
        }
    }
    episodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_item(vid: &str, number: &str, title: &str, trailer: bool) -> SeriesItem {
        SeriesItem {
            params: SeriesItemParams {
                vid: vid.to_owned(),
                c_title_output: number.to_owned(),
                title: title.to_owned(),
                is_trailer: (if trailer { "1" } else { "0" }).to_owned(),
                kind: "2".to_owned(),
            },
        }
    }

    #[test]
    fn test_build_episodes_numbering() {
        let items = vec![
            series_item("vid1", "01", "第一集", false),
            series_item("vid2", "02", "第二集", false),
            series_item("", "03", "坏数据", false),
            series_item("vid3", "预告", "预告片", true),
            series_item("vid4", "", "无编号", false),
        ];
        let episodes = build_episodes(&items, -1);
        let numbers: Vec<&str> = episodes.iter().map(|ep| ep.number.as_str()).collect();
        // Zero padding stripped, empty numbers fall back to the index.
        assert_eq!(numbers, ["1", "2", "5"]);
    }

    #[test]
    fn test_build_episodes_specials_reversed() {
        let items = vec![
            series_item("vid1", "", "最新剧场版", false),
            series_item("vid2", "", "第二部", false),
            series_item("vid3", "", "第一部", false),
        ];
        let episodes = build_episodes(&items, 0);
        let numbers: Vec<&str> = episodes.iter().map(|ep| ep.number.as_str()).collect();
        assert_eq!(numbers, ["3", "2", "1"]);
    }

    #[test]
    fn test_parse_barrage() {
        let item = BarrageItem {
            content: "弹幕".to_owned(),
            content_style:
                r#"{"color":"ff0000","gradient_colors":["44EB1F","44EB1F"],"position":2}"#
                    .to_owned(),
            time_offset: "12345".to_owned(),
        };
        let danmaku = parse_barrage(item).unwrap();
        assert_eq!(danmaku.offset_ms, 12345);
        assert_eq!(danmaku.mode, DanmakuMode::Top);
        assert_eq!(danmaku.color, 0x44EB1F);

        let plain = BarrageItem {
            content: "普通".to_owned(),
            content_style: String::new(),
            time_offset: "1".to_owned(),
        };
        let danmaku = parse_barrage(plain).unwrap();
        assert_eq!(danmaku.mode, DanmakuMode::Normal);
        assert_eq!(danmaku.color, WHITE_COLOR);

        let bad_offset = BarrageItem {
            content: "x".to_owned(),
            content_style: String::new(),
            time_offset: "abc".to_owned(),
        };
        assert!(parse_barrage(bad_offset).is_none());
    }

    #[test]
    fn test_dedup_by_title() {
        let entry = |title: &str| SearchItem {
            doc: SearchDoc {
                id: title.to_owned(),
            },
            video_info: VideoInfo {
                title: title.to_owned(),
                ..Default::default()
            },
        };
        let deduped = dedup_by_title(vec![entry("某剧"), entry("某剧"), entry("别的剧")]);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_exclude_markers() {
        assert!(EXCLUDE_RE.is_match("全网搜索结果"));
        assert!(EXCLUDE_RE.is_match("外站资源"));
        assert!(!EXCLUDE_RE.is_match("独播"));
    }
}
