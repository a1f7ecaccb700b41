//! The dandan protocol operations.

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::{SecondsFormat, TimeZone, Utc};
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use danmaku::{
    AdapterRegistry, EpisodeCandidate, MatchMode, MatchQuery, MediaCandidate, MediaKind,
    SearchOrchestrator, StandardDanmaku, merge,
};

use crate::error::DandanError;
use crate::model::{
    AnimeItem, AnimeListResponse, BangumiResponse, Comment, CommentResponse, EpisodeItem,
    MatchItem, MatchRequest, MatchResponse,
};
use crate::store::IdStore;

/// "Title SxxEyy" file-name convention.
static SERIES_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)\sS(\d{1,3})E(\d{1,3})$").unwrap());

fn dandan_type(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Movie => "movie",
        MediaKind::Series => "tvseries",
    }
}

fn comment_attribute(danmaku: &StandardDanmaku) -> String {
    // Offset is carried in milliseconds internally; the wire wants seconds
    // with two decimals. The trailing 0 stands in for the user id, which some
    // clients require to be present and numeric.
    format!(
        "{:.2},{},{},0",
        danmaku.offset_ms as f64 / 1000.0,
        danmaku.mode.as_code(),
        danmaku.color
    )
}

fn format_start_date(pub_time: i64) -> String {
    match Utc.timestamp_opt(pub_time.max(0), 0) {
        chrono::LocalResult::Single(datetime) => {
            datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
        }
        _ => "1970-01-01T00:00:00.000Z".to_owned(),
    }
}

/// Translates external Match/Comment/Search/Bangumi calls into orchestrated
/// searches and fetches, minting global ids along the way.
pub struct DandanFacade {
    orchestrator: Arc<SearchOrchestrator>,
    registry: Arc<AdapterRegistry>,
    store: Arc<IdStore>,
    /// Per-platform merge window in milliseconds; absent or <= 0 disables.
    merge_windows: FxHashMap<String, i64>,
}

impl DandanFacade {
    pub fn new(
        orchestrator: Arc<SearchOrchestrator>,
        registry: Arc<AdapterRegistry>,
        store: Arc<IdStore>,
        merge_windows: FxHashMap<String, i64>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            store,
            merge_windows,
        }
    }

    pub fn store(&self) -> &Arc<IdStore> {
        &self.store
    }

    /// Match a file name against every platform. A result with no matches is
    /// a success, never an error.
    pub async fn match_file(&self, request: &MatchRequest) -> MatchResponse {
        let mut query = MatchQuery::new(request.file_name.clone());
        query.duration_secs = request.duration_secs;

        // "Title SxxEyy" means a series episode; anything else is treated as
        // a movie-style single video.
        let mut episode_number: Option<String> = None;
        if let Some(captures) = SERIES_FILE_RE.captures(&request.file_name) {
            query.title = captures[1].to_owned();
            query.season = captures[2].parse().unwrap_or(-1);
            // Strip leading zeros: providers number episodes "1", not "01".
            let episode = captures[3]
                .parse::<i64>()
                .map(|n| n.to_string())
                .unwrap_or_else(|_| captures[3].to_owned());
            query.episode = episode.clone();
            episode_number = Some(episode);
        }
        debug!(file_name = %request.file_name, series = episode_number.is_some(), "match request");

        let mut response = MatchResponse::empty();
        for media in self.orchestrator.match_media(query).await {
            if media.episodes.is_empty() {
                continue;
            }
            match &episode_number {
                // Movie-style query: the first episode is the feature.
                None => {
                    response.is_matched = true;
                    response.matches.push(self.match_item(&media, &media.episodes[0]));
                    info!(platform = %media.platform, title = %media.title, "movie match");
                }
                // Series query: providers may number non-numerically, so the
                // episode filter is a plain string comparison.
                Some(number) => {
                    for episode in media.episodes.iter().filter(|ep| ep.number == *number) {
                        response.is_matched = true;
                        response.matches.push(self.match_item(&media, episode));
                        info!(
                            platform = %media.platform,
                            title = %media.title,
                            episode = %episode.number,
                            "episode match"
                        );
                    }
                }
            }
        }
        response
    }

    fn match_item(&self, media: &MediaCandidate, episode: &EpisodeCandidate) -> MatchItem {
        let episode_id = self.store.resolve(&media.platform, &media.id, &episode.id);
        let anime_id = self.store.resolve(&media.platform, &media.id, "");
        MatchItem {
            episode_id,
            anime_id,
            anime_title: format!("{} [{}]", media.title, media.platform),
            episode_title: if episode.title.is_empty() {
                episode.number.clone()
            } else {
                episode.title.clone()
            },
            kind: dandan_type(media.kind).to_owned(),
            type_desc: media.type_desc.clone(),
            shift: 0,
        }
    }

    /// Fetch and assemble the comments behind a previously minted global id.
    /// Read-only against the id store.
    pub async fn comments(&self, id: i64) -> Result<CommentResponse, DandanError> {
        let (platform, _season_id, episode_id) = self
            .store
            .decode(id)
            .ok_or(DandanError::UnknownIdentifier(id))?;
        let adapter = self
            .registry
            .get_by_platform(&platform)
            .ok_or_else(|| DandanError::NoAdapter(platform.clone()))?;

        let mut data = adapter.fetch_danmaku(&episode_id).await?;
        if let Some(window) = self.merge_windows.get(&platform).copied()
            && window > 0
        {
            data = merge(data, window, 0);
        }

        let cid = Utc::now().timestamp();
        let comments: Vec<Comment> = data
            .iter()
            .map(|danmaku| Comment {
                cid,
                p: comment_attribute(danmaku),
                m: danmaku.content.clone(),
            })
            .collect();
        Ok(CommentResponse {
            count: comments.len() as i64,
            comments,
        })
    }

    /// Free-text search across all platforms, returning anime-level entries.
    pub async fn search_anime(&self, title: &str) -> AnimeListResponse {
        let mut query = MatchQuery::new(title);
        query.mode = MatchMode::Search;

        let animes = self
            .orchestrator
            .match_media(query)
            .await
            .into_iter()
            .map(|media| {
                let anime_id = self.store.resolve(&media.platform, &media.id, "");
                let title = format!("{} [{}]", media.title, media.platform);
                self.anime_item(anime_id, title, &media, Vec::new())
            })
            .collect();
        AnimeListResponse {
            success: true,
            error_code: 0,
            animes,
        }
    }

    /// Detail view for an anime-level id: the media entry plus its episode
    /// list, each episode minted into the global id space.
    pub async fn anime_info(&self, id: i64) -> Result<BangumiResponse, DandanError> {
        let (platform, season_id, _) = self
            .store
            .decode(id)
            .ok_or(DandanError::UnknownIdentifier(id))?;
        let adapter = self
            .registry
            .get_by_platform(&platform)
            .ok_or_else(|| DandanError::NoAdapter(platform.clone()))?;

        let media = adapter.media_detail(&season_id).await?;
        let anime_id = self.store.resolve(&media.platform, &media.id, "");
        let episodes = media
            .episodes
            .iter()
            .map(|episode| EpisodeItem {
                season_id: anime_id.to_string(),
                episode_id: self.store.resolve(&media.platform, &media.id, &episode.id),
                episode_title: episode.title.clone(),
                episode_number: episode.number.clone(),
            })
            .collect();
        Ok(BangumiResponse {
            success: true,
            error_code: 0,
            bangumi: self.anime_item(anime_id, media.title.clone(), &media, episodes),
        })
    }

    fn anime_item(
        &self,
        anime_id: i64,
        title: String,
        media: &MediaCandidate,
        episodes: Vec<EpisodeItem>,
    ) -> AnimeItem {
        AnimeItem {
            anime_id,
            bangumi_id: anime_id.to_string(),
            anime_title: title,
            kind: dandan_type(media.kind).to_owned(),
            type_desc: media.type_desc.clone(),
            image_url: media.cover.clone(),
            start_date: format_start_date(media.pub_time),
            episode_count: media.episodes.len() as i64,
            rating: 0,
            is_favorited: false,
            episodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use danmaku::adapter::{AdapterResult, PlatformAdapter};
    use danmaku::model::DanmakuMode;
    use danmaku::search::PlatformOptions;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct StubAdapter {
        platform: &'static str,
        media: Vec<MediaCandidate>,
        danmaku: Vec<StandardDanmaku>,
    }

    #[async_trait]
    impl PlatformAdapter for StubAdapter {
        fn platform(&self) -> &str {
            self.platform
        }

        async fn match_media(&self, _query: MatchQuery) -> AdapterResult<Vec<MediaCandidate>> {
            Ok(self.media.clone())
        }

        async fn fetch_danmaku(&self, _episode_id: &str) -> AdapterResult<Vec<StandardDanmaku>> {
            Ok(self.danmaku.clone())
        }

        async fn media_detail(&self, _season_id: &str) -> AdapterResult<MediaCandidate> {
            self.media
                .first()
                .cloned()
                .ok_or(danmaku::AdapterError::Unsupported)
        }
    }

    fn series(platform: &str, id: &str, title: &str, numbers: &[&str]) -> MediaCandidate {
        MediaCandidate {
            kind: MediaKind::Series,
            id: id.to_owned(),
            title: title.to_owned(),
            description: String::new(),
            cover: String::new(),
            type_desc: "TV动画".to_owned(),
            year: 2024,
            pub_time: 1_700_000_000,
            platform: platform.to_owned(),
            episodes: numbers
                .iter()
                .enumerate()
                .map(|(index, number)| EpisodeCandidate {
                    id: format!("ep{index}"),
                    number: (*number).to_owned(),
                    title: format!("第{number}话"),
                })
                .collect(),
        }
    }

    fn facade_with(adapter: StubAdapter, merge_window: i64) -> DandanFacade {
        let platform = adapter.platform.to_owned();
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(adapter));
        let registry = Arc::new(registry);

        let mut options = FxHashMap::default();
        options.insert(
            platform.clone(),
            PlatformOptions {
                priority: 1,
                highlight_markup: false,
            },
        );
        let orchestrator = Arc::new(SearchOrchestrator::new(
            Arc::clone(&registry),
            options,
            None,
            Duration::from_secs(5),
            CancellationToken::new(),
        ));

        let dir = std::env::temp_dir().join("dandan-facade-test-ids.json.gz");
        let store = Arc::new(IdStore::new(dir));

        let mut merge_windows = FxHashMap::default();
        if merge_window > 0 {
            merge_windows.insert(platform, merge_window);
        }
        DandanFacade::new(orchestrator, registry, store, merge_windows)
    }

    #[tokio::test]
    async fn test_series_match_filters_episode_number() {
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: vec![series("bilibili", "ss100", "某剧", &["4", "5", "6"])],
                danmaku: Vec::new(),
            },
            0,
        );

        let request = MatchRequest {
            file_name: "某剧 S01E05".to_owned(),
            ..Default::default()
        };
        let response = facade.match_file(&request).await;

        assert!(response.is_matched);
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].anime_title, "某剧 [bilibili]");
        assert_eq!(response.matches[0].kind, "tvseries");

        // Repeating the call reuses the same minted id.
        let again = facade.match_file(&request).await;
        assert_eq!(again.matches[0].episode_id, response.matches[0].episode_id);
    }

    #[tokio::test]
    async fn test_movie_match_takes_first_episode() {
        let mut movie = series("bilibili", "ss7", "某电影", &["1", "2"]);
        movie.kind = MediaKind::Movie;
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: vec![movie],
                danmaku: Vec::new(),
            },
            0,
        );

        let request = MatchRequest {
            file_name: "某电影".to_owned(),
            ..Default::default()
        };
        let response = facade.match_file(&request).await;

        assert!(response.is_matched);
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].kind, "movie");
        assert_eq!(response.matches[0].episode_title, "第1话");
    }

    #[tokio::test]
    async fn test_no_hits_is_success() {
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: Vec::new(),
                danmaku: Vec::new(),
            },
            0,
        );
        let response = facade
            .match_file(&MatchRequest {
                file_name: "不存在 S01E01".to_owned(),
                ..Default::default()
            })
            .await;
        assert!(response.success);
        assert!(!response.is_matched);
        assert!(response.matches.is_empty());
    }

    #[tokio::test]
    async fn test_comments_round_trip_and_formatting() {
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: vec![series("bilibili", "ss100", "某剧", &["1"])],
                danmaku: vec![StandardDanmaku {
                    offset_ms: 1234,
                    mode: DanmakuMode::Top,
                    color: 255,
                    content: "前方高能".to_owned(),
                    font_size: 25,
                    platform: "bilibili".to_owned(),
                }],
            },
            0,
        );

        let matched = facade
            .match_file(&MatchRequest {
                file_name: "某剧 S01E01".to_owned(),
                ..Default::default()
            })
            .await;
        let id = matched.matches[0].episode_id;

        let comments = facade.comments(id).await.unwrap();
        assert_eq!(comments.count, 1);
        assert_eq!(comments.comments[0].p, "1.23,5,255,0");
        assert_eq!(comments.comments[0].m, "前方高能");
    }

    #[tokio::test]
    async fn test_comments_unknown_id() {
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: Vec::new(),
                danmaku: Vec::new(),
            },
            0,
        );
        let error = facade.comments(424242).await.unwrap_err();
        assert!(matches!(error, DandanError::UnknownIdentifier(424242)));
    }

    #[tokio::test]
    async fn test_comments_no_adapter() {
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: Vec::new(),
                danmaku: Vec::new(),
            },
            0,
        );
        // Mint an id for a platform that has no live adapter.
        let orphan = facade.store().resolve("youku", "ss1", "ep1");
        let error = facade.comments(orphan).await.unwrap_err();
        assert!(matches!(error, DandanError::NoAdapter(platform) if platform == "youku"));
    }

    #[tokio::test]
    async fn test_comments_merge_window_applied() {
        let duplicate = |offset_ms| StandardDanmaku {
            offset_ms,
            mode: DanmakuMode::Normal,
            color: danmaku::WHITE_COLOR,
            content: "同款".to_owned(),
            font_size: 25,
            platform: "bilibili".to_owned(),
        };
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: vec![series("bilibili", "ss100", "某剧", &["1"])],
                danmaku: vec![duplicate(999), duplicate(1000), duplicate(2500)],
            },
            1000,
        );

        let matched = facade
            .match_file(&MatchRequest {
                file_name: "某剧 S01E01".to_owned(),
                ..Default::default()
            })
            .await;
        let comments = facade.comments(matched.matches[0].episode_id).await.unwrap();
        assert_eq!(comments.count, 2);
    }

    #[tokio::test]
    async fn test_search_and_bangumi() {
        let facade = facade_with(
            StubAdapter {
                platform: "bilibili",
                media: vec![series("bilibili", "ss100", "某剧", &["1", "2"])],
                danmaku: Vec::new(),
            },
            0,
        );

        let listing = facade.search_anime("某剧").await;
        assert_eq!(listing.animes.len(), 1);
        let anime = &listing.animes[0];
        assert_eq!(anime.anime_title, "某剧 [bilibili]");
        assert_eq!(anime.episode_count, 2);
        assert!(!anime.start_date.is_empty());

        let info = facade.anime_info(anime.anime_id).await.unwrap();
        assert_eq!(info.bangumi.episodes.len(), 2);
        assert_eq!(info.bangumi.episodes[0].season_id, anime.anime_id.to_string());
    }
}
