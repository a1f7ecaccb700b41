//! Wire shapes of the dandan protocol.
//!
//! Field names and envelope layout follow the public API the emulated clients
//! already speak; renames are load-bearing.

use serde::{Deserialize, Serialize};

/// Body of the `POST /match` call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchRequest {
    pub file_name: String,
    pub file_size: i64,
    /// "fileNameOnly" in practice; unused beyond logging.
    #[serde(rename = "matchMod")]
    pub match_mode: String,
    #[serde(rename = "videoDuration")]
    pub duration_secs: i64,
    pub file_hash: String,
}

/// One match result line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchItem {
    /// The id later passed to the comment endpoint.
    pub episode_id: i64,
    pub anime_id: i64,
    pub anime_title: String,
    pub episode_title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "typeDescription")]
    pub type_desc: String,
    pub shift: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub success: bool,
    pub error_code: i32,
    pub error_message: String,
    pub is_matched: bool,
    pub matches: Vec<MatchItem>,
}

impl MatchResponse {
    pub fn empty() -> Self {
        Self {
            success: true,
            error_code: 0,
            error_message: String::new(),
            is_matched: false,
            matches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeItem {
    pub season_id: String,
    pub episode_id: i64,
    pub episode_title: String,
    pub episode_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeItem {
    pub anime_id: i64,
    pub bangumi_id: String,
    pub anime_title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "typeDescription")]
    pub type_desc: String,
    pub image_url: String,
    /// Some clients crash on a missing start date; always populated.
    pub start_date: String,
    pub episode_count: i64,
    pub rating: i32,
    pub is_favorited: bool,
    pub episodes: Vec<EpisodeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeListResponse {
    pub success: bool,
    pub error_code: i32,
    pub animes: Vec<AnimeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BangumiResponse {
    pub success: bool,
    pub error_code: i32,
    pub bangumi: AnimeItem,
}

/// One comment line: `p` packs "offset seconds,mode,color,user id".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub cid: i64,
    pub p: String,
    pub m: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub count: i64,
    pub comments: Vec<Comment>,
}
