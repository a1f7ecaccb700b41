//! Platform-neutral data types shared across adapters and the facade.

use serde::{Deserialize, Serialize};

/// Default danmaku color (white, 0xFFFFFF).
pub const WHITE_COLOR: i32 = 16777215;

/// Whether a search hit is a single feature or an episodic series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

/// Display position of a comment, using the wire protocol's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DanmakuMode {
    #[default]
    Normal,
    Bottom,
    Top,
}

impl DanmakuMode {
    /// Protocol code: 1 scrolling, 4 bottom, 5 top.
    pub fn as_code(self) -> i32 {
        match self {
            DanmakuMode::Normal => 1,
            DanmakuMode::Bottom => 4,
            DanmakuMode::Top => 5,
        }
    }

    /// Map a platform mode code onto the three supported positions.
    /// Unknown codes (reverse, advanced, ...) fall back to scrolling.
    pub fn from_code(code: i32) -> Self {
        match code {
            4 => DanmakuMode::Bottom,
            5 => DanmakuMode::Top,
            _ => DanmakuMode::Normal,
        }
    }
}

/// A single timed comment, normalized from whatever the platform returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardDanmaku {
    /// Offset from video start, in milliseconds.
    pub offset_ms: i64,
    pub mode: DanmakuMode,
    /// RGB color as a plain integer, e.g. 16777215 for white.
    pub color: i32,
    pub content: String,
    pub font_size: i32,
    /// Owning platform name.
    pub platform: String,
}

impl StandardDanmaku {
    pub fn new(offset_ms: i64, content: impl Into<String>) -> Self {
        Self {
            offset_ms,
            mode: DanmakuMode::Normal,
            color: WHITE_COLOR,
            content: content.into(),
            font_size: 25,
            platform: String::new(),
        }
    }
}

/// Comparison strategy for the final title check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Removing the query from the candidate must leave an empty string.
    #[default]
    Equals,
    /// Substring containment.
    Contains,
    /// Title comparison always succeeds (season checks still apply).
    Ignore,
    /// Plain containment on season-stripped titles, bypassing season logic.
    Search,
}

/// A structured title query. Every fan-out task receives its own clone;
/// adapters never observe another adapter's mutations.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub title: String,
    /// -1 = unset, 0 = the "specials" pseudo-season, >0 = explicit season.
    pub season: i32,
    /// Requested episode number as a string; providers may number
    /// non-numerically.
    pub episode: String,
    pub duration_secs: i64,
    /// Production-year bounds, inclusive, refined by metadata enrichment.
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub mode: MatchMode,
    /// Platform the query is currently addressed to; set by the orchestrator.
    pub platform: String,
    /// Require highlight markup around the matched keyword in candidate
    /// titles. Only set for platforms whose search API emits it.
    pub check_highlight: bool,
}

impl MatchQuery {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            season: -1,
            episode: String::new(),
            duration_secs: 0,
            year_min: None,
            year_max: None,
            mode: MatchMode::Equals,
            platform: String::new(),
            check_highlight: false,
        }
    }

    /// Check a candidate's production year against the query bounds.
    /// Unset bounds accept everything.
    pub fn matches_year(&self, year: i32) -> bool {
        if let Some(min) = self.year_min
            && year < min
        {
            return false;
        }
        if let Some(max) = self.year_max
            && year > max
        {
            return false;
        }
        true
    }
}

/// One episode inside a [`MediaCandidate`].
#[derive(Debug, Clone)]
pub struct EpisodeCandidate {
    /// Platform-native episode id.
    pub id: String,
    /// Episode number as the provider labels it ("1", "SP2", ...).
    pub number: String,
    pub title: String,
}

/// A media search hit from one platform, with its ordered episode list.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    pub kind: MediaKind,
    /// Platform-native season/media id.
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover: String,
    /// Category label the platform uses ("TV动画", "电影", ...).
    pub type_desc: String,
    pub year: i32,
    /// Publish time as a unix timestamp in seconds, 0 when unknown.
    pub pub_time: i64,
    pub platform: String,
    pub episodes: Vec<EpisodeCandidate>,
}
