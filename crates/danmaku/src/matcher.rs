//! Title normalization and structured matching.
//!
//! Platforms disagree on how they label the same work: season markers come as
//! arabic digits or Chinese numerals, search APIs wrap the hit keyword in
//! highlight markup, and dubbed/cut variants get a suffix in the title. The
//! matcher normalizes all of that before comparing.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::model::{MatchMode, MatchQuery};

/// Chinese numerals for seasons 1..=20, matching how platforms spell them.
pub const CHINESE_NUMERALS: [&str; 20] = [
    "一", "二", "三", "四", "五", "六", "七", "八", "九", "十", "十一", "十二", "十三", "十四",
    "十五", "十六", "十七", "十八", "十九", "二十",
];

static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("<[^>]*>").unwrap());

/// Punctuation and symbol classes, stripped before comparison.
static MARK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{P}\p{S}]").unwrap());

static SEASON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"第\s*(\d{{1,2}}|{})\s*季",
        CHINESE_NUMERALS.join("|")
    ))
    .unwrap()
});

/// Dub/cut variant suffixes, e.g. "普通话版" or "特别篇".
static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(日语|普通话|粤配|中配|中文|英文|粤语)版$|特别篇$").unwrap());

static SPECIALS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"特别篇$").unwrap());

static HIGHLIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<em(\s+class="keyword")?>(.*?)</em>"#).unwrap());

/// Episode titles that are not real episodes (trailers, bonus clips, ...).
static JUNK_EP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("PV|专访|预告|花絮|彩蛋|高光").unwrap());

/// Remove every HTML tag from a title.
pub fn strip_html_tags(title: &str) -> String {
    HTML_TAG_RE.replace_all(title, "").into_owned()
}

/// Strip HTML tags and all punctuation/symbol characters.
pub fn normalize_title(title: &str) -> String {
    MARK_RE.replace_all(&strip_html_tags(title), "").into_owned()
}

/// Remove the season marker ("第N季") from a title, leaving the rest intact.
pub fn strip_season_marker(title: &str) -> String {
    SEASON_RE.replace_all(title, "").into_owned()
}

/// Full comparison form: spaces removed, normalized, season marker stripped.
pub fn normalize_title_season(title: &str) -> String {
    let spaceless = title.replace(' ', "");
    strip_season_marker(&normalize_title(&spaceless))
}

/// Extract the season number from a title's "第N季" marker.
/// Returns -1 when the title carries no marker.
pub fn extract_season(title: &str) -> i32 {
    let Some(captures) = SEASON_RE.captures(title) else {
        return -1;
    };
    let raw = &captures[1];
    match raw.parse::<i32>() {
        Ok(season) => season,
        Err(_) => chinese_numeral(raw),
    }
}

/// Look up a Chinese numeral (一..二十); -1 when unknown.
pub fn chinese_numeral(numeral: &str) -> i32 {
    CHINESE_NUMERALS
        .iter()
        .position(|n| *n == numeral)
        .map_or(-1, |index| index as i32 + 1)
}

/// Chinese spelling of a season number, for platforms that cannot search
/// "S02" style markers.
pub fn chinese_numeral_str(season: i32) -> Option<&'static str> {
    if (1..=20).contains(&season) {
        Some(CHINESE_NUMERALS[season as usize - 1])
    } else {
        None
    }
}

/// Whether a title looks like a dub/cut variant rather than the original.
pub fn is_language_variant(title: &str) -> bool {
    LANGUAGE_RE.is_match(title)
}

/// Whether a title denotes the "specials" pseudo-season.
pub fn is_specials(title: &str) -> bool {
    SPECIALS_RE.is_match(title)
}

/// Whether an episode title is a trailer/bonus entry rather than an episode.
pub fn is_junk_episode_title(title: &str) -> bool {
    JUNK_EP_RE.is_match(title)
}

/// The keyword fragment a search API highlighted, if any.
pub fn highlight_fragment(title: &str) -> Option<&str> {
    HIGHLIGHT_RE
        .captures(title)
        .and_then(|captures| captures.get(2))
        .map(|fragment| fragment.as_str())
}

/// One configured title substitution. Scope is a platform name, or empty for
/// every platform. An optional mode override changes the final comparison for
/// the current call only.
#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    pub regex: Regex,
    pub platform: String,
    pub replacement: String,
    pub mode: Option<MatchMode>,
}

/// Title matcher driven by an ordered, first-match-wins substitution list.
#[derive(Debug, Default)]
pub struct TitleMatcher {
    rules: Vec<SubstitutionRule>,
}

impl TitleMatcher {
    pub fn new(rules: Vec<SubstitutionRule>) -> Self {
        Self { rules }
    }

    /// Decide whether `candidate` satisfies `query`. Never errors; a
    /// non-match is simply `false`.
    pub fn matches(&self, query: &MatchQuery, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        let mut title = candidate.to_owned();

        // Highlight markup is proof the keyword actually hit; ads and
        // recommendations come back without it.
        if query.check_highlight {
            let hit = matches!(highlight_fragment(&title), Some(fragment) if !fragment.is_empty());
            if !hit {
                return false;
            }
            title = strip_html_tags(&title);
        }

        let mut mode = query.mode;
        for rule in &self.rules {
            let in_scope = rule.platform.is_empty() || rule.platform == query.platform;
            if in_scope && rule.regex.is_match(&title) {
                if let Some(override_mode) = rule.mode {
                    mode = override_mode;
                }
                title = rule
                    .regex
                    .replace_all(&title, NoExpand(&rule.replacement))
                    .into_owned();
                break;
            }
        }

        // Search mode: plain containment, season logic does not apply.
        if query.mode == MatchMode::Search {
            let candidate_norm = normalize_title_season(&title).to_lowercase();
            let target_norm = normalize_title_season(&query.title).to_lowercase();
            return candidate_norm.contains(&target_norm);
        }

        // Season 0 is reserved for specials.
        if query.season == 0 {
            return is_specials(&title);
        }

        // Some platforms put the dub variant in the title, some the original.
        // Unless the query itself asks for a variant, variants are rejected.
        if !is_language_variant(&query.title) && is_language_variant(&title) {
            return false;
        }

        if query.season > 0 {
            let season = extract_season(&title);
            if season < 0 {
                // Providers routinely drop the "Season 1" marker.
                if query.season != 1 {
                    return false;
                }
            } else if season != query.season {
                return false;
            }
        }

        let candidate_norm = normalize_title_season(&title).to_lowercase();
        let target_norm = normalize_title_season(&query.title).to_lowercase();
        match mode {
            MatchMode::Ignore => true,
            MatchMode::Equals => candidate_norm.replace(&target_norm, "").is_empty(),
            MatchMode::Contains | MatchMode::Search => candidate_norm.contains(&target_norm),
        }
    }
}
