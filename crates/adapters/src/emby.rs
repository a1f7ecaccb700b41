//! Emby metadata enrichment.
//!
//! Reverse-queries the user's own media server for the canonical name and
//! production year of whatever they are currently playing, narrowing the
//! platform search before fan-out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use danmaku::adapter::{AdapterError, AdapterResult};
use danmaku::search::{EnrichmentInfo, MetadataEnrichment};

const CLIENT_NAME: &str = "danmu-relay";
const ITEM_MOVIE: &str = "Movie";
const ITEM_SERIES: &str = "Series";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ItemsResponse {
    items: Vec<EmbyItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct EmbyItem {
    name: String,
    id: String,
    /// "Season" / "Series" / "Movie"
    #[serde(rename = "Type")]
    kind: String,
    production_year: i32,
    /// Season or episode number.
    index_number: i32,
}

pub struct EmbyEnrichment {
    client: reqwest::Client,
    base_url: String,
    user: String,
    token: String,
}

impl EmbyEnrichment {
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        token: impl Into<String>,
    ) -> AdapterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| AdapterError::http(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            user: user.into(),
            token: token.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        params: &[(&str, &str)],
    ) -> AdapterResult<T> {
        let response = self
            .client
            .get(url)
            .query(params)
            .header("X-Emby-Token", &self.token)
            .header("X-Emby-Client", CLIENT_NAME)
            .header("X-Emby-Device-Name", CLIENT_NAME)
            .send()
            .await
            .map_err(|error| AdapterError::http(error.to_string()))?;
        if !response.status().is_success() {
            return Err(AdapterError::http(format!(
                "emby status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|error| AdapterError::decode(error.to_string()))
    }

    async fn search_items(&self, title: &str, item_type: &str) -> AdapterResult<ItemsResponse> {
        self.get_json(
            format!("{}/emby/Users/{}/Items", self.base_url, self.user),
            &[
                ("Fields", "ProductionYear,Status,EndDate,BasicSyncInfo"),
                ("IncludeItemTypes", item_type),
                ("Recursive", "true"),
                ("SearchTerm", title),
                ("Limit", "50"),
                ("SortBy", "SortName"),
                ("SortOrder", "Ascending"),
            ],
        )
        .await
    }

    async fn seasons(&self, series_id: &str) -> AdapterResult<ItemsResponse> {
        self.get_json(
            format!("{}/emby/Shows/{}/Seasons", self.base_url, series_id),
            &[
                // Seasons carry their own production year; request it.
                ("Fields", "ProductionYear,Status,EndDate,BasicSyncInfo"),
                ("UserId", &self.user),
                ("Recursive", "false"),
            ],
        )
        .await
    }
}

#[async_trait]
impl MetadataEnrichment for EmbyEnrichment {
    async fn search_by_title(
        &self,
        title: &str,
        season_hint: i32,
    ) -> AdapterResult<Option<EnrichmentInfo>> {
        let item_type = if season_hint >= 0 {
            ITEM_SERIES
        } else {
            ITEM_MOVIE
        };
        let result = self.search_items(title, item_type).await?;
        let Some(item) = result.items.first() else {
            return Ok(None);
        };
        if result.items.len() > 1 {
            warn!(title, hits = result.items.len(), "emby matched more than one item");
        }

        let mut year = None;
        match item.kind.as_str() {
            ITEM_SERIES => {
                // Only multi-season series need the per-season year.
                let seasons = self.seasons(&item.id).await?;
                if seasons.items.len() > 1 {
                    year = seasons
                        .items
                        .iter()
                        .find(|season| season.index_number == season_hint)
                        .filter(|season| season.production_year > 0)
                        .map(|season| season.production_year);
                }
            }
            ITEM_MOVIE => {
                if item.production_year > 0 {
                    year = Some(item.production_year);
                }
            }
            _ => {}
        }
        debug!(title, name = %item.name, ?year, "emby enrichment result");

        Ok(Some(EnrichmentInfo {
            canonical_name: item.name.clone(),
            year_min: year,
            year_max: year,
        }))
    }
}
