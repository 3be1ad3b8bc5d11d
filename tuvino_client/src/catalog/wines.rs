use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tuvino_tokens::UserIdRef;

use super::{path_segment, query_value, CatalogError};
use crate::ApiClient;

/// A wine in the catalog
///
/// The backend names the identifier and display name inconsistently across
/// endpoints. `wineId`, `wine_id`, and a numeric `id` are all accepted, as are
/// `wineName`, `wine_name`, and `name`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawWine", rename_all = "camelCase")]
pub struct Wine {
    /// The catalog identifier
    pub wine_id: u64,
    /// The display name
    pub wine_name: String,
    /// Red, white, rosé, sparkling, and so on
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub wine_type: Option<String>,
    /// How the wine is made
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elaborate: Option<String>,
    /// The grape varieties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grapes: Option<String>,
    /// Suggested food pairings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harmonize: Option<String>,
    /// Alcohol by volume, in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abv: Option<f64>,
    /// Light, medium, or full-bodied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// The perceived acidity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acidity: Option<String>,
    /// The country of origin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// The growing region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// The producer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winery: Option<String>,
    /// The available vintages, as the backend formats them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vintages: Option<String>,
    /// Whether the current user has marked this wine as a favorite
    pub is_favorite: bool,
}

/// A wine payload without a usable identifier or name
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("wine is missing its {0}")]
pub struct InvalidWine(&'static str);

#[derive(Deserialize)]
struct RawWine {
    #[serde(default, rename = "wineId", alias = "wine_id")]
    wine_id: Option<u64>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "wineName", alias = "wine_name")]
    wine_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    wine_type: Option<String>,
    #[serde(default)]
    elaborate: Option<String>,
    #[serde(default)]
    grapes: Option<String>,
    #[serde(default)]
    harmonize: Option<String>,
    #[serde(default)]
    abv: Option<f64>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    acidity: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    winery: Option<String>,
    #[serde(default)]
    vintages: Option<String>,
    #[serde(default, rename = "isFavorite", alias = "is_favorite")]
    is_favorite: Option<bool>,
}

impl TryFrom<RawWine> for Wine {
    type Error = InvalidWine;

    fn try_from(raw: RawWine) -> Result<Self, Self::Error> {
        let wine_id = raw
            .wine_id
            .or_else(|| raw.id.as_ref().and_then(Value::as_u64))
            .ok_or(InvalidWine("identifier"))?;
        let wine_name = raw
            .wine_name
            .or(raw.name)
            .filter(|n| !n.is_empty())
            .ok_or(InvalidWine("name"))?;

        Ok(Self {
            wine_id,
            wine_name,
            wine_type: raw.wine_type,
            elaborate: raw.elaborate,
            grapes: raw.grapes,
            harmonize: raw.harmonize,
            abv: raw.abv,
            body: raw.body,
            acidity: raw.acidity,
            country: raw.country,
            region: raw.region,
            winery: raw.winery,
            vintages: raw.vintages,
            is_favorite: raw.is_favorite.unwrap_or(false),
        })
    }
}

/// A wine the user has tasted, with their rating
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawRating")]
pub struct RatedWine {
    /// The catalog identifier
    pub wine_id: u64,
    /// The display name, when the backend provides one
    pub wine_name: Option<String>,
    /// The user's rating
    pub rating: Option<f64>,
    /// The user's tasting note
    pub comment: Option<String>,
    /// When the rating was recorded
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
struct RawRating {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "wineId", alias = "wine_id")]
    wine_id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "wineName", alias = "wine_name")]
    wine_name: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default, rename = "createdAt", alias = "created_at")]
    created_at: Option<String>,
}

impl TryFrom<RawRating> for RatedWine {
    type Error = InvalidWine;

    fn try_from(raw: RawRating) -> Result<Self, Self::Error> {
        let wine_id = raw
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .or(raw.wine_id)
            .ok_or(InvalidWine("identifier"))?;

        Ok(Self {
            wine_id,
            wine_name: raw.name.or(raw.wine_name),
            rating: raw.rating,
            comment: raw.comment,
            created_at: raw.created_at,
        })
    }
}

/// The wines a user has favorited and tasted
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WineStatus {
    /// Wines marked as favorites
    pub favorite_wines: Vec<Wine>,
    /// Wines the user has rated
    pub tasted_wines: Vec<RatedWine>,
}

impl WineStatus {
    /// Reads the `[[name, items], ...]` list the status endpoint returns
    ///
    /// Entries that cannot be read are skipped.
    pub fn from_entries(entries: Vec<(String, Vec<Value>)>) -> Self {
        let mut status = Self::default();
        for (name, items) in entries {
            match name.as_str() {
                "favorite_wines" => status.favorite_wines.extend(parse_items(items)),
                "tasted_wines" => status.tasted_wines.extend(parse_items(items)),
                other => tracing::trace!(list = other, "ignoring unknown wine list"),
            }
        }
        status
    }
}

fn parse_items<T: serde::de::DeserializeOwned>(items: Vec<Value>) -> impl Iterator<Item = T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                tracing::debug!(%error, "skipping unreadable wine entry");
                None
            }
        })
}

#[derive(Deserialize)]
struct Recommendations {
    #[serde(default)]
    recommendations: Vec<Value>,
}

impl ApiClient {
    /// Searches the catalog by wine name
    pub async fn search_wines(&self, wine_name: &str) -> Result<Vec<Wine>, CatalogError> {
        let path = format!("/wines/search?wine_name={}", query_value(wine_name));
        let wines: Option<Vec<Value>> = self.get_json(&path).await?;
        Ok(parse_items(wines.unwrap_or_default()).collect())
    }

    /// Fetches a single wine
    pub async fn wine(&self, wine_id: u64) -> Result<Wine, CatalogError> {
        Ok(self.get_json(&format!("/wines/{wine_id}")).await?)
    }

    /// Fetches personalized recommendations for a user
    pub async fn recommendations(
        &self,
        user_id: &UserIdRef,
        limit: u32,
    ) -> Result<Vec<Wine>, CatalogError> {
        let path = format!(
            "/users/recommendations?user_id={}&limit={limit}",
            query_value(user_id.as_str())
        );
        let response: Option<Recommendations> = self.get_json(&path).await?;
        Ok(response
            .map(|r| parse_items(r.recommendations).collect())
            .unwrap_or_default())
    }

    /// Fetches the wines a user has favorited and tasted
    pub async fn wine_status(&self, user_id: &UserIdRef) -> Result<WineStatus, CatalogError> {
        let entries: Option<Vec<(String, Vec<Value>)>> = self
            .get_json(&format!("/users/{}/wines/status", path_segment(user_id)))
            .await?;
        Ok(WineStatus::from_entries(entries.unwrap_or_default()))
    }

    /// Flips a wine's favorite status
    ///
    /// `is_favorite` is the status before the toggle.
    pub async fn toggle_favorite(
        &self,
        user_id: &UserIdRef,
        wine_id: u64,
        is_favorite: bool,
    ) -> Result<(), CatalogError> {
        let path = format!("/users/{}/favorites/{wine_id}", path_segment(user_id));
        if is_favorite {
            self.delete(&path, &()).await?;
        } else {
            self.post(&path, &()).await?;
        }
        Ok(())
    }
}
