use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tuvino_tokens::UserIdRef;

use super::CatalogError;
use crate::ApiClient;

/// A wine suggested for a photographed menu
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MenuWineRecommendation {
    /// The wine as named on the menu
    pub wine_name: String,
    /// Why this wine suits the menu
    pub reason: String,
    /// The price printed on the menu, as written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_price: Option<String>,
    /// Red, white, sparkling, and so on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wine_type: Option<String>,
}

/// The backend's reading of a menu photo
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MenuRecommendationResponse {
    /// A short description of what was found on the menu
    pub summary: String,
    /// The suggested wines, best match first
    #[serde(default)]
    pub recommendations: Vec<MenuWineRecommendation>,
}

#[derive(Serialize)]
struct MenuImage<'a> {
    user_id: &'a UserIdRef,
    image_base64: String,
}

impl ApiClient {
    /// Sends a photo of a wine menu for analysis
    ///
    /// `image` holds the raw bytes of the photo. It is sent base64-encoded.
    #[tracing::instrument(level = "debug", skip(self, image), fields(image_len = image.len()))]
    pub async fn parse_menu(
        &self,
        user_id: &UserIdRef,
        image: &[u8],
    ) -> Result<MenuRecommendationResponse, CatalogError> {
        let body = MenuImage {
            user_id,
            image_base64: STANDARD.encode(image),
        };
        Ok(self.post_json("/menu/parse", &body).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tuvino_tokens::UserId;

    use super::*;

    #[test]
    fn image_is_sent_as_standard_base64() -> color_eyre::Result<()> {
        let user_id = UserId::from_static("u-1");
        let body = MenuImage {
            user_id: &user_id,
            image_base64: STANDARD.encode([0xff, 0xd8, 0xff]),
        };

        assert_eq!(
            serde_json::to_value(&body)?,
            json!({"user_id": "u-1", "image_base64": "/9j/"})
        );
        Ok(())
    }

    #[test]
    fn optional_recommendation_fields_may_be_absent() -> color_eyre::Result<()> {
        let response: MenuRecommendationResponse = serde_json::from_value(json!({
            "summary": "Seafood-heavy menu",
            "recommendations": [
                {"wine_name": "Albariño", "reason": "Bright acidity", "wine_type": "white"},
            ],
        }))?;

        assert_eq!(response.recommendations.len(), 1);
        assert_eq!(response.recommendations[0].estimated_price, None);
        assert_eq!(
            response.recommendations[0].wine_type.as_deref(),
            Some("white")
        );
        Ok(())
    }
}
