use serde::{Deserialize, Serialize};
use serde_json::Value;
use tuvino_tokens::UserIdRef;

use super::{path_segment, CatalogError};
use crate::ApiClient;

/// A group of related preference options, such as body or dryness
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreferenceCategory {
    /// The category's identifier
    pub id: u64,
    /// The category's display name
    pub name: String,
    /// A longer explanation of the category
    #[serde(default)]
    pub description: Option<String>,
}

/// A selectable answer within a [`PreferenceCategory`]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PreferenceOption {
    /// The option's identifier
    pub id: u64,
    /// The label shown to the user
    pub option: String,
    /// A longer explanation of the option
    #[serde(default)]
    pub description: Option<String>,
    /// The machine-readable value stored for this option
    #[serde(default)]
    pub value: Option<String>,
    /// The category this option answers
    pub category: PreferenceCategory,
}

impl PreferenceOption {
    /// Whether this option belongs to the named category, ignoring case
    pub fn is_in_category(&self, name: &str) -> bool {
        self.category.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Serialize)]
struct OptionSelection<'a> {
    option_ids: &'a [u64],
}

impl ApiClient {
    /// Lists every preference option, across all categories
    pub async fn preference_options(&self) -> Result<Vec<PreferenceOption>, CatalogError> {
        let options: Option<Vec<PreferenceOption>> =
            self.get_json("/preferences/options").await?;
        Ok(options.unwrap_or_default())
    }

    /// Fetches a user's preference profile
    ///
    /// The profile's shape is owned by the backend and is returned as-is.
    pub async fn user_preferences(&self, user_id: &UserIdRef) -> Result<Value, CatalogError> {
        Ok(self.get(&format!("/preferences/users/{}", path_segment(user_id))).await?)
    }

    /// Replaces a user's selections within a single category
    pub async fn update_category_preferences(
        &self,
        user_id: &UserIdRef,
        category_id: u64,
        option_ids: &[u64],
    ) -> Result<Value, CatalogError> {
        let path = format!(
            "/preferences/users/{}/categories/{category_id}",
            path_segment(user_id)
        );
        Ok(self.put(&path, &OptionSelection { option_ids }).await?)
    }

    /// Records the options a user picked during onboarding
    ///
    /// At least one option must be selected; an empty selection is rejected
    /// without contacting the backend.
    pub async fn complete_onboarding(
        &self,
        user_id: &UserIdRef,
        option_ids: &[u64],
    ) -> Result<Value, CatalogError> {
        if option_ids.is_empty() {
            return Err(CatalogError::EmptySelection);
        }

        let path = format!("/preferences/users/{}/onboarding", path_segment(user_id));
        Ok(self.post(&path, &OptionSelection { option_ids }).await?)
    }
}
