use serde::{Deserialize, Serialize};

/// One entry of `/crimes-street-dates`: a published month and the forces
/// that have stop-and-search data for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableDate {
    pub date: String,
    #[serde(rename = "stop-and-search", default)]
    pub stop_and_search: Option<Vec<String>>,
}

impl AvailableDate {
    /// True if `force` published stop-and-search data for this month.
    /// Entries without a stop-and-search list never match.
    pub fn covers_force(&self, force: &str) -> bool {
        self.stop_and_search
            .as_ref()
            .is_some_and(|forces| forces.iter().any(|f| f == force))
    }
}

/// A single stop-and-search event as returned by `/stops-force`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawStopSearch {
    #[serde(default)]
    pub age_range: Option<String>,
    #[serde(default)]
    pub officer_defined_ethnicity: Option<String>,
    #[serde(default)]
    pub involved_person: bool,
    #[serde(default)]
    pub self_defined_ethnicity: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub legislation: Option<String>,
    #[serde(default)]
    pub outcome_linked_to_object_of_search: Option<bool>,
    pub datetime: String,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub outcome_object: Option<OutcomeObject>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub object_of_search: Option<String>,
    #[serde(default)]
    pub operation: Option<bool>,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(rename = "type")]
    pub search_type: String,
    #[serde(default)]
    pub removal_of_more_than_outer_clothing: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeObject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: String,
    pub longitude: String,
    pub street: Street,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Street {
    pub id: i64,
    pub name: String,
}
