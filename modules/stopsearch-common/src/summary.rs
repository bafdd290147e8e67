use serde::Serialize;

use crate::types::{AgeRange, SearchType, StatisticRecord};

/// Presentation view of a cached statistic: the stored counts plus the
/// values derived from them when a read is served.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticSummary {
    pub month: String,
    pub age_range: Option<AgeRange>,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub total_searches: u64,
    pub days_with_data: u64,
    pub average_per_day: f64,
    pub arrests: u64,
    pub arrest_rate: f64,
    pub most_searched_gender: Option<String>,
    pub most_searched_gender_value: u64,
    pub most_searched_object: Option<String>,
    pub most_searched_object_value: u64,
    pub most_searched_outcome: Option<String>,
    pub most_searched_outcome_value: u64,
}

impl From<&StatisticRecord> for StatisticSummary {
    fn from(stat: &StatisticRecord) -> Self {
        let (most_searched_gender, most_searched_gender_value) = split(stat.genders.most_common());
        let (most_searched_object, most_searched_object_value) =
            split(stat.objects_of_search.most_common());
        let (most_searched_outcome, most_searched_outcome_value) =
            split(stat.outcomes.most_common());

        Self {
            month: stat.month.clone(),
            age_range: stat.age_range.clone(),
            search_type: stat.search_type.clone(),
            total_searches: stat.total_searches,
            days_with_data: stat.days_with_data,
            average_per_day: ratio(stat.total_searches, stat.days_with_data),
            arrests: stat.arrests,
            arrest_rate: ratio(stat.arrests, stat.total_searches),
            most_searched_gender,
            most_searched_gender_value,
            most_searched_object,
            most_searched_object_value,
            most_searched_outcome,
            most_searched_outcome_value,
        }
    }
}

fn split(entry: Option<(&str, u64)>) -> (Option<String>, u64) {
    match entry {
        Some((key, count)) => (Some(key.to_string()), count),
        None => (None, 0),
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrequencyMap;

    fn freq(entries: &[(&str, u64)]) -> FrequencyMap {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn derives_rates_and_most_searched_values() {
        let stat = StatisticRecord {
            month: "2024-08".into(),
            age_range: Some(AgeRange::Age25To34),
            search_type: SearchType::Person,
            total_searches: 8,
            arrests: 2,
            days_with_data: 4,
            genders: freq(&[("Male", 6), ("Female", 2)]),
            objects_of_search: freq(&[("Controlled drugs", 5), ("null", 3)]),
            outcomes: freq(&[("Arrest", 2), ("A no further action disposal", 6)]),
        };

        let summary = StatisticSummary::from(&stat);
        assert_eq!(summary.average_per_day, 2.0);
        assert_eq!(summary.arrest_rate, 0.25);
        assert_eq!(summary.most_searched_gender.as_deref(), Some("Male"));
        assert_eq!(summary.most_searched_gender_value, 6);
        assert_eq!(summary.most_searched_object.as_deref(), Some("Controlled drugs"));
        assert_eq!(
            summary.most_searched_outcome.as_deref(),
            Some("A no further action disposal")
        );
    }

    #[test]
    fn zero_denominators_yield_zero_rates() {
        let stat = StatisticRecord {
            month: "2024-08".into(),
            age_range: None,
            search_type: SearchType::Vehicle,
            total_searches: 0,
            arrests: 0,
            days_with_data: 0,
            genders: FrequencyMap::new(),
            objects_of_search: FrequencyMap::new(),
            outcomes: FrequencyMap::new(),
        };

        let summary = StatisticSummary::from(&stat);
        assert_eq!(summary.average_per_day, 0.0);
        assert_eq!(summary.arrest_rate, 0.0);
        assert!(summary.most_searched_gender.is_none());
        assert_eq!(summary.most_searched_gender_value, 0);
    }
}
