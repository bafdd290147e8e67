use police_client::RawStopSearch;
use stopsearch_common::{AgeRange, SearchType, StopSearchRecord};

/// Drop every field aggregation does not use. No validation: unrecognized
/// age ranges and types are carried through unchanged.
pub fn narrow(raw: RawStopSearch) -> StopSearchRecord {
    StopSearchRecord {
        age_range: raw.age_range.map(AgeRange::from),
        gender: raw.gender,
        datetime: raw.datetime,
        outcome: raw.outcome,
        object_of_search: raw.object_of_search,
        search_type: SearchType::from(raw.search_type),
    }
}

pub fn narrow_all(raw: Vec<RawStopSearch>) -> Vec<StopSearchRecord> {
    raw.into_iter().map(narrow).collect()
}
