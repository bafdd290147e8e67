//! End-to-end refresh against a mocked police API and the in-memory store.

use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::json;

use police_client::PoliceClient;
use stopsearch_common::{AgeRange, SearchType, StatisticFilter, NULL_KEY};
use stopsearch_refresh::fetcher::FetchPlan;
use stopsearch_refresh::store::CacheStore;
use stopsearch_refresh::testing::InMemoryCacheStore;
use stopsearch_refresh::{CachedStatistics, RefreshOutcome, Refresher};

fn plan() -> FetchPlan {
    FetchPlan {
        force: "metropolitan".into(),
        date_window: 7,
        batch_size: 10,
    }
}

async fn mock_dates(server: &mut Server) -> mockito::Mock {
    server
        .mock("GET", "/crimes-street-dates")
        .with_status(200)
        .with_body(
            json!([
                {"date": "2024-09", "stop-and-search": ["metropolitan"]},
                {"date": "2024-08", "stop-and-search": ["metropolitan", "kent"]},
                {"date": "2024-07", "stop-and-search": ["kent"]}
            ])
            .to_string(),
        )
        .create_async()
        .await
}

fn stops_query(date: &str) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("force".into(), "metropolitan".into()),
        Matcher::UrlEncoded("date".into(), date.into()),
    ])
}

#[tokio::test]
async fn refresh_builds_statistics_from_the_api() {
    let mut server = Server::new_async().await;
    let dates = mock_dates(&mut server).await;
    let september = server
        .mock("GET", "/stops-force")
        .match_query(stops_query("2024-09"))
        .with_status(200)
        .with_body(
            json!([
                {
                    "age_range": "18-24", "gender": "Male",
                    "datetime": "2024-09-01T10:00:00+00:00",
                    "outcome": "Arrest", "object_of_search": "Controlled drugs",
                    "type": "Person search", "involved_person": true
                },
                {
                    "age_range": "18-24", "gender": "Female",
                    "datetime": "2024-09-01T22:00:00+00:00",
                    "outcome": "A no further action disposal", "object_of_search": "Controlled drugs",
                    "type": "Person search", "involved_person": true
                },
                {
                    "age_range": "18-24", "gender": "Male",
                    "datetime": "2024-09-03T08:15:00+00:00",
                    "outcome": null, "object_of_search": "Offensive weapons",
                    "type": "Person search", "involved_person": true
                }
            ])
            .to_string(),
        )
        .create_async()
        .await;
    let august = server
        .mock("GET", "/stops-force")
        .match_query(stops_query("2024-08"))
        .with_status(200)
        .with_body(
            json!([
                {
                    "age_range": null, "gender": null,
                    "datetime": "2024-08-14T12:00:00+00:00",
                    "outcome": "arrest", "object_of_search": null,
                    "type": "Vehicle search", "involved_person": false
                }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let client = PoliceClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    let store = InMemoryCacheStore::new();

    let outcome = Refresher::new(&store, &client, plan()).run().await;

    dates.assert_async().await;
    september.assert_async().await;
    august.assert_async().await;

    let RefreshOutcome::Refreshed(stats) = outcome else {
        panic!("expected a refresh, got {outcome:?}");
    };
    assert_eq!(stats.dates_discovered, 2);
    assert_eq!(stats.records_fetched, 4);
    assert_eq!(stats.statistics_inserted, 2);

    let stored = store.statistics(&StatisticFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 2);

    let vehicle = &stored[0];
    assert_eq!(vehicle.month, "2024-08");
    assert_eq!(vehicle.age_range, None);
    assert_eq!(vehicle.search_type, SearchType::Vehicle);
    assert_eq!(vehicle.arrests, 1);
    assert_eq!(vehicle.genders.get(NULL_KEY), 1);

    let person = &stored[1];
    assert_eq!(person.month, "2024-09");
    assert_eq!(person.age_range, Some(AgeRange::Age18To24));
    assert_eq!(person.total_searches, 3);
    assert_eq!(person.arrests, 1);
    assert_eq!(person.days_with_data, 2);
    assert_eq!(person.genders.get("Male"), 2);
    assert_eq!(person.genders.get("Female"), 1);
    assert_eq!(person.objects_of_search.get("Controlled drugs"), 2);
    assert_eq!(person.outcomes.get(NULL_KEY), 1);

    // A second pass within the window is served from the cache.
    let again = Refresher::new(&store, &client, plan()).run().await;
    assert!(matches!(again, RefreshOutcome::Fresh(_)));

    let cached = CachedStatistics::load(
        &store,
        &StatisticFilter {
            month: Some("2024-09".into()),
            ..Default::default()
        },
        7,
    )
    .await
    .unwrap();
    assert!(!cached.status.stale);
    assert_eq!(cached.statistics.len(), 1);
    assert_eq!(cached.statistics[0].most_searched_gender.as_deref(), Some("Male"));
    assert!((cached.statistics[0].average_per_day - 1.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failing_month_is_skipped() {
    let mut server = Server::new_async().await;
    let _dates = mock_dates(&mut server).await;
    let _september = server
        .mock("GET", "/stops-force")
        .match_query(stops_query("2024-09"))
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;
    let _august = server
        .mock("GET", "/stops-force")
        .match_query(stops_query("2024-08"))
        .with_status(200)
        .with_body(
            json!([{
                "age_range": "over 34", "gender": "Male",
                "datetime": "2024-08-14T12:00:00+00:00",
                "outcome": null, "object_of_search": "Stolen goods",
                "type": "Person search", "involved_person": true
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let client = PoliceClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    let store = InMemoryCacheStore::new();

    let outcome = Refresher::new(&store, &client, plan()).run().await;

    let RefreshOutcome::Refreshed(stats) = outcome else {
        panic!("expected a refresh, got {outcome:?}");
    };
    assert_eq!(stats.dates_fetched, 1);
    assert_eq!(stats.dates_failed, 1);

    let stored = store.statistics_snapshot();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].month, "2024-08");
    assert_eq!(stored[0].age_range, Some(AgeRange::Over34));
}

#[tokio::test]
async fn unreachable_api_leaves_cache_untouched() {
    let mut server = Server::new_async().await;
    let _dates = server
        .mock("GET", "/crimes-street-dates")
        .with_status(502)
        .create_async()
        .await;

    let client = PoliceClient::new(&server.url(), Duration::from_secs(5)).unwrap();
    let store = InMemoryCacheStore::new();

    let outcome = Refresher::new(&store, &client, plan()).run().await;

    assert!(matches!(outcome, RefreshOutcome::NotUpdated(_)));
    assert!(store.meta().is_none());
    assert!(store.statistics_snapshot().is_empty());
}
