//! Integration tests for query dispatch across the fast and full paths

mod common;

use chrono::Duration;
use common::*;
use log_query_engine::search::*;
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_quick_search_literal_containment() {
    let service = memory_service();

    let response = service.quick_search("ERROR", 1, 10).await.unwrap();

    assert_eq!(response.total_hits(), 2);
    assert_eq!(hit_ids(&response), vec!["a6", "a4"]);
    assert!(!response.search_id().is_nil());
    assert!(response.aggregations().is_none());
}

#[tokio::test]
async fn test_quick_search_is_case_sensitive() {
    let service = memory_service();

    let response = service.quick_search("error", 1, 10).await.unwrap();
    assert_eq!(response.total_hits(), 0);
    assert!(response.hits().is_empty());
}

#[tokio::test]
async fn test_each_search_gets_a_fresh_id() {
    let service = memory_service();

    let first = service.quick_search("ERROR", 1, 10).await.unwrap();
    let second = service.quick_search("ERROR", 1, 10).await.unwrap();
    let third = service.search(&SearchQuery::builder("payment").build()).await.unwrap();

    let ids: HashSet<_> = [first.search_id(), second.search_id(), third.search_id()]
        .into_iter()
        .collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_quick_search_backend_failure() {
    let failing = Arc::new(FailingBackend);
    let service = SearchService::new(failing.clone(), failing, SearchConfig::default()).unwrap();

    let err = service.quick_search("ERROR", 1, 10).await.unwrap_err();

    assert_eq!(err.to_string(), "Quick search failed");
    assert_eq!(err.operation(), Some("Quick search"));
    let cause = err.source().unwrap().to_string();
    assert!(cause.contains("connection refused"));
}

#[tokio::test]
async fn test_failures_name_their_operation() {
    let failing = Arc::new(FailingBackend);
    let service = SearchService::new(failing.clone(), failing, SearchConfig::default()).unwrap();
    let start = base_time();
    let end = start + Duration::hours(1);

    let err = service.search(&SearchQuery::builder("timeout").build()).await.unwrap_err();
    assert_eq!(err.to_string(), "Search failed");

    let err = service.search_errors(start, end, 1, 10).await.unwrap_err();
    assert_eq!(err.to_string(), "Error search failed");

    let err = service
        .search_scoped("checkout", "prod", None, None, 1, 10)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Scoped search failed");

    let err = service
        .search_pattern("time*", SearchMode::Wildcard, None, None, 1, 10)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Pattern search failed");

    let err = service.field_suggestions("host", "", 5).await.unwrap_err();
    assert_eq!(err.to_string(), "Field suggestions failed");
}

#[tokio::test]
async fn test_invalid_queries_never_reach_the_backend() {
    let backend = Arc::new(InstrumentedBackend::new(sample_store()));
    let service = SearchService::new(backend.clone(), backend.clone(), SearchConfig::default()).unwrap();
    let start = base_time();

    let invalid = vec![
        SearchQuery::builder("   ").build(),
        SearchQuery::builder("timeout").with_page(0).build(),
        SearchQuery::builder("timeout").with_size(0).build(),
        SearchQuery::builder("timeout").with_size(MAX_SIZE + 1).build(),
        SearchQuery::builder("timeout")
            .with_time_range(Some(start), Some(start - Duration::minutes(1)))
            .build(),
        SearchQuery::builder("timeout").with_time_zone("Mars/Olympus").build(),
        SearchQuery::builder("[unclosed").with_mode(SearchMode::Regex).build(),
        SearchQuery::builder("timeout")
            .with_aggregation(AggregationRequest::terms("by_level", "level"))
            .with_aggregation(AggregationRequest::terms("by_level", "host"))
            .build(),
    ];

    for query in &invalid {
        let err = service.search(query).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error for {:?}", query);
    }
    assert!(service.quick_search("", 1, 10).await.unwrap_err().is_validation());
    assert!(service.quick_search("ERROR", 0, 10).await.unwrap_err().is_validation());

    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_search_timeout() {
    let backend = Arc::new(
        InstrumentedBackend::new(sample_store()).with_delay(std::time::Duration::from_millis(500)),
    );
    let service = SearchService::new(backend.clone(), backend, SearchConfig::default()).unwrap();

    let err = service
        .search_with_timeout(
            &SearchQuery::builder("timeout").build(),
            std::time::Duration::from_millis(20),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Search failed");
    let cause = err.source().unwrap().downcast_ref::<BackendError>().unwrap();
    assert!(matches!(cause, BackendError::Timeout(_)));
}

#[tokio::test]
async fn test_took_covers_backend_time() {
    let delay = std::time::Duration::from_millis(30);
    let backend = Arc::new(InstrumentedBackend::new(sample_store()).with_delay(delay));
    let service = SearchService::new(backend.clone(), backend, SearchConfig::default()).unwrap();

    let quick = service.quick_search("ERROR", 1, 10).await.unwrap();
    assert!(quick.took() >= delay);

    let full = service.search(&SearchQuery::builder("payment").build()).await.unwrap();
    assert!(full.took() >= delay);
}

#[tokio::test]
async fn test_concurrent_searches() {
    let service = Arc::new(memory_service());

    let tasks = (0..16).map(|i| {
        let service = service.clone();
        async move {
            if i % 2 == 0 {
                service.quick_search("ERROR", 1, 10).await
            } else {
                service
                    .search(&SearchQuery::builder("database payment").build())
                    .await
            }
        }
    });
    let responses = futures::future::join_all(tasks).await;

    let mut ids = HashSet::new();
    for response in responses {
        let response = response.unwrap();
        assert_eq!(response.total_hits(), 2);
        ids.insert(response.search_id());
    }
    assert_eq!(ids.len(), 16);
}

#[tokio::test]
async fn test_full_text_matches_any_term() {
    let service = memory_service();

    let response = service
        .search(&SearchQuery::builder("database payment").build())
        .await
        .unwrap();

    assert_eq!(response.total_hits(), 2);
    assert_eq!(sorted(hit_ids(&response)), vec!["a1", "a4"]);
    assert!(response.hits().iter().all(|hit| hit.score.is_some()));
}

#[tokio::test]
async fn test_level_filter_ignores_case() {
    let service = memory_service();

    let response = service
        .search(&SearchQuery::builder(MATCH_ALL).with_levels(vec!["error"]).build())
        .await
        .unwrap();

    assert_eq!(sorted(hit_ids(&response)), vec!["a1", "a4"]);
}

#[tokio::test]
async fn test_time_range_is_inclusive() {
    let service = memory_service();
    let start = base_time() + Duration::minutes(1);

    let response = service
        .search(
            &SearchQuery::builder(MATCH_ALL)
                .with_time_range(Some(start), Some(start + Duration::minutes(2)))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(sorted(hit_ids(&response)), vec!["a2", "a3", "a4"]);
}

#[tokio::test]
async fn test_sort_and_pagination() {
    let service = memory_service();
    let query = SearchQuery::builder(MATCH_ALL)
        .with_sort(SortField::ascending("timestamp"))
        .with_size(2)
        .with_page(2)
        .build();

    let response = service.search(&query).await.unwrap();

    assert_eq!(response.total_hits(), 6);
    assert_eq!(response.page(), 2);
    assert_eq!(hit_ids(&response), vec!["a3", "a4"]);

    let past_end = query.to_builder().with_page(4).build();
    let response = service.search(&past_end).await.unwrap();
    assert_eq!(response.total_hits(), 6);
    assert!(response.hits().is_empty());
}

#[tokio::test]
async fn test_search_modes() {
    let service = memory_service();

    let exact = service
        .search(&SearchQuery::builder("user login successful").with_mode(SearchMode::ExactMatch).build())
        .await
        .unwrap();
    assert_eq!(hit_ids(&exact), vec!["a2"]);

    let case_sensitive = service
        .search(
            &SearchQuery::builder("user login successful")
                .with_mode(SearchMode::ExactMatch)
                .with_case_sensitive(true)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(case_sensitive.total_hits(), 0);

    let wildcard = service
        .search(&SearchQuery::builder("Slow*").with_mode(SearchMode::Wildcard).build())
        .await
        .unwrap();
    assert_eq!(hit_ids(&wildcard), vec!["a3"]);

    let regex = service
        .search(&SearchQuery::builder(r"ERROR code \d+").with_mode(SearchMode::Regex).build())
        .await
        .unwrap();
    assert_eq!(hit_ids(&regex), vec!["a4"]);

    let fuzzy = service
        .search(&SearchQuery::builder("databse").with_mode(SearchMode::Fuzzy).build())
        .await
        .unwrap();
    assert_eq!(hit_ids(&fuzzy), vec!["a1"]);
}

#[tokio::test]
async fn test_filters_on_record_and_metadata_fields() {
    let service = memory_service();

    let by_host = service
        .search(&SearchQuery::builder(MATCH_ALL).with_hosts(vec!["web-01"]).build())
        .await
        .unwrap();
    assert_eq!(sorted(hit_ids(&by_host)), vec!["a1", "a3"]);

    let by_metadata = service
        .search(&SearchQuery::builder(MATCH_ALL).with_filter("region", "eu-west").build())
        .await
        .unwrap();
    assert_eq!(hit_ids(&by_metadata), vec!["a4"]);
}

#[tokio::test]
async fn test_projection_and_highlighting() {
    let service = memory_service();

    let plain = service
        .search(&SearchQuery::builder("database").build())
        .await
        .unwrap();
    let hit = &plain.hits()[0];
    assert!(hit.record.stack_trace.is_none());
    assert!(hit.record.metadata.is_empty());
    assert_eq!(hit.highlight.as_deref(), Some("<em>Database</em> connection timeout after 30s"));

    let full = service
        .search(
            &SearchQuery::builder("database")
                .with_stack_trace(true)
                .with_metadata(true)
                .with_highlight(false)
                .build(),
        )
        .await
        .unwrap();
    let hit = &full.hits()[0];
    assert_eq!(hit.record.stack_trace.as_deref(), Some("at db.connect(pool.rs:42)"));
    assert_eq!(hit.record.metadata.get("region").map(String::as_str), Some("us-east"));
    assert!(hit.highlight.is_none());
}

#[tokio::test]
async fn test_highlighting_degrades_without_backend_support() {
    let backend = Arc::new(InstrumentedBackend::new(sample_store()).without_highlighting());
    let service = SearchService::new(backend.clone(), backend, SearchConfig::default()).unwrap();

    let response = service
        .search(&SearchQuery::builder("database").with_highlight(true).build())
        .await
        .unwrap();

    assert_eq!(response.total_hits(), 1);
    assert!(response.hits()[0].highlight.is_none());
}

#[tokio::test]
async fn test_terms_aggregation_counts_all_matches() {
    let service = memory_service();

    let response = service
        .search(
            &SearchQuery::builder(MATCH_ALL)
                .with_size(1)
                .with_aggregation(AggregationRequest::terms("by_level", "level"))
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.hits().len(), 1);
    match response.aggregations().unwrap().get("by_level").unwrap() {
        AggregationOutput::Terms { buckets, .. } => {
            assert_eq!(buckets[0].key, "ERROR");
            assert_eq!(buckets[0].count, 2);
            assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 6);
        }
        other => panic!("unexpected aggregation output: {:?}", other),
    }
}

#[tokio::test]
async fn test_tantivy_matches_memory_backend() {
    let memory = memory_service();
    let tantivy = tantivy_service().await;
    assert_eq!(tantivy.backend_name(), "tantivy");

    let start = base_time() + Duration::minutes(1);
    let queries = vec![
        SearchQuery::builder(MATCH_ALL).build(),
        SearchQuery::builder("database payment").build(),
        SearchQuery::builder("timeout").with_levels(vec!["ERROR"]).build(),
        SearchQuery::builder(MATCH_ALL).with_levels(vec!["warning"]).build(),
        SearchQuery::builder(MATCH_ALL)
            .with_time_range(Some(start), Some(start + Duration::minutes(2)))
            .build(),
        SearchQuery::builder(MATCH_ALL)
            .with_hosts(vec!["web-01", "web-03"])
            .with_environments(vec!["prod"])
            .build(),
        SearchQuery::builder(MATCH_ALL).with_filter("region", "us-east").build(),
        SearchQuery::builder("user login successful").with_mode(SearchMode::ExactMatch).build(),
        SearchQuery::builder("Slow*").with_mode(SearchMode::Wildcard).build(),
        SearchQuery::builder(r"ERROR code \d+").with_mode(SearchMode::Regex).build(),
        SearchQuery::builder("databse").with_mode(SearchMode::Fuzzy).build(),
        SearchQuery::builder(ERROR_MATCH).build(),
    ];

    for query in &queries {
        let expected = memory.search(query).await.unwrap();
        let actual = tantivy.search(query).await.unwrap();
        assert_eq!(actual.total_hits(), expected.total_hits(), "total for {:?}", query);
        assert_eq!(sorted(hit_ids(&actual)), sorted(hit_ids(&expected)), "hits for {:?}", query);
    }
}

#[tokio::test]
async fn test_exact_phrase_needs_whole_tokens_on_both_backends() {
    let memory = memory_service();
    let tantivy = tantivy_service().await;

    let partial = SearchQuery::builder("connection time")
        .with_mode(SearchMode::ExactMatch)
        .build();
    let whole = partial.to_builder().with_text("connection timeout").build();

    for service in [&memory, &tantivy] {
        assert_eq!(service.search(&partial).await.unwrap().total_hits(), 0);
        let response = service.search(&whole).await.unwrap();
        assert_eq!(hit_ids(&response), vec!["a1"]);
    }
}

#[tokio::test]
async fn test_fuzzy_distance_agrees_across_backends() {
    let config = SearchConfigBuilder::new().fuzzy_distance(1).build();
    let store = sample_store();
    let memory = SearchService::new(store.clone(), store.clone(), config.clone()).unwrap();
    let index = Arc::new(TantivyLogIndex::in_memory().await.unwrap());
    index.index_records(&sample_records()).await.unwrap();
    let tantivy = SearchService::new(store, index, config).unwrap();

    let transposed = SearchQuery::builder("tiemout").with_mode(SearchMode::Fuzzy).build();
    let one_edit = transposed.to_builder().with_text("timout").build();

    for service in [&memory, &tantivy] {
        assert_eq!(service.search(&transposed).await.unwrap().total_hits(), 0);
        assert_eq!(hit_ids(&service.search(&one_edit).await.unwrap()), vec!["a1"]);
    }
}

#[tokio::test]
async fn test_tantivy_sorted_pages() {
    let tantivy = tantivy_service().await;

    let response = tantivy
        .search(
            &SearchQuery::builder(MATCH_ALL)
                .with_sort(SortField::descending("timestamp"))
                .with_size(3)
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(response.total_hits(), 6);
    assert_eq!(hit_ids(&response), vec!["a6", "a5", "a4"]);
}

#[tokio::test]
async fn test_field_suggestions() {
    let service = memory_service();

    let hosts = service.field_suggestions("host", "web", 10).await.unwrap();
    assert_eq!(hosts, vec!["web-01", "web-02", "web-03"]);

    let limited = service.field_suggestions("HOST", "", 1).await.unwrap();
    assert_eq!(limited, vec!["web-01"]);

    assert!(service.field_suggestions("message", "", 10).await.unwrap().is_empty());
    assert!(service.field_suggestions("nonexistent", "", 10).await.unwrap().is_empty());

    let tantivy = tantivy_service().await;
    let levels = tantivy.field_suggestions("level", "e", 10).await.unwrap();
    assert_eq!(levels, vec!["ERROR"]);
}

#[tokio::test]
async fn test_available_fields() {
    let service = memory_service();
    let fields = service.available_fields();

    for name in ["timestamp", "level", "message", "host", "application", "environment"] {
        assert!(fields.contains(&name), "missing field {}", name);
    }
}
