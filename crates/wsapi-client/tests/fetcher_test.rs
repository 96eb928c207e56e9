//! Integration tests for paginated fetching
//!
//! The mock backend serves numbered records, so delivery order and counts can
//! be checked against object ids directly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use wsapi_client::testing::{MockFailure, MockTransport};
use wsapi_client::{Entity, Fetch, QueryRequest, TrackerError};

use common::{client, fast_config, BASE};

fn object_ids(entities: &[Entity]) -> Vec<u64> {
    entities.iter().map(Entity::object_id).collect()
}

fn sorted(mut values: Vec<usize>) -> Vec<usize> {
    values.sort_unstable();
    values
}

//-----------------------------------------------------------------------------
// Scenarios
//-----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submitted_not_high_scenario() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 12));
    let client = client(&transport, fast_config().with_max_workers(4));

    let request = QueryRequest::new("Defect")
        .filter(vec!["State = Submitted", "Priority != High"])
        .page_size(5)
        .limit(12);
    let cursor = client.query(request).await?;

    assert_eq!(
        cursor.expression().map(|e| e.as_str()),
        Some("(State%20=%20Submitted)%20AND%20(Priority%20!=%20High)")
    );
    assert_eq!(cursor.total_result_count(), 12);
    assert_eq!(cursor.workers(), 2);

    let entities = cursor.collect_entities().await?;
    assert_eq!(object_ids(&entities), (1..=12).collect::<Vec<u64>>());

    assert_eq!(transport.call_count(), 3);
    assert_eq!(sorted(transport.page_starts()), vec![1, 6, 11]);
    for call in transport.calls() {
        assert!(call.contains("query=((State%20=%20Submitted)%20AND%20(Priority%20!=%20High))"), "{call}");
        assert!(call.contains("pagesize=5"), "{call}");
    }
    Ok(())
}

#[tokio::test]
async fn test_single_worker_fetches_sequentially() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 23));
    let client = client(&transport, fast_config().with_max_workers(1));

    let cursor = client.query(QueryRequest::new("Defect").page_size(5)).await?;
    assert_eq!(cursor.workers(), 1);

    let entities = cursor.collect_entities().await?;
    assert_eq!(entities.len(), 23);
    assert_eq!(transport.page_starts(), vec![1, 6, 11, 16, 21]);
    Ok(())
}

#[tokio::test]
async fn test_limit_stops_fetching() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 500));
    let client = client(&transport, fast_config());

    let request = QueryRequest::new("Defect").page_size(10).limit(25);
    let entities = client.query(request).await?.collect_entities().await?;

    assert_eq!(object_ids(&entities), (1..=25).collect::<Vec<u64>>());
    assert_eq!(sorted(transport.page_starts()), vec![1, 11, 21]);
    Ok(())
}

#[tokio::test]
async fn test_empty_result_set() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 0));
    let client = client(&transport, fast_config());

    let mut cursor = client.query(QueryRequest::new("Defect")).await?;
    assert_eq!(cursor.bound(), 0);
    assert!(cursor.next().await.is_none());
    assert_eq!(transport.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_full_fetch_marks_records_full() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 3));
    let client = client(&transport, fast_config());

    let entities = client
        .query(QueryRequest::new("Defect").fetch(Fetch::All))
        .await?
        .collect_entities()
        .await?;
    assert!(entities
        .iter()
        .all(|e| e.hydration_state() == wsapi_client::HydrationState::Full));
    assert!(transport.calls()[0].contains("fetch=true"));
    Ok(())
}

#[tokio::test]
async fn test_cursor_as_stream() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 17));
    let client = client(&transport, fast_config());

    let cursor = client.query(QueryRequest::new("Defect").page_size(4)).await?;
    let items: Vec<_> = cursor.into_stream().collect().await;
    let ids: Vec<u64> = items
        .into_iter()
        .map(|item| item.map(|e| e.object_id()))
        .collect::<Result<_, _>>()?;
    assert_eq!(ids, (1..=17).collect::<Vec<u64>>());
    Ok(())
}

//-----------------------------------------------------------------------------
// Ordering under concurrency
//-----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_reverse_completion_keeps_page_order() -> anyhow::Result<()> {
    let mut transport = MockTransport::new(BASE).with_dataset("defect", "Defect", 50);
    // Later pages answer first
    for start in (6..=46).step_by(5) {
        transport = transport.with_latency(start, Duration::from_millis(60 - start as u64));
    }
    let transport = Arc::new(transport);
    let client = client(&transport, fast_config());

    let cursor = client.query(QueryRequest::new("Defect").page_size(5)).await?;
    assert_eq!(cursor.workers(), 8);

    let entities = cursor.collect_entities().await?;
    assert_eq!(object_ids(&entities), (1..=50).collect::<Vec<u64>>());
    assert_eq!(transport.call_count(), 10);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_randomized_completion_keeps_page_order() -> anyhow::Result<()> {
    for seed in [7u64, 42, 1234, 9001] {
        let mut rng = StdRng::seed_from_u64(seed);
        let total = rng.gen_range(30..120);
        let page_size = rng.gen_range(3..9);

        let mut transport = MockTransport::new(BASE).with_dataset("defect", "Defect", total);
        for start in (1..=total).step_by(page_size) {
            transport = transport.with_latency(start, Duration::from_millis(rng.gen_range(0..25)));
        }
        let transport = Arc::new(transport);
        let client = client(&transport, fast_config());

        let entities = client
            .query(QueryRequest::new("Defect").page_size(page_size))
            .await?
            .collect_entities()
            .await?;
        assert_eq!(
            object_ids(&entities),
            (1..=total as u64).collect::<Vec<u64>>(),
            "seed {seed}"
        );
    }
    Ok(())
}

//-----------------------------------------------------------------------------
// Retry and failure
//-----------------------------------------------------------------------------

#[tokio::test]
async fn test_failed_page_retries_whole_group() -> anyhow::Result<()> {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 12)
            .fail_page(6, &[MockFailure::Status(503)]),
    );
    let client = client(&transport, fast_config().with_max_workers(4));

    let entities = client
        .query(QueryRequest::new("Defect").page_size(5))
        .await?
        .collect_entities()
        .await?;
    assert_eq!(object_ids(&entities), (1..=12).collect::<Vec<u64>>());

    // Page 11 succeeded the first time but is fetched again with its group
    assert_eq!(sorted(transport.page_starts()), vec![1, 6, 6, 11, 11]);
    Ok(())
}

#[tokio::test]
async fn test_short_and_error_pages_are_group_failures() -> anyhow::Result<()> {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 20)
            .fail_page(1, &[MockFailure::ShortPage])
            .fail_page(11, &[MockFailure::ErrorEnvelope]),
    );
    let client = client(&transport, fast_config());

    let entities = client
        .query(QueryRequest::new("Defect").page_size(5))
        .await?
        .collect_entities()
        .await?;
    assert_eq!(entities.len(), 20);

    // First page alone, then the group [6, 11] twice, then [16] once
    assert_eq!(sorted(transport.page_starts()), vec![1, 1, 6, 6, 11, 11, 16]);
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_end_the_cursor() -> anyhow::Result<()> {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 12)
            .fail_page(6, &[MockFailure::Status(503); 3]),
    );
    let client = client(&transport, fast_config().with_max_workers(4));

    let mut cursor = client.query(QueryRequest::new("Defect").page_size(5)).await?;
    let mut delivered = Vec::new();
    let err = loop {
        match cursor.next().await {
            Some(Ok(entity)) => delivered.push(entity),
            Some(Err(e)) => break e,
            None => panic!("cursor ended without an error"),
        }
    };

    assert_eq!(object_ids(&delivered), (1..=5).collect::<Vec<u64>>());
    match err {
        TrackerError::PageFetch {
            start_index,
            attempts,
            ref reason,
        } => {
            assert_eq!(start_index, 6);
            assert_eq!(attempts, 3);
            assert!(reason.contains("503"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.error_code(), "PAGE_FETCH");
    assert!(cursor.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_first_page_failure_fails_the_query() {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 12)
            .fail_page(1, &[MockFailure::ErrorEnvelope; 3]),
    );
    let client = client(&transport, fast_config());

    let err = client.query(QueryRequest::new("Defect")).await.unwrap_err();
    assert!(matches!(err, TrackerError::PageFetch { start_index: 1, attempts: 3, .. }));
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 12)
            .fail_page(1, &[MockFailure::Status(401)]),
    );
    let client = client(&transport, fast_config());

    let err = client.query(QueryRequest::new("Defect")).await.unwrap_err();
    match err {
        TrackerError::PageFetch {
            start_index,
            attempts,
            ref reason,
        } => {
            assert_eq!(start_index, 1);
            assert_eq!(attempts, 1);
            assert!(reason.contains("401"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_final_failure_in_a_group_stops_retries() -> anyhow::Result<()> {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 12)
            .fail_page(11, &[MockFailure::Status(403)]),
    );
    let client = client(&transport, fast_config().with_max_workers(4));

    let result = client
        .query(QueryRequest::new("Defect").page_size(5))
        .await?
        .collect_entities()
        .await;

    assert!(
        matches!(result, Err(TrackerError::PageFetch { start_index: 6, attempts: 1, .. })),
        "{result:?}"
    );
    assert_eq!(sorted(transport.page_starts()), vec![1, 6, 11]);
    Ok(())
}

#[tokio::test]
async fn test_timed_out_page_is_retried_then_fails() {
    let transport = Arc::new(
        MockTransport::new(BASE)
            .with_dataset("defect", "Defect", 10)
            .with_latency(6, Duration::from_millis(1500)),
    );
    let config = fast_config()
        .with_request_timeout(Duration::from_secs(1))
        .with_retry_delays(&[Duration::ZERO, Duration::ZERO]);
    let client = client(&transport, config);

    let result = client
        .query(QueryRequest::new("Defect").page_size(5))
        .await
        .unwrap()
        .collect_entities()
        .await;

    match result {
        Err(TrackerError::PageFetch {
            start_index,
            attempts,
            reason,
        }) => {
            assert_eq!(start_index, 6);
            assert_eq!(attempts, 2);
            assert!(reason.contains("timed out"), "{reason}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_grammar_errors_precede_io() {
    let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", 12));
    let client = client(&transport, fast_config());

    let err = client
        .query(QueryRequest::new("Defect").filter("State = Open XOR Priority = High"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "QUERY_GRAMMAR");

    let err = client.query(QueryRequest::new("Widget")).await.unwrap_err();
    assert_eq!(err, TrackerError::UnknownEntityType("Widget".to_string()));

    assert_eq!(transport.call_count(), 0);
}

//-----------------------------------------------------------------------------
// Delivery bound
//-----------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_delivers_exactly_min_total_limit(
        total in 0usize..60,
        limit in proptest::option::of(0usize..70),
        page_size in 1usize..12,
        max_workers in 1usize..11,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let delivered = runtime.block_on(async {
            let transport = Arc::new(MockTransport::new(BASE).with_dataset("defect", "Defect", total));
            let client = client(&transport, fast_config().with_max_workers(max_workers));

            let mut request = QueryRequest::new("Defect").page_size(page_size);
            request.limit = limit;
            client.query(request).await.unwrap().collect_entities().await.unwrap()
        });

        let expected = limit.map_or(total, |limit| limit.min(total));
        prop_assert_eq!(delivered.len(), expected);
        prop_assert_eq!(object_ids(&delivered), (1..=expected as u64).collect::<Vec<u64>>());
    }
}
