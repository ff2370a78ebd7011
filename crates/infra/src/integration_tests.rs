//! Integration tests for the full persistence pipeline.
//!
//! Tests: Aggregate → Repository → EventStore → Repository::load
//!
//! Every scenario runs against each backend that needs no external service
//! (in-memory and SQLite `:memory:`). The PostgreSQL variant is ignored by
//! default and reads `CHRONICLE_TEST_DATABASE_URL`.
//!
//! Verifies:
//! - Saved aggregates replay to identical state and version
//! - Optimistic concurrency conflicts are detected and leave the store untouched
//! - Concurrent writers on one stream produce exactly one winner

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use chronicle_core::{Aggregate, AggregateId, Event, StateAccessor};

    use crate::event_store::{
        EventFilter, EventStore, InMemoryEventStore, Pagination, PostgresEventStore,
        SharedEventStore, SqliteEventStore,
    };
    use crate::repository::Repository;
    use crate::test_support::{counter_type, Counter};

    async fn backends() -> Vec<(&'static str, SharedEventStore)> {
        vec![
            ("memory", Arc::new(InMemoryEventStore::new()) as SharedEventStore),
            (
                "sqlite",
                Arc::new(SqliteEventStore::in_memory().await.unwrap()) as SharedEventStore,
            ),
        ]
    }

    fn repository(store: SharedEventStore) -> Arc<Repository<SharedEventStore>> {
        let mut repo = Repository::new(store);
        repo.register_aggregate(counter_type(), |id| Box::new(Counter::new(id)))
            .unwrap();
        Arc::new(repo)
    }

    async fn round_trip_preserves_state(repo: &Repository<SharedEventStore>, backend: &str) {
        let mut counter = Counter::new(AggregateId::new());
        counter.record(json!({"name": "Widget", "price": 9.99}));
        counter.record(json!({"price": 12.5, "tags": ["a", "b"], "meta": {"color": "red"}}));
        repo.save(&mut counter).await.unwrap();

        let loaded = repo.load(counter.id(), &counter_type()).await.unwrap();
        assert_eq!(loaded.version(), 2, "{backend}");
        assert_eq!(loaded.properties(), counter.properties(), "{backend}");
        assert_eq!(loaded.properties()["price"], json!(12.5), "{backend}");
        assert!(!loaded.is_deleted(), "{backend}");
    }

    async fn stale_writer_conflicts_without_writing(
        repo: &Repository<SharedEventStore>,
        backend: &str,
    ) {
        let id = AggregateId::new();
        let mut created = Counter::new(id.clone());
        created.record(json!({"name": "Widget"}));
        repo.save(&mut created).await.unwrap();

        let loaded = repo.load(&id, &counter_type()).await.unwrap();
        let mut a = Counter::from_state(loaded.as_ref());
        let mut b = Counter::from_state(loaded.as_ref());
        a.record(json!({"owner": "a"}));
        b.record(json!({"owner": "b"}));

        repo.save(&mut a).await.unwrap();
        let err = repo.save(&mut b).await.unwrap_err();
        assert!(err.is_conflict(), "{backend}: {err}");
        assert_eq!(b.uncommitted_events().len(), 1, "{backend}");

        let reloaded = repo.load(&id, &counter_type()).await.unwrap();
        assert_eq!(reloaded.version(), 2, "{backend}");
        assert_eq!(reloaded.properties()["owner"], json!("a"), "{backend}");
    }

    async fn concurrent_writers_have_one_winner(
        repo: Arc<Repository<SharedEventStore>>,
        backend: &str,
    ) {
        let id = AggregateId::new();
        let mut handles = Vec::new();
        for writer in 0..8 {
            let repo = repo.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let mut counter = Counter::new(id);
                counter.record(json!({ "writer": writer }));
                repo.save(&mut counter).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(err) => assert!(err.is_conflict(), "{backend}: {err}"),
            }
        }
        assert_eq!(winners, 1, "{backend}");

        let history = repo.get_events(&id, &counter_type()).await.unwrap();
        assert_eq!(history.len(), 1, "{backend}");
    }

    async fn audit_queries_see_every_stream(store: &SharedEventStore, backend: &str) {
        let repo = repository(store.clone());
        let mut first = Counter::new(AggregateId::new());
        first.record(json!({"n": 1}));
        first.record(json!({"n": 2}));
        let mut second = Counter::new(AggregateId::new());
        second.record(json!({"n": 3}));
        repo.save(&mut first).await.unwrap();
        repo.save(&mut second).await.unwrap();

        let by_type = store.get_events_by_type(&counter_type()).await.unwrap();
        assert!(by_type.len() >= 3, "{backend}");

        let page = store
            .query_events(
                EventFilter {
                    aggregate_id: Some(first.id().clone()),
                    ..EventFilter::default()
                },
                Pagination::new(Some(1), Some(0)),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 2, "{backend}");
        assert_eq!(page.events.len(), 1, "{backend}");
        assert!(page.has_more, "{backend}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn repository_behaves_identically_on_every_backend() {
        for (backend, store) in backends().await {
            let repo = repository(store.clone());
            round_trip_preserves_state(&repo, backend).await;
            stale_writer_conflicts_without_writing(&repo, backend).await;
            concurrent_writers_have_one_winner(repo.clone(), backend).await;
            audit_queries_see_every_stream(&store, backend).await;
        }
    }

    #[tokio::test]
    async fn events_are_stored_exactly_as_recorded() -> anyhow::Result<()> {
        for (backend, store) in backends().await {
            let mut counter = Counter::new(AggregateId::new());
            let recorded: Vec<Event> = vec![
                counter.record(json!({"a": 1})),
                counter.record(json!({"b": "two"})),
            ];
            store.save_events(counter.uncommitted_events()).await?;

            let stored = store.get_events(counter.id(), &counter_type()).await?;
            assert_eq!(stored.len(), recorded.len(), "{backend}");
            for (stored, recorded) in stored.iter().zip(&recorded) {
                assert_eq!(stored.version(), recorded.version(), "{backend}");
                assert_eq!(stored.event_type(), recorded.event_type(), "{backend}");
                assert_eq!(stored.payload(), recorded.payload(), "{backend}");
            }
        }
        Ok(())
    }

    /// Requires a reachable PostgreSQL; run with `cargo test -- --ignored`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn postgres_store_matches_in_memory_semantics() {
        let url = std::env::var("CHRONICLE_TEST_DATABASE_URL")
            .expect("CHRONICLE_TEST_DATABASE_URL must point at a scratch database");
        let store = PostgresEventStore::connect(&url, 8).await.unwrap();
        store.init_schema().await.unwrap();
        // Idempotent on an existing schema.
        store.init_schema().await.unwrap();

        let store: SharedEventStore = Arc::new(store);
        let repo = repository(store.clone());
        round_trip_preserves_state(&repo, "postgres").await;
        stale_writer_conflicts_without_writing(&repo, "postgres").await;
        concurrent_writers_have_one_winner(repo.clone(), "postgres").await;
        audit_queries_see_every_stream(&store, "postgres").await;
    }
}
