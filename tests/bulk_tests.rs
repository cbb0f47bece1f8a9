//! Bulk update/delete engine tests against a recording executor

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use cosmoform::{
    BulkOptions, BulkProgress, ContainerSchema, CosmoError, DeleteManyOptions, Filter, Patch,
    UpdateManyOptions,
};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Map, Value};

fn schema() -> ContainerSchema {
    ContainerSchema::new("orders", "/tenantId")
}

fn active() -> Filter {
    Filter::new().eq("status", "active")
}

#[tokio::test]
async fn test_delete_many_requires_confirm() {
    let mock = MockExecutor::new(|_| rows(documents(5)));
    let bulk = test_client(mock.clone()).bulk();

    let err = bulk
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active()).with(BulkOptions::new().enable_cross_partition()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CosmoError::Configuration(_)));
    assert_eq!(mock.count(), 0);
}

#[tokio::test]
async fn test_delete_many_confirm_checked_before_scope() {
    let mock = MockExecutor::new(|_| rows(Vec::new()));
    let bulk = test_client(mock.clone()).bulk();

    let err = bulk
        .delete_many(&schema(), DeleteManyOptions::new(active()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("confirm"));

    let err = bulk
        .delete_many(&schema(), DeleteManyOptions::new(active()).confirm(true))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("partition key"));
    assert_eq!(mock.count(), 0);
}

#[tokio::test]
async fn test_update_many_requires_scope() {
    let mock = MockExecutor::new(|_| rows(Vec::new()));
    let bulk = test_client(mock.clone()).bulk();
    let patch = Patch::fields(json!({"status": "archived"})).unwrap();

    let err = bulk
        .update_many(&schema(), UpdateManyOptions::new(active(), patch))
        .await
        .unwrap_err();

    assert!(matches!(err, CosmoError::Configuration(_)));
    assert_eq!(mock.count(), 0);
}

#[tokio::test]
async fn test_update_many_reports_each_chunk() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(documents(25))
        } else {
            echo(request)
        }
    });
    let seen: Arc<Mutex<Vec<BulkProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let client = test_client(mock.clone())
        .with_progress_observer(Arc::new(move |p: &BulkProgress| sink.lock().push(p.clone())));

    let patch = Patch::fields(json!({"status": "archived"})).unwrap();
    let report = client
        .bulk()
        .update_many(
            &schema(),
            UpdateManyOptions::new(active(), patch).with(
                BulkOptions::new()
                    .enable_cross_partition()
                    .batch_size(10)
                    .max_concurrency(2),
            ),
        )
        .await
        .unwrap();

    let processed: Vec<usize> = seen.lock().iter().map(|p| p.processed).collect();
    assert_eq!(processed, vec![10, 20, 25]);
    assert_eq!(seen.lock().last().unwrap().percentage, 100.0);

    assert!(report.success);
    assert_eq!(report.total, 25);
    assert_eq!(report.succeeded, 25);
    assert_eq!(report.failed, 0);
    assert_eq!(mock.count_method(&Method::PUT), 25);
    // Scan charge plus one unit per replace.
    assert_eq!(report.performance.request_charge, 2.5 + 25.0);
}

#[tokio::test]
async fn test_update_many_replaces_with_partition_key() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(documents(2))
        } else {
            echo(request)
        }
    });
    let bulk = test_client(mock.clone()).bulk();
    let patch = Patch::transform(|doc| {
        let mut fields = Map::new();
        fields.insert("n".to_string(), json!(doc["n"].as_i64().unwrap_or(0) * 10));
        fields
    });

    bulk.update_many(
        &schema(),
        UpdateManyOptions::new(active(), patch)
            .with(BulkOptions::new().partition_key("t1").batch_size(1)),
    )
    .await
    .unwrap();

    let requests = mock.requests();
    let scan = &requests[0];
    assert!(scan.is_query);
    assert_eq!(scan.partition_key, Some(json!("t1")));
    assert!(!scan.cross_partition);
    assert!(scan.query_text().unwrap().starts_with("SELECT * FROM c WHERE"));

    let replace = requests
        .iter()
        .find(|r| r.method == Method::PUT && r.path.ends_with("/docs/d1"))
        .unwrap();
    assert_eq!(replace.path, "dbs/app/colls/orders/docs/d1");
    assert_eq!(replace.partition_key, Some(json!("t2")));
    assert_eq!(replace.body.as_ref().unwrap()["n"], json!(10));
    assert_eq!(replace.body.as_ref().unwrap()["status"], json!("active"));
}

#[tokio::test]
async fn test_delete_many_scans_identities_only() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(vec![
                json!({"id": "a", "tenantId": "t1"}),
                json!({"id": "b", "tenantId": "t2"}),
            ])
        } else {
            ok(Value::Null)
        }
    });
    let bulk = test_client(mock.clone()).bulk();

    let report = bulk
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().enable_cross_partition()),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    let queries = mock.queries();
    assert_eq!(
        queries[0],
        "SELECT VALUE {\"id\": c[\"id\"], \"tenantId\": c[\"tenantId\"]} FROM c WHERE c[\"status\"] = @param0"
    );
    let deletes: Vec<_> = mock
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::DELETE)
        .collect();
    assert_eq!(deletes.len(), 2);
    assert!(deletes
        .iter()
        .any(|r| r.path.ends_with("/docs/b") && r.partition_key == Some(json!("t2"))));
}

#[tokio::test]
async fn test_delete_many_with_hyphenated_partition_key() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(vec![
                json!({"id": "d0", "tenant-id": "t1"}),
                json!({"id": "d1", "tenant-id": "t2"}),
            ])
        } else {
            ok(Value::Null)
        }
    });
    let bulk = test_client(mock.clone()).bulk();

    let report = bulk
        .delete_many(
            &ContainerSchema::new("orders", "/tenant-id"),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().enable_cross_partition()),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.succeeded, 2);
    assert_eq!(
        mock.queries()[0],
        "SELECT VALUE {\"id\": c[\"id\"], \"tenant-id\": c[\"tenant-id\"]} FROM c WHERE c[\"status\"] = @param0"
    );
    let deletes: Vec<_> = mock
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::DELETE)
        .collect();
    assert_eq!(deletes.len(), 2);
    let d0 = deletes.iter().find(|r| r.path.ends_with("/docs/d0")).unwrap();
    assert_eq!(d0.partition_key, Some(json!("t1")));
    let d1 = deletes.iter().find(|r| r.path.ends_with("/docs/d1")).unwrap();
    assert_eq!(d1.partition_key, Some(json!("t2")));
}

#[tokio::test]
async fn test_delete_many_partitioned_by_id() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(vec![json!({"id": "d0"}), json!({"id": "d1"})])
        } else {
            ok(Value::Null)
        }
    });
    let bulk = test_client(mock.clone()).bulk();

    let report = bulk
        .delete_many(
            &ContainerSchema::new("users", "/id"),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().enable_cross_partition()),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(
        mock.queries()[0],
        "SELECT VALUE {\"id\": c[\"id\"]} FROM c WHERE c[\"status\"] = @param0"
    );
    for request in mock.requests().iter().filter(|r| r.method == Method::DELETE) {
        let id = request.path.rsplit('/').next().unwrap();
        assert_eq!(request.partition_key, Some(json!(id)));
    }
}

#[tokio::test]
async fn test_dry_run_only_scans() {
    let mock = MockExecutor::new(|_| rows(documents(7)));
    let bulk = test_client(mock.clone()).bulk();

    let report = bulk
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().enable_cross_partition().dry_run()),
        )
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.total, 7);
    assert_eq!(report.processed, 0);
    assert_eq!(mock.count(), 1);
}

#[tokio::test]
async fn test_continue_on_error_records_failures() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(documents(6))
        } else if request.path.ends_with("/d3") {
            Err(status(400, "bad document"))
        } else {
            echo(request)
        }
    });
    let bulk = test_client(mock.clone()).bulk();
    let patch = Patch::fields(json!({"flag": true})).unwrap();

    let report = bulk
        .update_many(
            &schema(),
            UpdateManyOptions::new(active(), patch).with(
                BulkOptions::new()
                    .enable_cross_partition()
                    .batch_size(2)
                    .continue_on_error(true),
            ),
        )
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.processed, 6);
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].id, "d3");
    assert!(!report.errors[0].retriable);
    assert!(report.errors[0].message.contains("bad document"));
}

#[tokio::test]
async fn test_first_failure_aborts_remaining_chunks() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(documents(5))
        } else if request.path.ends_with("/d1") {
            Err(status(403, "forbidden"))
        } else {
            ok(Value::Null)
        }
    });
    let bulk = test_client(mock.clone()).bulk();

    let err = bulk
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active()).confirm(true).with(
                BulkOptions::new()
                    .enable_cross_partition()
                    .batch_size(1)
                    .max_concurrency(1),
            ),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(403));
    // d0 and d1 only; later chunks never start.
    assert_eq!(mock.count_method(&Method::DELETE), 2);
}

#[tokio::test]
async fn test_retriable_failures_are_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let mock = MockExecutor::new(move |request| {
        if request.is_query {
            return rows(documents(1));
        }
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(status(429, "too many requests"))
        } else {
            ok(Value::Null)
        }
    });
    let bulk = test_client(mock.clone()).bulk();

    let report = bulk
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().partition_key("t1")),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_panicking_observer_does_not_abort() {
    let mock = MockExecutor::new(|request| {
        if request.is_query {
            rows(documents(4))
        } else {
            ok(Value::Null)
        }
    });
    let client = test_client(mock.clone()).with_progress_observer(Arc::new(|_: &BulkProgress| {
        panic!("observer failure");
    }));

    let report = client
        .bulk()
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().enable_cross_partition().batch_size(2)),
        )
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.succeeded, 4);
}

#[tokio::test]
async fn test_bulk_concurrency_is_bounded() {
    let mock = MockExecutor::with_delay(std::time::Duration::from_millis(5), |request| {
        if request.is_query {
            rows(documents(12))
        } else {
            ok(Value::Null)
        }
    });
    let bulk = test_client(mock.clone()).bulk();

    bulk.delete_many(
        &schema(),
        DeleteManyOptions::new(active()).confirm(true).with(
            BulkOptions::new()
                .enable_cross_partition()
                .batch_size(2)
                .max_concurrency(2),
        ),
    )
    .await
    .unwrap();

    // Two chunks of two documents in flight at most.
    assert!(mock.peak() <= 4);
}

#[tokio::test]
async fn test_full_scan_rejection_on_scan_is_enriched() {
    let mock = MockExecutor::new(|_| {
        Err(status(
            400,
            "Cross partition query is required but disabled. Please set x-ms-documentdb-query-enablecrosspartition",
        ))
    });
    let bulk = test_client(mock.clone()).bulk();

    let err = bulk
        .delete_many(
            &schema(),
            DeleteManyOptions::new(active())
                .confirm(true)
                .with(BulkOptions::new().enable_cross_partition()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CosmoError::FullScanRejected(_)));
    assert!(err.to_string().contains("orders"));
}
