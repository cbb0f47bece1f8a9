//! Migration runner against an in-memory ledger

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use cosmoform::migrate::{checksum, MIGRATIONS_CONTAINER};
use cosmoform::{CosmoError, CosmoResult, Migration, MigrationContext, MigrationRunner};
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};

struct Step {
    id: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
    version: u32,
}

#[async_trait]
impl Migration for Step {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        "test step"
    }

    fn version(&self) -> u32 {
        self.version
    }

    async fn up(&self, ctx: &MigrationContext) -> CosmoResult<()> {
        assert_eq!(ctx.database().name(), "app");
        if self.fail {
            return Err(CosmoError::Protocol("step failed".to_string()));
        }
        self.log.lock().push(self.id.to_string());
        Ok(())
    }
}

fn step(id: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Step {
    Step {
        id,
        log: log.clone(),
        fail: false,
        version: 1,
    }
}

/// Mock service holding the ledger documents in memory.
fn ledger_service(ledger: Arc<Mutex<Vec<Value>>>) -> Arc<MockExecutor> {
    let ledger_docs = format!("dbs/app/colls/{}/docs", MIGRATIONS_CONTAINER);
    MockExecutor::new(move |request| {
        if request.path == "dbs/app/colls" {
            return ok(json!({"id": MIGRATIONS_CONTAINER}));
        }
        if request.path == ledger_docs {
            if request.is_query {
                return rows(ledger.lock().clone());
            }
            let body = request.body.clone().unwrap_or(Value::Null);
            ledger.lock().push(body.clone());
            return ok(body);
        }
        Err(status(400, "unexpected request"))
    })
}

#[tokio::test]
async fn test_run_applies_pending_in_id_order() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mock = ledger_service(ledger.clone());

    let runner = MigrationRunner::new(test_client(mock.clone()))
        .add(step("0002_backfill", &log))
        .add(step("0001_init", &log));

    let applied = runner.run(false).await.unwrap();
    assert_eq!(applied, vec!["0001_init", "0002_backfill"]);
    assert_eq!(*log.lock(), vec!["0001_init", "0002_backfill"]);

    let ledger = ledger.lock();
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger[0]["id"], json!("0001_init"));
    assert!(ledger[0]["applied_at"].is_string());
    // The ledger container is created first.
    assert_eq!(mock.requests()[0].path, "dbs/app/colls");
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mock = ledger_service(ledger.clone());
    let client = test_client(mock);

    MigrationRunner::new(client.clone())
        .add(step("0001_init", &log))
        .run(false)
        .await
        .unwrap();
    let applied = MigrationRunner::new(client)
        .add(step("0001_init", &log))
        .add(step("0002_next", &log))
        .run(false)
        .await
        .unwrap();

    assert_eq!(applied, vec!["0002_next"]);
    assert_eq!(*log.lock(), vec!["0001_init", "0002_next"]);
}

#[tokio::test]
async fn test_dry_run_lists_pending_without_writing() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mock = ledger_service(ledger.clone());

    let pending = MigrationRunner::new(test_client(mock.clone()))
        .add(step("0001_init", &log))
        .run(true)
        .await
        .unwrap();

    assert_eq!(pending, vec!["0001_init"]);
    assert!(log.lock().is_empty());
    assert!(ledger.lock().is_empty());
    assert_eq!(mock.count_method(&Method::POST), 0);
}

#[tokio::test]
async fn test_status_reports_applied_and_pending() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let applied = step("0001_init", &log);
    let ledger = Arc::new(Mutex::new(vec![json!({
        "id": "0001_init",
        "description": "test step",
        "checksum": checksum(&applied),
        "applied_at": "2026-01-05T10:00:00Z",
    })]));
    let mock = ledger_service(ledger);

    let status = MigrationRunner::new(test_client(mock))
        .add(applied)
        .add(step("0002_next", &log))
        .status()
        .await
        .unwrap();

    assert_eq!(status.len(), 2);
    assert!(status[0].applied_at.is_some());
    assert!(status[1].applied_at.is_none());
}

#[tokio::test]
async fn test_changed_migration_is_rejected() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ledger = Arc::new(Mutex::new(vec![json!({
        "id": "0001_init",
        "description": "test step",
        "checksum": "0000",
        "applied_at": "2026-01-05T10:00:00Z",
    })]));
    let mock = ledger_service(ledger);

    let err = MigrationRunner::new(test_client(mock))
        .add(step("0001_init", &log))
        .run(false)
        .await
        .unwrap_err();
    assert!(matches!(err, CosmoError::Migration(_)));
}

#[tokio::test]
async fn test_bumped_version_is_rejected() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ledger = Arc::new(Mutex::new(vec![json!({
        "id": "0001_init",
        "description": "test step",
        "checksum": checksum(&step("0001_init", &log)),
        "applied_at": "2026-01-05T10:00:00Z",
    })]));
    let mock = ledger_service(ledger.clone());

    let revised = Step {
        version: 2,
        ..step("0001_init", &log)
    };
    let err = MigrationRunner::new(test_client(mock))
        .add(revised)
        .run(false)
        .await
        .unwrap_err();

    assert!(matches!(err, CosmoError::Migration(_)));
    assert!(err.to_string().contains("0001_init"));
    assert!(log.lock().is_empty());
    assert_eq!(ledger.lock().len(), 1);
}

#[tokio::test]
async fn test_failed_step_is_not_recorded() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mock = ledger_service(ledger.clone());

    let err = MigrationRunner::new(test_client(mock))
        .add(Step {
            id: "0001_broken",
            log: log.clone(),
            fail: true,
            version: 1,
        })
        .run(false)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("0001_broken"));
    assert!(ledger.lock().is_empty());
}

#[tokio::test]
async fn test_duplicate_ids_are_rejected() {
    let ledger = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::new(Mutex::new(Vec::new()));
    let mock = ledger_service(ledger);

    let err = MigrationRunner::new(test_client(mock.clone()))
        .add(step("0001_init", &log))
        .add(step("0001_init", &log))
        .run(false)
        .await
        .unwrap_err();
    assert!(matches!(err, CosmoError::Migration(_)));
    assert_eq!(mock.count(), 0);
}
