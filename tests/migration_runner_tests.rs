//! Integration tests for planning and running migrations against a store

use chrono::Utc;
use rustmigrate::{
    CancellationHandle, ClosureSeeder, ColumnDef, DataType, Direction, HistoryStore, IndexDef,
    MemoryStore, MigrateConfig, MigrationCatalog, MigrationDefinition, MigrationError,
    MigrationId, MigrationRunner, Operation, Row, SchemaState, SchemaStore, Target,
};
use serde_json::json;
use std::sync::Arc;

const BLOG: &str = "CodeFirstConsoleApp.Program+BlogContext";

fn id(raw: &str) -> MigrationId {
    MigrationId::parse(raw).unwrap()
}

fn m1() -> MigrationDefinition {
    MigrationDefinition::new(id("202212190000000_InitialCreate"))
        .up(Operation::create_table(
            "Users",
            vec![ColumnDef::new("Username", DataType::Text).not_null()],
            ["Username"],
        ))
        .down(Operation::drop_table("Users"))
}

fn m2() -> MigrationDefinition {
    MigrationDefinition::new(id("202212200000000_AddDisplayName"))
        .up(Operation::add_column(
            "Users",
            ColumnDef::new("DisplayName", DataType::Text),
        ))
        .down(Operation::drop_column("Users", "DisplayName"))
}

fn m3() -> MigrationDefinition {
    MigrationDefinition::new(id("202212200104283_UseFluentAPI"))
        .up(Operation::rename_column("Users", "DisplayName", "Display_Name"))
        .down(Operation::rename_column("Users", "Display_Name", "DisplayName"))
}

fn blog_catalog() -> MigrationCatalog {
    MigrationCatalog::new(vec![m3(), m1(), m2()]).unwrap()
}

fn runner_on(store: Arc<MemoryStore>, catalog: MigrationCatalog) -> MigrationRunner<MemoryStore> {
    MigrationRunner::new(catalog, store, MigrateConfig::new(BLOG))
}

fn admin_row() -> Row {
    let mut row = Row::new();
    row.insert("Username".to_string(), json!("admin"));
    row.insert("Display_Name".to_string(), json!("Administrator"));
    row
}

#[tokio::test]
async fn test_up_to_latest_applies_every_migration_in_order() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog());

    let report = runner.migrate(&Target::Latest).await.unwrap();
    assert_eq!(report.direction, Direction::Up);
    assert_eq!(report.executed, vec![m1().id, m2().id, m3().id]);

    let schema = store.schema().await.unwrap();
    assert!(schema.has_column("Users", "Display_Name"));
    assert!(!schema.has_column("Users", "DisplayName"));
    assert_eq!(
        store.applied_ids(BLOG).await.unwrap(),
        vec![m1().id, m2().id, m3().id]
    );
}

#[tokio::test]
async fn test_second_run_is_noop() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog());

    runner.migrate(&Target::Latest).await.unwrap();
    let version = store.committed_version().await;

    assert!(runner.plan(&Target::Latest).await.unwrap().is_empty());
    let report = runner.migrate(&Target::Latest).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(store.committed_version().await, version);
}

#[tokio::test]
async fn test_down_to_first_migration_reverts_in_reverse_order() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog());
    runner.migrate(&Target::Latest).await.unwrap();

    let target: Target = "202212190000000_InitialCreate".parse().unwrap();
    let plan = runner.plan(&target).await.unwrap();
    assert_eq!(plan.direction(), Direction::Down);
    assert_eq!(plan.ids(), vec![&m3().id, &m2().id]);

    let report = runner.migrate(&target).await.unwrap();
    assert_eq!(report.executed, vec![m3().id, m2().id]);

    let schema = store.schema().await.unwrap();
    assert!(schema.table_exists("Users"));
    assert!(!schema.has_column("Users", "DisplayName"));
    assert!(!schema.has_column("Users", "Display_Name"));
    assert_eq!(store.applied_ids(BLOG).await.unwrap(), vec![m1().id]);
}

#[tokio::test]
async fn test_up_then_down_restores_schema() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog());

    runner
        .migrate(&Target::Name("InitialCreate".to_string()))
        .await
        .unwrap();
    let before = store.schema().await.unwrap();

    runner.migrate(&Target::Latest).await.unwrap();
    assert_ne!(store.schema().await.unwrap(), before);

    runner
        .migrate(&Target::Name("InitialCreate".to_string()))
        .await
        .unwrap();
    assert_eq!(store.schema().await.unwrap(), before);

    runner.migrate(&Target::Initial).await.unwrap();
    assert_eq!(store.schema().await.unwrap(), SchemaState::new());
    assert!(store.applied(BLOG).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_operation_leaves_no_trace() {
    let store = Arc::new(MemoryStore::new());
    let migration = MigrationDefinition::new(id("202401010000000_Accounts"))
        .up(Operation::create_table(
            "Accounts",
            vec![ColumnDef::new("Id", DataType::Integer).not_null()],
            ["Id"],
        ))
        .up(Operation::add_column(
            "Accounts",
            ColumnDef::new("Email", DataType::Text).max_length(256),
        ))
        .up(Operation::drop_column("Accounts", "Nickname"))
        .up(Operation::add_column(
            "Accounts",
            ColumnDef::new("Version", DataType::Binary).row_version(),
        ))
        .up(Operation::add_index(
            "Accounts",
            IndexDef::new("IX_Accounts_Email", ["Email"]).unique(),
        ));
    let runner = runner_on(store.clone(), MigrationCatalog::new(vec![migration]).unwrap());

    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    match &err {
        MigrationError::OperationFailed { operation, .. } => {
            assert_eq!(operation, "ALTER TABLE Accounts DROP COLUMN Nickname");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), "OperationFailed");

    assert!(store.schema().await.unwrap().list_tables().is_empty());
    assert!(store.applied(BLOG).await.unwrap().is_empty());
    assert_eq!(store.committed_version().await, 0);
}

#[tokio::test]
async fn test_failure_mid_plan_keeps_earlier_migrations() {
    let store = Arc::new(MemoryStore::new());
    let broken = MigrationDefinition::new(id("202212200000000_AddDisplayName"))
        .up(Operation::add_column(
            "Users",
            ColumnDef::new("Username", DataType::Text),
        ));
    let catalog = MigrationCatalog::new(vec![m1(), broken]).unwrap();
    let runner = runner_on(store.clone(), catalog);

    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    assert!(matches!(err, MigrationError::OperationFailed { .. }));

    assert_eq!(store.applied_ids(BLOG).await.unwrap(), vec![m1().id]);
    assert!(store.schema().await.unwrap().table_exists("Users"));

    let status = runner.status().await.unwrap();
    assert_eq!(status.pending, vec![id("202212200000000_AddDisplayName")]);
}

#[tokio::test]
async fn test_unknown_history_entry_diverges_before_any_operation() {
    let store = Arc::new(MemoryStore::new());

    // A migration applied from another branch of the catalog.
    let txn = store.begin_transaction().await.unwrap();
    store
        .record(txn, BLOG, &id("202212191200000_FromOtherBranch"), Utc::now())
        .await
        .unwrap();
    store.commit(txn).await.unwrap();
    let version = store.committed_version().await;

    let runner = runner_on(store.clone(), blog_catalog());
    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    assert!(matches!(err, MigrationError::HistoryDivergence(_)));
    assert_eq!(err.exit_code(), 3);

    assert!(store.schema().await.unwrap().list_tables().is_empty());
    assert_eq!(store.committed_version().await, version);

    let status = runner.status().await.unwrap();
    assert!(status.divergence.is_some());
    assert!(!status.is_up_to_date());
}

#[tokio::test]
async fn test_lock_contention() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog());

    let guard = store.try_lock(BLOG).unwrap();
    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    assert!(matches!(err, MigrationError::LockContention(_)));
    assert!(err.is_retryable());
    assert!(store.applied(BLOG).await.unwrap().is_empty());

    // other contexts are not blocked
    assert!(store.try_lock("Passport").is_ok());

    drop(guard);
    assert_eq!(runner.migrate(&Target::Latest).await.unwrap().executed.len(), 3);
}

#[tokio::test]
async fn test_concurrent_runners_apply_each_migration_once() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let runner = runner_on(store.clone(), blog_catalog());
        handles.push(tokio::spawn(async move {
            runner.migrate(&Target::Latest).await
        }));
    }

    let mut executed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(report) => executed += report.executed.len(),
            Err(MigrationError::LockContention(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(executed, 3);
    assert_eq!(store.applied(BLOG).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_cancellation_before_start() {
    let store = Arc::new(MemoryStore::new());
    let cancellation = CancellationHandle::new();
    let runner = runner_on(store.clone(), blog_catalog()).with_cancellation(cancellation.clone());

    cancellation.cancel();
    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    assert!(matches!(err, MigrationError::Cancelled { applied: 0 }));
    assert!(store.applied(BLOG).await.unwrap().is_empty());

    cancellation.reset();
    assert_eq!(runner.migrate(&Target::Latest).await.unwrap().executed.len(), 3);
}

#[tokio::test]
async fn test_seed_runs_after_reaching_latest() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog()).with_seeder(ClosureSeeder::new(
        |schema: &SchemaState| {
            assert!(schema.has_column("Users", "Display_Name"));
            Ok(vec![("Users".to_string(), admin_row())])
        },
    ));

    let report = runner.migrate(&Target::Latest).await.unwrap();
    assert!(report.seeded);

    // seeding is an upsert, so running again does not duplicate rows
    let report = runner.migrate(&Target::Latest).await.unwrap();
    assert!(report.is_noop());
    assert!(report.seeded);

    let schema = store.schema().await.unwrap();
    let users = schema.get_table("Users").unwrap();
    assert_eq!(users.row_count(), 1);
    let admin = users.get_row(&[json!("admin")]).unwrap();
    assert_eq!(admin["Display_Name"], json!("Administrator"));
}

#[tokio::test]
async fn test_seed_failure_keeps_migrations() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog()).with_seeder(ClosureSeeder::new(
        |_schema: &SchemaState| {
            let mut row = admin_row();
            row.insert("Email".to_string(), json!("admin@example.com"));
            Ok(vec![("Users".to_string(), row)])
        },
    ));

    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    match &err {
        MigrationError::SeedFailed(cause) => assert!(cause.contains("Email")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.exit_code(), 5);

    assert_eq!(store.applied(BLOG).await.unwrap().len(), 3);
    let schema = store.schema().await.unwrap();
    assert_eq!(schema.get_table("Users").unwrap().row_count(), 0);
    assert_eq!(store.active_transactions().await, 0);
}

#[tokio::test]
async fn test_seeder_error_is_reported() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner_on(store.clone(), blog_catalog()).with_seeder(ClosureSeeder::new(
        |_schema: &SchemaState| Err(anyhow::anyhow!("reference data unavailable")),
    ));

    let err = runner.migrate(&Target::Latest).await.unwrap_err();
    assert!(matches!(err, MigrationError::SeedFailed(ref cause) if cause.contains("unavailable")));
}

#[tokio::test]
async fn test_contexts_share_store_but_not_history() {
    let store = Arc::new(MemoryStore::new());
    let blog = runner_on(store.clone(), blog_catalog());

    let passport_catalog = MigrationCatalog::new(vec![
        MigrationDefinition::new(id("202301010000000_CreatePassports"))
            .up(Operation::create_table(
                "Passports",
                vec![
                    ColumnDef::new("PassportNumber", DataType::Text).not_null(),
                    ColumnDef::new("IssuingCountry", DataType::Text).not_null(),
                ],
                ["PassportNumber", "IssuingCountry"],
            ))
            .down(Operation::drop_table("Passports")),
    ])
    .unwrap();
    let passport = MigrationRunner::new(
        passport_catalog,
        store.clone(),
        MigrateConfig::new("PassportContext"),
    );

    blog.migrate(&Target::Latest).await.unwrap();
    passport.migrate(&Target::Latest).await.unwrap();
    assert_eq!(store.applied(BLOG).await.unwrap().len(), 3);
    assert_eq!(store.applied("PassportContext").await.unwrap().len(), 1);

    blog.migrate(&Target::Initial).await.unwrap();
    assert!(store.applied(BLOG).await.unwrap().is_empty());
    assert_eq!(store.applied("PassportContext").await.unwrap().len(), 1);

    let schema = store.schema().await.unwrap();
    assert!(!schema.table_exists("Users"));
    assert!(schema.table_exists("Passports"));
}
