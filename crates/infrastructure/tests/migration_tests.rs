
use database_test_utils::DatabaseTestContext;
use sqlx::Row;
use task_assigning_domain::{AssignmentDecision, OrganizationalEntity, PersistenceContext, UnitOfWorkFactory};
use task_assigning_testing_utils::TaskDataBuilder;

async fn count(ctx: &DatabaseTestContext, sql: &str) -> i64 {
    sqlx::query(sql)
        .fetch_one(ctx.manager.pool())
        .await
        .unwrap()
        .get::<i64, _>(0)
}

#[tokio::test]
async fn test_migration_idempotency() {
    let ctx = DatabaseTestContext::new().await;
    let before = count(&ctx, "SELECT COUNT(*) FROM sqlite_master").await;

    // 重复执行不应改变结构
    ctx.manager.migrate().await.unwrap();
    let after = count(&ctx, "SELECT COUNT(*) FROM sqlite_master").await;

    assert_eq!(before, after);
}

#[tokio::test]
async fn test_indexes_exist() {
    let ctx = DatabaseTestContext::new().await;
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name",
    )
    .fetch_all(ctx.manager.pool())
    .await
    .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("name")).collect();

    assert_eq!(
        names,
        vec![
            "idx_assignment_decisions_user",
            "idx_tasks_container_id",
            "idx_tasks_last_modification_date",
            "idx_tasks_status",
        ]
    );
}

#[tokio::test]
async fn test_deleting_task_cascades_owners_but_keeps_decision() {
    let ctx = DatabaseTestContext::new().await;
    ctx.seed(&[TaskDataBuilder::new(1)
        .with_potential_owner(OrganizationalEntity::user("alice"))
        .with_potential_owner(OrganizationalEntity::group("hr"))
        .build()])
        .await;

    let uow = ctx.manager.unit_of_work_factory().begin().await.unwrap();
    uow.persist_decision(&AssignmentDecision::new(1, "alice".to_string(), 0, false))
        .await
        .unwrap();
    uow.commit().await.unwrap();

    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM potential_owners").await, 2);
    assert!(ctx.manager.task_repository().delete(1).await.unwrap());

    assert_eq!(count(&ctx, "SELECT COUNT(*) FROM potential_owners").await, 0);
    assert_eq!(
        count(&ctx, "SELECT COUNT(*) FROM assignment_decisions").await,
        1
    );
}
