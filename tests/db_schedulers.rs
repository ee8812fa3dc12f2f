mod helpers;

use bluebandedbee::store::schedulers;
use sqlx::PgPool;
use uuid::Uuid;

async fn insert_scheduler(
    pool: &PgPool,
    domain_id: i32,
    organisation_id: Uuid,
    next_run_at_offset_hours: i32,
    is_enabled: bool,
) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO schedulers (domain_id, organisation_id, schedule_interval_hours, next_run_at, is_enabled)
         VALUES ($1, $2, 24, NOW() + make_interval(hours => $3), $4)
         RETURNING id",
    )
    .bind(domain_id)
    .bind(organisation_id)
    .bind(next_run_at_offset_hours)
    .bind(is_enabled)
    .fetch_one(pool)
    .await
    .expect("insert scheduler failed");
    id
}

#[sqlx::test]
async fn find_due_excludes_disabled_and_future_schedulers(pool: PgPool) {
    let (org_id, _user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;

    let due_id = insert_scheduler(&pool, domain_id, org_id, -1, true).await;
    insert_scheduler(&pool, domain_id, org_id, 1, true).await;
    insert_scheduler(&pool, domain_id, org_id, -1, false).await;

    let mut conn = pool.acquire().await.unwrap();
    let due = schedulers::find_due(&mut conn).await.unwrap();
    assert_eq!(due.into_iter().map(|s| s.id).collect::<Vec<_>>(), vec![due_id]);
}

#[sqlx::test]
async fn advance_pushes_next_run_at_forward(pool: PgPool) {
    let (org_id, _user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let scheduler_id = insert_scheduler(&pool, domain_id, org_id, -1, true).await;

    let mut conn = pool.acquire().await.unwrap();
    let before = schedulers::find_due(&mut conn).await.unwrap();
    assert_eq!(before.len(), 1);

    schedulers::advance(&mut conn, scheduler_id, 24).await.unwrap();

    let after = schedulers::find_due(&mut conn).await.unwrap();
    assert!(after.is_empty(), "advancing by 24h should push the scheduler past due");
}

#[sqlx::test]
async fn has_running_job_only_matches_scheduler_sourced_jobs(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;

    let mut conn = pool.acquire().await.unwrap();
    let has_running = schedulers::has_running_job(&mut conn, domain_id, org_id).await.unwrap();
    assert!(!has_running);
    drop(conn);

    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let mut conn = pool.acquire().await.unwrap();
    bluebandedbee::store::jobs::start(&mut conn, job_id).await.unwrap();

    // Manually-sourced jobs (the helper default) don't count toward the
    // scheduler's own overlap check.
    let has_running = schedulers::has_running_job(&mut conn, domain_id, org_id).await.unwrap();
    assert!(!has_running);
}
