//! §8 property tests over Recovery (§4.5): stuck-task reset, stuck-job
//! completion, and sweep idempotence.

mod helpers;

use bluebandedbee::models::{JobStatus, TaskStatus};
use bluebandedbee::store::{jobs, tasks};
use sqlx::PgPool;

/// Backdate a running task's `started_at` past the stuck threshold, the way
/// a worker that died mid-fetch would leave it.
async fn backdate_started_at(pool: &PgPool, task_id: uuid::Uuid, seconds_ago: i64) {
    sqlx::query("UPDATE tasks SET started_at = NOW() - make_interval(secs => $2) WHERE id = $1")
        .bind(task_id)
        .bind(seconds_ago as f64)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test]
async fn reset_stuck_reopens_only_tasks_past_the_threshold(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;

    let stuck_page = helpers::make_page(&pool, domain_id, "/stuck").await;
    let fresh_page = helpers::make_page(&pool, domain_id, "/fresh").await;
    helpers::make_task(&pool, job_id, stuck_page, 0.5).await;
    helpers::make_task(&pool, job_id, fresh_page, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let stuck_task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    let fresh_task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    drop(conn);

    backdate_started_at(&pool, stuck_task.id, 3600).await;

    let mut conn = pool.acquire().await.unwrap();
    let reset = tasks::reset_stuck(&mut conn, 600).await.unwrap();
    assert_eq!(reset, 1);

    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    assert_eq!(counts.pending, 1, "the stuck task should be back to pending");
    assert_eq!(counts.running, 1, "the fresh task should be left running");
    let _ = fresh_task;
}

#[sqlx::test]
async fn find_stuck_completes_a_job_with_no_remaining_non_terminal_tasks(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/").await;
    helpers::make_task(&pool, job_id, page_id, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    jobs::start(&mut conn, job_id).await.unwrap();
    let task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    tasks::complete(
        &mut conn,
        task.id,
        tasks::TaskResult {
            status_code: Some(200),
            response_time_ms: Some(5),
            cache_status: None,
            content_type: None,
            redirect_url: None,
        },
    )
    .await
    .unwrap();

    let stuck = jobs::find_stuck(&mut conn).await.unwrap();
    assert!(stuck.contains(&job_id));

    jobs::recalculate(&mut conn, job_id).await.unwrap();
    let job = jobs::find_by_id(&mut conn, job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());

    let stuck_again = jobs::find_stuck(&mut conn).await.unwrap();
    assert!(
        !stuck_again.contains(&job_id),
        "a completed job is no longer running, so it drops out of find_stuck"
    );
}

#[sqlx::test]
async fn recovery_sweep_is_idempotent(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let stuck_page = helpers::make_page(&pool, domain_id, "/stuck").await;
    let done_page = helpers::make_page(&pool, domain_id, "/done").await;
    helpers::make_task(&pool, job_id, stuck_page, 0.5).await;
    helpers::make_task(&pool, job_id, done_page, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    jobs::start(&mut conn, job_id).await.unwrap();
    let stuck_task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    let done_task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    tasks::complete(
        &mut conn,
        done_task.id,
        tasks::TaskResult {
            status_code: Some(200),
            response_time_ms: Some(5),
            cache_status: None,
            content_type: None,
            redirect_url: None,
        },
    )
    .await
    .unwrap();
    drop(conn);

    backdate_started_at(&pool, stuck_task.id, 3600).await;

    let sweep_once = |pool: PgPool| async move {
        let mut conn = pool.acquire().await.unwrap();
        let reset = tasks::reset_stuck(&mut conn, 600).await.unwrap();
        let stuck_jobs = jobs::find_stuck(&mut conn).await.unwrap();
        for id in &stuck_jobs {
            jobs::recalculate(&mut conn, *id).await.unwrap();
        }
        (reset, stuck_jobs.len())
    };

    let (first_reset, first_stuck) = sweep_once(pool.clone()).await;
    assert_eq!(first_reset, 1, "the first sweep resets the one stuck task");

    let (second_reset, second_stuck) = sweep_once(pool.clone()).await;
    assert_eq!(second_reset, 0, "a second sweep immediately after finds nothing new to reset");
    assert_eq!(first_stuck, second_stuck, "find_stuck's result is stable once there's nothing left to change");

    let mut conn = pool.acquire().await.unwrap();
    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.completed, 1);
}
