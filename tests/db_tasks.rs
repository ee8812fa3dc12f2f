mod helpers;

use bluebandedbee::models::TaskStatus;
use bluebandedbee::store::tasks;
use sqlx::PgPool;

#[sqlx::test]
async fn claim_next_picks_highest_priority_then_oldest(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;

    let low_page = helpers::make_page(&pool, domain_id, "/low").await;
    let high_page = helpers::make_page(&pool, domain_id, "/high").await;
    helpers::make_task(&pool, job_id, low_page, 0.2).await;
    helpers::make_task(&pool, job_id, high_page, 0.9).await;

    let mut conn = pool.acquire().await.unwrap();
    let claimed = tasks::claim_next(&mut conn, &[job_id])
        .await
        .unwrap()
        .expect("a pending task should be claimable");

    assert_eq!(claimed.page_id, high_page);
    assert_eq!(claimed.status, TaskStatus::Running);
}

#[sqlx::test]
async fn claim_next_skips_jobs_not_in_list(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let other_job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/").await;
    helpers::make_task(&pool, job_id, page_id, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let claimed = tasks::claim_next(&mut conn, &[other_job_id]).await.unwrap();
    assert!(claimed.is_none(), "task belongs to a job not in the candidate list");
}

#[sqlx::test]
async fn fail_with_retry_reopens_task_as_pending(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/").await;
    helpers::make_task(&pool, job_id, page_id, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();

    tasks::fail(&mut conn, task.id, "timed out", tasks::RetryDecision::Retry)
        .await
        .unwrap();

    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.failed, 0);
}

#[sqlx::test]
async fn fail_with_give_up_marks_task_failed(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/").await;
    helpers::make_task(&pool, job_id, page_id, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();

    tasks::fail(&mut conn, task.id, "404 forever", tasks::RetryDecision::GiveUp)
        .await
        .unwrap();

    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.pending, 0);
}

#[sqlx::test]
async fn insert_missing_is_idempotent_per_job_page_pair(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/dup").await;

    helpers::make_task(&pool, job_id, page_id, 0.5).await;
    helpers::make_task(&pool, job_id, page_id, 0.8).await;

    let mut conn = pool.acquire().await.unwrap();
    let existing = tasks::existing_page_ids(&mut conn, job_id).await.unwrap();
    assert_eq!(existing, vec![page_id]);
}

#[sqlx::test]
async fn skip_non_terminal_for_job_leaves_completed_tasks_alone(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let done_page = helpers::make_page(&pool, domain_id, "/done").await;
    let pending_page = helpers::make_page(&pool, domain_id, "/pending").await;
    helpers::make_task(&pool, job_id, done_page, 0.5).await;
    helpers::make_task(&pool, job_id, pending_page, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let done_task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    tasks::complete(
        &mut conn,
        done_task.id,
        tasks::TaskResult {
            status_code: Some(200),
            response_time_ms: Some(10),
            cache_status: None,
            content_type: None,
            redirect_url: None,
        },
    )
    .await
    .unwrap();

    let skipped = tasks::skip_non_terminal_for_job(&mut conn, job_id).await.unwrap();
    assert_eq!(skipped, 1);

    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.skipped, 1);
}
