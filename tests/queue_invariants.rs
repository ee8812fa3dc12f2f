//! §8 property tests over the Task Queue: claim uniqueness under
//! concurrency, priority ordering, task-row uniqueness, and the job
//! counter identity.

mod helpers;

use bluebandedbee::models::TaskStatus;
use bluebandedbee::store::tasks;
use sqlx::PgPool;
use std::collections::HashSet;

#[sqlx::test]
async fn concurrent_claims_never_return_the_same_task_twice(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;

    for i in 0..20 {
        let page_id = helpers::make_page(&pool, domain_id, &format!("/p{i}")).await;
        helpers::make_task(&pool, job_id, page_id, 0.5).await;
    }

    let claimers = (0..8).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                let mut conn = pool.acquire().await.unwrap();
                match tasks::claim_next(&mut conn, &[job_id]).await.unwrap() {
                    Some(task) => claimed.push(task.id),
                    None => break,
                }
            }
            claimed
        })
    });

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in claimers {
        let claimed = handle.await.unwrap();
        total += claimed.len();
        for id in claimed {
            assert!(seen.insert(id), "task {id} was claimed more than once");
        }
    }
    assert_eq!(total, 20, "every pending task should be claimed exactly once");

    let mut conn = pool.acquire().await.unwrap();
    assert!(
        tasks::claim_next(&mut conn, &[job_id]).await.unwrap().is_none(),
        "no pending tasks should remain"
    );
}

#[sqlx::test]
async fn priority_ordering_is_non_increasing_across_claims(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;

    let priorities = [0.2, 0.95, 0.5, 0.95, 0.1];
    for (i, priority) in priorities.iter().enumerate() {
        let page_id = helpers::make_page(&pool, domain_id, &format!("/p{i}")).await;
        helpers::make_task(&pool, job_id, page_id, *priority).await;
    }

    let mut conn = pool.acquire().await.unwrap();
    let mut claimed_priorities = Vec::new();
    while let Some(task) = tasks::claim_next(&mut conn, &[job_id]).await.unwrap() {
        claimed_priorities.push(task.priority);
    }

    let mut sorted = claimed_priorities.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(
        claimed_priorities, sorted,
        "claim order should be non-increasing by priority"
    );
}

#[sqlx::test]
async fn insert_missing_enforces_one_task_per_job_page_pair(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/dup").await;

    helpers::make_task(&pool, job_id, page_id, 0.3).await;
    helpers::make_task(&pool, job_id, page_id, 0.9).await;
    helpers::make_task(&pool, job_id, page_id, 0.1).await;

    let mut conn = pool.acquire().await.unwrap();
    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    assert_eq!(counts.pending, 1, "duplicate (job_id, page_id) pairs must collapse to one row");
}

#[sqlx::test]
async fn completed_failed_skipped_pending_running_waiting_sums_to_total(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;

    for i in 0..6 {
        let page_id = helpers::make_page(&pool, domain_id, &format!("/p{i}")).await;
        helpers::make_task(&pool, job_id, page_id, 0.5).await;
    }

    let mut conn = pool.acquire().await.unwrap();

    let a = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    tasks::complete(
        &mut conn,
        a.id,
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

    let b = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    tasks::fail(&mut conn, b.id, "404", tasks::RetryDecision::GiveUp).await.unwrap();

    let c = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    tasks::skip(&mut conn, c.id, "disallowed by robots.txt").await.unwrap();

    let _running = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();

    let counts = tasks::count_by_status(&mut conn, job_id).await.unwrap();
    let total = counts.completed
        + counts.failed
        + counts.skipped
        + counts.pending
        + counts.running
        + counts.waiting;
    assert_eq!(total, 6);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.running, 1);
    assert_eq!(counts.pending, 2);
}

#[sqlx::test]
async fn complete_is_idempotent(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/").await;
    helpers::make_task(&pool, job_id, page_id, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();

    let result = tasks::TaskResult {
        status_code: Some(200),
        response_time_ms: Some(10),
        cache_status: None,
        content_type: None,
        redirect_url: None,
    };
    tasks::complete(
        &mut conn,
        task.id,
        tasks::TaskResult {
            status_code: result.status_code,
            response_time_ms: result.response_time_ms,
            cache_status: result.cache_status.clone(),
            content_type: result.content_type.clone(),
            redirect_url: result.redirect_url.clone(),
        },
    )
    .await
    .unwrap();
    let counts_first = tasks::count_by_status(&mut conn, job_id).await.unwrap();

    tasks::complete(&mut conn, task.id, result).await.unwrap();
    let counts_second = tasks::count_by_status(&mut conn, job_id).await.unwrap();

    assert_eq!(counts_first.completed, counts_second.completed);
    assert_eq!(counts_first.pending, counts_second.pending);
    assert_eq!(counts_second.completed, 1);
}

#[sqlx::test]
async fn claimed_task_status_is_running(pool: PgPool) {
    let (org_id, user_id) = helpers::make_org_and_user(&pool).await;
    let domain_id = helpers::make_domain(&pool, "example.com").await;
    let job_id = helpers::make_job(&pool, org_id, user_id, domain_id).await;
    let page_id = helpers::make_page(&pool, domain_id, "/").await;
    helpers::make_task(&pool, job_id, page_id, 0.5).await;

    let mut conn = pool.acquire().await.unwrap();
    let task = tasks::claim_next(&mut conn, &[job_id]).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
}
