use bluebandedbee::models::SourceType;
use bluebandedbee::store::{domains, jobs, organisations, pages, tasks};
use sqlx::PgPool;
use uuid::Uuid;

/// Create an organisation and a user belonging to it, returning their ids.
///
/// Every integration test starts here, which doubles as the place schema
/// creation happens: `sqlx::test` hands us an empty database with no
/// `migrations/` directory to apply, so we run the same `ensure_schema`
/// the running service calls on startup.
pub async fn make_org_and_user(pool: &PgPool) -> (Uuid, Uuid) {
    bluebandedbee::store::schema::ensure_schema(pool)
        .await
        .expect("ensure_schema failed");

    let mut conn = pool.acquire().await.expect("acquire failed");
    let org_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    organisations::ensure_organisation(&mut conn, org_id, "test org")
        .await
        .expect("ensure_organisation failed");
    organisations::ensure_user(&mut conn, user_id, org_id)
        .await
        .expect("ensure_user failed");
    (org_id, user_id)
}

/// Find-or-create a domain row, returning its id.
pub async fn make_domain(pool: &PgPool, name: &str) -> i32 {
    let mut conn = pool.acquire().await.expect("acquire failed");
    domains::find_or_create(&mut conn, name)
        .await
        .expect("find_or_create domain failed")
        .id
}

/// Find-or-create a page under `domain_id`, returning its id.
pub async fn make_page(pool: &PgPool, domain_id: i32, path: &str) -> i32 {
    let mut conn = pool.acquire().await.expect("acquire failed");
    pages::find_or_create(&mut conn, domain_id, path)
        .await
        .expect("find_or_create page failed")
        .id
}

/// Create a pending job with sensible defaults for the given org/domain.
pub async fn make_job(pool: &PgPool, organisation_id: Uuid, user_id: Uuid, domain_id: i32) -> Uuid {
    let mut conn = pool.acquire().await.expect("acquire failed");
    jobs::create(
        &mut conn,
        jobs::NewJob {
            domain_id,
            organisation_id,
            user_id,
            concurrency: 3,
            find_links: true,
            max_pages: 1000,
            include_paths: vec![],
            exclude_paths: vec![],
            use_sitemap: true,
            source_type: SourceType::Manual,
            required_workers: 1,
        },
    )
    .await
    .expect("create job failed")
    .id
}

/// Enqueue a single pending task for `job_id` against `page_id`.
pub async fn make_task(pool: &PgPool, job_id: Uuid, page_id: i32, priority: f64) {
    let mut conn = pool.acquire().await.expect("acquire failed");
    tasks::insert_missing(
        &mut conn,
        job_id,
        &[tasks::NewTask {
            page_id,
            priority,
            depth: 0,
        }],
        SourceType::Manual,
        None,
    )
    .await
    .expect("insert_missing failed");
}
