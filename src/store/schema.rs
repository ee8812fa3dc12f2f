//! Idempotent boot-time schema management (§4.1).
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` in the order the
//! spec names: domains → pages → jobs → tasks → schedulers →
//! organisations/users. Enum types use the `DO $$ ... EXCEPTION WHEN
//! duplicate_object THEN null; END $$` idiom since Postgres has no
//! `CREATE TYPE IF NOT EXISTS`. `duration_seconds` and
//! `avg_time_per_task_seconds` are materialised generated columns rather
//! than computed at read time, per §3/§4.1.

use sqlx::PgPool;

const CREATE_ENUMS: &str = r#"
DO $$ BEGIN
    CREATE TYPE job_status AS ENUM ('pending', 'running', 'paused', 'completed', 'failed', 'cancelled');
EXCEPTION WHEN duplicate_object THEN null;
END $$;

DO $$ BEGIN
    CREATE TYPE task_status AS ENUM ('pending', 'running', 'completed', 'failed', 'skipped', 'waiting');
EXCEPTION WHEN duplicate_object THEN null;
END $$;

DO $$ BEGIN
    CREATE TYPE source_type AS ENUM ('sitemap', 'manual', 'fallback', 'scheduler');
EXCEPTION WHEN duplicate_object THEN null;
END $$;

DO $$ BEGIN
    CREATE TYPE link_context AS ENUM ('header', 'footer', 'body');
EXCEPTION WHEN duplicate_object THEN null;
END $$;
"#;

const CREATE_DOMAINS: &str = r#"
CREATE TABLE IF NOT EXISTS domains (
    id SERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    crawl_delay_seconds DOUBLE PRECISION,
    adaptive_delay_seconds DOUBLE PRECISION NOT NULL DEFAULT 0,
    adaptive_delay_floor_seconds DOUBLE PRECISION NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const CREATE_PAGES: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    id SERIAL PRIMARY KEY,
    domain_id INT NOT NULL REFERENCES domains(id),
    path TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (domain_id, path)
);
CREATE INDEX IF NOT EXISTS idx_pages_domain_path ON pages(domain_id, path);
"#;

const CREATE_ORGANISATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS organisations (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    organisation_id UUID NOT NULL REFERENCES organisations(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const CREATE_JOBS: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    domain_id INT NOT NULL REFERENCES domains(id),
    organisation_id UUID NOT NULL REFERENCES organisations(id),
    user_id UUID NOT NULL REFERENCES users(id),
    status job_status NOT NULL DEFAULT 'pending',
    total_tasks INT NOT NULL DEFAULT 0,
    completed_tasks INT NOT NULL DEFAULT 0,
    failed_tasks INT NOT NULL DEFAULT 0,
    skipped_tasks INT NOT NULL DEFAULT 0,
    concurrency INT NOT NULL DEFAULT 5,
    find_links BOOLEAN NOT NULL DEFAULT true,
    max_pages INT NOT NULL DEFAULT 0,
    include_paths TEXT[] NOT NULL DEFAULT '{}',
    exclude_paths TEXT[] NOT NULL DEFAULT '{}',
    use_sitemap BOOLEAN NOT NULL DEFAULT true,
    source_type source_type NOT NULL DEFAULT 'sitemap',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    error_message TEXT,
    required_workers INT NOT NULL DEFAULT 1,
    duration_seconds DOUBLE PRECISION GENERATED ALWAYS AS (
        CASE WHEN started_at IS NULL THEN NULL
             ELSE EXTRACT(EPOCH FROM (COALESCE(completed_at, NOW()) - started_at))
        END
    ) STORED,
    avg_time_per_task_seconds DOUBLE PRECISION GENERATED ALWAYS AS (
        CASE WHEN started_at IS NULL OR (completed_tasks + failed_tasks + skipped_tasks) = 0 THEN NULL
             ELSE EXTRACT(EPOCH FROM (COALESCE(completed_at, NOW()) - started_at))
                  / (completed_tasks + failed_tasks + skipped_tasks)
        END
    ) STORED
);
CREATE INDEX IF NOT EXISTS idx_jobs_org_status ON jobs(organisation_id, status);
CREATE INDEX IF NOT EXISTS idx_jobs_status_started ON jobs(status, started_at);
"#;

const CREATE_TASKS: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    job_id UUID NOT NULL REFERENCES jobs(id),
    page_id INT NOT NULL REFERENCES pages(id),
    status task_status NOT NULL DEFAULT 'pending',
    priority DOUBLE PRECISION NOT NULL DEFAULT 0.5,
    depth INT NOT NULL DEFAULT 0,
    source_type source_type NOT NULL DEFAULT 'manual',
    source_url TEXT,
    retry_count INT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    status_code INT,
    response_time_ms INT,
    cache_status TEXT,
    content_type TEXT,
    redirect_url TEXT,
    error TEXT,
    UNIQUE (job_id, page_id)
);
CREATE INDEX IF NOT EXISTS idx_tasks_claim ON tasks(job_id, status, priority DESC, created_at ASC);
CREATE INDEX IF NOT EXISTS idx_tasks_job ON tasks(job_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
"#;

const CREATE_SCHEDULERS: &str = r#"
CREATE TABLE IF NOT EXISTS schedulers (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    domain_id INT NOT NULL REFERENCES domains(id),
    organisation_id UUID NOT NULL REFERENCES organisations(id),
    schedule_interval_hours INT NOT NULL,
    next_run_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_enabled BOOLEAN NOT NULL DEFAULT true,
    concurrency INT NOT NULL DEFAULT 5,
    find_links BOOLEAN NOT NULL DEFAULT true,
    max_pages INT NOT NULL DEFAULT 0,
    include_paths TEXT[] NOT NULL DEFAULT '{}',
    exclude_paths TEXT[] NOT NULL DEFAULT '{}',
    required_workers INT NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_schedulers_due ON schedulers(is_enabled, next_run_at);
"#;

/// Create every table idempotently, in dependency order.
pub async fn ensure_schema(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
        .execute(pool)
        .await?;
    sqlx::raw_sql(CREATE_ENUMS).execute(pool).await?;
    sqlx::raw_sql(CREATE_DOMAINS).execute(pool).await?;
    sqlx::raw_sql(CREATE_PAGES).execute(pool).await?;
    sqlx::raw_sql(CREATE_ORGANISATIONS).execute(pool).await?;
    sqlx::raw_sql(CREATE_JOBS).execute(pool).await?;
    sqlx::raw_sql(CREATE_TASKS).execute(pool).await?;
    sqlx::raw_sql(CREATE_SCHEDULERS).execute(pool).await?;
    Ok(())
}
