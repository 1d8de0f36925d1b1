//! Schema DDL for the analytics tables.
//!
//! `posts` and `users` belong to the CMS and auth systems; minimal
//! definitions ship here so the pipeline runs self-contained in
//! development. Everything is IF NOT EXISTS so initialization is safe to
//! repeat on every startup.

use sqlx::PgPool;

use analytics_core::{Error, Result};

/// Full schema, applied idempotently at startup.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id           UUID PRIMARY KEY,
    slug         TEXT NOT NULL UNIQUE,
    title        TEXT NOT NULL,
    published_at TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS users (
    id                       TEXT PRIMARY KEY,
    acquisition_source       TEXT,
    acquisition_referrer     TEXT,
    acquisition_landing_path TEXT
);

CREATE TABLE IF NOT EXISTS visitors (
    id                 UUID PRIMARY KEY,
    user_id            TEXT,
    first_source       TEXT,
    first_referrer     TEXT,
    first_landing_path TEXT,
    first_seen_at      TIMESTAMPTZ NOT NULL,
    last_seen_at       TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id             UUID PRIMARY KEY,
    visitor_id     UUID NOT NULL REFERENCES visitors (id),
    user_id        TEXT,
    traffic_source TEXT NOT NULL,
    landing_path   TEXT,
    user_agent     TEXT,
    ip             TEXT,
    started_at     TIMESTAMPTZ NOT NULL,
    last_seen_at   TIMESTAMPTZ NOT NULL,
    ended_at       TIMESTAMPTZ,
    page_count     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sessions_visitor ON sessions (visitor_id);

CREATE TABLE IF NOT EXISTS session_events (
    id          BIGSERIAL PRIMARY KEY,
    session_id  UUID NOT NULL REFERENCES sessions (id),
    path        TEXT NOT NULL,
    referrer    TEXT,
    occurred_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_events_session ON session_events (session_id);

CREATE TABLE IF NOT EXISTS blog_post_sessions (
    session_id            UUID NOT NULL REFERENCES sessions (id),
    post_id               UUID NOT NULL REFERENCES posts (id),
    visitor_id            UUID NOT NULL REFERENCES visitors (id),
    entered_at            TIMESTAMPTZ NOT NULL,
    exited_at             TIMESTAMPTZ,
    time_on_page          BIGINT NOT NULL DEFAULT 0,
    max_scroll_depth      INTEGER NOT NULL DEFAULT 0,
    read_to_end           BOOLEAN NOT NULL DEFAULT FALSE,
    was_engaged           BOOLEAN NOT NULL DEFAULT FALSE,
    clicked_cta           BOOLEAN NOT NULL DEFAULT FALSE,
    shared_content        BOOLEAN NOT NULL DEFAULT FALSE,
    submitted_form        BOOLEAN NOT NULL DEFAULT FALSE,
    subscribed_newsletter BOOLEAN NOT NULL DEFAULT FALSE,
    traffic_source        TEXT NOT NULL,
    referrer              TEXT,
    is_landing_page       BOOLEAN NOT NULL DEFAULT FALSE,
    is_exit_page          BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (session_id, post_id)
);

CREATE INDEX IF NOT EXISTS idx_blog_post_sessions_post ON blog_post_sessions (post_id);

CREATE TABLE IF NOT EXISTS blog_engagement_events (
    id          BIGSERIAL PRIMARY KEY,
    post_id     UUID NOT NULL REFERENCES posts (id),
    session_id  UUID NOT NULL,
    visitor_id  UUID,
    event_type  TEXT NOT NULL,
    event_data  JSONB NOT NULL DEFAULT '{}',
    occurred_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blog_engagement_events_post ON blog_engagement_events (post_id);

CREATE TABLE IF NOT EXISTS traffic_events (
    id          BIGSERIAL PRIMARY KEY,
    visitor_id  UUID,
    session_id  UUID,
    source      TEXT NOT NULL,
    referrer    TEXT,
    path        TEXT NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS post_analytics (
    post_id             UUID PRIMARY KEY REFERENCES posts (id),
    total_views         BIGINT NOT NULL DEFAULT 0,
    unique_visitors     BIGINT NOT NULL DEFAULT 0,
    total_time_seconds  BIGINT NOT NULL DEFAULT 0,
    avg_time_seconds    DOUBLE PRECISION NOT NULL DEFAULT 0,
    median_time_seconds DOUBLE PRECISION NOT NULL DEFAULT 0,
    avg_scroll_depth    DOUBLE PRECISION NOT NULL DEFAULT 0,
    scroll_25_count     BIGINT NOT NULL DEFAULT 0,
    scroll_50_count     BIGINT NOT NULL DEFAULT 0,
    scroll_75_count     BIGINT NOT NULL DEFAULT 0,
    scroll_100_count    BIGINT NOT NULL DEFAULT 0,
    engaged_sessions    BIGINT NOT NULL DEFAULT 0,
    engagement_rate     DOUBLE PRECISION NOT NULL DEFAULT 0,
    cta_clicks          BIGINT NOT NULL DEFAULT 0,
    shares              BIGINT NOT NULL DEFAULT 0,
    comments            BIGINT NOT NULL DEFAULT 0,
    likes               BIGINT NOT NULL DEFAULT 0,
    bookmarks           BIGINT NOT NULL DEFAULT 0,
    copy_links          BIGINT NOT NULL DEFAULT 0,
    newsletter_signups  BIGINT NOT NULL DEFAULT 0,
    form_submits        BIGINT NOT NULL DEFAULT 0,
    shares_by_platform  JSONB NOT NULL DEFAULT '{}',
    sessions_by_source  JSONB NOT NULL DEFAULT '{}',
    first_viewed_at     TIMESTAMPTZ,
    last_viewed_at      TIMESTAMPTZ,
    engagement_score    DOUBLE PRECISION NOT NULL DEFAULT 0,
    computed_at         TIMESTAMPTZ NOT NULL
);
"#;

/// Applies the schema.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| Error::write_failed(format!("schema init failed: {}", e)))?;
    tracing::info!("Analytics schema initialized");
    Ok(())
}
