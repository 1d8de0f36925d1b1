//! Postgres implementation of [`AnalyticsStore`].
//!
//! Concurrency safety comes from the schema, not from locks: identity rows
//! are inserted with `ON CONFLICT DO NOTHING` against their primary keys,
//! the (session, post) engagement row rides its unique constraint, and
//! progress fields are updated with `GREATEST(...)` / boolean `OR` so
//! concurrent and out-of-order events converge to the same row.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use analytics_core::{
    EngagementDelta, EngagementEvent, Error, PostAnalytics, PostSession, Result, Session,
    TrafficSource, Visitor,
};

use crate::config::StoreConfig;
use crate::{AnalyticsStore, NewTrafficEvent};

/// Postgres-backed analytics store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects a pool and wraps it.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| Error::internal(format!("postgres connect failed: {}", e)))?;

        info!(
            max_connections = config.max_connections,
            "Connected to Postgres"
        );

        Ok(Self { pool })
    }

    /// Wraps an existing pool (used by the schema initializer and tests).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> Error {
    Error::write_failed(e.to_string())
}

fn parse_source(value: Option<String>) -> Result<Option<TrafficSource>> {
    value.map(|s| s.parse()).transpose()
}

fn visitor_from_row(row: &PgRow) -> Result<Visitor> {
    Ok(Visitor {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        first_source: parse_source(row.try_get("first_source").map_err(db_err)?)?,
        first_referrer: row.try_get("first_referrer").map_err(db_err)?,
        first_landing_path: row.try_get("first_landing_path").map_err(db_err)?,
        first_seen_at: row.try_get("first_seen_at").map_err(db_err)?,
        last_seen_at: row.try_get("last_seen_at").map_err(db_err)?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session> {
    let source: String = row.try_get("traffic_source").map_err(db_err)?;
    Ok(Session {
        id: row.try_get("id").map_err(db_err)?,
        visitor_id: row.try_get("visitor_id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        traffic_source: source.parse()?,
        landing_path: row.try_get("landing_path").map_err(db_err)?,
        user_agent: row.try_get("user_agent").map_err(db_err)?,
        ip: row.try_get("ip").map_err(db_err)?,
        started_at: row.try_get("started_at").map_err(db_err)?,
        last_seen_at: row.try_get("last_seen_at").map_err(db_err)?,
        ended_at: row.try_get("ended_at").map_err(db_err)?,
        page_count: row.try_get("page_count").map_err(db_err)?,
    })
}

fn post_session_from_row(row: &PgRow) -> Result<PostSession> {
    let source: String = row.try_get("traffic_source").map_err(db_err)?;
    Ok(PostSession {
        session_id: row.try_get("session_id").map_err(db_err)?,
        post_id: row.try_get("post_id").map_err(db_err)?,
        visitor_id: row.try_get("visitor_id").map_err(db_err)?,
        entered_at: row.try_get("entered_at").map_err(db_err)?,
        exited_at: row.try_get("exited_at").map_err(db_err)?,
        time_on_page: row.try_get("time_on_page").map_err(db_err)?,
        max_scroll_depth: row.try_get("max_scroll_depth").map_err(db_err)?,
        read_to_end: row.try_get("read_to_end").map_err(db_err)?,
        was_engaged: row.try_get("was_engaged").map_err(db_err)?,
        clicked_cta: row.try_get("clicked_cta").map_err(db_err)?,
        shared_content: row.try_get("shared_content").map_err(db_err)?,
        submitted_form: row.try_get("submitted_form").map_err(db_err)?,
        subscribed_newsletter: row.try_get("subscribed_newsletter").map_err(db_err)?,
        traffic_source: source.parse()?,
        referrer: row.try_get("referrer").map_err(db_err)?,
        is_landing_page: row.try_get("is_landing_page").map_err(db_err)?,
        is_exit_page: row.try_get("is_exit_page").map_err(db_err)?,
    })
}

fn event_from_row(row: &PgRow) -> Result<EngagementEvent> {
    let event_type: String = row.try_get("event_type").map_err(db_err)?;
    Ok(EngagementEvent {
        post_id: row.try_get("post_id").map_err(db_err)?,
        session_id: row.try_get("session_id").map_err(db_err)?,
        visitor_id: row.try_get("visitor_id").map_err(db_err)?,
        event_type: event_type.parse()?,
        event_data: row.try_get("event_data").map_err(db_err)?,
        occurred_at: row.try_get("occurred_at").map_err(db_err)?,
    })
}

fn analytics_from_row(row: &PgRow) -> Result<PostAnalytics> {
    let shares_by_platform: sqlx::types::Json<BTreeMap<String, i64>> =
        row.try_get("shares_by_platform").map_err(db_err)?;
    let sessions_by_source: sqlx::types::Json<BTreeMap<String, i64>> =
        row.try_get("sessions_by_source").map_err(db_err)?;
    Ok(PostAnalytics {
        post_id: row.try_get("post_id").map_err(db_err)?,
        total_views: row.try_get("total_views").map_err(db_err)?,
        unique_visitors: row.try_get("unique_visitors").map_err(db_err)?,
        total_time_seconds: row.try_get("total_time_seconds").map_err(db_err)?,
        avg_time_seconds: row.try_get("avg_time_seconds").map_err(db_err)?,
        median_time_seconds: row.try_get("median_time_seconds").map_err(db_err)?,
        avg_scroll_depth: row.try_get("avg_scroll_depth").map_err(db_err)?,
        scroll_25_count: row.try_get("scroll_25_count").map_err(db_err)?,
        scroll_50_count: row.try_get("scroll_50_count").map_err(db_err)?,
        scroll_75_count: row.try_get("scroll_75_count").map_err(db_err)?,
        scroll_100_count: row.try_get("scroll_100_count").map_err(db_err)?,
        engaged_sessions: row.try_get("engaged_sessions").map_err(db_err)?,
        engagement_rate: row.try_get("engagement_rate").map_err(db_err)?,
        cta_clicks: row.try_get("cta_clicks").map_err(db_err)?,
        shares: row.try_get("shares").map_err(db_err)?,
        comments: row.try_get("comments").map_err(db_err)?,
        likes: row.try_get("likes").map_err(db_err)?,
        bookmarks: row.try_get("bookmarks").map_err(db_err)?,
        copy_links: row.try_get("copy_links").map_err(db_err)?,
        newsletter_signups: row.try_get("newsletter_signups").map_err(db_err)?,
        form_submits: row.try_get("form_submits").map_err(db_err)?,
        shares_by_platform: shares_by_platform.0,
        sessions_by_source: sessions_by_source.0,
        first_viewed_at: row.try_get("first_viewed_at").map_err(db_err)?,
        last_viewed_at: row.try_get("last_viewed_at").map_err(db_err)?,
        engagement_score: row.try_get("engagement_score").map_err(db_err)?,
        computed_at: row.try_get("computed_at").map_err(db_err)?,
    })
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn get_visitor(&self, id: Uuid) -> Result<Option<Visitor>> {
        let row = sqlx::query(
            "SELECT id, user_id, first_source, first_referrer, first_landing_path, \
             first_seen_at, last_seen_at FROM visitors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(visitor_from_row).transpose()
    }

    async fn insert_visitor(&self, visitor: &Visitor) -> Result<()> {
        sqlx::query(
            "INSERT INTO visitors \
             (id, user_id, first_source, first_referrer, first_landing_path, \
              first_seen_at, last_seen_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(visitor.id)
        .bind(&visitor.user_id)
        .bind(visitor.first_source.map(|s| s.as_str()))
        .bind(&visitor.first_referrer)
        .bind(&visitor.first_landing_path)
        .bind(visitor.first_seen_at)
        .bind(visitor.last_seen_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn touch_visitor(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE visitors SET last_seen_at = $2, user_id = COALESCE(user_id, $3) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, visitor_id, user_id, traffic_source, landing_path, user_agent, \
             ip, started_at, last_seen_at, ended_at, page_count \
             FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions \
             (id, visitor_id, user_id, traffic_source, landing_path, user_agent, ip, \
              started_at, last_seen_at, ended_at, page_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(session.id)
        .bind(session.visitor_id)
        .bind(&session.user_id)
        .bind(session.traffic_source.as_str())
        .bind(&session.landing_path)
        .bind(&session.user_agent)
        .bind(&session.ip)
        .bind(session.started_at)
        .bind(session.last_seen_at)
        .bind(session.ended_at)
        .bind(session.page_count)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn touch_session(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions SET last_seen_at = $2, user_id = COALESCE(user_id, $3) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn end_session(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sessions SET ended_at = $2 WHERE id = $1 AND ended_at IS NULL")
            .bind(id)
            .bind(ended_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn record_navigation(
        &self,
        session_id: Uuid,
        path: &str,
        referrer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            "INSERT INTO session_events (session_id, path, referrer, occurred_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(session_id)
        .bind(path)
        .bind(referrer)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE sessions SET page_count = page_count + 1 WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn backfill_user_acquisition(
        &self,
        user_id: &str,
        source: TrafficSource,
        referrer: Option<&str>,
        landing_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET \
             acquisition_source = COALESCE(acquisition_source, $2), \
             acquisition_referrer = COALESCE(acquisition_referrer, $3), \
             acquisition_landing_path = COALESCE(acquisition_landing_path, $4) \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(source.as_str())
        .bind(referrer)
        .bind(landing_path)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn post_exists(&self, id: Uuid) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn record_engagement(
        &self,
        view: Option<&PostSession>,
        delta: &EngagementDelta,
        event: &EngagementEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(record) = view {
            sqlx::query(
                "INSERT INTO blog_post_sessions \
                 (session_id, post_id, visitor_id, entered_at, traffic_source, referrer, \
                  is_landing_page) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (session_id, post_id) DO NOTHING",
            )
            .bind(record.session_id)
            .bind(record.post_id)
            .bind(record.visitor_id)
            .bind(record.entered_at)
            .bind(record.traffic_source.as_str())
            .bind(&record.referrer)
            .bind(record.is_landing_page)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        if !delta.is_empty() {
            sqlx::query(
                "UPDATE blog_post_sessions SET \
                 time_on_page = GREATEST(time_on_page, $3), \
                 max_scroll_depth = GREATEST(max_scroll_depth, $4), \
                 read_to_end = read_to_end OR $5, \
                 was_engaged = was_engaged OR $6, \
                 clicked_cta = clicked_cta OR $7, \
                 shared_content = shared_content OR $8, \
                 submitted_form = submitted_form OR $9, \
                 subscribed_newsletter = subscribed_newsletter OR $10, \
                 is_exit_page = is_exit_page OR $11, \
                 exited_at = CASE WHEN $11 THEN $12 ELSE exited_at END \
                 WHERE session_id = $1 AND post_id = $2",
            )
            .bind(event.session_id)
            .bind(event.post_id)
            .bind(delta.time_on_page.unwrap_or(0))
            .bind(delta.scroll_depth.unwrap_or(0))
            .bind(delta.read_to_end)
            .bind(delta.was_engaged)
            .bind(delta.clicked_cta)
            .bind(delta.shared_content)
            .bind(delta.submitted_form)
            .bind(delta.subscribed_newsletter)
            .bind(delta.is_exit_page)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            "INSERT INTO blog_engagement_events \
             (post_id, session_id, visitor_id, event_type, event_data, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.post_id)
        .bind(event.session_id)
        .bind(event.visitor_id)
        .bind(event.event_type.as_str())
        .bind(&event.event_data)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn get_post_session(
        &self,
        session_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<PostSession>> {
        let row = sqlx::query(
            "SELECT session_id, post_id, visitor_id, entered_at, exited_at, time_on_page, \
             max_scroll_depth, read_to_end, was_engaged, clicked_cta, shared_content, \
             submitted_form, subscribed_newsletter, traffic_source, referrer, \
             is_landing_page, is_exit_page \
             FROM blog_post_sessions WHERE session_id = $1 AND post_id = $2",
        )
        .bind(session_id)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(post_session_from_row).transpose()
    }

    async fn insert_traffic_event(&self, event: &NewTrafficEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO traffic_events \
             (visitor_id, session_id, source, referrer, path, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.visitor_id)
        .bind(event.session_id)
        .bind(event.source.as_str())
        .bind(&event.referrer)
        .bind(&event.path)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn post_sessions(&self, post_id: Uuid) -> Result<Vec<PostSession>> {
        let rows = sqlx::query(
            "SELECT session_id, post_id, visitor_id, entered_at, exited_at, time_on_page, \
             max_scroll_depth, read_to_end, was_engaged, clicked_cta, shared_content, \
             submitted_form, subscribed_newsletter, traffic_source, referrer, \
             is_landing_page, is_exit_page \
             FROM blog_post_sessions WHERE post_id = $1 ORDER BY entered_at",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(post_session_from_row).collect()
    }

    async fn engagement_events(&self, post_id: Uuid) -> Result<Vec<EngagementEvent>> {
        let rows = sqlx::query(
            "SELECT post_id, session_id, visitor_id, event_type, event_data, occurred_at \
             FROM blog_engagement_events WHERE post_id = $1 ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn upsert_post_analytics(&self, stats: &PostAnalytics) -> Result<()> {
        sqlx::query(
            "INSERT INTO post_analytics \
             (post_id, total_views, unique_visitors, total_time_seconds, avg_time_seconds, \
              median_time_seconds, avg_scroll_depth, scroll_25_count, scroll_50_count, \
              scroll_75_count, scroll_100_count, engaged_sessions, engagement_rate, \
              cta_clicks, shares, comments, likes, bookmarks, copy_links, \
              newsletter_signups, form_submits, shares_by_platform, sessions_by_source, \
              first_viewed_at, last_viewed_at, engagement_score, computed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
              $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27) \
             ON CONFLICT (post_id) DO UPDATE SET \
              total_views = EXCLUDED.total_views, \
              unique_visitors = EXCLUDED.unique_visitors, \
              total_time_seconds = EXCLUDED.total_time_seconds, \
              avg_time_seconds = EXCLUDED.avg_time_seconds, \
              median_time_seconds = EXCLUDED.median_time_seconds, \
              avg_scroll_depth = EXCLUDED.avg_scroll_depth, \
              scroll_25_count = EXCLUDED.scroll_25_count, \
              scroll_50_count = EXCLUDED.scroll_50_count, \
              scroll_75_count = EXCLUDED.scroll_75_count, \
              scroll_100_count = EXCLUDED.scroll_100_count, \
              engaged_sessions = EXCLUDED.engaged_sessions, \
              engagement_rate = EXCLUDED.engagement_rate, \
              cta_clicks = EXCLUDED.cta_clicks, \
              shares = EXCLUDED.shares, \
              comments = EXCLUDED.comments, \
              likes = EXCLUDED.likes, \
              bookmarks = EXCLUDED.bookmarks, \
              copy_links = EXCLUDED.copy_links, \
              newsletter_signups = EXCLUDED.newsletter_signups, \
              form_submits = EXCLUDED.form_submits, \
              shares_by_platform = EXCLUDED.shares_by_platform, \
              sessions_by_source = EXCLUDED.sessions_by_source, \
              first_viewed_at = EXCLUDED.first_viewed_at, \
              last_viewed_at = EXCLUDED.last_viewed_at, \
              engagement_score = EXCLUDED.engagement_score, \
              computed_at = EXCLUDED.computed_at",
        )
        .bind(stats.post_id)
        .bind(stats.total_views)
        .bind(stats.unique_visitors)
        .bind(stats.total_time_seconds)
        .bind(stats.avg_time_seconds)
        .bind(stats.median_time_seconds)
        .bind(stats.avg_scroll_depth)
        .bind(stats.scroll_25_count)
        .bind(stats.scroll_50_count)
        .bind(stats.scroll_75_count)
        .bind(stats.scroll_100_count)
        .bind(stats.engaged_sessions)
        .bind(stats.engagement_rate)
        .bind(stats.cta_clicks)
        .bind(stats.shares)
        .bind(stats.comments)
        .bind(stats.likes)
        .bind(stats.bookmarks)
        .bind(stats.copy_links)
        .bind(stats.newsletter_signups)
        .bind(stats.form_submits)
        .bind(sqlx::types::Json(&stats.shares_by_platform))
        .bind(sqlx::types::Json(&stats.sessions_by_source))
        .bind(stats.first_viewed_at)
        .bind(stats.last_viewed_at)
        .bind(stats.engagement_score)
        .bind(stats.computed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_post_analytics(&self, post_id: Uuid) -> Result<Option<PostAnalytics>> {
        let row = sqlx::query("SELECT * FROM post_analytics WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(analytics_from_row).transpose()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
