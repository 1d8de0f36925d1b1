//! Per-post aggregate analytics and their computation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engagement::PostSession;
use crate::events::{EngagementEvent, EngagementEventType};
use crate::limits::SCROLL_MILESTONES;

/// Engagement score weighting.
///
/// A heuristic linear combination, not a fitted model. Shipped as
/// configuration so deployments can tune the ranking without a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementWeights {
    pub views: f64,
    pub avg_time: f64,
    pub scroll_complete: f64,
    pub share: f64,
    pub newsletter_signup: f64,
    pub cta_click: f64,
    pub scroll_depth: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            views: 1.0,
            avg_time: 0.5,
            scroll_complete: 5.0,
            share: 10.0,
            newsletter_signup: 20.0,
            cta_click: 3.0,
            scroll_depth: 0.5,
        }
    }
}

/// Denormalized per-post aggregate row.
///
/// Entirely derived: every aggregation pass recomputes and overwrites the
/// whole row, which is what makes redundant recomputation harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAnalytics {
    pub post_id: Uuid,
    pub total_views: i64,
    pub unique_visitors: i64,
    pub total_time_seconds: i64,
    pub avg_time_seconds: f64,
    pub median_time_seconds: f64,
    pub avg_scroll_depth: f64,
    pub scroll_25_count: i64,
    pub scroll_50_count: i64,
    pub scroll_75_count: i64,
    pub scroll_100_count: i64,
    pub engaged_sessions: i64,
    /// Engaged sessions as a percentage of views; 0 when there are none.
    pub engagement_rate: f64,
    pub cta_clicks: i64,
    pub shares: i64,
    pub comments: i64,
    pub likes: i64,
    pub bookmarks: i64,
    pub copy_links: i64,
    pub newsletter_signups: i64,
    pub form_submits: i64,
    /// Share counts keyed by payload platform.
    pub shares_by_platform: BTreeMap<String, i64>,
    /// Session counts keyed by traffic source.
    pub sessions_by_source: BTreeMap<String, i64>,
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub engagement_score: f64,
    pub computed_at: DateTime<Utc>,
}

impl PostAnalytics {
    /// Computes the full replacement aggregate for one post.
    ///
    /// Pure: the same sessions, events, weights, and timestamp always
    /// produce an identical row. The worker feeds it everything the store
    /// holds for the post and persists the result in one upsert.
    pub fn compute(
        post_id: Uuid,
        sessions: &[PostSession],
        events: &[EngagementEvent],
        weights: &EngagementWeights,
        now: DateTime<Utc>,
    ) -> Self {
        let total_views = sessions.len() as i64;

        let unique_visitors = {
            let mut visitors: Vec<Uuid> = sessions.iter().map(|s| s.visitor_id).collect();
            visitors.sort_unstable();
            visitors.dedup();
            visitors.len() as i64
        };

        let total_time_seconds: i64 = sessions.iter().map(|s| s.time_on_page).sum();
        let avg_time_seconds = ratio(total_time_seconds as f64, total_views);
        let median_time_seconds = median(sessions.iter().map(|s| s.time_on_page));

        let avg_scroll_depth = ratio(
            sessions.iter().map(|s| s.max_scroll_depth as f64).sum(),
            total_views,
        );

        let mut milestone_counts = [0i64; SCROLL_MILESTONES.len()];
        for session in sessions {
            for (count, milestone) in milestone_counts.iter_mut().zip(SCROLL_MILESTONES) {
                if session.max_scroll_depth >= milestone {
                    *count += 1;
                }
            }
        }
        let [scroll_25_count, scroll_50_count, scroll_75_count, scroll_100_count] =
            milestone_counts;

        let engaged_sessions = sessions.iter().filter(|s| s.was_engaged).count() as i64;
        let engagement_rate = round2(ratio(engaged_sessions as f64 * 100.0, total_views));

        let mut sessions_by_source: BTreeMap<String, i64> = BTreeMap::new();
        for session in sessions {
            *sessions_by_source
                .entry(session.traffic_source.as_str().to_string())
                .or_default() += 1;
        }

        let count_of = |ty: EngagementEventType| -> i64 {
            events.iter().filter(|e| e.event_type == ty).count() as i64
        };

        let mut shares_by_platform: BTreeMap<String, i64> = BTreeMap::new();
        for event in events
            .iter()
            .filter(|e| e.event_type == EngagementEventType::Share)
        {
            *shares_by_platform.entry(event.share_platform()).or_default() += 1;
        }

        let cta_clicks = count_of(EngagementEventType::CtaClick);
        let shares = count_of(EngagementEventType::Share);
        let newsletter_signups = count_of(EngagementEventType::NewsletterSignup);

        let first_viewed_at = sessions.iter().map(|s| s.entered_at).min();
        let last_viewed_at = sessions.iter().map(|s| s.entered_at).max();

        let engagement_score = round2(
            total_views as f64 * weights.views
                + avg_time_seconds * weights.avg_time
                + scroll_100_count as f64 * weights.scroll_complete
                + shares as f64 * weights.share
                + newsletter_signups as f64 * weights.newsletter_signup
                + cta_clicks as f64 * weights.cta_click
                + avg_scroll_depth * weights.scroll_depth,
        );

        Self {
            post_id,
            total_views,
            unique_visitors,
            total_time_seconds,
            avg_time_seconds: round2(avg_time_seconds),
            median_time_seconds: round2(median_time_seconds),
            avg_scroll_depth: round2(avg_scroll_depth),
            scroll_25_count,
            scroll_50_count,
            scroll_75_count,
            scroll_100_count,
            engaged_sessions,
            engagement_rate,
            cta_clicks,
            shares,
            comments: count_of(EngagementEventType::Comment),
            likes: count_of(EngagementEventType::Like),
            bookmarks: count_of(EngagementEventType::Bookmark),
            copy_links: count_of(EngagementEventType::CopyLink),
            newsletter_signups,
            form_submits: count_of(EngagementEventType::FormSubmit),
            shares_by_platform,
            sessions_by_source,
            first_viewed_at,
            last_viewed_at,
            engagement_score,
            computed_at: now,
        }
    }
}

/// Numerator over denominator, 0 when the denominator is 0. Aggregates must
/// never carry NaN.
fn ratio(numerator: f64, denominator: i64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

fn median(values: impl Iterator<Item = i64>) -> f64 {
    let mut values: Vec<i64> = values.collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) as f64 / 2.0
    } else {
        values[mid] as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
