//! Traffic source classification.

use serde::{Deserialize, Serialize};

/// Fixed taxonomy of traffic source categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficSource {
    Instagram,
    Facebook,
    Youtube,
    Google,
    Twitter,
    Direct,
    Other,
}

/// Substring patterns checked per category, in match order.
const PATTERNS: [(TrafficSource, &[&str]); 5] = [
    (TrafficSource::Instagram, &["instagram", "ig.me"]),
    (TrafficSource::Facebook, &["facebook", "fb"]),
    (TrafficSource::Youtube, &["youtube", "youtu.be"]),
    (TrafficSource::Google, &["google"]),
    (TrafficSource::Twitter, &["twitter", "t.co", "x.com"]),
];

impl TrafficSource {
    /// All categories, in breakdown order.
    pub const ALL: [TrafficSource; 7] = [
        TrafficSource::Instagram,
        TrafficSource::Facebook,
        TrafficSource::Youtube,
        TrafficSource::Google,
        TrafficSource::Twitter,
        TrafficSource::Direct,
        TrafficSource::Other,
    ];

    /// Classifies a request into a traffic source category.
    ///
    /// Matching is substring-based and case-insensitive. The explicit hint
    /// (query parameter or client-supplied field) takes priority over the
    /// HTTP referrer. Both empty classifies as direct; anything else
    /// unmatched is other.
    pub fn classify(hint: Option<&str>, referrer: Option<&str>) -> Self {
        let hint = hint.map(str::trim).filter(|s| !s.is_empty());
        let referrer = referrer.map(str::trim).filter(|s| !s.is_empty());

        if hint.is_none() && referrer.is_none() {
            return Self::Direct;
        }

        for candidate in [hint, referrer].into_iter().flatten() {
            if let Some(source) = Self::match_patterns(candidate) {
                return source;
            }
        }

        Self::Other
    }

    fn match_patterns(value: &str) -> Option<Self> {
        let value = value.to_lowercase();
        PATTERNS
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|p| value.contains(p)))
            .map(|(source, _)| *source)
    }

    /// Returns the category as its stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Youtube => "youtube",
            Self::Google => "google",
            Self::Twitter => "twitter",
            Self::Direct => "direct",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrafficSource {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(Self::Instagram),
            "facebook" => Ok(Self::Facebook),
            "youtube" => Ok(Self::Youtube),
            "google" => Ok(Self::Google),
            "twitter" => Ok(Self::Twitter),
            "direct" => Ok(Self::Direct),
            "other" => Ok(Self::Other),
            _ => Err(crate::Error::validation(format!(
                "unknown traffic source: {}",
                s
            ))),
        }
    }
}
