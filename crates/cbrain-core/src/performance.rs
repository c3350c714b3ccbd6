//! Published-content performance snapshots and the patterns derived from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Word count below which a post is `short`.
pub const SHORT_POST_MAX_WORDS: i32 = 100;
/// Word count below which a post is `medium`; anything longer is `long`.
pub const MEDIUM_POST_MAX_WORDS: i32 = 250;

/// Append-only engagement snapshot for one post on one platform.
///
/// The post's attributes are denormalized onto the snapshot at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub post_id: Uuid,
    pub platform: String,
    pub captured_at: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
    pub clicks: i64,
    pub impressions: i64,
    pub engagement_rate: f64,
    pub archetype: Option<String>,
    pub hook_type: Option<String>,
    pub format: Option<String>,
    pub topic: Option<String>,
    pub content_pillar: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub word_count: Option<i32>,
}

impl PerformanceRecord {
    /// The value of this record along one attribute dimension, if known.
    #[must_use]
    pub fn attribute(&self, pattern_type: PatternType) -> Option<String> {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
        };
        match pattern_type {
            PatternType::Archetype => non_blank(&self.archetype),
            PatternType::HookType => non_blank(&self.hook_type),
            PatternType::Format => non_blank(&self.format),
            PatternType::Topic => non_blank(&self.topic),
            PatternType::ContentPillar => non_blank(&self.content_pillar),
            PatternType::TimeOfDay => self.published_at.map(|t| time_of_day(t).to_string()),
            PatternType::LengthBucket => self.word_count.map(|w| length_bucket(w).to_string()),
        }
    }
}

/// UTC time-of-day bucket of a publish timestamp.
#[must_use]
pub fn time_of_day(at: DateTime<Utc>) -> &'static str {
    match at.hour() {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=21 => "evening",
        _ => "night",
    }
}

#[must_use]
pub fn length_bucket(word_count: i32) -> &'static str {
    if word_count < SHORT_POST_MAX_WORDS {
        "short"
    } else if word_count < MEDIUM_POST_MAX_WORDS {
        "medium"
    } else {
        "long"
    }
}

/// Attribute dimensions the analyzer groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Archetype,
    HookType,
    Format,
    Topic,
    TimeOfDay,
    ContentPillar,
    LengthBucket,
}

impl PatternType {
    pub const ALL: [PatternType; 7] = [
        PatternType::Archetype,
        PatternType::HookType,
        PatternType::Format,
        PatternType::Topic,
        PatternType::TimeOfDay,
        PatternType::ContentPillar,
        PatternType::LengthBucket,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::Archetype => "archetype",
            PatternType::HookType => "hook_type",
            PatternType::Format => "format",
            PatternType::Topic => "topic",
            PatternType::TimeOfDay => "time_of_day",
            PatternType::ContentPillar => "content_pillar",
            PatternType::LengthBucket => "length_bucket",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternType::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CoreError::InvalidPatternType(s.to_string()))
    }
}

/// Aggregated relationship between one attribute value and engagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePattern {
    pub owner_id: Uuid,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    pub avg_engagement_rate: f64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub sample_count: i32,
    pub confidence: f64,
    pub last_updated: DateTime<Utc>,
}

impl PerformancePattern {
    /// Ranking key for "top attributes": engagement weighted by confidence.
    #[must_use]
    pub fn weighted_score(&self) -> f64 {
        self.avg_engagement_rate * self.confidence
    }
}
