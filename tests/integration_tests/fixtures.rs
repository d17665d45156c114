//! Test fixtures for integration tests
//!
//! Provides sample observation payloads as the ingestion collaborator
//! would deliver them

/// Two contents in one category, observed at three successive hours,
/// with counters in the loose shapes collectors produce
pub const SAMPLE_OBSERVATIONS_JSON: &str = r##"
[
    {
        "content_id": "vid-001",
        "trend_id": "dance-challenge",
        "platform_source": "YouTube",
        "category": "Music",
        "published_at": "2025-03-01T00:00:00Z",
        "observed_at": "2025-03-01T06:00:00Z",
        "metrics": { "views": 12000, "likes": 900, "comments": 120, "shares": 40 }
    },
    {
        "content_id": "vid-001",
        "trend_id": "dance-challenge",
        "platform_source": "youtube",
        "category": "Music",
        "published_at": "2025-03-01T00:00:00Z",
        "observed_at": "2025-03-01T07:00:00Z",
        "metrics": { "views": "18000", "likes": 1500, "comments": null, "shares": 60 }
    },
    {
        "content_id": "clip-77",
        "trend_id": "dance-challenge",
        "platform_source": "tiktok",
        "category": "Music",
        "published_at": "2025-03-01T05:00:00Z",
        "observed_at": "2025-03-01T08:00:00Z",
        "metrics": { "views": 50000, "likes": 7000, "comments": "n/a", "shares": 900 },
        "hashtags": ["#fyp", "dance"]
    },
    {
        "content_id": "post-9",
        "platform_source": "reddit",
        "category": "News",
        "observed_at": "2025-03-01T08:00:00Z",
        "metrics": { "views": 300 }
    }
]
"##;

/// Hour-by-hour scores for a trend that climbs steadily
pub fn rising_scores(n: usize) -> Vec<f64> {
    (0..n).map(|i| 40.0 + 1.5 * i as f64).collect()
}

/// Scores that flip between two levels every hour
pub fn oscillating_scores(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if i % 2 == 0 { 15.0 } else { 85.0 })
        .collect()
}
