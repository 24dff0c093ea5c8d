//! # 等级体系
//!
//! 从累计积分推导等级、等级内进度与距下一级所需积分。纯函数，无状态。

use serde::Serialize;
use tracing::warn;

/// 等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelTier {
    pub level: u8,
    pub name: &'static str,
    pub min_points: i64,
    /// 最高等级无上限
    pub max_points: Option<i64>,
    pub badge: &'static str,
}

impl LevelTier {
    pub fn contains(&self, points: i64) -> bool {
        points >= self.min_points && self.max_points.is_none_or(|max| points <= max)
    }

    pub fn is_top(&self) -> bool {
        self.max_points.is_none()
    }
}

/// 等级表：区间连续、不重叠，覆盖 [0, ∞)
pub const LEVEL_TIERS: [LevelTier; 10] = [
    LevelTier { level: 1, name: "Başlangıç", min_points: 0, max_points: Some(99), badge: "🌱" },
    LevelTier { level: 2, name: "Bronz", min_points: 100, max_points: Some(249), badge: "🥉" },
    LevelTier { level: 3, name: "Gümüş", min_points: 250, max_points: Some(499), badge: "🥈" },
    LevelTier { level: 4, name: "Altın", min_points: 500, max_points: Some(999), badge: "🥇" },
    LevelTier { level: 5, name: "Platin", min_points: 1000, max_points: Some(1999), badge: "💎" },
    LevelTier { level: 6, name: "Elmas", min_points: 2000, max_points: Some(3499), badge: "💠" },
    LevelTier { level: 7, name: "Usta", min_points: 3500, max_points: Some(4999), badge: "🔥" },
    LevelTier { level: 8, name: "Uzman", min_points: 5000, max_points: Some(7499), badge: "⭐" },
    LevelTier { level: 9, name: "Efsane", min_points: 7500, max_points: Some(9999), badge: "👑" },
    LevelTier { level: 10, name: "Ölümsüz", min_points: 10000, max_points: None, badge: "🏆" },
];

fn sanitize(points: i64) -> i64 {
    if points < 0 {
        warn!(points, "negative point total clamped to zero");
        0
    } else {
        points
    }
}

/// 从最高等级向下扫描，返回第一个 min ≤ points 的等级
pub fn tier_for(points: i64) -> &'static LevelTier {
    let points = sanitize(points);
    LEVEL_TIERS
        .iter()
        .rev()
        .find(|tier| tier.min_points <= points)
        .unwrap_or(&LEVEL_TIERS[0])
}

/// 等级内进度百分比，最高等级恒为 100
pub fn progress_within_tier(points: i64) -> f64 {
    let points = sanitize(points);
    let tier = tier_for(points);
    match tier.max_points {
        Some(max) => {
            let span = (max - tier.min_points + 1) as f64;
            (points - tier.min_points) as f64 / span * 100.0
        }
        None => 100.0,
    }
}

/// 距下一级所需积分，最高等级为 0
pub fn points_to_next_tier(points: i64) -> i64 {
    let points = sanitize(points);
    match tier_for(points).max_points {
        Some(max) => max + 1 - points,
        None => 0,
    }
}

/// 资料页展示用的等级信息
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelProgress {
    pub tier: LevelTier,
    pub progress: f64,
    pub points_to_next: i64,
}

pub fn level_progress(points: i64) -> LevelProgress {
    let points = sanitize(points);
    LevelProgress {
        tier: *tier_for(points),
        progress: progress_within_tier(points),
        points_to_next: points_to_next_tier(points),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_contiguous() {
        assert_eq!(LEVEL_TIERS[0].min_points, 0);
        for pair in LEVEL_TIERS.windows(2) {
            assert_eq!(pair[0].max_points, Some(pair[1].min_points - 1));
        }
        assert!(LEVEL_TIERS[9].is_top());
    }

    #[test]
    fn test_boundaries_map_to_exactly_one_tier() {
        for tier in &LEVEL_TIERS {
            assert_eq!(tier_for(tier.min_points).level, tier.level);
            if let Some(max) = tier.max_points {
                assert_eq!(tier_for(max).level, tier.level);
            }
            let matching = LEVEL_TIERS
                .iter()
                .filter(|t| t.contains(tier.min_points))
                .count();
            assert_eq!(matching, 1);
        }
    }

    #[test]
    fn test_bronze_and_beginner_edges() {
        let bronze = level_progress(100);
        assert_eq!(bronze.tier.name, "Bronz");
        assert_eq!(bronze.tier.level, 2);
        assert_eq!(bronze.progress, 0.0);
        assert_eq!(bronze.points_to_next, 150);

        let beginner = level_progress(99);
        assert_eq!(beginner.tier.name, "Başlangıç");
        assert_eq!(beginner.tier.level, 1);
        assert_eq!(beginner.progress, 99.0);
        assert_eq!(beginner.points_to_next, 1);
    }

    #[test]
    fn test_progress_is_monotonic_within_tier() {
        let mut last = -1.0;
        for points in 250..=499 {
            let progress = progress_within_tier(points);
            assert!(progress >= last);
            assert!(progress < 100.0);
            last = progress;
        }
    }

    #[test]
    fn test_top_tier_is_unbounded() {
        assert_eq!(tier_for(1_000_000).name, "Ölümsüz");
        assert_eq!(progress_within_tier(10_000), 100.0);
        assert_eq!(points_to_next_tier(10_000), 0);
    }

    #[test]
    fn test_negative_points_clamp_to_first_tier() {
        assert_eq!(tier_for(-5).level, 1);
        assert_eq!(points_to_next_tier(-5), 100);
    }
}
