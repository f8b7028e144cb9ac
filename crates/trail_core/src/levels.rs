//! Level and Rank Calculator
//!
//! Level is a pure function of cumulative XP on a square-root curve:
//!
//! ```text
//! level(xp)    = floor(sqrt(xp / 100)) + 1
//! xp_floor(L)  = (L - 1)^2 * 100
//! ```
//!
//! - Level 1: 0 XP
//! - Level 2: 100 XP
//! - Level 5: 1,600 XP
//! - Level 11: 10,000 XP
//!
//! Rank is a step function of level over fixed upper bounds.
//!
//! The square root is computed on integers so a total sitting exactly on a
//! level boundary always lands on that level, however often it is recomputed.

use serde::{Deserialize, Serialize};

/// XP per squared level step
pub const XP_PER_LEVEL_UNIT: u64 = 100;

/// Rank bands as (inclusive upper level bound, rank). Anything above the
/// last bound is `Rank::Virtuoso`.
pub const RANK_BANDS: &[(u32, Rank)] = &[
    (5, Rank::Novice),
    (10, Rank::Apprentice),
    (15, Rank::Journeyman),
    (20, Rank::Adept),
    (25, Rank::Pro),
    (30, Rank::Master),
];

/// Human-readable tier derived from level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    Novice,
    Apprentice,
    Journeyman,
    Adept,
    Pro,
    Master,
    Virtuoso,
}

impl Rank {
    /// Get rank from level
    pub fn from_level(level: u32) -> Self {
        for &(max, rank) in RANK_BANDS {
            if level <= max {
                return rank;
            }
        }
        Rank::Virtuoso
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Novice => "Novice",
            Rank::Apprentice => "Apprentice",
            Rank::Journeyman => "Journeyman",
            Rank::Adept => "Adept",
            Rank::Pro => "Pro",
            Rank::Master => "Master",
            Rank::Virtuoso => "Virtuoso",
        }
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Calculate level from total XP (always >= 1)
pub fn level_from_xp(xp: u64) -> u32 {
    let steps = isqrt(xp / XP_PER_LEVEL_UNIT);
    u32::try_from(steps).unwrap_or(u32::MAX - 1) + 1
}

/// XP required to reach `level`. Level 0 is treated as level 1.
pub fn xp_floor(level: u32) -> u64 {
    let steps = u64::from(level.saturating_sub(1));
    steps
        .saturating_mul(steps)
        .saturating_mul(XP_PER_LEVEL_UNIT)
}

/// Rank label for a level
pub fn rank_from_level(level: u32) -> Rank {
    Rank::from_level(level)
}

/// Floor of the square root, exact for every u64.
fn isqrt(n: u64) -> u64 {
    let mut root = (n as f64).sqrt() as u64;
    // f64 rounding can land one off in either direction for large n
    while root.checked_mul(root).map_or(true, |sq| sq > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).map_or(false, |sq| sq <= n) {
        root += 1;
    }
    root
}

/// Progress within the current level, as rendered by the gamification hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub level: u32,
    pub rank: Rank,
    /// XP earned since reaching `level`
    pub xp_into_level: u64,
    /// Width of the current level band
    pub xp_for_next: u64,
    /// Progress to next level (0-100)
    pub percent: u8,
}

impl LevelProgress {
    pub fn from_xp(xp: u64) -> Self {
        Self::for_level(xp, level_from_xp(xp))
    }

    /// Progress against an explicit level, which may come from the server
    /// rather than the local curve.
    pub fn for_level(xp: u64, level: u32) -> Self {
        let level = level.max(1);
        let floor = xp_floor(level);
        let next = xp_floor(level.saturating_add(1));
        let xp_for_next = next.saturating_sub(floor);
        let xp_into_level = xp.saturating_sub(floor).min(xp_for_next);
        let percent = if xp_for_next == 0 {
            100
        } else {
            ((xp_into_level as u128 * 100) / xp_for_next as u128) as u8
        };

        Self {
            level,
            rank: Rank::from_level(level),
            xp_into_level,
            xp_for_next,
            percent,
        }
    }
}
