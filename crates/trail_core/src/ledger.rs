//! Award dedup set and the optimistic XP ledger.
//!
//! The ledger keeps two slices:
//! - `optimistic`: what the UI shows, credited the instant an award is made
//! - `confirmed`: the last totals the remote service reported as authoritative
//!
//! `reconcile` is the only place the two meet.

use crate::levels::{level_from_xp, LevelProgress, Rank};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Event keys already granted in this session. Never shrinks until the
/// session ends.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    keys: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key. Returns false if it was already granted.
    pub fn insert_new(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        self.keys.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// XP total with its level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpTotals {
    pub xp: u64,
    pub level: u32,
}

impl XpTotals {
    pub fn from_xp(xp: u64) -> Self {
        Self {
            xp,
            level: level_from_xp(xp),
        }
    }
}

impl Default for XpTotals {
    fn default() -> Self {
        Self { xp: 0, level: 1 }
    }
}

/// One-shot level-up notification for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub level: u32,
    pub rank: Rank,
}

/// How the remote service answered an award
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardDisposition {
    /// Newly applied on the server
    Applied,
    /// Server had already applied this key
    Replayed,
}

/// What reconciliation did to the optimistic slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Optimistic totals replaced. `drift` is new minus old XP.
    Corrected { drift: i64 },
    /// Totals agreed already
    InSync,
    /// Replay response; totals ignored
    IgnoredReplay,
}

/// Optimistic and confirmed XP for the current session
#[derive(Debug, Clone, Default)]
pub struct XpLedger {
    optimistic: XpTotals,
    confirmed: Option<XpTotals>,
    pending_level_up: Option<LevelUp>,
}

impl XpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from the login profile
    pub fn from_totals(totals: XpTotals) -> Self {
        let totals = XpTotals {
            xp: totals.xp,
            level: totals.level.max(1),
        };
        Self {
            optimistic: totals,
            confirmed: Some(totals),
            pending_level_up: None,
        }
    }

    pub fn totals(&self) -> XpTotals {
        self.optimistic
    }

    pub fn confirmed(&self) -> Option<XpTotals> {
        self.confirmed
    }

    pub fn progress(&self) -> LevelProgress {
        LevelProgress::for_level(self.optimistic.xp, self.optimistic.level)
    }

    /// Credit XP immediately. Returns the level-up, if this crossed one.
    ///
    /// Level only moves up here: a server-assigned level ahead of the local
    /// curve is kept until the curve catches up.
    pub fn credit(&mut self, amount: u32) -> Option<LevelUp> {
        let previous = self.optimistic.level;
        self.optimistic.xp = self.optimistic.xp.saturating_add(u64::from(amount));
        let computed = level_from_xp(self.optimistic.xp);

        if computed > previous {
            self.optimistic.level = computed;
            let level_up = LevelUp {
                level: computed,
                rank: Rank::from_level(computed),
            };
            info!("Level up: {} -> {} ({})", previous, computed, level_up.rank);
            self.pending_level_up = Some(level_up.clone());
            return Some(level_up);
        }
        None
    }

    /// Fold server totals into the optimistic slice.
    ///
    /// A newly applied award overwrites local totals with the server's. Awards
    /// still queued show up again as each one is confirmed.
    pub fn reconcile(&mut self, server: XpTotals, disposition: AwardDisposition) -> Reconciliation {
        if disposition == AwardDisposition::Replayed {
            debug!(
                "Ignoring totals on replayed award (server xp={}, local xp={})",
                server.xp, self.optimistic.xp
            );
            return Reconciliation::IgnoredReplay;
        }

        let next = XpTotals {
            xp: server.xp,
            level: server.level.max(1),
        };
        self.confirmed = Some(next);

        if next == self.optimistic {
            return Reconciliation::InSync;
        }

        let drift = next.xp as i64 - self.optimistic.xp as i64;
        if drift != 0 {
            info!(
                "Reconciled XP with server: local={} server={} drift={:+}",
                self.optimistic.xp, next.xp, drift
            );
        }
        self.optimistic = next;
        Reconciliation::Corrected { drift }
    }

    pub fn pending_level_up(&self) -> Option<&LevelUp> {
        self.pending_level_up.as_ref()
    }

    /// Clear the level-up once the user has seen it
    pub fn acknowledge_level_up(&mut self) -> Option<LevelUp> {
        self.pending_level_up.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_insert_once() {
        let mut dedup = DedupSet::new();
        assert!(dedup.insert_new("lesson_complete_1"));
        assert!(!dedup.insert_new("lesson_complete_1"));
        assert!(dedup.contains("lesson_complete_1"));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_credit_crosses_level() {
        let mut ledger = XpLedger::new();
        let level_up = ledger.credit(100).expect("should level up");
        assert_eq!(level_up.level, 2);
        assert_eq!(level_up.rank, Rank::Novice);
        assert_eq!(ledger.totals(), XpTotals { xp: 100, level: 2 });
        assert_eq!(ledger.pending_level_up(), Some(&level_up));
    }

    #[test]
    fn test_credit_without_level_change() {
        let mut ledger = XpLedger::new();
        assert!(ledger.credit(50).is_none());
        assert!(ledger.credit(49).is_none());
        assert_eq!(ledger.totals().level, 1);
        assert!(ledger.pending_level_up().is_none());
    }

    #[test]
    fn test_level_up_is_one_shot() {
        let mut ledger = XpLedger::new();
        ledger.credit(100);
        assert!(ledger.acknowledge_level_up().is_some());
        assert!(ledger.acknowledge_level_up().is_none());
    }

    #[test]
    fn test_credit_keeps_server_level_ahead_of_curve() {
        let mut ledger = XpLedger::from_totals(XpTotals { xp: 120, level: 4 });
        assert!(ledger.credit(10).is_none());
        assert_eq!(ledger.totals().level, 4);
    }

    #[test]
    fn test_reconcile_overwrites_local_totals() {
        let mut ledger = XpLedger::new();
        ledger.credit(10);
        let result = ledger.reconcile(XpTotals { xp: 510, level: 3 }, AwardDisposition::Applied);
        assert_eq!(result, Reconciliation::Corrected { drift: 500 });
        assert_eq!(ledger.totals(), XpTotals { xp: 510, level: 3 });
        assert_eq!(ledger.confirmed(), Some(XpTotals { xp: 510, level: 3 }));
    }

    #[test]
    fn test_reconcile_corrects_local_inflation() {
        let mut ledger = XpLedger::new();
        ledger.credit(10);
        ledger.credit(20);
        // Server already counted both awards once
        let result = ledger.reconcile(XpTotals { xp: 30, level: 1 }, AwardDisposition::Applied);
        assert_eq!(result, Reconciliation::InSync);

        ledger.credit(10);
        let result = ledger.reconcile(XpTotals { xp: 30, level: 1 }, AwardDisposition::Applied);
        assert_eq!(result, Reconciliation::Corrected { drift: -10 });
        assert_eq!(ledger.totals().xp, 30);
    }

    #[test]
    fn test_reconcile_ignores_replay_totals() {
        let mut ledger = XpLedger::new();
        ledger.credit(10);
        let result = ledger.reconcile(XpTotals { xp: 9_999, level: 10 }, AwardDisposition::Replayed);
        assert_eq!(result, Reconciliation::IgnoredReplay);
        assert_eq!(ledger.totals(), XpTotals { xp: 10, level: 1 });
        assert_eq!(ledger.confirmed(), None);
    }
}
