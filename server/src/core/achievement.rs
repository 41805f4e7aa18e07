//! Achievement Evaluator (C5)
//!
//! Stateless milestone checks over a per-user unlocked-set. Each
//! `check_*` call compares the supplied metric against a fixed threshold
//! ladder and returns the unlocks earned for the first time — the same
//! `(user_id, milestone_key)` pair is never returned twice in the process
//! lifetime (check-then-insert is atomic under the set's write lock).
//! Every fresh unlock is published to the hub on
//! `user:<user_id>:achievements`; publication never blocks the evaluator.
//!
//! The catalog below is the fixed `milestone class -> {title, description,
//! icon, points, category}` mapping: every unlock carries its entry
//! verbatim in the broadcast payload so a client can render a badge without
//! hardcoding its own copy of the threshold ladder. `milestone_key` stays
//! app/category-qualified (e.g. `score:typing:500`) for dedup purposes, but
//! the catalog itself is keyed on the app/category-agnostic milestone class
//! (e.g. `score:500`), since the set of classes is what's actually fixed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};

use super::hub::HubHandle;
use super::message::Message;

/// A catalog entry: the static, renderable description of a milestone
/// class, independent of which app/category instance earned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub points: u32,
    pub category: &'static str,
}

/// A single milestone unlock produced by an evaluator call.
#[derive(Debug, Clone, PartialEq)]
pub struct Unlock {
    pub user_id: i64,
    pub milestone_key: String,
    pub catalog: CatalogEntry,
}

const STREAK_THRESHOLDS: [i64; 3] = [7, 30, 100];
const SCORE_THRESHOLDS: [i64; 5] = [100, 500, 1000, 5000, 10000];
const CONSISTENCY_THRESHOLD: i64 = 10;

const STREAK_CATALOG: [(i64, CatalogEntry); 3] = [
    (
        7,
        CatalogEntry {
            title: "Week Streak",
            description: "Practiced seven days in a row",
            icon: "flame",
            points: 50,
            category: "streak",
        },
    ),
    (
        30,
        CatalogEntry {
            title: "Month Streak",
            description: "Practiced thirty days in a row",
            icon: "flame",
            points: 200,
            category: "streak",
        },
    ),
    (
        100,
        CatalogEntry {
            title: "Century Streak",
            description: "Practiced one hundred days in a row",
            icon: "flame",
            points: 750,
            category: "streak",
        },
    ),
];

const SCORE_CATALOG: [(i64, CatalogEntry); 5] = [
    (
        100,
        CatalogEntry {
            title: "Getting Started",
            description: "Scored 100 points",
            icon: "star",
            points: 10,
            category: "score",
        },
    ),
    (
        500,
        CatalogEntry {
            title: "Rising Star",
            description: "Scored 500 points",
            icon: "star",
            points: 25,
            category: "score",
        },
    ),
    (
        1000,
        CatalogEntry {
            title: "High Scorer",
            description: "Scored 1,000 points",
            icon: "star",
            points: 50,
            category: "score",
        },
    ),
    (
        5000,
        CatalogEntry {
            title: "Expert",
            description: "Scored 5,000 points",
            icon: "trophy",
            points: 150,
            category: "score",
        },
    ),
    (
        10000,
        CatalogEntry {
            title: "Master",
            description: "Scored 10,000 points",
            icon: "trophy",
            points: 300,
            category: "score",
        },
    ),
];

const ACCURACY_95_CATALOG: CatalogEntry = CatalogEntry {
    title: "Sharp Shooter",
    description: "Achieved 95% accuracy or higher",
    icon: "target",
    points: 75,
    category: "accuracy",
};
const ACCURACY_100_CATALOG: CatalogEntry = CatalogEntry {
    title: "Perfectionist",
    description: "Achieved 100% accuracy",
    icon: "target",
    points: 200,
    category: "accuracy",
};
const CONSISTENCY_CATALOG: CatalogEntry = CatalogEntry {
    title: "Consistent",
    description: "Completed 10 practice sessions",
    icon: "calendar",
    points: 100,
    category: "consistency",
};

fn catalog_lookup(table: &[(i64, CatalogEntry)], threshold: i64) -> CatalogEntry {
    table
        .iter()
        .find(|(t, _)| *t == threshold)
        .map(|(_, entry)| *entry)
        .expect("threshold ladder and catalog must stay in lockstep")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RankTier {
    Top10,
    Top5,
    First,
}

impl RankTier {
    fn for_rank(rank: i64) -> Option<Self> {
        match rank {
            1 => Some(Self::First),
            2..=5 => Some(Self::Top5),
            6..=10 => Some(Self::Top10),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Top5 => "top5",
            Self::Top10 => "top10",
        }
    }

    fn catalog(self) -> CatalogEntry {
        match self {
            Self::Top10 => CatalogEntry {
                title: "Top 10",
                description: "Reached the top 10 on a leaderboard",
                icon: "medal",
                points: 100,
                category: "rank",
            },
            Self::Top5 => CatalogEntry {
                title: "Top 5",
                description: "Reached the top 5 on a leaderboard",
                icon: "medal",
                points: 250,
                category: "rank",
            },
            Self::First => CatalogEntry {
                title: "Champion",
                description: "Reached first place on a leaderboard",
                icon: "crown",
                points: 500,
                category: "rank",
            },
        }
    }
}

pub struct AchievementEvaluator {
    hub: HubHandle,
    unlocked: RwLock<HashMap<i64, HashSet<String>>>,
}

impl AchievementEvaluator {
    pub fn new(hub: HubHandle) -> Arc<Self> {
        Arc::new(Self {
            hub,
            unlocked: RwLock::new(HashMap::new()),
        })
    }

    /// Atomically claim `milestone_key` for `user_id`. Returns `true` only
    /// the first time this pair is seen.
    fn claim(&self, user_id: i64, milestone_key: &str) -> bool {
        let mut unlocked = self.unlocked.write();
        unlocked
            .entry(user_id)
            .or_default()
            .insert(milestone_key.to_string())
    }

    fn publish(&self, unlock: &Unlock, extra: Value) {
        let mut payload = std::collections::BTreeMap::new();
        payload.insert(
            "milestone".to_string(),
            Value::String(unlock.milestone_key.clone()),
        );
        payload.insert(
            "title".to_string(),
            Value::String(unlock.catalog.title.to_string()),
        );
        payload.insert(
            "description".to_string(),
            Value::String(unlock.catalog.description.to_string()),
        );
        payload.insert(
            "icon".to_string(),
            Value::String(unlock.catalog.icon.to_string()),
        );
        payload.insert("points".to_string(), Value::from(unlock.catalog.points));
        payload.insert(
            "category".to_string(),
            Value::String(unlock.catalog.category.to_string()),
        );
        if let Value::Object(map) = extra {
            for (k, v) in map {
                payload.insert(k, v);
            }
        }
        let topic = format!("user:{}:achievements", unlock.user_id);
        self.hub.broadcast(
            topic.clone(),
            Message::new_achievement_unlocked(topic, unlock.user_id, payload),
        );
    }

    pub fn check_streak_milestone(
        &self,
        user_id: i64,
        username: &str,
        current_streak_days: i64,
    ) -> Vec<Unlock> {
        let mut unlocks = Vec::new();
        for &threshold in STREAK_THRESHOLDS.iter() {
            if current_streak_days < threshold {
                continue;
            }
            let key = format!("streak:{threshold}");
            if self.claim(user_id, &key) {
                let unlock = Unlock {
                    user_id,
                    milestone_key: key,
                    catalog: catalog_lookup(&STREAK_CATALOG, threshold),
                };
                self.publish(
                    &unlock,
                    json!({"username": username, "streak_days": current_streak_days}),
                );
                unlocks.push(unlock);
            }
        }
        unlocks
    }

    pub fn check_score_milestone(
        &self,
        user_id: i64,
        username: &str,
        score: i64,
        app: &str,
    ) -> Vec<Unlock> {
        let mut unlocks = Vec::new();
        for &threshold in SCORE_THRESHOLDS.iter() {
            if score < threshold {
                continue;
            }
            let key = format!("score:{app}:{threshold}");
            if self.claim(user_id, &key) {
                let unlock = Unlock {
                    user_id,
                    milestone_key: key,
                    catalog: catalog_lookup(&SCORE_CATALOG, threshold),
                };
                self.publish(&unlock, json!({"username": username, "score": score, "app": app}));
                unlocks.push(unlock);
            }
        }
        unlocks
    }

    pub fn check_rank_milestone(
        &self,
        user_id: i64,
        username: &str,
        rank: i64,
        category: &str,
    ) -> Vec<Unlock> {
        let Some(tier) = RankTier::for_rank(rank) else {
            return Vec::new();
        };
        let key = format!("rank:{category}:{}", tier.key());
        if !self.claim(user_id, &key) {
            return Vec::new();
        }
        let unlock = Unlock {
            user_id,
            milestone_key: key,
            catalog: tier.catalog(),
        };
        self.publish(
            &unlock,
            json!({"username": username, "rank": rank, "category": category}),
        );
        vec![unlock]
    }

    pub fn check_accuracy_milestone(
        &self,
        user_id: i64,
        username: &str,
        accuracy_pct: f64,
    ) -> Vec<Unlock> {
        let mut unlocks = Vec::new();
        if accuracy_pct >= 100.0 {
            let key = "accuracy:100".to_string();
            if self.claim(user_id, &key) {
                let unlock = Unlock {
                    user_id,
                    milestone_key: key,
                    catalog: ACCURACY_100_CATALOG,
                };
                self.publish(&unlock, json!({"username": username, "accuracy_pct": accuracy_pct}));
                unlocks.push(unlock);
            }
        }
        if accuracy_pct >= 95.0 {
            let key = "accuracy:95".to_string();
            if self.claim(user_id, &key) {
                let unlock = Unlock {
                    user_id,
                    milestone_key: key,
                    catalog: ACCURACY_95_CATALOG,
                };
                self.publish(&unlock, json!({"username": username, "accuracy_pct": accuracy_pct}));
                unlocks.push(unlock);
            }
        }
        unlocks
    }

    pub fn check_consistency_milestone(
        &self,
        user_id: i64,
        username: &str,
        sessions: i64,
    ) -> Vec<Unlock> {
        if sessions < CONSISTENCY_THRESHOLD {
            return Vec::new();
        }
        let key = format!("consistency:{CONSISTENCY_THRESHOLD}");
        if !self.claim(user_id, &key) {
            return Vec::new();
        }
        let unlock = Unlock {
            user_id,
            milestone_key: key,
            catalog: CONSISTENCY_CATALOG,
        };
        self.publish(&unlock, json!({"username": username, "sessions": sessions}));
        vec![unlock]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> Arc<AchievementEvaluator> {
        AchievementEvaluator::new(HubHandle::spawn())
    }

    #[tokio::test]
    async fn test_s5_score_dedup_across_thresholds() {
        let eval = evaluator();
        let first = eval.check_score_milestone(123, "ada", 150, "typing");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].milestone_key, "score:typing:100");

        let second = eval.check_score_milestone(123, "ada", 600, "typing");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].milestone_key, "score:typing:500");

        let repeat = eval.check_score_milestone(123, "ada", 150, "typing");
        assert!(repeat.is_empty());
    }

    #[tokio::test]
    async fn test_streak_thresholds() {
        let eval = evaluator();
        let unlocks = eval.check_streak_milestone(1, "a", 35);
        let keys: Vec<_> = unlocks.iter().map(|u| u.milestone_key.clone()).collect();
        assert_eq!(keys, vec!["streak:7", "streak:30"]);
    }

    #[tokio::test]
    async fn test_rank_tiers() {
        let eval = evaluator();
        assert_eq!(eval.check_rank_milestone(1, "a", 1, "typing").len(), 1);
        assert_eq!(eval.check_rank_milestone(1, "a", 1, "typing").len(), 0); // dedup
        assert_eq!(eval.check_rank_milestone(2, "b", 3, "typing").len(), 1);
        assert!(eval.check_rank_milestone(3, "c", 42, "typing").is_empty());
    }

    #[tokio::test]
    async fn test_accuracy_milestones_both_fire_at_100() {
        let eval = evaluator();
        let unlocks = eval.check_accuracy_milestone(1, "a", 100.0);
        let keys: HashSet<_> = unlocks.iter().map(|u| u.milestone_key.clone()).collect();
        assert!(keys.contains("accuracy:95"));
        assert!(keys.contains("accuracy:100"));
    }

    #[tokio::test]
    async fn test_consistency_milestone() {
        let eval = evaluator();
        assert!(eval.check_consistency_milestone(1, "a", 9).is_empty());
        assert_eq!(eval.check_consistency_milestone(1, "a", 10).len(), 1);
        assert!(eval.check_consistency_milestone(1, "a", 15).is_empty());
    }

    #[tokio::test]
    async fn test_dedup_is_per_user() {
        let eval = evaluator();
        assert_eq!(eval.check_score_milestone(1, "a", 100, "math").len(), 1);
        assert_eq!(eval.check_score_milestone(2, "b", 100, "math").len(), 1);
    }

    #[tokio::test]
    async fn test_catalog_fields_are_present_on_unlock() {
        let eval = evaluator();
        let unlock = &eval.check_score_milestone(1, "a", 100, "typing")[0];
        assert_eq!(unlock.catalog.title, "Getting Started");
        assert_eq!(unlock.catalog.category, "score");
        assert!(unlock.catalog.points > 0);
        assert!(!unlock.catalog.icon.is_empty());
        assert!(!unlock.catalog.description.is_empty());
    }

    #[tokio::test]
    async fn test_rank_catalog_differs_per_tier() {
        let eval = evaluator();
        let champion = &eval.check_rank_milestone(1, "a", 1, "typing")[0];
        let top5 = &eval.check_rank_milestone(2, "b", 3, "typing")[0];
        assert_eq!(champion.catalog.title, "Champion");
        assert_eq!(top5.catalog.title, "Top 5");
        assert_ne!(champion.catalog.points, top5.catalog.points);
    }
}
