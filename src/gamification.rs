use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use crate::config::GamificationConfig;
use crate::database::Database;
use crate::error::{CoreError, Result};
use crate::model::{
    Badge, BadgeTrigger, FeedbackOutcome, LoginOutcome, NewFeedback, UpvoteOutcome, User, XpAward,
};

pub const MAX_LEVEL: u32 = 20;

/// Minimum cumulative XP for each level; index 0 is level 1.
pub const LEVEL_THRESHOLDS: [i64; MAX_LEVEL as usize] = [
    0, 200, 400, 700, 1000, 1500, 2200, 3000, 4000, 5200, 6600, 8200, 10000, 12500, 15500, 19000,
    24000, 32000, 45000, 75000,
];

/// Highest level whose threshold is at or below `xp`.
pub fn resolve_level(xp: i64) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|&min_xp| min_xp <= xp)
        .map(|idx| idx as u32 + 1)
        .unwrap_or(1)
}

pub fn threshold_for(level: u32) -> Option<i64> {
    if level == 0 {
        return None;
    }
    LEVEL_THRESHOLDS.get(level as usize - 1).copied()
}

pub fn next_threshold(level: u32) -> Option<i64> {
    threshold_for(level + 1)
}

/// Reward scale for a user's current level. Lower bounds are inclusive.
pub fn tier_multiplier(level: u32) -> f64 {
    match level {
        l if l >= 20 => 5.0,
        l if l >= 15 => 4.0,
        l if l >= 10 => 3.0,
        l if l >= 5 => 2.0,
        _ => 1.0,
    }
}

pub fn adjusted_amount(amount: i64, level: u32) -> i64 {
    (amount as f64 * tier_multiplier(level)).round() as i64
}

struct BadgeTemplate {
    id: &'static str,
    name: &'static str,
    icon: &'static str,
}

const BADGES: &[BadgeTemplate] = &[
    BadgeTemplate { id: "early_bird", name: "Early Bird", icon: "🐦" },
    BadgeTemplate { id: "critic", name: "Critic", icon: "📝" },
    BadgeTemplate { id: "helper", name: "Helpful Peer", icon: "🤝" },
    BadgeTemplate { id: "streak_7", name: "Week Warrior", icon: "🔥" },
    BadgeTemplate { id: "level_5", name: "Rising Star", icon: "⭐" },
    BadgeTemplate { id: "level_10", name: "Scholar", icon: "🎓" },
];

fn badge_from_template(id: &str, now: DateTime<Utc>) -> Option<Badge> {
    BADGES.iter().find(|t| t.id == id).map(|t| Badge {
        id: t.id.to_string(),
        name: t.name.to_string(),
        icon: t.icon.to_string(),
        date_earned: now,
    })
}

/// The first rule for `trigger` that matches and whose badge the user does
/// not own yet. Rules are listed in evaluation order; at most one wins.
pub fn badge_candidate(user: &User, trigger: &BadgeTrigger) -> Option<&'static str> {
    let rules: Vec<(bool, &'static str)> = match trigger {
        BadgeTrigger::Review {
            is_first_review_of_term,
            detailed_review_count,
        } => vec![
            (*is_first_review_of_term, "early_bird"),
            (*detailed_review_count >= 10, "critic"),
        ],
        BadgeTrigger::Upvote { upvote_count } => vec![(*upvote_count >= 10, "helper")],
        BadgeTrigger::Login => vec![(user.streak.current >= 7, "streak_7")],
        BadgeTrigger::LevelUp => vec![(user.level >= 5, "level_5"), (user.level >= 10, "level_10")],
    };

    rules
        .into_iter()
        .find(|(matched, id)| *matched && !user.has_badge(id))
        .map(|(_, id)| id)
}

/// Evaluate the rules for `trigger` and append the winning badge, if any.
pub fn apply_badge_rules(user: &mut User, trigger: &BadgeTrigger, now: DateTime<Utc>) -> Option<Badge> {
    let badge = badge_from_template(badge_candidate(user, trigger)?, now)?;
    user.badges.push(badge.clone());
    info!(user_id = user.id, badge = %badge.id, trigger = trigger.label(), "badge awarded");
    Some(badge)
}

/// Credit `amount` (scaled by the user's tier) and re-resolve the level.
/// A level-up runs the LEVEL_UP badge rules on the updated user.
pub fn credit_xp(user: &mut User, amount: i64, now: DateTime<Utc>) -> XpAward {
    let old_level = user.level;
    let awarded_xp = adjusted_amount(amount, old_level);

    user.xp = user.xp.saturating_add(awarded_xp);
    user.level = resolve_level(user.xp);

    let leveled_up = user.level > old_level;
    let badge_awarded = if leveled_up {
        info!(user_id = user.id, from = old_level, to = user.level, "level up");
        apply_badge_rules(user, &BadgeTrigger::LevelUp, now)
    } else {
        None
    };

    XpAward {
        new_xp: user.xp,
        new_level: user.level,
        leveled_up,
        next_threshold: next_threshold(user.level),
        awarded_xp,
        badge_awarded,
    }
}

/// Streak after a login on `today`, counted in calendar days.
pub fn next_streak(current: u32, last_login: Option<NaiveDate>, today: NaiveDate) -> u32 {
    match last_login {
        None => 1,
        Some(last) => match (today - last).num_days() {
            d if d <= 0 => current.max(1),
            1 => current + 1,
            _ => 1,
        },
    }
}

/// One async mutex per user id, so each read-modify-write of a user record
/// runs alone.
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl UserLocks {
    const PRUNE_AT: usize = 1024;

    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() >= Self::PRUNE_AT {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry(user_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// XP ledger and badge engine over persisted users.
#[derive(Clone)]
pub struct GamificationEngine {
    db: Database,
    locks: UserLocks,
    config: GamificationConfig,
}

impl GamificationEngine {
    pub fn new(db: Database, config: GamificationConfig) -> Self {
        Self {
            db,
            locks: UserLocks::default(),
            config,
        }
    }

    async fn load_user(&self, user_id: i64) -> Result<User> {
        self.db
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::user_not_found(user_id))
    }

    /// Credit XP to a user and persist the result in a single save.
    ///
    /// `amount` is expected to be positive; callers validate it.
    pub async fn add_xp(&self, user_id: i64, amount: i64, reason: &str) -> Result<XpAward> {
        let _guard = self.locks.acquire(user_id).await;
        let mut user = self.load_user(user_id).await?;

        let award = credit_xp(&mut user, amount, Utc::now());
        self.db.save_user_progress(&user).await?;

        info!(
            user_id,
            reason,
            requested = amount,
            awarded = award.awarded_xp,
            xp = award.new_xp,
            level = award.new_level,
            "xp credited"
        );
        Ok(award)
    }

    /// Run the badge rules for `trigger`; saves only when a badge is awarded.
    pub async fn check_badges(&self, user_id: i64, trigger: BadgeTrigger) -> Result<Option<Badge>> {
        let _guard = self.locks.acquire(user_id).await;
        let mut user = self.load_user(user_id).await?;

        let badge = apply_badge_rules(&mut user, &trigger, Utc::now());
        if badge.is_some() {
            self.db.save_user_progress(&user).await?;
        } else {
            debug!(user_id, trigger = trigger.label(), "no badge awarded");
        }
        Ok(badge)
    }

    pub async fn record_login(&self, user_id: i64, now: DateTime<Utc>) -> Result<LoginOutcome> {
        let _guard = self.locks.acquire(user_id).await;
        let mut user = self.load_user(user_id).await?;

        let last_day = user.streak.last_login.map(|t| t.date_naive());
        let today = now.date_naive();
        let first_today = last_day != Some(today);

        user.streak.current = next_streak(user.streak.current, last_day, today);
        user.streak.last_login = Some(now);

        let mut badges_awarded = Vec::new();
        let xp = if first_today {
            let award = credit_xp(&mut user, self.config.login_xp, now);
            badges_awarded.extend(award.badge_awarded.clone());
            Some(award)
        } else {
            None
        };
        badges_awarded.extend(apply_badge_rules(&mut user, &BadgeTrigger::Login, now));

        self.db.save_user_progress(&user).await?;
        info!(
            user_id,
            reason = "DAILY_LOGIN",
            streak = user.streak.current,
            first_today,
            "login recorded"
        );

        Ok(LoginOutcome {
            streak: user.streak,
            xp,
            badges_awarded,
        })
    }

    pub async fn submit_feedback(&self, new_feedback: NewFeedback) -> Result<FeedbackOutcome> {
        let user_id = new_feedback.user_id;
        let _guard = self.locks.acquire(user_id).await;
        let mut user = self.load_user(user_id).await?;
        if self.db.get_course(new_feedback.course_id).await?.is_none() {
            return Err(CoreError::course_not_found(new_feedback.course_id));
        }

        // The review, its XP and its badges commit together.
        let mut tx = self.db.begin().await?;
        let feedback = Database::write_feedback(&mut tx, &new_feedback).await?;
        let reviews_in_term =
            Database::count_reviews_in_term(&mut tx, user_id, &feedback.term).await?;
        let detailed = Database::count_detailed_reviews(
            &mut tx,
            user_id,
            self.config.detailed_review_min_chars,
        )
        .await?;

        let now = Utc::now();
        let xp = credit_xp(&mut user, self.config.review_xp, now);
        let mut badges_awarded: Vec<Badge> = xp.badge_awarded.iter().cloned().collect();
        let trigger = BadgeTrigger::Review {
            is_first_review_of_term: reviews_in_term == 1,
            detailed_review_count: u32::try_from(detailed).unwrap_or(u32::MAX),
        };
        badges_awarded.extend(apply_badge_rules(&mut user, &trigger, now));

        Database::write_user_progress(&mut tx, &user).await?;
        tx.commit().await?;
        info!(
            user_id,
            reason = "REVIEW_SUBMITTED",
            course_id = feedback.course_id,
            feedback_id = feedback.id,
            awarded = xp.awarded_xp,
            "feedback submitted"
        );

        Ok(FeedbackOutcome {
            feedback_id: feedback.id,
            xp,
            badges_awarded,
        })
    }

    pub async fn upvote_feedback(&self, feedback_id: i64) -> Result<UpvoteOutcome> {
        let author_id = self
            .db
            .get_feedback(feedback_id)
            .await?
            .ok_or_else(|| CoreError::feedback_not_found(feedback_id))?
            .user_id;

        // Lock before opening the transaction; the pool may hold one connection.
        let _guard = self.locks.acquire(author_id).await;
        let mut tx = self.db.begin().await?;
        let upvotes = Database::increment_upvotes(&mut tx, feedback_id)
            .await?
            .ok_or_else(|| CoreError::feedback_not_found(feedback_id))?
            .upvotes;
        let mut author = Database::fetch_user(&mut tx, author_id)
            .await?
            .ok_or_else(|| CoreError::user_not_found(author_id))?;

        let now = Utc::now();
        let xp = credit_xp(&mut author, self.config.upvote_xp, now);
        let mut badges_awarded: Vec<Badge> = xp.badge_awarded.iter().cloned().collect();
        badges_awarded.extend(apply_badge_rules(
            &mut author,
            &BadgeTrigger::Upvote {
                upvote_count: upvotes,
            },
            now,
        ));

        Database::write_user_progress(&mut tx, &author).await?;
        tx.commit().await?;
        info!(
            user_id = author_id,
            reason = "UPVOTE_RECEIVED",
            feedback_id,
            upvotes,
            awarded = xp.awarded_xp,
            "upvote credited"
        );

        Ok(UpvoteOutcome {
            feedback_id,
            author_id,
            upvotes,
            xp,
            badges_awarded,
        })
    }
}
