//! Per-user badge notification queues.
//!
//! Each user owns an ordered, value-deduplicated FIFO of pending badge ids
//! plus the reward state machine for the current week. A single-flight claim
//! guards processing: `claim` hands out the front entry at most once until
//! `finish` releases it, and `finish` always drops the front entry whether or
//! not processing succeeded (failed entries are not retried).
//!
//! In-memory only (the registry shape follows the in-memory login limiter):
//! a restart resets every session to Idle and the next evaluation rebuilds it
//! from the store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::services::streak::RewardState;

#[derive(Debug)]
struct RewardSession {
    state: RewardState,
    queue: VecDeque<String>,
    processing: bool,
    /// Set once a weekly award was granted or found this session; suppresses
    /// re-enqueueing within the process lifetime.
    rewarded: bool,
    /// Monday of the window this session belongs to. A session left over from
    /// an earlier week (stale AwaitingSelection, queued sentinel) is rebuilt
    /// on the next entry-point call.
    week_start: Option<NaiveDate>,
}

impl Default for RewardSession {
    fn default() -> Self {
        Self {
            state: RewardState::Idle,
            queue: VecDeque::new(),
            processing: false,
            rewarded: false,
            week_start: None,
        }
    }
}

/// Snapshot of one user's queue, serialized for the display layer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueView {
    pub state: RewardState,
    pub pending: Vec<String>,
    pub processing: bool,
    pub rewarded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Front entry handed to the caller; the queue is locked until `finish`.
    Claimed,
    /// Another cycle is in flight; the caller must not start a second one.
    Busy,
    Empty,
}

#[derive(Clone, Default)]
pub struct NotifyRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, RewardSession>>>,
}

impl NotifyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the session to a week window. Entering a different week than the
    /// session was built for resets it wholesale; the FSM has no edge out of
    /// `AwaitingSelection` except through selection, so an abandoned flow
    /// would otherwise leak into the new week.
    pub async fn begin_week(&self, user_id: Uuid, week_start: NaiveDate) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id).or_default();
        match session.week_start {
            Some(current) if current == week_start => {}
            Some(current) => {
                tracing::debug!(
                    user_id = %user_id,
                    from = %current,
                    to = %week_start,
                    "new week window, resetting reward session"
                );
                *session = RewardSession {
                    week_start: Some(week_start),
                    ..RewardSession::default()
                };
            }
            None => session.week_start = Some(week_start),
        }
    }

    /// Append a badge id unless it is already queued. Returns whether the id
    /// was actually added.
    pub async fn enqueue(&self, user_id: Uuid, badge_id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id).or_default();
        if session.queue.iter().any(|id| id == badge_id) {
            tracing::debug!(user_id = %user_id, badge_id, "badge already queued, skipping");
            return false;
        }
        session.queue.push_back(badge_id.to_string());
        true
    }

    /// Claim the front entry for processing without removing it.
    pub async fn claim(&self, user_id: Uuid) -> (ClaimOutcome, Option<String>) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id).or_default();
        if session.processing {
            return (ClaimOutcome::Busy, None);
        }
        match session.queue.front() {
            Some(front) => {
                session.processing = true;
                (ClaimOutcome::Claimed, Some(front.clone()))
            }
            None => (ClaimOutcome::Empty, None),
        }
    }

    /// Drop the front entry and release the claim. Called after every
    /// processing attempt, successful or not.
    pub async fn finish(&self, user_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&user_id) {
            session.queue.pop_front();
            session.processing = false;
        }
    }

    /// Apply a state transition, ignoring (and logging) undefined ones.
    pub async fn transition(&self, user_id: Uuid, to: RewardState) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id).or_default();
        if session.state == to {
            return;
        }
        if session.state.can_transition(to) {
            session.state = to;
        } else {
            tracing::warn!(
                user_id = %user_id,
                from = ?session.state,
                to = ?to,
                "undefined reward state transition ignored"
            );
        }
    }

    pub async fn mark_rewarded(&self, user_id: Uuid) {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(user_id).or_default().rewarded = true;
    }

    pub async fn is_rewarded(&self, user_id: Uuid) -> bool {
        let sessions = self.sessions.lock().await;
        sessions.get(&user_id).map(|s| s.rewarded).unwrap_or(false)
    }

    pub async fn view(&self, user_id: Uuid) -> QueueView {
        let sessions = self.sessions.lock().await;
        match sessions.get(&user_id) {
            Some(s) => QueueView {
                state: s.state,
                pending: s.queue.iter().cloned().collect(),
                processing: s.processing,
                rewarded: s.rewarded,
            },
            None => QueueView {
                state: RewardState::Idle,
                pending: Vec::new(),
                processing: false,
                rewarded: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> Uuid {
        Uuid::new_v4()
    }

    #[tokio::test]
    async fn enqueue_deduplicates_by_value() {
        let registry = NotifyRegistry::new();
        let u = user();
        assert!(registry.enqueue(u, "a").await);
        assert!(registry.enqueue(u, "b").await);
        assert!(!registry.enqueue(u, "a").await);
        assert!(registry.enqueue(u, "c").await);

        let view = registry.view(u).await;
        assert_eq!(view.pending, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn processing_is_fifo_and_single_flight() {
        let registry = NotifyRegistry::new();
        let u = user();
        registry.enqueue(u, "a").await;
        registry.enqueue(u, "b").await;

        let (outcome, entry) = registry.claim(u).await;
        assert_eq!(outcome, ClaimOutcome::Claimed);
        assert_eq!(entry.as_deref(), Some("a"));

        // A second claim while in flight must not start another cycle.
        let (outcome, entry) = registry.claim(u).await;
        assert_eq!(outcome, ClaimOutcome::Busy);
        assert!(entry.is_none());

        registry.finish(u).await;
        let (outcome, entry) = registry.claim(u).await;
        assert_eq!(outcome, ClaimOutcome::Claimed);
        assert_eq!(entry.as_deref(), Some("b"));

        registry.finish(u).await;
        let (outcome, _) = registry.claim(u).await;
        assert_eq!(outcome, ClaimOutcome::Empty);
    }

    #[tokio::test]
    async fn finish_drops_the_entry_even_after_failure() {
        // The caller treats processing errors as logged-and-dropped; from the
        // queue's perspective finish is unconditional.
        let registry = NotifyRegistry::new();
        let u = user();
        registry.enqueue(u, "broken").await;
        registry.enqueue(u, "next").await;

        let (_, entry) = registry.claim(u).await;
        assert_eq!(entry.as_deref(), Some("broken"));
        registry.finish(u).await;

        assert_eq!(registry.view(u).await.pending, vec!["next"]);
        assert!(!registry.view(u).await.processing);
    }

    #[tokio::test]
    async fn queues_are_per_user() {
        let registry = NotifyRegistry::new();
        let (u1, u2) = (user(), user());
        registry.enqueue(u1, "a").await;

        let (outcome, _) = registry.claim(u1).await;
        assert_eq!(outcome, ClaimOutcome::Claimed);

        // Another user's queue is unaffected by u1's in-flight cycle.
        registry.enqueue(u2, "a").await;
        let (outcome, entry) = registry.claim(u2).await;
        assert_eq!(outcome, ClaimOutcome::Claimed);
        assert_eq!(entry.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn a_new_week_resets_a_stale_session() {
        let registry = NotifyRegistry::new();
        let u = user();
        let monday = chrono::NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();

        registry.begin_week(u, monday).await;
        registry.transition(u, RewardState::Evaluating).await;
        registry.enqueue(u, "weekly_streak_1").await;
        registry.transition(u, RewardState::AwaitingSelection).await;
        registry.mark_rewarded(u).await;

        // Same week: the in-flight selection survives.
        registry.begin_week(u, monday).await;
        let view = registry.view(u).await;
        assert_eq!(view.state, RewardState::AwaitingSelection);
        assert_eq!(view.pending, vec!["weekly_streak_1"]);
        assert!(view.rewarded);

        // Next week: the abandoned selection, queue and rewarded flag are
        // all gone.
        registry.begin_week(u, monday + chrono::Duration::days(7)).await;
        let view = registry.view(u).await;
        assert_eq!(view.state, RewardState::Idle);
        assert!(view.pending.is_empty());
        assert!(!view.rewarded);
    }

    #[tokio::test]
    async fn undefined_transitions_are_ignored() {
        let registry = NotifyRegistry::new();
        let u = user();
        registry.transition(u, RewardState::Evaluating).await;
        assert_eq!(registry.view(u).await.state, RewardState::Evaluating);

        // Evaluating -> Persisting is not a defined edge.
        registry.transition(u, RewardState::Persisting).await;
        assert_eq!(registry.view(u).await.state, RewardState::Evaluating);

        registry.transition(u, RewardState::AwaitingSelection).await;
        registry.transition(u, RewardState::Persisting).await;
        registry.transition(u, RewardState::Done).await;
        assert_eq!(registry.view(u).await.state, RewardState::Done);
    }
}
