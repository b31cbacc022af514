//! Bounded-attempt recovery policy.
//!
//! Every self-healing action in the supervisor runs through this policy. It
//! balances two failure modes of unattended recovery: thrashing (re-running a
//! futile action every cycle) and silent failure (giving up forever). After
//! `max_attempts` consecutive failures the action is skipped; once the
//! counter passes `reset_threshold` it returns to zero, so a long-wedged
//! subsystem eventually gets a fresh escalation window instead of being
//! ignored for the rest of the process lifetime.

use std::future::Future;

use dashmap::DashMap;

use crate::constants::{MAX_RECOVERY_ATTEMPTS, RECOVERY_RESET_THRESHOLD};
use crate::error::PerchError;

/// Result of one pass through the recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The recovery action ran and reported success; the counter is reset.
    Recovered,
    /// The recovery action ran and failed; the counter keeps climbing.
    AttemptFailed,
    /// Too many consecutive failures; the action was skipped this cycle.
    Escalated,
}

/// Per-subsystem escalation state.
///
/// Counters are created lazily on first failure and live for the process
/// lifetime; nothing is persisted across restarts. This is an in-memory
/// escalation guard, not an SLA tracker.
pub struct RecoveryPolicy {
    counters: DashMap<String, u32>,
    max_attempts: u32,
    reset_threshold: u32,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(MAX_RECOVERY_ATTEMPTS, RECOVERY_RESET_THRESHOLD)
    }
}

impl RecoveryPolicy {
    /// Creates a policy with explicit bounds.
    ///
    /// `reset_threshold` must be greater than `max_attempts`; config
    /// validation enforces this before the policy is built.
    pub fn new(max_attempts: u32, reset_threshold: u32) -> Self {
        Self {
            counters: DashMap::new(),
            max_attempts,
            reset_threshold,
        }
    }

    /// Returns the current consecutive-failure count for a subsystem.
    pub fn attempts(&self, subsystem: &str) -> u32 {
        self.counters.get(subsystem).map(|c| *c).unwrap_or(0)
    }

    /// Records a failure for `subsystem` and runs `action` if the escalation
    /// bound allows it.
    ///
    /// The action must report its real outcome: the counter only resets on
    /// `Ok`, so a recovery that silently failed keeps escalating instead of
    /// masking the fault as resolved.
    pub async fn attempt_recovery<F, Fut>(&self, subsystem: &str, action: F) -> RecoveryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), PerchError>>,
    {
        let attempts = {
            let mut counter = self.counters.entry(subsystem.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        if attempts > self.max_attempts {
            if attempts > self.reset_threshold {
                // Fresh escalation window: the next failure starts at 1.
                self.counters.insert(subsystem.to_string(), 0);
                log::warn!(
                    "[Recovery] {} failed {} consecutive times; resetting escalation window",
                    subsystem,
                    attempts
                );
            } else {
                log::error!(
                    "[Recovery] {} recovery exhausted ({} consecutive failures), skipping action",
                    subsystem,
                    attempts
                );
            }
            return RecoveryOutcome::Escalated;
        }

        log::info!(
            "[Recovery] Attempting recovery for {} (attempt {}/{})",
            subsystem,
            attempts,
            self.max_attempts
        );

        match action().await {
            Ok(()) => {
                self.counters.insert(subsystem.to_string(), 0);
                log::info!("[Recovery] {} recovered", subsystem);
                RecoveryOutcome::Recovered
            }
            Err(e) => {
                log::error!("[Recovery] {} recovery attempt failed: {}", subsystem, e);
                RecoveryOutcome::AttemptFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn escalation_bound_limits_action_runs() {
        let policy = RecoveryPolicy::new(3, 10);
        let runs = AtomicU32::new(0);

        // 11 consecutive failures: the action runs on attempts 1-3 only,
        // and the 11th crossing the reset threshold clears the counter.
        for attempt in 1..=11u32 {
            let outcome = policy
                .attempt_recovery("network", || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err(PerchError::Recovery("still down".into()))
                })
                .await;

            match attempt {
                1..=3 => assert_eq!(outcome, RecoveryOutcome::AttemptFailed),
                _ => assert_eq!(outcome, RecoveryOutcome::Escalated),
            }
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(policy.attempts("network"), 0);

        // Next failure opens a fresh window and the action runs again.
        let outcome = policy
            .attempt_recovery("network", || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(PerchError::Recovery("still down".into()))
            })
            .await;
        assert_eq!(outcome, RecoveryOutcome::AttemptFailed);
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert_eq!(policy.attempts("network"), 1);
    }

    #[tokio::test]
    async fn successful_recovery_resets_counter() {
        let policy = RecoveryPolicy::new(3, 10);

        let outcome = policy
            .attempt_recovery("audio", || async { Err(PerchError::Recovery("dead".into())) })
            .await;
        assert_eq!(outcome, RecoveryOutcome::AttemptFailed);
        assert_eq!(policy.attempts("audio"), 1);

        let outcome = policy
            .attempt_recovery("audio", || async { Ok(()) })
            .await;
        assert_eq!(outcome, RecoveryOutcome::Recovered);
        assert_eq!(policy.attempts("audio"), 0);
    }

    #[tokio::test]
    async fn subsystems_escalate_independently() {
        let policy = RecoveryPolicy::new(3, 10);

        for _ in 0..5 {
            policy
                .attempt_recovery("network", || async {
                    Err(PerchError::Recovery("down".into()))
                })
                .await;
        }
        assert_eq!(policy.attempts("network"), 5);
        assert_eq!(policy.attempts("spotify"), 0);

        let outcome = policy
            .attempt_recovery("spotify", || async { Ok(()) })
            .await;
        assert_eq!(outcome, RecoveryOutcome::Recovered);
    }
}
