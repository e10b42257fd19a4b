//! Worker supervision: restart policy and per-slot state machine.
//!
//! A slot cycles `Spawning -> Idle -> Busy -> (Idle | Exited)`. Each exit counts
//! as a consecutive failure; a successful parse counts one failure back down.
//! Respawns back off exponentially, and once a slot reaches the failure limit
//! it stays down for good.

use std::time::Duration;

/// Capped exponential backoff with a consecutive-failure circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_consecutive_failures: 6,
        }
    }
}

impl RestartPolicy {
    /// Delay before respawning after `failures` consecutive failures, or
    /// `None` once the limit is reached.
    pub fn decide(&self, failures: u32) -> Option<Duration> {
        if failures >= self.max_consecutive_failures {
            return None;
        }
        let exponent = failures.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        Some(delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Spawning,
    Idle,
    Busy,
    Exited,
}

/// What the pool should do after a worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Respawn(Duration),
    /// The slot is permanently degraded
    GiveUp,
}

/// State and failure accounting for one worker slot.
#[derive(Debug, Clone)]
pub struct SlotSupervisor {
    policy: RestartPolicy,
    state: WorkerState,
    consecutive_failures: u32,
    degraded: bool,
    spawn_attempts: u64,
}

impl SlotSupervisor {
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            state: WorkerState::Spawning,
            consecutive_failures: 0,
            degraded: false,
            spawn_attempts: 0,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn spawn_attempts(&self) -> u64 {
        self.spawn_attempts
    }

    /// Live means spawned and not exited.
    pub fn is_live(&self) -> bool {
        matches!(self.state, WorkerState::Idle | WorkerState::Busy)
    }

    pub fn on_spawn_attempt(&mut self) {
        self.spawn_attempts += 1;
        self.state = WorkerState::Spawning;
    }

    pub fn on_spawned(&mut self) {
        self.state = WorkerState::Idle;
    }

    pub fn on_dispatch(&mut self) {
        self.state = WorkerState::Busy;
    }

    /// The worker answered a job; nudges the failure counter down.
    pub fn on_success(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_sub(1);
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Idle;
        }
    }

    /// The worker is gone (crash, or failed spawn).
    pub fn on_exit(&mut self) -> ExitDecision {
        self.state = WorkerState::Exited;
        self.consecutive_failures += 1;
        match self.policy.decide(self.consecutive_failures) {
            Some(delay) if !self.degraded => ExitDecision::Respawn(delay),
            _ => {
                self.degraded = true;
                ExitDecision::GiveUp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RestartPolicy {
        RestartPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            max_consecutive_failures: 6,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.decide(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.decide(2), Some(Duration::from_millis(20)));
        assert_eq!(policy.decide(3), Some(Duration::from_millis(40)));
        assert_eq!(policy.decide(4), Some(Duration::from_millis(50)));
        assert_eq!(policy.decide(6), None);
    }

    #[test]
    fn test_sixth_failure_trips_the_breaker() {
        let mut slot = SlotSupervisor::new(policy());
        for _ in 0..5 {
            assert!(matches!(slot.on_exit(), ExitDecision::Respawn(_)));
        }
        assert_eq!(slot.on_exit(), ExitDecision::GiveUp);
        assert!(slot.is_degraded());
        assert_eq!(slot.on_exit(), ExitDecision::GiveUp);
    }

    #[test]
    fn test_success_nudges_failures_down() {
        let mut slot = SlotSupervisor::new(policy());
        slot.on_exit();
        slot.on_exit();
        slot.on_spawned();
        slot.on_dispatch();
        assert_eq!(slot.state(), WorkerState::Busy);
        slot.on_success();
        assert_eq!(slot.consecutive_failures(), 1);
        assert_eq!(slot.state(), WorkerState::Idle);
        slot.on_success();
        slot.on_success();
        assert_eq!(slot.consecutive_failures(), 0);
    }

    #[test]
    fn test_state_transitions() {
        let mut slot = SlotSupervisor::new(policy());
        assert_eq!(slot.state(), WorkerState::Spawning);
        assert!(!slot.is_live());
        slot.on_spawn_attempt();
        slot.on_spawned();
        assert!(slot.is_live());
        slot.on_exit();
        assert_eq!(slot.state(), WorkerState::Exited);
        assert_eq!(slot.spawn_attempts(), 1);
    }
}
