//! Stale claim detection and revocation.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::WorkerError;

use super::discovery::Inventory;
use super::record::{ClaimRecord, OwnerToken};
use super::store::{RevokeOutcome, StateStore};
use super::types::{Task, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    /// Cannot tell, for example because the owner runs on another host.
    Unknown,
}

/// Best-effort check whether the process behind a claim still runs.
pub trait LivenessProbe: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, owner: &OwnerToken) -> Liveness;
}

/// Knows nothing about processes; staleness falls back to claim age.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeOnlyProbe;

impl LivenessProbe for AgeOnlyProbe {
    fn name(&self) -> &str {
        "age-only"
    }

    fn check(&self, _owner: &OwnerToken) -> Liveness {
        Liveness::Unknown
    }
}

/// What one sweep did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub revoked: usize,
    pub orphan_locks: usize,
    pub leftovers: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct LockSupervisor {
    probe: Arc<dyn LivenessProbe>,
    max_age: Duration,
    /// Claims of this session are never considered stale.
    own_session: Option<Uuid>,
}

impl LockSupervisor {
    pub fn new(probe: Arc<dyn LivenessProbe>, max_age: Duration) -> Self {
        Self {
            probe,
            max_age,
            own_session: None,
        }
    }

    pub fn with_own_session(mut self, session: Uuid) -> Self {
        self.own_session = Some(session);
        self
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// A claim is stale when it is older than the max age, or when its
    /// owner is known to be dead. Unknown liveness means age alone decides.
    pub fn is_stale(&self, task: &Task) -> bool {
        if task.state != TaskState::Claimed {
            return false;
        }
        let Some(claim) = &task.claim else {
            return false;
        };
        self.claim_is_stale(claim.owner.as_ref(), claim.claimed_at)
    }

    fn claim_is_stale(&self, owner: Option<&ClaimRecord>, since: SystemTime) -> bool {
        if let (Some(record), Some(own)) = (owner, self.own_session) {
            if record.owner.session == own {
                return false;
            }
        }
        if age(since) > self.max_age {
            return true;
        }
        owner.is_some_and(|r| self.probe.check(&r.owner) == Liveness::Dead)
    }

    /// Claimed tasks a sweep would revoke right now.
    pub fn stale_claims<'a>(&self, inventory: &'a Inventory) -> Vec<&'a Task> {
        inventory.tasks.iter().filter(|t| self.is_stale(t)).collect()
    }

    /// Revokes stale claims back to Pending and clears dead artifacts.
    pub fn sweep(
        &self,
        store: &StateStore,
        inventory: &Inventory,
    ) -> Result<SweepReport, WorkerError> {
        let mut report = SweepReport::default();

        for task in self.stale_claims(inventory) {
            let owner = task.claim.as_ref().and_then(|c| c.owner.as_ref());
            match store.revoke_stale(&task.base, owner)? {
                RevokeOutcome::Revoked => report.revoked += 1,
                RevokeOutcome::Blocked => {
                    tracing::warn!(base = %task.base, "stale claim left in place: pending entry exists")
                }
                other => tracing::debug!(base = %task.base, ?other, "stale claim not revoked"),
            }
        }

        // A claim entry shadowed by a finished record is commit residue.
        for shadow in &inventory.shadowed {
            if shadow.state != TaskState::Claimed {
                continue;
            }
            let lock = inventory.orphan_locks.iter().find(|l| l.base == shadow.base);
            let owner = lock.and_then(|l| l.owner.as_ref());
            if self.claim_is_stale(owner, shadow.modified)
                && store.revoke_stale(&shadow.base, owner)? == RevokeOutcome::Revoked
            {
                report.revoked += 1;
            }
        }

        for lock in &inventory.orphan_locks {
            if inventory.shadowed.iter().any(|s| s.base == lock.base) {
                continue;
            }
            if self.claim_is_stale(lock.owner.as_ref(), lock.modified)
                && store.clear_orphan_lock(&lock.base, lock.owner.as_ref())?
            {
                report.orphan_locks += 1;
            }
        }

        for leftover in &inventory.leftovers {
            if age(leftover.modified) > self.max_age && store.remove_artifact(&leftover.path) {
                report.leftovers += 1;
            }
        }

        if !report.is_empty() {
            tracing::info!(
                revoked = report.revoked,
                orphan_locks = report.orphan_locks,
                leftovers = report.leftovers,
                probe = self.probe.name(),
                "sweep finished"
            );
        }
        Ok(report)
    }
}

fn age(since: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(since)
        .unwrap_or(Duration::ZERO)
}
