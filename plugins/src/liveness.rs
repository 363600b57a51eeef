//! Process liveness for claim owners, via sysinfo.

use codex_worker_core::state::{Liveness, LivenessProbe, OwnerToken};
use sysinfo::{Pid, System};

/// Checks owners on this host by pid and process start time. Owners on
/// other hosts are [`Liveness::Unknown`], so only claim age applies to them.
pub struct SysinfoLivenessProbe {
    host: String,
}

impl SysinfoLivenessProbe {
    pub fn new() -> Self {
        Self {
            host: System::host_name().unwrap_or_else(|| "localhost".to_string()),
        }
    }
}

impl Default for SysinfoLivenessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for SysinfoLivenessProbe {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn check(&self, owner: &OwnerToken) -> Liveness {
        if owner.host != self.host {
            return Liveness::Unknown;
        }
        let pid = Pid::from_u32(owner.pid);
        let mut sys = System::new();
        if !sys.refresh_process(pid) {
            return Liveness::Dead;
        }
        let Some(process) = sys.process(pid) else {
            return Liveness::Dead;
        };
        match owner.process_started {
            // Same pid, different process: the owner is gone.
            Some(started) if started != process.start_time() => Liveness::Dead,
            _ => Liveness::Alive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> OwnerToken {
        OwnerToken::current()
    }

    #[test]
    fn current_process_is_alive() {
        let probe = SysinfoLivenessProbe::new();
        assert_eq!(probe.check(&me()), Liveness::Alive);
    }

    #[test]
    fn reused_pid_is_dead() {
        let probe = SysinfoLivenessProbe::new();
        let mut other = me();
        if let Some(started) = other.process_started {
            other.process_started = Some(started + 1000);
            assert_eq!(probe.check(&other), Liveness::Dead);
        }
    }

    #[test]
    fn foreign_host_is_unknown() {
        let probe = SysinfoLivenessProbe::new();
        let mut other = me();
        other.host = "some-other-host.invalid".into();
        assert_eq!(probe.check(&other), Liveness::Unknown);
    }

    #[test]
    fn missing_process_is_dead() {
        let probe = SysinfoLivenessProbe::new();
        let mut other = me();
        other.pid = u32::MAX - 7;
        other.process_started = None;
        assert_eq!(probe.check(&other), Liveness::Dead);
    }
}
