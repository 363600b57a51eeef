//! Safety mode, approval policy, and the confirmation gate for unrestricted runs.

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// What the agent is allowed to touch. Passed through to the agent; the
/// worker does not enforce it itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    #[default]
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, SandboxMode::DangerFullAccess)
    }
}

impl std::str::FromStr for SandboxMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(SandboxMode::ReadOnly),
            "workspace-write" => Ok(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxMode::DangerFullAccess),
            other => Err(WorkerError::Config(format!("unknown sandbox mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    Untrusted,
    OnFailure,
    #[default]
    OnRequest,
    Never,
}

impl ApprovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalPolicy::Untrusted => "untrusted",
            ApprovalPolicy::OnFailure => "on-failure",
            ApprovalPolicy::OnRequest => "on-request",
            ApprovalPolicy::Never => "never",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Codex,
    Gemini,
    /// Any binary, configured with `agent.custom_cmd` and `agent.custom_args`.
    Custom,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Codex => "codex",
            Engine::Gemini => "gemini",
            Engine::Custom => "custom",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Engine::Codex => "o4-mini",
            Engine::Gemini => "gemini-2.5-pro",
            Engine::Custom => "default",
        }
    }
}

/// Proof that the caller acknowledged the selected mode. Only obtainable
/// through [`ModeGate::new`], so an unrestricted executor cannot exist
/// without an explicit acknowledgment.
#[derive(Debug, Clone, Copy)]
pub struct ModeGate {
    mode: SandboxMode,
}

impl ModeGate {
    pub fn new(mode: SandboxMode, acknowledged: bool) -> Result<Self, WorkerError> {
        if mode.is_unrestricted() && !acknowledged {
            return Err(WorkerError::Config(
                "danger-full-access lets the agent modify anything on this machine; \
                 confirm with --yes to run in this mode"
                    .to_string(),
            ));
        }
        Ok(Self { mode })
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_mode_needs_acknowledgment() {
        assert!(ModeGate::new(SandboxMode::DangerFullAccess, false).is_err());
        assert!(ModeGate::new(SandboxMode::DangerFullAccess, true).is_ok());
        assert!(ModeGate::new(SandboxMode::ReadOnly, false).is_ok());
    }

    #[test]
    fn modes_parse_from_cli_spelling() {
        assert_eq!(
            "workspace-write".parse::<SandboxMode>().unwrap(),
            SandboxMode::WorkspaceWrite
        );
        assert!("yolo".parse::<SandboxMode>().is_err());

        #[derive(Deserialize)]
        struct Wrap {
            mode: SandboxMode,
        }
        let parsed: Wrap = toml::from_str("mode = \"danger-full-access\"").unwrap();
        assert_eq!(parsed.mode, SandboxMode::DangerFullAccess);
    }
}
