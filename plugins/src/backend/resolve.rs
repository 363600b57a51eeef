use std::path::Path;

/// Resolves a bare command name against `PATH`. Anything else, and names
/// that are not found, come back unchanged so the spawn reports the error.
pub fn resolve_executable_path(cmd: &str) -> String {
    let path = Path::new(cmd);
    if path.is_absolute() || cmd.contains(std::path::MAIN_SEPARATOR) || cmd.contains('/') {
        return cmd.to_string();
    }
    match find_in_system_path(cmd) {
        Some(found) => {
            tracing::debug!(cmd, path = %found, "resolved agent binary");
            found
        }
        None => {
            tracing::debug!(cmd, "agent binary not found in PATH");
            cmd.to_string()
        }
    }
}

fn find_in_system_path(cmd: &str) -> Option<String> {
    let path_env = std::env::var_os("PATH")?;

    for dir in std::env::split_paths(&path_env) {
        #[cfg(target_os = "windows")]
        {
            let candidate = dir.join(format!("{cmd}.exe"));
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().to_string());
            }
        }

        #[cfg(not(target_os = "windows"))]
        {
            let candidate = dir.join(cmd);
            if candidate.is_file() && is_executable(&candidate) {
                return Some(candidate.to_string_lossy().to_string());
            }
        }
    }

    None
}

#[cfg(not(target_os = "windows"))]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn paths_pass_through() {
        assert_eq!(resolve_executable_path("./bin/codex"), "./bin/codex");
        assert_eq!(resolve_executable_path("/opt/codex"), "/opt/codex");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(
            resolve_executable_path("no-such-agent-binary-xyz"),
            "no-such-agent-binary-xyz"
        );
    }

    #[test]
    fn finds_sh_on_path() {
        assert!(resolve_executable_path("sh").ends_with("/sh"));
    }
}
