//! Individual preflight checks.
//!
//! Each function yields one (or a few) [`PreflightCheck`] values and is
//! careful to degrade probe failures into check results instead of
//! propagating them.

use super::{CheckStatus, PreflightCheck, MIN_BASH_VERSION, PINNED_SIGNATURE_VERSION};
use crate::probe::{CommandRunner, ProbeSpec};
use std::path::Path;
use std::time::Duration;
use tracing::trace;

/// Timeout for the short probes issued here (tool lookup, version query).
const QUICK_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn quick(command: &str, args: &[&str]) -> ProbeSpec {
    ProbeSpec::new(command, args).with_timeout(QUICK_PROBE_TIMEOUT)
}

/// Detect the macOS product version, if any.
pub fn detect_macos_version(runner: &dyn CommandRunner) -> Option<String> {
    match runner.run(&quick("sw_vers", &["-productVersion"])) {
        Ok(output) if output.success() => {
            let version = output.stdout_str();
            if version.is_empty() {
                None
            } else {
                Some(version)
            }
        }
        _ => None,
    }
}

/// Script interpreter availability and version.
///
/// The orchestrator itself is a compiled binary; the runtime it depends on
/// at execution time is the shell that runs the hardening scripts.
pub fn check_runtime_interpreter(runner: &dyn CommandRunner) -> PreflightCheck {
    const NAME: &str = "runtime_version";

    let output = match runner.run(&quick("bash", &["--version"])) {
        Ok(output) if output.exit_code.is_some() => output,
        Ok(_) | Err(_) => {
            return PreflightCheck::fail(NAME, "bash not found in PATH", true);
        }
    };

    match parse_leading_version(&output.combined_str()) {
        Some(version) => {
            let tuple = version_tuple(&version);
            if tuple >= vec![MIN_BASH_VERSION.0, MIN_BASH_VERSION.1] {
                PreflightCheck::pass(NAME, format!("bash {}", version), true)
            } else {
                PreflightCheck::fail(
                    NAME,
                    format!(
                        "bash {} < {}.{}",
                        version, MIN_BASH_VERSION.0, MIN_BASH_VERSION.1
                    ),
                    true,
                )
            }
        }
        None => PreflightCheck::warn(NAME, "bash present but version not recognized"),
    }
}

/// Target OS family detection.
///
/// Non-macOS hosts stay usable for baseline generation, so an unexpected
/// OS family is a warning, not a block.
pub fn check_os_target(detected_version: Option<&str>) -> PreflightCheck {
    const NAME: &str = "os_target";

    if cfg!(target_os = "macos") {
        PreflightCheck::pass(
            NAME,
            format!("macOS detected ({})", detected_version.unwrap_or("unknown")),
            true,
        )
    } else {
        PreflightCheck::warn(
            NAME,
            format!("Non-macOS environment detected ({})", std::env::consts::OS),
        )
    }
}

/// Presence of one external tool on the search path.
pub fn check_tool(runner: &dyn CommandRunner, tool: &str, required: bool) -> PreflightCheck {
    let name = format!("tool_{}", tool);

    match runner.run(&quick("which", &[tool])) {
        Ok(output) if output.success() => {
            let path = output.stdout_str();
            PreflightCheck::pass(&name, format!("{} found at {}", tool, path), required)
        }
        _ => {
            let message = format!("{} not found in PATH", tool);
            if required {
                PreflightCheck::fail(&name, message, true)
            } else {
                PreflightCheck::warn(&name, message)
            }
        }
    }
}

/// Privilege check: root, or sudo without a prompt.
pub fn check_sudo_or_root(
    runner: &dyn CommandRunner,
    require_sudo: bool,
    is_root: bool,
) -> PreflightCheck {
    const NAME: &str = "sudo_or_root";

    if !require_sudo {
        return PreflightCheck::pass(NAME, "Not required for this operation", false);
    }

    if is_root {
        return PreflightCheck::pass(NAME, "Running as root", true);
    }

    let sudo_ok = runner
        .run(&quick("sudo", &["-n", "true"]))
        .map(|o| o.success())
        .unwrap_or(false);
    if sudo_ok {
        return PreflightCheck::pass(NAME, "sudo available without prompt", true);
    }

    PreflightCheck::fail(
        NAME,
        "No root privileges and non-interactive sudo unavailable",
        true,
    )
}

/// Readable configuration file at a known candidate path.
pub fn check_config_file(root_dir: &Path) -> PreflightCheck {
    const NAME: &str = "config_file";

    for candidate in bw_config::resolve::LOCAL_CANDIDATES {
        let path = root_dir.join(candidate);
        if readable_file(&path) {
            return PreflightCheck::pass(
                NAME,
                format!("Readable config found: {}", path.display()),
                false,
            );
        }
    }
    PreflightCheck::warn(NAME, "No readable config file found (using defaults)")
}

/// At least one rule document under the known rule directories.
pub fn check_rule_dirs(root_dir: &Path, require_rules: bool) -> PreflightCheck {
    const NAME: &str = "rule_files";

    let rules_dir = root_dir.join("rules");
    let custom_rules_dir = root_dir.join("custom").join("rules");

    let found =
        dir_contains_yaml(&rules_dir) || dir_contains_yaml(&custom_rules_dir);
    if found {
        return PreflightCheck::pass(NAME, "Rule YAML files detected", require_rules);
    }

    let message = format!(
        "No rule YAML files under {} or {}",
        rules_dir.display(),
        custom_rules_dir.display()
    );
    if require_rules {
        PreflightCheck::fail(NAME, message, true)
    } else {
        PreflightCheck::warn(NAME, message)
    }
}

/// Optional version-specific profile pack.
pub fn check_profile_pack(root_dir: &Path) -> PreflightCheck {
    const NAME: &str = "profile_pack";

    let file = format!(
        "macos_{}.yaml",
        PINNED_SIGNATURE_VERSION.replace('.', "_")
    );
    let path = root_dir.join("config").join("profiles").join(file);
    if readable_file(&path) {
        PreflightCheck::pass(NAME, format!("Profile present: {}", path.display()), false)
    } else {
        PreflightCheck::warn(
            NAME,
            format!("macOS {} profile pack not found", PINNED_SIGNATURE_VERSION),
        )
    }
}

/// Diagnostic output signature checks, pinned to one OS version.
///
/// Guards against OS upgrades silently changing the output formats that
/// downstream hardening logic parses. Only meaningful when the detected
/// version matches the pin; on other versions a single informational
/// check records that the signatures were skipped.
pub fn check_version_signatures(
    runner: &dyn CommandRunner,
    detected_version: Option<&str>,
) -> Vec<PreflightCheck> {
    let mut checks = Vec::new();
    let Some(version) = detected_version else {
        return checks;
    };

    if !version.starts_with(PINNED_SIGNATURE_VERSION) {
        checks.push(PreflightCheck::warn(
            "signature_mode",
            format!(
                "{}-specific checks skipped on {}",
                PINNED_SIGNATURE_VERSION, version
            ),
        ));
        return checks;
    }

    let firewall = runner.run(&quick(
        "/usr/libexec/ApplicationFirewall/socketfilterfw",
        &["--getglobalstate"],
    ));
    checks.push(match firewall {
        Ok(output) if output.success() && has_firewall_signature(&output.combined_str()) => {
            PreflightCheck::pass(
                "signature_firewall",
                "Firewall status output signature looks compatible",
                false,
            )
        }
        Ok(output) => PreflightCheck::warn(
            "signature_firewall",
            format!("Unexpected firewall status output: {}", output.combined_str()),
        ),
        Err(e) => PreflightCheck::warn(
            "signature_firewall",
            format!("Firewall status query failed: {}", e),
        ),
    });

    let gatekeeper = runner.run(&quick("spctl", &["--status"]));
    checks.push(match gatekeeper {
        Ok(output) if output.success() && has_gatekeeper_signature(&output.combined_str()) => {
            PreflightCheck::pass(
                "signature_gatekeeper",
                "Gatekeeper output signature looks compatible",
                false,
            )
        }
        Ok(output) => PreflightCheck::warn(
            "signature_gatekeeper",
            format!("Unexpected Gatekeeper output: {}", output.combined_str()),
        ),
        Err(e) => PreflightCheck::warn(
            "signature_gatekeeper",
            format!("Gatekeeper status query failed: {}", e),
        ),
    });

    checks
}

fn has_firewall_signature(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("enabled") || lower.contains("disabled")
}

fn has_gatekeeper_signature(output: &str) -> bool {
    output.to_lowercase().contains("assessment")
}

/// Minimum-OS-version policy comparison.
pub fn check_min_version(
    detected_version: Option<&str>,
    min_version: &str,
    enforce: bool,
) -> PreflightCheck {
    const NAME: &str = "min_macos_version";

    let detected_tuple = detected_version.map(version_tuple).unwrap_or_default();
    let min_tuple = version_tuple(min_version);

    if detected_tuple.is_empty() {
        let message = "macOS version could not be determined".to_string();
        return if enforce {
            PreflightCheck::fail(NAME, message, true)
        } else {
            PreflightCheck::warn(NAME, message)
        };
    }

    let detected = detected_version.unwrap_or("unknown");
    if detected_tuple >= min_tuple {
        PreflightCheck::pass(
            NAME,
            format!("macOS {} meets minimum {}", detected, min_version),
            enforce,
        )
    } else if enforce {
        PreflightCheck::fail(
            NAME,
            format!("macOS {} below minimum {}", detected, min_version),
            true,
        )
    } else {
        PreflightCheck::pass(
            NAME,
            format!(
                "macOS {} below minimum {} (enforcement off)",
                detected, min_version
            ),
            false,
        )
    }
}

/// Leading numeric components of a dot-separated version string.
///
/// `"26.3.1"` -> `[26, 3, 1]`; parsing stops at the first non-numeric
/// component, so `"26.3-beta"` -> `[26]` and garbage -> `[]`.
pub fn version_tuple(version: &str) -> Vec<u32> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u32>())
        .take_while(|r| r.is_ok())
        .map(|r| r.unwrap_or_default())
        .collect()
}

/// Extract the first `X.Y[.Z]` token from command output.
fn parse_leading_version(output: &str) -> Option<String> {
    for word in output.split_whitespace() {
        let cleaned: String = word
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if cleaned.contains('.')
            && cleaned
                .chars()
                .next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            return Some(cleaned.trim_end_matches('.').to_string());
        }
    }
    None
}

fn readable_file(path: &Path) -> bool {
    path.is_file() && std::fs::File::open(path).is_ok()
}

/// Recursive scan for `.yaml` documents.
fn dir_contains_yaml(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if dir_contains_yaml(&path) {
                return true;
            }
        } else if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            trace!(rule_file = %path.display(), "rule document found");
            return true;
        }
    }
    false
}
