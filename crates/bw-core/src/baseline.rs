//! Baseline rule-engine dispatch.
//!
//! The rule engine (YAML rule parsing, baseline document generation,
//! fix application) is an external collaborator. This module only knows
//! how to invoke it: `bash <scripts.dir>/<scripts.baseline> <action>
//! --keyword <k>`, with `--dry-run` forwarded for `apply`.

use crate::gate::BaselineAction;
use crate::probe::{CommandRunner, ProbeSpec};
use crate::script::ScriptOutcome;
use bw_common::error::{Error, Result};
use bw_config::ScriptSettings;
use std::time::Duration;
use tracing::info;

/// Baseline generation walks every rule document; give it room.
const BASELINE_TIMEOUT: Duration = Duration::from_secs(600);

/// Invoke the external rule engine for one action.
pub fn run_baseline_action(
    runner: &dyn CommandRunner,
    settings: &ScriptSettings,
    action: BaselineAction,
    keyword: &str,
    dry_run: bool,
) -> Result<ScriptOutcome> {
    let path = settings.dir.join(&settings.baseline);
    if !path.is_file() {
        return Err(Error::ScriptMissing(path.display().to_string()));
    }

    let path_str = path.display().to_string();
    let mut args = vec![
        path_str.as_str(),
        action.name(),
        "--keyword",
        keyword,
    ];
    if dry_run && action.mutates_system() {
        args.push("--dry-run");
    }

    let spec = ProbeSpec::new("bash", &args).with_timeout(BASELINE_TIMEOUT);
    info!(action = %action, keyword, dry_run, "dispatching baseline engine");

    let output = runner
        .run(&spec)
        .map_err(|e| Error::ProbeFailed(e.to_string()))?;

    Ok(ScriptOutcome {
        script: path_str.clone(),
        args: args.iter().skip(1).map(|s| s.to_string()).collect(),
        success: output.success(),
        returncode: output.exit_code.unwrap_or(-1),
        stdout: output.stdout_str(),
        stderr: output.stderr_str(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRunner;
    use std::fs;

    fn settings(dir: &std::path::Path) -> ScriptSettings {
        ScriptSettings {
            dir: dir.to_path_buf(),
            baseline: "baseline.sh".to_string(),
        }
    }

    #[test]
    fn test_generate_dispatch() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = tmp.path().join("baseline.sh");
        fs::write(&engine, "#!/bin/bash\n").unwrap();

        let line = format!("bash {} generate --keyword stig", engine.display());
        let runner = ScriptedRunner::new().ok(&line, "baseline written");

        let outcome = run_baseline_action(
            &runner,
            &settings(tmp.path()),
            BaselineAction::Generate,
            "stig",
            false,
        )
        .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.args, vec!["generate", "--keyword", "stig"]);
    }

    #[test]
    fn test_apply_forwards_dry_run() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = tmp.path().join("baseline.sh");
        fs::write(&engine, "#!/bin/bash\n").unwrap();

        let line = format!("bash {} apply --keyword cis_lvl1 --dry-run", engine.display());
        let runner = ScriptedRunner::new().ok(&line, "");

        let outcome = run_baseline_action(
            &runner,
            &settings(tmp.path()),
            BaselineAction::Apply,
            "cis_lvl1",
            true,
        )
        .unwrap();
        assert!(outcome.success);
        assert_eq!(runner.calls(), vec![line]);
    }

    #[test]
    fn test_dry_run_not_forwarded_for_generate() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = tmp.path().join("baseline.sh");
        fs::write(&engine, "#!/bin/bash\n").unwrap();

        // Generate never mutates the live system, so --dry-run is dropped.
        let line = format!("bash {} generate --keyword stig", engine.display());
        let runner = ScriptedRunner::new().ok(&line, "");

        let outcome = run_baseline_action(
            &runner,
            &settings(tmp.path()),
            BaselineAction::Generate,
            "stig",
            true,
        )
        .unwrap();
        assert!(outcome.success);
    }

    #[test]
    fn test_missing_engine_is_typed_error() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let err = run_baseline_action(
            &runner,
            &settings(tmp.path()),
            BaselineAction::Apply,
            "stig",
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ScriptMissing(_)));
    }
}
