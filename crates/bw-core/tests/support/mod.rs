//! Shared fixtures for bw-core binary tests.
//!
//! Builds a sandboxed environment: a fake `PATH` with stub macOS tools, a
//! scripts directory whose scripts leave markers when they run, a backup
//! root, and a config file pointing at all of it. Tests drive the real
//! binary against this sandbox so outcomes don't depend on the host.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct FakeEnv {
    pub dir: TempDir,
    pub bin: PathBuf,
    pub scripts: PathBuf,
    pub backups: PathBuf,
    pub config: PathBuf,
}

impl FakeEnv {
    /// Root of the sandbox (also the process working directory).
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A command for the bw-core binary wired into the sandbox.
    pub fn bw(&self) -> Command {
        let mut cmd = Command::cargo_bin("bw-core").expect("bw-core binary should exist");
        cmd.current_dir(self.root())
            .env_clear()
            .env("PATH", &self.bin)
            .env("HOME", self.root())
            .env("MARKER_DIR", self.root())
            .arg("--config")
            .arg(&self.config);
        cmd
    }

    /// Overwrite one stub tool.
    pub fn write_tool(&self, name: &str, body: &str) {
        write_executable(&self.bin.join(name), body);
    }

    /// Remove one stub tool from the fake PATH.
    pub fn remove_tool(&self, name: &str) {
        let _ = fs::remove_file(self.bin.join(name));
    }

    /// Whether a marker file was left by a fake script/tool.
    pub fn marker_exists(&self, name: &str) -> bool {
        self.root().join(name).exists()
    }

    /// Contents of the fake `defaults` invocation log.
    pub fn defaults_log(&self) -> String {
        fs::read_to_string(self.root().join("defaults.log")).unwrap_or_default()
    }

    /// Directory names under the backup root.
    pub fn rollback_ids(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.backups) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Seed a rollback point in the legacy on-disk layout.
    pub fn seed_rollback_point(
        &self,
        rollback_id: &str,
        created_at: &str,
        entries: &[(&str, &str, bool, Option<&str>)],
    ) {
        let point_dir = self.backups.join(rollback_id);
        fs::create_dir_all(&point_dir).unwrap();

        let mut refs = Vec::new();
        for (domain, key, exists, value) in entries {
            let file = point_dir.join(format!("defaults_{}_{}.backup", domain, key));
            let entry = serde_json::json!({
                "type": "defaults",
                "domain": domain,
                "key": key,
                "use_sudo": false,
                "original_value": value,
                "exists": exists,
                "backup_time": created_at,
            });
            fs::write(&file, serde_json::to_string_pretty(&entry).unwrap()).unwrap();
            refs.push(serde_json::json!({
                "file": file,
                "type": "defaults",
                "domain": domain,
                "key": key,
            }));
        }

        let metadata = serde_json::json!({
            "rollback_id": rollback_id,
            "component": rollback_id.split('_').next().unwrap_or("unknown"),
            "description": "seeded point",
            "timestamp": "20260805_101500",
            "created_at": created_at,
            "system_info": {
                "macos_version": "26.3",
                "user": "admin",
                "hostname": "mac-01",
            },
            "backups": refs,
        });
        fs::write(
            point_dir.join("metadata.json"),
            serde_json::to_string_pretty(&metadata).unwrap(),
        )
        .unwrap();
    }
}

/// Build the default sandbox: every tool present, macOS version 26.3.
pub fn fake_env() -> FakeEnv {
    let dir = TempDir::new().unwrap();
    let bin = dir.path().join("bin");
    let scripts = dir.path().join("scripts");
    let backups = dir.path().join("backups");
    fs::create_dir_all(&bin).unwrap();
    fs::create_dir_all(&scripts).unwrap();
    fs::create_dir_all(&backups).unwrap();

    // bash answers --version probes and otherwise delegates to /bin/sh so
    // the fake scripts actually execute.
    write_executable(
        &bin.join("bash"),
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then\n\
           echo \"GNU bash, version 5.2.37(1)-release\"\n\
           exit 0\n\
         fi\n\
         exec /bin/sh \"$@\"\n",
    );
    write_executable(&bin.join("sw_vers"), "#!/bin/sh\necho 26.3\n");
    write_executable(&bin.join("which"), "#!/bin/sh\ncommand -v \"$1\"\n");
    // touch: create each named marker file (scripts use it to signal they ran).
    write_executable(
        &bin.join("touch"),
        "#!/bin/sh\n\
         for f in \"$@\"; do\n\
           case \"$f\" in -*) ;; *) : > \"$f\" ;; esac\n\
         done\n",
    );
    write_executable(&bin.join("curl"), "#!/bin/sh\nexit 0\n");
    write_executable(&bin.join("jq"), "#!/bin/sh\nexit 0\n");
    write_executable(&bin.join("pup"), "#!/bin/sh\nexit 0\n");
    // sudo: the -n probe succeeds; anything else runs the wrapped command.
    write_executable(
        &bin.join("sudo"),
        "#!/bin/sh\n\
         if [ \"$1\" = \"-n\" ]; then exit 0; fi\n\
         exec \"$@\"\n",
    );
    // defaults: log every invocation; reads report a missing key, writes
    // and deletes succeed.
    write_executable(
        &bin.join("defaults"),
        "#!/bin/sh\n\
         echo \"defaults $*\" >> \"$MARKER_DIR/defaults.log\"\n\
         if [ \"$1\" = \"read\" ]; then exit 1; fi\n\
         exit 0\n",
    );
    write_executable(
        &bin.join("launchctl"),
        "#!/bin/sh\nprintf '614\\t0\\tcom.apple.mDNSResponder\\n'\n",
    );

    for script in [
        "privacy.sh",
        "firewall.sh",
        "encryption.sh",
        "app_security.sh",
        "cve_fetch.sh",
        "apple_updates.sh",
        "baseline.sh",
    ] {
        let marker = script.trim_end_matches(".sh");
        write_executable(
            &scripts.join(script),
            &format!(
                "#!/bin/sh\n\
                 for arg in \"$@\"; do\n\
                   if [ \"$arg\" = \"--dry-run\" ]; then\n\
                     echo \"{marker}: dry run\"\n\
                     exit 0\n\
                   fi\n\
                 done\n\
                 touch \"$MARKER_DIR/{marker}_ran\"\n\
                 echo \"{marker}: done\"\n"
            ),
        );
    }

    let config = dir.path().join("config.yaml");
    fs::write(
        &config,
        format!(
            "preflight:\n\
             \x20 min_macos_version: \"26.3\"\n\
             \x20 enforce_min_version: true\n\
             rollback:\n\
             \x20 backup_location: {}\n\
             scripts:\n\
             \x20 dir: {}\n",
            backups.display(),
            scripts.display()
        ),
    )
    .unwrap();

    FakeEnv {
        dir,
        bin,
        scripts,
        backups,
        config,
    }
}

fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}
