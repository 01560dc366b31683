//! Environment checks for `mint doctor`.

use std::path::Path;

use crate::core::types::QueueProperties;
use crate::io::config::{MintConfig, RunSettings, load_config};
use crate::io::init::MintPaths;
use crate::io::queue_store::{FileQueueStore, QueueRef};

/// One line of the doctor report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub label: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn ok(label: &'static str, detail: impl Into<String>) -> Self {
        Self {
            label,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(label: &'static str, detail: impl Into<String>) -> Self {
        Self {
            label,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Inspect config, queue, command and session directory under `root`.
///
/// `queue` overrides the configured default queue. Problems are reported as
/// failed checks, never as errors.
pub fn run_doctor(root: &Path, queue: Option<&str>) -> Vec<Check> {
    let paths = MintPaths::new(root);
    let mut checks = Vec::new();

    let cfg = if paths.config_path.exists() {
        match load_config(&paths.config_path) {
            Ok(cfg) => {
                checks.push(Check::ok("config", paths.config_path.display().to_string()));
                cfg
            }
            Err(err) => {
                checks.push(Check::fail("config", format!("{err:#}")));
                MintConfig::default()
            }
        }
    } else {
        checks.push(Check::fail(
            "config",
            format!("{} missing (run `mint config`)", paths.config_path.display()),
        ));
        MintConfig::default()
    };

    let requested = queue
        .map(str::to_string)
        .unwrap_or_else(|| cfg.default_queue.clone());
    let (queue_check, queue_props) = check_queue(&paths, &requested);
    checks.push(queue_check);

    match RunSettings::resolve(&queue_props, &cfg.properties) {
        Ok(settings) => {
            checks.push(Check::ok("command", settings.command));
            checks.push(Check::ok("auto_close", settings.auto_close.to_string()));
        }
        Err(_) => {
            checks.push(Check::fail(
                "command",
                "empty (set with: mint setup command \"<cmd>\")",
            ));
            checks.push(Check::ok("auto_close", cfg.properties.auto_close.to_string()));
        }
    }

    checks.push(match cfg.session_root() {
        Some(dir) if dir.is_dir() => Check::ok("sessions", dir.display().to_string()),
        Some(dir) => Check::ok("sessions", format!("{} (not created yet)", dir.display())),
        None => Check::fail("sessions", "HOME is not set and session_dir is not configured"),
    });

    checks
}

fn check_queue(paths: &MintPaths, requested: &str) -> (Check, QueueProperties) {
    if requested.trim().is_empty() {
        return (
            Check::ok("queue", "skipped (no queue given)"),
            QueueProperties::default(),
        );
    }
    let queue = match QueueRef::parse(requested) {
        Ok(queue) => queue,
        Err(err) => return (Check::fail("queue", err.to_string()), QueueProperties::default()),
    };
    let store = FileQueueStore::new(paths.queue_path(&queue));
    match store.load() {
        Ok(sheet) => {
            let rows = sheet.rows.iter().filter(|row| !row.is_blank()).count();
            (
                Check::ok("queue", format!("{} ({rows} rows)", store.path().display())),
                sheet.properties,
            )
        }
        Err(err) => (Check::fail("queue", format!("{err:#}")), QueueProperties::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::QueueSheet;
    use crate::io::config::write_config;
    use crate::test_support::{TestWorkspace, new_row, properties};

    fn find<'a>(checks: &'a [Check], label: &str) -> &'a Check {
        checks
            .iter()
            .find(|check| check.label == label)
            .expect("check present")
    }

    #[test]
    fn fresh_directory_reports_missing_config_and_command() {
        let ws = TestWorkspace::new().expect("workspace");
        let checks = run_doctor(ws.root(), None);

        assert!(!find(&checks, "config").passed);
        assert!(find(&checks, "queue").passed);
        assert!(!find(&checks, "command").passed);
        assert_eq!(find(&checks, "auto_close").detail, "true");
    }

    #[test]
    fn healthy_setup_passes_everything() {
        let ws = TestWorkspace::new().expect("workspace");
        let cfg = MintConfig {
            default_queue: "today".to_string(),
            session_dir: Some(ws.root().to_path_buf()),
            ..MintConfig::default()
        };
        write_config(&ws.paths().config_path, &cfg).expect("config");
        let sheet = QueueSheet {
            properties: properties("codex exec"),
            ..QueueSheet::with_rows(vec![new_row("a"), new_row("b")])
        };
        ws.write_queue("today", &sheet).expect("queue");

        let checks = run_doctor(ws.root(), None);

        assert!(checks.iter().all(|check| check.passed), "{checks:?}");
        assert!(find(&checks, "queue").detail.ends_with("(2 rows)"));
        assert_eq!(find(&checks, "command").detail, "codex exec");
        assert_eq!(find(&checks, "auto_close").detail, "false");
    }

    #[test]
    fn unreadable_or_invalid_queue_fails() {
        let ws = TestWorkspace::new().expect("workspace");

        assert!(!find(&run_doctor(ws.root(), Some("bad name")), "queue").passed);
        assert!(!find(&run_doctor(ws.root(), Some("absent")), "queue").passed);
    }
}
