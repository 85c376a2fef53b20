//! External tool availability

use super::process::{CommandRunner, Invocation};
use log::debug;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Answers "is this command installed?"
pub trait ToolProber: Send + Sync {
    /// Never fails: anything that goes wrong while probing means "no"
    fn has_command(&self, name: &str) -> bool;
}

/// Prober that asks the platform's own lookup (`command -v` / `where`)
pub struct SystemProber {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl SystemProber {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn lookup(name: &str) -> Invocation {
        if cfg!(windows) {
            Invocation::new("where").arg(name)
        } else {
            // Name goes in as $1, never spliced into the script text
            Invocation::new("sh")
                .arg("-c")
                .arg("command -v \"$1\" >/dev/null 2>&1")
                .arg("sh")
                .arg(name)
        }
    }
}

impl ToolProber for SystemProber {
    fn has_command(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        let found = self
            .runner
            .run(&Self::lookup(name), Some(self.timeout))
            .map(|out| out.success)
            .unwrap_or(false);
        debug!("Tool {}: {}", name, if found { "found" } else { "missing" });
        found
    }
}

/// Per-operation snapshot of tool availability
///
/// Each command is probed at most once per snapshot. Build a new snapshot
/// for every logical operation so that a tool installed in the meantime
/// is picked up.
pub struct ToolAvailability<'a> {
    prober: &'a dyn ToolProber,
    seen: RefCell<BTreeMap<String, bool>>,
}

impl<'a> ToolAvailability<'a> {
    pub fn new(prober: &'a dyn ToolProber) -> Self {
        Self {
            prober,
            seen: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        if let Some(&known) = self.seen.borrow().get(name) {
            return known;
        }
        let found = self.prober.has_command(name);
        self.seen.borrow_mut().insert(name.to_string(), found);
        found
    }

    /// First name in `names` that is available
    pub fn first_available<'n>(&self, names: &[&'n str]) -> Option<&'n str> {
        names.iter().copied().find(|name| self.has(name))
    }

    /// Everything probed so far, sorted by name
    pub fn probed(&self) -> Vec<(String, bool)> {
        self.seen
            .borrow()
            .iter()
            .map(|(name, &found)| (name.clone(), found))
            .collect()
    }
}
