// =============================================================================
// Command registry — ports
// `original_source/services/telegram_router/app/core/registry.py::Registry`
// =============================================================================
//
// Commands live in `registry.json`, a config asset rather than a hardcoded
// table, exactly as the original loads its file-backed registry. The file's
// mtime is checked on every lookup and the table is reloaded in place when it
// changes, so a deploy can add or tweak a command without restarting the
// service.
// =============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::Deserialize;

use super::validator::ArgField;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchSpec {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub args_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelpSpec {
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub example: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub args_schema: Vec<ArgField>,
    #[serde(default)]
    pub dispatch: DispatchSpec,
    #[serde(default)]
    pub help: HelpSpec,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    sticky_commands: Vec<String>,
    #[serde(default)]
    commands: Vec<CommandSpec>,
}

struct Loaded {
    by_name: HashMap<String, CommandSpec>,
    aliases: HashMap<String, String>,
    sticky: Vec<String>,
    mtime: Option<SystemTime>,
}

/// Command table with alias resolution, reloaded from disk whenever
/// `registry.json`'s mtime advances past the last load.
pub struct Registry {
    path: PathBuf,
    state: RwLock<Loaded>,
}

impl Registry {
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let loaded = Self::read(&path)?;
        Ok(Self { path, state: RwLock::new(loaded) })
    }

    fn read(path: &PathBuf) -> anyhow::Result<Loaded> {
        let raw = fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&raw)?;
        let mut by_name = HashMap::new();
        let mut aliases = HashMap::new();
        for spec in file.commands {
            for a in &spec.aliases {
                aliases.insert(a.clone(), spec.name.clone());
            }
            by_name.insert(spec.name.clone(), spec);
        }
        let mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        Ok(Loaded { by_name, aliases, sticky: file.sticky_commands, mtime })
    }

    fn maybe_reload(&self) {
        let current_mtime = fs::metadata(&self.path).and_then(|m| m.modified()).ok();
        let stale = {
            let guard = self.state.read();
            match (current_mtime, guard.mtime) {
                (Some(cur), Some(last)) => cur > last,
                (Some(_), None) => true,
                _ => false,
            }
        };
        if stale {
            if let Ok(loaded) = Self::read(&self.path) {
                *self.state.write() = loaded;
            }
        }
    }

    /// Resolves `cmd` (already normalized, e.g. `/price`) through alias table
    /// to its canonical `CommandSpec`.
    pub fn get(&self, cmd: &str) -> Option<CommandSpec> {
        self.maybe_reload();
        let guard = self.state.read();
        let key = guard.aliases.get(cmd).cloned().unwrap_or_else(|| cmd.to_string());
        guard.by_name.get(&key).cloned()
    }

    pub fn is_sticky(&self, cmd: &str) -> bool {
        self.maybe_reload();
        let guard = self.state.read();
        let key = guard.aliases.get(cmd).cloned().unwrap_or_else(|| cmd.to_string());
        guard.sticky.contains(&key)
    }

    pub fn all(&self) -> Vec<CommandSpec> {
        self.maybe_reload();
        self.state.read().by_name.values().cloned().collect()
    }

    pub fn help_lines(&self) -> Vec<(String, String)> {
        let mut specs = self.all();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs.into_iter().map(|s| (s.help.usage.clone(), s.description.clone())).collect()
    }
}
