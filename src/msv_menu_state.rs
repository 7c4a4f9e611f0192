// Persisted expanded/collapsed state of the sidebar menu groups
use crate::msv_models::{MsvError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Expanded,
    Collapsed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuState {
    groups: BTreeMap<String, GroupState>,
}

impl MenuState {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("msv");
        path.push("menu_state.json");
        path
    }

    /// Groups never toggled before start expanded.
    pub fn is_expanded(&self, group: &str) -> bool {
        self.groups.get(group).copied().unwrap_or(GroupState::Expanded) == GroupState::Expanded
    }

    pub fn set_expanded(&mut self, group: &str, expanded: bool) {
        let state = if expanded { GroupState::Expanded } else { GroupState::Collapsed };
        self.groups.insert(group.to_string(), state);
    }

    pub fn toggle(&mut self, group: &str) -> bool {
        let expanded = !self.is_expanded(group);
        self.set_expanded(group, expanded);
        expanded
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MsvError::File(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MsvError::File(format!("Failed to serialize menu state: {}", e)))?;

        fs::write(path, json)
            .map_err(|e| MsvError::File(format!("Failed to write menu state: {}", e)))?;

        log::debug!("Menu state saved to {}", path.display());
        Ok(())
    }

    /// Missing or unreadable files yield the default state.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<MenuState>(&contents) {
                Ok(state) => state,
                Err(e) => {
                    log::warn!("Ignoring malformed menu state {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read menu state {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_disk_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("menu_state.json");

        let mut state = MenuState::default();
        state.set_expanded("Data", false);
        assert!(!state.toggle("Sections"));
        state.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"collapsed\""));

        let restored = MenuState::load(&path);
        assert!(!restored.is_expanded("Data"));
        assert!(!restored.is_expanded("Sections"));
        assert!(restored.is_expanded("Other"));
    }

    #[test]
    fn malformed_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu_state.json");
        fs::write(&path, "{not json").unwrap();

        assert_eq!(MenuState::load(&path), MenuState::default());
        assert_eq!(MenuState::load(&dir.path().join("absent.json")), MenuState::default());
    }
}
