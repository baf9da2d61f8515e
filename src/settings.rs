//! User settings from `config.toml` in the veneer config directory

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::paths;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Default overlay file, used when `--overlay` and `VENEER_OVERLAY` are unset
    #[serde(rename = "overlay")]
    pub overlay_path: Option<String>,

    /// Ask before uninstalling from an interactive terminal
    pub confirm_uninstall: bool,

    /// Extra template variables; these win over the overlay's own `[vars]`
    pub vars: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overlay_path: None,
            confirm_uninstall: true,
            vars: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::settings_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("Could not read {}", path.display())),
        };
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// The configured overlay file, expanded and resolved against `base`
    /// (the config directory) when relative
    pub fn overlay(&self, base: &Path) -> Option<PathBuf> {
        self.overlay_path
            .as_deref()
            .map(|p| paths::resolve(base, &paths::expand_path(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.confirm_uninstall);
        assert!(settings.overlay(dir.path()).is_none());
    }

    #[test]
    fn reads_all_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            indoc! {r#"
                overlay = "/srv/overlays/team.toml"
                confirm_uninstall = false

                [vars]
                team = "infra"
            "#},
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(
            settings.overlay(dir.path()),
            Some(PathBuf::from("/srv/overlays/team.toml"))
        );
        assert!(!settings.confirm_uninstall);
        assert_eq!(settings.vars.get("team").map(String::as_str), Some("infra"));
    }

    #[test]
    fn relative_overlay_resolves_against_base() {
        let settings = Settings {
            overlay_path: Some("overlays/team.toml".into()),
            ..Settings::default()
        };
        assert_eq!(
            settings.overlay(Path::new("/home/me/.config/veneer")),
            Some(PathBuf::from("/home/me/.config/veneer/overlays/team.toml"))
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "overlays = \"typo\"\n").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid settings"));
    }
}
