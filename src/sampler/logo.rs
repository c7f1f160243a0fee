//! Executable name to logo path lookup.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use super::normalize_name;

#[cfg(target_os = "windows")]
const LOGO_DIR: &str = "/static/logo/windows";
#[cfg(target_os = "macos")]
const LOGO_DIR: &str = "/static/logo/macos";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LOGO_DIR: &str = "/static/logo/linux";

/// Fallback logo for known applications without a logo of their own.
pub const DEFAULT_LOGO: &str = "/static/logo/default.png";

/// Well-known executables shipped with a logo: `(exe, display name, file)`.
const BUILTIN: &[(&str, &str, &str)] = &[
    ("chrome.exe", "Google Chrome", "chrome.svg"),
    ("chrome", "Google Chrome", "chrome.svg"),
    ("firefox.exe", "Firefox", "firefox.svg"),
    ("firefox", "Firefox", "firefox.svg"),
    ("msedge.exe", "Microsoft Edge", "edge.svg"),
    ("code.exe", "Visual Studio Code", "vs_code.svg"),
    ("code", "Visual Studio Code", "vs_code.svg"),
    ("node.exe", "Node.js", "node.js.svg"),
    ("node", "Node.js", "node.js.svg"),
    ("python.exe", "Python", "python.svg"),
    ("python", "Python", "python.svg"),
    ("python3", "Python", "python.svg"),
    ("java", "Java", "java.svg"),
    ("git", "Git", "git.svg"),
    ("discord.exe", "Discord", "discord.svg"),
    ("discord", "Discord", "discord.svg"),
    ("slack.exe", "Slack", "slack.svg"),
    ("slack", "Slack", "slack.svg"),
    ("spotify.exe", "Spotify", "spotify.svg"),
    ("spotify", "Spotify", "spotify.svg"),
    ("teams.exe", "Microsoft Teams", "teams.svg"),
    ("zoom.exe", "Zoom", "zoom.svg"),
    ("docker", "Docker", "docker.svg"),
    ("dockerd", "Docker", "docker.svg"),
    ("postgres", "PostgreSQL", "postgresql.svg"),
    ("mysqld", "MySQL", "mysql.svg"),
    ("mongod", "MongoDB", "mongodb.svg"),
    ("redis-server", "Redis", "redis.svg"),
    ("nginx", "nginx", "nginx.svg"),
    ("sshd", "OpenSSH", "openssh.svg"),
];

#[derive(Debug, Clone, PartialEq)]
struct LogoEntry {
    display_name: String,
    logo: String,
}

/// One application the logo table knows about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnownApp {
    pub exe_name: String,
    pub display_name: String,
    pub logo: String,
}

/// Static name to logo-path table. Lookups never fail: unknown names map to
/// an empty string and the front-end falls back to a letter avatar.
#[derive(Debug, Clone, Default)]
pub struct LogoTable {
    entries: BTreeMap<String, LogoEntry>,
}

impl LogoTable {
    /// The compiled-in table for the current platform.
    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(exe, display_name, file)| {
                let entry = LogoEntry {
                    display_name: display_name.to_string(),
                    logo: format!("{LOGO_DIR}/{file}"),
                };
                (exe.to_string(), entry)
            })
            .collect();
        Self { entries }
    }

    /// Merge a JSON object of `{"exe_name": "/static/logo/..."}` over the
    /// current table.
    pub fn merge_json_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read logo mapping: {}", path.display()))?;
        let mapping: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse logo mapping: {}", path.display()))?;

        let count = mapping.len();
        for (exe, logo) in mapping {
            self.insert(&exe, logo);
        }
        info!(path = %path.display(), count, "merged logo mapping");
        Ok(count)
    }

    /// Set the logo for `exe`. A new entry is displayed under its trimmed
    /// executable name; an existing one keeps its display name.
    pub fn insert(&mut self, exe: &str, logo: impl Into<String>) {
        let logo = logo.into();
        match self.entries.entry(normalize_name(exe)) {
            Entry::Occupied(mut slot) => slot.get_mut().logo = logo,
            Entry::Vacant(slot) => {
                slot.insert(LogoEntry {
                    display_name: exe.trim().to_string(),
                    logo,
                });
            }
        }
    }

    /// Look up a normalized application key.
    pub fn lookup(&self, key: &str) -> &str {
        self.entries.get(key).map(|e| e.logo.as_str()).unwrap_or("")
    }

    /// The whole `exe -> logo` mapping, ordered by executable name.
    pub fn icons(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(exe, entry)| (exe.clone(), entry.logo.clone()))
            .collect()
    }

    /// Every known application, ordered by display name.
    pub fn known_apps(&self) -> Vec<KnownApp> {
        let mut apps: Vec<_> = self
            .entries
            .iter()
            .map(|(exe, entry)| KnownApp {
                exe_name: exe.clone(),
                display_name: entry.display_name.clone(),
                logo: if entry.logo.is_empty() {
                    DEFAULT_LOGO.to_string()
                } else {
                    entry.logo.clone()
                },
            })
            .collect();
        // Entries iterate by exe name, so equal display names stay in exe order.
        apps.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        apps
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_lookup() {
        let table = LogoTable::builtin();
        assert!(table.lookup("firefox").ends_with("/firefox.svg"));
        assert_eq!(table.lookup("definitely-not-an-app"), "");
    }

    #[test]
    fn test_merge_json_file_normalizes_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"  MyApp.EXE ": "/static/logo/windows/myapp.png"}}"#).unwrap();

        let mut table = LogoTable::default();
        assert_eq!(table.merge_json_file(file.path()).unwrap(), 1);
        assert_eq!(table.lookup("myapp.exe"), "/static/logo/windows/myapp.png");
    }

    #[test]
    fn test_merge_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(LogoTable::default().merge_json_file(file.path()).is_err());
    }

    #[test]
    fn test_icons_and_known_apps() {
        let mut table = LogoTable::builtin();
        table.insert("Zed", "");

        let icons = table.icons();
        assert!(icons["git"].ends_with("/git.svg"));
        assert_eq!(icons["zed"], "");

        let apps = table.known_apps();
        assert_eq!(apps.len(), table.len());
        let names: Vec<_> = apps.iter().map(|a| a.display_name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        let zed = apps.iter().find(|a| a.exe_name == "zed").unwrap();
        assert_eq!(zed.display_name, "Zed");
        assert_eq!(zed.logo, DEFAULT_LOGO);
    }

    #[test]
    fn test_insert_keeps_display_name() {
        let mut table = LogoTable::builtin();
        table.insert("FIREFOX", "/static/logo/linux/custom.png");

        let firefox = table
            .known_apps()
            .into_iter()
            .find(|a| a.exe_name == "firefox")
            .unwrap();
        assert_eq!(firefox.display_name, "Firefox");
        assert_eq!(firefox.logo, "/static/logo/linux/custom.png");
    }
}
