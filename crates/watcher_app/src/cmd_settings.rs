use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use clap::Subcommand;
use watcher_core::{parse_watchlist, SettingKey};

use crate::platform::settings::{editor_marker, migrate_watchlist, open_store, parse_value};

// ── CLI Schema ──

#[derive(Subcommand)]
pub enum SettingsCmd {
    /// Print one setting
    Get {
        /// Setting key (e.g. pollIntervalMs)
        key: String,
    },
    /// Change one setting; a running watcher picks it up within a second
    Set {
        /// Setting key
        key: String,
        /// Value: true/false, number, JSON, or plain text
        value: String,
    },
    /// Print every setting
    List,
    /// Open settings.json in $VISUAL or $EDITOR; reloads pause while it is open
    Edit,
}

// ── Dispatch ──

pub fn run(cmd: SettingsCmd, dir: &Path) -> anyhow::Result<()> {
    match cmd {
        SettingsCmd::Get { key } => get(dir, &key),
        SettingsCmd::Set { key, value } => set(dir, &key, &value),
        SettingsCmd::List => list(dir),
        SettingsCmd::Edit => edit(dir),
    }
}

// ── Command Implementations ──

fn known_key(key: &str) -> anyhow::Result<SettingKey> {
    SettingKey::parse(key).with_context(|| {
        let known: Vec<&str> = SettingKey::ALL.iter().map(|key| key.as_str()).collect();
        format!("unknown setting {key:?}; known settings: {}", known.join(", "))
    })
}

/// `watcher get <key>`
fn get(dir: &Path, key: &str) -> anyhow::Result<()> {
    known_key(key)?;
    let store = open_store(dir)?;
    match store.get(key) {
        Some(value) => println!("{value}"),
        None => println!("(not set)"),
    }
    Ok(())
}

/// `watcher set <key> <value>`
fn set(dir: &Path, key: &str, raw: &str) -> anyhow::Result<()> {
    let setting = known_key(key)?;
    let value = parse_value(raw);
    if setting == SettingKey::Watchlist {
        parse_watchlist(&value).context("refusing to store an invalid watchlist")?;
    }
    let store = open_store(dir)?;
    store.set(key, value.clone())?;
    println!("{key} = {value}");
    Ok(())
}

/// `watcher list`
fn list(dir: &Path) -> anyhow::Result<()> {
    let store = open_store(dir)?;
    for (key, value) in store.snapshot() {
        println!("{key} = {value}");
    }
    Ok(())
}

/// `watcher edit`
fn edit(dir: &Path) -> anyhow::Result<()> {
    let store = open_store(dir)?;
    let editor = env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string());
    let mut words = editor.split_whitespace();
    let program = words.next().context("$EDITOR is empty")?;

    let status = {
        let _marker = EditorMarker::create(editor_marker(dir))?;
        Command::new(program)
            .args(words)
            .arg(store.path())
            .status()
            .with_context(|| format!("failed to start editor {program:?}"))?
    };
    if !status.success() {
        bail!("editor exited with {status}");
    }

    let changed = store
        .sync_from_disk()
        .context("settings.json is no longer valid JSON; fix it with `watcher edit`")?;
    migrate_watchlist(&store)?;
    println!("{changed} setting(s) changed");
    Ok(())
}

fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

/// Holds the marker file that tells running watchers an editor is open.
struct EditorMarker {
    path: PathBuf,
}

impl EditorMarker {
    fn create(path: PathBuf) -> anyhow::Result<Self> {
        fs::write(&path, std::process::id().to_string())
            .with_context(|| format!("failed to create {path:?}"))?;
        Ok(Self { path })
    }
}

impl Drop for EditorMarker {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unknown_keys_are_rejected() {
        let err = known_key("pollInterval").unwrap_err();
        assert!(err.to_string().contains("pollIntervalMs"));
    }

    #[test]
    fn invalid_watchlist_is_not_stored() {
        let dir = TempDir::new().unwrap();
        assert!(set(dir.path(), "watchlist", r#"[{"path":"/p","items":["Card A"]}]"#).is_err());
        set(dir.path(), "watchlist", r#"[{"path":"/p","items":[{"id":"X","name":"A"}]}]"#)
            .unwrap();
        let store = open_store(dir.path()).unwrap();
        assert_eq!(store.get("watchlist").unwrap()[0]["items"][0]["id"], "X");
    }

    #[test]
    fn marker_exists_only_while_held() {
        let dir = TempDir::new().unwrap();
        let path = editor_marker(dir.path());
        {
            let _marker = EditorMarker::create(path.clone()).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
