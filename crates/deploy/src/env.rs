//! Variables exported to the later steps of the job.
//!
//! The runner reads `NAME<<DELIMITER` heredoc entries appended to the file named
//! by `GITHUB_ENV`. Secrets are masked in the job log before they are exported.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use anyhow::Context;

use crate::error::{Result, VnetError};

/// Exports job variables, keeping a copy of everything exported.
#[derive(Debug, Default)]
pub struct EnvExporter {
    github_env: Option<PathBuf>,
    exported: Mutex<BTreeMap<String, String>>,
    masked: Mutex<BTreeSet<String>>,
}

impl EnvExporter {
    /// Exporter appending to the runner's environment file.
    pub fn new(github_env: impl Into<PathBuf>) -> Self {
        Self {
            github_env: Some(github_env.into()),
            ..Default::default()
        }
    }

    /// Exporter that only records values. Used outside of a runner.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn export(&self, name: &str, value: &str) -> Result<()> {
        self.exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());

        if let Some(path) = &self.github_env {
            append_entry(path, name, value)?;
        }

        tracing::debug!(name, "Exported variable");
        Ok(())
    }

    /// Export a value that must never appear in the job log.
    pub fn export_secret(&self, name: &str, value: &str) -> Result<()> {
        if self.github_env.is_some() {
            println!("::add-mask::{value}");
        }
        self.masked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());

        self.export(name, value)
    }

    /// Export `{key}_{network_id}`.
    pub fn export_for_network(&self, key: &str, value: &str, network_id: &str) -> Result<()> {
        self.export(&format!("{key}_{network_id}"), value)
    }

    pub fn export_secret_for_network(&self, key: &str, value: &str, network_id: &str) -> Result<()> {
        self.export_secret(&format!("{key}_{network_id}"), value)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn is_masked(&self, name: &str) -> bool {
        self.masked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Every variable exported so far.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn append_entry(path: &Path, name: &str, value: &str) -> Result<()> {
    let delimiter = format!("ghadelimiter_{:016x}", rand::random::<u64>());

    let append = || {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context("Failed to open environment file")?;
        write!(file, "{name}<<{delimiter}\n{value}\n{delimiter}\n")
            .context("Failed to append to environment file")
    };

    append().map_err(|err| VnetError::persistence(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_in_memory_export() {
        let exporter = EnvExporter::in_memory();
        exporter.export("BUILD_SLUG", "42-1001").unwrap();
        exporter
            .export_for_network("TENDERLY_CHAIN_ID", "73571", "1")
            .unwrap();

        assert_eq!(exporter.get("BUILD_SLUG").as_deref(), Some("42-1001"));
        assert_eq!(exporter.get("TENDERLY_CHAIN_ID_1").as_deref(), Some("73571"));
        assert_eq!(exporter.get("TENDERLY_CHAIN_ID"), None);
        assert_eq!(exporter.snapshot().len(), 2);
    }

    #[test]
    fn test_secrets_are_masked() {
        let exporter = EnvExporter::in_memory();
        exporter
            .export_secret_for_network("TENDERLY_ADMIN_RPC_URL", "https://admin", "137")
            .unwrap();
        exporter.export("TENDERLY_PUBLIC_RPC_URL_137", "https://public").unwrap();

        assert!(exporter.is_masked("TENDERLY_ADMIN_RPC_URL_137"));
        assert!(!exporter.is_masked("TENDERLY_PUBLIC_RPC_URL_137"));
        assert_eq!(
            exporter.get("TENDERLY_ADMIN_RPC_URL_137").as_deref(),
            Some("https://admin")
        );
    }

    #[test]
    fn test_appends_heredoc_entries() {
        let temp_dir = TempDir::new("vnet-env").unwrap();
        let path = temp_dir.path().join("github_env");
        std::fs::write(&path, "EXISTING=1\n").unwrap();

        let exporter = EnvExporter::new(&path);
        exporter.export("TENDERLY_TESTNET_ID_1", "abc-123").unwrap();
        exporter.export("MULTILINE", "first\nsecond").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "EXISTING=1");

        let (name, delimiter) = lines[1].split_once("<<").unwrap();
        assert_eq!(name, "TENDERLY_TESTNET_ID_1");
        assert!(delimiter.starts_with("ghadelimiter_"));
        assert_eq!(lines[2], "abc-123");
        assert_eq!(lines[3], delimiter);

        let (name, delimiter) = lines[4].split_once("<<").unwrap();
        assert_eq!(name, "MULTILINE");
        assert_eq!(&lines[5..8], &["first", "second", delimiter]);
    }

    #[test]
    fn test_unwritable_env_file_is_warning() {
        let temp_dir = TempDir::new("vnet-env").unwrap();
        let exporter = EnvExporter::new(temp_dir.path().join("missing/dir/github_env"));

        let err = exporter.export("BUILD_SLUG", "42-1001").unwrap_err();
        assert!(matches!(err, VnetError::Persistence { .. }));
        // The value is still recorded for the current process.
        assert_eq!(exporter.get("BUILD_SLUG").as_deref(), Some("42-1001"));
    }
}
