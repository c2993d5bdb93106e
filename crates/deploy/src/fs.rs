//! File system utils.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::error::{Result, VnetError};

/// Directory of the provider CLI configuration, relative to the home directory.
const CLI_CONFIG_DIR: &str = ".tenderly";
const CLI_CONFIG_FILE: &str = "config.yaml";

pub struct FsHandler;

impl FsHandler {
    #[cfg(unix)]
    pub fn set_owner_only(path: &Path) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to restrict permissions on file")
    }

    #[cfg(not(unix))]
    pub fn set_owner_only(_path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    /// Write the provider CLI credentials under `home`, readable by the owner only.
    ///
    /// Returns the path of the written file.
    pub fn write_cli_config(home: &Path, access_key: &str) -> Result<PathBuf> {
        let dir = home.join(CLI_CONFIG_DIR);
        let path = dir.join(CLI_CONFIG_FILE);

        let write = || {
            std::fs::create_dir_all(&dir).context("Failed to create CLI config directory")?;
            std::fs::write(&path, format!("access_key: {access_key}"))
                .context("Failed to write CLI config file")?;
            Self::set_owner_only(&path)
        };

        write().map_err(|err| {
            VnetError::configuration(format!("Failed to create Tenderly config: {err:#}"))
        })?;

        tracing::debug!(path = %path.display(), "CLI config file created");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_write_cli_config() {
        let temp_dir = TempDir::new("vnet-home").unwrap();
        let path = FsHandler::write_cli_config(temp_dir.path(), "secret-key").unwrap();

        assert_eq!(path, temp_dir.path().join(".tenderly/config.yaml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "access_key: secret-key");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_cli_config_overwrites() {
        let temp_dir = TempDir::new("vnet-home").unwrap();
        FsHandler::write_cli_config(temp_dir.path(), "old").unwrap();
        let path = FsHandler::write_cli_config(temp_dir.path(), "new").unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "access_key: new");
    }

    #[test]
    fn test_write_cli_config_failure_is_fatal() {
        let temp_dir = TempDir::new("vnet-home").unwrap();
        std::fs::write(temp_dir.path().join(".tenderly"), "not a directory").unwrap();

        let err = FsHandler::write_cli_config(temp_dir.path(), "key").unwrap_err();
        assert!(matches!(err, VnetError::Configuration(_)));
    }
}
