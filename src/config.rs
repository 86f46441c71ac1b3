//! Default locations and listen address resolution.

use crate::error::{Result, WnError};
use directories_next::ProjectDirs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Subdirectory name within the user's data directory.
pub const APP_SUBDIR: &str = "wordnet-dict";
pub const DB_FILENAME: &str = "wordnet.sqlite";
/// Directory under the data dir holding the extracted WNDB files.
pub const DICT_SUBDIR: &str = "dict";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;

/// Gets the project's data directory path. Does not create it.
pub fn default_data_dir() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("org", "WordnetDict", APP_SUBDIR).ok_or(WnError::DataDirNotFound)?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(DB_FILENAME))
}

pub fn default_dict_dir() -> Result<PathBuf> {
    Ok(default_data_dir()?.join(DICT_SUBDIR))
}

/// Uses `explicit` when given, otherwise the default database location.
pub fn resolve_db_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_db_path(),
    }
}

pub fn resolve_dict_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_dict_dir(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServeConfig {
    /// Resolves `host:port` to the first matching socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                WnError::InvalidArgument(format!("Cannot resolve listen address {}:{}", self.host, self.port))
            })
    }
}
