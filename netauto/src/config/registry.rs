//! Named-host registry file.
//!
//! A TOML file mapping inventory names to connection arguments:
//!
//! ```toml
//! [hosts.n9k1]
//! platform = "cisco_nxos_nxapi"
//! host = "10.1.1.5"
//! username = "ntc"
//! password = "ntc123"
//! transport = "https"
//! ```

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;

use super::{ConnectionArgs, DeviceSpec};
use crate::error::{ConfigError, Result};

/// Environment variable overriding the default registry location.
pub const REGISTRY_ENV: &str = "NETAUTO_CONF";

const DEFAULT_FILE_NAME: &str = ".netauto.toml";

#[derive(Debug, Default, Deserialize)]
struct HostFile {
    #[serde(default)]
    hosts: IndexMap<String, ConnectionArgs>,
}

/// Inventory of named devices loaded from a TOML file.
#[derive(Debug)]
pub struct HostRegistry {
    path: PathBuf,
    hosts: IndexMap<String, ConnectionArgs>,
}

impl HostRegistry {
    /// `$NETAUTO_CONF`, else `~/.netauto.toml`.
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var_os(REGISTRY_ENV) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => home::home_dir().map(|home| home.join(DEFAULT_FILE_NAME)),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text, path)
    }

    /// Parse registry text; `path` is only used in error messages.
    pub fn parse_str(text: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file: HostFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!("loaded {} hosts from {}", file.hosts.len(), path.display());
        Ok(Self {
            path,
            hosts: file.hosts,
        })
    }

    /// Names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// Resolve the entry called `name`.
    pub fn get(&self, name: &str) -> Result<DeviceSpec> {
        let args = self.hosts.get(name).ok_or_else(|| ConfigError::UnknownHost {
            name: name.to_string(),
            path: self.path.clone(),
        })?;
        let mut spec = DeviceSpec::from_args(args)?;
        spec.name = Some(name.to_string());
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::Scheme;
    use crate::error::Error;
    use crate::platform::Platform;

    const HOSTS: &str = r#"
[hosts.n9k1]
platform = "cisco_nxos_nxapi"
host = "10.1.1.5"
username = "ntc"
password = "ntc123"
transport = "https"

[hosts.csr1]
platform = "cisco_ios_ssh"
host = "csr1.lab"
username = "ntc"
password = "ntc123"
secret = "enable"
"#;

    #[test]
    fn test_lookup_by_name() {
        let registry = HostRegistry::parse_str(HOSTS, "hosts.toml").unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["n9k1", "csr1"]);

        let spec = registry.get("n9k1").unwrap();
        assert_eq!(spec.platform, Platform::CiscoNxosNxapi);
        assert_eq!(spec.params.scheme, Some(Scheme::Https));
        assert_eq!(spec.label(), "n9k1");
    }

    #[test]
    fn test_unknown_host() {
        let registry = HostRegistry::parse_str(HOSTS, "hosts.toml").unwrap();
        assert!(matches!(
            registry.get("eos9").unwrap_err(),
            Error::Config(ConfigError::UnknownHost { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_and_unknown_keys() {
        assert!(HostRegistry::parse_str("[hosts.a\n", "bad.toml").is_err());
        assert!(HostRegistry::parse_str("[hosts.a]\nbogus = 1\n", "bad.toml").is_err());
    }

    #[test]
    fn test_resolve_through_ntc_host() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(HOSTS.as_bytes()).unwrap();

        let local = ConnectionArgs {
            ntc_host: Some("csr1".into()),
            ntc_conf_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let spec = DeviceSpec::resolve(&local, None).unwrap();
        assert_eq!(spec.platform, Platform::CiscoIosSsh);
        assert_eq!(spec.params.host, "csr1.lab");
        assert!(spec.params.secret.is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = HostRegistry::load("/nonexistent/netauto.toml").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Io { .. })));
    }
}
