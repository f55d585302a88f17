use std::fmt;

use hashdrop_core::config::{RetentionConfig, StorageConfig};

/// Server settings, assembled once from the command line at startup.
#[derive(Clone)]
pub struct ServerSection {
    /// Address to listen on.
    pub listen: String,

    /// Root directory for blobs and the hash index.
    pub data_dir: String,

    /// Require a login before uploading or browsing.
    pub auth_enabled: bool,

    /// Shared password checked at login.
    pub password: String,

    /// Session lifetime in seconds.
    pub session_ttl_seconds: u64,

    /// Log output format: "json" or "pretty".
    pub log_format: String,

    pub retention: RetentionConfig,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            data_dir: "uploads".to_string(),
            auth_enabled: true,
            password: String::new(),
            session_ttl_seconds: 24 * 3600,
            log_format: "pretty".to_string(),
            retention: RetentionConfig::default(),
        }
    }
}

impl fmt::Debug for ServerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSection")
            .field("listen", &self.listen)
            .field("data_dir", &self.data_dir)
            .field("auth_enabled", &self.auth_enabled)
            .field("password", &"<redacted>")
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("log_format", &self.log_format)
            .field("retention", &self.retention)
            .finish()
    }
}

impl ServerSection {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            data_dir: self.data_dir.clone().into(),
            retention: self.retention.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_password() {
        let config = ServerSection {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn storage_config_carries_data_dir_and_retention() {
        let mut config = ServerSection {
            data_dir: "/srv/drop".to_string(),
            ..Default::default()
        };
        config.retention.enabled = true;
        let storage = config.storage_config();
        assert_eq!(storage.data_dir, std::path::PathBuf::from("/srv/drop"));
        assert!(storage.retention.enabled);
    }
}
