//! Runtime configuration used by server bootstrap code.

use std::path::PathBuf;

use crate::error::{TredError, TredResult};

/// Listen address used when the operator does not pass one.
pub const DEFAULT_ADDR: &str = "localhost:3000";
/// Binlog location used when the operator passes an empty path.
pub const DEFAULT_DB_PATH: &str = "./default.db";

/// Bootstrap configuration consumed by `tred-server` during process startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP listen address in `host:port` form.
    pub addr: String,
    /// Binlog file path. Empty means "use [`DEFAULT_DB_PATH`]".
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            db_path: DEFAULT_DB_PATH.to_owned(),
        }
    }
}

impl ServerConfig {
    /// Validates operator-supplied fields.
    ///
    /// # Errors
    ///
    /// Returns `TredError::InvalidConfig` when the listen address is empty.
    pub fn validate(&self) -> TredResult<()> {
        if self.addr.is_empty() {
            return Err(TredError::InvalidConfig("listen address must not be empty"));
        }
        Ok(())
    }

    /// Returns the binlog path, substituting the default for an empty value.
    #[must_use]
    pub fn normalized_db_path(&self) -> PathBuf {
        if self.db_path.is_empty() {
            PathBuf::from(DEFAULT_DB_PATH)
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_DB_PATH, ServerConfig};
    use crate::error::TredError;
    use googletest::prelude::*;
    use rstest::rstest;

    #[rstest]
    fn config_rejects_empty_listen_address() {
        let config = ServerConfig {
            addr: String::new(),
            ..ServerConfig::default()
        };
        assert_that!(
            &config.validate(),
            eq(&Err(TredError::InvalidConfig(
                "listen address must not be empty"
            )))
        );
    }

    #[rstest]
    fn config_substitutes_default_path_for_empty_db_path() {
        let config = ServerConfig {
            db_path: String::new(),
            ..ServerConfig::default()
        };
        assert_that!(
            config.normalized_db_path().to_string_lossy().as_ref(),
            eq(DEFAULT_DB_PATH)
        );
    }

    #[rstest]
    fn config_keeps_explicit_db_path() {
        let config = ServerConfig {
            db_path: "/tmp/some.db".to_owned(),
            ..ServerConfig::default()
        };
        assert_that!(
            config.normalized_db_path().to_string_lossy().as_ref(),
            eq("/tmp/some.db")
        );
    }
}
