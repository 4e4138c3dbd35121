//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml_with_defaults() {
        let config = Config::from_yaml(
            r#"
source:
  type: memory
  id: projects/alpha
destination:
  type: memory
  id: projects/beta
transfer:
  collections: [users, orders]
"#,
        )
        .unwrap();

        assert_eq!(config.transfer.collections, vec!["users", "orders"]);
        assert_eq!(config.transfer.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.transfer.parallel, 1);
        assert!(!config.transfer.recursive);
        assert_eq!(config.transfer.rate_limit_per_sec, 0);
    }

    #[test]
    fn test_from_yaml_full_transfer_section() {
        let config = Config::from_yaml(
            r#"
source:
  type: file
  path: source.json
destination:
  type: file
  path: dest.json
transfer:
  collections: [users]
  recursive: true
  batch_size: 250
  limit: 1000
  exclude: ["cache*", "logs"]
  rename:
    users: customers
  id_prefix: "eu-"
  max_depth: 2
  rate_limit_per_sec: 400
  filters:
    - field: status
      op: "=="
      value: active
"#,
        )
        .unwrap();

        assert!(config.transfer.recursive);
        assert_eq!(config.transfer.batch_size, 250);
        assert_eq!(config.transfer.mapped_collection("users"), "customers");
        assert_eq!(config.transfer.mapped_id("u1"), "eu-u1");
        assert_eq!(config.transfer.filters.len(), 1);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(Config::from_yaml("source: [").is_err());
    }
}
