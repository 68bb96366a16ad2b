//! Site configuration model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or validating site configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("site is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("site is missing `host`, which is required when serving multiple sites")]
    MissingHost,

    #[error("invalid user entry `{0}`, expected name:password")]
    InvalidUser(String),

    #[error("site #{index}: {source}")]
    InvalidSite {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("configuration defines no sites")]
    NoSites,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// One tenant: a host name bound to a backend bucket and its credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub aws_key: String,
    #[serde(default)]
    pub aws_secret: String,
    #[serde(default)]
    pub aws_region: String,
    #[serde(default)]
    pub aws_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_endpoint: Option<String>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub options: Options,
}

/// Basic-auth user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub password: String,
}

/// Per-site behavior toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default)]
    pub cors: bool,
    #[serde(default)]
    pub gzip: bool,
    #[serde(default)]
    pub website: bool,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub force_ssl: bool,
    #[serde(default)]
    pub proxied: bool,
}

impl Site {
    /// Check the backend settings every site needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("awsKey", &self.aws_key),
            ("awsSecret", &self.aws_secret),
            ("awsRegion", &self.aws_region),
            ("awsBucket", &self.aws_bucket),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ConfigError::MissingField(field));
            }
        }
        Ok(())
    }

    /// Validation for multi-site mode, where every site is selected by host
    pub fn validate_with_host(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        self.validate()
    }

    /// Configured key prefix, if any
    pub fn key_prefix(&self) -> Option<&str> {
        let prefix = self.options.prefix.trim_matches('/');
        (!prefix.is_empty()).then_some(prefix)
    }
}

impl User {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    /// Parse a comma separated `name:password` list.
    ///
    /// The password may itself contain `:`; only the first one splits.
    pub fn parse_list(input: &str) -> Result<Vec<User>, ConfigError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once(':')
                    .map(|(name, password)| User::new(name, password))
                    .ok_or_else(|| ConfigError::InvalidUser(entry.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_site() -> Site {
        Site {
            aws_key: "test-key".into(),
            aws_secret: "test-secret".into(),
            aws_region: "us-east-1".into(),
            aws_bucket: "test-bucket".into(),
            ..Site::default()
        }
    }

    #[test]
    fn test_validate_site() {
        assert!(full_site().validate().is_ok());

        let cases: [(&str, fn(&mut Site)); 4] = [
            ("awsKey", |s| s.aws_key.clear()),
            ("awsSecret", |s| s.aws_secret.clear()),
            ("awsRegion", |s| s.aws_region.clear()),
            ("awsBucket", |s| s.aws_bucket.clear()),
        ];
        for (field, strip) in cases {
            let mut site = full_site();
            strip(&mut site);
            match site.validate() {
                Err(ConfigError::MissingField(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_site_with_host() {
        let mut site = full_site();
        assert!(matches!(
            site.validate_with_host(),
            Err(ConfigError::MissingHost)
        ));

        site.host = "example.com".into();
        assert!(site.validate_with_host().is_ok());

        site.aws_bucket.clear();
        assert!(site.validate_with_host().is_err());
    }

    #[test]
    fn test_parse_users() {
        assert_eq!(User::parse_list("user1:pass1").unwrap().len(), 1);

        let users = User::parse_list("user1:pass1,user2:pass2").unwrap();
        assert_eq!(
            users,
            vec![User::new("user1", "pass1"), User::new("user2", "pass2")]
        );

        assert!(User::parse_list("").unwrap().is_empty());
        assert!(matches!(
            User::parse_list("user1"),
            Err(ConfigError::InvalidUser(_))
        ));
        assert!(User::parse_list("user1pass1").is_err());
    }

    #[test]
    fn test_password_may_contain_colon() {
        let users = User::parse_list("admin:s3:cr3t").unwrap();
        assert_eq!(users[0].password, "s3:cr3t");
    }

    #[test]
    fn test_site_from_yaml_uses_camel_case() {
        let yaml = r"
host: files.example.com
awsKey: key
awsSecret: secret
awsRegion: eu-west-1
awsBucket: files
awsEndpoint: https://s3.wasabisys.com
users:
  - name: alice
    password: wonderland
options:
  forceSsl: true
  prefix: /public/
";
        let site: Site = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(site.host, "files.example.com");
        assert_eq!(site.aws_endpoint.as_deref(), Some("https://s3.wasabisys.com"));
        assert_eq!(site.users, vec![User::new("alice", "wonderland")]);
        assert!(site.options.force_ssl);
        assert!(!site.options.cors);
        assert_eq!(site.key_prefix(), Some("public"));
        assert!(site.validate_with_host().is_ok());
    }

    #[test]
    fn test_empty_prefix_is_none() {
        let mut site = full_site();
        assert_eq!(site.key_prefix(), None);
        site.options.prefix = "/".into();
        assert_eq!(site.key_prefix(), None);
    }
}
