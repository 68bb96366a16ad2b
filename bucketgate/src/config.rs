//! Configuration loading
//!
//! Multi-site deployments read a YAML or JSON file of sites. Legacy
//! single-site deployments are configured entirely from `BUCKETGATE_*`
//! environment variables.

use bucketgate_core::{ConfigError, Options, Site, User};
use serde::Deserialize;
use std::path::Path;

/// Format of a sites file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// JSON for `.json` files, YAML for everything else
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parse and validate a list of sites.
///
/// Every site must name its host since sites are selected by `Host` header.
pub fn parse_sites(text: &str, format: FileFormat) -> Result<Vec<Site>, ConfigError> {
    let sites: Vec<Site> = match format {
        FileFormat::Yaml => serde_yaml::from_str::<Option<Vec<Site>>>(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .unwrap_or_default(),
        FileFormat::Json => {
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
    };

    if sites.is_empty() {
        return Err(ConfigError::NoSites);
    }

    for (index, site) in sites.iter().enumerate() {
        site.validate_with_host()
            .map_err(|source| ConfigError::InvalidSite {
                index,
                source: Box::new(source),
            })?;
    }

    Ok(sites)
}

/// Read, parse and validate a sites file
pub async fn load_sites(path: &Path) -> Result<Vec<Site>, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_sites(&text, FileFormat::from_path(path))
}

/// Legacy environment settings, one variable per field
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LegacyEnv {
    aws_key: String,
    aws_secret: String,
    aws_region: String,
    aws_bucket: String,
    aws_endpoint: Option<String>,
    users: String,
    cors: bool,
    gzip: bool,
    website: bool,
    prefix: String,
    force_ssl: bool,
    proxied: bool,
}

/// Build the single legacy site from `BUCKETGATE_*` variables
pub fn legacy_site() -> Result<Site, ConfigError> {
    legacy_site_from(config::Environment::with_prefix("BUCKETGATE"))
}

/// Build the single legacy site from an environment source.
///
/// The site needs no host; it serves every request.
pub fn legacy_site_from(environment: config::Environment) -> Result<Site, ConfigError> {
    let env: LegacyEnv = config::Config::builder()
        .add_source(environment)
        .build()
        .and_then(config::Config::try_deserialize::<LegacyEnv>)
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    let site = Site {
        host: String::new(),
        aws_key: env.aws_key,
        aws_secret: env.aws_secret,
        aws_region: env.aws_region,
        aws_bucket: env.aws_bucket,
        aws_endpoint: env.aws_endpoint.filter(|e| !e.is_empty()),
        users: User::parse_list(&env.users)?,
        options: Options {
            cors: env.cors,
            gzip: env.gzip,
            website: env.website,
            prefix: env.prefix,
            force_ssl: env.force_ssl,
            proxied: env.proxied,
        },
    };

    site.validate()?;
    Ok(site)
}
