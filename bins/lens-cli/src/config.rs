use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use lens_api::{FilterPatch, FilterSpec, PartitionSelector, RawConfig, StartPosition};
use lens_engine::ControllerSettings;

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "lens", about = "Browse and stream topic records")]
pub struct Cli {
    /// Path to the TOML profile.
    #[arg(long, global = true, default_value = "lens.toml", env = "LENS_CONFIG")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print one page of records
    Browse(BrowseArgs),
    /// Follow a filtered streaming session
    Stream(StreamArgs),
    /// List topics visible with the profile's connection
    Topics,
    /// List message types declared in schema files
    Schema(SchemaArgs),
}

#[derive(Args, Clone, Debug)]
pub struct BrowseArgs {
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Partition id or "all".
    #[arg(long)]
    pub partition: Option<String>,

    /// Start offset within the selected partition.
    #[arg(long)]
    pub offset: Option<i64>,

    /// Read from the end of each partition.
    #[arg(long)]
    pub newest: bool,
}

impl BrowseArgs {
    /// Filter edits requested on the command line.
    pub fn patch(&self) -> Result<FilterPatch, CliError> {
        let mut patch = FilterPatch::default();
        if let Some(p) = &self.partition {
            let selector: PartitionSelector = p.parse().map_err(lens_engine::ConfigError::from)?;
            patch = patch.partition(selector);
        }
        if self.offset.is_some() {
            patch = patch.start_offset(self.offset);
        }
        if self.newest {
            patch = patch.start_position(StartPosition::Newest);
        }
        Ok(patch)
    }
}

#[derive(Args, Clone, Debug)]
pub struct StreamArgs {
    /// Case-insensitive key substring.
    #[arg(long)]
    pub key: Option<String>,

    /// Case-insensitive payload substring.
    #[arg(long)]
    pub payload: Option<String>,

    /// Cancel the session after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct SchemaArgs {
    /// Schema files; defaults to the profile's `schema_files`.
    pub files: Vec<String>,
}

// ---- TOML profile ----

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub connection: RawConfig,
    #[serde(default)]
    pub controller: ControllerSettings,
    /// Initial pending filter.
    #[serde(default)]
    pub filter: FilterSpec,
    /// JSON-lines record dump, relative to the profile file.
    #[serde(default)]
    pub dump: Option<PathBuf>,
}

impl Profile {
    pub fn load(path: &str) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        let mut profile = Self::parse(&content)
            .map_err(|e| CliError::Config { context: "parse", detail: format!("'{path}': {e}") })?;
        if let Some(dump) = profile.dump.take() {
            let base = Path::new(path).parent().unwrap_or(Path::new("."));
            profile.dump = Some(base.join(dump));
        }
        Ok(profile)
    }

    pub fn parse(toml_str: &str) -> Result<Self, String> {
        let profile: Self = toml::from_str(toml_str).map_err(|e| e.to_string())?;
        profile.controller.validate().map_err(|e| e.to_string())?;
        Ok(profile)
    }

    /// The profile's filter as a patch over the default filter.
    pub fn filter_patch(&self) -> FilterPatch {
        let f = &self.filter;
        FilterPatch {
            partition: Some(f.partition),
            start_offset: Some(f.start_offset),
            start_position: Some(f.start_position),
            key_filter: Some(f.key_filter.clone()),
            payload_filter: Some(f.payload_filter.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const PROFILE: &str = r#"
        dump = "records.jsonl"

        [connection]
        broker = "kafka:9092"
        topic = "orders"
        securityType = "sasl_ssl"
        saslJaasConfig = 'username="u" password="p"'

        [controller]
        page_size = 10

        [filter]
        partition = "2"
        start_position = "newest"
    "#;

    #[test]
    fn profile_fills_defaults() {
        let p = Profile::parse(PROFILE).unwrap();
        assert_eq!(p.connection.topic, "orders");
        assert_eq!(p.connection.security_type.as_deref(), Some("sasl_ssl"));
        assert_eq!(p.controller.page_size, 10);
        assert_eq!(p.controller.batch_limit, 200);
        assert_eq!(p.filter.partition, PartitionSelector::Partition(2));
        assert_eq!(p.filter.start_position, StartPosition::Newest);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = Profile::parse("[connection]\ntopic = \"t\"\n[controller]\npage_size = 0\n").unwrap_err();
        assert!(err.contains("page_size"));
    }

    #[test]
    fn dump_path_is_relative_to_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lens.toml");
        std::fs::File::create(&path).unwrap().write_all(PROFILE.as_bytes()).unwrap();

        let p = Profile::load(path.to_str().unwrap()).unwrap();
        assert_eq!(p.dump, Some(dir.path().join("records.jsonl")));
    }

    #[test]
    fn missing_profile_reports_path() {
        let err = Profile::load("/nonexistent/lens.toml").err().unwrap();
        assert!(err.to_string().contains("/nonexistent/lens.toml"));
    }

    #[test]
    fn browse_flags_become_a_patch() {
        let args = BrowseArgs {
            page: 1,
            partition: Some("all".into()),
            offset: Some(5),
            newest: true,
        };
        let patch = args.patch().unwrap();
        assert_eq!(patch.partition, Some(PartitionSelector::All));
        assert_eq!(patch.start_offset, Some(Some(5)));
        assert_eq!(patch.start_position, Some(StartPosition::Newest));

        let bad = BrowseArgs { partition: Some("x".into()), ..args };
        assert!(bad.patch().is_err());
    }
}
