use lens_api::{
    CanonicalConfig, ConsumerBackend, DecodingMode, PayloadDecoding, RawConfig, SchemaMetadata,
    SchemaSource,
};

use crate::error::{ConfigError, ControllerError};
use crate::security::{security_properties, security_protocol};

const DEFAULT_GROUP_ID: &str = "lens-viewer";

/// Result of a discovery call that degrades instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery<T> {
    pub items: Vec<T>,
    /// Inline error text when discovery failed and `items` is empty.
    pub error: Option<String>,
}

impl<T> Discovery<T> {
    fn ok(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    fn failed(error: impl std::fmt::Display) -> Self {
        Self { items: Vec::new(), error: Some(error.to_string()) }
    }
}

/// A configuration accepted by the backend, with its partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedConfig {
    pub config: CanonicalConfig,
    /// Empty when partition discovery failed.
    pub partitions: Vec<i32>,
}

/// Validates user-entered configuration and forwards its canonical form.
pub struct ConfigGate;

impl ConfigGate {
    /// Normalize a configuration for consumption. Requires a topic.
    pub fn normalize(raw: &RawConfig) -> Result<CanonicalConfig, ConfigError> {
        let config = Self::normalize_connection(raw)?;
        if config.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        Ok(config)
    }

    /// Normalize connection settings only; the topic may still be empty
    /// (used for topic discovery before one is chosen).
    pub fn normalize_connection(raw: &RawConfig) -> Result<CanonicalConfig, ConfigError> {
        let broker = raw.broker.trim();
        if broker.is_empty() {
            return Err(ConfigError::EmptyBroker);
        }

        let security = security_protocol(raw)?;
        let mut properties = security_properties(raw, security);
        properties.insert("bootstrap.servers".into(), broker.to_string());
        let group_id = raw
            .group_id
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_GROUP_ID);
        properties.insert("group.id".into(), group_id.to_string());

        Ok(CanonicalConfig {
            broker: broker.to_string(),
            topic: raw.topic.trim().to_string(),
            security,
            properties,
            decoding: payload_decoding(raw)?,
        })
    }

    /// Normalize, configure the backend, then attempt partition discovery.
    /// Discovery failure degrades to an empty partition list.
    pub async fn apply(
        backend: &dyn ConsumerBackend,
        raw: &RawConfig,
    ) -> Result<AppliedConfig, ControllerError> {
        let config = Self::normalize(raw)?;
        backend
            .configure(&config)
            .await
            .map_err(ControllerError::backend("configure"))?;

        let partitions = match backend.discover_partitions(&config).await {
            Ok(partitions) => partitions,
            Err(e) => {
                tracing::warn!(topic = %config.topic, error = %e, "partition discovery failed, continuing without partitions");
                Vec::new()
            }
        };
        tracing::info!(
            broker = %config.broker,
            topic = %config.topic,
            security = %config.security,
            partitions = partitions.len(),
            "configuration applied"
        );
        Ok(AppliedConfig { config, partitions })
    }

    /// Sorted, de-duplicated topic names. Never fails.
    pub async fn discover_topics(backend: &dyn ConsumerBackend, raw: &RawConfig) -> Discovery<String> {
        let config = match Self::normalize_connection(raw) {
            Ok(config) => config,
            Err(e) => return Discovery::failed(e),
        };
        match backend.discover_topics(&config).await {
            Ok(mut names) => {
                names.sort();
                names.dedup();
                Discovery::ok(names)
            }
            Err(e) => {
                tracing::warn!(broker = %config.broker, error = %e, "topic discovery failed");
                Discovery::failed(e)
            }
        }
    }

    /// Parse schema files into message type names and a descriptor cache key.
    pub async fn describe_schema(
        backend: &dyn ConsumerBackend,
        files: &[String],
    ) -> Result<SchemaMetadata, ControllerError> {
        if files.iter().all(|f| f.trim().is_empty()) {
            return Err(ConfigError::NoSchemaFiles.into());
        }
        backend
            .parse_schema_metadata(files)
            .await
            .map_err(ControllerError::backend("parse schema metadata"))
    }
}

fn payload_decoding(raw: &RawConfig) -> Result<PayloadDecoding, ConfigError> {
    match raw.decoding {
        DecodingMode::RawText => Ok(PayloadDecoding::RawText),
        DecodingMode::Structured => {
            let message_type = raw
                .message_type_name
                .as_deref()
                .map(|n| n.trim().trim_start_matches('.'))
                .filter(|n| !n.is_empty())
                .ok_or(ConfigError::MissingMessageType)?
                .to_string();
            let files: Vec<String> = raw
                .schema_files
                .iter()
                .map(|f| f.trim())
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            let schema = match raw.descriptor_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
                Some(key) => SchemaSource::Cached(key.to_string()),
                None if !files.is_empty() => SchemaSource::Files(files),
                None => return Err(ConfigError::MissingSchema),
            };
            Ok(PayloadDecoding::Structured { message_type, schema })
        }
    }
}

#[cfg(test)]
mod tests {
    use lens_api::SecurityProtocol;

    use super::*;

    fn raw(topic: &str) -> RawConfig {
        RawConfig { topic: topic.into(), ..Default::default() }
    }

    #[test]
    fn canonical_form_carries_connection_properties() {
        let cfg = ConfigGate::normalize(&RawConfig {
            broker: " kafka:9092 ".into(),
            ..raw("orders")
        })
        .unwrap();
        assert_eq!(cfg.broker, "kafka:9092");
        assert_eq!(cfg.security, SecurityProtocol::Plaintext);
        assert_eq!(cfg.property("bootstrap.servers"), Some("kafka:9092"));
        assert_eq!(cfg.property("group.id"), Some(DEFAULT_GROUP_ID));
        assert_eq!(cfg.decoding, PayloadDecoding::RawText);
    }

    #[test]
    fn missing_broker_or_topic_is_rejected() {
        assert_eq!(ConfigGate::normalize(&raw("  ")), Err(ConfigError::EmptyTopic));
        assert_eq!(
            ConfigGate::normalize(&RawConfig { broker: String::new(), ..raw("t") }),
            Err(ConfigError::EmptyBroker)
        );
        assert!(ConfigGate::normalize_connection(&raw("")).is_ok());
    }

    #[test]
    fn structured_decoding_prefers_cached_descriptors() {
        let cfg = ConfigGate::normalize(&RawConfig {
            decoding: DecodingMode::Structured,
            message_type_name: Some(".shop.Order".into()),
            schema_files: vec!["order.proto".into()],
            descriptor_key: Some("desc-1".into()),
            ..raw("orders")
        })
        .unwrap();
        assert_eq!(
            cfg.decoding,
            PayloadDecoding::Structured {
                message_type: "shop.Order".into(),
                schema: SchemaSource::Cached("desc-1".into()),
            }
        );
    }

    #[test]
    fn structured_decoding_needs_type_and_schema() {
        let base = RawConfig { decoding: DecodingMode::Structured, ..raw("orders") };
        assert_eq!(ConfigGate::normalize(&base), Err(ConfigError::MissingMessageType));
        let with_type = RawConfig { message_type_name: Some("shop.Order".into()), ..base };
        assert_eq!(ConfigGate::normalize(&with_type), Err(ConfigError::MissingSchema));
    }
}
