use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_broker() -> String {
    "localhost:9092".into()
}

/// How payload bytes are turned into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodingMode {
    /// Lossy UTF-8.
    #[default]
    #[serde(alias = "text", alias = "json")]
    RawText,
    /// Decoded against a schema (e.g. a protobuf message type).
    #[serde(alias = "protobuf")]
    Structured,
}

/// Connection configuration exactly as the user entered it.
///
/// Fields that do not apply to the selected security type may be present;
/// the Configuration Gate ignores them when building the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default = "default_broker")]
    pub broker: String,
    #[serde(default)]
    pub topic: String,
    /// Consumer group id; a fixed default is used when absent.
    #[serde(default, alias = "groupId")]
    pub group_id: Option<String>,
    /// Legacy switch, consulted only when `security_type` is absent.
    #[serde(default, alias = "sslEnabled")]
    pub ssl_enabled: bool,
    /// `plaintext` | `ssl` | `sasl_plaintext` | `sasl_ssl`.
    #[serde(default, alias = "securityType")]
    pub security_type: Option<String>,
    #[serde(default, alias = "saslMechanism")]
    pub sasl_mechanism: Option<String>,
    /// JAAS-like string carrying `username=` and `password=`.
    #[serde(default, alias = "saslJaasConfig")]
    pub sasl_jaas_config: Option<String>,
    #[serde(default, alias = "truststoreLocation")]
    pub truststore_location: Option<String>,
    #[serde(default, alias = "truststorePassword")]
    pub truststore_password: Option<String>,
    #[serde(default, alias = "keystoreLocation")]
    pub keystore_location: Option<String>,
    #[serde(default, alias = "keystorePassword")]
    pub keystore_password: Option<String>,
    #[serde(default, alias = "keystoreKeyPassword")]
    pub keystore_key_password: Option<String>,
    #[serde(default, alias = "messageType")]
    pub decoding: DecodingMode,
    /// Schema files used when no cached descriptor handle is given.
    #[serde(default, alias = "schemaFiles")]
    pub schema_files: Vec<String>,
    /// Fully qualified message type selected for structured decoding.
    #[serde(default, alias = "messageTypeName")]
    pub message_type_name: Option<String>,
    /// Cache key returned by a previous schema-metadata parse.
    #[serde(default, alias = "descriptorKey")]
    pub descriptor_key: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            topic: String::new(),
            group_id: None,
            ssl_enabled: false,
            security_type: None,
            sasl_mechanism: None,
            sasl_jaas_config: None,
            truststore_location: None,
            truststore_password: None,
            keystore_location: None,
            keystore_password: None,
            keystore_key_password: None,
            decoding: DecodingMode::RawText,
            schema_files: Vec::new(),
            message_type_name: None,
            descriptor_key: None,
        }
    }
}

/// Exactly one security protocol is active per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "plaintext",
            SecurityProtocol::Ssl => "ssl",
            SecurityProtocol::SaslPlaintext => "sasl_plaintext",
            SecurityProtocol::SaslSsl => "sasl_ssl",
        }
    }

    pub fn uses_ssl(&self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }

    pub fn uses_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }
}

impl std::fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where structured-decoding descriptors come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    /// Descriptors already parsed and cached by the backend.
    Cached(String),
    Files(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadDecoding {
    RawText,
    Structured { message_type: String, schema: SchemaSource },
}

/// Normalized configuration forwarded to the backend. Read-only once a
/// controller has accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalConfig {
    pub broker: String,
    pub topic: String,
    pub security: SecurityProtocol,
    /// Client properties relevant to `security`, keyed by client option name.
    pub properties: BTreeMap<String, String>,
    pub decoding: PayloadDecoding,
}

impl CanonicalConfig {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_raw_config_is_sane() {
        let cfg = RawConfig::default();
        assert_eq!(cfg.broker, "localhost:9092");
        assert_eq!(cfg.topic, "");
        assert!(!cfg.ssl_enabled);
        assert_eq!(cfg.decoding, DecodingMode::RawText);
        assert!(cfg.schema_files.is_empty());
    }

    #[test]
    fn raw_config_accepts_camel_case_aliases() {
        let cfg: RawConfig = serde_json::from_str(
            r#"{"topic":"orders","securityType":"sasl_ssl","saslJaasConfig":"username=a password=b","messageType":"protobuf"}"#,
        )
        .unwrap();
        assert_eq!(cfg.security_type.as_deref(), Some("sasl_ssl"));
        assert_eq!(cfg.decoding, DecodingMode::Structured);
        assert!(cfg.sasl_jaas_config.is_some());
    }
}
