use std::collections::BTreeMap;
use std::path::Path;

use lens_api::{RawConfig, SecurityProtocol};

use crate::error::ConfigError;

const DEFAULT_SASL_MECHANISM: &str = "SCRAM-SHA-512";

/// Resolve the active security protocol. An explicit `security_type` wins;
/// otherwise the legacy `ssl_enabled` flag picks between ssl and plaintext.
pub fn security_protocol(raw: &RawConfig) -> Result<SecurityProtocol, ConfigError> {
    let Some(ty) = raw.security_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(if raw.ssl_enabled { SecurityProtocol::Ssl } else { SecurityProtocol::Plaintext });
    };
    match ty.to_ascii_lowercase().replace('-', "_").as_str() {
        "plaintext" => Ok(SecurityProtocol::Plaintext),
        "ssl" => Ok(SecurityProtocol::Ssl),
        "sasl_plaintext" => Ok(SecurityProtocol::SaslPlaintext),
        "sasl_ssl" => Ok(SecurityProtocol::SaslSsl),
        _ => Err(ConfigError::UnknownSecurityType(ty.to_string())),
    }
}

/// Client properties for `protocol`. Fields of other protocols are ignored.
pub fn security_properties(raw: &RawConfig, protocol: SecurityProtocol) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    props.insert("security.protocol".to_string(), protocol.as_str().to_string());
    if protocol.uses_ssl() {
        ssl_properties(raw, &mut props);
    }
    if protocol.uses_sasl() {
        sasl_properties(raw, &mut props);
    }
    props
}

fn ssl_properties(raw: &RawConfig, props: &mut BTreeMap<String, String>) {
    if let Some(path) = non_empty(&raw.truststore_location) {
        if is_likely_ca_path(path) {
            props.insert("ssl.ca.location".into(), path.into());
        } else if !is_pkcs12(path) {
            tracing::warn!(path, "truststore does not look like a PEM bundle or directory, skipping");
        }
    }

    // A PKCS#12 bundle entered as truststore with no keystore is a keystore.
    match non_empty(&raw.keystore_location) {
        Some(path) => {
            props.insert("ssl.keystore.location".into(), path.into());
        }
        None => {
            if let Some(ts) = non_empty(&raw.truststore_location).filter(|p| is_pkcs12(p)) {
                props.insert("ssl.keystore.location".into(), ts.into());
                if let Some(pass) = non_empty(&raw.truststore_password) {
                    props.insert("ssl.keystore.password".into(), pass.into());
                }
            }
        }
    }

    if let Some(pass) = non_empty(&raw.keystore_password) {
        props.insert("ssl.keystore.password".into(), pass.into());
    }
    if let Some(pass) = non_empty(&raw.keystore_key_password) {
        props.insert("ssl.key.password".into(), pass.into());
    }
}

fn sasl_properties(raw: &RawConfig, props: &mut BTreeMap<String, String>) {
    let mechanism = non_empty(&raw.sasl_mechanism)
        .map(str::trim)
        .unwrap_or(DEFAULT_SASL_MECHANISM);
    props.insert("sasl.mechanism".into(), mechanism.into());

    if let Some(jaas) = non_empty(&raw.sasl_jaas_config) {
        match parse_jaas_credentials(jaas) {
            Some((user, pass)) => {
                props.insert("sasl.username".into(), user);
                props.insert("sasl.password".into(), pass);
            }
            None => tracing::warn!("no username/password found in JAAS config"),
        }
    }
}

/// Extract `username` and `password` from a JAAS-like string.
///
/// Values may be single- or double-quoted; unquoted values end at
/// whitespace or `;`.
pub fn parse_jaas_credentials(s: &str) -> Option<(String, String)> {
    Some((jaas_field("username", s)?, jaas_field("password", s)?))
}

fn jaas_field(field: &str, s: &str) -> Option<String> {
    let needle = format!("{field}=");
    let idx = s.find(&needle)?;
    let after = &s[idx + needle.len()..];
    let first = after.chars().next()?;
    if first == '"' || first == '\'' {
        let rest = &after[first.len_utf8()..];
        let end = rest.find(first)?;
        return Some(rest[..end].to_string());
    }
    let end = after
        .find(|ch: char| ch.is_whitespace() || ch == ';')
        .unwrap_or(after.len());
    Some(after[..end].to_string())
}

/// A directory, or a file with a PEM-style extension.
pub fn is_likely_ca_path(p: &str) -> bool {
    if Path::new(p).is_dir() {
        return true;
    }
    let lower = p.to_ascii_lowercase();
    [".pem", ".crt", ".cer", ".bundle"].iter().any(|ext| lower.ends_with(ext))
}

fn is_pkcs12(p: &str) -> bool {
    let lower = p.to_ascii_lowercase();
    lower.ends_with(".p12") || lower.ends_with(".pfx")
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}
