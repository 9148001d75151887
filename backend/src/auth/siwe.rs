//! Sign-In-With-Ethereum (ERC-4361) message parsing
//!
//! Parses the plain-text SIWE message a wallet signs into structured fields.
//! Cryptographic checks live in [`super::crypto`]; the login flow that ties
//! parsing, signature recovery and nonce consumption together lives in
//! [`super::verifier`].

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::nonce::is_valid_account_id;

const PREAMBLE_SUFFIX: &str = " wants you to sign in with your Ethereum account:";

/// SIWE parse errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SiweError {
    #[error("missing preamble line")]
    MissingPreamble,

    #[error("invalid address line")]
    InvalidAddress,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {0}: {1}")]
    InvalidField(&'static str, String),

    #[error("unexpected line: {0}")]
    UnexpectedLine(String),
}

/// Structured SIWE message
#[derive(Debug, Clone, PartialEq)]
pub struct SiweMessage {
    pub scheme: Option<String>,
    pub domain: String,
    /// Address exactly as written in the message
    pub address: String,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// CAIP-2 identifier of the chain the message was signed for
    pub fn caip2_chain_id(&self) -> String {
        format!("eip155:{}", self.chain_id)
    }

    /// Whether `now` falls within `[not_before, expiration_time)`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(not_before) = self.not_before {
            if now < not_before {
                return false;
            }
        }
        if let Some(expiration_time) = self.expiration_time {
            if now >= expiration_time {
                return false;
            }
        }
        true
    }

    /// Parse a SIWE message
    pub fn parse(message: &str) -> Result<Self, SiweError> {
        let mut lines = message.lines().peekable();

        let preamble = lines.next().ok_or(SiweError::MissingPreamble)?;
        let origin = preamble
            .strip_suffix(PREAMBLE_SUFFIX)
            .ok_or(SiweError::MissingPreamble)?;
        let (scheme, domain) = match origin.split_once("://") {
            Some((scheme, domain)) => (Some(scheme.to_string()), domain.to_string()),
            None => (None, origin.to_string()),
        };
        if domain.is_empty() {
            return Err(SiweError::InvalidField("domain", origin.to_string()));
        }

        let address = lines.next().ok_or(SiweError::InvalidAddress)?.trim().to_string();
        if !is_valid_account_id(&address.to_lowercase()) {
            return Err(SiweError::InvalidAddress);
        }

        // Everything up to the URI line is blank separators or the statement
        let mut statement_lines = Vec::new();
        while let Some(line) = lines.peek() {
            if line.starts_with("URI: ") {
                break;
            }
            if !line.is_empty() {
                statement_lines.push(line.to_string());
            }
            lines.next();
        }
        let statement = if statement_lines.is_empty() {
            None
        } else {
            Some(statement_lines.join("\n"))
        };

        let mut uri = None;
        let mut version = None;
        let mut chain_id = None;
        let mut nonce = None;
        let mut issued_at = None;
        let mut expiration_time = None;
        let mut not_before = None;
        let mut request_id = None;
        let mut resources = Vec::new();
        let mut in_resources = false;

        for line in lines {
            if in_resources {
                if let Some(resource) = line.strip_prefix("- ") {
                    resources.push(resource.to_string());
                    continue;
                }
                in_resources = false;
            }

            if line.is_empty() {
                continue;
            }
            if line == "Resources:" {
                in_resources = true;
                continue;
            }

            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| SiweError::UnexpectedLine(line.to_string()))?;

            match key {
                "URI" => uri = Some(value.to_string()),
                "Version" => version = Some(value.to_string()),
                "Chain ID" => {
                    let parsed = value
                        .parse::<u64>()
                        .map_err(|_| SiweError::InvalidField("Chain ID", value.to_string()))?;
                    chain_id = Some(parsed);
                }
                "Nonce" => nonce = Some(value.to_string()),
                "Issued At" => issued_at = Some(parse_timestamp("Issued At", value)?),
                "Expiration Time" => {
                    expiration_time = Some(parse_timestamp("Expiration Time", value)?)
                }
                "Not Before" => not_before = Some(parse_timestamp("Not Before", value)?),
                "Request ID" => request_id = Some(value.to_string()),
                _ => return Err(SiweError::UnexpectedLine(line.to_string())),
            }
        }

        let version = version.ok_or(SiweError::MissingField("Version"))?;
        if version != "1" {
            return Err(SiweError::InvalidField("Version", version));
        }

        let nonce = nonce.ok_or(SiweError::MissingField("Nonce"))?;
        if nonce.is_empty() || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SiweError::InvalidField("Nonce", nonce));
        }

        Ok(SiweMessage {
            scheme,
            domain,
            address,
            statement,
            uri: uri.ok_or(SiweError::MissingField("URI"))?,
            version,
            chain_id: chain_id.ok_or(SiweError::MissingField("Chain ID"))?,
            nonce,
            issued_at: issued_at.ok_or(SiweError::MissingField("Issued At"))?,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, SiweError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SiweError::InvalidField(field, value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const ADDRESS: &str = "0xAbC1230000000000000000000000000000000DeF";

    fn sample(extra: &str) -> String {
        format!(
            "app.example wants you to sign in with your Ethereum account:\n\
             {ADDRESS}\n\
             \n\
             Sign in to the marketplace\n\
             \n\
             URI: https://app.example/login\n\
             Version: 1\n\
             Chain ID: 1\n\
             Nonce: 3f1a9c0e7b2d4a6f8e1c3b5a7d9f0e2c4b6a8d0f1e3c5b7a9d1f3e5c7b9a1d3f\n\
             Issued At: 2026-10-18T12:00:00Z{extra}"
        )
    }

    #[test]
    fn test_parse_full_message() {
        let message = sample(
            "\nExpiration Time: 2026-10-18T12:10:00Z\n\
             Not Before: 2026-10-18T11:59:00Z\n\
             Request ID: req-1\n\
             Resources:\n\
             - https://app.example/terms\n\
             - ipfs://bafy",
        );
        let parsed = SiweMessage::parse(&message).unwrap();

        assert_eq!(parsed.domain, "app.example");
        assert_eq!(parsed.scheme, None);
        assert_eq!(parsed.address, ADDRESS);
        assert_eq!(parsed.statement.as_deref(), Some("Sign in to the marketplace"));
        assert_eq!(parsed.uri, "https://app.example/login");
        assert_eq!(parsed.chain_id, 1);
        assert_eq!(parsed.caip2_chain_id(), "eip155:1");
        assert_eq!(parsed.request_id.as_deref(), Some("req-1"));
        assert_eq!(parsed.resources.len(), 2);
        assert!(parsed.expiration_time.is_some());
        assert!(parsed.not_before.is_some());
    }

    #[test]
    fn test_parse_without_statement_and_with_scheme() {
        let message = format!(
            "https://app.example wants you to sign in with your Ethereum account:\n\
             {ADDRESS}\n\
             \n\
             \n\
             URI: https://app.example\n\
             Version: 1\n\
             Chain ID: 137\n\
             Nonce: abcdef12\n\
             Issued At: 2026-10-18T12:00:00.000Z"
        );
        let parsed = SiweMessage::parse(&message).unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("https"));
        assert_eq!(parsed.domain, "app.example");
        assert_eq!(parsed.statement, None);
        assert_eq!(parsed.caip2_chain_id(), "eip155:137");
    }

    #[test]
    fn test_missing_preamble() {
        assert_eq!(
            SiweMessage::parse("hello\nworld"),
            Err(SiweError::MissingPreamble)
        );
    }

    #[test]
    fn test_invalid_address() {
        let message = sample("").replace(ADDRESS, "0x1234");
        assert_eq!(SiweMessage::parse(&message), Err(SiweError::InvalidAddress));
    }

    #[test]
    fn test_missing_nonce() {
        let message = sample("")
            .lines()
            .filter(|l| !l.starts_with("Nonce: "))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(
            SiweMessage::parse(&message),
            Err(SiweError::MissingField("Nonce"))
        );
    }

    #[test]
    fn test_unsupported_version() {
        let message = sample("").replace("Version: 1", "Version: 2");
        assert!(matches!(
            SiweMessage::parse(&message),
            Err(SiweError::InvalidField("Version", _))
        ));
    }

    #[test]
    fn test_bad_timestamp() {
        let message = sample("\nExpiration Time: tomorrow");
        assert!(matches!(
            SiweMessage::parse(&message),
            Err(SiweError::InvalidField("Expiration Time", _))
        ));
    }

    #[test]
    fn test_validity_window() {
        let message = sample(
            "\nExpiration Time: 2026-10-18T12:10:00Z\n\
             Not Before: 2026-10-18T12:00:00Z",
        );
        let parsed = SiweMessage::parse(&message).unwrap();
        let not_before = parsed.not_before.unwrap();
        let expires = parsed.expiration_time.unwrap();

        assert!(!parsed.is_valid_at(not_before - Duration::seconds(1)));
        assert!(parsed.is_valid_at(not_before));
        assert!(parsed.is_valid_at(expires - Duration::seconds(1)));
        assert!(!parsed.is_valid_at(expires));
    }
}
