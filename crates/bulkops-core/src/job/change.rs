//! Change parameters carried by a bulk job
//!
//! Each [`Change`] belongs to exactly one [`JobKind`]; the registrar receives
//! it unchanged for every item of the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::JobKind;
use crate::error::{Error, Result};

/// Default TTL used when the operator picks "Automatic"
pub const DEFAULT_TTL: u32 = 1800;

/// Smallest TTL the registrar accepts
pub const MIN_TTL: u32 = 60;

/// Largest TTL the registrar accepts
pub const MAX_TTL: u32 = 86_400;

/// Operation-specific parameters of a bulk job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    /// Refresh each domain from the registrar into the portfolio
    Sync,

    /// Point a URL redirect record at a new target
    RedirectUpdate {
        /// Host name of the redirect record ("@" for the apex)
        #[serde(default = "default_host")]
        name: String,
        /// Redirect target URL
        target: String,
    },

    /// Add DNS records to each domain
    DnsAdd {
        /// Records to add
        records: Vec<DnsRecord>,
    },

    /// Remove every record matching type and host name
    DnsRemove {
        /// Record type to remove
        record_type: RecordType,
        /// Host name to remove ("@" for the apex)
        #[serde(default = "default_host")]
        name: String,
    },
}

impl Change {
    /// Job kind this change belongs to
    pub fn kind(&self) -> JobKind {
        match self {
            Change::Sync => JobKind::Sync,
            Change::RedirectUpdate { .. } => JobKind::RedirectUpdate,
            Change::DnsAdd { .. } => JobKind::DnsAdd,
            Change::DnsRemove { .. } => JobKind::DnsRemove,
        }
    }

    /// Redirect update for the apex host
    pub fn redirect(target: impl Into<String>) -> Self {
        Change::RedirectUpdate {
            name: default_host(),
            target: target.into(),
        }
    }

    /// Validate the change parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Change::Sync => Ok(()),
            Change::RedirectUpdate { name, target } => {
                validate_host(name)?;
                let target = target.trim();
                if target.is_empty() {
                    return Err(Error::invalid_input("Redirect target cannot be empty"));
                }
                if !target.starts_with("http://") && !target.starts_with("https://") {
                    return Err(Error::invalid_input(format!(
                        "Redirect target must be an http:// or https:// URL. Got: {}",
                        target
                    )));
                }
                Ok(())
            }
            Change::DnsAdd { records } => {
                if records.is_empty() {
                    return Err(Error::invalid_input("At least one DNS record is required"));
                }
                records.iter().try_for_each(DnsRecord::validate)
            }
            Change::DnsRemove { name, .. } => validate_host(name),
        }
    }
}

/// A DNS record to add
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Record type
    pub record_type: RecordType,

    /// Host name ("@" for the apex)
    #[serde(default = "default_host")]
    pub name: String,

    /// Record value (IP address, host name, text...)
    pub address: String,

    /// Time-to-live in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// MX preference, only meaningful for MX/MXE records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mx_pref: Option<u16>,
}

impl DnsRecord {
    /// Create a record on the apex host with the default TTL
    pub fn new(record_type: RecordType, address: impl Into<String>) -> Self {
        Self {
            record_type,
            name: default_host(),
            address: address.into(),
            ttl: DEFAULT_TTL,
            mx_pref: None,
        }
    }

    /// Set the host name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate the record
    pub fn validate(&self) -> Result<()> {
        validate_host(&self.name)?;
        if self.address.trim().is_empty() {
            return Err(Error::invalid_input(format!(
                "{} record for '{}' needs an address",
                self.record_type, self.name
            )));
        }
        if !(MIN_TTL..=MAX_TTL).contains(&self.ttl) {
            return Err(Error::invalid_input(format!(
                "TTL must be between {} and {} seconds. Got: {}",
                MIN_TTL, MAX_TTL, self.ttl
            )));
        }
        if self.mx_pref.is_some() && !self.record_type.is_mail() {
            return Err(Error::invalid_input(format!(
                "MX preference is only valid for MX/MXE records, not {}",
                self.record_type
            )));
        }
        Ok(())
    }
}

/// DNS record types supported by the registrar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Alias,
    Caa,
    Cname,
    Mx,
    Mxe,
    Ns,
    Srv,
    Txt,
    Url,
}

impl RecordType {
    /// All supported record types
    pub const ALL: [RecordType; 11] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Alias,
        RecordType::Caa,
        RecordType::Cname,
        RecordType::Mx,
        RecordType::Mxe,
        RecordType::Ns,
        RecordType::Srv,
        RecordType::Txt,
        RecordType::Url,
    ];

    /// Registrar name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Alias => "ALIAS",
            RecordType::Caa => "CAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Mxe => "MXE",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
            RecordType::Url => "URL",
        }
    }

    fn is_mail(&self) -> bool {
        matches!(self, RecordType::Mx | RecordType::Mxe)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| Error::invalid_input(format!("Unknown DNS record type: {}", s)))
    }
}

/// Validate a record host name: "@", "*", or dot-separated labels
fn validate_host(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::invalid_input("Record host name cannot be empty"));
    }
    if name == "@" || name == "*" {
        return Ok(());
    }
    let valid = name.split('.').all(|label| {
        !label.is_empty()
            && (label == "*"
                || label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'))
    });
    if !valid {
        return Err(Error::invalid_input(format!(
            "Invalid record host name: '{}'",
            name
        )));
    }
    Ok(())
}

fn default_host() -> String {
    "@".to_string()
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_maps_to_its_kind() {
        assert_eq!(Change::Sync.kind(), JobKind::Sync);
        assert_eq!(Change::redirect("https://a.example").kind(), JobKind::RedirectUpdate);
        assert_eq!(
            Change::DnsRemove {
                record_type: RecordType::Txt,
                name: "@".into()
            }
            .kind(),
            JobKind::DnsRemove
        );
    }

    #[test]
    fn redirect_target_must_be_http_url() {
        assert!(Change::redirect("https://client.example/landing").validate().is_ok());
        assert!(Change::redirect("ftp://client.example").validate().is_err());
        assert!(Change::redirect("   ").validate().is_err());
    }

    #[test]
    fn dns_add_requires_records_with_address_and_sane_ttl() {
        let empty = Change::DnsAdd { records: vec![] };
        assert!(empty.validate().is_err());

        let ok = Change::DnsAdd {
            records: vec![DnsRecord::new(RecordType::A, "192.0.2.10").with_name("www")],
        };
        assert!(ok.validate().is_ok());

        let no_address = DnsRecord::new(RecordType::Cname, " ");
        assert!(no_address.validate().is_err());

        let bad_ttl = DnsRecord::new(RecordType::A, "192.0.2.10").with_ttl(5);
        assert!(bad_ttl.validate().is_err());

        let mut mx_on_a = DnsRecord::new(RecordType::A, "192.0.2.10");
        mx_on_a.mx_pref = Some(10);
        assert!(mx_on_a.validate().is_err());
    }

    #[test]
    fn record_type_parses_case_insensitively() {
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert_eq!(" MXE ".parse::<RecordType>().unwrap(), RecordType::Mxe);
        assert!("SOA".parse::<RecordType>().is_err());
    }

    #[test]
    fn change_serializes_with_type_tag() {
        let change = Change::DnsAdd {
            records: vec![DnsRecord::new(RecordType::Txt, "v=spf1 -all")],
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["type"], "dns_add");
        assert_eq!(json["records"][0]["record_type"], "TXT");
        assert_eq!(json["records"][0]["ttl"], 1800);

        let parsed: Change =
            serde_json::from_str(r#"{"type":"redirect_update","target":"https://x.example"}"#)
                .unwrap();
        assert_eq!(parsed, Change::redirect("https://x.example"));
    }
}
