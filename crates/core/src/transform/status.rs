//! Status normalization
//!
//! Legacy rows carry free-form status tokens in English and Italian. Each
//! status enum has an exhaustive token table and exactly one default for
//! tokens the table does not know.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Draft,
    #[default]
    Confirmed,
    Invoiced,
    Paid,
    Cancelled,
}

const SALE_TOKENS: &[(&str, SaleStatus)] = &[
    ("draft", SaleStatus::Draft),
    ("bozza", SaleStatus::Draft),
    ("new", SaleStatus::Draft),
    ("nuovo", SaleStatus::Draft),
    ("to verify", SaleStatus::Draft),
    ("da verificare", SaleStatus::Draft),
    ("proforma", SaleStatus::Draft),
    ("confirmed", SaleStatus::Confirmed),
    ("confermato", SaleStatus::Confirmed),
    ("confermata", SaleStatus::Confirmed),
    ("conf", SaleStatus::Confirmed),
    ("ready", SaleStatus::Confirmed),
    ("open", SaleStatus::Confirmed),
    ("invoiced", SaleStatus::Invoiced),
    ("fatturato", SaleStatus::Invoiced),
    ("fatturata", SaleStatus::Invoiced),
    ("sent", SaleStatus::Invoiced),
    ("inviato", SaleStatus::Invoiced),
    ("paid", SaleStatus::Paid),
    ("pagato", SaleStatus::Paid),
    ("pagata", SaleStatus::Paid),
    ("saldato", SaleStatus::Paid),
    ("cancelled", SaleStatus::Cancelled),
    ("canceled", SaleStatus::Cancelled),
    ("annullato", SaleStatus::Cancelled),
    ("annullata", SaleStatus::Cancelled),
    ("deleted", SaleStatus::Cancelled),
];

impl SaleStatus {
    pub const NAMES: &'static [&'static str] = &["draft", "confirmed", "invoiced", "paid", "cancelled"];

    /// Map a source token; unknown or absent tokens give the default
    pub fn from_token(token: Option<&str>) -> Self {
        token
            .map(normalize_token)
            .and_then(|token| {
                SALE_TOKENS
                    .iter()
                    .find(|(known, _)| *known == token)
                    .map(|(_, status)| *status)
            })
            .unwrap_or_default()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
            Self::Invoiced => "invoiced",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether an invoice exists for a sale in this status
    pub fn implies_invoice(&self) -> bool {
        matches!(self, Self::Invoiced | Self::Paid)
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a buyer or producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    #[default]
    Active,
    Inactive,
}

const PARTY_ONLINE_TOKENS: &[&str] = &["online", "active", "attivo", "attiva", "enabled"];

impl PartyStatus {
    pub const NAMES: &'static [&'static str] = &["active", "inactive"];

    /// Map a source token, falling back to the enabled flag when there is none
    ///
    /// Only online-equivalent tokens are active; every other token is inactive.
    pub fn from_token(token: Option<&str>, enabled: Option<bool>) -> Self {
        match token.map(normalize_token) {
            Some(token) if !token.is_empty() => {
                if PARTY_ONLINE_TOKENS.contains(&token.as_str()) {
                    Self::Active
                } else {
                    Self::Inactive
                }
            }
            _ => {
                if enabled.unwrap_or(true) {
                    Self::Active
                } else {
                    Self::Inactive
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for PartyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercase, trim and collapse separators so `To_Verify` matches `to verify`
fn normalize_token(token: &str) -> String {
    token
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_tokens_case_insensitive() {
        assert_eq!(SaleStatus::from_token(Some("PAGATO")), SaleStatus::Paid);
        assert_eq!(SaleStatus::from_token(Some("  Sent ")), SaleStatus::Invoiced);
        assert_eq!(SaleStatus::from_token(Some("To_Verify")), SaleStatus::Draft);
        assert_eq!(SaleStatus::from_token(Some("annullata")), SaleStatus::Cancelled);
    }

    #[test]
    fn test_sale_unknown_and_absent_default() {
        assert_eq!(SaleStatus::from_token(Some("mystery")), SaleStatus::Confirmed);
        assert_eq!(SaleStatus::from_token(None), SaleStatus::Confirmed);
        assert_eq!(SaleStatus::from_token(Some("")), SaleStatus::Confirmed);
    }

    #[test]
    fn test_sale_mapping_is_deterministic() {
        for (token, status) in SALE_TOKENS {
            assert_eq!(SaleStatus::from_token(Some(*token)), *status);
            assert_eq!(SaleStatus::from_token(Some(token.to_uppercase().as_str())), *status);
            assert!(SaleStatus::NAMES.contains(&status.name()));
        }
    }

    #[test]
    fn test_party_tokens() {
        assert_eq!(PartyStatus::from_token(Some("Online"), None), PartyStatus::Active);
        assert_eq!(PartyStatus::from_token(Some("ATTIVO"), Some(false)), PartyStatus::Active);
        assert_eq!(PartyStatus::from_token(Some("offline"), None), PartyStatus::Inactive);
        assert_eq!(PartyStatus::from_token(Some("whatever"), Some(true)), PartyStatus::Inactive);
    }

    #[test]
    fn test_party_absent_token_uses_enabled() {
        assert_eq!(PartyStatus::from_token(None, None), PartyStatus::Active);
        assert_eq!(PartyStatus::from_token(None, Some(false)), PartyStatus::Inactive);
        assert_eq!(PartyStatus::from_token(Some("  "), Some(true)), PartyStatus::Active);
    }

    #[test]
    fn test_invoice_implied() {
        assert!(SaleStatus::Paid.implies_invoice());
        assert!(SaleStatus::Invoiced.implies_invoice());
        assert!(!SaleStatus::Confirmed.implies_invoice());
    }
}
