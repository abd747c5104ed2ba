//! Prefixed ID generation for Till entities.
//!
//! All IDs use a `tl_` brand prefix to guarantee collision avoidance with
//! payment processor IDs (Stripe's `cs_`, `cus_`, `pi_`, etc.).
//!
//! Format: `tl_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["tl_acct_", "tl_gen_", "tl_key_"];

/// Validate that a string is a valid Till prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `tl_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];

    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in Till.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Account,
    Creation,
    ApiKey,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Account => "tl_acct",
            Self::Creation => "tl_gen",
            Self::ApiKey => "tl_key",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
