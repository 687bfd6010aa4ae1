//! Authenticated identity
//!
//! An [`Identity`] is the claim set produced by a composite authenticator and inserted
//! into request extensions for handlers.

use aperture_const::{
    CLAIM_TRUE, LOCAL_NAME_IDENTIFIER, NAME_CLAIM, NAME_IDENTIFIER_CLAIM, TELEMETRY_CLAIM,
    UNSECURED_CLAIM,
};
use serde::{Deserialize, Serialize};

/// A single name/value claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type
    pub name: String,
    /// Claim value
    pub value: String,
}

impl Claim {
    /// Create a claim
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Claims produced by a successful authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    authentication_type: String,
    claims: Vec<Claim>,
}

impl Identity {
    /// Empty identity for the given authentication type
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            claims: Vec::new(),
        }
    }

    /// Identity for an anonymous caller
    pub fn unsecured() -> Self {
        Self::new("unsecured")
            .with_claim(NAME_IDENTIFIER_CLAIM, LOCAL_NAME_IDENTIFIER)
            .with_claim(UNSECURED_CLAIM, CLAIM_TRUE)
    }

    /// Identity synthesized after the telemetry chain passes
    pub fn telemetry() -> Self {
        Self::new("telemetry").with_claim(TELEMETRY_CLAIM, CLAIM_TRUE)
    }

    /// Add a claim
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push(Claim::new(name, value));
        self
    }

    /// Add several claims
    pub fn with_claims(mut self, claims: impl IntoIterator<Item = Claim>) -> Self {
        self.claims.extend(claims);
        self
    }

    /// How the identity was established
    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }

    /// All claims in insertion order
    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    /// Whether any claim of this type exists
    pub fn has_claim(&self, name: &str) -> bool {
        self.claims.iter().any(|claim| claim.name == name)
    }

    /// Value of the first claim of this type
    pub fn claim_value(&self, name: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|claim| claim.name == name)
            .map(|claim| claim.value.as_str())
    }

    /// Display name, when known
    pub fn name(&self) -> Option<&str> {
        self.claim_value(NAME_CLAIM)
    }
}
