//! Claim-based authorization, one policy per surface

use std::fmt;

use aperture_config::FrontendAuth;
use aperture_const::{BROWSER_TOKEN_CLAIM, CLAIM_TRUE, TELEMETRY_CLAIM, UNSECURED_CLAIM};

use crate::error::AuthError;
use crate::identity::Identity;

/// Claim condition an identity must meet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimRequirement {
    /// Any authenticated identity
    Authenticated,
    /// A claim of this type with any value
    Present(String),
    /// A claim of this type with exactly this value
    Value {
        /// Claim type
        name: String,
        /// Required value
        value: String,
    },
}

impl ClaimRequirement {
    /// Whether `identity` meets the requirement
    pub fn is_satisfied_by(&self, identity: &Identity) -> bool {
        match self {
            ClaimRequirement::Authenticated => true,
            ClaimRequirement::Present(name) => identity.has_claim(name),
            ClaimRequirement::Value { name, value } => identity
                .claims()
                .iter()
                .any(|claim| claim.name == *name && claim.value == *value),
        }
    }
}

impl fmt::Display for ClaimRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimRequirement::Authenticated => f.write_str("authenticated user"),
            ClaimRequirement::Present(name) => write!(f, "claim '{name}'"),
            ClaimRequirement::Value { name, value } => write!(f, "claim '{name}' = '{value}'"),
        }
    }
}

/// Authorization policy for one surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfacePolicy {
    requirement: ClaimRequirement,
}

impl SurfacePolicy {
    /// Policy with an explicit requirement
    pub fn new(requirement: ClaimRequirement) -> Self {
        Self { requirement }
    }

    /// Telemetry policy: the telemetry claim must be `true`
    pub fn telemetry() -> Self {
        Self::new(ClaimRequirement::Value {
            name: TELEMETRY_CLAIM.to_string(),
            value: CLAIM_TRUE.to_string(),
        })
    }

    /// Interactive policy for the configured mode
    pub fn interactive(auth: &FrontendAuth) -> Self {
        let requirement = match auth {
            FrontendAuth::Unsecured => ClaimRequirement::Present(UNSECURED_CLAIM.to_string()),
            FrontendAuth::BrowserToken { .. } => {
                ClaimRequirement::Present(BROWSER_TOKEN_CLAIM.to_string())
            }
            FrontendAuth::OpenIdConnect(oidc) => match &oidc.required_claim {
                Some(required) => match &required.value {
                    Some(value) => ClaimRequirement::Value {
                        name: required.claim_type.clone(),
                        value: value.clone(),
                    },
                    None => ClaimRequirement::Present(required.claim_type.clone()),
                },
                None => ClaimRequirement::Authenticated,
            },
        };
        Self::new(requirement)
    }

    /// The requirement
    pub fn requirement(&self) -> &ClaimRequirement {
        &self.requirement
    }

    /// Decide whether `identity` may proceed
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] naming the unmet requirement.
    pub fn authorize(&self, identity: &Identity) -> Result<(), AuthError> {
        if self.requirement.is_satisfied_by(identity) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!("{} required", self.requirement)))
        }
    }
}
