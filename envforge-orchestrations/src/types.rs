//! Input and output types for envforge orchestrations

use envforge_models::{CustomizeEnv, EnvironmentRecord};
use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

// ============================================================================
// Init Environment Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitEnvironmentInput {
    /// Parent application name
    pub app: String,
    /// Environment name
    pub name: String,
    /// Mark the environment as production
    pub prod: bool,
    /// Imported or adjusted VPC settings (None = default network)
    pub custom_config: Option<CustomizeEnv>,
}

impl InitEnvironmentInput {
    pub fn validate(&self) -> Result<(), EnvironmentError> {
        validate_environment_name(&self.name)?;
        let Some(config) = &self.custom_config else {
            return Ok(());
        };
        if config.import_vpc.is_some() && config.adjust_vpc.is_some() {
            return Err(EnvironmentError::InvalidInput(
                "cannot specify both import vpc flags and configure vpc flags".to_string(),
            ));
        }
        if let Some(import) = &config.import_vpc {
            if import.id.is_empty() {
                return Err(EnvironmentError::InvalidInput("imported VPC ID must not be empty".to_string()));
            }
        }
        if let Some(adjust) = &config.adjust_vpc {
            if !adjust.cidr.is_empty() {
                validate_cidr(&adjust.cidr)?;
            }
            for cidr in adjust.public_subnet_cidrs.iter().chain(&adjust.private_subnet_cidrs) {
                validate_cidr(cidr)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitEnvironmentOutput {
    /// Record persisted for the environment
    pub record: EnvironmentRecord,
    /// False when the stack already existed from an earlier run
    pub stack_created: bool,
}

// ============================================================================
// Delete Environment Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteEnvironmentInput {
    /// Parent application name
    pub app: String,
    /// Environment name
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteEnvironmentOutput {
    pub app: String,
    pub name: String,
    /// Whether a legacy template had to be patched with retain policies
    pub retain_policy_added: bool,
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Lowercase alphanumerics and hyphens, starting with a letter, at most 63 chars.
pub fn validate_environment_name(name: &str) -> Result<(), EnvironmentError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(EnvironmentError::InvalidInput(format!(
            "environment name {} is invalid: value must start with a letter, contain only lower-case letters, numbers, and hyphens, and have no more than 63 characters",
            name
        )))
    }
}

/// IPv4 CIDR block in `a.b.c.d/n` form.
pub fn validate_cidr(cidr: &str) -> Result<(), EnvironmentError> {
    let invalid = || EnvironmentError::InvalidInput(format!("{} is not a valid IPv4 CIDR block", cidr));
    let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    address.parse::<std::net::Ipv4Addr>().map_err(|_| invalid())?;
    match prefix.parse::<u8>() {
        Ok(bits) if bits <= 32 => Ok(()),
        _ => Err(invalid()),
    }
}
