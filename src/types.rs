use colored::Colorize;
use stack_types::ConstructionError;
use std::{error::Error, fmt::Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    DefaultNetwork,
    PublicSubnet,
    MachineImage,
    HostedZone,
}

impl Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lookup::DefaultNetwork => "default network",
            Lookup::PublicSubnet => "public subnet",
            Lookup::MachineImage => "machine image",
            Lookup::HostedZone => "hosted zone",
        };
        f.write_str(s)
    }
}

/// A referenced external resource was not found, was ambiguous or could not
/// be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    pub lookup: Lookup,
    pub identifier: String,
    pub reason: String,
}

impl LookupError {
    pub fn new(lookup: Lookup, identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        LookupError {
            lookup,
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}

impl Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} lookup for '{}' failed: {}",
            self.lookup, self.identifier, self.reason
        )
    }
}

impl Error for LookupError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    Lookup(LookupError),
    Construction(ConstructionError),
}

impl Display for StackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackError::Lookup(e) => write!(f, "{}", e),
            StackError::Construction(e) => write!(f, "{}", e),
        }
    }
}

impl Error for StackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StackError::Lookup(e) => Some(e),
            StackError::Construction(e) => Some(e),
        }
    }
}

impl From<LookupError> for StackError {
    fn from(value: LookupError) -> Self {
        StackError::Lookup(value)
    }
}

impl From<ConstructionError> for StackError {
    fn from(value: ConstructionError) -> Self {
        StackError::Construction(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub message: String,
    pub severity: Severity,
}

impl VerificationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        VerificationResult {
            message: message.into(),
            severity: Severity::Ok,
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        VerificationResult {
            message: message.into(),
            severity: Severity::Critical,
        }
    }
}

impl Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Ok => f.write_str(&self.message.green().to_string()),
            Severity::Warning => f.write_str(&self.message.yellow().to_string()),
            Severity::Critical => f.write_str(&self.message.red().to_string()),
        }
    }
}

pub trait Verifier {
    fn verify(&self) -> Vec<VerificationResult>;
}
