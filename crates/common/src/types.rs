//! Core types for guacpool

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

// ============================================================================
// Groups
// ============================================================================

/// A named group that owns pool addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Group plus usage counters, as shown in listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: Group,
    pub address_count: i64,
    pub available_count: i64,
}

// ============================================================================
// Addresses
// ============================================================================

/// One persisted address in the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRow {
    pub id: i64,
    pub address: Ipv4Addr,
    pub group: String,
    pub gateway: Option<Ipv4Addr>,
    /// Whether end users may claim this address through self-service
    pub available_for_user: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Writable fields of an address row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAddress {
    pub address: Ipv4Addr,
    pub group: String,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub available_for_user: bool,
}

/// Listing filter; `None` fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressFilter {
    pub group: Option<String>,
    pub available_for_user: Option<bool>,
}

// ============================================================================
// Bulk allocation
// ============================================================================

/// One `{amount, group, start_address?, gateway?}` entry of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub amount: u32,
    pub group: String,
    #[serde(default)]
    pub start_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
}

impl AllocationEntry {
    pub fn new(amount: u32, group: impl Into<String>) -> Self {
        Self {
            amount,
            group: group.into(),
            start_address: None,
            gateway: None,
        }
    }

    pub fn starting_at(mut self, start: Ipv4Addr) -> Self {
        self.start_address = Some(start);
        self
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }
}

/// Bulk-create request. When `addresses` is present they are used verbatim
/// (explicit mode); otherwise addresses are synthesized from each entry's
/// start address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub total: u32,
    pub allocations: Vec<AllocationEntry>,
    #[serde(default)]
    pub addresses: Option<Vec<Ipv4Addr>>,
}

/// How a validated request obtains its addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    Explicit,
    Synthesis,
}

impl std::fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}
