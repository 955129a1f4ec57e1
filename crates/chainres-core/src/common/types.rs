//! # Service Table and Protocol Constants
//!
//! The [`ServiceTable`] maps service names to their full
//! [`ServiceDescriptor`]. It is built once, when the server starts, and never
//! mutated afterwards: every concurrent call reads it through a shared
//! reference without locking.

use crate::proto::ServiceDescriptor;
use std::collections::HashMap;

/// Port the server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 8082;

/// Upper bound on `chain_len` accepted by the resolver unless configured
/// otherwise. Slots are allocated up front, so this bounds per-call memory.
pub const DEFAULT_MAX_CHAIN_LEN: usize = 1024;

/// Immutable lookup table from service name to descriptor.
///
/// Names are unique: when the source yields the same name twice, the later
/// descriptor replaces the earlier one.
#[derive(Clone, Debug, Default)]
pub struct ServiceTable {
    services: HashMap<String, ServiceDescriptor>,
}

impl ServiceTable {
    /// Returns the descriptor registered under `name`.
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl FromIterator<ServiceDescriptor> for ServiceTable {
    fn from_iter<I: IntoIterator<Item = ServiceDescriptor>>(iter: I) -> Self {
        let services = iter
            .into_iter()
            .map(|descriptor| (descriptor.svc_name.clone(), descriptor))
            .collect();
        Self { services }
    }
}
