//! Chain resolution: turns a chain of service references into a chain of full
//! service descriptors, ordered by position.
//!
//! [`ChainResolver::resolve`] is synchronous and side-effect free. The
//! resolver only holds a shared handle to an immutable [`ServiceTable`], so a
//! single instance can be cloned into every concurrent call.
//!
//! ## Algorithm
//!
//! 1. Allocate `chain_len` empty slots.
//! 2. For each element, in the order it appears in the chain:
//!    - look its name up in the table, failing with
//!      [`Error::UnknownService`] if absent;
//!    - check `1 <= position <= chain_len`, failing with
//!      [`Error::InvalidPosition`] otherwise;
//!    - write a copy of the descriptor, tagged with its position, into slot
//!      `position - 1`. A later element with the same position overwrites
//!      the earlier one.
//! 3. Under [`Completeness::Lenient`] unfilled slots are returned empty. Under
//!    [`Completeness::Strict`] they fail the chain with
//!    [`Error::IncompleteChain`].

use crate::{
    Error, Result,
    proto::{ChainSlot, ServiceChain, ServiceChainDescriptor},
    types::{DEFAULT_MAX_CHAIN_LEN, ServiceTable},
};
use std::sync::Arc;

/// What to do with slots no chain element targeted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Completeness {
    /// Return unfilled slots as `ChainSlot { descriptor: None }`.
    #[default]
    Lenient,
    /// Fail with [`Error::IncompleteChain`] when any slot is unfilled.
    Strict,
}

/// Lookup-and-reorder function over a read-only [`ServiceTable`].
#[derive(Clone, Debug)]
pub struct ChainResolver {
    table: Arc<ServiceTable>,
    completeness: Completeness,
    max_chain_len: usize,
}

impl ChainResolver {
    pub fn new(table: ServiceTable) -> Self {
        Self {
            table: Arc::new(table),
            completeness: Completeness::default(),
            max_chain_len: DEFAULT_MAX_CHAIN_LEN,
        }
    }

    #[must_use]
    pub fn with_completeness(mut self, completeness: Completeness) -> Self {
        self.completeness = completeness;
        self
    }

    #[must_use]
    pub fn with_max_chain_len(mut self, max_chain_len: usize) -> Self {
        self.max_chain_len = max_chain_len;
        self
    }

    pub fn table(&self) -> &ServiceTable {
        &self.table
    }

    pub const fn completeness(&self) -> Completeness {
        self.completeness
    }

    /// Resolves `chain` into a descriptor whose slot `i` holds the service at
    /// position `i + 1`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidChainLength`] if `chain_len` is negative or above the
    ///   configured maximum.
    /// - [`Error::UnknownService`] for the first element whose name is not in
    ///   the table.
    /// - [`Error::InvalidPosition`] for the first element positioned outside
    ///   `[1, chain_len]`.
    /// - [`Error::IncompleteChain`] under [`Completeness::Strict`] when a slot
    ///   is left unfilled.
    ///
    /// No partial descriptor is ever returned alongside an error.
    pub fn resolve(&self, chain: &ServiceChain) -> Result<ServiceChainDescriptor> {
        let chain_len = usize::try_from(chain.chain_len)
            .ok()
            .filter(|len| *len <= self.max_chain_len)
            .ok_or_else(|| Error::InvalidChainLength {
                chain_id: chain.chain_id,
                chain_len: chain.chain_len,
                max: self.max_chain_len,
            })?;

        let mut slots = vec![ChainSlot::default(); chain_len];

        for svc in &chain.chain {
            let Some(found) = self.table.get(&svc.svc_name) else {
                return Err(Error::UnknownService {
                    service_name: svc.svc_name.clone(),
                    chain_id: chain.chain_id,
                });
            };

            let slot = usize::try_from(svc.svc_pos)
                .ok()
                .filter(|pos| (1..=chain_len).contains(pos))
                .ok_or_else(|| Error::InvalidPosition {
                    service_name: svc.svc_name.clone(),
                    chain_id: chain.chain_id,
                    position: svc.svc_pos,
                    chain_len: chain.chain_len,
                })?
                - 1;

            let mut descriptor = found.clone();
            descriptor.svc_pos = svc.svc_pos;
            slots[slot].descriptor = Some(descriptor);
        }

        if self.completeness == Completeness::Strict {
            let missing_positions: Vec<i32> = (1..=chain.chain_len)
                .zip(&slots)
                .filter(|(_, slot)| slot.descriptor.is_none())
                .map(|(pos, _)| pos)
                .collect();

            if !missing_positions.is_empty() {
                return Err(Error::IncompleteChain {
                    chain_id: chain.chain_id,
                    missing_positions,
                });
            }
        }

        Ok(ServiceChainDescriptor {
            chain_id: chain.chain_id,
            chain_len: chain.chain_len,
            chain_desc: slots,
        })
    }
}
