//! JSON fixtures that seed the server's service table and the client's chain
//! list.
//!
//! Both files are JSON arrays of wire messages using their protobuf field
//! names, e.g.
//!
//! ```json
//! [{ "svc_name": "svcA", "svc_desc": "This is service A", "svc_pos": 0 }]
//! ```
//!
//! and
//!
//! ```json
//! [{ "chain_id": 1, "chain_len": 2,
//!    "chain": [{ "svc_name": "svcA", "svc_pos": 1 }, { "svc_name": "svcB", "svc_pos": 2 }] }]
//! ```
//!
//! Missing fields take their protobuf default.

use crate::proto::{ServiceChain, ServiceDescriptor};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Failure to read or decode a fixture file.
#[derive(thiserror::Error, Debug)]
pub enum FixtureError {
    #[error("failed to read fixture {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixture {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads the service descriptors used to build a
/// [`ServiceTable`](crate::types::ServiceTable).
pub fn load_services(path: impl AsRef<Path>) -> Result<Vec<ServiceDescriptor>, FixtureError> {
    load_json(path.as_ref())
}

/// Loads the chains a client cycles through.
pub fn load_chains(path: impl AsRef<Path>) -> Result<Vec<ServiceChain>, FixtureError> {
    load_json(path.as_ref())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FixtureError> {
    let raw = std::fs::read(path).map_err(|source| FixtureError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&raw).map_err(|source| FixtureError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
