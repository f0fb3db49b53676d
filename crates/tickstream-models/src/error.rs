use thiserror::Error;

use crate::topology::HostRole;

/// Fatal problems with the deployment topology. Never retried.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Cannot read topology file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed topology document: {0}")]
    Malformed(String),

    #[error("Topology must list exactly {expected} cloud hosts, found {found}")]
    HostCount { expected: usize, found: usize },

    #[error("Cloud host {index} has an empty public address")]
    MissingAddress { index: usize },

    #[error("Cloud host {index} declares role {declared:?} but its position requires {expected:?}")]
    RoleMismatch {
        index: usize,
        declared: HostRole,
        expected: HostRole,
    },
}
