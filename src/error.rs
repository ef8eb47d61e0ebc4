// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The crate's error type.

use crate::contract::Contract;
use crate::imp;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested contract can't be produced from this resource.
    #[error("{requested} is not available from {from}")]
    UnsupportedCapability { from: Contract, requested: Contract },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("resource already bound: {0}")]
    ResourceAlreadyBound(&'static str),
    #[error("resource has no owner: {0}")]
    ResourceHasNoOwner(&'static str),
    #[error("backend couldn't create a resource: {0}")]
    BackendResourceCreationFailed(#[from] imp::Error),
    /// A cross-reference that should exist doesn't.  Always a bug in this crate.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(&'static str),
}

impl Error {
    /// Builds an [`Error::InternalInconsistency`], logging it.
    pub(crate) fn inconsistency(what: &'static str) -> Error {
        log::error!("internal inconsistency: {what}");
        Error::InternalInconsistency(what)
    }

    pub(crate) fn unsupported(from: Contract, requested: Contract) -> Error {
        Error::UnsupportedCapability { from, requested }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
