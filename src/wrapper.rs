// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Client-facing wrapper handles.

A [`Wrapper`] names one (resource, contract generation) pair.  Handles are cheap to clone and
carry no reference count of their own; the legacy count is driven explicitly with
[`Wrapper::acquire`] and [`Wrapper::release`], and a handle whose wrapper was torn down reports
`InvalidArgument` from every operation.

The typed handles ([`Surface`](crate::Surface), [`Device`](crate::Device), ...) are the same thing
with the family fixed.
*/

use crate::config::Config;
use crate::contract::{Contract, Family};
use crate::error::{Error, Result};
use crate::imp::Backend;
use crate::refcount::RefDiscipline;
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::state::{ResourceCaps, ResourceId};
use crate::{lifecycle, resolver};
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

slotmap::new_key_type! {
    /// Identity of one wrapper.
    pub struct WrapperId;
}

#[derive(Clone)]
pub struct Wrapper {
    runtime: Arc<Runtime>,
    id: WrapperId,
}

impl Debug for Wrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper").field("id", &self.id).finish()
    }
}

impl PartialEq for Wrapper {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.runtime, &other.runtime)
    }
}
impl Eq for Wrapper {}

impl Hash for Wrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.runtime).hash(state);
        self.id.hash(state);
    }
}

impl Wrapper {
    pub(crate) fn new(runtime: Arc<Runtime>, id: WrapperId) -> Self {
        Wrapper { runtime, id }
    }

    /// A handle to another wrapper of the same runtime.
    pub(crate) fn sibling_handle(&self, id: WrapperId) -> Wrapper {
        Wrapper::new(self.runtime.clone(), id)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Registry) -> Result<R>) -> Result<R> {
        let registry = self.runtime.registry();
        f(&*registry)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Registry, &dyn Backend, &Config) -> Result<R>) -> Result<R> {
        let mut registry = self.runtime.registry();
        f(&mut *registry, self.runtime.backend().as_ref(), self.runtime.config())
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn is_alive(&self) -> bool {
        self.runtime.registry().wrappers.contains_key(self.id)
    }

    pub fn contract(&self) -> Result<Contract> {
        self.read(|registry| Ok(registry.wrapper(self.id)?.contract))
    }

    pub fn family(&self) -> Result<Family> {
        Ok(self.contract()?.family())
    }

    /// The identity of the logical resource behind this wrapper.
    pub fn resource_id(&self) -> Result<ResourceId> {
        self.read(|registry| registry.resource_of(self.id))
    }

    pub fn caps(&self) -> Result<ResourceCaps> {
        self.read(|registry| Ok(registry.state_of(self.id)?.caps))
    }

    /// Whether both wrappers view the same logical resource.
    pub fn same_resource(&self, other: &Wrapper) -> Result<bool> {
        Ok(self.resource_id()? == other.resource_id()?)
    }

    /**
    Asks for another contract on this resource (or a resource linked to it).

    Returns an acquired wrapper: the same one for the same contract, the cached sibling if that
    contract was handed out before, or a freshly built sibling with a count of one.
    */
    pub fn query(&self, requested: Contract) -> Result<Wrapper> {
        let id = self.write(|registry, backend, config| resolver::resolve(registry, backend, config, self.id, requested))?;
        Ok(self.sibling_handle(id))
    }

    /// Increments the effective reference count, returning the new count.
    pub fn acquire(&self) -> Result<u32> {
        self.read(|registry| registry.acquire(self.id))
    }

    /// Decrements the effective reference count, tearing down at zero.  Returns the new count.
    pub fn release(&self) -> Result<u32> {
        self.write(|registry, backend, _| lifecycle::release(registry, backend, self.id))
    }

    pub fn ref_count(&self) -> Result<u32> {
        self.read(|registry| registry.ref_count(self.id))
    }

    pub fn discipline(&self) -> Result<RefDiscipline> {
        self.read(|registry| Ok(registry.wrapper(self.id)?.discipline.kind()))
    }

    /// Fails unless this wrapper's generation is at least `minimum`'s.
    pub(crate) fn require(&self, minimum: Contract) -> Result<Contract> {
        let contract = self.contract()?;
        if contract.family() == minimum.family() && contract.generation() >= minimum.generation() {
            Ok(contract)
        } else {
            Err(Error::unsupported(contract, minimum))
        }
    }

    /// Fails unless this wrapper's generation is one of `allowed`.
    pub(crate) fn require_one_of(&self, allowed: &[Contract]) -> Result<Contract> {
        let contract = self.contract()?;
        match allowed.iter().find(|c| **c == contract) {
            Some(_) => Ok(contract),
            None => Err(Error::unsupported(contract, allowed.first().copied().unwrap_or(contract))),
        }
    }
}

macro_rules! typed_wrapper {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $version:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) $crate::wrapper::Wrapper);

        impl $name {
            pub fn version(&self) -> $crate::error::Result<$crate::contract::$version> {
                match self.0.contract()? {
                    $crate::contract::Contract::$variant(version) => Ok(version),
                    _ => Err($crate::error::Error::inconsistency(concat!("handle is not a ", stringify!($name)))),
                }
            }

            /// Another generation of this same resource.
            pub fn as_version(&self, version: $crate::contract::$version) -> $crate::error::Result<$name> {
                let wrapper = self.0.query($crate::contract::Contract::$variant(version))?;
                Ok($name(wrapper))
            }

            pub fn wrapper(&self) -> &$crate::wrapper::Wrapper {
                &self.0
            }

            pub fn into_wrapper(self) -> $crate::wrapper::Wrapper {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = $crate::wrapper::Wrapper;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl TryFrom<$crate::wrapper::Wrapper> for $name {
            type Error = $crate::error::Error;
            fn try_from(wrapper: $crate::wrapper::Wrapper) -> $crate::error::Result<Self> {
                match wrapper.contract()? {
                    $crate::contract::Contract::$variant(_) => Ok($name(wrapper)),
                    _ => Err($crate::error::Error::InvalidArgument(concat!("wrapper is not a ", stringify!($name)))),
                }
            }
        }

        impl From<$name> for $crate::wrapper::Wrapper {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }
    };
}

pub(crate) use typed_wrapper;
