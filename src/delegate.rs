// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! What a wrapper forwards its primitive operations to.

use crate::contract::{Contract, Dispatch};
use crate::imp::{Backend, BackendObject};
use crate::wrapper::WrapperId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delegate {
    /// A backend object speaking this contract directly.  Holds one backend reference.
    Native(BackendObject),
    /// The execute-buffer adapter over a device object.  Holds one backend reference.
    ExecuteBuffers(BackendObject),
    /// Another wrapper of the same resource, which outlives this one.
    Forward(WrapperId),
}

impl Delegate {
    pub(crate) fn backend_object(&self) -> Option<BackendObject> {
        match self {
            Delegate::Native(object) | Delegate::ExecuteBuffers(object) => Some(*object),
            Delegate::Forward(_) => None,
        }
    }

    /**
    Produces the delegate for a sibling speaking `requested`.

    `self` is the delegate of `owner`.  Returns `None` when no working delegate can be built,
    in which case nothing has been retained.
    */
    pub(crate) fn produce(&self, owner: WrapperId, requested: Contract, backend: &dyn Backend) -> Option<Delegate> {
        match (requested.dispatch(), self.backend_object()) {
            (Dispatch::Native, Some(object)) => {
                backend.retain(object);
                Some(Delegate::Native(object))
            }
            (Dispatch::ExecuteBuffers, Some(object)) => {
                backend.retain(object);
                Some(Delegate::ExecuteBuffers(object))
            }
            (Dispatch::Forwarded, Some(_)) => Some(Delegate::Forward(owner)),
            (_, None) => None,
        }
    }

    /// Gives back whatever backend reference this delegate holds.
    pub(crate) fn release(self, backend: &dyn Backend) {
        if let Some(object) = self.backend_object() {
            backend.release(object);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{DeviceVersion, SurfaceVersion};
    use crate::imp::{ObjectKind, RecordKind, SoftwareBackend};
    use slotmap::SlotMap;

    #[test]
    fn produce_retains_only_for_object_delegates() {
        let backend = SoftwareBackend::new();
        let object = backend.create_object(ObjectKind::Device, "device").unwrap();
        let mut ids: SlotMap<WrapperId, ()> = SlotMap::with_key();
        let owner = ids.insert(());
        let delegate = Delegate::Native(object);

        let forwarded = delegate.produce(owner, Contract::Surface(SurfaceVersion::V1), &backend).unwrap();
        assert_eq!(forwarded, Delegate::Forward(owner));
        assert_eq!(backend.ref_count(object), Some(1));

        let adapter = delegate.produce(owner, Contract::Device(DeviceVersion::V1), &backend).unwrap();
        assert_eq!(adapter, Delegate::ExecuteBuffers(object));
        assert_eq!(backend.ref_count(object), Some(2));
        adapter.release(&backend);
        forwarded.release(&backend);
        delegate.release(&backend);
        assert_eq!(backend.live_objects_of(RecordKind::Object(ObjectKind::Device)), 0);
    }

    #[test]
    fn forward_cannot_produce() {
        let backend = SoftwareBackend::new();
        let mut ids: SlotMap<WrapperId, ()> = SlotMap::with_key();
        let owner = ids.insert(());
        let delegate = Delegate::Forward(owner);
        assert_eq!(delegate.produce(owner, Contract::Device(DeviceVersion::V7), &backend), None);
    }
}
