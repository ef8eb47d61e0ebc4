// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Contract identities.

Every resource kind is reachable through several numbered generations of its calling contract.
A [`Contract`] names exactly one (family, generation) pair; the generation number is the one
the legacy API used, so gaps are expected (there is no context generation 3).
*/

use std::fmt::{Display, Formatter};

/// The resource kind a contract belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Context,
    Scene,
    Surface,
    Texture,
    Device,
    Viewport,
    Light,
    Material,
}

impl Family {
    /// The newest generation of this family, which the backend speaks natively.
    pub fn native(self) -> Contract {
        match self {
            Family::Context => Contract::Context(ContextVersion::V7),
            Family::Scene => Contract::Scene(SceneVersion::V7),
            Family::Surface => Contract::Surface(SurfaceVersion::V7),
            Family::Texture => Contract::Texture(TextureVersion::V2),
            Family::Device => Contract::Device(DeviceVersion::V7),
            Family::Viewport => Contract::Viewport(ViewportVersion::V3),
            Family::Light => Contract::Light(LightVersion::V1),
            Family::Material => Contract::Material(MaterialVersion::V3),
        }
    }
}

macro_rules! versions {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $generation:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant = $generation),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn generation(self) -> u8 {
                self as u8
            }

            pub fn from_generation(generation: u8) -> Option<Self> {
                match generation {
                    $($generation => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

versions!(
    /// Context contract generations.
    ContextVersion { V1 = 1, V2 = 2, V4 = 4, V7 = 7 }
);
versions!(
    /// Scene contract generations.
    SceneVersion { V1 = 1, V2 = 2, V3 = 3, V7 = 7 }
);
versions!(
    /// Surface contract generations.
    SurfaceVersion { V1 = 1, V2 = 2, V3 = 3, V4 = 4, V7 = 7 }
);
versions!(
    /// Texture contract generations.
    TextureVersion { V1 = 1, V2 = 2 }
);
versions!(
    /// Device contract generations.
    ///
    /// Generations 1 and 2 submit execute buffers; generations 3 and 7 issue primitives directly.
    DeviceVersion { V1 = 1, V2 = 2, V3 = 3, V7 = 7 }
);
versions!(
    /// Viewport contract generations.
    ViewportVersion { V1 = 1, V2 = 2, V3 = 3 }
);
versions!(
    LightVersion { V1 = 1 }
);
versions!(
    /// Material contract generations.
    MaterialVersion { V1 = 1, V2 = 2, V3 = 3 }
);

/// A (family, generation) pair identifying one calling contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Contract {
    Context(ContextVersion),
    Scene(SceneVersion),
    Surface(SurfaceVersion),
    Texture(TextureVersion),
    Device(DeviceVersion),
    Viewport(ViewportVersion),
    Light(LightVersion),
    Material(MaterialVersion),
}

/// How calls through a contract reach the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// The backend speaks this contract directly.
    Native,
    /// Calls arrive as execute buffers and are translated into backend commands.
    ExecuteBuffers,
    /// Calls are forwarded to the resource's owning wrapper.
    Forwarded,
}

impl Contract {
    pub fn family(&self) -> Family {
        match self {
            Contract::Context(_) => Family::Context,
            Contract::Scene(_) => Family::Scene,
            Contract::Surface(_) => Family::Surface,
            Contract::Texture(_) => Family::Texture,
            Contract::Device(_) => Family::Device,
            Contract::Viewport(_) => Family::Viewport,
            Contract::Light(_) => Family::Light,
            Contract::Material(_) => Family::Material,
        }
    }

    pub fn generation(&self) -> u8 {
        match self {
            Contract::Context(v) => v.generation(),
            Contract::Scene(v) => v.generation(),
            Contract::Surface(v) => v.generation(),
            Contract::Texture(v) => v.generation(),
            Contract::Device(v) => v.generation(),
            Contract::Viewport(v) => v.generation(),
            Contract::Light(v) => v.generation(),
            Contract::Material(v) => v.generation(),
        }
    }

    /// Builds the contract for `generation` within `family`, if that generation exists.
    pub fn new(family: Family, generation: u8) -> Option<Contract> {
        Some(match family {
            Family::Context => Contract::Context(ContextVersion::from_generation(generation)?),
            Family::Scene => Contract::Scene(SceneVersion::from_generation(generation)?),
            Family::Surface => Contract::Surface(SurfaceVersion::from_generation(generation)?),
            Family::Texture => Contract::Texture(TextureVersion::from_generation(generation)?),
            Family::Device => Contract::Device(DeviceVersion::from_generation(generation)?),
            Family::Viewport => Contract::Viewport(ViewportVersion::from_generation(generation)?),
            Family::Light => Contract::Light(LightVersion::from_generation(generation)?),
            Family::Material => Contract::Material(MaterialVersion::from_generation(generation)?),
        })
    }

    /// Every contract generation of every family.
    pub fn all() -> impl Iterator<Item = Contract> {
        ContextVersion::ALL
            .iter()
            .map(|v| Contract::Context(*v))
            .chain(SceneVersion::ALL.iter().map(|v| Contract::Scene(*v)))
            .chain(SurfaceVersion::ALL.iter().map(|v| Contract::Surface(*v)))
            .chain(TextureVersion::ALL.iter().map(|v| Contract::Texture(*v)))
            .chain(DeviceVersion::ALL.iter().map(|v| Contract::Device(*v)))
            .chain(ViewportVersion::ALL.iter().map(|v| Contract::Viewport(*v)))
            .chain(LightVersion::ALL.iter().map(|v| Contract::Light(*v)))
            .chain(MaterialVersion::ALL.iter().map(|v| Contract::Material(*v)))
    }

    pub(crate) fn dispatch(&self) -> Dispatch {
        match self {
            Contract::Device(DeviceVersion::V1 | DeviceVersion::V2) => Dispatch::ExecuteBuffers,
            other if *other == other.family().native() => Dispatch::Native,
            _ => Dispatch::Forwarded,
        }
    }
}

impl Display for Contract {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/v{}", self.family(), self.generation())
    }
}

/// Indexes one wrapper per generation, generations 1 through 7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VersionSlots<T> {
    slots: [Option<T>; 8],
}

impl<T: Copy + PartialEq> VersionSlots<T> {
    pub(crate) fn new() -> Self {
        VersionSlots { slots: [None; 8] }
    }
    pub(crate) fn get(&self, generation: u8) -> Option<T> {
        self.slots.get(generation as usize).copied().flatten()
    }
    pub(crate) fn set(&mut self, generation: u8, value: T) {
        if let Some(slot) = self.slots.get_mut(generation as usize) {
            *slot = Some(value);
        }
    }
    /// Clears the slot only if it still holds `value`.
    pub(crate) fn clear_if(&mut self, generation: u8, value: T) -> bool {
        match self.slots.get_mut(generation as usize) {
            Some(slot) if *slot == Some(value) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
    pub(crate) fn occupied(&self) -> impl Iterator<Item = (u8, T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(generation, slot)| slot.map(|value| (generation as u8, value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_round_trip_rejects_gaps() {
        assert_eq!(ContextVersion::from_generation(3), None);
        assert_eq!(Contract::new(Family::Surface, 4), Some(Contract::Surface(SurfaceVersion::V4)));
        assert_eq!(Contract::new(Family::Light, 2), None);
    }

    #[test]
    fn dispatch_classification() {
        assert_eq!(Contract::Device(DeviceVersion::V1).dispatch(), Dispatch::ExecuteBuffers);
        assert_eq!(Contract::Device(DeviceVersion::V7).dispatch(), Dispatch::Native);
        assert_eq!(Contract::Device(DeviceVersion::V3).dispatch(), Dispatch::Forwarded);
        assert_eq!(Contract::Surface(SurfaceVersion::V7).dispatch(), Dispatch::Native);
        assert_eq!(Contract::Surface(SurfaceVersion::V1).dispatch(), Dispatch::Forwarded);
    }

    #[test]
    fn all_contracts_are_distinct() {
        let all: Vec<_> = Contract::all().collect();
        assert_eq!(all.len(), 4 + 4 + 5 + 2 + 4 + 3 + 1 + 3);
        for c in &all {
            assert_eq!(Contract::new(c.family(), c.generation()), Some(*c));
        }
    }

    #[test]
    fn slots_clear_only_matching_value() {
        let mut slots = VersionSlots::<u32>::new();
        slots.set(7, 10);
        assert!(!slots.clear_if(7, 11));
        assert_eq!(slots.get(7), Some(10));
        assert!(slots.clear_if(7, 10));
        assert_eq!(slots.get(7), None);
        assert_eq!(slots.occupied().count(), 0);
    }
}
