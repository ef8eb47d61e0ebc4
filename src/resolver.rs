// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Capability resolution.

Which contracts can be reached from which is a static table of [`CapabilityRule`]s.  Resolving a
query is one table lookup followed by one of three outcomes: the wrapper itself, an existing
sibling from the target resource's slot, or a freshly constructed wrapper.

Linked routes (context to scene, surface to texture, surface to device, and back) record the
linked resource on the shared state, so any generation asking later finds the same resource.
*/

use crate::config::Config;
use crate::contract::{Contract, Family};
use crate::error::{Error, Result};
use crate::imp::Backend;
use crate::refcount::Discipline;
use crate::registry::{Registry, WrapperPlan};
use crate::state::{ResourceCaps, ResourceId};
use crate::wrapper::WrapperId;
use crate::{context, scene};

/// Generations matched by a rule, as a bitmask over generation numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Generations(u8);

impl Generations {
    pub(crate) const ALL: Generations = Generations(0xFF);
    pub(crate) const fn of(generations: &[u8]) -> Generations {
        let mut mask = 0u8;
        let mut i = 0;
        while i < generations.len() {
            mask |= 1 << generations[i];
            i += 1;
        }
        Generations(mask)
    }
    pub(crate) fn contains(&self, generation: u8) -> bool {
        generation < 8 && self.0 & (1 << generation) != 0
    }
}

/// A relationship between two distinct resources that a query may cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkKind {
    /// Context to its scene.
    Scene,
    /// Scene back to its context.
    Context,
    /// Surface to the texture view of it.
    Texture,
    /// Texture back to its surface.
    Surface,
    /// Surface to the device rendering into it.
    Device,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Another generation of the same resource.
    Sibling,
    /// Another generation of the same device, through the execute-buffer adapter.
    ExecuteBufferAdapter,
    /// A generation of a linked resource.  With `reuse`, an existing linked resource is found
    /// through the shared state rather than created again.
    Linked { link: LinkKind, reuse: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisciplineRule {
    Independent,
    /// Count on the owner of the target resource's creator.
    Parent,
    /// Count on the wrapper the query was made through.
    Origin,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CapabilityRule {
    pub(crate) from: Family,
    pub(crate) from_generations: Generations,
    pub(crate) to: Family,
    pub(crate) to_generations: Generations,
    pub(crate) route: Route,
    pub(crate) discipline: DisciplineRule,
    pub(crate) requires: ResourceCaps,
}

const fn rule(from: Family, to: Family, route: Route, discipline: DisciplineRule) -> CapabilityRule {
    CapabilityRule {
        from,
        from_generations: Generations::ALL,
        to,
        to_generations: Generations::ALL,
        route,
        discipline,
        requires: ResourceCaps::empty(),
    }
}

/// First match wins.
pub(crate) static CAPABILITY_TABLE: &[CapabilityRule] = &[
    rule(Family::Context, Family::Context, Route::Sibling, DisciplineRule::Independent),
    rule(Family::Context, Family::Scene, Route::Linked { link: LinkKind::Scene, reuse: true }, DisciplineRule::Parent),
    rule(Family::Scene, Family::Scene, Route::Sibling, DisciplineRule::Parent),
    rule(Family::Scene, Family::Context, Route::Linked { link: LinkKind::Context, reuse: true }, DisciplineRule::Independent),
    rule(Family::Surface, Family::Surface, Route::Sibling, DisciplineRule::Independent),
    CapabilityRule {
        requires: ResourceCaps::TEXTURE,
        ..rule(Family::Surface, Family::Texture, Route::Linked { link: LinkKind::Texture, reuse: true }, DisciplineRule::Parent)
    },
    CapabilityRule {
        to_generations: Generations::of(&[1, 2]),
        requires: ResourceCaps::RENDER_TARGET,
        ..rule(Family::Surface, Family::Device, Route::Linked { link: LinkKind::Device, reuse: true }, DisciplineRule::Origin)
    },
    rule(Family::Texture, Family::Texture, Route::Sibling, DisciplineRule::Parent),
    rule(Family::Texture, Family::Surface, Route::Linked { link: LinkKind::Surface, reuse: true }, DisciplineRule::Independent),
    CapabilityRule {
        from_generations: Generations::of(&[3, 7]),
        to_generations: Generations::of(&[1, 2]),
        ..rule(Family::Device, Family::Device, Route::ExecuteBufferAdapter, DisciplineRule::Independent)
    },
    rule(Family::Device, Family::Device, Route::Sibling, DisciplineRule::Independent),
    rule(Family::Viewport, Family::Viewport, Route::Sibling, DisciplineRule::Origin),
    rule(Family::Material, Family::Material, Route::Sibling, DisciplineRule::Origin),
];

pub(crate) fn lookup(from: Contract, to: Contract) -> Option<&'static CapabilityRule> {
    CAPABILITY_TABLE.iter().find(|rule| {
        rule.from == from.family()
            && rule.to == to.family()
            && rule.from_generations.contains(from.generation())
            && rule.to_generations.contains(to.generation())
    })
}

/// Resolves `requested` from wrapper `from`, returning an acquired wrapper.
pub(crate) fn resolve(
    registry: &mut Registry,
    backend: &dyn Backend,
    config: &Config,
    from: WrapperId,
    requested: Contract,
) -> Result<WrapperId> {
    let entry = registry.wrapper(from)?;
    let (source, resource) = (entry.contract, entry.state);
    if source == requested {
        registry.acquire(from)?;
        return Ok(from);
    }
    let unsupported = || Error::unsupported(source, requested);
    let rule = lookup(source, requested).ok_or_else(unsupported)?;
    if !registry.state(resource)?.caps.contains(rule.requires) {
        return Err(unsupported());
    }
    if rule.route == Route::ExecuteBufferAdapter && !config.execute_buffer_adapter() {
        return Err(unsupported());
    }

    let target = match rule.route {
        Route::Sibling | Route::ExecuteBufferAdapter => Some(resource),
        Route::Linked { link, reuse } => {
            let existing = linked(registry, resource, link)?;
            if reuse { existing } else { None }
        }
    };
    if let Some(target) = target {
        if let Some(sibling) = registry.state(target)?.slots.get(requested.generation()) {
            log::trace!("{source} -> {requested}: cached {sibling:?}");
            registry.acquire(sibling)?;
            return Ok(sibling);
        }
    }
    if !backend.supports(requested) {
        return Err(unsupported());
    }
    let id = match target {
        Some(target) => construct_sibling(registry, backend, from, target, requested, rule)?,
        None => match rule.route {
            Route::Linked { link, .. } => construct_linked(registry, backend, config, from, resource, requested, link)?,
            _ => return Err(Error::inconsistency("sibling route without a target")),
        },
    };
    //a delegated wrapper starts with nothing on the counter it shares
    if registry.wrapper(id)?.discipline.target().is_some() {
        registry.acquire(id)?;
    }
    Ok(id)
}

/// The resource on the far side of `link`, if it exists yet.
fn linked(registry: &Registry, resource: ResourceId, link: LinkKind) -> Result<Option<ResourceId>> {
    let state = registry.state(resource)?;
    Ok(match link {
        LinkKind::Scene => state.context()?.scene,
        LinkKind::Context => Some(state.scene()?.context),
        LinkKind::Texture => state.surface()?.texture,
        LinkKind::Surface => Some(state.texture()?.surface),
        LinkKind::Device => state.surface()?.device,
    })
}

fn construct_sibling(
    registry: &mut Registry,
    backend: &dyn Backend,
    from: WrapperId,
    target: ResourceId,
    requested: Contract,
    rule: &CapabilityRule,
) -> Result<WrapperId> {
    let owner = registry.owner_of(target)?;
    let discipline = match rule.discipline {
        DisciplineRule::Independent => Discipline::Independent,
        DisciplineRule::Origin => Discipline::DelegatedToOrigin(from),
        DisciplineRule::Parent => {
            let creator = registry.state(target)?.creator.ok_or_else(|| Error::inconsistency("delegated-to-parent resource has no parent"))?;
            Discipline::DelegatedToParent(registry.owner_of(creator)?)
        }
    };
    let delegate = registry
        .wrapper(owner)?
        .delegate
        .produce(owner, requested, backend)
        .ok_or_else(|| Error::inconsistency("owning wrapper has no backend object"))?;
    let id = registry.register(
        WrapperPlan { contract: requested, state: target, delegate, discipline, owner: false },
        backend,
    )?;
    log::trace!("constructed {requested} sibling {id:?} ({:?})", discipline.kind());
    Ok(id)
}

fn construct_linked(
    registry: &mut Registry,
    backend: &dyn Backend,
    config: &Config,
    from: WrapperId,
    resource: ResourceId,
    requested: Contract,
    link: LinkKind,
) -> Result<WrapperId> {
    match (link, requested) {
        (LinkKind::Scene, Contract::Scene(version)) => context::create_scene(registry, backend, resource, version),
        (LinkKind::Texture, Contract::Texture(version)) => scene::texture::create_for_surface(registry, backend, resource, version),
        (LinkKind::Device, Contract::Device(version)) => {
            scene::device::create_for_surface(registry, backend, config, from, resource, version)
        }
        //parents always exist, so these never need constructing
        (LinkKind::Context | LinkKind::Surface, _) => Err(Error::inconsistency("parent link without a parent")),
        _ => Err(Error::inconsistency("link doesn't match the requested family")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContextVersion, DeviceVersion, SceneVersion, SurfaceVersion, TextureVersion, ViewportVersion};

    #[test]
    fn context_to_scene_reuses_existing_link() {
        let rule = lookup(Contract::Context(ContextVersion::V1), Contract::Scene(SceneVersion::V3)).unwrap();
        assert_eq!(rule.route, Route::Linked { link: LinkKind::Scene, reuse: true });
        assert_eq!(rule.discipline, DisciplineRule::Parent);
    }

    #[test]
    fn adapter_only_from_direct_primitive_generations() {
        let adapter = lookup(Contract::Device(DeviceVersion::V7), Contract::Device(DeviceVersion::V1)).unwrap();
        assert_eq!(adapter.route, Route::ExecuteBufferAdapter);
        let sibling = lookup(Contract::Device(DeviceVersion::V2), Contract::Device(DeviceVersion::V1)).unwrap();
        assert_eq!(sibling.route, Route::Sibling);
        let upgrade = lookup(Contract::Device(DeviceVersion::V1), Contract::Device(DeviceVersion::V7)).unwrap();
        assert_eq!(upgrade.route, Route::Sibling);
    }

    #[test]
    fn surface_links_require_caps() {
        let texture = lookup(Contract::Surface(SurfaceVersion::V1), Contract::Texture(TextureVersion::V2)).unwrap();
        assert_eq!(texture.requires, ResourceCaps::TEXTURE);
        let device = lookup(Contract::Surface(SurfaceVersion::V7), Contract::Device(DeviceVersion::V1)).unwrap();
        assert_eq!(device.requires, ResourceCaps::RENDER_TARGET);
        assert!(lookup(Contract::Surface(SurfaceVersion::V7), Contract::Device(DeviceVersion::V7)).is_none());
    }

    #[test]
    fn unrelated_families_have_no_rule() {
        assert!(lookup(Contract::Viewport(ViewportVersion::V1), Contract::Surface(SurfaceVersion::V1)).is_none());
        assert!(lookup(Contract::Context(ContextVersion::V7), Contract::Device(DeviceVersion::V7)).is_none());
    }

    #[test]
    fn generation_masks() {
        let mask = Generations::of(&[1, 2]);
        assert!(mask.contains(1));
        assert!(!mask.contains(3));
        assert!(Generations::ALL.contains(7));
    }
}
