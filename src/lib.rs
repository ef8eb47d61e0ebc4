// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! surfaces_and_scenes lets code written against several generations of a legacy
drawing-surface and 3D-scene API run against one modern backend.

Every resource (a context, a surface, a device, ...) exists once, no matter how many contract
generations a client asks for.  Creating a surface through the oldest contract and asking for the
newest returns a wrapper around that very same surface: same pixels, same attachments, same
reference count discipline.

```
use surfaces_and_scenes::{Config, ContextVersion, Runtime, SurfaceCaps, SurfaceDesc, SurfaceVersion};
let runtime = Runtime::new(Config::default());
let context = runtime.create_context(ContextVersion::V1).unwrap();
let surface = context
    .create_surface(&SurfaceDesc::new(SurfaceCaps::OFFSCREEN_PLAIN).with_size(16, 16))
    .unwrap();
assert_eq!(surface.version().unwrap(), SurfaceVersion::V1);
let newest = surface.as_version(SurfaceVersion::V7).unwrap();
assert!(newest.same_resource(&surface).unwrap());
surface.write(0, &[1, 2, 3, 4]).unwrap();
assert_eq!(newest.read(0, 4).unwrap(), vec![1, 2, 3, 4]);
```

# Contract families

| Family   | Generations      | Created by                                   |
|----------|------------------|----------------------------------------------|
| Context  | 1, 2, 4, 7       | [`Runtime::create_context`]                  |
| Surface  | 1, 2, 3, 4, 7    | [`Context::create_surface`]                  |
| Scene    | 1, 2, 3, 7       | [`Context::scene`]                           |
| Device   | 1, 2, 3, 7       | [`Scene::create_device`], or querying a surface |
| Viewport | 1, 2, 3          | [`Scene::create_viewport`]                   |
| Light    | 1                | [`Scene::create_light`]                      |
| Material | 1, 2, 3          | [`Scene::create_material`]                   |
| Texture  | 1, 2             | querying a texture surface                   |

Any handle can be asked for another generation with [`Wrapper::query`] or the typed
`as_version`.  The answer is the handle itself, the sibling handed out before, or a newly built
sibling, and it is always acquired.

# Reference counts

Each wrapper counts in one of three ways, fixed when it is built:

| Discipline        | Counter used                        | Typical wrappers                             |
|-------------------|-------------------------------------|----------------------------------------------|
| Independent       | its own                             | contexts, surfaces, devices                  |
| DelegatedToParent | the owner of the resource's creator | scenes, textures, implicit flip/mip members  |
| DelegatedToOrigin | the wrapper it was obtained through | viewport and material siblings, surface devices |

When a counter reaches zero the wrapper is torn down, and an owning wrapper takes its whole
resource, its siblings and everything it created with it.

# Backends

The in-memory [`backend::SoftwareBackend`] is always available and is what [`Runtime::new`]
uses.  With the `backend_wgpu` feature, `backend::WgpuBackend` puts surfaces in wgpu textures.
*/

mod chain;
mod config;
mod context;
mod contract;
mod delegate;
mod error;
mod imp;
mod lifecycle;
pub mod pixel_formats;
mod refcount;
mod registry;
mod resolver;
mod runtime;
pub mod scene;
mod state;
mod surfaces;
mod wrapper;

/// The backend seam and the bundled backends.
pub mod backend {
    pub use crate::imp::{
        Backend, BackendObject, DeviceCommand, Error, Extent, LightKind, LightParams, MemoryPool, ObjectKind,
        PrimitiveType, RecordKind, SoftwareBackend, SurfaceCreateInfo, SurfaceUsage, UploadLayout,
    };
    #[cfg(feature = "backend_wgpu")]
    pub use crate::imp::WgpuBackend;
}

pub use chain::{ChainEntry, ChainKind, FlipChain};
pub use config::{Config, DisplayMode};
pub use context::Context;
pub use contract::{
    Contract, ContextVersion, DeviceVersion, Family, LightVersion, MaterialVersion, SceneVersion, SurfaceVersion,
    TextureVersion, ViewportVersion,
};
pub use error::{Error, Result};
pub use refcount::RefDiscipline;
pub use runtime::Runtime;
pub use scene::{
    Device, DeviceFlags, ExecuteBuffer, ExecuteInstruction, Light, Material, MaterialParams, Scene, Texture, Viewport,
    ViewportBinding, ViewportParams,
};
pub use state::attachments::Link;
pub use state::dirty::{DirtyAggregateReceiver, DirtyReceiver, DirtySender};
pub use state::{ResourceCaps, ResourceId};
pub use surfaces::{LockedRect, Surface, SurfaceCaps, SurfaceDesc};
pub use wrapper::{Wrapper, WrapperId};
