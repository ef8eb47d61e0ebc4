// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
An in-memory backend.

Objects are bookkeeping records with reference counts.  Surfaces keep a copy of the last upload,
devices record every command they execute, and presents are logged.  Failure injection hooks
let callers exercise the construction-failure paths.
*/

use super::{
    Backend, BackendObject, DeviceCommand, Error, Extent, ObjectKind, SurfaceCreateInfo, UploadLayout,
};
use crate::contract::Contract;
use crate::pixel_formats::BackendFormat;
use parking_lot::Mutex;
use std::collections::HashMap;

/// What a software backend object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Object(ObjectKind),
    Surface,
    SwapchainBuffer,
}

#[derive(Debug)]
struct Record {
    kind: RecordKind,
    refs: u32,
    debug_name: String,
    extent: Option<Extent>,
    format: Option<BackendFormat>,
    contents: Vec<u8>,
    swapchain_slot: Option<(BackendObject, u32)>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    objects: HashMap<u64, Record>,
    commands: Vec<(BackendObject, DeviceCommand)>,
    presents: Vec<(BackendObject, BackendObject)>,
    uploads: usize,
    surfaces_until_failure: Option<u32>,
    fail_swapchain_buffers: bool,
    fail_uploads: bool,
    disabled: Vec<Contract>,
}

impl Inner {
    fn insert(&mut self, record: Record) -> BackendObject {
        self.next_id += 1;
        self.objects.insert(self.next_id, record);
        BackendObject::from_raw(self.next_id)
    }
}

#[derive(Debug, Default)]
pub struct SoftwareBackend {
    inner: Mutex<Inner>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `successes` surface creations succeed; every one after that fails.
    pub fn fail_surface_creation_after(&self, successes: u32) {
        self.inner.lock().surfaces_until_failure = Some(successes);
    }

    /// Undoes [`fail_surface_creation_after`](Self::fail_surface_creation_after).
    pub fn clear_surface_failures(&self) {
        self.inner.lock().surfaces_until_failure = None;
    }

    pub fn fail_swapchain_buffers(&self, fail: bool) {
        self.inner.lock().fail_swapchain_buffers = fail;
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.inner.lock().fail_uploads = fail;
    }

    /// Makes [`Backend::supports`] report `contract` as unavailable.
    pub fn disable_contract(&self, contract: Contract) {
        self.inner.lock().disabled.push(contract);
    }

    pub fn live_objects(&self) -> usize {
        self.inner.lock().objects.len()
    }

    pub fn live_objects_of(&self, kind: RecordKind) -> usize {
        self.inner.lock().objects.values().filter(|r| r.kind == kind).count()
    }

    pub fn ref_count(&self, object: BackendObject) -> Option<u32> {
        self.inner.lock().objects.get(&object.raw()).map(|r| r.refs)
    }

    pub fn debug_name(&self, object: BackendObject) -> Option<String> {
        self.inner.lock().objects.get(&object.raw()).map(|r| r.debug_name.clone())
    }

    pub fn format(&self, surface: BackendObject) -> Option<BackendFormat> {
        self.inner.lock().objects.get(&surface.raw()).and_then(|r| r.format)
    }

    /// The last bytes uploaded to `surface`.
    pub fn contents(&self, surface: BackendObject) -> Option<Vec<u8>> {
        self.inner.lock().objects.get(&surface.raw()).map(|r| r.contents.clone())
    }

    pub fn upload_count(&self) -> usize {
        self.inner.lock().uploads
    }

    /// The (context, slot) a swapchain buffer was created for.
    pub fn swapchain_slot(&self, buffer: BackendObject) -> Option<(BackendObject, u32)> {
        self.inner.lock().objects.get(&buffer.raw()).and_then(|r| r.swapchain_slot)
    }

    /// Drains the command log.
    pub fn take_commands(&self) -> Vec<(BackendObject, DeviceCommand)> {
        std::mem::take(&mut self.inner.lock().commands)
    }

    /// Every (swapchain buffer, source surface) pair presented so far.
    pub fn presents(&self) -> Vec<(BackendObject, BackendObject)> {
        self.inner.lock().presents.clone()
    }
}

impl Backend for SoftwareBackend {
    fn create_object(&self, kind: ObjectKind, debug_name: &str) -> Result<BackendObject, Error> {
        let mut inner = self.inner.lock();
        Ok(inner.insert(Record {
            kind: RecordKind::Object(kind),
            refs: 1,
            debug_name: debug_name.to_string(),
            extent: None,
            format: None,
            contents: Vec::new(),
            swapchain_slot: None,
        }))
    }

    fn create_surface(&self, info: &SurfaceCreateInfo) -> Result<BackendObject, Error> {
        let mut inner = self.inner.lock();
        if let Some(remaining) = inner.surfaces_until_failure.as_mut() {
            if *remaining == 0 {
                log::debug!("software backend: injected failure creating {}", info.debug_name);
                return Err(Error::OutOfMemory("surface"));
            }
            *remaining -= 1;
        }
        Ok(inner.insert(Record {
            kind: RecordKind::Surface,
            refs: 1,
            debug_name: info.debug_name.clone(),
            extent: Some(info.extent),
            format: Some(info.format),
            contents: Vec::new(),
            swapchain_slot: None,
        }))
    }

    fn create_swapchain_buffer(
        &self,
        context: BackendObject,
        index: u32,
        extent: Extent,
        format: BackendFormat,
    ) -> Result<BackendObject, Error> {
        let mut inner = self.inner.lock();
        if inner.fail_swapchain_buffers {
            return Err(Error::OutOfMemory("swapchain buffer"));
        }
        if !inner.objects.contains_key(&context.raw()) {
            return Err(Error::UnknownObject(context));
        }
        Ok(inner.insert(Record {
            kind: RecordKind::SwapchainBuffer,
            refs: 1,
            debug_name: format!("swapchain buffer {index}"),
            extent: Some(extent),
            format: Some(format),
            contents: Vec::new(),
            swapchain_slot: Some((context, index)),
        }))
    }

    fn retain(&self, object: BackendObject) {
        match self.inner.lock().objects.get_mut(&object.raw()) {
            Some(record) => record.refs += 1,
            None => log::error!("software backend: retain of unknown object {object:?}"),
        }
    }

    fn release(&self, object: BackendObject) {
        let mut inner = self.inner.lock();
        let Some(record) = inner.objects.get_mut(&object.raw()) else {
            log::error!("software backend: release of unknown object {object:?}");
            return;
        };
        record.refs -= 1;
        if record.refs == 0 {
            inner.objects.remove(&object.raw());
        }
    }

    fn supports(&self, contract: Contract) -> bool {
        !self.inner.lock().disabled.contains(&contract)
    }

    fn upload(&self, surface: BackendObject, data: &[u8], layout: UploadLayout) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.fail_uploads {
            return Err(Error::Other("injected upload failure".to_string()));
        }
        if data.len() != layout.byte_len() {
            return Err(Error::UploadSize { expected: layout.byte_len(), got: data.len() });
        }
        let record = inner.objects.get_mut(&surface.raw()).ok_or(Error::UnknownObject(surface))?;
        if record.extent != Some(layout.extent) {
            return Err(Error::Other(format!("upload extent {:?} doesn't match {:?}", layout.extent, record.extent)));
        }
        if record.format != Some(layout.format) {
            return Err(Error::UnsupportedFormat(layout.format));
        }
        record.contents = data.to_vec();
        inner.uploads += 1;
        Ok(())
    }

    fn execute(&self, device: BackendObject, command: &DeviceCommand) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        match inner.objects.get(&device.raw()) {
            Some(record) if record.kind == RecordKind::Object(ObjectKind::Device) => {}
            _ => return Err(Error::UnknownObject(device)),
        }
        inner.commands.push((device, command.clone()));
        Ok(())
    }

    fn present(&self, back_buffer: BackendObject, source: BackendObject) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let contents = inner.objects.get(&source.raw()).ok_or(Error::UnknownObject(source))?.contents.clone();
        let target = inner.objects.get_mut(&back_buffer.raw()).ok_or(Error::UnknownObject(back_buffer))?;
        if target.kind != RecordKind::SwapchainBuffer {
            return Err(Error::Other("present target is not a swapchain buffer".to_string()));
        }
        target.contents = contents;
        inner.presents.push((back_buffer, source));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::SceneVersion;
    use crate::imp::{MemoryPool, SurfaceUsage};

    fn info() -> SurfaceCreateInfo {
        SurfaceCreateInfo {
            extent: Extent { width: 2, height: 2 },
            format: BackendFormat::Bgra8Unorm,
            usage: SurfaceUsage::default(),
            pool: MemoryPool::Video,
            debug_name: "test".to_string(),
        }
    }

    #[test]
    fn retain_release_frees_at_zero() {
        let backend = SoftwareBackend::new();
        let object = backend.create_object(ObjectKind::Scene, "scene").unwrap();
        backend.retain(object);
        backend.release(object);
        assert_eq!(backend.live_objects(), 1);
        backend.release(object);
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn injected_surface_failures() {
        let backend = SoftwareBackend::new();
        backend.fail_surface_creation_after(1);
        assert!(backend.create_surface(&info()).is_ok());
        assert!(matches!(backend.create_surface(&info()), Err(Error::OutOfMemory(_))));
        backend.clear_surface_failures();
        assert!(backend.create_surface(&info()).is_ok());
    }

    #[test]
    fn upload_checks_size_and_present_copies() {
        let backend = SoftwareBackend::new();
        let context = backend.create_object(ObjectKind::Context, "context").unwrap();
        let surface = backend.create_surface(&info()).unwrap();
        let layout = UploadLayout {
            extent: Extent { width: 2, height: 2 },
            bytes_per_row: 8,
            rows: 2,
            format: BackendFormat::Bgra8Unorm,
        };
        assert!(matches!(backend.upload(surface, &[0; 3], layout), Err(Error::UploadSize { .. })));
        let other_format = UploadLayout { format: BackendFormat::B5G6R5Unorm, bytes_per_row: 4, ..layout };
        assert!(matches!(backend.upload(surface, &[0; 8], other_format), Err(Error::UnsupportedFormat(_))));
        assert_eq!(backend.format(surface), Some(BackendFormat::Bgra8Unorm));
        backend.upload(surface, &[7; 16], layout).unwrap();
        let buffer = backend
            .create_swapchain_buffer(context, 0, Extent { width: 2, height: 2 }, BackendFormat::Bgra8Unorm)
            .unwrap();
        backend.present(buffer, surface).unwrap();
        assert_eq!(backend.contents(buffer), Some(vec![7; 16]));
        assert_eq!(backend.swapchain_slot(buffer), Some((context, 0)));
    }

    #[test]
    fn disabled_contracts() {
        let backend = SoftwareBackend::new();
        let contract = Contract::Scene(SceneVersion::V3);
        assert!(backend.supports(contract));
        backend.disable_contract(contract);
        assert!(!backend.supports(contract));
    }
}
