use std::fmt;
use std::sync::Arc;

use super::device::{GpuDevice, Resource};

/// Exclusive owner of one GPU object; destroys it when dropped.
///
/// Stages wrap every object the moment it is created, so an early return
/// during initialization releases whatever was already built, in reverse
/// order of creation.
pub struct Owned<D: GpuDevice + ?Sized, H: Copy + Into<Resource>> {
    device: Arc<D>,
    handle: H,
}

impl<D: GpuDevice + ?Sized, H: Copy + Into<Resource>> Owned<D, H> {
    pub fn new(device: &Arc<D>, handle: H) -> Self {
        Self {
            device: Arc::clone(device),
            handle,
        }
    }

    /// Non-owning copy of the handle.
    pub fn handle(&self) -> H {
        self.handle
    }
}

impl<D: GpuDevice + ?Sized, H: Copy + Into<Resource>> Drop for Owned<D, H> {
    fn drop(&mut self) {
        self.device.destroy(self.handle.into());
    }
}

impl<D: GpuDevice + ?Sized, H: Copy + Into<Resource> + fmt::Debug> fmt::Debug for Owned<D, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::{BufferDescriptor, BufferKind};
    use crate::render::recording::{GpuCall, RecordingDevice};

    #[test]
    fn drop_destroys_in_reverse_creation_order() {
        let device = Arc::new(RecordingDevice::new());
        let desc = |label| BufferDescriptor {
            label,
            kind: BufferKind::Vertex,
            size: 16,
            contents: None,
        };
        let first = device.create_buffer(&desc("first")).unwrap();
        let second = device.create_buffer(&desc("second")).unwrap();
        {
            let _first = Owned::new(&device, first);
            let _second = Owned::new(&device, second);
        }
        let destroyed: Vec<_> = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GpuCall::Destroy(resource) => Some(resource),
                _ => None,
            })
            .collect();
        assert_eq!(
            destroyed,
            vec![Resource::Buffer(second), Resource::Buffer(first)]
        );
        assert_eq!(device.live_resources(), 0);
    }
}
