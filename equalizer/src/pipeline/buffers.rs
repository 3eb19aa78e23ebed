use bytemuck::Pod;

use crate::common::{Error, Result};
use crate::compute::{BufferAccess, BufferDesc, ComputeBackend, ElementType};
use crate::tables::BINS;

/// The five device buffers of one equalization run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum BufferRole {
    InputImage,
    Histogram,
    Cumulative,
    Lut,
    OutputImage,
}

impl BufferRole {
    pub fn label(self) -> &'static str {
        match self {
            BufferRole::InputImage => "input_image",
            BufferRole::Histogram => "histogram",
            BufferRole::Cumulative => "cumulative",
            BufferRole::Lut => "lut",
            BufferRole::OutputImage => "output_image",
        }
    }

    /// Element-count sizing for an image of `pixel_count` pixels.
    pub fn desc(self, pixel_count: usize) -> BufferDesc {
        let (elem, len, access) = match self {
            BufferRole::InputImage => (ElementType::U8, pixel_count, BufferAccess::ReadOnly),
            BufferRole::Histogram | BufferRole::Cumulative | BufferRole::Lut => {
                (ElementType::I32, BINS, BufferAccess::ReadWrite)
            }
            BufferRole::OutputImage => (ElementType::U8, pixel_count, BufferAccess::WriteOnly),
        };

        BufferDesc::new(self.label(), elem, len, access)
    }
}

/// Device buffers owned by a single run; released when dropped.
pub(crate) struct DeviceBuffers<'a, B: ComputeBackend> {
    backend: &'a B,
    input_image: B::Buffer,
    histogram: B::Buffer,
    cumulative: B::Buffer,
    lut: B::Buffer,
    output_image: B::Buffer,
}

impl<'a, B: ComputeBackend> DeviceBuffers<'a, B> {
    pub(crate) fn allocate(backend: &'a B, pixel_count: usize) -> Result<Self> {
        let allocate = |role: BufferRole| backend.allocate(role.desc(pixel_count));

        let buffers = Self {
            backend,
            input_image: allocate(BufferRole::InputImage)?,
            histogram: allocate(BufferRole::Histogram)?,
            cumulative: allocate(BufferRole::Cumulative)?,
            lut: allocate(BufferRole::Lut)?,
            output_image: allocate(BufferRole::OutputImage)?,
        };

        log::debug!(
            "Allocated device buffers for {} pixels on {}",
            pixel_count,
            backend.name()
        );

        Ok(buffers)
    }

    pub(crate) fn get(&self, role: BufferRole) -> &B::Buffer {
        match role {
            BufferRole::InputImage => &self.input_image,
            BufferRole::Histogram => &self.histogram,
            BufferRole::Cumulative => &self.cumulative,
            BufferRole::Lut => &self.lut,
            BufferRole::OutputImage => &self.output_image,
        }
    }

    /// Blocking host-to-device copy of the whole buffer.
    pub(crate) fn upload<T: Pod>(&self, role: BufferRole, data: &[T]) -> Result<()> {
        let buffer = self.get(role);
        self.check_host_slice::<T>(buffer, data.len())?;
        self.backend.write(buffer, 0, bytemuck::cast_slice(data))
    }

    /// Blocking device-to-host copy of the whole buffer.
    pub(crate) fn download<T: Pod>(&self, role: BufferRole, out: &mut [T]) -> Result<()> {
        let buffer = self.get(role);
        self.check_host_slice::<T>(buffer, out.len())?;
        self.backend.read(buffer, 0, bytemuck::cast_slice_mut(out))
    }

    fn check_host_slice<T: Pod>(&self, buffer: &B::Buffer, len: usize) -> Result<()> {
        let desc = self.backend.buffer_desc(buffer);
        if std::mem::size_of::<T>() != desc.elem.size() || len != desc.len {
            return Err(Error::DeviceResource(format!(
                "host slice of {} x {} bytes does not match '{}' ({} x {})",
                len,
                std::mem::size_of::<T>(),
                desc.label,
                desc.len,
                desc.elem
            )));
        }

        Ok(())
    }
}
