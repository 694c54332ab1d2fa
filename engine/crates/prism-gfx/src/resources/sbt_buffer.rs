use std::{ops::Deref, rc::Rc};

use ash::vk;

use crate::{foundation::device::GfxDevice, resources::buffer::GfxBuffer};

/// shader binding table 使用的 buffer：host 可写，需要 device address
pub struct GfxSBTBuffer {
    inner: GfxBuffer,
}
// init & destroy
impl GfxSBTBuffer {
    /// align 通常取 shader_group_base_alignment
    pub fn new(
        device: &Rc<GfxDevice>,
        size: vk::DeviceSize,
        align: vk::DeviceSize,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let inner = GfxBuffer::new(
            device,
            size,
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            Some(align),
            true,
            format!("SBTBuffer::{}", name.as_ref()),
        )?;
        Ok(Self { inner })
    }
}
impl Deref for GfxSBTBuffer {
    type Target = GfxBuffer;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
