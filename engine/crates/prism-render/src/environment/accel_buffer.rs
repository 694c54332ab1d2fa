use std::rc::Rc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use prism_gfx::{foundation::device::GfxDevice, resources::buffer::GfxBuffer};

use crate::{
    descriptors::{DescriptorSource, manager::DescriptorSetManager, resource_binding::ResourceBinding},
    environment::alias_map::{AccelerationData, AliasEntry},
};

/// buffer 开头的标量数据，紧接着是 `width * height` 个 [`AliasEntry`]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct EnvironmentAccelHeader {
    pub width: u32,
    pub height: u32,
    pub integral: f32,
    pub average_luminance: f32,
}

impl From<&AccelerationData> for EnvironmentAccelHeader {
    fn from(data: &AccelerationData) -> Self {
        Self {
            width: data.width,
            height: data.height,
            integral: data.integral,
            average_luminance: data.average_luminance,
        }
    }
}

/// 上传到 GPU 的环境光采样表，在 shader 中的名字是 `env_accel`
pub struct EnvironmentAccelBuffer {
    buffer: GfxBuffer,
    header: EnvironmentAccelHeader,
}

impl EnvironmentAccelBuffer {
    pub const DESCRIPTOR_NAME: &'static str = "env_accel";

    pub fn new(device: &Rc<GfxDevice>, data: &AccelerationData) -> anyhow::Result<Self> {
        let header = EnvironmentAccelHeader::from(data);
        let size = Self::buffer_size(data.texel_count());
        let buffer = GfxBuffer::new_storage_mapped(device, size, "environment-accel")?;

        buffer.write_by_mmap(0, std::slice::from_ref(&header))?;
        buffer.write_by_mmap(size_of::<EnvironmentAccelHeader>() as vk::DeviceSize, &data.entries)?;

        log::info!(
            "environment accel buffer uploaded: {} entries, {} bytes",
            data.texel_count(),
            size
        );
        Ok(Self { buffer, header })
    }

    #[inline]
    pub fn buffer_size(texel_count: usize) -> vk::DeviceSize {
        (size_of::<EnvironmentAccelHeader>() + texel_count * size_of::<AliasEntry>()) as vk::DeviceSize
    }

    #[inline]
    pub fn header(&self) -> &EnvironmentAccelHeader {
        &self.header
    }

    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.buffer.vk_buffer()
    }
}

impl DescriptorSource for EnvironmentAccelBuffer {
    fn add_descriptor_to(&self, manager: &mut DescriptorSetManager) {
        if manager.find_resource_declaration(Self::DESCRIPTOR_NAME).is_some() {
            manager.add_resource(Self::DESCRIPTOR_NAME, ResourceBinding::buffer(self.buffer.vk_buffer(), 0, None));
        }
    }
}
