use std::{cell::Cell, rc::Rc};

use ash::vk;
use prism_gfx::{
    commands::{
        barrier::{GfxBarrierMask, GfxImageBarrier},
        command_buffer::GfxCommandBuffer,
    },
    foundation::device::GfxDevice,
    resources::image::{GfxImage2D, GfxImage2DInfo},
};

use crate::descriptors::{DescriptorSource, manager::DescriptorSetManager, resource_binding::ResourceBinding};

/// renderer 的输出图像：raster 作为 color attachment，光追作为 storage image，
/// 最终都作为 blit 的源
pub struct OutputImage {
    image: GfxImage2D,
    descriptor_name: &'static str,
    /// 最近一次 barrier 之后的 layout
    layout: Cell<vk::ImageLayout>,
}

impl OutputImage {
    pub fn new(
        device: &Rc<GfxDevice>,
        extent: vk::Extent2D,
        format: vk::Format,
        descriptor_name: &'static str,
    ) -> anyhow::Result<Self> {
        let image = GfxImage2D::new(
            device,
            GfxImage2DInfo {
                extent,
                format,
                usage: vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_SRC,
                aspect: vk::ImageAspectFlags::COLOR,
            },
            format!("output-{descriptor_name}"),
        )?;
        Ok(Self {
            image,
            descriptor_name,
            layout: Cell::new(vk::ImageLayout::UNDEFINED),
        })
    }

    /// 从当前 layout 转换到 `new_layout`
    pub fn transition(&self, cmd: &GfxCommandBuffer, new_layout: vk::ImageLayout, mask: GfxBarrierMask) {
        let barrier = GfxImageBarrier::new(self.image.vk_image(), vk::ImageAspectFlags::COLOR)
            .layout_transfer(self.layout.get(), new_layout)
            .mask(mask);
        cmd.image_memory_barrier(std::slice::from_ref(&barrier));
        self.layout.set(new_layout);
    }
}

// getters
impl OutputImage {
    #[inline]
    pub fn image(&self) -> &GfxImage2D {
        &self.image
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout.get()
    }

    #[inline]
    pub fn descriptor_name(&self) -> &'static str {
        self.descriptor_name
    }
}

impl DescriptorSource for OutputImage {
    fn add_descriptor_to(&self, manager: &mut DescriptorSetManager) {
        if manager.find_resource_declaration(self.descriptor_name).is_some() {
            manager.add_resource(self.descriptor_name, ResourceBinding::storage_image(self.image.vk_view()));
        }
    }
}
