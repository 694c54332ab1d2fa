use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::foundation::{debug::DebugType, device::GfxDevice};

/// 创建 2D image 所需的参数
#[derive(Debug, Clone, Copy)]
pub struct GfxImage2DInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// 单个 mip、单个 layer 的 2D image，连同它的 view 一起创建与销毁
pub struct GfxImage2D {
    handle: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,

    info: GfxImage2DInfo,
    device: Rc<GfxDevice>,
}

impl GfxImage2D {
    pub fn new(device: &Rc<GfxDevice>, info: GfxImage2DInfo, name: impl AsRef<str>) -> anyhow::Result<Self> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) = unsafe {
            device
                .allocator()
                .create_image(&image_ci, &alloc_ci)
                .with_context(|| format!("create image {}", name.as_ref()))?
        };

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(info.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: info.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.allocator().destroy_image(image, &mut allocation) };
                return Err(e).with_context(|| format!("create image view {}", name.as_ref()));
            }
        };

        let image = Self {
            handle: image,
            view,
            allocation,
            info,
            device: device.clone(),
        };
        device.set_debug_name(&image, name.as_ref());
        device.set_object_debug_name(view, format!("ImageView::{}", name.as_ref()));
        Ok(image)
    }
}
impl Drop for GfxImage2D {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.allocator().destroy_image(self.handle, &mut self.allocation);
        }
    }
}

// getters
impl GfxImage2D {
    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.handle
    }
    #[inline]
    pub fn vk_view(&self) -> vk::ImageView {
        self.view
    }
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.info.format
    }
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.info.aspect
    }
}

impl DebugType for GfxImage2D {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
