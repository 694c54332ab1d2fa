use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::{foundation::device::GfxDevice, swapchain::surface::GfxSurface};

/// 和 surface 尺寸相关的交换链，resize 时整体重建（surface 本身保留）
pub struct GfxRenderSwapchain {
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    swapchain_extent: vk::Extent2D,

    device: Rc<GfxDevice>,
    // 最后 drop
    surface: GfxSurface,
}

// new & init
impl GfxRenderSwapchain {
    pub fn new(
        device: &Rc<GfxDevice>,
        surface: GfxSurface,
        present_mode: vk::PresentModeKHR,
        surface_format: vk::SurfaceFormatKHR,
        window_physical_extent: vk::Extent2D,
    ) -> anyhow::Result<Self> {
        let mut swapchain = Self {
            swapchain_handle: vk::SwapchainKHR::null(),
            swapchain_images: vec![],
            swapchain_image_views: vec![],
            surface_format,
            present_mode,
            swapchain_extent: window_physical_extent,
            device: device.clone(),
            surface,
        };
        swapchain.recreate(window_physical_extent)?;
        Ok(swapchain)
    }

    /// 重建交换链，旧的 swapchain 作为 old_swapchain 传入后销毁
    ///
    /// 调用者需要保证 GPU 已经不再使用旧的 image（device wait idle）
    pub fn recreate(&mut self, window_physical_extent: vk::Extent2D) -> anyhow::Result<()> {
        let surface_capabilities = self.surface.get_capabilities();

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        let image_count = Self::calculate_image_count(&surface_capabilities);
        log::info!(
            "create swapchain: window extent {}x{}, swapchain extent {}x{}, min image count {}",
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height,
            image_count
        );

        let old_swapchain = self.swapchain_handle;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle())
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // 渲染结果通过 blit 拷贝到 swapchain image
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain_handle =
            unsafe { self.device.swapchain().create_swapchain(&create_info, None).context("create swapchain")? };
        self.device.set_object_debug_name(swapchain_handle, "main");

        self.destroy_surface_resources();
        self.swapchain_handle = swapchain_handle;
        self.swapchain_extent = extent;
        self.swapchain_images = unsafe { self.device.swapchain().get_swapchain_images(swapchain_handle)? };
        self.swapchain_image_views = self
            .swapchain_images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                let view = unsafe {
                    self.device.create_image_view(
                        &vk::ImageViewCreateInfo::default()
                            .image(*image)
                            .view_type(vk::ImageViewType::TYPE_2D)
                            .format(self.surface_format.format)
                            .subresource_range(vk::ImageSubresourceRange {
                                aspect_mask: vk::ImageAspectFlags::COLOR,
                                base_mip_level: 0,
                                level_count: 1,
                                base_array_layer: 0,
                                layer_count: 1,
                            }),
                        None,
                    )?
                };
                self.device.set_object_debug_name(*image, format!("swapchain-image-{idx}"));
                Ok(view)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(())
    }

    /// 销毁 swapchain 以及它的 image view；image 归 swapchain 所有
    fn destroy_surface_resources(&mut self) {
        unsafe {
            for view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain_handle != vk::SwapchainKHR::null() {
                self.device.swapchain().destroy_swapchain(self.swapchain_handle, None);
            }
        }
        self.swapchain_images.clear();
        self.swapchain_handle = vk::SwapchainKHR::null();
    }
}
impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        log::info!("destroying swapchain");
        self.destroy_surface_resources();
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.swapchain_images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.swapchain_image_views
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface(&self) -> &GfxSurface {
        &self.surface
    }
}

// tools
impl GfxRenderSwapchain {
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == u32::MAX || surface_extent.height == u32::MAX {
            vk::Extent2D {
                width: window_physical_extent
                    .width
                    .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width),
                height: window_physical_extent
                    .height
                    .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height),
            }
        } else {
            surface_extent
        }
    }

    /// max_image_count == 0，表示不限制 image 数量
    pub fn calculate_image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        let desired = surface_capabilities.min_image_count + 1;
        if surface_capabilities.max_image_count == 0 {
            desired
        } else {
            desired.min(surface_capabilities.max_image_count)
        }
    }

    /// 优先使用 preferred，否则退回 surface 支持的第一个格式
    pub fn choose_surface_format(
        supported: &[vk::SurfaceFormatKHR],
        preferred: vk::SurfaceFormatKHR,
    ) -> Option<vk::SurfaceFormatKHR> {
        supported.iter().copied().find(|f| *f == preferred).or_else(|| supported.first().copied())
    }

    /// FIFO 是唯一保证支持的模式
    pub fn choose_present_mode(supported: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
        if supported.contains(&preferred) { preferred } else { vk::PresentModeKHR::FIFO }
    }
}

// update
impl GfxRenderSwapchain {
    /// 返回 None 表示 swapchain 已经过期，需要 recreate
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore, timeout: u64) -> Option<usize> {
        let result = unsafe {
            self.device.swapchain().acquire_next_image(self.swapchain_handle, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                Some(image_index as usize)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                None
            }
            Err(e) => {
                panic!("failed to acquire next swapchain image: {:?}", e);
            }
        }
    }

    /// return: need recreate
    pub fn present_image(&self, image_index: usize, wait_semaphores: &[vk::Semaphore]) -> bool {
        let image_indices = [image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { self.device.swapchain().queue_present(self.device.queue(), &present_info) };
        match result {
            Ok(is_suboptimal) => {
                if is_suboptimal {
                    log::warn!("swapchain present image index {} is not optimal", image_index);
                }
                is_suboptimal
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                true
            }
            Err(e) => {
                panic!("failed to present swapchain image: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_swapchain_extent() {
        let window = vk::Extent2D {
            width: 8000,
            height: 600,
        };
        // surface 决定尺寸
        let fixed = GfxRenderSwapchain::calculate_swapchain_extent(&caps((800, 600), 2, 3), window);
        assert_eq!((fixed.width, fixed.height), (800, 600));

        // 特殊值：由窗口决定，clamp 到允许范围
        let free = GfxRenderSwapchain::calculate_swapchain_extent(&caps((u32::MAX, u32::MAX), 2, 3), window);
        assert_eq!((free.width, free.height), (4096, 600));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps((1, 1), 2, 0)), 3);
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps((1, 1), 2, 2)), 2);
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps((1, 1), 3, 8)), 4);
    }

    #[test]
    fn test_choose_present_mode() {
        let supported = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&supported, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&supported, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );

        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[unorm], srgb), Some(unorm));
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[unorm, srgb], srgb), Some(srgb));
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[], srgb), None);
    }
}
