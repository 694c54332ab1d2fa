use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use prism_gfx::{
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence, semaphore::GfxSemaphore,
        submit_info::GfxSubmitInfo,
    },
    foundation::device::GfxDevice,
    resources::image::{GfxImage2D, GfxImage2DInfo},
    swapchain::{render_swapchain::GfxRenderSwapchain, surface::GfxSurface},
};

/// 和 surface 尺寸相关的资源：可呈现的 image、view，以及共享的深度缓冲
#[derive(Debug, Clone, Default)]
pub struct SurfaceInfo {
    pub extent: vk::Extent2D,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
}

impl SurfaceInfo {
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// frame ring buffer 需要的设备操作
///
/// fence / semaphore / command buffer 由实现者定义，ring buffer 只负责持有和排序
pub trait FrameBackend {
    type Fence;
    type Semaphore;
    type CommandBuffer;

    fn create_fence(&mut self, signaled: bool, name: &str) -> anyhow::Result<Self::Fence>;
    fn create_semaphore(&mut self, name: &str) -> anyhow::Result<Self::Semaphore>;
    fn alloc_command_buffer(&mut self, name: &str) -> anyhow::Result<Self::CommandBuffer>;

    /// 阻塞直到 fence signaled
    fn wait_fence(&self, fence: &Self::Fence);
    fn reset_fence(&self, fence: &Self::Fence);
    fn is_fence_signaled(&self, fence: &Self::Fence) -> bool;

    fn begin_command_buffer(&self, cmd: &Self::CommandBuffer, label: &str);
    fn end_command_buffer(&self, cmd: &Self::CommandBuffer);

    /// 销毁旧的 surface 资源（如果有）并按照新的尺寸重建
    fn rebuild_surface_resources(&mut self, extent: vk::Extent2D) -> anyhow::Result<SurfaceInfo>;
    fn release_surface_resources(&mut self);

    /// 返回 None 表示 surface 已经过期
    fn acquire_image(&mut self, signal: &Self::Semaphore) -> Option<usize>;

    /// 等待 `wait`，完成后 signal `signal` 和 `fence`
    fn submit(&self, cmd: &Self::CommandBuffer, wait: &Self::Semaphore, signal: &Self::Semaphore, fence: &Self::Fence);

    /// 返回 true 表示 surface 需要重建
    fn present(&mut self, image_index: usize, wait: &Self::Semaphore) -> bool;

    fn wait_idle(&self);
}

/// 基于 swapchain 的实现
pub struct VulkanFrameBackend {
    device: Rc<GfxDevice>,

    command_pool: GfxCommandPool,
    depth_image: Option<GfxImage2D>,
    swapchain: Option<GfxRenderSwapchain>,
    /// 第一次创建 swapchain 之前由这里持有
    surface: Option<GfxSurface>,

    present_mode: vk::PresentModeKHR,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
}

impl VulkanFrameBackend {
    pub fn new(
        device: &Rc<GfxDevice>,
        surface: GfxSurface,
        present_mode: vk::PresentModeKHR,
        surface_format: vk::SurfaceFormatKHR,
        depth_format_candidates: &[vk::Format],
    ) -> anyhow::Result<Self> {
        let present_mode = GfxRenderSwapchain::choose_present_mode(&surface.supported_present_modes(), present_mode);
        let surface_format = GfxRenderSwapchain::choose_surface_format(&surface.supported_formats(), surface_format)
            .context("surface reports no supported format")?;
        let depth_format = device
            .find_supported_format(depth_format_candidates, vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            .context("no supported depth format")?;
        let command_pool = GfxCommandPool::new(
            device,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "frame-ring-command-pool",
        )?;

        log::info!(
            "frame backend: present mode {:?}, surface format {:?}, depth format {:?}",
            present_mode,
            surface_format.format,
            depth_format
        );
        Ok(Self {
            device: device.clone(),
            command_pool,
            depth_image: None,
            swapchain: None,
            surface: Some(surface),
            present_mode,
            surface_format,
            depth_format,
        })
    }

    #[inline]
    pub fn device(&self) -> &Rc<GfxDevice> {
        &self.device
    }

    fn swapchain(&self) -> &GfxRenderSwapchain {
        self.swapchain.as_ref().unwrap_or_else(|| panic!("swapchain is not created"))
    }
}

impl FrameBackend for VulkanFrameBackend {
    type Fence = GfxFence;
    type Semaphore = GfxSemaphore;
    type CommandBuffer = GfxCommandBuffer;

    fn create_fence(&mut self, signaled: bool, name: &str) -> anyhow::Result<GfxFence> {
        GfxFence::new(&self.device, signaled, name)
    }

    fn create_semaphore(&mut self, name: &str) -> anyhow::Result<GfxSemaphore> {
        GfxSemaphore::new(&self.device, name)
    }

    fn alloc_command_buffer(&mut self, name: &str) -> anyhow::Result<GfxCommandBuffer> {
        self.command_pool.alloc_command_buffer(name)
    }

    fn wait_fence(&self, fence: &GfxFence) {
        fence.wait();
    }

    fn reset_fence(&self, fence: &GfxFence) {
        fence.reset();
    }

    fn is_fence_signaled(&self, fence: &GfxFence) -> bool {
        fence.is_signaled()
    }

    fn begin_command_buffer(&self, cmd: &GfxCommandBuffer, label: &str) {
        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, label);
    }

    fn end_command_buffer(&self, cmd: &GfxCommandBuffer) {
        cmd.end();
    }

    fn rebuild_surface_resources(&mut self, extent: vk::Extent2D) -> anyhow::Result<SurfaceInfo> {
        self.depth_image = None;
        match self.swapchain.as_mut() {
            Some(swapchain) => swapchain.recreate(extent)?,
            None => {
                let surface = self.surface.take().context("surface was released")?;
                self.swapchain = Some(GfxRenderSwapchain::new(
                    &self.device,
                    surface,
                    self.present_mode,
                    self.surface_format,
                    extent,
                )?);
            }
        }

        let swapchain = self.swapchain();
        let depth_image = GfxImage2D::new(
            &self.device,
            GfxImage2DInfo {
                extent: swapchain.extent(),
                format: self.depth_format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: vk::ImageAspectFlags::DEPTH,
            },
            "frame-ring-depth",
        )?;

        let info = SurfaceInfo {
            extent: swapchain.extent(),
            color_format: swapchain.color_format(),
            depth_format: self.depth_format,
            images: swapchain.images().to_vec(),
            image_views: swapchain.image_views().iter().copied().collect_vec(),
            depth_image: depth_image.vk_image(),
            depth_view: depth_image.vk_view(),
        };
        self.depth_image = Some(depth_image);
        Ok(info)
    }

    fn release_surface_resources(&mut self) {
        self.depth_image = None;
        self.swapchain = None;
    }

    fn acquire_image(&mut self, signal: &GfxSemaphore) -> Option<usize> {
        self.swapchain().acquire_next_image(signal.handle(), u64::MAX)
    }

    fn submit(&self, cmd: &GfxCommandBuffer, wait: &GfxSemaphore, signal: &GfxSemaphore, fence: &GfxFence) {
        let submit_info = GfxSubmitInfo::new(&[cmd.vk_handle()])
            .wait(wait.handle(), vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal(signal.handle(), vk::PipelineStageFlags2::ALL_COMMANDS);
        self.device.submit_to_queue(&[submit_info], fence.handle());
    }

    fn present(&mut self, image_index: usize, wait: &GfxSemaphore) -> bool {
        self.swapchain().present_image(image_index, &[wait.handle()])
    }

    fn wait_idle(&self) {
        self.device.wait_idle();
    }
}
