use std::rc::Rc;

use ash::vk;
use prism_gfx::{
    commands::{
        barrier::{GfxBarrierMask, GfxImageBarrier},
        command_buffer::{GfxCommandBuffer, LabelColor},
    },
    foundation::device::GfxDevice,
    swapchain::surface::GfxSurface,
};

use crate::{
    app_context::AppContext,
    descriptors::{DescriptorError, DescriptorSource},
    environment::alias_map::AccelerationData,
    events::{CameraMoved, SceneActivated, Subscription, SurfaceResized},
    frame::{backend::VulkanFrameBackend, ring_buffer::FrameRingBuffer},
    renderer::{
        FrameContext,
        lifecycle::RendererLifecycle,
        output_image::OutputImage,
        raster_renderer::RasterizeRenderer,
        rtx_renderer::RtxRenderer,
        trace_state::RtxTraceState,
    },
    scene::SceneProvider,
    settings::{DefaultRendererSettings, RenderMode},
};

/// 对外的每帧接口：raster 与光追两个 renderer 共享一个 frame ring buffer
///
/// # 每帧流程
/// ```ignore
/// let Some(_) = renderer.acquire() else {
///     renderer.resize(width, height)?;
///     return Ok(());
/// };
/// renderer.begin();
/// renderer.update(&scene_manager)?;
/// renderer.end();
/// ```
pub struct HybridRenderer {
    // drop 顺序：renderer 的 GPU 对象先于 ring buffer
    raster: RendererLifecycle<RasterizeRenderer>,
    rtx: RendererLifecycle<RtxRenderer>,
    ring: FrameRingBuffer<VulkanFrameBackend>,

    scene_activated: Subscription<SceneActivated>,
    camera_moved: Subscription<CameraMoved>,
    surface_resized: Subscription<SurfaceResized>,

    mode: RenderMode,
    /// 本帧 update 中录制了哪个 renderer 的输出
    recorded: Option<RenderMode>,
    /// 输出图像或环境贴图被重建，下一次 update 需要重新绑定
    needs_rebind: bool,

    device: Rc<GfxDevice>,
}

// new & init
impl HybridRenderer {
    pub fn new(ctx: &AppContext, surface: GfxSurface, width: u32, height: u32) -> anyhow::Result<Self> {
        let device = ctx.device.clone();
        let settings = &ctx.settings;

        let backend = VulkanFrameBackend::new(
            &device,
            surface,
            settings.present_mode.vk_present_mode(),
            DefaultRendererSettings::DEFAULT_SURFACE_FORMAT,
            DefaultRendererSettings::DEPTH_FORMAT_CANDIDATES,
        )?;
        let ring = FrameRingBuffer::init(backend, width, height)?;
        let extent = ring.extent();

        let raster_renderer = RasterizeRenderer::new(&device, extent, ring.depth_format())?;
        let trace_state =
            RtxTraceState::new(settings.max_ray_depth, settings.samples_per_pixel, settings.accumulation_limit);
        let mut rtx_renderer = RtxRenderer::new(&device, extent, trace_state)?;
        if let Some(path) = &settings.environment_map {
            rtx_renderer.load_environment(path)?;
        }

        Ok(Self {
            raster: RendererLifecycle::new(
                raster_renderer,
                ctx.shader_compiler.clone(),
                ctx.descriptor_backend_factory(),
            ),
            rtx: RendererLifecycle::new(rtx_renderer, ctx.shader_compiler.clone(), ctx.descriptor_backend_factory()),
            ring,
            scene_activated: ctx.events.scene_activated.subscribe(),
            camera_moved: ctx.events.camera_moved.subscribe(),
            surface_resized: ctx.events.surface_resized.subscribe(),
            mode: settings.render_mode,
            recorded: None,
            needs_rebind: false,
            device,
        })
    }

    /// 阻塞直到 GPU 空闲，然后重建 surface 相关资源和两个输出图像
    pub fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.ring.resize(width, height)?;
        let extent = self.ring.extent();
        self.raster.renderer_mut().resize(extent)?;
        self.rtx.renderer_mut().resize(extent)?;
        self.needs_rebind = true;
        log::info!("hybrid renderer resized to {}x{}", extent.width, extent.height);
        Ok(())
    }
}
impl Drop for HybridRenderer {
    fn drop(&mut self) {
        self.device.wait_idle();
    }
}

// 每帧
impl HybridRenderer {
    /// 返回 None 表示 surface 已经过期，调用者需要 `resize`
    ///
    /// 窗口尺寸变化，或者上一次 present 报告 surface 过期时，先重建再 acquire
    pub fn acquire(&mut self) -> Option<usize> {
        let resized = self.surface_resized.drain().last();
        let target = pending_resize(resized, self.ring.needs_resize(), self.ring.extent());
        if let Some(SurfaceResized { width, height }) = target {
            if let Err(err) = self.resize(width, height) {
                log::error!("resize to {}x{} failed: {:#}", width, height, err);
                return None;
            }
        }
        self.ring.acquire()
    }

    pub fn begin(&mut self) {
        self.recorded = None;
        self.ring.begin_command_buffer();
    }

    /// 处理通知，然后录制当前模式的 renderer
    pub fn update(&mut self, provider: &dyn SceneProvider) -> anyhow::Result<()> {
        let activated = self.scene_activated.drain().last();
        if let Some(SceneActivated { scene_id }) = activated {
            self.activate_scene(provider, scene_id)?;
        } else if self.needs_rebind {
            self.rebind(provider)?;
        }

        if self.camera_moved.drain().count() > 0 {
            self.raster.on_camera_moved();
            self.rtx.on_camera_moved();
        }

        if self.raster.active_scene().is_none() {
            return Ok(());
        }

        let frame = FrameContext {
            cmd: self.ring.current_command_buffer(),
            frame_id: self.ring.frame_id(),
            frame_name: self.ring.frame_name(),
            extent: self.ring.extent(),
            depth_image: self.ring.depth_image(),
            depth_view: self.ring.depth_view(),
            depth_format: self.ring.depth_format(),
        };

        // 光追模式下 raster 的结果同样需要更新，光追 shader 会读取它
        self.raster.record(&frame, provider);
        if self.mode == RenderMode::RayTrace {
            let raster_output = self.raster.renderer().get_output_image();
            raster_output.transition(frame.cmd, vk::ImageLayout::GENERAL, GfxBarrierMask::TRANSFER_SRC_TO_RAY_TRACING);
            self.rtx.record(&frame, provider);
            raster_output.transition(
                frame.cmd,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                GfxBarrierMask::RAY_TRACING_TO_TRANSFER_SRC,
            );
        }
        self.recorded = Some(self.mode);
        Ok(())
    }

    /// 把输出图像 blit 到 swapchain image，然后提交并 present
    pub fn end(&mut self) {
        let cmd = self.ring.current_command_buffer();
        let swapchain_image = self.ring.current_image();

        cmd.begin_label("present", LabelColor::COLOR_PASS);
        cmd.image_memory_barrier(&[GfxImageBarrier::new(swapchain_image, vk::ImageAspectFlags::COLOR)
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .mask(GfxBarrierMask::ACQUIRED_TO_TRANSFER_DST)]);

        match self.recorded {
            Some(mode) => Self::blit_output(cmd, self.output_image_of(mode), swapchain_image, self.ring.extent()),
            // 没有激活的场景
            None => cmd.cmd_clear_color_image(
                swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                [0.0, 0.0, 0.0, 1.0],
            ),
        }

        cmd.image_memory_barrier(&[GfxImageBarrier::new(swapchain_image, vk::ImageAspectFlags::COLOR)
            .layout_transfer(vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
            .mask(GfxBarrierMask::TRANSFER_DST_TO_PRESENT)]);
        cmd.end_label();

        self.ring.flush_current_command_buffer();
        self.recorded = None;
    }

    fn blit_output(cmd: &GfxCommandBuffer, output: &OutputImage, dst: vk::Image, dst_extent: vk::Extent2D) {
        let corner = |extent: vk::Extent2D| vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageBlit2::default()
            .src_subresource(subresource)
            .src_offsets([vk::Offset3D::default(), corner(output.extent())])
            .dst_subresource(subresource)
            .dst_offsets([vk::Offset3D::default(), corner(dst_extent)]);
        let blit_info = vk::BlitImageInfo2::default()
            .src_image(output.image().vk_image())
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .regions(std::slice::from_ref(&region))
            .filter(vk::Filter::LINEAR);
        cmd.cmd_blit_image(&blit_info);
    }
}

// 场景与资源
impl HybridRenderer {
    /// 第一次激活时初始化两个 renderer；之后的激活只重新收集绑定
    fn activate_scene(&mut self, provider: &dyn SceneProvider, scene_id: u64) -> anyhow::Result<()> {
        if let Some(scene) = provider.active_scene() {
            if scene.id() != scene_id {
                log::warn!("scene {} activated, but provider reports scene {}", scene_id, scene.id());
            }
        }

        if !self.raster.is_initialized() {
            self.raster.init(scene_id)?;
        }
        if !self.rtx.is_initialized() {
            self.rtx.init(scene_id)?;
        }

        // 其他 slot 的 command buffer 可能仍在使用旧的 descriptor set
        self.device.wait_idle();
        self.raster.on_scene_activated(provider, &[])?;
        let raster_output: &dyn DescriptorSource = self.raster.renderer().get_output_image();
        self.rtx.on_scene_activated(provider, &[raster_output])?;
        self.needs_rebind = false;
        Ok(())
    }

    fn rebind(&mut self, provider: &dyn SceneProvider) -> Result<(), DescriptorError> {
        self.raster.rebind(provider, &[])?;
        let raster_output: &dyn DescriptorSource = self.raster.renderer().get_output_image();
        self.rtx.rebind(provider, &[raster_output])?;
        self.needs_rebind = false;
        log::debug!("hybrid renderer: descriptors rebound");
        Ok(())
    }

    /// 替换环境光；会等待 GPU 空闲
    pub fn set_environment(&mut self, data: &AccelerationData) -> anyhow::Result<()> {
        self.device.wait_idle();
        self.rtx.renderer_mut().set_environment(data)?;
        self.needs_rebind = true;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        if self.mode != mode {
            log::info!("render mode: {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
            self.rtx.renderer_mut().trace_state_mut().reset_accumulation();
        }
    }

    fn output_image_of(&self, mode: RenderMode) -> &OutputImage {
        match mode {
            RenderMode::Rasterize => self.raster.renderer().get_output_image(),
            RenderMode::RayTrace => self.rtx.renderer().get_output_image(),
        }
    }
}

// getters
impl HybridRenderer {
    #[inline]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// 当前模式最终呈现的图像
    pub fn get_output_image(&self) -> &OutputImage {
        self.output_image_of(self.mode)
    }

    pub fn mutable_rtx_renderer(&mut self) -> &mut RtxRenderer {
        self.rtx.renderer_mut()
    }

    pub fn mutable_rasterize_renderer(&mut self) -> &mut RasterizeRenderer {
        self.raster.renderer_mut()
    }

    #[inline]
    pub fn frame_ring(&self) -> &FrameRingBuffer<VulkanFrameBackend> {
        &self.ring
    }
}

/// 最新的尺寸通知优先；没有通知但 surface 过期时按当前尺寸重建
fn pending_resize(
    notified: Option<SurfaceResized>,
    surface_stale: bool,
    current: vk::Extent2D,
) -> Option<SurfaceResized> {
    notified.or_else(|| {
        surface_stale.then_some(SurfaceResized {
            width: current.width,
            height: current.height,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_surface_triggers_resize() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        assert_eq!(pending_resize(None, false, extent), None);
        assert_eq!(
            pending_resize(None, true, extent),
            Some(SurfaceResized { width: 800, height: 600 })
        );

        let notified = SurfaceResized { width: 1024, height: 768 };
        assert_eq!(pending_resize(Some(notified), true, extent), Some(notified));
        assert_eq!(pending_resize(Some(notified), false, extent), Some(notified));
    }
}
