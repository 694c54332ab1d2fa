use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{barrier::GfxImageBarrier, command_pool::GfxCommandPool},
    foundation::{debug::DebugType, device::GfxDevice},
};

/// debug label 的颜色
pub struct LabelColor;
impl LabelColor {
    pub const COLOR_CMD: [f32; 4] = [0.6, 0.8, 1.0, 1.0];
    pub const COLOR_PASS: [f32; 4] = [0.9, 0.6, 0.3, 1.0];
}

/// 命令缓冲封装
///
/// 录制接口只是 `ash::Device::cmd_*` 的转发，额外负责 debug label。
///
/// # 使用示例
/// ```ignore
/// let cmd = pool.alloc_command_buffer("frame-0")?;
/// cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, "frame-0");
/// cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
/// cmd.end();
/// ```
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxCommandBuffer {
    pub(crate) fn new(device: &Rc<GfxDevice>, command_pool: &GfxCommandPool, debug_name: &str) -> anyhow::Result<Self> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { device.allocate_command_buffers(&info)? }
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no command buffer allocated for {debug_name}"))?;
        let cmd_buffer = GfxCommandBuffer {
            vk_handle: command_buffer,
            device: device.clone(),
        };
        device.set_debug_name(&cmd_buffer, debug_name);
        Ok(cmd_buffer)
    }
}
// Basic 命令
impl GfxCommandBuffer {
    /// 开始录制 command，并且自动开启 debug label
    pub fn begin(&self, usage_flag: vk::CommandBufferUsageFlags, debug_label_name: &str) {
        unsafe {
            self.device
                .begin_command_buffer(self.vk_handle, &vk::CommandBufferBeginInfo::default().flags(usage_flag))
                .unwrap_or_else(|e| panic!("begin command buffer failed: {:?}", e));
        }
        self.begin_label(debug_label_name, LabelColor::COLOR_CMD);
    }

    /// 结束 debug label，结束录制
    pub fn end(&self) {
        self.end_label();
        unsafe {
            self.device
                .end_command_buffer(self.vk_handle)
                .unwrap_or_else(|e| panic!("end command buffer failed: {:?}", e));
        }
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }
}
// 资源相关命令
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.vk_handle, src, dst, regions) };
    }

    #[inline]
    pub fn cmd_clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let clear_value = vk::ClearColorValue { float32: color };
        unsafe {
            self.device
                .cmd_clear_color_image(self.vk_handle, image, layout, &clear_value, std::slice::from_ref(&range))
        };
    }

    #[inline]
    pub fn cmd_blit_image(&self, blit_info: &vk::BlitImageInfo2) {
        unsafe { self.device.cmd_blit_image2(self.vk_handle, blit_info) };
    }

    /// push constants 直接使用 Pod 类型的字节
    #[inline]
    pub fn cmd_push_constants<T: bytemuck::Pod>(
        &self,
        pipeline_layout: vk::PipelineLayout,
        stage: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) {
        unsafe {
            self.device.cmd_push_constants(
                self.vk_handle,
                pipeline_layout,
                stage,
                offset,
                bytemuck::bytes_of(data),
            );
        }
    }
}
// 绘制相关命令
impl GfxCommandBuffer {
    #[inline]
    pub fn cmd_begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe { self.device.dynamic_rendering().cmd_begin_rendering(self.vk_handle, rendering_info) };
    }

    #[inline]
    pub fn cmd_end_rendering(&self) {
        unsafe { self.device.dynamic_rendering().cmd_end_rendering(self.vk_handle) };
    }

    #[inline]
    pub fn cmd_bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(self.vk_handle, bind_point, pipeline) };
    }

    #[inline]
    pub fn cmd_bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.vk_handle,
                bind_point,
                pipeline_layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    #[inline]
    pub fn cmd_bind_vertex_buffers(&self, first_bind: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe { self.device.cmd_bind_vertex_buffers(self.vk_handle, first_bind, buffers, offsets) };
    }

    #[inline]
    pub fn cmd_bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.device.cmd_bind_index_buffer(self.vk_handle, buffer, offset, index_type) };
    }

    #[inline]
    pub fn cmd_set_viewport(&self, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(self.vk_handle, 0, std::slice::from_ref(&viewport)) };
    }

    #[inline]
    pub fn cmd_set_scissor(&self, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(self.vk_handle, 0, std::slice::from_ref(&scissor)) };
    }

    #[inline]
    pub fn cmd_draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(self.vk_handle, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    #[inline]
    pub fn cmd_draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device.cmd_draw_indexed(self.vk_handle, index_count, 1, first_index, vertex_offset, 0);
        }
    }
}
// 光追相关命令
impl GfxCommandBuffer {
    /// 四个 region 分别是 raygen、miss、hit、callable
    pub fn cmd_trace_rays(
        &self,
        raygen: &vk::StridedDeviceAddressRegionKHR,
        miss: &vk::StridedDeviceAddressRegionKHR,
        hit: &vk::StridedDeviceAddressRegionKHR,
        callable: &vk::StridedDeviceAddressRegionKHR,
        extent: vk::Extent2D,
    ) {
        unsafe {
            self.device.ray_tracing_pipeline().cmd_trace_rays(
                self.vk_handle,
                raygen,
                miss,
                hit,
                callable,
                extent.width,
                extent.height,
                1,
            );
        }
    }
}
// 同步命令
impl GfxCommandBuffer {
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info) };
    }
}
// debug 相关命令
impl GfxCommandBuffer {
    #[inline]
    pub fn begin_label(&self, label_name: &str, label_color: [f32; 4]) {
        self.device.cmd_begin_label(self.vk_handle, label_name, label_color);
    }

    #[inline]
    pub fn end_label(&self) {
        self.device.cmd_end_label(self.vk_handle);
    }
}

impl DebugType for GfxCommandBuffer {
    fn debug_type_name() -> &'static str {
        "GfxCommandBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}
