use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;

use crate::{
    foundation::{debug::DebugType, device::GfxDevice},
    pipelines::{
        pipeline_layout::GfxPipelineLayout,
        shader::{GfxShaderGroupInfo, GfxShaderStageInfo},
    },
};

/// dynamic rendering 下的图形管线参数
pub struct GfxGraphicsPipelineInfo {
    /// dynamic render 需要的 framebuffer 信息
    pub color_attach_formats: Vec<vk::Format>,
    /// format = undefined 表示不使用这个 attachment
    pub depth_attach_format: vk::Format,

    pub vertex_binding_desc: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attribute_desc: Vec<vk::VertexInputAttributeDescription>,

    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
}
impl Default for GfxGraphicsPipelineInfo {
    fn default() -> Self {
        Self {
            color_attach_formats: vec![],
            depth_attach_format: vk::Format::UNDEFINED,
            vertex_binding_desc: vec![],
            vertex_attribute_desc: vec![],
            cull_mode: vk::CullModeFlags::BACK,
            // 按照 OpenGL 的传统，将 CCW 视为 front face
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
        }
    }
}

/// 图形管线或光追管线；pipeline layout 可以在多个 pipeline 之间共享
pub struct GfxPipeline {
    handle: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
    layout: Rc<GfxPipelineLayout>,
    device: Rc<GfxDevice>,
}

// 创建
impl GfxPipeline {
    pub fn new_graphics(
        device: &Rc<GfxDevice>,
        info: &GfxGraphicsPipelineInfo,
        stages: &[GfxShaderStageInfo],
        layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&info.color_attach_formats)
            .depth_attachment_format(info.depth_attach_format);

        let stage_infos = stages.iter().map(|s| s.create_info()).collect_vec();

        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&info.vertex_binding_desc)
            .vertex_attribute_descriptions(&info.vertex_attribute_desc);
        let input_assembly_info =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let rasterize_info = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face);
        let msaa_info =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // 每个 color attachment 都需要一个 blend state
        let blend_states = info
            .color_attach_formats
            .iter()
            .map(|_| vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA))
            .collect_vec();
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_states);

        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_test)
            .depth_write_enable(info.depth_test)
            .depth_compare_op(vk::CompareOp::LESS);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&depth_stencil_info)
            .dynamic_state(&dynamic_state_info)
            .layout(layout.handle())
            .push_next(&mut attach_info);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, e)| e)
                .with_context(|| format!("create graphics pipeline {debug_name}"))?
        };

        Self::from_created(device, pipelines, vk::PipelineBindPoint::GRAPHICS, layout, debug_name)
    }

    pub fn new_ray_tracing(
        device: &Rc<GfxDevice>,
        stages: &[GfxShaderStageInfo],
        groups: &[GfxShaderGroupInfo],
        max_ray_recursion_depth: u32,
        layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let stage_infos = stages.iter().map(|s| s.create_info()).collect_vec();
        let group_infos = groups.iter().map(|g| g.create_info()).collect_vec();

        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stage_infos)
            .groups(&group_infos)
            .max_pipeline_ray_recursion_depth(max_ray_recursion_depth)
            .layout(layout.handle());

        let pipelines = unsafe {
            device
                .ray_tracing_pipeline()
                .create_ray_tracing_pipelines(
                    vk::DeferredOperationKHR::null(),
                    vk::PipelineCache::null(),
                    std::slice::from_ref(&pipeline_info),
                    None,
                )
                .map_err(|(_, e)| e)
                .with_context(|| format!("create ray tracing pipeline {debug_name}"))?
        };

        Self::from_created(device, pipelines, vk::PipelineBindPoint::RAY_TRACING_KHR, layout, debug_name)
    }

    fn from_created(
        device: &Rc<GfxDevice>,
        pipelines: Vec<vk::Pipeline>,
        bind_point: vk::PipelineBindPoint,
        layout: Rc<GfxPipelineLayout>,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let handle = pipelines.into_iter().next().context("driver returned no pipeline")?;
        let pipeline = Self {
            handle,
            bind_point,
            layout,
            device: device.clone(),
        };
        device.set_debug_name(&pipeline, debug_name);
        log::info!("pipeline created: {}", debug_name);
        Ok(pipeline)
    }
}
impl Drop for GfxPipeline {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline(self.handle, None) };
    }
}

// getters
impl GfxPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

// tools
impl GfxPipeline {
    /// 所有 shader group 的 handle，按 group 顺序紧密排列
    pub fn ray_tracing_group_handles(&self, group_count: u32, handle_size: u32) -> anyhow::Result<Vec<u8>> {
        anyhow::ensure!(
            self.bind_point == vk::PipelineBindPoint::RAY_TRACING_KHR,
            "shader group handles are only available on ray tracing pipelines"
        );
        let data_size = (group_count * handle_size) as usize;
        let handles = unsafe {
            self.device
                .ray_tracing_pipeline()
                .get_ray_tracing_shader_group_handles(self.handle, 0, group_count, data_size)
                .context("get ray tracing shader group handles")?
        };
        Ok(handles)
    }
}

impl DebugType for GfxPipeline {
    fn debug_type_name() -> &'static str {
        "GfxPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
