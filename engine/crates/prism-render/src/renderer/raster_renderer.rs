use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use prism_crate_tools::enumed_map;
use prism_gfx::{
    commands::{
        barrier::{GfxBarrierMask, GfxImageBarrier},
        command_buffer::LabelColor,
    },
    foundation::device::GfxDevice,
    pipelines::{
        pipeline::{GfxGraphicsPipelineInfo, GfxPipeline},
        pipeline_layout::GfxPipelineLayout,
    },
};

use crate::{
    descriptors::DescriptorSource,
    renderer::{
        FrameContext, create_stage_infos, depth_barrier_aspect,
        lifecycle::{PipelineRenderer, RendererInitContext, RendererResources},
        output_image::OutputImage,
    },
    scene::{RenderCamera, RenderScene},
    settings::DefaultRendererSettings,
    shader::{ShaderCompileRequest, ShaderRequests, ShaderStageKind},
};

enumed_map!(RasterStage<(ShaderStageKind, &'static str)>: {
    Vertex: (ShaderStageKind::Vertex, "raster/raster.vert.spv"),
    Fragment: (ShaderStageKind::Fragment, "raster/raster.frag.spv"),
});

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RasterPushConstants {
    pub view_projection: glam::Mat4,
}

/// 使用 dynamic rendering 把场景画到自己的输出图像上
pub struct RasterizeRenderer {
    output: OutputImage,
    depth_format: vk::Format,
    clear_color: [f32; 4],

    device: Rc<GfxDevice>,
}

impl RasterizeRenderer {
    /// 光追 shader 通过该名字读取 raster 的结果
    pub const OUTPUT_DESCRIPTOR_NAME: &'static str = "raster_output";

    pub fn new(device: &Rc<GfxDevice>, extent: vk::Extent2D, depth_format: vk::Format) -> anyhow::Result<Self> {
        Ok(Self {
            output: Self::create_output(device, extent)?,
            depth_format,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            device: device.clone(),
        })
    }

    fn create_output(device: &Rc<GfxDevice>, extent: vk::Extent2D) -> anyhow::Result<OutputImage> {
        OutputImage::new(device, extent, DefaultRendererSettings::OUTPUT_FORMAT, Self::OUTPUT_DESCRIPTOR_NAME)
    }

    /// 尺寸变化之后重建输出图像；调用者需要随后重新绑定 descriptor
    pub fn resize(&mut self, extent: vk::Extent2D) -> anyhow::Result<()> {
        self.output = Self::create_output(&self.device, extent)?;
        Ok(())
    }

    #[inline]
    pub fn get_output_image(&self) -> &OutputImage {
        &self.output
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }
}

impl PipelineRenderer for RasterizeRenderer {
    fn name(&self) -> &str {
        "rasterize"
    }

    fn get_shaders_for_compilation(&self) -> ShaderRequests {
        let mut requests = ShaderRequests::new();
        for stage in RasterStage::iter() {
            let (kind, path) = *stage.value();
            requests
                .entry(kind)
                .or_default()
                .push(ShaderCompileRequest::new(path, "main").with_reflection());
        }
        requests
    }

    fn init_internal(&mut self, _scene_id: u64, ctx: &mut RendererInitContext) -> anyhow::Result<()> {
        let manager = ctx.resources.binding_manager();
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<RasterPushConstants>() as u32);
        let layout = Rc::new(GfxPipelineLayout::new(
            &self.device,
            manager.set_layouts(),
            std::slice::from_ref(&push_range),
            "rasterize",
        )?);

        let shaders = ctx.shaders.shaders.iter().collect_vec();
        let stages = create_stage_infos(&self.device, &shaders)?;
        // 顶点数据由 shader 从场景的 storage buffer 中读取，不需要 vertex input
        let info = GfxGraphicsPipelineInfo {
            color_attach_formats: vec![DefaultRendererSettings::OUTPUT_FORMAT],
            depth_attach_format: self.depth_format,
            ..Default::default()
        };
        let pipeline = GfxPipeline::new_graphics(&self.device, &info, &stages, layout, "rasterize")?;
        ctx.resources.pipeline = Some(pipeline);
        Ok(())
    }

    fn shutdown_internal(&mut self) {}

    fn descriptor_sources(&self) -> Vec<&dyn DescriptorSource> {
        vec![&self.output]
    }

    fn record(
        &mut self,
        frame: &FrameContext,
        resources: &RendererResources,
        scene: &dyn RenderScene,
        camera: &dyn RenderCamera,
    ) {
        let cmd = frame.cmd;
        let pipeline = resources.pipeline();
        let extent = self.output.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        cmd.begin_label("rasterize", LabelColor::COLOR_PASS);

        self.output.transition(
            cmd,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            GfxBarrierMask::TRANSFER_SRC_TO_COLOR_ATTACHMENT,
        );
        cmd.image_memory_barrier(&[GfxImageBarrier::new(frame.depth_image, depth_barrier_aspect(frame.depth_format))
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .mask(GfxBarrierMask::DEPTH_ATTACHMENT_REUSE)]);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.output.image().vk_view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            });
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(frame.depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        cmd.cmd_begin_rendering(&rendering_info);
        {
            cmd.cmd_bind_pipeline(pipeline.bind_point(), pipeline.handle());
            // 翻转 y 轴，与 OpenGL 的约定保持一致
            cmd.cmd_set_viewport(vk::Viewport {
                x: 0.0,
                y: extent.height as f32,
                width: extent.width as f32,
                height: -(extent.height as f32),
                min_depth: 0.0,
                max_depth: 1.0,
            });
            cmd.cmd_set_scissor(render_area);

            resources.binding_manager().bind(cmd.vk_handle(), pipeline.bind_point(), pipeline.layout());
            cmd.cmd_push_constants(
                pipeline.layout(),
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                &RasterPushConstants {
                    view_projection: camera.view_projection(),
                },
            );

            scene.record_draws(cmd, pipeline.layout());
        }
        cmd.cmd_end_rendering();

        self.output.transition(
            cmd,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            GfxBarrierMask::COLOR_ATTACHMENT_TO_TRANSFER_SRC,
        );
        cmd.end_label();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_requests() {
        assert_eq!(RasterStage::COUNT, 2);
        let (kind, path) = *RasterStage::Fragment.value();
        assert_eq!(kind, ShaderStageKind::Fragment);
        assert!(path.ends_with(".frag.spv"));
        assert_eq!(size_of::<RasterPushConstants>(), 64);
    }
}
