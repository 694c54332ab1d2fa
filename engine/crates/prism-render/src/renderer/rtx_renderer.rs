use std::{path::Path, rc::Rc};

use ash::vk;
use prism_crate_tools::enumed_map;
use prism_gfx::{
    commands::{barrier::GfxBarrierMask, command_buffer::LabelColor},
    foundation::device::GfxDevice,
    pipelines::{pipeline::GfxPipeline, pipeline_layout::GfxPipelineLayout, shader::GfxShaderGroupInfo},
};

use crate::{
    descriptors::DescriptorSource,
    environment::{
        accel_buffer::EnvironmentAccelBuffer,
        alias_map::{AccelerationData, AliasMapBuilder},
        environment_map::EnvironmentMap,
    },
    renderer::{
        FrameContext, create_stage_infos,
        lifecycle::{PipelineRenderer, RendererInitContext, RendererResources},
        output_image::OutputImage,
        sbt::{SbtGroupCounts, SbtGroupKind, ShaderBindingTable},
        trace_state::{RtxPushConstants, RtxTraceState},
    },
    scene::{RenderCamera, RenderScene},
    settings::DefaultRendererSettings,
    shader::{CompiledShader, PipelineShaders, ShaderCompileRequest, ShaderRequests, ShaderStageKind},
};

/// (stage, 路径, 是否 optional)
enumed_map!(RtxShader<(ShaderStageKind, &'static str, bool)>: {
    RayGen: (ShaderStageKind::RayGen, "rtx/raygen.rgen.spv", false),
    SkyMiss: (ShaderStageKind::Miss, "rtx/sky.rmiss.spv", false),
    ShadowMiss: (ShaderStageKind::Miss, "rtx/shadow.rmiss.spv", false),
    ClosestHit: (ShaderStageKind::ClosestHit, "rtx/closest_hit.rchit.spv", false),
    AlphaTest: (ShaderStageKind::AnyHit, "rtx/alpha_test.rahit.spv", true),
    DiffuseCall: (ShaderStageKind::Callable, "rtx/diffuse.rcall.spv", true),
});

const RT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::RAYGEN_KHR.as_raw()
        | vk::ShaderStageFlags::MISS_KHR.as_raw()
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR.as_raw()
        | vk::ShaderStageFlags::ANY_HIT_KHR.as_raw()
        | vk::ShaderStageFlags::CALLABLE_KHR.as_raw(),
);

/// 光追 pipeline 的 stage 顺序与 shader group
pub struct RtxShaderGroups<'a> {
    /// raygen、miss、closest hit、any hit、callable 依次排列
    pub stages: Vec<&'a CompiledShader>,
    pub groups: Vec<GfxShaderGroupInfo>,
    pub counts: SbtGroupCounts,
}

impl<'a> RtxShaderGroups<'a> {
    /// 每个 closest hit 组成一个 triangle hit group；any hit 存在时附加到所有 hit group 上
    pub fn from_shaders(shaders: &'a PipelineShaders) -> anyhow::Result<Self> {
        let order = [
            ShaderStageKind::RayGen,
            ShaderStageKind::Miss,
            ShaderStageKind::ClosestHit,
            ShaderStageKind::AnyHit,
            ShaderStageKind::Callable,
        ];
        let stages: Vec<_> = order.iter().flat_map(move |&kind| shaders.stage(kind)).collect();

        let raygen: Vec<_> = stage_indices(&stages, ShaderStageKind::RayGen).collect();
        anyhow::ensure!(
            raygen.len() == 1,
            "ray tracing pipeline needs exactly one raygen shader, got {}",
            raygen.len()
        );
        let any_hit = stage_indices(&stages, ShaderStageKind::AnyHit).next();

        let mut counts = SbtGroupCounts::default();
        let mut groups = Vec::new();
        for index in raygen {
            groups.push(GfxShaderGroupInfo::general(index));
            counts.raygen += 1;
        }
        for index in stage_indices(&stages, ShaderStageKind::Miss) {
            groups.push(GfxShaderGroupInfo::general(index));
            counts.miss += 1;
        }
        for index in stage_indices(&stages, ShaderStageKind::ClosestHit) {
            groups.push(GfxShaderGroupInfo::triangles_hit(index, any_hit));
            counts.hit += 1;
        }
        for index in stage_indices(&stages, ShaderStageKind::Callable) {
            groups.push(GfxShaderGroupInfo::general(index));
            counts.callable += 1;
        }

        Ok(Self { stages, groups, counts })
    }
}

fn stage_indices<'s>(stages: &'s [&CompiledShader], kind: ShaderStageKind) -> impl Iterator<Item = u32> + 's {
    stages.iter().enumerate().filter(move |(_, s)| s.stage == kind).map(|(i, _)| i as u32)
}

/// 渐进式路径追踪，结果写入自己的输出图像
pub struct RtxRenderer {
    output: OutputImage,
    environment: Option<EnvironmentAccelBuffer>,
    trace_state: RtxTraceState,

    device: Rc<GfxDevice>,
}

impl RtxRenderer {
    pub const OUTPUT_DESCRIPTOR_NAME: &'static str = "output_image";

    pub fn new(device: &Rc<GfxDevice>, extent: vk::Extent2D, trace_state: RtxTraceState) -> anyhow::Result<Self> {
        Ok(Self {
            output: Self::create_output(device, extent)?,
            environment: None,
            trace_state,
            device: device.clone(),
        })
    }

    fn create_output(device: &Rc<GfxDevice>, extent: vk::Extent2D) -> anyhow::Result<OutputImage> {
        OutputImage::new(device, extent, DefaultRendererSettings::OUTPUT_FORMAT, Self::OUTPUT_DESCRIPTOR_NAME)
    }

    /// 调用者需要随后重新绑定 descriptor
    pub fn resize(&mut self, extent: vk::Extent2D) -> anyhow::Result<()> {
        self.output = Self::create_output(&self.device, extent)?;
        self.trace_state.reset_accumulation();
        Ok(())
    }

    /// 上传环境光的 alias map；调用者需要随后重新绑定 descriptor
    pub fn set_environment(&mut self, data: &AccelerationData) -> anyhow::Result<()> {
        if data.unpaired_texels > 0 {
            log::warn!("environment alias map: {} texels left unpaired and self-aliased", data.unpaired_texels);
        }
        self.environment = Some(EnvironmentAccelBuffer::new(&self.device, data)?);
        self.trace_state.reset_accumulation();
        Ok(())
    }

    pub fn load_environment(&mut self, path: &Path) -> anyhow::Result<()> {
        let env = EnvironmentMap::load(path)?;
        let data = AliasMapBuilder::build(&env);
        log::info!(
            "environment {} loaded: {}x{}, integral {}",
            path.display(),
            data.width,
            data.height,
            data.integral
        );
        self.set_environment(&data)
    }
}

// getters
impl RtxRenderer {
    #[inline]
    pub fn get_output_image(&self) -> &OutputImage {
        &self.output
    }

    #[inline]
    pub fn trace_state(&self) -> &RtxTraceState {
        &self.trace_state
    }

    #[inline]
    pub fn trace_state_mut(&mut self) -> &mut RtxTraceState {
        &mut self.trace_state
    }

    #[inline]
    pub fn environment(&self) -> Option<&EnvironmentAccelBuffer> {
        self.environment.as_ref()
    }
}

impl PipelineRenderer for RtxRenderer {
    fn name(&self) -> &str {
        "rtx"
    }

    fn get_shaders_for_compilation(&self) -> ShaderRequests {
        let mut requests = ShaderRequests::new();
        for shader in RtxShader::iter() {
            let (kind, path, optional) = *shader.value();
            let mut request = ShaderCompileRequest::new(path, "main").with_reflection();
            if optional {
                request = request.optional();
            }
            requests.entry(kind).or_default().push(request);
        }
        requests
    }

    fn init_internal(&mut self, _scene_id: u64, ctx: &mut RendererInitContext) -> anyhow::Result<()> {
        let groups = RtxShaderGroups::from_shaders(ctx.shaders)?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(RT_STAGES)
            .offset(0)
            .size(size_of::<RtxPushConstants>() as u32);
        let layout = Rc::new(GfxPipelineLayout::new(
            &self.device,
            ctx.resources.binding_manager().set_layouts(),
            std::slice::from_ref(&push_range),
            "rtx",
        )?);

        let stages = create_stage_infos(&self.device, &groups.stages)?;
        // 以设备允许的最大深度创建 pipeline，之后调整 max_depth 不需要重建
        let depth_limit = self
            .device
            .rt_pipeline_props()
            .max_ray_recursion_depth
            .clamp(1, RtxTraceState::MAX_RAY_DEPTH_LIMIT);
        let pipeline =
            GfxPipeline::new_ray_tracing(&self.device, &stages, &groups.groups, depth_limit, layout, "rtx")?;
        self.trace_state.set_depth_limit(depth_limit);
        let sbt = ShaderBindingTable::build(&self.device, &pipeline, groups.counts, "rtx")?;

        ctx.resources.pipeline = Some(pipeline);
        ctx.resources.sbt = Some(sbt);
        self.trace_state.reset_accumulation();
        Ok(())
    }

    fn shutdown_internal(&mut self) {
        self.trace_state.reset_accumulation();
    }

    fn descriptor_sources(&self) -> Vec<&dyn DescriptorSource> {
        let mut sources: Vec<&dyn DescriptorSource> = vec![&self.output];
        if let Some(environment) = &self.environment {
            sources.push(environment);
        }
        sources
    }

    fn record(
        &mut self,
        frame: &FrameContext,
        resources: &RendererResources,
        scene: &dyn RenderScene,
        _camera: &dyn RenderCamera,
    ) {
        let cmd = frame.cmd;
        cmd.begin_label("rtx", LabelColor::COLOR_PASS);

        self.output.transition(cmd, vk::ImageLayout::GENERAL, GfxBarrierMask::TRANSFER_SRC_TO_RAY_TRACING);

        if scene.tlas().is_none() {
            log::debug!("{} scene {} has no tlas, trace skipped", frame.frame_name, scene.id());
        } else if self.trace_state.should_trace() {
            let pipeline = resources.pipeline();
            let sbt = resources.sbt.as_ref().unwrap_or_else(|| panic!("rtx renderer has no SBT"));

            cmd.cmd_bind_pipeline(pipeline.bind_point(), pipeline.handle());
            resources.binding_manager().bind(cmd.vk_handle(), pipeline.bind_point(), pipeline.layout());
            cmd.cmd_push_constants(pipeline.layout(), RT_STAGES, 0, &self.trace_state.push_constants());
            cmd.cmd_trace_rays(
                sbt.region(SbtGroupKind::RayGen),
                sbt.region(SbtGroupKind::Miss),
                sbt.region(SbtGroupKind::Hit),
                sbt.region(SbtGroupKind::Callable),
                self.output.extent(),
            );
            self.trace_state.advance();
        }

        self.output.transition(cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, GfxBarrierMask::RAY_TRACING_TO_TRANSFER_SRC);
        cmd.end_label();
    }

    fn on_scene_activated(&mut self, _scene: &dyn RenderScene) {
        self.trace_state.reset_accumulation();
    }

    fn on_camera_moved(&mut self) {
        self.trace_state.reset_accumulation();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::descriptors::reflection::ShaderReflection;

    fn compiled(stage: ShaderStageKind, path: &str) -> CompiledShader {
        CompiledShader {
            path: PathBuf::from(path),
            stage,
            entry_point: "main".to_string(),
            spirv: vec![0x0723_0203],
            reflection: ShaderReflection::default(),
        }
    }

    #[test]
    fn test_groups_follow_stage_order() {
        // 编译顺序与 pipeline 中的 stage 顺序无关
        let shaders = PipelineShaders {
            shaders: vec![
                compiled(ShaderStageKind::ClosestHit, "hit"),
                compiled(ShaderStageKind::Miss, "sky"),
                compiled(ShaderStageKind::RayGen, "raygen"),
                compiled(ShaderStageKind::AnyHit, "alpha"),
                compiled(ShaderStageKind::Miss, "shadow"),
            ],
            ..Default::default()
        };

        let groups = RtxShaderGroups::from_shaders(&shaders).unwrap();
        let paths: Vec<_> = groups.stages.iter().map(|s| s.path.to_str().unwrap()).collect();
        assert_eq!(paths, vec!["raygen", "sky", "shadow", "hit", "alpha"]);

        assert_eq!(
            groups.counts,
            SbtGroupCounts {
                raygen: 1,
                miss: 2,
                hit: 1,
                callable: 0
            }
        );
        assert_eq!(groups.groups[0], GfxShaderGroupInfo::general(0));
        assert_eq!(groups.groups[2], GfxShaderGroupInfo::general(2));
        assert_eq!(groups.groups[3], GfxShaderGroupInfo::triangles_hit(3, Some(4)));
    }

    #[test]
    fn test_groups_without_optional_stages() {
        let shaders = PipelineShaders {
            shaders: vec![
                compiled(ShaderStageKind::RayGen, "raygen"),
                compiled(ShaderStageKind::Miss, "sky"),
                compiled(ShaderStageKind::ClosestHit, "hit"),
            ],
            ..Default::default()
        };

        let groups = RtxShaderGroups::from_shaders(&shaders).unwrap();
        assert_eq!(groups.groups[2].any_hit, vk::SHADER_UNUSED_KHR);
        assert_eq!(groups.counts.total(), 3);
    }

    #[test]
    fn test_raygen_is_required() {
        let shaders = PipelineShaders {
            shaders: vec![compiled(ShaderStageKind::Miss, "sky")],
            ..Default::default()
        };
        assert!(RtxShaderGroups::from_shaders(&shaders).is_err());
    }

    #[test]
    fn test_optional_requests() {
        let optional: Vec<_> = RtxShader::iter().filter(|s| s.value().2).map(|s| s.name()).collect();
        assert_eq!(optional, vec!["AlphaTest", "DiffuseCall"]);
    }
}
