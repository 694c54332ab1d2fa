//! pipeline renderer：通用生命周期 + raster / 光追两种实现

pub mod lifecycle;
pub mod output_image;
pub mod raster_renderer;
pub mod rtx_renderer;
pub mod sbt;
pub mod trace_state;

use std::{ffi::CString, rc::Rc};

use anyhow::Context;
use ash::vk;
use prism_gfx::{
    commands::command_buffer::GfxCommandBuffer,
    foundation::device::GfxDevice,
    pipelines::shader::{GfxShaderModule, GfxShaderStageInfo},
};

use crate::shader::CompiledShader;

/// 录制一帧时 renderer 可以使用的内容
pub struct FrameContext<'a> {
    pub cmd: &'a GfxCommandBuffer,
    pub frame_id: u64,
    pub frame_name: String,
    pub extent: vk::Extent2D,

    /// ring buffer 持有的深度图，所有 slot 共享
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
    pub depth_format: vk::Format,
}

/// 把编译结果转换成 pipeline 的 stage；shader module 在 pipeline 创建之后即可 drop
pub(crate) fn create_stage_infos(
    device: &Rc<GfxDevice>,
    shaders: &[&CompiledShader],
) -> anyhow::Result<Vec<GfxShaderStageInfo>> {
    shaders
        .iter()
        .map(|shader| {
            let debug_name = format!("{}::{}", shader.path.display(), shader.entry_point);
            Ok(GfxShaderStageInfo {
                stage: shader.stage.vk_stage(),
                module: GfxShaderModule::from_spirv(device, &shader.spirv, &debug_name)?,
                entry_point: CString::new(shader.entry_point.as_str())
                    .with_context(|| format!("entry point of {debug_name}"))?,
            })
        })
        .collect()
}

/// 深度模板格式在 layout 转换时需要同时包含 stencil aspect
pub(crate) fn depth_barrier_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_barrier_aspect() {
        assert_eq!(depth_barrier_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_barrier_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
