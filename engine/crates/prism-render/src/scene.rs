//! renderer 与外部场景系统之间的边界
//!
//! 场景的加载与激活不在这里完成，这里只描述 renderer 需要从场景和相机拿到什么

use ash::vk;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;

use crate::descriptors::DescriptorSource;

/// 已经上传到 GPU 的场景
///
/// 通过 [`DescriptorSource`] 注册自己的资源（几何、材质、纹理、TLAS 等）
pub trait RenderScene: DescriptorSource {
    fn id(&self) -> u64;

    /// 光追使用的顶层加速结构
    fn tlas(&self) -> Option<vk::AccelerationStructureKHR>;

    /// 在已经绑定的 graphics pipeline 上录制所有 draw call
    fn record_draws(&self, cmd: &GfxCommandBuffer, pipeline_layout: vk::PipelineLayout);
}

pub trait RenderCamera: DescriptorSource {
    fn view_projection(&self) -> glam::Mat4;
    fn position(&self) -> glam::Vec3;
}

/// 外部提供当前激活的场景和相机
pub trait SceneProvider {
    fn active_scene(&self) -> Option<&dyn RenderScene>;
    fn active_camera(&self) -> Option<&dyn RenderCamera>;
}
