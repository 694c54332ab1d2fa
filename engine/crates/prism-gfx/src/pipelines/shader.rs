use std::{ffi::CString, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

/// 只在创建 pipeline 期间存在，pipeline 创建完成后即可 drop
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    device: Rc<GfxDevice>,
}
impl GfxShaderModule {
    /// # param
    /// * spirv - 已经编译好的 SPIR-V 字
    pub fn from_spirv(device: &Rc<GfxDevice>, spirv: &[u32], debug_name: &str) -> anyhow::Result<Self> {
        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let handle = unsafe {
            device
                .create_shader_module(&shader_module_info, None)
                .with_context(|| format!("create shader module {debug_name}"))?
        };

        let shader_module = Self {
            handle,
            device: device.clone(),
        };
        device.set_debug_name(&shader_module, debug_name);
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}
impl Drop for GfxShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}
impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// pipeline 中的一个 stage：module + entry point
pub struct GfxShaderStageInfo {
    pub stage: vk::ShaderStageFlags,
    pub module: GfxShaderModule,
    pub entry_point: CString,
}
impl GfxShaderStageInfo {
    #[inline]
    pub fn create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.module.handle())
            .name(self.entry_point.as_c_str())
    }
}

/// 光追管线的 shader group，字段是 stage 数组中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxShaderGroupInfo {
    pub ty: vk::RayTracingShaderGroupTypeKHR,
    pub general: u32,
    pub closest_hit: u32,
    pub any_hit: u32,
    pub intersection: u32,
}
impl GfxShaderGroupInfo {
    #[inline]
    pub fn unused() -> u32 {
        vk::SHADER_UNUSED_KHR
    }

    /// raygen / miss / callable
    pub fn general(stage_index: u32) -> Self {
        Self {
            ty: vk::RayTracingShaderGroupTypeKHR::GENERAL,
            general: stage_index,
            closest_hit: Self::unused(),
            any_hit: Self::unused(),
            intersection: Self::unused(),
        }
    }

    pub fn triangles_hit(closest_hit: u32, any_hit: Option<u32>) -> Self {
        Self {
            ty: vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP,
            general: Self::unused(),
            closest_hit,
            any_hit: any_hit.unwrap_or(Self::unused()),
            intersection: Self::unused(),
        }
    }

    #[inline]
    pub fn create_info(&self) -> vk::RayTracingShaderGroupCreateInfoKHR<'static> {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(self.ty)
            .general_shader(self.general)
            .closest_hit_shader(self.closest_hit)
            .any_hit_shader(self.any_hit)
            .intersection_shader(self.intersection)
    }
}
