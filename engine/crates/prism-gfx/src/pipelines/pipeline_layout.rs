use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
    device: Rc<GfxDevice>,
}
impl GfxPipelineLayout {
    pub fn new(
        device: &Rc<GfxDevice>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        debug_name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let handle = unsafe {
            device
                .create_pipeline_layout(&create_info, None)
                .with_context(|| format!("create pipeline layout {}", debug_name.as_ref()))?
        };

        let layout = Self {
            handle,
            device: device.clone(),
        };
        device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}
impl Drop for GfxPipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_pipeline_layout(self.handle, None) };
    }
}
impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
