use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: Rc<GfxDevice>,
}

impl GfxDescriptorSetLayout {
    pub fn new(
        device: &Rc<GfxDevice>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let handle = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .with_context(|| format!("create descriptor set layout {debug_name}"))?
        };

        let layout = Self {
            handle,
            device: device.clone(),
        };
        device.set_debug_name(&layout, debug_name);
        Ok(layout)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}
impl Drop for GfxDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.handle, None) };
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
