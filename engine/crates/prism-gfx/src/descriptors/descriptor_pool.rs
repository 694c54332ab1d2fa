use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

/// descriptor pool 销毁时，其中分配的 set 一起失效
pub struct GfxDescriptorPool {
    handle: vk::DescriptorPool,
    device: Rc<GfxDevice>,
}

impl GfxDescriptorPool {
    pub fn new(
        device: &Rc<GfxDevice>,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
        debug_name: &str,
    ) -> anyhow::Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default().pool_sizes(pool_sizes).max_sets(max_sets);
        let handle = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .with_context(|| format!("create descriptor pool {debug_name}"))?
        };

        let pool = Self {
            handle,
            device: device.clone(),
        };
        device.set_debug_name(&pool, debug_name);
        Ok(pool)
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    /// 每个 layout 分配一个 set，顺序与 layouts 一致
    pub fn allocate_sets(&self, layouts: &[vk::DescriptorSetLayout]) -> anyhow::Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.handle).set_layouts(layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info).context("allocate descriptor sets")? };
        Ok(sets)
    }
}
impl Drop for GfxDescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.handle, None) };
    }
}
impl DebugType for GfxDescriptorPool {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
