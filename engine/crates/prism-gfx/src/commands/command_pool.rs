use std::rc::Rc;

use ash::vk;

use crate::{
    commands::command_buffer::GfxCommandBuffer,
    foundation::{debug::DebugType, device::GfxDevice},
};

/// command pool 是和 queue family 绑定的，而不是和 queue 绑定的
pub struct GfxCommandPool {
    handle: vk::CommandPool,
    device: Rc<GfxDevice>,
    debug_name: String,
}
// init & destroy
impl GfxCommandPool {
    pub fn new(device: &Rc<GfxDevice>, flags: vk::CommandPoolCreateFlags, debug_name: &str) -> anyhow::Result<Self> {
        let pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(device.queue_family_index()).flags(flags),
                None,
            )?
        };

        let command_pool = Self {
            handle: pool,
            device: device.clone(),
            debug_name: debug_name.to_string(),
        };
        device.set_debug_name(&command_pool, debug_name);
        Ok(command_pool)
    }
}
impl Drop for GfxCommandPool {
    fn drop(&mut self) {
        log::debug!("destroying command pool: {}", self.debug_name);
        // pool 销毁时，其中分配的 command buffer 会一起被释放
        unsafe { self.device.destroy_command_pool(self.handle, None) };
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }
}

// tools
impl GfxCommandPool {
    pub fn alloc_command_buffer(&self, debug_name: &str) -> anyhow::Result<GfxCommandBuffer> {
        GfxCommandBuffer::new(&self.device, self, debug_name)
    }

    /// 这个调用并不会释放资源，而是将 pool 内的 command buffer 设置到初始状态
    pub fn reset_all_buffers(&self) {
        unsafe {
            self.device
                .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())
                .unwrap_or_else(|e| panic!("reset command pool failed: {:?}", e));
        }
    }
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
