use std::rc::Rc;

use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

/// # Destroy
/// 持有 device，drop 时自动销毁
pub struct GfxFence {
    fence: vk::Fence,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: &Rc<GfxDevice>, signaled: bool, debug_name: &str) -> anyhow::Result<Self> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None)? };

        let fence = Self {
            fence,
            device: device.clone(),
        };
        device.set_debug_name(&fence, debug_name);
        Ok(fence)
    }
}
impl Drop for GfxFence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    #[inline]
    pub fn wait(&self) {
        unsafe {
            self.device
                .wait_for_fences(std::slice::from_ref(&self.fence), true, u64::MAX)
                .unwrap_or_else(|e| panic!("wait fence failed: {:?}", e));
        }
    }

    #[inline]
    pub fn reset(&self) {
        unsafe {
            self.device
                .reset_fences(std::slice::from_ref(&self.fence))
                .unwrap_or_else(|e| panic!("reset fence failed: {:?}", e));
        }
    }

    /// 非阻塞查询
    #[inline]
    pub fn is_signaled(&self) -> bool {
        unsafe { self.device.get_fence_status(self.fence).unwrap_or_else(|e| panic!("fence status failed: {:?}", e)) }
    }
}
