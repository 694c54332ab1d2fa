use std::rc::Rc;

use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

/// binary semaphore，用于 GPU-GPU 之间的同步（acquire -> submit -> present）
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
    device: Rc<GfxDevice>,
}

// 创建与销毁
impl GfxSemaphore {
    pub fn new(device: &Rc<GfxDevice>, debug_name: &str) -> anyhow::Result<Self> {
        let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };

        let semaphore = Self {
            semaphore,
            device: device.clone(),
        };
        device.set_debug_name(&semaphore, debug_name);
        Ok(semaphore)
    }
}
impl Drop for GfxSemaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

// getters
impl GfxSemaphore {
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl DebugType for GfxSemaphore {
    fn debug_type_name() -> &'static str {
        "GfxSemaphore"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.semaphore
    }
}
