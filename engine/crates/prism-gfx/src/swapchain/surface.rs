use std::rc::Rc;

use anyhow::Context;
use ash::vk;

use crate::foundation::{debug::DebugType, device::GfxDevice};

pub struct GfxSurface {
    handle: vk::SurfaceKHR,
    device: Rc<GfxDevice>,
}

impl GfxSurface {
    pub fn new(
        device: &Rc<GfxDevice>,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> anyhow::Result<Self> {
        let handle = unsafe {
            ash_window::create_surface(device.entry(), device.instance(), raw_display_handle, raw_window_handle, None)
                .context("create window surface")?
        };

        let surface = GfxSurface {
            handle,
            device: device.clone(),
        };
        device.set_debug_name(&surface, "main");
        Ok(surface)
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// 每次 resize 都需要重新查询
    pub fn get_capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        unsafe {
            self.device
                .surface()
                .get_physical_device_surface_capabilities(self.device.physical_device(), self.handle)
                .unwrap_or_else(|e| panic!("query surface capabilities failed: {:?}", e))
        }
    }

    pub fn supported_formats(&self) -> Vec<vk::SurfaceFormatKHR> {
        unsafe {
            self.device
                .surface()
                .get_physical_device_surface_formats(self.device.physical_device(), self.handle)
                .unwrap_or_default()
        }
    }

    pub fn supported_present_modes(&self) -> Vec<vk::PresentModeKHR> {
        unsafe {
            self.device
                .surface()
                .get_physical_device_surface_present_modes(self.device.physical_device(), self.handle)
                .unwrap_or_default()
        }
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.device.surface().destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
