use std::{ffi::CString, mem::ManuallyDrop, ops::Deref, rc::Rc};

use anyhow::Context;
use ash::vk;

use crate::foundation::debug::{DebugType, object_name_info};

/// 由宿主（窗口/启动层）创建好的 Vulkan 对象，交给 [`GfxDevice`] 接管
///
/// instance 与 device 的创建（扩展、feature 选择）不属于这一层。
pub struct GfxDeviceCreateInfo {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// 同时支持 graphics 与 present 的 queue family
    pub queue_family_index: u32,
    /// instance 是否启用了 `VK_EXT_debug_utils`
    pub debug_utils: bool,
}

/// 光追管线相关的物理设备属性，SBT 布局计算需要用到
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GfxRtPipelineProps {
    pub shader_group_handle_size: u32,
    pub shader_group_handle_alignment: u32,
    pub shader_group_base_alignment: u32,
    pub max_ray_recursion_depth: u32,
}

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API、扩展函数指针、内存分配器以及主队列。
/// 通过 `Rc<GfxDevice>` 在各个 GFX 对象之间共享，代替全局单例。
///
/// # 扩展支持
/// - Dynamic Rendering (KHR)
/// - Acceleration Structure (KHR)
/// - Ray Tracing Pipeline (KHR)
/// - Debug Utils (EXT)，可选
/// - Swapchain (KHR)
pub struct GfxDevice {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,

    queue: vk::Queue,
    queue_family_index: u32,

    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    acceleration_structure: ash::khr::acceleration_structure::Device,
    ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device,
    swapchain: ash::khr::swapchain::Device,
    surface: ash::khr::surface::Instance,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    rt_pipeline_props: GfxRtPipelineProps,
    limits: vk::PhysicalDeviceLimits,

    /// 必须先于 device 销毁
    allocator: ManuallyDrop<vk_mem::Allocator>,
}

// 构造与销毁
impl GfxDevice {
    pub fn new(ci: GfxDeviceCreateInfo) -> anyhow::Result<Rc<Self>> {
        let GfxDeviceCreateInfo {
            entry,
            instance,
            physical_device,
            device,
            queue_family_index,
            debug_utils,
        } = ci;

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let mut rt_props = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut rt_props);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut props2) };
        let limits = props2.properties.limits;
        let rt_pipeline_props = GfxRtPipelineProps {
            shader_group_handle_size: rt_props.shader_group_handle_size,
            shader_group_handle_alignment: rt_props.shader_group_handle_alignment,
            shader_group_base_alignment: rt_props.shader_group_base_alignment,
            max_ray_recursion_depth: rt_props.max_ray_recursion_depth,
        };
        log::info!("ray tracing pipeline props: {:?}", rt_pipeline_props);

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(&instance, &device, physical_device);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        vma_ci.flags = vk_mem::AllocatorCreateFlags::BUFFER_DEVICE_ADDRESS;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci) }.context("create vk-mem allocator")?;

        Ok(Rc::new(Self {
            dynamic_rendering: ash::khr::dynamic_rendering::Device::new(&instance, &device),
            acceleration_structure: ash::khr::acceleration_structure::Device::new(&instance, &device),
            ray_tracing_pipeline: ash::khr::ray_tracing_pipeline::Device::new(&instance, &device),
            swapchain: ash::khr::swapchain::Device::new(&instance, &device),
            surface: ash::khr::surface::Instance::new(&entry, &instance),
            debug_utils: debug_utils.then(|| ash::ext::debug_utils::Device::new(&instance, &device)),

            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            rt_pipeline_props,
            limits,
            allocator: ManuallyDrop::new(allocator),
        }))
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        log::info!("destroying device");
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }
    #[inline]
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
    #[inline]
    pub fn dynamic_rendering(&self) -> &ash::khr::dynamic_rendering::Device {
        &self.dynamic_rendering
    }
    #[inline]
    pub fn acceleration_structure(&self) -> &ash::khr::acceleration_structure::Device {
        &self.acceleration_structure
    }
    #[inline]
    pub fn ray_tracing_pipeline(&self) -> &ash::khr::ray_tracing_pipeline::Device {
        &self.ray_tracing_pipeline
    }
    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }
    #[inline]
    pub fn surface(&self) -> &ash::khr::surface::Instance {
        &self.surface
    }
    #[inline]
    pub fn allocator(&self) -> &vk_mem::Allocator {
        &self.allocator
    }
    #[inline]
    pub fn rt_pipeline_props(&self) -> GfxRtPipelineProps {
        self.rt_pipeline_props
    }
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }
}

// tools
impl GfxDevice {
    /// 在候选格式中找到第一个支持 optimal tiling 下指定 feature 的格式
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|format| {
            let props = unsafe { self.instance.get_physical_device_format_properties(self.physical_device, *format) };
            props.optimal_tiling_features.contains(features)
        })
    }

    /// 没有启用 debug utils 时什么也不做
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.as_ref()) else {
            log::warn!("debug name contains nul byte: {}", name.as_ref());
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(&object_name_info(handle, name.as_c_str()))
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    #[inline]
    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    /// command buffer 中的 label，用于 RenderDoc / Nsight 分析
    pub fn cmd_begin_label(&self, command_buffer: vk::CommandBuffer, label: &str, color: [f32; 4]) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(label) else {
            return;
        };
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                command_buffer,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(color),
            );
        }
    }

    pub fn cmd_end_label(&self, command_buffer: vk::CommandBuffer) {
        if let Some(debug_utils) = &self.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(command_buffer) };
        }
    }

    /// device 级别的失败没有恢复路径
    #[inline]
    pub fn wait_idle(&self) {
        unsafe {
            self.device.device_wait_idle().unwrap_or_else(|e| panic!("device wait idle failed: {:?}", e));
        }
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
