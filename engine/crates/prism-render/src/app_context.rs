use std::{rc::Rc, sync::Arc};

use prism_gfx::foundation::device::GfxDevice;

use crate::{
    descriptors::backend::VulkanDescriptorBackend,
    events::EventBus,
    renderer::lifecycle::DescriptorBackendFactory,
    settings::RendererSettings,
    shader::{ShaderCompiler, spirv_compiler::SpirvShaderCompiler},
};

/// 启动时创建一次的应用上下文，以引用的方式传给需要它的组件
///
/// 取代全局单例：初始化顺序就是构造顺序
pub struct AppContext {
    pub device: Rc<GfxDevice>,
    /// 场景加载的 worker 线程持有它的 clone 来发布通知
    pub events: Arc<EventBus>,
    pub settings: RendererSettings,
    pub shader_compiler: Rc<dyn ShaderCompiler>,
}

impl AppContext {
    /// 使用 settings 中的 shader 目录创建 SPIR-V 加载器
    pub fn new(device: Rc<GfxDevice>, settings: RendererSettings) -> Self {
        let shader_dir = settings.shader_dir();
        log::info!("shader directory: {}", shader_dir.display());
        Self {
            device,
            events: Arc::new(EventBus::new()),
            shader_compiler: Rc::new(SpirvShaderCompiler::new(shader_dir)),
            settings,
        }
    }

    pub fn with_shader_compiler(mut self, compiler: Rc<dyn ShaderCompiler>) -> Self {
        self.shader_compiler = compiler;
        self
    }

    /// 每个 binding manager 使用一个独立的 Vulkan backend
    pub fn descriptor_backend_factory(&self) -> DescriptorBackendFactory {
        let device = self.device.clone();
        Box::new(move |name| Box::new(VulkanDescriptorBackend::new(&device, name)))
    }
}
