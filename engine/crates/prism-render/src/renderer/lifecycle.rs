use std::rc::Rc;

use anyhow::Context;

use crate::{
    descriptors::{
        DescriptorError, DescriptorSource, backend::DescriptorBackend, manager::DescriptorSetManager,
    },
    renderer::{FrameContext, sbt::ShaderBindingTable},
    scene::{RenderCamera, RenderScene, SceneProvider},
    shader::{PipelineShaders, ShaderCompileError, ShaderCompiler, ShaderRequests},
};
use prism_gfx::pipelines::pipeline::GfxPipeline;

/// 每个 pipeline 都会创建的 GPU 对象，由 [`RendererLifecycle`] 统一持有和释放
#[derive(Default)]
pub struct RendererResources {
    pub pipeline: Option<GfxPipeline>,
    pub sbt: Option<ShaderBindingTable>,
    pub binding_manager: Option<DescriptorSetManager>,
}

impl RendererResources {
    /// 释放顺序：pipeline -> SBT -> binding manager
    pub fn shutdown(&mut self) {
        self.pipeline = None;
        self.sbt = None;
        self.binding_manager = None;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pipeline.is_none() && self.sbt.is_none() && self.binding_manager.is_none()
    }

    /// 已经 bake 的 binding manager
    pub fn binding_manager(&self) -> &DescriptorSetManager {
        self.binding_manager.as_ref().unwrap_or_else(|| panic!("binding manager is not created"))
    }

    pub fn pipeline(&self) -> &GfxPipeline {
        self.pipeline.as_ref().unwrap_or_else(|| panic!("pipeline is not created"))
    }
}

impl Drop for RendererResources {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `init_internal` 可以访问的内容
pub struct RendererInitContext<'a> {
    pub shaders: &'a PipelineShaders,
    pub resources: &'a mut RendererResources,
}

/// 一种具体的 pipeline renderer 需要提供的能力
///
/// 通用的部分（shader 编译、binding manager、场景激活）由 [`RendererLifecycle`] 完成
pub trait PipelineRenderer {
    fn name(&self) -> &str;

    /// stage -> 编译请求
    fn get_shaders_for_compilation(&self) -> ShaderRequests;

    /// shader 编译完成、binding manager 已经 build 之后调用；创建 pipeline、SBT 等
    fn init_internal(&mut self, scene_id: u64, ctx: &mut RendererInitContext) -> anyhow::Result<()>;

    /// 通用资源释放之后调用
    fn shutdown_internal(&mut self);

    /// renderer 自己拥有的、需要注册到 binding manager 的资源（例如输出图像）
    fn descriptor_sources(&self) -> Vec<&dyn DescriptorSource>;

    fn record(
        &mut self,
        frame: &FrameContext,
        resources: &RendererResources,
        scene: &dyn RenderScene,
        camera: &dyn RenderCamera,
    );

    fn on_scene_activated(&mut self, _scene: &dyn RenderScene) {}

    fn on_camera_moved(&mut self) {}
}

/// 为每个 binding manager 创建 backend
pub type DescriptorBackendFactory = Box<dyn Fn(&str) -> Box<dyn DescriptorBackend>>;

/// renderer 的通用生命周期：init -> (scene activated -> record*)* -> shutdown
pub struct RendererLifecycle<P: PipelineRenderer> {
    renderer: P,
    resources: RendererResources,

    compiler: Rc<dyn ShaderCompiler>,
    backend_factory: DescriptorBackendFactory,

    initialized: bool,
    active_scene: Option<u64>,
}

// new & init & shutdown
impl<P: PipelineRenderer> RendererLifecycle<P> {
    pub fn new(renderer: P, compiler: Rc<dyn ShaderCompiler>, backend_factory: DescriptorBackendFactory) -> Self {
        Self {
            renderer,
            resources: RendererResources::default(),
            compiler,
            backend_factory,
            initialized: false,
            active_scene: None,
        }
    }

    /// 编译 shader，创建 binding manager，然后交给具体的 renderer 完成初始化
    ///
    /// 必需 stage 编译失败时返回错误，且不保留任何已经创建的资源
    pub fn init(&mut self, scene_id: u64) -> anyhow::Result<()> {
        assert!(!self.initialized, "renderer `{}` is already initialized", self.renderer.name());

        let result = self.init_inner(scene_id);
        if result.is_err() {
            self.resources.shutdown();
        }
        result
    }

    fn init_inner(&mut self, scene_id: u64) -> anyhow::Result<()> {
        let name = self.renderer.name().to_string();
        let shaders = self.compile_shaders(&name)?;

        let mut manager = DescriptorSetManager::new(&name, shaders.reflection.clone(), (self.backend_factory)(&name));
        manager.build().with_context(|| format!("renderer `{name}`: build binding manager"))?;
        self.resources.binding_manager = Some(manager);

        let mut ctx = RendererInitContext {
            shaders: &shaders,
            resources: &mut self.resources,
        };
        self.renderer
            .init_internal(scene_id, &mut ctx)
            .with_context(|| format!("renderer `{name}`: init for scene {scene_id}"))?;

        self.initialized = true;
        log::info!("renderer `{}` initialized for scene {}: {} shader stages", name, scene_id, shaders.shaders.len());
        Ok(())
    }

    fn compile_shaders(&self, name: &str) -> anyhow::Result<PipelineShaders> {
        let mut shaders = PipelineShaders::default();
        for (stage, requests) in self.renderer.get_shaders_for_compilation() {
            for mut request in requests {
                match self.compiler.compile(stage, &request) {
                    Ok(Some(compiled)) => {
                        if let Some(on_compiled) = request.on_compiled.take() {
                            on_compiled(&compiled, &mut shaders).map_err(|error| ShaderCompileError::Continuation {
                                path: request.path.clone(),
                                error,
                            })?;
                        }
                        shaders.shaders.push(compiled);
                    }
                    Ok(None) => {
                        log::info!("renderer `{}`: optional {:?} `{}` skipped", name, stage, request.path.display());
                    }
                    Err(err) if request.optional => {
                        log::warn!("renderer `{}`: optional {:?} stage omitted: {}", name, stage, err);
                    }
                    Err(err) => {
                        return Err(anyhow::Error::new(err)
                            .context(format!("renderer `{name}`: mandatory {stage:?} stage failed to compile")));
                    }
                }
            }
        }
        Ok(shaders)
    }

    /// 按 pipeline -> SBT -> binding manager 的顺序释放，然后调用 `shutdown_internal`
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.resources.shutdown();
        self.renderer.shutdown_internal();
        self.initialized = false;
        self.active_scene = None;
        log::info!("renderer `{}` shutdown", self.renderer.name());
    }
}
impl<P: PipelineRenderer> Drop for RendererLifecycle<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// 场景与每帧
impl<P: PipelineRenderer> RendererLifecycle<P> {
    /// 清空所有绑定，重新从场景、相机、renderer 自己的资源以及 `extra_sources` 收集，然后 bake
    ///
    /// 之前场景的绑定在新场景的资源加入之前就已经被清除
    pub fn on_scene_activated(
        &mut self,
        provider: &dyn SceneProvider,
        extra_sources: &[&dyn DescriptorSource],
    ) -> Result<(), DescriptorError> {
        let name = self.renderer.name().to_string();
        let scene = provider
            .active_scene()
            .unwrap_or_else(|| panic!("renderer `{name}`: scene activated without an active scene"));
        let camera = provider
            .active_camera()
            .unwrap_or_else(|| panic!("renderer `{name}`: scene activated without an active camera"));
        let manager = self
            .resources
            .binding_manager
            .as_mut()
            .unwrap_or_else(|| panic!("renderer `{name}` must be initialized before scene activation"));

        self.active_scene = None;
        manager.clear_resources();

        scene.add_descriptor_to(manager);
        camera.add_descriptor_to(manager);
        for source in self.renderer.descriptor_sources() {
            source.add_descriptor_to(manager);
        }
        for source in extra_sources {
            source.add_descriptor_to(manager);
        }
        manager.bake()?;

        self.renderer.on_scene_activated(scene);
        self.active_scene = Some(scene.id());
        log::info!("renderer `{}`: scene {} activated", name, scene.id());
        Ok(())
    }

    /// renderer 自己的资源发生变化（例如 resize 之后的输出图像），重新绑定当前场景
    pub fn rebind(
        &mut self,
        provider: &dyn SceneProvider,
        extra_sources: &[&dyn DescriptorSource],
    ) -> Result<(), DescriptorError> {
        if self.active_scene.is_none() {
            return Ok(());
        }
        self.on_scene_activated(provider, extra_sources)
    }

    pub fn record(&mut self, frame: &FrameContext, provider: &dyn SceneProvider) {
        let name = self.renderer.name();
        let active = self
            .active_scene
            .unwrap_or_else(|| panic!("renderer `{name}` has no active scene to draw"));
        let scene = provider
            .active_scene()
            .unwrap_or_else(|| panic!("renderer `{name}`: active scene {active} disappeared"));
        assert_eq!(scene.id(), active, "renderer `{name}`: scene switched without activation");
        let camera = provider
            .active_camera()
            .unwrap_or_else(|| panic!("renderer `{name}`: no active camera"));

        self.renderer.record(frame, &self.resources, scene, camera);
    }

    pub fn on_camera_moved(&mut self) {
        self.renderer.on_camera_moved();
    }
}

// getters
impl<P: PipelineRenderer> RendererLifecycle<P> {
    #[inline]
    pub fn renderer(&self) -> &P {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut P {
        &mut self.renderer
    }

    #[inline]
    pub fn resources(&self) -> &RendererResources {
        &self.resources
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn active_scene(&self) -> Option<u64> {
        self.active_scene
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::{HashMap, HashSet},
        path::PathBuf,
    };

    use ash::vk::{self, Handle};
    use prism_gfx::commands::command_buffer::GfxCommandBuffer;

    use super::*;
    use crate::{
        descriptors::{
            backend::headless::{DescriptorCalls, HeadlessDescriptorBackend},
            reflection::ShaderReflection,
            resource_binding::ResourceBinding,
        },
        shader::{CompiledShader, ShaderCompileRequest, ShaderStageKind},
    };

    #[derive(Default)]
    struct FakeCompiler {
        failing: HashSet<PathBuf>,
        missing: HashSet<PathBuf>,
        reflections: HashMap<PathBuf, &'static str>,
    }

    impl ShaderCompiler for FakeCompiler {
        fn compile(
            &self,
            stage: ShaderStageKind,
            request: &ShaderCompileRequest,
        ) -> Result<Option<CompiledShader>, ShaderCompileError> {
            if self.failing.contains(&request.path) {
                return Err(ShaderCompileError::NotFound {
                    path: request.path.clone(),
                });
            }
            if self.missing.contains(&request.path) {
                return Ok(None);
            }
            let reflection = match self.reflections.get(&request.path) {
                Some(json) => ShaderReflection::from_json(json, stage.vk_stage()).unwrap(),
                None => ShaderReflection::default(),
            };
            Ok(Some(CompiledShader {
                path: request.path.clone(),
                stage,
                entry_point: request.entry_point.clone(),
                spirv: vec![0x0723_0203],
                reflection,
            }))
        }
    }

    struct Named {
        name: &'static str,
        raw: u64,
    }

    impl DescriptorSource for Named {
        fn add_descriptor_to(&self, manager: &mut DescriptorSetManager) {
            if manager.find_resource_declaration(self.name).is_some() {
                manager.add_resource(self.name, ResourceBinding::buffer(vk::Buffer::from_raw(self.raw), 0, None));
            }
        }
    }

    struct FakeScene {
        id: u64,
        /// add 时 manager 中已有的绑定
        seen: RefCell<Vec<String>>,
    }

    impl DescriptorSource for FakeScene {
        fn add_descriptor_to(&self, manager: &mut DescriptorSetManager) {
            *self.seen.borrow_mut() = manager.bound_names().map(str::to_string).collect();
            manager.add_resource("scene_data", ResourceBinding::buffer(vk::Buffer::from_raw(100 + self.id), 0, None));
        }
    }

    impl RenderScene for FakeScene {
        fn id(&self) -> u64 {
            self.id
        }

        fn tlas(&self) -> Option<vk::AccelerationStructureKHR> {
            None
        }

        fn record_draws(&self, _cmd: &GfxCommandBuffer, _pipeline_layout: vk::PipelineLayout) {}
    }

    struct FakeCamera(Named);

    impl DescriptorSource for FakeCamera {
        fn add_descriptor_to(&self, manager: &mut DescriptorSetManager) {
            self.0.add_descriptor_to(manager);
        }
    }

    impl RenderCamera for FakeCamera {
        fn view_projection(&self) -> glam::Mat4 {
            glam::Mat4::IDENTITY
        }

        fn position(&self) -> glam::Vec3 {
            glam::Vec3::ZERO
        }
    }

    struct FakeProvider {
        scene: Option<FakeScene>,
        camera: Option<FakeCamera>,
    }

    impl FakeProvider {
        fn new(scene_id: u64) -> Self {
            Self {
                scene: Some(FakeScene {
                    id: scene_id,
                    seen: RefCell::new(vec![]),
                }),
                camera: Some(FakeCamera(Named { name: "camera", raw: 7 })),
            }
        }
    }

    impl SceneProvider for FakeProvider {
        fn active_scene(&self) -> Option<&dyn RenderScene> {
            self.scene.as_ref().map(|s| s as &dyn RenderScene)
        }

        fn active_camera(&self) -> Option<&dyn RenderCamera> {
            self.camera.as_ref().map(|c| c as &dyn RenderCamera)
        }
    }

    struct FakeRenderer {
        output: Named,
        optional_continued: Rc<Cell<bool>>,
        init_calls: Rc<Cell<u32>>,
        shutdown_calls: Rc<Cell<u32>>,
        activations: Vec<u64>,
    }

    impl PipelineRenderer for FakeRenderer {
        fn name(&self) -> &str {
            "fake"
        }

        fn get_shaders_for_compilation(&self) -> ShaderRequests {
            let flag = self.optional_continued.clone();
            let mut requests = ShaderRequests::new();
            requests.insert(
                ShaderStageKind::Vertex,
                vec![ShaderCompileRequest::new("tri.vert.spv", "main").with_reflection()],
            );
            requests.insert(
                ShaderStageKind::Fragment,
                vec![
                    ShaderCompileRequest::new("tri.frag.spv", "main").with_reflection(),
                    ShaderCompileRequest::new("debug.frag.spv", "main").optional().on_compiled(move |_, _| {
                        flag.set(true);
                        Ok(())
                    }),
                ],
            );
            requests
        }

        fn init_internal(&mut self, _scene_id: u64, ctx: &mut RendererInitContext) -> anyhow::Result<()> {
            assert!(ctx.resources.binding_manager.is_some());
            self.init_calls.set(self.init_calls.get() + 1);
            Ok(())
        }

        fn shutdown_internal(&mut self) {
            self.shutdown_calls.set(self.shutdown_calls.get() + 1);
        }

        fn descriptor_sources(&self) -> Vec<&dyn DescriptorSource> {
            vec![&self.output]
        }

        fn record(&mut self, _: &FrameContext, _: &RendererResources, _: &dyn RenderScene, _: &dyn RenderCamera) {}

        fn on_scene_activated(&mut self, scene: &dyn RenderScene) {
            self.activations.push(scene.id());
        }
    }

    const VERT_JSON: &str = r#"{ "declarations": [
        { "name": "camera", "set": 0, "binding": 0, "kind": "uniform_buffer" },
        { "name": "scene_data", "set": 1, "binding": 0, "kind": "storage_buffer" }
    ] }"#;
    const FRAG_JSON: &str = r#"{ "declarations": [
        { "name": "camera", "set": 0, "binding": 0, "kind": "uniform_buffer" },
        { "name": "raster_output", "set": 0, "binding": 1, "kind": "storage_buffer" }
    ] }"#;

    struct Harness {
        lifecycle: RendererLifecycle<FakeRenderer>,
        calls: Rc<RefCell<Option<Rc<RefCell<DescriptorCalls>>>>>,
        optional_continued: Rc<Cell<bool>>,
        init_calls: Rc<Cell<u32>>,
        shutdown_calls: Rc<Cell<u32>>,
    }

    impl Harness {
        fn descriptor_calls(&self) -> Rc<RefCell<DescriptorCalls>> {
            self.calls.borrow().clone().unwrap()
        }
    }

    fn harness(compiler: FakeCompiler) -> Harness {
        prism_crate_tools::init_log::try_init_log();
        let optional_continued = Rc::new(Cell::new(false));
        let init_calls = Rc::new(Cell::new(0));
        let shutdown_calls = Rc::new(Cell::new(0));
        let renderer = FakeRenderer {
            output: Named {
                name: "raster_output",
                raw: 9,
            },
            optional_continued: optional_continued.clone(),
            init_calls: init_calls.clone(),
            shutdown_calls: shutdown_calls.clone(),
            activations: vec![],
        };

        let calls = Rc::new(RefCell::new(None));
        let factory_calls = calls.clone();
        let factory: DescriptorBackendFactory = Box::new(move |_| {
            let (backend, backend_calls) = HeadlessDescriptorBackend::new();
            *factory_calls.borrow_mut() = Some(backend_calls);
            Box::new(backend)
        });

        Harness {
            lifecycle: RendererLifecycle::new(renderer, Rc::new(compiler), factory),
            calls,
            optional_continued,
            init_calls,
            shutdown_calls,
        }
    }

    fn compiler_with_reflections() -> FakeCompiler {
        FakeCompiler {
            reflections: HashMap::from([
                (PathBuf::from("tri.vert.spv"), VERT_JSON),
                (PathBuf::from("tri.frag.spv"), FRAG_JSON),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn test_init_merges_reflection() {
        let mut h = harness(compiler_with_reflections());
        h.lifecycle.init(1).unwrap();

        assert!(h.lifecycle.is_initialized());
        assert_eq!(h.init_calls.get(), 1);
        assert!(h.optional_continued.get());
        let manager = h.lifecycle.resources().binding_manager();
        assert_eq!(manager.reflection().declarations.len(), 3);
        let camera = manager.find_resource_declaration("camera").unwrap();
        assert_eq!(camera.stages, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(h.descriptor_calls().borrow().layout_descs.len(), 2);
    }

    #[test]
    fn test_mandatory_stage_failure_is_fatal() {
        let mut compiler = compiler_with_reflections();
        compiler.failing.insert(PathBuf::from("tri.frag.spv"));
        let mut h = harness(compiler);

        let err = h.lifecycle.init(1).unwrap_err();
        assert!(format!("{err:#}").contains("mandatory Fragment stage"));
        assert!(!h.lifecycle.is_initialized());
        assert!(h.lifecycle.resources().is_empty());
        assert_eq!(h.init_calls.get(), 0);
    }

    #[test]
    fn test_optional_stage_failure_is_omitted() {
        let mut compiler = compiler_with_reflections();
        compiler.failing.insert(PathBuf::from("debug.frag.spv"));
        let mut h = harness(compiler);

        h.lifecycle.init(1).unwrap();
        assert!(!h.optional_continued.get());
        assert_eq!(h.init_calls.get(), 1);
    }

    #[test]
    fn test_skipped_stage_does_not_continue() {
        let mut compiler = compiler_with_reflections();
        compiler.missing.insert(PathBuf::from("debug.frag.spv"));
        let mut h = harness(compiler);

        h.lifecycle.init(1).unwrap();
        assert!(!h.optional_continued.get());
    }

    #[test]
    fn test_scene_switch_clears_previous_bindings() {
        let mut h = harness(compiler_with_reflections());
        h.lifecycle.init(1).unwrap();

        let scene_a = FakeProvider::new(1);
        h.lifecycle.on_scene_activated(&scene_a, &[]).unwrap();
        assert_eq!(h.lifecycle.active_scene(), Some(1));
        {
            let manager = h.lifecycle.resources().binding_manager();
            assert!(manager.is_baked());
            let names: Vec<_> = manager.bound_names().collect();
            assert_eq!(names, vec!["scene_data", "camera", "raster_output"]);
        }

        let scene_b = FakeProvider::new(2);
        h.lifecycle.on_scene_activated(&scene_b, &[]).unwrap();
        assert!(scene_b.scene.as_ref().unwrap().seen.borrow().is_empty());

        let manager = h.lifecycle.resources().binding_manager();
        match manager.find_resource_binding(1, 0) {
            Some(ResourceBinding::Buffers(infos)) => assert_eq!(infos[0].buffer, vk::Buffer::from_raw(102)),
            other => panic!("unexpected binding {other:?}"),
        }

        let calls = h.descriptor_calls();
        let calls = calls.borrow();
        assert_eq!(calls.releases, 1);
        assert_eq!(calls.allocations, 2);
        assert_eq!(h.lifecycle.renderer().activations, vec![1, 2]);
    }

    #[test]
    fn test_bake_failure_leaves_no_active_scene() {
        let mut h = harness(compiler_with_reflections());
        h.lifecycle.init(1).unwrap();

        let mut provider = FakeProvider::new(1);
        provider.camera = Some(FakeCamera(Named { name: "unused", raw: 1 }));
        assert!(matches!(
            h.lifecycle.on_scene_activated(&provider, &[]),
            Err(DescriptorError::MissingBinding { .. })
        ));
        assert_eq!(h.lifecycle.active_scene(), None);
    }

    #[test]
    #[should_panic(expected = "without an active camera")]
    fn test_activation_requires_camera() {
        let mut h = harness(compiler_with_reflections());
        h.lifecycle.init(1).unwrap();

        let mut provider = FakeProvider::new(1);
        provider.camera = None;
        let _ = h.lifecycle.on_scene_activated(&provider, &[]);
    }

    #[test]
    fn test_shutdown_releases_everything_once() {
        let mut h = harness(compiler_with_reflections());
        h.lifecycle.init(1).unwrap();
        h.lifecycle.on_scene_activated(&FakeProvider::new(1), &[]).unwrap();

        h.lifecycle.shutdown();
        assert!(h.lifecycle.resources().is_empty());
        assert_eq!(h.lifecycle.active_scene(), None);
        assert_eq!(h.shutdown_calls.get(), 1);

        h.lifecycle.shutdown();
        assert_eq!(h.shutdown_calls.get(), 1);

        h.lifecycle.init(2).unwrap();
        assert_eq!(h.init_calls.get(), 2);
    }
}
