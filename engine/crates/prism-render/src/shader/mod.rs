//! shader 编译请求与编译结果
//!
//! 编译本身不在这里完成：[`ShaderCompiler`] 负责把请求变成 SPIR-V + 反射数据，
//! renderer lifecycle 只关心结果如何流向 pipeline 与 binding manager

pub mod spirv_compiler;

use std::path::PathBuf;

use ash::vk;
use indexmap::IndexMap;

use crate::descriptors::{DescriptorError, reflection::ShaderReflection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStageKind {
    Vertex,
    Fragment,
    Compute,
    RayGen,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
    Callable,
}

impl ShaderStageKind {
    pub fn vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Compute => vk::ShaderStageFlags::COMPUTE,
            Self::RayGen => vk::ShaderStageFlags::RAYGEN_KHR,
            Self::Miss => vk::ShaderStageFlags::MISS_KHR,
            Self::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            Self::AnyHit => vk::ShaderStageFlags::ANY_HIT_KHR,
            Self::Intersection => vk::ShaderStageFlags::INTERSECTION_KHR,
            Self::Callable => vk::ShaderStageFlags::CALLABLE_KHR,
        }
    }

    pub fn is_ray_tracing(self) -> bool {
        matches!(
            self,
            Self::RayGen | Self::Miss | Self::ClosestHit | Self::AnyHit | Self::Intersection | Self::Callable
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderCompileError {
    #[error("shader `{}` not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("shader `{}` is not valid SPIR-V: {source}", .path.display())]
    InvalidSpirv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reflection of `{}` failed: {error:#}", .path.display())]
    Reflection { path: PathBuf, error: anyhow::Error },

    #[error("continuation of `{}` failed: {error:#}", .path.display())]
    Continuation { path: PathBuf, error: anyhow::Error },
}

/// 编译完成的一个 stage
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub path: PathBuf,
    pub stage: ShaderStageKind,
    pub entry_point: String,
    pub spirv: Vec<u32>,
    pub reflection: ShaderReflection,
}

/// 一个 pipeline 所有成功编译的 stage，以及合并后的反射数据
#[derive(Debug, Default)]
pub struct PipelineShaders {
    pub shaders: Vec<CompiledShader>,
    pub reflection: ShaderReflection,
}

impl PipelineShaders {
    pub fn merge_reflection(&mut self, shader: &CompiledShader) -> Result<(), DescriptorError> {
        self.reflection.merge(&shader.reflection)
    }

    /// 某个 stage 的全部 shader，按编译顺序
    pub fn stage(&self, stage: ShaderStageKind) -> impl Iterator<Item = &CompiledShader> {
        self.shaders.iter().filter(move |shader| shader.stage == stage)
    }

    pub fn has_stage(&self, stage: ShaderStageKind) -> bool {
        self.stage(stage).next().is_some()
    }
}

/// 编译成功后的回调
pub type OnCompiled = Box<dyn FnOnce(&CompiledShader, &mut PipelineShaders) -> anyhow::Result<()>>;

pub struct ShaderCompileRequest {
    pub path: PathBuf,
    pub entry_point: String,
    /// optional 的 stage 编译失败时只记录日志，pipeline 中不包含该 stage
    pub optional: bool,
    pub on_compiled: Option<OnCompiled>,
}

impl ShaderCompileRequest {
    pub fn new(path: impl Into<PathBuf>, entry_point: &str) -> Self {
        Self {
            path: path.into(),
            entry_point: entry_point.to_string(),
            optional: false,
            on_compiled: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn on_compiled(
        mut self,
        f: impl FnOnce(&CompiledShader, &mut PipelineShaders) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_compiled = Some(Box::new(f));
        self
    }

    /// 编译成功后把该 stage 的反射数据并入 pipeline 的 binding 声明
    pub fn with_reflection(self) -> Self {
        self.on_compiled(|shader, pipeline_shaders| Ok(pipeline_shaders.merge_reflection(shader)?))
    }
}

impl std::fmt::Debug for ShaderCompileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCompileRequest")
            .field("path", &self.path)
            .field("entry_point", &self.entry_point)
            .field("optional", &self.optional)
            .field("on_compiled", &self.on_compiled.is_some())
            .finish()
    }
}

/// stage -> 该 stage 的全部请求，保持插入顺序（决定光追 stage 的下标）
pub type ShaderRequests = IndexMap<ShaderStageKind, Vec<ShaderCompileRequest>>;

pub trait ShaderCompiler {
    /// # 返回值
    /// - `Ok(Some(..))` 编译成功
    /// - `Ok(None)` 跳过：optional 的请求，对应的产物不存在
    /// - `Err(..)` 编译失败
    fn compile(
        &self,
        stage: ShaderStageKind,
        request: &ShaderCompileRequest,
    ) -> Result<Option<CompiledShader>, ShaderCompileError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStageKind::RayGen.vk_stage(), vk::ShaderStageFlags::RAYGEN_KHR);
        assert_eq!(ShaderStageKind::Fragment.vk_stage(), vk::ShaderStageFlags::FRAGMENT);
        assert!(ShaderStageKind::Callable.is_ray_tracing());
        assert!(!ShaderStageKind::Vertex.is_ray_tracing());
    }

    #[test]
    fn test_with_reflection_merges() {
        let shader = CompiledShader {
            path: PathBuf::from("rt/raygen.spv"),
            stage: ShaderStageKind::RayGen,
            entry_point: "main".to_string(),
            spirv: vec![],
            reflection: ShaderReflection::from_json(
                r#"{ "declarations": [
                    { "name": "tlas", "set": 0, "binding": 0, "kind": "acceleration_structure" }
                ] }"#,
                vk::ShaderStageFlags::RAYGEN_KHR,
            )
            .unwrap(),
        };

        let request = ShaderCompileRequest::new("rt/raygen.spv", "main").with_reflection();
        let mut pipeline_shaders = PipelineShaders::default();
        (request.on_compiled.unwrap())(&shader, &mut pipeline_shaders).unwrap();

        assert!(pipeline_shaders.reflection.find("tlas").is_some());
    }
}
