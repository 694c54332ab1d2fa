use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
};

use prism_crate_tools::resource::PrismPath;

use crate::{
    descriptors::reflection::ShaderReflection,
    shader::{CompiledShader, ShaderCompileError, ShaderCompileRequest, ShaderCompiler, ShaderStageKind},
};

/// 读取离线编译好的 SPIR-V 以及旁边的 `<name>.spv.reflect.json`
///
/// 同一个文件的同一个 stage 只读取一次
pub struct SpirvShaderCompiler {
    root: PathBuf,
    cache: RefCell<HashMap<(PathBuf, ShaderStageKind), CompiledShader>>,
}

impl SpirvShaderCompiler {
    /// 请求中的相对路径基于 `root` 解析
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }

    fn load(&self, stage: ShaderStageKind, path: &Path) -> Result<(Vec<u32>, ShaderReflection), ShaderCompileError> {
        let mut file = std::fs::File::open(path).map_err(|_| ShaderCompileError::NotFound {
            path: path.to_path_buf(),
        })?;
        let spirv = ash::util::read_spv(&mut file).map_err(|source| ShaderCompileError::InvalidSpirv {
            path: path.to_path_buf(),
            source,
        })?;

        // 没有任何资源的 shader 不会生成反射文件
        let reflection_path = PrismPath::reflection_path(path);
        let reflection = if reflection_path.exists() {
            ShaderReflection::load(&reflection_path, stage.vk_stage()).map_err(|error| {
                ShaderCompileError::Reflection {
                    path: path.to_path_buf(),
                    error,
                }
            })?
        } else {
            ShaderReflection::default()
        };

        Ok((spirv, reflection))
    }
}

impl ShaderCompiler for SpirvShaderCompiler {
    fn compile(
        &self,
        stage: ShaderStageKind,
        request: &ShaderCompileRequest,
    ) -> Result<Option<CompiledShader>, ShaderCompileError> {
        let path = self.resolve(&request.path);
        if let Some(cached) = self.cache.borrow().get(&(path.clone(), stage)) {
            log::trace!("shader cache hit: {}", path.display());
            return Ok(Some(CompiledShader {
                entry_point: request.entry_point.clone(),
                ..cached.clone()
            }));
        }

        if request.optional && !path.exists() {
            log::info!("optional shader {} does not exist, skipped", path.display());
            return Ok(None);
        }

        let (spirv, reflection) = self.load(stage, &path)?;
        log::info!(
            "shader loaded: {} ({:?}, {} words, {} declarations)",
            path.display(),
            stage,
            spirv.len(),
            reflection.declarations.len()
        );

        let compiled = CompiledShader {
            path: path.clone(),
            stage,
            entry_point: request.entry_point.clone(),
            spirv,
            reflection,
        };
        self.cache.borrow_mut().insert((path, stage), compiled.clone());
        Ok(Some(compiled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("prism-spirv-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_spirv(path: &Path) {
        let words = [SPIRV_MAGIC, 0x0001_0500, 0, 8, 0];
        std::fs::write(path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();
    }

    #[test]
    fn test_load_with_reflection() {
        let dir = temp_dir("reflect");
        write_spirv(&dir.join("raygen.spv"));
        std::fs::write(
            dir.join("raygen.spv.reflect.json"),
            r#"{ "declarations": [ { "name": "tlas", "set": 0, "binding": 0, "kind": "acceleration_structure" } ] }"#,
        )
        .unwrap();

        let compiler = SpirvShaderCompiler::new(&dir);
        let shader = compiler
            .compile(ShaderStageKind::RayGen, &ShaderCompileRequest::new("raygen.spv", "main"))
            .unwrap()
            .unwrap();

        assert_eq!(shader.spirv[0], SPIRV_MAGIC);
        assert_eq!(shader.reflection.find("tlas").unwrap().stages, ash::vk::ShaderStageFlags::RAYGEN_KHR);

        // 第二次命中缓存，entry point 取自新的请求
        let again = compiler
            .compile(ShaderStageKind::RayGen, &ShaderCompileRequest::new("raygen.spv", "other"))
            .unwrap()
            .unwrap();
        assert_eq!(again.entry_point, "other");
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_and_invalid() {
        let dir = temp_dir("missing");
        std::fs::write(dir.join("broken.spv"), [1_u8, 2, 3]).unwrap();
        let compiler = SpirvShaderCompiler::new(&dir);

        let missing = compiler.compile(ShaderStageKind::Miss, &ShaderCompileRequest::new("miss.spv", "main"));
        assert!(matches!(missing, Err(ShaderCompileError::NotFound { .. })));

        let request = ShaderCompileRequest::new("miss.spv", "main").optional();
        let skipped = compiler.compile(ShaderStageKind::Miss, &request);
        assert!(matches!(skipped, Ok(None)));

        let broken = compiler.compile(ShaderStageKind::Miss, &ShaderCompileRequest::new("broken.spv", "main"));
        assert!(matches!(broken, Err(ShaderCompileError::InvalidSpirv { .. })));
        std::fs::remove_dir_all(dir).ok();
    }
}
