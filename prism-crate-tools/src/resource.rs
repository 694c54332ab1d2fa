use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let spv = PrismPath::shader_build_path("rt/raygen.rgen");   // shader/.build/rt/raygen.rgen.spv
/// let env = PrismPath::assets_path("sky/venice_sunset.hdr");   // assets/sky/venice_sunset.hdr
/// ```
pub struct PrismPath {}
impl PrismPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // prism-crate-tools 位于工作区根目录下一级
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    /// 获取 `assets/` 目录下的文件路径
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    /// 着色器源码根目录 `shader/`
    pub fn shader_root_path() -> PathBuf {
        Self::workspace_path().join("shader")
    }

    /// 获取 `shader/.build/` 目录下的着色器路径（编译后的 SPIR-V）
    pub fn shader_build_path(filename: &str) -> PathBuf {
        let mut path = Self::shader_root_path().join(".build").join(filename).into_os_string();
        path.push(".spv");
        PathBuf::from(path)
    }

    /// SPIR-V 旁边的反射数据：`<name>.spv.reflect.json`
    pub fn reflection_path(spirv_path: &Path) -> PathBuf {
        let mut path = spirv_path.as_os_str().to_owned();
        path.push(".reflect.json");
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_build_path() {
        let path = PrismPath::shader_build_path("rt/raygen.rgen");
        assert!(path.ends_with("shader/.build/rt/raygen.rgen.spv"));

        let reflect = PrismPath::reflection_path(&path);
        assert_eq!(reflect.file_name().and_then(|f| f.to_str()), Some("raygen.rgen.spv.reflect.json"));
    }
}
