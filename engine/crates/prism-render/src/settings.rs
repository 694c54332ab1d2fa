use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;
use serde::{Deserialize, Serialize};

pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        // shader 输出会被自动改变： liner -> sRGB
        format: vk::Format::B8G8R8A8_SRGB,
        // 通知 OS，将数值按照 sRGB 空间进行处理和显示
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    pub const DEFAULT_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::MAILBOX;
    pub const DEPTH_FORMAT_CANDIDATES: &'static [vk::Format] = &[
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D32_SFLOAT,
        vk::Format::D24_UNORM_S8_UINT,
        vk::Format::D16_UNORM_S8_UINT,
        vk::Format::D16_UNORM,
    ];
    /// raster / 光追的输出图像格式
    pub const OUTPUT_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

    pub const DEFAULT_MAX_RAY_DEPTH: u32 = 4;
    pub const DEFAULT_SAMPLES_PER_PIXEL: u32 = 1;
}

/// 最终呈现哪个 renderer 的输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    #[default]
    Rasterize,
    RayTrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    Immediate,
    #[default]
    Mailbox,
    Fifo,
}

impl PresentModeSetting {
    pub fn vk_present_mode(self) -> vk::PresentModeKHR {
        match self {
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Fifo => vk::PresentModeKHR::FIFO,
        }
    }
}

/// renderer 的可配置项，从 toml 加载，缺省字段使用默认值
///
/// ```toml
/// present_mode = "fifo"
/// render_mode = "ray_trace"
/// max_ray_depth = 8
/// samples_per_pixel = 2
/// accumulation_limit = 1024
/// shader_dir = "shader/.build"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub present_mode: PresentModeSetting,
    pub render_mode: RenderMode,
    pub max_ray_depth: u32,
    pub samples_per_pixel: u32,
    /// 累积到该帧数后停止 trace；None 表示一直累积
    pub accumulation_limit: Option<u32>,
    /// 编译后的 shader 所在目录；None 时使用工作区的 `shader/.build`
    pub shader_dir: Option<PathBuf>,
    pub environment_map: Option<PathBuf>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            present_mode: PresentModeSetting::default(),
            render_mode: RenderMode::default(),
            max_ray_depth: DefaultRendererSettings::DEFAULT_MAX_RAY_DEPTH,
            samples_per_pixel: DefaultRendererSettings::DEFAULT_SAMPLES_PER_PIXEL,
            accumulation_limit: None,
            shader_dir: None,
            environment_map: None,
        }
    }
}

impl RendererSettings {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("parse renderer settings")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let settings = Self::from_toml_str(&text).with_context(|| format!("settings file {}", path.display()))?;
        log::info!("renderer settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("serialize renderer settings")
    }

    pub fn shader_dir(&self) -> PathBuf {
        self.shader_dir
            .clone()
            .unwrap_or_else(|| prism_crate_tools::resource::PrismPath::shader_root_path().join(".build"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings = RendererSettings::from_toml_str(
            r#"
            render_mode = "ray_trace"
            max_ray_depth = 8
            "#,
        )
        .unwrap();

        assert_eq!(settings.render_mode, RenderMode::RayTrace);
        assert_eq!(settings.max_ray_depth, 8);
        assert_eq!(settings.samples_per_pixel, DefaultRendererSettings::DEFAULT_SAMPLES_PER_PIXEL);
        assert_eq!(settings.present_mode.vk_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(settings.accumulation_limit, None);
    }

    #[test]
    fn test_toml_round_trip_and_errors() {
        let settings = RendererSettings {
            present_mode: PresentModeSetting::Fifo,
            accumulation_limit: Some(256),
            shader_dir: Some(PathBuf::from("/tmp/shaders")),
            ..Default::default()
        };
        let text = settings.to_toml_string().unwrap();
        assert_eq!(RendererSettings::from_toml_str(&text).unwrap(), settings);
        assert_eq!(settings.shader_dir(), PathBuf::from("/tmp/shaders"));

        assert!(RendererSettings::from_toml_str("render_mode = \"wireframe\"").is_err());
    }
}
