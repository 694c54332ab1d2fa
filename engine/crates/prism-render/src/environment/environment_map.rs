use std::path::Path;

use anyhow::Context;

/// 等距柱状投影的 HDR 辐射度贴图，行优先，每个 texel 至少 3 个通道
#[derive(Clone, Debug)]
pub struct EnvironmentMap {
    width: u32,
    height: u32,
    channels: u32,
    texels: Vec<f32>,
}

impl EnvironmentMap {
    pub fn new(width: u32, height: u32, channels: u32, texels: Vec<f32>) -> anyhow::Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "environment map must not be empty: {}x{}", width, height);
        anyhow::ensure!(channels >= 3, "environment map needs at least 3 channels, got {}", channels);
        anyhow::ensure!(
            texels.len() == (width * height * channels) as usize,
            "texel data size mismatch: expect {}x{}x{}, got {}",
            width,
            height,
            channels,
            texels.len()
        );
        Ok(Self {
            width,
            height,
            channels,
            texels,
        })
    }

    /// 任何格式都转换为 RGBA32F
    pub fn from_image(image: image::DynamicImage) -> anyhow::Result<Self> {
        let rgba = image.into_rgba32f();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, 4, rgba.into_raw())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let image = image::open(path).with_context(|| format!("load environment map {}", path.display()))?;
        log::info!("environment map loaded: {} ({}x{})", path.display(), image.width(), image.height());
        Self::from_image(image)
    }
}

// getters
impl EnvironmentMap {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[inline]
    pub fn texel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// texel 的 rgb 通道
    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> &[f32] {
        let offset = ((y * self.width + x) * self.channels) as usize;
        &self.texels[offset..offset + 3]
    }

    /// 按行优先顺序遍历所有 texel 的 rgb 通道
    pub fn texels(&self) -> impl Iterator<Item = &[f32]> {
        self.texels.chunks_exact(self.channels as usize).map(|c| &c[..3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_bad_input() {
        assert!(EnvironmentMap::new(2, 2, 3, vec![0.0; 11]).is_err());
        assert!(EnvironmentMap::new(2, 2, 2, vec![0.0; 8]).is_err());
        assert!(EnvironmentMap::new(0, 2, 3, vec![]).is_err());
    }

    #[test]
    fn test_from_image_drops_alpha() {
        let mut image = image::Rgba32FImage::new(2, 1);
        image.put_pixel(1, 0, image::Rgba([1.0, 2.0, 3.0, 9.0]));
        let env = EnvironmentMap::from_image(image::DynamicImage::ImageRgba32F(image)).unwrap();

        assert_eq!(env.texel(1, 0), &[1.0, 2.0, 3.0]);
        assert_eq!(env.texels().count(), 2);
    }
}
