//! 环境光的重要性采样表（alias method）
//!
//! 每个 texel 的重要性 = 立体角权重 × 最大通道值。构建之后，trace 时只需要：
//! 均匀选一个 texel，再用一个随机数决定保留它还是跳到它的 alias，O(1) 完成采样。

use std::f64::consts::PI;

use bytemuck::{Pod, Zeroable};

use crate::environment::environment_map::EnvironmentMap;

/// 上传到 GPU 的单个 texel 的采样数据，布局与 shader 中的结构一致
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AliasEntry {
    /// 相对于平均值的重要性比例；小于 1 时表示保留自身的概率
    pub q: f32,
    /// 默认指向自身
    pub alias: u32,
    pub pdf: f32,
    /// `pdf[alias]`，shader 中只需要一次读取
    pub alias_pdf: f32,
}

/// 环境贴图的加速数据，构建一次之后只读
#[derive(Clone, Debug, Default)]
pub struct AccelerationData {
    pub width: u32,
    pub height: u32,
    pub entries: Vec<AliasEntry>,
    /// 所有 texel 加权重要性之和
    pub integral: f32,
    /// 未加权的 CIE 亮度平均值，tone mapping 使用
    pub average_luminance: f32,
    /// 浮点误差导致没有配对的 texel 数量，它们保持 alias 指向自身
    pub unpaired_texels: usize,
}

impl AccelerationData {
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.entries.len()
    }

    /// CPU 端的采样参考实现，与 shader 的查表逻辑一致
    ///
    /// # 参数
    /// * `u_select` - [0, 1) 均匀随机数，选择 texel
    /// * `u_alias` - [0, 1) 均匀随机数，决定是否跳到 alias
    ///
    /// # 返回值
    /// `(texel index, pdf)`
    pub fn sample(&self, u_select: f32, u_alias: f32) -> Option<(usize, f32)> {
        let n = self.entries.len();
        if n == 0 {
            return None;
        }
        let idx = ((u_select * n as f32) as usize).min(n - 1);
        let entry = &self.entries[idx];
        if u_alias < entry.q {
            Some((idx, entry.pdf))
        } else {
            Some((entry.alias as usize, entry.alias_pdf))
        }
    }

    /// texel 中心对应的方向；y 轴朝上，v = 0 对应天顶
    pub fn texel_direction(&self, index: usize) -> glam::Vec3 {
        let x = (index % self.width as usize) as f32 + 0.5;
        let y = (index / self.width as usize) as f32 + 0.5;
        let phi = x / self.width as f32 * std::f32::consts::TAU;
        let theta = y / self.height as f32 * std::f32::consts::PI;
        glam::Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
    }
}

/// Rec.709 / CIE Y
#[inline]
fn luminance(rgb: &[f32]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

pub struct AliasMapBuilder;

impl AliasMapBuilder {
    /// 第 y 行所在球带的面积，乘上一个 texel 的经度跨度
    ///
    /// 上下半球对称的行使用同一个值，保证均匀图像得到完全相同的权重
    fn row_solid_angle(y: u32, width: u32, height: u32) -> f32 {
        let y = y.min(height - 1 - y);
        let theta0 = y as f64 * PI / height as f64;
        let theta1 = (y + 1) as f64 * PI / height as f64;
        ((theta0.cos() - theta1.cos()) * (2.0 * PI / width as f64)) as f32
    }

    /// 每个 texel 的加权重要性
    pub fn texel_importance(env: &EnvironmentMap) -> Vec<f32> {
        let (width, height) = (env.width(), env.height());
        (0..height)
            .flat_map(|y| {
                let area = Self::row_solid_angle(y, width, height);
                (0..width).map(move |x| (x, y, area))
            })
            .map(|(x, y, area)| {
                let max_channel = env.texel(x, y).iter().copied().fold(0.0_f32, f32::max);
                max_channel * area
            })
            .collect()
    }

    pub fn build(env: &EnvironmentMap) -> AccelerationData {
        let texel_count = env.texel_count();
        let importance = Self::texel_importance(env);

        // f64 累加：相同的 f32 值求和时没有舍入误差
        let integral: f64 = importance.iter().map(|v| *v as f64).sum();
        let average_luminance =
            env.texels().map(luminance).map(|l| l as f64).sum::<f64>() / texel_count.max(1) as f64;

        let mut entries = vec![AliasEntry::default(); texel_count];
        let mut unpaired_texels = 0;

        if integral <= 0.0 {
            // 全黑的环境：退化为均匀采样
            log::warn!("environment map has zero radiance, falling back to uniform sampling");
            let pdf = 1.0 / texel_count.max(1) as f32;
            for (i, entry) in entries.iter_mut().enumerate() {
                *entry = AliasEntry {
                    q: 1.0,
                    alias: i as u32,
                    pdf,
                    alias_pdf: pdf,
                };
            }
        } else {
            let scale = texel_count as f64 / integral;
            for (i, (entry, imp)) in entries.iter_mut().zip(&importance).enumerate() {
                entry.q = (*imp as f64 * scale) as f32;
                entry.alias = i as u32;
            }

            unpaired_texels = Self::pair_texels(&mut entries);

            for (entry, imp) in entries.iter_mut().zip(&importance) {
                entry.pdf = (*imp as f64 / integral) as f32;
            }
            for i in 0..texel_count {
                entries[i].alias_pdf = entries[entries[i].alias as usize].pdf;
            }
        }

        if unpaired_texels > 0 {
            log::warn!("alias map: {} texels left unpaired, kept self-aliased", unpaired_texels);
        }
        log::info!(
            "alias map built: {}x{}, integral {:.4}, average luminance {:.4}",
            env.width(),
            env.height(),
            integral,
            average_luminance
        );

        AccelerationData {
            width: env.width(),
            height: env.height(),
            entries,
            integral: integral as f32,
            average_luminance: average_luminance as f32,
            unpaired_texels,
        }
    }

    /// 将低于平均值的 texel 与高于平均值的 texel 配对
    ///
    /// 一个高能量 texel 可以承接多个低能量 texel；当它的 q 降到 1 以下时，
    /// 它本身落入 `[0, large)` 区间，之后会作为低能量 texel 被继续处理。
    ///
    /// 返回没有被处理到的低能量 texel 数量
    fn pair_texels(entries: &mut [AliasEntry]) -> usize {
        let size = entries.len();

        // 单次划分：低于平均的从头部写入，其余从尾部写入
        let mut partition = vec![0_u32; size];
        let mut small = 0;
        let mut large = size;
        for (i, entry) in entries.iter().enumerate() {
            if entry.q < 1.0 {
                partition[small] = i as u32;
                small += 1;
            } else {
                large -= 1;
                partition[large] = i as u32;
            }
        }

        let mut cursor = 0;
        while cursor < large && large < size {
            let small_idx = partition[cursor] as usize;
            let large_idx = partition[large] as usize;

            entries[small_idx].alias = large_idx as u32;
            entries[large_idx].q -= 1.0 - entries[small_idx].q;

            if entries[large_idx].q < 1.0 {
                large += 1;
            }
            cursor += 1;
        }

        // 高能量 texel 被耗尽后，剩下的低能量 texel 只能保持自身
        (cursor..large).filter(|i| entries[partition[*i] as usize].q < 1.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_env(width: u32, height: u32, seed: u64) -> EnvironmentMap {
        let mut rng = StdRng::seed_from_u64(seed);
        let texels = (0..width * height * 3).map(|_| rng.gen_range(0.0..8.0_f32)).collect();
        EnvironmentMap::new(width, height, 3, texels).unwrap()
    }

    #[test]
    fn test_integral_matches_importance_sum() {
        let env = random_env(32, 16, 7);
        let accel = AliasMapBuilder::build(&env);
        let importance = AliasMapBuilder::texel_importance(&env);

        let sum: f32 = importance.iter().sum();
        assert_relative_eq!(sum, accel.integral, max_relative = 1e-4);
        assert_eq!(accel.texel_count(), 32 * 16);
    }

    #[test]
    fn test_pdf_and_alias_pdf() {
        let env = random_env(16, 8, 42);
        let accel = AliasMapBuilder::build(&env);
        let importance = AliasMapBuilder::texel_importance(&env);

        for (i, entry) in accel.entries.iter().enumerate() {
            assert_relative_eq!(entry.pdf, importance[i] / accel.integral, max_relative = 1e-4);
            assert_eq!(entry.alias_pdf, accel.entries[entry.alias as usize].pdf);
        }
        let pdf_sum: f32 = accel.entries.iter().map(|e| e.pdf).sum();
        assert_relative_eq!(pdf_sum, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_uniform_image_is_self_aliased() {
        // 只有两行时两条球带面积相同，重要性完全一致
        let env = EnvironmentMap::new(8, 2, 3, vec![0.5; 8 * 2 * 3]).unwrap();
        let accel = AliasMapBuilder::build(&env);

        for (i, entry) in accel.entries.iter().enumerate() {
            assert_eq!(entry.alias, i as u32);
            assert_relative_eq!(entry.q, 1.0, epsilon = 1e-6);
        }
        assert_eq!(accel.unpaired_texels, 0);
        assert_relative_eq!(accel.average_luminance, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_uniform_image_weights_rows_by_solid_angle() {
        // 4 行时靠近两极的球带面积更小：q = 2 - sqrt(2)，赤道附近 q = sqrt(2)
        let (width, height) = (4_u32, 4_u32);
        let env = EnvironmentMap::new(width, height, 3, vec![1.0; 4 * 4 * 3]).unwrap();
        let accel = AliasMapBuilder::build(&env);
        let n = accel.texel_count();

        let polar_q = 2.0 - std::f32::consts::SQRT_2;
        for (i, entry) in accel.entries.iter().enumerate() {
            let row = i as u32 / width;
            if row == 0 || row == height - 1 {
                assert_relative_eq!(entry.q, polar_q, epsilon = 1e-5);
                assert_relative_eq!(entry.pdf, polar_q / n as f32, epsilon = 1e-6);
                let alias_row = entry.alias / width;
                assert!(alias_row == 1 || alias_row == 2, "polar texel {} aliases row {}", i, alias_row);
            }
        }
        let non_self = accel.entries.iter().enumerate().filter(|(i, e)| e.alias != *i as u32).count();
        assert!(non_self >= 8);

        // 选中概率：自身保留的部分 + 其他 texel 跳转过来的部分
        let mut selected = accel.entries.iter().map(|e| e.q.min(1.0) / n as f32).collect::<Vec<_>>();
        for entry in &accel.entries {
            if entry.q < 1.0 {
                selected[entry.alias as usize] += (1.0 - entry.q) / n as f32;
            }
        }
        for (i, entry) in accel.entries.iter().enumerate() {
            assert_relative_eq!(selected[i], entry.pdf, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_single_bright_texel() {
        let mut texels = vec![0.0; 2 * 2 * 3];
        // texel (1, 0) 的三个通道
        texels[3..6].copy_from_slice(&[4.0, 4.0, 4.0]);
        let env = EnvironmentMap::new(2, 2, 3, texels).unwrap();
        let accel = AliasMapBuilder::build(&env);

        let bright = 1_u32;
        for (i, entry) in accel.entries.iter().enumerate() {
            if i as u32 != bright {
                assert_eq!(entry.alias, bright, "texel {} should alias the bright texel", i);
                assert_eq!(entry.q, 0.0);
            }
        }
        assert_relative_eq!(accel.entries[bright as usize].pdf, 1.0, epsilon = 1e-6);

        // 任何采样都应该落到亮的 texel 上
        for k in 0..16 {
            let u = k as f32 / 16.0;
            let (idx, pdf) = accel.sample(u, 0.5).unwrap();
            assert_eq!(idx, bright as usize);
            assert_relative_eq!(pdf, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_black_image_falls_back_to_uniform() {
        let env = EnvironmentMap::new(4, 2, 4, vec![0.0; 4 * 2 * 4]).unwrap();
        let accel = AliasMapBuilder::build(&env);

        assert_eq!(accel.integral, 0.0);
        for (i, entry) in accel.entries.iter().enumerate() {
            assert_eq!(entry.alias, i as u32);
            assert_relative_eq!(entry.pdf, 1.0 / 8.0);
        }
    }

    #[test]
    fn test_sampling_reproduces_pdf() {
        let env = random_env(8, 4, 3);
        let accel = AliasMapBuilder::build(&env);
        let n = accel.texel_count();

        // 规则网格采样，频率应该和 pdf 一致
        let grid = 512;
        let mut histogram = vec![0_u32; n];
        for i in 0..n * grid {
            let u_select = (i / grid) as f32 / n as f32 + 0.5 / (n * grid) as f32;
            let u_alias = ((i % grid) as f32 + 0.5) / grid as f32;
            let (idx, _) = accel.sample(u_select, u_alias).unwrap();
            histogram[idx] += 1;
        }

        let total = (n * grid) as f32;
        for (i, count) in histogram.iter().enumerate() {
            let freq = *count as f32 / total;
            assert!(
                (freq - accel.entries[i].pdf).abs() < 2.0 / grid as f32,
                "texel {}: freq {} pdf {}",
                i,
                freq,
                accel.entries[i].pdf
            );
        }
    }

    #[test]
    fn test_partition_residual_stays_self_aliased() {
        // q 的总和略小于 texel 数量，模拟浮点漂移：最后一个低能量 texel 找不到配对
        let mut entries: Vec<AliasEntry> = [0.5_f32, 0.5, 1.9]
            .iter()
            .enumerate()
            .map(|(i, q)| AliasEntry {
                q: *q,
                alias: i as u32,
                ..Default::default()
            })
            .collect();

        let unpaired = AliasMapBuilder::pair_texels(&mut entries);

        // 1.9 承接第一个 0.5 后降到 1.4，承接第二个后降到 0.9，自身变成低能量 texel
        assert_eq!(entries[0].alias, 2);
        assert_eq!(entries[1].alias, 2);
        assert_eq!(entries[2].alias, 2);
        assert_eq!(unpaired, 1);
    }

    #[test]
    fn test_texel_direction() {
        let env = EnvironmentMap::new(4, 2, 3, vec![1.0; 4 * 2 * 3]).unwrap();
        let accel = AliasMapBuilder::build(&env);

        for i in 0..accel.texel_count() {
            assert_relative_eq!(accel.texel_direction(i).length(), 1.0, epsilon = 1e-5);
        }
        // 上面一行在北半球
        assert!(accel.texel_direction(0).y > 0.0);
        assert!(accel.texel_direction(4).y < 0.0);
    }
}
