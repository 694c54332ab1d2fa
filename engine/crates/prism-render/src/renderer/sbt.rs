use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use prism_gfx::{
    foundation::device::{GfxDevice, GfxRtPipelineProps},
    pipelines::pipeline::GfxPipeline,
    resources::sbt_buffer::GfxSBTBuffer,
    utilities::align::align_up,
};

/// SBT 中的四类 region，顺序即 pipeline 中 shader group 的顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbtGroupKind {
    RayGen,
    Miss,
    Hit,
    Callable,
}

impl SbtGroupKind {
    pub const ALL: [Self; 4] = [Self::RayGen, Self::Miss, Self::Hit, Self::Callable];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// 每类 shader group 的数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SbtGroupCounts {
    pub raygen: u32,
    pub miss: u32,
    pub hit: u32,
    pub callable: u32,
}

impl SbtGroupCounts {
    #[inline]
    pub fn get(&self, kind: SbtGroupKind) -> u32 {
        match kind {
            SbtGroupKind::RayGen => self.raygen,
            SbtGroupKind::Miss => self.miss,
            SbtGroupKind::Hit => self.hit,
            SbtGroupKind::Callable => self.callable,
        }
    }

    #[inline]
    pub fn total(&self) -> u32 {
        self.raygen + self.miss + self.hit + self.callable
    }
}

/// 一个 region 在 SBT buffer 中的位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SbtRegion {
    pub offset: u32,
    pub stride: u32,
    pub size: u32,
    pub count: u32,
}

/// SBT 的内存布局，只依赖设备属性和 group 数量
///
/// - 每个 handle 按 `shader_group_handle_alignment` 对齐，得到 stride
/// - 每个 region 的起点与大小按 `shader_group_base_alignment` 对齐
/// - raygen 的 stride 必须与 size 相同
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbtLayout {
    handle_size: u32,
    regions: [SbtRegion; 4],
    total_size: u32,
}

impl SbtLayout {
    pub fn compute(props: GfxRtPipelineProps, counts: SbtGroupCounts) -> Self {
        assert_eq!(counts.raygen, 1, "exactly one raygen group is required, got {}", counts.raygen);

        // 不需要 user data，stride 就是对齐之后的 handle size
        let handle_stride = align_up(props.shader_group_handle_size, props.shader_group_handle_alignment);

        let mut regions = [SbtRegion::default(); 4];
        let mut offset = 0;
        for kind in SbtGroupKind::ALL {
            let count = counts.get(kind);
            let size = align_up(count * handle_stride, props.shader_group_base_alignment);
            let stride = if kind == SbtGroupKind::RayGen { size } else { handle_stride };
            regions[kind.index()] = SbtRegion {
                offset,
                stride,
                size,
                count,
            };
            offset += size;
        }

        Self {
            handle_size: props.shader_group_handle_size,
            regions,
            total_size: offset,
        }
    }

    #[inline]
    pub fn region(&self, kind: SbtGroupKind) -> SbtRegion {
        self.regions[kind.index()]
    }

    #[inline]
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    #[inline]
    pub fn group_count(&self) -> u32 {
        self.regions.iter().map(|r| r.count).sum()
    }

    /// (group 下标, 在 SBT 中的字节偏移)，group 下标按 raygen、miss、hit、callable 连续编号
    pub fn handle_offsets(&self) -> Vec<(u32, u32)> {
        let mut group = 0;
        let mut offsets = Vec::with_capacity(self.group_count() as usize);
        for region in &self.regions {
            for i in 0..region.count {
                offsets.push((group, region.offset + i * region.stride));
                group += 1;
            }
        }
        offsets
    }

    /// 把 pipeline 返回的紧密排列的 handle 摆放到 SBT 的 host 镜像中
    pub fn assemble(&self, handles: &[u8]) -> Vec<u8> {
        let handle_size = self.handle_size as usize;
        assert_eq!(
            handles.len(),
            self.group_count() as usize * handle_size,
            "shader group handle data does not match the layout"
        );

        let mut data = vec![0u8; self.total_size as usize];
        for (group, offset) in self.handle_offsets() {
            let src = group as usize * handle_size;
            let dst = offset as usize;
            data[dst..dst + handle_size].copy_from_slice(&handles[src..src + handle_size]);
        }
        data
    }

    /// 基于 buffer 的 device address 生成 trace rays 需要的 region；空 region 全部为 0
    pub fn device_regions(&self, base_address: vk::DeviceAddress) -> [vk::StridedDeviceAddressRegionKHR; 4] {
        self.regions.map(|region| {
            if region.count == 0 {
                return vk::StridedDeviceAddressRegionKHR::default();
            }
            vk::StridedDeviceAddressRegionKHR::default()
                .device_address(base_address + region.offset as vk::DeviceAddress)
                .stride(region.stride as vk::DeviceSize)
                .size(region.size as vk::DeviceSize)
        })
    }
}

/// 光追 pipeline 的 shader binding table
///
/// pipeline 重建时整体重建，不做增量更新
pub struct ShaderBindingTable {
    layout: SbtLayout,
    regions: [vk::StridedDeviceAddressRegionKHR; 4],
    _buffer: GfxSBTBuffer,
}

impl ShaderBindingTable {
    pub fn build(
        device: &Rc<GfxDevice>,
        pipeline: &GfxPipeline,
        counts: SbtGroupCounts,
        name: &str,
    ) -> anyhow::Result<Self> {
        let props = device.rt_pipeline_props();
        let layout = SbtLayout::compute(props, counts);

        let handles = pipeline.ray_tracing_group_handles(layout.group_count(), props.shader_group_handle_size)?;
        let host_data = layout.assemble(&handles);

        let buffer = GfxSBTBuffer::new(
            device,
            layout.total_size() as vk::DeviceSize,
            props.shader_group_base_alignment as vk::DeviceSize,
            name,
        )?;
        buffer.write_by_mmap(0, &host_data)?;
        let base_address = buffer.device_address().context("SBT buffer has no device address")?;

        log::info!(
            "SBT `{}` built: {} groups, {} bytes",
            name,
            layout.group_count(),
            layout.total_size()
        );
        Ok(Self {
            regions: layout.device_regions(base_address),
            layout,
            _buffer: buffer,
        })
    }

    #[inline]
    pub fn layout(&self) -> &SbtLayout {
        &self.layout
    }

    #[inline]
    pub fn region(&self, kind: SbtGroupKind) -> &vk::StridedDeviceAddressRegionKHR {
        &self.regions[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(handle_size: u32, handle_alignment: u32, base_alignment: u32) -> GfxRtPipelineProps {
        GfxRtPipelineProps {
            shader_group_handle_size: handle_size,
            shader_group_handle_alignment: handle_alignment,
            shader_group_base_alignment: base_alignment,
            max_ray_recursion_depth: 31,
        }
    }

    fn counts(miss: u32, hit: u32, callable: u32) -> SbtGroupCounts {
        SbtGroupCounts {
            raygen: 1,
            miss,
            hit,
            callable,
        }
    }

    #[test]
    fn test_region_offsets() {
        let layout = SbtLayout::compute(props(32, 32, 64), counts(2, 1, 1));

        let offsets: Vec<_> = SbtGroupKind::ALL.iter().map(|&k| layout.region(k).offset).collect();
        assert_eq!(offsets, vec![0, 64, 128, 192]);
        assert_eq!(layout.total_size(), 256);

        let raygen = layout.region(SbtGroupKind::RayGen);
        assert_eq!(raygen.stride, raygen.size);
        assert_eq!(layout.region(SbtGroupKind::Miss).stride, 32);
    }

    #[test]
    fn test_handle_alignment_pads_stride() {
        let layout = SbtLayout::compute(props(20, 32, 64), counts(3, 2, 0));

        let miss = layout.region(SbtGroupKind::Miss);
        assert_eq!(miss.stride, 32);
        assert_eq!(miss.size, 128);
        assert_eq!(layout.region(SbtGroupKind::Hit).offset, 64 + 128);
        assert_eq!(layout.region(SbtGroupKind::Callable).size, 0);

        let regions = layout.device_regions(0x1000);
        assert_eq!(regions[SbtGroupKind::Miss.index()].device_address, 0x1040);
        // 空的 region 必须全为 0
        let callable = &regions[SbtGroupKind::Callable.index()];
        assert_eq!((callable.device_address, callable.stride, callable.size), (0, 0, 0));
    }

    #[test]
    fn test_assemble_places_handles() {
        let layout = SbtLayout::compute(props(4, 4, 16), counts(2, 1, 0));
        let handles: Vec<u8> = (0..4u8).flat_map(|group| [group + 1; 4]).collect();

        let data = layout.assemble(&handles);
        assert_eq!(data.len(), layout.total_size() as usize);
        assert_eq!(&data[0..4], &[1; 4]);
        // miss region 从 16 开始，两个 handle 紧邻
        assert_eq!(&data[16..20], &[2; 4]);
        assert_eq!(&data[20..24], &[3; 4]);
        assert_eq!(&data[32..36], &[4; 4]);
        assert!(data[4..16].iter().all(|&b| b == 0));
    }
}
