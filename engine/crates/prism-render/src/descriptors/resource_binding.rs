use ash::vk;

use crate::descriptors::reflection::DescriptorKind;

/// 一个资源声明对应的具体 GPU 资源，数组形式
#[derive(Debug, Clone)]
pub enum ResourceBinding {
    Buffers(Vec<vk::DescriptorBufferInfo>),
    /// image view + layout + sampler
    Images(Vec<vk::DescriptorImageInfo>),
    AccelerationStructures(Vec<vk::AccelerationStructureKHR>),
}

impl ResourceBinding {
    /// range 为 None 时绑定到 buffer 末尾
    pub fn buffer(buffer: vk::Buffer, offset: vk::DeviceSize, range: Option<vk::DeviceSize>) -> Self {
        Self::Buffers(vec![
            vk::DescriptorBufferInfo::default().buffer(buffer).offset(offset).range(range.unwrap_or(vk::WHOLE_SIZE)),
        ])
    }

    pub fn sampled_image(view: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self::Images(vec![
            vk::DescriptorImageInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .sampler(sampler),
        ])
    }

    pub fn storage_image(view: vk::ImageView) -> Self {
        Self::Images(vec![vk::DescriptorImageInfo::default().image_view(view).image_layout(vk::ImageLayout::GENERAL)])
    }

    pub fn acceleration_structure(accel: vk::AccelerationStructureKHR) -> Self {
        Self::AccelerationStructures(vec![accel])
    }

    /// 数组元素个数
    pub fn len(&self) -> usize {
        match self {
            Self::Buffers(infos) => infos.len(),
            Self::Images(infos) => infos.len(),
            Self::AccelerationStructures(accels) => accels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Buffers(_) => "buffer",
            Self::Images(_) => "image",
            Self::AccelerationStructures(_) => "acceleration structure",
        }
    }

    /// 资源类型是否可以填入该类型的 descriptor
    pub fn is_compatible_with(&self, kind: DescriptorKind) -> bool {
        match self {
            Self::Buffers(_) => matches!(kind, DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer),
            Self::Images(_) => matches!(
                kind,
                DescriptorKind::CombinedImageSampler
                    | DescriptorKind::SampledImage
                    | DescriptorKind::StorageImage
                    | DescriptorKind::Sampler
            ),
            Self::AccelerationStructures(_) => kind == DescriptorKind::AccelerationStructure,
        }
    }
}
