use ash::vk;
use itertools::Itertools;

use crate::foundation::device::GfxDevice;

/// 一个 binding 的写入内容；buffer、image、acceleration structure 三者只能有一个非空
#[derive(Debug, Clone, Default)]
pub struct GfxWriteDescriptorSet {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub descriptor_type: vk::DescriptorType,

    pub buffer_infos: Vec<vk::DescriptorBufferInfo>,
    pub image_infos: Vec<vk::DescriptorImageInfo>,
    pub acceleration_structures: Vec<vk::AccelerationStructureKHR>,
}
impl GfxWriteDescriptorSet {
    pub fn descriptor_count(&self) -> u32 {
        let counts = [self.buffer_infos.len(), self.image_infos.len(), self.acceleration_structures.len()];
        assert_eq!(
            counts.iter().filter(|c| **c > 0).count(),
            1,
            "exactly one of buffer_infos, image_infos, acceleration_structures must be set (binding {})",
            self.dst_binding
        );
        counts.into_iter().sum::<usize>() as u32
    }

    fn to_vk_type(&self) -> vk::WriteDescriptorSet<'_> {
        vk::WriteDescriptorSet {
            dst_set: self.dst_set,
            dst_binding: self.dst_binding,
            dst_array_element: 0,
            descriptor_count: self.descriptor_count(),
            descriptor_type: self.descriptor_type,
            // 选择 buffer ptr 还是 image ptr，是由 descriptor type 控制的
            p_buffer_info: self.buffer_infos.as_ptr(),
            p_image_info: self.image_infos.as_ptr(),
            ..Default::default()
        }
    }

    /// acceleration structure 需要通过 p_next 链传入
    pub fn with_writes<R>(writes: &[Self], f: impl FnOnce(&[vk::WriteDescriptorSet]) -> R) -> R {
        let mut write_accs = writes
            .iter()
            .map(|w| {
                vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(&w.acceleration_structures)
            })
            .collect_vec();
        let vk_writes = writes
            .iter()
            .zip(write_accs.iter_mut())
            .map(|(w, write_acc)| {
                let vk_write = w.to_vk_type();
                if write_acc.acceleration_structure_count > 0 { vk_write.push_next(write_acc) } else { vk_write }
            })
            .collect_vec();
        f(&vk_writes)
    }
}

impl GfxDevice {
    #[inline]
    pub fn write_descriptor_sets(&self, writes: &[GfxWriteDescriptorSet]) {
        GfxWriteDescriptorSet::with_writes(writes, |writes| unsafe {
            self.update_descriptor_sets(writes, &[]);
        })
    }
}
