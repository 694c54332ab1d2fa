use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use prism_gfx::{
    descriptors::{
        descriptor_pool::GfxDescriptorPool, descriptor_set_layout::GfxDescriptorSetLayout,
        write_descriptor::GfxWriteDescriptorSet,
    },
    foundation::device::GfxDevice,
};

/// 一个 descriptor set 的 layout 描述，set 编号即数组下标
#[derive(Debug, Clone, Default)]
pub struct SetLayoutDesc {
    pub set: u32,
    pub bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

/// binding manager 所需的 GPU 操作
///
/// 生产环境使用 [`VulkanDescriptorBackend`]；测试中使用不依赖设备的实现
pub trait DescriptorBackend {
    /// 返回的 layout 与 `sets` 一一对应；重复调用时替换之前的 layout
    fn create_set_layouts(&mut self, sets: &[SetLayoutDesc]) -> anyhow::Result<Vec<vk::DescriptorSetLayout>>;

    /// 为每个 layout 分配一个 set；之前分配的 set 会被释放
    fn allocate_sets(&mut self, pool_sizes: &[vk::DescriptorPoolSize]) -> anyhow::Result<Vec<vk::DescriptorSet>>;

    fn write_sets(&mut self, writes: &[GfxWriteDescriptorSet]);

    /// 释放已分配的 set，layout 保留
    fn release_sets(&mut self);

    fn cmd_bind_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    );
}

/// 基于 [`GfxDescriptorPool`] 的实现：每次 bake 创建一个刚好够用的 pool
pub struct VulkanDescriptorBackend {
    device: Rc<GfxDevice>,
    debug_name: String,
    // pool 先于 layout 销毁
    pool: Option<GfxDescriptorPool>,
    layouts: Vec<GfxDescriptorSetLayout>,
}

impl VulkanDescriptorBackend {
    pub fn new(device: &Rc<GfxDevice>, debug_name: &str) -> Self {
        Self {
            device: device.clone(),
            debug_name: debug_name.to_string(),
            pool: None,
            layouts: vec![],
        }
    }
}

impl DescriptorBackend for VulkanDescriptorBackend {
    fn create_set_layouts(&mut self, sets: &[SetLayoutDesc]) -> anyhow::Result<Vec<vk::DescriptorSetLayout>> {
        self.pool = None;
        self.layouts = sets
            .iter()
            .map(|desc| {
                GfxDescriptorSetLayout::new(
                    &self.device,
                    &desc.bindings,
                    &format!("{}-set{}", self.debug_name, desc.set),
                )
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(self.layouts.iter().map(|layout| layout.handle()).collect_vec())
    }

    fn allocate_sets(&mut self, pool_sizes: &[vk::DescriptorPoolSize]) -> anyhow::Result<Vec<vk::DescriptorSet>> {
        self.pool = None;
        // 全部是空 set 时 pool size 为空，vulkan 不允许 pool_size_count 为 0
        let fallback = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        }];
        let pool_sizes = if pool_sizes.is_empty() { &fallback[..] } else { pool_sizes };

        let pool =
            GfxDescriptorPool::new(&self.device, pool_sizes, self.layouts.len() as u32, &self.debug_name)?;
        let layouts = self.layouts.iter().map(|layout| layout.handle()).collect_vec();
        let sets = pool.allocate_sets(&layouts)?;
        for (idx, set) in sets.iter().enumerate() {
            self.device.set_object_debug_name(*set, format!("DescriptorSet::{}-set{}", self.debug_name, idx));
        }
        self.pool = Some(pool);
        Ok(sets)
    }

    fn write_sets(&mut self, writes: &[GfxWriteDescriptorSet]) {
        self.device.write_descriptor_sets(writes);
    }

    fn release_sets(&mut self) {
        self.pool = None;
    }

    fn cmd_bind_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(command_buffer, bind_point, pipeline_layout, 0, sets, &[]);
        }
    }
}

#[cfg(test)]
pub(crate) mod headless {
    use std::{cell::RefCell, rc::Rc};

    use ash::vk::{self, Handle};
    use prism_gfx::descriptors::write_descriptor::GfxWriteDescriptorSet;

    use super::{DescriptorBackend, SetLayoutDesc};

    /// 记录 backend 收到的调用，测试中用于断言
    #[derive(Debug, Default)]
    pub(crate) struct DescriptorCalls {
        pub layout_descs: Vec<SetLayoutDesc>,
        pub allocations: usize,
        pub live_sets: Vec<vk::DescriptorSet>,
        pub writes: Vec<GfxWriteDescriptorSet>,
        pub releases: usize,
        pub binds: Vec<(vk::PipelineLayout, Vec<vk::DescriptorSet>)>,
    }

    /// 不依赖设备的 backend，handle 使用递增的假值
    #[derive(Default)]
    pub(crate) struct HeadlessDescriptorBackend {
        pub calls: Rc<RefCell<DescriptorCalls>>,
        next_handle: u64,
    }

    impl HeadlessDescriptorBackend {
        pub fn new() -> (Self, Rc<RefCell<DescriptorCalls>>) {
            let backend = Self::default();
            let calls = backend.calls.clone();
            (backend, calls)
        }

        fn next(&mut self) -> u64 {
            self.next_handle += 1;
            self.next_handle
        }
    }

    impl DescriptorBackend for HeadlessDescriptorBackend {
        fn create_set_layouts(&mut self, sets: &[SetLayoutDesc]) -> anyhow::Result<Vec<vk::DescriptorSetLayout>> {
            self.calls.borrow_mut().layout_descs = sets.to_vec();
            Ok(sets.iter().map(|_| vk::DescriptorSetLayout::from_raw(self.next())).collect())
        }

        fn allocate_sets(&mut self, _pool_sizes: &[vk::DescriptorPoolSize]) -> anyhow::Result<Vec<vk::DescriptorSet>> {
            let count = self.calls.borrow().layout_descs.len();
            let sets: Vec<_> = (0..count).map(|_| vk::DescriptorSet::from_raw(self.next())).collect();
            let mut calls = self.calls.borrow_mut();
            calls.allocations += 1;
            calls.live_sets = sets.clone();
            Ok(sets)
        }

        fn write_sets(&mut self, writes: &[GfxWriteDescriptorSet]) {
            self.calls.borrow_mut().writes.extend_from_slice(writes);
        }

        fn release_sets(&mut self) {
            let mut calls = self.calls.borrow_mut();
            calls.releases += 1;
            calls.live_sets.clear();
        }

        fn cmd_bind_sets(
            &self,
            _command_buffer: vk::CommandBuffer,
            _bind_point: vk::PipelineBindPoint,
            pipeline_layout: vk::PipelineLayout,
            sets: &[vk::DescriptorSet],
        ) {
            self.calls.borrow_mut().binds.push((pipeline_layout, sets.to_vec()));
        }
    }
}
