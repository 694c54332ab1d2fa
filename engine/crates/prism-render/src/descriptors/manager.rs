use std::collections::BTreeMap;

use ash::vk;
use indexmap::IndexMap;
use itertools::Itertools;
use prism_gfx::descriptors::write_descriptor::GfxWriteDescriptorSet;

use crate::descriptors::{
    BuildResult, DescriptorError, DescriptorSource,
    backend::{DescriptorBackend, SetLayoutDesc},
    reflection::{ResourceDeclaration, ShaderReflection},
    resource_binding::ResourceBinding,
};

/// 管理一个 pipeline 的所有 descriptor set
///
/// - 声明（来自反射）在 `build()` 之后不再改变
/// - 绑定可以在 `bake()` 之前任意添加、替换、清除
/// - `bake()` 之后 set 不可变，直到被 `clear_resource(s)` 释放
pub struct DescriptorSetManager {
    name: String,
    reflection: ShaderReflection,
    /// 下标即 set 编号
    set_layouts: Vec<vk::DescriptorSetLayout>,
    build_result: Option<BuildResult>,

    /// 按添加顺序保存，key 是声明的名字
    bindings: IndexMap<String, ResourceBinding>,
    baked_sets: Option<Vec<vk::DescriptorSet>>,

    backend: Box<dyn DescriptorBackend>,
}

// 创建
impl DescriptorSetManager {
    pub fn new(name: impl Into<String>, reflection: ShaderReflection, backend: Box<dyn DescriptorBackend>) -> Self {
        Self {
            name: name.into(),
            reflection,
            set_layouts: vec![],
            build_result: None,
            bindings: IndexMap::new(),
            baked_sets: None,
            backend,
        }
    }

    /// 根据反射数据生成 set layout
    ///
    /// 没有任何声明时返回 `EmptyInput`，不创建任何 layout，之后的 `bind()` 不做任何事
    pub fn build(&mut self) -> Result<BuildResult, DescriptorError> {
        assert!(self.build_result.is_none(), "binding manager `{}` is already built", self.name);

        if self.reflection.is_empty() {
            log::info!("binding manager `{}`: no resource declarations, binding skipped", self.name);
            self.build_result = Some(BuildResult::EmptyInput);
            return Ok(BuildResult::EmptyInput);
        }

        let set_descs = self.set_layout_descs();
        self.set_layouts = self.backend.create_set_layouts(&set_descs)?;
        self.build_result = Some(BuildResult::Success);

        log::info!(
            "binding manager `{}` built: {} declarations in {} sets",
            self.name,
            self.reflection.declarations.len(),
            set_descs.len()
        );
        Ok(BuildResult::Success)
    }

    fn set_layout_descs(&self) -> Vec<SetLayoutDesc> {
        let mut descs = (0..self.reflection.set_count())
            .map(|set| SetLayoutDesc {
                set,
                bindings: vec![],
            })
            .collect_vec();
        for decl in self.reflection.sorted() {
            descs[decl.set as usize].bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(decl.binding)
                    .descriptor_type(decl.kind.vk_type())
                    .descriptor_count(decl.count)
                    .stage_flags(decl.stages),
            );
        }
        descs
    }
}

// 资源的添加与清除
impl DescriptorSetManager {
    /// 将资源绑定到名字对应的声明上；同名的旧绑定会被替换
    ///
    /// 当前 pipeline 没有声明该名字时忽略，返回 false
    pub fn add_resource(&mut self, name: &str, resource: ResourceBinding) -> bool {
        assert!(
            self.baked_sets.is_none(),
            "binding manager `{}` is baked, clear it before adding `{}`",
            self.name,
            name
        );

        if self.reflection.find(name).is_none() {
            log::debug!("binding manager `{}`: `{}` is not declared, ignored", self.name, name);
            return false;
        }
        if self.bindings.insert(name.to_string(), resource).is_some() {
            log::debug!("binding manager `{}`: `{}` replaced", self.name, name);
        }
        true
    }

    /// 让资源自行注册
    pub fn add_from(&mut self, source: &dyn DescriptorSource) {
        source.add_descriptor_to(self);
    }

    pub fn clear_resource(&mut self, name: &str) {
        self.release_baked_sets();
        self.bindings.shift_remove(name);
    }

    pub fn clear_resources(&mut self) {
        self.release_baked_sets();
        self.bindings.clear();
    }

    fn release_baked_sets(&mut self) {
        if self.baked_sets.take().is_some() {
            log::debug!("binding manager `{}`: baked sets released", self.name);
            self.backend.release_sets();
        }
    }
}

// bake & bind
impl DescriptorSetManager {
    /// 校验每个声明都有匹配的绑定，然后分配并写入 descriptor set
    pub fn bake(&mut self) -> Result<(), DescriptorError> {
        let build_result = self
            .build_result
            .unwrap_or_else(|| panic!("binding manager `{}` must be built before bake", self.name));
        if build_result == BuildResult::EmptyInput {
            return Ok(());
        }
        self.release_baked_sets();

        if self.bindings.is_empty() {
            return Err(DescriptorError::EmptyInput(self.name.clone()));
        }
        for decl in &self.reflection.declarations {
            Self::validate(decl, self.bindings.get(&decl.name))?;
        }

        // 按类型汇总 pool 的大小
        let mut pool_sizes: BTreeMap<i32, u32> = BTreeMap::new();
        for decl in &self.reflection.declarations {
            *pool_sizes.entry(decl.kind.vk_type().as_raw()).or_default() += decl.count;
        }
        let pool_sizes = pool_sizes
            .into_iter()
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: vk::DescriptorType::from_raw(ty),
                descriptor_count: count,
            })
            .collect_vec();

        let sets = self.backend.allocate_sets(&pool_sizes)?;
        let writes = self
            .reflection
            .sorted()
            .into_iter()
            .filter_map(|decl| self.bindings.get(&decl.name).map(|binding| (decl, binding)))
            .map(|(decl, binding)| {
                let mut write = GfxWriteDescriptorSet {
                    dst_set: sets[decl.set as usize],
                    dst_binding: decl.binding,
                    descriptor_type: decl.kind.vk_type(),
                    ..Default::default()
                };
                match binding {
                    ResourceBinding::Buffers(infos) => write.buffer_infos = infos.clone(),
                    ResourceBinding::Images(infos) => write.image_infos = infos.clone(),
                    ResourceBinding::AccelerationStructures(accels) => write.acceleration_structures = accels.clone(),
                }
                write
            })
            .collect_vec();
        self.backend.write_sets(&writes);

        log::info!("binding manager `{}` baked: {} writes", self.name, writes.len());
        self.baked_sets = Some(sets);
        Ok(())
    }

    fn validate(decl: &ResourceDeclaration, binding: Option<&ResourceBinding>) -> Result<(), DescriptorError> {
        let binding = binding.ok_or_else(|| DescriptorError::MissingBinding {
            name: decl.name.clone(),
            set: decl.set,
            binding: decl.binding,
        })?;
        if !binding.is_compatible_with(decl.kind) {
            return Err(DescriptorError::KindMismatch {
                name: decl.name.clone(),
                expected: decl.kind,
                actual: binding.type_name(),
            });
        }
        if binding.len() != decl.count as usize {
            return Err(DescriptorError::CountMismatch {
                name: decl.name.clone(),
                expected: decl.count,
                actual: binding.len(),
            });
        }
        Ok(())
    }

    /// 在 command buffer 中绑定所有 baked set，从 set 0 开始
    pub fn bind(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline_layout: vk::PipelineLayout,
    ) {
        if self.build_result == Some(BuildResult::EmptyInput) {
            return;
        }
        let sets = self
            .baked_sets
            .as_ref()
            .unwrap_or_else(|| panic!("binding manager `{}` must be baked before bind", self.name));
        self.backend.cmd_bind_sets(command_buffer, bind_point, pipeline_layout, sets);
    }
}

// getters
impl DescriptorSetManager {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// 创建 pipeline layout 时使用；`EmptyInput` 时为空
    #[inline]
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    #[inline]
    pub fn is_baked(&self) -> bool {
        self.baked_sets.is_some()
    }

    pub fn find_resource_declaration(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.reflection.find(name)
    }

    pub fn find_resource_binding(&self, set: u32, binding: u32) -> Option<&ResourceBinding> {
        let decl = self.reflection.find_slot(set, binding)?;
        self.bindings.get(&decl.name)
    }

    /// 已绑定资源的名字，按添加顺序
    pub fn bound_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|name| name.as_str())
    }
}
