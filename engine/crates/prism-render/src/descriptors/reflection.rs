use std::path::Path;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::descriptors::DescriptorError;

/// shader 中可见资源的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    Sampler,
    AccelerationStructure,
}

impl DescriptorKind {
    pub fn vk_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::Sampler => vk::DescriptorType::SAMPLER,
            Self::AccelerationStructure => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        }
    }
}

fn one() -> u32 {
    1
}

/// shader 反射得到的一个资源声明：名字、set、binding、类型
///
/// 反射数据加载之后不再改变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDeclaration {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: DescriptorKind,
    /// 数组长度
    #[serde(default = "one")]
    pub count: u32,
    /// 由编译器根据 shader stage 填写，不来自 json
    #[serde(skip)]
    pub stages: vk::ShaderStageFlags,
}

/// 一个 pipeline 的全部资源声明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderReflection {
    #[serde(default)]
    pub declarations: Vec<ResourceDeclaration>,
}

impl ShaderReflection {
    /// json 格式：`{ "declarations": [ { "name": "...", "set": 0, "binding": 0, "kind": "storage_buffer" } ] }`
    pub fn from_json(json: &str, stage: vk::ShaderStageFlags) -> anyhow::Result<Self> {
        let mut reflection: Self = serde_json::from_str(json).context("parse shader reflection json")?;
        reflection.declarations.iter_mut().for_each(|decl| decl.stages = stage);
        Ok(reflection)
    }

    pub fn load(path: &Path, stage: vk::ShaderStageFlags) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| format!("read reflection {}", path.display()))?;
        Self::from_json(&json, stage).with_context(|| format!("reflection file {}", path.display()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.declarations.iter().find(|decl| decl.name == name)
    }

    pub fn find_slot(&self, set: u32, binding: u32) -> Option<&ResourceDeclaration> {
        self.declarations.iter().find(|decl| decl.set == set && decl.binding == binding)
    }

    /// 合并另一个 stage 的反射数据
    ///
    /// 同一个 (set, binding) 在多个 stage 中出现时，stage flags 合并；
    /// 名字或类型不一致则报错
    pub fn merge(&mut self, other: &ShaderReflection) -> Result<(), DescriptorError> {
        for decl in &other.declarations {
            match self.declarations.iter_mut().find(|d| d.set == decl.set && d.binding == decl.binding) {
                Some(existing) => {
                    if existing.name != decl.name || existing.kind != decl.kind || existing.count != decl.count {
                        return Err(DescriptorError::ConflictingDeclaration {
                            set: decl.set,
                            binding: decl.binding,
                            first: existing.name.clone(),
                            second: decl.name.clone(),
                        });
                    }
                    existing.stages |= decl.stages;
                }
                None => {
                    if let Some(same_name) = self.find(&decl.name) {
                        return Err(DescriptorError::ConflictingDeclaration {
                            set: decl.set,
                            binding: decl.binding,
                            first: format!("{} (set {}, binding {})", same_name.name, same_name.set, same_name.binding),
                            second: decl.name.clone(),
                        });
                    }
                    self.declarations.push(decl.clone());
                }
            }
        }
        Ok(())
    }

    /// 按 (set, binding) 排序后的声明
    pub fn sorted(&self) -> Vec<&ResourceDeclaration> {
        self.declarations.iter().sorted_by_key(|decl| (decl.set, decl.binding)).collect()
    }

    /// 最大的 set 编号 + 1；中间缺失的 set 使用空 layout 填充
    pub fn set_count(&self) -> u32 {
        self.declarations.iter().map(|decl| decl.set + 1).max().unwrap_or(0)
    }
}
