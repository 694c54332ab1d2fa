//! 由 shader 反射驱动的资源绑定
//!
//! 流程：反射数据 -> `build()` 生成 set layout -> 场景、相机、输出图像通过
//! [`DescriptorSource`] 自行注册资源 -> `bake()` 写入 descriptor set -> 每帧 `bind()`

pub mod backend;
pub mod manager;
pub mod reflection;
pub mod resource_binding;

use crate::descriptors::{manager::DescriptorSetManager, reflection::DescriptorKind};

/// `build()` 的结果；`EmptyInput` 表示该 pipeline 不需要任何绑定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    Success,
    EmptyInput,
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("binding manager `{0}` has declarations but no resource was ever added")]
    EmptyInput(String),

    #[error("`{name}` (set {set}, binding {binding}) has no bound resource")]
    MissingBinding { name: String, set: u32, binding: u32 },

    #[error("`{name}` is declared as {expected:?} but bound to a {actual}")]
    KindMismatch {
        name: String,
        expected: DescriptorKind,
        actual: &'static str,
    },

    #[error("`{name}` expects {expected} descriptors, got {actual}")]
    CountMismatch { name: String, expected: u32, actual: usize },

    #[error("conflicting declarations for set {set} binding {binding}: `{first}` vs `{second}`")]
    ConflictingDeclaration {
        set: u32,
        binding: u32,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// 能把自己的资源注册到 binding manager 的对象：场景、相机、输出图像等
///
/// 实现者知道自己在 shader 中的名字，通过
/// [`DescriptorSetManager::find_resource_declaration`] 判断当前 pipeline 是否需要自己
pub trait DescriptorSource {
    fn add_descriptor_to(&self, manager: &mut DescriptorSetManager);
}
