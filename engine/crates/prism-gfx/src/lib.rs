//! Vulkan GFX 抽象层
//!
//! 提供对 Vulkan API 的薄封装：设备上下文、同步原语、命令缓冲、交换链、
//! 资源与描述符、管线。
//!
//! 不使用全局单例：所有对象都持有 [`foundation::device::GfxDevice`] 的 `Rc`，
//! 在 `Drop` 时释放自己的 Vulkan 句柄，因此持有者之间的 drop 顺序即销毁顺序。

pub mod commands;
pub mod descriptors;
pub mod foundation;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
pub mod utilities;
