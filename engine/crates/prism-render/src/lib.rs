//! Prism 渲染核心
//!
//! - [`frame`]：与 swapchain image 一一对应的 frame ring buffer
//! - [`descriptors`]：由 shader 反射驱动的 descriptor 绑定
//! - [`renderer`]：renderer 生命周期、raster / 光追两种 renderer 以及 SBT
//! - [`environment`]：环境贴图的 alias map 重要性采样
//!
//! 跨组件的通知走 [`events`] 中的显式 channel；共享的对象由 [`app_context::AppContext`] 在启动时创建并传递。

pub mod app_context;
pub mod descriptors;
pub mod environment;
pub mod events;
pub mod frame;
pub mod hybrid_renderer;
pub mod renderer;
pub mod scene;
pub mod settings;
pub mod shader;
