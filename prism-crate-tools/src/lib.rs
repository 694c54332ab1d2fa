//! Prism 工具集
//!
//! 提供日志初始化、资源路径管理、带索引的常量表等通用工具。
//!
//! # PrismPath
//! 基于工作区根目录的统一路径管理，避免硬编码相对路径。

pub mod init_log;
pub mod named_array;
pub mod resource;
