//! 帧的环形缓冲：acquire -> 录制 -> 提交 -> present

pub mod backend;
pub mod ring_buffer;
pub mod slot;
