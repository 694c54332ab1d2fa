pub mod debug;
pub mod device;
