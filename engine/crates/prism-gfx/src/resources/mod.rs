pub mod buffer;
pub mod image;
pub mod sbt_buffer;
