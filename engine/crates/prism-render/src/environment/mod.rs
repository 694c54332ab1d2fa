pub mod accel_buffer;
pub mod alias_map;
pub mod environment_map;
