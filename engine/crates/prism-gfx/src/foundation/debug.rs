use std::ffi::CStr;

use ash::vk;

/// 可以设置 debug name 的 Vulkan 对象
pub trait DebugType {
    fn debug_type_name() -> &'static str;
    fn vk_handle(&self) -> impl vk::Handle;
}

/// object type 由 handle 的类型决定
pub(crate) fn object_name_info<T: vk::Handle>(handle: T, name: &CStr) -> vk::DebugUtilsObjectNameInfoEXT<'_> {
    vk::DebugUtilsObjectNameInfoEXT::default().object_name(name).object_handle(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedBuffer(vk::Buffer);

    impl DebugType for NamedBuffer {
        fn debug_type_name() -> &'static str {
            "NamedBuffer"
        }

        fn vk_handle(&self) -> impl vk::Handle {
            self.0
        }
    }

    fn name_info_of<T: DebugType>(object: &T, name: &CStr) -> (vk::ObjectType, u64) {
        let info = object_name_info(object.vk_handle(), name);
        (info.object_type, info.object_handle)
    }

    #[test]
    fn test_name_info_from_opaque_handle() {
        let buffer = NamedBuffer(<vk::Buffer as vk::Handle>::from_raw(0x42));
        let (object_type, raw) = name_info_of(&buffer, c"vertex");
        assert_eq!(object_type, vk::ObjectType::BUFFER);
        assert_eq!(raw, 0x42);
        assert_eq!(NamedBuffer::debug_type_name(), "NamedBuffer");
    }
}
