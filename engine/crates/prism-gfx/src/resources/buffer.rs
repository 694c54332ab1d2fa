use std::rc::Rc;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::foundation::{debug::DebugType, device::GfxDevice};

pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,

    /// 在初始化阶段写死
    map_ptr: Option<*mut u8>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    debug_name: String,
    device: Rc<GfxDevice>,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        let allocator = self.device.allocator();
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// init & destroy
impl GfxBuffer {
    /// - align: buffer 起始地址的对齐，默认对齐到 8 字节
    /// - mem_map: 是否需要 host 访问，需要的话创建时就 map
    pub fn new(
        device: &Rc<GfxDevice>,
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        align: Option<vk::DeviceSize>,
        mem_map: bool,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: if mem_map {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };

        let allocator = device.allocator();
        let (buffer, mut alloc) = unsafe {
            allocator
                .create_buffer_with_alignment(&buffer_ci, &alloc_ci, align.unwrap_or(8))
                .with_context(|| format!("create buffer {}", name.as_ref()))?
        };

        let map_ptr = if mem_map { Some(unsafe { allocator.map_memory(&mut alloc)? }) } else { None };

        let device_addr = buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        });

        device.set_object_debug_name(buffer, format!("Buffer::{}", name.as_ref()));
        Ok(Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            map_ptr,
            device_addr,
            debug_name: name.as_ref().to_string(),
            device: device.clone(),
        })
    }

    /// host 可见的 storage buffer，适合一次性上传的只读数据
    pub fn new_storage_mapped(
        device: &Rc<GfxDevice>,
        size: vk::DeviceSize,
        name: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        Self::new(device, size, vk::BufferUsageFlags::STORAGE_BUFFER, None, true, name)
    }
}
// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    /// 没有 SHADER_DEVICE_ADDRESS usage 时返回 None
    #[inline]
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_addr
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
// tools
impl GfxBuffer {
    #[inline]
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.map_ptr
    }

    #[inline]
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> anyhow::Result<()> {
        self.device.allocator().flush_allocation(&self.allocation, offset, size)?;
        Ok(())
    }

    /// 通过 mem map 的方式将 data 写入到 buffer 的 offset 处
    pub fn write_by_mmap<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &[T]) -> anyhow::Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        anyhow::ensure!(
            offset + bytes.len() as vk::DeviceSize <= self.size,
            "write out of range: buffer {} size {}, offset {}, len {}",
            self.debug_name,
            self.size,
            offset,
            bytes.len()
        );
        let ptr = self.map_ptr.with_context(|| format!("buffer {} is not mapped", self.debug_name))?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(offset as usize), bytes.len());
        }
        self.flush(offset, bytes.len() as vk::DeviceSize)
    }
}
