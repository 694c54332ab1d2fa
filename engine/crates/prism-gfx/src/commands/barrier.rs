use ash::vk;

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl GfxBarrierMask {
    /// 所有 frame 共享一张深度图：等待上一帧的深度写入，旧内容无需保留
    pub const DEPTH_ATTACHMENT_REUSE: Self = Self {
        src_stage: vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
        src_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
        dst_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
    };

    pub const COLOR_ATTACHMENT_TO_TRANSFER_SRC: Self = Self {
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        dst_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_access: vk::AccessFlags2::TRANSFER_READ,
    };

    pub const RAY_TRACING_TO_TRANSFER_SRC: Self = Self {
        src_stage: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        src_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
        dst_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_access: vk::AccessFlags2::TRANSFER_READ,
    };

    pub const TRANSFER_SRC_TO_RAY_TRACING: Self = Self {
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        src_access: vk::AccessFlags2::TRANSFER_READ,
        dst_stage: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        dst_access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
    };

    pub const TRANSFER_SRC_TO_COLOR_ATTACHMENT: Self = Self {
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        src_access: vk::AccessFlags2::TRANSFER_READ,
        dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    };

    /// swapchain image 刚刚 acquire；src stage 与 acquire semaphore 的 wait stage 一致
    pub const ACQUIRED_TO_TRANSFER_DST: Self = Self {
        src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        src_access: vk::AccessFlags2::NONE,
        dst_stage: vk::PipelineStageFlags2::TRANSFER,
        dst_access: vk::AccessFlags2::TRANSFER_WRITE,
    };

    /// present 由 semaphore 同步，dst 不需要 access
    pub const TRANSFER_DST_TO_PRESENT: Self = Self {
        src_stage: vk::PipelineStageFlags2::TRANSFER,
        src_access: vk::AccessFlags2::TRANSFER_WRITE,
        dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
        dst_access: vk::AccessFlags2::NONE,
    };
}

/// 便捷创建 image memory barrier 的结构体，只针对第一个 mip 与 layer
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl GfxImageBarrier {
    pub fn new(image: vk::Image, aspect_mask: vk::ImageAspectFlags) -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                image,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            },
        }
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'static> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn mask(mut self, mask: GfxBarrierMask) -> Self {
        self.inner.src_stage_mask = mask.src_stage;
        self.inner.src_access_mask = mask.src_access;
        self.inner.dst_stage_mask = mask.dst_stage;
        self.inner.dst_access_mask = mask.dst_access;
        self
    }
}
