use ash::vk;

use crate::frame::{
    backend::{FrameBackend, SurfaceInfo},
    slot::{FrameSlot, FrameSlotState},
};

/// 帧的环形缓冲：每个 surface image 对应一个 [`FrameSlot`]
///
/// CPU 最多领先 GPU `slot_count` 帧：slot 被再次使用之前会等待它的 fence。
///
/// # 每帧流程
/// ```ignore
/// let Some(_) = ring.acquire() else { ring.resize(w, h)?; return };
/// ring.begin_command_buffer();
/// record(ring.current_command_buffer());
/// ring.flush_current_command_buffer();
/// ```
pub struct FrameRingBuffer<B: FrameBackend> {
    slots: Vec<FrameSlot<B>>,
    /// acquire 时使用的 semaphore，成功后和 slot 的 semaphore 交换
    spare_image_available: B::Semaphore,
    current: Option<usize>,

    surface: SurfaceInfo,
    frame_id: u64,
    needs_resize: bool,
    destroyed: bool,

    // 最后 drop
    backend: B,
}

// new & init
impl<B: FrameBackend> FrameRingBuffer<B> {
    /// 创建和 surface image 数量相同的 slot，fence 初始为 signaled
    pub fn init(mut backend: B, width: u32, height: u32) -> anyhow::Result<Self> {
        let surface = backend.rebuild_surface_resources(vk::Extent2D { width, height })?;
        let slots = (0..surface.image_count())
            .map(|index| FrameSlot::new(&mut backend, index))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let spare_image_available = backend.create_semaphore("frame-spare-image-available")?;

        log::info!(
            "frame ring buffer created: {} slots, {}x{}",
            slots.len(),
            surface.extent.width,
            surface.extent.height
        );
        Ok(Self {
            slots,
            spare_image_available,
            current: None,
            surface,
            frame_id: 0,
            needs_resize: false,
            destroyed: false,
            backend,
        })
    }

    /// 重建 surface 相关资源；sync 对象在 slot 数量不变时保持原样
    pub fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.backend.wait_idle();
        for slot in &mut self.slots {
            // acquire 已经 signal 但还没有被提交等待，不能再交给下一次 acquire
            if matches!(slot.state(), FrameSlotState::Acquired | FrameSlotState::Recording) {
                slot.image_available = self
                    .backend
                    .create_semaphore(&format!("frame-{}-image-available", slot.index()))?;
            }
            slot.force_idle();
        }
        self.current = None;

        self.surface = self.backend.rebuild_surface_resources(vk::Extent2D { width, height })?;

        let image_count = self.surface.image_count();
        if image_count < self.slots.len() {
            self.slots.truncate(image_count);
        }
        for index in self.slots.len()..image_count {
            self.slots.push(FrameSlot::new(&mut self.backend, index)?);
        }

        self.needs_resize = false;
        log::info!(
            "frame ring buffer resized: {} slots, {}x{}",
            self.slots.len(),
            self.surface.extent.width,
            self.surface.extent.height
        );
        Ok(())
    }

    /// 等待 GPU 空闲后释放所有 slot 以及 surface 资源
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.backend.wait_idle();
        self.slots.clear();
        self.current = None;
        self.backend.release_surface_resources();
        self.destroyed = true;
        log::info!("frame ring buffer destroyed");
    }
}

impl<B: FrameBackend> Drop for FrameRingBuffer<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

// 每帧
impl<B: FrameBackend> FrameRingBuffer<B> {
    /// 获取下一个可以呈现的 image
    ///
    /// surface 过期时返回 None，调用者需要 `resize` 后重试
    pub fn acquire(&mut self) -> Option<usize> {
        assert!(!self.destroyed, "acquire on a destroyed frame ring buffer");
        if let Some(current) = self.current {
            let state = self.slots[current].state();
            assert!(
                matches!(state, FrameSlotState::Idle | FrameSlotState::Presented),
                "frame slot {} is {:?}, flush it before acquiring the next image",
                current,
                state
            );
        }

        let Some(index) = self.backend.acquire_image(&self.spare_image_available) else {
            self.needs_resize = true;
            return None;
        };
        assert!(
            index < self.slots.len(),
            "surface returned image {} but only {} slots exist",
            index,
            self.slots.len()
        );

        let slot = &mut self.slots[index];
        // 限制 in-flight 的帧数
        self.backend.wait_fence(&slot.fence);
        assert!(self.backend.is_fence_signaled(&slot.fence));

        if slot.state() == FrameSlotState::Presented {
            slot.transit(FrameSlotState::Idle);
        }
        slot.transit(FrameSlotState::Acquired);
        // 旧的 semaphore 已经被上一次提交等待过，可以复用
        std::mem::swap(&mut slot.image_available, &mut self.spare_image_available);

        self.current = Some(index);
        self.frame_id = self.frame_id.wrapping_add(1);
        log::trace!("{} acquired image {}", self.frame_name(), index);
        Some(index)
    }

    pub fn begin_command_buffer(&mut self) {
        let label = self.frame_name();
        let slot = &mut self.slots[slot_index(self.current)];
        slot.transit(FrameSlotState::Recording);
        self.backend.begin_command_buffer(&slot.command_buffer, &label);
    }

    /// 只能在 `begin_command_buffer` 和 `flush_current_command_buffer` 之间使用
    pub fn current_command_buffer(&self) -> &B::CommandBuffer {
        let slot = &self.slots[slot_index(self.current)];
        assert_eq!(
            slot.state(),
            FrameSlotState::Recording,
            "frame slot {} is not recording",
            slot.index()
        );
        &slot.command_buffer
    }

    /// 结束录制，提交，然后 present
    ///
    /// present 报告 surface 过期时只做标记，由 `needs_resize` 通知外部
    pub fn flush_current_command_buffer(&mut self) {
        let index = slot_index(self.current);
        let slot = &mut self.slots[index];
        assert_eq!(slot.state(), FrameSlotState::Recording, "frame slot {} is not recording", index);

        self.backend.end_command_buffer(&slot.command_buffer);
        self.backend.reset_fence(&slot.fence);
        self.backend.submit(&slot.command_buffer, &slot.image_available, &slot.render_finished, &slot.fence);
        slot.transit(FrameSlotState::Submitted);

        if self.backend.present(index, &slot.render_finished) {
            log::warn!("surface is out of date after presenting image {}", index);
            self.needs_resize = true;
        }
        slot.transit(FrameSlotState::Presented);
    }
}

fn slot_index(current: Option<usize>) -> usize {
    current.unwrap_or_else(|| panic!("no frame slot is acquired"))
}

// getters
impl<B: FrameBackend> FrameRingBuffer<B> {
    #[inline]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_state(&self, index: usize) -> FrameSlotState {
        self.slots[index].state()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.surface.extent
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.surface.color_format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.surface.depth_format
    }

    #[inline]
    pub fn depth_image(&self) -> vk::Image {
        self.surface.depth_image
    }

    #[inline]
    pub fn depth_view(&self) -> vk::ImageView {
        self.surface.depth_view
    }

    pub fn current_image(&self) -> vk::Image {
        self.surface.images[slot_index(self.current)]
    }

    pub fn current_image_view(&self) -> vk::ImageView {
        self.surface.image_views[slot_index(self.current)]
    }

    /// 成功 acquire 的次数
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// debug label，例如 `[F12B]`
    pub fn frame_name(&self) -> String {
        let label = match self.current {
            Some(index) => char::from(b'A' + (index % 26) as u8),
            None => '-',
        };
        format!("[F{}{}]", self.frame_id, label)
    }

    #[inline]
    pub fn needs_resize(&self) -> bool {
        self.needs_resize
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::backend::headless::HeadlessFrameBackend;

    fn run_frame(ring: &mut FrameRingBuffer<HeadlessFrameBackend>) -> usize {
        prism_crate_tools::init_log::try_init_log();
        let index = ring.acquire().unwrap();
        ring.begin_command_buffer();
        let _cmd = ring.current_command_buffer();
        ring.flush_current_command_buffer();
        index
    }

    #[test]
    fn test_acquire_stays_in_range_and_waits_fence() {
        let (backend, calls) = HeadlessFrameBackend::new(3);
        let mut ring = FrameRingBuffer::init(backend, 800, 600).unwrap();
        assert_eq!(ring.slot_count(), 3);

        for frame in 0..10 {
            let index = ring.acquire().unwrap();
            assert!(index < ring.slot_count());
            // 重用之前 fence 一定是 signaled
            assert!(ring.backend().is_fence_signaled(&ring.slots[index].fence));
            assert_eq!(ring.slot_state(index), FrameSlotState::Acquired);

            ring.begin_command_buffer();
            ring.flush_current_command_buffer();
            assert_eq!(ring.slot_state(index), FrameSlotState::Presented);
            // 提交之后 fence 处于 in flight 状态
            assert!(!ring.backend().is_fence_signaled(&ring.slots[index].fence));
            assert_eq!(ring.frame_id(), frame + 1);
        }

        let calls = calls.borrow();
        assert_eq!(calls.fence_waits, 10);
        assert_eq!(calls.presents, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
        for (cmd, wait, signal) in &calls.submits {
            assert!(cmd.starts_with("frame-"));
            assert_ne!(wait, signal);
            assert!(signal.ends_with("render-finished"));
        }
    }

    #[test]
    fn test_image_available_semaphores_rotate() {
        let (backend, calls) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();

        for _ in 0..4 {
            run_frame(&mut ring);
        }

        // 同一个 slot 连续两次提交等待的 semaphore 不同
        let calls = calls.borrow();
        assert_ne!(calls.submits[0].1, calls.submits[2].1);
        assert_ne!(calls.submits[1].1, calls.submits[3].1);
    }

    #[test]
    fn test_out_of_date_acquire_then_resize() {
        let (mut backend, calls) = HeadlessFrameBackend::new(3);
        backend.out_of_date_on_acquire = true;
        let mut ring = FrameRingBuffer::init(backend, 800, 600).unwrap();

        assert_eq!(ring.acquire(), None);
        assert!(ring.needs_resize());
        assert_eq!(ring.current_index(), None);
        assert_eq!(ring.frame_id(), 0);

        let semaphores_before = calls.borrow().semaphores_created;
        ring.resize(1024, 768).unwrap();
        assert!(!ring.needs_resize());
        assert_eq!(ring.extent(), vk::Extent2D { width: 1024, height: 768 });
        assert_eq!(calls.borrow().idle_waits, 1);
        assert_eq!(calls.borrow().surface_builds, 2);
        // slot 数量不变时 sync 对象保留
        assert_eq!(calls.borrow().semaphores_created, semaphores_before);

        assert_eq!(run_frame(&mut ring), 0);
    }

    #[test]
    fn test_resize_forces_idle() {
        let (backend, _) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        run_frame(&mut ring);
        ring.acquire().unwrap();
        ring.begin_command_buffer();

        ring.resize(128, 128).unwrap();
        for index in 0..ring.slot_count() {
            assert_eq!(ring.slot_state(index), FrameSlotState::Idle);
        }
        assert_eq!(ring.current_index(), None);
    }

    #[test]
    fn test_resize_mid_frame_replaces_signaled_semaphore() {
        let (backend, calls) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        ring.acquire().unwrap();
        let semaphores_before = calls.borrow().semaphores_created;

        ring.resize(128, 128).unwrap();
        assert_eq!(calls.borrow().semaphores_created, semaphores_before + 1);

        // backend 在重复 signal 同一个 semaphore 时 panic
        for _ in 0..4 {
            run_frame(&mut ring);
        }
        assert_eq!(calls.borrow().submits.len(), 4);
    }

    #[test]
    fn test_resize_changes_slot_count() {
        let (backend, calls) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        ring.backend.image_count = 4;

        ring.resize(64, 64).unwrap();
        assert_eq!(ring.slot_count(), 4);
        // 新增两个 slot，各自一个 fence
        assert_eq!(calls.borrow().fences_created, 4);
        assert!((0..8).map(|_| run_frame(&mut ring)).all(|index| index < 4));
    }

    #[test]
    fn test_present_out_of_date_requests_resize() {
        let (backend, _) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        ring.backend.out_of_date_on_present = true;

        run_frame(&mut ring);
        assert!(ring.needs_resize());
    }

    #[test]
    fn test_frame_name() {
        let (backend, _) = HeadlessFrameBackend::new(3);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        run_frame(&mut ring);
        run_frame(&mut ring);
        assert_eq!(ring.frame_name(), "[F2B]");
    }

    #[test]
    #[should_panic(expected = "no frame slot is acquired")]
    fn test_record_without_acquire() {
        let (backend, _) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        ring.begin_command_buffer();
    }

    #[test]
    #[should_panic(expected = "flush it before acquiring")]
    fn test_acquire_twice_without_flush() {
        let (backend, _) = HeadlessFrameBackend::new(2);
        let mut ring = FrameRingBuffer::init(backend, 64, 64).unwrap();
        ring.acquire().unwrap();
        ring.acquire();
    }
}
