use crate::frame::backend::FrameBackend;

/// 一个 frame slot 在一帧之内的状态
///
/// `Idle -> Acquired -> Recording -> Submitted -> Presented -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSlotState {
    #[default]
    Idle,
    Acquired,
    Recording,
    Submitted,
    Presented,
}

impl FrameSlotState {
    pub fn can_transit_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Acquired)
                | (Self::Acquired, Self::Recording)
                | (Self::Recording, Self::Submitted)
                | (Self::Submitted, Self::Presented)
                | (Self::Presented, Self::Idle)
        )
    }
}

/// ring buffer 中的一项，和 surface 的一个 image 一一对应
pub struct FrameSlot<B: FrameBackend> {
    index: usize,
    state: FrameSlotState,

    pub(crate) command_buffer: B::CommandBuffer,
    /// 上一次提交的 GPU 工作完成时 signaled
    pub(crate) fence: B::Fence,
    /// image 可用时 signaled；acquire 之后和备用 semaphore 交换
    pub(crate) image_available: B::Semaphore,
    /// 渲染结束时 signaled，present 等待它
    pub(crate) render_finished: B::Semaphore,
}

impl<B: FrameBackend> FrameSlot<B> {
    pub(crate) fn new(backend: &mut B, index: usize) -> anyhow::Result<Self> {
        Ok(Self {
            index,
            state: FrameSlotState::Idle,
            command_buffer: backend.alloc_command_buffer(&format!("frame-{index}"))?,
            fence: backend.create_fence(true, &format!("frame-{index}-in-flight"))?,
            image_available: backend.create_semaphore(&format!("frame-{index}-image-available"))?,
            render_finished: backend.create_semaphore(&format!("frame-{index}-render-finished"))?,
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn state(&self) -> FrameSlotState {
        self.state
    }

    pub(crate) fn transit(&mut self, next: FrameSlotState) {
        assert!(
            self.state.can_transit_to(next),
            "frame slot {}: illegal transition {:?} -> {:?}",
            self.index,
            self.state,
            next
        );
        self.state = next;
    }

    /// device idle 之后，所有 slot 都可以直接回到 Idle
    pub(crate) fn force_idle(&mut self) {
        self.state = FrameSlotState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_transitions() {
        use FrameSlotState::*;
        let cycle = [Idle, Acquired, Recording, Submitted, Presented, Idle];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transit_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }

        assert!(!Idle.can_transit_to(Recording));
        assert!(!Recording.can_transit_to(Recording));
        assert!(!Submitted.can_transit_to(Idle));
        assert!(!Presented.can_transit_to(Acquired));
    }
}
