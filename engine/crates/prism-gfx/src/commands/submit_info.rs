use ash::vk;
use itertools::Itertools;

use crate::foundation::device::GfxDevice;

/// 对 `vk::SubmitInfo2` 的封装，持有所有被引用的数组
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: commands
                .iter()
                .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
                .collect_vec(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }

    /// builder
    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore).stage_mask(stage));
        self
    }

    /// builder
    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push(vk::SemaphoreSubmitInfo::default().semaphore(semaphore).stage_mask(stage));
        self
    }
}

impl GfxDevice {
    /// 提交到主队列；提交失败属于 device 级别错误，直接 panic
    pub fn submit_to_queue(&self, submit_infos: &[GfxSubmitInfo], fence: vk::Fence) {
        let infos = submit_infos.iter().map(|info| info.submit_info()).collect_vec();
        unsafe {
            self.queue_submit2(self.queue(), &infos, fence)
                .unwrap_or_else(|e| panic!("queue submit failed: {:?}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_submit_info_arrays() {
        let cmd = vk::CommandBuffer::from_raw(7);
        let acquire = vk::Semaphore::from_raw(1);
        let render_finished = vk::Semaphore::from_raw(2);

        let info = GfxSubmitInfo::new(&[cmd])
            .wait(acquire, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .signal(render_finished, vk::PipelineStageFlags2::ALL_COMMANDS);
        let submit = info.submit_info();

        assert_eq!(submit.command_buffer_info_count, 1);
        assert_eq!(submit.wait_semaphore_info_count, 1);
        assert_eq!(submit.signal_semaphore_info_count, 1);
        unsafe {
            assert_eq!((*submit.p_wait_semaphore_infos).semaphore, acquire);
            assert_eq!((*submit.p_signal_semaphore_infos).semaphore, render_finished);
            assert_eq!((*submit.p_command_buffer_infos).command_buffer, cmd);
        }
    }
}
