/// 光追 shader 的 push constants，布局需要和 shader 保持一致
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RtxPushConstants {
    pub max_depth: u32,
    pub samples_per_pixel: u32,
    /// 已经累积的帧数，shader 用于混合历史结果；0 表示重新开始
    pub accumulated_frames: u32,
    pub frame_seed: u32,
}

/// 渐进式光追的可变状态
///
/// 相机静止时逐帧累积，相机移动后累积必须从头开始
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtxTraceState {
    max_depth: u32,
    /// pipeline 创建时的 max recursion depth，max_depth 不能超过它
    depth_limit: u32,
    samples_per_pixel: u32,
    accumulated_frames: u32,
    accumulation_limit: Option<u32>,
    frame_seed: u32,
}

impl RtxTraceState {
    /// 硬件允许的最大递归深度
    pub const MAX_RAY_DEPTH_LIMIT: u32 = 31;

    pub fn new(max_depth: u32, samples_per_pixel: u32, accumulation_limit: Option<u32>) -> Self {
        Self {
            max_depth: max_depth.clamp(1, Self::MAX_RAY_DEPTH_LIMIT),
            depth_limit: Self::MAX_RAY_DEPTH_LIMIT,
            samples_per_pixel: samples_per_pixel.max(1),
            accumulated_frames: 0,
            accumulation_limit,
            frame_seed: 0,
        }
    }

    #[inline]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[inline]
    pub fn depth_limit(&self) -> u32 {
        self.depth_limit
    }

    #[inline]
    pub fn samples_per_pixel(&self) -> u32 {
        self.samples_per_pixel
    }

    #[inline]
    pub fn accumulated_frames(&self) -> u32 {
        self.accumulated_frames
    }

    /// 改变采样参数之后之前的累积结果不再有效
    pub fn set_max_depth(&mut self, max_depth: u32) {
        if max_depth > self.depth_limit {
            log::warn!("ray depth {} exceeds the pipeline limit {}, clamped", max_depth, self.depth_limit);
        }
        self.max_depth = max_depth.clamp(1, self.depth_limit);
        self.reset_accumulation();
    }

    /// pipeline 重建之后由 renderer 设置
    pub fn set_depth_limit(&mut self, limit: u32) {
        self.depth_limit = limit.clamp(1, Self::MAX_RAY_DEPTH_LIMIT);
        if self.max_depth > self.depth_limit {
            self.max_depth = self.depth_limit;
            self.reset_accumulation();
        }
    }

    pub fn set_samples_per_pixel(&mut self, samples_per_pixel: u32) {
        self.samples_per_pixel = samples_per_pixel.max(1);
        self.reset_accumulation();
    }

    pub fn set_accumulation_limit(&mut self, limit: Option<u32>) {
        self.accumulation_limit = limit;
    }

    pub fn reset_accumulation(&mut self) {
        if self.accumulated_frames != 0 {
            log::debug!("rtx accumulation reset after {} frames", self.accumulated_frames);
        }
        self.accumulated_frames = 0;
    }

    /// 达到累积上限之后不再需要 trace
    pub fn should_trace(&self) -> bool {
        self.accumulation_limit.is_none_or(|limit| self.accumulated_frames < limit)
    }

    /// 当前帧要推送的常量
    pub fn push_constants(&self) -> RtxPushConstants {
        RtxPushConstants {
            max_depth: self.max_depth,
            samples_per_pixel: self.samples_per_pixel,
            accumulated_frames: self.accumulated_frames,
            frame_seed: self.frame_seed,
        }
    }

    /// 一次 trace 录制完成
    pub fn advance(&mut self) {
        self.accumulated_frames = self.accumulated_frames.saturating_add(1);
        self.frame_seed = self.frame_seed.wrapping_add(1);
    }
}

impl Default for RtxTraceState {
    fn default() -> Self {
        use crate::settings::DefaultRendererSettings;
        Self::new(
            DefaultRendererSettings::DEFAULT_MAX_RAY_DEPTH,
            DefaultRendererSettings::DEFAULT_SAMPLES_PER_PIXEL,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        let state = RtxTraceState::new(0, 0, None);
        assert_eq!(state.max_depth(), 1);
        assert_eq!(state.samples_per_pixel(), 1);

        let mut state = RtxTraceState::new(100, 4, None);
        assert_eq!(state.max_depth(), RtxTraceState::MAX_RAY_DEPTH_LIMIT);
        state.set_max_depth(6);
        assert_eq!(state.max_depth(), 6);
    }

    #[test]
    fn test_depth_never_exceeds_pipeline_limit() {
        let mut state = RtxTraceState::new(12, 1, None);
        state.set_depth_limit(8);
        assert_eq!(state.max_depth(), 8);

        state.set_max_depth(16);
        assert_eq!(state.push_constants().max_depth, 8);
        state.set_max_depth(3);
        assert_eq!(state.max_depth(), 3);

        state.set_depth_limit(64);
        assert_eq!(state.depth_limit(), RtxTraceState::MAX_RAY_DEPTH_LIMIT);
        state.set_max_depth(40);
        assert_eq!(state.max_depth(), RtxTraceState::MAX_RAY_DEPTH_LIMIT);
    }

    #[test]
    fn test_camera_move_restarts_accumulation() {
        let mut state = RtxTraceState::default();
        for _ in 0..3 {
            state.advance();
        }
        assert_eq!(state.push_constants().accumulated_frames, 3);

        state.reset_accumulation();
        let constants = state.push_constants();
        assert_eq!(constants.accumulated_frames, 0);
        // seed 不随累积重置，避免重复同一组随机数
        assert_eq!(constants.frame_seed, 3);
    }

    #[test]
    fn test_accumulation_limit() {
        let mut state = RtxTraceState::new(4, 1, Some(2));
        assert!(state.should_trace());
        state.advance();
        state.advance();
        assert!(!state.should_trace());

        state.set_samples_per_pixel(2);
        assert!(state.should_trace());
        assert_eq!(std::mem::size_of::<RtxPushConstants>(), 16);
    }
}
