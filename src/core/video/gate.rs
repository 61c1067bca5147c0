use std::sync::Arc;

use rustdct::{DctPlanner, TransformType2And3};

use super::frame::Frame;

const SAMPLE: usize = 16;

/// 帧变化门限配置
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// 综合差异得分阈值，低于该值视为同一画面
    pub threshold: f32,
    /// 是否启用（关闭后每帧都送分类器）
    pub enabled: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.10,
            enabled: true,
        }
    }
}

impl GateConfig {
    pub fn disabled() -> Self {
        Self {
            threshold: 0.0,
            enabled: false,
        }
    }
}

/// 帧变化门限 - pHash(DCT) + 灰度直方图
///
/// 画面静止时跳过重复推理：与上一帧几乎一致的帧不再送分类器，
/// 会话层直接复用上一次的预测结果。
pub struct FrameGate {
    config: GateConfig,
    dct: Arc<dyn TransformType2And3<f32>>,
    last_hash: Option<u64>,
    last_histogram: Option<[u32; 64]>,
}

impl FrameGate {
    pub fn new(config: GateConfig) -> Self {
        let dct = DctPlanner::new().plan_dct2(SAMPLE);
        Self {
            config,
            dct,
            last_hash: None,
            last_histogram: None,
        }
    }

    /// 当前帧相对上一帧是否有可见变化。
    /// 首帧恒为 true；禁用时恒为 true。
    pub fn has_changed(&mut self, frame: &Frame) -> bool {
        if !self.config.enabled {
            return true;
        }

        let gray = frame.luma();
        let sampled = downsample(&gray, frame.width as usize, frame.height as usize);

        let current_hash = self.phash(&sampled);
        let current_histogram = histogram(&gray);

        let changed = match (self.last_hash, &self.last_histogram) {
            (Some(last_hash), Some(last_hist)) => {
                let hash_diff = (current_hash ^ last_hash).count_ones() as f32 / 64.0;
                let hist_sim = histogram_similarity(&current_histogram, last_hist);

                let score = hash_diff * 0.5 + (1.0 - hist_sim) * 0.5;
                score > self.config.threshold
            }
            _ => true,
        };

        self.last_hash = Some(current_hash);
        self.last_histogram = Some(current_histogram);

        changed
    }

    /// 16x16 下采样块做二维 DCT，取左上 8x8 低频系数（去掉直流分量），
    /// 与中值比较得到 64 位感知哈希
    fn phash(&self, sampled: &[u8]) -> u64 {
        let mut block: Vec<f32> = sampled.iter().map(|&v| v as f32).collect();

        // 行变换
        for row in block.chunks_exact_mut(SAMPLE) {
            self.dct.process_dct2(row);
        }

        // 转置后做列变换
        let mut transposed = vec![0.0f32; SAMPLE * SAMPLE];
        for y in 0..SAMPLE {
            for x in 0..SAMPLE {
                transposed[x * SAMPLE + y] = block[y * SAMPLE + x];
            }
        }
        for row in transposed.chunks_exact_mut(SAMPLE) {
            self.dct.process_dct2(row);
        }

        // transposed[x * SAMPLE + y] 即系数 (x, y)
        let mut coeffs = [0.0f32; 64];
        for v in 0..8 {
            for u in 0..8 {
                coeffs[v * 8 + u] = transposed[u * SAMPLE + v];
            }
        }
        coeffs[0] = 0.0; // 直流分量不参与比较

        let mut sorted = coeffs;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = (sorted[31] + sorted[32]) / 2.0;

        let mut hash: u64 = 0;
        for (i, &c) in coeffs.iter().enumerate() {
            if c > median {
                hash |= 1 << i;
            }
        }
        hash
    }

    pub fn reset(&mut self) {
        self.last_hash = None;
        self.last_histogram = None;
    }
}

/// 块平均下采样到 SAMPLE x SAMPLE
fn downsample(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    let block_w = (width / SAMPLE).max(1);
    let block_h = (height / SAMPLE).max(1);

    let mut result = Vec::with_capacity(SAMPLE * SAMPLE);

    for by in 0..SAMPLE {
        for bx in 0..SAMPLE {
            let y_start = by * block_h;
            let y_end = ((by + 1) * block_h).min(height);
            let x_start = bx * block_w;
            let x_end = ((bx + 1) * block_w).min(width);

            let mut sum = 0u32;
            let mut count = 0u32;
            for y in y_start..y_end {
                let row = y * width;
                for x in x_start..x_end {
                    if let Some(&v) = gray.get(row + x) {
                        sum += v as u32;
                        count += 1;
                    }
                }
            }

            result.push(if count > 0 { (sum / count) as u8 } else { 0 });
        }
    }

    result
}

/// 灰度直方图（64 bins）
fn histogram(gray: &[u8]) -> [u32; 64] {
    let mut hist = [0u32; 64];
    for &val in gray {
        hist[(val >> 2) as usize] += 1;
    }
    hist
}

fn histogram_similarity(h1: &[u32; 64], h2: &[u32; 64]) -> f32 {
    let overlap: u32 = h1.iter().zip(h2.iter()).map(|(a, b)| a.min(b)).sum();
    let sum1: u32 = h1.iter().sum();
    let sum2: u32 = h2.iter().sum();

    if sum1 == 0 || sum2 == 0 {
        return 0.0;
    }

    overlap as f32 / sum1.max(sum2) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(fill: u8, n: u64) -> Frame {
        let data = vec![fill; 128 * 128 * 4];
        Frame::new(128, 128, data, n * 33, n)
    }

    fn striped_frame(n: u64) -> Frame {
        let mut data = Vec::with_capacity(128 * 128 * 4);
        for y in 0..128u32 {
            for _x in 0..128u32 {
                let v: u8 = if (y / 8) % 2 == 0 { 230 } else { 20 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::new(128, 128, data, n * 33, n)
    }

    #[test]
    fn test_first_frame_always_changed() {
        let mut gate = FrameGate::new(GateConfig::default());
        assert!(gate.has_changed(&flat_frame(128, 0)));
    }

    #[test]
    fn test_identical_frames_gated() {
        let mut gate = FrameGate::new(GateConfig::default());
        assert!(gate.has_changed(&flat_frame(128, 0)));
        assert!(!gate.has_changed(&flat_frame(128, 1)));
        assert!(!gate.has_changed(&flat_frame(129, 2)));
    }

    #[test]
    fn test_scene_change_passes() {
        let mut gate = FrameGate::new(GateConfig::default());
        assert!(gate.has_changed(&flat_frame(20, 0)));
        assert!(gate.has_changed(&striped_frame(1)));
    }

    #[test]
    fn test_disabled_gate_never_blocks() {
        let mut gate = FrameGate::new(GateConfig::disabled());
        assert!(gate.has_changed(&flat_frame(128, 0)));
        assert!(gate.has_changed(&flat_frame(128, 1)));
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut gate = FrameGate::new(GateConfig::default());
        assert!(gate.has_changed(&flat_frame(128, 0)));
        assert!(!gate.has_changed(&flat_frame(128, 1)));

        gate.reset();
        assert!(gate.has_changed(&flat_frame(128, 2)));
    }

    #[test]
    fn test_histogram_similarity_identity() {
        let h = [2u32; 64];
        assert!((histogram_similarity(&h, &h) - 1.0).abs() < 0.01);
    }
}
