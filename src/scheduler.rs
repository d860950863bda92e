//! 固定時間刻みスケジューラ
//!
//! 描画フレームの可変な経過時間を蓄積し、固定の実時間刻み `fixed_step` ごとに
//! シミュレーションを刻み `dt` で1ステップ進める。トレーラー角の漸化式は
//! dt の一貫性に敏感なので、フレームレートに関わらず同じ dt で積分する。

use crate::models::error::{ConfigError, require_positive};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct FixedStepScheduler {
    /// 1ステップに相当する実時間 (s)
    fixed_step: f64,
    /// 1ステップで進めるシミュレーション時間 (s)
    dt: f64,
    /// 1フレームで実行する最大ステップ数（None なら無制限）
    max_steps_per_frame: Option<u32>,
    accumulator: f64,
    sim_time: f64,
    step_count: u64,
}

impl FixedStepScheduler {
    pub fn new(fixed_step: f64, dt: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            fixed_step: require_positive("fixed_step_s", fixed_step)?,
            dt: require_positive("dt_s", dt)?,
            max_steps_per_frame: None,
            accumulator: 0.0,
            sim_time: 0.0,
            step_count: 0,
        })
    }

    /// 1フレームあたりのステップ数上限を設定
    pub fn with_max_steps_per_frame(mut self, max_steps: Option<u32>) -> Self {
        self.max_steps_per_frame = max_steps.filter(|&n| n > 0);
        self
    }

    /// フレーム経過時間を与え、溜まった分だけ `step(dt, sim_time)` を呼ぶ
    ///
    /// `step` には実行前のシミュレーション時刻を渡す。`step` がエラーを返した
    /// 場合はその時点で中断し、失敗したステップは時刻に加算しない。
    /// 負や非有限の経過時間は無視する。戻り値は実行したステップ数。
    pub fn advance<F, E>(&mut self, frame_delta: f64, mut step: F) -> Result<u32, E>
    where
        F: FnMut(f64, f64) -> Result<(), E>,
    {
        if frame_delta.is_finite() && frame_delta > 0.0 {
            self.accumulator += frame_delta;
        }

        let mut steps = 0u32;
        while self.accumulator >= self.fixed_step {
            if let Some(max) = self.max_steps_per_frame {
                if steps >= max {
                    let dropped = self.accumulator;
                    self.accumulator %= self.fixed_step;
                    warn!(steps, dropped, "1フレームのステップ上限に達したため残りの蓄積時間を破棄しました");
                    break;
                }
            }
            step(self.dt, self.sim_time)?;
            self.accumulator -= self.fixed_step;
            self.step_count += 1;
            // 加算の丸め誤差を溜めないようステップ数から求める
            self.sim_time = self.step_count as f64 * self.dt;
            steps += 1;
        }
        Ok(steps)
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn fixed_step(&self) -> f64 {
        self.fixed_step
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// 未消化の蓄積時間 (s)
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }
}
