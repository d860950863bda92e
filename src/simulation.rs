//! # Simulation モジュール
//!
//! 連結車両シミュレーションのメインループを提供します。
//!
//! シナリオ設定からチェーン・ステアリング・固定ステップスケジューラを構築し、
//! 仮想の描画フレームを一定間隔で与えてシミュレーションを進めます。
//! 各ステップの後にチェーン全体の姿勢を描画シンクへ渡します。
//!
//! ## 1ステップの処理順序
//!
//! 1. **イベント処理**: 実行時刻に達したトレーラー追加・削除や UI 操舵入力を適用
//! 2. **操舵角決定**: ステアリングポリシーから操舵角を取得しクランプ
//! 3. **チェーン更新**: 牽引車 → トレーラー列の順に状態遷移
//! 4. **姿勢出力**: 描画シンクへスナップショットを記録
//!
//! 構造変更（イベント）は必ずステップとステップの間に行われます。
//!
//! ## 使用例
//!
//! ```no_run
//! use trailersim::output::NullSink;
//! use trailersim::scenario::ScenarioConfig;
//! use trailersim::simulation::SimulationEngine;
//!
//! let config = ScenarioConfig::from_file("scenarios/figure_eight.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1)?;
//! let summary = engine.run(&mut NullSink)?;
//! println!("{} steps", summary.steps);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::chain::{ChainError, ChainIntegrator, UnitPose};
use crate::models::{
    ConfigError, Leader, ManualCommand, Pose2D, SteeringContext, SteeringController, TrailerGeometry,
    math_utils,
};
use crate::output::{PoseFrame, PoseSink, SinkError};
use crate::scenario::{EventConfig, ScenarioAction, ScenarioConfig, ScenarioError};
use crate::scheduler::FixedStepScheduler;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("構成エラー: {0}")]
    Config(#[from] ConfigError),

    #[error("チェーン操作エラー: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// 実行結果の概要
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub frames: u64,
    pub sim_time: f64,
    pub final_poses: Vec<UnitPose>,
}

/// ステップごとに更新される実行時状態
struct ChainRuntime {
    chain: ChainIntegrator,
    steering: SteeringController,
    pending_events: VecDeque<EventConfig>,
    spawn_geometry: TrailerGeometry,
    step_count: u64,
    verbose_level: u8,
}

impl ChainRuntime {
    /// 1ステップ実行して姿勢をシンクへ記録
    fn step_once<S: PoseSink + ?Sized>(&mut self, dt: f64, sim_time: f64, sink: &mut S) -> Result<(), SimulationError> {
        self.apply_due_events(sim_time)?;

        let leader = self.chain.leader();
        let ctx = SteeringContext {
            time: sim_time,
            leader_position: leader.pose.position(),
            rear_axle_position: leader.rear_axle_position(),
        };
        let steer = self.steering.next(&ctx);

        self.chain.step(dt, steer)?;
        self.step_count += 1;

        sink.record(&PoseFrame {
            step: self.step_count,
            time: sim_time + dt,
            steer,
            units: self.chain.poses(),
        })?;

        if self.verbose_level > 2 {
            let pose = self.chain.leader().pose;
            trace!(
                "時刻: {:.2}秒 (ステップ: {}) 牽引車 ({:.2}, {:.2}) 方位 {:.1}° 舵角 {:.1}°",
                sim_time + dt,
                self.step_count,
                pose.x,
                pose.y,
                math_utils::rad_to_deg(pose.theta),
                math_utils::rad_to_deg(steer)
            );
        }

        Ok(())
    }

    /// 実行時刻に達したイベントを順に適用
    fn apply_due_events(&mut self, sim_time: f64) -> Result<(), SimulationError> {
        while self.pending_events.front().is_some_and(|e| e.time_s <= sim_time) {
            let Some(event) = self.pending_events.pop_front() else {
                break;
            };
            self.apply_event(&event)?;
        }
        Ok(())
    }

    fn apply_event(&mut self, event: &EventConfig) -> Result<(), SimulationError> {
        match &event.action {
            ScenarioAction::Append { heading_deg } => {
                let index = match heading_deg {
                    Some(deg) => self
                        .chain
                        .append_with_heading(self.spawn_geometry, math_utils::deg_to_rad(*deg))?,
                    None => self.chain.append(self.spawn_geometry)?,
                };
                info!("トレーラー追加: #{} (時刻 {:.2}秒)", index, event.time_s);
            }
            ScenarioAction::Remove => match self.chain.remove() {
                Ok(_) => info!("トレーラー削除: 残り {}台 (時刻 {:.2}秒)", self.chain.trailer_count(), event.time_s),
                Err(ChainError::NoTrailerToRemove) => {
                    warn!("削除できるトレーラーがないため削除イベントを無視しました (時刻 {:.2}秒)", event.time_s)
                }
                Err(e) => return Err(e.into()),
            },
            ScenarioAction::SteerLeft => self.manual(ManualCommand::Left, event.time_s),
            ScenarioAction::SteerRight => self.manual(ManualCommand::Right, event.time_s),
            ScenarioAction::SteerUi { pointer } => self.manual(ManualCommand::Pointer(*pointer), event.time_s),
            ScenarioAction::SetSpeed { speed_mps } => {
                self.chain.leader_mut().set_speed(*speed_mps)?;
                info!("牽引車速度変更: {:.2}m/s (時刻 {:.2}秒)", speed_mps, event.time_s);
            }
        }
        Ok(())
    }

    fn manual(&mut self, command: ManualCommand, time: f64) {
        if self.steering.apply_manual(command) {
            debug!("手動操舵入力: {:?} (時刻 {:.2}秒)", command, time);
        } else {
            warn!(
                "手動操舵入力 {:?} は '{}' ポリシーでは無視されます",
                command,
                self.steering.source().name()
            );
        }
    }
}

pub struct SimulationEngine {
    pub scenario_config: ScenarioConfig,
    pub verbose_level: u8,
    scheduler: FixedStepScheduler,
    runtime: ChainRuntime,
    frame_count: u64,
    /// 最後に進行状況を報告したステップ区切り（PROGRESS_INTERVAL 単位）
    reported_milestone: u64,
}

/// 進行状況を報告するステップ間隔
const PROGRESS_INTERVAL: u64 = 100;

/// 前回の報告以降に新しい区切りを越えていればその区切り番号を返す
///
/// 1フレームで複数ステップ進む場合も区切りを取りこぼさない。
fn next_milestone(reported: u64, steps: u64) -> Option<u64> {
    let milestone = steps / PROGRESS_INTERVAL;
    (milestone > reported).then_some(milestone)
}

impl SimulationEngine {
    /// シナリオからエンジンを構築（チェーン・ステアリング・スケジューラを初期化）
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Result<Self, SimulationError> {
        scenario.validate()?;

        let chain = Self::build_chain(&scenario)?;
        let max_angle = scenario.steering.max_angle();
        let steering = SteeringController::new(scenario.steering.policy.build(max_angle)?, max_angle)?;
        let scheduler = FixedStepScheduler::new(scenario.sim.fixed_step_s, scenario.sim.dt_s)?
            .with_max_steps_per_frame(scenario.sim.max_steps_per_frame);

        let mut events = scenario.events.clone();
        events.sort_by(|a, b| a.time_s.total_cmp(&b.time_s));

        if verbose_level > 0 {
            info!("初期化完了:");
            info!("  ユニット数: {} (牽引車 + トレーラー{}台)", chain.len(), chain.trailer_count());
            info!("  ステアリング: {}", steering.source().name());
            info!("  イベント: {}件", events.len());
        }

        Ok(Self {
            runtime: ChainRuntime {
                chain,
                steering,
                pending_events: events.into(),
                spawn_geometry: scenario.spawn.trailer.geometry(),
                step_count: 0,
                verbose_level,
            },
            scheduler,
            scenario_config: scenario,
            verbose_level,
            frame_count: 0,
            reported_milestone: 0,
        })
    }

    fn build_chain(scenario: &ScenarioConfig) -> Result<ChainIntegrator, SimulationError> {
        let cfg = &scenario.leader;
        let leader = Leader::new(
            Pose2D::new(cfg.position.x_m, cfg.position.y_m, math_utils::deg_to_rad(cfg.heading_deg)),
            cfg.speed_mps,
            math_utils::deg_to_rad(cfg.initial_steer_deg),
            cfg.geometry(),
            scenario.sim.integration,
        )?;

        let mut chain = ChainIntegrator::new(leader, scenario.spawn.heading);
        for trailer in &scenario.trailers {
            match trailer.heading_deg {
                Some(deg) => chain.append_with_heading(trailer.geometry(), math_utils::deg_to_rad(deg))?,
                None => chain.append(trailer.geometry())?,
            };
        }
        Ok(chain)
    }

    /// 終了時刻まで実行
    ///
    /// 1フレームごとに `frame_dt_s` をスケジューラへ与える。終了判定はフレーム
    /// 単位なので、フレーム間隔が固定ステップより長い場合は最後のフレームで
    /// 終了時刻をわずかに超えることがある。
    pub fn run<S: PoseSink + ?Sized>(&mut self, sink: &mut S) -> Result<RunSummary, SimulationError> {
        info!("=== シミュレーション実行開始 ===");

        let t_max = self.scenario_config.sim.t_max_s;
        let frame_dt = self.scenario_config.sim.frame_dt_s;

        while self.scheduler.sim_time() < t_max {
            let runtime = &mut self.runtime;
            self.scheduler
                .advance(frame_dt, |dt, t| runtime.step_once(dt, t, &mut *sink))?;
            self.frame_count += 1;

            let steps = self.scheduler.step_count();
            if let Some(milestone) = next_milestone(self.reported_milestone, steps) {
                self.reported_milestone = milestone;
                if self.verbose_level > 0 {
                    let progress = (self.scheduler.sim_time() / t_max) * 100.0;
                    info!(
                        "進行状況: {:.1}% ({:.1}/{:.1}秒)",
                        progress.min(100.0),
                        self.scheduler.sim_time(),
                        t_max
                    );
                }
            }
        }
        sink.flush()?;

        let summary = RunSummary {
            steps: self.scheduler.step_count(),
            frames: self.frame_count,
            sim_time: self.scheduler.sim_time(),
            final_poses: self.runtime.chain.poses(),
        };

        info!("=== シミュレーション完了 ===");
        info!("シミュレーション時間: {:.1}秒", summary.sim_time);
        info!("総ステップ数: {}", summary.steps);

        Ok(summary)
    }

    pub fn chain(&self) -> &ChainIntegrator {
        &self.runtime.chain
    }

    pub fn sim_time(&self) -> f64 {
        self.scheduler.sim_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SteeringConfig, UnitKind};
    use crate::output::MemorySink;

    fn demo(t_max: f64) -> ScenarioConfig {
        let mut config = ScenarioConfig::builtin_demo();
        config.sim.t_max_s = t_max;
        config
    }

    #[test]
    fn test_run_records_every_step() {
        let mut engine = SimulationEngine::new(demo(1.0), 0).expect("valid engine");
        let mut sink = MemorySink::default();
        let summary = engine.run(&mut sink).expect("run");
        assert_eq!(summary.steps, 10);
        assert_eq!(sink.frames.len(), 10);
        assert_eq!(sink.frames[0].units.len(), 3);
        assert_eq!(sink.frames[0].units[0].kind, UnitKind::Leader);
        assert!((sink.frames[9].time - summary.sim_time).abs() < 1e-9);
        assert_eq!(summary.final_poses, engine.chain().poses());
    }

    #[test]
    fn test_events_mutate_chain_between_steps() {
        let mut config = demo(2.0);
        config.events = vec![
            EventConfig {
                time_s: 0.5,
                action: ScenarioAction::Append { heading_deg: None },
            },
            EventConfig {
                time_s: 1.0,
                action: ScenarioAction::Remove,
            },
            EventConfig {
                time_s: 1.1,
                action: ScenarioAction::Remove,
            },
            EventConfig {
                time_s: 1.2,
                action: ScenarioAction::Remove,
            },
            // 牽引車のみの状態での削除は無視される
            EventConfig {
                time_s: 1.3,
                action: ScenarioAction::Remove,
            },
        ];
        let mut engine = SimulationEngine::new(config, 0).expect("valid engine");
        let mut sink = MemorySink::default();
        engine.run(&mut sink).expect("run");

        let lengths: Vec<usize> = sink.frames.iter().map(|f| f.units.len()).collect();
        assert_eq!(lengths[0], 3);
        assert!(lengths.contains(&4));
        assert_eq!(*lengths.last().expect("frames"), 1);
        assert_eq!(engine.chain().len(), 1);
    }

    #[test]
    fn test_manual_steering_events() {
        let mut config = demo(1.0);
        config.steering.policy = SteeringConfig::Manual {
            initial_deg: 0.0,
            step_deg: 5.0,
            return_rate_rad: 0.0,
        };
        config.events = vec![
            EventConfig {
                time_s: 0.0,
                action: ScenarioAction::SteerLeft,
            },
            EventConfig {
                time_s: 0.0,
                action: ScenarioAction::SteerLeft,
            },
        ];
        let mut engine = SimulationEngine::new(config, 0).expect("valid engine");
        let mut sink = MemorySink::default();
        engine.run(&mut sink).expect("run");
        assert!((sink.frames[0].steer - math_utils::deg_to_rad(10.0)).abs() < 1e-12);
        assert!(engine.chain().leader().pose.theta > std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn test_set_speed_event_stops_chain() {
        let mut config = demo(1.0);
        config.events = vec![EventConfig {
            time_s: 0.0,
            action: ScenarioAction::SetSpeed { speed_mps: 0.0 },
        }];
        let mut engine = SimulationEngine::new(config, 0).expect("valid engine");
        let before = engine.chain().poses();
        engine.run(&mut MemorySink::default()).expect("run");
        assert_eq!(engine.chain().poses(), before);
    }

    #[test]
    fn test_slow_frames_run_multiple_steps() {
        let mut config = demo(1.0);
        config.sim.frame_dt_s = 4.0 / 60.0;
        let mut engine = SimulationEngine::new(config, 0).expect("valid engine");
        let summary = engine.run(&mut MemorySink::default()).expect("run");
        assert!(summary.frames < summary.steps);
        assert!(summary.steps >= 10);
    }

    #[test]
    fn test_progress_milestones_survive_multi_step_frames() {
        assert_eq!(next_milestone(0, 0), None);
        assert_eq!(next_milestone(0, 99), None);
        assert_eq!(next_milestone(0, 102), Some(1));
        assert_eq!(next_milestone(1, 199), None);
        assert_eq!(next_milestone(1, 203), Some(2));
        assert_eq!(next_milestone(2, 512), Some(5));

        // 1フレーム3ステップでは 100 の倍数ちょうどで終わらないフレームがある
        let mut config = demo(25.0);
        config.sim.frame_dt_s = 3.0 / 60.0;
        let mut engine = SimulationEngine::new(config, 1).expect("valid engine");
        let summary = engine.run(&mut MemorySink::default()).expect("run");
        assert_eq!(engine.reported_milestone, summary.steps / PROGRESS_INTERVAL);
        assert!(engine.reported_milestone >= 2);
    }

    #[test]
    fn test_invalid_scenario_rejected() {
        let mut config = demo(1.0);
        config.trailers[0].dist_to_axle_m = 0.0;
        assert!(matches!(
            SimulationEngine::new(config, 0),
            Err(SimulationError::Scenario(ScenarioError::Config(ConfigError::NonPositiveAxleDistance(_))))
        ));
    }
}
