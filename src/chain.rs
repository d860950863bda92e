//! # Chain モジュール
//!
//! 牽引車と受動トレーラー列からなる連結車両の積分器を提供します。
//!
//! チェーンは `[牽引車, トレーラー1, ..., トレーラーn]` の順序付き列で、
//! トレーラー i の親はトレーラー i-1（i = 0 なら牽引車）です。
//! ポインタで連結せずベクタのインデックスで親を引くため、親子の参照関係は
//! 常に安全に解決されます。
//!
//! ## 更新順序
//!
//! 1ステップ内の更新は必ず親→子の順で行います。各トレーラーは同じステップで
//! 更新済みの親ヒッチ位置・速度を入力とし、1ステップ前の値は使いません。
//! 順序はこのモジュール内部で強制され、呼び出し側の規律には依存しません。
//!
//! ## 構造変更
//!
//! `append` / `remove` は `&mut self` を要求するため、ステップ実行と同時には
//! 呼べません。牽引車は削除できません。

use crate::models::{
    ChainUnit, ConfigError, HitchState, Leader, Trailer, TrailerGeometry, UnitKind, math_utils,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use thiserror::Error;
use tracing::{debug, trace};

/// チェーン操作のエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("削除できるトレーラーがありません（牽引車は削除できません）")]
    NoTrailerToRemove,

    #[error("時間刻みは正の有限値である必要があります (dt={0})")]
    InvalidTimeStep(f64),

    #[error("操舵角が有限値ではありません")]
    NonFiniteSteer,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 追加トレーラーの初期方位角の決め方
///
/// 追加直後にヒッチ速度とトレーラー方位が平行だと角速度0の特異姿勢から
/// 抜け出しにくいため、既定では末尾の方位から ±90° ずらし、追加のたびに
/// 符号を交互に入れ替える。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SpawnHeading {
    /// 末尾の方位 ± offset_deg（符号は追加ごとに交互）
    AlternatingOffset { offset_deg: f64 },
    /// 末尾と同じ方位
    AlignedWithTail,
    /// 固定方位（度）
    Fixed { theta_deg: f64 },
}

impl Default for SpawnHeading {
    fn default() -> Self {
        SpawnHeading::AlternatingOffset {
            offset_deg: math_utils::rad_to_deg(FRAC_PI_2),
        }
    }
}

/// 描画側へ渡す1ユニット分の姿勢
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitPose {
    /// チェーン内の位置（0 = 牽引車）
    pub index: usize,
    pub kind: UnitKind,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// 連結車両の積分器
#[derive(Debug, Clone, PartialEq)]
pub struct ChainIntegrator {
    leader: Leader,
    trailers: Vec<Trailer>,
    spawn: SpawnHeading,
    spawn_sign: f64,
}

impl ChainIntegrator {
    /// 牽引車のみのチェーンを作成
    pub fn new(leader: Leader, spawn: SpawnHeading) -> Self {
        Self {
            leader,
            trailers: Vec::new(),
            spawn,
            spawn_sign: 1.0,
        }
    }

    /// 1ステップ進める
    ///
    /// 牽引車 → トレーラー1 → ... の順に、各ユニットを純粋な状態遷移で更新する。
    /// 入力が不正な場合はチェーンを変更せずにエラーを返す。
    pub fn step(&mut self, dt: f64, steer: f64) -> Result<(), ChainError> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ChainError::InvalidTimeStep(dt));
        }
        if !steer.is_finite() {
            return Err(ChainError::NonFiniteSteer);
        }

        self.leader = self.leader.update(dt, steer);
        let mut parent = self.leader.hitch;
        for trailer in &mut self.trailers {
            *trailer = trailer.update(dt, parent);
            parent = trailer.hitch;
        }

        trace!(
            x = self.leader.pose.x,
            y = self.leader.pose.y,
            theta = self.leader.pose.theta,
            steer,
            "チェーン更新"
        );
        Ok(())
    }

    /// 末尾にトレーラーを追加（初期方位は SpawnHeading に従う）
    ///
    /// 戻り値は追加したトレーラーのチェーン内インデックス。
    pub fn append(&mut self, geometry: TrailerGeometry) -> Result<usize, ChainError> {
        let tail_theta = self.tail_theta();
        let theta = match self.spawn {
            SpawnHeading::AlternatingOffset { offset_deg } => {
                tail_theta + self.spawn_sign * math_utils::deg_to_rad(offset_deg)
            }
            SpawnHeading::AlignedWithTail => tail_theta,
            SpawnHeading::Fixed { theta_deg } => math_utils::deg_to_rad(theta_deg),
        };
        let index = self.append_with_heading(geometry, theta)?;
        // 追加に成功したときだけ符号を入れ替える
        if matches!(self.spawn, SpawnHeading::AlternatingOffset { .. }) {
            self.spawn_sign = -self.spawn_sign;
        }
        Ok(index)
    }

    /// 方位を指定して末尾にトレーラーを追加
    pub fn append_with_heading(&mut self, geometry: TrailerGeometry, theta: f64) -> Result<usize, ChainError> {
        let parent = self.tail_hitch();
        let trailer = Trailer::new(geometry, theta)?.attach(parent.position);
        self.trailers.push(trailer);
        let index = self.trailers.len();
        debug!(index, theta, "トレーラー追加");
        Ok(index)
    }

    /// 末尾のトレーラーを削除
    pub fn remove(&mut self) -> Result<Trailer, ChainError> {
        let removed = self.trailers.pop().ok_or(ChainError::NoTrailerToRemove)?;
        debug!(remaining = self.trailers.len(), "トレーラー削除");
        Ok(removed)
    }

    /// 描画用の全ユニット姿勢（親→子の順）
    pub fn poses(&self) -> Vec<UnitPose> {
        self.units()
            .enumerate()
            .map(|(index, unit)| {
                let pose = unit.body_pose();
                UnitPose {
                    index,
                    kind: unit.kind(),
                    x: pose.x,
                    y: pose.y,
                    theta: pose.theta,
                }
            })
            .collect()
    }

    /// 全ユニットを親→子の順に走査
    pub fn units(&self) -> impl Iterator<Item = &dyn ChainUnit> {
        std::iter::once(&self.leader as &dyn ChainUnit).chain(self.trailers.iter().map(|t| t as &dyn ChainUnit))
    }

    /// 末尾ユニットのヒッチ状態
    fn tail_hitch(&self) -> HitchState {
        self.units().last().map_or(self.leader.hitch, |unit| unit.hitch())
    }

    fn tail_theta(&self) -> f64 {
        self.trailers.last().map_or(self.leader.pose.theta, |t| t.theta)
    }

    pub fn leader(&self) -> &Leader {
        &self.leader
    }

    /// 牽引車への可変参照（速度変更など、ステップ間の操作用）
    pub fn leader_mut(&mut self) -> &mut Leader {
        &mut self.leader
    }

    pub fn trailers(&self) -> &[Trailer] {
        &self.trailers
    }

    /// 牽引車を含むユニット数
    pub fn len(&self) -> usize {
        1 + self.trailers.len()
    }

    /// 牽引車は常に存在するため空にはならない
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn trailer_count(&self) -> usize {
        self.trailers.len()
    }
}
