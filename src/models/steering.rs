//! # Steering モジュール
//!
//! 牽引車への操舵角を毎ステップ生成するステアリングポリシー群。
//!
//! ポリシーはタグ付き列挙型 [`SteeringSource`] で表現し、シナリオ設定
//! ([`SteeringConfig`]) から選択する。出力は [`SteeringController`] が
//! デバイス固有の最大舵角でクランプする。どのポリシーも時刻または
//! 牽引車位置の履歴と小さな内部状態だけで決まり、ブロックや無制限な
//! メモリ確保は行わない。

use crate::models::{
    common::{Aabb2, Vec2, math_utils},
    error::{ConfigError, require_finite, require_positive},
};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_4, PI};

/// ポリシーへの入力（各ステップの直前に作成）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SteeringContext {
    /// シミュレーション時刻 (s)
    pub time: f64,
    /// 牽引車基準点の位置
    pub leader_position: Vec2,
    /// 牽引車後輪軸の位置
    pub rear_axle_position: Vec2,
}

/// 境界ボックス判定に使う追跡点
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedPoint {
    Leader,
    #[default]
    RearAxle,
}

/// 8の字ヒステリシス操舵
///
/// 牽引車の y 座標が中心線を上向きに横切ったとき (prev < center <= curr)
/// だけ符号を反転する。初期符号は +1。
#[derive(Debug, Clone, PartialEq)]
pub struct FigureEightSteer {
    pub angle: f64,
    pub center: f64,
    sign: f64,
    prev_y: Option<f64>,
}

impl FigureEightSteer {
    pub fn new(angle: f64, center: f64) -> Self {
        Self {
            angle,
            center,
            sign: 1.0,
            prev_y: None,
        }
    }

    /// 直前の y を明示して作成（初回サンプルから交差判定したい場合）
    pub fn with_previous(angle: f64, center: f64, prev_y: f64) -> Self {
        Self {
            prev_y: Some(prev_y),
            ..Self::new(angle, center)
        }
    }

    /// y を1サンプル与えて操舵角を返す
    pub fn sample(&mut self, y: f64) -> f64 {
        if let Some(prev) = self.prev_y {
            if prev < self.center && self.center <= y {
                self.sign = -self.sign;
            }
        }
        self.prev_y = Some(y);
        self.sign * self.angle
    }

    pub fn sign(&self) -> f64 {
        self.sign
    }
}

/// 手動（UI入力）操舵
///
/// 左右ボタンでの段階操作、ポインタ位置での直接指定、毎ステップの自動センタリングを持つ。
#[derive(Debug, Clone, PartialEq)]
pub struct ManualSteer {
    angle: f64,
    /// 1回のボタン操作での変化量 (rad)
    pub step: f64,
    /// 1ステップあたりのセンタリング量 (rad)
    pub return_rate: f64,
    /// 舵角の上限 (rad)
    pub limit: f64,
}

impl ManualSteer {
    pub fn new(initial: f64, step: f64, return_rate: f64, limit: f64) -> Self {
        Self {
            angle: initial.clamp(-limit, limit),
            step,
            return_rate,
            limit,
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// 左（反時計回り）へ1段階
    pub fn nudge_left(&mut self) {
        self.angle = (self.angle + self.step).min(self.limit);
    }

    /// 右（時計回り）へ1段階
    pub fn nudge_right(&mut self) {
        self.angle = (self.angle - self.step).max(-self.limit);
    }

    /// 正規化ポインタ位置 u ∈ [-1, 1] から舵角を設定（u = +1 で右いっぱい）
    pub fn set_from_pointer(&mut self, u: f64) {
        let u = u.clamp(-1.0, 1.0);
        self.angle = (-0.5 * u * PI / 2.0).clamp(-self.limit, self.limit);
    }

    /// 0 へ向けて return_rate だけ戻す（行き過ぎない）
    pub fn recenter(&mut self) {
        let magnitude = (self.angle.abs() - self.return_rate).max(0.0);
        self.angle = magnitude.copysign(self.angle);
    }

    /// 現在の舵角を返し、次ステップに向けてセンタリングする
    fn sample(&mut self) -> f64 {
        let angle = self.angle;
        self.recenter();
        angle
    }
}

/// UI からの操舵コマンド
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManualCommand {
    Left,
    Right,
    Pointer(f64),
}

/// ステアリングポリシー
#[derive(Debug, Clone, PartialEq)]
pub enum SteeringSource {
    /// 固定舵角
    Constant { angle: f64 },
    /// amplitude · sin(2π t / period)
    Sinusoidal { amplitude: f64, period: f64 },
    /// y 座標の上向き交差で符号反転
    FigureEight(FigureEightSteer),
    /// floor(t / period) が奇数なら +angle、偶数なら -angle
    PeriodicFigureEight { angle: f64, period: f64 },
    /// 追跡点がいずれかのボックス内なら angle、それ以外は 0
    BoundingBox {
        angle: f64,
        boxes: Vec<Aabb2>,
        track: TrackedPoint,
    },
    /// UI 入力のパススルー
    Manual(ManualSteer),
}

impl SteeringSource {
    /// 1ステップ分の操舵角（クランプ前）
    pub fn sample(&mut self, ctx: &SteeringContext) -> f64 {
        match self {
            SteeringSource::Constant { angle } => *angle,
            SteeringSource::Sinusoidal { amplitude, period } => *amplitude * (2.0 * PI * ctx.time / *period).sin(),
            SteeringSource::FigureEight(fig8) => fig8.sample(ctx.leader_position.y),
            SteeringSource::PeriodicFigureEight { angle, period } => {
                let phase = (ctx.time / *period).floor().rem_euclid(2.0);
                if phase >= 1.0 { *angle } else { -*angle }
            }
            SteeringSource::BoundingBox { angle, boxes, track } => {
                let p = match track {
                    TrackedPoint::Leader => ctx.leader_position,
                    TrackedPoint::RearAxle => ctx.rear_axle_position,
                };
                if boxes.iter().any(|b| b.contains(p)) { *angle } else { 0.0 }
            }
            SteeringSource::Manual(manual) => manual.sample(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SteeringSource::Constant { .. } => "constant",
            SteeringSource::Sinusoidal { .. } => "sinusoidal",
            SteeringSource::FigureEight(_) => "figure_eight",
            SteeringSource::PeriodicFigureEight { .. } => "periodic_figure_eight",
            SteeringSource::BoundingBox { .. } => "bounding_box",
            SteeringSource::Manual(_) => "manual",
        }
    }
}

/// ポリシー出力を最大舵角でクランプするコントローラ
#[derive(Debug, Clone, PartialEq)]
pub struct SteeringController {
    source: SteeringSource,
    max_angle: f64,
}

impl SteeringController {
    pub fn new(source: SteeringSource, max_angle: f64) -> Result<Self, ConfigError> {
        let max_angle = require_positive("steering.max_angle", max_angle)?;
        Ok(Self { source, max_angle })
    }

    /// 次ステップの操舵角 [-max_angle, max_angle]
    pub fn next(&mut self, ctx: &SteeringContext) -> f64 {
        let raw = self.source.sample(ctx);
        if raw.is_finite() {
            raw.clamp(-self.max_angle, self.max_angle)
        } else {
            0.0
        }
    }

    /// UI コマンドを適用。手動ポリシー以外では何もせず false を返す
    pub fn apply_manual(&mut self, command: ManualCommand) -> bool {
        match &mut self.source {
            SteeringSource::Manual(manual) => {
                match command {
                    ManualCommand::Left => manual.nudge_left(),
                    ManualCommand::Right => manual.nudge_right(),
                    ManualCommand::Pointer(u) => manual.set_from_pointer(u),
                }
                true
            }
            _ => false,
        }
    }

    pub fn source(&self) -> &SteeringSource {
        &self.source
    }

    pub fn max_angle(&self) -> f64 {
        self.max_angle
    }
}

/// シナリオファイルのステアリング設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SteeringConfig {
    Constant {
        angle_deg: f64,
    },
    Sinusoidal {
        amplitude_deg: f64,
        period_s: f64,
    },
    FigureEight {
        angle_deg: f64,
        center_y_m: f64,
        #[serde(default)]
        initial_prev_y_m: Option<f64>,
    },
    PeriodicFigureEight {
        angle_deg: f64,
        period_s: f64,
    },
    BoundingBox {
        angle_deg: f64,
        boxes: Vec<BoxConfig>,
        #[serde(default)]
        track: TrackedPoint,
    },
    Manual {
        #[serde(default)]
        initial_deg: f64,
        #[serde(default = "default_manual_step_deg")]
        step_deg: f64,
        #[serde(default = "default_return_rate_rad")]
        return_rate_rad: f64,
    },
}

fn default_manual_step_deg() -> f64 {
    5.0
}

fn default_return_rate_rad() -> f64 {
    0.01
}

/// 境界ボックス設定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxConfig {
    pub xmin_m: f64,
    pub ymin_m: f64,
    pub xmax_m: f64,
    pub ymax_m: f64,
}

/// 既定の最大舵角 45°
pub const DEFAULT_MAX_STEER: f64 = FRAC_PI_4;

impl SteeringConfig {
    /// 設定からポリシーを構築（単位は度→ラジアンに変換）
    pub fn build(&self, max_angle: f64) -> Result<SteeringSource, ConfigError> {
        let max_angle = require_positive("steering.max_angle", max_angle)?;
        let rad = math_utils::deg_to_rad;
        let source = match self {
            SteeringConfig::Constant { angle_deg } => SteeringSource::Constant {
                angle: rad(require_finite("steering.angle_deg", *angle_deg)?),
            },
            SteeringConfig::Sinusoidal { amplitude_deg, period_s } => SteeringSource::Sinusoidal {
                amplitude: rad(require_finite("steering.amplitude_deg", *amplitude_deg)?),
                period: require_positive("steering.period_s", *period_s)?,
            },
            SteeringConfig::FigureEight {
                angle_deg,
                center_y_m,
                initial_prev_y_m,
            } => {
                let angle = rad(require_finite("steering.angle_deg", *angle_deg)?);
                let center = require_finite("steering.center_y_m", *center_y_m)?;
                let steer = match initial_prev_y_m {
                    Some(prev) => FigureEightSteer::with_previous(angle, center, require_finite("steering.initial_prev_y_m", *prev)?),
                    None => FigureEightSteer::new(angle, center),
                };
                SteeringSource::FigureEight(steer)
            }
            SteeringConfig::PeriodicFigureEight { angle_deg, period_s } => SteeringSource::PeriodicFigureEight {
                angle: rad(require_finite("steering.angle_deg", *angle_deg)?),
                period: require_positive("steering.period_s", *period_s)?,
            },
            SteeringConfig::BoundingBox { angle_deg, boxes, track } => {
                let boxes = boxes
                    .iter()
                    .enumerate()
                    .map(|(index, b)| {
                        let aabb = Aabb2::new(b.xmin_m, b.ymin_m, b.xmax_m, b.ymax_m);
                        if aabb.is_valid() { Ok(aabb) } else { Err(ConfigError::InvalidBox { index }) }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                SteeringSource::BoundingBox {
                    angle: rad(require_finite("steering.angle_deg", *angle_deg)?),
                    boxes,
                    track: *track,
                }
            }
            SteeringConfig::Manual {
                initial_deg,
                step_deg,
                return_rate_rad,
            } => SteeringSource::Manual(ManualSteer::new(
                rad(require_finite("steering.initial_deg", *initial_deg)?),
                rad(require_positive("steering.step_deg", *step_deg)?),
                require_finite("steering.return_rate_rad", *return_rate_rad)?.max(0.0),
                max_angle,
            )),
        };
        Ok(source)
    }
}
