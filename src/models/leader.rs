use crate::models::{
    common::{HitchState, Pose2D, Vec2},
    error::{ConfigError, require_finite, require_non_negative},
    traits::{ChainUnit, UnitKind},
};
use serde::{Deserialize, Serialize};

/// 牽引車の位置更新に使う積分方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    /// 前進オイラー法（旧方位角で位置を更新）
    #[default]
    Euler,
    /// 中点法（半ステップ後の方位角で位置を更新）
    Midpoint,
}

/// 牽引車（自転車モデル）の幾何定数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderGeometry {
    /// 基準点から前輪軸までの距離 lf (m)
    pub front_wheelbase: f64,
    /// 基準点から後輪軸までの距離 lr (m)
    pub rear_wheelbase: f64,
    /// 基準点からヒッチまでの距離（車体 -x 方向, m）
    pub hitch_offset: f64,
}

impl LeaderGeometry {
    /// 幾何定数の検証
    ///
    /// lf + lr <= 0 は横滑り角が定義できないため拒否する。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lf = require_finite("front_wheelbase", self.front_wheelbase)?;
        let lr = require_finite("rear_wheelbase", self.rear_wheelbase)?;
        require_non_negative("hitch_offset", self.hitch_offset)?;
        if lf + lr <= 0.0 {
            return Err(ConfigError::NonPositiveWheelbase { lf, lr });
        }
        Ok(())
    }

    /// ホイールベース lf + lr
    pub fn wheelbase(&self) -> f64 {
        self.front_wheelbase + self.rear_wheelbase
    }
}

/// 牽引車（運動学的自転車モデル）
///
/// 操舵角と速度のみで運動が決まる。`update` は自身を変更せず、
/// 1ステップ後の新しい状態を返す純粋な状態遷移関数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leader {
    pub geometry: LeaderGeometry,
    pub integration: Integration,
    /// 基準点の姿勢
    pub pose: Pose2D,
    /// 操舵角 (rad)
    pub steer: f64,
    /// 速度 (m/s)
    pub speed: f64,
    /// 横滑り角 β (rad)
    pub slip_angle: f64,
    /// 角速度 ω (rad/s)
    pub omega: f64,
    /// 現在の姿勢に対応するヒッチ状態
    pub hitch: HitchState,
}

impl Leader {
    /// 新しい牽引車を作成
    ///
    /// 初期の操舵角から β・ω を求め、ヒッチ状態も現在の姿勢に合わせて計算する。
    pub fn new(
        pose: Pose2D,
        speed: f64,
        steer: f64,
        geometry: LeaderGeometry,
        integration: Integration,
    ) -> Result<Self, ConfigError> {
        geometry.validate()?;
        if !pose.is_finite() {
            return Err(ConfigError::NonFinite { name: "leader.pose" });
        }
        require_finite("leader.speed", speed)?;
        require_finite("leader.steer", steer)?;

        let (slip_angle, omega) = Self::steering_kinematics(&geometry, speed, steer);
        let mut leader = Self {
            geometry,
            integration,
            pose,
            steer,
            speed,
            slip_angle,
            omega,
            hitch: HitchState::default(),
        };
        leader.hitch = leader.compute_hitch();
        Ok(leader)
    }

    /// 操舵角から (β, ω) を計算
    fn steering_kinematics(geometry: &LeaderGeometry, speed: f64, steer: f64) -> (f64, f64) {
        let wheelbase = geometry.wheelbase();
        let tan_steer = steer.tan();
        let beta = (geometry.rear_wheelbase * tan_steer / wheelbase).atan();
        let omega = (speed / wheelbase) * tan_steer * beta.cos();
        (beta, omega)
    }

    /// 1ステップ進めた新しい状態を返す
    ///
    /// 操舵角の範囲制限は呼び出し側（ステアリングポリシー）の責務。
    /// 戻り値のヒッチ状態は新しい姿勢に対応しており、同じステップ内で
    /// 先頭トレーラーの入力としてそのまま使える。
    pub fn update(&self, dt: f64, steer: f64) -> Leader {
        let (beta, omega) = Self::steering_kinematics(&self.geometry, self.speed, steer);

        let heading_for_position = match self.integration {
            Integration::Euler => self.pose.theta,
            Integration::Midpoint => self.pose.theta + 0.5 * dt * omega,
        };
        let travel = self.speed * dt;

        let mut next = *self;
        next.steer = steer;
        next.slip_angle = beta;
        next.omega = omega;
        next.pose = Pose2D::new(
            self.pose.x + travel * (heading_for_position + beta).cos(),
            self.pose.y + travel * (heading_for_position + beta).sin(),
            self.pose.theta + dt * omega,
        );
        next.hitch = next.compute_hitch();
        next
    }

    /// 現在の姿勢・β・ω からヒッチ位置と速度を計算
    ///
    /// 速度は hitch = p - h·(cos θ, sin θ) の時間微分:
    /// v·(cos(θ+β), sin(θ+β)) + ω·h·(sin θ, -cos θ)
    fn compute_hitch(&self) -> HitchState {
        let h = self.geometry.hitch_offset;
        let heading = self.pose.heading();
        let position = self.pose.position() - heading * h;
        let course = Vec2::from_angle(self.pose.theta + self.slip_angle);
        let velocity = course * self.speed + Vec2::new(heading.y, -heading.x) * (self.omega * h);
        HitchState::new(position, velocity)
    }

    /// 後輪軸中心のワールド座標
    pub fn rear_axle_position(&self) -> Vec2 {
        self.pose.position() - self.pose.heading() * self.geometry.rear_wheelbase
    }

    /// 速度を外部から設定（ステップ間でのみ呼ぶこと）
    pub fn set_speed(&mut self, speed: f64) -> Result<(), ConfigError> {
        self.speed = require_finite("leader.speed", speed)?;
        let (beta, omega) = Self::steering_kinematics(&self.geometry, self.speed, self.steer);
        self.slip_angle = beta;
        self.omega = omega;
        self.hitch = self.compute_hitch();
        Ok(())
    }
}

impl ChainUnit for Leader {
    fn kind(&self) -> UnitKind {
        UnitKind::Leader
    }

    fn body_pose(&self) -> Pose2D {
        self.pose
    }

    fn hitch(&self) -> HitchState {
        self.hitch
    }

    fn angular_rate(&self) -> f64 {
        self.omega
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn geometry() -> LeaderGeometry {
        LeaderGeometry {
            front_wheelbase: 2.0,
            rear_wheelbase: 1.3,
            hitch_offset: 2.9,
        }
    }

    fn leader(speed: f64) -> Leader {
        Leader::new(Pose2D::new(1.5, 10.5, FRAC_PI_2), speed, 0.0, geometry(), Integration::Euler)
            .expect("valid leader")
    }

    #[test]
    fn test_rejects_non_positive_wheelbase() {
        let g = LeaderGeometry {
            front_wheelbase: 1.0,
            rear_wheelbase: -1.0,
            hitch_offset: 1.0,
        };
        let err = Leader::new(Pose2D::default(), 1.0, 0.0, g, Integration::Euler).unwrap_err();
        assert_eq!(err, ConfigError::NonPositiveWheelbase { lf: 1.0, lr: -1.0 });
    }

    #[test]
    fn test_rejects_non_finite_speed() {
        assert!(Leader::new(Pose2D::default(), f64::NAN, 0.0, geometry(), Integration::Euler).is_err());
    }

    #[test]
    fn test_straight_line_step() {
        let next = leader(1.0).update(0.1, 0.0);
        assert!((next.pose.theta - FRAC_PI_2).abs() < 1e-12);
        assert!((next.pose.y - 10.6).abs() < 1e-12);
        assert!((next.pose.x - 1.5).abs() < 1e-12);
        assert_eq!(next.omega, 0.0);
    }

    #[test]
    fn test_update_does_not_mutate_source() {
        let before = leader(1.0);
        let _ = before.update(0.1, 0.3);
        assert_eq!(before, leader(1.0));
    }

    #[test]
    fn test_zero_speed_is_stationary() {
        let start = leader(0.0);
        let next = start.update(0.1, 0.7);
        assert_eq!(next.pose, start.pose);
        assert_eq!(next.omega, 0.0);
        assert_eq!(next.hitch.velocity.norm(), 0.0);
    }

    #[test]
    fn test_slip_and_rate_formulas() {
        let steer = 0.2_f64;
        let next = leader(1.0).update(0.1, steer);
        let beta = (1.3 * steer.tan() / 3.3).atan();
        let omega = (1.0 / 3.3) * steer.tan() * beta.cos();
        assert!((next.slip_angle - beta).abs() < 1e-12);
        assert!((next.omega - omega).abs() < 1e-12);
        assert!((next.pose.theta - (FRAC_PI_2 + 0.1 * omega)).abs() < 1e-12);
    }

    #[test]
    fn test_hitch_uses_new_pose() {
        let next = leader(1.0).update(0.1, 0.25);
        let expected = next.pose.position() - Vec2::from_angle(next.pose.theta) * 2.9;
        assert!((next.hitch.position - expected).norm() < 1e-12);
    }

    #[test]
    fn test_hitch_velocity_matches_rotated_form() {
        let next = leader(1.0).update(0.1, 0.3);
        let (theta, beta, omega, h, v) = (next.pose.theta, next.slip_angle, next.omega, 2.9, 1.0);
        let vx = -omega * h * (theta + PI).sin() + v * (theta + beta).cos();
        let vy = omega * h * (theta + PI).cos() + v * (theta + beta).sin();
        assert!((next.hitch.velocity.x - vx).abs() < 1e-12);
        assert!((next.hitch.velocity.y - vy).abs() < 1e-12);
    }

    #[test]
    fn test_hitch_velocity_is_position_derivative() {
        // 有限差分でヒッチ速度の解析式を確認
        let start = leader(1.0).update(0.1, 0.3);
        let dt = 1e-6;
        let next = start.update(dt, 0.3);
        let fd = (next.hitch.position - start.hitch.position) * (1.0 / dt);
        assert!((fd - next.hitch.velocity).norm() < 1e-4);
    }

    #[test]
    fn test_midpoint_differs_when_turning() {
        let euler = leader(1.0);
        let mut mid = euler;
        mid.integration = Integration::Midpoint;
        let e = euler.update(0.5, 0.4);
        let m = mid.update(0.5, 0.4);
        assert!((e.pose.theta - m.pose.theta).abs() < 1e-12);
        assert!((e.pose.position() - m.pose.position()).norm() > 1e-6);
    }

    #[test]
    fn test_rear_axle_position() {
        let l = leader(1.0);
        let rear = l.rear_axle_position();
        assert!((rear.x - 1.5).abs() < 1e-12);
        assert!((rear.y - 9.2).abs() < 1e-12);
    }

    #[test]
    fn test_set_speed_refreshes_hitch() {
        let mut l = leader(0.0);
        l.set_speed(2.0).expect("finite speed");
        assert!((l.hitch.velocity.y - 2.0).abs() < 1e-12);
    }
}
