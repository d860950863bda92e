use crate::models::{
    common::{HitchState, Pose2D, Vec2},
    error::{ConfigError, require_finite, require_non_negative},
    traits::{ChainUnit, UnitKind},
};
use serde::{Deserialize, Serialize};

/// トレーラーの幾何定数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailerGeometry {
    /// 親ヒッチから仮想車軸までの距離（旋回率を決める, m）
    pub dist_to_axle: f64,
    /// 親ヒッチから車体中心までの距離（描画用, m）
    pub dist_to_center: f64,
    /// 親ヒッチから自身のヒッチ（次のトレーラーの連結点）までの距離 (m)
    pub dist_to_hitch: f64,
}

impl TrailerGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let axle = require_finite("dist_to_axle", self.dist_to_axle)?;
        if axle <= 0.0 {
            return Err(ConfigError::NonPositiveAxleDistance(axle));
        }
        require_non_negative("dist_to_center", self.dist_to_center)?;
        require_non_negative("dist_to_hitch", self.dist_to_hitch)?;
        Ok(())
    }
}

impl Default for TrailerGeometry {
    fn default() -> Self {
        Self {
            dist_to_axle: 3.0,
            dist_to_center: 2.0,
            dist_to_hitch: 5.0,
        }
    }
}

/// 受動トレーラー（運動学的一輪車モデル）
///
/// 自身の操舵入力は持たず、親ヒッチの速度から角速度を求める。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trailer {
    pub geometry: TrailerGeometry,
    /// 方位角 (rad)
    pub theta: f64,
    /// 直近ステップの角速度 (rad/s)
    pub omega: f64,
    /// 車体中心のワールド座標
    pub center: Vec2,
    /// 自身のヒッチ状態（次のトレーラーへの入力）
    pub hitch: HitchState,
}

impl Trailer {
    /// 新しいトレーラーを作成（派生量は `attach` で確定させる）
    pub fn new(geometry: TrailerGeometry, theta: f64) -> Result<Self, ConfigError> {
        geometry.validate()?;
        require_finite("trailer.theta", theta)?;
        Ok(Self {
            geometry,
            theta,
            omega: 0.0,
            center: Vec2::ZERO,
            hitch: HitchState::default(),
        })
    }

    /// 親ヒッチに連結し、静止状態として派生量を計算した新しい状態を返す
    pub fn attach(&self, parent_hitch_position: Vec2) -> Trailer {
        let mut next = *self;
        next.omega = 0.0;
        next.place(parent_hitch_position, Vec2::ZERO);
        next
    }

    /// 親ヒッチ速度から角速度を求める
    ///
    /// ヒッチ速度が0のときは角度が定義できないため ω = 0（静止）とする。
    /// それ以外は方位ベクトルとヒッチ速度の符号付き角度を求め、
    /// その垂直成分を車軸距離で割る。
    pub fn angular_rate_for(&self, parent_hitch_velocity: Vec2) -> f64 {
        let hitch_speed = parent_hitch_velocity.norm();
        if hitch_speed == 0.0 {
            return 0.0;
        }
        let heading = Vec2::from_angle(self.theta);
        let angle = Vec2::signed_angle_to(heading, parent_hitch_velocity, hitch_speed);
        let perpendicular = hitch_speed * angle.sin();
        perpendicular / self.geometry.dist_to_axle
    }

    /// 1ステップ進めた新しい状態を返す
    ///
    /// `parent` は同じステップで更新済みの親ヒッチ状態でなければならない。
    pub fn update(&self, dt: f64, parent: HitchState) -> Trailer {
        let omega = self.angular_rate_for(parent.velocity);

        let mut next = *self;
        next.omega = omega;
        next.theta = self.theta + dt * omega;
        next.place(parent.position, parent.velocity);
        next
    }

    /// 親ヒッチを基準に車体中心・ヒッチ位置・ヒッチ速度を再計算
    ///
    /// ヒッチ速度は hitch = P - d·(cos θ, sin θ) の時間微分:
    /// dP/dt + ω·d·(sin θ, -cos θ)
    fn place(&mut self, parent_position: Vec2, parent_velocity: Vec2) {
        let heading = Vec2::from_angle(self.theta);
        let d_hitch = self.geometry.dist_to_hitch;
        self.center = parent_position - heading * self.geometry.dist_to_center;
        self.hitch = HitchState::new(
            parent_position - heading * d_hitch,
            parent_velocity + Vec2::new(heading.y, -heading.x) * (self.omega * d_hitch),
        );
    }
}

impl ChainUnit for Trailer {
    fn kind(&self) -> UnitKind {
        UnitKind::Trailer
    }

    fn body_pose(&self) -> Pose2D {
        Pose2D::new(self.center.x, self.center.y, self.theta)
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

    fn trailer(theta: f64) -> Trailer {
        Trailer::new(TrailerGeometry::default(), theta).expect("valid trailer")
    }

    #[test]
    fn test_rejects_zero_axle_distance() {
        let g = TrailerGeometry {
            dist_to_axle: 0.0,
            ..TrailerGeometry::default()
        };
        assert_eq!(Trailer::new(g, 0.0).unwrap_err(), ConfigError::NonPositiveAxleDistance(0.0));
    }

    #[test]
    fn test_rejects_negative_hitch_distance() {
        let g = TrailerGeometry {
            dist_to_hitch: -1.0,
            ..TrailerGeometry::default()
        };
        assert!(matches!(
            Trailer::new(g, 0.0),
            Err(ConfigError::NegativeOffset { name: "dist_to_hitch", .. })
        ));
    }

    #[test]
    fn test_zero_hitch_velocity_forces_zero_rate() {
        let t = trailer(0.3);
        let next = t.update(0.1, HitchState::new(Vec2::new(1.0, 2.0), Vec2::ZERO));
        assert_eq!(next.omega, 0.0);
        assert_eq!(next.theta, 0.3);
    }

    #[test]
    fn test_parallel_velocity_gives_zero_rate() {
        let t = trailer(FRAC_PI_2);
        assert!(t.angular_rate_for(Vec2::new(0.0, 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_velocity_stays_finite_at_any_heading() {
        // 丸め誤差で正規化内積が 1 をわずかに超えても NaN にならない
        for i in 0..64 {
            let theta = -PI + f64::from(i) * (2.0 * PI / 64.0) + 0.013;
            let t = trailer(theta);
            for k in [1e-9, 0.3, 1.0, 7.77, 1e6] {
                let omega = t.angular_rate_for(Vec2::from_angle(theta) * k);
                assert!(omega.is_finite(), "theta={theta} k={k}");
                assert!(omega.abs() <= k * 1e-6, "theta={theta} k={k} omega={omega}");
            }
        }
    }

    #[test]
    fn test_perpendicular_velocity_turns_toward_it() {
        // 方位 +x、ヒッチ速度 +y → 反時計回り (ω > 0)
        let t = trailer(0.0);
        let omega = t.angular_rate_for(Vec2::new(0.0, 1.5));
        assert!((omega - 1.5 / 3.0).abs() < 1e-12);
        let omega = t.angular_rate_for(Vec2::new(0.0, -1.5));
        assert!((omega + 1.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rate_equals_cross_product_form() {
        let t = trailer(0.7);
        let v = Vec2::new(-0.4, 1.9);
        let expected = Vec2::from_angle(0.7).cross(v) / 3.0;
        assert!((t.angular_rate_for(v) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_attach_places_body_behind_hitch() {
        let t = trailer(FRAC_PI_2).attach(Vec2::new(1.5, 7.6));
        assert!((t.center - Vec2::new(1.5, 5.6)).norm() < 1e-12);
        assert!((t.hitch.position - Vec2::new(1.5, 2.6)).norm() < 1e-12);
        assert_eq!(t.hitch.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_hitch_velocity_is_position_derivative() {
        let parent = HitchState::new(Vec2::new(0.0, 0.0), Vec2::new(0.3, 1.0));
        let start = trailer(0.4).update(0.1, parent);
        let dt = 1e-6;
        let moved = HitchState::new(parent.position + parent.velocity * dt, parent.velocity);
        let next = start.update(dt, moved);
        let fd = (next.hitch.position - start.hitch.position) * (1.0 / dt);
        assert!((fd - next.hitch.velocity).norm() < 1e-4);
    }
}
