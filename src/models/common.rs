use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// 平面上の2次元ベクトル（位置・速度の両方に使用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64, // m または m/s
    pub y: f64, // m または m/s
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 角度 `theta` の単位ベクトル (cos θ, sin θ)
    pub fn from_angle(theta: f64) -> Self {
        Self::new(theta.cos(), theta.sin())
    }

    /// ベクトルの長さ
    pub fn norm(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2)).sqrt()
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// 2次元外積のz成分（正ならotherはselfから反時計回り側）
    pub fn cross(&self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// 原点回りに `angle` ラジアン回転
    pub fn rotate(&self, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::new(c * self.x - s * self.y, s * self.x + c * self.y)
    }

    /// 単位ベクトル `heading` から `other` への符号付き角度
    ///
    /// `speed` には `other` の長さを渡す。内積/長さが浮動小数点誤差で
    /// [-1, 1] をわずかに超えても acos が NaN にならないようクランプする。
    /// 符号は外積が正のとき +1、それ以外（0を含む）は -1。
    ///
    /// `speed` が0の場合は角度を定義できないため0を返す。
    pub fn signed_angle_to(heading: Vec2, other: Vec2, speed: f64) -> f64 {
        if speed == 0.0 {
            return 0.0;
        }
        let sign = if heading.cross(other) > 0.0 { 1.0 } else { -1.0 };
        let cos_angle = (heading.dot(other) / speed).clamp(-1.0, 1.0);
        sign * cos_angle.acos()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

/// 平面姿勢（位置と方位角）
///
/// 方位角 `theta` は +x 軸から反時計回りのラジアン。積分中は正規化しない
/// （連続した値のまま保持する）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,     // m
    pub y: f64,     // m
    pub theta: f64, // rad
}

impl Pose2D {
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// 進行方向の単位ベクトル
    pub fn heading(&self) -> Vec2 {
        Vec2::from_angle(self.theta)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }
}

/// 連結点（ヒッチ）の運動状態
///
/// 親ユニットから子ユニットへ受け渡される唯一の結合データ。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitchState {
    /// ヒッチのワールド座標
    pub position: Vec2,
    /// ヒッチのワールド速度
    pub velocity: Vec2,
}

impl HitchState {
    pub const fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }
}

/// 軸平行境界ボックス
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb2 {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            min: Vec2::new(xmin, ymin),
            max: Vec2::new(xmax, ymax),
        }
    }

    /// 境界を含む内外判定
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.x <= self.max.x && self.min.y <= self.max.y
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    use std::f64::consts::PI;

    /// 度をラジアンに変換
    pub fn deg_to_rad(degrees: f64) -> f64 {
        degrees * PI / 180.0
    }

    /// ラジアンを度に変換
    pub fn rad_to_deg(radians: f64) -> f64 {
        radians * 180.0 / PI
    }

    /// 角度を (-π, π] の範囲に正規化
    pub fn normalize_angle(angle: f64) -> f64 {
        let mut normalized = angle % (2.0 * PI);
        if normalized > PI {
            normalized -= 2.0 * PI;
        } else if normalized <= -PI {
            normalized += 2.0 * PI;
        }
        normalized
    }

    /// 2つの角度の差 (b - a) を (-π, π] の範囲で返す
    pub fn angle_difference(a: f64, b: f64) -> f64 {
        normalize_angle(b - a)
    }
}
