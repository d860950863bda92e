use crate::chain::SpawnHeading;
use crate::models::{
    ConfigError, Integration, LeaderGeometry, SteeringConfig, TrailerGeometry, math_utils,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// 1ステップのシミュレーション時間刻み
    pub dt_s: f64,
    /// 1ステップに相当する実時間（固定ステップ）
    #[serde(default = "default_fixed_step")]
    pub fixed_step_s: f64,
    /// 仮想描画フレームの間隔
    #[serde(default = "default_fixed_step")]
    pub frame_dt_s: f64,
    /// シミュレーション終了時刻
    pub t_max_s: f64,
    #[serde(default)]
    pub max_steps_per_frame: Option<u32>,
    #[serde(default)]
    pub integration: Integration,
}

fn default_fixed_step() -> f64 {
    1.0 / 60.0
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Position2D {
    pub x_m: f64,
    pub y_m: f64,
}

/// 牽引車設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeaderConfig {
    pub position: Position2D,
    pub heading_deg: f64,
    pub speed_mps: f64,
    #[serde(default)]
    pub initial_steer_deg: f64,
    pub front_wheelbase_m: f64,
    pub rear_wheelbase_m: f64,
    pub hitch_offset_m: f64,
}

impl LeaderConfig {
    pub fn geometry(&self) -> LeaderGeometry {
        LeaderGeometry {
            front_wheelbase: self.front_wheelbase_m,
            rear_wheelbase: self.rear_wheelbase_m,
            hitch_offset: self.hitch_offset_m,
        }
    }
}

/// トレーラー設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TrailerConfig {
    pub dist_to_axle_m: f64,
    pub dist_to_center_m: f64,
    pub dist_to_hitch_m: f64,
    /// 初期方位。省略時は追加ポリシーに従う
    #[serde(default)]
    pub heading_deg: Option<f64>,
}

impl TrailerConfig {
    pub fn geometry(&self) -> TrailerGeometry {
        TrailerGeometry {
            dist_to_axle: self.dist_to_axle_m,
            dist_to_center: self.dist_to_center_m,
            dist_to_hitch: self.dist_to_hitch_m,
        }
    }
}

impl Default for TrailerConfig {
    fn default() -> Self {
        let g = TrailerGeometry::default();
        Self {
            dist_to_axle_m: g.dist_to_axle,
            dist_to_center_m: g.dist_to_center,
            dist_to_hitch_m: g.dist_to_hitch,
            heading_deg: None,
        }
    }
}

/// 実行中に追加されるトレーラーの設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpawnConfig {
    #[serde(default)]
    pub heading: SpawnHeading,
    #[serde(default)]
    pub trailer: TrailerConfig,
}

/// ステアリング設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SteeringSection {
    #[serde(default = "default_max_angle_deg")]
    pub max_angle_deg: f64,
    pub policy: SteeringConfig,
}

fn default_max_angle_deg() -> f64 {
    45.0
}

impl SteeringSection {
    pub fn max_angle(&self) -> f64 {
        math_utils::deg_to_rad(self.max_angle_deg)
    }
}

/// 時刻指定のイベント（ステップ間で適用）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    pub time_s: f64,
    #[serde(flatten)]
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioAction {
    /// 末尾にトレーラーを追加（spawn.trailer の形状を使用）
    Append {
        #[serde(default)]
        heading_deg: Option<f64>,
    },
    /// 末尾のトレーラーを削除
    Remove,
    SteerLeft,
    SteerRight,
    /// 正規化ポインタ位置 [-1, 1] で舵角を指定
    SteerUi { pointer: f64 },
    SetSpeed { speed_mps: f64 },
}

/// 姿勢出力設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub path: PathBuf,
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub leader: LeaderConfig,
    #[serde(default)]
    pub trailers: Vec<TrailerConfig>,
    #[serde(default)]
    pub spawn: SpawnConfig,
    pub steering: SteeringSection,
    #[serde(default)]
    pub events: Vec<EventConfig>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::Io(path.to_path_buf(), e))?;

        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::Parse(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列から読み込み（検証込み）
    pub fn from_yaml_str(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig =
            serde_yaml::from_str(contents).map_err(|e| ScenarioError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 設定の検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let sim = &self.sim;
        for (name, value) in [
            ("dt_s", sim.dt_s),
            ("fixed_step_s", sim.fixed_step_s),
            ("frame_dt_s", sim.frame_dt_s),
            ("t_max_s", sim.t_max_s),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ScenarioError::Validation(format!("{} must be positive (got {})", name, value)));
            }
        }

        // ユニット構成の検証はモデル側の検証に委ねる
        self.leader.geometry().validate()?;
        for trailer in &self.trailers {
            trailer.geometry().validate()?;
        }
        self.spawn.trailer.geometry().validate()?;
        if !self.steering.max_angle_deg.is_finite() || self.steering.max_angle_deg <= 0.0 {
            return Err(ScenarioError::Validation("max_angle_deg must be positive".to_string()));
        }
        self.steering.policy.build(self.steering.max_angle())?;

        for event in &self.events {
            if !event.time_s.is_finite() || event.time_s < 0.0 || event.time_s >= sim.t_max_s {
                return Err(ScenarioError::Validation(format!(
                    "event time {} outside [0, {})",
                    event.time_s, sim.t_max_s
                )));
            }
        }

        Ok(())
    }

    /// 組み込みデモシナリオ（牽引車＋トレーラー2台、8の字ヒステリシス操舵）
    pub fn builtin_demo() -> Self {
        let trailer = TrailerConfig {
            heading_deg: Some(90.0),
            ..TrailerConfig::default()
        };
        Self {
            meta: ScenarioMeta {
                version: "1.0".to_string(),
                name: "builtin_demo".to_string(),
                description: "牽引車とトレーラー2台による8の字走行".to_string(),
            },
            sim: SimulationConfig {
                dt_s: 0.1,
                fixed_step_s: default_fixed_step(),
                frame_dt_s: default_fixed_step(),
                t_max_s: 120.0,
                max_steps_per_frame: None,
                integration: Integration::Euler,
            },
            leader: LeaderConfig {
                position: Position2D { x_m: 1.5, y_m: 10.5 },
                heading_deg: 90.0,
                speed_mps: 1.0,
                initial_steer_deg: 0.0,
                front_wheelbase_m: 2.0,
                rear_wheelbase_m: 1.3,
                hitch_offset_m: 2.9,
            },
            trailers: vec![trailer, trailer],
            spawn: SpawnConfig::default(),
            steering: SteeringSection {
                max_angle_deg: default_max_angle_deg(),
                policy: SteeringConfig::FigureEight {
                    angle_deg: 180.0 / 11.5,
                    center_y_m: 10.5,
                    initial_prev_y_m: Some(4.9),
                },
            },
            events: Vec::new(),
            output: None,
        }
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("固定ステップ: {:.4}秒 (フレーム間隔 {:.4}秒)", self.sim.fixed_step_s, self.sim.frame_dt_s);
        println!("最大時間: {:.1}秒", self.sim.t_max_s);
        println!("積分方式: {:?}", self.sim.integration);
        println!();

        println!("=== 車両構成 ===");
        println!(
            "牽引車: 位置 ({:.2}, {:.2}) 方位 {:.1}° 速度 {:.2}m/s",
            self.leader.position.x_m, self.leader.position.y_m, self.leader.heading_deg, self.leader.speed_mps
        );
        println!("トレーラー: {}台", self.trailers.len());
        for (i, t) in self.trailers.iter().enumerate() {
            println!(
                "  #{}: 車軸 {:.2}m / 中心 {:.2}m / ヒッチ {:.2}m",
                i + 1,
                t.dist_to_axle_m,
                t.dist_to_center_m,
                t.dist_to_hitch_m
            );
        }
        println!();

        println!("=== ステアリング ===");
        println!("最大舵角: {:.1}°", self.steering.max_angle_deg);
        println!("ポリシー: {:?}", self.steering.policy);
        if !self.events.is_empty() {
            println!("イベント数: {}", self.events.len());
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("設定検証エラー: {0}")]
    Validation(String),

    #[error("設定検証エラー: {0}")]
    Config(#[from] ConfigError),
}
