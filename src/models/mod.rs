// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 構築時エラー
pub mod error;

// チェーンユニットの共通インターフェース（trait）定義
pub mod traits;

// 各ユニットとステアリングポリシーの実装
pub mod leader;
pub mod trailer;
pub mod steering;

// 便利な re-export
pub use common::*;
pub use error::ConfigError;
pub use traits::*;
pub use leader::{Integration, Leader, LeaderGeometry};
pub use trailer::{Trailer, TrailerGeometry};
pub use steering::{
    BoxConfig, FigureEightSteer, ManualCommand, ManualSteer, SteeringConfig, SteeringContext,
    SteeringController, SteeringSource, TrackedPoint, DEFAULT_MAX_STEER,
};
