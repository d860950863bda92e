use crate::models::common::{HitchState, Pose2D};
use serde::{Deserialize, Serialize};

/// チェーン内ユニットの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Leader,
    Trailer,
}

/// チェーンを構成する全ユニットが実装する読み取り用インターフェース
///
/// 描画側はこのトレイト経由で姿勢を読むだけで、ユニットへの書き戻しは行わない。
pub trait ChainUnit {
    /// ユニット種別
    fn kind(&self) -> UnitKind;

    /// 描画用の車体姿勢（リーダーは基準点、トレーラーは車体中心）
    fn body_pose(&self) -> Pose2D;

    /// 次のユニットが連結されるヒッチの位置・速度
    fn hitch(&self) -> HitchState;

    /// 直近ステップの角速度 (rad/s)
    fn angular_rate(&self) -> f64;
}
