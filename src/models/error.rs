use thiserror::Error;

/// ユニット・ステアリング・スケジューラの構築時エラー
///
/// 構築時に一度だけ検証し、不正な構成のユニットは生成しない。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("ホイールベース lf + lr は正である必要があります (lf={lf}, lr={lr})")]
    NonPositiveWheelbase { lf: f64, lr: f64 },

    #[error("ヒッチから車軸までの距離は正である必要があります (dist_to_axle={0})")]
    NonPositiveAxleDistance(f64),

    #[error("{name} は0以上である必要があります (値={value})")]
    NegativeOffset { name: &'static str, value: f64 },

    #[error("{name} が有限値ではありません")]
    NonFinite { name: &'static str },

    #[error("{name} は正である必要があります (値={value})")]
    NonPositive { name: &'static str, value: f64 },

    #[error("境界ボックス #{index} の min/max が不正です")]
    InvalidBox { index: usize },
}

/// 有限値チェック
pub(crate) fn require_finite(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::NonFinite { name })
    }
}

/// 正の有限値チェック
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = require_finite(name, value)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

/// 非負の有限値チェック
pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    let value = require_finite(name, value)?;
    if value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::NegativeOffset { name, value })
    }
}
