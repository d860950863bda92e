//! # trailersim
//!
//! 自転車モデルの牽引車と受動トレーラー列からなる連結車両の運動学シミュレータ。
//!
//! - [`models`]: 牽引車・トレーラー・ステアリングのモデル
//! - [`chain`]: 連結車両の積分器（親から子へ順に更新）
//! - [`scheduler`]: 固定時間刻みスケジューラ
//! - [`scenario`]: YAML シナリオ
//! - [`simulation`]: シナリオ実行エンジン
//! - [`output`]: 姿勢の出力先（描画シンク）

pub mod chain;
pub mod logging;
pub mod models;
pub mod output;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
