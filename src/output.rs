//! 描画シンク
//!
//! 各ステップ後のチェーン姿勢を外部の描画側へ渡す。シンクは読み取り専用の
//! 姿勢を受け取るだけで、チェーンへは何も書き戻さない。

use crate::chain::UnitPose;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// 1ステップ分の姿勢スナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub step: u64,
    /// ステップ実行後のシミュレーション時刻 (s)
    pub time: f64,
    /// このステップで適用した操舵角 (rad)
    pub steer: f64,
    pub units: Vec<UnitPose>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("姿勢出力の書き込みに失敗しました: {0}")]
    Io(#[from] std::io::Error),

    #[error("姿勢のシリアライズに失敗しました: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 描画シンクのインターフェース
pub trait PoseSink {
    fn record(&mut self, frame: &PoseFrame) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// 1行1フレームの JSON Lines 出力
pub struct JsonLinesSink<W: Write> {
    writer: W,
    frames_written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// ファイルを作成して書き込む（親ディレクトリも作成）
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> PoseSink for JsonLinesSink<W> {
    fn record(&mut self, frame: &PoseFrame) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        self.frames_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// メモリ上にフレームを保持するシンク（テスト・組み込み用）
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<PoseFrame>,
}

impl PoseSink for MemorySink {
    fn record(&mut self, frame: &PoseFrame) -> Result<(), SinkError> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// 何も出力しないシンク
#[derive(Debug, Default)]
pub struct NullSink;

impl PoseSink for NullSink {
    fn record(&mut self, _frame: &PoseFrame) -> Result<(), SinkError> {
        Ok(())
    }
}
