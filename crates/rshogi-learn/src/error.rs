//! 学習パイプラインのエラー型

use std::path::PathBuf;
use std::process::ExitCode;

/// 局面圧縮データの復元エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// バイト数が packed_size と一致しない
    #[error("packed position has {actual} bytes, expected {expected}")]
    Length { expected: usize, actual: usize },

    /// 局面として不正（玉がない、駒数超過など）
    #[error("invalid packed position: {0}")]
    Invalid(String),
}

/// 学習パイプライン全体のエラー
#[derive(thiserror::Error, Debug)]
pub enum LearnError {
    /// 入出力ファイルを開けなかった
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 教師局面が復元できない（コーパス破損）
    #[error("corrupt teacher record #{index}: {reason}")]
    CorruptRecord { index: u64, reason: DecodeError },

    /// ファイル長がレコード長の倍数でない
    #[error("truncated teacher corpus: record #{index} has only {trailing_bytes} bytes")]
    TruncatedCorpus { index: u64, trailing_bytes: u64 },

    /// 開始局面ファイルが空
    #[error("seed corpus {0} contains no positions")]
    EmptySeedCorpus(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// チェックポイントのサイズが評価関数の形と合わない
    #[error("checkpoint {file} has {actual} bytes, expected {expected}")]
    CheckpointMismatch {
        file: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl LearnError {
    /// ファイルオープン失敗をパス付きで包む
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LearnError::Open {
            path: path.into(),
            source,
        }
    }

    /// コーパスの整合性が疑わしいエラーかどうか
    pub fn is_corpus_integrity(&self) -> bool {
        matches!(self, LearnError::CorruptRecord { .. } | LearnError::TruncatedCorpus { .. })
    }

    /// プロセス終了コード
    ///
    /// コーパス破損は 2、それ以外の致命的エラーは 1。
    pub fn exit_code(&self) -> ExitCode {
        if self.is_corpus_integrity() {
            ExitCode::from(2)
        } else {
            ExitCode::FAILURE
        }
    }
}

pub type LearnResult<T> = Result<T, LearnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_record_message_names_index() {
        let err = LearnError::CorruptRecord {
            index: 7,
            reason: DecodeError::Invalid("no king".into()),
        };
        assert!(err.to_string().contains("#7"));
        assert!(err.is_corpus_integrity());
    }

    #[test]
    fn test_open_error_keeps_path() {
        let err = LearnError::open(
            "/nonexistent/teacher.bin",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/nonexistent/teacher.bin"));
        assert!(!err.is_corpus_integrity());
    }
}
