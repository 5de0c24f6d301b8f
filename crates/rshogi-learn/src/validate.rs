//! 教師局面ファイルの検査
//!
//! 全レコードの局面が復元できることを確かめる。壊れたレコードがあれば
//! そのうち最も番号の小さいものを報告する。
//!
//! ファイルの途中でバイトが欠けると、それ以降のレコード境界が全部ずれる。
//! 末尾の半端なバイトより先に、揃っている先頭部分を復元してみることで
//! 欠けた位置に最も近いレコード番号を報告する。

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{error, info};

use crate::corpus::CorpusReader;
use crate::engine::{LearnEngine, PositionCodec};
use crate::error::{DecodeError, LearnError, LearnResult};
use crate::progress::progress_bar;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// 検査結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateReport {
    /// 検査したレコード数
    pub records: u64,
}

/// 教師局面ファイルを検査する
///
/// 復元できない局面があれば `CorruptRecord` を返す。全レコードが復元でき、
/// ファイル長がレコード長の倍数でなければ `TruncatedCorpus` を返す。
pub fn validate_teacher_data<E: LearnEngine>(
    engine: &E,
    teacher: &Path,
    threads: usize,
) -> LearnResult<ValidateReport> {
    if threads == 0 {
        return Err(LearnError::Config("thread count must be >= 1".into()));
    }
    let codec = engine.codec();
    let (corpus, trailing_bytes) = match CorpusReader::open_aligned(teacher, codec.packed_size()) {
        Ok(opened) => opened,
        Err(e) => {
            error!("{e}");
            return Err(e);
        }
    };
    info!("教師局面ファイル検査開始: {} ({} records)", teacher.display(), corpus.len());

    let progress = progress_bar(corpus.len(), PROGRESS_INTERVAL);
    let first_bad: Mutex<Option<(u64, DecodeError)>> = Mutex::new(None);
    let stop = AtomicBool::new(false);

    let results: Vec<std::thread::Result<LearnResult<()>>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| -> LearnResult<()> {
                    while !stop.load(Ordering::Relaxed) {
                        let Some((index, record)) = corpus.read_sequential()? else {
                            break;
                        };
                        if let Err(reason) = codec.decode(&record.packed) {
                            stop.store(true, Ordering::Relaxed);
                            let mut bad = first_bad.lock().unwrap_or_else(|e| e.into_inner());
                            if bad.as_ref().is_none_or(|(i, _)| index < *i) {
                                *bad = Some((index, reason));
                            }
                        }
                        progress.inc(1);
                    }
                    Ok(())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    progress.finish();

    for r in results {
        r.map_err(|_| LearnError::WorkerPanicked)??;
    }
    if let Some((index, reason)) = first_bad.into_inner().unwrap_or_else(|e| e.into_inner()) {
        let err = LearnError::CorruptRecord { index, reason };
        error!("{err}");
        return Err(err);
    }
    if trailing_bytes != 0 {
        let err = LearnError::TruncatedCorpus {
            index: corpus.len(),
            trailing_bytes,
        };
        error!("{err}");
        return Err(err);
    }

    info!("検査完了: {} records OK", corpus.len());
    Ok(ValidateReport {
        records: corpus.len(),
    })
}
