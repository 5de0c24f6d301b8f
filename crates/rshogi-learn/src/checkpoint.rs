//! 評価関数ファイル（KK.bin / KKP.bin / KPP.bin）の読み書き
//!
//! 各ファイルは `[i32; 2]` をリトルエンディアンで並べただけのもの。
//! 書き込みは一時ファイルに書いてから rename する。

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;

use crate::error::{LearnError, LearnResult};
use crate::features::{FeatureKind, FeatureLayout};
use crate::params::{EvalTables, Weight};

/// 1スロットのバイト数
const SLOT_BYTES: u64 = 8;

/// 書き出すファイルの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFlavor {
    /// 移動平均を取った配布用
    Averaged,
    /// 移動平均前（`*_synthesized.bin`）
    Synthesized,
}

impl CheckpointFlavor {
    fn suffix(self) -> &'static str {
        match self {
            CheckpointFlavor::Averaged => "",
            CheckpointFlavor::Synthesized => "_synthesized",
        }
    }
}

/// チェックポイントのファイルパス
pub fn checkpoint_path(dir: &Path, kind: FeatureKind, flavor: CheckpointFlavor) -> PathBuf {
    dir.join(format!("{}{}.bin", kind.name(), flavor.suffix()))
}

/// テーブルを書き出す
pub fn save(dir: &Path, tables: &EvalTables, flavor: CheckpointFlavor) -> LearnResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| LearnError::open(dir, e))?;
    for kind in FeatureKind::ALL {
        write_table(&checkpoint_path(dir, kind, flavor), tables.table(kind))?;
    }
    Ok(())
}

fn write_table(path: &Path, table: &[Weight<i32>]) -> LearnResult<()> {
    let tmp = path.with_extension("bin.tmp");
    let file = File::create(&tmp).map_err(|e| LearnError::open(&tmp, e))?;
    let mut w = BufWriter::new(file);
    for slot in table {
        w.write_i32::<LittleEndian>(slot[0])?;
        w.write_i32::<LittleEndian>(slot[1])?;
    }
    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// 評価関数を読み込む
///
/// `KK.bin` が無ければ新規学習とみなして全要素 0 のテーブルを返す。
/// あればすべてのファイルが揃っていて、大きさが `layout` と一致しなければならない。
pub fn load_or_zeros(dir: &Path, layout: &FeatureLayout) -> LearnResult<EvalTables> {
    if !checkpoint_path(dir, FeatureKind::Kk, CheckpointFlavor::Averaged).exists() {
        info!("評価関数ファイルが無いため 0 から学習します: {}", dir.display());
        return Ok(EvalTables::zeros(layout));
    }
    let mut tables = EvalTables::zeros(layout);
    for kind in FeatureKind::ALL {
        let path = checkpoint_path(dir, kind, CheckpointFlavor::Averaged);
        read_table(&path, tables.table_mut(kind))?;
    }
    info!("評価関数を読み込みました: {}", dir.display());
    Ok(tables)
}

fn read_table(path: &Path, table: &mut [Weight<i32>]) -> LearnResult<()> {
    let file = File::open(path).map_err(|e| LearnError::open(path, e))?;
    let actual = file.metadata()?.len();
    let expected = table.len() as u64 * SLOT_BYTES;
    if actual != expected {
        return Err(LearnError::CheckpointMismatch {
            file: path.to_path_buf(),
            expected,
            actual,
        });
    }
    let mut r = BufReader::new(file);
    for slot in table.iter_mut() {
        slot[0] = r.read_i32::<LittleEndian>()?;
        slot[1] = r.read_i32::<LittleEndian>()?;
    }
    Ok(())
}

/// ディレクトリへの書き込みが可能かを事前に確かめる
pub fn ensure_writable(dir: &Path) -> LearnResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| LearnError::open(dir, e))?;
    let probe = dir.join(".rshogi-learn-probe");
    let mut f = File::create(&probe).map_err(|e| LearnError::open(&probe, e))?;
    f.write_all(b"ok")?;
    drop(f);
    std::fs::remove_file(&probe)?;
    Ok(())
}
