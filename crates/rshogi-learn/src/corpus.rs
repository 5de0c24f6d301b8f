//! 教師局面ファイルの読み書き
//!
//! 読み込み側・書き込み側ともに1つの Mutex で保護し、複数ワーカーから
//! 共有する。ロックを持つのはシークと読み書きの間だけ。

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;

use crate::error::{LearnError, LearnResult};
use crate::record::TeacherRecord;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

struct ReaderState {
    reader: BufReader<File>,
    /// 逐次読み出しの次のレコード番号
    next: u64,
    /// ファイル位置（レコード番号単位）
    position: u64,
}

/// 固定長レコードのファイルを Mutex 越しに読む
struct FixedFile {
    path: PathBuf,
    record_size: usize,
    len: u64,
    state: Mutex<ReaderState>,
}

impl FixedFile {
    fn open(path: &Path, record_size: usize) -> LearnResult<Self> {
        let (file, trailing) = Self::open_aligned(path, record_size)?;
        if trailing != 0 {
            return Err(LearnError::TruncatedCorpus {
                index: file.len,
                trailing_bytes: trailing,
            });
        }
        Ok(file)
    }

    /// 末尾の半端なバイトを無視して開く。半端なバイト数も返す。
    fn open_aligned(path: &Path, record_size: usize) -> LearnResult<(Self, u64)> {
        let file = File::open(path).map_err(|e| LearnError::open(path, e))?;
        let bytes = file.metadata()?.len();
        let len = bytes / record_size as u64;
        let trailing = bytes % record_size as u64;
        let fixed = Self {
            path: path.to_path_buf(),
            record_size,
            len,
            state: Mutex::new(ReaderState {
                reader: BufReader::with_capacity(READER_BUF_CAP, file),
                next: 0,
                position: 0,
            }),
        };
        Ok((fixed, trailing))
    }

    fn remaining(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.len - state.next
    }

    fn read_sequential(&self) -> LearnResult<Option<(u64, Vec<u8>)>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.next >= self.len {
            return Ok(None);
        }
        let index = state.next;
        let bytes = self.read_at(&mut state, index)?;
        state.next += 1;
        Ok(Some((index, bytes)))
    }

    fn read_random<R: Rng + ?Sized>(&self, rng: &mut R) -> LearnResult<Option<(u64, Vec<u8>)>> {
        if self.len == 0 {
            return Ok(None);
        }
        let index = rng.random_range(0..self.len);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let bytes = self.read_at(&mut state, index)?;
        Ok(Some((index, bytes)))
    }

    fn read_at(&self, state: &mut ReaderState, index: u64) -> LearnResult<Vec<u8>> {
        if state.position != index {
            state.reader.seek(SeekFrom::Start(index * self.record_size as u64))?;
        }
        let mut buf = vec![0u8; self.record_size];
        state.reader.read_exact(&mut buf)?;
        state.position = index + 1;
        Ok(buf)
    }
}

/// スレッド間で共有する教師局面リーダー
pub struct CorpusReader {
    file: FixedFile,
    packed_size: usize,
}

impl CorpusReader {
    /// ファイルを開く。長さがレコード長の倍数でなければエラー。
    pub fn open(path: &Path, packed_size: usize) -> LearnResult<Self> {
        Ok(Self {
            file: FixedFile::open(path, TeacherRecord::size_for(packed_size))?,
            packed_size,
        })
    }

    /// 長さがレコード長の倍数でなくても開く。読めるのは揃っている先頭部分だけで、
    /// 末尾の半端なバイト数を一緒に返す。
    pub fn open_aligned(path: &Path, packed_size: usize) -> LearnResult<(Self, u64)> {
        let (file, trailing) = FixedFile::open_aligned(path, TeacherRecord::size_for(packed_size))?;
        Ok((Self { file, packed_size }, trailing))
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// 総レコード数
    pub fn len(&self) -> u64 {
        self.file.len
    }

    pub fn is_empty(&self) -> bool {
        self.file.len == 0
    }

    pub fn record_size(&self) -> usize {
        self.file.record_size
    }

    /// 逐次読み出しでまだ読んでいないレコード数
    pub fn remaining(&self) -> u64 {
        self.file.remaining()
    }

    /// 次のレコードを読む（終端なら None）
    pub fn read_sequential(&self) -> LearnResult<Option<(u64, TeacherRecord)>> {
        self.file.read_sequential()?.map(|(i, b)| self.parse(i, &b)).transpose()
    }

    /// ランダムな位置のレコードを読む
    ///
    /// 番号はロックの外で引く。空のファイルでは None。
    pub fn read_random<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> LearnResult<Option<(u64, TeacherRecord)>> {
        self.file.read_random(rng)?.map(|(i, b)| self.parse(i, &b)).transpose()
    }

    fn parse(&self, index: u64, bytes: &[u8]) -> LearnResult<(u64, TeacherRecord)> {
        TeacherRecord::from_bytes(bytes, self.packed_size)
            .map(|r| (index, r))
            .ok_or(LearnError::TruncatedCorpus {
                index,
                trailing_bytes: bytes.len() as u64,
            })
    }
}

/// 開始局面（圧縮局面のみを連結したファイル）のリーダー
pub struct SeedReader {
    file: FixedFile,
}

impl SeedReader {
    pub fn open(path: &Path, packed_size: usize) -> LearnResult<Self> {
        Ok(Self {
            file: FixedFile::open(path, packed_size)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn len(&self) -> u64 {
        self.file.len
    }

    pub fn is_empty(&self) -> bool {
        self.file.len == 0
    }

    /// ランダムに1局面分のバイト列を読む
    pub fn read_random<R: Rng + ?Sized>(&self, rng: &mut R) -> LearnResult<Option<(u64, Vec<u8>)>> {
        self.file.read_random(rng)
    }
}

/// スレッド間で共有する教師局面ライター（追記専用）
pub struct CorpusWriter {
    path: PathBuf,
    inner: Mutex<BufWriter<File>>,
}

impl CorpusWriter {
    /// 出力ファイルを作成する。`append` なら既存の内容の後ろに書く。
    pub fn create(path: &Path, append: bool) -> LearnResult<Self> {
        let mut options = OpenOptions::new();
        if append {
            options.append(true).create(true);
        } else {
            options.write(true).create(true).truncate(true);
        }
        let file = options.open(path).map_err(|e| LearnError::open(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1レコード書き込む
    pub fn write(&self, record: &TeacherRecord) -> LearnResult<()> {
        let bytes = record.to_bytes();
        let mut w = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        w.write_all(&bytes)?;
        Ok(())
    }

    /// バッファを書き出してファイルを閉じる
    pub fn finish(self) -> LearnResult<()> {
        let w = self.inner.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut file = w.into_inner().map_err(|e| e.into_error())?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}
