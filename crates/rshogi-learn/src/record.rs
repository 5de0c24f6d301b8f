//! 教師局面レコード
//!
//! # データ形式
//!
//! | フィールド | サイズ      | 説明                                   |
//! |------------|-------------|----------------------------------------|
//! | packed     | N           | 圧縮局面（エンジン固有、固定長）       |
//! | move16     | 2           | 最善手 16bit コード (u16, LE)          |
//! | eval       | 2           | 手番側から見た評価値 (i16, LE)         |
//!
//! ファイルはレコードを単純に連結したもので、`index * record_size` で
//! ランダムアクセスできる。

/// 圧縮局面の後ろに続くフィールドのバイト数
pub const RECORD_TRAILER: usize = 4;

/// 教師局面1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherRecord {
    /// 圧縮局面
    pub packed: Vec<u8>,
    /// 最善手（16bit コード）
    pub move16: u16,
    /// 手番側から見た評価値
    pub eval: i16,
}

impl TeacherRecord {
    pub fn new(packed: Vec<u8>, move16: u16, eval: i16) -> Self {
        Self {
            packed,
            move16,
            eval,
        }
    }

    /// 圧縮局面が `packed_size` バイトのときのレコード長
    #[inline]
    pub const fn size_for(packed_size: usize) -> usize {
        packed_size + RECORD_TRAILER
    }

    /// バイト列から読み込む（長さが足りなければ None）
    pub fn from_bytes(bytes: &[u8], packed_size: usize) -> Option<Self> {
        if bytes.len() < Self::size_for(packed_size) {
            return None;
        }
        let packed = bytes[..packed_size].to_vec();
        let move16 = u16::from_le_bytes([bytes[packed_size], bytes[packed_size + 1]]);
        let eval = i16::from_le_bytes([bytes[packed_size + 2], bytes[packed_size + 3]]);
        Some(Self {
            packed,
            move16,
            eval,
        })
    }

    /// バイト列にシリアライズ
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.packed.len() + RECORD_TRAILER);
        bytes.extend_from_slice(&self.packed);
        bytes.extend_from_slice(&self.move16.to_le_bytes());
        bytes.extend_from_slice(&self.eval.to_le_bytes());
        bytes
    }
}

/// 評価値を i16 に収める
#[inline]
pub fn clamp_eval(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_little_endian() {
        let rec = TeacherRecord::new(vec![0xAA, 0xBB, 0xCC], 0x1234, -2);
        let bytes = rec.to_bytes();
        assert_eq!(bytes, vec![0xAA, 0xBB, 0xCC, 0x34, 0x12, 0xFE, 0xFF]);
        assert_eq!(TeacherRecord::from_bytes(&bytes, 3), Some(rec));
    }

    #[test]
    fn test_short_input() {
        assert_eq!(TeacherRecord::size_for(32), 36);
        assert!(TeacherRecord::from_bytes(&[0u8; 35], 32).is_none());
    }

    #[test]
    fn test_clamp_eval() {
        assert_eq!(clamp_eval(31999), 31999);
        assert_eq!(clamp_eval(40000), i16::MAX);
        assert_eq!(clamp_eval(-40000), i16::MIN);
    }
}
