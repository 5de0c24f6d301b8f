//! 学習で扱う基本型（手番・升・BonaPiece）
//!
//! 盤の表現そのものは外部の探索エンジンが持つ。ここでは特徴量の計算に
//! 必要な最小限の値型だけを定義する。

/// 手番（先手/後手）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    White = 1,
}

impl Color {
    /// 手番の数
    pub const NUM: usize = 2;

    /// 両手番（先手→後手の順）
    pub const ALL: [Color; 2] = [Color::Black, Color::White];

    /// 相手番を返す
    #[inline]
    pub const fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// インデックスとして使用（配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 先手なら +1、後手なら -1
    #[inline]
    pub const fn sign(self) -> i32 {
        match self {
            Color::Black => 1,
            Color::White => -1,
        }
    }
}

impl std::ops::Not for Color {
    type Output = Color;

    #[inline]
    fn not(self) -> Color {
        self.opponent()
    }
}

/// 升（盤上の位置）
///
/// 盤の大きさは `FeatureLayout` が持つ。将棋盤では 0..81。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Square(pub u8);

impl Square {
    /// 将棋盤の升の数
    pub const NUM: usize = 81;

    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 盤を180度回転した升（`squares` は盤の升の総数）
    #[inline]
    pub const fn inverse(self, squares: usize) -> Square {
        Square((squares - 1 - self.0 as usize) as u8)
    }
}

/// BonaPiece - 駒の種類と位置（手駒は枚数）を一意に表現するインデックス
///
/// 値の割り当ては外部の局面実装が決める。0 は無効値として予約されており、
/// 有効な値は `1..fe_end` の範囲に収まらなければならない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct BonaPiece(pub u16);

impl BonaPiece {
    /// ゼロ（無効値）
    pub const ZERO: BonaPiece = BonaPiece(0);

    /// 将棋の BonaPiece 総数（YaneuraOu/Apery 準拠の fe_end）
    pub const FE_END: usize = 1548;

    #[inline]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 先手視点(fb)と後手視点(fw)の BonaPiece をペアで保持する
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtBonaPiece {
    /// 先手視点の BonaPiece
    pub fb: BonaPiece,
    /// 後手視点の BonaPiece
    pub fw: BonaPiece,
}

impl ExtBonaPiece {
    #[inline]
    pub const fn new(fb: BonaPiece, fw: BonaPiece) -> Self {
        Self { fb, fw }
    }

    /// 指定した視点の BonaPiece
    #[inline]
    pub const fn for_perspective(self, perspective: Color) -> BonaPiece {
        match perspective {
            Color::Black => self.fb,
            Color::White => self.fw,
        }
    }

    /// 先後を入れ替えたもの（色反転した局面での同じ駒）
    #[inline]
    pub const fn flipped(self) -> Self {
        Self {
            fb: self.fw,
            fw: self.fb,
        }
    }
}
