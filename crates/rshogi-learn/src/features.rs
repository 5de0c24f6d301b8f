//! KK / KKP / KPP 特徴量のインデックス計算
//!
//! 特徴量は手番ごと（先手視点・後手視点）に計算する。視点 `c` では
//!
//! - 自玉 = `c` の玉の升、敵玉 = `!c` の玉の升（後手視点では盤を180度回転）
//! - 駒 = 先手視点なら `fb`、後手視点なら `fw`
//!
//! を用いる。局面を先後反転すると先手視点と後手視点の特徴量がそのまま入れ替わる。
//!
//! ## テーブル上の位置
//!
//! - KK:  `self_k * SQ + opp_k`
//! - KKP: `(self_k * SQ + opp_k) * FE_END + p`
//! - KPP: `k * TRI + a * (a - 1) / 2 + b`（`a > b`、`TRI = FE_END * (FE_END - 1) / 2`）
//!
//! KPP の駒ペアは順序なしで、大きい方を `a` にして1つのスロットに写す（三角行列）。

use crate::engine::LearnPosition;
use crate::types::{BonaPiece, Color, Square};

/// 特徴量の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Kk,
    Kkp,
    Kpp,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 3] = [FeatureKind::Kk, FeatureKind::Kkp, FeatureKind::Kpp];

    /// チェックポイントのファイル名の基部
    pub const fn name(self) -> &'static str {
        match self {
            FeatureKind::Kk => "KK",
            FeatureKind::Kkp => "KKP",
            FeatureKind::Kpp => "KPP",
        }
    }
}

/// 盤の升数と BonaPiece の総数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    pub squares: usize,
    pub fe_end: usize,
}

impl FeatureLayout {
    /// 将棋（81升、fe_end = 1548）
    pub const SHOGI: FeatureLayout = FeatureLayout {
        squares: Square::NUM,
        fe_end: BonaPiece::FE_END,
    };

    pub const fn new(squares: usize, fe_end: usize) -> Self {
        Self { squares, fe_end }
    }

    /// 駒ペアの数（三角行列の要素数）
    #[inline]
    pub const fn triangle(&self) -> usize {
        self.fe_end * (self.fe_end - 1) / 2
    }

    pub const fn kk_len(&self) -> usize {
        self.squares * self.squares
    }

    pub const fn kkp_len(&self) -> usize {
        self.squares * self.squares * self.fe_end
    }

    pub const fn kpp_len(&self) -> usize {
        self.squares * self.triangle()
    }

    pub const fn len_of(&self, kind: FeatureKind) -> usize {
        match kind {
            FeatureKind::Kk => self.kk_len(),
            FeatureKind::Kkp => self.kkp_len(),
            FeatureKind::Kpp => self.kpp_len(),
        }
    }

    /// 視点 `c` から見た升
    #[inline]
    pub const fn relative(&self, sq: Square, c: Color) -> Square {
        match c {
            Color::Black => sq,
            Color::White => sq.inverse(self.squares),
        }
    }
}

/// 1視点分の有効な特徴量
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerspectiveFeatures {
    pub kk: usize,
    pub kkp: Vec<usize>,
    pub kpp: Vec<usize>,
}

/// 局面で有効な特徴量（先手視点・後手視点）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveFeatures {
    pub perspectives: [PerspectiveFeatures; Color::NUM],
}

impl ActiveFeatures {
    #[inline]
    pub fn of(&self, c: Color) -> &PerspectiveFeatures {
        &self.perspectives[c.index()]
    }
}

/// 特徴量インデクサ
///
/// KPP の行オフセット `a * (a - 1) / 2` は生成時に一度だけ計算する。
#[derive(Debug, Clone)]
pub struct FeatureIndexer {
    layout: FeatureLayout,
    row_offsets: Vec<usize>,
}

impl FeatureIndexer {
    pub fn new(layout: FeatureLayout) -> Self {
        let row_offsets = (0..layout.fe_end).map(|a| a * a.saturating_sub(1) / 2).collect();
        Self {
            layout,
            row_offsets,
        }
    }

    #[inline]
    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    #[inline]
    pub fn kk_index(&self, self_k: Square, opp_k: Square) -> usize {
        self_k.index() * self.layout.squares + opp_k.index()
    }

    #[inline]
    pub fn kkp_index(&self, self_k: Square, opp_k: Square, p: BonaPiece) -> usize {
        debug_assert!(p.index() < self.layout.fe_end);
        self.kk_index(self_k, opp_k) * self.layout.fe_end + p.index()
    }

    /// 順序なしペアのインデックス。同じ駒同士なら None。
    #[inline]
    pub fn kpp_index(&self, k: Square, p0: BonaPiece, p1: BonaPiece) -> Option<usize> {
        let (a, b) = match p0.cmp(&p1) {
            std::cmp::Ordering::Greater => (p0.index(), p1.index()),
            std::cmp::Ordering::Less => (p1.index(), p0.index()),
            std::cmp::Ordering::Equal => return None,
        };
        debug_assert!(a < self.layout.fe_end);
        Some(k.index() * self.layout.triangle() + self.row_offsets[a] + b)
    }

    /// KPP インデックスから (玉, 大きい駒, 小さい駒) に戻す
    pub fn kpp_decompose(&self, index: usize) -> (Square, BonaPiece, BonaPiece) {
        let tri = self.layout.triangle();
        let k = index / tri;
        let rest = index % tri;
        // row_offsets は単調増加なので、rest 以下で最大の行を二分探索する
        let a = self.row_offsets.partition_point(|&off| off <= rest) - 1;
        let b = rest - self.row_offsets[a];
        (
            Square::new(k as u8),
            BonaPiece::new(a as u16),
            BonaPiece::new(b as u16),
        )
    }

    /// 局面で有効な特徴量を列挙する
    pub fn active_features<P: LearnPosition>(&self, pos: &P) -> ActiveFeatures {
        let list = pos.eval_list();
        let mut out = ActiveFeatures::default();
        for c in Color::ALL {
            let self_k = self.layout.relative(pos.king_square(c), c);
            let opp_k = self.layout.relative(pos.king_square(!c), c);
            let pieces: Vec<BonaPiece> = list.iter().map(|p| p.for_perspective(c)).collect();

            let f = &mut out.perspectives[c.index()];
            f.kk = self.kk_index(self_k, opp_k);
            f.kkp = pieces.iter().map(|&p| self.kkp_index(self_k, opp_k, p)).collect();
            f.kpp = Vec::with_capacity(pieces.len() * pieces.len().saturating_sub(1) / 2);
            for (i, &p0) in pieces.iter().enumerate() {
                for &p1 in &pieces[..i] {
                    if let Some(idx) = self.kpp_index(self_k, p0, p1) {
                        f.kpp.push(idx);
                    }
                }
            }
        }
        out
    }
}
