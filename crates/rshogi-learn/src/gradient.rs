//! 損失関数と勾配の蓄積
//!
//! 浅い読みの評価値 x と教師の評価値 y を勝率に直し、その二乗誤差を最小化する。
//!
//! ```text
//! f(x, y)  = (σ(x) - σ(y))²
//! df/dx    = 2 σ'(x) (σ(x) - σ(y))
//! σ(x)     = 1 / (1 + exp(-x / 600))
//! σ'(x)    = σ(x) (1 - σ(x)) / 600
//! ```
//!
//! 蓄積するのは勾配の符号を反転したもの（降下方向）で、そのまま重みに加算できる。

use std::collections::HashMap;

use crate::features::{ActiveFeatures, FeatureKind};
use crate::params::{LearnTables, Weight};
use crate::types::Color;

/// 評価値を勝率に変換する
#[inline]
pub fn sigmoid_winning_rate(x: f64, scale: f64) -> f64 {
    1.0 / (1.0 + (-x / scale).exp())
}

#[inline]
pub fn dsigmoid_winning_rate(x: f64, scale: f64) -> f64 {
    let s = sigmoid_winning_rate(x, scale);
    s * (1.0 - s) / scale
}

/// 勝率の二乗誤差
#[inline]
pub fn winning_rate_loss(eval: f64, teacher: f64, scale: f64) -> f64 {
    let d = sigmoid_winning_rate(eval, scale) - sigmoid_winning_rate(teacher, scale);
    d * d
}

/// 損失の評価値による微分 `df/dx`
#[inline]
pub fn winning_rate_loss_derivative(eval: f64, teacher: f64, scale: f64) -> f64 {
    2.0 * dsigmoid_winning_rate(eval, scale)
        * (sigmoid_winning_rate(eval, scale) - sigmoid_winning_rate(teacher, scale))
}

/// 視点ごとの降下方向 `[盤面側, 手番側]` を求める
///
/// 評価値を root 手番から見ると、視点 `p` の特徴量の重み `w` に対して
///
/// - `d eval / d w[0] = s(root) * s(p) / FV_SCALE`
/// - `d eval / d w[1] = (root == leaf 手番 ? 1 : -1) / FV_SCALE`
///
/// となる（`s` は先手 +1 / 後手 -1）。
pub fn descent_direction(
    derivative: f64,
    root: Color,
    leaf: Color,
    fv_scale: i32,
) -> [Weight<f64>; Color::NUM] {
    let g = derivative / fv_scale as f64;
    let board = -g * root.sign() as f64;
    let turn = if root == leaf { -g } else { g };
    [[board, turn], [-board, turn]]
}

/// スレッドごとの疎な勾配バッファ
///
/// 将棋の KPP テーブルは数億要素あるため、ワーカーは触れたスロットだけを持つ。
#[derive(Debug, Default, Clone)]
pub struct SparseGradient {
    kk: HashMap<usize, Weight<f64>>,
    kkp: HashMap<usize, Weight<f64>>,
    kpp: HashMap<usize, Weight<f64>>,
}

impl SparseGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.kk.clear();
        self.kkp.clear();
        self.kpp.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.kk.is_empty() && self.kkp.is_empty() && self.kpp.is_empty()
    }

    /// 触れたスロット数
    pub fn touched(&self) -> usize {
        self.kk.len() + self.kkp.len() + self.kpp.len()
    }

    fn map_mut(&mut self, kind: FeatureKind) -> &mut HashMap<usize, Weight<f64>> {
        match kind {
            FeatureKind::Kk => &mut self.kk,
            FeatureKind::Kkp => &mut self.kkp,
            FeatureKind::Kpp => &mut self.kpp,
        }
    }

    #[inline]
    fn add(&mut self, kind: FeatureKind, index: usize, g: Weight<f64>) {
        let slot = self.map_mut(kind).entry(index).or_insert([0.0; 2]);
        slot[0] += g[0];
        slot[1] += g[1];
    }

    /// 局面の全特徴量に視点ごとの値 `g` を加える
    pub fn add_features(&mut self, features: &ActiveFeatures, g: &[Weight<f64>; Color::NUM]) {
        for c in Color::ALL {
            let f = features.of(c);
            let gc = g[c.index()];
            self.add(FeatureKind::Kk, f.kk, gc);
            for &i in &f.kkp {
                self.add(FeatureKind::Kkp, i, gc);
            }
            for &i in &f.kpp {
                self.add(FeatureKind::Kpp, i, gc);
            }
        }
    }

    /// 密なテーブルに足し込む
    pub fn merge_into(&self, dense: &mut LearnTables) {
        for (kind, map) in [
            (FeatureKind::Kk, &self.kk),
            (FeatureKind::Kkp, &self.kkp),
            (FeatureKind::Kpp, &self.kpp),
        ] {
            let table = dense.table_mut(kind);
            for (&i, g) in map {
                table[i][0] += g[0];
                table[i][1] += g[1];
            }
        }
    }
}
