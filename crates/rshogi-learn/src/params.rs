//! 評価関数のパラメータテーブル
//!
//! 各特徴量スロットは `[T; 2]`（盤面側 `[0]` と手番側 `[1]`）を持つ。
//! 探索で使う整数テーブル（`i32`）と学習で使う小数テーブル（`f64`）は別の型で、
//! 相互の変換は [`WeightTables::round_from`] / [`WeightTables::widen_from`] で明示的に行う。

use rayon::prelude::*;

use crate::features::{FeatureKind, FeatureLayout};

/// 1スロット分の重み（盤面側・手番側）
pub type Weight<T> = [T; 2];

/// KK / KKP / KPP の3テーブル
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTables<T> {
    pub kk: Vec<Weight<T>>,
    pub kkp: Vec<Weight<T>>,
    pub kpp: Vec<Weight<T>>,
}

/// 探索で使う整数テーブル
pub type EvalTables = WeightTables<i32>;

/// 学習用の小数テーブル（パラメータ・勾配・二乗和・移動平均で共用）
pub type LearnTables = WeightTables<f64>;

impl<T: Copy + Default + Send + Sync> WeightTables<T> {
    /// 全要素 0 で確保する
    pub fn zeros(layout: &FeatureLayout) -> Self {
        Self {
            kk: vec![[T::default(); 2]; layout.kk_len()],
            kkp: vec![[T::default(); 2]; layout.kkp_len()],
            kpp: vec![[T::default(); 2]; layout.kpp_len()],
        }
    }

    pub fn table(&self, kind: FeatureKind) -> &[Weight<T>] {
        match kind {
            FeatureKind::Kk => &self.kk,
            FeatureKind::Kkp => &self.kkp,
            FeatureKind::Kpp => &self.kpp,
        }
    }

    pub fn table_mut(&mut self, kind: FeatureKind) -> &mut Vec<Weight<T>> {
        match kind {
            FeatureKind::Kk => &mut self.kk,
            FeatureKind::Kkp => &mut self.kkp,
            FeatureKind::Kpp => &mut self.kpp,
        }
    }

    /// 形が `layout` と一致するか
    pub fn matches(&self, layout: &FeatureLayout) -> bool {
        FeatureKind::ALL.iter().all(|&k| self.table(k).len() == layout.len_of(k))
    }

    /// 全要素を 0 に戻す
    pub fn clear(&mut self) {
        for kind in FeatureKind::ALL {
            self.table_mut(kind).par_iter_mut().for_each(|w| *w = [T::default(); 2]);
        }
    }
}

impl WeightTables<i32> {
    /// 小数テーブルを丸めて整数テーブルを作る
    pub fn round_from(src: &LearnTables) -> Self {
        fn round(t: &[Weight<f64>]) -> Vec<Weight<i32>> {
            t.par_iter().map(|w| [w[0].round() as i32, w[1].round() as i32]).collect()
        }
        Self {
            kk: round(&src.kk),
            kkp: round(&src.kkp),
            kpp: round(&src.kpp),
        }
    }
}

impl WeightTables<f64> {
    /// 整数テーブルを小数に直す
    pub fn widen_from(src: &EvalTables) -> Self {
        fn widen(t: &[Weight<i32>]) -> Vec<Weight<f64>> {
            t.par_iter().map(|w| [w[0] as f64, w[1] as f64]).collect()
        }
        Self {
            kk: widen(&src.kk),
            kkp: widen(&src.kkp),
            kpp: widen(&src.kpp),
        }
    }

    /// 指数移動平均: `self = decay * self + (1 - decay) * current`
    pub fn average_toward(&mut self, current: &LearnTables, decay: f64) {
        for kind in FeatureKind::ALL {
            let src = current.table(kind);
            self.table_mut(kind).par_iter_mut().zip(src.par_iter()).for_each(|(avg, cur)| {
                for i in 0..2 {
                    avg[i] = decay * avg[i] + (1.0 - decay) * cur[i];
                }
            });
        }
    }
}
