//! KK / KKP / KPP 評価関数
//!
//! 評価値は `駒割り + (盤面側 * 手番符号 + 手番側) / FV_SCALE`。
//! 盤面側は先手視点の特徴量で加算、後手視点の特徴量で減算し、手番側は両視点とも加算する。

use std::sync::Arc;

use crate::engine::LearnPosition;
use crate::features::{ActiveFeatures, FeatureIndexer, FeatureLayout, PerspectiveFeatures};
use crate::params::{EvalTables, Weight};
use crate::types::Color;

/// 評価値の内訳（スケール前の生の和）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalSum {
    /// 盤面側（先手から見た値）
    pub board: i64,
    /// 手番側（手番から見た値）
    pub turn: i64,
}

impl EvalSum {
    /// 手番 `stm` から見た値（FV_SCALE 倍されたまま）
    #[inline]
    pub fn for_side(&self, stm: Color) -> i64 {
        stm.sign() as i64 * self.board + self.turn
    }

    fn add(&mut self, c: Color, w: Weight<i32>) {
        self.board += c.sign() as i64 * w[0] as i64;
        self.turn += w[1] as i64;
    }
}

impl std::ops::Add for EvalSum {
    type Output = EvalSum;

    fn add(self, rhs: EvalSum) -> EvalSum {
        EvalSum {
            board: self.board + rhs.board,
            turn: self.turn + rhs.turn,
        }
    }
}

/// 特徴量の種類別の内訳
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalBreakdown {
    /// 駒割り（手番から見た値）
    pub material: i32,
    pub kk: EvalSum,
    pub kkp: EvalSum,
    pub kpp: EvalSum,
    /// 最終的な評価値（手番から見た値）
    pub total: i32,
}

/// 探索で使う評価関数
///
/// テーブルは `Arc` で共有し、学習の各イテレーションの終わりに差し替える。
#[derive(Debug, Clone)]
pub struct KppEvaluator {
    indexer: Arc<FeatureIndexer>,
    tables: Arc<EvalTables>,
    fv_scale: i32,
}

impl KppEvaluator {
    pub fn new(indexer: Arc<FeatureIndexer>, tables: Arc<EvalTables>, fv_scale: i32) -> Self {
        debug_assert!(tables.matches(&indexer.layout()));
        Self {
            indexer,
            tables,
            fv_scale,
        }
    }

    /// 全要素 0 の評価関数（駒割りのみ）
    pub fn zeros(layout: FeatureLayout, fv_scale: i32) -> Self {
        Self::new(
            Arc::new(FeatureIndexer::new(layout)),
            Arc::new(EvalTables::zeros(&layout)),
            fv_scale,
        )
    }

    pub fn indexer(&self) -> &FeatureIndexer {
        &self.indexer
    }

    pub fn tables(&self) -> &EvalTables {
        &self.tables
    }

    pub fn fv_scale(&self) -> i32 {
        self.fv_scale
    }

    /// 同じインデクサで別のテーブルを持つ評価関数
    pub fn with_tables(&self, tables: Arc<EvalTables>) -> Self {
        Self::new(Arc::clone(&self.indexer), tables, self.fv_scale)
    }

    /// 手番から見た静的評価値
    pub fn evaluate<P: LearnPosition>(&self, pos: &P) -> i32 {
        let features = self.indexer.active_features(pos);
        self.evaluate_features(pos, &features)
    }

    /// 列挙済みの特徴量から評価値を計算する
    pub fn evaluate_features<P: LearnPosition>(&self, pos: &P, features: &ActiveFeatures) -> i32 {
        let (kk, kkp, kpp) = self.sums(features);
        self.finish(pos, kk + kkp + kpp)
    }

    /// 評価値の内訳（KK / KKP / KPP 別）
    pub fn breakdown<P: LearnPosition>(&self, pos: &P) -> EvalBreakdown {
        let features = self.indexer.active_features(pos);
        let (kk, kkp, kpp) = self.sums(&features);
        EvalBreakdown {
            material: material_for_side(pos),
            kk,
            kkp,
            kpp,
            total: self.finish(pos, kk + kkp + kpp),
        }
    }

    fn sums(&self, features: &ActiveFeatures) -> (EvalSum, EvalSum, EvalSum) {
        let mut kk = EvalSum::default();
        let mut kkp = EvalSum::default();
        let mut kpp = EvalSum::default();
        for c in Color::ALL {
            let f: &PerspectiveFeatures = features.of(c);
            kk.add(c, self.tables.kk[f.kk]);
            for &i in &f.kkp {
                kkp.add(c, self.tables.kkp[i]);
            }
            for &i in &f.kpp {
                kpp.add(c, self.tables.kpp[i]);
            }
        }
        (kk, kkp, kpp)
    }

    fn finish<P: LearnPosition>(&self, pos: &P, sum: EvalSum) -> i32 {
        let positional = sum.for_side(pos.side_to_move()) / self.fv_scale as i64;
        material_for_side(pos) + positional as i32
    }
}

/// 手番から見た駒割り
#[inline]
fn material_for_side<P: LearnPosition>(pos: &P) -> i32 {
    pos.side_to_move().sign() * pos.material()
}
