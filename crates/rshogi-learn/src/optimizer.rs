//! AdaGrad によるパラメータ更新
//!
//! 二乗和は減衰させず、学習全体を通して積み上げる。

use rayon::prelude::*;

use crate::features::FeatureKind;
use crate::params::{LearnTables, Weight};

/// 更新係数と ε
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaGrad {
    pub update_param: f64,
    pub epsilon: f64,
}

impl Default for AdaGrad {
    fn default() -> Self {
        Self {
            update_param: 100.0,
            epsilon: 1e-6,
        }
    }
}

impl AdaGrad {
    pub fn new(update_param: f64, epsilon: f64) -> Self {
        Self {
            update_param,
            epsilon,
        }
    }

    /// 1スロット分の更新。更新量の絶対値の最大を返す。
    #[inline]
    pub fn update_slot(&self, w: &mut Weight<f64>, ms: &mut Weight<f64>, g: &Weight<f64>) -> f64 {
        let mut max = 0.0f64;
        for i in 0..2 {
            ms[i] += g[i] * g[i];
            let step = self.update_param * g[i] / (ms[i] + self.epsilon).sqrt();
            w[i] += step;
            max = max.max(step.abs());
        }
        max
    }

    /// 全テーブルを更新し、最大更新量を返す
    ///
    /// `grad` は降下方向（重みに加算する向き）。
    pub fn step(&self, params: &mut LearnTables, mean_square: &mut LearnTables, grad: &LearnTables) -> f64 {
        let mut max = 0.0f64;
        for kind in FeatureKind::ALL {
            let g = grad.table(kind);
            let ms = mean_square.table_mut(kind);
            let w = params.table_mut(kind);
            let kind_max = w
                .par_iter_mut()
                .zip(ms.par_iter_mut())
                .zip(g.par_iter())
                .map(|((w, ms), g)| self.update_slot(w, ms, g))
                .reduce(|| 0.0, f64::max);
            max = max.max(kind_max);
        }
        max
    }
}
