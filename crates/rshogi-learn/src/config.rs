//! 学習パイプラインの設定
//!
//! 値はすべて既定値を持ち、TOML ファイルで部分的に上書きできる。
//!
//! ```toml
//! [generate]
//! search_depth = 8
//!
//! [train]
//! nodes_per_iteration = 500000
//! eval_dir = "eval/kppt"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LearnError, LearnResult};

/// 設定ファイル全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    pub generate: GenerateConfig,
    pub train: TrainConfig,
}

impl LearnConfig {
    /// TOML ファイルから読み込む
    pub fn load(path: &Path) -> LearnResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LearnError::open(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> LearnResult<Self> {
        let config: LearnConfig =
            toml::from_str(text).map_err(|e| LearnError::Config(e.to_string()))?;
        config.generate.validate()?;
        config.train.validate()?;
        Ok(config)
    }
}

/// 教師局面生成の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// 探索深さ
    pub search_depth: i32,
    /// 1局の最大手数
    pub max_ply: u32,
    /// ランダム手を挿入する初期確率
    pub initial_random_move_rate: f64,
    /// ランダム手を挿入するたびに確率に掛ける係数
    pub random_move_rate_decay: f64,
    /// ランダム手で玉を動かす確率
    pub king_move_rate: f64,
    /// 玉を動かした後、相手にもランダム手を指させる確率
    pub reply_rate: f64,
    /// この絶対値を超える探索値はそのまま教師値にする
    pub decided_score: i32,
    /// 進捗表示の間隔（秒）
    pub progress_interval_secs: u64,
    /// 乱数シード（未指定なら時刻から）
    pub seed: Option<u64>,
    /// 出力ファイルに追記する
    pub append: bool,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            search_depth: 15,
            max_ply: 400,
            initial_random_move_rate: 0.2,
            random_move_rate_decay: 0.5,
            king_move_rate: 0.5,
            reply_rate: 0.5,
            decided_score: 30000,
            progress_interval_secs: 5,
            seed: None,
            append: false,
        }
    }
}

impl GenerateConfig {
    pub fn validate(&self) -> LearnResult<()> {
        for (name, p) in [
            ("initial_random_move_rate", self.initial_random_move_rate),
            ("random_move_rate_decay", self.random_move_rate_decay),
            ("king_move_rate", self.king_move_rate),
            ("reply_rate", self.reply_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(LearnError::Config(format!("{name} must be in [0, 1], got {p}")));
            }
        }
        if self.search_depth < 1 {
            return Err(LearnError::Config("search_depth must be >= 1".into()));
        }
        Ok(())
    }
}

/// 教師局面の読み出し順
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadOrder {
    /// 先頭から順に読む
    #[default]
    Sequential,
    /// 毎回ランダムな位置から読む
    Random,
}

/// 学習の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// 1イテレーションで使う教師局面数
    pub nodes_per_iteration: u64,
    /// AdaGrad の更新係数 C
    pub update_param: f64,
    /// AdaGrad の分母に加える ε
    pub epsilon: f64,
    /// 移動平均の減衰率（旧値の重み）
    pub average_decay: f64,
    /// 最初のこの回数のイテレーションでは生パラメータを 0 に戻す
    pub frozen_iterations: u64,
    /// チェックポイントを書き出す間隔（イテレーション数）
    pub checkpoint_interval: u64,
    /// 評価値の内部スケール（FV_SCALE）
    pub fv_scale: i32,
    /// 勝率変換のスケール
    pub sigmoid_scale: f64,
    /// 置換表をたどる最大手数
    pub leaf_max_ply: u32,
    /// 千日手を検出する手数
    pub repetition_window: usize,
    /// この手数未満では千日手でもたどり続ける
    pub min_ply_before_draw: u32,
    /// チェックポイントの読み込み/書き出し先
    pub eval_dir: PathBuf,
    pub read_order: ReadOrder,
    /// 移動平均前の値も `*_synthesized.bin` として書き出す
    pub write_synthesized: bool,
    /// ランダム読み出し時の乱数シード
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            nodes_per_iteration: 1_000_000,
            update_param: 100.0,
            epsilon: 1e-6,
            average_decay: 0.8,
            frozen_iterations: 10,
            checkpoint_interval: 100,
            fv_scale: 32,
            sigmoid_scale: 600.0,
            leaf_max_ply: 128,
            repetition_window: 20,
            min_ply_before_draw: 6,
            eval_dir: PathBuf::from("."),
            read_order: ReadOrder::Sequential,
            write_synthesized: true,
            seed: None,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> LearnResult<()> {
        if self.nodes_per_iteration == 0 {
            return Err(LearnError::Config("nodes_per_iteration must be >= 1".into()));
        }
        if self.fv_scale <= 0 {
            return Err(LearnError::Config("fv_scale must be positive".into()));
        }
        if self.sigmoid_scale <= 0.0 {
            return Err(LearnError::Config("sigmoid_scale must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.average_decay) {
            return Err(LearnError::Config(format!(
                "average_decay must be in [0, 1), got {}",
                self.average_decay
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(LearnError::Config("checkpoint_interval must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = LearnConfig::default();
        assert_eq!(c.generate.max_ply, 400);
        assert_eq!(c.generate.decided_score, 30000);
        assert_eq!(c.train.nodes_per_iteration, 1_000_000);
        assert_eq!(c.train.fv_scale, 32);
        assert_eq!(c.train.frozen_iterations, 10);
        assert_eq!(c.train.read_order, ReadOrder::Sequential);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = LearnConfig::from_toml_str(
            r#"
            [generate]
            search_depth = 6

            [train]
            read_order = "random"
            checkpoint_interval = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.generate.search_depth, 6);
        assert_eq!(c.generate.max_ply, 400);
        assert_eq!(c.train.read_order, ReadOrder::Random);
        assert_eq!(c.train.checkpoint_interval, 5);
        assert_eq!(c.train.update_param, 100.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(LearnConfig::from_toml_str("[generate]\nking_move_rate = 1.5\n").is_err());
        assert!(LearnConfig::from_toml_str("[train]\nfv_scale = 0\n").is_err());
        assert!(LearnConfig::from_toml_str("[train]\nunknown = ").is_err());
    }
}
