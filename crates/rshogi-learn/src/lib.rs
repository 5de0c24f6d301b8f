//! rshogi-learn: 教師局面の生成と KK/KKP/KPP 評価関数の学習
//!
//! 盤面・探索・局面圧縮はエンジン側の実装を [`engine`] のトレイト越しに使う。
//!
//! - [`teacher`]: 自己対局による教師局面の生成
//! - [`trainer`]: 教師局面からの学習（AdaGrad + 移動平均）
//! - [`validate`]: 教師局面ファイルの検査
//! - [`cli`]: 上記3コマンドのコマンドライン

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod features;
pub mod gradient;
pub mod leaf;
pub mod optimizer;
pub mod params;
pub mod progress;
pub mod record;
pub mod teacher;
pub mod trainer;
pub mod types;
pub mod validate;

pub use config::{GenerateConfig, LearnConfig, ReadOrder, TrainConfig};
pub use engine::{LearnEngine, LearnPosition, PositionCodec, SearchOracle, SearchOutcome};
pub use error::{DecodeError, LearnError, LearnResult};
pub use evaluator::KppEvaluator;
pub use features::{FeatureIndexer, FeatureLayout};
pub use record::TeacherRecord;
pub use teacher::{RandomMoveRate, generate_teacher_data, random_move, teacher_eval};
pub use trainer::{Trainer, train_from_teacher_data};
pub use types::{BonaPiece, Color, ExtBonaPiece, Square};
pub use validate::validate_teacher_data;
