//! 学習パイプラインが要求する外部コンポーネントの契約
//!
//! 盤面・指し手生成・探索・置換表・局面圧縮はエンジン本体が持つ。
//! 学習側はここで定義するトレイトを通してのみそれらに触れる。
//!
//! - [`LearnPosition`]: 局面（do/undo、合法手、キー、駒リスト）
//! - [`PositionCodec`]: 固定長の局面圧縮
//! - [`SearchOracle`]: 探索と置換表
//! - [`LearnEngine`]: 上記をまとめ、スレッドごとに探索器を生成する

use std::fmt::Debug;

use crate::error::DecodeError;
use crate::evaluator::KppEvaluator;
use crate::features::FeatureLayout;
use crate::types::{Color, ExtBonaPiece, Square};

/// 学習で使う局面の操作
pub trait LearnPosition: Clone + Send {
    /// エンジン内部の指し手表現
    type Move: Copy + Eq + Debug + Send + Sync;

    /// 手番
    fn side_to_move(&self) -> Color;

    /// 局面のハッシュキー（置換表のキーと同じもの）
    fn key(&self) -> u64;

    fn in_check(&self) -> bool;

    fn king_square(&self, color: Color) -> Square;

    /// 玉以外の全駒（手駒を含む）の BonaPiece 一覧
    fn eval_list(&self) -> Vec<ExtBonaPiece>;

    /// 駒割り（先手視点）
    fn material(&self) -> i32;

    fn legal_moves(&self) -> Vec<Self::Move>;

    /// 玉を動かす手かどうか
    fn is_king_move(&self, mv: Self::Move) -> bool;

    fn do_move(&mut self, mv: Self::Move);

    /// 直前の `do_move` を取り消す
    fn undo_move(&mut self, mv: Self::Move);

    /// 16bit 指し手コード（0 は「指し手なし」）
    fn move16(&self, mv: Self::Move) -> u16;

    /// 16bit コードをこの局面の指し手に復元する（擬似合法でなければ None）
    fn to_move(&self, code: u16) -> Option<Self::Move>;

    fn is_legal(&self, mv: Self::Move) -> bool;

    /// 直近 `window` 手以内に同一局面が現れているか
    fn is_repetition(&self, window: usize) -> bool;

    /// 開始局面からの手数
    fn game_ply(&self) -> u32;
}

/// 固定長の局面圧縮（PackedSfen 相当）
///
/// 合法局面に対して `decode(encode(p))` は `p` と同一局面でなければならない。
pub trait PositionCodec<P>: Sync {
    /// 1局面あたりのバイト数
    fn packed_size(&self) -> usize;

    fn encode(&self, pos: &P) -> Vec<u8>;

    fn decode(&self, bytes: &[u8]) -> Result<P, DecodeError>;
}

/// 探索結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome<M> {
    /// 手番側から見た探索値
    pub score: i32,
    /// 読み筋（空なら合法手なし）
    pub pv: Vec<M>,
}

impl<M: Copy> SearchOutcome<M> {
    /// 最善手
    pub fn best_move(&self) -> Option<M> {
        self.pv.first().copied()
    }
}

/// 探索器と置換表
///
/// ワーカースレッドごとに1つ生成され、スレッド間で共有されない。
pub trait SearchOracle<P: LearnPosition>: Send {
    /// 固定深さ探索
    fn search(&mut self, pos: &mut P, depth: i32, eval: &KppEvaluator) -> SearchOutcome<P::Move>;

    /// 現局面からの静止探索。結果は置換表に最善手として残る。
    fn qsearch(&mut self, pos: &mut P, eval: &KppEvaluator) -> i32;

    /// 置換表に記録された最善手（16bit コード）
    fn probe_move(&self, key: u64) -> Option<u16>;

    /// 置換表のクリア
    fn clear(&mut self);
}

/// エンジン一式
pub trait LearnEngine: Sync {
    type Position: LearnPosition;
    type Oracle: SearchOracle<Self::Position>;
    type Codec: PositionCodec<Self::Position>;

    fn codec(&self) -> &Self::Codec;

    /// 盤の升数と BonaPiece の総数
    fn feature_layout(&self) -> FeatureLayout {
        FeatureLayout::SHOGI
    }

    /// ワーカー1本分の探索器を生成する
    fn new_oracle(&self) -> Self::Oracle;
}
