//! 置換表の最善手をたどって静止局面（末端局面）を得る
//!
//! 静止探索で置換表を埋めたあと、root から置換表の手を順に指していき、
//! エントリが無くなった局面を末端とする。これで探索中に実際に評価される局面と
//! 同じ局面が得られる。

use crate::engine::{LearnPosition, SearchOracle};
use crate::evaluator::KppEvaluator;

/// たどる手数などの制限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafLimits {
    /// 最大手数
    pub max_ply: u32,
    /// 千日手判定の手数
    pub repetition_window: usize,
    /// この手数未満では千日手でも打ち切らない
    pub min_ply_before_draw: u32,
}

impl Default for LeafLimits {
    fn default() -> Self {
        Self {
            max_ply: 128,
            repetition_window: 20,
            min_ply_before_draw: 6,
        }
    }
}

/// 置換表の手をたどって局面を進める
///
/// root で置換表の手が `teacher_move` と異なれば何もせず `None`
/// （教師の手を再現できない局面は学習しない）。root にエントリが無いときは
/// root がそのまま末端になる。成功時は指した手を返し、局面は末端に進んだまま。
pub fn walk_to_leaf<P, O>(
    pos: &mut P,
    oracle: &O,
    teacher_move: u16,
    limits: &LeafLimits,
) -> Option<Vec<P::Move>>
where
    P: LearnPosition,
    O: SearchOracle<P> + ?Sized,
{
    let mut entry = oracle.probe_move(pos.key());
    if entry.is_some_and(|code| code != teacher_move) {
        return None;
    }

    let mut moves = Vec::new();
    let mut ply = 0u32;
    while let Some(code) = entry {
        let Some(mv) = pos.to_move(code) else { break };
        if !pos.is_legal(mv) || ply >= limits.max_ply {
            break;
        }
        if ply >= limits.min_ply_before_draw && pos.is_repetition(limits.repetition_window) {
            break;
        }
        pos.do_move(mv);
        moves.push(mv);
        ply += 1;
        entry = oracle.probe_move(pos.key());
    }
    Some(moves)
}

/// `walk_to_leaf` で進めた手を戻す
pub fn undo_walk<P: LearnPosition>(pos: &mut P, moves: &[P::Move]) {
    for &mv in moves.iter().rev() {
        pos.undo_move(mv);
    }
}

/// 末端局面で `f` を呼び、局面を元に戻す
///
/// 教師の手が再現できなければ `f` を呼ばずに `None`。
pub fn with_leaf<P, O, R>(
    pos: &mut P,
    oracle: &O,
    teacher_move: u16,
    limits: &LeafLimits,
    f: impl FnOnce(&P) -> R,
) -> Option<R>
where
    P: LearnPosition,
    O: SearchOracle<P> + ?Sized,
{
    let moves = walk_to_leaf(pos, oracle, teacher_move, limits)?;
    let result = f(pos);
    undo_walk(pos, &moves);
    Some(result)
}

/// 静止探索で置換表を準備し、末端局面で `f` を呼んで局面を元に戻す
pub fn with_quiet_leaf<P, O, R>(
    pos: &mut P,
    oracle: &mut O,
    eval: &KppEvaluator,
    teacher_move: u16,
    limits: &LeafLimits,
    f: impl FnOnce(&P) -> R,
) -> Option<R>
where
    P: LearnPosition,
    O: SearchOracle<P> + ?Sized,
{
    // 値は使わない。置換表に静止探索の読み筋を残すためだけに呼ぶ。
    oracle.qsearch(pos, eval);
    with_leaf(pos, oracle, teacher_move, limits, f)
}
