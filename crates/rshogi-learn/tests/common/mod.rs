//! 結合テスト用の小さなゲーム
//!
//! 3x3 の盤に両者の玉と兵だけを置く。どの駒も8近傍に1升動け、兵は取れるが玉は取れない。
//! 王手の概念はない。兵の価値は 100。
//!
//! 升は `row * 3 + col`（row 0 が後手側）。180度回転は `8 - sq`。
//! BonaPiece は fe_end = 19 で、自分の兵が `1 + sq`、相手の兵が `10 + sq`（視点側から見た升）。

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use rshogi_learn::engine::{LearnEngine, LearnPosition, PositionCodec, SearchOracle, SearchOutcome};
use rshogi_learn::{
    BonaPiece, Color, DecodeError, ExtBonaPiece, FeatureLayout, KppEvaluator, Square, TeacherRecord,
};

pub const SQUARES: usize = 9;
pub const FE_END: usize = 19;
pub const LAYOUT: FeatureLayout = FeatureLayout::new(SQUARES, FE_END);
pub const SOLDIER_VALUE: i32 = 100;
pub const PACKED_SIZE: usize = 12;
pub const RECORD_SIZE: usize = PACKED_SIZE + 4;

const INF: i32 = 1_000_000;
const MAGIC: u8 = 0xA5;

pub const EMPTY: u8 = 0;
pub const BK: u8 = 1;
pub const BS: u8 = 2;
pub const WK: u8 = 3;
pub const WS: u8 = 4;

fn owner(cell: u8) -> Option<Color> {
    match cell {
        BK | BS => Some(Color::Black),
        WK | WS => Some(Color::White),
        _ => None,
    }
}

fn is_king(cell: u8) -> bool {
    cell == BK || cell == WK
}

fn swap_color(cell: u8) -> u8 {
    match cell {
        BK => WK,
        BS => WS,
        WK => BK,
        WS => BS,
        c => c,
    }
}

fn inverse(sq: usize) -> usize {
    SQUARES - 1 - sq
}

fn adjacent(a: usize, b: usize) -> bool {
    let (ar, ac) = ((a / 3) as i32, (a % 3) as i32);
    let (br, bc) = ((b / 3) as i32, (b % 3) as i32);
    a != b && (ar - br).abs() <= 1 && (ac - bc).abs() <= 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToyMove {
    pub from: u8,
    pub to: u8,
}

impl ToyMove {
    pub fn new(from: u8, to: u8) -> Self {
        Self { from, to }
    }

    pub fn code(self) -> u16 {
        ((self.from as u16) << 4) | self.to as u16
    }
}

#[derive(Debug, Clone)]
pub struct ToyPos {
    pub cells: [u8; SQUARES],
    pub stm: Color,
    ply: u32,
    history: Vec<u64>,
    captured: Vec<u8>,
}

impl PartialEq for ToyPos {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells && self.stm == other.stm
    }
}

impl ToyPos {
    pub fn new(cells: [u8; SQUARES], stm: Color) -> Self {
        Self {
            cells,
            stm,
            ply: 0,
            history: Vec::new(),
            captured: Vec::new(),
        }
    }

    /// 兵2枚ずつの初期局面
    pub fn initial() -> Self {
        Self::new([WS, WK, WS, EMPTY, EMPTY, EMPTY, BS, BK, BS], Color::Black)
    }

    /// 玉だけの局面
    pub fn kings_only(bk: usize, wk: usize, stm: Color) -> Self {
        let mut cells = [EMPTY; SQUARES];
        cells[bk] = BK;
        cells[wk] = WK;
        Self::new(cells, stm)
    }

    /// 先後反転した局面（盤を180度回し、駒の持ち主と手番を入れ替える）
    pub fn mirrored(&self) -> Self {
        let mut cells = [EMPTY; SQUARES];
        for sq in 0..SQUARES {
            cells[inverse(sq)] = swap_color(self.cells[sq]);
        }
        Self::new(cells, !self.stm)
    }

    pub fn soldiers(&self) -> usize {
        self.cells.iter().filter(|&&c| c == BS || c == WS).count()
    }

    fn pseudo_legal(&self, mv: ToyMove) -> bool {
        let (from, to) = (mv.from as usize, mv.to as usize);
        from < SQUARES
            && to < SQUARES
            && owner(self.cells[from]) == Some(self.stm)
            && adjacent(from, to)
            && owner(self.cells[to]) != Some(self.stm)
    }
}

impl LearnPosition for ToyPos {
    type Move = ToyMove;

    fn side_to_move(&self) -> Color {
        self.stm
    }

    fn key(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for &b in self.cells.iter().chain(std::iter::once(&(self.stm as u8))) {
            h ^= b as u64;
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        h
    }

    fn in_check(&self) -> bool {
        false
    }

    fn king_square(&self, color: Color) -> Square {
        let king = if color == Color::Black { BK } else { WK };
        let sq = self.cells.iter().position(|&c| c == king).unwrap();
        Square::new(sq as u8)
    }

    fn eval_list(&self) -> Vec<ExtBonaPiece> {
        let mut list = Vec::new();
        for sq in 0..SQUARES {
            let cell = self.cells[sq];
            let (fb, fw) = match cell {
                BS => (1 + sq, 10 + inverse(sq)),
                WS => (10 + sq, 1 + inverse(sq)),
                _ => continue,
            };
            list.push(ExtBonaPiece::new(BonaPiece::new(fb as u16), BonaPiece::new(fw as u16)));
        }
        list
    }

    fn material(&self) -> i32 {
        self.cells
            .iter()
            .map(|&c| match c {
                BS => SOLDIER_VALUE,
                WS => -SOLDIER_VALUE,
                _ => 0,
            })
            .sum()
    }

    fn legal_moves(&self) -> Vec<ToyMove> {
        let mut moves = Vec::new();
        for from in 0..SQUARES {
            if owner(self.cells[from]) != Some(self.stm) {
                continue;
            }
            for to in 0..SQUARES {
                let mv = ToyMove::new(from as u8, to as u8);
                if self.pseudo_legal(mv) && self.is_legal(mv) {
                    moves.push(mv);
                }
            }
        }
        moves
    }

    fn is_king_move(&self, mv: ToyMove) -> bool {
        is_king(self.cells[mv.from as usize])
    }

    fn do_move(&mut self, mv: ToyMove) {
        self.history.push(self.key());
        let piece = self.cells[mv.from as usize];
        self.captured.push(self.cells[mv.to as usize]);
        self.cells[mv.to as usize] = piece;
        self.cells[mv.from as usize] = EMPTY;
        self.stm = !self.stm;
        self.ply += 1;
    }

    fn undo_move(&mut self, mv: ToyMove) {
        let captured = self.captured.pop().unwrap();
        self.cells[mv.from as usize] = self.cells[mv.to as usize];
        self.cells[mv.to as usize] = captured;
        self.stm = !self.stm;
        self.ply -= 1;
        self.history.pop();
    }

    fn move16(&self, mv: ToyMove) -> u16 {
        mv.code()
    }

    fn to_move(&self, code: u16) -> Option<ToyMove> {
        if code > 0xFF {
            return None;
        }
        let mv = ToyMove::new((code >> 4) as u8, (code & 0xF) as u8);
        self.pseudo_legal(mv).then_some(mv)
    }

    fn is_legal(&self, mv: ToyMove) -> bool {
        !is_king(self.cells[mv.to as usize])
    }

    fn is_repetition(&self, window: usize) -> bool {
        let key = self.key();
        self.history.iter().rev().take(window).any(|&k| k == key)
    }

    fn game_ply(&self) -> u32 {
        self.ply
    }
}

/// 12 バイト: [MAGIC, 手番, 9 升, チェックサム]
pub struct ToyCodec;

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0x5Au8, |acc, &b| acc.rotate_left(1) ^ b)
}

impl PositionCodec<ToyPos> for ToyCodec {
    fn packed_size(&self) -> usize {
        PACKED_SIZE
    }

    fn encode(&self, pos: &ToyPos) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PACKED_SIZE);
        bytes.push(MAGIC);
        bytes.push(pos.stm as u8);
        bytes.extend_from_slice(&pos.cells);
        bytes.push(checksum(&bytes));
        bytes
    }

    fn decode(&self, bytes: &[u8]) -> Result<ToyPos, DecodeError> {
        if bytes.len() != PACKED_SIZE {
            return Err(DecodeError::Length {
                expected: PACKED_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0] != MAGIC {
            return Err(DecodeError::Invalid("bad magic".into()));
        }
        if checksum(&bytes[..PACKED_SIZE - 1]) != bytes[PACKED_SIZE - 1] {
            return Err(DecodeError::Invalid("checksum mismatch".into()));
        }
        let stm = match bytes[1] {
            0 => Color::Black,
            1 => Color::White,
            v => return Err(DecodeError::Invalid(format!("side to move {v}"))),
        };
        let mut cells = [EMPTY; SQUARES];
        cells.copy_from_slice(&bytes[2..2 + SQUARES]);
        if cells.iter().any(|&c| c > WS) {
            return Err(DecodeError::Invalid("unknown piece".into()));
        }
        for king in [BK, WK] {
            if cells.iter().filter(|&&c| c == king).count() != 1 {
                return Err(DecodeError::Invalid("king count".into()));
            }
        }
        Ok(ToyPos::new(cells, stm))
    }
}

/// αβ探索と捕獲だけの静止探索。置換表は局面キー → 最善手コード。
#[derive(Debug, Default)]
pub struct ToyOracle {
    pub tt: HashMap<u64, u16>,
}

impl ToyOracle {
    fn negamax(
        &mut self,
        pos: &mut ToyPos,
        depth: i32,
        mut alpha: i32,
        beta: i32,
        eval: &KppEvaluator,
        pv: &mut Vec<ToyMove>,
    ) -> i32 {
        pv.clear();
        if depth <= 0 {
            return self.quiesce(pos, alpha, beta, eval);
        }
        let moves = pos.legal_moves();
        if moves.is_empty() {
            return eval.evaluate(&*pos);
        }
        let mut best = -INF;
        let mut child_pv = Vec::new();
        for mv in moves {
            pos.do_move(mv);
            let v = -self.negamax(pos, depth - 1, -beta, -alpha, eval, &mut child_pv);
            pos.undo_move(mv);
            if v > best {
                best = v;
                pv.clear();
                pv.push(mv);
                pv.extend_from_slice(&child_pv);
                self.tt.insert(pos.key(), mv.code());
            }
            alpha = alpha.max(v);
            if alpha >= beta {
                break;
            }
        }
        best
    }

    fn quiesce(&mut self, pos: &mut ToyPos, mut alpha: i32, beta: i32, eval: &KppEvaluator) -> i32 {
        let stand_pat = eval.evaluate(&*pos);
        if stand_pat >= beta {
            return stand_pat;
        }
        let mut best = stand_pat;
        alpha = alpha.max(stand_pat);
        let captures: Vec<ToyMove> =
            pos.legal_moves().into_iter().filter(|m| pos.cells[m.to as usize] != EMPTY).collect();
        for mv in captures {
            pos.do_move(mv);
            let v = -self.quiesce(pos, -beta, -alpha, eval);
            pos.undo_move(mv);
            if v > best {
                best = v;
                self.tt.insert(pos.key(), mv.code());
            }
            alpha = alpha.max(v);
            if alpha >= beta {
                break;
            }
        }
        best
    }
}

impl SearchOracle<ToyPos> for ToyOracle {
    fn search(&mut self, pos: &mut ToyPos, depth: i32, eval: &KppEvaluator) -> SearchOutcome<ToyMove> {
        let mut pv = Vec::new();
        let score = self.negamax(pos, depth, -INF, INF, eval, &mut pv);
        SearchOutcome { score, pv }
    }

    fn qsearch(&mut self, pos: &mut ToyPos, eval: &KppEvaluator) -> i32 {
        self.quiesce(pos, -INF, INF, eval)
    }

    fn probe_move(&self, key: u64) -> Option<u16> {
        self.tt.get(&key).copied()
    }

    fn clear(&mut self) {
        self.tt.clear();
    }
}

pub struct ToyEngine {
    codec: ToyCodec,
}

impl ToyEngine {
    pub fn new() -> Self {
        Self { codec: ToyCodec }
    }
}

impl LearnEngine for ToyEngine {
    type Position = ToyPos;
    type Oracle = ToyOracle;
    type Codec = ToyCodec;

    fn codec(&self) -> &ToyCodec {
        &self.codec
    }

    fn feature_layout(&self) -> FeatureLayout {
        LAYOUT
    }

    fn new_oracle(&self) -> ToyOracle {
        ToyOracle::default()
    }
}

/// 全要素 0 の評価関数
pub fn zero_evaluator(fv_scale: i32) -> KppEvaluator {
    KppEvaluator::zeros(LAYOUT, fv_scale)
}

/// いくつかの開始局面
pub fn seed_positions() -> Vec<ToyPos> {
    vec![
        ToyPos::initial(),
        ToyPos::new([WK, EMPTY, WS, WS, EMPTY, EMPTY, EMPTY, BS, BK], Color::Black),
        ToyPos::new([EMPTY, WK, EMPTY, WS, BS, WS, EMPTY, BK, EMPTY], Color::White),
        ToyPos::new([WS, EMPTY, WK, EMPTY, BS, EMPTY, BK, EMPTY, BS], Color::Black),
    ]
}

/// 開始局面ファイルを書く
pub fn write_seed_file(path: &Path, positions: &[ToyPos]) {
    let bytes: Vec<u8> = positions.iter().flat_map(|p| ToyCodec.encode(p)).collect();
    std::fs::write(path, bytes).unwrap();
}

/// 教師局面ファイルを書く
pub fn write_teacher_file(path: &Path, records: &[TeacherRecord]) {
    let bytes: Vec<u8> = records.iter().flat_map(|r| r.to_bytes()).collect();
    std::fs::write(path, bytes).unwrap();
}
