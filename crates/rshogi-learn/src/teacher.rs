//! 教師局面の生成（自己対局）
//!
//! 開始局面ファイルからランダムに局面を取り、ランダムな手で少し崩してから
//! 浅い探索で1局指し進める。各局面で (局面, 最善手, 評価値) を1レコード書き出す。
//!
//! - ランダム手を挿入する確率は挿入するたびに減衰させる
//! - 同一局面が2回現れたら千日手としてその対局を打ち切る
//! - 書き込みスロットは原子的に確保するので、レコード数は目標数ちょうどになる

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use rand::prelude::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::GenerateConfig;
use crate::corpus::{CorpusWriter, SeedReader};
use crate::engine::{LearnEngine, LearnPosition, PositionCodec, SearchOracle, SearchOutcome};
use crate::error::{DecodeError, LearnError, LearnResult};
use crate::evaluator::KppEvaluator;
use crate::progress::progress_bar;
use crate::record::{TeacherRecord, clamp_eval};

/// 生成結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReport {
    /// 書き出したレコード数
    pub records: u64,
    /// 開始した対局数
    pub games: u64,
    /// 開始局面の復元に失敗して捨てた対局数
    pub discarded_games: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WorkerStats {
    games: u64,
    discarded_games: u64,
}

/// 教師局面を生成する
///
/// 入出力ファイルはワーカーを起動する前に開く。`target == 0` なら空のファイルを作って終わる。
pub fn generate_teacher_data<E: LearnEngine>(
    engine: &E,
    evaluator: &KppEvaluator,
    input: &Path,
    output: &Path,
    threads: usize,
    target: u64,
    config: &GenerateConfig,
) -> LearnResult<GenerateReport> {
    if threads == 0 {
        return Err(LearnError::Config("thread count must be >= 1".into()));
    }
    config.validate()?;

    let codec = engine.codec();
    let seeds = SeedReader::open(input, codec.packed_size())?;
    let writer = CorpusWriter::create(output, config.append)?;

    if target == 0 {
        writer.finish()?;
        info!("target is 0, wrote an empty teacher file: {}", output.display());
        return Ok(GenerateReport::default());
    }
    if seeds.is_empty() {
        return Err(LearnError::EmptySeedCorpus(input.to_path_buf()));
    }

    info!(
        "教師局面生成開始: input={} ({} positions), output={}, threads={threads}, target={target}, depth={}",
        input.display(),
        seeds.len(),
        output.display(),
        config.search_depth
    );

    let slots = AtomicU64::new(0);
    let progress = progress_bar(target, Duration::from_secs(config.progress_interval_secs.max(1)));
    let started = Instant::now();
    let base_seed = config.seed.unwrap_or_else(clock_seed);

    let results: Vec<std::thread::Result<LearnResult<WorkerStats>>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|id| {
                let ctx = GenContext {
                    engine,
                    evaluator,
                    seeds: &seeds,
                    writer: &writer,
                    slots: &slots,
                    progress: &progress,
                    target,
                    config,
                };
                s.spawn(move || {
                    let mut rng = Xoshiro256PlusPlus::seed_from_u64(base_seed.wrapping_add(id as u64));
                    ctx.run_worker(&mut rng)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });

    let mut report = GenerateReport {
        elapsed: started.elapsed(),
        ..Default::default()
    };
    let mut first_error = None;
    for r in results {
        match r {
            Ok(Ok(stats)) => {
                report.games += stats.games;
                report.discarded_games += stats.discarded_games;
            }
            Ok(Err(e)) => {
                warn!("worker failed: {e}");
                first_error.get_or_insert(e);
            }
            Err(_) => {
                first_error.get_or_insert(LearnError::WorkerPanicked);
            }
        }
    }
    writer.finish()?;
    if let Some(e) = first_error {
        progress.abandon_with_message("failed");
        return Err(e);
    }

    report.records = progress.position();
    progress.finish_with_message("done");
    info!(
        "Made {} teacher nodes in {} seconds ({} games, {} discarded)",
        report.records,
        report.elapsed.as_secs(),
        report.games,
        report.discarded_games
    );
    Ok(report)
}

fn clock_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

struct GenContext<'a, E: LearnEngine> {
    engine: &'a E,
    evaluator: &'a KppEvaluator,
    seeds: &'a SeedReader,
    writer: &'a CorpusWriter,
    slots: &'a AtomicU64,
    progress: &'a ProgressBar,
    target: u64,
    config: &'a GenerateConfig,
}

impl<E: LearnEngine> GenContext<'_, E> {
    fn run_worker<R: Rng>(&self, rng: &mut R) -> LearnResult<WorkerStats> {
        let codec = self.engine.codec();
        let mut oracle = self.engine.new_oracle();
        let mut stats = WorkerStats::default();

        while self.slots.load(Ordering::Relaxed) < self.target {
            let Some((index, bytes)) = self.seeds.read_random(rng)? else {
                break;
            };
            stats.games += 1;
            let mut pos = match codec.decode(&bytes) {
                Ok(pos) => pos,
                Err(e) => {
                    warn!("seed position #{index} cannot be decoded: {e}");
                    stats.discarded_games += 1;
                    continue;
                }
            };
            match self.play_game(&mut pos, &mut oracle, rng) {
                Ok(GameEnd::TargetReached) => break,
                Ok(GameEnd::Finished) => {}
                Err(GameError::Decode(e)) => {
                    debug!("game from seed #{index} discarded: {e}");
                    stats.discarded_games += 1;
                }
                Err(GameError::Io(e)) => return Err(e),
            }
        }
        Ok(stats)
    }

    fn play_game<R: Rng>(
        &self,
        pos: &mut E::Position,
        oracle: &mut E::Oracle,
        rng: &mut R,
    ) -> Result<GameEnd, GameError> {
        let codec = self.engine.codec();
        let cfg = self.config;
        random_move(pos, rng, cfg, codec)?;

        let mut random_rate = RandomMoveRate::new(cfg);
        let mut seen = HashSet::new();
        let mut ply = pos.game_ply();
        while ply < cfg.max_ply {
            if !pos.in_check() && random_rate.try_insert(rng.random::<f64>()) {
                random_move(pos, rng, cfg, codec)?;
                ply = 0;
            }
            if !seen.insert(pos.key()) {
                break;
            }

            let outcome = oracle.search(pos, cfg.search_depth, self.evaluator);
            let Some(best) = outcome.best_move() else {
                break;
            };
            let eval = teacher_eval(pos, oracle, &outcome, self.evaluator, cfg.decided_score);
            let record = TeacherRecord::new(codec.encode(pos), pos.move16(best), clamp_eval(eval));

            if self.slots.fetch_add(1, Ordering::Relaxed) >= self.target {
                return Ok(GameEnd::TargetReached);
            }
            self.writer.write(&record).map_err(GameError::Io)?;
            self.progress.inc(1);

            pos.do_move(best);
            ply += 1;
        }
        Ok(GameEnd::Finished)
    }
}

enum GameEnd {
    Finished,
    TargetReached,
}

enum GameError {
    /// この対局だけを捨てる
    Decode(DecodeError),
    /// ワーカーを止める
    Io(LearnError),
}

impl From<DecodeError> for GameError {
    fn from(e: DecodeError) -> Self {
        GameError::Decode(e)
    }
}

/// ランダム手を挿入する確率
///
/// 挿入するたびに `random_move_rate_decay` 倍になるので、1局の後半ほど崩されにくい。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomMoveRate {
    rate: f64,
    decay: f64,
}

impl RandomMoveRate {
    pub fn new(config: &GenerateConfig) -> Self {
        Self {
            rate: config.initial_random_move_rate,
            decay: config.random_move_rate_decay,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// `sample`（[0, 1) の一様乱数）が現在の確率以下なら挿入を決め、確率を減衰させる
    pub fn try_insert(&mut self, sample: f64) -> bool {
        if sample <= self.rate {
            self.rate *= self.decay;
            true
        } else {
            false
        }
    }
}

/// 探索結果から教師の評価値（root 手番から見た値）を決める
///
/// 勝敗がほぼ決まった値（`|score| > decided_score`）は探索値をそのまま使う。
/// それ以外は読み筋の末端を静止探索した値を使う。
pub fn teacher_eval<P, O>(
    pos: &mut P,
    oracle: &mut O,
    outcome: &SearchOutcome<P::Move>,
    evaluator: &KppEvaluator,
    decided_score: i32,
) -> i32
where
    P: LearnPosition,
    O: SearchOracle<P>,
{
    if outcome.score.abs() > decided_score {
        outcome.score
    } else {
        quiet_eval_after_pv(pos, oracle, &outcome.pv, evaluator)
    }
}

/// 読み筋を最後まで指した局面を静止探索し、root 手番から見た値を返す
fn quiet_eval_after_pv<P, O>(pos: &mut P, oracle: &mut O, pv: &[P::Move], evaluator: &KppEvaluator) -> i32
where
    P: LearnPosition,
    O: SearchOracle<P>,
{
    let root = pos.side_to_move();
    for &mv in pv {
        pos.do_move(mv);
    }
    let v = oracle.qsearch(pos, evaluator);
    let v = if pos.side_to_move() == root { v } else { -v };
    for &mv in pv.iter().rev() {
        pos.undo_move(mv);
    }
    v
}

/// 教師局面を増やすため、局面をランダムに動かす
///
/// `king_move_rate` の確率で玉を動かし（さらに `reply_rate` の確率で相手も1手指す）、
/// それ以外は任意の合法手を1〜2手指す。動かした場合は一度圧縮して復元し、
/// 指し手の履歴を持ち越さない。
pub fn random_move<P, C, R>(
    pos: &mut P,
    rng: &mut R,
    config: &GenerateConfig,
    codec: &C,
) -> Result<bool, DecodeError>
where
    P: LearnPosition,
    C: PositionCodec<P> + ?Sized,
    R: Rng + ?Sized,
{
    let moved = if rng.random_bool(config.king_move_rate) {
        let king_moves: Vec<P::Move> =
            pos.legal_moves().into_iter().filter(|&m| pos.is_king_move(m)).collect();
        match king_moves.choose(rng) {
            Some(&m) => {
                pos.do_move(m);
                if rng.random_bool(config.reply_rate) {
                    if let Some(&reply) = pos.legal_moves().choose(rng) {
                        pos.do_move(reply);
                    }
                }
                true
            }
            None => false,
        }
    } else {
        let mut moved = false;
        for _ in 0..rng.random_range(1..=2) {
            if let Some(&m) = pos.legal_moves().choose(rng) {
                pos.do_move(m);
                moved = true;
            }
        }
        moved
    };

    if moved {
        *pos = codec.decode(&codec.encode(pos))?;
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_move_rate_decays_on_each_insertion() {
        let config = GenerateConfig {
            initial_random_move_rate: 0.5,
            random_move_rate_decay: 0.5,
            ..GenerateConfig::default()
        };
        let mut rate = RandomMoveRate::new(&config);

        assert!(rate.try_insert(0.5));
        assert_eq!(rate.rate(), 0.25);
        // 外れた回は減衰しない
        assert!(!rate.try_insert(0.3));
        assert_eq!(rate.rate(), 0.25);
        assert!(rate.try_insert(0.0));
        assert!(rate.try_insert(0.0));
        assert_eq!(rate.rate(), 0.0625);
    }

    #[test]
    fn test_random_move_rate_without_decay() {
        let config = GenerateConfig {
            initial_random_move_rate: 1.0,
            random_move_rate_decay: 1.0,
            ..GenerateConfig::default()
        };
        let mut rate = RandomMoveRate::new(&config);
        for _ in 0..10 {
            assert!(rate.try_insert(0.999));
        }
        assert_eq!(rate.rate(), 1.0);
    }

    #[test]
    fn test_zero_rate_still_inserts_on_zero_sample() {
        let config = GenerateConfig {
            initial_random_move_rate: 0.0,
            ..GenerateConfig::default()
        };
        let mut rate = RandomMoveRate::new(&config);
        // 一様乱数は [0, 1) なので、0.0 ちょうどの時だけ挿入される
        assert!(rate.try_insert(0.0));
        assert!(!rate.try_insert(f64::MIN_POSITIVE));
    }
}
