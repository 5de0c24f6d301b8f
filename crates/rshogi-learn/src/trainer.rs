//! 教師局面による評価関数の学習ループ
//!
//! 1イテレーションの流れ:
//!
//! 1. 残りの教師局面が1イテレーション分に満たなければ終了
//! 2. ワーカーが教師局面を読み、静止探索の末端局面で勾配をスレッドごとに蓄積
//! 3. 全ワーカーの終了を待って勾配を集約（逐次）
//! 4. AdaGrad で更新し、移動平均を取る
//! 5. 一定間隔でチェックポイントを書き出し、探索用の整数テーブルを差し替える
//!
//! 終了時には必ずチェックポイントを書き出す。

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use indicatif::ProgressBar;
use log::{debug, info};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::checkpoint::{self, CheckpointFlavor};
use crate::config::{ReadOrder, TrainConfig};
use crate::corpus::CorpusReader;
use crate::engine::{LearnEngine, LearnPosition, PositionCodec, SearchOracle};
use crate::error::{LearnError, LearnResult};
use crate::evaluator::KppEvaluator;
use crate::features::FeatureIndexer;
use crate::gradient::{SparseGradient, descent_direction, winning_rate_loss, winning_rate_loss_derivative};
use crate::leaf::{LeafLimits, with_quiet_leaf};
use crate::optimizer::AdaGrad;
use crate::params::{EvalTables, LearnTables};
use crate::progress::progress_bar;
use crate::record::TeacherRecord;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// 1イテレーションの結果
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: u64,
    /// 読み込んだ教師局面数
    pub records: u64,
    /// 教師の手を再現できずに捨てた局面数
    pub skipped: u64,
    /// 勝率の二乗誤差の和
    pub loss_sum: f64,
    /// 最大更新量
    pub max_step: f64,
    pub elapsed: Duration,
}

/// 学習全体の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    pub iterations: u64,
    pub records: u64,
    pub skipped: u64,
    /// 最後のイテレーションの損失の和
    pub last_loss_sum: Option<f64>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WorkerOutcome {
    used: u64,
    skipped: u64,
    loss_sum: f64,
}

/// 学習器
///
/// パラメータ・二乗和・移動平均・勾配のテーブルをすべて所有し、
/// イテレーション中はワーカーに読み取り専用で貸し出す。
pub struct Trainer<'a, E: LearnEngine> {
    engine: &'a E,
    corpus: CorpusReader,
    config: TrainConfig,
    optimizer: AdaGrad,
    limits: LeafLimits,
    /// 学習中の生パラメータ
    params: LearnTables,
    /// 生パラメータの移動平均（配布用）
    averaged: LearnTables,
    /// 勾配の二乗和（イテレーションをまたいで保持）
    mean_square: LearnTables,
    /// 集約した勾配（イテレーションごとに 0 に戻す）
    gradient: LearnTables,
    /// 探索で使う評価関数（`params` を丸めたもの）
    live: KppEvaluator,
    oracles: Vec<E::Oracle>,
    buffers: Vec<SparseGradient>,
    iteration: u64,
    consumed: u64,
    base_seed: u64,
    started: Instant,
    progress: ProgressBar,
}

impl<'a, E: LearnEngine> Trainer<'a, E> {
    /// 教師ファイルと評価関数を開く
    ///
    /// `eval_dir` に評価関数があれば読み込み、無ければ 0 から始める。
    pub fn new(engine: &'a E, teacher: &Path, threads: usize, config: TrainConfig) -> LearnResult<Self> {
        if threads == 0 {
            return Err(LearnError::Config("thread count must be >= 1".into()));
        }
        config.validate()?;
        let corpus = CorpusReader::open(teacher, engine.codec().packed_size())?;
        checkpoint::ensure_writable(&config.eval_dir)?;

        let layout = engine.feature_layout();
        let loaded = checkpoint::load_or_zeros(&config.eval_dir, &layout)?;
        let params = LearnTables::widen_from(&loaded);
        let averaged = params.clone();
        let live = KppEvaluator::new(
            Arc::new(FeatureIndexer::new(layout)),
            Arc::new(loaded),
            config.fv_scale,
        );

        Ok(Self {
            engine,
            progress: progress_bar(corpus.len(), PROGRESS_INTERVAL),
            corpus,
            optimizer: AdaGrad::new(config.update_param, config.epsilon),
            limits: LeafLimits {
                max_ply: config.leaf_max_ply,
                repetition_window: config.repetition_window,
                min_ply_before_draw: config.min_ply_before_draw,
            },
            params,
            averaged,
            mean_square: LearnTables::zeros(&layout),
            gradient: LearnTables::zeros(&layout),
            live,
            oracles: (0..threads).map(|_| engine.new_oracle()).collect(),
            buffers: (0..threads).map(|_| SparseGradient::new()).collect(),
            iteration: 0,
            consumed: 0,
            base_seed: config.seed.unwrap_or_else(clock_seed),
            started: Instant::now(),
            config,
        })
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// 学習中の生パラメータ
    pub fn params(&self) -> &LearnTables {
        &self.params
    }

    /// 移動平均を取ったパラメータ
    pub fn averaged(&self) -> &LearnTables {
        &self.averaged
    }

    /// 現在探索で使っている評価関数
    pub fn live_evaluator(&self) -> &KppEvaluator {
        &self.live
    }

    /// まだ学習に使っていない教師局面数
    pub fn remaining(&self) -> u64 {
        self.corpus.len() - self.consumed
    }

    /// 教師局面を使い切るまで学習する
    pub fn run(&mut self) -> LearnResult<TrainReport> {
        info!(
            "学習開始: teacher={} ({} records), threads={}, nodes/iteration={}",
            self.corpus.path().display(),
            self.corpus.len(),
            self.oracles.len(),
            self.config.nodes_per_iteration
        );

        let mut report = TrainReport::default();
        while let Some(it) = self.step()? {
            report.iterations += 1;
            report.records += it.records;
            report.skipped += it.skipped;
            report.last_loss_sum = Some(it.loss_sum);
        }
        self.write_checkpoint()?;
        self.progress.finish_with_message("done");
        report.elapsed = self.started.elapsed();
        info!(
            "学習終了: {} iterations, {} records ({} skipped), {}[s]",
            report.iterations,
            report.records,
            report.skipped,
            report.elapsed.as_secs()
        );
        Ok(report)
    }

    /// 1イテレーション進める。教師局面が足りなければ何もせず None。
    pub fn step(&mut self) -> LearnResult<Option<IterationReport>> {
        let n = self.config.nodes_per_iteration;
        if self.remaining() < n {
            debug!("remaining {} < {n}, stop", self.remaining());
            return Ok(None);
        }
        let started = Instant::now();
        let total = self.corpus.len();
        info!(
            "iteration: {}, nodes: {}/{} ({:.2}%)",
            self.iteration,
            self.consumed,
            total,
            self.consumed as f64 * 100.0 / total as f64
        );

        let outcome = self.accumulate(n)?;
        self.consumed += n;
        self.progress.inc(n);
        self.progress.set_message(format!("loss {:.6}", outcome.loss_sum));

        self.gradient.clear();
        for buf in &mut self.buffers {
            buf.merge_into(&mut self.gradient);
            buf.clear();
        }
        let max_step = self.optimizer.step(&mut self.params, &mut self.mean_square, &self.gradient);
        self.averaged.average_toward(&self.params, self.config.average_decay);
        if self.iteration < self.config.frozen_iterations {
            // 移動平均にだけ反映する
            self.params.clear();
        }
        if self.iteration % self.config.checkpoint_interval == 0 {
            self.write_checkpoint()?;
        }
        self.live = self.live.with_tables(Arc::new(EvalTables::round_from(&self.params)));

        let report = IterationReport {
            iteration: self.iteration,
            records: outcome.used + outcome.skipped,
            skipped: outcome.skipped,
            loss_sum: outcome.loss_sum,
            max_step,
            elapsed: started.elapsed(),
        };
        let eta = self.progress.eta().as_secs();
        info!(
            "iteration elapsed: {:.1}[s], loss: {:.6}, max update step: {:.2}, skipped: {}, ETA: {}[s]",
            report.elapsed.as_secs_f64(),
            report.loss_sum,
            report.max_step,
            report.skipped,
            eta
        );
        self.iteration += 1;
        Ok(Some(report))
    }

    /// 配布用（移動平均）と、設定があれば移動平均前の評価関数を書き出す
    pub fn write_checkpoint(&self) -> LearnResult<()> {
        let dir = &self.config.eval_dir;
        info!("write eval ... {}", dir.display());
        checkpoint::save(dir, &EvalTables::round_from(&self.averaged), CheckpointFlavor::Averaged)?;
        if self.config.write_synthesized {
            checkpoint::save(dir, &EvalTables::round_from(&self.params), CheckpointFlavor::Synthesized)?;
        }
        Ok(())
    }

    /// ワーカーを起動して勾配をスレッドごとのバッファに蓄積する
    fn accumulate(&mut self, n: u64) -> LearnResult<WorkerOutcome> {
        let claimed = AtomicU64::new(0);
        let ctx = WorkerContext {
            engine: self.engine,
            corpus: &self.corpus,
            live: &self.live,
            config: &self.config,
            limits: &self.limits,
            claimed: &claimed,
            quota: n,
        };
        let seed = self.base_seed.wrapping_add(self.iteration.wrapping_mul(self.oracles.len() as u64));

        let results: Vec<std::thread::Result<LearnResult<WorkerOutcome>>> = std::thread::scope(|s| {
            let handles: Vec<_> = self
                .oracles
                .iter_mut()
                .zip(self.buffers.iter_mut())
                .enumerate()
                .map(|(id, (oracle, buffer))| {
                    let ctx = &ctx;
                    s.spawn(move || {
                        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(id as u64));
                        ctx.run(oracle, buffer, &mut rng)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut total = WorkerOutcome::default();
        for r in results {
            let outcome = r.map_err(|_| LearnError::WorkerPanicked)??;
            total.used += outcome.used;
            total.skipped += outcome.skipped;
            total.loss_sum += outcome.loss_sum;
        }
        Ok(total)
    }
}

/// 教師ファイルから学習する
pub fn train_from_teacher_data<E: LearnEngine>(
    engine: &E,
    teacher: &Path,
    threads: usize,
    config: TrainConfig,
) -> LearnResult<TrainReport> {
    Trainer::new(engine, teacher, threads, config)?.run()
}

fn clock_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

struct WorkerContext<'a, E: LearnEngine> {
    engine: &'a E,
    corpus: &'a CorpusReader,
    live: &'a KppEvaluator,
    config: &'a TrainConfig,
    limits: &'a LeafLimits,
    claimed: &'a AtomicU64,
    quota: u64,
}

impl<E: LearnEngine> WorkerContext<'_, E> {
    fn run(
        &self,
        oracle: &mut E::Oracle,
        buffer: &mut SparseGradient,
        rng: &mut Xoshiro256PlusPlus,
    ) -> LearnResult<WorkerOutcome> {
        // 評価関数が変わったので前のイテレーションの置換表は使えない
        oracle.clear();
        let mut out = WorkerOutcome::default();
        while self.claimed.fetch_add(1, Ordering::Relaxed) < self.quota {
            let next = match self.config.read_order {
                ReadOrder::Sequential => self.corpus.read_sequential()?,
                ReadOrder::Random => self.corpus.read_random(rng)?,
            };
            let Some((index, record)) = next else { break };
            if self.learn_record(index, &record, oracle, buffer, &mut out.loss_sum)? {
                out.used += 1;
            } else {
                out.skipped += 1;
            }
        }
        Ok(out)
    }

    /// 1局面分の勾配を蓄積する。教師の手を再現できなければ false。
    fn learn_record(
        &self,
        index: u64,
        record: &TeacherRecord,
        oracle: &mut E::Oracle,
        buffer: &mut SparseGradient,
        loss_sum: &mut f64,
    ) -> LearnResult<bool> {
        let mut pos = self
            .engine
            .codec()
            .decode(&record.packed)
            .map_err(|reason| LearnError::CorruptRecord { index, reason })?;
        let root = pos.side_to_move();
        let live = self.live;

        let leaf = with_quiet_leaf(&mut pos, oracle, live, record.move16, self.limits, |leaf| {
            let features = live.indexer().active_features(leaf);
            let eval = live.evaluate_features(leaf, &features);
            (features, eval, leaf.side_to_move())
        });
        let Some((features, leaf_eval, leaf_color)) = leaf else {
            return Ok(false);
        };

        // 教師の評価値は root 手番から見た値
        let eval = (if root == leaf_color { leaf_eval } else { -leaf_eval }) as f64;
        let teacher = record.eval as f64;
        let scale = self.config.sigmoid_scale;
        *loss_sum += winning_rate_loss(eval, teacher, scale);
        let derivative = winning_rate_loss_derivative(eval, teacher, scale);
        let g = descent_direction(derivative, root, leaf_color, self.config.fv_scale);
        buffer.add_features(&features, &g);
        Ok(true)
    }
}
