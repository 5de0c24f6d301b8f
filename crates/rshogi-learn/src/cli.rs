//! コマンドライン
//!
//! エンジンのバイナリから `run_main(&engine)` を呼ぶだけで、次の3コマンドが使える。
//!
//! ```bash
//! # 教師局面を 1000 万局面生成（開始局面 roots.bin、8 スレッド）
//! learn make-teacher roots.bin teacher.bin 8 10000000
//!
//! # 教師局面で学習（評価関数は eval/ に読み書き）
//! learn --config learn.toml use-teacher teacher.bin 8 --eval-dir eval
//!
//! # 教師局面ファイルの検査
//! learn check-teacher teacher.bin 8
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;

use crate::checkpoint;
use crate::config::LearnConfig;
use crate::engine::LearnEngine;
use crate::error::LearnError;
use crate::evaluator::KppEvaluator;
use crate::features::FeatureIndexer;
use crate::teacher::generate_teacher_data;
use crate::trainer::train_from_teacher_data;
use crate::validate::validate_teacher_data;

#[derive(Parser, Debug)]
#[command(name = "learn", version, about = "教師局面の生成と KPPT 評価関数の学習")]
pub struct Cli {
    /// 設定ファイル（TOML）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// 自己対局で教師局面を生成する
    MakeTeacher {
        /// 開始局面ファイル（圧縮局面の連結）
        input: PathBuf,
        /// 出力する教師局面ファイル
        output: PathBuf,
        /// スレッド数
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        threads: u32,
        /// 生成する局面数
        count: u64,
        /// 探索に使う評価関数のディレクトリ
        #[arg(long)]
        eval_dir: Option<PathBuf>,
    },
    /// 教師局面で評価関数を学習する
    UseTeacher {
        /// 教師局面ファイル
        teacher: PathBuf,
        /// スレッド数
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        threads: u32,
        /// 評価関数の読み込み/書き出し先
        #[arg(long)]
        eval_dir: Option<PathBuf>,
    },
    /// 教師局面ファイルが壊れていないか検査する
    CheckTeacher {
        /// 教師局面ファイル
        teacher: PathBuf,
        /// スレッド数
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        threads: u32,
    },
}

/// ログ出力を初期化する（`RUST_LOG` 未指定時は info）
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init();
}

/// 引数を解析してコマンドを実行し、終了コードを返す
pub fn run_main<E: LearnEngine>(engine: &E) -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match run(engine, cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            e.downcast_ref::<LearnError>().map(LearnError::exit_code).unwrap_or(ExitCode::FAILURE)
        }
    }
}

/// 解析済みの引数でコマンドを実行する
pub fn run<E: LearnEngine>(engine: &E, cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => LearnConfig::load(path)
            .with_context(|| format!("設定ファイルを読み込めません: {}", path.display()))?,
        None => LearnConfig::default(),
    };

    match cli.cmd {
        Cmd::MakeTeacher {
            input,
            output,
            threads,
            count,
            eval_dir,
        } => {
            if let Some(dir) = eval_dir {
                config.train.eval_dir = dir;
            }
            let layout = engine.feature_layout();
            let tables = checkpoint::load_or_zeros(&config.train.eval_dir, &layout)?;
            let evaluator = KppEvaluator::new(
                Arc::new(FeatureIndexer::new(layout)),
                Arc::new(tables),
                config.train.fv_scale,
            );
            generate_teacher_data(
                engine,
                &evaluator,
                &input,
                &output,
                threads as usize,
                count,
                &config.generate,
            )?;
        }
        Cmd::UseTeacher {
            teacher,
            threads,
            eval_dir,
        } => {
            if let Some(dir) = eval_dir {
                config.train.eval_dir = dir;
            }
            train_from_teacher_data(engine, &teacher, threads as usize, config.train)?;
        }
        Cmd::CheckTeacher { teacher, threads } => {
            validate_teacher_data(engine, &teacher, threads as usize)?;
        }
    }
    Ok(())
}
