//! 進捗バー
//!
//! 教師局面の生成・検査・学習で共通の表示。件数・速度・経過時間・残り時間を出す。

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({per_sec}, ETA {eta}) {msg}";

/// `total` 件の進捗バー。ワーカーからは `inc(1)` で進める。
///
/// `interval` ごとに再描画するので、処理が止まって見えても経過時間は更新される。
pub fn progress_bar(total: u64, interval: Duration) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(ProgressStyle::default_bar().template(TEMPLATE).expect("valid template"));
    bar.enable_steady_tick(interval);
    bar
}
