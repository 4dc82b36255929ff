//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてタスクのオーケストレーションを実装します。
//!
//! # 主要コンポーネント
//! - **TaskClient**: 投入と状態取得（リトライなし）
//! - **PollLoop**: 1タスクを終端状態まで追跡
//! - **StyleResolver**: ボードの注釈スタイルを投入パラメータへ反映
//! - **ResultReconciler**: 完了結果をドキュメントツリーへ反映
//! - **DocumentStore**: copy-on-write のドキュメントツリー
//! - **ConcurrentStatusMonitor**: ボード単位の実行中タスク一覧
//! - **WindowSaver**: バックオフ付きのウィンドウ保存
//! - **Orchestrator**: 上記を UI 操作1回分として組み立てる

pub mod client;
pub mod monitor;
pub mod orchestrator;
pub mod poll_loop;
pub mod reconciler;
pub mod retry;
pub mod store;
pub mod style;

// 主要な型を再エクスポート
pub use self::client::TaskClient;
pub use self::monitor::{ConcurrentStatusMonitor, progress_percent, render};
pub use self::orchestrator::Orchestrator;
pub use self::poll_loop::PollLoop;
pub use self::reconciler::{ReconcileOutcome, ResultReconciler};
pub use self::retry::{RetryPolicy, WindowSaver, retry_with_backoff};
pub use self::store::DocumentStore;
pub use self::style::{AnnotationStyle, StyleResolver};
