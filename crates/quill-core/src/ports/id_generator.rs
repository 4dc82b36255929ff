//! IdGenerator port - RunId 生成の抽象化
//!
//! task_id はバックエンドが払い出しますが、submit 前（task_id が無い段階）の
//! イベントを相関させるために、クライアント側で RunId を生成します。

use crate::domain::RunId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は RunId を生成
pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に FixedClock を使えば timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        RunId::from_ulid(ulid)
    }
}
