//! Ports - 時間の抽象化レイヤー
//!
//! 各コンポーネント（debounce / throttle / queue / process / wait）は
//! 時刻とタイマーにこの trait 経由でしかアクセスしません。
//! 本番では tokio のタイマー、テストでは仮想時計の上で同じコードが動きます。
//!
//! # 設計原則
//! - Clock: 現在時刻の読み取りだけ
//! - Scheduler: Clock + 遅延実行とキャンセル
//! - 実装は `impls` に置く（TokioScheduler / ManualScheduler）

pub mod clock;
pub mod scheduler;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::scheduler::{Scheduler, TimerHandle, TimerTask};
