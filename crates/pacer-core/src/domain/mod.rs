//! Domain - インスタンス識別子
//!
//! 名前（name）はレジストリ上の「枠」、ID はその枠に入った 1 つのインスタンスを指す。

pub mod ids;

pub use self::ids::{Id, IdMarker, ProcessId, QueueId};
