//! Ports - 抽象化レイヤー
//!
//! 外部システム（バックエンド HTTP、時刻、ログ）へのインターフェースを定義し、
//! app 層から実装の詳細を隠蔽します。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::transport::{HttpRequest, HttpResponse, Method, Transport};
