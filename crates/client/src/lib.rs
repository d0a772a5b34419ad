//! 客户端侧订阅适配器。
//!
//! 不含网络代码：重连退避的节奏计算，以及按消息 id 归并服务端
//! 广播与本地乐观回显的状态归约器。UI 层拿这两块即可驱动聊天视图。

mod backoff;
mod feed;

pub use backoff::Backoff;
pub use feed::{ChatFeed, PendingMessage};
