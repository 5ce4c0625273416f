//! 测试共享的“生产代码”替身。

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use spark_faketickers::TickerFactory;

/// 断言“最终会发生”的等待上限。
pub const EVENTUALLY: Duration = Duration::from_secs(5);

/// 断言“一段时间内不会发生”的观察窗口。
pub const CONSISTENTLY: Duration = Duration::from_millis(100);

/// 生产节拍器的真实周期：一小时，测试中永远不应真的等到。
pub const PRODUCTION_PERIOD: Duration = Duration::from_secs(3600);

/// 模拟生产后台循环的第一步：创建节拍器并阻塞读取一次。
///
/// 返回的通道上会收到 `true`（收到节拍）或 `false`（通道已关闭）。
pub fn spawn_ticking_routine(factory: Arc<dyn TickerFactory>) -> (Receiver<bool>, JoinHandle<()>) {
    let (done_tx, done_rx) = channel::bounded(1);
    let handle = thread::spawn(move || {
        let ticker = factory.new_ticker(PRODUCTION_PERIOD);
        let ticked = ticker.recv().is_some();
        done_tx.send(ticked).expect("test side keeps the receiver alive");
    });
    (done_rx, handle)
}
