//! 可注入的时间能力：周期节拍器工厂与阻塞睡眠。
//!
//! # 模块定位（Why）
//! - 生产代码若直接调用系统节拍器/睡眠原语，测试只能真实等待；把“创建节拍器”与“睡眠”抽象为 trait，
//!   生产环境注入 [`SystemTickers`]/[`SystemSleeper`]，测试注入
//!   [`FakeTickers`](crate::FakeTickers)/[`FakeSleeper`](crate::FakeSleeper) 即可接管时间；
//! - 两个 trait 相互独立，允许只替换其中之一。
//!
//! # 使用指引（How）
//! - 业务代码持有 `Arc<dyn TickerFactory>` / `Arc<dyn Sleeper>`，在需要时调用 `new_ticker`/`sleep`；
//! - [`Ticker`] 暴露底层 `crossbeam` 接收端，既可阻塞 `recv`，也可配合 `crossbeam::select!` 使用。

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};

/// 抽象可注入的周期节拍器工厂。
///
/// # 接口约束（What）
/// - `new_ticker`：返回一个按 `period` 周期（或由测试控制）投递时间戳的 [`Ticker`]；
/// - 实现者必须是 `Send + Sync + 'static`，以便通过 `Arc<dyn TickerFactory>` 在后台线程间共享。
pub trait TickerFactory: Send + Sync + 'static {
    /// 创建新的周期节拍器。
    fn new_ticker(&self, period: Duration) -> Ticker;
}

/// 抽象可注入的阻塞睡眠能力。
pub trait Sleeper: Send + Sync + 'static {
    /// 阻塞当前线程至少 `duration`（测试替身可以立即返回）。
    fn sleep(&self, duration: Duration);
}

/// 基于 `crossbeam::channel::tick` 的真实节拍器工厂。
#[derive(Clone, Debug, Default)]
pub struct SystemTickers;

impl TickerFactory for SystemTickers {
    fn new_ticker(&self, period: Duration) -> Ticker {
        Ticker::from_receiver(channel::tick(period), period)
    }
}

/// 委托给 [`std::thread::sleep`] 的真实睡眠实现。
#[derive(Clone, Debug, Default)]
pub struct SystemSleeper;

impl Sleeper for SystemSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 周期节拍器句柄：生产代码从中读取时间戳事件。
///
/// # 教案式说明
/// - **意图 (Why)**：统一真实节拍器与被拦截节拍器的读取方式，生产代码无需知道自己拿到的是哪一种；
/// - **契约 (What)**：
///   - `recv` 返回 `None` 表示通道已关闭（假节拍器控制器停用后会出现），读者应退出循环；
///   - 被拦截的节拍器只由控制器写入，`period` 仅作记录，不驱动投递；
/// - **实现 (How)**：内部持有 `Receiver<Instant>`，真实节拍器来自 `crossbeam::channel::tick`，
///   被拦截的节拍器来自零容量的会合通道。
pub struct Ticker {
    receiver: Receiver<Instant>,
    period: Duration,
    origin: TickerOrigin,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum TickerOrigin {
    External,
    Intercepted { id: u64, tag: String },
}

impl Ticker {
    /// 以任意接收端构造节拍器，便于自定义 [`TickerFactory`] 实现。
    pub fn from_receiver(receiver: Receiver<Instant>, period: Duration) -> Self {
        Self {
            receiver,
            period,
            origin: TickerOrigin::External,
        }
    }

    pub(crate) fn intercepted(
        receiver: Receiver<Instant>,
        period: Duration,
        id: u64,
        tag: String,
    ) -> Self {
        Self {
            receiver,
            period,
            origin: TickerOrigin::Intercepted { id, tag },
        }
    }

    /// 阻塞等待下一次节拍；通道关闭时返回 `None`。
    pub fn recv(&self) -> Option<Instant> {
        self.receiver.recv().ok()
    }

    /// 非阻塞地尝试读取一次节拍。
    pub fn try_recv(&self) -> Result<Instant, TryRecvError> {
        self.receiver.try_recv()
    }

    /// 最多等待 `timeout` 读取一次节拍。
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Instant, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// 暴露底层接收端，供 `crossbeam::select!` 组合使用。
    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.receiver
    }

    /// 创建时请求的周期。
    pub fn period(&self) -> Duration {
        self.period
    }

    /// 被拦截节拍器在创建瞬间盖上的标签；真实节拍器返回 `None`。
    pub fn tag(&self) -> Option<&str> {
        match &self.origin {
            TickerOrigin::External => None,
            TickerOrigin::Intercepted { tag, .. } => Some(tag.as_str()),
        }
    }

    /// 是否由假节拍器控制器创建。
    pub fn is_intercepted(&self) -> bool {
        matches!(self.origin, TickerOrigin::Intercepted { .. })
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Ticker");
        debug.field("period", &self.period);
        match &self.origin {
            TickerOrigin::External => debug.field("intercepted", &false),
            TickerOrigin::Intercepted { id, tag } => debug.field("id", id).field("tag", tag),
        };
        debug.finish()
    }
}
