pub mod lifecycle {
    //! 停用协议：关闭全部通道、恢复真实工厂，并把误用收敛为显式错误。

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use spark_faketickers::{FakeTickerOptions, FakeTickers, FakeTickersError, TickerFactory};

    use crate::support::{EVENTUALLY, PRODUCTION_PERIOD, spawn_ticking_routine};

    /// 未派发即停用：阻塞的读者观察到通道关闭而不是永久挂起。
    #[test]
    fn deactivate_closes_blocked_readers() {
        let fake = Arc::new(FakeTickers::started(FakeTickerOptions::new()));
        let (done, worker) = spawn_ticking_routine(fake.clone());

        fake.wait_for_count(1, Some(EVENTUALLY)).expect("ticker created");
        fake.deactivate().expect("deactivate");

        assert_eq!(done.recv_timeout(EVENTUALLY), Ok(false), "读者应观察到通道关闭");
        worker.join().expect("worker");
        assert_eq!(fake.ticker_count(), 0);
    }

    /// 停用后创建的节拍器与真实节拍器无异，且不进入登记表。
    #[test]
    fn deactivate_restores_real_tickers() {
        let fake = FakeTickers::started(FakeTickerOptions::new());
        let _intercepted = fake.new_ticker(PRODUCTION_PERIOD);
        fake.deactivate().expect("deactivate");

        let live = fake.new_ticker(Duration::from_millis(10));
        assert!(!live.is_intercepted());
        assert!(
            live.recv_timeout(EVENTUALLY).is_ok(),
            "恢复后的节拍器应按周期自行投递"
        );
        assert_eq!(fake.ticker_count(), 0);
        assert!(fake.tick().is_err(), "停用后派发属于误用");
    }

    /// 激活前创建的节拍器不受派发影响。
    #[test]
    fn tickers_created_before_activation_are_untouched() {
        let fake = FakeTickers::new();
        let before = fake.new_ticker(PRODUCTION_PERIOD);
        fake.activate().expect("activate");

        assert_eq!(fake.tick(), Ok(0));
        assert!(before.try_recv().is_err());
        assert!(!before.is_intercepted());
        fake.deactivate().expect("deactivate");
    }

    /// 无限等待的屏障会被停用唤醒并得到 `NotActive`。
    #[test]
    fn deactivate_releases_waiters() {
        let fake = Arc::new(FakeTickers::started(FakeTickerOptions::new()));
        let waiter = {
            let fake = Arc::clone(&fake);
            thread::spawn(move || fake.wait_for_count(1, None))
        };

        thread::sleep(Duration::from_millis(50));
        fake.deactivate().expect("deactivate");
        assert_eq!(
            waiter.join().expect("waiter"),
            Err(FakeTickersError::NotActive {
                operation: "wait_for_count"
            })
        );
    }

    /// 停用后立即重新激活：等待者仍须得到 `NotActive`，而不是继续等待新的空登记表。
    #[test]
    fn reactivation_does_not_hide_deactivation_from_waiters() {
        let fake = Arc::new(FakeTickers::started(FakeTickerOptions::new()));
        let waiter = {
            let fake = Arc::clone(&fake);
            thread::spawn(move || fake.wait_for_count(1, Some(Duration::from_millis(500))))
        };

        thread::sleep(Duration::from_millis(50));
        fake.deactivate().expect("deactivate");
        fake.activate().expect("activate again");

        assert_eq!(
            waiter.join().expect("waiter"),
            Err(FakeTickersError::NotActive {
                operation: "wait_for_count"
            }),
            "跨越停用的等待必须报告 NotActive"
        );
        fake.deactivate().expect("deactivate");
    }

    /// 控制器释放时自动执行停用协议。
    #[test]
    fn dropping_active_controller_closes_channels() {
        let fake = Arc::new(FakeTickers::started(FakeTickerOptions::new()));
        let factory: Arc<dyn TickerFactory> = fake.clone();
        let worker = thread::spawn(move || {
            let ticker = factory.new_ticker(PRODUCTION_PERIOD);
            drop(factory);
            ticker.recv()
        });

        fake.wait_for_count(1, Some(EVENTUALLY)).expect("ticker created");
        drop(fake);
        assert_eq!(worker.join().expect("worker"), None);
    }

    #[test]
    fn activation_cycles_are_independent() {
        let fake = Arc::new(FakeTickers::new());
        for cycle in 0..3 {
            fake.activate().expect("activate");
            let (done, worker) = spawn_ticking_routine(fake.clone());
            fake.wait_for_count(1, Some(EVENTUALLY)).expect("ticker created");
            assert_eq!(fake.ticker_count(), 1, "cycle {cycle} 应从空登记表开始");
            fake.deactivate().expect("deactivate");
            assert_eq!(done.recv_timeout(EVENTUALLY), Ok(false));
            worker.join().expect("worker");
        }
    }
}
