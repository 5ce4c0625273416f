pub mod immediate_mode {
    //! 立即模式：无需派发即可持续收到节拍，停用时灌注线程全部收敛。

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use spark_faketickers::{FakeTickerOptions, FakeTickers, TickerFactory};

    use crate::support::{EVENTUALLY, PRODUCTION_PERIOD, spawn_ticking_routine};

    fn immediate() -> Arc<FakeTickers> {
        Arc::new(FakeTickers::started(
            FakeTickerOptions::new().with_immediate(true),
        ))
    }

    #[test]
    fn ticks_without_dispatch() {
        let fake = immediate();
        assert!(fake.is_immediate());
        let (done, worker) = spawn_ticking_routine(fake.clone());

        assert_eq!(done.recv_timeout(EVENTUALLY), Ok(true), "立即模式应自行投递节拍");
        worker.join().expect("worker");
        fake.deactivate().expect("deactivate");
    }

    /// 读者持续消费时停用：灌注线程退出后通道关闭，读者循环以 `None` 结束。
    #[test]
    fn shutdown_converges_while_reader_drains() {
        let fake = immediate();
        let factory: Arc<dyn TickerFactory> = fake.clone();
        let reader = thread::spawn(move || {
            let ticker = factory.new_ticker(PRODUCTION_PERIOD);
            let mut received: u64 = 0;
            while ticker.recv().is_some() {
                received += 1;
            }
            received
        });

        fake.wait_for_count(1, Some(EVENTUALLY)).expect("ticker created");
        thread::sleep(Duration::from_millis(20));
        fake.deactivate().expect("deactivate");

        let received = reader.join().expect("reader");
        assert!(received > 0, "停用前读者应已收到节拍");
    }

    /// 读者提前丢弃节拍器时，灌注线程因发送失败退出，停用不会卡住。
    #[test]
    fn dropped_reader_does_not_block_shutdown() {
        let fake = immediate();
        for _ in 0..4 {
            drop(fake.new_ticker(PRODUCTION_PERIOD));
        }
        let _kept = fake.new_ticker(PRODUCTION_PERIOD);
        assert_eq!(fake.ticker_count(), 5);
        fake.deactivate().expect("deactivate");
    }
}
