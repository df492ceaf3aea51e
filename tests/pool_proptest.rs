//! 随机借还序列下，借出数量不超过 max_connections

mod common;

use std::time::Duration;

use proptest::prelude::*;
use rat_quickpool::{ConnectionPool, QuickPoolError};

use common::{FakeManager, pool_config};

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    /// 归还第 n 个（取模）借出的连接
    Release(usize),
    HealthCheck,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Acquire),
        3 => (0usize..16).prop_map(Op::Release),
        1 => Just(Op::HealthCheck),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn loans_never_exceed_max_connections(
        max in 1u32..5,
        min_seed in 0u32..5,
        ops in proptest::collection::vec(op_strategy(), 1..48),
    ) {
        let min = min_seed % (max + 1);
        tokio_test::block_on(async move {
            let pool = ConnectionPool::new(FakeManager::new(), pool_config(min, max))
                .await
                .unwrap();
            let mut held = Vec::new();

            for op in ops {
                match op {
                    Op::Acquire => match pool.acquire_timeout(Duration::from_millis(2)).await {
                        Ok(conn) => held.push(conn),
                        Err(QuickPoolError::PoolExhausted { .. }) => {
                            assert_eq!(held.len() as u32, max);
                        }
                        Err(e) => panic!("意外错误: {}", e),
                    },
                    Op::Release(n) => {
                        if !held.is_empty() {
                            let conn = held.swap_remove(n % held.len());
                            pool.release(conn).unwrap();
                        }
                    }
                    Op::HealthCheck => {
                        pool.run_health_check().await;
                    }
                }

                let status = pool.status();
                assert!(status.active <= max);
                assert!(status.total <= max);
                assert_eq!(status.active as usize, held.len());

                // 同一连接不会同时借给两个调用者
                let mut ids: Vec<_> = held.iter().map(|c| c.id()).collect();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), held.len());
            }

            drop(held);
            pool.shutdown().await;
            assert_eq!(pool.status().total, 0);
        });
    }
}
