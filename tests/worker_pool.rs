//! Completion barrier of the worker pool.

use convoscribe::pool::{TaskError, WorkerPool};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn wait_completion_returns_after_every_task(tasks in 0usize..64, workers in 1usize..8) {
        let pool: WorkerPool<usize> = WorkerPool::new(workers);
        let seen = Arc::new(Mutex::new(BTreeMap::new()));
        for key in 0..tasks {
            let seen = Arc::clone(&seen);
            pool.add_task(
                move |&key: &usize| {
                    seen.lock().unwrap().insert(key, key * 2);
                    Ok(())
                },
                key,
            )
            .unwrap();
        }

        pool.wait_completion();

        let seen = seen.lock().unwrap();
        prop_assert_eq!(seen.len(), tasks);
        prop_assert_eq!(pool.pending(), 0);
        prop_assert!(seen.iter().all(|(k, v)| *v == k * 2));
    }

    #[test]
    fn map_slots_keeps_input_order(inputs in prop::collection::vec(0u32..1000, 0..48)) {
        let pool: WorkerPool<usize> = WorkerPool::new(3);
        let results = pool.map_slots(inputs.clone(), |n: u32| Ok(n + 1)).unwrap();
        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        prop_assert_eq!(values, inputs.iter().map(|n| n + 1).collect::<Vec<_>>());
    }
}

#[test]
fn failing_and_panicking_tasks_do_not_stop_the_pool() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let handler_failures = Arc::clone(&failures);
    let pool: WorkerPool<usize> = WorkerPool::new(2).with_task_error_handler(move |&arg, error| {
        handler_failures.lock().unwrap().push((arg, error.to_string()));
    });

    let results = pool
        .map_slots(vec![1, 2, 3, 4], |n: u32| {
            if n == 2 {
                anyhow::bail!("two is rejected");
            }
            if n == 3 {
                panic!("three blew up");
            }
            Ok(n * 10)
        })
        .unwrap();

    assert_eq!(results[0].as_ref().ok(), Some(&10));
    assert!(matches!(&results[1], Err(TaskError::Failed(m)) if m.contains("two is rejected")));
    assert!(matches!(&results[2], Err(TaskError::Panicked(_))));
    assert_eq!(results[3].as_ref().ok(), Some(&40));

    let mut failures = failures.lock().unwrap().clone();
    failures.sort();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].0, 1);
    assert_eq!(failures[1].0, 2);
    assert!(failures[1].1.contains("three blew up"));
}

#[test]
fn pool_end_handler_runs_once_per_barrier() {
    let ends = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&ends);
    let pool: WorkerPool<usize> =
        WorkerPool::new(2).with_pool_end_handler(move || *counter.lock().unwrap() += 1);

    pool.wait_completion();
    pool.add_task(|_| Ok(()), 0).unwrap();
    pool.wait_completion();

    assert_eq!(*ends.lock().unwrap(), 2);
}

#[test]
fn shut_down_pool_rejects_tasks() {
    let mut pool: WorkerPool<usize> = WorkerPool::new(1);
    pool.wait_completion();
    pool.shutdown();
    assert!(pool.add_task(|_| Ok(()), 0).is_err());
}
