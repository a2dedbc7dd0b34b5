//! Structured fan-out over tokio tasks.

use std::future::Future;

use tokio::task::{JoinError, JoinSet};

/// Runs every future on its own task and waits for all of them.
///
/// Results come back in the order the futures were given, regardless of
/// completion order. If any task fails, the first failure observed is
/// returned, but only after every other task has run to completion and its
/// output has been dropped, so no task outlives the call.
pub(crate) async fn join_all<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let mut set = JoinSet::new();
    let mut count = 0;
    for (idx, future) in futures.into_iter().enumerate() {
        set.spawn(async move { (idx, future.await) });
        count += 1;
    }

    let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(value))) => slots[idx] = Some(value),
            Ok((_, Err(e))) => {
                first_err.get_or_insert(e);
            }
            Err(e) => {
                first_err.get_or_insert(E::from(e));
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(slots.into_iter().flatten().collect()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed(usize),
        Join,
    }

    impl From<JoinError> for TestError {
        fn from(_: JoinError) -> Self {
            TestError::Join
        }
    }

    #[tokio::test]
    async fn should_return_results_in_submission_order() {
        // given
        let delays = [30u64, 10, 20];

        // when
        let results = join_all(delays.iter().enumerate().map(|(i, &ms)| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, TestError>(i)
        }))
        .await
        .unwrap();

        // then
        assert_eq!(results, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn should_drain_all_tasks_before_returning_error() {
        // given
        let finished = Arc::new(AtomicUsize::new(0));
        let futures = (0..4).map(|i| {
            let finished = finished.clone();
            async move {
                if i == 1 {
                    finished.fetch_add(1, Ordering::SeqCst);
                    return Err(TestError::Failed(i));
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            }
        });

        // when
        let result = join_all(futures).await;

        // then
        assert_eq!(result, Err(TestError::Failed(1)));
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn should_surface_panicked_task_as_join_error() {
        // given
        let explode = true;
        let future = async move {
            if explode {
                panic!("boom");
            }
            Ok::<u8, TestError>(0)
        };

        // when
        let result = join_all(vec![future]).await;

        // then
        assert_eq!(result, Err(TestError::Join));
    }

    #[tokio::test]
    async fn should_handle_no_futures() {
        // when
        let results: Vec<u8> = join_all(Vec::<std::future::Ready<Result<u8, TestError>>>::new())
            .await
            .unwrap();

        // then
        assert!(results.is_empty());
    }
}
