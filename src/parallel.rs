use parking_lot::Mutex;

use std::sync::atomic::{AtomicBool, Ordering};

/// Resolves the number of workers, 0 meaning one per available core.
pub fn num_workers(num_threads: usize) -> usize {
    if num_threads == 0 {
        rayon::current_num_threads()
    } else {
        num_threads
    }
}

// processes items on `num_threads` workers, each owning a context created by
// `create_thread_context`; items are handed out in iteration order, but
// processed without any ordering
pub fn parallel_process<Iter, Item, Context, CreateContext, Process, Error>(
    num_threads: usize,
    iter: Iter,
    create_thread_context: CreateContext,
    process: Process,
) -> Result<(), Error>
where
    Iter: Iterator<Item = Item> + Send,
    CreateContext: Fn() -> Context + Sync,
    Process: Fn(&mut Context, Item) -> Result<(), Error> + Sync,
    Error: Send,
{
    let iter = &Mutex::new(iter);
    let failed = &AtomicBool::new(false);
    let create_thread_context = &create_thread_context;
    let process = &process;

    crossbeam::scope(|s| {
        let mut workers = Vec::new();
        for _ in 0..num_workers(num_threads) {
            workers.push(s.spawn(move |_| {
                let mut context = create_thread_context();
                loop {
                    // stop early if another worker failed
                    if failed.load(Ordering::Relaxed) {
                        return Ok(());
                    }
                    let item = match iter.lock().next() {
                        None => return Ok(()),
                        Some(x) => x,
                    };
                    if let Err(e) = process(&mut context, item) {
                        failed.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }));
        }

        workers
            .into_iter()
            .map(|worker| worker.join().expect("thread panicked"))
            .collect()
    })
    .expect("thread panicked")
}

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_all_items_processed() {
        for num_threads in [0, 1, 4] {
            let sum = AtomicUsize::new(0);
            let contexts = AtomicUsize::new(0);
            let result: Result<(), ()> = parallel_process(
                num_threads,
                1..=100usize,
                || contexts.fetch_add(1, Ordering::Relaxed),
                |_, item| {
                    sum.fetch_add(item, Ordering::Relaxed);
                    Ok(())
                },
            );
            assert!(result.is_ok());
            assert_eq!(sum.into_inner(), 5050);
            assert_eq!(contexts.into_inner(), num_workers(num_threads));
        }
    }

    #[test]
    fn test_error_stops_processing() {
        let processed = AtomicUsize::new(0);
        let result = parallel_process(
            2,
            0..10_000,
            || (),
            |_, item| {
                processed.fetch_add(1, Ordering::Relaxed);
                if item == 10 {
                    Err(format!("failed at {}", item))
                } else {
                    Ok(())
                }
            },
        );
        assert_eq!(result, Err("failed at 10".to_string()));
        assert!(processed.into_inner() < 10_000);
    }
}
