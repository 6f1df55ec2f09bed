//! Integration tests for main-thread dispatch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use wvbridge::dispatch::{Dispatcher, MainLoop};
use wvbridge::error::Error;

fn spawn_loop() -> (MainLoop, thread::JoinHandle<()>) {
    MainLoop::spawn("test-main").expect("failed to spawn main loop")
}

fn stop(main_loop: MainLoop, join: thread::JoinHandle<()>) {
    main_loop.shutdown();
    join.join().expect("main loop thread panicked");
}

// ---------------------------------------------------------------------------
// run_sync
// ---------------------------------------------------------------------------

#[test]
fn run_sync_from_other_thread_runs_on_privileged_thread() {
    let (main_loop, join) = spawn_loop();
    let caller = thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&ran_on);
    main_loop
        .run_sync(move || {
            *slot.lock().unwrap() = Some(thread::current().id());
        })
        .unwrap();

    // Completed before run_sync returned.
    let ran_on = ran_on.lock().unwrap().expect("work did not run");
    assert_ne!(ran_on, caller);
    assert_eq!(Some(ran_on), main_loop.thread_id());
    assert_eq!(thread::current().id(), caller);

    stop(main_loop, join);
}

#[test]
fn run_sync_blocks_until_work_finishes() {
    let (main_loop, join) = spawn_loop();
    let done = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&done);
    main_loop
        .run_sync(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert!(done.load(Ordering::SeqCst));
    stop(main_loop, join);
}

#[test]
fn run_sync_from_privileged_thread_runs_inline() {
    let (main_loop, join) = spawn_loop();
    let inner_loop = main_loop.clone();
    let order = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&order);
    main_loop
        .run_sync(move || {
            assert!(inner_loop.is_privileged());
            let outer = thread::current().id();
            let inner_log = Arc::clone(&log);
            // Would deadlock if this went through the queue.
            inner_loop
                .run_sync(move || {
                    assert_eq!(thread::current().id(), outer);
                    inner_log.lock().unwrap().push("inner");
                })
                .unwrap();
            log.lock().unwrap().push("after inner");
        })
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["inner", "after inner"]);
    stop(main_loop, join);
}

#[test]
fn run_sync_executes_exactly_once() {
    let (main_loop, join) = spawn_loop();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        let count = Arc::clone(&count);
        main_loop
            .run_sync(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert_eq!(count.load(Ordering::SeqCst), 10);
    stop(main_loop, join);
}

#[test]
fn run_sync_value_returns_result() {
    let (main_loop, join) = spawn_loop();
    let name = main_loop
        .run_sync_value(|| thread::current().name().map(str::to_string))
        .unwrap();
    assert_eq!(name.as_deref(), Some("test-main"));
    stop(main_loop, join);
}

#[test]
fn run_sync_panic_resumes_on_caller() {
    let (main_loop, join) = spawn_loop();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = main_loop.run_sync(|| panic!("boom on main"));
    }));
    let payload = result.expect_err("panic should reach the caller");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom on main"));

    // The loop itself survives a panic it handed back.
    let alive = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&alive);
    main_loop
        .run_sync(move || flag.store(true, Ordering::SeqCst))
        .unwrap();
    assert!(alive.load(Ordering::SeqCst));

    stop(main_loop, join);
}

// ---------------------------------------------------------------------------
// run_async
// ---------------------------------------------------------------------------

#[test]
fn run_async_from_other_thread_does_not_wait() {
    let (main_loop, join) = spawn_loop();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (done_tx, done_rx) = mpsc::channel();

    main_loop.run_async(move || {
        gate_rx.recv().unwrap();
        done_tx.send(thread::current().id()).unwrap();
    });

    // Reaching this line at all means run_async did not wait: the work is
    // parked on the gate until we open it.
    gate_tx.send(()).unwrap();
    let ran_on = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("async work never ran");
    assert_eq!(Some(ran_on), main_loop.thread_id());
    assert_ne!(ran_on, thread::current().id());

    stop(main_loop, join);
}

#[test]
fn run_async_from_privileged_thread_runs_before_returning() {
    let (main_loop, join) = spawn_loop();
    let inner_loop = main_loop.clone();

    let ran_inline = main_loop
        .run_sync_value(move || {
            let flag = Arc::new(AtomicBool::new(false));
            let set = Arc::clone(&flag);
            inner_loop.run_async(move || set.store(true, Ordering::SeqCst));
            flag.load(Ordering::SeqCst)
        })
        .unwrap();

    assert!(ran_inline);
    stop(main_loop, join);
}

#[test]
fn run_async_preserves_submission_order() {
    let (main_loop, join) = spawn_loop();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..100 {
        let seen = Arc::clone(&seen);
        main_loop.run_async(move || seen.lock().unwrap().push(i));
    }
    // Queued behind every item above.
    main_loop.run_sync(|| {}).unwrap();

    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    stop(main_loop, join);
}

#[test]
fn run_async_first_item_finishes_before_second_starts() {
    let (main_loop, join) = spawn_loop();
    let events = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&events);
    main_loop.run_async(move || {
        first.lock().unwrap().push("w1 start");
        thread::sleep(Duration::from_millis(30));
        first.lock().unwrap().push("w1 end");
    });
    let second = Arc::clone(&events);
    main_loop.run_async(move || second.lock().unwrap().push("w2 start"));
    main_loop.run_sync(|| {}).unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["w1 start", "w1 end", "w2 start"]
    );
    stop(main_loop, join);
}

#[test]
fn run_async_panic_ends_the_loop() {
    let (main_loop, join) = spawn_loop();

    main_loop.run_async(|| panic!("unhandled on main"));
    assert!(join.join().is_err());

    assert!(main_loop.is_closed());
    assert!(matches!(main_loop.run_sync(|| {}), Err(Error::QueueClosed)));
}

// ---------------------------------------------------------------------------
// Loop lifecycle
// ---------------------------------------------------------------------------

#[test]
fn new_binds_creating_thread_as_privileged() {
    let (main_loop, runner) = MainLoop::new();
    let here = thread::current().id();
    assert_eq!(main_loop.thread_id(), Some(here));
    assert!(main_loop.is_privileged());

    let submitter = main_loop.clone();
    let worker = thread::spawn(move || {
        assert!(!submitter.is_privileged());
        let ran_on = submitter
            .run_sync_value(|| thread::current().id())
            .unwrap();
        submitter.shutdown();
        ran_on
    });

    runner.run();

    assert_eq!(worker.join().unwrap(), here);
    assert!(main_loop.is_privileged());
}

#[test]
fn run_sync_on_host_thread_before_runner_starts_runs_inline() {
    let (main_loop, runner) = MainLoop::new();
    let ran = Arc::new(AtomicUsize::new(0));

    // Nothing drains the queue yet; this must not wait for the runner.
    let count = Arc::clone(&ran);
    main_loop
        .run_sync(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let count = Arc::clone(&ran);
    main_loop.run_async(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });
    let value = main_loop.run_sync_value(|| 7).unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(value, 7);

    main_loop.shutdown();
    runner.run();
}

#[test]
fn host_thread_work_after_runner_exits_is_dropped() {
    let (main_loop, runner) = MainLoop::new();
    main_loop.shutdown();
    runner.run();

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    main_loop.run_async(move || flag.store(true, Ordering::SeqCst));
    let flag = Arc::clone(&ran);
    let sync = main_loop.run_sync(move || flag.store(true, Ordering::SeqCst));
    let value = main_loop.run_sync_value(|| 1);

    assert!(main_loop.is_privileged());
    assert!(main_loop.is_closed());
    assert!(matches!(sync, Err(Error::QueueClosed)));
    assert!(matches!(value, Err(Error::QueueClosed)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn shutdown_stops_inline_work_on_privileged_thread() {
    let (main_loop, join) = spawn_loop();
    let inner_loop = main_loop.clone();

    let (ran_inline, sync) = main_loop
        .run_sync_value(move || {
            inner_loop.shutdown();
            let flag = Arc::new(AtomicBool::new(false));
            let set = Arc::clone(&flag);
            inner_loop.run_async(move || set.store(true, Ordering::SeqCst));
            let sync = inner_loop.run_sync(|| {});
            (flag.load(Ordering::SeqCst), sync)
        })
        .unwrap();

    assert!(!ran_inline);
    assert!(matches!(sync, Err(Error::QueueClosed)));
    assert!(main_loop.is_closing());
    join.join().expect("main loop thread panicked");
}

#[test]
fn shutdown_drops_later_work() {
    let (main_loop, join) = spawn_loop();
    stop(main_loop.clone(), join);

    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    main_loop.run_async(move || flag.store(true, Ordering::SeqCst));
    let sync = main_loop.run_sync(|| {});

    assert!(matches!(sync, Err(Error::QueueClosed)));
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn shutdown_runs_work_queued_ahead_of_it() {
    let (main_loop, join) = spawn_loop();
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let count = Arc::clone(&count);
        main_loop.run_async(move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
    }
    stop(main_loop, join);

    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn dropping_all_handles_stops_the_loop() {
    let (main_loop, join) = spawn_loop();
    drop(main_loop);
    join.join().expect("loop should exit cleanly");
}

#[test]
fn caller_thread_is_not_privileged() {
    let (main_loop, join) = spawn_loop();
    assert!(!main_loop.is_privileged());
    stop(main_loop, join);
}

// ---------------------------------------------------------------------------
// Trait object and async callers
// ---------------------------------------------------------------------------

#[test]
fn dispatcher_trait_object_dispatches() {
    let (main_loop, join) = spawn_loop();
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(main_loop.clone());
    let count = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&count);
    dispatcher.run_async(Box::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
    }));
    let c = Arc::clone(&count);
    dispatcher
        .run_sync(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(!dispatcher.is_privileged());
    drop(dispatcher);
    stop(main_loop, join);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_sync_panic_leaves_loop_running() {
    let (main_loop, join) = spawn_loop();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    let pending = main_loop.run_sync_async(move || {
        gate_rx.recv().unwrap();
        panic!("nobody is waiting");
    });
    // Submitted on first poll, then abandoned while the work is parked.
    let timed_out = tokio::time::timeout(Duration::from_millis(50), pending).await;
    assert!(timed_out.is_err());
    gate_tx.send(()).unwrap();

    main_loop.run_sync_async(|| {}).await.unwrap();
    assert!(!main_loop.is_closed());

    main_loop.shutdown();
    tokio::task::spawn_blocking(move || join.join())
        .await
        .unwrap()
        .expect("loop should survive an abandoned panic");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_sync_async_awaits_completion() {
    let (main_loop, join) = spawn_loop();
    let done = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&done);
    main_loop
        .run_sync_async(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert!(done.load(Ordering::SeqCst));
    main_loop.shutdown();
    tokio::task::spawn_blocking(move || join.join())
        .await
        .unwrap()
        .unwrap();
}
