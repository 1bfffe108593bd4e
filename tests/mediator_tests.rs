#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests for the mediator facade
//!
//! # Test Coverage
//!
//! - Request binding, lookup miss and arity errors
//! - Notification ordering and failure isolation
//! - Notification snapshots: changes made by a subscriber apply to later calls only
//! - Empty-name resolution and owner-level unregistration
//! - Lazy receiver construction, shared across an owner's handlers
//! - Construction failures and retry after a failed factory

use correos::descriptor::{arg, reply, OwnerId, Receiver, TargetDescriptor, TargetKind};
use correos::error::{ConstructionError, HandlerError};
use correos::{EmptyNameHandling, Executor, Mediator, MediatorConfig, MediatorError, Registration};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

/// Runs every submitted job on the calling thread.
struct Inline;

impl Executor for Inline {
    fn submit(&self, job: correos::worker_pool::Job) -> correos::error::Result<()> {
        job();
        Ok(())
    }
}

fn mediator() -> Mediator {
    Mediator::new(MediatorConfig::default(), Arc::new(Inline))
}

#[derive(Default)]
struct Calc;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

fn add_descriptor() -> TargetDescriptor {
    TargetDescriptor::request::<Calc>("Add")
        .owner("Calc")
        .name("sum")
        .handler(|_, args| {
            let a: i64 = arg(args, 0)?;
            let b: i64 = arg(args, 1)?;
            reply(a + b)
        })
}

/// Factory closure for `Recorder` receivers that also counts invocations.
fn counting_factory(
    calls: Arc<AtomicUsize>,
) -> impl Fn(&OwnerId) -> Result<Receiver, ConstructionError> + Send + Sync + 'static {
    move |_owner: &OwnerId| {
        calls.fetch_add(1, Ordering::SeqCst);
        let receiver: Receiver = Arc::new(Recorder::default());
        Ok(receiver)
    }
}

#[test]
fn test_request_sum() {
    let mediator = mediator();
    assert_eq!(
        mediator.register(add_descriptor()),
        Registration::Bound("sum".to_string())
    );
    let result = mediator.request("sum", &[json!(2), json!(3)]).unwrap();
    assert_eq!(result, Some(json!(5)));
}

#[test]
fn test_notifications_run_in_subscription_order() {
    let mediator = mediator();
    let order = Arc::new(Mutex::new(Vec::new()));

    for owner in ["A", "B"] {
        let order = Arc::clone(&order);
        mediator.register(
            TargetDescriptor::notification::<Calc>("OnTick")
                .owner(owner)
                .name("onTick")
                .handler(move |_, _| {
                    order.lock().unwrap().push(owner);
                    reply(())
                }),
        );
    }

    assert_eq!(mediator.notify("onTick", &[]).unwrap(), 2);
    assert_eq!(*order.lock().unwrap(), ["A", "B"]);
}

#[test]
fn test_unknown_request_is_lookup_miss() {
    let mediator = mediator();
    assert_eq!(mediator.request("unknown", &[]).unwrap(), None);
    assert_eq!(mediator.notify("unknown", &[json!(1)]).unwrap(), 0);
}

#[test]
fn test_empty_name_full_method_name_then_unregister() {
    let mediator = mediator();
    let registration = mediator.register(
        TargetDescriptor::request::<Calc>("Ping")
            .owner("Svc")
            .handler(|_, _| reply("pong")),
    );
    assert_eq!(registration, Registration::Bound("Svc.Ping".to_string()));
    assert_eq!(
        mediator.request("Svc.Ping", &[]).unwrap(),
        Some(json!("pong"))
    );

    assert_eq!(mediator.unregister(&OwnerId::new("Svc")), 1);
    assert_eq!(mediator.request("Svc.Ping", &[]).unwrap(), None);
}

#[test]
fn test_empty_name_method_name_and_skip() {
    let by_method = Mediator::new(
        MediatorConfig::default().with_empty_name_handling(EmptyNameHandling::AssignMethodName),
        Arc::new(Inline),
    );
    by_method.register(
        TargetDescriptor::request::<Calc>("Ping")
            .owner("Svc")
            .handler(|_, _| reply("pong")),
    );
    assert_eq!(by_method.request("Ping", &[]).unwrap(), Some(json!("pong")));

    let skipping = Mediator::new(
        MediatorConfig::default().with_empty_name_handling(EmptyNameHandling::Skip),
        Arc::new(Inline),
    );
    let registration = skipping.register(
        TargetDescriptor::request::<Calc>("Ping")
            .owner("Svc")
            .handler(|_, _| reply("pong")),
    );
    assert_eq!(registration, Registration::Skipped);
    assert!(skipping.registry().is_empty());
}

#[test]
fn test_duplicate_request_keeps_first_binding() {
    let mediator = mediator();
    mediator.register(add_descriptor());
    let second = mediator.register(
        TargetDescriptor::request::<Calc>("Mul")
            .owner("Other")
            .name("sum")
            .handler(|_, _| reply(-1)),
    );
    assert_eq!(second, Registration::Duplicate("sum".to_string()));
    assert_eq!(
        mediator.request("sum", &[json!(1), json!(1)]).unwrap(),
        Some(json!(2))
    );
}

#[test]
fn test_wrong_arity_and_argument_type() {
    let mediator = mediator();
    mediator.register(add_descriptor());

    let err = mediator.request("sum", &[json!(1)]).unwrap_err();
    assert!(matches!(
        err,
        MediatorError::Handler {
            source: HandlerError::Arity { expected: 2, actual: 1 },
            ..
        }
    ));

    let err = mediator.request("sum", &[json!(1), json!("two")]).unwrap_err();
    assert!(matches!(
        err,
        MediatorError::Handler {
            source: HandlerError::Argument { index: 1, .. },
            ..
        }
    ));
}

#[test]
fn test_failing_subscriber_does_not_stop_the_rest() {
    let mediator = mediator();
    let reached = Arc::new(AtomicUsize::new(0));

    mediator.register(
        TargetDescriptor::notification::<Calc>("Broken")
            .owner("A")
            .name("evt")
            .handler(|_, _| Err(HandlerError::failed("disk full"))),
    );
    let counter = Arc::clone(&reached);
    mediator.register(
        TargetDescriptor::notification::<Calc>("Fine")
            .owner("B")
            .name("evt")
            .handler(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                reply(())
            }),
    );

    let err = mediator.notify("evt", &[]).unwrap_err();
    assert_eq!(reached.load(Ordering::SeqCst), 1);
    match err {
        MediatorError::SubscriberFailures {
            name,
            invoked,
            failures,
        } => {
            assert_eq!(name, "evt");
            assert_eq!(invoked, 2);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].owner.as_str(), "A");
            assert_eq!(failures[0].handler, "Broken");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_duplicate_subscription_runs_twice() {
    let mediator = mediator();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let descriptor = TargetDescriptor::notification::<Calc>("Count")
        .owner("A")
        .name("evt")
        .handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            reply(())
        });

    mediator.register(descriptor.clone());
    mediator.register(descriptor);
    assert_eq!(mediator.registry().subscriber_count("evt"), 2);
    assert_eq!(mediator.notify("evt", &[]).unwrap(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unregister_only_touches_owned_bindings() {
    let mediator = mediator();
    mediator.register(add_descriptor());
    mediator.register(
        TargetDescriptor::notification::<Calc>("Sum")
            .owner("Listener")
            .name("sum")
            .handler(|_, _| reply(())),
    );

    assert_eq!(mediator.unregister(&OwnerId::new("Listener")), 1);
    assert_eq!(mediator.registry().subscriber_count("sum"), 0);
    assert!(mediator.registry().contains_request("sum"));
}

#[test]
fn test_receiver_is_shared_across_handlers_of_one_owner() {
    let mediator = mediator();
    let calls = Arc::new(AtomicUsize::new(0));

    let record = TargetDescriptor::builder::<Recorder, _>(
        TargetKind::Notification,
        "Record",
        counting_factory(Arc::clone(&calls)),
    )
    .owner("Recorder")
    .name("seen")
    .handler(|recorder, args| {
        let entry: String = arg(args, 0)?;
        recorder.seen.lock().unwrap().push(entry);
        reply(())
    });
    let list = TargetDescriptor::builder::<Recorder, _>(
        TargetKind::Request,
        "List",
        counting_factory(Arc::clone(&calls)),
    )
    .owner("Recorder")
    .name("seen.list")
    .handler(|recorder, _| reply(recorder.seen.lock().unwrap().clone()));

    mediator.register_batch([record, list]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    mediator.notify("seen", &[json!("a")]).unwrap();
    mediator.notify("seen", &[json!("b")]).unwrap();
    assert_eq!(
        mediator.request("seen.list", &[]).unwrap(),
        Some(json!(["a", "b"]))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(mediator.instances().len(), 1);
}

#[test]
fn test_concurrent_first_use_constructs_once() {
    let mediator = mediator();
    let calls = Arc::new(AtomicUsize::new(0));

    mediator.register(
        TargetDescriptor::builder::<Recorder, _>(
            TargetKind::Request,
            "Touch",
            counting_factory(Arc::clone(&calls)),
        )
        .owner("Recorder")
        .name("touch")
        .handler(|recorder, _| {
            recorder.seen.lock().unwrap().push("touch".to_string());
            reply(())
        }),
    );

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let mediator = mediator.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                mediator.request("touch", &[]).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(json!(null)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let receiver = mediator
        .instances()
        .peek(&OwnerId::new("Recorder"))
        .unwrap();
    let recorder = receiver.downcast_ref::<Recorder>().unwrap();
    assert_eq!(recorder.seen.lock().unwrap().len(), threads);
}

#[test]
fn test_construction_failure_is_not_cached() {
    let mediator = mediator();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);

    mediator.register(
        TargetDescriptor::builder::<Calc, _>(
            TargetKind::Request,
            "Flaky",
            move |_owner: &OwnerId| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ConstructionError::new("not yet"))
                } else {
                    let receiver: Receiver = Arc::new(Calc);
                    Ok(receiver)
                }
            },
        )
        .owner("Flaky")
        .name("flaky")
        .handler(|_, _| reply("ok")),
    );

    let err = mediator.request("flaky", &[]).unwrap_err();
    assert!(matches!(err, MediatorError::Construction { ref owner, .. } if owner.as_str() == "Flaky"));
    assert!(mediator.instances().is_empty());

    assert_eq!(mediator.request("flaky", &[]).unwrap(), Some(json!("ok")));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unregister_all_resets_everything() {
    let mediator = mediator();
    mediator.register(add_descriptor());
    mediator.register(
        TargetDescriptor::notification::<Calc>("OnTick")
            .owner("Ticker")
            .name("onTick")
            .handler(|_, _| reply(())),
    );
    mediator.request("sum", &[json!(1), json!(2)]).unwrap();
    assert_eq!(mediator.notify("onTick", &[]).unwrap(), 1);
    assert_eq!(mediator.instances().len(), 1);

    mediator.unregister_all();
    assert!(mediator.registry().is_empty());
    assert!(mediator.instances().is_empty());
    assert_eq!(mediator.request("sum", &[json!(1), json!(2)]).unwrap(), None);
    assert_eq!(mediator.notify("onTick", &[]).unwrap(), 0);
}

#[test]
fn test_notify_iterates_a_snapshot() {
    let mediator = mediator();
    let order = Arc::new(Mutex::new(Vec::new()));

    let inner = mediator.clone();
    let seen = Arc::clone(&order);
    mediator.register(
        TargetDescriptor::notification::<Calc>("First")
            .owner("A")
            .name("evt")
            .handler(move |_, _| {
                seen.lock().unwrap().push("A");
                inner.unregister(&OwnerId::new("B"));
                let late = Arc::clone(&seen);
                inner.register(
                    TargetDescriptor::notification::<Calc>("Late")
                        .owner("C")
                        .name("evt")
                        .handler(move |_, _| {
                            late.lock().unwrap().push("C");
                            reply(())
                        }),
                );
                reply(())
            }),
    );
    let seen = Arc::clone(&order);
    mediator.register(
        TargetDescriptor::notification::<Calc>("Second")
            .owner("B")
            .name("evt")
            .handler(move |_, _| {
                seen.lock().unwrap().push("B");
                reply(())
            }),
    );

    assert_eq!(mediator.notify("evt", &[]).unwrap(), 2);
    assert_eq!(*order.lock().unwrap(), ["A", "B"]);

    // The changes apply to the next call: B is gone, C joined after A.
    order.lock().unwrap().clear();
    assert_eq!(mediator.notify("evt", &[]).unwrap(), 2);
    assert_eq!(*order.lock().unwrap(), ["A", "C"]);
}

#[test]
fn test_factory_dispatching_to_its_own_owner_fails() {
    let mediator = mediator();
    let inner = mediator.clone();

    mediator.register(
        TargetDescriptor::builder::<Calc, _>(
            TargetKind::Request,
            "Selfish",
            move |_owner: &OwnerId| -> Result<Receiver, ConstructionError> {
                inner
                    .request("selfish", &[])
                    .map_err(ConstructionError::new)?;
                let receiver: Receiver = Arc::new(Calc);
                Ok(receiver)
            },
        )
        .owner("Selfish")
        .name("selfish")
        .handler(|_, _| reply("ok")),
    );

    let err = mediator.request("selfish", &[]).unwrap_err();
    assert!(matches!(err, MediatorError::Construction { .. }));
    assert!(err.to_string().contains("being constructed"));
    assert!(mediator.instances().is_empty());
}

#[test]
fn test_handler_may_reenter_the_mediator() {
    let mediator = mediator();
    mediator.register(add_descriptor());

    let inner = mediator.clone();
    mediator.register(
        TargetDescriptor::request::<Calc>("Double")
            .owner("Doubler")
            .name("double")
            .handler(move |_, args| {
                let n: i64 = arg(args, 0)?;
                let sum = inner
                    .request("sum", &[json!(n), json!(n)])
                    .map_err(HandlerError::failed)?;
                reply(sum)
            }),
    );

    assert_eq!(
        mediator.request("double", &[json!(21)]).unwrap(),
        Some(json!(42))
    );
}

#[test]
fn test_descriptions_are_queryable() {
    let mediator = mediator();
    mediator.register(
        TargetDescriptor::request::<Calc>("Add")
            .owner("Calc")
            .name("sum")
            .description("Adds two integers")
            .handler(|_, _| reply(0)),
    );
    assert_eq!(
        mediator.registry().description("sum").as_deref(),
        Some("Adds two integers")
    );
    assert_eq!(mediator.registry().request_names(), ["sum"]);
}
