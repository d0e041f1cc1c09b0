use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use fgbridge_lib::{
    Bridge, BridgeCell, BridgeConfig, BridgeError, DelegateSlot, LoopbackNative, NativeBoundary,
    Packet,
};

/// Native stand-in that answers each call by calling back into the host from
/// a worker thread and returning whatever the host delegate produced.
fn callback_stub() -> LoopbackNative {
    LoopbackNative::new(|request: &Packet, inbound: &Arc<DelegateSlot>| {
        let inbound = Arc::clone(inbound);
        let callback = Packet::empty(request.method());
        let reply = thread::spawn(move || inbound.dispatch(&callback))
            .join()
            .map_err(|_| "callback thread panicked".to_string())?;
        Ok(request.reply(reply.into_data()))
    })
}

#[test]
fn process_bridge_load_failure_then_ping() {
    let missing = BridgeConfig::default().with_library_path("/nonexistent/libfgbridge_native.so");
    let err = match Bridge::get_instance_with(&missing) {
        Ok(_) => panic!("missing library loaded"),
        Err(err) => err,
    };
    assert!(matches!(err, BridgeError::Load { .. }));
    assert!(Bridge::try_instance().is_none());

    let bridge = match Bridge::install(callback_stub()) {
        Ok(bridge) => bridge,
        Err(err) => panic!("install failed: {err}"),
    };
    assert!(std::ptr::eq(bridge, Bridge::try_instance().unwrap()));

    let delegate = Arc::new(|method: &str, data: Option<&[u8]>| -> Option<Vec<u8>> {
        assert_eq!(method, "ping");
        assert!(data.is_none());
        Some(vec![0x01])
    });
    bridge.set_delegate(&delegate);

    assert_eq!(bridge.call_method("ping", None).unwrap(), Some(vec![0x01]));

    // Later lookups reuse the published instance and ignore the configuration.
    let again = Bridge::get_instance_with(&missing).unwrap();
    assert!(std::ptr::eq(bridge, again));
}

#[test]
fn callback_without_delegate_still_answers() {
    static CELL: BridgeCell = BridgeCell::new();
    let bridge = CELL
        .get_or_try_init(|| Ok(Box::new(callback_stub()) as Box<dyn NativeBoundary>))
        .unwrap();

    let response = bridge.call_packet(Packet::new("lonely", Some(vec![1, 2]))).unwrap();
    assert_eq!(response, Packet::empty("lonely"));
}

#[test]
fn concurrent_calls_see_old_or_new_delegate() {
    static CELL: BridgeCell = BridgeCell::new();
    let bridge: &'static Bridge = CELL
        .get_or_try_init(|| Ok(Box::new(callback_stub()) as Box<dyn NativeBoundary>))
        .unwrap();

    let a = Arc::new(|_: &str, _: Option<&[u8]>| -> Option<Vec<u8>> { Some(vec![0xA]) });
    let b = Arc::new(|_: &str, _: Option<&[u8]>| -> Option<Vec<u8>> { Some(vec![0xB]) });
    bridge.set_delegate(&a);

    let swapped = Arc::new(AtomicBool::new(false));
    let callers: Vec<_> = (0..8)
        .map(|i| {
            let swapped = Arc::clone(&swapped);
            thread::spawn(move || {
                for _ in 0..50 {
                    let seen_swap = swapped.load(Ordering::SeqCst);
                    let answer = bridge.call_method(&format!("m{i}"), None).unwrap();
                    match answer.as_deref() {
                        Some([0xA]) => assert!(!seen_swap, "routed to replaced delegate"),
                        Some([0xB]) => {}
                        other => panic!("unexpected answer {other:?}"),
                    }
                }
            })
        })
        .collect();

    bridge.set_delegate(&b);
    swapped.store(true, Ordering::SeqCst);

    for caller in callers {
        caller.join().unwrap();
    }
    assert_eq!(bridge.call_method("after", None).unwrap(), Some(vec![0xB]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_calls_complete_independently() {
    static CELL: BridgeCell = BridgeCell::new();
    let bridge: &'static Bridge = CELL
        .get_or_try_init(|| Ok(Box::new(LoopbackNative::echo()) as Box<dyn NativeBoundary>))
        .unwrap();

    let calls: Vec<_> = (0u8..10)
        .map(|i| tokio::spawn(bridge.call_method_async(format!("n{i}"), Some(vec![i]))))
        .collect();

    for (i, call) in calls.into_iter().enumerate() {
        let payload = call.await.unwrap().unwrap();
        assert_eq!(payload, Some(vec![i as u8]));
    }
}
