/*!
 * Dispatch Tests
 * Call record handling and host callbacks
 */

use super::common::*;
use guest_services::limits::CALL_RECORD_SIZE;
use guest_services::{CallRecord, GuestMemory, Hypercall, HypercallBridge};
use nix::errno::Errno;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const RECORD: u64 = GUEST_BASE + 0x40;

#[test]
fn test_unknown_call_number_leaves_record_untouched() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let record = CallRecord {
        call_number: 0x999,
        args: [0x11; 32],
        retval: 0x55,
        error: 0x66,
    };
    mem.write(RECORD, &record.encode()).unwrap();

    bridge.handle_hypercall(&mem, RECORD);

    assert_eq!(read_record(&mem, RECORD), record);
    assert_eq!(bridge.stats().calls_handled, 0);
}

#[test]
fn test_unreadable_record_is_dropped() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let past_end = GUEST_BASE + GUEST_SIZE as u64 - (CALL_RECORD_SIZE as u64 / 2);

    bridge.handle_hypercall(&mem, past_end);

    assert_eq!(mem.stats().writes, 0);
    assert_eq!(bridge.stats().calls_handled, 0);
}

#[test]
fn test_response_is_written_into_record() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();

    let record = call_via_record(&bridge, &mem, RECORD, Hypercall::Close { fd: 12 });
    assert_eq!((record.retval, record.error), (-1, 0));
    assert_eq!(record.call(), Some(Hypercall::Close { fd: 12 }));

    let record = call_via_record(&bridge, &mem, RECORD, tcp_socket());
    assert_eq!((record.retval, record.error), (0, 0));
}

#[test]
fn test_stale_error_is_cleared() {
    let bridge = HypercallBridge::with_fd_capacity(1);
    let mem = guest_memory();

    call_via_record(&bridge, &mem, RECORD, tcp_socket());
    let exhausted = call_via_record(&bridge, &mem, RECORD, tcp_socket());
    assert_eq!(exhausted.error, guest_errno(Errno::ENOMEM));

    // A rejected descriptor does not set Last-Error, so the stale value must be gone
    let rejected = call_via_record(&bridge, &mem, RECORD, Hypercall::Close { fd: 7 });
    assert_eq!((rejected.retval, rejected.error), (-1, 0));
    assert_eq!(bridge.last_error(), 0);
}

#[test]
fn test_pending_callback_on_zero_address() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fired = Arc::new(AtomicU64::new(0));

    let counter = fired.clone();
    bridge.register_pending_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    bridge.handle_hypercall(&mem, 0);

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(mem.stats().reads, 0);
}

#[test]
#[should_panic(expected = "no pending callback")]
fn test_zero_address_without_callback_is_fatal() {
    let bridge = HypercallBridge::new();
    bridge.handle_hypercall(&guest_memory(), 0);
}

#[test]
fn test_call_callback() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let seen = Arc::new(AtomicU64::new(0));

    let sink = seen.clone();
    bridge.register_callback(0x42, move |arg| {
        sink.store(arg, Ordering::SeqCst);
        7
    });

    let record = call_via_record(
        &bridge,
        &mem,
        RECORD,
        Hypercall::CallCallback { id: 0x42, arg: 99 },
    );
    assert_eq!((record.retval, record.error), (7, 0));
    assert_eq!(seen.load(Ordering::SeqCst), 99);

    let unknown = call_via_record(&bridge, &mem, RECORD, Hypercall::CallCallback { id: 1, arg: 0 });
    assert_eq!((unknown.retval, unknown.error), (-1, guest_errno(Errno::EINVAL)));

    assert!(bridge.unregister_callback(0x42));
    assert_eq!(bridge.stats().registered_callbacks, 0);
}

#[test]
fn test_callback_can_use_the_bridge() {
    let bridge = Arc::new(HypercallBridge::new());
    let mem = Arc::new(guest_memory());

    let inner = Arc::clone(&bridge);
    let inner_mem = Arc::clone(&mem);
    bridge.register_callback(1, move |_| inner.execute(&*inner_mem, tcp_socket()).retval);

    let response = bridge.execute(&*mem, Hypercall::CallCallback { id: 1, arg: 0 });
    assert_eq!(response.retval, 0);
    assert_eq!(bridge.stats().open_descriptors, 1);
}

#[test]
fn test_callback_reenters_bridge_registry() {
    let bridge = Arc::new(HypercallBridge::new());
    let mem = Arc::new(guest_memory());

    bridge.register_callback(2, |arg| arg as i64 + 1);

    let inner = Arc::clone(&bridge);
    let inner_mem = Arc::clone(&mem);
    bridge.register_callback(1, move |arg| {
        let nested = inner.execute(&*inner_mem, Hypercall::CallCallback { id: 2, arg });
        nested.retval + inner.stats().registered_callbacks as i64
    });

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let outer = Arc::clone(&bridge);
    let outer_mem = Arc::clone(&mem);
    std::thread::spawn(move || {
        let record = call_via_record(&outer, &outer_mem, RECORD, Hypercall::CallCallback { id: 1, arg: 40 });
        done_tx.send(record).unwrap();
    });

    let record = done_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("callback re-entering the bridge did not return");
    assert_eq!((record.retval, record.error), (43, 0));
}

#[test]
fn test_callback_invoking_itself_is_busy() {
    let bridge = Arc::new(HypercallBridge::new());
    let mem = Arc::new(guest_memory());

    let inner = Arc::clone(&bridge);
    let inner_mem = Arc::clone(&mem);
    bridge.register_callback(5, move |_| {
        inner.execute(&*inner_mem, Hypercall::CallCallback { id: 5, arg: 0 }).error
    });

    let response = bridge.execute(&*mem, Hypercall::CallCallback { id: 5, arg: 0 });
    assert_eq!(response.retval, guest_errno(Errno::EBUSY));
    // The nested failure does not leak into the outer response
    assert_eq!(response.error, 0);
    assert_eq!(bridge.last_error(), 0);
}

#[test]
fn test_stats_serialize() {
    let bridge = HypercallBridge::with_fd_capacity(16);
    let json = serde_json::to_value(bridge.stats()).unwrap();
    assert_eq!(json["fd_capacity"], 16);
    assert_eq!(json["open_descriptors"], 0);
}

#[test]
fn test_concurrent_callers_are_serialized() {
    let bridge = Arc::new(HypercallBridge::with_fd_capacity(64));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            std::thread::spawn(move || {
                let mem = guest_memory();
                (0..8)
                    .map(|_| bridge.execute(&mem, tcp_socket()).retval)
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut fds: Vec<i64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    fds.sort_unstable();
    assert_eq!(fds, (0..32).collect::<Vec<_>>());
}
