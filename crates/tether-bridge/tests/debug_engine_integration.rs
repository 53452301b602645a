//! Integration tests for the serialized debug engine

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_bridge::{
    Bridge, BridgeError, CommandSerializer, DebugEngine, DebugEngineOptions, MemoryDebugger,
    MemoryEngine, SerializerState,
};
use tether_sdk::{DebugService, EngineError, ScriptEngine, StepType};

struct Harness {
    engine: Arc<MemoryEngine>,
    bridge: Bridge,
    debugger: Arc<MemoryDebugger>,
    debug: DebugEngine,
}

fn harness_with(options: DebugEngineOptions) -> Harness {
    let engine = Arc::new(MemoryEngine::new());
    let bridge = Bridge::new(engine.clone(), engine.context_id());
    let debugger = Arc::new(MemoryDebugger::new(engine.clone()));
    let debug =
        DebugEngine::with_options(Arc::clone(bridge.context()), debugger.clone(), options).unwrap();
    Harness {
        engine,
        bridge,
        debugger,
        debug,
    }
}

fn harness() -> Harness {
    harness_with(DebugEngineOptions::default())
}

#[test]
fn test_commands_from_many_threads_run_in_submission_order() {
    let h = harness();
    let context = Arc::clone(h.bridge.context());
    let serializer = CommandSerializer::start(context, "order-test", None).unwrap();
    let serializer = Arc::new(serializer);

    // the lock makes the global submission order observable
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let executed = Arc::new(Mutex::new(Vec::new()));

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let serializer = Arc::clone(&serializer);
            let submitted = Arc::clone(&submitted);
            let executed = Arc::clone(&executed);
            thread::spawn(move || {
                let mut pending = Vec::new();
                for i in 0..25 {
                    let tag = t * 100 + i;
                    let mut order = submitted.lock();
                    let executed = Arc::clone(&executed);
                    pending.push(
                        serializer
                            .submit(move |_| {
                                executed.lock().push(tag);
                                Ok(tag)
                            })
                            .unwrap(),
                    );
                    order.push(tag);
                }
                for (i, result) in pending.into_iter().enumerate() {
                    assert_eq!(result.wait().unwrap(), t * 100 + i);
                }
            })
        })
        .collect();
    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(*executed.lock(), *submitted.lock());
    assert_eq!(executed.lock().len(), 100);
}

#[test]
fn test_shutdown_finishes_accepted_commands_then_rejects() {
    let h = harness();
    let script = h.debugger.add_script(Some("main.js"), "a();\nb();\nc();\nd();");

    let pending: Vec<_> = (0..4)
        .map(|line| h.debug.set_breakpoint(script, line, 0).unwrap())
        .collect();
    h.debug.shutdown();

    assert_eq!(h.debug.state(), SerializerState::Stopped);
    for result in pending {
        result.wait().unwrap();
    }
    assert!(matches!(h.debug.scripts(), Err(BridgeError::QueueClosed)));

    // the breakpoints really were applied before the worker stopped
    h.engine.set_current_context(Some(h.engine.context_id())).unwrap();
    assert_eq!(h.debugger.breakpoints().unwrap().len(), 4);
    h.engine.set_current_context(None).unwrap();
}

#[test]
fn test_drop_drains_queue() {
    let h = harness();
    let ran = Arc::new(AtomicUsize::new(0));
    let context = Arc::clone(h.bridge.context());
    let serializer = CommandSerializer::start(context, "drop-test", None).unwrap();

    let pending: Vec<_> = (0..10)
        .map(|_| {
            let ran = Arc::clone(&ran);
            serializer
                .submit(move |_| {
                    thread::sleep(Duration::from_millis(1));
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap()
        })
        .collect();
    drop(serializer);

    assert_eq!(ran.load(Ordering::SeqCst), 10);
    assert!(pending.into_iter().all(|result| result.wait().is_ok()));
}

#[test]
fn test_worker_survives_failures() {
    let h = harness();
    let context = Arc::clone(h.bridge.context());
    let serializer = CommandSerializer::start(context, "failure-test", None).unwrap();

    let failed = serializer
        .submit(|_| -> tether_bridge::BridgeResult<()> { Err(BridgeError::NotAProxy) })
        .unwrap();
    let panicked = serializer
        .submit(|_| -> tether_bridge::BridgeResult<()> { panic!("worker bug") })
        .unwrap();
    let fine = serializer.submit(|_| Ok("still running")).unwrap();

    assert!(matches!(failed.wait(), Err(BridgeError::NotAProxy)));
    assert!(matches!(panicked.wait(), Err(BridgeError::CommandPanicked(m)) if m == "worker bug"));
    assert_eq!(fine.wait().unwrap(), "still running");

    // both workers share the context, so the debug worker goes after the other drains
    let engine_error = h.debug.object_from_handle(12345).unwrap();
    assert!(matches!(
        engine_error.wait(),
        Err(BridgeError::Engine(EngineError::Operation(_)))
    ));
    assert!(h.debug.scripts().unwrap().wait().is_ok());
    assert_eq!(serializer.state(), SerializerState::Running);
}

#[test]
fn test_command_fails_fast_while_host_holds_context() {
    let h = harness();

    h.bridge
        .with_context(|_| {
            let result = h.debug.scripts()?.wait();
            assert!(matches!(result, Err(BridgeError::ContextBusy)));
            Ok(())
        })
        .unwrap();

    assert!(h.debug.scripts().unwrap().wait().unwrap().is_empty());
}

#[test]
fn test_clear_breakpoints_for_script() {
    let h = harness();
    let a = h.debugger.add_script(Some("a.js"), "1;\n2;\n3;");
    let b = h.debugger.add_script(Some("b.js"), "4;\n5;");

    for line in 0..3 {
        h.debug.set_breakpoint(a, line, 0).unwrap().wait().unwrap();
    }
    let kept = h.debug.set_breakpoint(b, 0, 0).unwrap().wait().unwrap();

    assert_eq!(h.debug.clear_breakpoints_for_script(a).unwrap().wait().unwrap(), 3);
    assert_eq!(h.debug.clear_breakpoints_for_script(a).unwrap().wait().unwrap(), 0);
    assert_eq!(h.debug.breakpoints().unwrap().wait().unwrap(), vec![kept]);
}

#[test]
fn test_remove_breakpoint_is_serialized() {
    let h = harness();
    let script = h.debugger.add_script(None, "x;");

    let set = h.debug.set_breakpoint(script, 0, 0).unwrap();
    // queued behind the set, so the ID it refers to already exists
    let removed = h.debug.remove_breakpoint(1).unwrap();

    assert_eq!(set.wait().unwrap().breakpoint_id, 1);
    removed.wait().unwrap();
    assert!(h.debug.breakpoints().unwrap().wait().unwrap().is_empty());
}

#[test]
fn test_stack_inspection() {
    let h = harness();
    let script = h
        .debugger
        .add_script(Some("app.js"), "function f(cart) {\n  return cart.total;\n}");
    h.debugger
        .push_frame(script, 1, 2, vec![("cart", json!({"total": 12.5, "items": ["a", "b"]}))])
        .unwrap();

    let trace = h.debug.stack_trace().unwrap().wait().unwrap();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].source_text, "  return cart.total;");

    let props = h.debug.stack_properties(0).unwrap().wait().unwrap();
    let cart = props.locals[0].clone();
    assert_eq!(cart.name, "cart");

    let fields = h.debug.object_properties_default(cart.handle).unwrap().wait().unwrap();
    let items = fields
        .properties
        .iter()
        .find(|v| v.name == "items")
        .unwrap()
        .clone();
    assert_eq!(items.class_name.as_deref(), Some("Array"));

    let resolved = h.debug.object_from_handle(items.handle).unwrap().wait().unwrap();
    assert_eq!(resolved, items);

    let first = h.debug.object_properties(items.handle, 0, 0).unwrap().wait().unwrap();
    assert_eq!(first.properties.len(), 1);
    assert_eq!(first.properties[0].display.as_deref(), Some("a"));

    let source = h.debug.script_source(script).unwrap().wait().unwrap();
    assert_eq!(source.line_count, 3);
    assert!(source.source.unwrap().contains("cart.total"));
}

#[test]
fn test_evaluate_returns_json_text() {
    let h = harness();
    let script = h.debugger.add_script(None, "debugger;");
    h.debugger
        .push_frame(script, 0, 0, vec![("cart", json!({"total": 12.5}))])
        .unwrap();

    let text = h.debug.evaluate("cart.total", 0, false).unwrap().wait().unwrap();
    let result: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(result["value"], json!(12.5));
    assert_eq!(result["type"], json!("number"));

    let text = h.debug.evaluate("cart", 0, true).unwrap().wait().unwrap();
    let forced: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(forced["value"], json!({"total": 12.5}));

    assert!(matches!(
        h.debug.evaluate("nope", 0, false).unwrap().wait(),
        Err(BridgeError::Engine(EngineError::Script { .. }))
    ));
}

#[test]
fn test_async_break_and_step_type() {
    let h = harness();

    h.debug.request_async_break().unwrap();
    h.debug.request_async_break().unwrap();
    // anything queued after the breaks runs after them
    h.debug.scripts().unwrap().wait().unwrap();
    assert_eq!(h.debugger.async_break_requests(), 2);

    assert_eq!(h.debug.step_type(), StepType::Continue);
    h.debug.set_step_type(StepType::StepIn).unwrap().wait().unwrap();
    assert_eq!(h.debug.step_type(), StepType::StepIn);
    assert_eq!(h.debugger.current_step_type(), StepType::StepIn);
}

#[test]
fn test_bounded_queue() {
    let h = harness_with(DebugEngineOptions {
        worker_name: "bounded-debug".to_string(),
        queue_bound: Some(1),
    });
    let script = h.debugger.add_script(None, "a;\nb;\nc;\nd;\ne;");

    let pending: Vec<_> = (0..5)
        .map(|line| h.debug.set_breakpoint(script, line, 0).unwrap())
        .collect();
    let ids: Vec<u32> = pending
        .into_iter()
        .map(|result| result.wait().unwrap().breakpoint_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_pending_result_is_awaitable() {
    let h = harness();
    let script = h.debugger.add_script(Some("async.js"), "await x;");

    let bp = h.debug.set_breakpoint(script, 0, 3).unwrap().await.unwrap();
    assert_eq!(bp.column, 3);

    let scripts = h.debug.scripts().unwrap().await.unwrap();
    assert_eq!(scripts[0].file_name.as_deref(), Some("async.js"));
}
