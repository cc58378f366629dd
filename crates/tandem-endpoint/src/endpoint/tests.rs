use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tandem_core::protocol::error_codes;
use tandem_core::{ErrorObject, Notification, Request, Response, CANCEL_METHOD};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::*;
use crate::dispatcher::Reply;
use crate::ids::SequentialIdGenerator;

type Outbox = mpsc::UnboundedReceiver<Message>;

fn raw(value: Value) -> RawMessage {
    serde_json::from_value(value).unwrap()
}

fn endpoint_with(dispatcher: Dispatcher, max_workers: usize) -> (Endpoint, Outbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let endpoint = Endpoint::builder(dispatcher, tx)
        .max_workers(max_workers)
        .id_generator(SequentialIdGenerator::new(1))
        .build()
        .unwrap();
    (endpoint, rx)
}

async fn next(outbox: &mut Outbox) -> Message {
    timeout(Duration::from_secs(5), outbox.recv())
        .await
        .expect("timed out waiting for outgoing message")
        .expect("consumer channel closed")
}

fn into_response(message: Message) -> Response {
    match message {
        Message::Response(response) => response,
        other => panic!("expected a response, got {:?}", other),
    }
}

fn response_for(id: i64, result: Value) -> RawMessage {
    RawMessage::from(Message::Response(Response::success(
        RequestId::number(id),
        result,
    )))
}

/// Controls for the `block` method: learn when its job starts, let it finish
struct Gate {
    started: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

/// `echo` answers immediately; `block`, `touch` and `fast` are deferred.
/// `touch` flips the given flag when its job actually runs.
fn test_dispatcher(touched: Arc<AtomicBool>) -> (Dispatcher, Gate) {
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some((started_tx, release_rx))));

    let dispatcher = Dispatcher::new()
        .with_method("echo", |params| {
            Ok(Reply::Immediate(params.unwrap_or(Value::Null)))
        })
        .with_method("block", move |_| {
            let channels = slot.lock().take();
            Ok(Reply::deferred(move || {
                if let Some((started, release)) = channels {
                    let _ = started.send(());
                    let _ = release.blocking_recv();
                }
                Ok(json!("unblocked"))
            }))
        })
        .with_method("touch", move |_| {
            let touched = touched.clone();
            Ok(Reply::deferred(move || {
                touched.store(true, Ordering::SeqCst);
                Ok(json!("touched"))
            }))
        })
        .with_method("fast", |_| Ok(Reply::deferred(|| Ok(json!("fast")))));

    (
        dispatcher,
        Gate {
            started: started_rx,
            release: release_tx,
        },
    )
}

fn plain_dispatcher() -> Dispatcher {
    test_dispatcher(Arc::new(AtomicBool::new(false))).0
}

#[tokio::test]
async fn test_echo_answers_before_consume_returns() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "echo",
            "params": {"x": 5}
        })))
        .unwrap();

    let message = outbox.try_recv().expect("response should already be sent");
    assert_eq!(
        message,
        Message::Response(Response::success(RequestId::number(1), json!({"x": 5})))
    );
    assert!(outbox.try_recv().is_err());
    assert_eq!(endpoint.pending_client_requests(), 0);
}

#[tokio::test]
async fn test_any_numeric_id_is_answered_with_that_id() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    for id in [json!(1.5), json!(u64::MAX), json!(-7)] {
        endpoint
            .consume_value(json!({"jsonrpc": "2.0", "id": id, "method": "echo", "params": "hi"}))
            .unwrap();

        let message = outbox.try_recv().expect("request was not answered");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"jsonrpc": "2.0", "id": id, "result": "hi"})
        );
    }
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_method_request_gets_method_not_found() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": "q-1", "method": "nope"})))
        .unwrap();

    let response = into_response(outbox.try_recv().unwrap());
    assert_eq!(response.id, RequestId::from("q-1"));
    let error = response.error_object().unwrap();
    assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
    assert_eq!(error.data, Some(json!({"method": "nope"})));
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_notification_sends_nothing() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "method": "nope", "params": [1]})))
        .unwrap();

    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_cancel_for_unknown_id_is_ignored() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "method": "$/cancelRequest",
            "params": {"id": 1}
        })))
        .unwrap();
    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "method": "$/cancelRequest"})))
        .unwrap();
    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "method": "$/cancelRequest",
            "params": {"target": 1}
        })))
        .unwrap();

    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_wrong_version_is_dropped() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    endpoint
        .consume(raw(json!({"jsonrpc": "1.0", "id": 1, "method": "echo"})))
        .unwrap();
    endpoint
        .consume(raw(json!({"id": 2, "method": "echo"})))
        .unwrap();
    endpoint.consume_value(json!(["not", "a", "message"])).unwrap();

    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_handler_errors_become_error_responses() {
    let dispatcher = Dispatcher::new()
        .with_method("invalid", |_| {
            Err(RpcError::invalid_params("line must be positive").into())
        })
        .with_method("broken", |_| Err(anyhow::anyhow!("database offline")))
        .with_method("custom", |_| {
            Err(RpcError::application(-32001, "content modified", Some(json!({"v": 3}))).into())
        })
        .with_method("panics", |_| panic!("handler bug"));
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 5);

    for (id, method) in ["invalid", "broken", "custom", "panics"].iter().enumerate() {
        endpoint
            .consume(raw(json!({"jsonrpc": "2.0", "id": id, "method": method})))
            .unwrap();
    }

    let invalid = into_response(outbox.try_recv().unwrap());
    assert_eq!(invalid.id, RequestId::number(0));
    assert_eq!(invalid.error_object().unwrap().code, error_codes::INVALID_PARAMS);

    let broken = into_response(outbox.try_recv().unwrap());
    let error = broken.error_object().unwrap();
    assert_eq!(error.code, error_codes::INTERNAL_ERROR);
    assert_eq!(error.message, "database offline");
    assert!(error.data.is_some());

    let custom = into_response(outbox.try_recv().unwrap());
    assert_eq!(
        custom.error_object().unwrap(),
        &ErrorObject::new(-32001, "content modified").with_data(json!({"v": 3}))
    );

    let panicked = into_response(outbox.try_recv().unwrap());
    let error = panicked.error_object().unwrap();
    assert_eq!(panicked.id, RequestId::number(3));
    assert_eq!(error.code, error_codes::INTERNAL_ERROR);
    assert!(error.message.contains("handler bug"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deferred_request_is_answered_from_pool() {
    let (endpoint, mut outbox) = endpoint_with(plain_dispatcher(), 5);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 9, "method": "fast"})))
        .unwrap();

    let response = into_response(next(&mut outbox).await);
    assert_eq!(response, Response::success(RequestId::number(9), json!("fast")));

    endpoint.shutdown().await;
    assert_eq!(endpoint.pending_client_requests(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deferred_failures_keep_their_shape() {
    let dispatcher = Dispatcher::new()
        .with_method("busy", |_| {
            Ok(Reply::deferred(|| {
                Err(RpcError::application(-32001, "busy", Some(json!({"retry": true}))).into())
            }))
        })
        .with_method("crash", |_| {
            Ok(Reply::deferred(|| -> anyhow::Result<Value> {
                panic!("worker bug")
            }))
        });
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 1);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "busy"})))
        .unwrap();
    let busy = into_response(next(&mut outbox).await);
    assert_eq!(
        busy.error_object().unwrap(),
        &ErrorObject::new(-32001, "busy").with_data(json!({"retry": true}))
    );

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 2, "method": "crash"})))
        .unwrap();
    let crash = into_response(next(&mut outbox).await);
    let error = crash.error_object().unwrap();
    assert_eq!(crash.id, RequestId::number(2));
    assert_eq!(error.code, error_codes::INTERNAL_ERROR);
    assert!(error.message.contains("worker bug"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_before_start_answers_request_cancelled() {
    let touched = Arc::new(AtomicBool::new(false));
    let (dispatcher, gate) = test_dispatcher(touched.clone());
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 1);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "block"})))
        .unwrap();
    // The only worker is now busy
    gate.started.await.unwrap();

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 2, "method": "touch"})))
        .unwrap();
    assert_eq!(endpoint.pending_client_requests(), 2);

    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "method": CANCEL_METHOD,
            "params": {"id": 2}
        })))
        .unwrap();

    let cancelled = into_response(next(&mut outbox).await);
    assert_eq!(cancelled.id, RequestId::number(2));
    assert_eq!(
        cancelled.error_object().unwrap().code,
        error_codes::REQUEST_CANCELLED
    );

    gate.release.send(()).unwrap();
    let finished = into_response(next(&mut outbox).await);
    assert_eq!(
        finished,
        Response::success(RequestId::number(1), json!("unblocked"))
    );

    endpoint.shutdown().await;
    assert!(!touched.load(Ordering::SeqCst));
    assert_eq!(endpoint.pending_client_requests(), 0);
    assert!(outbox.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_after_start_delivers_original_result() {
    let (dispatcher, gate) = test_dispatcher(Arc::new(AtomicBool::new(false)));
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 1);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "block"})))
        .unwrap();
    gate.started.await.unwrap();

    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "method": CANCEL_METHOD,
            "params": {"id": 1}
        })))
        .unwrap();
    assert!(outbox.try_recv().is_err());

    gate.release.send(()).unwrap();
    let response = into_response(next(&mut outbox).await);
    assert_eq!(
        response,
        Response::success(RequestId::number(1), json!("unblocked"))
    );

    endpoint.shutdown().await;
    assert!(outbox.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_responses_may_complete_out_of_order() {
    let (dispatcher, gate) = test_dispatcher(Arc::new(AtomicBool::new(false)));
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 2);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "block"})))
        .unwrap();
    gate.started.await.unwrap();
    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 2, "method": "fast"})))
        .unwrap();

    let first = into_response(next(&mut outbox).await);
    assert_eq!(first, Response::success(RequestId::number(2), json!("fast")));

    gate.release.send(()).unwrap();
    let second = into_response(next(&mut outbox).await);
    assert_eq!(
        second,
        Response::success(RequestId::number(1), json!("unblocked"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_deferred_request_gets_exactly_one_response() {
    let dispatcher = Dispatcher::new().with_method("sleep", |params| {
        let ms = params
            .as_ref()
            .and_then(|p| p["ms"].as_u64())
            .unwrap_or(0);
        Ok(Reply::deferred(move || {
            std::thread::sleep(Duration::from_millis(ms));
            Ok(json!(ms))
        }))
    });
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 4);

    for id in 0..20i64 {
        let ms = (20 - id) as u64;
        endpoint
            .consume(raw(json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "sleep",
                "params": {"ms": ms}
            })))
            .unwrap();
    }

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let response = into_response(next(&mut outbox).await);
        let Some(id) = (match &response.id {
            RequestId::Number(n) => n.as_i64(),
            RequestId::String(_) => None,
        }) else {
            panic!("unexpected id {}", response.id);
        };
        assert_eq!(response.result(), Some(&json!((20 - id) as u64)));
        assert!(seen.insert(id), "duplicate response for {}", id);
    }

    endpoint.shutdown().await;
    assert!(outbox.try_recv().is_err());
    assert_eq!(endpoint.pending_client_requests(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_in_flight_id_is_rejected() {
    let (dispatcher, gate) = test_dispatcher(Arc::new(AtomicBool::new(false)));
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 2);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "block"})))
        .unwrap();
    gate.started.await.unwrap();

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "echo"})))
        .unwrap();
    let rejected = into_response(outbox.try_recv().unwrap());
    assert_eq!(
        rejected.error_object().unwrap().code,
        error_codes::INVALID_REQUEST
    );

    gate.release.send(()).unwrap();
    let finished = into_response(next(&mut outbox).await);
    assert_eq!(
        finished,
        Response::success(RequestId::number(1), json!("unblocked"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deferred_notification_runs_without_reply() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Option<Value>>();
    let dispatcher = Dispatcher::new()
        .with_method("textDocument/didSave", move |params| {
            let seen_tx = seen_tx.clone();
            Ok(Reply::deferred(move || {
                let _ = seen_tx.send(params);
                Ok(Value::Null)
            }))
        })
        .with_method("failing", |_| {
            Ok(Reply::deferred(|| Err(anyhow::anyhow!("lost the file"))))
        })
        .with_method("sync", |_| Ok(Reply::Immediate(json!("ignored"))));
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 2);

    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didSave",
            "params": {"uri": "file:///a.rs"}
        })))
        .unwrap();
    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "method": "failing"})))
        .unwrap();
    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "method": "sync"})))
        .unwrap();

    let params = timeout(Duration::from_secs(5), seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(params, Some(json!({"uri": "file:///a.rs"})));

    endpoint.shutdown().await;
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_outgoing_request_round_trip() {
    let (endpoint, mut outbox) = endpoint_with(Dispatcher::new(), 5);

    let pending = endpoint
        .request("workspace/configuration", Some(json!({"items": []})))
        .unwrap();
    assert_eq!(pending.id(), &RequestId::number(1));
    assert_eq!(
        outbox.try_recv().unwrap(),
        Message::Request(Request::new(
            RequestId::number(1),
            "workspace/configuration",
            Some(json!({"items": []}))
        ))
    );
    assert_eq!(endpoint.pending_server_requests(), 1);

    endpoint
        .consume(response_for(1, json!([{"tabSize": 4}])))
        .unwrap();
    assert_eq!(endpoint.pending_server_requests(), 0);
    assert_eq!(pending.await, Ok(json!([{"tabSize": 4}])));

    // A duplicate response is ignored
    endpoint
        .consume(response_for(1, json!("again")))
        .unwrap();
    assert_eq!(endpoint.pending_server_requests(), 0);
    assert!(outbox.try_recv().is_err());
}

#[tokio::test]
async fn test_response_for_unknown_id_changes_nothing() {
    let (endpoint, mut outbox) = endpoint_with(Dispatcher::new(), 5);
    let mut pending = endpoint.request("ping", None).unwrap();
    let _ = outbox.try_recv().unwrap();

    endpoint.consume(response_for(99, json!("stray"))).unwrap();

    assert_eq!(endpoint.pending_server_requests(), 1);
    assert!(pending.try_result().is_none());
}

#[tokio::test]
async fn test_error_response_fails_pending_request() {
    let (endpoint, _outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending = endpoint.request("window/showMessageRequest", None).unwrap();

    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32001, "message": "declined", "data": {"why": "user"}}
        })))
        .unwrap();

    assert_eq!(
        pending.await,
        Err(RpcError::Application(
            ErrorObject::new(-32001, "declined").with_data(json!({"why": "user"}))
        ))
    );
}

#[tokio::test]
async fn test_null_result_settles_with_null() {
    let (endpoint, _outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending = endpoint.request("shutdown", None).unwrap();

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "result": null})))
        .unwrap();

    assert_eq!(pending.await, Ok(Value::Null));
}

#[tokio::test]
async fn test_local_cancel_notifies_peer() {
    let (endpoint, mut outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending = endpoint.request("workspace/applyEdit", None).unwrap();
    let _request = outbox.try_recv().unwrap();

    assert!(pending.cancel());
    assert_eq!(
        outbox.try_recv().unwrap(),
        Message::Notification(Notification::new(CANCEL_METHOD, Some(json!({"id": 1}))))
    );
    assert!(!pending.cancel());
    assert_eq!(endpoint.pending_server_requests(), 0);

    // The peer answers anyway; nothing more happens
    endpoint.consume(response_for(1, json!(true))).unwrap();
    assert!(outbox.try_recv().is_err());

    assert_eq!(pending.await, Err(RpcError::RequestCancelled));
}

#[tokio::test]
async fn test_cancel_after_response_is_a_no_op() {
    let (endpoint, mut outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending = endpoint.request("ping", None).unwrap();
    let _request = outbox.try_recv().unwrap();

    endpoint.consume(response_for(1, json!("pong"))).unwrap();
    assert!(!pending.cancel());
    assert!(outbox.try_recv().is_err());
    assert_eq!(pending.await, Ok(json!("pong")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_wait_on_pending_request() {
    let (endpoint, _outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending = endpoint.request("ping", None).unwrap();

    let waiter = tokio::task::spawn_blocking(move || pending.wait());
    endpoint.consume(response_for(1, json!("pong"))).unwrap();

    let outcome = timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    assert_eq!(outcome, Ok(json!("pong")));
}

#[tokio::test]
async fn test_request_refuses_outstanding_id() {
    let (tx, _outbox) = mpsc::unbounded_channel();
    let endpoint = Endpoint::builder(Dispatcher::new(), tx)
        .id_generator(|| RequestId::from("same"))
        .build()
        .unwrap();

    let _first = endpoint.request("a", None).unwrap();
    let second = endpoint.request("b", None);
    assert!(matches!(
        second,
        Err(EndpointError::DuplicateRequestId(RequestId::String(ref id))) if id == "same"
    ));
    assert_eq!(endpoint.pending_server_requests(), 1);
}

#[tokio::test]
async fn test_notify_omits_missing_params() {
    let (endpoint, mut outbox) = endpoint_with(Dispatcher::new(), 5);

    endpoint.notify("initialized", None).unwrap();
    endpoint
        .notify("window/logMessage", Some(json!({"message": "hi"})))
        .unwrap();

    let first = serde_json::to_value(outbox.try_recv().unwrap()).unwrap();
    assert_eq!(first, json!({"jsonrpc": "2.0", "method": "initialized"}));
    let second = serde_json::to_value(outbox.try_recv().unwrap()).unwrap();
    assert_eq!(
        second,
        json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {"message": "hi"}})
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_in_flight_work() {
    let dispatcher = Dispatcher::new().with_method("slow", |_| {
        Ok(Reply::deferred(|| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(json!("slow"))
        }))
    });
    let (endpoint, mut outbox) = endpoint_with(dispatcher, 1);

    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 1, "method": "slow"})))
        .unwrap();
    endpoint
        .consume(raw(json!({"jsonrpc": "2.0", "id": 2, "method": "slow"})))
        .unwrap();

    timeout(Duration::from_secs(5), endpoint.shutdown())
        .await
        .unwrap();

    assert!(endpoint.is_shut_down());
    let mut answered: Vec<Response> = (0..2)
        .map(|_| into_response(outbox.try_recv().expect("accepted request was not answered")))
        .collect();
    answered.sort_by_key(|response| response.id.to_string());
    assert_eq!(
        answered,
        vec![
            Response::success(RequestId::number(1), json!("slow")),
            Response::success(RequestId::number(2), json!("slow")),
        ]
    );
    assert!(outbox.try_recv().is_err());
    assert!(matches!(
        endpoint.consume(raw(json!({"jsonrpc": "2.0", "id": 3, "method": "slow"}))),
        Err(EndpointError::Shutdown)
    ));
    assert!(matches!(
        endpoint.notify("exit", None),
        Err(EndpointError::Shutdown)
    ));
    assert!(matches!(
        endpoint.request("ping", None),
        Err(EndpointError::Shutdown)
    ));
}

#[tokio::test]
async fn test_shutdown_releases_outgoing_requests() {
    let (endpoint, _outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending = endpoint.request("ping", None).unwrap();

    endpoint.shutdown().await;

    assert!(matches!(
        pending.await,
        Err(RpcError::InternalError { .. })
    ));
    assert_eq!(endpoint.pending_server_requests(), 0);
}

#[test]
fn test_build_requires_runtime() {
    let (tx, _rx) = mpsc::unbounded_channel::<Message>();
    let result = Endpoint::builder(Dispatcher::new(), tx).build();
    assert!(matches!(result, Err(EndpointError::NoRuntime)));
}

#[test]
fn test_build_with_explicit_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let (tx, _rx) = mpsc::unbounded_channel::<Message>();

    let endpoint = Endpoint::builder(Dispatcher::new(), tx)
        .runtime(runtime.handle().clone())
        .build();
    assert!(endpoint.is_ok());
}

#[tokio::test]
async fn test_build_rejects_invalid_pool_size() {
    let (tx, _rx) = mpsc::unbounded_channel::<Message>();
    let result = Endpoint::builder(Dispatcher::new(), tx).max_workers(0).build();
    assert!(matches!(result, Err(EndpointError::Config(_))));
}

#[tokio::test]
async fn test_outgoing_requests_settle_independently() {
    let (endpoint, mut outbox) = endpoint_with(Dispatcher::new(), 5);
    let pending: Vec<_> = (0..3)
        .map(|i| endpoint.request("workspace/symbol", Some(json!({"n": i}))).unwrap())
        .collect();
    for _ in 0..3 {
        let _ = outbox.try_recv().unwrap();
    }

    // Answer in reverse order, the middle one with an error
    endpoint.consume(response_for(3, json!("third"))).unwrap();
    endpoint
        .consume(raw(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "error": {"code": -32800, "message": "Request Cancelled"}
        })))
        .unwrap();
    endpoint.consume(response_for(1, json!("first"))).unwrap();

    let outcomes = futures::future::join_all(pending).await;
    assert_eq!(
        outcomes,
        vec![
            Ok(json!("first")),
            Err(RpcError::RequestCancelled),
            Ok(json!("third")),
        ]
    );
}
