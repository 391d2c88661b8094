use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use equipment_visualizer::error::VizError;
use equipment_visualizer::view::{View, ViewState, spawn_fetch};

#[test]
fn worker_result_reaches_view() {
    let mut view: View<Vec<u32>> = View::new("history");
    let token = view.begin();
    let rx = spawn_fetch(token, || Ok(vec![1, 2, 3]));
    let (token, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(view.complete(&token, result));
    assert_eq!(view.state(), &ViewState::Ready(vec![1, 2, 3]));
}

#[test]
fn response_after_leaving_view_is_dropped() {
    let mut view: View<u32> = View::new("detail");
    let token = view.begin();
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let rx = spawn_fetch(token, move || {
        started_tx.send(()).ok();
        release_rx.recv().ok();
        Ok(7)
    });

    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    view.reset();
    release_tx.send(()).unwrap();
    let (token, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(!view.complete(&token, result));
    assert_eq!(view.state(), &ViewState::Idle);
}

#[test]
fn cancelled_token_skips_the_call() {
    let mut view: View<u32> = View::new("detail");
    let token = view.begin();
    view.cancel();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let rx = spawn_fetch(token, move || {
        flag.store(true, Ordering::SeqCst);
        Ok(1)
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
    assert!(!called.load(Ordering::SeqCst));
    assert!(view.state().is_loading());
}

#[test]
fn transport_error_message() {
    let mut view: View<u32> = View::new("history");
    let token = view.begin();
    view.complete(
        &token,
        Err(VizError::Transport("connection refused".to_string())),
    );
    assert_eq!(
        view.state().error(),
        Some("Failed to connect to server: connection refused")
    );
}
