//! End-to-end command/result correlation and capacity rejection over a
//! real loopback `TcpListener`, mirroring the teacher's own
//! socket-backed integration tests rather than mocking the transport.

use std::sync::{Arc, Mutex};

use xen_core::channel::Dispatcher;
use xen_core::endpoint::{Client, Server};
use xen_core::evaluator::Evaluator;

struct UppercaseEvaluator;

impl Evaluator for UppercaseEvaluator {
    fn evaluate(&self, text: &str) -> Result<String, String> {
        if text.is_empty() {
            return Err("empty command".to_string());
        }
        Ok(text.to_uppercase())
    }
}

struct CaptureDispatcher {
    events: Arc<Mutex<Vec<(u64, String)>>>,
    results: Arc<Mutex<Vec<(u64, String)>>>,
    errors: Arc<Mutex<Vec<(u64, String)>>>,
}

impl Dispatcher for CaptureDispatcher {
    fn on_event(&mut self, serial: u64, text: &str) {
        self.events.lock().unwrap().push((serial, text.to_string()));
    }
    fn on_result(&mut self, serial: u64, text: &str) {
        self.results.lock().unwrap().push((serial, text.to_string()));
    }
    fn on_error(&mut self, serial: u64, text: &str) {
        self.errors.lock().unwrap().push((serial, text.to_string()));
    }
    fn on_unknown_category(&mut self, _category: &str, _serial: u64, _text: &str) {}
    fn on_raw(&mut self, _payload: &[u8]) {}
}

#[tokio::test]
async fn command_and_event_correlate_end_to_end() {
    let server = Server::bind("127.0.0.1:0", -1).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();

    let server_task = tokio::spawn(async move {
        let (_peer, handle) = server.accept().await.unwrap().unwrap();
        let mut channel = handle.lock().await;
        channel.set_evaluator(Box::new(UppercaseEvaluator));

        // one CMD, one EVT sent unsolicited from the server side
        channel.receive_once().await.unwrap();
        while channel.drain_one().await.unwrap() {}
        channel.send_event("server started").await.unwrap();
    });

    let mut client = Client::connect(&addr).await.unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let results = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    client
        .channel()
        .set_dispatcher(Some(Box::new(CaptureDispatcher {
            events: events.clone(),
            results: results.clone(),
            errors: errors.clone(),
        })));

    let serial = client.channel().send_command("hello").await.unwrap();
    server_task.await.unwrap();

    // drain both the OK reply and the EVT in whatever order they arrived
    client.channel().receive_once().await.unwrap();
    while client.channel().drain_one().await.unwrap() {}
    if results.lock().unwrap().is_empty() || events.lock().unwrap().is_empty() {
        client.channel().receive_once().await.unwrap();
        while client.channel().drain_one().await.unwrap() {}
    }

    assert_eq!(results.lock().unwrap()[0], (serial, "HELLO".to_string()));
    assert_eq!(events.lock().unwrap()[0].1, "server started");
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn evaluation_error_replies_err_and_keeps_channel_open() {
    let server = Server::bind("127.0.0.1:0", -1).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();

    let server_task = tokio::spawn(async move {
        let (_peer, handle) = server.accept().await.unwrap().unwrap();
        let mut channel = handle.lock().await;
        channel.set_evaluator(Box::new(UppercaseEvaluator));
        channel.receive_once().await.unwrap();
        channel.drain_one().await.unwrap();
        assert!(!channel.is_closed());
    });

    let mut client = Client::connect(&addr).await.unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    client
        .channel()
        .set_dispatcher(Some(Box::new(CaptureDispatcher {
            events: Arc::new(Mutex::new(Vec::new())),
            results: Arc::new(Mutex::new(Vec::new())),
            errors: errors.clone(),
        })));

    let serial = client.channel().send_command("").await.unwrap();
    server_task.await.unwrap();

    client.channel().receive_once().await.unwrap();
    client.channel().drain_one().await.unwrap();

    assert_eq!(errors.lock().unwrap()[0], (serial, "empty command".to_string()));
}

#[tokio::test]
async fn server_rejects_connections_past_capacity() {
    let server = Server::bind("127.0.0.1:0", 1).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();

    let first_client = tokio::spawn({
        let addr = addr.clone();
        async move { Client::connect(&addr).await.unwrap() }
    });
    let (_peer, _handle) = server.accept().await.unwrap().unwrap();
    let _first_client = first_client.await.unwrap();
    assert_eq!(server.peer_count().await, 1);

    let second_client = tokio::spawn(async move { Client::connect(&addr).await.unwrap() });
    let rejected = server.accept().await.unwrap();
    assert!(rejected.is_none());
    assert_eq!(server.peer_count().await, 1);

    let mut second_client = second_client.await.unwrap();
    let errors = Arc::new(Mutex::new(Vec::new()));
    second_client
        .channel()
        .set_dispatcher(Some(Box::new(CaptureDispatcher {
            events: Arc::new(Mutex::new(Vec::new())),
            results: Arc::new(Mutex::new(Vec::new())),
            errors: errors.clone(),
        })));
    second_client.channel().receive_once().await.unwrap();
    second_client.channel().drain_one().await.unwrap();
    assert_eq!(errors.lock().unwrap()[0].1, "capacity-exhausted");
}
