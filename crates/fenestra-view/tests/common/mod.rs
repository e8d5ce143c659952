#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use url::Url;

use fenestra_bridge::{InboundMessage, MessageTransport};
use fenestra_core::{NavigationId, WebViewConfig};
use fenestra_view::{AdapterError, NavigationAdapter, WebView};

pub fn uri(s: &str) -> Url {
    Url::parse(s).unwrap()
}

/// Route test logs through the capture machinery. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine stub. Records invocations and announces every navigate call on a
/// channel so tests can synchronize with the coordination task.
pub struct TestAdapter {
    started: mpsc::UnboundedSender<(NavigationId, Url)>,
    pub navigations: Mutex<Vec<(NavigationId, Url)>>,
    pub scripts: Mutex<Vec<String>>,
    pub zoom: Mutex<f64>,
    pub has_history: AtomicBool,
    pub accept_commands: AtomicBool,
    pub reject_navigate: AtomicBool,
    pub hold_scripts: AtomicBool,
    pub release_scripts: Notify,
}

impl TestAdapter {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(NavigationId, Url)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                started: tx,
                navigations: Mutex::new(Vec::new()),
                scripts: Mutex::new(Vec::new()),
                zoom: Mutex::new(1.0),
                has_history: AtomicBool::new(false),
                accept_commands: AtomicBool::new(true),
                reject_navigate: AtomicBool::new(false),
                hold_scripts: AtomicBool::new(false),
                release_scripts: Notify::new(),
            }),
            rx,
        )
    }

    fn record(&self, navigation_id: &NavigationId, uri: &Url) {
        self.navigations
            .lock()
            .push((navigation_id.clone(), uri.clone()));
        let _ = self.started.send((navigation_id.clone(), uri.clone()));
    }
}

#[async_trait]
impl NavigationAdapter for TestAdapter {
    async fn navigate(&self, navigation_id: &NavigationId, uri: &Url) -> Result<(), AdapterError> {
        if self.reject_navigate.load(Ordering::SeqCst) {
            return Err(AdapterError::new("engine refused"));
        }
        self.record(navigation_id, uri);
        Ok(())
    }

    async fn navigate_to_content(
        &self,
        navigation_id: &NavigationId,
        _html: &str,
        base_uri: &Url,
    ) -> Result<(), AdapterError> {
        self.record(navigation_id, base_uri);
        Ok(())
    }

    fn can_go_back(&self) -> bool {
        self.has_history.load(Ordering::SeqCst)
    }

    fn can_go_forward(&self) -> bool {
        self.has_history.load(Ordering::SeqCst)
    }

    async fn go_back(&self, _navigation_id: &NavigationId) -> Result<bool, AdapterError> {
        Ok(self.accept_commands.load(Ordering::SeqCst))
    }

    async fn go_forward(&self, _navigation_id: &NavigationId) -> Result<bool, AdapterError> {
        Ok(self.accept_commands.load(Ordering::SeqCst))
    }

    async fn refresh(&self, _navigation_id: &NavigationId) -> Result<bool, AdapterError> {
        Ok(self.accept_commands.load(Ordering::SeqCst))
    }

    async fn stop(&self) {}

    async fn run_script(&self, script: &str) -> Result<Option<String>, AdapterError> {
        self.scripts.lock().push(script.to_owned());
        if self.hold_scripts.load(Ordering::SeqCst) {
            self.release_scripts.notified().await;
        }
        Ok(Some(format!("ran:{script}")))
    }

    fn zoom(&self) -> f64 {
        *self.zoom.lock()
    }

    async fn set_zoom(&self, factor: f64) -> Result<(), AdapterError> {
        *self.zoom.lock() = factor;
        Ok(())
    }
}

/// Outbound transport that records every delivered payload.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Wait until at least `count` payloads have been delivered.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transport never delivered the expected payloads")
    }
}

impl MessageTransport for RecordingTransport {
    fn deliver(&self, text: &str) {
        self.sent.lock().push(text.to_owned());
    }
}

pub fn new_view(adapter: Arc<TestAdapter>, config: WebViewConfig) -> WebView {
    init_tracing();
    WebView::new(adapter, RecordingTransport::new(), config)
}

/// Build an inbound message addressed to this view's channel.
pub fn inbound(view: &WebView, body: &str, origin: &str) -> InboundMessage {
    InboundMessage {
        body: body.to_owned(),
        origin: origin.to_owned(),
        channel_id: view.channel_id().clone(),
        protocol_version: 1,
    }
}

/// Flush the coordination queue: once this read completes, every previously
/// submitted operation and signal has been drained.
pub async fn settle(view: &WebView) {
    let _ = view.is_loading().await;
}
