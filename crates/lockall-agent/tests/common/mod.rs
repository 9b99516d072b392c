//! Shared fixtures for the agent integration tests.
//!
//! A simulated companion "scans" each code the [`RecordingRenderer`]
//! forwards, dials the listener through [`PeerConnection`], and answers with
//! whatever the test scripts.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use lockall_agent::application::{Dispatcher, Timeouts};
use lockall_agent::infrastructure::network::{
    EndpointFactory, ListenerConfig, ListenerError, PeerConnection, PeerEndpoint,
    SocketListenerFactory,
};
use lockall_agent::infrastructure::render::mock::RecordingRenderer;
use lockall_bridge::BridgeRegistry;
use lockall_core::{Command, Reply};

/// Listeners bound and advertised on loopback.
pub fn loopback_listener_config() -> ListenerConfig {
    ListenerConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        advertise_address: Some(Ipv4Addr::LOCALHOST),
    }
}

/// Short deadlines so failing tests fail fast.
pub fn test_timeouts() -> Timeouts {
    Timeouts {
        accept: Duration::from_secs(2),
        reply: Duration::from_secs(2),
        bridge_reply: Duration::from_secs(2),
    }
}

/// Counts how many endpoints were opened.
pub struct CountingFactory {
    inner: SocketListenerFactory,
    opened: AtomicUsize,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            inner: SocketListenerFactory::new(loopback_listener_config()),
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointFactory for CountingFactory {
    async fn open(&self) -> Result<Box<dyn PeerEndpoint>, ListenerError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open().await
    }
}

/// Everything a dispatcher test needs to inspect afterwards.
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<BridgeRegistry>,
    pub factory: Arc<CountingFactory>,
    pub renderer: Arc<RecordingRenderer>,
    pub codes: mpsc::UnboundedReceiver<String>,
}

pub fn harness(identity: &str) -> Harness {
    harness_with(identity, test_timeouts())
}

pub fn harness_with(identity: &str, timeouts: Timeouts) -> Harness {
    let registry = Arc::new(BridgeRegistry::new());
    let factory = Arc::new(CountingFactory::new());
    let (renderer, codes) = RecordingRenderer::with_feed();
    let renderer = Arc::new(renderer);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        factory.clone(),
        renderer.clone(),
        timeouts,
        identity,
    ));
    Harness {
        dispatcher,
        registry,
        factory,
        renderer,
        codes,
    }
}

/// What the simulated companion does after reading the command.
pub enum Script {
    /// Reply with the value the closure builds from the command.
    Answer(Box<dyn FnOnce(&Command) -> Reply + Send>),
    /// Hang up without replying.
    HangUp,
}

/// Waits for the next rendered code, dials it, and follows `script`.
///
/// Resolves to the command the host sent.
pub fn spawn_companion(
    mut codes: mpsc::UnboundedReceiver<String>,
    script: Script,
) -> JoinHandle<(Command, mpsc::UnboundedReceiver<String>)> {
    tokio::spawn(async move {
        let code = codes.recv().await.expect("a code must be rendered");
        let mut peer = PeerConnection::connect_text(&code)
            .await
            .expect("companion must reach the listener");
        let command = peer.next_command().await.expect("host must send a command");
        match script {
            Script::Answer(build) => {
                let reply = build(&command);
                peer.reply(&reply).await.expect("reply must be written");
            }
            Script::HangUp => drop(peer),
        }
        (command, codes)
    })
}
