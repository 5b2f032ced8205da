//! Integration tests: acceptor, sessions, and agents talking over real
//! TCP connections on localhost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use camlink_core::{
    Acceptor, AcceptorConfig, AgentConfig, CamError, FrameSource, PeerAgent, Selection,
    SessionRegistry, ShutdownReason, encode_camera_frame, encode_timing_ping, unix_now,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ── Helpers ──────────────────────────────────────────────────────

fn local_config() -> AcceptorConfig {
    AcceptorConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..Default::default()
    }
}

/// Bind an acceptor on an OS-assigned port and start it.
async fn start_acceptor(
    config: AcceptorConfig,
) -> (
    SessionRegistry,
    SocketAddr,
    tokio_util::sync::CancellationToken,
    tokio::task::JoinHandle<ShutdownReason>,
) {
    let registry = SessionRegistry::new();
    let acceptor = Acceptor::bind(config, registry.clone()).await.unwrap();
    let addr = acceptor.local_addr().unwrap();
    let token = acceptor.shutdown_token();
    let handle = tokio::spawn(acceptor.run());
    (registry, addr, token, handle)
}

/// Poll `cond` until it holds, failing the test after five seconds.
async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Serves a small JPEG-looking payload tagged with the source index.
struct FakeCameras {
    count: u8,
}

#[async_trait]
impl FrameSource for FakeCameras {
    fn sources(&self) -> Vec<Selection> {
        (1..=self.count).filter_map(|i| Selection::new(i).ok()).collect()
    }

    async fn capture_and_encode(&self, index: Selection) -> Option<Bytes> {
        (index.get() <= self.count).then(|| Bytes::from(vec![0xFF, 0xD8, index.get()]))
    }
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn ping_and_frame_reach_registry() {
    let (registry, addr, token, handle) = start_acceptor(local_config()).await;

    let mut camera = TcpStream::connect(addr).await.unwrap();
    let t0 = unix_now() - 0.25;
    camera.write_all(&encode_timing_ping(t0)).await.unwrap();
    camera
        .write_all(&encode_camera_frame(b"\xFF\xD8\xFF\xE0").unwrap())
        .await
        .unwrap();

    wait_until("frame", || registry.any_latest_frame().is_some()).await;
    assert_eq!(
        registry.any_latest_frame().unwrap(),
        Bytes::from_static(b"\xFF\xD8\xFF\xE0")
    );
    let avg = registry.average_latency();
    assert!((250.0..5000.0).contains(&avg), "average latency {avg}");

    token.cancel();
    assert_eq!(handle.await.unwrap(), ShutdownReason::Requested);
}

#[tokio::test]
async fn selection_reaches_agent() {
    let (registry, addr, token, handle) = start_acceptor(local_config()).await;

    let agent = PeerAgent::new(FakeCameras { count: 4 }, AgentConfig::default()).unwrap();
    let agent = Arc::new(agent);
    let stream = agent.connect(addr).await.unwrap();
    let runner = tokio::spawn({
        let agent = Arc::clone(&agent);
        async move { agent.run(stream).await }
    });

    wait_until("session", || registry.active_count() == 1).await;
    registry.set_selection(3).unwrap();
    wait_until("agent switch", || agent.requested().get() == 3).await;
    wait_until("frame from camera 3", || {
        registry
            .any_latest_frame()
            .is_some_and(|f| f.last() == Some(&3))
    })
    .await;

    agent.stop_handle().cancel();
    assert!(runner.await.unwrap().is_ok());
    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn raw_selection_byte_on_the_wire() {
    let (registry, addr, token, handle) = start_acceptor(local_config()).await;
    registry.set_selection(6).unwrap();

    let mut camera = TcpStream::connect(addr).await.unwrap();
    let mut byte = [0u8; 1];
    camera.read_exact(&mut byte).await.unwrap();
    assert_eq!(byte, [6]);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn partial_frame_then_close_removes_session() {
    let (registry, addr, _token, handle) = start_acceptor(local_config()).await;

    let mut camera = TcpStream::connect(addr).await.unwrap();
    wait_until("session", || registry.active_count() == 1).await;

    camera.write_all(&[b'c', 0, 0]).await.unwrap();
    drop(camera);

    wait_until("session removal", || registry.active_count() == 0).await;
    let reason = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("acceptor kept running")
        .unwrap();
    assert_eq!(reason, ShutdownReason::AllPeersLeft);
}

#[tokio::test]
async fn idle_timeout_without_cameras() {
    let config = AcceptorConfig {
        idle_timeout: Duration::from_millis(200),
        ..local_config()
    };
    let (registry, _addr, _token, handle) = start_acceptor(config).await;

    let reason = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("acceptor ignored idle timeout")
        .unwrap();
    assert_eq!(reason, ShutdownReason::IdleTimeout);
    assert!(!registry.ever_connected());
}

#[tokio::test]
async fn idle_timer_governs_when_not_exiting_on_empty() {
    let idle = Duration::from_millis(800);
    let config = AcceptorConfig {
        idle_timeout: idle,
        exit_when_empty: false,
        ..local_config()
    };
    let (registry, addr, _token, handle) = start_acceptor(config).await;

    let connected = tokio::time::Instant::now();
    let camera = TcpStream::connect(addr).await.unwrap();
    wait_until("session", || registry.active_count() == 1).await;
    drop(camera);
    wait_until("session removal", || registry.active_count() == 0).await;

    // Several poll ticks pass with no peers; the acceptor keeps running.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());

    let reason = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("acceptor ignored idle timeout")
        .unwrap();
    assert_eq!(reason, ShutdownReason::IdleTimeout);
    assert!(connected.elapsed() >= idle);
    assert!(registry.ever_connected());
}

#[tokio::test]
async fn sessions_past_grace_are_aborted() {
    let config = AcceptorConfig {
        shutdown_grace: Duration::ZERO,
        ..local_config()
    };
    let (registry, addr, token, handle) = start_acceptor(config).await;

    // Stays connected and silent through shutdown.
    let _camera = TcpStream::connect(addr).await.unwrap();
    wait_until("session", || registry.active_count() == 1).await;

    token.cancel();
    let reason = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("acceptor did not stop")
        .unwrap();
    assert_eq!(reason, ShutdownReason::Requested);
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn one_camera_leaving_does_not_affect_another() {
    let (registry, addr, token, handle) = start_acceptor(local_config()).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    wait_until("two sessions", || registry.active_count() == 2).await;
    let second_addr = second.local_addr().unwrap();

    first.write_all(b"xyz").await.unwrap();
    drop(first);
    wait_until("first removed", || registry.active_count() == 1).await;

    second
        .write_all(&encode_camera_frame(b"still here").unwrap())
        .await
        .unwrap();
    wait_until("second frame", || {
        registry.latest_frame(second_addr).is_some()
    })
    .await;
    assert!(!handle.is_finished());

    token.cancel();
    assert_eq!(handle.await.unwrap(), ShutdownReason::Requested);
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn agent_reports_server_shutdown() {
    let (registry, addr, token, handle) = start_acceptor(local_config()).await;

    let agent = PeerAgent::new(FakeCameras { count: 1 }, AgentConfig::default()).unwrap();
    let stream = agent.connect(addr).await.unwrap();
    let run = agent.run(stream);

    let stopper = async {
        wait_until("frame", || registry.any_latest_frame().is_some()).await;
        token.cancel();
        handle.await.unwrap()
    };

    let (result, reason) = tokio::join!(run, stopper);
    assert_eq!(reason, ShutdownReason::Requested);
    let err = result.unwrap_err();
    assert!(err.is_transient(), "unexpected error {err:?}");
}

#[tokio::test]
async fn agent_connect_refused() {
    // Grab a free port, then close it.
    let addr = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let agent = PeerAgent::new(FakeCameras { count: 1 }, AgentConfig::default()).unwrap();
    let err = agent.connect(addr).await.unwrap_err();
    assert!(matches!(
        err,
        CamError::Connection(_) | CamError::Timeout(_)
    ));
}
