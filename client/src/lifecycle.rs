//! Per-server connection lifecycle
//!
//! Each monitored server runs one [`Lifecycle`] task:
//! Connecting (credential fetch) → Authenticating (transport open, auth
//! frame sent) → Streaming (after `auth success`, stats requested) → Closed,
//! then a fixed delay and back to Connecting. The loop only ends when the
//! registry retires the handle's generation or aborts the task.

use crate::backend::CredentialSource;
use crate::error::TelemetryError;
use crate::store::{ConnectionPhase, TelemetryStore};
use crate::transport::{Connector, Transport};
use log::{debug, info, warn};
use shared::{InboundFrame, OutboundFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub(crate) struct Lifecycle<C, K> {
    server_id: String,
    generation: u64,
    credentials: Arc<C>,
    connector: Arc<K>,
    store: TelemetryStore,
    reconnect_delay: Duration,
}

impl<C: CredentialSource, K: Connector> Lifecycle<C, K> {
    pub(crate) fn new(
        server_id: String,
        generation: u64,
        credentials: Arc<C>,
        connector: Arc<K>,
        store: TelemetryStore,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            server_id,
            generation,
            credentials,
            connector,
            store,
            reconnect_delay,
        }
    }

    /// Connects, streams until the transport closes, then waits and retries.
    /// Never returns an error; stops once the handle is no longer live.
    pub(crate) async fn run(self) {
        loop {
            if !self.store.begin_attempt(&self.server_id, self.generation) {
                break;
            }

            let error = match self.connect_and_stream().await {
                Ok(()) => {
                    info!("[{}] Telemetry stream closed", self.server_id);
                    None
                }
                Err(e) => {
                    warn!("[{}] Telemetry connection failed: {}", self.server_id, e);
                    Some(e.to_string())
                }
            };

            if !self.store.record_closed(&self.server_id, self.generation, error) {
                break;
            }

            debug!(
                "[{}] Reconnecting in {:?}",
                self.server_id, self.reconnect_delay
            );
            sleep(self.reconnect_delay).await;
        }

        debug!("[{}] Lifecycle {} stopped", self.server_id, self.generation);
    }

    async fn connect_and_stream(&self) -> Result<(), TelemetryError> {
        let credential = self.credentials.fetch_credential(&self.server_id).await?;

        self.store
            .set_phase(&self.server_id, self.generation, ConnectionPhase::Authenticating);
        let mut transport = self.connector.connect(&credential.socket_url).await?;
        send_frame(&mut transport, OutboundFrame::Auth { token: credential.token }).await?;

        while let Some(message) = transport.next_text().await {
            let text = message?;
            self.handle_frame(&mut transport, &text).await?;
        }

        Ok(())
    }

    /// Applies one inbound frame. Undecodable frames are dropped; an `Err`
    /// means the connection has to be closed.
    async fn handle_frame<T: Transport>(
        &self,
        transport: &mut T,
        text: &str,
    ) -> Result<(), TelemetryError> {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[{}] Dropping frame: {}", self.server_id, e);
                return Ok(());
            }
        };

        match frame {
            InboundFrame::AuthSuccess => {
                info!("[{}] Authenticated, requesting stats", self.server_id);
                self.store
                    .set_phase(&self.server_id, self.generation, ConnectionPhase::Streaming);
                send_frame(transport, OutboundFrame::SendStats).await?;
            }

            InboundFrame::Stats(metrics) => {
                self.store
                    .record_metrics(&self.server_id, self.generation, metrics);
            }

            InboundFrame::Status(raw) => {
                self.store.record_status(&self.server_id, self.generation, &raw);
            }

            InboundFrame::TokenExpiring => {
                info!("[{}] Token expiring, re-authenticating", self.server_id);
                let credential = self.credentials.fetch_credential(&self.server_id).await?;
                send_frame(transport, OutboundFrame::Auth { token: credential.token }).await?;
            }

            InboundFrame::TokenExpired => return Err(TelemetryError::TokenExpired),

            InboundFrame::Unknown(event) => {
                debug!("[{}] Ignoring `{}` event", self.server_id, event);
            }
        }

        Ok(())
    }
}

async fn send_frame<T: Transport>(
    transport: &mut T,
    frame: OutboundFrame,
) -> Result<(), TelemetryError> {
    let text = frame.encode()?;
    transport.send_text(text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Credential, ServerMetrics, ServerStatus};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::Mutex;

    /// Transport replaying a fixed script of inbound frames, recording what was sent
    struct ScriptedTransport {
        inbound: VecDeque<Result<String, TelemetryError>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Transport for ScriptedTransport {
        fn send_text(
            &mut self,
            text: String,
        ) -> impl Future<Output = Result<(), TelemetryError>> + Send {
            self.sent.lock().unwrap().push(text);
            async { Ok(()) }
        }

        fn next_text(
            &mut self,
        ) -> impl Future<Output = Option<Result<String, TelemetryError>>> + Send {
            let next = self.inbound.pop_front();
            async move { next }
        }
    }

    struct StaticCredentials;

    impl CredentialSource for StaticCredentials {
        fn fetch_credential(
            &self,
            server_id: &str,
        ) -> impl Future<Output = Result<Credential, TelemetryError>> + Send {
            let credential = Credential {
                socket_url: format!("ws://test/{}", server_id),
                token: "token-1".to_string(),
            };
            async move { Ok(credential) }
        }
    }

    struct NoConnector;

    impl Connector for NoConnector {
        type Transport = ScriptedTransport;

        fn connect(
            &self,
            _socket_url: &str,
        ) -> impl Future<Output = Result<ScriptedTransport, TelemetryError>> + Send {
            async { Err(TelemetryError::Transport("not used".to_string())) }
        }
    }

    /// Fails every connect, remembering the phase the handle was in at the time
    struct PhaseRecordingConnector {
        store: TelemetryStore,
        seen: Mutex<Option<ConnectionPhase>>,
    }

    impl Connector for PhaseRecordingConnector {
        type Transport = ScriptedTransport;

        fn connect(
            &self,
            _socket_url: &str,
        ) -> impl Future<Output = Result<ScriptedTransport, TelemetryError>> + Send {
            let phase = self.store.connection("srv1").map(|state| state.phase);
            *self.seen.lock().unwrap() = phase;
            async { Err(TelemetryError::Transport("refused".to_string())) }
        }
    }

    fn lifecycle_for(server_id: &str) -> (Lifecycle<StaticCredentials, NoConnector>, TelemetryStore) {
        let store = TelemetryStore::new();
        store.admit(server_id, 1);
        let lifecycle = Lifecycle::new(
            server_id.to_string(),
            1,
            Arc::new(StaticCredentials),
            Arc::new(NoConnector),
            store.clone(),
            Duration::from_secs(5),
        );
        (lifecycle, store)
    }

    fn transport() -> (ScriptedTransport, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            inbound: VecDeque::new(),
            sent: Arc::clone(&sent),
        };
        (transport, sent)
    }

    #[tokio::test]
    async fn test_auth_success_requests_stats_once() {
        let (lifecycle, store) = lifecycle_for("srv1");
        let (mut transport, sent) = transport();

        lifecycle
            .handle_frame(&mut transport, r#"{"event":"auth success"}"#)
            .await
            .unwrap();

        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("send stats"));
        assert_eq!(
            store.connection("srv1").unwrap().phase,
            ConnectionPhase::Streaming
        );
    }

    #[tokio::test]
    async fn test_stats_frame_updates_metrics_only() {
        let (lifecycle, store) = lifecycle_for("abc");
        let (mut transport, sent) = transport();

        let text = r#"{"event":"stats","args":["{\"cpu_absolute\":12.5,\"memory_bytes\":104857600,\"disk_bytes\":524288000}"]}"#;
        lifecycle.handle_frame(&mut transport, text).await.unwrap();

        assert_eq!(
            store.server_metrics("abc"),
            ServerMetrics::new(12.5, 104_857_600.0, 524_288_000.0)
        );
        assert!(store.statuses().is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_frame_updates_status_only() {
        let (lifecycle, store) = lifecycle_for("abc");
        let (mut transport, _) = transport();

        lifecycle
            .handle_frame(&mut transport, r#"{"event":"status","args":["running"]}"#)
            .await
            .unwrap();

        assert_eq!(store.status("abc"), ServerStatus::Running);
        assert!(store.metrics().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (lifecycle, store) = lifecycle_for("abc");
        let (mut transport, _) = transport();

        let frames = [
            "garbage",
            r#"{"event":"stats","args":["{not json"]}"#,
            r#"{"event":"stats"}"#,
            r#"{"event":"status","args":[]}"#,
        ];
        for text in frames {
            assert!(lifecycle.handle_frame(&mut transport, text).await.is_ok());
        }

        assert!(store.metrics().is_empty());
        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let (lifecycle, store) = lifecycle_for("abc");
        let (mut transport, sent) = transport();

        lifecycle
            .handle_frame(&mut transport, r#"{"event":"console output","args":["[INFO] Done"]}"#)
            .await
            .unwrap();

        assert!(store.metrics().is_empty());
        assert!(store.statuses().is_empty());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_expiring_sends_fresh_auth() {
        let (lifecycle, _) = lifecycle_for("abc");
        let (mut transport, sent) = transport();

        lifecycle
            .handle_frame(&mut transport, r#"{"event":"token expiring"}"#)
            .await
            .unwrap();

        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(r#""event":"auth""#));
        assert!(sent[0].contains("token-1"));
    }

    #[tokio::test]
    async fn test_token_expired_closes_connection() {
        let (lifecycle, _) = lifecycle_for("abc");
        let (mut transport, _) = transport();

        let result = lifecycle
            .handle_frame(&mut transport, r#"{"event":"token expired"}"#)
            .await;
        assert!(matches!(result, Err(TelemetryError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_retired_handle_does_not_write() {
        let (lifecycle, store) = lifecycle_for("abc");
        let (mut transport, _) = transport();
        store.retire("abc");

        lifecycle
            .handle_frame(&mut transport, r#"{"event":"status","args":["running"]}"#)
            .await
            .unwrap();

        assert!(store.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_run_exits_once_retired() {
        let (lifecycle, store) = lifecycle_for("abc");
        store.retire("abc");

        // Returns straight away instead of looping on the failing connector
        lifecycle.run().await;
    }

    #[tokio::test]
    async fn test_transport_opens_while_authenticating() {
        let store = TelemetryStore::new();
        store.admit("srv1", 1);
        let connector = Arc::new(PhaseRecordingConnector {
            store: store.clone(),
            seen: Mutex::new(None),
        });
        let lifecycle = Lifecycle::new(
            "srv1".to_string(),
            1,
            Arc::new(StaticCredentials),
            Arc::clone(&connector),
            store.clone(),
            Duration::from_secs(5),
        );

        assert!(store.begin_attempt("srv1", 1));
        let result = lifecycle.connect_and_stream().await;

        assert!(matches!(result, Err(TelemetryError::Transport(_))));
        assert_eq!(
            *connector.seen.lock().unwrap(),
            Some(ConnectionPhase::Authenticating)
        );
    }
}
