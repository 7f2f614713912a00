//! Integration tests module
//!
//! Every test binds its own server to `127.0.0.1:0`.

pub mod ceremony_test;
pub mod http_test;

use mpc_ceremony_relay::{RelayClient, RelayConfig, RelayServer, RelayService};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// A relay server running for the duration of a test
pub struct TestRelay {
    pub url: String,
    pub service: Arc<RelayService>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestRelay {
    pub async fn start(config: RelayConfig) -> Self {
        let server = RelayServer::new(config);
        let service = server.service();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let (shutdown, rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve_listener(listener, async {
            let _ = rx.await;
        }));

        Self {
            url,
            service,
            shutdown: Some(shutdown),
        }
    }

    pub fn client(&self) -> RelayClient {
        RelayClient::with_url(self.url.as_str()).unwrap()
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
