//! Helpers shared by the unit tests.

use axum::Router;

/// A stub HTTP service listening on an ephemeral local port.
pub struct StubServer {
    pub url: String,
    _handle: tokio::task::JoinHandle<()>,
}

/// Serve `router` on `127.0.0.1:0` for the duration of a test.
pub async fn spawn_stub_server(router: Router) -> StubServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Stub server failed");
    });

    StubServer {
        url,
        _handle: handle,
    }
}

/// An address nothing is listening on.
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe listener");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);
    format!("http://{addr}")
}
