//! Classifying listeners
//!
//! Both listeners stamp every accepted connection with a [`ConnectionInfo`] carrying the
//! classification the listener was planned with. Axum hands that value to each request on
//! the connection through `ConnectInfo`, so classification happens once per connection,
//! before any request is parsed, and involves no I/O of its own.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use aperture_auth::{ClientCertificate, ConnectionClassification, ConnectionInfo};
use aperture_const::{ACCEPT_ERROR_BACKOFF, TLS_ACCEPT_BACKLOG, TLS_HANDSHAKE_TIMEOUT};
use aperture_observe::connection_span;
use axum::serve::Listener;
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::{server::TlsStream, TlsAcceptor};
use tracing::Instrument;

/// Plain TCP listener that classifies connections at accept
#[derive(Debug)]
pub struct ClassifyingListener {
    inner: TcpListener,
    classification: ConnectionClassification,
}

impl ClassifyingListener {
    /// Wrap a bound listener
    pub fn new(inner: TcpListener, classification: ConnectionClassification) -> Self {
        Self {
            inner,
            classification,
        }
    }

    /// Classes stamped on accepted connections
    pub fn classification(&self) -> ConnectionClassification {
        self.classification
    }
}

impl Listener for ClassifyingListener {
    type Io = TcpStream;
    type Addr = ConnectionInfo;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, remote_addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::trace!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    return (stream, ConnectionInfo::new(remote_addr, self.classification));
                }
                Err(e) => handle_accept_error(e).await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(ConnectionInfo::new(self.inner.local_addr()?, self.classification))
    }
}

/// TLS listener that classifies connections after the handshake
///
/// Handshakes run on their own tasks so a slow client cannot stall accepts. Completed
/// connections are queued for the server together with their [`ConnectionInfo`], which
/// includes the verified peer certificate when one was presented.
#[derive(Debug)]
pub struct TlsClassifyingListener {
    local_addr: SocketAddr,
    classification: ConnectionClassification,
    incoming: mpsc::Receiver<(TlsStream<TcpStream>, ConnectionInfo)>,
    accept_task: JoinHandle<()>,
}

impl TlsClassifyingListener {
    /// Start accepting on a bound listener
    ///
    /// # Errors
    ///
    /// Fails only if the bound address cannot be read back from the socket.
    pub fn new(
        inner: TcpListener,
        config: Arc<ServerConfig>,
        classification: ConnectionClassification,
    ) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        let (tx, incoming) = mpsc::channel(TLS_ACCEPT_BACKLOG);
        let span = connection_span(&local_addr.to_string(), &classification.to_string());
        let accept_task = tokio::spawn(
            accept_loop(inner, TlsAcceptor::from(config), classification, tx).instrument(span),
        );

        Ok(Self {
            local_addr,
            classification,
            incoming,
            accept_task,
        })
    }
}

impl Drop for TlsClassifyingListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl Listener for TlsClassifyingListener {
    type Io = TlsStream<TcpStream>;
    type Addr = ConnectionInfo;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.incoming.recv().await {
            Some(connection) => connection,
            // The accept loop has ended; there will be no more connections
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(ConnectionInfo::new(self.local_addr, self.classification))
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    classification: ConnectionClassification,
    tx: mpsc::Sender<(TlsStream<TcpStream>, ConnectionInfo)>,
) {
    while !tx.is_closed() {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                handle_accept_error(e).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(error = %e, "Failed to set TCP_NODELAY");
        }

        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(
            async move {
                let handshake =
                    tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await;
                let stream = match handshake {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        tracing::debug!(remote_addr = %remote_addr, error = %e, "TLS handshake failed");
                        return;
                    }
                    Err(_) => {
                        tracing::debug!(remote_addr = %remote_addr, "TLS handshake timed out");
                        return;
                    }
                };

                let info = ConnectionInfo::new(remote_addr, classification)
                    .with_tls(peer_certificate(&stream));
                if tx.send((stream, info)).await.is_err() {
                    tracing::debug!("Listener closed before the connection was served");
                }
            }
            .in_current_span(),
        );
    }
}

fn peer_certificate(stream: &TlsStream<TcpStream>) -> Option<ClientCertificate> {
    let (_, session) = stream.get_ref();
    let leaf = session.peer_certificates()?.first()?;
    match ClientCertificate::from_der(leaf.as_ref()) {
        Ok(certificate) => Some(certificate),
        Err(e) => {
            tracing::debug!(error = %e, "Peer certificate could not be parsed");
            None
        }
    }
}

async fn handle_accept_error(e: io::Error) {
    if is_connection_error(&e) {
        return;
    }

    // Typically running out of file descriptors; back off instead of spinning
    tracing::error!(error = %e, "Accept error");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use aperture_auth::TrafficClass;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_plain_listener_stamps_classification() {
        let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut listener = ClassifyingListener::new(
            inner,
            ConnectionClassification::only(TrafficClass::Telemetry),
        );
        let local = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(local.remote_addr()).await.unwrap();
            stream.write_all(b"x").await.unwrap();
        });

        let (_stream, info) = listener.accept().await;
        assert!(info.classification().contains(TrafficClass::Telemetry));
        assert!(!info.classification().contains(TrafficClass::Interactive));
        assert!(!info.is_tls());
        assert!(info.peer_certificate().is_none());
        client.await.unwrap();
    }

    #[test]
    fn test_connection_errors_are_not_fatal() {
        assert!(is_connection_error(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(!is_connection_error(&io::Error::other("too many open files")));
    }
}
