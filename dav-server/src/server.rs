//! Accepts connections and serves them with hyper's HTTP/1.1 server,
//! optionally behind TLS, draining in-flight connections on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use hyper::rt::{Read, Write};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use rustls_pemfile::{certs, private_key};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;

use crate::state::AppState;

trait Stream: Read + Write + Send + Unpin {}
impl<T: Unpin + AsyncRead + AsyncWrite + Send> Stream for TokioIo<T> {}

pub struct TlsMaterial {
    pub cert_path: String,
    pub key_path: String,
}

pub struct Server {
    bind_addr: SocketAddr,
    state: AppState,
    tls: Option<TlsAcceptor>,
}

impl Server {
    pub fn new_unsecured(bind_addr: SocketAddr, state: AppState) -> Self {
        Self { bind_addr, state, tls: None }
    }

    pub fn new_tls(bind_addr: SocketAddr, state: AppState, material: TlsMaterial) -> Result<Self> {
        let loaded_certs = certs(&mut std::io::BufReader::new(std::fs::File::open(&material.cert_path)?))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let loaded_key = private_key(&mut std::io::BufReader::new(std::fs::File::open(&material.key_path)?))?
            .ok_or_else(|| anyhow::anyhow!("no private key found in {}", material.key_path))?;

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(loaded_certs, loaded_key)?;
        Ok(Self { bind_addr, state, tls: Some(TlsAcceptor::from(Arc::new(tls_config))) })
    }

    pub async fn run(self, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "DAV server listening");

        let mut connections = FuturesUnordered::new();
        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::debug!(addr = %remote_addr, "accepted connection");

            let stream = match self.build_stream(socket).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(err = %e, "TLS handshake failed");
                    continue;
                }
            };

            let state = self.state.clone();
            let conn = tokio::spawn(async move {
                let result = http1::Builder::new()
                    .serve_connection(
                        stream,
                        service_fn(move |req| crate::router::route(state.clone(), req)),
                    )
                    .await;
                if let Err(e) = result {
                    tracing::debug!(err = %e, "connection ended with error");
                }
            });
            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("shutting down, draining in-flight connections");
        while connections.next().await.is_some() {}
        Ok(())
    }

    async fn build_stream(&self, socket: TcpStream) -> Result<Box<dyn Stream>> {
        match &self.tls {
            Some(acceptor) => {
                let stream = acceptor.clone().accept(socket).await?;
                Ok(Box::new(TokioIo::new(stream)))
            }
            None => Ok(Box::new(TokioIo::new(socket))),
        }
    }
}
