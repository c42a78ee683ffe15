//! BandHub TCP server
//!
//! One thread, one readiness loop: the server runs on a current-thread tokio
//! runtime and every client connection is a task on the same `LocalSet`.
//! The dispatcher is shared through `Rc<RefCell<_>>`; a borrow is never held
//! across an `.await`, so each command (including its database calls) runs
//! to completion before any other client is serviced.

use crate::{
    codec::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_LEN},
    dispatcher::Dispatcher,
    error::{BandHubError, Result},
    identity::SqliteUserDirectory,
    persistence::SqliteBandRepository,
    protocol::{Request, Response},
};
use std::{cell::RefCell, future::Future, net::SocketAddr, path::PathBuf, rc::Rc};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::LocalSet,
};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// BandHub server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub table_name: String,
    pub users_table: String,
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            db_path: PathBuf::from("bands.db"),
            table_name: "music_bands".to_string(),
            users_table: "users".to_string(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// BandHub TCP server
pub struct BandServer {
    config: ServerConfig,
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl BandServer {
    /// Open the database, load the collection and bind the listening socket
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let repository = SqliteBandRepository::open(&config.db_path, &config.table_name)?;
        let users = SqliteUserDirectory::open(&config.db_path, &config.users_table)?;
        let dispatcher = Dispatcher::new(Box::new(repository), Box::new(users))?;
        Self::with_dispatcher(config, dispatcher).await
    }

    /// Bind a server around an already constructed dispatcher
    pub async fn with_dispatcher(config: ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        Ok(Self {
            config,
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve clients forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve clients until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let BandServer {
            config,
            listener,
            dispatcher,
        } = self;
        let dispatcher = Rc::new(RefCell::new(dispatcher));
        info!(
            addr = %listener.local_addr()?,
            bands = dispatcher.borrow().store().len(),
            "BandHub server listening"
        );

        let local = LocalSet::new();
        local
            .run_until(async move {
                tokio::pin!(shutdown);
                loop {
                    tokio::select! {
                        result = listener.accept() => match result {
                            Ok((stream, peer)) => {
                                info!(%peer, "client connected");
                                let dispatcher = Rc::clone(&dispatcher);
                                let max_frame_len = config.max_frame_len;
                                tokio::task::spawn_local(async move {
                                    match serve_connection(stream, dispatcher, max_frame_len).await {
                                        Ok(()) => info!(%peer, "client disconnected"),
                                        Err(err) => warn!(%peer, error = %err, "dropping client connection"),
                                    }
                                });
                            }
                            Err(err) => warn!(error = %err, "failed to accept connection"),
                        },
                        _ = &mut shutdown => {
                            info!("shutdown requested, stopping server");
                            break;
                        }
                    }
                }
            })
            .await;

        info!("server stopped");
        Ok(())
    }
}

/// Read requests from one client and answer each in arrival order
async fn serve_connection(
    mut stream: TcpStream,
    dispatcher: Rc<RefCell<Dispatcher>>,
    max_frame_len: usize,
) -> Result<()> {
    let mut decoder = FrameDecoder::new(max_frame_len);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            if decoder.has_partial() {
                return Err(BandHubError::MalformedStream(
                    "connection closed in the middle of a request".to_string(),
                ));
            }
            return Ok(());
        }
        decoder.extend(&chunk[..read]);

        while let Some(request) = decoder.decode::<Request>()? {
            debug!(command = request.command.name(), "request received");
            let response = dispatcher.borrow_mut().execute(request);
            let frame = match encode_frame(&response) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "could not encode response");
                    encode_frame(&Response::fail("Server error"))?
                }
            };
            stream.write_all(&frame).await?;
        }
        stream.flush().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::model::BandDraft;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: dir.path().join("bands.db"),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let dir = TempDir::new().unwrap();
        let server = BandServer::new(test_config(&dir)).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        server.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_serves_clients_on_one_thread() {
        let dir = TempDir::new().unwrap();
        let server = BandServer::new(test_config(&dir)).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();

        let session = async move {
            let mut client = Client::connect(&addr).await.unwrap();
            assert!(client.register("alice", "pw").await.unwrap().is_success());
            let response = client
                .add(BandDraft::new("Can", 0.0, 0.0, 5, 12))
                .await
                .unwrap();
            assert!(response.is_success());
            let bands = client.load().await.unwrap();
            assert_eq!(bands.len(), 1);
            assert_eq!(bands[0].owner_username, "alice");
            client.close().await.unwrap();
        };

        server.run_until(session).await.unwrap();
    }
}
