//! File server runtime.
//!
//! Each connection starts with the clear-text `KEY` exchange so the client
//! can pin this server's key, then runs the same secure channel as the group
//! server. Requests are authorized offline: the token must be signed by the
//! group server and bound to this server's advertised endpoint, and the
//! file's group must appear in the token's group list.
//!
//! # Transfers
//!
//! ```text
//! upload:   UPLOADF ─► READY, (CHUNK ─► READY)*, EOF ─► OK
//! download: DOWNLOADF ─► CHUNK, (DOWNLOADF ─► CHUNK)*, DOWNLOADF ─► EOF, OK
//! ```

use std::{future::Future, net::SocketAddr, sync::Arc};

use sharevault_core::{
    ChannelError, Environment, Session, TokenVerifier, offer_key,
};
use sharevault_crypto::IdentityKeyPair;
use sharevault_proto::{
    Endpoint, Message, ResponseTag, Token,
    messages::{CHUNK_SIZE, Chunk, FileRequest, Upload},
};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    config::FileServerConfig,
    error::ServerError,
    files::{SharedDirectory, normalize_path, read_chunk},
    storage::{FileRecord, Storage},
};

struct Shared<E: Environment, S: Storage> {
    env: E,
    identity: Arc<IdentityKeyPair>,
    verifier: TokenVerifier,
    advertise: Endpoint,
    storage: S,
    files: SharedDirectory,
}

type FileSession<E> = Session<TcpStream, E>;

/// Production file server.
pub struct FileServer<E: Environment, S: Storage> {
    listener: TcpListener,
    shared: Arc<Shared<E, S>>,
}

impl<E: Environment, S: Storage> FileServer<E, S> {
    /// Prepare the shared directory and bind the listener.
    ///
    /// `verifier` holds the group server's name and public key.
    ///
    /// # Errors
    ///
    /// - `Io` if the shared directory cannot be created or the address
    ///   cannot be bound
    pub async fn bind(
        config: &FileServerConfig,
        env: E,
        storage: S,
        identity: Arc<IdentityKeyPair>,
        verifier: TokenVerifier,
    ) -> Result<Self, ServerError> {
        let files = SharedDirectory::open(config.shared_dir()).await?;
        let listener = TcpListener::bind(&config.bind_address).await?;
        let shared = Arc::new(Shared {
            env,
            identity,
            verifier,
            advertise: config.advertise.clone(),
            storage,
            files,
        });
        Ok(Self { listener, shared })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// - `Io` if the local address cannot be read
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!(
            addr = %self.listener.local_addr()?,
            advertise = %self.shared.advertise,
            "file server listening"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, &shared).await {
                                match &e {
                                    ServerError::Channel(c) if c.is_protocol_violation() => {
                                        tracing::warn!(
                                            %peer,
                                            error = %c,
                                            "protocol violation, connection dropped"
                                        );
                                    },
                                    _ => tracing::debug!(%peer, error = %e, "connection ended"),
                                }
                            }
                        });
                    },
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
            }
        }

        tracing::info!("file server stopped");
        Ok(())
    }
}

async fn handle_connection<E: Environment, S: Storage>(
    mut stream: TcpStream,
    peer: SocketAddr,
    shared: &Shared<E, S>,
) -> Result<(), ServerError> {
    if !offer_key(&mut stream, &shared.identity).await? {
        tracing::info!(%peer, "client declined host key");
        return Ok(());
    }

    let mut session =
        Session::accept(stream, shared.env.clone(), Arc::clone(&shared.identity)).await?;
    tracing::info!(%peer, "secure channel established");

    let result = serve(&mut session, peer, shared).await;
    session.close().await;
    tracing::info!(%peer, "connection closed");
    result
}

async fn serve<E: Environment, S: Storage>(
    session: &mut FileSession<E>,
    peer: SocketAddr,
    shared: &Shared<E, S>,
) -> Result<(), ServerError> {
    loop {
        let request = match session.recv().await {
            Ok(request) => request,
            Err(ChannelError::PeerClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match request {
            Message::Disconnect => return Ok(()),
            Message::ListFiles { token } => {
                let reply = list_files(shared, &token)?;
                session.send(reply).await?;
            },
            Message::Upload(upload) => receive_upload(session, peer, shared, upload).await?,
            Message::Download(request) => send_download(session, peer, shared, request).await?,
            Message::DeleteFile(request) => {
                let reply = delete_file(shared, peer, request).await?;
                session.send(reply).await?;
            },
            other => {
                tracing::debug!(%peer, tag = other.tag(), "unsupported request");
                session.send(Message::Status(ResponseTag::Fail)).await?;
            },
        }
    }
}

impl<E: Environment, S: Storage> Shared<E, S> {
    fn authorize(&self, token: &Token) -> bool {
        match self.verifier.verify_for(token, &self.advertise) {
            Ok(()) => true,
            Err(rejection) => {
                tracing::info!(subject = token.subject(), %rejection, "token refused");
                false
            },
        }
    }
}

fn list_files<E: Environment, S: Storage>(
    shared: &Shared<E, S>,
    token: &Token,
) -> Result<Message, ServerError> {
    if !shared.authorize(token) {
        return Ok(Message::Status(ResponseTag::FailFileBadToken));
    }

    let visible = shared
        .storage
        .list_files()?
        .into_iter()
        .filter(|(_, record)| token.claims().has_group(&record.group))
        .map(|(path, _)| path)
        .collect();
    Ok(Message::FileList(visible))
}

async fn receive_upload<E: Environment, S: Storage>(
    session: &mut FileSession<E>,
    peer: SocketAddr,
    shared: &Shared<E, S>,
    upload: Upload,
) -> Result<(), ServerError> {
    if !shared.authorize(&upload.token) {
        session.send(Message::Status(ResponseTag::FailFileBadToken)).await?;
        return Ok(());
    }
    let Some(path) = normalize_path(&upload.path) else {
        session.send(Message::Status(ResponseTag::FailBadPath)).await?;
        return Ok(());
    };
    if shared.storage.load_file(&path)?.is_some() {
        session.send(Message::Status(ResponseTag::FailFileExists)).await?;
        return Ok(());
    }
    if !upload.token.claims().has_group(&upload.group) {
        session.send(Message::Status(ResponseTag::FailUnauthorized)).await?;
        return Ok(());
    }

    let mut staged = match shared.files.begin_upload(&path, shared.env.random_u64()).await {
        Ok(staged) => staged,
        Err(e) => {
            tracing::error!(%peer, %path, error = %e, "cannot stage upload");
            session.send(Message::Status(ResponseTag::ErrorTransfer)).await?;
            return Ok(());
        },
    };
    session.send(Message::Ready).await?;

    loop {
        let message = match session.recv().await {
            Ok(message) => message,
            Err(e) => {
                staged.abort().await;
                return Err(e.into());
            },
        };

        match message {
            Message::Chunk(Chunk { data }) => {
                if let Err(e) = staged.write(&data).await {
                    staged.abort().await;
                    tracing::error!(%peer, %path, error = %e, "upload write failed");
                    session.send(Message::Status(ResponseTag::ErrorTransfer)).await?;
                    return Ok(());
                }
                session.send(Message::Ready).await?;
            },
            Message::Eof => break,
            other => {
                staged.abort().await;
                tracing::info!(%peer, %path, tag = other.tag(), "upload aborted");
                session.send(Message::Status(ResponseTag::ErrorTransfer)).await?;
                return Ok(());
            },
        }
    }

    let record = FileRecord { owner: upload.token.subject().to_string(), group: upload.group };
    if !shared.storage.insert_file(&path, &record)? {
        // Another connection finished the same path first
        staged.abort().await;
        session.send(Message::Status(ResponseTag::FailFileExists)).await?;
        return Ok(());
    }
    if let Err(e) = staged.commit().await {
        shared.storage.remove_file(&path)?;
        tracing::error!(%peer, %path, error = %e, "upload commit failed");
        session.send(Message::Status(ResponseTag::ErrorTransfer)).await?;
        return Ok(());
    }

    tracing::info!(%peer, %path, group = %record.group, owner = %record.owner, "file uploaded");
    session.send(Message::Ok).await?;
    Ok(())
}

async fn send_download<E: Environment, S: Storage>(
    session: &mut FileSession<E>,
    peer: SocketAddr,
    shared: &Shared<E, S>,
    request: FileRequest,
) -> Result<(), ServerError> {
    let path = match authorize_existing(shared, &request, ResponseTag::ErrorFileMissing)? {
        Ok(path) => path,
        Err(tag) => {
            session.send(Message::Status(tag)).await?;
            return Ok(());
        },
    };
    let Some(mut file) = shared.files.open_file(&path).await? else {
        tracing::warn!(%peer, %path, "indexed file missing from disk");
        session.send(Message::Status(ResponseTag::ErrorNotOnDisk)).await?;
        return Ok(());
    };

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = read_chunk(&mut file, &mut buf).await?;
        if n == 0 {
            break;
        }
        let ack = session.request(Message::Chunk(Chunk { data: buf[..n].to_vec() })).await?;
        if ack != Message::NextChunk {
            tracing::info!(%peer, %path, tag = ack.tag(), "download aborted by client");
            return Ok(());
        }
    }

    let reply = session.request(Message::Eof).await?;
    if reply == Message::Ok {
        tracing::info!(%peer, %path, "file downloaded");
    } else {
        tracing::info!(%peer, %path, tag = reply.tag(), "download not acknowledged");
    }
    Ok(())
}

async fn delete_file<E: Environment, S: Storage>(
    shared: &Shared<E, S>,
    peer: SocketAddr,
    request: FileRequest,
) -> Result<Message, ServerError> {
    let path = match authorize_existing(shared, &request, ResponseTag::ErrorDoesntExist)? {
        Ok(path) => path,
        Err(tag) => return Ok(Message::Status(tag)),
    };

    match shared.files.remove(&path).await {
        Ok(()) => {
            shared.storage.remove_file(&path)?;
            tracing::info!(%peer, %path, by = request.token.subject(), "file deleted");
            Ok(Message::Ok)
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(%peer, %path, "indexed file missing from disk");
            Ok(Message::Status(ResponseTag::ErrorFileMissing))
        },
        Err(e) => {
            tracing::error!(%peer, %path, error = %e, "delete failed");
            Ok(Message::Status(ResponseTag::ErrorDelete))
        },
    }
}

/// Shared checks for download and delete: valid token, well-formed and
/// indexed path, and the file's group listed in the token. An unindexed path
/// is refused with `unindexed`.
fn authorize_existing<E: Environment, S: Storage>(
    shared: &Shared<E, S>,
    request: &FileRequest,
    unindexed: ResponseTag,
) -> Result<Result<String, ResponseTag>, ServerError> {
    if !shared.authorize(&request.token) {
        return Ok(Err(ResponseTag::FailFileBadToken));
    }
    let Some(path) = normalize_path(&request.path) else {
        return Ok(Err(ResponseTag::FailBadPath));
    };
    let Some(record) = shared.storage.load_file(&path)? else {
        return Ok(Err(unindexed));
    };
    if !request.token.claims().has_group(&record.group) {
        return Ok(Err(ResponseTag::ErrorPermission));
    }
    Ok(Ok(path))
}
