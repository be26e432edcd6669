//! Group server runtime.
//!
//! One tokio task per accepted connection. Each task owns its [`Session`]
//! and runs strictly request, then response. Shared state lives in the
//! [`AuthorizationEngine`]; a background task snapshots it to storage on a
//! fixed interval and once more on shutdown.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use sharevault_core::{AuthorizationEngine, ChannelError, Denial, Environment, Session};
use sharevault_crypto::IdentityKeyPair;
use sharevault_proto::{
    Message, ResponseTag,
    messages::{GroupKeyReply, KeyIndex},
};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    config::GroupServerConfig,
    error::ServerError,
    storage::{Storage, StorageError},
};

struct Shared<E: Environment, S: Storage> {
    env: E,
    identity: Arc<IdentityKeyPair>,
    engine: AuthorizationEngine<E>,
    storage: S,
}

impl<E: Environment, S: Storage> Shared<E, S> {
    fn save(&self) -> Result<(), StorageError> {
        let snapshot = self.engine.snapshot();
        self.storage.save_directory(&snapshot)?;
        tracing::debug!(?snapshot, "directory saved");
        Ok(())
    }
}

/// Production group server.
pub struct GroupServer<E: Environment, S: Storage> {
    listener: TcpListener,
    shared: Arc<Shared<E, S>>,
    autosave_interval: Duration,
}

impl<E: Environment, S: Storage> GroupServer<E, S> {
    /// Restore the directory from `storage`, bootstrap the admin if it is
    /// empty, and bind the listener.
    ///
    /// # Errors
    ///
    /// - `Storage` if the directory cannot be loaded or the bootstrap save
    ///   fails
    /// - `Bootstrap` if the admin name is invalid
    /// - `Io` if the address cannot be bound
    pub async fn bind(
        config: &GroupServerConfig,
        env: E,
        storage: S,
        identity: Arc<IdentityKeyPair>,
    ) -> Result<Self, ServerError> {
        let snapshot = storage.load_directory()?;
        let restored = !snapshot.is_empty();
        let engine = AuthorizationEngine::from_snapshot(
            env.clone(),
            config.authz.clone(),
            Arc::clone(&identity),
            snapshot,
        );
        let shared = Arc::new(Shared { env, identity, engine, storage });

        if restored {
            tracing::info!("directory restored from storage");
        } else if let Some(admin) = &config.admin {
            if shared
                .engine
                .bootstrap_admin(&admin.username, &admin.password)
                .map_err(ServerError::Bootstrap)?
            {
                shared.save()?;
            }
        } else {
            tracing::warn!("directory is empty and no admin credentials were supplied");
        }

        let listener = TcpListener::bind(&config.bind_address).await?;
        Ok(Self { listener, shared, autosave_interval: config.autosave_interval })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared authorization engine.
    pub fn engine(&self) -> &AuthorizationEngine<E> {
        &self.shared.engine
    }

    /// Accept connections until `shutdown` resolves, then save the
    /// directory one last time.
    ///
    /// # Errors
    ///
    /// - `Storage` if the final save fails
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tracing::info!(addr = %self.listener.local_addr()?, "group server listening");

        let autosave = tokio::spawn(autosave(Arc::clone(&self.shared), self.autosave_interval));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, &shared).await {
                                log_connection_error(peer, &e);
                            }
                        });
                    },
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
            }
        }

        autosave.abort();
        self.shared.save()?;
        tracing::info!("group server stopped");
        Ok(())
    }
}

async fn autosave<E: Environment, S: Storage>(shared: Arc<Shared<E, S>>, interval: Duration) {
    loop {
        shared.env.sleep(interval).await;
        if let Err(e) = shared.save() {
            tracing::error!(error = %e, "autosave failed");
        }
    }
}

async fn handle_connection<E: Environment, S: Storage>(
    stream: TcpStream,
    peer: SocketAddr,
    shared: &Shared<E, S>,
) -> Result<(), ServerError> {
    let mut session =
        Session::accept(stream, shared.env.clone(), Arc::clone(&shared.identity)).await?;
    tracing::info!(%peer, "secure channel established");

    loop {
        let request = match session.recv().await {
            Ok(request) => request,
            Err(ChannelError::PeerClosed) => break,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            },
        };
        if request == Message::Disconnect {
            break;
        }

        let reply = dispatch(&shared.engine, request);
        if let Message::Status(tag) = &reply {
            if !tag.is_success() {
                tracing::debug!(%peer, %tag, "request refused");
            }
        }
        session.send(reply).await?;
    }

    session.close().await;
    tracing::info!(%peer, "connection closed");
    Ok(())
}

fn log_connection_error(peer: SocketAddr, error: &ServerError) {
    match error {
        ServerError::Channel(e) if e.is_protocol_violation() => {
            tracing::warn!(%peer, error = %e, "protocol violation, connection dropped");
        },
        e => tracing::debug!(%peer, error = %e, "connection ended"),
    }
}

/// Answer one group server request.
///
/// Denials become their response tag; a request this server does not serve
/// is answered with `FAIL`.
pub fn dispatch<E: Environment>(engine: &AuthorizationEngine<E>, request: Message) -> Message {
    match request {
        Message::GetToken(req) => {
            match engine.issue_token(&req.username, &req.password, req.endpoint) {
                Ok(token) => Message::TokenIssued(token),
                Err(denial) => Message::Status(denial.tag()),
            }
        },
        Message::CreateUser(req) => status(
            engine.create_user(&req.token, &req.username, &req.password),
            ResponseTag::SuccessCuser,
        ),
        Message::DeleteUser(req) => {
            status(engine.delete_user(&req.token, &req.username), ResponseTag::SuccessDuser)
        },
        Message::CreateGroup(req) => {
            status(engine.create_group(&req.token, &req.group), ResponseTag::SuccessCgroup)
        },
        Message::DeleteGroup(req) => {
            status(engine.delete_group(&req.token, &req.group), ResponseTag::SuccessDgroup)
        },
        Message::AddUserToGroup(req) => status(
            engine.add_user_to_group(&req.token, &req.username, &req.group),
            ResponseTag::SuccessAddUserToGroup,
        ),
        Message::RemoveUserFromGroup(req) => status(
            engine.remove_user_from_group(&req.token, &req.username, &req.group),
            ResponseTag::SuccessDeleteUserFromGroup,
        ),
        Message::AddOwner(req) => status(
            engine.add_owner(&req.token, &req.username, &req.group),
            ResponseTag::SuccessAddOwnerToGroup,
        ),
        Message::RemoveOwner(req) => status(
            engine.remove_owner(&req.token, &req.username, &req.group),
            ResponseTag::SuccessDeleteOwnerFromGroup,
        ),
        Message::ListMembers(req) => match engine.list_members(&req.token, &req.group) {
            Ok(members) => Message::Members(members),
            Err(denial) => Message::Status(denial.tag()),
        },
        Message::GetKey(req) => group_key(engine, &req.token, &req.group, req.index),
        other => {
            tracing::debug!(tag = other.tag(), "unsupported request");
            Message::Status(ResponseTag::Fail)
        },
    }
}

fn group_key<E: Environment>(
    engine: &AuthorizationEngine<E>,
    token: &sharevault_proto::Token,
    group: &str,
    index: KeyIndex,
) -> Message {
    match engine.group_key(token, group, index) {
        Ok((key, version)) => {
            Message::GroupKey(GroupKeyReply { key: *key.as_bytes(), version: version as u64 })
        },
        Err(denial) => Message::Status(denial.tag()),
    }
}

fn status(result: Result<(), Denial>, success: ResponseTag) -> Message {
    Message::Status(result.map_or_else(Denial::tag, |()| success))
}
