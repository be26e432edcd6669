//! Group server client.
//!
//! The group server's public key is configured out of band, so the session
//! is sealed to it directly with no key offer.

use sharevault_core::{Environment, Session};
use sharevault_crypto::{GroupKey, PublicIdentity};
use sharevault_proto::{
    Endpoint, Message, ResponseTag, Token,
    messages::{
        CreateUser, DeleteUser, GetKey, GetToken, GroupRequest, KeyIndex, MembershipRequest,
    },
};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::{ClientError, expect_status, unexpected};

/// Connection to the group server.
pub struct GroupClient<E: Environment> {
    session: Session<TcpStream, E>,
}

impl<E: Environment> GroupClient<E> {
    /// Connect and run the handshake against `server_key`.
    ///
    /// # Errors
    ///
    /// - `Io` if the TCP connection fails
    /// - `Channel` if the handshake fails (including a server that does not
    ///   hold `server_key`)
    pub async fn connect(
        addr: impl ToSocketAddrs,
        env: E,
        server_key: PublicIdentity,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let session = Session::connect(stream, env, server_key).await?;
        tracing::debug!("connected to group server");
        Ok(Self { session })
    }

    /// Log in and get a token bound to the file server at `endpoint`.
    pub async fn get_token(
        &mut self,
        username: &str,
        password: &str,
        endpoint: Endpoint,
    ) -> Result<Token, ClientError> {
        let request = Message::GetToken(GetToken {
            username: username.to_string(),
            password: password.to_string(),
            endpoint,
        });
        match self.session.request(request).await? {
            Message::TokenIssued(token) => Ok(token),
            Message::Status(tag) => Err(ClientError::Refused(tag)),
            other => Err(unexpected(&other)),
        }
    }

    /// Create an account. Admin only.
    pub async fn create_user(
        &mut self,
        token: &Token,
        username: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        let request = Message::CreateUser(CreateUser {
            username: username.to_string(),
            password: password.to_string(),
            token: token.clone(),
        });
        self.status(request, ResponseTag::SuccessCuser).await
    }

    /// Delete an account. Admin only.
    pub async fn delete_user(&mut self, token: &Token, username: &str) -> Result<(), ClientError> {
        let request =
            Message::DeleteUser(DeleteUser { username: username.to_string(), token: token.clone() });
        self.status(request, ResponseTag::SuccessDuser).await
    }

    /// Create a group owned by the caller.
    pub async fn create_group(&mut self, token: &Token, group: &str) -> Result<(), ClientError> {
        let request = Message::CreateGroup(group_request(token, group));
        self.status(request, ResponseTag::SuccessCgroup).await
    }

    /// Delete a group the caller owns.
    pub async fn delete_group(&mut self, token: &Token, group: &str) -> Result<(), ClientError> {
        let request = Message::DeleteGroup(group_request(token, group));
        self.status(request, ResponseTag::SuccessDgroup).await
    }

    /// Add a member to a group the caller owns.
    pub async fn add_user_to_group(
        &mut self,
        token: &Token,
        username: &str,
        group: &str,
    ) -> Result<(), ClientError> {
        let request = Message::AddUserToGroup(membership(token, username, group));
        self.status(request, ResponseTag::SuccessAddUserToGroup).await
    }

    /// Remove a member from a group the caller owns. The group key rotates.
    pub async fn remove_user_from_group(
        &mut self,
        token: &Token,
        username: &str,
        group: &str,
    ) -> Result<(), ClientError> {
        let request = Message::RemoveUserFromGroup(membership(token, username, group));
        self.status(request, ResponseTag::SuccessDeleteUserFromGroup).await
    }

    /// Make a member a co-owner.
    pub async fn add_owner(
        &mut self,
        token: &Token,
        username: &str,
        group: &str,
    ) -> Result<(), ClientError> {
        let request = Message::AddOwner(membership(token, username, group));
        self.status(request, ResponseTag::SuccessAddOwnerToGroup).await
    }

    /// Revoke a co-owner's ownership.
    pub async fn remove_owner(
        &mut self,
        token: &Token,
        username: &str,
        group: &str,
    ) -> Result<(), ClientError> {
        let request = Message::RemoveOwner(membership(token, username, group));
        self.status(request, ResponseTag::SuccessDeleteOwnerFromGroup).await
    }

    /// Members of a group the caller owns, sorted by name.
    pub async fn list_members(
        &mut self,
        token: &Token,
        group: &str,
    ) -> Result<Vec<String>, ClientError> {
        match self.session.request(Message::ListMembers(group_request(token, group))).await? {
            Message::Members(members) => Ok(members),
            Message::Status(tag) => Err(ClientError::Refused(tag)),
            other => Err(unexpected(&other)),
        }
    }

    /// A version of a group key and its resolved version number.
    pub async fn group_key(
        &mut self,
        token: &Token,
        group: &str,
        index: KeyIndex,
    ) -> Result<(GroupKey, u64), ClientError> {
        let request =
            Message::GetKey(GetKey { group: group.to_string(), index, token: token.clone() });
        match self.session.request(request).await? {
            Message::GroupKey(reply) => Ok((GroupKey::from_bytes(reply.key), reply.version)),
            Message::Status(tag) => Err(ClientError::Refused(tag)),
            other => Err(unexpected(&other)),
        }
    }

    /// Send `DISCONNECT` and close the connection.
    pub async fn disconnect(self) -> Result<(), ClientError> {
        Ok(self.session.disconnect().await?)
    }

    async fn status(&mut self, request: Message, success: ResponseTag) -> Result<(), ClientError> {
        let reply = self.session.request(request).await?;
        expect_status(&reply, success)
    }
}

fn group_request(token: &Token, group: &str) -> GroupRequest {
    GroupRequest { group: group.to_string(), token: token.clone() }
}

fn membership(token: &Token, username: &str, group: &str) -> MembershipRequest {
    MembershipRequest {
        username: username.to_string(),
        group: group.to_string(),
        token: token.clone(),
    }
}
