//! Group and user policy engine.
//!
//! Owns the directory (users, groups, group keys) and enforces who may change
//! it. Every operation authenticates the caller's token first, then walks a
//! fixed chain of checks; the first failing check is returned as a
//! [`Denial`] that maps to exactly one response tag.
//!
//! # Concurrency
//!
//! Each collection has its own mutex. Operations that touch several take
//! them in the order users → groups → keys (the password throttle is a leaf
//! and may be taken after any of them), and hold them for the whole
//! check-then-modify sequence, so concurrent connections never observe a
//! half-applied change. Guards are never held across an `.await`.
//!
//! # Invariants
//!
//! - Every group named in a user's memberships or ownerships is registered.
//! - Every registered group has at least one owner, and owners are members
//!   when ownership is granted.
//! - Policy decisions use live state. The group list inside a token is a
//!   snapshot for file servers and is never consulted here.

#![allow(clippy::disallowed_types, reason = "Synchronous locking only, never held across await")]

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use sharevault_crypto::{GroupKey, IdentityKeyPair, PasswordHash};
use sharevault_proto::{
    Endpoint, ResponseTag, Token, TokenClaims, is_valid_name, messages::KeyIndex,
};
use thiserror::Error;

use crate::{
    credentials::{DEFAULT_PASSWORD_THROTTLE, PasswordThrottle, UserRecord},
    env::Environment,
    keyring::KeyRing,
    snapshot::{DirectorySnapshot, UserEntry},
    token::{TokenVerifier, sign_token},
};

/// Name of the administrators group.
pub const ADMIN_GROUP: &str = "ADMIN";

/// Default name of the group server (the token issuer).
pub const DEFAULT_SERVER_NAME: &str = "ALPHA";

/// Reason a request was refused.
///
/// Denials are ordinary outcomes, not connection errors: the server answers
/// with [`Denial::tag`] and keeps the connection open.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Denial {
    /// Caller token failed verification or names a deleted user
    #[error("invalid token")]
    BadToken,
    /// Caller is not in ADMIN
    #[error("caller is not an administrator")]
    NotAdmin,
    /// Caller does not own the group
    #[error("caller does not own the group")]
    NotOwner,
    /// Target user already exists
    #[error("user already exists")]
    UserExists,
    /// Target group already exists
    #[error("group already exists")]
    GroupExists,
    /// Target user does not exist
    #[error("user does not exist")]
    UserMissing,
    /// Target group does not exist
    #[error("group does not exist")]
    GroupMissing,
    /// Target is already a member
    #[error("user is already a member")]
    AlreadyMember,
    /// Target is not a member
    #[error("user is not a member")]
    NotMember,
    /// Target already owns the group
    #[error("user already owns the group")]
    AlreadyOwner,
    /// Target does not own the group
    #[error("user does not own the group")]
    TargetNotOwner,
    /// Change would leave the group without an owner
    #[error("group would have no owner")]
    LastOwner,
    /// Name is empty or contains the token delimiter
    #[error("invalid name")]
    InvalidName,
    /// Caller may not read this key, or the version does not exist
    #[error("group key unavailable")]
    KeyUnavailable,
    /// Unknown user, wrong password or throttled check
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Server could not sign the token
    #[error("token signing failed")]
    SigningFailed,
}

impl Denial {
    /// Response tag sent to the client.
    pub fn tag(self) -> ResponseTag {
        match self {
            Self::BadToken => ResponseTag::FailBadToken,
            Self::NotAdmin => ResponseTag::FailNoAdmin,
            Self::NotOwner => ResponseTag::FailNoOwner,
            Self::UserExists => ResponseTag::FailUserExist,
            Self::GroupExists => ResponseTag::FailGroupExist,
            Self::UserMissing => ResponseTag::FailUserNoExist,
            Self::GroupMissing => ResponseTag::FailGroupNoExist,
            Self::AlreadyMember => ResponseTag::FailMember,
            Self::NotMember => ResponseTag::FailNoMember,
            Self::AlreadyOwner => ResponseTag::FailOwner,
            Self::TargetNotOwner => ResponseTag::FailUserNoOwner,
            Self::LastOwner => ResponseTag::FailLastOwner,
            Self::InvalidName => ResponseTag::FailBadName,
            Self::KeyUnavailable => ResponseTag::FailGetKey,
            Self::InvalidCredentials | Self::SigningFailed => ResponseTag::FailGet,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// Issuer name written into tokens and required when validating them
    pub server_name: String,
    /// Minimum interval between password checks per user
    pub password_throttle: Duration,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            password_throttle: DEFAULT_PASSWORD_THROTTLE,
        }
    }
}

/// Shared directory state and the policy that guards it.
pub struct AuthorizationEngine<E: Environment> {
    env: E,
    config: AuthzConfig,
    identity: Arc<IdentityKeyPair>,
    verifier: TokenVerifier,
    users: Mutex<HashMap<String, UserRecord>>,
    groups: Mutex<BTreeSet<String>>,
    keys: Mutex<KeyRing>,
    throttle: Mutex<PasswordThrottle<E::Instant>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // State is only mutated after all checks pass, so a panic elsewhere never
    // leaves a collection half-updated.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<E: Environment> AuthorizationEngine<E> {
    /// Engine with an empty directory.
    pub fn new(env: E, config: AuthzConfig, identity: Arc<IdentityKeyPair>) -> Self {
        Self::from_snapshot(env, config, identity, DirectorySnapshot::default())
    }

    /// Engine restored from persisted state.
    pub fn from_snapshot(
        env: E,
        config: AuthzConfig,
        identity: Arc<IdentityKeyPair>,
        snapshot: DirectorySnapshot,
    ) -> Self {
        let verifier = TokenVerifier::new(config.server_name.clone(), identity.public().clone());

        let users = snapshot
            .users
            .into_iter()
            .map(|(name, entry)| {
                let record = UserRecord {
                    password: PasswordHash::from_parts(entry.salt, entry.digest),
                    groups: entry.groups,
                    owned: entry.owned,
                };
                (name, record)
            })
            .collect();

        let mut keys = KeyRing::new();
        for (group, history) in snapshot.keys {
            keys.restore(&group, history.into_iter().map(GroupKey::from_bytes).collect());
        }

        Self {
            throttle: Mutex::new(PasswordThrottle::new(config.password_throttle)),
            env,
            config,
            identity,
            verifier,
            users: Mutex::new(users),
            groups: Mutex::new(snapshot.groups),
            keys: Mutex::new(keys),
        }
    }

    /// Consistent copy of the whole directory.
    pub fn snapshot(&self) -> DirectorySnapshot {
        let users = lock(&self.users);
        let groups = lock(&self.groups);
        let keys = lock(&self.keys);

        DirectorySnapshot {
            users: users
                .iter()
                .map(|(name, user)| {
                    let entry = UserEntry {
                        salt: *user.password.salt(),
                        digest: *user.password.digest(),
                        groups: user.groups.clone(),
                        owned: user.owned.clone(),
                    };
                    (name.clone(), entry)
                })
                .collect(),
            groups: groups.clone(),
            keys: keys
                .iter()
                .map(|(group, history)| {
                    (group.to_string(), history.iter().map(|k| *k.as_bytes()).collect())
                })
                .collect(),
        }
    }

    /// Issuer name of this server.
    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    /// Create the first administrator when the directory is empty.
    ///
    /// Creates the user, the ADMIN group (user as member and owner) and its
    /// first key. Returns `Ok(false)` without changes if any user exists.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if `username` is not a valid name
    pub fn bootstrap_admin(&self, username: &str, password: &str) -> Result<bool, Denial> {
        if !is_valid_name(username) {
            return Err(Denial::InvalidName);
        }

        let mut users = lock(&self.users);
        if !users.is_empty() {
            return Ok(false);
        }
        let mut groups = lock(&self.groups);
        let mut keys = lock(&self.keys);

        let mut admin = UserRecord::new(self.hash_password(password));
        admin.groups.insert(ADMIN_GROUP.to_string());
        admin.owned.insert(ADMIN_GROUP.to_string());
        users.insert(username.to_string(), admin);
        groups.insert(ADMIN_GROUP.to_string());
        keys.rotate(ADMIN_GROUP, self.fresh_key());

        lock(&self.throttle).record(username, self.env.now());
        tracing::info!(admin = username, "bootstrapped administrator");
        Ok(true)
    }

    /// Check a username and password and issue a token bound to `endpoint`.
    ///
    /// The token lists the user's current memberships.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown user, a wrong password or a
    ///   check within the throttle interval
    /// - `InvalidName` if the endpoint cannot be encoded in a token
    /// - `SigningFailed` if the RSA signature cannot be produced
    pub fn issue_token(
        &self,
        username: &str,
        password: &str,
        endpoint: Endpoint,
    ) -> Result<Token, Denial> {
        let now = self.env.now();
        let users = lock(&self.users);
        let Some(user) = users.get(username) else {
            return Err(Denial::InvalidCredentials);
        };

        let permitted = lock(&self.throttle).permit(username, now);
        if !permitted || !user.password.verify(password) {
            return Err(Denial::InvalidCredentials);
        }

        let claims = TokenClaims {
            issuer: self.config.server_name.clone(),
            subject: username.to_string(),
            groups: user.groups.iter().cloned().collect(),
            endpoint,
        };
        drop(users);

        if !claims.is_well_formed() {
            return Err(Denial::InvalidName);
        }

        sign_token(&self.identity, claims).map_err(|e| {
            tracing::error!(error = %e, "failed to sign token");
            Denial::SigningFailed
        })
    }

    /// Validate a token as this server would for any request.
    ///
    /// # Errors
    ///
    /// - `BadToken` if the token is malformed, from another issuer, not
    ///   signed by this server, or names a user that no longer exists
    pub fn verify_token(&self, token: &Token) -> Result<(), Denial> {
        self.verify_signature(token)?;
        let users = lock(&self.users);
        live_subject(token, &users).map(|_| ())
    }

    /// Create a user. Caller must be an administrator.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `NotAdmin`, `InvalidName`, `UserExists`
    pub fn create_user(&self, caller: &Token, username: &str, password: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        require_admin(&users, requester)?;

        if !is_valid_name(username) {
            return Err(Denial::InvalidName);
        }
        if users.contains_key(username) {
            return Err(Denial::UserExists);
        }

        users.insert(username.to_string(), UserRecord::new(self.hash_password(password)));
        lock(&self.throttle).record(username, self.env.now());

        tracing::info!(user = username, by = requester, "user created");
        Ok(())
    }

    /// Delete a user. Caller must be an administrator.
    ///
    /// Groups the user solely owns are deleted; groups with other owners
    /// just lose this owner.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `NotAdmin`, `UserMissing`
    pub fn delete_user(&self, caller: &Token, username: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        require_admin(&users, requester)?;

        let Some(owned) = users.get(username).map(|u| u.owned.clone()) else {
            return Err(Denial::UserMissing);
        };

        let mut groups = lock(&self.groups);
        let mut keys = lock(&self.keys);
        for group in &owned {
            if co_owners(&users, group, username) == 0 {
                remove_group(&mut users, &mut groups, &mut keys, group);
                tracing::info!(group = %group, "group deleted with its sole owner");
            }
        }

        users.remove(username);
        lock(&self.throttle).forget(username);

        tracing::info!(user = username, by = requester, "user deleted");
        Ok(())
    }

    /// Create a group owned by the caller, with a fresh key.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupExists`, `InvalidName`
    pub fn create_group(&self, caller: &Token, group: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;

        let mut groups = lock(&self.groups);
        if groups.contains(group) {
            return Err(Denial::GroupExists);
        }
        if !is_valid_name(group) {
            return Err(Denial::InvalidName);
        }
        let Some(owner) = users.get_mut(requester) else {
            return Err(Denial::BadToken);
        };

        owner.groups.insert(group.to_string());
        owner.owned.insert(group.to_string());
        groups.insert(group.to_string());
        lock(&self.keys).rotate(group, self.fresh_key());

        tracing::info!(group, owner = requester, "group created");
        Ok(())
    }

    /// Delete a group the caller owns.
    ///
    /// Strips every membership and ownership of the group and retires its
    /// key history.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `NotOwner`
    pub fn delete_group(&self, caller: &Token, group: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;

        let mut groups = lock(&self.groups);
        require_owner(&users, &groups, requester, group)?;

        let mut keys = lock(&self.keys);
        remove_group(&mut users, &mut groups, &mut keys, group);

        tracing::info!(group, by = requester, "group deleted");
        Ok(())
    }

    /// Add `username` to a group the caller owns.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `NotOwner`, `UserMissing`,
    ///   `AlreadyMember`
    pub fn add_user_to_group(&self, caller: &Token, username: &str, group: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        let groups = lock(&self.groups);
        require_owner(&users, &groups, requester, group)?;

        let Some(target) = users.get_mut(username) else {
            return Err(Denial::UserMissing);
        };
        if target.is_member(group) {
            return Err(Denial::AlreadyMember);
        }
        target.groups.insert(group.to_string());

        tracing::info!(user = username, group, by = requester, "member added");
        Ok(())
    }

    /// Remove `username` from a group the caller owns and rotate the group
    /// key.
    ///
    /// A removed member who also owned the group loses ownership; removing
    /// the last owner this way is refused.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `NotOwner`, `UserMissing`, `NotMember`,
    ///   `LastOwner`
    pub fn remove_user_from_group(
        &self,
        caller: &Token,
        username: &str,
        group: &str,
    ) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        let groups = lock(&self.groups);
        require_owner(&users, &groups, requester, group)?;

        let Some(target) = users.get(username) else {
            return Err(Denial::UserMissing);
        };
        if !target.is_member(group) {
            return Err(Denial::NotMember);
        }
        if target.owns(group) && co_owners(&users, group, username) == 0 {
            return Err(Denial::LastOwner);
        }

        if let Some(target) = users.get_mut(username) {
            target.groups.remove(group);
            target.owned.remove(group);
        }
        let version = lock(&self.keys).rotate(group, self.fresh_key());

        tracing::info!(user = username, group, by = requester, key_version = version, "member removed");
        Ok(())
    }

    /// Make a member of a group the caller owns a co-owner.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `NotOwner`, `UserMissing`, `NotMember`,
    ///   `AlreadyOwner`
    pub fn add_owner(&self, caller: &Token, username: &str, group: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        let groups = lock(&self.groups);
        require_owner(&users, &groups, requester, group)?;

        let Some(target) = users.get_mut(username) else {
            return Err(Denial::UserMissing);
        };
        if !target.is_member(group) {
            return Err(Denial::NotMember);
        }
        if target.owns(group) {
            return Err(Denial::AlreadyOwner);
        }
        target.owned.insert(group.to_string());

        tracing::info!(user = username, group, by = requester, "owner added");
        Ok(())
    }

    /// Revoke ownership from a co-owner. Membership is kept.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `NotOwner`, `UserMissing`,
    ///   `TargetNotOwner`, `LastOwner`
    pub fn remove_owner(&self, caller: &Token, username: &str, group: &str) -> Result<(), Denial> {
        self.verify_signature(caller)?;
        let mut users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        let groups = lock(&self.groups);
        require_owner(&users, &groups, requester, group)?;

        let Some(target) = users.get(username) else {
            return Err(Denial::UserMissing);
        };
        if !target.owns(group) {
            return Err(Denial::TargetNotOwner);
        }
        if co_owners(&users, group, username) == 0 {
            return Err(Denial::LastOwner);
        }

        if let Some(target) = users.get_mut(username) {
            target.owned.remove(group);
        }

        tracing::info!(user = username, group, by = requester, "owner removed");
        Ok(())
    }

    /// Current members of a group the caller owns, sorted by name.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `NotOwner`
    pub fn list_members(&self, caller: &Token, group: &str) -> Result<Vec<String>, Denial> {
        self.verify_signature(caller)?;
        let users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        let groups = lock(&self.groups);
        require_owner(&users, &groups, requester, group)?;

        let mut members: Vec<String> = users
            .iter()
            .filter(|(_, user)| user.is_member(group))
            .map(|(name, _)| name.clone())
            .collect();
        members.sort_unstable();
        Ok(members)
    }

    /// A version of a group's key and its resolved version number. Caller
    /// must be a member.
    ///
    /// # Errors
    ///
    /// - `BadToken`, `GroupMissing`, `KeyUnavailable`
    pub fn group_key(
        &self,
        caller: &Token,
        group: &str,
        index: KeyIndex,
    ) -> Result<(GroupKey, usize), Denial> {
        self.verify_signature(caller)?;
        let users = lock(&self.users);
        let requester = live_subject(caller, &users)?;
        let groups = lock(&self.groups);
        if !groups.contains(group) {
            return Err(Denial::GroupMissing);
        }
        if !users.get(requester).is_some_and(|u| u.is_member(group)) {
            return Err(Denial::KeyUnavailable);
        }

        let keys = lock(&self.keys);
        keys.get(group, index)
            .map(|(key, version)| (key.clone(), version))
            .ok_or(Denial::KeyUnavailable)
    }

    /// Copy of one user's record.
    pub fn user(&self, username: &str) -> Option<UserRecord> {
        lock(&self.users).get(username).cloned()
    }

    /// True if `group` is registered.
    pub fn has_group(&self, group: &str) -> bool {
        lock(&self.groups).contains(group)
    }

    /// Number of key versions held for `group`.
    pub fn key_versions(&self, group: &str) -> usize {
        lock(&self.keys).versions(group)
    }

    fn verify_signature(&self, token: &Token) -> Result<(), Denial> {
        self.verifier.verify(token).map_err(|rejection| {
            tracing::debug!(subject = token.subject(), %rejection, "token rejected");
            Denial::BadToken
        })
    }

    fn hash_password(&self, password: &str) -> PasswordHash {
        PasswordHash::new(password, self.env.random_array())
    }

    fn fresh_key(&self) -> GroupKey {
        GroupKey::from_bytes(self.env.random_array())
    }
}

/// Caller's username, provided the account still exists.
fn live_subject<'t>(token: &'t Token, users: &HashMap<String, UserRecord>) -> Result<&'t str, Denial> {
    let subject = token.subject();
    if users.contains_key(subject) { Ok(subject) } else { Err(Denial::BadToken) }
}

fn require_admin(users: &HashMap<String, UserRecord>, requester: &str) -> Result<(), Denial> {
    if users.get(requester).is_some_and(|u| u.is_member(ADMIN_GROUP)) {
        Ok(())
    } else {
        Err(Denial::NotAdmin)
    }
}

fn require_owner(
    users: &HashMap<String, UserRecord>,
    groups: &BTreeSet<String>,
    requester: &str,
    group: &str,
) -> Result<(), Denial> {
    if !groups.contains(group) {
        return Err(Denial::GroupMissing);
    }
    if !users.get(requester).is_some_and(|u| u.owns(group)) {
        return Err(Denial::NotOwner);
    }
    Ok(())
}

/// Owners of `group` other than `username`.
fn co_owners(users: &HashMap<String, UserRecord>, group: &str, username: &str) -> usize {
    users.iter().filter(|(name, user)| name.as_str() != username && user.owns(group)).count()
}

fn remove_group(
    users: &mut HashMap<String, UserRecord>,
    groups: &mut BTreeSet<String>,
    keys: &mut KeyRing,
    group: &str,
) {
    for user in users.values_mut() {
        user.groups.remove(group);
        user.owned.remove(group);
    }
    groups.remove(group);
    keys.retire(group);
}
