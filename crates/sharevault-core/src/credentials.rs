//! User records and password-check throttling.

use std::{
    collections::{BTreeSet, HashMap},
    hash::Hash,
    time::Duration,
};

use sharevault_crypto::PasswordHash;

/// Minimum interval between password checks for one user.
pub const DEFAULT_PASSWORD_THROTTLE: Duration = Duration::from_secs(1);

/// One account.
///
/// Group membership and ownership are stored on the user; a group's member
/// list is derived by scanning users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Salted password verifier
    pub password: PasswordHash,
    /// Groups the user is a member of
    pub groups: BTreeSet<String>,
    /// Groups the user owns (always a subset of `groups` at creation)
    pub owned: BTreeSet<String>,
}

impl UserRecord {
    /// New user with no memberships.
    pub fn new(password: PasswordHash) -> Self {
        Self { password, groups: BTreeSet::new(), owned: BTreeSet::new() }
    }

    /// True if the user is a member of `group`.
    pub fn is_member(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// True if the user owns `group`.
    pub fn owns(&self, group: &str) -> bool {
        self.owned.contains(group)
    }
}

/// Rate limit on password checks.
///
/// A check that arrives less than `interval` after the previous one (or
/// after the user was created) fails without looking at the password. The
/// failed attempt does not move the window. Not persisted: after a restart
/// the first check for each user is allowed.
#[derive(Debug)]
pub struct PasswordThrottle<I> {
    interval: Duration,
    last_check: HashMap<String, I>,
}

impl<I> PasswordThrottle<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Throttle with the given minimum interval.
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_check: HashMap::new() }
    }

    /// Start the window for a newly created user.
    pub fn record(&mut self, username: &str, now: I) {
        self.last_check.insert(username.to_string(), now);
    }

    /// True if a check for `username` may proceed at `now`; records `now`
    /// as the latest check when it may.
    pub fn permit(&mut self, username: &str, now: I) -> bool {
        match self.last_check.get(username) {
            Some(&last) if now < last || now - last < self.interval => false,
            _ => {
                self.record(username, now);
                true
            },
        }
    }

    /// Forget `username` (account deleted).
    pub fn forget<Q>(&mut self, username: &Q)
    where
        String: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.last_check.remove(username);
    }
}
