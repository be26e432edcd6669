//! Scenario tests for the authorization engine
//!
//! Each test drives the engine through the public API the group server uses
//! and checks both the returned denial and the resulting directory state.

use std::{
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sharevault_core::{
    ADMIN_GROUP, AuthorizationEngine, AuthzConfig, Denial, Environment, TokenRejection,
    TokenVerifier, sign_token,
};
use sharevault_crypto::IdentityKeyPair;
use sharevault_proto::{Endpoint, ResponseTag, Token, TokenClaims, messages::KeyIndex};

#[derive(Clone)]
struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    clock: Arc<Mutex<Duration>>,
}

impl TestEnv {
    fn seeded(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            clock: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    fn advance(&self, by: Duration) {
        *self.clock.lock().unwrap() += by;
    }
}

impl Environment for TestEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        *self.clock.lock().unwrap()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

fn server_identity() -> Arc<IdentityKeyPair> {
    static IDENTITY: OnceLock<Arc<IdentityKeyPair>> = OnceLock::new();
    IDENTITY
        .get_or_init(|| {
            let mut rng = ChaCha20Rng::seed_from_u64(7);
            Arc::new(IdentityKeyPair::generate(&mut rng, 2048).unwrap())
        })
        .clone()
}

fn endpoint() -> Endpoint {
    Endpoint::new("127.0.0.1", 4321)
}

struct Fixture {
    env: TestEnv,
    engine: AuthorizationEngine<TestEnv>,
    admin: Token,
}

impl Fixture {
    fn new() -> Self {
        let env = TestEnv::seeded(1);
        let engine = AuthorizationEngine::new(env.clone(), AuthzConfig::default(), server_identity());
        assert!(engine.bootstrap_admin("root", "rootpw").unwrap());
        let admin = login(&env, &engine, "root", "rootpw");
        Self { env, engine, admin }
    }

    fn login(&self, username: &str, password: &str) -> Token {
        login(&self.env, &self.engine, username, password)
    }

    fn user(&self, username: &str) -> Token {
        self.engine.create_user(&self.admin, username, "pw").unwrap();
        self.login(username, "pw")
    }
}

/// Token for `username`, past the password throttle window.
fn login(
    env: &TestEnv,
    engine: &AuthorizationEngine<TestEnv>,
    username: &str,
    password: &str,
) -> Token {
    env.advance(Duration::from_secs(2));
    engine.issue_token(username, password, endpoint()).unwrap()
}

#[test]
fn bootstrap_creates_admin_once() {
    let fx = Fixture::new();

    let root = fx.engine.user("root").unwrap();
    assert!(root.is_member(ADMIN_GROUP));
    assert!(root.owns(ADMIN_GROUP));
    assert_eq!(fx.engine.key_versions(ADMIN_GROUP), 1);

    assert!(!fx.engine.bootstrap_admin("other", "pw").unwrap());
    assert!(fx.engine.user("other").is_none());
}

#[test]
fn token_lists_memberships_and_verifies() {
    let fx = Fixture::new();

    assert_eq!(fx.admin.issuer(), "ALPHA");
    assert_eq!(fx.admin.subject(), "root");
    assert_eq!(fx.admin.groups(), [ADMIN_GROUP.to_string()]);
    assert_eq!(fx.admin.endpoint(), &endpoint());
    assert_eq!(fx.engine.verify_token(&fx.admin), Ok(()));
}

#[test]
fn bad_credentials_are_indistinguishable() {
    let fx = Fixture::new();
    fx.env.advance(Duration::from_secs(2));

    assert_eq!(
        fx.engine.issue_token("root", "wrong", endpoint()).unwrap_err(),
        Denial::InvalidCredentials
    );
    assert_eq!(
        fx.engine.issue_token("nobody", "rootpw", endpoint()).unwrap_err(),
        Denial::InvalidCredentials
    );
}

#[test]
fn password_checks_are_throttled() {
    let fx = Fixture::new();
    fx.engine.create_user(&fx.admin, "alice", "pw").unwrap();

    // Window starts at creation
    assert_eq!(
        fx.engine.issue_token("alice", "pw", endpoint()).unwrap_err(),
        Denial::InvalidCredentials
    );

    fx.env.advance(Duration::from_secs(1));
    assert!(fx.engine.issue_token("alice", "pw", endpoint()).is_ok());

    // Throttled attempt does not move the window
    fx.env.advance(Duration::from_millis(500));
    assert!(fx.engine.issue_token("alice", "pw", endpoint()).is_err());
    fx.env.advance(Duration::from_millis(500));
    assert!(fx.engine.issue_token("alice", "pw", endpoint()).is_ok());
}

#[test]
fn only_admins_manage_users() {
    let fx = Fixture::new();
    let alice = fx.user("alice");

    assert_eq!(fx.engine.create_user(&alice, "bob", "pw"), Err(Denial::NotAdmin));
    assert_eq!(fx.engine.delete_user(&alice, "root"), Err(Denial::NotAdmin));
    assert_eq!(fx.engine.create_user(&fx.admin, "alice", "pw"), Err(Denial::UserExists));
    assert_eq!(fx.engine.create_user(&fx.admin, "a||b", "pw"), Err(Denial::InvalidName));
    assert_eq!(fx.engine.create_user(&fx.admin, "", "pw"), Err(Denial::InvalidName));
    assert_eq!(fx.engine.delete_user(&fx.admin, "nobody"), Err(Denial::UserMissing));
}

#[test]
fn creator_owns_new_group() {
    let fx = Fixture::new();
    let alice = fx.user("alice");

    fx.engine.create_group(&alice, "eng").unwrap();

    let record = fx.engine.user("alice").unwrap();
    assert!(record.is_member("eng"));
    assert!(record.owns("eng"));
    assert_eq!(fx.engine.key_versions("eng"), 1);
    assert_eq!(fx.engine.create_group(&fx.admin, "eng"), Err(Denial::GroupExists));
    assert_eq!(fx.engine.create_group(&alice, "x||y"), Err(Denial::InvalidName));
}

#[test]
fn bar_names_cannot_shift_token_groups() {
    let fx = Fixture::new();
    let mallory = fx.user("mallory");

    assert_eq!(fx.engine.create_group(&mallory, "secret|"), Err(Denial::InvalidName));
    assert_eq!(fx.engine.create_group(&mallory, "|x"), Err(Denial::InvalidName));
    assert_eq!(fx.engine.create_user(&fx.admin, "eve|", "pw"), Err(Denial::InvalidName));

    fx.env.advance(Duration::from_secs(2));
    assert_eq!(
        fx.engine.issue_token("mallory", "pw", Endpoint::new("127.0.0.1|", 4321)).unwrap_err(),
        Denial::InvalidName
    );

    // A signature over a bar-bearing list never transfers to the shifted list
    let claims = TokenClaims {
        issuer: "ALPHA".to_string(),
        subject: "mallory".to_string(),
        groups: vec!["secret|".to_string(), "x".to_string()],
        endpoint: endpoint(),
    };
    let (mut shifted, signature) = sign_token(&server_identity(), claims).unwrap().into_parts();
    shifted.groups = vec!["secret".to_string(), "|x".to_string()];
    let forged = Token::new(shifted, signature);

    let verifier = TokenVerifier::new("ALPHA", server_identity().public().clone());
    assert_eq!(verifier.verify_for(&forged, &endpoint()), Err(TokenRejection::Malformed));
    assert_eq!(fx.engine.verify_token(&forged), Err(Denial::BadToken));
}

#[test]
fn only_owner_deletes_group() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    let bob = fx.user("bob");
    fx.engine.create_group(&alice, "eng").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();

    assert_eq!(fx.engine.delete_group(&bob, "eng"), Err(Denial::NotOwner));
    assert_eq!(fx.engine.delete_group(&fx.admin, "eng"), Err(Denial::NotOwner));
    assert_eq!(fx.engine.delete_group(&alice, "ops"), Err(Denial::GroupMissing));

    fx.engine.delete_group(&alice, "eng").unwrap();

    assert!(!fx.engine.has_group("eng"));
    assert_eq!(fx.engine.key_versions("eng"), 0);
    for name in ["alice", "bob"] {
        let record = fx.engine.user(name).unwrap();
        assert!(!record.is_member("eng"), "{name} still a member");
        assert!(!record.owns("eng"), "{name} still an owner");
    }
}

#[test]
fn membership_changes_follow_check_order() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    let bob = fx.user("bob");
    fx.engine.create_group(&alice, "eng").unwrap();

    assert_eq!(fx.engine.add_user_to_group(&alice, "bob", "ops"), Err(Denial::GroupMissing));
    assert_eq!(fx.engine.add_user_to_group(&bob, "bob", "eng"), Err(Denial::NotOwner));
    assert_eq!(fx.engine.add_user_to_group(&alice, "carol", "eng"), Err(Denial::UserMissing));

    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();
    assert_eq!(fx.engine.add_user_to_group(&alice, "bob", "eng"), Err(Denial::AlreadyMember));

    assert_eq!(fx.engine.remove_user_from_group(&alice, "root", "eng"), Err(Denial::NotMember));
}

#[test]
fn removing_member_rotates_key() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    let bob = fx.user("bob");
    fx.engine.create_group(&alice, "eng").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();

    let (before, version) = fx.engine.group_key(&bob, "eng", KeyIndex::Latest).unwrap();
    assert_eq!(version, 0);

    fx.engine.remove_user_from_group(&alice, "bob", "eng").unwrap();

    assert_eq!(fx.engine.key_versions("eng"), 2);
    let (after, version) = fx.engine.group_key(&alice, "eng", KeyIndex::Latest).unwrap();
    assert_eq!(version, 1);
    assert_ne!(before, after);

    // Old versions stay readable for members
    let (old, _) = fx.engine.group_key(&alice, "eng", KeyIndex::At(0)).unwrap();
    assert_eq!(old, before);

    assert_eq!(
        fx.engine.group_key(&bob, "eng", KeyIndex::Latest).unwrap_err(),
        Denial::KeyUnavailable
    );
}

#[test]
fn key_lookup_denials() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.engine.create_group(&alice, "eng").unwrap();

    assert_eq!(
        fx.engine.group_key(&alice, "ops", KeyIndex::Latest).unwrap_err(),
        Denial::GroupMissing
    );
    assert_eq!(
        fx.engine.group_key(&fx.admin, "eng", KeyIndex::Latest).unwrap_err(),
        Denial::KeyUnavailable
    );
    assert_eq!(
        fx.engine.group_key(&alice, "eng", KeyIndex::At(5)).unwrap_err(),
        Denial::KeyUnavailable
    );
}

#[test]
fn last_owner_cannot_be_removed() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.engine.create_group(&alice, "eng").unwrap();

    assert_eq!(fx.engine.remove_user_from_group(&alice, "alice", "eng"), Err(Denial::LastOwner));
    assert_eq!(fx.engine.remove_owner(&alice, "alice", "eng"), Err(Denial::LastOwner));
    assert!(fx.engine.user("alice").unwrap().owns("eng"));
}

#[test]
fn co_ownership_lifecycle() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.user("bob");
    fx.engine.create_group(&alice, "eng").unwrap();

    assert_eq!(fx.engine.add_owner(&alice, "bob", "eng"), Err(Denial::NotMember));
    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();
    assert_eq!(fx.engine.remove_owner(&alice, "bob", "eng"), Err(Denial::TargetNotOwner));

    fx.engine.add_owner(&alice, "bob", "eng").unwrap();
    assert_eq!(fx.engine.add_owner(&alice, "bob", "eng"), Err(Denial::AlreadyOwner));

    // With a co-owner, alice may step down and keep membership
    fx.engine.remove_owner(&alice, "alice", "eng").unwrap();
    let record = fx.engine.user("alice").unwrap();
    assert!(record.is_member("eng"));
    assert!(!record.owns("eng"));
}

#[test]
fn removing_co_owner_member_strips_ownership() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.user("bob");
    fx.engine.create_group(&alice, "eng").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();
    fx.engine.add_owner(&alice, "bob", "eng").unwrap();

    fx.engine.remove_user_from_group(&alice, "bob", "eng").unwrap();

    let record = fx.engine.user("bob").unwrap();
    assert!(!record.is_member("eng"));
    assert!(!record.owns("eng"));
}

#[test]
fn deleting_user_deletes_sole_owned_groups() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.user("bob");
    fx.engine.create_group(&alice, "solo").unwrap();
    fx.engine.create_group(&alice, "shared").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "shared").unwrap();
    fx.engine.add_owner(&alice, "bob", "shared").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "solo").unwrap();

    fx.engine.delete_user(&fx.admin, "alice").unwrap();

    assert!(fx.engine.user("alice").is_none());
    assert!(!fx.engine.has_group("solo"));
    assert!(fx.engine.has_group("shared"));
    let bob = fx.engine.user("bob").unwrap();
    assert!(!bob.is_member("solo"));
    assert!(bob.owns("shared"));

    // Deleted user's token is dead
    assert_eq!(fx.engine.verify_token(&alice), Err(Denial::BadToken));
    assert_eq!(fx.engine.create_group(&alice, "again"), Err(Denial::BadToken));
}

#[test]
fn token_groups_are_a_snapshot() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.user("bob");
    fx.engine.create_group(&alice, "eng").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();
    let bob = fx.login("bob", "pw");
    assert!(bob.claims().has_group("eng"));

    fx.engine.remove_user_from_group(&alice, "bob", "eng").unwrap();

    // Still a valid token listing the old membership, but live checks refuse
    assert_eq!(fx.engine.verify_token(&bob), Ok(()));
    assert!(bob.claims().has_group("eng"));
    assert_eq!(
        fx.engine.group_key(&bob, "eng", KeyIndex::Latest).unwrap_err(),
        Denial::KeyUnavailable
    );
}

#[test]
fn forged_tokens_are_rejected() {
    let fx = Fixture::new();
    let alice = fx.user("alice");

    let (mut claims, signature) = alice.clone().into_parts();
    claims.subject = "root".to_string();
    let forged = Token::new(claims, signature);
    assert_eq!(fx.engine.verify_token(&forged), Err(Denial::BadToken));
    assert_eq!(fx.engine.create_user(&forged, "mallory", "pw"), Err(Denial::BadToken));

    let (mut claims, signature) = alice.into_parts();
    claims.issuer = "BETA".to_string();
    assert_eq!(fx.engine.verify_token(&Token::new(claims, signature)), Err(Denial::BadToken));
}

#[test]
fn members_are_listed_for_owners_only() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    let bob = fx.user("bob");
    fx.user("carol");
    fx.engine.create_group(&alice, "eng").unwrap();
    fx.engine.add_user_to_group(&alice, "carol", "eng").unwrap();
    fx.engine.add_user_to_group(&alice, "bob", "eng").unwrap();

    assert_eq!(fx.engine.list_members(&alice, "eng").unwrap(), ["alice", "bob", "carol"]);
    assert_eq!(fx.engine.list_members(&bob, "eng").unwrap_err(), Denial::NotOwner);
}

#[test]
fn snapshot_restores_directory() {
    let fx = Fixture::new();
    let alice = fx.user("alice");
    fx.engine.create_group(&alice, "eng").unwrap();

    let snapshot = fx.engine.snapshot();
    let restored = AuthorizationEngine::from_snapshot(
        fx.env.clone(),
        AuthzConfig::default(),
        server_identity(),
        snapshot.clone(),
    );

    assert_eq!(restored.snapshot(), snapshot);
    assert_eq!(restored.verify_token(&alice), Ok(()));
    assert_eq!(
        restored.group_key(&alice, "eng", KeyIndex::Latest).unwrap(),
        fx.engine.group_key(&alice, "eng", KeyIndex::Latest).unwrap()
    );

    // Password verifiers survive the round trip
    fx.env.advance(Duration::from_secs(2));
    assert!(restored.issue_token("alice", "pw", endpoint()).is_ok());
}

#[test]
fn denials_map_to_wire_tags() {
    assert_eq!(Denial::BadToken.tag(), ResponseTag::FailBadToken);
    assert_eq!(Denial::NotOwner.tag(), ResponseTag::FailNoOwner);
    assert_eq!(Denial::LastOwner.tag(), ResponseTag::FailLastOwner);
    assert_eq!(Denial::KeyUnavailable.tag(), ResponseTag::FailGetKey);
    assert_eq!(Denial::InvalidCredentials.tag(), ResponseTag::FailGet);
    assert!(!Denial::UserExists.tag().is_success());
}
