//! End-to-end tests: both clients against real servers on loopback TCP.

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sharevault_client::{ClientError, FileClient, GroupClient};
use sharevault_core::{AuthzConfig, TokenVerifier, TrustError, TrustStore};
use sharevault_crypto::IdentityKeyPair;
use sharevault_proto::{Endpoint, ResponseTag, Token, messages::KeyIndex};
use sharevault_server::{
    AdminCredentials, FileServer, FileServerConfig, GroupServer, GroupServerConfig,
    MemoryStorage, SystemEnv,
};
use tempfile::TempDir;
use tokio::{sync::oneshot, task::JoinHandle};

fn group_identity() -> Arc<IdentityKeyPair> {
    static KEY: OnceLock<Arc<IdentityKeyPair>> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(501);
        Arc::new(IdentityKeyPair::generate(&mut rng, 2048).unwrap())
    })
    .clone()
}

fn file_identity() -> Arc<IdentityKeyPair> {
    static KEY: OnceLock<Arc<IdentityKeyPair>> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = ChaCha20Rng::seed_from_u64(502);
        Arc::new(IdentityKeyPair::generate(&mut rng, 2048).unwrap())
    })
    .clone()
}

fn accept(_identity: &str, _fingerprint: &str) -> io::Result<String> {
    Ok("yes".to_string())
}

fn decline(_identity: &str, _fingerprint: &str) -> io::Result<String> {
    Ok("no".to_string())
}

struct Cluster {
    group_addr: SocketAddr,
    /// Endpoint the file server is reachable at and advertises
    files: Endpoint,
    stop: Vec<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
    dir: TempDir,
}

impl Cluster {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let group_config = GroupServerConfig {
            bind_address: "127.0.0.1:0".into(),
            data_dir: dir.path().join("group"),
            authz: AuthzConfig { password_throttle: Duration::ZERO, ..AuthzConfig::default() },
            admin: Some(AdminCredentials { username: "root".into(), password: "rootpw".into() }),
            ..GroupServerConfig::default()
        };
        let group = GroupServer::bind(
            &group_config,
            SystemEnv::new(),
            MemoryStorage::new(),
            group_identity(),
        )
        .await
        .unwrap();

        // Reserve a port so the advertised endpoint is the real one
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let files = Endpoint::new("127.0.0.1", port);
        let file_config = FileServerConfig {
            bind_address: files.to_string(),
            advertise: files.clone(),
            data_dir: dir.path().join("file"),
            ..FileServerConfig::default()
        };
        let verifier = TokenVerifier::new("ALPHA", group_identity().public().clone());
        let file = FileServer::bind(
            &file_config,
            SystemEnv::new(),
            MemoryStorage::new(),
            file_identity(),
            verifier,
        )
        .await
        .unwrap();

        let group_addr = group.local_addr().unwrap();
        let (group_stop, group_rx) = oneshot::channel::<()>();
        let (file_stop, file_rx) = oneshot::channel::<()>();
        let tasks = vec![
            tokio::spawn(async move {
                group.run_until(async { group_rx.await.unwrap_or(()) }).await.unwrap();
            }),
            tokio::spawn(async move {
                file.run_until(async { file_rx.await.unwrap_or(()) }).await.unwrap();
            }),
        ];

        Self { group_addr, files, stop: vec![group_stop, file_stop], tasks, dir }
    }

    async fn shutdown(self) {
        for stop in self.stop {
            let _ = stop.send(());
        }
        for task in self.tasks {
            task.await.unwrap();
        }
    }

    async fn group(&self) -> GroupClient<SystemEnv> {
        GroupClient::connect(self.group_addr, SystemEnv::new(), group_identity().public().clone())
            .await
            .unwrap()
    }

    async fn file(&self, trust: &mut TrustStore) -> FileClient<SystemEnv> {
        FileClient::connect(self.files.clone(), SystemEnv::new(), trust, &mut accept)
            .await
            .unwrap()
    }

    fn known_hosts(&self) -> std::path::PathBuf {
        self.dir.path().join("known_hosts")
    }

    /// Admin creates alice and `team` with alice as a member.
    async fn populate(&self) -> (Token, Token) {
        let mut group = self.group().await;
        let root = group.get_token("root", "rootpw", self.files.clone()).await.unwrap();
        group.create_user(&root, "alice", "alicepw").await.unwrap();
        group.create_group(&root, "team").await.unwrap();
        group.add_user_to_group(&root, "alice", "team").await.unwrap();
        let alice = group.get_token("alice", "alicepw", self.files.clone()).await.unwrap();
        group.disconnect().await.unwrap();
        (root, alice)
    }
}

#[tokio::test]
async fn share_a_file_through_both_servers() {
    let cluster = Cluster::start().await;
    let (_, alice) = cluster.populate().await;
    assert_eq!(alice.groups(), ["team".to_string()]);

    let mut trust = TrustStore::open(cluster.known_hosts()).unwrap();
    let mut files = cluster.file(&mut trust).await;
    assert_eq!(files.endpoint(), &cluster.files);

    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
    let sent = files.upload(&alice, "reports/q3.bin", "team", &data[..]).await.unwrap();
    assert_eq!(sent, data.len() as u64);

    assert_eq!(files.list_files(&alice).await.unwrap(), vec!["reports/q3.bin".to_string()]);

    let mut received = Vec::new();
    let n = files.download(&alice, "reports/q3.bin", &mut received).await.unwrap();
    assert_eq!(n, data.len() as u64);
    assert_eq!(received, data);

    let local = cluster.dir.path().join("q3.bin");
    files.download_file(&alice, "reports/q3.bin", &local).await.unwrap();
    assert_eq!(tokio::fs::read(&local).await.unwrap(), data);

    // Never overwrites an existing local file
    let again = files.download_file(&alice, "reports/q3.bin", &local).await.unwrap_err();
    assert!(matches!(again, ClientError::Io(ref e) if e.kind() == io::ErrorKind::AlreadyExists));

    files.delete(&alice, "reports/q3.bin").await.unwrap();
    assert!(files.list_files(&alice).await.unwrap().is_empty());

    files.disconnect().await.unwrap();
    cluster.shutdown().await;
}

#[tokio::test]
async fn upload_from_local_file() {
    let cluster = Cluster::start().await;
    let (_, alice) = cluster.populate().await;

    let local = cluster.dir.path().join("notes.txt");
    tokio::fs::write(&local, b"meeting at noon").await.unwrap();

    let mut trust = TrustStore::in_memory();
    let mut files = cluster.file(&mut trust).await;
    assert_eq!(files.upload_file(&alice, &local, "notes.txt", "team").await.unwrap(), 15);

    let mut received = Vec::new();
    files.download(&alice, "notes.txt", &mut received).await.unwrap();
    assert_eq!(received, b"meeting at noon");

    files.disconnect().await.unwrap();
    cluster.shutdown().await;
}

#[tokio::test]
async fn refusals_keep_the_session_usable() {
    let cluster = Cluster::start().await;
    let (root, alice) = cluster.populate().await;

    let mut trust = TrustStore::in_memory();
    let mut files = cluster.file(&mut trust).await;
    files.upload(&alice, "a.txt", "team", &b"first"[..]).await.unwrap();

    let err = files.upload(&alice, "a.txt", "team", &b"second"[..]).await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailFileExists)));
    assert!(err.is_recoverable());

    let err = files.download(&root, "a.txt", &mut Vec::<u8>::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::ErrorPermission)));

    let err = files.delete(&alice, "nope.txt").await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::ErrorDoesntExist)));

    assert_eq!(files.list_files(&alice).await.unwrap(), vec!["a.txt".to_string()]);
    files.disconnect().await.unwrap();

    let mut group = cluster.group().await;
    let err = group.list_members(&alice, "team").await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailNoOwner)));
    assert_eq!(err.user_message(), ResponseTag::FailNoOwner.message());

    let members = group.list_members(&root, "team").await.unwrap();
    assert_eq!(members, vec!["alice".to_string(), "root".to_string()]);
    group.disconnect().await.unwrap();

    cluster.shutdown().await;
}

#[tokio::test]
async fn removing_a_member_rotates_the_key() {
    let cluster = Cluster::start().await;
    let (root, alice) = cluster.populate().await;
    let mut group = cluster.group().await;

    let (before, version) = group.group_key(&alice, "team", KeyIndex::Latest).await.unwrap();
    assert_eq!(version, 0);

    group.remove_user_from_group(&root, "alice", "team").await.unwrap();

    let (after, version) = group.group_key(&root, "team", KeyIndex::Latest).await.unwrap();
    assert_eq!(version, 1);
    assert_ne!(before, after);
    let (old, _) = group.group_key(&root, "team", KeyIndex::At(0)).await.unwrap();
    assert_eq!(old, before);

    // Alice's token still lists team, but the live directory decides
    let err = group.group_key(&alice, "team", KeyIndex::Latest).await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailGetKey)));

    group.disconnect().await.unwrap();
    cluster.shutdown().await;
}

#[tokio::test]
async fn co_owner_management() {
    let cluster = Cluster::start().await;
    let (root, alice) = cluster.populate().await;
    let mut group = cluster.group().await;

    group.add_owner(&root, "alice", "team").await.unwrap();
    let err = group.add_owner(&root, "alice", "team").await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailOwner)));

    // Alice can now manage the group herself
    group.remove_owner(&alice, "root", "team").await.unwrap();
    let err = group.remove_owner(&alice, "alice", "team").await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailLastOwner)));

    group.delete_group(&alice, "team").await.unwrap();
    let err = group.list_members(&alice, "team").await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailGroupNoExist)));

    group.delete_user(&root, "alice").await.unwrap();
    let err = group.get_token("alice", "alicepw", cluster.files.clone()).await.unwrap_err();
    assert!(matches!(err, ClientError::Refused(ResponseTag::FailGet)));

    group.disconnect().await.unwrap();
    cluster.shutdown().await;
}

#[tokio::test]
async fn pinned_key_is_not_prompted_again() {
    let cluster = Cluster::start().await;

    let mut asked = 0;
    {
        let mut trust = TrustStore::open(cluster.known_hosts()).unwrap();
        let mut prompter = |_: &str, _: &str| -> io::Result<String> {
            asked += 1;
            Ok("yes".to_string())
        };
        let files =
            FileClient::connect(cluster.files.clone(), SystemEnv::new(), &mut trust, &mut prompter)
                .await
                .unwrap();
        files.disconnect().await.unwrap();
    }
    assert_eq!(asked, 1);

    // Fresh store from the same file: the pin survived
    let mut trust = TrustStore::open(cluster.known_hosts()).unwrap();
    assert_eq!(trust.pinned(&cluster.files.to_string()), Some(file_identity().public()));
    let files = FileClient::connect(cluster.files.clone(), SystemEnv::new(), &mut trust, &mut decline)
        .await
        .unwrap();
    files.disconnect().await.unwrap();

    cluster.shutdown().await;
}

#[tokio::test]
async fn declined_key_is_not_pinned() {
    let cluster = Cluster::start().await;
    let mut trust = TrustStore::in_memory();

    let err = FileClient::connect(cluster.files.clone(), SystemEnv::new(), &mut trust, &mut decline)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ClientError::Trust(TrustError::Rejected { .. })));
    assert!(trust.pinned(&cluster.files.to_string()).is_none());

    cluster.shutdown().await;
}

#[tokio::test]
async fn wrong_group_server_key_fails_handshake() {
    let cluster = Cluster::start().await;

    let result =
        GroupClient::connect(cluster.group_addr, SystemEnv::new(), file_identity().public().clone())
            .await;
    assert!(matches!(result, Err(ClientError::Channel(_))));

    cluster.shutdown().await;
}
