//! Offline session-lifecycle test against a real sled keystore.
//!
//! Exercises the persistence seams end-to-end: create session keys, restart
//! the stores, revoke, and confirm secrets and records survive (or are
//! destroyed) exactly as the lifecycle demands. No network involved.
//!
//! Run with:
//!   cargo test -p starkclaw-session --test lifecycle

use std::sync::Arc;

use starkclaw_activity::{ActivityKind, ActivityLog};
use starkclaw_core::{NetworkId, TokenSymbol};
use starkclaw_keystore::{SecureStore, SledKeystore};
use starkclaw_rpc::ProviderClient;
use starkclaw_session::{CreateSessionParams, SessionRegistry};

fn open_registry(dir: &std::path::Path) -> (Arc<dyn SecureStore>, SessionRegistry) {
    let store: Arc<dyn SecureStore> =
        Arc::new(SledKeystore::open(dir.join("keystore")).expect("open keystore"));
    let activity = Arc::new(ActivityLog::open(store.clone()).expect("open activity"));
    let registry = SessionRegistry::new(
        store.clone(),
        // Never dialed in this test.
        Arc::new(ProviderClient::new("http://127.0.0.1:1")),
        activity,
        NetworkId::Sepolia,
    );
    (store, registry)
}

fn params(limit: &str) -> CreateSessionParams {
    CreateSessionParams {
        token_symbol: TokenSymbol::Usdc,
        spending_limit_base_units: limit.into(),
        valid_for_seconds: 3_600,
        allowed_contracts: vec![],
    }
}

#[test]
fn sessions_survive_restart_and_revocation_destroys_secrets() {
    let dir = tempfile::tempdir().expect("tempdir");

    let first_key = {
        let (_store, registry) = open_registry(dir.path());
        let a = registry.create_local(params("10000000")).expect("create a");
        let b = registry.create_local(params("5000000")).expect("create b");
        assert_ne!(a.public_key, b.public_key);
        a.public_key
    };

    // Fresh handles over the same directory: everything must still be there.
    let (_store, registry) = open_registry(dir.path());
    let listed = registry.list_session_keys().expect("list");
    assert_eq!(listed.len(), 2);
    assert!(registry.index().load_secret(&first_key).is_ok());

    // Local revocation marks the record and wipes the secret, durably.
    registry
        .index()
        .update(&first_key, |c| c.revoked_at = Some(starkclaw_core::unix_now()))
        .expect("mark revoked");
    registry.index().delete_secret(&first_key).expect("wipe secret");

    let (_store, registry) = open_registry(dir.path());
    let reloaded = registry.index().find(&first_key).expect("find");
    assert!(reloaded.revoked_at.is_some());
    assert!(registry.index().load_secret(&first_key).is_err());
    // The other credential is untouched and still usable.
    let usable = registry
        .most_recent_usable(starkclaw_core::unix_now())
        .expect("query")
        .expect("one usable session");
    assert_ne!(usable.public_key, first_key);
}

#[test]
fn activity_records_creation_events_durably() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let (_store, registry) = open_registry(dir.path());
        registry.create_local(params("10000000")).expect("create");
    }
    let (store, _registry) = open_registry(dir.path());
    let activity = ActivityLog::open(store).expect("reopen activity");
    let records = activity.list().expect("list");
    assert!(records
        .iter()
        .any(|r| r.kind == ActivityKind::SessionCreated));
}
