//! Integration tests for the PostgreSQL repositories.
//!
//! These tests need a live PostgreSQL instance and are `#[ignore]`-gated;
//! run them with `cargo test -- --ignored` and a `DATABASE_URL` pointing at
//! a scratch database (see `test_fixtures::DEFAULT_TEST_DATABASE_URL`).

use braid_core::{
    Error, FeedSort, LayoutRepository, LinkRepository, NoteRepository, OrderRepository,
    Position, UserRepository,
};
use braid_crypto::{seal, unwrap};
use braid_db::test_fixtures::TestDatabase;

/// Seal plaintext under an arbitrary throwaway key; repository tests don't
/// care which key content was sealed with.
fn sealed(plaintext: &str) -> braid_crypto::Sealed {
    seal(&[7u8; 32], plaintext.as_bytes()).expect("seal test content")
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_insert_and_fetch_note() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let note = t
        .db
        .notes
        .insert(alice.id, "First", false, &sealed("hello"), &[])
        .await
        .unwrap();
    assert_eq!(note.owner_id, alice.id);
    assert_eq!(note.author, "alice");
    assert!(!note.is_public);

    let fetched = t.db.notes.fetch_owned(note.id, alice.id).await.unwrap();
    assert_eq!(fetched.title, "First");
    assert_eq!(fetched.content.ciphertext, note.content.ciphertext);

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_visibility_rules() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;

    let private = t
        .db
        .notes
        .insert(alice.id, "Private", false, &sealed("p"), &[])
        .await
        .unwrap();
    let public = t
        .db
        .notes
        .insert(alice.id, "Public", true, &sealed("q"), &[])
        .await
        .unwrap();

    // Owner sees both; Bob and anonymous see only the public one, and the
    // private one reads as nonexistent.
    assert!(t.db.notes.fetch_visible(private.id, Some(alice.id)).await.is_ok());
    assert!(t.db.notes.fetch_visible(public.id, Some(bob.id)).await.is_ok());
    assert!(t.db.notes.fetch_visible(public.id, None).await.is_ok());
    assert!(matches!(
        t.db.notes.fetch_visible(private.id, Some(bob.id)).await,
        Err(Error::NoteNotFound(_))
    ));
    assert!(matches!(
        t.db.notes.fetch_visible(private.id, None).await,
        Err(Error::NoteNotFound(_))
    ));

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_update_reports_prior_visibility() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let note = t
        .db
        .notes
        .insert(alice.id, "Flip", false, &sealed("v1"), &[])
        .await
        .unwrap();

    let updated = t
        .db
        .notes
        .update(note.id, alice.id, "Flip", true, &sealed("v2"), &[])
        .await
        .unwrap();
    assert!(!updated.was_public);
    assert!(updated.note.is_public);
    assert!(updated.note.updated_at >= note.updated_at);

    // Non-owner update is indistinguishable from a missing note.
    let bob = t.create_user("bob").await;
    assert!(matches!(
        t.db.notes
            .update(note.id, bob.id, "Hijack", false, &sealed("x"), &[])
            .await,
        Err(Error::NoteNotFound(_))
    ));

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_delete_is_idempotent_and_sweeps_edges() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let target = t
        .db
        .notes
        .insert(alice.id, "Target", true, &sealed("t"), &[])
        .await
        .unwrap();
    let source = t
        .db
        .notes
        .insert(alice.id, "Source", true, &sealed("s"), &[target.id])
        .await
        .unwrap();

    assert_eq!(t.db.notes.delete(target.id, alice.id).await.unwrap(), Some(true));
    assert_eq!(t.db.notes.delete(target.id, alice.id).await.unwrap(), None);

    // Incoming edges to the deleted note are gone.
    let edges = t.db.links.all_edges().await.unwrap();
    assert!(edges.iter().all(|e| e.to != target.id && e.from != target.id));
    let _ = source;

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_backlinks_filtered_and_capped() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;

    let target = t
        .db
        .notes
        .insert(alice.id, "Hub", true, &sealed("hub"), &[])
        .await
        .unwrap();
    let _public_ref = t
        .db
        .notes
        .insert(bob.id, "Public ref", true, &sealed("r"), &[target.id])
        .await
        .unwrap();
    let _private_ref = t
        .db
        .notes
        .insert(bob.id, "Private ref", false, &sealed("r"), &[target.id])
        .await
        .unwrap();

    // Anonymous requester sees only the public referencing note.
    let anon = t.db.links.backlinks(target.id, None).await.unwrap();
    assert_eq!(anon.len(), 1);
    assert_eq!(anon[0].title, "Public ref");

    // Bob sees both of his.
    let bobs = t.db.links.backlinks(target.id, Some(bob.id)).await.unwrap();
    assert_eq!(bobs.len(), 2);

    // Backlinks of an invisible target fail as not-found.
    let hidden = t
        .db
        .notes
        .insert(alice.id, "Hidden", false, &sealed("h"), &[])
        .await
        .unwrap();
    assert!(matches!(
        t.db.links.backlinks(hidden.id, Some(bob.id)).await,
        Err(Error::NoteNotFound(_))
    ));

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_self_reference_edges_dropped() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let note = t
        .db
        .notes
        .insert(alice.id, "Selfie", true, &sealed("s"), &[])
        .await
        .unwrap();
    // Target list containing the note's own id; the write filters it.
    t.db.links.replace_outgoing(note.id, &[note.id]).await.unwrap();

    assert!(t.db.links.all_edges().await.unwrap().is_empty());

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_replace_order_and_effective_listing() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let a = t.db.notes.insert(alice.id, "A", false, &sealed("a"), &[]).await.unwrap();
    let b = t.db.notes.insert(alice.id, "B", false, &sealed("b"), &[]).await.unwrap();
    let c = t.db.notes.insert(alice.id, "C", false, &sealed("c"), &[]).await.unwrap();

    // Order only two of the three; the unordered one trails by recency.
    t.db.orders.replace_order(alice.id, &[b.id, a.id]).await.unwrap();

    let listed = t.db.notes.list_owned(alice.id, None).await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![b.id, a.id, c.id]);

    // Custom feed sort applies the same partition.
    let feed = t
        .db
        .notes
        .list_feed(Some(alice.id), None, FeedSort::Custom)
        .await
        .unwrap();
    let feed_ids: Vec<i64> = feed.iter().map(|n| n.id).collect();
    assert_eq!(feed_ids, vec![b.id, a.id, c.id]);

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_title_query_filters_and_escapes_wildcards() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    t.db.notes.insert(alice.id, "Weekly plan", true, &sealed("w"), &[]).await.unwrap();
    t.db.notes.insert(alice.id, "100% done", true, &sealed("d"), &[]).await.unwrap();

    let hits = t.db.notes.list_public(Some("weekly")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Weekly plan");

    // A literal % in the query must not act as a wildcard.
    let hits = t.db.notes.list_public(Some("100%")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "100% done");

    let none = t.db.notes.list_public(Some("%")).await.unwrap();
    assert_eq!(none.len(), 1); // matches only the title containing a literal %

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_replace_order_rejects_foreign_private_notes() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;

    let mine = t.db.notes.insert(alice.id, "Mine", false, &sealed("m"), &[]).await.unwrap();
    let theirs = t.db.notes.insert(bob.id, "Theirs", false, &sealed("t"), &[]).await.unwrap();

    t.db.orders.replace_order(alice.id, &[mine.id]).await.unwrap();

    let result = t.db.orders.replace_order(alice.id, &[theirs.id, mine.id]).await;
    assert!(matches!(result, Err(Error::Forbidden(_))));

    // The stored order is untouched by the rejected request.
    let listed = t.db.notes.list_owned(alice.id, None).await.unwrap();
    assert_eq!(listed[0].id, mine.id);

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_ordering_public_foreign_notes_allowed() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;
    let bob = t.create_user("bob").await;

    let public = t.db.notes.insert(bob.id, "Pub", true, &sealed("p"), &[]).await.unwrap();
    t.db.orders.replace_order(alice.id, &[public.id]).await.unwrap();

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_layout_roundtrip_and_overwrite() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let mut layout = braid_core::GraphLayout::default();
    layout.positions.insert("1".to_string(), Position { x: 3.0, y: -4.5 });
    layout.collapsed.push(1);

    assert!(t.db.layouts.get(alice.id, "all").await.unwrap().is_none());

    t.db.layouts.upsert(alice.id, "all", &layout).await.unwrap();
    let stored = t.db.layouts.get(alice.id, "all").await.unwrap().unwrap();
    assert_eq!(stored.positions["1"].x, 3.0);
    assert_eq!(stored.collapsed, vec![1]);

    layout.collapsed.clear();
    t.db.layouts.upsert(alice.id, "all", &layout).await.unwrap();
    let stored = t.db.layouts.get(alice.id, "all").await.unwrap().unwrap();
    assert!(stored.collapsed.is_empty());

    t.cleanup().await;
}

#[tokio::test]
#[ignore] // requires PostgreSQL
async fn test_user_key_envelope_roundtrip() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice").await;

    let envelope = t.db.users.key_envelope(alice.id).await.unwrap();
    let key = unwrap(&t.master_key(), &envelope).expect("unwrap stored key");
    assert_eq!(key.len(), 32);

    // Duplicate usernames are rejected up front.
    let dup = t.db.users.create("alice", "x", &envelope).await;
    assert!(matches!(dup, Err(Error::InvalidInput(_))));

    t.cleanup().await;
}
