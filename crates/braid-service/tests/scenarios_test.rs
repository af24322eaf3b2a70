//! End-to-end service scenarios over the in-memory backend.
//!
//! These exercise the full service layer (key selection, sealing, visibility,
//! ordering, events) with real crypto and a real event hub; only the storage
//! is substituted.

use std::sync::Arc;

use braid_core::{
    CreateNoteRequest, Error, EventHub, FeedSort, GraphLayout, Position, UpdateNoteRequest,
    DEFAULT_NOTE_TITLE,
};
use braid_crypto::{open, seal, MasterKey};
use braid_service::testing::MemBackend;
use braid_service::{Repositories, Services};

const TEST_MASTER_KEY: [u8; 32] = [0x42; 32];

struct Harness {
    backend: Arc<MemBackend>,
    services: Services,
}

fn harness() -> Harness {
    let backend = Arc::new(MemBackend::new());
    let repos = Repositories {
        users: backend.clone(),
        notes: backend.clone(),
        links: backend.clone(),
        orders: backend.clone(),
        layouts: backend.clone(),
    };
    let hub = Arc::new(EventHub::with_capacity(16));
    let services = Services::new(MasterKey::new(TEST_MASTER_KEY), repos, hub);
    Harness { backend, services }
}

impl Harness {
    async fn register(&self, username: &str) -> i64 {
        let user = self
            .services
            .vault
            .register_user(username, "hash")
            .await
            .expect("register user");
        user.id
    }

    async fn create(&self, owner: i64, title: &str, content: &str, is_public: bool) -> i64 {
        self.services
            .notes
            .create(
                owner,
                CreateNoteRequest {
                    title: Some(title.to_string()),
                    content: content.to_string(),
                    is_public,
                },
            )
            .await
            .expect("create note")
            .id
    }
}

fn update_req(title: &str, content: &str, is_public: bool) -> UpdateNoteRequest {
    UpdateNoteRequest {
        title: title.to_string(),
        content: content.to_string(),
        is_public,
    }
}

// =============================================================================
// ENCRYPTION AND VISIBILITY
// =============================================================================

#[tokio::test]
async fn test_private_note_hidden_from_others_and_anonymous() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;

    let id = h.create(alice, "Secret", "my private thoughts", false).await;

    let mine = h.services.notes.read(id, Some(alice)).await.unwrap();
    assert_eq!(mine.content, "my private thoughts");
    assert_eq!(mine.owned, Some(true));

    assert!(matches!(
        h.services.notes.read(id, Some(bob)).await,
        Err(Error::NoteNotFound(_))
    ));
    assert!(matches!(
        h.services.notes.read(id, None).await,
        Err(Error::NoteNotFound(_))
    ));
}

#[tokio::test]
async fn test_stored_content_is_sealed_not_plaintext() {
    let h = harness();
    let alice = h.register("alice").await;
    let id = h.create(alice, "Plans", "meet at noon", true).await;

    let stored = h.backend.stored(id).unwrap();
    assert_ne!(stored.content.ciphertext, b"meet at noon");

    // Public content opens under the master key directly.
    let plain = open(&TEST_MASTER_KEY, &stored.content).unwrap();
    assert_eq!(plain, b"meet at noon");
}

#[tokio::test]
async fn test_visibility_flip_reseals_under_other_key() {
    let h = harness();
    let alice = h.register("alice").await;
    let id = h.create(alice, "Draft", "work in progress", false).await;

    // Private: the master key must not open it.
    let stored = h.backend.stored(id).unwrap();
    assert!(open(&TEST_MASTER_KEY, &stored.content).is_err());

    h.services
        .notes
        .update(id, alice, update_req("Draft", "work in progress", true))
        .await
        .unwrap();

    // Public now: master key opens it, and anonymous reads succeed.
    let stored = h.backend.stored(id).unwrap();
    assert_eq!(
        open(&TEST_MASTER_KEY, &stored.content).unwrap(),
        b"work in progress"
    );
    let anon = h.services.notes.read(id, None).await.unwrap();
    assert_eq!(anon.content, "work in progress");
    assert_eq!(anon.owned, None);

    // Flip back: master key locked out again, owner still reads fine.
    h.services
        .notes
        .update(id, alice, update_req("Draft", "work in progress", false))
        .await
        .unwrap();
    let stored = h.backend.stored(id).unwrap();
    assert!(open(&TEST_MASTER_KEY, &stored.content).is_err());
    let mine = h.services.notes.read(id, Some(alice)).await.unwrap();
    assert_eq!(mine.content, "work in progress");
}

#[tokio::test]
async fn test_update_reseals_with_fresh_nonce() {
    let h = harness();
    let alice = h.register("alice").await;
    let id = h.create(alice, "Note", "same content", true).await;
    let before = h.backend.stored(id).unwrap();

    h.services
        .notes
        .update(id, alice, update_req("Note", "same content", true))
        .await
        .unwrap();
    let after = h.backend.stored(id).unwrap();

    assert_ne!(before.content.iv, after.content.iv);
    assert_ne!(before.content.ciphertext, after.content.ciphertext);
    assert_eq!(
        h.services.notes.read(id, None).await.unwrap().content,
        "same content"
    );
}

#[tokio::test]
async fn test_update_foreign_note_reports_not_found() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;
    let id = h.create(alice, "Mine", "hands off", true).await;

    assert!(matches!(
        h.services
            .notes
            .update(id, bob, update_req("Taken", "mine now", true))
            .await,
        Err(Error::NoteNotFound(_))
    ));
}

#[tokio::test]
async fn test_default_title_applied() {
    let h = harness();
    let alice = h.register("alice").await;

    let note = h
        .services
        .notes
        .create(
            alice,
            CreateNoteRequest {
                title: None,
                content: "untitled body".to_string(),
                is_public: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(note.title, DEFAULT_NOTE_TITLE);
}

// =============================================================================
// LINKS AND GRAPH
// =============================================================================

#[tokio::test]
async fn test_backlinks_respect_source_visibility() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;

    let target = h.create(alice, "Hub", "central note", true).await;
    let public_src = h
        .create(alice, "Pub ref", &format!("see [[#{target}]]"), true)
        .await;
    let alice_private_src = h
        .create(alice, "Priv ref", &format!("also [[#{target}]]"), false)
        .await;
    h.create(bob, "Bob ref", &format!("and [[#{target}]]"), false)
        .await;

    let anon: Vec<i64> = h
        .services
        .graph
        .backlinks(target, None)
        .await
        .unwrap()
        .iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(anon, vec![public_src]);

    let mut mine: Vec<i64> = h
        .services
        .graph
        .backlinks(target, Some(alice))
        .await
        .unwrap()
        .iter()
        .map(|b| b.id)
        .collect();
    mine.sort_unstable();
    assert_eq!(mine, vec![public_src, alice_private_src]);
}

#[tokio::test]
async fn test_backlinks_of_invisible_target_not_found() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;
    let hidden = h.create(bob, "Hidden", "private", false).await;

    assert!(matches!(
        h.services.graph.backlinks(hidden, Some(alice)).await,
        Err(Error::NoteNotFound(_))
    ));
    assert!(matches!(
        h.services.graph.backlinks(hidden, None).await,
        Err(Error::NoteNotFound(_))
    ));
}

#[tokio::test]
async fn test_anonymous_graph_shows_public_subgraph_only() {
    let h = harness();
    let alice = h.register("alice").await;

    let b = h.create(alice, "B", "leaf note", true).await;
    let c = h.create(alice, "C", "private leaf", false).await;
    let a = h
        .create(alice, "A", &format!("refs [[#{b}]] and [[#{c}]]"), true)
        .await;

    let graph = h.services.graph.build_graph(None, None).await.unwrap();
    let mut node_ids: Vec<i64> = graph.nodes.iter().map(|n| n.id).collect();
    node_ids.sort_unstable();
    assert_eq!(node_ids, vec![b, a]);

    // The edge into the private note is filtered with it.
    assert_eq!(graph.edges.len(), 1);
    assert_eq!((graph.edges[0].from, graph.edges[0].to), (a, b));

    let node_a = graph.nodes.iter().find(|n| n.id == a).unwrap();
    assert!(node_a.excerpt.contains("refs"));
    assert!(!node_a.owned);
}

#[tokio::test]
async fn test_graph_title_filter_narrows_nodes_and_edges() {
    let h = harness();
    let alice = h.register("alice").await;

    let intro = h.create(alice, "Intro", "start here", true).await;
    let sequel = h
        .create(alice, "Intro, part two", &format!("after [[#{intro}]]"), true)
        .await;
    let journal = h
        .create(alice, "Journal", &format!("see [[#{intro}]]"), true)
        .await;

    let graph = h
        .services
        .graph
        .build_graph(None, Some("intro"))
        .await
        .unwrap();

    // Case-insensitive substring match on the title; edges follow the
    // surviving nodes, so the journal's edge into the intro is gone too.
    let mut node_ids: Vec<i64> = graph.nodes.iter().map(|n| n.id).collect();
    node_ids.sort_unstable();
    assert_eq!(node_ids, vec![intro, sequel]);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!((graph.edges[0].from, graph.edges[0].to), (sequel, intro));

    // The filter never widens visibility: a private note stays invisible to
    // anonymous requesters even when its title matches.
    let hidden = h.create(alice, "Intro draft", "unpublished", false).await;
    let graph = h
        .services
        .graph
        .build_graph(None, Some("intro"))
        .await
        .unwrap();
    assert!(graph.nodes.iter().all(|n| n.id != hidden));
    let _ = journal;
}

#[tokio::test]
async fn test_owner_graph_includes_private_nodes() {
    let h = harness();
    let alice = h.register("alice").await;
    let b = h.create(alice, "B", "leaf", true).await;
    let c = h.create(alice, "C", "secret leaf", false).await;
    let a = h
        .create(alice, "A", &format!("[[#{b}]] [[#{c}]]"), true)
        .await;

    let graph = h.services.graph.build_graph(Some(alice), None).await.unwrap();
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 2);
    assert!(graph.nodes.iter().all(|n| n.owned));

    let node_c = graph.nodes.iter().find(|n| n.id == c).unwrap();
    assert_eq!(node_c.excerpt, "secret leaf");
    assert!(graph.edges.iter().all(|e| e.from == a));
}

#[tokio::test]
async fn test_undecryptable_content_degrades_to_empty_excerpt() {
    let h = harness();
    let alice = h.register("alice").await;
    let id = h.create(alice, "Damaged", "original text", true).await;

    // Reseal under a key nobody holds; the node must survive with no excerpt.
    let garbage = seal(&[0x99; 32], b"unreachable").unwrap();
    h.backend.tamper_content(id, garbage);

    let graph = h.services.graph.build_graph(None, None).await.unwrap();
    let node = graph.nodes.iter().find(|n| n.id == id).unwrap();
    assert_eq!(node.excerpt, "");
    assert_eq!(node.title, "Damaged");
}

#[tokio::test]
async fn test_component_and_subtree_maps() {
    let h = harness();
    let alice = h.register("alice").await;
    let root = h.create(alice, "Root", "thread root", true).await;
    let reply = h
        .create(alice, "Reply", &format!("re: [[#{root}]]"), true)
        .await;
    let lone = h.create(alice, "Lone", "unconnected", true).await;

    let graph = h.services.graph.build_graph(None, None).await.unwrap();

    let components = braid_service::LinkGraph::component_map(&graph);
    assert_eq!(components[&root], components[&reply]);
    assert_ne!(components[&root], components[&lone]);

    // Descendant counts: the reply hangs under the root, leaves count zero.
    let sizes = braid_service::LinkGraph::subtree_size_map(&graph);
    assert_eq!(sizes[&root], 1);
    assert_eq!(sizes[&reply], 0);
    assert_eq!(sizes[&lone], 0);
}

// =============================================================================
// ORDERING AND FEED
// =============================================================================

#[tokio::test]
async fn test_set_order_dedups_preserving_first_occurrence() {
    let h = harness();
    let alice = h.register("alice").await;
    let n1 = h.create(alice, "One", "1", false).await;
    let n2 = h.create(alice, "Two", "2", false).await;
    let n3 = h.create(alice, "Three", "3", false).await;

    let stored = h
        .services
        .ordering
        .set_order(alice, &[n2, n1, n2, n3, n1])
        .await
        .unwrap();
    assert_eq!(stored, vec![n2, n1, n3]);

    let listed: Vec<i64> = h
        .services
        .notes
        .list(alice, None)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(listed, vec![n2, n1, n3]);
}

#[tokio::test]
async fn test_set_order_rejects_foreign_private_wholesale() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;
    let mine = h.create(alice, "Mine", "1", false).await;
    let other = h.create(alice, "Other", "2", false).await;
    let theirs = h.create(bob, "Theirs", "3", false).await;

    h.services
        .ordering
        .set_order(alice, &[other, mine])
        .await
        .unwrap();

    assert!(matches!(
        h.services.ordering.set_order(alice, &[mine, theirs]).await,
        Err(Error::Forbidden(_))
    ));

    // Rejected request leaves the previous order intact.
    let listed: Vec<i64> = h
        .services
        .notes
        .list(alice, None)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(listed, vec![other, mine]);
}

#[tokio::test]
async fn test_public_foreign_notes_are_orderable() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;
    let mine = h.create(alice, "Mine", "1", false).await;
    let shared = h.create(bob, "Shared", "2", true).await;

    let stored = h
        .services
        .ordering
        .set_order(alice, &[shared, mine])
        .await
        .unwrap();
    assert_eq!(stored, vec![shared, mine]);
}

#[tokio::test]
async fn test_feed_sort_modes() {
    let h = harness();
    let alice = h.register("alice").await;
    let banana = h.create(alice, "banana", "b", true).await;
    let apple = h.create(alice, "Apple", "a", true).await;
    let cherry = h.create(alice, "cherry", "c", true).await;

    // Date: most recently written first.
    let by_date: Vec<i64> = h
        .services
        .notes
        .feed(None, None, FeedSort::Date)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(by_date, vec![cherry, apple, banana]);

    // Title: case-insensitive ascending.
    let by_title: Vec<i64> = h
        .services
        .notes
        .feed(None, None, FeedSort::Title)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(by_title, vec![apple, banana, cherry]);

    // Custom applies the requester's explicit order, unordered notes after.
    h.services
        .ordering
        .set_order(alice, &[cherry, banana])
        .await
        .unwrap();
    let custom: Vec<i64> = h
        .services
        .notes
        .feed(Some(alice), None, FeedSort::Custom)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(custom, vec![cherry, banana, apple]);

    // Anonymous requesters have no order; custom falls back to recency.
    let anon_custom: Vec<i64> = h
        .services
        .notes
        .feed(None, None, FeedSort::Custom)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(anon_custom, by_date);
}

#[tokio::test]
async fn test_title_query_filters_listings() {
    let h = harness();
    let alice = h.register("alice").await;
    let plans = h.create(alice, "Weekly Plans", "p", true).await;
    h.create(alice, "Journal", "j", true).await;

    let hits: Vec<i64> = h
        .services
        .notes
        .list_public(Some("plan"))
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(hits, vec![plans]);
}

// =============================================================================
// EVENTS
// =============================================================================

fn event_name(frame: &str) -> &str {
    frame
        .strip_prefix("event: ")
        .and_then(|rest| rest.split('\n').next())
        .unwrap_or("")
}

#[tokio::test]
async fn test_create_notifies_owner_and_broadcasts_feed_change() {
    let h = harness();
    let alice = h.register("alice").await;

    let mut owner_sub = h.services.hub.subscribe(Some(alice));
    let mut anon_sub = h.services.hub.subscribe(None);
    assert_eq!(event_name(&owner_sub.try_recv().unwrap()), "hello");
    assert_eq!(event_name(&anon_sub.try_recv().unwrap()), "hello");

    let id = h.create(alice, "Announce", "hello world", true).await;

    let owner_frame = owner_sub.try_recv().unwrap();
    assert_eq!(event_name(&owner_frame), "note_created");
    assert!(owner_frame.contains("hello world"));
    assert!(owner_frame.contains("\"is_public\":1"));

    let anon_frame = anon_sub.try_recv().unwrap();
    assert_eq!(event_name(&anon_frame), "feed_changed");
    assert!(anon_frame.contains("\"type\":\"note_created\""));
    assert!(anon_frame.contains(&format!("\"id\":{id}")));
}

#[tokio::test]
async fn test_private_create_does_not_broadcast() {
    let h = harness();
    let alice = h.register("alice").await;
    let mut anon_sub = h.services.hub.subscribe(None);
    let _ = anon_sub.try_recv(); // hello

    h.create(alice, "Quiet", "nothing to see", false).await;
    assert!(anon_sub.try_recv().is_none());
}

#[tokio::test]
async fn test_visibility_flip_broadcasts_both_directions() {
    let h = harness();
    let alice = h.register("alice").await;
    let id = h.create(alice, "Flip", "content", true).await;

    let mut anon_sub = h.services.hub.subscribe(None);
    let _ = anon_sub.try_recv(); // hello

    // Public -> private: watchers must learn the note left the feed.
    h.services
        .notes
        .update(id, alice, update_req("Flip", "content", false))
        .await
        .unwrap();
    assert_eq!(event_name(&anon_sub.try_recv().unwrap()), "feed_changed");

    // Private -> private: nothing visible changed.
    h.services
        .notes
        .update(id, alice, update_req("Flip", "content v2", false))
        .await
        .unwrap();
    assert!(anon_sub.try_recv().is_none());

    // Private -> public: back in the feed.
    h.services
        .notes
        .update(id, alice, update_req("Flip", "content v3", true))
        .await
        .unwrap();
    assert_eq!(event_name(&anon_sub.try_recv().unwrap()), "feed_changed");
}

#[tokio::test]
async fn test_reorder_notifies_owner_only() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;
    let n1 = h.create(alice, "One", "1", false).await;
    let n2 = h.create(alice, "Two", "2", false).await;

    let mut alice_sub = h.services.hub.subscribe(Some(alice));
    let mut bob_sub = h.services.hub.subscribe(Some(bob));
    let _ = alice_sub.try_recv();
    let _ = bob_sub.try_recv();

    h.services.ordering.set_order(alice, &[n2, n1]).await.unwrap();

    let frame = alice_sub.try_recv().unwrap();
    assert_eq!(event_name(&frame), "notes_reordered");
    assert!(frame.contains(&format!("\"order\":[{n2},{n1}]")));
    assert!(bob_sub.try_recv().is_none());
}

#[tokio::test]
async fn test_delete_is_idempotent_and_notifies() {
    let h = harness();
    let alice = h.register("alice").await;
    let id = h.create(alice, "Gone", "soon", true).await;

    let mut owner_sub = h.services.hub.subscribe(Some(alice));
    let mut anon_sub = h.services.hub.subscribe(None);
    let _ = owner_sub.try_recv();
    let _ = anon_sub.try_recv();

    assert!(h.services.notes.delete(id, alice).await.unwrap());
    assert_eq!(event_name(&owner_sub.try_recv().unwrap()), "note_deleted");
    assert_eq!(event_name(&anon_sub.try_recv().unwrap()), "feed_changed");

    // Second delete is a quiet no-op.
    assert!(!h.services.notes.delete(id, alice).await.unwrap());
    assert!(owner_sub.try_recv().is_none());
    assert!(anon_sub.try_recv().is_none());

    // Edges referencing the note are swept with it.
    assert!(h.backend.edges().iter().all(|&(f, t)| f != id && t != id));
}

#[tokio::test]
async fn test_dropped_subscription_stops_delivery() {
    let h = harness();
    let alice = h.register("alice").await;

    let sub = h.services.hub.subscribe(None);
    assert_eq!(h.services.hub.sink_count(), 1);
    drop(sub);
    assert_eq!(h.services.hub.sink_count(), 0);

    // Broadcasting into an empty hub is a no-op.
    h.create(alice, "Post", "content", true).await;
}

// =============================================================================
// LAYOUTS
// =============================================================================

#[tokio::test]
async fn test_layout_roundtrip_and_default_key() {
    let h = harness();
    let alice = h.register("alice").await;

    // Absent layouts read as empty.
    let empty = h.services.layouts.get_layout(alice, None).await.unwrap();
    assert!(empty.positions.is_empty());

    let mut layout = GraphLayout::default();
    layout
        .positions
        .insert("7".to_string(), Position { x: 10.0, y: -2.5 });
    layout.collapsed.push(7);
    h.services
        .layouts
        .save_layout(alice, Some(" "), layout.clone())
        .await
        .unwrap();

    // Blank key normalizes to the default, so the read finds it.
    let loaded = h.services.layouts.get_layout(alice, None).await.unwrap();
    assert_eq!(loaded.positions["7"], Position { x: 10.0, y: -2.5 });
    assert_eq!(loaded.collapsed, vec![7]);
}

#[tokio::test]
async fn test_layout_rejected_wholesale_on_bad_entry() {
    let h = harness();
    let alice = h.register("alice").await;

    let mut layout = GraphLayout::default();
    layout
        .positions
        .insert("3".to_string(), Position { x: 1.0, y: 1.0 });
    layout.positions.insert(
        "nope".to_string(),
        Position { x: 0.0, y: 0.0 },
    );
    assert!(matches!(
        h.services.layouts.save_layout(alice, None, layout).await,
        Err(Error::InvalidInput(_))
    ));

    // Nothing was partially accepted.
    let loaded = h.services.layouts.get_layout(alice, None).await.unwrap();
    assert!(loaded.positions.is_empty());
}

// =============================================================================
// USERS
// =============================================================================

#[tokio::test]
async fn test_register_rejects_blank_and_duplicate_usernames() {
    let h = harness();
    assert!(matches!(
        h.services.vault.register_user("   ", "hash").await,
        Err(Error::InvalidInput(_))
    ));

    h.register("alice").await;
    assert!(matches!(
        h.services.vault.register_user("alice", "hash").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_each_user_gets_a_distinct_key() {
    let h = harness();
    let alice = h.register("alice").await;
    let bob = h.register("bob").await;

    let alice_key = h.services.vault.user_key(alice).await.unwrap();
    let bob_key = h.services.vault.user_key(bob).await.unwrap();
    assert_ne!(alice_key, bob_key);
    assert_ne!(alice_key, TEST_MASTER_KEY);
}
