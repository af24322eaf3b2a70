//! Link-graph service: backlinks and graph construction.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use braid_crypto::open;
use tracing::{debug, warn};

use braid_core::{
    children_index, connected_components, subtree_sizes, BacklinkEntry, GraphNode, GraphPayload,
    LinkRepository, Result, EXCERPT_LEN,
};

use crate::keys::KeyVault;

/// Serves the derived reference graph, filtered to the requester's view.
pub struct LinkGraph {
    links: Arc<dyn LinkRepository>,
    vault: Arc<KeyVault>,
}

impl LinkGraph {
    pub fn new(links: Arc<dyn LinkRepository>, vault: Arc<KeyVault>) -> Self {
        Self { links, vault }
    }

    /// Notes referencing `note_id`, visibility-filtered and capped.
    pub async fn backlinks(
        &self,
        note_id: i64,
        requester: Option<i64>,
    ) -> Result<Vec<BacklinkEntry>> {
        self.links.backlinks(note_id, requester).await
    }

    /// Build the requester's view of the graph: visible notes as nodes with
    /// decrypted excerpts, and edges whose both endpoints are visible.
    /// `title_query` narrows the node set by title substring; edges follow
    /// the surviving nodes.
    ///
    /// A node whose content cannot be decrypted keeps its place in the graph
    /// with an empty excerpt; graph rendering degrades, it does not fail.
    pub async fn build_graph(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
    ) -> Result<GraphPayload> {
        let notes = self.links.graph_notes(requester, title_query).await?;
        let visible: HashSet<i64> = notes.iter().map(|n| n.id).collect();

        let edges: Vec<_> = self
            .links
            .all_edges()
            .await?
            .into_iter()
            .filter(|e| visible.contains(&e.from) && visible.contains(&e.to))
            .collect();

        let mut keys: HashMap<(i64, bool), [u8; 32]> = HashMap::new();
        let mut nodes = Vec::with_capacity(notes.len());

        for note in &notes {
            let slot = (note.owner_id, note.is_public);
            let key = match keys.get(&slot) {
                Some(k) => Some(*k),
                None => match self.vault.content_key(note.owner_id, note.is_public).await {
                    Ok(k) => {
                        keys.insert(slot, k);
                        Some(k)
                    }
                    Err(_) => None,
                },
            };

            let excerpt = match key.map(|k| open(&k, &note.content)) {
                Some(Ok(plaintext)) => {
                    let content = String::from_utf8_lossy(&plaintext).into_owned();
                    braid_core::graph::excerpt(&content, EXCERPT_LEN)
                }
                _ => {
                    warn!(
                        subsystem = "service",
                        component = "link_graph",
                        note_id = note.id,
                        "excerpt degraded, content failed to decrypt"
                    );
                    String::new()
                }
            };

            nodes.push(GraphNode {
                id: note.id,
                title: note.title.clone(),
                is_public: note.is_public,
                author: note.author.clone(),
                owned: requester == Some(note.owner_id),
                excerpt,
            });
        }

        debug!(
            subsystem = "service",
            component = "link_graph",
            op = "build_graph",
            result_count = nodes.len(),
            edge_count = edges.len(),
            "graph built"
        );

        Ok(GraphPayload { nodes, edges })
    }

    /// Assign each node of a built graph to an undirected component.
    pub fn component_map(payload: &GraphPayload) -> HashMap<i64, usize> {
        let ids: Vec<i64> = payload.nodes.iter().map(|n| n.id).collect();
        connected_components(&ids, &payload.edges)
    }

    /// Per-node descendant counts, reading edges as reply-to-parent.
    pub fn subtree_size_map(payload: &GraphPayload) -> HashMap<i64, usize> {
        let ids: Vec<i64> = payload.nodes.iter().map(|n| n.id).collect();
        let children = children_index(&ids, &payload.edges);
        subtree_sizes(&children)
    }
}
