//! Layout service: opaque per-owner graph layouts.

use std::sync::Arc;

use braid_core::{normalize_layout_key, GraphLayout, LayoutRepository, Result};

/// Stores and serves client graph layouts, validated only for size and shape.
pub struct LayoutService {
    layouts: Arc<dyn LayoutRepository>,
}

impl LayoutService {
    pub fn new(layouts: Arc<dyn LayoutRepository>) -> Self {
        Self { layouts }
    }

    /// Fetch the owner's layout under `key` (default "all"); absent layouts
    /// read as empty.
    pub async fn get_layout(&self, owner_id: i64, key: Option<&str>) -> Result<GraphLayout> {
        let key = normalize_layout_key(key);
        Ok(self
            .layouts
            .get(owner_id, &key)
            .await?
            .unwrap_or_default())
    }

    /// Validate and store the owner's layout under `key`. Malformed payloads
    /// are rejected wholesale; nothing is partially accepted.
    pub async fn save_layout(
        &self,
        owner_id: i64,
        key: Option<&str>,
        layout: GraphLayout,
    ) -> Result<()> {
        layout.validate()?;
        let key = normalize_layout_key(key);
        self.layouts.upsert(owner_id, &key, &layout).await
    }
}
