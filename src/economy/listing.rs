//! Structured listings handed to the presentation layer: the shop, an inventory, the
//! leaderboard. The engine builds them; rendering is the caller's business, except for
//! the plain-text fallback used by the CLI.
use serde::Serialize;

use super::catalog::Catalog;
use super::types::{ItemStack, PlayerRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub display_label: String,
    pub detail_line: String,
}

impl ListingEntry {
    pub fn new(display_label: impl Into<String>, detail_line: impl Into<String>) -> Self {
        Self {
            display_label: display_label.into(),
            detail_line: detail_line.into(),
        }
    }
}

/// One page of entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub title: String,
    pub entries: Vec<ListingEntry>,
    /// Zero-based index of the page shown, after clamping
    pub page: usize,
    /// Always at least 1, even for an empty listing
    pub total_pages: usize,
}

impl Listing {
    /// Plain-text rendering, one entry per two lines.
    pub fn render_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.entries.len() * 2 + 2);
        lines.push(format!("=== {} ===", self.title));
        if self.entries.is_empty() {
            lines.push("Nothing to show.".to_string());
        }
        for entry in &self.entries {
            lines.push(entry.display_label.clone());
            lines.push(format!("  {}", entry.detail_line));
        }
        lines.push(format!("Page {}/{}", self.page + 1, self.total_pages));
        lines.join("\n")
    }
}

/// Number of pages needed for `len` entries, never less than one.
pub fn page_count(len: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    len.div_ceil(size).max(1)
}

/// Cut one page out of `entries`. Negative page indexes clamp to the first page and
/// indexes past the end clamp to the last.
pub fn paginate(
    title: impl Into<String>,
    entries: Vec<ListingEntry>,
    page_size: usize,
    page: i64,
) -> Listing {
    let size = page_size.max(1);
    let total_pages = page_count(entries.len(), size);
    let page = page.clamp(0, total_pages as i64 - 1) as usize;
    let entries = entries.into_iter().skip(page * size).take(size).collect();
    Listing {
        title: title.into(),
        entries,
        page,
        total_pages,
    }
}

pub fn shop_entries(catalog: &Catalog, currency: &str) -> Vec<ListingEntry> {
    catalog
        .list_items()
        .iter()
        .map(|item| {
            ListingEntry::new(
                format!("{} - {} {}", item.display_name, item.price, currency),
                item.description.clone(),
            )
        })
        .collect()
}

pub fn inventory_entries(catalog: &Catalog, inventory: &[ItemStack]) -> Vec<ListingEntry> {
    inventory
        .iter()
        .map(|stack| {
            ListingEntry::new(
                catalog.display_label(&stack.name),
                format!("Quantity: {}", stack.quantity),
            )
        })
        .collect()
}

/// Richest first; ties broken by player id so the order is stable.
pub fn leaderboard_entries(
    mut players: Vec<PlayerRecord>,
    limit: usize,
    currency: &str,
) -> Vec<ListingEntry> {
    players.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
    players
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(rank, record)| {
            let name = if record.display_name.is_empty() {
                format!("<@{}>", record.player_id)
            } else {
                record.display_name.clone()
            };
            ListingEntry::new(
                format!("#{} {}", rank + 1, name),
                format!("{} {}", record.balance, currency),
            )
        })
        .collect()
}
