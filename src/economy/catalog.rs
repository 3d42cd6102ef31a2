//! Item catalog for the shop.
//!
//! The catalog is an immutable value built once at startup and kept sorted by price so
//! listings never need to reorder a shared list. Items are matched by a bare identifier
//! derived from the display name, so the emblem and spacing of a display name never
//! affect what a player has to type.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// A purchasable item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItem {
    /// Emblem, a space, then the name, e.g. `🔫 Gun`
    pub display_name: String,
    /// Price in whole currency units; always positive
    pub price: i64,
    pub description: String,
    /// Normalized key matched against inventory stack names and user input
    pub identifier: String,
}

impl CatalogItem {
    pub fn new(display_name: &str, price: i64, description: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            price,
            description: description.to_string(),
            identifier: normalize_identifier(display_name),
        }
    }

    /// What a player gets back when selling one of these.
    pub fn sell_price(&self) -> i64 {
        self.price / 2
    }
}

/// Map a display name or raw user input to the bare identifier used as a key.
///
/// A leading emblem token is dropped (`🔫 Gun`, `🅱 Beta`), then any leading
/// non-alphanumeric characters, whitespace anywhere is removed and the result is
/// lowercased.
pub fn normalize_identifier(raw: &str) -> String {
    strip_emblem(raw.trim())
        .trim_start_matches(|ch: char| !ch.is_alphanumeric())
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Text after the first whitespace-separated token when that token is an emblem. An emblem
/// has no ASCII letters or digits; Unicode counts some of them (`🅱`, `Ⓜ`) as alphabetic.
fn strip_emblem(name: &str) -> &str {
    match name.split_once(char::is_whitespace) {
        Some((first, rest))
            if !rest.trim().is_empty() && !first.chars().any(|ch| ch.is_ascii_alphanumeric()) =>
        {
            rest
        }
        _ => name,
    }
}

/// Immutable, price-ordered list of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    /// Build a catalog; items are stably sorted by ascending price.
    pub fn new(mut items: Vec<CatalogItem>) -> Self {
        items.sort_by_key(|item| item.price);
        Self { items }
    }

    /// The six items every guild shop carries.
    pub fn standard() -> Self {
        Self::new(vec![
            CatalogItem::new("🔫 Gun", 2000, "It's a gun... what do you expect?"),
            CatalogItem::new("🚗 Car", 50000, "Run people over with this car!"),
            CatalogItem::new(
                "🍫 Chocolate",
                50,
                "It won't help against the zombies, but everyone loves chocolate!",
            ),
            CatalogItem::new("💍 Ring", 1000, "Congratulations! Who's the lucky person?"),
            CatalogItem::new(
                "🏹 Bow",
                400,
                "It might not be as strong as a gun, but it's cheaper!",
            ),
            CatalogItem::new("🛡️ Shield", 5000, "Protect yourself from the attackers!"),
        ])
    }

    /// Process-wide standard catalog.
    pub fn shared() -> Arc<Catalog> {
        static STANDARD: OnceLock<Arc<Catalog>> = OnceLock::new();
        STANDARD
            .get_or_init(|| Arc::new(Catalog::standard()))
            .clone()
    }

    pub fn list_items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Look up by identifier; input is normalized first so `"Gun"` and `"🔫 gun"` both match.
    pub fn find_by_identifier(&self, id: &str) -> Option<&CatalogItem> {
        let wanted = normalize_identifier(id);
        if wanted.is_empty() {
            return None;
        }
        self.items.iter().find(|item| item.identifier == wanted)
    }

    /// Label for an inventory stack: catalog display name, or the capitalized bare name
    /// when the item has left the catalog.
    pub fn display_label(&self, name: &str) -> String {
        match self.find_by_identifier(name) {
            Some(item) => item.display_name.clone(),
            None => capitalize(name),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
