//! Item state storage and command dispatch
//!
//! The ItemRegistry tracks the current state of every named item, accepts
//! commands posted by rule actions or external callers, and fires
//! ITEM_COMMAND and ITEM_STATE_CHANGED events on the bus. From the rule
//! engine's point of view `post_command` is fire-and-forget.

use casa_core::events::{ItemCommandData, ItemStateChangedData};
use casa_core::{Context, Value};
use casa_event_bus::EventBus;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Item errors
#[derive(Debug, Clone, Error)]
pub enum ItemError {
    #[error("Item not found: {0}")]
    NotFound(String),
}

/// Result type for item operations
pub type ItemResult<T> = Result<T, ItemError>;

/// A named item with its current state
#[derive(Debug, Clone)]
pub struct Item {
    /// Item name, unique within the registry
    pub name: String,

    /// Current state
    pub state: Value,

    /// When the state last changed to a different value
    pub last_changed: DateTime<Utc>,
}

/// The item registry tracks all item states
pub struct ItemRegistry {
    items: DashMap<String, Item>,
    bus: Arc<EventBus>,
}

impl ItemRegistry {
    /// Create a new registry publishing on the given bus
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            items: DashMap::new(),
            bus,
        }
    }

    /// Add an item with an initial state
    pub fn add(&self, name: impl Into<String>, initial_state: Value) {
        let name = name.into();
        debug!(item = %name, "Adding item");
        self.items.insert(
            name.clone(),
            Item {
                name,
                state: initial_state,
                last_changed: Utc::now(),
            },
        );
    }

    /// Remove an item
    pub fn remove(&self, name: &str) -> Option<Item> {
        self.items.remove(name).map(|(_, item)| item)
    }

    /// Get an item by name
    pub fn get(&self, name: &str) -> Option<Item> {
        self.items.get(name).map(|i| i.clone())
    }

    /// Get an item's current state
    pub fn state(&self, name: &str) -> Option<Value> {
        self.items.get(name).map(|i| i.state.clone())
    }

    /// Number of registered items
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Post a command to an item
    ///
    /// Publishes an ITEM_COMMAND event, applies the command as the item's
    /// new state, and publishes ITEM_STATE_CHANGED. The command string is
    /// parsed into its most specific value form ("ON" stays a string,
    /// "21" becomes an integer).
    pub fn post_command(&self, name: &str, command: &str, context: &Context) -> ItemResult<()> {
        if !self.items.contains_key(name) {
            return Err(ItemError::NotFound(name.to_string()));
        }

        let command = Value::parse(command);
        debug!(item = %name, command = %command, "Posting command");

        self.bus.fire_typed(
            ItemCommandData {
                item_name: name.to_string(),
                command: command.clone(),
            },
            context.clone(),
        );

        self.set_state(name, command, context)
    }

    /// Set an item's state directly, firing ITEM_STATE_CHANGED
    pub fn set_state(&self, name: &str, new_state: Value, context: &Context) -> ItemResult<()> {
        let old_state = {
            let mut item = self
                .items
                .get_mut(name)
                .ok_or_else(|| ItemError::NotFound(name.to_string()))?;

            let old = item.state.clone();
            if old != new_state {
                item.last_changed = Utc::now();
            }
            item.state = new_state.clone();
            old
        };

        trace!(item = %name, old = %old_state, new = %new_state, "Item state updated");

        self.bus.fire_typed(
            ItemStateChangedData {
                item_name: name.to_string(),
                old_state: Some(old_state),
                new_state,
            },
            context.clone(),
        );

        Ok(())
    }
}
