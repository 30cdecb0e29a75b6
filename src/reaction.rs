//! Reaction toggling.
//!
//! Content items carry their reaction tallies as
//! `"reaction_counts": {"like": 3, ...}` and the viewer's own reaction as
//! `"user_reaction": "like" | null`. Toggling a type moves the viewer's reaction
//! to that type, or clears it when it is already the current one.
//!
//! The prediction is pure and always reads the data it is given, so chaining
//! several toggles over the current optimistic state alternates
//! deterministically.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::registry::{OptimisticPolicy, id_of};
use crate::tag::{ResourceCategory, Tag};

pub const COUNTS_FIELD: &str = "reaction_counts";
pub const USER_REACTION_FIELD: &str = "user_reaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Love,
    Laugh,
    Angry,
}

impl ReactionType {
    pub const ALL: [Self; 4] = [Self::Like, Self::Love, Self::Laugh, Self::Angry];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Laugh => "laugh",
            Self::Angry => "angry",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_str() == value)
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of the `toggle_reaction` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleReaction {
    pub id: u64,
    pub reaction_type: ReactionType,
}

impl ToggleReaction {
    pub const fn new(id: u64, reaction_type: ReactionType) -> Self {
        Self { id, reaction_type }
    }

    pub fn to_args(&self) -> Value {
        json!({ "id": self.id, "reaction_type": self.reaction_type })
    }
}

/// Reaction tallies of one content item plus the viewer's own reaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionSummary {
    pub counts: BTreeMap<ReactionType, u64>,
    pub current: Option<ReactionType>,
}

impl ReactionSummary {
    /// Reads the summary from a content item, treating missing fields as zero.
    pub fn from_item(item: &Value) -> Self {
        let counts = item
            .get(COUNTS_FIELD)
            .and_then(Value::as_object)
            .map(|counts| {
                counts
                    .iter()
                    .filter_map(|(name, count)| Some((ReactionType::parse(name)?, count.as_u64()?)))
                    .collect()
            })
            .unwrap_or_default();
        let current = item
            .get(USER_REACTION_FIELD)
            .and_then(Value::as_str)
            .and_then(ReactionType::parse);
        Self { counts, current }
    }

    pub fn count(&self, ty: ReactionType) -> u64 {
        self.counts.get(&ty).copied().unwrap_or(0)
    }

    /// Applies one toggle of `ty`.
    #[must_use]
    pub fn toggle(mut self, ty: ReactionType) -> Self {
        if let Some(previous) = self.current.take() {
            let count = self.counts.entry(previous).or_insert(0);
            *count = count.saturating_sub(1);
            if previous == ty {
                return self;
            }
        }
        *self.counts.entry(ty).or_insert(0) += 1;
        self.current = Some(ty);
        self
    }

    /// Writes the summary back into a content item.
    pub fn write_into(&self, item: &mut Map<String, Value>) {
        let counts: Map<String, Value> = self
            .counts
            .iter()
            .map(|(ty, count)| (ty.as_str().to_string(), Value::from(*count)))
            .collect();
        item.insert(COUNTS_FIELD.to_string(), Value::Object(counts));
        item.insert(
            USER_REACTION_FIELD.to_string(),
            self.current
                .map_or(Value::Null, |ty| Value::String(ty.as_str().to_string())),
        );
    }
}

/// Applies `f` to the content item with `id` inside `data`.
///
/// `data` may be the item itself, an array of items, or a paginated
/// `{"results": [...]}` page. Anything else is returned unchanged.
pub fn map_content_item(data: &Value, id: &str, f: impl Fn(&mut Map<String, Value>)) -> Value {
    fn visit(value: &mut Value, id: &str, f: &dyn Fn(&mut Map<String, Value>)) {
        match value {
            Value::Array(items) => {
                for item in items {
                    visit(item, id, f);
                }
            }
            Value::Object(map) => {
                if map.get("id").and_then(id_of).as_deref() == Some(id) {
                    f(map);
                } else if let Some(results) = map.get_mut("results").filter(|r| r.is_array()) {
                    visit(results, id, f);
                }
            }
            _ => {}
        }
    }

    let mut data = data.clone();
    visit(&mut data, id, &f);
    data
}

/// Predicts the data of an entry after the toggle described by `args`.
pub fn predict_toggle(current: &Value, args: &Value) -> Value {
    let (Some(id), Some(ty)) = (
        args.get("id").and_then(id_of),
        args.get("reaction_type")
            .and_then(Value::as_str)
            .and_then(ReactionType::parse),
    ) else {
        return current.clone();
    };

    map_content_item(current, &id, |item| {
        let summary = ReactionSummary::from_item(&Value::Object(item.clone())).toggle(ty);
        summary.write_into(item);
    })
}

/// Folds a toggle response into the entry when the server returns the tallies.
pub fn reconcile_toggle(current: &Value, args: &Value, response: &Value) -> Option<Value> {
    let id = args.get("id").and_then(id_of)?;
    response.get(COUNTS_FIELD)?.as_object()?;
    let confirmed = ReactionSummary::from_item(response);

    Some(map_content_item(current, &id, |item| confirmed.write_into(item)))
}

/// The optimistic policy registered on `toggle_reaction`.
pub fn toggle_policy() -> OptimisticPolicy {
    OptimisticPolicy {
        targets: Arc::new(|args| {
            args.get("id")
                .and_then(id_of)
                .map(|id| vec![Tag::instance(ResourceCategory::Content, id)])
                .unwrap_or_default()
        }),
        predict: Arc::new(predict_toggle),
        reconcile: Some(Arc::new(reconcile_toggle)),
    }
}
