//! Proptest strategies for object graphs and edits

use super::object_graphs::Node;
use oxidize_cos::update::Container;
use oxidize_cos::{Name, ObjectKey};
use proptest::prelude::*;

prop_compose! {
    pub fn key_strategy()(
        number in 1u64..=99_999u64,
        generation in 0u32..=10u32
    ) -> ObjectKey {
        ObjectKey::from_parts(number, generation)
    }
}

pub fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Type".to_string()),
        Just("Kids".to_string()),
        Just("MediaBox".to_string()),
        "[A-Z][A-Za-z0-9]{0,12}",
    ]
}

fn leaf_strategy() -> impl Strategy<Value = Node> {
    prop_oneof![
        Just(Node::Null),
        any::<bool>().prop_map(Node::Boolean),
        any::<i64>().prop_map(Node::Integer),
        (-1.0e6f32..1.0e6f32).prop_map(Node::Real),
        "[A-Za-z]{1,10}".prop_map(Node::Name),
        "[ -~]{0,20}".prop_map(Node::Text),
    ]
}

/// Nested direct values, no references.
pub fn direct_node_strategy() -> impl Strategy<Value = Node> {
    leaf_strategy().prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Node::Array),
            prop::collection::vec((name_strategy(), inner), 0..5).prop_map(|entries| {
                let mut unique: Vec<(String, Node)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    if !unique.iter().any(|(k, _)| *k == key) {
                        unique.push((key, value));
                    }
                }
                Node::Dictionary(unique)
            }),
        ]
    })
}

/// A single edit applied to some container of a graph.
#[derive(Debug, Clone)]
pub enum Edit {
    Set { name: String, value: i64 },
    Remove { name: String },
    Push(i64),
    Clear,
}

impl Edit {
    /// Apply the edit. Returns whether the container reported a change.
    pub fn apply(&self, container: &Container) -> bool {
        match (self, container) {
            (Edit::Set { name, value }, Container::Dictionary(dict)) => {
                dict.set(Name::new(name), *value);
                true
            }
            (Edit::Set { value, .. }, Container::Array(array)) => {
                if array.is_empty() {
                    array.add(*value);
                } else {
                    let _ = array.set(0, *value);
                }
                true
            }
            (Edit::Remove { name }, Container::Dictionary(dict)) => dict.remove(name).is_some(),
            (Edit::Remove { .. }, Container::Array(array)) => array.remove_at(0).is_ok(),
            (Edit::Push(value), Container::Dictionary(dict)) => {
                dict.set(format!("Extra{value}"), *value);
                true
            }
            (Edit::Push(value), Container::Array(array)) => {
                array.add(*value);
                true
            }
            (Edit::Clear, Container::Dictionary(dict)) => {
                dict.clear();
                true
            }
            (Edit::Clear, Container::Array(array)) => {
                array.clear();
                true
            }
        }
    }
}

pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (name_strategy(), any::<i64>()).prop_map(|(name, value)| Edit::Set { name, value }),
        name_strategy().prop_map(|name| Edit::Remove { name }),
        any::<i64>().prop_map(Edit::Push),
        Just(Edit::Clear),
    ]
}
