//! Derivation helpers over a parsed bag
//!
//! Pure functions from the index model to topic, datatype and message-count
//! summaries. Message definitions are parsed by an external collaborator
//! handed in as a plain function; this crate only keys the descriptors it
//! returns.

use std::collections::{BTreeMap, HashMap};

use crate::error::{BagError, Result};
use crate::records::{ChunkInfoRecord, ConnectionRecord};

/// A named group of field descriptors produced by an external
/// message-definition parser. The first descriptor of a definition carries
/// no name; it describes the connection's own type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Declared type name, absent for the root type
    pub name: Option<String>,
    /// Field declarations, opaque to this crate
    pub fields: Vec<String>,
}

/// One topic and its message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    /// Topic name
    pub name: String,
    /// Message type
    pub message_type: String,
}

/// Message count for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessageCount {
    /// Topic name
    pub name: String,
    /// Message type
    pub message_type: String,
    /// Messages recorded for the topic across all chunks
    pub count: u64,
}

/// Per-topic message counts plus the bag-wide total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCounts {
    /// Per-topic counts in first-appearance order
    pub topics: Vec<TopicMessageCount>,
    /// Sum over all topics
    pub total: u64,
}

/// Map every datatype in the bag to its field descriptors.
///
/// For each connection the external parser is applied to its message
/// definition; the first descriptor is keyed by the connection's type and
/// each subsequent named descriptor by its own name. Later occurrences
/// overwrite earlier ones silently.
pub fn connections_to_datatypes<F>(
    connections: &BTreeMap<u32, ConnectionRecord>,
    parse_message_definition: F,
) -> Result<HashMap<String, Vec<String>>>
where
    F: Fn(&str) -> Vec<TypeDescriptor>,
{
    let mut datatypes = HashMap::new();

    for connection in connections.values() {
        if connection.datatype.is_empty() {
            return Err(BagError::NoType {
                conn: connection.conn,
            });
        }

        let descriptors = parse_message_definition(&connection.message_definition);
        for (position, descriptor) in descriptors.into_iter().enumerate() {
            let key = if position == 0 {
                connection.datatype.clone()
            } else {
                match descriptor.name {
                    Some(name) => name,
                    None => continue,
                }
            };
            datatypes.insert(key, descriptor.fields);
        }
    }

    Ok(datatypes)
}

/// Deduplicate connections by topic.
///
/// Output keeps the order topics first appear in. Fails with
/// [`BagError::TopicTypeConflict`] when two connections report different
/// types for the same topic.
pub fn connections_to_topics(
    connections: &BTreeMap<u32, ConnectionRecord>,
) -> Result<Vec<TopicInfo>> {
    let mut topics = Vec::new();
    let mut seen: HashMap<&str, &str> = HashMap::new();

    for connection in connections.values() {
        match seen.get(connection.topic.as_str()) {
            None => {
                seen.insert(&connection.topic, &connection.datatype);
                topics.push(TopicInfo {
                    name: connection.topic.clone(),
                    message_type: connection.datatype.clone(),
                });
            }
            Some(first) if *first == connection.datatype => {}
            Some(first) => {
                return Err(BagError::TopicTypeConflict {
                    topic: connection.topic.clone(),
                    first: (*first).to_string(),
                    second: connection.datatype.clone(),
                });
            }
        }
    }

    Ok(topics)
}

/// Sum chunk-info message counts per topic.
///
/// Applies the same topic/type conflict rule as [`connections_to_topics`].
/// Chunk-info entries naming a connection that is not declared are ignored.
pub fn message_counts(
    chunk_infos: &[ChunkInfoRecord],
    connections: &BTreeMap<u32, ConnectionRecord>,
) -> Result<MessageCounts> {
    let topics = connections_to_topics(connections)?;

    let mut per_conn: HashMap<u32, u64> = HashMap::new();
    for info in chunk_infos {
        for entry in &info.entries {
            *per_conn.entry(entry.conn).or_default() += entry.count as u64;
        }
    }

    let mut per_topic: HashMap<&str, u64> = HashMap::new();
    for connection in connections.values() {
        if let Some(&count) = per_conn.get(&connection.conn) {
            *per_topic.entry(connection.topic.as_str()).or_default() += count;
        }
    }

    let mut total = 0;
    let topics = topics
        .into_iter()
        .map(|topic| {
            let count = per_topic.get(topic.name.as_str()).copied().unwrap_or(0);
            total += count;
            TopicMessageCount {
                name: topic.name,
                message_type: topic.message_type,
                count,
            }
        })
        .collect();

    Ok(MessageCounts { topics, total })
}
