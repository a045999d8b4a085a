//! Finite iterator over a fixed list of records.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::domain::AddressRecord;
use crate::ports::NodeIterator;

/// Replays a fixed list of records once. Used for the input set of a round
/// and for static bootnode lists.
#[derive(Debug)]
pub struct StaticNodeIterator {
    name: String,
    records: VecDeque<AddressRecord>,
}

impl StaticNodeIterator {
    /// Iterator named `name` over `records`
    pub fn new(name: impl Into<String>, records: Vec<AddressRecord>) -> Self {
        Self {
            name: name.into(),
            records: records.into(),
        }
    }

    /// Records not yet produced
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl NodeIterator for StaticNodeIterator {
    async fn next_node(&mut self) -> Option<AddressRecord> {
        self.records.pop_front()
    }

    async fn close(&mut self) {
        self.records.clear();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
