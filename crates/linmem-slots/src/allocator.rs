//! First-fit allocation of contiguous slot runs.
//!
//! The allocatable range `[reserved, capacity)` is partitioned into an
//! ordered list of [`SlotNode`]s. Allocation takes the first free node long
//! enough for the request, splitting off any remainder; freeing marks the
//! node free and merges it with free neighbours. Two free nodes are never
//! adjacent, and the nodes always cover the range with no gaps.

use std::fmt;

use crate::config::SlotConfig;
use crate::error::SlotConfigError;
use crate::table::SlotTable;

/// One run of slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotNode {
    /// First index of the run.
    pub start: u32,
    /// Number of slots.
    pub len: u32,
    /// Whether the run is available.
    pub free: bool,
}

impl SlotNode {
    /// One past the last index.
    pub fn end(&self) -> u32 {
        self.start + self.len
    }
}

/// First-fit, coalescing allocator over a [`SlotTable`].
pub struct SlotAllocator<T: SlotTable> {
    table: T,
    config: SlotConfig,
    nodes: Vec<SlotNode>,
}

impl<T: SlotTable> SlotAllocator<T> {
    /// Manage `table`, treating its first `config.reserved` slots as
    /// built-in.
    pub fn new(table: T, config: SlotConfig) -> Result<Self, SlotConfigError> {
        config.validate(table.len())?;
        let nodes = Self::initial_nodes(config.reserved, table.len());
        Ok(Self {
            table,
            config,
            nodes,
        })
    }

    fn initial_nodes(reserved: u32, len: u32) -> Vec<SlotNode> {
        if len > reserved {
            vec![SlotNode {
                start: reserved,
                len: len - reserved,
                free: true,
            }]
        } else {
            Vec::new()
        }
    }

    /// Allocate `count` contiguous slots and return the first index.
    ///
    /// Grows the table when no free run is long enough.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn alloc(&mut self, count: u32) -> u32 {
        assert!(count > 0, "cannot allocate zero slots");
        let i = match self.first_fit(count) {
            Some(i) => i,
            None => {
                self.grow_for(count);
                match self.first_fit(count) {
                    Some(i) => i,
                    None => panic!("slot table grew but still has no run of {count}"),
                }
            }
        };
        let node = self.nodes[i];
        if node.len > count {
            self.nodes.insert(
                i + 1,
                SlotNode {
                    start: node.start + count,
                    len: node.len - count,
                    free: true,
                },
            );
            self.nodes[i].len = count;
        }
        self.nodes[i].free = false;
        node.start
    }

    fn first_fit(&self, count: u32) -> Option<usize> {
        self.nodes.iter().position(|n| n.free && n.len >= count)
    }

    /// Grow so that a run of `count` fits at the end, reusing a free
    /// trailing run.
    fn grow_for(&mut self, count: u32) {
        let old_len = self.table.len();
        let trailing = match self.nodes.last() {
            Some(n) if n.free => n.len,
            _ => 0,
        };
        let additional = count - trailing;
        self.table.grow(additional);
        match self.nodes.last_mut() {
            Some(n) if n.free => n.len += additional,
            _ => self.nodes.push(SlotNode {
                start: old_len,
                len: additional,
                free: true,
            }),
        }
        tracing::debug!(
            from = old_len,
            to = self.table.len(),
            request = count,
            "grew slot table"
        );
    }

    /// Free the run starting at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not the start of an allocated run.
    pub fn free(&mut self, index: u32) {
        let i = match self.nodes.binary_search_by_key(&index, |n| n.start) {
            Ok(i) if !self.nodes[i].free => i,
            _ => panic!("slot {index} is not the start of an allocated run"),
        };
        self.nodes[i].free = true;

        if i + 1 < self.nodes.len() && self.nodes[i + 1].free {
            self.nodes[i].len += self.nodes[i + 1].len;
            self.nodes.remove(i + 1);
        }
        if i > 0 && self.nodes[i - 1].free {
            self.nodes[i - 1].len += self.nodes[i].len;
            self.nodes.remove(i);
        }

        if self.config.rebuild_on_empty && self.nodes.len() == 1 && self.nodes[0].free {
            self.table.rebuild(self.config.reserved);
            self.nodes = Self::initial_nodes(self.config.reserved, self.table.len());
            tracing::debug!(
                capacity = self.table.len(),
                reserved = self.config.reserved,
                "rebuilt empty slot table"
            );
        }
    }

    /// Whether `index` is the start of an allocated run.
    pub fn is_allocated(&self, index: u32) -> bool {
        matches!(
            self.nodes.binary_search_by_key(&index, |n| n.start),
            Ok(i) if !self.nodes[i].free
        )
    }

    /// Length of the allocated run starting at `index`.
    pub fn run_len(&self, index: u32) -> Option<u32> {
        let i = self.nodes.binary_search_by_key(&index, |n| n.start).ok()?;
        let node = self.nodes[i];
        (!node.free).then_some(node.len)
    }

    /// The node list, in index order.
    pub fn nodes(&self) -> &[SlotNode] {
        &self.nodes
    }

    /// Slots in the table, reserved ones included.
    pub fn capacity(&self) -> u32 {
        self.table.len()
    }

    /// Slots in allocated runs.
    pub fn occupied(&self) -> u32 {
        self.nodes.iter().filter(|n| !n.free).map(|n| n.len).sum()
    }

    /// First index the allocator may hand out.
    pub fn first_usable(&self) -> u32 {
        self.config.reserved
    }

    /// The configuration.
    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// The underlying table.
    pub fn table(&self) -> &T {
        &self.table
    }

    /// The underlying table, mutably. Changing its length breaks the
    /// allocator.
    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }

    /// Verify node-list invariants: contiguous coverage of
    /// `[reserved, capacity)`, no empty nodes, no adjacent free nodes.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut expected = self.config.reserved;
        let mut prev_free = false;
        for (i, n) in self.nodes.iter().enumerate() {
            if n.start != expected {
                return Err(InvariantViolation::Gap {
                    node: i,
                    expected,
                    found: n.start,
                });
            }
            if n.len == 0 {
                return Err(InvariantViolation::EmptyNode { node: i });
            }
            if n.free && prev_free {
                return Err(InvariantViolation::AdjacentFree { node: i });
            }
            prev_free = n.free;
            expected = n.end();
        }
        let capacity = self.table.len();
        if expected != capacity.max(self.config.reserved) {
            return Err(InvariantViolation::Coverage {
                covered_to: expected,
                capacity,
            });
        }
        Ok(())
    }
}

/// A broken node-list invariant, reported by
/// [`SlotAllocator::check_invariants`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A node does not start where the previous one ended.
    Gap {
        /// Node position.
        node: usize,
        /// Where it should start.
        expected: u32,
        /// Where it starts.
        found: u32,
    },
    /// A node has length zero.
    EmptyNode {
        /// Node position.
        node: usize,
    },
    /// Two free nodes touch.
    AdjacentFree {
        /// Position of the second.
        node: usize,
    },
    /// The nodes do not reach the end of the table.
    Coverage {
        /// End of the last node.
        covered_to: u32,
        /// Table length.
        capacity: u32,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gap {
                node,
                expected,
                found,
            } => write!(f, "node {node} starts at {found}, expected {expected}"),
            Self::EmptyNode { node } => write!(f, "node {node} is empty"),
            Self::AdjacentFree { node } => write!(f, "nodes {} and {node} are both free", node - 1),
            Self::Coverage {
                covered_to,
                capacity,
            } => write!(f, "nodes end at {covered_to}, table has {capacity} slots"),
        }
    }
}

impl std::error::Error for InvariantViolation {}

impl<T: SlotTable> fmt::Debug for SlotAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("capacity", &self.capacity())
            .field("reserved", &self.config.reserved)
            .field("nodes", &self.nodes)
            .finish()
    }
}
