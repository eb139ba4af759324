//! Order-statistics skip list stored in an arena
//!
//! Positions: the head sits at position 0, elements at 1..=len, and a nil
//! link points at position `len`. `span[i]` of a node is the position
//! distance covered by its level-`i` link, so the spans along any level
//! from the head sum to `len`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Maximum number of levels
pub const MAX_LEVEL: usize = 16;

/// Probability of promoting a node one level up
const PROMOTION_PROBABILITY: f64 = 0.25;

const HEAD: usize = 0;
const NIL: usize = usize::MAX;

/// Structural corruption found by [`RankedSet::check_invariants`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankedSetError {
    #[error("level {level}: spans sum to {sum}, expected {len}")]
    SpanSum { level: usize, sum: usize, len: usize },

    #[error("level {level}: span {span} does not match position distance {distance}")]
    SpanMismatch {
        level: usize,
        span: usize,
        distance: usize,
    },

    #[error("values out of order at position {0}")]
    OutOfOrder(usize),

    #[error("level 0 holds {found} nodes, expected {len}")]
    Length { found: usize, len: usize },
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: Option<T>,
    forward: Vec<usize>,
    span: Vec<usize>,
}

/// A sorted multiset with O(log n) rank and select.
#[derive(Debug, Clone)]
pub struct RankedSet<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    len: usize,
    rng: StdRng,
}

impl<T: Ord + Clone> RankedSet<T> {
    /// Create an empty set with an entropy-seeded level generator
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty set with a deterministic level generator
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let head = Node {
            value: None,
            forward: vec![NIL; MAX_LEVEL],
            span: vec![0; MAX_LEVEL],
        };
        Self {
            nodes: vec![head],
            free: Vec::new(),
            len: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn value_at(&self, node: usize) -> &T {
        self.nodes[node]
            .value
            .as_ref()
            .unwrap_or_else(|| unreachable!("linked node {} has no value", node))
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen_bool(PROMOTION_PROBABILITY) {
            level += 1;
        }
        level
    }

    /// Walk to the last node at each level satisfying `before`.
    ///
    /// Returns the predecessor per level and its position.
    fn find_predecessors<F>(&self, before: F) -> ([usize; MAX_LEVEL], [usize; MAX_LEVEL])
    where
        F: Fn(&T) -> bool,
    {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut x = HEAD;
        let mut position = 0;

        for level in (0..MAX_LEVEL).rev() {
            loop {
                let next = self.nodes[x].forward[level];
                if next == NIL || !before(self.value_at(next)) {
                    break;
                }
                position += self.nodes[x].span[level];
                x = next;
            }
            update[level] = x;
            rank[level] = position;
        }
        (update, rank)
    }

    fn allocate(&mut self, value: T, level: usize) -> usize {
        let node = Node {
            value: Some(value),
            forward: vec![NIL; level],
            span: vec![0; level],
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    /// Insert a value after any equal values
    pub fn insert(&mut self, value: T) {
        let (update, rank) = self.find_predecessors(|v| v <= &value);
        let level = self.random_level();
        let x = self.allocate(value, level);

        for i in 0..MAX_LEVEL {
            let prev = update[i];
            if i < level {
                let old_span = self.nodes[prev].span[i];
                self.nodes[x].forward[i] = self.nodes[prev].forward[i];
                self.nodes[x].span[i] = old_span + rank[i] - rank[0];
                self.nodes[prev].forward[i] = x;
                self.nodes[prev].span[i] = rank[0] + 1 - rank[i];
            } else {
                self.nodes[prev].span[i] += 1;
            }
        }
        self.len += 1;
    }

    /// Remove one occurrence of a value. Returns whether one was present.
    pub fn remove(&mut self, value: &T) -> bool {
        let (update, _) = self.find_predecessors(|v| v < value);
        let x = self.nodes[update[0]].forward[0];
        if x == NIL || self.value_at(x) != value {
            return false;
        }

        for (i, &prev) in update.iter().enumerate() {
            if self.nodes[prev].forward[i] == x {
                let span = self.nodes[x].span[i];
                self.nodes[prev].span[i] += span;
                self.nodes[prev].span[i] -= 1;
                self.nodes[prev].forward[i] = self.nodes[x].forward[i];
            } else {
                self.nodes[prev].span[i] -= 1;
            }
        }

        self.nodes[x].value = None;
        self.nodes[x].forward.clear();
        self.nodes[x].span.clear();
        self.free.push(x);
        self.len -= 1;
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        let (update, _) = self.find_predecessors(|v| v < value);
        let next = self.nodes[update[0]].forward[0];
        next != NIL && self.value_at(next) == value
    }

    /// Number of elements strictly less than `value`
    pub fn rank(&self, value: &T) -> usize {
        let (_, rank) = self.find_predecessors(|v| v < value);
        rank[0]
    }

    /// Number of elements less than or equal to `value`
    pub fn rank_inclusive(&self, value: &T) -> usize {
        let (_, rank) = self.find_predecessors(|v| v <= value);
        rank[0]
    }

    /// Element at zero-based `rank`
    pub fn select(&self, rank: usize) -> Option<&T> {
        if rank >= self.len {
            return None;
        }
        let target = rank + 1;
        let mut x = HEAD;
        let mut traversed = 0;

        for level in (0..MAX_LEVEL).rev() {
            loop {
                let next = self.nodes[x].forward[level];
                if next == NIL || traversed + self.nodes[x].span[level] > target {
                    break;
                }
                traversed += self.nodes[x].span[level];
                x = next;
            }
            if traversed == target {
                return self.nodes[x].value.as_ref();
            }
        }
        None
    }

    /// Ascending iteration over all elements
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            set: self,
            next: self.nodes[HEAD].forward[0],
        }
    }

    /// Verify links, ordering and spans on every level
    pub fn check_invariants(&self) -> Result<(), RankedSetError> {
        let mut positions = std::collections::HashMap::with_capacity(self.len + 1);
        positions.insert(HEAD, 0usize);

        let mut x = self.nodes[HEAD].forward[0];
        let mut position = 0;
        let mut previous: Option<&T> = None;
        while x != NIL {
            position += 1;
            let value = self.value_at(x);
            if previous.is_some_and(|p| p > value) {
                return Err(RankedSetError::OutOfOrder(position));
            }
            previous = Some(value);
            positions.insert(x, position);
            x = self.nodes[x].forward[0];
        }
        if position != self.len {
            return Err(RankedSetError::Length {
                found: position,
                len: self.len,
            });
        }

        for level in 0..MAX_LEVEL {
            let mut x = HEAD;
            let mut sum = 0;
            loop {
                let span = self.nodes[x].span[level];
                let next = self.nodes[x].forward[level];
                let target = if next == NIL { self.len } else { positions[&next] };
                let distance = target - positions[&x];
                if span != distance {
                    return Err(RankedSetError::SpanMismatch {
                        level,
                        span,
                        distance,
                    });
                }
                sum += span;
                if next == NIL {
                    break;
                }
                x = next;
            }
            if sum != self.len {
                return Err(RankedSetError::SpanSum {
                    level,
                    sum,
                    len: self.len,
                });
            }
        }
        Ok(())
    }
}

impl<T: Ord + Clone> Default for RankedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`RankedSet::iter`]
pub struct Iter<'a, T> {
    set: &'a RankedSet<T>,
    next: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let node = &self.set.nodes[self.next];
        self.next = node.forward[0];
        node.value.as_ref()
    }
}
