//! # Treap
//!
//! A binary search tree over disjoint half-open intervals, keyed by interval
//! start, that is at the same time a max-heap over per-node random
//! priorities. Random priorities keep the expected depth logarithmic without
//! any deterministic rebalancing: the tree has the shape it would have had if
//! the intervals had been inserted in priority order.
//!
//! Every mutating function takes the root of a subtree and returns the new
//! root of that subtree; the caller stores it back into the parent's child
//! link (or the map header). Rotations therefore only ever rewrite handles.

use log::trace;

use crate::{
    Error, Result,
    arena::Arena,
    node::{Node, NodeHandle},
};



/// Insert the (detached) `node` below `root`.
///
/// No link is modified before an overlap is detected, so an error leaves the
/// tree exactly as it was.
pub(crate) fn insert(
    arena: &mut Arena,
    root: Option<NodeHandle>,
    node: NodeHandle,
) -> Result<NodeHandle> {
    let Some(curr) = root else {
        return Ok(node);
    };

    let (start, end) = (arena[node].div_start, arena[node].div_end);
    if end <= arena[curr].div_start {
        let left = arena[curr].left;
        let left = insert(arena, left, node)?;
        arena[curr].left = Some(left);
        if arena[left].prio > arena[curr].prio {
            return Ok(rotate_left_child(arena, curr, left));
        }
        Ok(curr)
    } else if start >= arena[curr].div_end {
        let right = arena[curr].right;
        let right = insert(arena, right, node)?;
        arena[curr].right = Some(right);
        if arena[right].prio > arena[curr].prio {
            return Ok(rotate_right_child(arena, curr, right));
        }
        Ok(curr)
    } else {
        Err(Error::Overlap {
            start,
            end,
            resident_start: arena[curr].div_start,
            resident_end: arena[curr].div_end,
        })
    }
}

/// Detach the node starting at `div_start` from the subtree at `root`.
///
/// Returns the new subtree root and the detached node, whose priority has
/// been forced to [`Node::MIN_PRIO`]. The target is rotated down towards the
/// higher-priority child until it has at most one child and can be spliced
/// out.
pub(crate) fn remove(
    arena: &mut Arena,
    root: Option<NodeHandle>,
    div_start: usize,
) -> Result<(Option<NodeHandle>, NodeHandle)> {
    let Some(curr) = root else {
        return Err(Error::NotResident { div_start });
    };

    if div_start < arena[curr].div_start {
        let left = arena[curr].left;
        let (left, removed) = remove(arena, left, div_start)?;
        arena[curr].left = left;
        return Ok((Some(curr), removed));
    }
    if div_start >= arena[curr].div_end {
        let right = arena[curr].right;
        let (right, removed) = remove(arena, right, div_start)?;
        arena[curr].right = right;
        return Ok((Some(curr), removed));
    }

    // Found the region containing `div_start`, only its exact start counts.
    if arena[curr].div_start != div_start {
        return Err(Error::NotResident { div_start });
    }

    arena[curr].prio = Node::MIN_PRIO;
    match (arena[curr].left, arena[curr].right) {
        (None, child) | (child, None) => {
            arena[curr].left = None;
            arena[curr].right = None;
            Ok((child, curr))
        }
        (Some(left), Some(right)) => {
            if arena[left].prio > arena[right].prio {
                let son = rotate_left_child(arena, curr, left);
                let (rest, removed) = remove(arena, Some(curr), div_start)?;
                arena[son].right = rest;
                Ok((Some(son), removed))
            } else {
                let son = rotate_right_child(arena, curr, right);
                let (rest, removed) = remove(arena, Some(curr), div_start)?;
                arena[son].left = rest;
                Ok((Some(son), removed))
            }
        }
    }
}

/// Promote `son`, the left child of `curr`, into `curr`'s place.
///
/// ```text
///       curr          son
///       /  \         /   \
///     son   c  =>   a   curr
///     / \               /  \
///    a   b             b    c
/// ```
pub(crate) fn rotate_left_child(
    arena: &mut Arena,
    curr: NodeHandle,
    son: NodeHandle,
) -> NodeHandle {
    debug_assert_eq!(arena[curr].left, Some(son));
    trace!("rotating {son:?} above {curr:?}");

    let grandson = arena[son].right;
    arena[son].right = Some(curr);
    arena[curr].left = grandson;
    son
}

/// Promote `son`, the right child of `curr`, into `curr`'s place. The mirror
/// image of [`rotate_left_child`].
pub(crate) fn rotate_right_child(
    arena: &mut Arena,
    curr: NodeHandle,
    son: NodeHandle,
) -> NodeHandle {
    debug_assert_eq!(arena[curr].right, Some(son));
    trace!("rotating {son:?} above {curr:?}");

    let grandson = arena[son].left;
    arena[son].left = Some(curr);
    arena[curr].right = grandson;
    son
}

/// The node whose interval contains `address`.
pub(crate) fn find(
    arena: &Arena,
    mut root: Option<NodeHandle>,
    address: usize,
) -> Option<NodeHandle> {
    while let Some(curr) = root {
        let node = &arena[curr];
        root = if address < node.div_start {
            node.left
        } else if address >= node.div_end {
            node.right
        } else {
            return Some(curr);
        };
    }

    None
}

/// Any node whose interval intersects `[start, end)`.
pub(crate) fn find_overlap(
    arena: &Arena,
    mut root: Option<NodeHandle>,
    start: usize,
    end: usize,
) -> Option<NodeHandle> {
    while let Some(curr) = root {
        let node = &arena[curr];
        root = if end <= node.div_start {
            node.left
        } else if start >= node.div_end {
            node.right
        } else {
            return Some(curr);
        };
    }

    None
}

/// The number of nodes on the longest root-to-leaf path.
pub(crate) fn height(arena: &Arena, root: Option<NodeHandle>) -> usize {
    match root {
        None => 0,
        Some(node) => 1 + height(arena, arena[node].left).max(height(arena, arena[node].right)),
    }
}

/// Check the ordering, disjointness and heap invariants of the whole tree.
/// Returns the number of nodes.
pub(crate) fn validate(arena: &Arena, root: Option<NodeHandle>) -> Result<usize> {
    let corrupted = |node: NodeHandle, reason: &'static str| -> Result<usize> {
        Err(Error::Corrupted { node, reason })
    };

    let mut count = 0;
    let mut prev_end = None;
    for handle in InOrder::new(arena, root) {
        let node = &arena[handle];
        if node.div_end <= node.div_start {
            return corrupted(handle, "empty or inverted interval");
        }
        if prev_end.is_some_and(|end| node.div_start < end) {
            return corrupted(handle, "interval out of order or overlapping its predecessor");
        }
        for child in [node.left, node.right].into_iter().flatten() {
            if arena[child].prio > node.prio {
                return corrupted(handle, "child priority exceeds parent priority");
            }
        }
        prev_end = Some(node.div_end);
        count += 1;
    }

    Ok(count)
}



/// In-order (ascending `div_start`) traversal.
pub(crate) struct InOrder<'a> {
    arena: &'a Arena,
    stack: Vec<NodeHandle>,
    next: Option<NodeHandle>,
}

impl<'a> InOrder<'a> {
    pub fn new(arena: &'a Arena, root: Option<NodeHandle>) -> Self {
        Self {
            arena,
            stack: Vec::new(),
            next: root,
        }
    }
}

impl Iterator for InOrder<'_> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<NodeHandle> {
        while let Some(node) = self.next {
            self.stack.push(node);
            self.next = self.arena[node].left;
        }

        let node = self.stack.pop()?;
        self.next = self.arena[node].right;
        Some(node)
    }
}
