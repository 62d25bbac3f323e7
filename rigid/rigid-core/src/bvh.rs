//! Dynamic AABB tree.
//!
//! A binary tree whose leaves hold fattened AABBs and user data, with
//! O(log n) insert, remove and update:
//!
//! - **Insertion** walks down from the root choosing the child that
//!   minimizes the surface-area cost, then splices in a new parent
//! - **Balancing** applies AVL rotations on the way back up so the height
//!   stays logarithmic even for sorted insertions
//! - **Updates** are free while the tight bounds stay inside the fat ones
//!
//! Node storage is a flat `Vec` with a free list; removed slots are reused
//! by later insertions.

use crate::broad_phase::Aabb;

const NULL_NODE: usize = usize::MAX;

/// Handle to a leaf of a [`DynamicBvh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyId(usize);

#[derive(Debug, Clone)]
struct Node<T> {
    aabb: Aabb,
    parent: usize,
    left: usize,
    right: usize,
    /// 0 for leaves, -1 for free slots.
    height: i32,
    data: Option<T>,
}

impl<T> Node<T> {
    fn free() -> Self {
        Self {
            aabb: Aabb::default(),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: -1,
            data: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Dynamic bounding volume hierarchy keyed by `T`.
#[derive(Debug, Clone)]
pub struct DynamicBvh<T> {
    nodes: Vec<Node<T>>,
    free_list: Vec<usize>,
    root: usize,
    margin: f64,
    leaf_count: usize,
}

impl<T: Copy + Ord> DynamicBvh<T> {
    /// Create an empty tree; leaves are fattened by `margin` on every side.
    #[must_use]
    pub fn new(margin: f64) -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            margin: margin.max(0.0),
            leaf_count: 0,
        }
    }

    /// Fattening margin.
    #[must_use]
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    /// Whether the tree has no leaves.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Height of the root; 0 for an empty tree or a single leaf.
    #[must_use]
    pub fn height(&self) -> usize {
        if self.root == NULL_NODE {
            0
        } else {
            usize::try_from(self.nodes[self.root].height).unwrap_or(0)
        }
    }

    /// Insert a leaf for `data` with tight bounds `aabb`.
    pub fn insert(&mut self, aabb: Aabb, data: T) -> ProxyId {
        let leaf = self.alloc_node();
        let node = &mut self.nodes[leaf];
        node.aabb = aabb.expanded(self.margin);
        node.height = 0;
        node.data = Some(data);
        self.insert_leaf(leaf);
        self.leaf_count += 1;
        ProxyId(leaf)
    }

    /// Remove a leaf. Unknown or already removed proxies are ignored.
    pub fn remove(&mut self, proxy: ProxyId) {
        if !self.is_live_leaf(proxy.0) {
            return;
        }
        self.remove_leaf(proxy.0);
        self.free_node(proxy.0);
        self.leaf_count -= 1;
    }

    /// Refresh a leaf's bounds. The leaf is only reinserted when `aabb`
    /// has left its fat bounds; returns whether that happened.
    pub fn update(&mut self, proxy: ProxyId, aabb: Aabb) -> bool {
        if !self.is_live_leaf(proxy.0) || self.nodes[proxy.0].aabb.contains(&aabb) {
            return false;
        }
        self.move_proxy(proxy, aabb);
        true
    }

    /// Reinsert a leaf with new bounds regardless of its current fat box.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: Aabb) {
        if !self.is_live_leaf(proxy.0) {
            return;
        }
        self.remove_leaf(proxy.0);
        self.nodes[proxy.0].aabb = aabb.expanded(self.margin);
        self.insert_leaf(proxy.0);
    }

    /// Fat bounds of a leaf.
    #[must_use]
    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<Aabb> {
        self.is_live_leaf(proxy.0).then(|| self.nodes[proxy.0].aabb)
    }

    /// User data of a leaf.
    #[must_use]
    pub fn data(&self, proxy: ProxyId) -> Option<T> {
        self.nodes.get(proxy.0).and_then(|n| n.data)
    }

    /// Call `visit` with the data of every leaf whose fat bounds overlap `aabb`.
    pub fn query<F: FnMut(T)>(&self, aabb: &Aabb, mut visit: F) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if let Some(data) = node.data {
                    visit(data);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// All pairs of leaves with overlapping fat bounds, each as
    /// `(smaller, larger)`, sorted and without duplicates.
    #[must_use]
    pub fn overlapping_pairs(&self) -> Vec<(T, T)> {
        let mut pairs = Vec::new();
        for node in &self.nodes {
            let Some(a) = node.data else { continue };
            self.query(&node.aabb, |b| {
                if a < b {
                    pairs.push((a, b));
                }
            });
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Remove every leaf.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free_list.clear();
        self.root = NULL_NODE;
        self.leaf_count = 0;
    }

    // =========================================================================
    // Tree maintenance
    // =========================================================================

    fn is_live_leaf(&self, index: usize) -> bool {
        self.nodes
            .get(index)
            .is_some_and(|n| n.height == 0 && n.data.is_some())
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(index) = self.free_list.pop() {
            self.nodes[index] = Node::free();
            index
        } else {
            self.nodes.push(Node::free());
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, index: usize) {
        self.nodes[index] = Node::free();
        self.free_list.push(index);
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Surface-area heuristic descent.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut sibling = self.root;
        while !self.nodes[sibling].is_leaf() {
            let node = &self.nodes[sibling];
            let area = node.aabb.surface_area();
            let combined_area = node.aabb.merged(&leaf_aabb).surface_area();

            let cost = 2.0 * combined_area;
            let inheritance = 2.0 * (combined_area - area);

            let cost_left = self.descend_cost(node.left, &leaf_aabb) + inheritance;
            let cost_right = self.descend_cost(node.right, &leaf_aabb) + inheritance;

            if cost < cost_left && cost < cost_right {
                break;
            }
            sibling = if cost_left < cost_right {
                node.left
            } else {
                node.right
            };
        }

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_node = &self.nodes[sibling];
            let aabb = sibling_node.aabb.merged(&leaf_aabb);
            let height = sibling_node.height + 1;
            let node = &mut self.nodes[new_parent];
            node.parent = old_parent;
            node.aabb = aabb;
            node.height = height;
            node.left = sibling;
            node.right = leaf;
        }

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent].left == sibling {
            self.nodes[old_parent].left = new_parent;
        } else {
            self.nodes[old_parent].right = new_parent;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        self.refit_upwards(new_parent);
    }

    fn descend_cost(&self, child: usize, leaf_aabb: &Aabb) -> f64 {
        let node = &self.nodes[child];
        let combined = node.aabb.merged(leaf_aabb).surface_area();
        if node.is_leaf() {
            combined
        } else {
            combined - node.aabb.surface_area()
        }
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].left == leaf {
            self.nodes[parent].right
        } else {
            self.nodes[parent].left
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        } else {
            if self.nodes[grand_parent].left == parent {
                self.nodes[grand_parent].left = sibling;
            } else {
                self.nodes[grand_parent].right = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_upwards(grand_parent);
        }
        self.nodes[leaf].parent = NULL_NODE;
    }

    fn refit_upwards(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            self.refit(index);
            index = self.nodes[index].parent;
        }
    }

    fn refit(&mut self, index: usize) {
        let left = self.nodes[index].left;
        let right = self.nodes[index].right;
        let height = 1 + self.nodes[left].height.max(self.nodes[right].height);
        let aabb = self.nodes[left].aabb.merged(&self.nodes[right].aabb);
        let node = &mut self.nodes[index];
        node.height = height;
        node.aabb = aabb;
    }

    /// Rotate `a` if its subtrees differ in height by more than one.
    /// Returns the index now occupying `a`'s position.
    fn balance(&mut self, a: usize) -> usize {
        if self.nodes[a].is_leaf() || self.nodes[a].height < 2 {
            return a;
        }
        let b = self.nodes[a].left;
        let c = self.nodes[a].right;
        let skew = self.nodes[c].height - self.nodes[b].height;

        if skew > 1 {
            self.rotate_up(a, c, b, true)
        } else if skew < -1 {
            self.rotate_up(a, b, c, false)
        } else {
            a
        }
    }

    /// Promote `up` (a child of `a`) into `a`'s place. `other` is `a`'s
    /// remaining child; `up_was_right` says which side `up` hung from.
    fn rotate_up(&mut self, a: usize, up: usize, other: usize, up_was_right: bool) -> usize {
        let f = self.nodes[up].left;
        let g = self.nodes[up].right;

        // `up` takes `a`'s parent slot and adopts `a`.
        let parent = self.nodes[a].parent;
        self.nodes[up].left = a;
        self.nodes[up].parent = parent;
        self.nodes[a].parent = up;
        if parent == NULL_NODE {
            self.root = up;
        } else if self.nodes[parent].left == a {
            self.nodes[parent].left = up;
        } else {
            self.nodes[parent].right = up;
        }

        // The taller grandchild stays with `up`, the shorter moves to `a`.
        let (keep, give) = if self.nodes[f].height > self.nodes[g].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up].right = keep;
        if up_was_right {
            self.nodes[a].right = give;
        } else {
            self.nodes[a].left = give;
        }
        self.nodes[give].parent = a;
        debug_assert!(self.nodes[a].left == other || self.nodes[a].right == other);

        self.refit(a);
        self.refit(up);
        up
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        if self.root == NULL_NODE {
            assert_eq!(self.leaf_count, 0);
            return;
        }
        assert_eq!(self.nodes[self.root].parent, NULL_NODE);
        let mut leaves = 0;
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                assert_eq!(node.height, 0);
                assert!(node.data.is_some());
                leaves += 1;
                continue;
            }
            let (l, r) = (&self.nodes[node.left], &self.nodes[node.right]);
            assert_eq!(l.parent, index);
            assert_eq!(r.parent, index);
            assert_eq!(node.height, 1 + l.height.max(r.height));
            assert!(node.aabb.contains(&l.aabb) && node.aabb.contains(&r.aabb));
            stack.push(node.left);
            stack.push(node.right);
        }
        assert_eq!(leaves, self.leaf_count);
    }
}
