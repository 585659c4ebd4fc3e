//! The paged B+ tree engine.
//!
//! Nodes live in the blocks of a [`BlockStore`] and refer to each other only
//! by [`BlockPointer`]. Every operation descends from the root, reading each
//! node it needs from the store, and writes back exactly the nodes it
//! changed. Splits propagate upward along the recorded descent path, so
//! nodes carry no parent pointers.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::vec;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::buffer::{BlockStore, StatsSnapshot};
use crate::common::{BlockId, Error, Result, TreeConfig};
use crate::storage::{FreeBlocks, TreeMeta};

use super::internal::InternalNode;
use super::leaf::LeafNode;
use super::node::{self, Node, NodeHeader, TreeNode};
use super::pointer::{BlockPointer, NodeKind};
use super::Codec;

/// One internal node visited on the way down, and the child taken.
#[derive(Debug, Clone, Copy)]
struct PathStep {
    pointer: BlockPointer,
    child_index: usize,
}

/// A disk-resident B+ tree.
///
/// Storage is two files next to each other: `<base>.data` (block 0 holds
/// the metadata, nodes follow) and `<base>.free`, the free-block sidecar
/// written by [`close`](Self::close).
///
/// The tree is single-writer: every method runs to completion and callers
/// serialize access.
///
/// # Example
/// ```no_run
/// use pagedtree::{BPlusTree, TreeConfig};
///
/// # fn main() -> pagedtree::Result<()> {
/// let mut tree: BPlusTree<u64, String> = BPlusTree::open("/tmp/index", TreeConfig::default())?;
/// tree.put(7, "seven".to_string())?;
/// assert_eq!(tree.get(&7)?, Some("seven".to_string()));
/// tree.close()?;
/// # Ok(())
/// # }
/// ```
pub struct BPlusTree<K, V> {
    store: BlockStore,
    config: TreeConfig,
    meta: TreeMeta,
    free: FreeBlocks,
    free_path: PathBuf,
    /// Set once the metadata was written clean; checked on drop.
    closed: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BPlusTree<K, V>
where
    K: Ord + Clone + Codec,
    V: Codec,
{
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the tree stored at `base`, creating it if the data file is
    /// missing or empty.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if `config` is unusable, or a full node of
    ///   `K`/`V` cannot fit in one block
    /// - `Error::Format` if the file was written with another block size or order
    /// - `Error::DirtyStore` if the previous session did not [`close`](Self::close)
    pub fn open<P: AsRef<Path>>(base: P, config: TreeConfig) -> Result<Self> {
        let mut tree = Self::open_store(base.as_ref(), config)?;

        if tree.store.size_in_blocks()? == 0 {
            tree.reset_storage()?;
        } else {
            tree.load()?;
        }

        tree.closed = false;
        info!(
            path = %tree.store.path().display(),
            elements = tree.meta.elements,
            height = tree.meta.height,
            free_blocks = tree.free.len(),
            "opened tree"
        );
        Ok(tree)
    }

    /// Create an empty tree at `base`, discarding whatever was stored there.
    pub fn create<P: AsRef<Path>>(base: P, config: TreeConfig) -> Result<Self> {
        let mut tree = Self::open_store(base.as_ref(), config)?;
        tree.reset_storage()?;

        tree.closed = false;
        info!(path = %tree.store.path().display(), "created tree");
        Ok(tree)
    }

    /// Orderly shutdown: persist the free list, mark the metadata clean and
    /// sync the data file.
    ///
    /// Dropping a tree without calling this leaves the store dirty, and the
    /// next [`open`](Self::open) fails with `Error::DirtyStore`.
    pub fn close(mut self) -> Result<()> {
        self.free.save(&self.free_path)?;

        self.meta.clean = true;
        self.write_meta()?;
        self.store.sync()?;

        self.closed = true;
        info!(
            path = %self.store.path().display(),
            elements = self.meta.elements,
            free_blocks = self.free.len(),
            "closed tree"
        );
        Ok(())
    }

    fn open_store(base: &Path, config: TreeConfig) -> Result<Self> {
        config.validate()?;
        check_node_fit::<K, V>(&config)?;

        let store = BlockStore::open(
            with_suffix(base, "data"),
            config.block_size,
            config.cache_capacity,
        )?;

        Ok(Self {
            store,
            config,
            meta: TreeMeta::new(&config),
            free: FreeBlocks::new(),
            free_path: with_suffix(base, "free"),
            // Not open yet: a failed open must not warn on drop
            closed: true,
            _marker: PhantomData,
        })
    }

    /// Read and validate the metadata of an existing store, then mark it
    /// dirty for the duration of the session.
    fn load(&mut self) -> Result<()> {
        let meta = {
            let guard = self.store.get(BlockId::META)?;
            TreeMeta::read_from(&guard, &self.config)?
        };
        if !meta.clean {
            return Err(Error::DirtyStore);
        }
        if BlockPointer::from_raw(meta.root).is_none() {
            return Err(Error::Format("metadata has no root pointer".into()));
        }

        self.meta = meta;
        self.free = FreeBlocks::load(&self.free_path)?;

        self.meta.clean = false;
        self.write_meta()?;
        self.store.sync()?;
        FreeBlocks::remove_sidecar(&self.free_path)?;
        Ok(())
    }

    /// Truncate the store and initialize a tree of one empty root leaf.
    fn reset_storage(&mut self) -> Result<()> {
        self.store.truncate()?;
        self.free.clear();
        FreeBlocks::remove_sidecar(&self.free_path)?;

        self.meta = TreeMeta::new(&self.config);
        let root = self.alloc_block(NodeKind::Leaf)?;
        self.write_leaf(&LeafNode::new(root, self.config.order))?;

        self.meta.root = root.raw();
        self.meta.head = root.raw();
        self.meta.last = root.raw();
        self.meta.height = 1;
        self.write_meta()
    }

    // ========================================================================
    // Public API: Lookup
    // ========================================================================

    /// Look up the value stored under `key`.
    ///
    /// # Errors
    /// `Error::Structural` if a pointer on the way down does not resolve to
    /// a node.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let (mut leaf, _) = self.find_leaf(key)?;
        Ok(leaf.binary_search(key).ok().map(|i| leaf.take(i).1))
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let (leaf, _) = self.find_leaf(key)?;
        Ok(leaf.binary_search(key).is_ok())
    }

    /// Iterate over all entries in key order by walking the leaf chain.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: self,
            entries: Vec::new().into_iter().zip(Vec::new()),
            next: self.head(),
            hops_left: self.meta.next_block,
            done: false,
        }
    }

    // ========================================================================
    // Public API: Mutation
    // ========================================================================

    /// Insert a new entry.
    ///
    /// # Errors
    /// - `Error::DuplicateKey` if `key` is already present; the stored value
    ///   is left untouched
    /// - `Error::NodeTooLarge` if the affected node no longer fits its block
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        let (mut leaf, path) = self.find_leaf(&key)?;

        let index = match leaf.binary_search(&key) {
            Ok(_) => return Err(Error::DuplicateKey),
            Err(i) => i,
        };
        leaf.insert_at(index, key, value);

        let mut staged = Staged::new(self.config.block_size);
        if leaf.is_overflowing() {
            let (meta, free) = (self.meta, self.free.clone());
            if let Err(e) = self.split_leaf(leaf, path, &mut staged) {
                self.meta = meta;
                self.free = free;
                debug!(error = %e, "split abandoned before any write");
                return Err(e);
            }
        } else {
            staged.push(leaf.pointer(), leaf.encode())?;
        }

        for (pointer, image) in &staged.images {
            self.persist(*pointer, image)?;
        }

        self.meta.elements += 1;
        Ok(())
    }

    /// Remove `key`, returning its value if it was present.
    ///
    /// A leaf emptied by the removal is unlinked and its block freed, and
    /// a root left with a single child collapses into it. Nodes are never
    /// merged or rebalanced otherwise.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let (mut leaf, path) = self.find_leaf(key)?;

        let index = match leaf.binary_search(key) {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };
        let (_, value) = leaf.take(index);
        self.meta.elements -= 1;

        if leaf.is_empty() && self.meta.head != self.meta.last {
            self.unlink_leaf(&leaf)?;
            self.free_block(leaf.pointer())?;
            self.prune(path)?;
        } else {
            self.write_leaf(&leaf)?;
        }

        self.collapse_root()?;

        if self.meta.elements == 0 && self.meta.next_block > self.config.reset_threshold_blocks {
            info!(
                blocks = self.meta.next_block,
                threshold = self.config.reset_threshold_blocks,
                "tree emptied, resetting storage"
            );
            self.reset_storage()?;
        }

        Ok(Some(value))
    }

    /// Remove every entry and truncate the store.
    pub fn clear(&mut self) -> Result<()> {
        self.reset_storage()?;
        info!(path = %self.store.path().display(), "cleared tree");
        Ok(())
    }

    /// Write the in-memory metadata (still marked dirty) and fsync the store.
    pub fn sync(&mut self) -> Result<()> {
        self.write_meta()?;
        self.store.sync()
    }

    // ========================================================================
    // Public API: Info
    // ========================================================================

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.meta.elements as usize
    }

    pub fn is_empty(&self) -> bool {
        self.meta.elements == 0
    }

    /// Levels from root to leaf; a lone root leaf is height 1.
    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// Blocks freed this session (or loaded from the sidecar) and not yet reused.
    pub fn free_block_count(&self) -> usize {
        self.free.len()
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.store.stats().snapshot()
    }

    /// Path of the data file.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Check every structural invariant of the tree.
    ///
    /// Walks all nodes and checks key order and separator bounds, uniform
    /// leaf depth, the leaf chain (links, head and last) and the element
    /// count.
    ///
    /// # Errors
    /// `Error::Structural` describing the first violation found.
    pub fn verify(&self) -> Result<()> {
        let mut walk = Walk::default();
        self.verify_subtree(self.root(), None, None, 1, &mut walk)?;

        if walk.elements != u64::from(self.meta.elements) {
            return Err(Error::Structural(format!(
                "counted {} entries, metadata says {}",
                walk.elements, self.meta.elements
            )));
        }

        let leaves = &walk.leaves;
        let first = leaves.first().map(|l| l.pointer);
        let last = leaves.last().map(|l| l.pointer);
        if first != Some(self.head()) || last != Some(self.last()) {
            return Err(Error::Structural(format!(
                "head/last are {}/{}, leaf order gives {:?}/{:?}",
                self.head(),
                self.last(),
                first,
                last
            )));
        }

        for (i, leaf) in leaves.iter().enumerate() {
            let expected_left = if i == 0 {
                BlockPointer::NONE
            } else {
                leaves[i - 1].pointer
            };
            let expected_right = leaves
                .get(i + 1)
                .map_or(BlockPointer::NONE, |next| next.pointer);
            if leaf.left != expected_left || leaf.right != expected_right {
                return Err(Error::Structural(format!(
                    "{} links {}<->{}, expected {}<->{}",
                    leaf.pointer, leaf.left, leaf.right, expected_left, expected_right
                )));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Internal: Descent
    // ========================================================================

    #[inline]
    fn root(&self) -> BlockPointer {
        BlockPointer::from_raw(self.meta.root)
    }

    #[inline]
    fn head(&self) -> BlockPointer {
        BlockPointer::from_raw(self.meta.head)
    }

    #[inline]
    fn last(&self) -> BlockPointer {
        BlockPointer::from_raw(self.meta.last)
    }

    /// Descend to the leaf that holds (or would hold) `key`, recording the
    /// internal nodes passed.
    fn find_leaf(&self, key: &K) -> Result<(LeafNode<K, V>, Vec<PathStep>)> {
        let mut path = Vec::with_capacity(self.meta.height as usize);
        let mut pointer = self.root();

        loop {
            match self.read_node(pointer)? {
                TreeNode::Leaf(leaf) => return Ok((leaf, path)),
                TreeNode::Internal(node) => {
                    if path.len() >= self.meta.height as usize {
                        return Err(Error::Structural(format!(
                            "descent passed height {} at {pointer}",
                            self.meta.height
                        )));
                    }
                    let child_index = node.find_child_index(key);
                    let child = node.child(child_index).ok_or_else(|| {
                        Error::Structural(format!("{pointer} has no child {child_index}"))
                    })?;
                    path.push(PathStep {
                        pointer,
                        child_index,
                    });
                    pointer = child;
                }
            }
        }
    }

    // ========================================================================
    // Internal: Insertion
    // ========================================================================

    /// Split an overflowing leaf, relink the leaf chain and hand the
    /// separator to the parent.
    ///
    /// Only stages node images; blocks are allocated but nothing is written.
    fn split_leaf(
        &mut self,
        mut leaf: LeafNode<K, V>,
        path: Vec<PathStep>,
        staged: &mut Staged,
    ) -> Result<()> {
        let right_pointer = self.alloc_block(NodeKind::Leaf)?;
        let mut right = leaf.split(right_pointer);
        let separator = right
            .split_left_shift_keys()
            .ok_or_else(|| Error::Structural(format!("{right_pointer} split off empty")))?;

        staged.push(leaf.pointer(), leaf.encode())?;
        staged.push(right_pointer, right.encode())?;

        let after = right.right();
        if after.is_none() {
            self.meta.last = right_pointer.raw();
        } else {
            let mut neighbour = self.read_leaf(after)?;
            neighbour.set_left(right_pointer);
            staged.push(after, neighbour.encode())?;
        }

        debug!(left = %leaf.pointer(), right = %right_pointer, "split leaf");
        self.insert_into_parent(path, leaf.pointer(), separator, right_pointer, staged)
    }

    /// Insert `separator` / `right` next to `left` in each ancestor until
    /// one absorbs it without overflowing, or promote a new root.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<PathStep>,
        mut left: BlockPointer,
        mut separator: K,
        mut right: BlockPointer,
        staged: &mut Staged,
    ) -> Result<()> {
        while let Some(step) = path.pop() {
            let mut parent = self.read_internal(step.pointer)?;
            parent.insert_split(step.child_index, separator, right);

            if !parent.is_overflowing() {
                return staged.push(parent.pointer(), parent.encode());
            }

            let sibling_pointer = self.alloc_block(NodeKind::Internal)?;
            let mut sibling = parent.split(sibling_pointer);
            separator = sibling.split_left_shift_keys().ok_or_else(|| {
                Error::Structural(format!("{sibling_pointer} split off empty"))
            })?;

            staged.push(parent.pointer(), parent.encode())?;
            staged.push(sibling_pointer, sibling.encode())?;
            debug!(left = %parent.pointer(), right = %sibling_pointer, "split internal node");

            left = parent.pointer();
            right = sibling_pointer;
        }

        let root_pointer = self.alloc_block(NodeKind::Internal)?;
        let root = InternalNode::with_children(root_pointer, self.config.order, left, separator, right);
        staged.push(root_pointer, root.encode())?;

        self.meta.root = root_pointer.raw();
        self.meta.height += 1;
        debug!(root = %root_pointer, height = self.meta.height, "promoted new root");
        Ok(())
    }

    // ========================================================================
    // Internal: Deletion
    // ========================================================================

    /// Take an emptied leaf out of the leaf chain.
    fn unlink_leaf(&mut self, leaf: &LeafNode<K, V>) -> Result<()> {
        let (left, right) = (leaf.left(), leaf.right());

        if left.is_none() {
            self.meta.head = right.raw();
        } else {
            let mut prev = self.read_leaf(left)?;
            prev.set_right(right);
            self.write_leaf(&prev)?;
        }

        if right.is_none() {
            self.meta.last = left.raw();
        } else {
            let mut next = self.read_leaf(right)?;
            next.set_left(left);
            self.write_leaf(&next)?;
        }
        Ok(())
    }

    /// Remove a freed child from its parent, freeing ancestors left with
    /// no children at all.
    fn prune(&mut self, mut path: Vec<PathStep>) -> Result<()> {
        while let Some(step) = path.pop() {
            let mut parent = self.read_internal(step.pointer)?;
            parent.remove_child(step.child_index);

            if !parent.children().is_empty() {
                return self.write_internal(&parent);
            }
            self.free_block(step.pointer)?;
        }
        Err(Error::Structural(
            "pruning an empty leaf emptied the root".into(),
        ))
    }

    /// Replace an internal root that has a single child by that child.
    fn collapse_root(&mut self) -> Result<()> {
        while self.root().is_internal() {
            let root = self.read_internal(self.root())?;
            let [only_child] = root.children() else {
                break;
            };
            let only_child = *only_child;

            self.free_block(root.pointer())?;
            self.meta.root = only_child.raw();
            self.meta.height -= 1;
            debug!(root = %only_child, height = self.meta.height, "collapsed root");
        }
        Ok(())
    }

    // ========================================================================
    // Internal: Block lifecycle
    // ========================================================================

    /// Take the lowest free block, or grow the file by one.
    fn alloc_block(&mut self, kind: NodeKind) -> Result<BlockPointer> {
        let index = match self.free.take_lowest() {
            Some(index) => index,
            None => {
                if self.meta.next_block >= i32::MAX as u32 {
                    return Err(Error::Structural("block pointer space exhausted".into()));
                }
                self.meta.next_block += 1;
                match kind {
                    NodeKind::Leaf => self.meta.max_leaf_nodes += 1,
                    NodeKind::Internal => self.meta.max_internal_nodes += 1,
                }
                self.meta.next_block
            }
        };
        Ok(BlockPointer::new(kind, index))
    }

    /// Tombstone a node's block and make it available for reuse.
    fn free_block(&mut self, pointer: BlockPointer) -> Result<()> {
        let mut guard = self.store.set(pointer.block_id())?;
        NodeHeader::write_tombstone(&mut guard);
        guard.save()?;

        self.free.insert(pointer.index());
        debug!(block = %pointer, "freed block");
        Ok(())
    }

    // ========================================================================
    // Internal: Node I/O
    // ========================================================================

    fn read_node(&self, pointer: BlockPointer) -> Result<TreeNode<K, V>> {
        let guard = self.store.get(pointer.block_id())?;
        TreeNode::read_from(&guard, pointer, self.config.order)
    }

    fn read_leaf(&self, pointer: BlockPointer) -> Result<LeafNode<K, V>> {
        if !pointer.is_leaf() {
            return Err(Error::Structural(format!("{pointer} is not a leaf pointer")));
        }
        let guard = self.store.get(pointer.block_id())?;
        LeafNode::read_from(&guard, pointer, self.config.order)
    }

    fn read_internal(&self, pointer: BlockPointer) -> Result<InternalNode<K>> {
        if !pointer.is_internal() {
            return Err(Error::Structural(format!("{pointer} is not an internal pointer")));
        }
        let guard = self.store.get(pointer.block_id())?;
        InternalNode::read_from(&guard, pointer, self.config.order)
    }

    fn write_leaf(&self, leaf: &LeafNode<K, V>) -> Result<()> {
        self.persist(leaf.pointer(), &leaf.encode())
    }

    fn write_internal(&self, node: &InternalNode<K>) -> Result<()> {
        self.persist(node.pointer(), &node.encode())
    }

    fn persist(&self, pointer: BlockPointer, encoded: &[u8]) -> Result<()> {
        if encoded.len() > self.config.block_size {
            return Err(Error::NodeTooLarge {
                needed: encoded.len(),
                block_size: self.config.block_size,
            });
        }
        let mut guard = self.store.set(pointer.block_id())?;
        guard.fill_from(encoded);
        guard.save()
    }

    fn write_meta(&self) -> Result<()> {
        let mut guard = self.store.set(BlockId::META)?;
        self.meta.write_to(&mut guard);
        guard.save()
    }

    // ========================================================================
    // Internal: Verification
    // ========================================================================

    fn verify_subtree(
        &self,
        pointer: BlockPointer,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: u32,
        walk: &mut Walk<K>,
    ) -> Result<()> {
        if depth > self.meta.height {
            return Err(Error::Structural(format!(
                "{pointer} sits below height {}",
                self.meta.height
            )));
        }

        match self.read_node(pointer)? {
            TreeNode::Internal(node) => {
                check_keys(pointer, node.keys(), lower, upper)?;
                let keys = node.keys();
                for (i, &child) in node.children().iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(&keys[i - 1]) };
                    let child_upper = if i == keys.len() { upper } else { Some(&keys[i]) };
                    self.verify_subtree(child, child_lower, child_upper, depth + 1, walk)?;
                }
                Ok(())
            }
            TreeNode::Leaf(leaf) => {
                if depth != self.meta.height {
                    return Err(Error::Structural(format!(
                        "{pointer} at depth {depth}, height is {}",
                        self.meta.height
                    )));
                }
                if leaf.is_empty() && pointer != self.root() {
                    return Err(Error::Structural(format!("{pointer} is an empty non-root leaf")));
                }
                check_keys(pointer, leaf.keys(), lower, upper)?;

                if let (Some(prev), Some(first)) = (&walk.last_key, leaf.keys().first()) {
                    if prev >= first {
                        return Err(Error::Structural(format!(
                            "{pointer} does not continue the ascending key order"
                        )));
                    }
                }
                if let Some(last) = leaf.keys().last() {
                    walk.last_key = Some(last.clone());
                }

                walk.elements += leaf.allocated() as u64;
                walk.leaves.push(LeafLinks {
                    pointer,
                    left: leaf.left(),
                    right: leaf.right(),
                });
                Ok(())
            }
        }
    }
}

impl<K, V> Drop for BPlusTree<K, V> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                path = %self.store.path().display(),
                "tree dropped without close, store left dirty"
            );
        }
    }
}

/// Node images an insertion will write, collected so that a node too
/// large for its block is refused before anything reaches the store.
struct Staged {
    block_size: usize,
    images: Vec<(BlockPointer, BytesMut)>,
}

impl Staged {
    fn new(block_size: usize) -> Self {
        Self {
            block_size,
            images: Vec::new(),
        }
    }

    fn push(&mut self, pointer: BlockPointer, image: BytesMut) -> Result<()> {
        if image.len() > self.block_size {
            return Err(Error::NodeTooLarge {
                needed: image.len(),
                block_size: self.block_size,
            });
        }
        self.images.push((pointer, image));
        Ok(())
    }
}

/// Ordered iterator over a tree's entries, yielding owned pairs.
///
/// Leaves are read one at a time as the iteration reaches them.
pub struct Iter<'a, K, V> {
    tree: &'a BPlusTree<K, V>,
    entries: std::iter::Zip<vec::IntoIter<K>, vec::IntoIter<V>>,
    next: BlockPointer,
    /// Bound on leaves visited, so a corrupt chain cannot cycle forever.
    hops_left: u32,
    done: bool,
}

impl<K, V> Iterator for Iter<'_, K, V>
where
    K: Ord + Clone + Codec,
    V: Codec,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Some(Ok(entry));
            }
            if self.done || self.next.is_none() {
                return None;
            }
            if self.hops_left == 0 {
                self.done = true;
                return Some(Err(Error::Structural("leaf chain does not terminate".into())));
            }
            self.hops_left -= 1;

            match self.tree.read_leaf(self.next) {
                Ok(leaf) => {
                    self.next = leaf.right();
                    self.entries = leaf.into_entries();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// What [`BPlusTree::verify`] collects while walking.
struct Walk<K> {
    elements: u64,
    last_key: Option<K>,
    leaves: Vec<LeafLinks>,
}

impl<K> Default for Walk<K> {
    fn default() -> Self {
        Self {
            elements: 0,
            last_key: None,
            leaves: Vec::new(),
        }
    }
}

struct LeafLinks {
    pointer: BlockPointer,
    left: BlockPointer,
    right: BlockPointer,
}

/// Keys strictly ascending and inside `[lower, upper)`.
fn check_keys<K: Ord>(
    pointer: BlockPointer,
    keys: &[K],
    lower: Option<&K>,
    upper: Option<&K>,
) -> Result<()> {
    if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::Structural(format!("{pointer} keys are not ascending")));
    }
    if let (Some(lower), Some(first)) = (lower, keys.first()) {
        if first < lower {
            return Err(Error::Structural(format!("{pointer} has a key below its separator")));
        }
    }
    if let (Some(upper), Some(last)) = (upper, keys.last()) {
        if last >= upper {
            return Err(Error::Structural(format!("{pointer} has a key at or above its separator")));
        }
    }
    Ok(())
}

/// Refuse configurations where a full node of bounded types overflows a block.
fn check_node_fit<K: Codec, V: Codec>(config: &TreeConfig) -> Result<()> {
    match node::max_node_size::<K, V>(config.order) {
        Some(needed) if needed > config.block_size => Err(Error::InvalidConfig(format!(
            "a full node of order {} needs {needed} bytes, block_size is {}",
            config.order, config.block_size
        ))),
        _ => Ok(()),
    }
}

/// `base` with `.ext` appended (not replacing an existing extension).
fn with_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config() -> TreeConfig {
        TreeConfig::default()
            .with_block_size(256)
            .with_order(4)
            .with_cache_capacity(16)
    }

    fn create_test_tree() -> (BPlusTree<u32, u64>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let tree = BPlusTree::create(dir.path().join("tree"), small_config()).unwrap();
        (tree, dir)
    }

    fn keys_of(leaf: &LeafNode<u32, u64>) -> Vec<u32> {
        leaf.keys().to_vec()
    }

    #[test]
    fn test_fresh_tree_is_single_leaf() {
        let (tree, _dir) = create_test_tree();

        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root(), BlockPointer::leaf(1));
        assert_eq!(tree.head(), tree.root());
        assert_eq!(tree.last(), tree.root());
        tree.verify().unwrap();
    }

    #[test]
    fn test_one_split_at_capacity_plus_one() {
        let (mut tree, _dir) = create_test_tree();

        for k in 1..=4 {
            tree.put(k, u64::from(k) * 10).unwrap();
        }
        // Exactly full: still one leaf
        assert_eq!(tree.height(), 1);

        tree.put(5, 50).unwrap();
        assert_eq!(tree.height(), 2);

        let root = tree.read_internal(tree.root()).unwrap();
        assert_eq!(root.keys(), &[3]);
        assert_eq!(root.children().len(), 2);

        let left = tree.read_leaf(root.children()[0]).unwrap();
        let right = tree.read_leaf(root.children()[1]).unwrap();
        assert_eq!(keys_of(&left), vec![1, 2]);
        assert_eq!(keys_of(&right), vec![3, 4, 5]);

        // Separator is the first key of the right leaf; siblings bracket each other
        assert_eq!(root.keys()[0], right.keys()[0]);
        assert_eq!(left.right(), right.pointer());
        assert_eq!(right.left(), left.pointer());
        assert!(left.left().is_none());
        assert!(right.right().is_none());
        assert_eq!(tree.head(), left.pointer());
        assert_eq!(tree.last(), right.pointer());

        tree.verify().unwrap();
    }

    #[test]
    fn test_split_in_middle_relinks_neighbour() {
        let (mut tree, _dir) = create_test_tree();

        for k in [10, 20, 30, 40, 50] {
            tree.put(k, 0).unwrap();
        }
        // Leaves {10,20} {30,40,50}; fill the left one past capacity
        for k in [11, 12, 13] {
            tree.put(k, 0).unwrap();
        }

        let root = tree.read_internal(tree.root()).unwrap();
        assert_eq!(root.children().len(), 3);

        let middle = tree.read_leaf(root.children()[1]).unwrap();
        let last = tree.read_leaf(root.children()[2]).unwrap();
        assert_eq!(last.left(), middle.pointer());
        assert_eq!(middle.right(), last.pointer());
        assert_eq!(tree.last(), last.pointer());

        tree.verify().unwrap();
    }

    #[test]
    fn test_internal_split_grows_height() {
        let (mut tree, _dir) = create_test_tree();

        for k in 0..40 {
            tree.put(k, u64::from(k)).unwrap();
        }

        assert!(tree.height() >= 3);
        tree.verify().unwrap();
        for k in 0..40 {
            assert_eq!(tree.get(&k).unwrap(), Some(u64::from(k)));
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let (mut tree, _dir) = create_test_tree();

        tree.put(7, 1).unwrap();
        assert!(matches!(tree.put(7, 2), Err(Error::DuplicateKey)));

        assert_eq!(tree.get(&7).unwrap(), Some(1));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_collapse_frees_root_for_reuse() {
        let (mut tree, _dir) = create_test_tree();

        // blocks: 1 = first leaf, 2 = split-off leaf, 3 = root
        for k in 1..=5 {
            tree.put(k, 0).unwrap();
        }
        assert_eq!(tree.root(), BlockPointer::internal(3));

        tree.remove(&1).unwrap();
        tree.remove(&2).unwrap();

        assert_eq!(tree.height(), 1);
        assert_eq!(tree.root(), BlockPointer::leaf(2));
        assert_eq!(tree.head(), tree.root());
        assert_eq!(tree.free_block_count(), 2);
        assert!(tree.free.contains(1));
        assert!(tree.free.contains(3));
        tree.verify().unwrap();

        // Next split reuses the lowest freed blocks before growing the file
        for k in 6..=7 {
            tree.put(k, 0).unwrap();
        }
        assert_eq!(tree.root(), BlockPointer::internal(3));
        assert_eq!(tree.free_block_count(), 0);
        assert_eq!(tree.meta.next_block, 3);
        tree.verify().unwrap();
    }

    #[test]
    fn test_freed_block_reads_as_structural() {
        let (mut tree, _dir) = create_test_tree();

        for k in 1..=5 {
            tree.put(k, 0).unwrap();
        }
        tree.remove(&1).unwrap();
        tree.remove(&2).unwrap();

        assert!(matches!(
            tree.read_leaf(BlockPointer::leaf(1)),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_remove_missing() {
        let (mut tree, _dir) = create_test_tree();
        tree.put(1, 1).unwrap();

        assert_eq!(tree.remove(&2).unwrap(), None);
        assert_eq!(tree.remove(&1).unwrap(), Some(1));
        assert_eq!(tree.remove(&1).unwrap(), None);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_reset_when_emptied_past_threshold() {
        let dir = tempdir().unwrap();
        let config = small_config().with_reset_threshold_blocks(4);
        let mut tree: BPlusTree<u32, u64> = BPlusTree::create(dir.path().join("tree"), config).unwrap();

        for k in 0..20 {
            tree.put(k, 0).unwrap();
        }
        assert!(tree.meta.next_block > 4);
        let grown = tree.store.size_in_blocks().unwrap();

        for k in 0..20 {
            tree.remove(&k).unwrap();
        }

        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.meta.next_block, 1);
        assert_eq!(tree.free_block_count(), 0);
        assert!(tree.store.size_in_blocks().unwrap() < grown);
        tree.verify().unwrap();
    }

    #[test]
    fn test_no_reset_below_threshold() {
        let (mut tree, _dir) = create_test_tree();

        for k in 0..20 {
            tree.put(k, 0).unwrap();
        }
        let next_block = tree.meta.next_block;
        for k in 0..20 {
            tree.remove(&k).unwrap();
        }

        assert!(tree.is_empty());
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.meta.next_block, next_block);
        assert!(tree.free_block_count() > 0);
        tree.verify().unwrap();
    }

    #[test]
    fn test_iter_in_order() {
        let (mut tree, _dir) = create_test_tree();

        for k in [9, 3, 7, 1, 5, 8, 2, 6, 4, 0] {
            tree.put(k, u64::from(k) * 2).unwrap();
        }

        let entries: Vec<(u32, u64)> = tree.iter().map(|e| e.unwrap()).collect();
        let expected: Vec<(u32, u64)> = (0..10).map(|k| (k, u64::from(k) * 2)).collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_verify_detects_bad_count() {
        let (mut tree, _dir) = create_test_tree();
        tree.put(1, 1).unwrap();

        tree.meta.elements = 5;
        assert!(matches!(tree.verify(), Err(Error::Structural(_))));
        tree.meta.elements = 1;
    }

    #[test]
    fn test_node_fit_checked_at_open() {
        let dir = tempdir().unwrap();
        // Full leaf of order 64 with u64/u64: 16 + 64 * 16 bytes > 256
        let config = small_config().with_order(64);
        let result = BPlusTree::<u64, u64>::create(dir.path().join("tree"), config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_value_rejected() {
        let dir = tempdir().unwrap();
        let mut tree: BPlusTree<u32, String> =
            BPlusTree::create(dir.path().join("tree"), small_config()).unwrap();

        let result = tree.put(1, "x".repeat(300));
        assert!(matches!(result, Err(Error::NodeTooLarge { .. })));
        assert!(tree.is_empty());
        assert_eq!(tree.get(&1).unwrap(), None);
    }

    #[test]
    fn test_oversized_split_half_leaves_tree_intact() {
        let dir = tempdir().unwrap();
        let mut tree: BPlusTree<u32, String> =
            BPlusTree::create(dir.path().join("tree"), small_config()).unwrap();

        tree.put(1, "a".repeat(10)).unwrap();
        tree.put(2, "b".repeat(10)).unwrap();
        tree.put(3, "c".repeat(90)).unwrap();
        tree.put(4, "d".repeat(90)).unwrap();
        let (meta, free) = (tree.meta, tree.free.clone());

        // Right half {3, 4, 5} would need 310 bytes
        let result = tree.put(5, "e".repeat(90));
        assert!(matches!(result, Err(Error::NodeTooLarge { needed: 310, block_size: 256 })));

        assert_eq!(tree.meta, meta);
        assert_eq!(tree.free, free);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.get(&1).unwrap(), Some("a".repeat(10)));
        assert_eq!(tree.get(&3).unwrap(), Some("c".repeat(90)));
        assert_eq!(tree.get(&4).unwrap(), Some("d".repeat(90)));
        assert_eq!(tree.get(&5).unwrap(), None);
        tree.verify().unwrap();

        // A split that fits still goes through afterwards
        tree.put(5, "e".repeat(10)).unwrap();
        assert_eq!(tree.height(), 2);
        tree.verify().unwrap();
    }

    /// Even keys from 2 on are long, so every leaf split promotes a long separator.
    fn separator_key(i: u32) -> String {
        let mut key = format!("k{i:02}");
        if i >= 2 && i % 2 == 0 {
            key.push_str(&"x".repeat(97));
        }
        key
    }

    #[test]
    fn test_oversized_separator_leaves_tree_intact() {
        let dir = tempdir().unwrap();
        let mut tree: BPlusTree<String, u32> =
            BPlusTree::create(dir.path().join("tree"), small_config()).unwrap();

        for i in 0..8 {
            tree.put(separator_key(i), i).unwrap();
        }
        assert_eq!(tree.height(), 2);
        let (meta, free) = (tree.meta, tree.free.clone());

        // Leaves fit, but a root holding three long separators does not
        let result = tree.put(separator_key(8), 8);
        assert!(matches!(result, Err(Error::NodeTooLarge { block_size: 256, .. })));

        assert_eq!(tree.meta, meta);
        assert_eq!(tree.free, free);
        assert_eq!(tree.len(), 8);
        for i in 0..8 {
            assert_eq!(tree.get(&separator_key(i)).unwrap(), Some(i));
        }
        assert_eq!(tree.get(&separator_key(8)).unwrap(), None);
        tree.verify().unwrap();

        let keys: Vec<String> = tree.iter().map(|e| e.unwrap().0).collect();
        assert_eq!(keys, (0..8).map(separator_key).collect::<Vec<_>>());
    }

    #[test]
    fn test_with_suffix_appends() {
        assert_eq!(
            with_suffix(Path::new("/tmp/db.v1"), "data"),
            PathBuf::from("/tmp/db.v1.data")
        );
    }
}
