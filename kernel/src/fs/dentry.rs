//! Dentry tree, inode cache, and mount table.
//!
//! This is the core data model the rest of the VFS (`mod.rs`'s path
//! resolution, the syscall layer, the userfs bridge) walks: a tree of
//! [`Dentry`] nodes rooted at the mount table's root, each optionally
//! bound to a shared [`Inode`]. A filesystem's [`VfsNode`] implementation
//! supplies the per-inode operations (read/write/lookup/...); the dentry
//! layer adds the name-in-a-directory cache, parent links, and the
//! nlinks/refcount bookkeeping that decides when an inode is dropped.

use alloc::{
    collections::BTreeMap,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec::Vec,
};
use core::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use spin::{Mutex, RwLock};

use super::{Filesystem, Metadata, NodeType, Permissions, VfsNode};
use crate::mm::page_cache::PageCache;

/// Hard limit on symlink indirection during a single path walk, matching
/// the kernel's documented ceiling against symlink loops.
pub const MAX_SYMLINK_DEPTH: usize = 40;

static NEXT_INO: AtomicU64 = AtomicU64::new(1);

/// Every live inode, keyed by `ino`, so C4's demand-paging fault path can
/// resolve a `FileBacked { inode, offset }` mapping back to the `Inode`
/// that owns the page cache for it (see
/// [`crate::mm::demand_paging::set_file_backed_resolver`]). Entries are
/// `Weak` so this registry never keeps an otherwise-unreferenced inode
/// alive; it is pruned lazily on lookup.
static INODE_REGISTRY: Mutex<BTreeMap<u64, Weak<Inode>>> = Mutex::new(BTreeMap::new());

/// Look up a live inode by number. Used by the demand-paging resolver
/// registered in [`super::init`].
pub fn lookup_inode_by_ino(ino: u64) -> Option<Arc<Inode>> {
    INODE_REGISTRY.lock().get(&ino).and_then(Weak::upgrade)
}

/// Resolve a `FileBacked` page fault: look up the inode, then ask its page
/// cache for the frame at `pgoff`, populating it via `getpage` on a miss.
/// Installed as `mm`'s file-backed fault resolver by [`super::init`].
pub fn resolve_file_backed_page(
    ino: u64,
    pgoff: usize,
) -> Result<crate::mm::FrameNumber, &'static str> {
    let inode = lookup_inode_by_ino(ino).ok_or("ENOENT: inode not found for file-backed fault")?;
    inode.get_page(pgoff)
}

/// In-kernel inode handle. Shared by every dentry that names it; dropped
/// (page cache flushed, `Filesystem::drop_inode` invoked) once both its
/// link count and its reference count reach zero.
pub struct Inode {
    pub ino: u64,
    node: Arc<dyn VfsNode>,
    superblock: Weak<Superblock>,
    nlinks: AtomicI64,
    page_cache: PageCache,
}

impl Inode {
    fn new(node: Arc<dyn VfsNode>, superblock: &Arc<Superblock>) -> Arc<Self> {
        let inode = Arc::new(Self {
            ino: NEXT_INO.fetch_add(1, Ordering::Relaxed),
            node,
            superblock: Arc::downgrade(superblock),
            nlinks: AtomicI64::new(1),
            page_cache: PageCache::new(),
        });
        INODE_REGISTRY
            .lock()
            .insert(inode.ino, Arc::downgrade(&inode));
        inode
    }

    /// Return the frame backing page `pgoff` of this inode's data,
    /// populating the page cache via `VfsNode::getpage` on a miss.
    pub fn get_page(&self, pgoff: usize) -> Result<crate::mm::FrameNumber, &'static str> {
        let node = &self.node;
        self.page_cache
            .get_or_populate(pgoff, |buf| node.getpage(pgoff, buf))
    }

    /// Mark page `pgoff` dirty in this inode's page cache (e.g. after a
    /// write through a shared file-backed mapping).
    pub fn mark_page_dirty(&self, pgoff: usize) {
        self.page_cache.mark_dirty(pgoff);
    }

    pub fn node_type(&self) -> NodeType {
        self.node.node_type()
    }

    pub fn metadata(&self) -> Result<Metadata, &'static str> {
        self.node.metadata()
    }

    pub fn ops(&self) -> &Arc<dyn VfsNode> {
        &self.node
    }

    pub fn nlinks(&self) -> i64 {
        self.nlinks.load(Ordering::Acquire)
    }

    /// Called when a `dentry` naming this inode is created (link/create).
    pub fn link(&self) {
        self.nlinks.fetch_add(1, Ordering::AcqRel);
    }

    /// Called when a `dentry` naming this inode is unlinked. Per the data
    /// model invariant, a live dentry's inode always has `nlinks >= 1`; the
    /// last unlink drops the count to zero and the inode is reclaimed once
    /// every strong reference (every dentry still holding it) is gone.
    pub fn unlink(&self) {
        let prev = self.nlinks.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev >= 1, "inode nlinks underflow");
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        let node = &self.node;
        self.page_cache
            .flush_all(|pgoff, buf| node.writepage(pgoff, buf));
        self.page_cache.drop_all();
        INODE_REGISTRY.lock().remove(&self.ino);

        if let Some(sb) = self.superblock.upgrade() {
            sb.fs.drop_inode(self.ino);
        }
    }
}

/// A cached name-in-a-directory. Forms a tree rooted at the mount table's
/// root. Refcounted (via `Arc`); an unlinked dentry can be detached from
/// its parent's children map but remains alive while any caller still
/// holds a clone of it.
pub struct Dentry {
    pub name: String,
    parent: Option<Weak<Dentry>>,
    inode: RwLock<Option<Arc<Inode>>>,
    children: Mutex<BTreeMap<String, Arc<Dentry>>>,
}

impl Dentry {
    fn new(name: String, parent: Option<&Arc<Dentry>>, inode: Option<Arc<Inode>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            parent: parent.map(Arc::downgrade),
            inode: RwLock::new(inode),
            children: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn inode(&self) -> Option<Arc<Inode>> {
        self.inode.read().clone()
    }

    pub fn parent(&self) -> Option<Arc<Dentry>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_dir(&self) -> bool {
        self.inode()
            .map(|i| i.node_type() == NodeType::Directory)
            .unwrap_or(false)
    }

    /// Find or populate a child dentry by name, consulting the owning
    /// filesystem's `lookup` on cache miss.
    fn child(self: &Arc<Self>, superblock: &Arc<Superblock>, name: &str) -> Result<Arc<Dentry>, &'static str> {
        if let Some(child) = self.children.lock().get(name) {
            return Ok(child.clone());
        }
        let parent_inode = self.inode().ok_or("ENOTDIR: dentry has no inode")?;
        let child_node = parent_inode.ops().lookup(name)?;
        let child_inode = Inode::new(child_node, superblock);
        let child = Dentry::new(name.to_string(), Some(self), Some(child_inode));
        self.children.lock().insert(name.to_string(), child.clone());
        Ok(child)
    }

    /// Detach this dentry from its parent's children map. The dentry (and
    /// its inode, if still referenced) remains alive in any clone already
    /// held by a caller.
    fn detach(self: &Arc<Self>) {
        if let Some(parent) = self.parent() {
            parent.children.lock().remove(&self.name);
        }
    }
}

/// Mounted filesystem instance: vtable of superblock operations plus the
/// root dentry grafted at the mountpoint.
pub struct Superblock {
    fs: Arc<dyn Filesystem>,
    root: Arc<Dentry>,
}

impl Superblock {
    fn new(fs: Arc<dyn Filesystem>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Superblock>| {
            // The root dentry's inode is created against a superblock that
            // isn't fully constructed yet; its `Weak` back-reference is
            // filled in immediately after via `from_weak`.
            let placeholder_inode = Arc::new(Inode {
                ino: NEXT_INO.fetch_add(1, Ordering::Relaxed),
                node: fs.root(),
                superblock: weak.clone(),
                nlinks: AtomicI64::new(1),
            });
            Self {
                fs,
                root: Dentry::new(String::new(), None, Some(placeholder_inode)),
            }
        })
    }

    pub fn root(&self) -> &Arc<Dentry> {
        &self.root
    }

    pub fn sync(&self) -> Result<(), &'static str> {
        self.fs.sync()
    }

    pub fn statfs(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// Map from mountpoint dentry identity to the mounted superblock's root.
/// Consulted on every path-walk step that crosses a directory boundary.
pub struct MountTable {
    entries: Mutex<BTreeMap<usize, Arc<Superblock>>>,
}

impl MountTable {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(dentry: &Arc<Dentry>) -> usize {
        Arc::as_ptr(dentry) as usize
    }

    pub fn mount(&self, mountpoint: &Arc<Dentry>, sb: Arc<Superblock>) -> Result<(), &'static str> {
        let mut entries = self.entries.lock();
        let key = Self::key(mountpoint);
        if entries.contains_key(&key) {
            return Err("EBUSY: already a mount point");
        }
        entries.insert(key, sb);
        Ok(())
    }

    pub fn unmount(&self, mountpoint: &Arc<Dentry>) -> Result<Arc<Superblock>, &'static str> {
        self.entries
            .lock()
            .remove(&Self::key(mountpoint))
            .ok_or("EINVAL: not a mount point")
    }

    /// If `dentry` is a mountpoint, return the mounted filesystem's root.
    pub fn crossing(&self, dentry: &Arc<Dentry>) -> Option<Arc<Dentry>> {
        self.entries
            .lock()
            .get(&Self::key(dentry))
            .map(|sb| sb.root().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a fresh superblock for `fs` (used by both the initial root mount
/// and every subsequent `mount()`).
pub fn mount_superblock(fs: Arc<dyn Filesystem>) -> Arc<Superblock> {
    Superblock::new(fs)
}

/// Walk `path` starting from `anchor`, crossing mounts and resolving `.`,
/// `..`, and symlinks (up to [`MAX_SYMLINK_DEPTH`] indirections). `root` is
/// used as the anchor for absolute paths and as the stopping point for
/// `..` at the top of the tree.
pub fn walk(
    root: &Arc<Dentry>,
    root_sb: &Arc<Superblock>,
    mounts: &MountTable,
    anchor: &Arc<Dentry>,
    anchor_sb: &Arc<Superblock>,
    path: &str,
) -> Result<Arc<Dentry>, &'static str> {
    let mut depth = 0;
    walk_inner(root, root_sb, mounts, anchor, anchor_sb, path, &mut depth).map(|(d, _)| d)
}

/// Like [`walk`], but also returns the superblock owning the resolved
/// dentry -- needed by callers (`mkdir`/`unlink`/`create`) that must hand
/// the right superblock to [`create_child`]/[`unlink_child`] when the walk
/// crossed a mount point.
pub fn walk_with_superblock(
    root: &Arc<Dentry>,
    root_sb: &Arc<Superblock>,
    mounts: &MountTable,
    anchor: &Arc<Dentry>,
    anchor_sb: &Arc<Superblock>,
    path: &str,
) -> Result<(Arc<Dentry>, Arc<Superblock>), &'static str> {
    let mut depth = 0;
    walk_inner(root, root_sb, mounts, anchor, anchor_sb, path, &mut depth)
}

fn walk_inner(
    root: &Arc<Dentry>,
    root_sb: &Arc<Superblock>,
    mounts: &MountTable,
    anchor: &Arc<Dentry>,
    anchor_sb: &Arc<Superblock>,
    path: &str,
    depth: &mut usize,
) -> Result<(Arc<Dentry>, Arc<Superblock>), &'static str> {
    let (mut cur, mut cur_sb) = if path.starts_with('/') {
        (root.clone(), root_sb.clone())
    } else {
        (anchor.clone(), anchor_sb.clone())
    };

    for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if component == ".." {
            if let Some(parent) = cur.parent() {
                cur = parent;
            }
            // A dentry with no parent is a mount root; '..' above the
            // overall root stays put, matching the documented behavior.
            continue;
        }

        if !cur.is_dir() {
            return Err("ENOTDIR: path component is not a directory");
        }
        let child = cur.child(&cur_sb, component)?;

        // Mount crossing: if `child` is itself a mountpoint, redirect to
        // the mounted filesystem's root before continuing the walk.
        let (child, child_sb) = match mounts.crossing(&child) {
            Some(mounted_root) => (mounted_root, cur_sb.clone()),
            None => (child, cur_sb.clone()),
        };

        let child = if child.inode().map(|i| i.node_type()) == Some(NodeType::Symlink) {
            *depth += 1;
            if *depth > MAX_SYMLINK_DEPTH {
                return Err("ELOOP: too many symbolic links");
            }
            let target = child
                .inode()
                .ok_or("ENOENT: dangling symlink")?
                .ops()
                .readlink()?;
            let (resolved, resolved_sb) =
                walk_inner(root, root_sb, mounts, &cur, &cur_sb, &target, depth)?;
            cur_sb = resolved_sb;
            resolved
        } else {
            child
        };

        cur = child;
    }

    Ok((cur, cur_sb))
}

/// Create a new dentry for `name` under `parent`, calling the owning
/// filesystem's `create`/`mkdir` and inserting the result into the dentry
/// cache so subsequent lookups hit it directly.
pub fn create_child(
    parent: &Arc<Dentry>,
    superblock: &Arc<Superblock>,
    name: &str,
    perms: Permissions,
    dir: bool,
) -> Result<Arc<Dentry>, &'static str> {
    let parent_inode = parent.inode().ok_or("ENOTDIR")?;
    let node = if dir {
        parent_inode.ops().mkdir(name, perms)?
    } else {
        parent_inode.ops().create(name, perms)?
    };
    let inode = Inode::new(node, superblock);
    let child = Dentry::new(name.to_string(), Some(parent), Some(inode));
    parent.children.lock().insert(name.to_string(), child.clone());
    Ok(child)
}

/// Unlink `name` from `parent`: asks the filesystem to remove the
/// directory entry, drops the cached dentry's link count, and detaches it
/// from the tree so it is no longer reachable by future lookups while any
/// existing holder keeps it (and its inode) alive.
pub fn unlink_child(parent: &Arc<Dentry>, superblock: &Arc<Superblock>, name: &str) -> Result<(), &'static str> {
    let parent_inode = parent.inode().ok_or("ENOTDIR")?;
    parent_inode.ops().unlink(name)?;
    if let Ok(child) = parent.child(superblock, name) {
        if let Some(inode) = child.inode() {
            inode.unlink();
        }
        child.detach();
    }
    Ok(())
}

/// List the directory entries of `dentry`, delegating to its inode.
pub fn readdir(dentry: &Arc<Dentry>) -> Result<Vec<super::DirEntry>, &'static str> {
    let inode = dentry.inode().ok_or("ENOTDIR")?;
    inode.ops().readdir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;

    struct MockNode {
        ty: NodeType,
        children: Mutex<BTreeMap<String, Arc<MockNode>>>,
    }

    impl MockNode {
        fn dir() -> Arc<Self> {
            Arc::new(Self {
                ty: NodeType::Directory,
                children: Mutex::new(BTreeMap::new()),
            })
        }
        fn file() -> Arc<Self> {
            Arc::new(Self {
                ty: NodeType::File,
                children: Mutex::new(BTreeMap::new()),
            })
        }
    }

    impl VfsNode for MockNode {
        fn node_type(&self) -> NodeType {
            self.ty
        }
        fn read(&self, _offset: usize, _buffer: &mut [u8]) -> Result<usize, &'static str> {
            Ok(0)
        }
        fn write(&self, _offset: usize, data: &[u8]) -> Result<usize, &'static str> {
            Ok(data.len())
        }
        fn metadata(&self) -> Result<Metadata, &'static str> {
            Ok(Metadata {
                node_type: self.ty,
                size: 0,
                permissions: Permissions::default(),
                uid: 0,
                gid: 0,
                created: 0,
                modified: 0,
                accessed: 0,
            })
        }
        fn readdir(&self) -> Result<Vec<super::super::DirEntry>, &'static str> {
            Ok(Vec::new())
        }
        fn lookup(&self, name: &str) -> Result<Arc<dyn VfsNode>, &'static str> {
            self.children
                .lock()
                .get(name)
                .cloned()
                .map(|n| n as Arc<dyn VfsNode>)
                .ok_or("ENOENT")
        }
        fn create(
            &self,
            name: &str,
            _permissions: Permissions,
        ) -> Result<Arc<dyn VfsNode>, &'static str> {
            let child = MockNode::file();
            self.children.lock().insert(name.to_string(), child.clone());
            Ok(child)
        }
        fn mkdir(
            &self,
            name: &str,
            _permissions: Permissions,
        ) -> Result<Arc<dyn VfsNode>, &'static str> {
            let child = MockNode::dir();
            self.children.lock().insert(name.to_string(), child.clone());
            Ok(child)
        }
        fn unlink(&self, name: &str) -> Result<(), &'static str> {
            self.children
                .lock()
                .remove(name)
                .map(|_| ())
                .ok_or("ENOENT")
        }
        fn truncate(&self, _size: usize) -> Result<(), &'static str> {
            Ok(())
        }
    }

    struct MockFs {
        root: Arc<MockNode>,
    }

    impl Filesystem for MockFs {
        fn root(&self) -> Arc<dyn VfsNode> {
            self.root.clone()
        }
        fn name(&self) -> &str {
            "mockfs"
        }
        fn is_readonly(&self) -> bool {
            false
        }
        fn sync(&self) -> Result<(), &'static str> {
            Ok(())
        }
    }

    fn fresh() -> (Arc<Superblock>, MountTable) {
        let fs: Arc<dyn Filesystem> = Arc::new(MockFs { root: MockNode::dir() });
        (mount_superblock(fs), MountTable::new())
    }

    #[test]
    fn create_then_lookup_roundtrips() {
        let (sb, mounts) = fresh();
        let root = sb.root().clone();
        create_child(&root, &sb, "etc", Permissions::default(), true).unwrap();
        let found = walk(&root, &sb, &mounts, &root, &sb, "/etc").unwrap();
        assert!(found.is_dir());
    }

    #[test]
    fn unlink_drops_nlinks_and_detaches() {
        let (sb, mounts) = fresh();
        let root = sb.root().clone();
        let f = create_child(&root, &sb, "a.txt", Permissions::default(), false).unwrap();
        let inode = f.inode().unwrap();
        assert_eq!(inode.nlinks(), 1);
        unlink_child(&root, &sb, "a.txt").unwrap();
        assert_eq!(inode.nlinks(), 0);
        assert!(walk(&root, &sb, &mounts, &root, &sb, "/a.txt").is_err());
    }

    #[test]
    fn dotdot_above_root_stays_put() {
        let (sb, mounts) = fresh();
        let root = sb.root().clone();
        let found = walk(&root, &sb, &mounts, &root, &sb, "/../../.").unwrap();
        assert!(Arc::ptr_eq(&found, &root));
    }

    #[test]
    fn mount_crossing_redirects_to_mounted_root() {
        let (sb, mounts) = fresh();
        let root = sb.root().clone();
        let mnt = create_child(&root, &sb, "mnt", Permissions::default(), true).unwrap();
        let (other_sb, _) = fresh();
        create_child(other_sb.root(), &other_sb, "marker", Permissions::default(), true).unwrap();
        mounts.mount(&mnt, other_sb.clone()).unwrap();
        let found = walk(&root, &sb, &mounts, &root, &sb, "/mnt/marker").unwrap();
        assert!(found.is_dir());
    }
}
