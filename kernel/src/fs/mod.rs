//! Virtual Filesystem (VFS) Layer
//!
//! Provides a unified interface for different filesystem implementations.

#![allow(clippy::should_implement_trait)]

use alloc::{format, string::String, sync::Arc, vec, vec::Vec};

use spin::RwLock;

#[cfg(target_arch = "aarch64")]
pub mod bare_lock;
pub mod dentry;
pub mod devfs;
pub mod file;
pub mod pipe;
pub mod procfs;
pub mod pty;
pub mod ramfs;
pub mod tar;

pub use dentry::{Dentry, Inode, MountTable, Superblock};
pub use file::{File, FileDescriptor, FileTable, OpenFlags, SeekFrom};

/// Maximum path length
pub const PATH_MAX: usize = 4096;

/// Maximum filename length
pub const NAME_MAX: usize = 255;

/// Filesystem node types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    File,
    Directory,
    CharDevice,
    BlockDevice,
    Pipe,
    Socket,
    Symlink,
}

/// File permissions (Unix-style)
#[derive(Debug, Clone, Copy)]
pub struct Permissions {
    pub owner_read: bool,
    pub owner_write: bool,
    pub owner_exec: bool,
    pub group_read: bool,
    pub group_write: bool,
    pub group_exec: bool,
    pub other_read: bool,
    pub other_write: bool,
    pub other_exec: bool,
}

impl Permissions {
    /// Create default permissions (rwxr-xr-x)
    pub fn default() -> Self {
        Self {
            owner_read: true,
            owner_write: true,
            owner_exec: true,
            group_read: true,
            group_write: false,
            group_exec: true,
            other_read: true,
            other_write: false,
            other_exec: true,
        }
    }

    /// Create read-only permissions
    pub fn read_only() -> Self {
        Self {
            owner_read: true,
            owner_write: false,
            owner_exec: false,
            group_read: true,
            group_write: false,
            group_exec: false,
            other_read: true,
            other_write: false,
            other_exec: false,
        }
    }

    /// Create permissions from Unix mode bits
    pub fn from_mode(mode: u32) -> Self {
        Self {
            owner_read: (mode & 0o400) != 0,
            owner_write: (mode & 0o200) != 0,
            owner_exec: (mode & 0o100) != 0,
            group_read: (mode & 0o040) != 0,
            group_write: (mode & 0o020) != 0,
            group_exec: (mode & 0o010) != 0,
            other_read: (mode & 0o004) != 0,
            other_write: (mode & 0o002) != 0,
            other_exec: (mode & 0o001) != 0,
        }
    }
}

/// File metadata
#[derive(Debug, Clone)]
pub struct Metadata {
    pub node_type: NodeType,
    pub size: usize,
    pub permissions: Permissions,
    pub uid: u32,
    pub gid: u32,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
}

/// Directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub node_type: NodeType,
    pub inode: u64,
}

/// VFS node operations trait
pub trait VfsNode: Send + Sync {
    /// Node type query (also serves as vtable slot padding for AArch64)
    fn node_type(&self) -> NodeType;

    /// Read data from the node
    fn read(&self, offset: usize, buffer: &mut [u8]) -> Result<usize, &'static str>;

    /// Write data to the node
    fn write(&self, offset: usize, data: &[u8]) -> Result<usize, &'static str>;

    /// Get metadata for the node
    fn metadata(&self) -> Result<Metadata, &'static str>;

    /// List directory entries (if this is a directory)
    fn readdir(&self) -> Result<Vec<DirEntry>, &'static str>;

    /// Look up a child node by name (if this is a directory)
    fn lookup(&self, name: &str) -> Result<Arc<dyn VfsNode>, &'static str>;

    /// Create a new file in this directory
    fn create(
        &self,
        name: &str,
        permissions: Permissions,
    ) -> Result<Arc<dyn VfsNode>, &'static str>;

    /// Create a new directory in this directory
    fn mkdir(&self, name: &str, permissions: Permissions)
        -> Result<Arc<dyn VfsNode>, &'static str>;

    /// Remove a file or empty directory
    fn unlink(&self, name: &str) -> Result<(), &'static str>;

    /// Truncate the file to the specified size
    fn truncate(&self, size: usize) -> Result<(), &'static str>;

    /// Resolve a symlink's target path. Nodes that are not symlinks can
    /// leave this at its default.
    fn readlink(&self) -> Result<String, &'static str> {
        Err("EINVAL: not a symbolic link")
    }

    /// Fetch the page at `pgoff` for file-backed mmap/page-cache use.
    /// Nodes with no notion of pages (devices, pipes) can leave this at
    /// its default.
    fn getpage(&self, pgoff: usize, buf: &mut [u8]) -> Result<usize, &'static str> {
        self.read(pgoff * crate::mm::PAGE_SIZE, buf)
    }

    /// Write back the page at `pgoff` for page-cache flush. Mirrors
    /// [`getpage`](Self::getpage); nodes with no notion of pages can leave
    /// this at its default.
    fn writepage(&self, pgoff: usize, buf: &[u8]) -> Result<usize, &'static str> {
        self.write(pgoff * crate::mm::PAGE_SIZE, buf)
    }
}

/// Filesystem trait
pub trait Filesystem: Send + Sync {
    /// Get the root node of the filesystem
    fn root(&self) -> Arc<dyn VfsNode>;

    /// Get filesystem name
    fn name(&self) -> &str;

    /// Check if filesystem is read-only
    fn is_readonly(&self) -> bool;

    /// Sync filesystem to disk
    fn sync(&self) -> Result<(), &'static str>;
}

/// Mount point information
pub struct MountPoint {
    pub path: String,
    pub filesystem: Arc<dyn Filesystem>,
}

/// Split a path into its parent directory and final component. Used by
/// every call that creates or removes an entry (`mkdir`, `unlink`,
/// `create_file`).
fn split_path(path: &str) -> Result<(&str, &str), &'static str> {
    match path.rfind('/') {
        Some(0) => Ok(("/", &path[1..])),
        Some(pos) => Ok((&path[..pos], &path[pos + 1..])),
        None => Err("EINVAL: relative path has no parent"),
    }
}

/// Virtual Filesystem Manager: the dentry tree rooted at the mounted root
/// filesystem, plus the mount table consulted on every path-walk step
/// (see `fs::dentry`).
pub struct Vfs {
    /// Root filesystem's superblock, once mounted.
    root: Option<Arc<Superblock>>,

    /// Mountpoint dentry -> mounted superblock.
    mounts: MountTable,

    /// Fallback current working directory, used only when a caller
    /// resolves a relative path directly against the global VFS rather
    /// than through its own `process::cwd::ProcessCwd` (per-process state
    /// normally supplies an already-absolute path).
    cwd: String,
}

impl Vfs {
    /// Create a new VFS instance
    pub fn new() -> Self {
        Self {
            root: None,
            mounts: MountTable::new(),
            cwd: String::from("/"),
        }
    }

    fn root_sb(&self) -> Result<&Arc<Superblock>, &'static str> {
        self.root.as_ref().ok_or("Root filesystem not mounted")
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Mount the root filesystem
    pub fn mount_root(&mut self, fs: Arc<dyn Filesystem>) -> Result<(), &'static str> {
        if self.root.is_some() {
            return Err("Root filesystem already mounted");
        }
        self.root = Some(dentry::mount_superblock(fs));
        Ok(())
    }

    /// Mount a filesystem at the specified path
    pub fn mount(&mut self, path: String, fs: Arc<dyn Filesystem>) -> Result<(), &'static str> {
        let (mountpoint, _) = self.resolve_dentry_with_sb(&path)?;
        let sb = dentry::mount_superblock(fs);
        self.mounts.mount(&mountpoint, sb)
    }

    /// Mount a filesystem by type at the specified path
    pub fn mount_by_type(
        &mut self,
        path: &str,
        fs_type: &str,
        _flags: u32,
    ) -> Result<(), &'static str> {
        let fs: Arc<dyn Filesystem> = match fs_type {
            "ramfs" => Arc::new(ramfs::RamFs::new()),
            "devfs" => Arc::new(devfs::DevFs::new()),
            "procfs" => Arc::new(procfs::ProcFs::new()),
            _ => return Err("Unknown filesystem type"),
        };

        if path == "/" {
            self.mount_root(fs)
        } else {
            self.mount(path.into(), fs)
        }
    }

    /// Unmount a filesystem at the specified path
    pub fn unmount(&mut self, path: &str) -> Result<(), &'static str> {
        let (mountpoint, _) = self.resolve_dentry_with_sb(path)?;
        self.mounts.unmount(&mountpoint).map(|_| ())
    }

    /// Resolve `path` to the dentry (and owning superblock) it names,
    /// crossing mounts and resolving `.`/`..`/symlinks along the way (see
    /// `dentry::walk_with_superblock`). Relative paths are joined against
    /// the VFS-wide fallback CWD first.
    pub fn resolve_dentry_with_sb(
        &self,
        path: &str,
    ) -> Result<(Arc<Dentry>, Arc<Superblock>), &'static str> {
        let sb = self.root_sb()?;
        let root = sb.root().clone();
        let path = if path.starts_with('/') {
            String::from(path)
        } else {
            format!("{}/{}", self.cwd, path)
        };
        dentry::walk_with_superblock(&root, sb, &self.mounts, &root, sb, &path)
    }

    /// Resolve `path` to the dentry it names.
    pub fn resolve_dentry(&self, path: &str) -> Result<Arc<Dentry>, &'static str> {
        self.resolve_dentry_with_sb(path).map(|(d, _)| d)
    }

    /// Resolve a path to a VFS node
    pub fn resolve_path(&self, path: &str) -> Result<Arc<dyn VfsNode>, &'static str> {
        let dentry = self.resolve_dentry(path)?;
        let inode = dentry.inode().ok_or("ENOENT: dangling dentry")?;
        Ok(inode.ops().clone())
    }

    /// Get current working directory
    pub fn get_cwd(&self) -> &str {
        &self.cwd
    }

    /// Set current working directory
    pub fn set_cwd(&mut self, path: String) -> Result<(), &'static str> {
        // Verify the path exists and is a directory
        let node = self.resolve_path(&path)?;
        let metadata = node.metadata()?;

        if metadata.node_type != NodeType::Directory {
            return Err("Not a directory");
        }

        self.cwd = path;
        Ok(())
    }

    /// Open a file
    pub fn open(&self, path: &str, _flags: OpenFlags) -> Result<Arc<dyn VfsNode>, &'static str> {
        self.resolve_path(path)
    }

    /// Create a regular file, registering it in the dentry cache.
    pub fn create_file(
        &self,
        path: &str,
        permissions: Permissions,
    ) -> Result<Arc<dyn VfsNode>, &'static str> {
        let (parent_path, name) = split_path(path)?;
        let (parent, sb) = self.resolve_dentry_with_sb(parent_path)?;
        let child = dentry::create_child(&parent, &sb, name, permissions, false)?;
        Ok(child.inode().ok_or("internal error: fresh dentry has no inode")?.ops().clone())
    }

    /// Create a directory
    pub fn mkdir(&self, path: &str, permissions: Permissions) -> Result<(), &'static str> {
        let (parent_path, name) = split_path(path)?;
        let (parent, sb) = self.resolve_dentry_with_sb(parent_path)?;
        dentry::create_child(&parent, &sb, name, permissions, true)?;
        Ok(())
    }

    /// Remove a file or directory
    pub fn unlink(&self, path: &str) -> Result<(), &'static str> {
        let (parent_path, name) = split_path(path)?;
        let (parent, sb) = self.resolve_dentry_with_sb(parent_path)?;
        dentry::unlink_child(&parent, &sb, name)
    }

    /// List the directory entries at `path`.
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, &'static str> {
        let dentry = self.resolve_dentry(path)?;
        dentry::readdir(&dentry)
    }

    /// Sync all filesystems
    pub fn sync(&self) -> Result<(), &'static str> {
        if let Some(sb) = &self.root {
            sb.sync()?;
        }
        Ok(())
    }
}

/// Global VFS instance - using pointer pattern for all architectures
/// This avoids static mut Option issues and provides consistent behavior
static mut VFS_PTR: *mut RwLock<Vfs> = core::ptr::null_mut();

/// Get the VFS instance (unified for all architectures)
pub fn get_vfs() -> &'static RwLock<Vfs> {
    unsafe {
        let ptr = core::ptr::read_volatile(&raw const VFS_PTR);
        if ptr.is_null() {
            panic!("VFS not initialized");
        }
        &*ptr
    }
}

/// Try to get the VFS instance without panicking
pub fn try_get_vfs() -> Option<&'static RwLock<Vfs>> {
    unsafe {
        let ptr = core::ptr::read_volatile(&raw const VFS_PTR);
        if ptr.is_null() {
            None
        } else {
            Some(&*ptr)
        }
    }
}

/// Initialize the VFS with a RAM filesystem as root
pub fn init() {
    #[allow(unused_imports)]
    use crate::println;

    println!("[VFS] Initializing Virtual Filesystem...");

    unsafe {
        if !core::ptr::read_volatile(&raw const VFS_PTR).is_null() {
            println!("[VFS] WARNING: VFS already initialized! Skipping re-initialization.");
            return;
        }

        println!("[VFS] Creating VFS structure...");

        let vfs = Vfs::new();
        let vfs_lock = RwLock::new(vfs);
        let vfs_box = alloc::boxed::Box::new(vfs_lock);
        let ptr = alloc::boxed::Box::leak(vfs_box) as *mut RwLock<Vfs>;

        // Memory barriers before assignment
        #[cfg(target_arch = "aarch64")]
        core::arch::asm!("dsb sy", "isb", options(nostack, nomem, preserves_flags));
        #[cfg(target_arch = "riscv64")]
        core::arch::asm!("fence rw, rw", options(nostack, nomem, preserves_flags));

        core::ptr::write_volatile(&raw mut VFS_PTR, ptr);

        // Memory barriers after assignment
        #[cfg(target_arch = "aarch64")]
        core::arch::asm!("dsb sy", "isb", options(nostack, nomem, preserves_flags));
        #[cfg(target_arch = "riscv64")]
        core::arch::asm!("fence rw, rw", options(nostack, nomem, preserves_flags));

        println!("[VFS] VFS initialized successfully");
    }

    // Create and mount filesystems
    #[cfg(feature = "alloc")]
    {
        println!("[VFS] Creating RAM filesystem...");

        // Create a RAM filesystem as the root
        let ramfs = ramfs::RamFs::new();

        // Mount as root
        {
            let vfs = get_vfs();
            let mut vfs_guard = vfs.write();
            vfs_guard.mount_root(Arc::new(ramfs)).ok();
        }

        println!("[VFS] RAM filesystem mounted as root");

        // Create standard directories in root
        {
            let vfs = get_vfs();
            let vfs_guard = vfs.read();
            if let Ok(sb) = vfs_guard.root_sb() {
                let root_inode = sb.root().inode().expect("root dentry always has an inode");
                let root = root_inode.ops();
                root.mkdir("bin", Permissions::default()).ok();
                root.mkdir("boot", Permissions::default()).ok();
                root.mkdir("dev", Permissions::default()).ok();
                root.mkdir("etc", Permissions::default()).ok();
                root.mkdir("home", Permissions::default()).ok();
                root.mkdir("lib", Permissions::default()).ok();
                root.mkdir("mnt", Permissions::default()).ok();
                root.mkdir("opt", Permissions::default()).ok();
                root.mkdir("proc", Permissions::default()).ok();
                root.mkdir("root", Permissions::default()).ok();
                root.mkdir("sbin", Permissions::default()).ok();
                root.mkdir("sys", Permissions::default()).ok();
                root.mkdir("tmp", Permissions::default()).ok();
                root.mkdir("usr", Permissions::default()).ok();
                root.mkdir("var", Permissions::default()).ok();
            }
        }

        println!("[VFS] Created standard directories");

        // Create DevFS and mount at /dev
        println!("[VFS] Creating device filesystem...");
        let devfs = devfs::DevFs::new();

        {
            let vfs = get_vfs();
            let mut vfs_guard = vfs.write();
            vfs_guard.mount("/dev".into(), Arc::new(devfs)).ok();
        }

        println!("[VFS] Device filesystem mounted at /dev");

        // Create ProcFS and mount at /proc
        println!("[VFS] Creating process filesystem...");
        let procfs = procfs::ProcFs::new();

        {
            let vfs = get_vfs();
            let mut vfs_guard = vfs.write();
            vfs_guard.mount("/proc".into(), Arc::new(procfs)).ok();
        }

        println!("[VFS] Process filesystem mounted at /proc");

        crate::mm::demand_paging::set_file_backed_resolver(dentry::resolve_file_backed_page);

        println!("[VFS] Virtual Filesystem initialization complete");
    }

    #[cfg(not(feature = "alloc"))]
    {
        println!("[VFS] Skipping VFS initialization (no alloc)");
    }
}

/// Read the entire contents of a file into a Vec<u8>
///
/// This is a convenience function that opens a file, reads its entire
/// contents into memory, and returns the data as a byte vector.
///
/// # Arguments
/// * `path` - The filesystem path to the file
///
/// # Returns
/// * `Ok(Vec<u8>)` - The file contents on success
/// * `Err(&'static str)` - An error message on failure
pub fn read_file(path: &str) -> Result<Vec<u8>, &'static str> {
    let vfs = get_vfs().read();

    // Resolve the path to a VFS node
    let node = vfs.resolve_path(path)?;

    // Get file metadata to determine size
    let metadata = node.metadata()?;

    // Ensure it's a file, not a directory
    if metadata.node_type != NodeType::File {
        return Err("Not a file");
    }

    // Allocate buffer for file contents
    let size = metadata.size;
    let mut buffer = vec![0u8; size];

    // Read the entire file
    let bytes_read = node.read(0, &mut buffer)?;

    // Truncate to actual bytes read (in case file changed)
    buffer.truncate(bytes_read);

    Ok(buffer)
}

/// Write data to a file, creating it if it doesn't exist
///
/// # Arguments
/// * `path` - The filesystem path to the file
/// * `data` - The data to write
///
/// # Returns
/// * `Ok(usize)` - The number of bytes written on success
/// * `Err(&'static str)` - An error message on failure
pub fn write_file(path: &str, data: &[u8]) -> Result<usize, &'static str> {
    let vfs = get_vfs().read();

    // Try to resolve the path first
    let node = match vfs.resolve_path(path) {
        Ok(node) => node,
        Err(_) => {
            // File doesn't exist, try to create it
            // Split path into parent directory and filename
            let (parent_path, filename) = if let Some(pos) = path.rfind('/') {
                if pos == 0 {
                    ("/", &path[1..])
                } else {
                    (&path[..pos], &path[pos + 1..])
                }
            } else {
                return Err("Invalid path");
            };

            // Get parent directory
            let parent = vfs.resolve_path(parent_path)?;

            // Create the file
            parent.create(filename, Permissions::default())?
        }
    };

    // Truncate the file first
    node.truncate(0)?;

    // Write the data
    node.write(0, data)
}

/// Check if a file exists
pub fn file_exists(path: &str) -> bool {
    let vfs = get_vfs().read();
    vfs.resolve_path(path).is_ok()
}

/// Get file size without reading contents
pub fn file_size(path: &str) -> Result<usize, &'static str> {
    let vfs = get_vfs().read();
    let node = vfs.resolve_path(path)?;
    let metadata = node.metadata()?;
    Ok(metadata.size)
}

/// Copy a file from one location to another
pub fn copy_file(src_path: &str, dst_path: &str) -> Result<usize, &'static str> {
    let data = read_file(src_path)?;
    write_file(dst_path, &data)
}

/// Append data to a file
pub fn append_file(path: &str, data: &[u8]) -> Result<usize, &'static str> {
    let vfs = get_vfs().read();
    let node = vfs.resolve_path(path)?;
    let metadata = node.metadata()?;
    let current_size = metadata.size;

    // Write at the end of the file
    node.write(current_size, data)
}
