//! Process Control Block (PCB) implementation
//!
//! The PCB is the core data structure representing a process in the kernel.
//! It contains all the information needed to manage a process.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::{
    collections::BTreeMap,
    string::String,
    vec::Vec,
};

use spin::Mutex;

use crate::{ipc::IpcTable, mm::VirtualAddressSpace};

use super::{
    thread::{Thread, ThreadId},
    ProcessState,
};

#[cfg(feature = "alloc")]
use crate::fs::file::FileTable;

/// Process ID type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl core::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is being created
    Creating = 0,
    /// Process is ready to run
    Ready = 1,
    /// Process is currently running
    Running = 2,
    /// Process is blocked waiting
    Blocked = 3,
    /// Process is sleeping
    Sleeping = 4,
    /// Process has exited but not yet reaped
    Zombie = 5,
    /// Process has been terminated
    Dead = 6,
}

/// Process priority
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessPriority {
    /// Real-time priority (highest)
    RealTime = 0,
    /// System priority
    System = 1,
    /// Normal user priority
    Normal = 2,
    /// Low priority
    Low = 3,
    /// Idle priority (lowest)
    Idle = 4,
}

/// Process Control Block
pub struct Process {
    /// Process ID
    pub pid: ProcessId,
    
    /// Parent process ID (None for init)
    pub parent: Option<ProcessId>,
    
    /// Process name
    #[cfg(feature = "alloc")]
    pub name: String,
    
    /// Process state
    pub state: AtomicU32,
    
    /// Priority
    pub priority: ProcessPriority,
    
    /// Virtual address space
    pub memory_space: Mutex<VirtualAddressSpace>,
    
    /// Threads in this process
    #[cfg(feature = "alloc")]
    pub threads: Mutex<BTreeMap<ThreadId, Thread>>,

    /// IPC handles owned by this process (listening servers and accepted/
    /// connected channels), addressed by a small integer descriptor id.
    #[cfg(feature = "alloc")]
    pub ipc_table: IpcTable,
    
    /// Child processes
    #[cfg(feature = "alloc")]
    pub children: Mutex<Vec<ProcessId>>,
    
    /// Exit code (set when process exits)
    pub exit_code: AtomicU32,
    
    /// CPU time used (in microseconds)
    pub cpu_time: AtomicU64,
    
    /// Memory usage statistics
    pub memory_stats: MemoryStats,

    /// Creation timestamp
    pub created_at: u64,

    /// User ID (for future use)
    pub uid: u32,

    /// Group ID (for future use)
    pub gid: u32,

    /// Open file descriptor table
    #[cfg(feature = "alloc")]
    pub file_table: Mutex<FileTable>,

    /// Environment variables (inherited across fork, replaced on exec)
    #[cfg(feature = "alloc")]
    pub env_vars: Mutex<BTreeMap<String, String>>,

    /// Process group ID
    pub pgid: AtomicU64,

    /// Session ID
    pub sid: AtomicU64,

    /// Signals currently blocked from delivery (bit N = signal N)
    pub signal_mask: AtomicU64,

    /// Signals delivered but not yet handled (bit N = signal N)
    pending_signals: AtomicU64,

    /// Installed handler addresses, indexed by signal number (0 = SIG_DFL)
    signal_handlers: [AtomicU64; 32],
}

/// Memory usage statistics
#[derive(Debug, Default)]
pub struct MemoryStats {
    /// Virtual memory size (bytes)
    pub virtual_size: AtomicU64,
    /// Resident set size (bytes)
    pub resident_size: AtomicU64,
    /// Shared memory size (bytes)
    pub shared_size: AtomicU64,
}

impl Process {
    /// Create a new process
    #[cfg(feature = "alloc")]
    pub fn new(
        pid: ProcessId,
        parent: Option<ProcessId>,
        name: String,
        priority: ProcessPriority,
    ) -> Self {
        Self {
            pid,
            parent,
            name,
            state: AtomicU32::new(ProcessState::Creating as u32),
            priority,
            memory_space: Mutex::new(VirtualAddressSpace::new()),
            threads: Mutex::new(BTreeMap::new()),
            ipc_table: IpcTable::new(),
            children: Mutex::new(Vec::new()),
            exit_code: AtomicU32::new(0),
            cpu_time: AtomicU64::new(0),
            memory_stats: MemoryStats::default(),
            created_at: crate::arch::time::get_ticks(),
            uid: 0,
            gid: 0,
            file_table: Mutex::new(FileTable::new()),
            env_vars: Mutex::new(BTreeMap::new()),
            pgid: AtomicU64::new(pid.0),
            sid: AtomicU64::new(pid.0),
            signal_mask: AtomicU64::new(0),
            pending_signals: AtomicU64::new(0),
            signal_handlers: core::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
    
    /// Get process state
    pub fn get_state(&self) -> ProcessState {
        match self.state.load(Ordering::Acquire) {
            0 => ProcessState::Creating,
            1 => ProcessState::Ready,
            2 => ProcessState::Running,
            3 => ProcessState::Blocked,
            4 => ProcessState::Sleeping,
            5 => ProcessState::Zombie,
            6 => ProcessState::Dead,
            _ => ProcessState::Dead,
        }
    }
    
    /// Set process state
    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state as u32, Ordering::Release);
    }
    
    /// Add a thread to this process
    #[cfg(feature = "alloc")]
    pub fn add_thread(&self, thread: Thread) -> Result<(), &'static str> {
        let tid = thread.tid;
        let mut threads = self.threads.lock();
        
        if threads.len() >= super::MAX_THREADS_PER_PROCESS {
            return Err("Too many threads in process");
        }
        
        if threads.contains_key(&tid) {
            return Err("Thread ID already exists");
        }
        
        threads.insert(tid, thread);
        Ok(())
    }
    
    /// Remove a thread from this process
    #[cfg(feature = "alloc")]
    pub fn remove_thread(&self, tid: ThreadId) -> Option<Thread> {
        self.threads.lock().remove(&tid)
    }
    
    /// Get a thread by ID
    #[cfg(feature = "alloc")]
    pub fn get_thread(&self, tid: ThreadId) -> Option<&Thread> {
        // This is a bit tricky - we need to return a reference that outlives the lock
        // In a real implementation, we'd use more sophisticated synchronization
        unsafe {
            let threads = self.threads.lock();
            threads.get(&tid).map(|t| &*(t as *const Thread))
        }
    }
    
    /// Get number of threads
    #[cfg(feature = "alloc")]
    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// CPUs currently running one of this process's threads -- the set a TLB
    /// shootdown for this address space must reach.
    #[cfg(feature = "alloc")]
    pub fn running_cpus(&self) -> Vec<u8> {
        self.threads
            .lock()
            .values()
            .filter_map(|t| t.current_cpu.load(Ordering::Acquire).try_into().ok())
            .collect()
    }
    
    /// Check if process is alive
    pub fn is_alive(&self) -> bool {
        match self.get_state() {
            ProcessState::Dead | ProcessState::Zombie => false,
            _ => true,
        }
    }
    
    /// Update CPU time
    pub fn add_cpu_time(&self, microseconds: u64) {
        self.cpu_time.fetch_add(microseconds, Ordering::Relaxed);
    }
    
    /// Get total CPU time
    pub fn get_cpu_time(&self) -> u64 {
        self.cpu_time.load(Ordering::Relaxed)
    }
    
    /// Set exit code
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code as u32, Ordering::Release);
    }
    
    /// Get exit code
    pub fn get_exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::Acquire) as i32
    }

    /// Get mutable access to the process's virtual address space.
    ///
    /// Requires exclusive access to the process (see `table::get_process_mut`),
    /// used by the loader before the process is visible to other threads.
    pub fn memory_space_mut(&mut self) -> Option<&mut VirtualAddressSpace> {
        Some(self.memory_space.get_mut())
    }

    /// Get mutable access to the first (lowest-tid) thread, conventionally the
    /// main thread created at process creation time.
    #[cfg(feature = "alloc")]
    pub fn get_main_thread_mut(&mut self) -> Option<&mut Thread> {
        self.threads.get_mut().values_mut().next()
    }

    /// Rename the process (used by exec to reflect the new program image).
    #[cfg(feature = "alloc")]
    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Queue a signal for delivery to this process.
    ///
    /// SIGKILL and SIGSTOP always take effect; masking only affects whether
    /// `get_next_pending_signal` will hand the signal back to the caller.
    pub fn send_signal(&self, signum: usize) -> Result<(), &'static str> {
        if signum == 0 || signum > 31 {
            return Err("Invalid signal number");
        }
        self.pending_signals
            .fetch_or(1u64 << signum, Ordering::Release);
        Ok(())
    }

    /// Look up the handler address installed for a signal.
    ///
    /// Returns `Some(0)` (SIG_DFL) for signals that have never had a handler
    /// installed, `Some(1)` (SIG_IGN) if the process has chosen to ignore it.
    pub fn get_signal_handler(&self, signum: usize) -> Option<u64> {
        if signum == 0 || signum > 31 {
            return None;
        }
        Some(self.signal_handlers[signum].load(Ordering::Acquire))
    }

    /// Install a handler address (or SIG_DFL/SIG_IGN) for a signal.
    pub fn set_signal_handler(&self, signum: usize, handler: u64) -> Result<(), &'static str> {
        if signum == 0 || signum > 31 {
            return Err("Invalid signal number");
        }
        self.signal_handlers[signum].store(handler, Ordering::Release);
        Ok(())
    }

    /// Reset all installed handlers to SIG_DFL (used by exec).
    pub fn reset_signal_handlers(&self) {
        for handler in self.signal_handlers.iter() {
            handler.store(0, Ordering::Release);
        }
    }

    /// Clear a signal from the pending set (it is about to be, or has been,
    /// handled).
    pub fn clear_pending_signal(&self, signum: usize) {
        if signum == 0 || signum > 31 {
            return;
        }
        self.pending_signals
            .fetch_and(!(1u64 << signum), Ordering::Release);
    }

    /// Return the lowest-numbered pending signal that is not currently
    /// blocked by the signal mask, if any.
    pub fn get_next_pending_signal(&self) -> Option<usize> {
        let pending = self.pending_signals.load(Ordering::Acquire)
            & !self.signal_mask.load(Ordering::Acquire);
        if pending == 0 {
            None
        } else {
            Some(pending.trailing_zeros() as usize)
        }
    }

    /// Get the current signal mask.
    pub fn get_signal_mask(&self) -> u64 {
        self.signal_mask.load(Ordering::Acquire)
    }

    /// Replace the signal mask wholesale.
    pub fn set_signal_mask(&self, mask: u64) {
        self.signal_mask.store(mask, Ordering::Release);
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        println!("[PROCESS] Dropping process {}", self.pid.0);
        // Cleanup will be handled by the process lifecycle manager
    }
}

/// Process builder for convenient process creation
#[cfg(feature = "alloc")]
pub struct ProcessBuilder {
    name: String,
    parent: Option<ProcessId>,
    priority: ProcessPriority,
    uid: u32,
    gid: u32,
}

#[cfg(feature = "alloc")]
impl ProcessBuilder {
    /// Create a new process builder
    pub fn new(name: String) -> Self {
        Self {
            name,
            parent: None,
            priority: ProcessPriority::Normal,
            uid: 0,
            gid: 0,
        }
    }
    
    /// Set parent process
    pub fn parent(mut self, pid: ProcessId) -> Self {
        self.parent = Some(pid);
        self
    }
    
    /// Set priority
    pub fn priority(mut self, priority: ProcessPriority) -> Self {
        self.priority = priority;
        self
    }
    
    /// Set user ID
    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }
    
    /// Set group ID
    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self
    }
    
    /// Build the process
    pub fn build(self) -> Process {
        let pid = super::alloc_pid();
        let mut process = Process::new(pid, self.parent, self.name, self.priority);
        process.uid = self.uid;
        process.gid = self.gid;
        process
    }
}