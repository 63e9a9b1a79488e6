//! System call interface for MOS
//!
//! Provides the kernel-side implementation of system calls including IPC
//! operations.

#![allow(dead_code)]

use crate::ipc::IpcError;

mod arch_prctl;
mod debug;
mod filesystem;
mod futex;
mod info;
mod ipc;
mod memory;
mod process;
mod pty;
mod signal;
mod thread_clone;
mod time;
mod userspace;

use arch_prctl::*;
use debug::*;
use filesystem::*;
use futex::*;
use info::*;
use ipc::*;
use memory::*;
use process::*;
use pty::*;
use signal::*;
use thread_clone::*;
use time::*;
pub use userspace::*;

/// System call numbers
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    // IPC system calls
    IpcServerCreate = 0,
    IpcConnect = 1,
    IpcAccept = 2,
    IpcRead = 3,
    IpcWrite = 4,
    IpcClose = 5,
    IpcShareMemory = 6,
    IpcMapMemory = 7,

    // Process management
    ProcessYield = 10,
    ProcessExit = 11,
    ProcessFork = 12,
    ProcessExec = 13,
    ProcessWait = 14,
    ProcessGetPid = 15,
    ProcessGetPPid = 16,
    ProcessSetPriority = 17,
    ProcessGetPriority = 18,

    // Thread management
    ThreadCreate = 40,
    ThreadExit = 41,
    ThreadJoin = 42,
    ThreadGetTid = 43,
    ThreadSetAffinity = 44,
    ThreadGetAffinity = 45,

    // Memory management
    MemoryMap = 20,
    MemoryUnmap = 21,
    MemoryProtect = 22,
    MemoryBrk = 23,

    // Capability management
    CapabilityGrant = 30,
    CapabilityRevoke = 31,

    // Filesystem
    FsOpen = 50,
    FsClose = 51,
    FsRead = 52,
    FsWrite = 53,
    FsSeek = 54,
    FsStat = 55,
    FsTruncate = 56,
    FsMkdir = 57,
    FsRmdir = 58,
    FsMount = 59,
    FsUnmount = 60,
    FsSync = 61,

    // Futex
    FutexWait = 70,
    FutexWake = 71,
    FutexDispatch = 72,
    FutexWakeOp = 73,
    FutexRequeue = 74,

    // Thread clone (combined fork/pthread_create style entry point)
    ThreadCloneRaw = 75,

    // Time
    TimeGetUptime = 100,
    TimeCreateTimer = 101,
    TimeCancelTimer = 102,

    // Signals
    SigAction = 120,
    SigProcMask = 121,
    SigSuspend = 122,
    SigReturn = 123,

    // Debug / tracing
    Ptrace = 140,

    // Kernel info
    GetKernelInfo = 110,
    Uname = 111,

    // Architecture-specific thread-local storage control
    ArchPrctl = 95,

    // PTY
    OpenPty = 280,
    GrantPty = 281,
    UnlockPty = 282,
    PtsName = 283,
}

/// System call result type
pub type SyscallResult = Result<usize, SyscallError>;

/// System call error codes
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidArgument = -2,
    PermissionDenied = -3,
    ResourceNotFound = -4,
    OutOfMemory = -5,
    WouldBlock = -6,
    Interrupted = -7,
    InvalidPointer = -8,
    InvalidState = -9,
    BadFileDescriptor = -10,
    NotATerminal = -11,
    ProcessNotFound = -12,
    BrokenPipe = -13,
}

impl From<IpcError> for SyscallError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::InvalidCapability => SyscallError::PermissionDenied,
            IpcError::ProcessNotFound => SyscallError::ResourceNotFound,
            IpcError::EndpointNotFound => SyscallError::BadFileDescriptor,
            IpcError::ServerNotFound => SyscallError::ResourceNotFound,
            IpcError::NameInUse => SyscallError::ResourceNotFound,
            IpcError::OutOfMemory => SyscallError::OutOfMemory,
            IpcError::WouldBlock => SyscallError::WouldBlock,
            IpcError::PermissionDenied => SyscallError::PermissionDenied,
            IpcError::BrokenPipe => SyscallError::BrokenPipe,
            _ => SyscallError::InvalidArgument,
        }
    }
}

/// System call handler entry point
#[no_mangle]
pub extern "C" fn syscall_handler(
    syscall_num: usize,
    arg1: usize,
    arg2: usize,
    arg3: usize,
    arg4: usize,
    arg5: usize,
) -> isize {
    let result = match Syscall::try_from(syscall_num) {
        Ok(syscall) => handle_syscall(syscall, arg1, arg2, arg3, arg4, arg5),
        Err(_) => Err(SyscallError::InvalidSyscall),
    };

    match result {
        Ok(value) => value as isize,
        Err(error) => error as i32 as isize,
    }
}

/// Handle individual system calls
fn handle_syscall(
    syscall: Syscall,
    arg1: usize,
    arg2: usize,
    arg3: usize,
    arg4: usize,
    arg5: usize,
) -> SyscallResult {
    match syscall {
        // IPC system calls
        Syscall::IpcServerCreate => sys_ipc_server_create(arg1, arg2, arg3),
        Syscall::IpcConnect => sys_ipc_connect(arg1, arg2),
        Syscall::IpcAccept => sys_ipc_accept(arg1),
        Syscall::IpcRead => sys_ipc_read(arg1, arg2, arg3),
        Syscall::IpcWrite => sys_ipc_write(arg1, arg2, arg3),
        Syscall::IpcClose => sys_ipc_close(arg1),

        // Process management
        Syscall::ProcessYield => sys_yield(),
        Syscall::ProcessExit => sys_exit(arg1),
        Syscall::ProcessFork => sys_fork(),
        Syscall::ProcessExec => sys_exec(arg1, arg2, arg3),
        Syscall::ProcessWait => sys_wait(arg1 as isize, arg2, arg3),
        Syscall::ProcessGetPid => sys_getpid(),
        Syscall::ProcessGetPPid => sys_getppid(),
        Syscall::ProcessSetPriority => sys_setpriority(arg1, arg2, arg3),
        Syscall::ProcessGetPriority => sys_getpriority(arg1, arg2),

        // Thread management
        Syscall::ThreadCreate => sys_thread_create(arg1, arg2, arg3, arg4),
        Syscall::ThreadExit => sys_thread_exit(arg1),
        Syscall::ThreadJoin => sys_thread_join(arg1, arg2),
        Syscall::ThreadGetTid => sys_gettid(),
        Syscall::ThreadSetAffinity => sys_thread_setaffinity(arg1, arg2, arg3),
        Syscall::ThreadGetAffinity => sys_thread_getaffinity(arg1, arg2, arg3),

        // Memory management
        Syscall::MemoryMap => sys_mmap(arg1, arg2, arg3, arg4, arg5),
        Syscall::MemoryUnmap => sys_munmap(arg1, arg2),
        Syscall::MemoryProtect => sys_mprotect(arg1, arg2, arg3),
        Syscall::MemoryBrk => sys_brk(arg1),

        // Filesystem
        Syscall::FsOpen => sys_open(arg1, arg2, arg3),
        Syscall::FsClose => sys_close(arg1),
        Syscall::FsRead => sys_read(arg1, arg2, arg3),
        Syscall::FsWrite => sys_write(arg1, arg2, arg3),
        Syscall::FsSeek => sys_seek(arg1, arg2 as isize, arg3),
        Syscall::FsStat => sys_stat(arg1, arg2),
        Syscall::FsTruncate => sys_truncate(arg1, arg2),
        Syscall::FsMkdir => sys_mkdir(arg1, arg2),
        Syscall::FsRmdir => sys_rmdir(arg1),
        Syscall::FsMount => sys_mount(arg1, arg2, arg3, arg4),
        Syscall::FsUnmount => sys_unmount(arg1),
        Syscall::FsSync => sys_sync(),

        // Futex
        Syscall::FutexWait => sys_futex_wait(arg1, arg2 as u32, arg3, arg4, arg5).map(|v| v as usize),
        Syscall::FutexWake => sys_futex_wake(arg1, arg2, arg3).map(|v| v as usize),
        Syscall::FutexDispatch => {
            sys_futex_dispatch(arg1, arg2, arg3, arg4, arg5).map(|v| v as usize)
        }
        Syscall::FutexWakeOp => {
            sys_futex_wake_op(arg1, arg2, arg3, arg4, arg5).map(|v| v as usize)
        }
        Syscall::FutexRequeue => sys_futex_requeue(arg1, arg2, arg3, arg4).map(|v| v as usize),

        // Thread clone
        Syscall::ThreadCloneRaw => sys_thread_clone(arg1, arg2, arg3, arg4, arg5),

        // Time
        Syscall::TimeGetUptime => sys_time_get_uptime(),
        Syscall::TimeCreateTimer => sys_time_create_timer(arg1, arg2, arg3),
        Syscall::TimeCancelTimer => sys_time_cancel_timer(arg1),

        // Signals
        Syscall::SigAction => sys_sigaction(arg1, arg2, arg3),
        Syscall::SigProcMask => sys_sigprocmask(arg1, arg2, arg3),
        Syscall::SigSuspend => sys_sigsuspend(arg1),
        Syscall::SigReturn => sys_sigreturn(arg1),

        // Debug / tracing
        Syscall::Ptrace => sys_ptrace(arg1, arg2, arg3, arg4),

        // Kernel info
        Syscall::GetKernelInfo => sys_get_kernel_info(arg1),
        Syscall::Uname => sys_uname(arg1),

        // Architecture-specific TLS control
        Syscall::ArchPrctl => sys_arch_prctl(arg1, arg2).map(|v| v as usize),

        // PTY
        Syscall::OpenPty => sys_openpty(arg1, arg2),
        Syscall::GrantPty => sys_grantpt(arg1),
        Syscall::UnlockPty => sys_unlockpt(arg1),
        Syscall::PtsName => sys_ptsname(arg1, arg2, arg3),

        _ => Err(SyscallError::InvalidSyscall),
    }
}

/// Yield CPU to another process
fn sys_yield() -> SyscallResult {
    crate::sched::reschedule();
    Ok(0)
}

impl TryFrom<usize> for Syscall {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            // IPC system calls
            0 => Ok(Syscall::IpcServerCreate),
            1 => Ok(Syscall::IpcConnect),
            2 => Ok(Syscall::IpcAccept),
            3 => Ok(Syscall::IpcRead),
            4 => Ok(Syscall::IpcWrite),
            5 => Ok(Syscall::IpcClose),
            6 => Ok(Syscall::IpcShareMemory),
            7 => Ok(Syscall::IpcMapMemory),

            // Process management
            10 => Ok(Syscall::ProcessYield),
            11 => Ok(Syscall::ProcessExit),
            12 => Ok(Syscall::ProcessFork),
            13 => Ok(Syscall::ProcessExec),
            14 => Ok(Syscall::ProcessWait),
            15 => Ok(Syscall::ProcessGetPid),
            16 => Ok(Syscall::ProcessGetPPid),
            17 => Ok(Syscall::ProcessSetPriority),
            18 => Ok(Syscall::ProcessGetPriority),

            // Memory management
            20 => Ok(Syscall::MemoryMap),
            21 => Ok(Syscall::MemoryUnmap),
            22 => Ok(Syscall::MemoryProtect),
            23 => Ok(Syscall::MemoryBrk),

            // Capability management
            30 => Ok(Syscall::CapabilityGrant),
            31 => Ok(Syscall::CapabilityRevoke),

            // Thread management
            40 => Ok(Syscall::ThreadCreate),
            41 => Ok(Syscall::ThreadExit),
            42 => Ok(Syscall::ThreadJoin),
            43 => Ok(Syscall::ThreadGetTid),
            44 => Ok(Syscall::ThreadSetAffinity),
            45 => Ok(Syscall::ThreadGetAffinity),

            // Filesystem
            50 => Ok(Syscall::FsOpen),
            51 => Ok(Syscall::FsClose),
            52 => Ok(Syscall::FsRead),
            53 => Ok(Syscall::FsWrite),
            54 => Ok(Syscall::FsSeek),
            55 => Ok(Syscall::FsStat),
            56 => Ok(Syscall::FsTruncate),
            57 => Ok(Syscall::FsMkdir),
            58 => Ok(Syscall::FsRmdir),
            59 => Ok(Syscall::FsMount),
            60 => Ok(Syscall::FsUnmount),
            61 => Ok(Syscall::FsSync),

            // Futex
            70 => Ok(Syscall::FutexWait),
            71 => Ok(Syscall::FutexWake),
            72 => Ok(Syscall::FutexDispatch),
            73 => Ok(Syscall::FutexWakeOp),
            74 => Ok(Syscall::FutexRequeue),

            // Thread clone
            75 => Ok(Syscall::ThreadCloneRaw),

            // Architecture-specific TLS control
            95 => Ok(Syscall::ArchPrctl),

            // Time
            100 => Ok(Syscall::TimeGetUptime),
            101 => Ok(Syscall::TimeCreateTimer),
            102 => Ok(Syscall::TimeCancelTimer),

            // Kernel info
            110 => Ok(Syscall::GetKernelInfo),
            111 => Ok(Syscall::Uname),

            // Signals
            120 => Ok(Syscall::SigAction),
            121 => Ok(Syscall::SigProcMask),
            122 => Ok(Syscall::SigSuspend),
            123 => Ok(Syscall::SigReturn),

            // Debug / tracing
            140 => Ok(Syscall::Ptrace),

            // PTY
            280 => Ok(Syscall::OpenPty),
            281 => Ok(Syscall::GrantPty),
            282 => Ok(Syscall::UnlockPty),
            283 => Ok(Syscall::PtsName),

            _ => Err(()),
        }
    }
}
