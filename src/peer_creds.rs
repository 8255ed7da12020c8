//! The Peer-Credential Resolver: PID/UID/GID of the process on the other
//! end of a local (Unix-domain) socket.
//!
//! Grounded on the `getsockopt`-over-raw-fd shape this codebase already
//! uses for low-level socket configuration (see `server/http_server.rs`'s
//! `socket2::Socket` setup); here the syscall is `SO_PEERCRED` on Linux and
//! `LOCAL_PEERCRED` on the BSDs/macOS, both exposed behind one
//! [`PeerCreds`] trait so call sites never branch on platform.
//!
//! TCP connections, and any platform without a kernel peer-credential
//! facility, always resolve to [`PeerCredsError::Unavailable`] — this is
//! an internal condition a caller maps silently to "no peer identity",
//! never to an HTTP error.

use crate::limits::PeerCredsConfig;
use std::fmt;

/// The raw descriptor type [`PeerCreds::resolve`] takes.
///
/// `std::os::unix::io::RawFd` on Unix; on any other target (where the
/// resolver always answers [`PeerCredsError::Unavailable`] regardless of
/// the value passed) a plain `i32` placeholder, so this module — and
/// anything generic over [`PeerCreds`] — still compiles off Unix.
#[cfg(unix)]
pub type FdHandle = std::os::unix::io::RawFd;
#[cfg(not(unix))]
pub type FdHandle = i32;

/// Resolved PID/UID/GID for one local-socket peer, cached after the first
/// successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

/// User/group names resolved from [`PeerCredentials`] via the system
/// account database. Only populated when `peercreds_resolve_enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedNames {
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCredsError {
    /// The socket isn't local, the platform has no peer-credential
    /// syscall, or resolution is disabled by configuration.
    Unavailable,
    /// The syscall itself failed (e.g. the peer has already closed).
    SyscallFailed,
}

impl fmt::Display for PeerCredsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerCredsError::Unavailable => write!(f, "peer credentials unavailable"),
            PeerCredsError::SyscallFailed => write!(f, "peer credential syscall failed"),
        }
    }
}

impl std::error::Error for PeerCredsError {}

/// Strategy object resolving peer credentials for a raw socket fd.
///
/// A single trait covers both the Linux and BSD/macOS syscalls so callers
/// never match on `cfg(target_os)` themselves.
pub trait PeerCreds: Sync + Send + 'static {
    fn resolve(&self, fd: FdHandle) -> Result<PeerCredentials, PeerCredsError>;

    /// Resolves numeric UID/GID into names via the system account database,
    /// using the reentrant `getpwuid_r`/`getgrgid_r` variants since this
    /// may run concurrently across worker tasks.
    fn resolve_names(&self, creds: PeerCredentials) -> Result<ResolvedNames, PeerCredsError>;
}

/// The default [`PeerCreds`] implementation: `SO_PEERCRED` on Linux,
/// `LOCAL_PEERCRED`/`getpeereid` on the BSDs and macOS, unconditionally
/// [`PeerCredsError::Unavailable`] everywhere else.
pub struct SystemPeerCreds {
    config: PeerCredsConfig,
}

impl SystemPeerCreds {
    #[inline]
    pub fn new(config: PeerCredsConfig) -> Self {
        Self { config }
    }
}

impl PeerCreds for SystemPeerCreds {
    fn resolve(&self, fd: FdHandle) -> Result<PeerCredentials, PeerCredsError> {
        if !self.config.peercreds_enabled {
            return Err(PeerCredsError::Unavailable);
        }
        platform::peer_credentials(fd)
    }

    fn resolve_names(&self, creds: PeerCredentials) -> Result<ResolvedNames, PeerCredsError> {
        if !self.config.peercreds_resolve_enabled {
            return Err(PeerCredsError::Unavailable);
        }
        platform::resolve_names(creds)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::{PeerCredentials, PeerCredsError, ResolvedNames};
    use std::{mem, os::unix::io::RawFd};

    pub(super) fn peer_credentials(fd: RawFd) -> Result<PeerCredentials, PeerCredsError> {
        let mut creds: libc::ucred = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::ucred>() as libc::socklen_t;

        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                &mut creds as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if rc != 0 {
            return Err(PeerCredsError::SyscallFailed);
        }

        Ok(PeerCredentials {
            pid: creds.pid,
            uid: creds.uid,
            gid: creds.gid,
        })
    }

    pub(super) fn resolve_names(creds: PeerCredentials) -> Result<ResolvedNames, PeerCredsError> {
        Ok(ResolvedNames {
            user: lookup_user(creds.uid),
            group: lookup_group(creds.gid),
        })
    }

    /// Uses the reentrant `getpwuid_r` so concurrent worker tasks resolving
    /// different peers don't clobber a shared static buffer.
    fn lookup_user(uid: u32) -> Option<String> {
        let mut buf = vec![0i8; 1024];
        let mut pwd: libc::passwd = unsafe { mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };

        if rc != 0 || result.is_null() {
            return None;
        }

        cstr_to_string(pwd.pw_name)
    }

    fn lookup_group(gid: u32) -> Option<String> {
        let mut buf = vec![0i8; 1024];
        let mut grp: libc::group = unsafe { mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();

        let rc = unsafe {
            libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
        };

        if rc != 0 || result.is_null() {
            return None;
        }

        cstr_to_string(grp.gr_name)
    }

    fn cstr_to_string(ptr: *const libc::c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { std::ffi::CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
mod platform {
    use super::{PeerCredentials, PeerCredsError, ResolvedNames};
    use std::{mem, os::unix::io::RawFd};

    pub(super) fn peer_credentials(fd: RawFd) -> Result<PeerCredentials, PeerCredsError> {
        let mut cred: libc::xucred = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::xucred>() as libc::socklen_t;

        let rc = unsafe {
            libc::getsockopt(
                fd,
                0, // SOL_LOCAL
                1, // LOCAL_PEERCRED
                &mut cred as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };

        if rc != 0 {
            return Err(PeerCredsError::SyscallFailed);
        }

        Ok(PeerCredentials {
            pid: -1, // LOCAL_PEERCRED carries no PID; only UID/GID.
            uid: cred.cr_uid,
            gid: cred.cr_groups.first().copied().unwrap_or(0),
        })
    }

    pub(super) fn resolve_names(creds: PeerCredentials) -> Result<ResolvedNames, PeerCredsError> {
        super::linux_style_name_lookup(creds)
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
)))]
mod platform {
    use super::{FdHandle, PeerCredentials, PeerCredsError, ResolvedNames};

    pub(super) fn peer_credentials(_fd: FdHandle) -> Result<PeerCredentials, PeerCredsError> {
        Err(PeerCredsError::Unavailable)
    }

    pub(super) fn resolve_names(_creds: PeerCredentials) -> Result<ResolvedNames, PeerCredsError> {
        Err(PeerCredsError::Unavailable)
    }
}

/// Shared `getpwuid_r`/`getgrgid_r` lookup for BSD/macOS targets, which use
/// the same POSIX account-database API as Linux.
#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
fn linux_style_name_lookup(creds: PeerCredentials) -> Result<ResolvedNames, PeerCredsError> {
    use std::mem;

    let user = {
        let mut buf = vec![0i8; 1024];
        let mut pwd: libc::passwd = unsafe { mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc =
            unsafe { libc::getpwuid_r(creds.uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
        if rc == 0 && !result.is_null() {
            Some(unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) }.to_string_lossy().into_owned())
        } else {
            None
        }
    };

    let group = {
        let mut buf = vec![0i8; 1024];
        let mut grp: libc::group = unsafe { mem::zeroed() };
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc =
            unsafe { libc::getgrgid_r(creds.gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result) };
        if rc == 0 && !result.is_null() {
            Some(unsafe { std::ffi::CStr::from_ptr(grp.gr_name) }.to_string_lossy().into_owned())
        } else {
            None
        }
    };

    Ok(ResolvedNames { user, group })
}
