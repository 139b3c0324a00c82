//! Symbolic result codes.
//!
//! Test programs let the user choose what their event handlers answer with,
//! e.g. `--retval=deny` or `--retval=ENOENT`. The two backends under test use
//! disjoint numeric spaces for those answers: libprojfs handlers return
//! `PROJFS_ALLOW`/`PROJFS_DENY` or a negated errno, VFS API callbacks return a
//! `PrjFS_Result`. [`ResultSpace`] holds one name table per space and
//! resolves names against exactly one of them.

use crate::error::RetvalError;
use crate::options::Features;

/// Permission handler answer: allow the operation.
pub const PROJFS_ALLOW: i32 = 0x01;
/// Permission handler answer: deny the operation.
pub const PROJFS_DENY: i32 = 0x02;

/// Prefix of the VFS API result names; accepted but optional on input.
pub const VFSAPI_PREFIX: &str = "PrjFS_Result_";

/// `PrjFS_Result` codes of the VFS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PrjFsResult {
    Invalid = 0x0000_0000,
    Success = 0x0000_0001,
    Pending = 0x0000_0002,

    EInvalidArgs = 0x1000_0001,
    EInvalidOperation = 0x1000_0002,
    ENotSupported = 0x1000_0004,

    EDriverNotLoaded = 0x2000_0001,
    EOutOfMemory = 0x2000_0002,
    EFileNotFound = 0x2000_0004,
    EPathNotFound = 0x2000_0008,
    EAccessDenied = 0x2000_0010,
    EInvalidHandle = 0x2000_0020,
    EIOError = 0x2000_0040,

    ENotYetImplemented = 0xFFFF_FFFF,
}

impl PrjFsResult {
    /// The code as the C `int` the callbacks return.
    pub const fn code(self) -> i32 {
        self as u32 as i32
    }
}

/// One `(name, value)` row of a result-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetvalEntry {
    pub name: &'static str,
    pub value: i32,
}

impl RetvalEntry {
    const fn new(name: &'static str, value: i32) -> Self {
        Self { name, value }
    }

    const fn errno(name: &'static str, errno: i32) -> Self {
        Self::new(name, -errno)
    }

    const fn prjfs(name: &'static str, result: PrjFsResult) -> Self {
        Self::new(name, result.code())
    }

    fn matches(&self, symbol: &str, strip_prefix: bool) -> bool {
        if self.name.eq_ignore_ascii_case(symbol) {
            return true;
        }
        strip_prefix
            && self
                .name
                .strip_prefix(VFSAPI_PREFIX)
                .is_some_and(|bare| bare.eq_ignore_ascii_case(symbol))
    }
}

// Errors a handler may hand back to the kernel through libprojfs.
static ERRNO_RETVALS: &[RetvalEntry] = &[
    RetvalEntry::new("null", 0),
    RetvalEntry::new("allow", PROJFS_ALLOW),
    RetvalEntry::new("deny", PROJFS_DENY),
    RetvalEntry::errno("EACCES", libc::EACCES),
    RetvalEntry::errno("EBADF", libc::EBADF),
    RetvalEntry::errno("EINPROGRESS", libc::EINPROGRESS),
    RetvalEntry::errno("EINVAL", libc::EINVAL),
    RetvalEntry::errno("EIO", libc::EIO),
    RetvalEntry::errno("ENODEV", libc::ENODEV),
    RetvalEntry::errno("ENOENT", libc::ENOENT),
    RetvalEntry::errno("ENOMEM", libc::ENOMEM),
    RetvalEntry::errno("ENOTSUP", libc::ENOTSUP),
    RetvalEntry::errno("EPERM", libc::EPERM),
    RetvalEntry::errno("ENOSYS", libc::ENOSYS),
];

// Every result the VFS API translates back into an errno.
static VFSAPI_RETVALS: &[RetvalEntry] = &[
    RetvalEntry::prjfs("null", PrjFsResult::Invalid),
    RetvalEntry::prjfs("allow", PrjFsResult::Success),
    RetvalEntry::prjfs("deny", PrjFsResult::EAccessDenied),
    RetvalEntry::prjfs("PrjFS_Result_Invalid", PrjFsResult::Invalid),
    RetvalEntry::prjfs("PrjFS_Result_Success", PrjFsResult::Success),
    RetvalEntry::prjfs("PrjFS_Result_Pending", PrjFsResult::Pending),
    RetvalEntry::prjfs("PrjFS_Result_EInvalidArgs", PrjFsResult::EInvalidArgs),
    RetvalEntry::prjfs("PrjFS_Result_EInvalidOperation", PrjFsResult::EInvalidOperation),
    RetvalEntry::prjfs("PrjFS_Result_ENotSupported", PrjFsResult::ENotSupported),
    RetvalEntry::prjfs("PrjFS_Result_EDriverNotLoaded", PrjFsResult::EDriverNotLoaded),
    RetvalEntry::prjfs("PrjFS_Result_EOutOfMemory", PrjFsResult::EOutOfMemory),
    RetvalEntry::prjfs("PrjFS_Result_EFileNotFound", PrjFsResult::EFileNotFound),
    RetvalEntry::prjfs("PrjFS_Result_EPathNotFound", PrjFsResult::EPathNotFound),
    RetvalEntry::prjfs("PrjFS_Result_EAccessDenied", PrjFsResult::EAccessDenied),
    RetvalEntry::prjfs("PrjFS_Result_EInvalidHandle", PrjFsResult::EInvalidHandle),
    RetvalEntry::prjfs("PrjFS_Result_EIOError", PrjFsResult::EIOError),
    RetvalEntry::prjfs("PrjFS_Result_ENotYetImplemented", PrjFsResult::ENotYetImplemented),
];

/// Numeric space the `--retval` names resolve into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultSpace {
    /// libprojfs handler results: `PROJFS_ALLOW`, `PROJFS_DENY`, `-errno`.
    #[default]
    Errno,
    /// VFS API `PrjFS_Result` codes.
    VfsApi,
}

impl ResultSpace {
    /// Pick the space requested by a test program's feature set.
    pub fn from_features(features: Features) -> Self {
        if features.contains(Features::VFSAPI) {
            ResultSpace::VfsApi
        } else {
            ResultSpace::Errno
        }
    }

    pub fn entries(self) -> &'static [RetvalEntry] {
        match self {
            ResultSpace::Errno => ERRNO_RETVALS,
            ResultSpace::VfsApi => VFSAPI_RETVALS,
        }
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        self.entries().iter().map(|entry| entry.name)
    }

    /// Resolve a symbolic name, ignoring ASCII case.
    ///
    /// In the VFS API space, `PrjFS_Result_`-prefixed names also match
    /// without the prefix, so `EFileNotFound` and
    /// `PrjFS_Result_EFileNotFound` are equivalent. The first matching row
    /// wins.
    pub fn resolve(self, symbol: &str) -> Option<i32> {
        let strip_prefix = self == ResultSpace::VfsApi;
        let value = self
            .entries()
            .iter()
            .find(|entry| entry.matches(symbol, strip_prefix))
            .map(|entry| entry.value);

        tracing::trace!(space = ?self, symbol, ?value, "resolved retval");
        value
    }

    /// Like [`resolve`](Self::resolve), failing with an error that names the
    /// symbol.
    pub fn parse(self, symbol: &str) -> Result<i32, RetvalError> {
        self.resolve(symbol)
            .ok_or_else(|| RetvalError::Unknown(symbol.to_string()))
    }

    /// The value of the `allow` alias.
    pub fn allow(self) -> i32 {
        match self {
            ResultSpace::Errno => PROJFS_ALLOW,
            ResultSpace::VfsApi => PrjFsResult::Success.code(),
        }
    }

    /// The value of the `deny` alias.
    pub fn deny(self) -> i32 {
        match self {
            ResultSpace::Errno => PROJFS_DENY,
            ResultSpace::VfsApi => PrjFsResult::EAccessDenied.code(),
        }
    }
}
