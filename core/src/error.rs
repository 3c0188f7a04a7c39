use core::fmt;

/// The error type which is returned from the APIs of this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Errno {
    /// A hash on the Merkle path disagrees with the trusted root.
    IntegrityViolation,
    /// Offset, length or index outside the addressable range.
    OutOfRange,
    /// Invalid arguments.
    InvalidArgs,
    /// Not found.
    NotFound,
    /// The entry already exists.
    AlreadyExists,
    /// Out of disk space.
    OutOfDisk,
    /// IO error.
    IoFailed,
    /// OS-specific unknown error.
    OsSpecUnknown,
    /// Encryption operation failed.
    EncryptFailed,
    /// Decryption operation failed.
    DecryptFailed,
    /// The write counter of a block cannot be incremented any further.
    NonceExhausted,
    /// The device has never been formatted.
    NotFormatted,
}

/// error used in this crate
#[derive(Debug, Clone)]
pub struct Error {
    errno: Errno,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(errno: Errno) -> Self {
        Error { errno, msg: None }
    }

    pub const fn with_msg(errno: Errno, msg: &'static str) -> Self {
        Error {
            errno,
            msg: Some(msg),
        }
    }

    pub fn errno(&self) -> Errno {
        self.errno
    }

    pub fn msg(&self) -> Option<&'static str> {
        self.msg
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::with_msg(Errno::IoFailed, "raw device I/O failed")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.msg {
            Some(msg) => write!(f, "{:?}: {}", self.errno, msg),
            None => write!(f, "{:?}", self.errno),
        }
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! return_errno {
    ($errno: expr) => {
        return core::result::Result::Err($crate::Error::new($errno))
    };
}

#[macro_export]
macro_rules! return_errno_with_msg {
    ($errno: expr, $msg: expr) => {
        return core::result::Result::Err($crate::Error::with_msg($errno, $msg))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail_plain() -> Result<(), Error> {
        return_errno!(Errno::OutOfDisk);
    }

    fn fail_with_msg() -> Result<(), Error> {
        return_errno_with_msg!(Errno::NotFound, "no such sub-store");
    }

    #[test]
    fn error_fns() {
        let err = fail_plain().unwrap_err();
        assert_eq!(err.errno(), Errno::OutOfDisk);
        assert_eq!(err.msg(), None);
        assert_eq!(err.to_string(), "OutOfDisk");

        let err = fail_with_msg().unwrap_err();
        assert_eq!(err.errno(), Errno::NotFound);
        assert_eq!(err.msg(), Some("no such sub-store"));
        assert_eq!(err.to_string(), "NotFound: no such sub-store");

        let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert_eq!(err.errno(), Errno::IoFailed);
    }
}
