/**
    xenstore-rs provides a Rust based xenstore implementation.
    Copyright (C) 2016 Star Lab Corp.

    This program is free software; you can redistribute it and/or modify
    it under the terms of the GNU General Public License as published by
    the Free Software Foundation; either version 2 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU General Public License for more details.

    You should have received a copy of the GNU General Public License along
    with this program; if not, see <http://www.gnu.org/licenses/>.
**/

use std::error;
use std::fmt;
use std::io;
use std::result;
use wire;

#[derive(Debug)]
pub enum Error {
    EINVAL(String),
    EACCES(String),
    EEXIST(String),
    EISDIR(String),
    ENOENT(String),
    ENOMEM(String),
    ENOSPC(String),
    EIO(String),
    ENOTEMPTY(String),
    ENOSYS(String),
    EROFS(String),
    EBUSY(String),
    EAGAIN(String),
    EISCONN(String),
    E2BIG(String),
    /// The transport failed underneath us
    Io(io::Error),
    /// The client was shut down while the operation was blocked
    Cancelled,
}

impl Error {
    /// Map a server error mnemonic onto an `Error`.
    ///
    /// Unknown mnemonics are reported as `EINVAL`, matching what the store
    /// daemon would have meant by a request it could not interpret.
    pub fn from_mnemonic(mnemonic: &str, msg: String) -> Error {
        match mnemonic {
            wire::XSE_EINVAL => Error::EINVAL(msg),
            wire::XSE_EACCES => Error::EACCES(msg),
            wire::XSE_EEXIST => Error::EEXIST(msg),
            wire::XSE_EISDIR => Error::EISDIR(msg),
            wire::XSE_ENOENT => Error::ENOENT(msg),
            wire::XSE_ENOMEM => Error::ENOMEM(msg),
            wire::XSE_ENOSPC => Error::ENOSPC(msg),
            wire::XSE_EIO => Error::EIO(msg),
            wire::XSE_ENOTEMPTY => Error::ENOTEMPTY(msg),
            wire::XSE_ENOSYS => Error::ENOSYS(msg),
            wire::XSE_EROFS => Error::EROFS(msg),
            wire::XSE_EBUSY => Error::EBUSY(msg),
            wire::XSE_EAGAIN => Error::EAGAIN(msg),
            wire::XSE_EISCONN => Error::EISCONN(msg),
            wire::XSE_E2BIG => Error::E2BIG(msg),
            _ => {
                warn!("xenbus: xen store gave unknown error {}", mnemonic);
                Error::EINVAL(msg)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::EINVAL(ref msg) => write!(f, "{}: {}", wire::XSE_EINVAL, msg),
            Error::EACCES(ref msg) => write!(f, "{}: {}", wire::XSE_EACCES, msg),
            Error::EEXIST(ref msg) => write!(f, "{}: {}", wire::XSE_EEXIST, msg),
            Error::EISDIR(ref msg) => write!(f, "{}: {}", wire::XSE_EISDIR, msg),
            Error::ENOENT(ref msg) => write!(f, "{}: {}", wire::XSE_ENOENT, msg),
            Error::ENOMEM(ref msg) => write!(f, "{}: {}", wire::XSE_ENOMEM, msg),
            Error::ENOSPC(ref msg) => write!(f, "{}: {}", wire::XSE_ENOSPC, msg),
            Error::EIO(ref msg) => write!(f, "{}: {}", wire::XSE_EIO, msg),
            Error::ENOTEMPTY(ref msg) => write!(f, "{}: {}", wire::XSE_ENOTEMPTY, msg),
            Error::ENOSYS(ref msg) => write!(f, "{}: {}", wire::XSE_ENOSYS, msg),
            Error::EROFS(ref msg) => write!(f, "{}: {}", wire::XSE_EROFS, msg),
            Error::EBUSY(ref msg) => write!(f, "{}: {}", wire::XSE_EBUSY, msg),
            Error::EAGAIN(ref msg) => write!(f, "{}: {}", wire::XSE_EAGAIN, msg),
            Error::EISCONN(ref msg) => write!(f, "{}: {}", wire::XSE_EISCONN, msg),
            Error::E2BIG(ref msg) => write!(f, "{}: {}", wire::XSE_E2BIG, msg),
            Error::Io(ref err) => write!(f, "transport error: {}", err),
            Error::Cancelled => write!(f, "cancelled: client was shut down"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
