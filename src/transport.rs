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

use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

/// Path of the xenstored unix socket
pub const UDS_PATH: &'static str = "/var/run/xenstored/socket";

/// Ordered, blocking byte stream to the store daemon.
///
/// The read and write sides must be independently usable: the client keeps a
/// dedicated thread blocked in `read_exact` while other threads issue
/// `write_all` calls.
pub trait Transport: Send + Sync {
    /// Fill `buf` completely or fail.
    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `buf` or fail.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Unblock a reader stuck in `read_exact`. Called once at shutdown.
    fn shutdown(&self) {}
}

impl Transport for UnixStream {
    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(&mut (&*self), buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        Write::write_all(&mut (&*self), buf)
    }

    fn shutdown(&self) {
        let _ = UnixStream::shutdown(self, Shutdown::Both);
    }
}

impl<T: Transport> Transport for Arc<T> {
    fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        (**self).write_all(buf)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}
