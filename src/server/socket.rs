//! Listening-socket setup and accept helpers.

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::RawFd;

const BACKLOG: i32 = 128;

/// Creates the non-blocking listening socket: SO_REUSEADDR, optional
/// SO_LINGER (graceful close with a one-second drain window), bound to
/// INADDR_ANY on `port`.
pub(crate) fn create_listener(port: u16, linger: bool) -> io::Result<RawFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let result = (|| {
        if linger {
            let opt = libc::linger {
                l_onoff: 1,
                l_linger: 1,
            };
            setsockopt(fd, libc::SOL_SOCKET, libc::SO_LINGER, &opt)?;
        }

        let reuse: libc::c_int = 1;
        setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &reuse)?;

        let addr = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: port.to_be(),
            sin_addr: libc::in_addr {
                s_addr: libc::INADDR_ANY.to_be(),
            },
            sin_zero: [0; 8],
        };
        let ret = unsafe {
            libc::bind(
                fd,
                &addr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let ret = unsafe { libc::listen(fd, BACKLOG) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        set_nonblocking(fd)
    })();

    if let Err(e) = result {
        unsafe { libc::close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Accepts one pending connection, returning the new non-blocking descriptor
/// and the peer address.
pub(crate) fn accept(listen_fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    let fd = unsafe {
        libc::accept(
            listen_fd,
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut len,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    set_nonblocking(fd)?;
    Ok((fd, sockaddr_to_socketaddr(&addr)))
}

/// Port the listening socket actually bound to (relevant with port 0).
pub(crate) fn local_port(fd: RawFd) -> io::Result<u16> {
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    let ret = unsafe { libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(u16::from_be(addr.sin_port))
}

pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Best-effort rejection used when the connection table is at capacity:
/// write a short notice and close the descriptor immediately.
pub(crate) fn refuse(fd: RawFd, message: &[u8]) {
    unsafe {
        libc::send(
            fd,
            message.as_ptr() as *const _,
            message.len(),
            libc::MSG_NOSIGNAL,
        );
        libc::close(fd);
    }
}

fn sockaddr_to_socketaddr(addr: &libc::sockaddr_in) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
        u16::from_be(addr.sin_port),
    ))
}

fn setsockopt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const _,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
