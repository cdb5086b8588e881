//! Raw descriptor I/O for the control and stats records.

use std::io;

use libc::c_int;

/// Read until `buf` is full or the writer closes its end.
///
/// Returns the number of bytes read, which is short only at end of file.
pub(crate) fn read_full(fd: c_int, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let rest = &mut buf[filled..];
        // SAFETY: `rest` is a valid, writable region of `rest.len()` bytes.
        let n = unsafe { libc::read(fd, rest.as_mut_ptr().cast(), rest.len()) };
        match n {
            0 => break,
            n if n > 0 => filled += n as usize,
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
        }
    }
    Ok(filled)
}

/// Write all of `buf`, returning the number of bytes written before the
/// descriptor stopped accepting data.
pub(crate) fn write_full(fd: c_int, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        let rest = &buf[written..];
        // SAFETY: `rest` is a valid region of `rest.len()` bytes.
        let n = unsafe { libc::write(fd, rest.as_ptr().cast(), rest.len()) };
        match n {
            0 => break,
            n if n > 0 => written += n as usize,
            _ => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err);
                }
            }
        }
    }
    Ok(written)
}
