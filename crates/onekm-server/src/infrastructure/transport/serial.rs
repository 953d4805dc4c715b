//! Serial line transport (USB CDC-ACM or a plain UART).

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::info;

use super::{StreamTransport, TransportError};

fn speed_constant(baud: u32) -> Option<libc::speed_t> {
    match baud {
        115_200 => Some(libc::B115200),
        230_400 => Some(libc::B230400),
        460_800 => Some(libc::B460800),
        921_600 => Some(libc::B921600),
        _ => None,
    }
}

/// Opens `path`, puts the line into raw 8N1 mode at `baud`, and wraps it in a
/// record writer.
///
/// # Errors
///
/// Returns [`TransportError::UnsupportedBaud`] for rates outside
/// [`super::SUPPORTED_BAUD_RATES`] and [`TransportError::Open`] if the device cannot
/// be opened or configured.
pub fn open_serial(path: &Path, baud: u32) -> Result<StreamTransport<File>, TransportError> {
    let speed = speed_constant(baud).ok_or(TransportError::UnsupportedBaud(baud))?;
    let open_err = |source| TransportError::Open {
        target: path.display().to_string(),
        source,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(open_err)?;
    configure_raw(&file, speed).map_err(open_err)?;

    info!("opened serial line {} at {baud} baud", path.display());
    Ok(StreamTransport::new(
        file,
        format!("serial {} @ {baud}", path.display()),
    ))
}

fn configure_raw(file: &File, speed: libc::speed_t) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is an open descriptor owned by `file`; `tio` is fully
    // initialised by tcgetattr before use.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cflag &= !(libc::CSTOPB | libc::PARENB | libc::CRTSCTS);
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
