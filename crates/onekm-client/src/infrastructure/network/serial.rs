//! Serial-line record source.

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::info;

use super::{release_held, run_session, NetworkError, SessionStats};
use crate::application::emulate_input::EmulateInputUseCase;

fn speed_constant(baud: u32) -> Option<libc::speed_t> {
    match baud {
        115_200 => Some(libc::B115200),
        230_400 => Some(libc::B230400),
        460_800 => Some(libc::B460800),
        921_600 => Some(libc::B921600),
        _ => None,
    }
}

/// Opens the line read-only in raw 8N1 mode.
///
/// # Errors
///
/// [`NetworkError::Open`] if the device cannot be opened, the rate is
/// unsupported, or the line cannot be configured.
pub fn open_line(path: &Path, baud: u32) -> Result<tokio::fs::File, NetworkError> {
    let open_err = |source| NetworkError::Open {
        path: path.display().to_string(),
        source,
    };
    let speed = speed_constant(baud).ok_or_else(|| {
        open_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {baud}"),
        ))
    })?;

    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .map_err(open_err)?;
    set_raw(&file, speed).map_err(open_err)?;

    info!("reading records from {} at {baud} baud", path.display());
    Ok(tokio::fs::File::from_std(file))
}

/// Applies records from the line until it closes or `shutdown` resolves.
///
/// Unlike TCP there is no next peer to wait for, so the session ending ends
/// the call.
///
/// # Errors
///
/// See [`open_line`] and [`run_session`].
pub async fn serve_serial<F>(
    path: &Path,
    baud: u32,
    use_case: &mut EmulateInputUseCase,
    burst_limit: usize,
    shutdown: F,
) -> Result<SessionStats, NetworkError>
where
    F: Future<Output = ()>,
{
    let mut line = open_line(path, baud)?;
    let outcome = tokio::select! {
        _ = shutdown => Ok(SessionStats::default()),
        result = run_session(&mut line, use_case, burst_limit) => result,
    };
    release_held(use_case);
    outcome
}

fn set_raw(file: &File, speed: libc::speed_t) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` stays open for the lifetime of `file`; `tio` is filled by
    // tcgetattr before any field is read.
    unsafe {
        let mut tio: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tio) != 0 {
            return Err(io::Error::last_os_error());
        }
        libc::cfmakeraw(&mut tio);
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cflag &= !(libc::CSTOPB | libc::PARENB | libc::CRTSCTS);
        // Block until at least one byte is available.
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 0;
        if libc::cfsetispeed(&mut tio, speed) != 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::SUPPORTED_BAUD_RATES;

    #[test]
    fn test_every_supported_rate_has_a_speed_constant() {
        for baud in SUPPORTED_BAUD_RATES {
            assert!(speed_constant(baud).is_some(), "{baud}");
        }
    }

    #[test]
    fn test_unsupported_rate_is_an_open_error() {
        let err = open_line(Path::new("/dev/null"), 9_600).unwrap_err();
        assert!(matches!(err, NetworkError::Open { .. }));
        assert!(err.to_string().contains("/dev/null"));
    }

    #[test]
    fn test_missing_device_is_an_open_error() {
        let result = open_line(Path::new("/definitely/not/a/tty"), 230_400);
        assert!(matches!(result, Err(NetworkError::Open { .. })));
    }
}
