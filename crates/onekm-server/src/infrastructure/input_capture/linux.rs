//! evdev capture source for Linux.

use std::collections::VecDeque;
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use evdev::{Device, EventType};
use tracing::{debug, info, warn};

use onekm_core::keymap::evdev::KEY_DOMAIN;
use onekm_core::KeyBitmap;

use super::{CaptureError, CaptureSource, GrabReport, RawInputEvent};

/// Devices whose name starts with this prefix are our own uinput devices and
/// must never be captured.
const OWN_DEVICE_PREFIX: &str = "OneKM";

struct CaptureDevice {
    path: PathBuf,
    name: String,
    device: Device,
}

/// Reads key and relative-motion events from a set of evdev nodes.
pub struct EvdevCapture {
    devices: Vec<CaptureDevice>,
    cursor: usize,
    pending: VecDeque<RawInputEvent>,
}

impl EvdevCapture {
    /// Opens capture devices.
    ///
    /// With an empty `paths`, every `/dev/input/event*` node that reports key
    /// or relative-motion capability is considered.  At most `max_devices`
    /// are kept.  Nodes that cannot be opened or configured are skipped with
    /// a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevices`] if nothing usable was found.
    pub fn open(paths: &[PathBuf], max_devices: usize) -> Result<Self, CaptureError> {
        let candidates: Vec<(PathBuf, Device)> = if paths.is_empty() {
            evdev::enumerate().collect()
        } else {
            paths
                .iter()
                .filter_map(|path| match Device::open(path) {
                    Ok(device) => Some((path.clone(), device)),
                    Err(source) => {
                        warn!(
                            "{}",
                            CaptureError::DeviceOpen {
                                path: path.clone(),
                                source
                            }
                        );
                        None
                    }
                })
                .collect()
        };

        let mut devices = Vec::new();
        for (path, device) in candidates {
            if devices.len() >= max_devices {
                warn!(max_devices, "device limit reached, ignoring {}", path.display());
                continue;
            }
            let name = device.name().unwrap_or("unnamed").to_string();
            if name.starts_with(OWN_DEVICE_PREFIX) {
                debug!("skipping own virtual device {name}");
                continue;
            }
            let events = device.supported_events();
            if !events.contains(EventType::KEY) && !events.contains(EventType::RELATIVE) {
                debug!("skipping {} ({name}): no key or motion events", path.display());
                continue;
            }
            if let Err(e) = set_nonblocking(&device) {
                warn!("skipping {} ({name}): cannot set non-blocking: {e}", path.display());
                continue;
            }
            info!("capturing {} ({name})", path.display());
            devices.push(CaptureDevice { path, name, device });
        }

        if devices.is_empty() {
            return Err(CaptureError::NoDevices);
        }

        Ok(Self {
            devices,
            cursor: 0,
            pending: VecDeque::new(),
        })
    }

    /// Reads whatever the next readable device has buffered into `pending`.
    fn refill(&mut self) {
        let count = self.devices.len();
        let mut removed = Vec::new();

        for step in 0..count {
            let index = (self.cursor + step) % count;
            let dev = &mut self.devices[index];
            match dev.device.fetch_events() {
                Ok(events) => {
                    self.pending.extend(events.filter_map(|ev| match ev.event_type() {
                        EventType::KEY => Some(RawInputEvent::Key {
                            code: ev.code(),
                            value: ev.value(),
                        }),
                        EventType::RELATIVE => Some(RawInputEvent::Relative {
                            axis: ev.code(),
                            delta: ev.value(),
                        }),
                        _ => None,
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                    warn!("input device {} ({}) removed", dev.path.display(), dev.name);
                    removed.push(index);
                }
                Err(e) => {
                    debug!("read error on {}: {e}", dev.path.display());
                }
            }
            if !self.pending.is_empty() {
                self.cursor = (index + 1) % count;
                break;
            }
        }

        for index in removed.into_iter().rev() {
            self.devices.remove(index);
        }
        if self.cursor >= self.devices.len() {
            self.cursor = 0;
        }
    }
}

impl CaptureSource for EvdevCapture {
    fn device_names(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|d| format!("{} ({})", d.name, d.path.display()))
            .collect()
    }

    fn next_event(&mut self) -> Option<RawInputEvent> {
        if self.pending.is_empty() && !self.devices.is_empty() {
            self.refill();
        }
        self.pending.pop_front()
    }

    fn wait_for_event(&mut self, timeout: Duration) -> bool {
        if !self.pending.is_empty() {
            return true;
        }
        let mut fds: Vec<libc::pollfd> = self
            .devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        if fds.is_empty() {
            std::thread::sleep(timeout);
            return false;
        }
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        // SAFETY: `fds` is a live, correctly sized array of pollfd structs.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        ready > 0
    }

    fn set_grab(&mut self, grab: bool) -> GrabReport {
        let mut report = GrabReport::default();
        for dev in &mut self.devices {
            let result = if grab {
                dev.device.grab()
            } else {
                dev.device.ungrab()
            };
            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "failed to {} {} ({}): {e}",
                        if grab { "grab" } else { "release" },
                        dev.path.display(),
                        dev.name
                    );
                }
            }
        }
        report
    }

    fn hardware_key_state(&mut self) -> Result<KeyBitmap, CaptureError> {
        let mut merged = KeyBitmap::empty();
        for dev in self.devices.iter().filter(|d| d.device.supported_keys().is_some()) {
            let keys = dev
                .device
                .get_key_state()
                .map_err(|source| CaptureError::KeyState {
                    path: dev.path.clone(),
                    source,
                })?;
            let held: KeyBitmap = keys
                .iter()
                .map(|key| key.code())
                .filter(|&code| (code as usize) < KEY_DOMAIN)
                .collect();
            merged.merge(&held);
        }
        Ok(merged)
    }
}

impl Drop for EvdevCapture {
    fn drop(&mut self) {
        for dev in &mut self.devices {
            // Ungrabbing a device that is not grabbed fails harmlessly.
            let _ = dev.device.ungrab();
        }
    }
}

fn set_nonblocking(device: &Device) -> io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: `fd` belongs to `device`, which outlives both calls.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

