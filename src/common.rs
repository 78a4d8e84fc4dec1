// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_schemas::builtin_interfaces::Time;
use tracing::warn;

/// Raises the calling thread to the real-time FIFO scheduler so sweeps keep
/// up with the packet rate.
#[cfg(target_os = "linux")]
pub fn set_process_priority() {
    let mut param = libc::sched_param { sched_priority: 10 };
    let pid = unsafe { libc::pthread_self() };
    let err = unsafe {
        libc::pthread_setschedparam(pid, libc::SCHED_FIFO, &mut param as *mut libc::sched_param)
    };
    if let Some(err) = pthread_error(err) {
        warn!("unable to set decoder real-time fifo scheduler: {}", err);
    }
}

/// pthread functions return the error number instead of setting errno.
#[cfg(target_os = "linux")]
fn pthread_error(err: libc::c_int) -> Option<std::io::Error> {
    match err {
        0 => None,
        err => Some(std::io::Error::from_raw_os_error(err)),
    }
}

/// Real-time scheduling is only requested on Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_process_priority() {}

/// Current time of the monotonic raw clock.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<Time, std::io::Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(Time {
        sec: tp.tv_sec as i32,
        nanosec: tp.tv_nsec as u32,
    })
}

/// Current time of the system clock.
#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<Time, std::io::Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(std::io::Error::other)?;

    Ok(Time {
        sec: now.as_secs() as i32,
        nanosec: now.subsec_nanos(),
    })
}
