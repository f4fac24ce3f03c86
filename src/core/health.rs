/// Check if a process is alive using platform-specific APIs.
///
/// Zombies count as dead: they hold a process-table slot but will never run again.
#[cfg(target_os = "linux")]
pub fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }

    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(contents) => super::table::parse_stat(&contents)
            .map(|stat| stat.is_running())
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
pub fn is_process_alive(pid: i32) -> bool {
    use libc::{c_int, proc_pidinfo, PROC_PIDTBSDINFO};
    use std::mem;

    if pid <= 0 {
        return false;
    }

    unsafe {
        let mut info: libc::proc_bsdinfo = mem::zeroed();
        let size = mem::size_of::<libc::proc_bsdinfo>() as c_int;

        let result = proc_pidinfo(
            pid,
            PROC_PIDTBSDINFO,
            0,
            &mut info as *mut _ as *mut _,
            size,
        );

        result > 0
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn is_process_alive(pid: i32) -> bool {
    // kill(pid, 0) only performs the existence and permission checks
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid <= 0 {
        return false;
    }

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
