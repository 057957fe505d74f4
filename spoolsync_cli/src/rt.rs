//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall).
//!
//! The engine loop itself is not latency-critical, but the load-cell
//! sampling thread is: missed DRDY windows show up as settle-filter churn.
//! All failures here degrade to warnings; the daemon runs fine without
//! elevated privileges.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_SET, CPU_ZERO, MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall, sched_get_priority_max,
        sched_get_priority_min, sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    RT_ONCE.get_or_init(|| {
        // Memory locking
        let lock_flags = match lock {
            RtLock::None => 0,
            RtLock::Current => MCL_CURRENT,
            RtLock::All => MCL_CURRENT | MCL_FUTURE,
        };
        if lock_flags != 0 {
            let rc = unsafe { mlockall(lock_flags) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                eprintln!(
                    "Warning: mlockall failed: {err}; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'"
                );
            } else {
                eprintln!("RT: memory lock = {lock:?}");
            }
        }

        // SCHED_FIFO priority, clamped to the system range
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let prio_val = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: prio_val,
        };
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            eprintln!(
                "Warning: sched_setscheduler(SCHED_FIFO, prio={prio_val}) failed: {err}; hint: needs CAP_SYS_NICE or root"
            );
        }

        // Pin to one CPU if the index is sane
        let target = rt_cpu.unwrap_or(0);
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online > 0 && (target as libc::c_long) < online {
            let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            unsafe {
                CPU_ZERO(&mut set);
                CPU_SET(target, &mut set);
            }
            let rc = unsafe {
                libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
            };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                eprintln!("Warning: affinity not applied: {err}");
            }
        } else {
            eprintln!("Warning: requested CPU {target} not online; affinity left unchanged");
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock, _rt_cpu: Option<usize>) {
    if rt {
        eprintln!("Warning: real-time mode is only supported on Linux; ignoring --rt");
    }
}
