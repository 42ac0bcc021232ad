//! Asymmetric fence pair.
//!
//! Readers publish a hazard pointer and pay only a compiler barrier
//! ([`light`]). Writers about to scan the hazard slots pay a process-wide
//! barrier ([`heavy`]) that forces every core running one of our threads to
//! observe the publication first.
//!
//! On Linux the heavy side uses the private-expedited `membarrier(2)`
//! command, with availability probed once per process. Where membarrier is
//! unavailable the fallback downgrades the protection of a resident dummy
//! page, which triggers a TLB shootdown and with it a memory barrier on all
//! cores running threads of this process. Elsewhere both sides degrade to
//! sequentially consistent fences.

use core::sync::atomic::Ordering;

/// Reader-side fence: orders the hazard publication before the re-read.
#[inline]
pub fn light() {
    #[cfg(target_os = "linux")]
    core::sync::atomic::compiler_fence(Ordering::SeqCst);
    #[cfg(not(target_os = "linux"))]
    core::sync::atomic::fence(Ordering::SeqCst);
}

/// Writer-side fence: makes every thread's prior hazard publications visible
/// before the caller scans the slots. May issue a syscall; never fails
/// recoverably.
#[inline]
pub fn heavy() {
    #[cfg(target_os = "linux")]
    linux::barrier();
    #[cfg(not(target_os = "linux"))]
    core::sync::atomic::fence(Ordering::SeqCst);
}

#[cfg(target_os = "linux")]
mod linux {
    use core::sync::atomic::{AtomicI8, Ordering};
    use koru_sync::Spinlock;

    // mimic: membarrier_cmd, linux/membarrier.h
    const MEMBARRIER_CMD_QUERY: libc::c_int = 0;
    const MEMBARRIER_CMD_PRIVATE_EXPEDITED: libc::c_int = 1 << 3;
    const MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED: libc::c_int = 1 << 4;

    fn membarrier(cmd: libc::c_int) -> libc::c_long {
        // Flags argument is 0 for all commands we issue.
        unsafe { libc::syscall(libc::SYS_membarrier, cmd, 0) }
    }

    fn membarrier_available() -> bool {
        let wanted = MEMBARRIER_CMD_PRIVATE_EXPEDITED | MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED;
        let r = membarrier(MEMBARRIER_CMD_QUERY);
        r != -1 && (r as libc::c_int & wanted) == wanted
    }

    // 0 = unprobed, 1 = available, -1 = unavailable. Probed once per process.
    static MEMBARRIER_STATE: AtomicI8 = AtomicI8::new(0);

    fn membarrier_available_cached() -> bool {
        let mut state = MEMBARRIER_STATE.load(Ordering::Relaxed);
        if state == 0 {
            state = if membarrier_available() { 1 } else { -1 };
            MEMBARRIER_STATE.store(state, Ordering::Relaxed);
        }
        state == 1
    }

    fn membarrier_private_expedited() -> Result<(), ()> {
        if membarrier(MEMBARRIER_CMD_PRIVATE_EXPEDITED) == 0 {
            return Ok(());
        }
        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::EINVAL) | Some(libc::ENOSYS) => return Err(()),
            Some(libc::EPERM) => {}
            _ => return Err(()),
        }
        // Not yet registered for the expedited command; register and retry.
        if membarrier(MEMBARRIER_CMD_REGISTER_PRIVATE_EXPEDITED) == -1 {
            return Err(());
        }
        if membarrier(MEMBARRIER_CMD_PRIVATE_EXPEDITED) == 0 {
            Ok(())
        } else {
            Err(())
        }
    }

    // The dummy page exists only for the side effects of protection changes.
    // Serialized so two writers do not interleave the upgrade/downgrade pair.
    static DUMMY_PAGE: Spinlock<usize> = Spinlock::new(0);

    fn mprotect_barrier() {
        let mut page = DUMMY_PAGE.lock();

        let mut addr = *page as *mut libc::c_void;
        if addr.is_null() {
            addr = unsafe {
                libc::mmap(
                    core::ptr::null_mut(),
                    1,
                    libc::PROT_READ,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            assert!(addr != libc::MAP_FAILED, "koru: mmap of fence page failed");
            *page = addr as usize;
        }

        // Upgrade and touch so the page is resident, then downgrade. The
        // downgrade of a resident page forces the cross-core barrier; if the
        // page got swapped out in between, the barrier already happened.
        unsafe {
            assert!(
                libc::mprotect(addr, 1, libc::PROT_READ | libc::PROT_WRITE) != -1,
                "koru: mprotect upgrade failed"
            );
            core::ptr::write_volatile(addr as *mut u8, 0);
            assert!(
                libc::mprotect(addr, 1, libc::PROT_READ) != -1,
                "koru: mprotect downgrade failed"
            );
        }
    }

    pub(super) fn barrier() {
        if membarrier_available_cached() {
            if membarrier_private_expedited().is_err() {
                mprotect_barrier();
            }
        } else {
            mprotect_barrier();
        }
    }
}
