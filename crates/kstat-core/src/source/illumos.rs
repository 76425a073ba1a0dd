//! `KstatSource` backed by libkstat.

use std::io;
use std::ptr::{self, NonNull};
use std::slice;

use tracing::debug;

use crate::decode::named::relocate_string;
use crate::decode::{NAMED_ENTRY_SIZE, c_string};
use crate::source::traits::{ChainId, Descriptor, KstatSource, Snapshot, StatHandle, StatKind};

use super::ffi;

const NAMED_TYPE_OFFSET: usize = 31;
const NAMED_VALUE_OFFSET: usize = 32;

/// Connection to the running kernel's kstat chain.
///
/// Handles are addresses of `kstat_t` entries in libkstat's copy of the
/// chain. They are only dereferenced while the chain id they were issued
/// under is still current, since `kstat_chain_update` frees removed entries.
#[derive(Debug)]
pub struct IllumosKstat {
    ctl: NonNull<ffi::kstat_ctl_t>,
    chain_id: ChainId,
}

impl IllumosKstat {
    /// Opens `/dev/kstat` via `kstat_open(3KSTAT)`.
    pub fn open() -> io::Result<Self> {
        // SAFETY: kstat_open has no preconditions.
        let ctl = unsafe { ffi::kstat_open() };
        let ctl = NonNull::new(ctl).ok_or_else(io::Error::last_os_error)?;
        // SAFETY: ctl was just returned non-null by kstat_open.
        let chain_id = unsafe { ctl.as_ref().kc_chain_id };
        debug!(chain_id, "Opened kstat");
        Ok(Self { ctl, chain_id })
    }

    fn rewrite_strings(ksp: &ffi::kstat_t, data: &mut Vec<u8>) {
        let base = ksp.ks_data as usize;
        let size = ksp.ks_data_size;
        for i in 0..ksp.ks_ndata as usize {
            let entry = i * NAMED_ENTRY_SIZE;
            if entry + NAMED_ENTRY_SIZE > size {
                break;
            }
            if data[entry + NAMED_TYPE_OFFSET] != ffi::KSTAT_DATA_STRING {
                continue;
            }

            relocate_string(data, entry + NAMED_VALUE_OFFSET, base, size, |addr, len| {
                // SAFETY: kstat_read leaves string pointers valid for `len`
                // bytes until the next read of this kstat.
                unsafe { slice::from_raw_parts(addr as *const u8, len) }.to_vec()
            });
        }
    }
}

impl Drop for IllumosKstat {
    fn drop(&mut self) {
        // SAFETY: ctl came from kstat_open and is closed exactly once.
        unsafe {
            ffi::kstat_close(self.ctl.as_ptr());
        }
    }
}

fn chars(raw: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().map(|&c| c as u8).collect();
    c_string(&bytes)
}

impl KstatSource for IllumosKstat {
    fn chain_id(&mut self) -> io::Result<ChainId> {
        // SAFETY: ctl is a live kstat_ctl_t owned by self.
        let kid = unsafe { ffi::kstat_chain_update(self.ctl.as_ptr()) };
        if kid == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above.
        self.chain_id = unsafe { self.ctl.as_ref().kc_chain_id };
        Ok(self.chain_id)
    }

    fn chain(&self) -> io::Result<Vec<Descriptor>> {
        let mut out = Vec::new();
        // SAFETY: the chain is owned by ctl and not modified until the next
        // kstat_chain_update, which needs &mut self.
        let mut ksp = unsafe { self.ctl.as_ref().kc_chain };
        while let Some(ks) = unsafe { ksp.as_ref() } {
            out.push(Descriptor {
                module: chars(&ks.ks_module),
                class: chars(&ks.ks_class),
                name: chars(&ks.ks_name),
                instance: ks.ks_instance,
                kind: StatKind::from_type_id(ks.ks_type),
                data_size: ks.ks_data_size,
                handle: StatHandle::new(self.chain_id, ksp as usize),
            });
            ksp = ks.ks_next;
        }
        Ok(out)
    }

    fn snapshot(&mut self, handle: StatHandle) -> io::Result<Snapshot> {
        if handle.chain_id() != self.chain_id {
            return Err(io::Error::from_raw_os_error(libc::ENXIO));
        }
        let ksp = handle.slot() as *mut ffi::kstat_t;

        // SAFETY: the handle was issued under the current chain id, so ksp
        // still points into libkstat's chain.
        if unsafe { ffi::kstat_read(self.ctl.as_ptr(), ksp, ptr::null_mut()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above; kstat_read succeeded and filled ks_data.
        let ks = unsafe { &*ksp };

        let mut data = if ks.ks_data.is_null() || ks.ks_data_size == 0 {
            Vec::new()
        } else {
            // SAFETY: ks_data holds ks_data_size bytes after kstat_read.
            unsafe { slice::from_raw_parts(ks.ks_data as *const u8, ks.ks_data_size) }.to_vec()
        };
        if ks.ks_type == ffi::KSTAT_TYPE_NAMED {
            Self::rewrite_strings(ks, &mut data);
        }

        Ok(Snapshot {
            snaptime: ks.ks_snaptime as u64,
            crtime: ks.ks_crtime as u64,
            ndata: ks.ks_ndata,
            data,
        })
    }
}
