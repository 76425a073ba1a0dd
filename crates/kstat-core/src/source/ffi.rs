//! Declarations from `<kstat.h>` and `<sys/kstat.h>`.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_longlong, c_uchar, c_uint, c_void, size_t};

pub const KSTAT_STRLEN: usize = 31;

pub const KSTAT_TYPE_NAMED: c_uchar = 1;
pub const KSTAT_DATA_STRING: c_uchar = 9;

pub type kid_t = c_int;
pub type hrtime_t = c_longlong;

#[repr(C)]
pub struct kstat_t {
    pub ks_crtime: hrtime_t,
    pub ks_next: *mut kstat_t,
    pub ks_kid: kid_t,
    pub ks_module: [c_char; KSTAT_STRLEN],
    pub ks_resv: c_uchar,
    pub ks_instance: c_int,
    pub ks_name: [c_char; KSTAT_STRLEN],
    pub ks_type: c_uchar,
    pub ks_class: [c_char; KSTAT_STRLEN],
    pub ks_flags: c_uchar,
    pub ks_data: *mut c_void,
    pub ks_ndata: c_uint,
    pub ks_data_size: size_t,
    pub ks_snaptime: hrtime_t,
    pub ks_update: *mut c_void,
    pub ks_private: *mut c_void,
    pub ks_snapshot: *mut c_void,
    pub ks_lock: *mut c_void,
}

#[repr(C)]
pub struct kstat_ctl_t {
    pub kc_chain_id: kid_t,
    pub kc_chain: *mut kstat_t,
    pub kc_kd: c_int,
}

#[link(name = "kstat")]
unsafe extern "C" {
    pub fn kstat_open() -> *mut kstat_ctl_t;
    pub fn kstat_close(kc: *mut kstat_ctl_t) -> c_int;
    pub fn kstat_chain_update(kc: *mut kstat_ctl_t) -> kid_t;
    pub fn kstat_read(kc: *mut kstat_ctl_t, ksp: *mut kstat_t, buf: *mut c_void) -> kid_t;
}
