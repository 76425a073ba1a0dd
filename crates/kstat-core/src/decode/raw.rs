//! `KSTAT_TYPE_RAW` payloads.
//!
//! Raw statistics carry a kernel struct image with no type information, so
//! the layout is looked up by statistic name in [`RAW_LAYOUTS`]. Names not in
//! the table decode to an empty map.

use tracing::debug;

use crate::source::Descriptor;
use crate::value::{Value, ValueMap};

use super::layout::{LayoutReader, align_up};

/// One member of a C struct layout.
#[derive(Debug, Clone, Copy)]
pub enum Field {
    U32(&'static str),
    I32(&'static str),
    U64(&'static str),
    /// `char[n]`, emitted as a string.
    Chars(&'static str, usize),
    /// `n` consecutive `uint_t` members that are not emitted.
    SkipU32(usize),
}

impl Field {
    fn align(self) -> usize {
        match self {
            Field::U32(_) | Field::I32(_) | Field::SkipU32(_) => 4,
            Field::U64(_) => 8,
            Field::Chars(..) => 1,
        }
    }

    fn size(self) -> usize {
        match self {
            Field::U32(_) | Field::I32(_) => 4,
            Field::U64(_) => 8,
            Field::Chars(_, n) => n,
            Field::SkipU32(n) => 4 * n,
        }
    }
}

/// Named struct layout for one raw statistic.
#[derive(Debug)]
pub struct RawLayout {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl RawLayout {
    /// Size of the struct, including trailing padding.
    pub fn size(&self) -> usize {
        let mut pos = 0;
        let mut max_align = 1;
        for f in self.fields {
            max_align = max_align.max(f.align());
            pos = align_up(pos, f.align()) + f.size();
        }
        align_up(pos, max_align)
    }

    fn decode(&self, data: &[u8]) -> std::io::Result<ValueMap> {
        let mut r = LayoutReader::new(data);
        let mut map = ValueMap::with_capacity(self.fields.len());
        for f in self.fields {
            match *f {
                Field::U32(key) => {
                    map.insert(key, Value::U32(r.u32()?));
                }
                Field::I32(key) => {
                    map.insert(key, Value::I32(r.i32()?));
                }
                Field::U64(key) => {
                    map.insert(key, Value::U64(r.u64()?));
                }
                Field::Chars(key, n) => {
                    map.insert(key, Value::String(r.chars(n)?));
                }
                Field::SkipU32(n) => {
                    r.align_to(4);
                    r.skip(4 * n);
                }
            }
        }
        Ok(map)
    }
}

use Field::{Chars, I32, SkipU32, U32, U64};

/// `cpu_stat_t`: `cpu_sysinfo_t`, `cpu_syswait_t` and `cpu_vminfo_t`, flattened.
const CPU_STAT: &[Field] = &[
    // cpu_sysinfo_t
    U32("idle"),
    U32("user"),
    U32("kernel"),
    U32("wait"),
    U32("wait_io"),
    U32("wait_swap"),
    U32("wait_pio"),
    U32("bread"),
    U32("bwrite"),
    U32("lread"),
    U32("lwrite"),
    U32("phread"),
    U32("phwrite"),
    U32("pswitch"),
    U32("trap"),
    U32("intr"),
    U32("syscall"),
    U32("sysread"),
    U32("syswrite"),
    U32("sysfork"),
    U32("sysvfork"),
    U32("sysexec"),
    U32("readch"),
    U32("writech"),
    U32("rcvint"),
    U32("xmtint"),
    U32("mdmint"),
    U32("rawch"),
    U32("canch"),
    U32("outch"),
    U32("msg"),
    U32("sema"),
    U32("namei"),
    U32("ufsiget"),
    U32("ufsdirblk"),
    U32("ufsipage"),
    U32("ufsinopage"),
    U32("inodeovf"),
    U32("fileovf"),
    U32("procovf"),
    U32("intrthread"),
    U32("intrblk"),
    U32("idlethread"),
    U32("inv_swtch"),
    U32("nthreads"),
    U32("cpumigrate"),
    U32("xcalls"),
    U32("mutex_adenters"),
    U32("rw_rdfails"),
    U32("rw_wrfails"),
    U32("modload"),
    U32("modunload"),
    U32("bawrite"),
    // rw_enters and the win_* counters are only maintained on debug kernels.
    SkipU32(6),
    // cpu_syswait_t
    I32("iowait"),
    I32("swap"),
    I32("physio"),
    // cpu_vminfo_t
    U32("pgrec"),
    U32("pgfrec"),
    U32("pgin"),
    U32("pgpgin"),
    U32("pgout"),
    U32("pgpgout"),
    U32("swapin"),
    U32("pgswapin"),
    U32("swapout"),
    U32("pgswapout"),
    U32("zfod"),
    U32("dfree"),
    U32("scan"),
    U32("rev"),
    U32("hat_fault"),
    U32("as_fault"),
    U32("maj_fault"),
    U32("cow_fault"),
    U32("prot_fault"),
    U32("softlock"),
    U32("kernel_asflt"),
    U32("pgrrun"),
    U32("execpgin"),
    U32("execpgout"),
    U32("execfree"),
    U32("anonpgin"),
    U32("anonpgout"),
    U32("anonfree"),
    U32("fspgin"),
    U32("fspgout"),
    U32("fsfree"),
];

const VAR: &[Field] = &[
    I32("v_buf"),
    I32("v_call"),
    I32("v_proc"),
    I32("v_maxupttl"),
    I32("v_nglobpris"),
    I32("v_maxsyspri"),
    I32("v_clist"),
    I32("v_maxup"),
    I32("v_hbuf"),
    I32("v_hmask"),
    I32("v_pbuf"),
    I32("v_sptmap"),
    I32("v_maxpmem"),
    I32("v_autoup"),
    I32("v_bufhwm"),
];

const NCSTATS: &[Field] = &[
    I32("hits"),
    I32("misses"),
    I32("enters"),
    I32("dbl_enters"),
    I32("long_enter"),
    I32("long_look"),
    I32("move_to_front"),
    I32("purges"),
];

const SYSINFO: &[Field] = &[
    U32("updates"),
    U32("runque"),
    U32("runocc"),
    U32("swpque"),
    U32("swpocc"),
    U32("waiting"),
];

const VMINFO: &[Field] = &[
    U64("freemem"),
    U64("swap_resv"),
    U64("swap_alloc"),
    U64("swap_avail"),
    U64("swap_free"),
    U64("updates"),
];

/// `struct mntinfo_kstat` (NFS client mounts).
const MNTINFO: &[Field] = &[
    Chars("mik_proto", 128),
    U32("mik_vers"),
    U32("mik_flags"),
    U32("mik_secmod"),
    U32("mik_curread"),
    U32("mik_curwrite"),
    I32("mik_timeo"),
    I32("mik_retrans"),
    U32("mik_acregmin"),
    U32("mik_acregmax"),
    U32("mik_acdirmin"),
    U32("mik_acdirmax"),
    U32("lookup_srtt"),
    U32("lookup_deviate"),
    U32("lookup_rtxcur"),
    U32("read_srtt"),
    U32("read_deviate"),
    U32("read_rtxcur"),
    U32("write_srtt"),
    U32("write_deviate"),
    U32("write_rtxcur"),
    // mik_timers[3] is unused
    SkipU32(3),
    Chars("mik_curserver", 257),
    U32("mik_noresponse"),
    U32("mik_failover"),
    U32("mik_remap"),
];

/// Raw statistics this crate knows how to decode.
pub static RAW_LAYOUTS: &[RawLayout] = &[
    RawLayout {
        name: "cpu_stat",
        fields: CPU_STAT,
    },
    RawLayout {
        name: "var",
        fields: VAR,
    },
    RawLayout {
        name: "ncstats",
        fields: NCSTATS,
    },
    RawLayout {
        name: "sysinfo",
        fields: SYSINFO,
    },
    RawLayout {
        name: "vminfo",
        fields: VMINFO,
    },
    RawLayout {
        name: "mntinfo",
        fields: MNTINFO,
    },
];

/// Returns the layout registered for a raw statistic name.
pub fn layout_for(name: &str) -> Option<&'static RawLayout> {
    RAW_LAYOUTS.iter().find(|l| l.name == name)
}

/// Finds the layout for a statistic's module and name.
///
/// The per-CPU `cpu_stat` statistics are named `cpu_statN` under module
/// `cpu_stat`, so they are matched by module as well.
pub fn layout_for_stat(module: &str, name: &str) -> Option<&'static RawLayout> {
    layout_for(name).or_else(|| {
        if module == "cpu_stat" && name.starts_with("cpu_stat") {
            layout_for("cpu_stat")
        } else {
            None
        }
    })
}

/// Decodes a raw payload. Unknown or short payloads yield an empty map.
pub(crate) fn decode(desc: &Descriptor, data: &[u8]) -> Value {
    let Some(layout) = layout_for_stat(&desc.module, &desc.name) else {
        debug!(
            module = %desc.module,
            name = %desc.name,
            instance = desc.instance,
            "No layout for raw kstat"
        );
        return Value::Map(ValueMap::new());
    };

    let expected = layout.size();
    if data.len() < expected {
        debug!(
            module = %desc.module,
            name = %desc.name,
            instance = desc.instance,
            expected,
            actual = data.len(),
            "Raw kstat shorter than its layout"
        );
        return Value::Map(ValueMap::new());
    }

    match layout.decode(data) {
        Ok(map) => Value::Map(map),
        Err(e) => {
            debug!(error = %e, name = %desc.name, "Failed to decode raw kstat");
            Value::Map(ValueMap::new())
        }
    }
}

/// Encodes values into a layout's struct image. Fields missing from
/// `values` are left zero.
#[cfg(any(test, feature = "mock"))]
pub fn encode(layout: &RawLayout, values: &[(&str, Value)]) -> Vec<u8> {
    let mut buf = vec![0u8; layout.size()];
    let mut pos = 0;
    for f in layout.fields {
        pos = align_up(pos, f.align());
        let key = match *f {
            Field::U32(k) | Field::I32(k) | Field::U64(k) | Field::Chars(k, _) => Some(k),
            Field::SkipU32(_) => None,
        };
        let value = key.and_then(|k| values.iter().find(|(name, _)| *name == k).map(|(_, v)| v));
        if let Some(value) = value {
            let slot = &mut buf[pos..pos + f.size()];
            match (*f, value) {
                (Field::U32(_), v) => {
                    let v = v.as_u64().unwrap_or(0) as u32;
                    slot.copy_from_slice(&v.to_ne_bytes());
                }
                (Field::I32(_), v) => {
                    let v = v.as_i64().unwrap_or(0) as i32;
                    slot.copy_from_slice(&v.to_ne_bytes());
                }
                (Field::U64(_), v) => {
                    slot.copy_from_slice(&v.as_u64().unwrap_or(0).to_ne_bytes());
                }
                (Field::Chars(_, n), v) => {
                    let s = v.as_str().unwrap_or_default().as_bytes();
                    let len = s.len().min(n - 1);
                    slot[..len].copy_from_slice(&s[..len]);
                }
                _ => {}
            }
        }
        pos += f.size();
    }
    buf
}
