//! Pre-built mock registries for testing.
//!
//! These scenarios resemble the kstat chain of a small illumos system.

use crate::decode::NamedBuilder;
use crate::value::Value;

use super::registry::{MockIo, MockKstat, MockTimer};

/// Number of CPUs in [`MockKstat::typical_system`].
pub const TYPICAL_NCPUS: i32 = 2;

/// Named counters of `cpu:N:sys`, scaled by `scale` so CPUs differ.
pub fn cpu_sys_fields(scale: u64) -> NamedBuilder {
    NamedBuilder::new()
        .u64("cpu_nsec_idle", 8_000_000_000 * scale)
        .u64("cpu_nsec_kernel", 1_500_000_000 * scale)
        .u64("cpu_nsec_user", 500_000_000 * scale)
        .u64("cpu_ticks_idle", 800 * scale)
        .u64("cpu_ticks_kernel", 150 * scale)
        .u64("cpu_ticks_user", 50 * scale)
        .u64("cpumigrate", 40 * scale)
        .u64("intr", 9_000 * scale)
        .u64("intrthread", 1_200 * scale)
        .u64("inv_swtch", 30 * scale)
        .u64("mutex_adenters", 75 * scale)
        .u64("pswitch", 4_000 * scale)
        .u64("rw_rdfails", scale)
        .u64("rw_wrfails", 2 * scale)
        .u64("syscall", 25_000 * scale)
        .u64("xcalls", 600 * scale)
}

/// Named counters of `cpu:N:vm`.
pub fn cpu_vm_fields(scale: u64) -> NamedBuilder {
    NamedBuilder::new()
        .u64("anonfree", 0)
        .u64("anonpgin", 3 * scale)
        .u64("as_fault", 2_000 * scale)
        .u64("cow_fault", 150 * scale)
        .u64("hat_fault", 10 * scale)
        .u64("maj_fault", 4 * scale)
        .u64("pgin", 12 * scale)
        .u64("pgout", 0)
        .u64("prot_fault", 300 * scale)
        .u64("zfod", 900 * scale)
}

impl MockKstat {
    /// Creates a registry with two CPUs and one of each kind of statistic.
    ///
    /// Includes: `cpu:N:sys`, `cpu:N:vm`, `cpu_stat:N:cpu_statN`,
    /// `unix:0:system_misc`, the `unix` raw structs, an `sd` disk, an
    /// interrupt controller, a timer and an NFS mount.
    pub fn typical_system() -> Self {
        let mut mock = Self::new();

        for cpu in 0..TYPICAL_NCPUS {
            let scale = cpu as u64 + 1;
            mock.add_named("cpu", "misc", "sys", cpu, cpu_sys_fields(scale));
            mock.add_named("cpu", "misc", "vm", cpu, cpu_vm_fields(scale));
            mock.add_named(
                "cpu_info",
                "misc",
                &format!("cpu_info{}", cpu),
                cpu,
                NamedBuilder::new()
                    .i32("chip_id", 0)
                    .i32("core_id", cpu)
                    .u64("clock_MHz", 2400)
                    .string("brand", "Intel(r) Xeon(r) CPU E5-2690 v4 @ 2.60GHz")
                    .string("state", "on-line"),
            );
            mock.add_raw_struct(
                "cpu_stat",
                "misc",
                &format!("cpu_stat{}", cpu),
                cpu,
                &[
                    ("idle", Value::U32(800 * scale as u32)),
                    ("user", Value::U32(50 * scale as u32)),
                    ("kernel", Value::U32(150 * scale as u32)),
                    ("pswitch", Value::U32(4_000 * scale as u32)),
                    ("syscall", Value::U32(25_000 * scale as u32)),
                    ("as_fault", Value::U32(2_000 * scale as u32)),
                ],
            );
        }

        mock.add_named(
            "unix",
            "misc",
            "system_misc",
            0,
            NamedBuilder::new()
                .u32("ncpus", TYPICAL_NCPUS as u32)
                .u32("lbolt", 1_234_567)
                .u32("deficit", 0)
                .u32("clk_intr", 1_234_567)
                .u32("vac", 0)
                .u32("nproc", 87)
                .u32("avenrun_1min", 39)
                .u32("avenrun_5min", 27)
                .u32("avenrun_15min", 18)
                .u32("boot_time", 1_700_000_000)
                .u32("nsec_per_tick", 10_000_000),
        );
        mock.add_raw_struct(
            "unix",
            "vm",
            "vminfo",
            0,
            &[
                ("freemem", Value::U64(2_097_152)),
                ("swap_resv", Value::U64(400_000)),
                ("swap_alloc", Value::U64(350_000)),
                ("swap_avail", Value::U64(3_600_000)),
                ("swap_free", Value::U64(3_650_000)),
                ("updates", Value::U64(12_345)),
            ],
        );
        mock.add_raw_struct(
            "unix",
            "misc",
            "ncstats",
            0,
            &[
                ("hits", Value::I32(180_000)),
                ("misses", Value::I32(2_500)),
                ("enters", Value::I32(2_400)),
                ("purges", Value::I32(3)),
            ],
        );
        mock.add_raw_struct(
            "unix",
            "misc",
            "var",
            0,
            &[
                ("v_buf", Value::I32(100)),
                ("v_call", Value::I32(0)),
                ("v_proc", Value::I32(16_362)),
                ("v_maxupttl", Value::I32(16_357)),
                ("v_nglobpris", Value::I32(110)),
                ("v_maxsyspri", Value::I32(99)),
                ("v_maxup", Value::I32(16_357)),
                ("v_autoup", Value::I32(30)),
                ("v_bufhwm", Value::I32(82_000)),
            ],
        );
        mock.add_raw_struct(
            "unix",
            "misc",
            "sysinfo",
            0,
            &[
                ("updates", Value::U32(12_345)),
                ("runque", Value::U32(40)),
                ("runocc", Value::U32(35)),
                ("waiting", Value::U32(0)),
            ],
        );

        mock.add_io(
            "sd",
            "disk",
            "sd0",
            0,
            MockIo {
                nread: 524_288_000,
                nwritten: 104_857_600,
                reads: 12_000,
                writes: 3_400,
                wtime: 1_000_000,
                wlentime: 2_000_000,
                wlastupdate: 9_000_000_000,
                rtime: 40_000_000,
                rlentime: 60_000_000,
                rlastupdate: 9_000_000_000,
                wcnt: 0,
                rcnt: 1,
            },
        );
        mock.add_intr("pcplusmp", "controller", "pcplusmp", 0, [98_765, 12, 0, 1, 0]);
        mock.add_timer(
            "unix",
            "misc",
            "segkp_timer",
            0,
            MockTimer {
                name: "segkp_timer".to_string(),
                num_events: 42,
                elapsed_time: 840_000,
                min_time: 10_000,
                max_time: 90_000,
                start_time: 8_000_000_000,
                stop_time: 8_000_090_000,
            },
        );
        mock.add_raw_struct(
            "nfs",
            "misc",
            "mntinfo",
            1,
            &[
                ("mik_proto", Value::String("tcp".into())),
                ("mik_vers", Value::U32(4)),
                ("mik_curread", Value::U32(1_048_576)),
                ("mik_curwrite", Value::U32(1_048_576)),
                ("mik_timeo", Value::I32(600)),
                ("mik_retrans", Value::I32(5)),
                ("mik_curserver", Value::String("nfs01.example.com".into())),
            ],
        );

        mock
    }

    /// A typical system where `cpu:1:sys` cannot be read.
    pub fn with_unreadable_stat() -> Self {
        let mut mock = Self::typical_system();
        mock.fail_snapshot("cpu", 1, "sys", 5);
        mock
    }

    /// A typical system with a named statistic of an unsupported field type.
    pub fn with_corrupt_named() -> Self {
        let mut mock = Self::typical_system();
        mock.add_named(
            "zfs",
            "misc",
            "arcstats",
            0,
            NamedBuilder::new().u64("hits", 10).raw_type("legacy_float", 5),
        );
        mock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{KstatSource, StatKind};

    #[test]
    fn test_typical_system_has_every_kind() {
        let mock = MockKstat::typical_system();
        let chain = mock.chain().unwrap();

        for kind in [
            StatKind::Named,
            StatKind::Io,
            StatKind::Interrupt,
            StatKind::Timer,
            StatKind::Raw,
        ] {
            assert!(chain.iter().any(|d| d.kind == kind), "missing {}", kind);
        }
        let cpus = chain
            .iter()
            .filter(|d| d.module == "cpu" && d.name == "sys")
            .count();
        assert_eq!(cpus, TYPICAL_NCPUS as usize);
    }

    #[test]
    fn test_unreadable_stat() {
        let mut mock = MockKstat::with_unreadable_stat();
        let chain = mock.chain().unwrap();
        let bad = chain
            .iter()
            .find(|d| d.module == "cpu" && d.instance == 1 && d.name == "sys")
            .unwrap();
        assert!(mock.snapshot(bad.handle).is_err());
    }

    #[test]
    fn test_corrupt_named_is_last() {
        let mock = MockKstat::with_corrupt_named();
        let chain = mock.chain().unwrap();
        assert_eq!(chain.last().map(|d| d.name.as_str()), Some("arcstats"));
    }
}
