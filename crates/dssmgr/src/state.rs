//! Coordinator state: registries, volume allocation, and the
//! critical-section protocol.
//!
//! All of it lives behind one `tokio::sync::Mutex` owned by the serve
//! loop, so every check-then-act sequence here runs atomically. No
//! method suspends; hold times are map lookups and inserts.
//!
//! Phase-1 methods (`begin_copy`, `begin_disk_failure`,
//! `begin_decommission`) acquire the single critical section and hand
//! back routing info; the matching phase-2 methods commit and release.
//! A client that dies between the phases leaves the section held —
//! a known liveness limitation of the protocol, there is no lease.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::net::IpAddr;

use dss_proto::constants::MIN_VOLUME_DISKS;
use dss_proto::layout::{valid_name, validate_striping_unit};
use dss_proto::message::{FileEntry, VolumeListing};
use dss_proto::{DiskTarget, DssError, DssResult, VolumeLayout};
use rand::seq::IteratorRandom;
use tracing::info;

/// A registered disk node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRecord {
    pub ip: IpAddr,
    pub mgmt_port: u16,
    pub cmd_port: u16,
    pub status: DiskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskStatus {
    Free,
    InVolume(String),
}

/// A registered user process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub ip: IpAddr,
    pub mgmt_port: u16,
    pub cmd_port: u16,
}

/// A file committed into a volume by a completed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub size: u64,
    pub owner: String,
}

/// A configured volume. `disks` order defines the slot mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub n: usize,
    pub striping_unit: usize,
    pub disks: Vec<String>,
    pub files: BTreeMap<String, FileRecord>,
}

/// Phase-1 record of an in-flight copy, keyed by owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCopy {
    pub volume: String,
    pub file: String,
    pub size: u64,
}

/// The manager's entire mutable state.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    users: BTreeMap<String, UserRecord>,
    disks: BTreeMap<String, DiskRecord>,
    volumes: BTreeMap<String, Volume>,
    /// At most one volume under structural change at a time
    critical_section: Option<String>,
    pending_copies: BTreeMap<String, PendingCopy>,
    pending_failures: BTreeSet<String>,
    read_sets: BTreeMap<String, BTreeSet<String>>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------- registration ----------

    pub fn register_user(
        &mut self,
        name: &str,
        ip: IpAddr,
        mgmt_port: u16,
        cmd_port: u16,
    ) -> DssResult<()> {
        if !valid_name(name) {
            return Err(DssError::BadName);
        }
        if self.users.contains_key(name) {
            return Err(DssError::UserExists);
        }
        self.users.insert(
            name.to_string(),
            UserRecord {
                ip,
                mgmt_port,
                cmd_port,
            },
        );
        info!("user registered: {} @ {} m:{} c:{}", name, ip, mgmt_port, cmd_port);
        Ok(())
    }

    pub fn register_disk(
        &mut self,
        name: &str,
        ip: IpAddr,
        mgmt_port: u16,
        cmd_port: u16,
    ) -> DssResult<()> {
        if !valid_name(name) {
            return Err(DssError::BadName);
        }
        if self.disks.contains_key(name) {
            return Err(DssError::DiskExists);
        }
        self.disks.insert(
            name.to_string(),
            DiskRecord {
                ip,
                mgmt_port,
                cmd_port,
                status: DiskStatus::Free,
            },
        );
        info!("disk registered: {} @ {} m:{} c:{}", name, ip, mgmt_port, cmd_port);
        Ok(())
    }

    pub fn deregister_user(&mut self, name: &str) -> DssResult<()> {
        if !self.users.contains_key(name) {
            return Err(DssError::NoSuchUser);
        }
        // A user mid-operation keeps its registration until phase 2
        if self.pending_copies.contains_key(name)
            || self.read_sets.values().any(|set| set.contains(name))
        {
            return Err(DssError::UserBusy);
        }
        self.users.remove(name);
        info!("user deregistered: {}", name);
        Ok(())
    }

    pub fn deregister_disk(&mut self, name: &str) -> DssResult<()> {
        let disk = self.disks.get(name).ok_or(DssError::NoSuchDisk)?;
        if matches!(disk.status, DiskStatus::InVolume(_)) {
            return Err(DssError::DiskInDss);
        }
        self.disks.remove(name);
        info!("disk deregistered: {}", name);
        Ok(())
    }

    // ---------- volume allocation ----------

    /// Create a volume over `n` currently-Free disks, chosen uniformly
    /// at random. The selection and the Free→InVolume transition are
    /// one atomic step under the state lock.
    pub fn configure_dss(&mut self, name: &str, n: usize, su: usize) -> DssResult<Vec<String>> {
        if !valid_name(name) {
            return Err(DssError::BadName);
        }
        if n < MIN_VOLUME_DISKS {
            return Err(DssError::TooFewDisks);
        }
        validate_striping_unit(su)?;
        if self.volumes.contains_key(name) {
            return Err(DssError::DssExists);
        }

        let free: Vec<String> = self
            .disks
            .iter()
            .filter(|(_, d)| d.status == DiskStatus::Free)
            .map(|(name, _)| name.clone())
            .collect();
        if free.len() < n {
            return Err(DssError::InsufficientDisks);
        }

        let chosen: Vec<String> = free
            .into_iter()
            .choose_multiple(&mut rand::thread_rng(), n);
        for d in &chosen {
            if let Some(disk) = self.disks.get_mut(d) {
                disk.status = DiskStatus::InVolume(name.to_string());
            }
        }
        self.volumes.insert(
            name.to_string(),
            Volume {
                n,
                striping_unit: su,
                disks: chosen.clone(),
                files: BTreeMap::new(),
            },
        );
        info!("DSS configured: {} n={} su={} disks={:?}", name, n, su, chosen);
        Ok(chosen)
    }

    pub fn list(&self) -> DssResult<Vec<VolumeListing>> {
        if self.volumes.is_empty() {
            return Err(DssError::NoDssConfigured);
        }
        Ok(self
            .volumes
            .iter()
            .map(|(name, v)| VolumeListing {
                name: name.clone(),
                n: v.n,
                striping_unit: v.striping_unit,
                disks: v.disks.clone(),
                files: v
                    .files
                    .iter()
                    .map(|(fname, f)| FileEntry {
                        name: fname.clone(),
                        size: f.size,
                        owner: f.owner.clone(),
                    })
                    .collect(),
            })
            .collect())
    }

    // ---------- copy (phase 1 / phase 2) ----------

    pub fn begin_copy(&mut self, file: &str, size: u64, owner: &str) -> DssResult<VolumeLayout> {
        // A re-sent phase-1 datagram must not allocate a second
        // pending entry: same owner, same file, same size ⇒ same grant.
        if let Some(pending) = self.pending_copies.get(owner) {
            if pending.file == file && pending.size == size {
                return self.layout_of(&pending.volume.clone());
            }
            return Err(DssError::CriticalSectionBusy);
        }
        if self.critical_section.is_some() {
            return Err(DssError::CriticalSectionBusy);
        }
        if self.volumes.is_empty() {
            return Err(DssError::NoDssConfigured);
        }

        let volume = self
            .volumes
            .keys()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(DssError::NoDssConfigured)?;
        self.critical_section = Some(volume.clone());
        self.pending_copies.insert(
            owner.to_string(),
            PendingCopy {
                volume: volume.clone(),
                file: file.to_string(),
                size,
            },
        );
        info!("copy granted: {} -> {} ({} bytes) by {}", file, volume, size, owner);
        self.layout_of(&volume)
    }

    pub fn complete_copy(&mut self, owner: &str) -> DssResult<()> {
        let pending = self
            .pending_copies
            .remove(owner)
            .ok_or(DssError::NoPendingCopy)?;
        if let Some(volume) = self.volumes.get_mut(&pending.volume) {
            volume.files.insert(
                pending.file.clone(),
                FileRecord {
                    size: pending.size,
                    owner: owner.to_string(),
                },
            );
        }
        self.release(&pending.volume);
        info!("copy committed: {}/{} ({} bytes)", pending.volume, pending.file, pending.size);
        Ok(())
    }

    // ---------- read (tracked outside the critical section) ----------

    pub fn begin_read(
        &mut self,
        volume: &str,
        file: &str,
        user: &str,
    ) -> DssResult<(VolumeLayout, u64)> {
        let v = self.volumes.get(volume).ok_or(DssError::NoSuchDss)?;
        let record = v.files.get(file).ok_or(DssError::NoSuchFile)?;
        if record.owner != user {
            return Err(DssError::NotOwner);
        }
        // Reads coexist with an operation on the same volume, but not
        // with structural changes elsewhere.
        if let Some(locked) = &self.critical_section {
            if locked != volume {
                return Err(DssError::CriticalSectionBusy);
            }
        }
        let size = record.size;
        self.read_sets
            .entry(volume.to_string())
            .or_default()
            .insert(user.to_string());
        let layout = self.layout_of(volume)?;
        Ok((layout, size))
    }

    /// Idempotent: an absent entry is not an error.
    pub fn complete_read(&mut self, user: &str, volume: &str) {
        let emptied = match self.read_sets.get_mut(volume) {
            Some(set) => {
                set.remove(user);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            self.read_sets.remove(volume);
        }
    }

    // ---------- disk failure (phase 1 / phase 2) ----------

    pub fn begin_disk_failure(&mut self, volume: &str) -> DssResult<VolumeLayout> {
        if !self.volumes.contains_key(volume) {
            return Err(DssError::NoSuchDss);
        }
        // Retry de-duplication: the grant is keyed by volume.
        if self.pending_failures.contains(volume) {
            return self.layout_of(volume);
        }
        if self.read_sets.get(volume).is_some_and(|s| !s.is_empty()) {
            return Err(DssError::ReadsInProgress);
        }
        if self.critical_section.is_some() {
            return Err(DssError::CriticalSectionBusy);
        }
        self.critical_section = Some(volume.to_string());
        self.pending_failures.insert(volume.to_string());
        info!("disk-failure granted on {}", volume);
        self.layout_of(volume)
    }

    pub fn complete_recovery(&mut self, volume: &str) -> DssResult<()> {
        if !self.pending_failures.remove(volume) {
            return Err(DssError::NoPendingFailure);
        }
        self.release(volume);
        info!("recovery complete on {}", volume);
        Ok(())
    }

    // ---------- decommission (phase 1 / phase 2) ----------

    pub fn begin_decommission(&mut self, volume: &str) -> DssResult<VolumeLayout> {
        if !self.volumes.contains_key(volume) {
            return Err(DssError::NoSuchDss);
        }
        if self.critical_section.is_some() {
            return Err(DssError::CriticalSectionBusy);
        }
        self.critical_section = Some(volume.to_string());
        info!("decommission granted on {}", volume);
        self.layout_of(volume)
    }

    pub fn complete_decommission(&mut self, volume: &str) -> DssResult<()> {
        let v = self.volumes.remove(volume).ok_or(DssError::NoSuchDss)?;
        for name in &v.disks {
            if let Some(disk) = self.disks.get_mut(name) {
                disk.status = DiskStatus::Free;
            }
        }
        self.read_sets.remove(volume);
        self.release(volume);
        info!("DSS decommissioned: {} ({} disks freed)", volume, v.disks.len());
        Ok(())
    }

    // ---------- introspection ----------

    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "users={:?} ", self.users.keys().collect::<Vec<_>>());
        let _ = write!(
            out,
            "disks={:?} ",
            self.disks
                .iter()
                .map(|(n, d)| format!("{}:{:?}", n, d.status))
                .collect::<Vec<_>>()
        );
        let _ = write!(out, "volumes={:?} ", self.volumes.keys().collect::<Vec<_>>());
        let _ = write!(out, "critical_section={:?} ", self.critical_section);
        let _ = write!(
            out,
            "pending_copies={:?} pending_failures={:?}",
            self.pending_copies.keys().collect::<Vec<_>>(),
            self.pending_failures
        );
        out
    }

    // ---------- helpers ----------

    fn release(&mut self, volume: &str) {
        if self.critical_section.as_deref() == Some(volume) {
            self.critical_section = None;
        }
    }

    fn layout_of(&self, volume: &str) -> DssResult<VolumeLayout> {
        let v = self.volumes.get(volume).ok_or(DssError::NoSuchDss)?;
        let disks = v
            .disks
            .iter()
            .map(|name| {
                let d = self.disks.get(name).ok_or(DssError::Internal)?;
                Ok(DiskTarget::new(name.clone(), d.ip, d.cmd_port))
            })
            .collect::<DssResult<Vec<_>>>()?;
        Ok(VolumeLayout {
            volume: volume.to_string(),
            n: v.n,
            striping_unit: v.striping_unit,
            disks,
        })
    }

    #[cfg(test)]
    pub fn disk_status(&self, name: &str) -> Option<&DiskStatus> {
        self.disks.get(name).map(|d| &d.status)
    }

    #[cfg(test)]
    pub fn critical_section(&self) -> Option<&str> {
        self.critical_section.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn state_with_disks(names: &[&str]) -> CoordinatorState {
        let mut s = CoordinatorState::new();
        for (i, name) in names.iter().enumerate() {
            s.register_disk(name, ip(), 8000 + i as u16, 9000 + i as u16)
                .unwrap();
        }
        s
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_names() {
        let mut s = CoordinatorState::new();
        s.register_user("ursula", ip(), 8000, 9000).unwrap();
        assert_eq!(
            s.register_user("ursula", ip(), 8001, 9001),
            Err(DssError::UserExists)
        );
        assert_eq!(
            s.register_user("not-alpha1", ip(), 8002, 9002),
            Err(DssError::BadName)
        );
        s.register_disk("alpha", ip(), 8003, 9003).unwrap();
        assert_eq!(
            s.register_disk("alpha", ip(), 8004, 9004),
            Err(DssError::DiskExists)
        );
    }

    #[test]
    fn test_configure_marks_exactly_n_disks() {
        let mut s = state_with_disks(&["a", "b", "c", "d"]);
        let chosen = s.configure_dss("vol", 3, 512).unwrap();
        assert_eq!(chosen.len(), 3);
        let in_volume = ["a", "b", "c", "d"]
            .iter()
            .filter(|d| {
                matches!(
                    s.disk_status(d),
                    Some(DiskStatus::InVolume(v)) if v == "vol"
                )
            })
            .count();
        assert_eq!(in_volume, 3);
        // Selection only touched Free disks and left one Free
        let free = ["a", "b", "c", "d"]
            .iter()
            .filter(|d| s.disk_status(d) == Some(&DiskStatus::Free))
            .count();
        assert_eq!(free, 1);
    }

    #[test]
    fn test_configure_insufficient_disks_changes_nothing() {
        let mut s = state_with_disks(&["a", "b"]);
        assert_eq!(
            s.configure_dss("vol", 3, 512),
            Err(DssError::InsufficientDisks)
        );
        assert_eq!(s.disk_status("a"), Some(&DiskStatus::Free));
        assert_eq!(s.disk_status("b"), Some(&DiskStatus::Free));
        assert!(s.list().is_err());
    }

    #[test]
    fn test_configure_validation() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        assert_eq!(s.configure_dss("vol9", 3, 512), Err(DssError::BadName));
        assert_eq!(s.configure_dss("vol", 2, 512), Err(DssError::TooFewDisks));
        assert_eq!(
            s.configure_dss("vol", 3, 500),
            Err(DssError::SuNotPowerOfTwo)
        );
        assert_eq!(s.configure_dss("vol", 3, 64), Err(DssError::SuOutOfRange));
        s.configure_dss("vol", 3, 512).unwrap();
        assert_eq!(s.configure_dss("vol", 3, 512), Err(DssError::DssExists));
    }

    #[test]
    fn test_copy_phases_commit_file_and_release_section() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();

        let layout = s.begin_copy("notes.txt", 1500, "ursula").unwrap();
        assert_eq!(layout.volume, "vol");
        assert_eq!(layout.n, 3);
        assert_eq!(s.critical_section(), Some("vol"));

        s.complete_copy("ursula").unwrap();
        assert_eq!(s.critical_section(), None);

        let listing = s.list().unwrap();
        assert_eq!(listing[0].files.len(), 1);
        assert_eq!(listing[0].files[0].name, "notes.txt");
        assert_eq!(listing[0].files[0].size, 1500);
        assert_eq!(listing[0].files[0].owner, "ursula");
    }

    #[test]
    fn test_complete_copy_without_pending_fails() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();
        assert_eq!(s.complete_copy("nobody"), Err(DssError::NoPendingCopy));
    }

    #[test]
    fn test_begin_copy_retry_is_deduplicated() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();

        let first = s.begin_copy("notes.txt", 1500, "ursula").unwrap();
        // A re-sent identical request gets the same grant back
        let second = s.begin_copy("notes.txt", 1500, "ursula").unwrap();
        assert_eq!(first, second);
        // But a different request from the same owner is a conflict
        assert_eq!(
            s.begin_copy("other.txt", 99, "ursula"),
            Err(DssError::CriticalSectionBusy)
        );
        s.complete_copy("ursula").unwrap();
        assert_eq!(s.complete_copy("ursula"), Err(DssError::NoPendingCopy));
    }

    #[test]
    fn test_critical_section_excludes_conflicting_operations() {
        let mut s = state_with_disks(&["a", "b", "c", "d", "e", "f"]);
        s.configure_dss("vol", 3, 512).unwrap();
        s.configure_dss("other", 3, 512).unwrap();

        s.begin_copy("f.bin", 100, "ursula").unwrap();
        assert_eq!(
            s.begin_disk_failure("vol"),
            Err(DssError::CriticalSectionBusy)
        );
        assert_eq!(
            s.begin_disk_failure("other"),
            Err(DssError::CriticalSectionBusy)
        );
        assert_eq!(
            s.begin_decommission("other"),
            Err(DssError::CriticalSectionBusy)
        );
        assert_eq!(
            s.begin_copy("g.bin", 5, "vince"),
            Err(DssError::CriticalSectionBusy)
        );

        s.complete_copy("ursula").unwrap();
        s.begin_disk_failure("other").unwrap();
        s.complete_recovery("other").unwrap();
        assert_eq!(s.critical_section(), None);
    }

    #[test]
    fn test_read_allowed_on_locked_volume_only() {
        let mut s = state_with_disks(&["a", "b", "c", "d", "e", "f"]);
        s.configure_dss("vol", 3, 512).unwrap();
        s.configure_dss("other", 3, 512).unwrap();

        // Copy picks a random volume; loop until both hold the file
        loop {
            s.begin_copy("f.bin", 64, "ursula").unwrap();
            s.complete_copy("ursula").unwrap();
            if s.list().unwrap().iter().all(|v| !v.files.is_empty()) {
                break;
            }
        }

        s.begin_decommission("vol").unwrap();
        // Read of the locked volume proceeds; another volume is barred
        assert!(s.begin_read("vol", "f.bin", "ursula").is_ok());
        assert_eq!(
            s.begin_read("other", "f.bin", "ursula"),
            Err(DssError::CriticalSectionBusy)
        );
        s.complete_decommission("vol").unwrap();
    }

    #[test]
    fn test_read_checks_existence_and_ownership() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();
        s.begin_copy("f.bin", 64, "ursula").unwrap();
        s.complete_copy("ursula").unwrap();

        assert_eq!(
            s.begin_read("nope", "f.bin", "ursula"),
            Err(DssError::NoSuchDss)
        );
        assert_eq!(
            s.begin_read("vol", "nope.bin", "ursula"),
            Err(DssError::NoSuchFile)
        );
        assert_eq!(
            s.begin_read("vol", "f.bin", "vince"),
            Err(DssError::NotOwner)
        );
        let (layout, size) = s.begin_read("vol", "f.bin", "ursula").unwrap();
        assert_eq!(layout.n, 3);
        assert_eq!(size, 64);
    }

    #[test]
    fn test_disk_failure_refused_while_reads_in_progress() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();
        s.begin_copy("f.bin", 64, "ursula").unwrap();
        s.complete_copy("ursula").unwrap();
        s.begin_read("vol", "f.bin", "ursula").unwrap();

        assert_eq!(s.begin_disk_failure("vol"), Err(DssError::ReadsInProgress));

        s.complete_read("ursula", "vol");
        s.begin_disk_failure("vol").unwrap();
        // Retry of the same grant is answered, not refused
        assert!(s.begin_disk_failure("vol").is_ok());
        s.complete_recovery("vol").unwrap();
        assert_eq!(s.complete_recovery("vol"), Err(DssError::NoPendingFailure));
    }

    #[test]
    fn test_complete_read_is_idempotent() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();
        s.complete_read("ursula", "vol");
        s.complete_read("ursula", "nope");
    }

    #[test]
    fn test_disk_lifecycle_through_decommission() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.configure_dss("vol", 3, 512).unwrap();

        for d in ["a", "b", "c"] {
            assert_eq!(s.deregister_disk(d), Err(DssError::DiskInDss));
        }

        s.begin_decommission("vol").unwrap();
        s.complete_decommission("vol").unwrap();
        assert_eq!(s.critical_section(), None);
        assert!(s.list().is_err());

        for d in ["a", "b", "c"] {
            s.deregister_disk(d).unwrap();
        }
        assert_eq!(s.deregister_disk("a"), Err(DssError::NoSuchDisk));
    }

    #[test]
    fn test_busy_user_cannot_deregister() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        s.register_user("ursula", ip(), 8000, 9000).unwrap();
        s.configure_dss("vol", 3, 512).unwrap();

        s.begin_copy("f.bin", 64, "ursula").unwrap();
        assert_eq!(s.deregister_user("ursula"), Err(DssError::UserBusy));
        s.complete_copy("ursula").unwrap();

        s.begin_read("vol", "f.bin", "ursula").unwrap();
        assert_eq!(s.deregister_user("ursula"), Err(DssError::UserBusy));
        s.complete_read("ursula", "vol");

        s.deregister_user("ursula").unwrap();
    }

    #[test]
    fn test_copy_fails_without_volumes() {
        let mut s = state_with_disks(&["a", "b", "c"]);
        assert_eq!(
            s.begin_copy("f.bin", 64, "ursula"),
            Err(DssError::NoDssConfigured)
        );
        assert_eq!(s.list(), Err(DssError::NoDssConfigured));
    }
}
