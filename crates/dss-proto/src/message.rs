//! Control-plane request and response types with the `|`-joined UTF-8
//! text codec.
//!
//! Requests and responses are single datagrams. A response is either
//! `SUCCESS` (optionally followed by `|`-joined payload fields) or
//! `FAILURE|<reason-token>`. Response payload shapes differ per
//! request, so the client uses the targeted `parse_*` functions below
//! rather than one blanket decoder.

use crate::error::{DssError, DssResult};
use crate::layout::{DiskTarget, VolumeLayout};

/// Requests accepted by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerRequest {
    RegisterUser {
        name: String,
        ip: String,
        mgmt_port: u16,
        cmd_port: u16,
    },
    RegisterDisk {
        name: String,
        ip: String,
        mgmt_port: u16,
        cmd_port: u16,
    },
    DeregisterUser {
        name: String,
    },
    DeregisterDisk {
        name: String,
    },
    ConfigureDss {
        name: String,
        n: usize,
        striping_unit: usize,
    },
    Ls,
    Copy {
        file: String,
        size: u64,
        owner: String,
    },
    CopyComplete {
        owner: String,
    },
    Read {
        volume: String,
        file: String,
        user: String,
    },
    ReadComplete {
        user: String,
        volume: String,
    },
    DiskFailure {
        volume: String,
    },
    RecoveryComplete {
        volume: String,
    },
    DecommissionDss {
        volume: String,
    },
    DecommissionComplete {
        volume: String,
    },
    DumpState,
}

impl ManagerRequest {
    /// Decode a request datagram.
    pub fn parse(text: &str) -> DssResult<Self> {
        let parts: Vec<&str> = text.trim_end_matches(['\r', '\n']).split('|').collect();
        let cmd = parts[0];
        match cmd {
            "register-user" | "register-disk" => {
                if parts.len() != 5 {
                    return Err(DssError::InvalidArity);
                }
                let mgmt_port = parse_port(parts[3])?;
                let cmd_port = parse_port(parts[4])?;
                let (name, ip) = (parts[1].to_string(), parts[2].to_string());
                if cmd == "register-user" {
                    Ok(Self::RegisterUser {
                        name,
                        ip,
                        mgmt_port,
                        cmd_port,
                    })
                } else {
                    Ok(Self::RegisterDisk {
                        name,
                        ip,
                        mgmt_port,
                        cmd_port,
                    })
                }
            }
            "deregister-user" => Ok(Self::DeregisterUser {
                name: one_field(&parts)?,
            }),
            "deregister-disk" => Ok(Self::DeregisterDisk {
                name: one_field(&parts)?,
            }),
            "configure-dss" => {
                if parts.len() != 4 {
                    return Err(DssError::InvalidArity);
                }
                let n = parts[2].parse().map_err(|_| DssError::NonInteger)?;
                let striping_unit = parts[3].parse().map_err(|_| DssError::NonInteger)?;
                Ok(Self::ConfigureDss {
                    name: parts[1].to_string(),
                    n,
                    striping_unit,
                })
            }
            "ls" => {
                if parts.len() != 1 {
                    return Err(DssError::InvalidArity);
                }
                Ok(Self::Ls)
            }
            "copy" => {
                if parts.len() != 4 {
                    return Err(DssError::InvalidArity);
                }
                let size = parts[2].parse().map_err(|_| DssError::NonInteger)?;
                Ok(Self::Copy {
                    file: parts[1].to_string(),
                    size,
                    owner: parts[3].to_string(),
                })
            }
            "copy-complete" => Ok(Self::CopyComplete {
                owner: one_field(&parts)?,
            }),
            "read" => {
                if parts.len() != 4 {
                    return Err(DssError::InvalidArity);
                }
                Ok(Self::Read {
                    volume: parts[1].to_string(),
                    file: parts[2].to_string(),
                    user: parts[3].to_string(),
                })
            }
            "read-complete" => {
                if parts.len() != 3 {
                    return Err(DssError::InvalidArity);
                }
                Ok(Self::ReadComplete {
                    user: parts[1].to_string(),
                    volume: parts[2].to_string(),
                })
            }
            "disk-failure" => Ok(Self::DiskFailure {
                volume: one_field(&parts)?,
            }),
            "recovery-complete" => Ok(Self::RecoveryComplete {
                volume: one_field(&parts)?,
            }),
            "decommission-dss" => Ok(Self::DecommissionDss {
                volume: one_field(&parts)?,
            }),
            "decommission-complete" => Ok(Self::DecommissionComplete {
                volume: one_field(&parts)?,
            }),
            "dump-state" => {
                if parts.len() != 1 {
                    return Err(DssError::InvalidArity);
                }
                Ok(Self::DumpState)
            }
            _ => Err(DssError::UnknownCommand),
        }
    }

    /// Encode this request for the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::RegisterUser {
                name,
                ip,
                mgmt_port,
                cmd_port,
            } => format!("register-user|{name}|{ip}|{mgmt_port}|{cmd_port}"),
            Self::RegisterDisk {
                name,
                ip,
                mgmt_port,
                cmd_port,
            } => format!("register-disk|{name}|{ip}|{mgmt_port}|{cmd_port}"),
            Self::DeregisterUser { name } => format!("deregister-user|{name}"),
            Self::DeregisterDisk { name } => format!("deregister-disk|{name}"),
            Self::ConfigureDss {
                name,
                n,
                striping_unit,
            } => format!("configure-dss|{name}|{n}|{striping_unit}"),
            Self::Ls => "ls".to_string(),
            Self::Copy { file, size, owner } => format!("copy|{file}|{size}|{owner}"),
            Self::CopyComplete { owner } => format!("copy-complete|{owner}"),
            Self::Read { volume, file, user } => format!("read|{volume}|{file}|{user}"),
            Self::ReadComplete { user, volume } => format!("read-complete|{user}|{volume}"),
            Self::DiskFailure { volume } => format!("disk-failure|{volume}"),
            Self::RecoveryComplete { volume } => format!("recovery-complete|{volume}"),
            Self::DecommissionDss { volume } => format!("decommission-dss|{volume}"),
            Self::DecommissionComplete { volume } => format!("decommission-complete|{volume}"),
            Self::DumpState => "dump-state".to_string(),
        }
    }
}

fn one_field(parts: &[&str]) -> DssResult<String> {
    if parts.len() != 2 {
        return Err(DssError::InvalidArity);
    }
    Ok(parts[1].to_string())
}

fn parse_port(s: &str) -> DssResult<u16> {
    s.parse().map_err(|_| DssError::NonIntegerPort)
}

/// One file as reported by `ls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub owner: String,
}

/// One volume as reported by `ls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeListing {
    pub name: String,
    pub n: usize,
    pub striping_unit: usize,
    pub disks: Vec<String>,
    pub files: Vec<FileEntry>,
}

/// Responses produced by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerResponse {
    /// Bare `SUCCESS`
    Ok,
    /// `FAILURE|<token>`
    Failure(DssError),
    /// `ls` payload
    Listing(Vec<VolumeListing>),
    /// `copy` phase-1 payload: full layout including the chosen volume
    CopyTarget(VolumeLayout),
    /// `read` phase-1 payload: layout plus the declared file size
    ReadTarget { layout: VolumeLayout, size: u64 },
    /// `disk-failure` / `decommission-dss` phase-1 payload
    Layout(VolumeLayout),
    /// `dump-state` payload
    State(String),
}

impl ManagerResponse {
    /// Encode this response for the wire.
    pub fn encode(&self) -> String {
        match self {
            Self::Ok => "SUCCESS".to_string(),
            Self::Failure(e) => format!("FAILURE|{}", e.token()),
            Self::Listing(volumes) => {
                let mut out = String::from("SUCCESS");
                for v in volumes {
                    out.push_str(&format!(
                        "|DSS:{}|n={}|striping_unit={}|disks={}",
                        v.name,
                        v.n,
                        v.striping_unit,
                        v.disks.join(",")
                    ));
                    if v.files.is_empty() {
                        out.push_str("|FILES:none");
                    } else {
                        for f in &v.files {
                            out.push_str(&format!(
                                "|FILE:{}|size={}|owner={}",
                                f.name, f.size, f.owner
                            ));
                        }
                    }
                }
                out
            }
            Self::CopyTarget(layout) => {
                let mut out = format!(
                    "SUCCESS|{}|{}|{}",
                    layout.volume, layout.n, layout.striping_unit
                );
                push_disk_triples(&mut out, &layout.disks);
                out
            }
            Self::ReadTarget { layout, size } => {
                let mut out = format!("SUCCESS|{}|{}|{}", layout.n, layout.striping_unit, size);
                push_disk_triples(&mut out, &layout.disks);
                out
            }
            Self::Layout(layout) => {
                let mut out = format!("SUCCESS|{}|{}", layout.n, layout.striping_unit);
                push_disk_triples(&mut out, &layout.disks);
                out
            }
            Self::State(text) => format!("SUCCESS|{text}"),
        }
    }
}

fn push_disk_triples(out: &mut String, disks: &[DiskTarget]) {
    for d in disks {
        out.push_str(&format!("|{}|{}|{}", d.name, d.ip, d.cmd_port));
    }
}

/// Split a response, mapping `FAILURE|token` to the matching error.
fn success_fields(text: &str) -> DssResult<Vec<&str>> {
    let parts: Vec<&str> = text.trim_end_matches(['\r', '\n']).split('|').collect();
    match parts[0] {
        "SUCCESS" => Ok(parts[1..].to_vec()),
        "FAILURE" => Err(parts
            .get(1)
            .map(|t| DssError::from_token(t))
            .unwrap_or(DssError::Internal)),
        _ => Err(DssError::BadFrame),
    }
}

/// Parse a response that carries no payload.
pub fn parse_plain(text: &str) -> DssResult<()> {
    success_fields(text).map(|_| ())
}

fn parse_disk_triples(fields: &[&str], n: usize) -> DssResult<Vec<DiskTarget>> {
    if fields.len() != n * 3 {
        return Err(DssError::BadFrame);
    }
    let mut disks = Vec::with_capacity(n);
    for chunk in fields.chunks_exact(3) {
        let ip = chunk[1].parse().map_err(|_| DssError::BadFrame)?;
        let cmd_port = chunk[2].parse().map_err(|_| DssError::BadFrame)?;
        disks.push(DiskTarget::new(chunk[0], ip, cmd_port));
    }
    Ok(disks)
}

/// Parse a `copy` phase-1 response into the chosen volume's layout.
pub fn parse_copy_target(text: &str) -> DssResult<VolumeLayout> {
    let fields = success_fields(text)?;
    if fields.len() < 3 {
        return Err(DssError::BadFrame);
    }
    let volume = fields[0].to_string();
    let n: usize = fields[1].parse().map_err(|_| DssError::BadFrame)?;
    let striping_unit = fields[2].parse().map_err(|_| DssError::BadFrame)?;
    let disks = parse_disk_triples(&fields[3..], n)?;
    Ok(VolumeLayout {
        volume,
        n,
        striping_unit,
        disks,
    })
}

/// Parse a `read` phase-1 response. The volume name is supplied by the
/// caller (it is not echoed on the wire).
pub fn parse_read_target(text: &str, volume: &str) -> DssResult<(VolumeLayout, u64)> {
    let fields = success_fields(text)?;
    if fields.len() < 3 {
        return Err(DssError::BadFrame);
    }
    let n: usize = fields[0].parse().map_err(|_| DssError::BadFrame)?;
    let striping_unit = fields[1].parse().map_err(|_| DssError::BadFrame)?;
    let size = fields[2].parse().map_err(|_| DssError::BadFrame)?;
    let disks = parse_disk_triples(&fields[3..], n)?;
    Ok((
        VolumeLayout {
            volume: volume.to_string(),
            n,
            striping_unit,
            disks,
        },
        size,
    ))
}

/// Parse a `disk-failure` or `decommission-dss` phase-1 response.
pub fn parse_layout(text: &str, volume: &str) -> DssResult<VolumeLayout> {
    let fields = success_fields(text)?;
    if fields.len() < 2 {
        return Err(DssError::BadFrame);
    }
    let n: usize = fields[0].parse().map_err(|_| DssError::BadFrame)?;
    let striping_unit = fields[1].parse().map_err(|_| DssError::BadFrame)?;
    let disks = parse_disk_triples(&fields[2..], n)?;
    Ok(VolumeLayout {
        volume: volume.to_string(),
        n,
        striping_unit,
        disks,
    })
}

/// Parse an `ls` response.
pub fn parse_listing(text: &str) -> DssResult<Vec<VolumeListing>> {
    let fields = success_fields(text)?;
    let mut volumes: Vec<VolumeListing> = Vec::new();
    let mut i = 0;
    while i < fields.len() {
        let field = fields[i];
        if let Some(name) = field.strip_prefix("DSS:") {
            if fields.len() < i + 4 {
                return Err(DssError::BadFrame);
            }
            let n = kv_field(fields[i + 1], "n=")?
                .parse()
                .map_err(|_| DssError::BadFrame)?;
            let striping_unit = kv_field(fields[i + 2], "striping_unit=")?
                .parse()
                .map_err(|_| DssError::BadFrame)?;
            let disks = kv_field(fields[i + 3], "disks=")?
                .split(',')
                .map(str::to_string)
                .collect();
            volumes.push(VolumeListing {
                name: name.to_string(),
                n,
                striping_unit,
                disks,
                files: Vec::new(),
            });
            i += 4;
        } else if let Some(fname) = field.strip_prefix("FILE:") {
            let v = volumes.last_mut().ok_or(DssError::BadFrame)?;
            if fields.len() < i + 3 {
                return Err(DssError::BadFrame);
            }
            let size = kv_field(fields[i + 1], "size=")?
                .parse()
                .map_err(|_| DssError::BadFrame)?;
            let owner = kv_field(fields[i + 2], "owner=")?.to_string();
            v.files.push(FileEntry {
                name: fname.to_string(),
                size,
                owner,
            });
            i += 3;
        } else if field == "FILES:none" {
            i += 1;
        } else {
            return Err(DssError::BadFrame);
        }
    }
    Ok(volumes)
}

fn kv_field<'a>(field: &'a str, key: &str) -> DssResult<&'a str> {
    field.strip_prefix(key).ok_or(DssError::BadFrame)
}
