//! Data-plane request and reply frames for disk nodes.
//!
//! Frames are single datagrams: a `|`-joined UTF-8 text header,
//! followed for `WRITE_BLOCK` by the raw payload bytes after the final
//! `|`. A `READ_BLOCK` reply is binary: a 4-byte big-endian length
//! prefix and that many raw bytes — zero length means the key is not
//! stored (callers treat it as a miss, there is no explicit not-found
//! reply on this path).

use std::fmt;

use crate::constants::BLOCK_LEN_PREFIX;
use crate::error::{DssError, DssResult};
use crate::layout::DiskTarget;

/// Composite key of one stored block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub volume: String,
    pub file: String,
    pub stripe: u64,
    pub slot: usize,
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}[{}.{}]",
            self.volume, self.file, self.stripe, self.slot
        )
    }
}

/// Role of a block within its stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Data,
    Parity,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Parity => "parity",
        }
    }

    pub fn parse(s: &str) -> DssResult<Self> {
        match s {
            "data" => Ok(Self::Data),
            "parity" => Ok(Self::Parity),
            _ => Err(DssError::BadFrame),
        }
    }
}

/// A file known to a volume: (name, size in bytes). Carried by
/// `RECOVER` so the rebuilding disk can walk every stripe.
pub type FileSpec = (String, u64);

/// Requests accepted by a disk node on its command port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskRequest {
    WriteBlock {
        key: BlockKey,
        block_type: BlockType,
        payload: Vec<u8>,
    },
    ReadBlock {
        key: BlockKey,
    },
    /// Discard every block stored under `volume`.
    Fail {
        volume: String,
    },
    /// Rebuild this disk's blocks for `volume` by XOR over the peers.
    /// `slot` is the receiving disk's own slot index; `peers` is the
    /// full membership in slot order (the receiver skips its own
    /// entry).
    Recover {
        volume: String,
        slot: usize,
        striping_unit: usize,
        files: Vec<FileSpec>,
        peers: Vec<DiskTarget>,
    },
}

impl DiskRequest {
    /// Encode this request as one datagram.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::WriteBlock {
                key,
                block_type,
                payload,
            } => {
                let mut frame = format!(
                    "WRITE_BLOCK|{}|{}|{}|{}|{}|{}|",
                    key.volume,
                    key.file,
                    key.stripe,
                    key.slot,
                    block_type.as_str(),
                    payload.len()
                )
                .into_bytes();
                frame.extend_from_slice(payload);
                frame
            }
            Self::ReadBlock { key } => format!(
                "READ_BLOCK|{}|{}|{}|{}",
                key.volume, key.file, key.stripe, key.slot
            )
            .into_bytes(),
            Self::Fail { volume } => format!("FAIL|{volume}").into_bytes(),
            Self::Recover {
                volume,
                slot,
                striping_unit,
                files,
                peers,
            } => {
                let files = files
                    .iter()
                    .map(|(name, size)| format!("{name}:{size}"))
                    .collect::<Vec<_>>()
                    .join(",");
                let peers = peers
                    .iter()
                    .map(|d| format!("{}:{}:{}", d.name, d.ip, d.cmd_port))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("RECOVER|{volume}|{slot}|{striping_unit}|{files}|{peers}").into_bytes()
            }
        }
    }

    /// Decode a request datagram.
    pub fn parse(frame: &[u8]) -> DssResult<Self> {
        if frame.starts_with(b"WRITE_BLOCK|") {
            return parse_write_block(frame);
        }
        let text = std::str::from_utf8(frame).map_err(|_| DssError::BadFrame)?;
        let parts: Vec<&str> = text.trim_end_matches(['\r', '\n']).split('|').collect();
        match parts[0] {
            "READ_BLOCK" => {
                if parts.len() != 5 {
                    return Err(DssError::InvalidArity);
                }
                Ok(Self::ReadBlock {
                    key: parse_key(&parts[1..5])?,
                })
            }
            "FAIL" => {
                if parts.len() != 2 {
                    return Err(DssError::InvalidArity);
                }
                Ok(Self::Fail {
                    volume: parts[1].to_string(),
                })
            }
            "RECOVER" => {
                if parts.len() != 6 {
                    return Err(DssError::InvalidArity);
                }
                let slot = parts[2].parse().map_err(|_| DssError::NonInteger)?;
                let striping_unit = parts[3].parse().map_err(|_| DssError::NonInteger)?;
                let files = parse_file_specs(parts[4])?;
                let peers = parse_peers(parts[5])?;
                Ok(Self::Recover {
                    volume: parts[1].to_string(),
                    slot,
                    striping_unit,
                    files,
                    peers,
                })
            }
            _ => Err(DssError::UnknownCommand),
        }
    }
}

/// Split a WRITE_BLOCK frame: 7 `|`-delimited header fields, then the
/// raw payload. The declared length is authoritative; longer payloads
/// are truncated to it, shorter ones are rejected.
fn parse_write_block(frame: &[u8]) -> DssResult<DiskRequest> {
    let mut fields: Vec<&[u8]> = Vec::with_capacity(7);
    let mut start = 0;
    let mut end = 0;
    for (i, &b) in frame.iter().enumerate() {
        if b == b'|' {
            fields.push(&frame[start..i]);
            start = i + 1;
            if fields.len() == 7 {
                end = start;
                break;
            }
        }
    }
    if fields.len() != 7 {
        return Err(DssError::InvalidArity);
    }
    let header: Vec<&str> = fields
        .iter()
        .map(|f| std::str::from_utf8(f).map_err(|_| DssError::BadFrame))
        .collect::<DssResult<_>>()?;

    let key = parse_key(&header[1..5])?;
    let block_type = BlockType::parse(header[5])?;
    let declared: usize = header[6].parse().map_err(|_| DssError::NonInteger)?;

    let payload = &frame[end..];
    if payload.len() < declared {
        return Err(DssError::BadFrame);
    }
    Ok(DiskRequest::WriteBlock {
        key,
        block_type,
        payload: payload[..declared].to_vec(),
    })
}

fn parse_key(fields: &[&str]) -> DssResult<BlockKey> {
    let stripe = fields[2].parse().map_err(|_| DssError::NonInteger)?;
    let slot = fields[3].parse().map_err(|_| DssError::NonInteger)?;
    Ok(BlockKey {
        volume: fields[0].to_string(),
        file: fields[1].to_string(),
        stripe,
        slot,
    })
}

fn parse_file_specs(field: &str) -> DssResult<Vec<FileSpec>> {
    if field.is_empty() {
        return Ok(Vec::new());
    }
    field
        .split(',')
        .map(|entry| {
            let (name, size) = entry.rsplit_once(':').ok_or(DssError::BadFrame)?;
            let size = size.parse().map_err(|_| DssError::BadFrame)?;
            Ok((name.to_string(), size))
        })
        .collect()
}

fn parse_peers(field: &str) -> DssResult<Vec<DiskTarget>> {
    field
        .split(',')
        .map(|entry| {
            let mut it = entry.split(':');
            let name = it.next().ok_or(DssError::BadFrame)?;
            let ip = it
                .next()
                .ok_or(DssError::BadFrame)?
                .parse()
                .map_err(|_| DssError::BadFrame)?;
            let cmd_port = it
                .next()
                .ok_or(DssError::BadFrame)?
                .parse()
                .map_err(|_| DssError::BadFrame)?;
            Ok(DiskTarget::new(name, ip, cmd_port))
        })
        .collect()
}

/// Replies sent by a disk node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskReply {
    WriteAck { key: BlockKey },
    /// READ_BLOCK reply: length-prefixed raw bytes (empty ⇒ miss)
    Block(Vec<u8>),
    FailComplete { volume: String },
    RecoverComplete { volume: String },
    Failure(DssError),
}

impl DiskReply {
    /// Encode this reply as one datagram.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::WriteAck { key } => format!(
                "WRITE_ACK|{}|{}|{}|{}",
                key.volume, key.file, key.stripe, key.slot
            )
            .into_bytes(),
            Self::Block(data) => {
                let mut frame = Vec::with_capacity(BLOCK_LEN_PREFIX + data.len());
                frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
                frame.extend_from_slice(data);
                frame
            }
            Self::FailComplete { volume } => format!("FAIL_COMPLETE|{volume}").into_bytes(),
            Self::RecoverComplete { volume } => format!("RECOVER_COMPLETE|{volume}").into_bytes(),
            Self::Failure(e) => format!("FAILURE|{}", e.token()).into_bytes(),
        }
    }
}

fn text_reply(frame: &[u8]) -> DssResult<Vec<String>> {
    let text = std::str::from_utf8(frame).map_err(|_| DssError::BadFrame)?;
    let parts: Vec<&str> = text.trim_end_matches(['\r', '\n']).split('|').collect();
    if parts[0] == "FAILURE" {
        return Err(parts
            .get(1)
            .map(|t| DssError::from_token(t))
            .unwrap_or(DssError::Internal));
    }
    Ok(parts.into_iter().map(str::to_string).collect())
}

/// Parse a WRITE_BLOCK reply, checking that the ack echoes `key`.
pub fn parse_write_ack(frame: &[u8], key: &BlockKey) -> DssResult<()> {
    let parts = text_reply(frame)?;
    if parts.len() != 5 || parts[0] != "WRITE_ACK" {
        return Err(DssError::BadFrame);
    }
    let echoed = BlockKey {
        volume: parts[1].clone(),
        file: parts[2].clone(),
        stripe: parts[3].parse().map_err(|_| DssError::BadFrame)?,
        slot: parts[4].parse().map_err(|_| DssError::BadFrame)?,
    };
    if &echoed != key {
        return Err(DssError::BadFrame);
    }
    Ok(())
}

/// Parse a READ_BLOCK reply into the stored bytes (empty ⇒ miss).
pub fn parse_block(frame: &[u8]) -> DssResult<Vec<u8>> {
    // A disk that could not parse the request answers in text.
    if frame.starts_with(b"FAILURE|") {
        let _ = text_reply(frame)?;
        return Err(DssError::Internal);
    }
    if frame.len() < BLOCK_LEN_PREFIX {
        return Err(DssError::BadFrame);
    }
    let declared = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let body = &frame[BLOCK_LEN_PREFIX..];
    if body.len() != declared {
        return Err(DssError::BadFrame);
    }
    Ok(body.to_vec())
}

/// Parse a FAIL reply, checking the echoed volume.
pub fn parse_fail_complete(frame: &[u8], volume: &str) -> DssResult<()> {
    expect_echo(frame, "FAIL_COMPLETE", volume)
}

/// Parse a RECOVER reply, checking the echoed volume.
pub fn parse_recover_complete(frame: &[u8], volume: &str) -> DssResult<()> {
    expect_echo(frame, "RECOVER_COMPLETE", volume)
}

fn expect_echo(frame: &[u8], tag: &str, volume: &str) -> DssResult<()> {
    let parts = text_reply(frame)?;
    if parts.len() == 2 && parts[0] == tag && parts[1] == volume {
        Ok(())
    } else {
        Err(DssError::BadFrame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn key() -> BlockKey {
        BlockKey {
            volume: "vol".into(),
            file: "notes.txt".into(),
            stripe: 7,
            slot: 2,
        }
    }

    #[test]
    fn test_write_block_round_trip() {
        // Payload containing '|' and newline bytes must survive framing
        let payload = b"ab|cd\nef\x00\xff".to_vec();
        let req = DiskRequest::WriteBlock {
            key: key(),
            block_type: BlockType::Parity,
            payload: payload.clone(),
        };
        match DiskRequest::parse(&req.encode()).unwrap() {
            DiskRequest::WriteBlock {
                key: k,
                block_type,
                payload: p,
            } => {
                assert_eq!(k, key());
                assert_eq!(block_type, BlockType::Parity);
                assert_eq!(p, payload);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_write_block_truncates_to_declared_length() {
        let mut frame = b"WRITE_BLOCK|v|f|0|1|data|4|".to_vec();
        frame.extend_from_slice(b"abcdXX");
        match DiskRequest::parse(&frame).unwrap() {
            DiskRequest::WriteBlock { payload, .. } => assert_eq!(payload, b"abcd"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_write_block_short_payload_rejected() {
        let mut frame = b"WRITE_BLOCK|v|f|0|1|data|8|".to_vec();
        frame.extend_from_slice(b"abc");
        assert_eq!(DiskRequest::parse(&frame), Err(DssError::BadFrame));
    }

    #[test]
    fn test_text_request_round_trips() {
        let reqs = [
            DiskRequest::ReadBlock { key: key() },
            DiskRequest::Fail {
                volume: "vol".into(),
            },
            DiskRequest::Recover {
                volume: "vol".into(),
                slot: 1,
                striping_unit: 512,
                files: vec![("notes.txt".into(), 1500), ("img.bin".into(), 0)],
                peers: vec![
                    DiskTarget::new("alpha", IpAddr::V4(Ipv4Addr::LOCALHOST), 9001),
                    DiskTarget::new("beta", IpAddr::V4(Ipv4Addr::LOCALHOST), 9002),
                ],
            },
        ];
        for req in reqs {
            assert_eq!(DiskRequest::parse(&req.encode()).unwrap(), req);
        }
    }

    #[test]
    fn test_recover_empty_file_table() {
        let req = DiskRequest::Recover {
            volume: "vol".into(),
            slot: 0,
            striping_unit: 128,
            files: Vec::new(),
            peers: vec![DiskTarget::new(
                "alpha",
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                9001,
            )],
        };
        assert_eq!(DiskRequest::parse(&req.encode()).unwrap(), req);
    }

    #[test]
    fn test_malformed_requests() {
        assert_eq!(
            DiskRequest::parse(b"READ_BLOCK|v|f|0"),
            Err(DssError::InvalidArity)
        );
        assert_eq!(
            DiskRequest::parse(b"READ_BLOCK|v|f|zero|1"),
            Err(DssError::NonInteger)
        );
        assert_eq!(
            DiskRequest::parse(b"NOPE|v"),
            Err(DssError::UnknownCommand)
        );
    }

    #[test]
    fn test_write_ack() {
        let reply = DiskReply::WriteAck { key: key() };
        assert!(parse_write_ack(&reply.encode(), &key()).is_ok());

        let other = BlockKey { slot: 0, ..key() };
        assert_eq!(
            parse_write_ack(&reply.encode(), &other),
            Err(DssError::BadFrame)
        );
    }

    #[test]
    fn test_block_reply() {
        let data = vec![0u8, b'|', 0xff, 42];
        let frame = DiskReply::Block(data.clone()).encode();
        assert_eq!(parse_block(&frame).unwrap(), data);

        // Zero length is a miss, not an error
        let empty = DiskReply::Block(Vec::new()).encode();
        assert_eq!(parse_block(&empty).unwrap(), Vec::<u8>::new());

        // Corrupt length prefix
        assert_eq!(
            parse_block(&[0, 0, 0, 9, 1, 2, 3]),
            Err(DssError::BadFrame)
        );
    }

    #[test]
    fn test_echo_replies() {
        let fail = DiskReply::FailComplete {
            volume: "vol".into(),
        };
        assert!(parse_fail_complete(&fail.encode(), "vol").is_ok());
        assert_eq!(
            parse_fail_complete(&fail.encode(), "other"),
            Err(DssError::BadFrame)
        );

        let rec = DiskReply::RecoverComplete {
            volume: "vol".into(),
        };
        assert!(parse_recover_complete(&rec.encode(), "vol").is_ok());
    }
}
