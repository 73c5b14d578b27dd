//! Manager request dispatch.
//!
//! One UDP socket, one datagram per request, one datagram per reply.
//! Each datagram is handled on its own task; all of them funnel into
//! the shared `CoordinatorState` mutex, which is what makes every
//! check-then-act sequence atomic.

use std::net::SocketAddr;
use std::sync::Arc;

use dss_proto::constants::MAX_DATAGRAM;
use dss_proto::message::{ManagerRequest, ManagerResponse};
use dss_proto::{DssError, DssResult};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

use crate::state::CoordinatorState;

/// Manager configuration.
pub struct ManagerConfig {
    pub bind_addr: String,
    pub port: u16,
}

/// The coordination daemon.
pub struct Manager {
    config: ManagerConfig,
    state: Arc<Mutex<CoordinatorState>>,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(CoordinatorState::new())),
        }
    }

    /// Main run loop: receive datagrams and answer them.
    pub async fn run(&self) -> DssResult<()> {
        let sock = Arc::new(
            dss_core::net::bind_udp(&self.config.bind_addr, self.config.port).await?,
        );
        info!(
            "manager accepting requests on {}:{}",
            self.config.bind_addr, self.config.port
        );

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match sock.recv_from(&mut buf).await {
                Ok((len, peer)) => {
                    let frame = buf[..len].to_vec();
                    let state = self.state.clone();
                    let sock = sock.clone();
                    tokio::spawn(async move {
                        handle_datagram(state, sock, peer, frame).await;
                    });
                }
                Err(e) => {
                    error!("recv error: {}", e);
                }
            }
        }
    }
}

async fn handle_datagram(
    state: Arc<Mutex<CoordinatorState>>,
    sock: Arc<UdpSocket>,
    peer: SocketAddr,
    frame: Vec<u8>,
) {
    let response = match std::str::from_utf8(&frame) {
        Ok(text) => {
            trace!("request from {}: {}", peer, text);
            dispatch(&state, text).await
        }
        Err(_) => ManagerResponse::Failure(DssError::BadFrame),
    };
    if let ManagerResponse::Failure(e) = &response {
        debug!("refusing {}: {}", peer, e.token());
    }
    if let Err(e) = sock.send_to(response.encode().as_bytes(), peer).await {
        error!("failed to answer {}: {}", peer, e);
    }
}

/// Decode one request and run it against the state under the lock.
pub async fn dispatch(state: &Mutex<CoordinatorState>, text: &str) -> ManagerResponse {
    let request = match ManagerRequest::parse(text) {
        Ok(r) => r,
        Err(e) => return ManagerResponse::Failure(e),
    };

    let mut s = state.lock().await;
    let result = match request {
        ManagerRequest::RegisterUser {
            name,
            ip,
            mgmt_port,
            cmd_port,
        } => parse_ip(&ip)
            .and_then(|ip| s.register_user(&name, ip, mgmt_port, cmd_port))
            .map(|()| ManagerResponse::Ok),
        ManagerRequest::RegisterDisk {
            name,
            ip,
            mgmt_port,
            cmd_port,
        } => parse_ip(&ip)
            .and_then(|ip| s.register_disk(&name, ip, mgmt_port, cmd_port))
            .map(|()| ManagerResponse::Ok),
        ManagerRequest::DeregisterUser { name } => {
            s.deregister_user(&name).map(|()| ManagerResponse::Ok)
        }
        ManagerRequest::DeregisterDisk { name } => {
            s.deregister_disk(&name).map(|()| ManagerResponse::Ok)
        }
        ManagerRequest::ConfigureDss {
            name,
            n,
            striping_unit,
        } => s
            .configure_dss(&name, n, striping_unit)
            .map(|_| ManagerResponse::Ok),
        ManagerRequest::Ls => s.list().map(ManagerResponse::Listing),
        ManagerRequest::Copy { file, size, owner } => s
            .begin_copy(&file, size, &owner)
            .map(ManagerResponse::CopyTarget),
        ManagerRequest::CopyComplete { owner } => {
            s.complete_copy(&owner).map(|()| ManagerResponse::Ok)
        }
        ManagerRequest::Read { volume, file, user } => s
            .begin_read(&volume, &file, &user)
            .map(|(layout, size)| ManagerResponse::ReadTarget { layout, size }),
        ManagerRequest::ReadComplete { user, volume } => {
            s.complete_read(&user, &volume);
            Ok(ManagerResponse::Ok)
        }
        ManagerRequest::DiskFailure { volume } => s
            .begin_disk_failure(&volume)
            .map(ManagerResponse::Layout),
        ManagerRequest::RecoveryComplete { volume } => {
            s.complete_recovery(&volume).map(|()| ManagerResponse::Ok)
        }
        ManagerRequest::DecommissionDss { volume } => s
            .begin_decommission(&volume)
            .map(ManagerResponse::Layout),
        ManagerRequest::DecommissionComplete { volume } => s
            .complete_decommission(&volume)
            .map(|()| ManagerResponse::Ok),
        ManagerRequest::DumpState => Ok(ManagerResponse::State(s.dump_state())),
    };

    result.unwrap_or_else(ManagerResponse::Failure)
}

fn parse_ip(ip: &str) -> DssResult<std::net::IpAddr> {
    ip.parse().map_err(|_| DssError::BadFrame)
}
