//! UDP multicast command channel.
//!
//! Implements [`CommandChannelPort`] on a non-blocking `std::net::UdpSocket`
//! joined to the command group.  ESP-IDF exposes lwIP through the std
//! socket API, so the same code runs on the device and on the host.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use log::{debug, info, warn};

use crate::app::ports::{ChannelError, CommandChannelPort};

#[derive(Default)]
pub struct MulticastChannel {
    socket: Option<UdpSocket>,
    group: Option<SocketAddrV4>,
}

impl MulticastChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&self, to: SocketAddr, message: &str) {
        let Some(socket) = &self.socket else {
            debug!("Multicast: dropped '{}' (not listening)", message);
            return;
        };
        if let Err(e) = socket.send_to(message.as_bytes(), to) {
            warn!("Multicast: send to {} failed: {}", to, e);
        }
    }
}

impl CommandChannelPort for MulticastChannel {
    fn listen(&mut self, group: Ipv4Addr, port: u16) -> Result<(), ChannelError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).map_err(|e| {
            warn!("Multicast: bind :{} failed: {}", port, e);
            ChannelError::Bind
        })?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| {
                warn!("Multicast: join {} failed: {}", group, e);
                ChannelError::Join
            })?;
        socket.set_nonblocking(true).map_err(|_| ChannelError::Bind)?;
        if let Err(e) = socket.set_multicast_loop_v4(false) {
            debug!("Multicast: loopback not disabled: {}", e);
        }
        info!("Multicast: joined {}:{}", group, port);
        self.socket = Some(socket);
        self.group = Some(SocketAddrV4::new(group, port));
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
        let socket = self.socket.as_ref()?;
        match socket.recv_from(buf) {
            Ok(received) => Some(received),
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                debug!("Multicast: receive failed: {}", e);
                None
            }
        }
    }

    fn reply(&mut self, peer: SocketAddr, message: &str) {
        self.send(peer, message);
    }

    fn broadcast(&mut self, message: &str) {
        match self.group {
            Some(group) => self.send(SocketAddr::V4(group), message),
            None => debug!("Multicast: dropped broadcast '{}' (no group)", message),
        }
    }
}
