//! A zenoh client stack for small devices: links over TCP and UDP (unicast and
//! multicast), a transport session engine with keep-alive and lease handling, and
//! the publish/subscribe/query API on top.
//!
//! ```no_run
//! use zenoh_pico_rs::{protocol::whatami::WhatAmI, protocol::ZenohID, Config};
//!
//! let cfg = Config::new(ZenohID::rand(), WhatAmI::Client).connect("tcp/127.0.0.1:7447");
//! let session = zenoh_pico_rs::open(&cfg).unwrap();
//! session.publish("demo/a", b"hello").unwrap();
//! session.close().unwrap();
//! ```

#[macro_use]
mod logging;

pub mod iobuf;
pub mod link;
pub mod platform;
pub mod protocol;
pub mod result;
pub mod session;
pub mod transport;

use std::sync::Arc;

use platform::{Platform, StdPlatform};
use protocol::{whatami::WhatAmI, ZenohID};
use result::{ZError, ZResult};

pub use session::{Query, Reply, Sample, Session};

pub const Z_PROTO_VERSION: u8 = 0x05;

/// Lease proposed in Open and Accept, in milliseconds.
pub const Z_TRANSPORT_LEASE: u64 = 10000;
/// Keep-alives sent per lease period.
pub const Z_LEASE_EXPIRE_FACTOR: u64 = 4;

pub const Z_SN_RESOLUTION: u64 = 1 << 28;

/// Largest batch handed to a link, before the length prefix of streamed links.
pub const Z_BATCH_SIZE: usize = 8192;
/// Largest message that can be reassembled from fragments.
pub const Z_FRAG_MAX_SIZE: usize = 65536;

/// Socket timeout in milliseconds when an endpoint carries no `tout` key.
pub const Z_CONFIG_SOCKET_TIMEOUT_DEFAULT: u64 = 100;

pub const Z_LINK_TCP_MTU: u16 = 65535;
pub const Z_LINK_UDP_UNICAST_MTU: u16 = 1450;
pub const Z_LINK_UDP_MULTICAST_MTU: u16 = 1450;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub id: ZenohID,
    pub mode: WhatAmI,
    /// Endpoint to open towards, e.g. `tcp/10.0.0.1:7447`.
    pub connect: Option<String>,
    /// Endpoint to listen on; the session waits for the remote side to open.
    pub listen: Option<String>,
    pub credentials: Option<Credentials>,
    /// Milliseconds.
    pub lease: u64,
}

impl Config {
    pub fn new(id: ZenohID, mode: WhatAmI) -> Self {
        Config {
            id,
            mode,
            connect: None,
            listen: None,
            credentials: None,
            lease: Z_TRANSPORT_LEASE,
        }
    }

    pub fn connect(mut self, endpoint: impl Into<String>) -> Self {
        self.connect = Some(endpoint.into());
        self
    }

    pub fn listen(mut self, endpoint: impl Into<String>) -> Self {
        self.listen = Some(endpoint.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn lease(mut self, lease: u64) -> Self {
        self.lease = lease;
        self
    }
}

/// Opens a session with the std networking stack.
pub fn open(cfg: &Config) -> ZResult<Session<StdPlatform>> {
    open_with(Arc::new(StdPlatform), cfg)
}

/// Opens a session over an arbitrary platform.
pub fn open_with<P: Platform>(platform: Arc<P>, cfg: &Config) -> ZResult<Session<P>> {
    match cfg.mode {
        WhatAmI::Client | WhatAmI::Peer => Session::open(platform, cfg),
        WhatAmI::Router => {
            zerror!("A router session cannot be opened from this stack");
            Err(ZError::TransportOpenFailed)
        }
    }
}

/// Opens a client session towards `locator`.
pub fn open_session(
    locator: &str,
    credentials: Option<Credentials>,
) -> ZResult<Session<StdPlatform>> {
    let mut cfg = Config::new(ZenohID::rand(), WhatAmI::Client).connect(locator);
    cfg.credentials = credentials;
    open(&cfg)
}
