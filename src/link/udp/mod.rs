use std::{net::IpAddr, sync::Arc};

use crate::{
    platform::Platform,
    result::{ZError, ZResult},
};

use super::{Endpoint, Link};

pub mod multicast;
pub mod unicast;

pub const SCHEME: &str = "udp";

/// A UDP endpoint whose address is a multicast group gets a multicast link.
pub(crate) fn new_link<P: Platform>(platform: Arc<P>, endpoint: Endpoint) -> ZResult<Link<P>> {
    if endpoint.locator.port.is_none() {
        return Err(ZError::InvalidLocator);
    }
    let is_multicast = endpoint
        .locator
        .address
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_multicast());

    if is_multicast {
        Ok(multicast::new_link(platform, endpoint))
    } else {
        Ok(unicast::new_link(platform, endpoint))
    }
}
