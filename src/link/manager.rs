use std::sync::Arc;

use crate::{
    platform::Platform,
    result::{ZError, ZResult},
};

use super::{tcp, udp, Endpoint, Link};

/// Builds the link for the scheme of `endpoint`. Nothing is opened yet.
pub fn create_link<P: Platform>(platform: Arc<P>, endpoint: Endpoint) -> ZResult<Link<P>> {
    match endpoint.locator.scheme.as_str() {
        tcp::SCHEME => tcp::new_link(platform, endpoint),
        udp::SCHEME => udp::new_link(platform, endpoint),
        scheme => {
            zerror!("Unsupported scheme {}", scheme);
            Err(ZError::UnsupportedScheme)
        }
    }
}
