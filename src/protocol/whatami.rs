use crate::result::{ZError, ZResult};

#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WhatAmI {
    Router = 0b001,
    Peer = 0b010,
    #[default]
    Client = 0b100,
}

impl WhatAmI {
    const STR_R: &'static str = "router";
    const STR_P: &'static str = "peer";
    const STR_C: &'static str = "client";

    pub const fn to_str(self) -> &'static str {
        match self {
            Self::Router => Self::STR_R,
            Self::Peer => Self::STR_P,
            Self::Client => Self::STR_C,
        }
    }

    /// Decodes the wire value, which is the role's bit in a [`WhatAmIMatcher`].
    pub fn try_from_u64(v: u64) -> ZResult<Self> {
        match v {
            0b001 => Ok(Self::Router),
            0b010 => Ok(Self::Peer),
            0b100 => Ok(Self::Client),
            _ => Err(ZError::ParseZInt),
        }
    }
}

impl core::fmt::Display for WhatAmI {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.to_str())
    }
}

/// A set of roles, as carried by Scout messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WhatAmIMatcher(pub u8);

impl WhatAmIMatcher {
    pub const fn empty() -> Self {
        WhatAmIMatcher(0)
    }

    pub const fn with(self, w: WhatAmI) -> Self {
        WhatAmIMatcher(self.0 | w as u8)
    }

    pub const fn matches(&self, w: WhatAmI) -> bool {
        self.0 & (w as u8) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for w in [WhatAmI::Router, WhatAmI::Peer, WhatAmI::Client] {
            assert_eq!(WhatAmI::try_from_u64(w as u64), Ok(w));
            assert_eq!(format!("{w}"), w.to_str());
        }
        assert!(WhatAmI::try_from_u64(0b011).is_err());
    }

    #[test]
    fn matcher_combines_roles() {
        let m = WhatAmIMatcher::empty()
            .with(WhatAmI::Router)
            .with(WhatAmI::Peer);
        assert!(m.matches(WhatAmI::Peer));
        assert!(!m.matches(WhatAmI::Client));
    }
}
