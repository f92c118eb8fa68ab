//! Textual endpoint descriptors.
//!
//! ```text
//! <scheme>/<address>[:<port>][?<key>=<value>{&<key>=<value>}][#<key>=<value>{;<key>=<value>}]
//! \_______________________ Locator _______________________/ \_______ Endpoint config ______/
//! ```
//!
//! IPv6 addresses are written in brackets, `udp/[ff02::1]:7447`. Parsing is pure
//! string processing; nothing is resolved here.

use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::result::{ZError, ZResult};

const SCHEME_SEPARATOR: char = '/';
const PORT_SEPARATOR: char = ':';
const METADATA_SEPARATOR: char = '?';
const METADATA_LIST_SEPARATOR: char = '&';
const CONFIG_SEPARATOR: char = '#';
const CONFIG_LIST_SEPARATOR: char = ';';
const FIELD_SEPARATOR: char = '=';

pub type Properties = BTreeMap<String, String>;

fn parse_properties(s: &str, list_separator: char) -> ZResult<Properties> {
    let mut props = Properties::new();
    for entry in s.split(list_separator).filter(|e| !e.is_empty()) {
        let (key, value) = entry
            .split_once(FIELD_SEPARATOR)
            .ok_or(ZError::InvalidLocator)?;
        if key.is_empty() {
            return Err(ZError::InvalidLocator);
        }
        // Last write wins.
        props.insert(key.to_owned(), value.to_owned());
    }
    Ok(props)
}

fn write_properties(
    f: &mut fmt::Formatter<'_>,
    props: &Properties,
    leading: char,
    list_separator: char,
) -> fmt::Result {
    for (i, (k, v)) in props.iter().enumerate() {
        let sep = if i == 0 { leading } else { list_separator };
        write!(f, "{sep}{k}{FIELD_SEPARATOR}{v}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub scheme: String,
    /// Host name or IP literal, IPv6 brackets stripped.
    pub address: String,
    pub port: Option<String>,
    pub metadata: Properties,
}

impl Locator {
    fn parse_address(s: &str) -> ZResult<(String, Option<String>)> {
        let (address, port) = if let Some(rest) = s.strip_prefix('[') {
            let (address, tail) = rest.split_once(']').ok_or(ZError::InvalidLocator)?;
            let port = match tail {
                "" => None,
                t => Some(t.strip_prefix(PORT_SEPARATOR).ok_or(ZError::InvalidLocator)?),
            };
            (address, port)
        } else {
            match s.rsplit_once(PORT_SEPARATOR) {
                Some((address, port)) => (address, Some(port)),
                None => (s, None),
            }
        };

        if address.is_empty() || port.is_some_and(str::is_empty) {
            return Err(ZError::InvalidLocator);
        }
        Ok((address.to_owned(), port.map(str::to_owned)))
    }
}

impl FromStr for Locator {
    type Err = ZError;

    fn from_str(s: &str) -> ZResult<Self> {
        let (scheme, rest) = s
            .split_once(SCHEME_SEPARATOR)
            .ok_or(ZError::InvalidLocator)?;
        if scheme.is_empty() {
            return Err(ZError::InvalidLocator);
        }
        let (address, metadata) = match rest.split_once(METADATA_SEPARATOR) {
            Some((a, m)) => (a, parse_properties(m, METADATA_LIST_SEPARATOR)?),
            None => (rest, Properties::new()),
        };
        let (address, port) = Locator::parse_address(address)?;

        Ok(Locator {
            scheme: scheme.to_owned(),
            address,
            port,
            metadata,
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SCHEME_SEPARATOR}", self.scheme)?;
        if self.address.contains(PORT_SEPARATOR) {
            write!(f, "[{}]", self.address)?;
        } else {
            f.write_str(&self.address)?;
        }
        if let Some(port) = &self.port {
            write!(f, "{PORT_SEPARATOR}{port}")?;
        }
        write_properties(f, &self.metadata, METADATA_SEPARATOR, METADATA_LIST_SEPARATOR)
    }
}

/// A locator plus the configuration a link is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub locator: Locator,
    pub config: Properties,
}

impl Endpoint {
    /// Endpoint configuration first, then the locator metadata.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .or_else(|| self.locator.metadata.get(key))
            .map(String::as_str)
    }
}

impl From<Locator> for Endpoint {
    fn from(locator: Locator) -> Self {
        Endpoint {
            locator,
            config: Properties::new(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ZError;

    fn from_str(s: &str) -> ZResult<Self> {
        let (locator, config) = match s.split_once(CONFIG_SEPARATOR) {
            Some((l, c)) => (l, parse_properties(c, CONFIG_LIST_SEPARATOR)?),
            None => (s, Properties::new()),
        };
        Ok(Endpoint {
            locator: locator.parse()?,
            config,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.locator)?;
        write_properties(f, &self.config, CONFIG_SEPARATOR, CONFIG_LIST_SEPARATOR)
    }
}
