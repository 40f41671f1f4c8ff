use crate::prelude::{CoreError, CoreResult};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub const SELECTION_TOKEN: &str = "SELECTED";
const ANNOUNCEMENT_PREFIX: &str = "EnergyMeter Device - IP: ";
const MAC_SEPARATOR: &str = ", MAC: ";

/// Hardware address shown in announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a, b, c, d, e, g)
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| CoreError::InvalidConfig(format!("short MAC address {}", s)))?;
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| CoreError::InvalidConfig(format!("bad MAC octet {:?}", part)))?;
        }
        if parts.next().is_some() {
            return Err(CoreError::InvalidConfig(format!("long MAC address {}", s)));
        }
        Ok(Self(octets))
    }
}

/// Who the device says it is when advertising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

impl DeviceIdentity {
    pub fn announcement(&self) -> String {
        format!("{}{}{}{}", ANNOUNCEMENT_PREFIX, self.ip, MAC_SEPARATOR, self.mac)
    }

    /// Parses an announcement datagram, as a controller would.
    pub fn from_announcement(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix(ANNOUNCEMENT_PREFIX)?;
        let (ip, mac) = rest.split_once(MAC_SEPARATOR)?;
        Some(Self {
            ip: ip.parse().ok()?,
            mac: mac.parse().ok()?,
        })
    }
}

/// Extracts the destination address from a `SELECTED <ip>` datagram.
pub fn parse_selection(payload: &[u8]) -> CoreResult<Ipv4Addr> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| CoreError::Selection("payload is not text".into()))?
        .trim_end_matches(|c: char| c == '\0' || c.is_ascii_whitespace());

    let address = text
        .strip_prefix(SELECTION_TOKEN)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| CoreError::Selection(format!("unexpected message {:?}", text)))?;

    address
        .trim()
        .parse()
        .map_err(|_| CoreError::Selection(format!("invalid address {:?}", address)))
}

pub fn selection_message(destination: Ipv4Addr) -> String {
    format!("{} {}", SELECTION_TOKEN, destination)
}
