//! Device matching used during discovery

use crate::types::{DiscoveredDevice, MatchTarget};

/// Decide whether a discovered device satisfies the target
///
/// A MAC constraint wins over a name constraint and compares
/// case-insensitively. A name constraint is a substring test against the
/// advertised name; devices without a name never match it.
pub fn matches(discovered: &DiscoveredDevice, target: &MatchTarget) -> bool {
    if let Some(mac) = &target.mac {
        return discovered.address.eq_ignore_ascii_case(mac);
    }

    if let Some(name) = &target.name {
        return match discovered.name.as_deref() {
            Some(advertised) if !advertised.is_empty() => advertised.contains(name.as_str()),
            _ => false,
        };
    }

    true
}

/// First device in scan order that matches, if any
pub fn find_first_match<'a>(
    devices: &'a [DiscoveredDevice],
    target: &MatchTarget,
) -> Option<&'a DiscoveredDevice> {
    devices.iter().find(|device| matches(device, target))
}
