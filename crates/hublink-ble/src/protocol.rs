//! Hub GATT constants

use hublink_core::Handle;
use uuid::Uuid;

/// Service advertised by LEGO hubs
pub const HUB_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001623_1212_EFDE_1623_785FEABCD123);

/// Attribute handle of the hub characteristic on the Move Hub
pub const HUB_NOTIFY_HANDLE: Handle = 0x0e;
