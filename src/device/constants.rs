use uuid::Uuid;

/**
 * Display name used for advertisers that do not report a local name.
 */
pub const UNNAMED_DEVICE: &str = "Unnamed Device";

/**
 * Capacity of the channel that carries radio events from the driver to the controller.
 */
pub const RADIO_EVENT_CAPACITY: usize = 128;

/**
 * Capacity of the channels between the controller and the presentation layer.
 */
pub const CONTROLLER_CHANNEL_CAPACITY: usize = 64;

/**
 * The UUID of the Bluetooth BLE service that holds the value we read (000000ff-...).
 */
pub const fn target_service_uuid() -> Uuid {
    Uuid::from_u128(0x0000_00ff_0000_1000_8000_0080_5f9b_34fb)
}

/**
 * The UUID of the Bluetooth BLE remote GATT characteristic that is read once per session (0000ff03-...).
 */
pub const fn target_characteristic_uuid() -> Uuid {
    Uuid::from_u128(0x0000_ff03_0000_1000_8000_0080_5f9b_34fb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_constants_agree_with_their_string_form() {
        assert_eq!(
            target_service_uuid(),
            Uuid::parse_str("000000FF-0000-1000-8000-00805F9B34FB").unwrap(),
        );
        assert_eq!(
            target_characteristic_uuid(),
            Uuid::parse_str("0000ff03-0000-1000-8000-00805f9b34fb").unwrap(),
        );
    }
}
