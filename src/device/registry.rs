use indexmap::IndexMap;

use crate::device::types::Device;

/// Display name to address, in order of first sighting.
///
/// A name that is already present is never overwritten, even if a different address
/// advertises it later.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<String, String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    /// Returns the device if this is the first sighting of its name.
    pub fn record(&mut self, device: Device) -> Option<Device> {
        if self.devices.contains_key(&device.name) {
            return None;
        }

        self.devices.insert(device.name.clone(), device.address.clone());
        Some(device)
    }

    pub fn address_of(&self, name: &str) -> Option<&str> {
        self.devices.get(name).map(String::as_str)
    }

    pub fn devices(&self) -> impl Iterator<Item = Device> + '_ {
        self.devices.iter().map(|(name, address)| Device {
            name: name.clone(),
            address: address.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, address: &str) -> Device {
        Device {
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn first_sighting_of_a_name_wins() {
        let mut registry = DeviceRegistry::new();

        assert!(registry.record(device("Sensor", "AA:00")).is_some());
        assert!(registry.record(device("Sensor", "BB:00")).is_none());
        assert!(registry.record(device("Sensor", "AA:00")).is_none());
        assert!(registry.record(device("Other", "CC:00")).is_some());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.address_of("Sensor"), Some("AA:00"));
        assert_eq!(registry.address_of("Other"), Some("CC:00"));
    }

    #[test]
    fn repeated_names_keep_one_entry_each_in_sighting_order() {
        let mut registry = DeviceRegistry::new();
        let sightings = [
            ("Unnamed Device", "01"),
            ("Thermo", "02"),
            ("Unnamed Device", "03"),
            ("Scale", "04"),
            ("Thermo", "05"),
            ("Unnamed Device", "06"),
        ];

        for (name, address) in sightings {
            registry.record(device(name, address));
        }

        let listed: Vec<Device> = registry.devices().collect();
        assert_eq!(listed, vec![
            device("Unnamed Device", "01"),
            device("Thermo", "02"),
            device("Scale", "04"),
        ]);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut registry = DeviceRegistry::new();
        registry.record(device("Sensor", "AA:00"));
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.address_of("Sensor"), None);
        assert!(registry.record(device("Sensor", "BB:00")).is_some());
        assert_eq!(registry.address_of("Sensor"), Some("BB:00"));
    }
}
