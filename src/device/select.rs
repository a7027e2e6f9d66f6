//! Device selector resolution

use super::DeviceInfo;

/// Resolve a selector against enumerated devices.
///
/// Tried in order, first hit wins: exact index, exact serial, serial prefix,
/// serial suffix.
pub fn resolve_device<'a>(selector: &str, devices: &'a [DeviceInfo]) -> Option<&'a DeviceInfo> {
    if let Ok(index) = selector.parse::<usize>() {
        if let Some(device) = devices.iter().find(|d| d.index == index) {
            return Some(device);
        }
    }

    devices
        .iter()
        .find(|d| d.serial == selector)
        .or_else(|| devices.iter().find(|d| d.serial.starts_with(selector)))
        .or_else(|| devices.iter().find(|d| d.serial.ends_with(selector)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<DeviceInfo> {
        ["ABCD1234", "WXYZ9999"]
            .iter()
            .enumerate()
            .map(|(index, serial)| DeviceInfo {
                index,
                name: "Generic RTL2832U".to_string(),
                serial: serial.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_index_match() {
        let devices = devices();
        assert_eq!(resolve_device("1", &devices).map(|d| d.index), Some(1));
        assert_eq!(resolve_device("0", &devices).map(|d| d.index), Some(0));
    }

    #[test]
    fn test_exact_serial() {
        let devices = devices();
        assert_eq!(resolve_device("ABCD1234", &devices).map(|d| d.index), Some(0));
    }

    #[test]
    fn test_prefix_and_suffix() {
        let devices = devices();
        assert_eq!(resolve_device("WXYZ", &devices).map(|d| d.index), Some(1));
        assert_eq!(resolve_device("1234", &devices).map(|d| d.index), Some(0));
    }

    #[test]
    fn test_no_match() {
        let devices = devices();
        assert!(resolve_device("ZZZZ", &devices).is_none());
        assert!(resolve_device("7", &devices).is_none());
        assert!(resolve_device("0", &[]).is_none());
    }

    #[test]
    fn test_exact_beats_prefix() {
        let devices: Vec<DeviceInfo> = ["SN0011", "SN001"]
            .iter()
            .enumerate()
            .map(|(index, serial)| DeviceInfo {
                index,
                name: String::new(),
                serial: serial.to_string(),
            })
            .collect();
        assert_eq!(resolve_device("SN001", &devices).map(|d| d.index), Some(1));
    }
}
