//! Product category enumeration.

use std::fmt;

/// Top-level Insteon product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Category {
    GeneralController = 0x00,
    DimmableLighting = 0x01,
    SwitchedLighting = 0x02,
    NetworkBridge = 0x03,
    Irrigation = 0x04,
    Climate = 0x05,
    PoolAndSpa = 0x06,
    SensorsAndActuators = 0x07,
    HomeEntertainment = 0x08,
    EnergyManagement = 0x09,
    Appliance = 0x0A,
    Plumbing = 0x0B,
    Communication = 0x0C,
    Computer = 0x0D,
    WindowCovering = 0x0E,
    Access = 0x0F,
    SecurityHealthSafety = 0x10,
    Surveillance = 0x11,
    Automotive = 0x12,
    PetCare = 0x13,
    Toys = 0x14,
    Timekeeping = 0x15,
    Holiday = 0x16,
    Reserved = 0x17,
    Unassigned = 0xFF,
}

impl Category {
    /// Decode a category byte; values outside the assigned range map to
    /// [`Category::Unassigned`].
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::GeneralController,
            0x01 => Self::DimmableLighting,
            0x02 => Self::SwitchedLighting,
            0x03 => Self::NetworkBridge,
            0x04 => Self::Irrigation,
            0x05 => Self::Climate,
            0x06 => Self::PoolAndSpa,
            0x07 => Self::SensorsAndActuators,
            0x08 => Self::HomeEntertainment,
            0x09 => Self::EnergyManagement,
            0x0A => Self::Appliance,
            0x0B => Self::Plumbing,
            0x0C => Self::Communication,
            0x0D => Self::Computer,
            0x0E => Self::WindowCovering,
            0x0F => Self::Access,
            0x10 => Self::SecurityHealthSafety,
            0x11 => Self::Surveillance,
            0x12 => Self::Automotive,
            0x13 => Self::PetCare,
            0x14 => Self::Toys,
            0x15 => Self::Timekeeping,
            0x16 => Self::Holiday,
            0x17 => Self::Reserved,
            _ => Self::Unassigned,
        }
    }

    /// Human description of the category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::GeneralController => "Generalized Controllers",
            Self::DimmableLighting => "Dimmable Lighting Control",
            Self::SwitchedLighting => "Switched Lighting Control",
            Self::NetworkBridge => "Network Bridges",
            Self::Irrigation => "Irrigation Control",
            Self::Climate => "Climate Control",
            Self::PoolAndSpa => "Pool and Spa Control",
            Self::SensorsAndActuators => "Sensors and Actuators",
            Self::HomeEntertainment => "Home Entertainment",
            Self::EnergyManagement => "Energy Management",
            Self::Appliance => "Built-In Appliance Control",
            Self::Plumbing => "Plumbing",
            Self::Communication => "Communication",
            Self::Computer => "Computer Control",
            Self::WindowCovering => "Window Coverings",
            Self::Access => "Access Control",
            Self::SecurityHealthSafety => "Security, Health, Safety",
            Self::Surveillance => "Surveillance",
            Self::Automotive => "Automotive",
            Self::PetCare => "Pet Care",
            Self::Toys => "Toys",
            Self::Timekeeping => "Timekeeping",
            Self::Holiday => "Holiday",
            Self::Reserved => "Reserved",
            Self::Unassigned => "Unassigned",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Product subcategory within a [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubCategory(pub u8);

/// Product identification reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub product_key: u32,
    pub category: Category,
    pub sub_category: SubCategory,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_byte_maps_assigned_values() {
        assert_eq!(Category::from_byte(0x03), Category::NetworkBridge);
        assert_eq!(Category::from_byte(0x01), Category::DimmableLighting);
        assert_eq!(Category::from_byte(0x42), Category::Unassigned);
    }

    #[test]
    fn description_matches_category() {
        assert_eq!(Category::NetworkBridge.to_string(), "Network Bridges");
    }
}
