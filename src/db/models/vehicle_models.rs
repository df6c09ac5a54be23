use serde::{Deserialize, Serialize};

/// Attribute value used for vehicles created from an unknown plate
pub const PLACEHOLDER: &str = "Unknown";

/// Vehicle model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vehicle {
    pub plate: String,
    pub vehicle_type: String,
    pub color: String,
    pub owner_name: String,
    pub owner_id: String,
    pub affiliation: String,
    pub image_path: Option<String>,
}

/// Everything about a vehicle except its plate, which never changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    pub vehicle_type: String,
    pub color: String,
    pub owner_name: String,
    pub owner_id: String,
    pub affiliation: String,
    pub image_path: Option<String>,
}

impl VehicleAttributes {
    /// Attributes for a plate seen for the first time
    pub fn placeholder(image_path: Option<String>) -> Self {
        Self {
            vehicle_type: PLACEHOLDER.to_string(),
            color: PLACEHOLDER.to_string(),
            owner_name: PLACEHOLDER.to_string(),
            owner_id: PLACEHOLDER.to_string(),
            affiliation: PLACEHOLDER.to_string(),
            image_path,
        }
    }
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self::placeholder(None)
    }
}

impl Vehicle {
    pub fn new(plate: String, attributes: VehicleAttributes) -> Self {
        Self {
            plate,
            vehicle_type: attributes.vehicle_type,
            color: attributes.color,
            owner_name: attributes.owner_name,
            owner_id: attributes.owner_id,
            affiliation: attributes.affiliation,
            image_path: attributes.image_path,
        }
    }

    pub fn attributes(&self) -> VehicleAttributes {
        VehicleAttributes {
            vehicle_type: self.vehicle_type.clone(),
            color: self.color.clone(),
            owner_name: self.owner_name.clone(),
            owner_id: self.owner_id.clone(),
            affiliation: self.affiliation.clone(),
            image_path: self.image_path.clone(),
        }
    }

    /// Text fields considered by free-text search
    pub fn text_fields(&self) -> [&str; 6] {
        [
            &self.plate,
            &self.vehicle_type,
            &self.color,
            &self.owner_name,
            &self.owner_id,
            &self.affiliation,
        ]
    }
}
