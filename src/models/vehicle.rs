//! Modelos de registros importados
//!
//! `VehicleRecord` (registro de vehículos del organismo de matriculación) y
//! `OwnerRecord` (registro de residentes). Ambos pertenecen a un único lote y
//! son inmutables una vez importados.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::normalize::{normalize_document, normalize_text};

/// Categoría por color de placa
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateCategory {
    /// Placa azul (formularios 1–5)
    Blue,
    /// Placa blanca/amarilla (formularios 6–10)
    WhiteYellow,
}

impl PlateCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlateCategory::Blue => "blue",
            PlateCategory::WhiteYellow => "white_yellow",
        }
    }

    /// Título de sección en las plantillas del regulador
    pub fn section_title(&self) -> &'static str {
        match self {
            PlateCategory::Blue => "I. DANH SÁCH XE NỀN MÀU XANH, CHỮ VÀ SỐ MÀU TRẮNG",
            PlateCategory::WhiteYellow => "II. DANH SÁCH XE NỀN MÀU TRẮNG/VÀNG, CHỮ VÀ SỐ MÀU ĐEN",
        }
    }
}

impl fmt::Display for PlateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlateCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" | "xanh" | "1" => Ok(PlateCategory::Blue),
            "white_yellow" | "white" | "yellow" | "trang" | "vang" | "0" => {
                Ok(PlateCategory::WhiteYellow)
            }
            other => Err(format!("unknown plate category '{}'", other)),
        }
    }
}

/// Tipo de hoja importada; fija el esquema de columnas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    BlueVehicles,
    WhiteYellowVehicles,
    OwnerRegister,
}

impl SheetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetKind::BlueVehicles => "blue_vehicles",
            SheetKind::WhiteYellowVehicles => "white_yellow_vehicles",
            SheetKind::OwnerRegister => "owner_register",
        }
    }

    /// Categoría de los vehículos de la hoja (`None` para el registro de residentes)
    pub fn category(&self) -> Option<PlateCategory> {
        match self {
            SheetKind::BlueVehicles => Some(PlateCategory::Blue),
            SheetKind::WhiteYellowVehicles => Some(PlateCategory::WhiteYellow),
            SheetKind::OwnerRegister => None,
        }
    }
}

impl FromStr for SheetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "blue_vehicles" => Ok(SheetKind::BlueVehicles),
            "white_yellow_vehicles" => Ok(SheetKind::WhiteYellowVehicles),
            "owner_register" => Ok(SheetKind::OwnerRegister),
            other => Err(format!("unknown sheet kind '{}'", other)),
        }
    }
}

/// Fila normalizada del registro de vehículos, antes de asignarle lote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub plate: String,
    pub vehicle_type: Option<String>,
    pub owner_name: String,
    pub registered_address: Option<String>,
    pub neighborhood: Option<String>,
    pub permanent_address: Option<String>,
    pub current_address: Option<String>,
    pub chassis_number: Option<String>,
    pub engine_number: Option<String>,
    pub phone: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub plate_color: Option<String>,
    pub vehicle_status: Option<String>,
    pub registration_status: Option<String>,
}

impl NewVehicle {
    /// Dirección usada para comparar con el registro de residentes
    pub fn owner_address(&self) -> Option<&str> {
        self.permanent_address
            .as_deref()
            .or(self.registered_address.as_deref())
    }
}

/// Vehículo importado en un lote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Secuencia global; define el orden de inserción
    pub id: i64,
    pub batch_id: i64,
    pub data_file_id: i64,
    pub category: PlateCategory,
    #[serde(flatten)]
    pub data: NewVehicle,
}

/// Fila normalizada del registro de residentes, antes de asignarle lote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOwner {
    pub full_name: String,
    pub address: Option<String>,
    pub national_id: Option<String>,
    /// Placa declarada por el residente, normalizada
    pub declared_plate: Option<String>,
    /// `false` si el residente figura como trasladado fuera de la zona
    pub resident: bool,
}

/// Residente importado en un lote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub id: i64,
    pub batch_id: i64,
    pub data_file_id: i64,
    #[serde(flatten)]
    pub data: NewOwner,
}

/// Identidad normalizada de un propietario.
///
/// Dos identidades coinciden por número de documento cuando ambas lo tienen;
/// si no, por nombre Y dirección normalizados.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub name: Option<String>,
    pub address: Option<String>,
    pub national_id: Option<String>,
}

impl OwnerIdentity {
    pub fn new(name: Option<&str>, address: Option<&str>, national_id: Option<&str>) -> Self {
        let text = |v: Option<&str>| v.map(normalize_text).filter(|s| !s.is_empty());
        Self {
            name: text(name),
            address: text(address),
            national_id: national_id.map(normalize_document).filter(|s| !s.is_empty()),
        }
    }

    /// Identidad del propietario registrado de un vehículo
    pub fn of_vehicle(vehicle: &NewVehicle) -> Self {
        Self::new(
            Some(&vehicle.owner_name),
            vehicle.owner_address(),
            vehicle.document_number.as_deref(),
        )
    }

    pub fn of_owner(owner: &NewOwner) -> Self {
        Self::new(
            Some(&owner.full_name),
            owner.address.as_deref(),
            owner.national_id.as_deref(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.national_id.is_none() && (self.name.is_none() || self.address.is_none())
    }

    pub fn matches(&self, other: &OwnerIdentity) -> bool {
        if let (Some(a), Some(b)) = (&self.national_id, &other.national_id) {
            return a == b;
        }
        matches!(
            (&self.name, &other.name, &self.address, &other.address),
            (Some(n1), Some(n2), Some(a1), Some(a2)) if n1 == n2 && a1 == a2
        )
    }

    pub fn matches_owner(&self, owner: &NewOwner) -> bool {
        self.matches(&Self::of_owner(owner))
    }
}

/// Filas de un archivo ya parseado y validado
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRows {
    Vehicles {
        category: PlateCategory,
        rows: Vec<NewVehicle>,
    },
    Owners(Vec<NewOwner>),
}

impl ParsedRows {
    pub fn len(&self) -> usize {
        match self {
            ParsedRows::Vehicles { rows, .. } => rows.len(),
            ParsedRows::Owners(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sheet_kind(&self) -> SheetKind {
        match self {
            ParsedRows::Vehicles { category: PlateCategory::Blue, .. } => SheetKind::BlueVehicles,
            ParsedRows::Vehicles { category: PlateCategory::WhiteYellow, .. } => {
                SheetKind::WhiteYellowVehicles
            }
            ParsedRows::Owners(_) => SheetKind::OwnerRegister,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("xanh".parse::<PlateCategory>().unwrap(), PlateCategory::Blue);
        assert_eq!("0".parse::<PlateCategory>().unwrap(), PlateCategory::WhiteYellow);
        assert!("red".parse::<PlateCategory>().is_err());
    }

    #[test]
    fn test_identity_prefers_document() {
        let owner = NewOwner {
            full_name: "Nguyen Van A".into(),
            address: Some("KP1".into()),
            national_id: Some("0790-1234".into()),
            declared_plate: None,
            resident: true,
        };
        let same_doc = OwnerIdentity::new(Some("Other"), Some("Elsewhere"), Some("07901234"));
        assert!(same_doc.matches_owner(&owner));

        let other_doc = OwnerIdentity::new(Some("nguyen  van a"), Some("kp1"), Some("999"));
        assert!(!other_doc.matches_owner(&owner));

        let no_doc = OwnerIdentity::new(Some("nguyen  van a"), Some("kp1"), None);
        assert!(no_doc.matches_owner(&owner));
    }

    #[test]
    fn test_identity_needs_name_and_address() {
        let owner = NewOwner { full_name: "Tran B".into(), resident: true, ..Default::default() };
        let identity = OwnerIdentity::new(Some("Tran B"), None, None);
        assert!(identity.is_empty());
        assert!(!identity.matches_owner(&owner));
    }

    #[test]
    fn test_sheet_kind_category() {
        assert_eq!(SheetKind::BlueVehicles.category(), Some(PlateCategory::Blue));
        assert_eq!(SheetKind::OwnerRegister.category(), None);
        assert_eq!(
            "white_yellow_vehicles".parse::<SheetKind>().unwrap(),
            SheetKind::WhiteYellowVehicles
        );
    }
}
