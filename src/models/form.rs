//! Formularios del regulador
//!
//! El número de formulario (1–10) es una función pura de la categoría de
//! placa y del estado de presencia. La tabla `FORM_TABLE` es el único lugar
//! donde vive esa correspondencia.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::vehicle::PlateCategory;

/// Estado de presencia de una placa en los dos registros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    /// Vehículo y propietario presentes y coincidentes
    Matched,
    /// Propietario residente, vehículo no listado
    OwnerOnly,
    /// Vehículo listado, propietario no residente
    VehicleOnly,
    /// Placa conocida, pero sin vehículo ni propietario en la zona
    Neither,
    /// Placa ausente de ambos registros
    NotListed,
}

impl PresenceState {
    /// Colapsa los tres indicadores en uno de los cinco estados.
    ///
    /// Vehículo y propietario deciden el estado; `found` solo separa
    /// `Neither` de `NotListed` cuando ninguno de los dos está presente.
    pub fn from_flags(found: bool, vehicle_present: bool, owner_present: bool) -> Self {
        match (vehicle_present, owner_present) {
            (true, true) => PresenceState::Matched,
            (false, true) => PresenceState::OwnerOnly,
            (true, false) => PresenceState::VehicleOnly,
            (false, false) if found => PresenceState::Neither,
            (false, false) => PresenceState::NotListed,
        }
    }
}

/// Agrupación de formularios que comparten diseño de columnas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Matched,
    Transfer,
    NotListed,
}

const FORM_TABLE: [(PlateCategory, PresenceState, u8); 10] = [
    (PlateCategory::Blue, PresenceState::Matched, 1),
    (PlateCategory::Blue, PresenceState::OwnerOnly, 2),
    (PlateCategory::Blue, PresenceState::VehicleOnly, 3),
    (PlateCategory::Blue, PresenceState::Neither, 4),
    (PlateCategory::Blue, PresenceState::NotListed, 5),
    (PlateCategory::WhiteYellow, PresenceState::Matched, 6),
    (PlateCategory::WhiteYellow, PresenceState::OwnerOnly, 7),
    (PlateCategory::WhiteYellow, PresenceState::VehicleOnly, 8),
    (PlateCategory::WhiteYellow, PresenceState::Neither, 9),
    (PlateCategory::WhiteYellow, PresenceState::NotListed, 10),
];

/// Número de formulario validado (1–10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FormNumber(u8);

impl FormNumber {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(n: u8) -> Result<Self, String> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(format!("form number must be between 1 and 10, got {}", n))
        }
    }

    /// Formulario aplicable para una categoría y un estado
    pub fn for_state(category: PlateCategory, state: PresenceState) -> Self {
        FORM_TABLE
            .iter()
            .find(|(c, s, _)| *c == category && *s == state)
            .map(|(_, _, n)| Self(*n))
            .unwrap_or(Self(Self::MAX))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn entry(&self) -> (PlateCategory, PresenceState) {
        FORM_TABLE
            .iter()
            .find(|(_, _, n)| *n == self.0)
            .map(|(c, s, _)| (*c, *s))
            .unwrap_or((PlateCategory::WhiteYellow, PresenceState::NotListed))
    }

    pub fn category(&self) -> PlateCategory {
        self.entry().0
    }

    pub fn state(&self) -> PresenceState {
        self.entry().1
    }

    pub fn kind(&self) -> FormKind {
        match self.state() {
            PresenceState::Matched => FormKind::Matched,
            PresenceState::NotListed => FormKind::NotListed,
            _ => FormKind::Transfer,
        }
    }

    /// Título oficial del formulario
    pub fn title(&self) -> &'static str {
        match self.0 {
            1 | 6 => "DANH SÁCH XE, CHỦ XE ĐÚNG VỚI DANH SÁCH CƠ QUAN ĐĂNG KÝ CUNG CẤP",
            2 | 7 => "DANH SÁCH CÓ CHỦ XE NHƯNG KHÔNG CÓ XE TẠI ĐỊA BÀN",
            3 | 8 => "DANH SÁCH CÓ XE NHƯNG KHÔNG CÓ CHỦ XE TẠI ĐỊA BÀN",
            4 | 9 => "DANH SÁCH KHÔNG CÓ XE, KHÔNG CÓ CHỦ XE TẠI ĐỊA BÀN",
            _ => "XE KHÔNG NẰM TRONG DANH SÁCH",
        }
    }

    pub fn all() -> impl Iterator<Item = FormNumber> {
        (Self::MIN..=Self::MAX).map(Self)
    }
}

impl TryFrom<u8> for FormNumber {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<FormNumber> for u8 {
    fn from(f: FormNumber) -> u8 {
        f.0
    }
}

impl fmt::Display for FormNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_combination_is_mapped() {
        for category in [PlateCategory::Blue, PlateCategory::WhiteYellow] {
            for found in [false, true] {
                for vehicle in [false, true] {
                    for owner in [false, true] {
                        let state = PresenceState::from_flags(found, vehicle, owner);
                        let form = FormNumber::for_state(category, state);
                        assert_eq!(form.category(), category);
                        assert_eq!(form.state(), state);
                        if vehicle || owner {
                            assert_ne!(state, PresenceState::NotListed);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_mapping_table() {
        use PresenceState::*;
        let blue: Vec<u8> = [Matched, OwnerOnly, VehicleOnly, Neither, NotListed]
            .iter()
            .map(|s| FormNumber::for_state(PlateCategory::Blue, *s).value())
            .collect();
        assert_eq!(blue, vec![1, 2, 3, 4, 5]);

        let white: Vec<u8> = [Matched, OwnerOnly, VehicleOnly, Neither, NotListed]
            .iter()
            .map(|s| FormNumber::for_state(PlateCategory::WhiteYellow, *s).value())
            .collect();
        assert_eq!(white, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_presence_flags_decide_the_state() {
        use PresenceState::*;
        assert_eq!(PresenceState::from_flags(false, false, true), OwnerOnly);
        assert_eq!(PresenceState::from_flags(false, true, false), VehicleOnly);
        assert_eq!(PresenceState::from_flags(true, false, false), Neither);
        assert_eq!(PresenceState::from_flags(false, false, false), NotListed);
    }

    #[test]
    fn test_form_number_bounds() {
        assert!(FormNumber::new(0).is_err());
        assert!(FormNumber::new(11).is_err());
        assert_eq!(FormNumber::new(7).unwrap().kind(), FormKind::Transfer);
        assert_eq!(FormNumber::new(10).unwrap().kind(), FormKind::NotListed);
        assert_eq!(FormNumber::all().count(), 10);
    }

    #[test]
    fn test_serde_rejects_out_of_range() {
        assert!(serde_json::from_str::<FormNumber>("12").is_err());
        assert_eq!(serde_json::from_str::<FormNumber>("3").unwrap().value(), 3);
    }
}
