//! Modelo de solicitudes de actualización
//!
//! `RequestFields` es el superconjunto de campos de los diez formularios; cada
//! solicitud rellena solo los suyos. `FieldKey` permite recorrer esos campos
//! por nombre (exportación, reimportación, almacenamiento disperso).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::form::FormNumber;
use super::vehicle::PlateCategory;

/// Estado de procesamiento de una solicitud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Received,
    Reviewed,
    Exported,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Received => "received",
            RequestStatus::Reviewed => "reviewed",
            RequestStatus::Exported => "exported",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(RequestStatus::Received),
            "reviewed" => Ok(RequestStatus::Reviewed),
            "exported" => Ok(RequestStatus::Exported),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

/// Campos enviados por el ciudadano (todos opcionales)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_tax_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Nombre de un campo de `RequestFields`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    VehicleType,
    OwnerName,
    OwnerAddress,
    OwnerPhone,
    OwnerTaxCode,
    BuyerName,
    BuyerAddress,
    BuyerIdNumber,
    BuyerPhone,
    TransferDocument,
    ChassisNumber,
    EngineNumber,
    VehicleCondition,
    Notes,
}

impl RequestFields {
    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.slot(key).as_deref()
    }

    /// Asigna un valor; cadenas vacías se guardan como ausentes
    pub fn set(&mut self, key: FieldKey, value: Option<String>) {
        *self.slot_mut(key) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    }

    /// Vista dispersa: solo los campos presentes
    pub fn to_sparse(&self) -> BTreeMap<&'static str, String> {
        FieldKey::ALL
            .iter()
            .filter_map(|k| self.get(*k).map(|v| (k.as_str(), v.to_string())))
            .collect()
    }

    fn slot(&self, key: FieldKey) -> &Option<String> {
        match key {
            FieldKey::VehicleType => &self.vehicle_type,
            FieldKey::OwnerName => &self.owner_name,
            FieldKey::OwnerAddress => &self.owner_address,
            FieldKey::OwnerPhone => &self.owner_phone,
            FieldKey::OwnerTaxCode => &self.owner_tax_code,
            FieldKey::BuyerName => &self.buyer_name,
            FieldKey::BuyerAddress => &self.buyer_address,
            FieldKey::BuyerIdNumber => &self.buyer_id_number,
            FieldKey::BuyerPhone => &self.buyer_phone,
            FieldKey::TransferDocument => &self.transfer_document,
            FieldKey::ChassisNumber => &self.chassis_number,
            FieldKey::EngineNumber => &self.engine_number,
            FieldKey::VehicleCondition => &self.vehicle_condition,
            FieldKey::Notes => &self.notes,
        }
    }

    fn slot_mut(&mut self, key: FieldKey) -> &mut Option<String> {
        match key {
            FieldKey::VehicleType => &mut self.vehicle_type,
            FieldKey::OwnerName => &mut self.owner_name,
            FieldKey::OwnerAddress => &mut self.owner_address,
            FieldKey::OwnerPhone => &mut self.owner_phone,
            FieldKey::OwnerTaxCode => &mut self.owner_tax_code,
            FieldKey::BuyerName => &mut self.buyer_name,
            FieldKey::BuyerAddress => &mut self.buyer_address,
            FieldKey::BuyerIdNumber => &mut self.buyer_id_number,
            FieldKey::BuyerPhone => &mut self.buyer_phone,
            FieldKey::TransferDocument => &mut self.transfer_document,
            FieldKey::ChassisNumber => &mut self.chassis_number,
            FieldKey::EngineNumber => &mut self.engine_number,
            FieldKey::VehicleCondition => &mut self.vehicle_condition,
            FieldKey::Notes => &mut self.notes,
        }
    }
}

impl FieldKey {
    pub const ALL: [FieldKey; 14] = [
        FieldKey::VehicleType,
        FieldKey::OwnerName,
        FieldKey::OwnerAddress,
        FieldKey::OwnerPhone,
        FieldKey::OwnerTaxCode,
        FieldKey::BuyerName,
        FieldKey::BuyerAddress,
        FieldKey::BuyerIdNumber,
        FieldKey::BuyerPhone,
        FieldKey::TransferDocument,
        FieldKey::ChassisNumber,
        FieldKey::EngineNumber,
        FieldKey::VehicleCondition,
        FieldKey::Notes,
    ];

    /// Nombre serializado, igual al de `RequestFields`
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::VehicleType => "vehicle_type",
            FieldKey::OwnerName => "owner_name",
            FieldKey::OwnerAddress => "owner_address",
            FieldKey::OwnerPhone => "owner_phone",
            FieldKey::OwnerTaxCode => "owner_tax_code",
            FieldKey::BuyerName => "buyer_name",
            FieldKey::BuyerAddress => "buyer_address",
            FieldKey::BuyerIdNumber => "buyer_id_number",
            FieldKey::BuyerPhone => "buyer_phone",
            FieldKey::TransferDocument => "transfer_document",
            FieldKey::ChassisNumber => "chassis_number",
            FieldKey::EngineNumber => "engine_number",
            FieldKey::VehicleCondition => "vehicle_condition",
            FieldKey::Notes => "notes",
        }
    }
}

/// Solicitud lista para persistir (sin estado ni marca de tiempo aún)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub plate: String,
    pub form_number: FormNumber,
    pub batch_id: Option<i64>,
    pub fields: RequestFields,
}

/// Solicitud persistida en el ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub tracking_code: String,
    pub form_number: FormNumber,
    pub plate: String,
    pub category: PlateCategory,
    pub batch_id: Option<i64>,
    pub fields: RequestFields,
    pub status: RequestStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl UpdateRequest {
    pub fn from_new(tracking_code: String, new: NewRequest, submitted_at: DateTime<Utc>) -> Self {
        Self {
            tracking_code,
            category: new.form_number.category(),
            form_number: new.form_number,
            plate: new.plate,
            batch_id: new.batch_id,
            fields: new.fields,
            status: RequestStatus::Received,
            submitted_at,
            reviewed_by: None,
            reviewed_at: None,
            exported_at: None,
        }
    }
}

/// Filtro de listado para el panel de administración
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub form_number: Option<FormNumber>,
    pub status: Option<RequestStatus>,
    pub submitted_from: Option<DateTime<Utc>>,
    pub submitted_to: Option<DateTime<Utc>>,
}

impl RequestFilter {
    pub fn for_form(form_number: FormNumber) -> Self {
        Self { form_number: Some(form_number), ..Default::default() }
    }

    /// Evalúa el filtro en memoria; el rango de fechas es semiabierto `[from, to)`
    pub fn matches(&self, request: &UpdateRequest) -> bool {
        self.form_number.map_or(true, |f| f == request.form_number)
            && self.status.map_or(true, |s| s == request.status)
            && self.submitted_from.map_or(true, |from| request.submitted_at >= from)
            && self.submitted_to.map_or(true, |to| request.submitted_at < to)
    }
}

/// Estadísticas de solicitudes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_form: BTreeMap<u8, i64>,
}
