//! Motor de clasificación de placas
//!
//! Para una placa y el lote activo calcula los indicadores de presencia y el
//! formulario aplicable. Todas las lecturas de una consulta usan el mismo
//! `batch_id`, así que una activación concurrente nunca produce una mezcla de
//! lotes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::models::{
    FormNumber, OwnerIdentity, OwnerRecord, PlateCategory, PresenceState, VehicleRecord,
};
use crate::repositories::BatchStore;
use crate::utils::errors::{AppError, AppResult};
use crate::utils::normalize::{normalize_document, normalize_plate};

/// Datos opcionales que aporta el ciudadano en la consulta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupHint {
    pub category: Option<PlateCategory>,
    pub owner_name: Option<String>,
    pub owner_address: Option<String>,
    pub national_id: Option<String>,
}

impl LookupHint {
    fn identity(&self) -> OwnerIdentity {
        OwnerIdentity::new(
            self.owner_name.as_deref(),
            self.owner_address.as_deref(),
            self.national_id.as_deref(),
        )
    }
}

/// Resultado de clasificar una placa
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub plate: String,
    pub category: PlateCategory,
    pub found: bool,
    pub vehicle_present: bool,
    pub owner_present: bool,
    pub state: PresenceState,
    pub form_number: FormNumber,
    pub record: Option<VehicleRecord>,
    pub owner: Option<OwnerRecord>,
    pub batch_id: i64,
}

fn blue_plate_format() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{2}[A-E][0-9]{5}$").expect("valid blue plate regex"))
}

/// Categoría deducida solo del formato de una placa normalizada
pub fn category_by_format(plate: &str) -> PlateCategory {
    if blue_plate_format().is_match(plate) {
        PlateCategory::Blue
    } else {
        PlateCategory::WhiteYellow
    }
}

/// Primer residente (orden de importación) que coincide con la identidad
fn first_resident_match(candidates: Vec<OwnerRecord>, identity: &OwnerIdentity) -> Option<OwnerRecord> {
    candidates
        .into_iter()
        .find(|o| o.data.resident && identity.matches_owner(&o.data))
}

#[derive(Clone)]
pub struct MatchEngine {
    store: Arc<dyn BatchStore>,
}

impl MatchEngine {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self { store }
    }

    /// Clasifica una placa contra el lote activo
    pub async fn classify(&self, raw_plate: &str, hint: &LookupHint) -> AppResult<Classification> {
        let plate = normalize_plate(raw_plate);
        if plate.is_empty() {
            return Err(AppError::BadRequest("plate number is required".to_string()));
        }
        let batch = self.store.get_active().await?;

        let (category, vehicle) = match hint.category {
            Some(category) => (category, self.store.find_vehicle(batch.id, category, &plate).await?),
            None => self.resolve_category(batch.id, &plate).await?,
        };

        let declaring = self.store.owners_declaring_plate(batch.id, &plate).await?;

        let owner = match &vehicle {
            Some(record) => {
                let identity = OwnerIdentity::of_vehicle(&record.data);
                if identity.is_empty() {
                    None
                } else {
                    let candidates = self.store.owner_candidates(batch.id, &identity).await?;
                    first_resident_match(candidates, &identity)
                }
            }
            None => match declaring.iter().find(|o| o.data.resident).cloned() {
                Some(owner) => Some(owner),
                None => {
                    let identity = hint.identity();
                    if identity.is_empty() {
                        None
                    } else {
                        let candidates = self.store.owner_candidates(batch.id, &identity).await?;
                        first_resident_match(candidates, &identity)
                    }
                }
            },
        };

        let vehicle_present = vehicle.is_some();
        let owner_present = owner.is_some();
        let found = vehicle_present || owner_present || !declaring.is_empty();
        let state = PresenceState::from_flags(found, vehicle_present, owner_present);
        let form_number = FormNumber::for_state(category, state);

        debug!(
            "🔎 Placa {} ({}) en lote {}: {:?} → formulario {}",
            plate, category, batch.id, state, form_number
        );

        Ok(Classification {
            plate,
            category,
            found,
            vehicle_present,
            owner_present,
            state,
            form_number,
            record: vehicle,
            owner,
            batch_id: batch.id,
        })
    }

    /// Registro azul, luego blanco/amarillo, luego convención de formato
    async fn resolve_category(
        &self,
        batch_id: i64,
        plate: &str,
    ) -> AppResult<(PlateCategory, Option<VehicleRecord>)> {
        for category in [PlateCategory::Blue, PlateCategory::WhiteYellow] {
            if let Some(record) = self.store.find_vehicle(batch_id, category, plate).await? {
                return Ok((category, Some(record)));
            }
        }
        Ok((category_by_format(plate), None))
    }

    /// Id del lote activo; `None` mientras no se haya activado ninguno
    pub async fn active_batch_id(&self) -> AppResult<Option<i64>> {
        match self.store.get_active().await {
            Ok(batch) => Ok(Some(batch.id)),
            Err(AppError::NoActiveBatch) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Vehículos del lote activo cuyo propietario tiene ese documento
    pub async fn lookup_by_national_id(&self, national_id: &str) -> AppResult<Vec<VehicleRecord>> {
        let document = normalize_document(national_id);
        if document.is_empty() {
            return Err(AppError::BadRequest("national id is required".to_string()));
        }
        let batch = self.store.get_active().await?;
        self.store.vehicles_by_document(batch.id, &document).await
    }
}
