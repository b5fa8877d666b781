//! Modelos del sistema
//!
//! Este módulo contiene los modelos de dominio: lotes, registros importados,
//! formularios y solicitudes de actualización.

pub mod batch;
pub mod form;
pub mod request;
pub mod vehicle;

pub use batch::{Batch, BatchStatus, DataFile, RecordPage, UploadMeta};
pub use form::{FormKind, FormNumber, PresenceState};
pub use request::{
    FieldKey, NewRequest, RequestFields, RequestFilter, RequestStats, RequestStatus, UpdateRequest,
};
pub use vehicle::{
    NewOwner, NewVehicle, OwnerIdentity, OwnerRecord, ParsedRows, PlateCategory, SheetKind, VehicleRecord,
};
