//! Normalized analysis rows and the pending records built from them.

use crate::fields::{Field, KEY_FIELDS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// One spreadsheet row after mapping and normalization: one optional slot
/// per canonical field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisValues {
    pub municipio: Option<String>,
    pub localidad: Option<String>,
    pub nombre_productor: Option<String>,
    pub cultivo_anterior: Option<String>,
    pub clave_muestra: Option<String>,
    pub fecha_muestreo: Option<String>,
    pub arcilla: Option<f64>,
    pub limo: Option<f64>,
    pub arena: Option<f64>,
    pub textura: Option<String>,
    pub densidad_aparente: Option<f64>,
    pub ph: Option<f64>,
    pub materia_organica: Option<f64>,
    pub conductividad_electrica: Option<f64>,
    pub nitrogeno: Option<f64>,
    pub fosforo: Option<f64>,
    pub potasio: Option<f64>,
    pub calcio: Option<f64>,
    pub magnesio: Option<f64>,
    pub sodio: Option<f64>,
    pub azufre: Option<f64>,
    pub hierro: Option<f64>,
    pub cobre: Option<f64>,
    pub zinc: Option<f64>,
    pub manganeso: Option<f64>,
    pub boro: Option<f64>,
    pub cic: Option<f64>,
    pub relacion_ca_mg: Option<f64>,
    pub relacion_mg_k: Option<f64>,
    pub relacion_ca_k: Option<f64>,
    pub relacion_ca_mg_k: Option<f64>,
    pub relacion_k_mg: Option<f64>,
    pub observaciones: Option<String>,
    pub recomendaciones: Option<String>,
}

impl AnalysisValues {
    /// Slot of a text field; `None` for numeric fields.
    pub fn text_slot(&mut self, field: Field) -> Option<&mut Option<String>> {
        let slot = match field {
            Field::Municipio => &mut self.municipio,
            Field::Localidad => &mut self.localidad,
            Field::NombreProductor => &mut self.nombre_productor,
            Field::CultivoAnterior => &mut self.cultivo_anterior,
            Field::ClaveMuestra => &mut self.clave_muestra,
            Field::FechaMuestreo => &mut self.fecha_muestreo,
            Field::Textura => &mut self.textura,
            Field::Observaciones => &mut self.observaciones,
            Field::Recomendaciones => &mut self.recomendaciones,
            _ => return None,
        };
        Some(slot)
    }

    /// Slot of a numeric field; `None` for text fields.
    pub fn number_slot(&mut self, field: Field) -> Option<&mut Option<f64>> {
        let slot = match field {
            Field::Arcilla => &mut self.arcilla,
            Field::Limo => &mut self.limo,
            Field::Arena => &mut self.arena,
            Field::DensidadAparente => &mut self.densidad_aparente,
            Field::Ph => &mut self.ph,
            Field::MateriaOrganica => &mut self.materia_organica,
            Field::ConductividadElectrica => &mut self.conductividad_electrica,
            Field::Nitrogeno => &mut self.nitrogeno,
            Field::Fosforo => &mut self.fosforo,
            Field::Potasio => &mut self.potasio,
            Field::Calcio => &mut self.calcio,
            Field::Magnesio => &mut self.magnesio,
            Field::Sodio => &mut self.sodio,
            Field::Azufre => &mut self.azufre,
            Field::Hierro => &mut self.hierro,
            Field::Cobre => &mut self.cobre,
            Field::Zinc => &mut self.zinc,
            Field::Manganeso => &mut self.manganeso,
            Field::Boro => &mut self.boro,
            Field::Cic => &mut self.cic,
            Field::RelacionCaMg => &mut self.relacion_ca_mg,
            Field::RelacionMgK => &mut self.relacion_mg_k,
            Field::RelacionCaK => &mut self.relacion_ca_k,
            Field::RelacionCaMgK => &mut self.relacion_ca_mg_k,
            Field::RelacionKMg => &mut self.relacion_k_mg,
            _ => return None,
        };
        Some(slot)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Municipio => self.municipio.as_deref(),
            Field::Localidad => self.localidad.as_deref(),
            Field::NombreProductor => self.nombre_productor.as_deref(),
            Field::CultivoAnterior => self.cultivo_anterior.as_deref(),
            Field::ClaveMuestra => self.clave_muestra.as_deref(),
            Field::FechaMuestreo => self.fecha_muestreo.as_deref(),
            Field::Textura => self.textura.as_deref(),
            Field::Observaciones => self.observaciones.as_deref(),
            Field::Recomendaciones => self.recomendaciones.as_deref(),
            _ => None,
        }
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        match field {
            Field::Arcilla => self.arcilla,
            Field::Limo => self.limo,
            Field::Arena => self.arena,
            Field::DensidadAparente => self.densidad_aparente,
            Field::Ph => self.ph,
            Field::MateriaOrganica => self.materia_organica,
            Field::ConductividadElectrica => self.conductividad_electrica,
            Field::Nitrogeno => self.nitrogeno,
            Field::Fosforo => self.fosforo,
            Field::Potasio => self.potasio,
            Field::Calcio => self.calcio,
            Field::Magnesio => self.magnesio,
            Field::Sodio => self.sodio,
            Field::Azufre => self.azufre,
            Field::Hierro => self.hierro,
            Field::Cobre => self.cobre,
            Field::Zinc => self.zinc,
            Field::Manganeso => self.manganeso,
            Field::Boro => self.boro,
            Field::Cic => self.cic,
            Field::RelacionCaMg => self.relacion_ca_mg,
            Field::RelacionMgK => self.relacion_mg_k,
            Field::RelacionCaK => self.relacion_ca_k,
            Field::RelacionCaMgK => self.relacion_ca_mg_k,
            Field::RelacionKMg => self.relacion_k_mg,
            _ => None,
        }
    }

    /// A row is worth keeping if it names a place or producer, or carries at
    /// least one non-zero measurement.
    pub fn is_significant(&self) -> bool {
        KEY_FIELDS.iter().any(|f| self.text(*f).is_some())
            || Field::numeric_fields().any(|f| matches!(self.number(f), Some(v) if v != 0.0))
    }

    /// Checks text values against the store's column length limits.
    /// Numeric values are stored as read.
    pub fn check_constraints(&self) -> Result<(), RowError> {
        for field in Field::text_fields() {
            if let Some(text) = self.text(field) {
                let len = text.chars().count();
                if len > field.max_len() {
                    return Err(RowError::TextTooLong {
                        field,
                        len,
                        max: field.max_len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Why a row could not become a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("{field} has {len} characters, limit is {max}")]
    TextTooLong { field: Field, len: usize, max: usize },
}

/// Validation workflow state of an ingested record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "validado")]
    Validated,
    #[serde(rename = "invalidado")]
    Invalidated,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Pending => "pendiente",
            RecordStatus::Validated => "validado",
            RecordStatus::Invalidated => "invalidado",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendiente" => Ok(RecordStatus::Pending),
            "validado" => Ok(RecordStatus::Validated),
            "invalidado" => Ok(RecordStatus::Invalidated),
            other => Err(format!("unknown record status '{}'", other)),
        }
    }
}

/// An ingested row awaiting validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRecord {
    pub id: Uuid,
    #[serde(rename = "usuario_id")]
    pub owner_id: Uuid,
    pub municipio_id: Option<Uuid>,
    #[serde(rename = "nombre_archivo")]
    pub filename: String,
    #[serde(rename = "estatus")]
    pub status: RecordStatus,
    #[serde(rename = "comentario_invalido")]
    pub invalid_comment: Option<String>,
    #[serde(rename = "fecha_creacion")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub values: AnalysisValues,
}

impl PendingRecord {
    /// Builds a pending record, enforcing the store's column constraints.
    pub fn new(
        values: AnalysisValues,
        owner_id: Uuid,
        filename: &str,
        municipio_id: Option<Uuid>,
    ) -> Result<Self, RowError> {
        values.check_constraints()?;
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            municipio_id,
            filename: filename.to_string(),
            status: RecordStatus::Pending,
            invalid_comment: None,
            created_at: Utc::now(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldKind;

    #[test]
    fn test_slots_follow_field_kind() {
        let mut values = AnalysisValues::default();
        for field in Field::ALL {
            match field.kind() {
                FieldKind::Text => {
                    assert!(values.text_slot(field).is_some(), "{}", field);
                    assert!(values.number_slot(field).is_none(), "{}", field);
                }
                FieldKind::Number => {
                    assert!(values.number_slot(field).is_some(), "{}", field);
                    assert!(values.text_slot(field).is_none(), "{}", field);
                }
            }
        }
    }

    #[test]
    fn test_slot_writes_are_visible_through_getters() {
        let mut values = AnalysisValues::default();
        for (i, field) in Field::numeric_fields().enumerate() {
            *values.number_slot(field).unwrap() = Some(i as f64 + 0.5);
        }
        for field in Field::text_fields() {
            *values.text_slot(field).unwrap() = Some(field.column().to_string());
        }
        for (i, field) in Field::numeric_fields().enumerate() {
            assert_eq!(values.number(field), Some(i as f64 + 0.5), "{}", field);
        }
        for field in Field::text_fields() {
            assert_eq!(values.text(field), Some(field.column()), "{}", field);
        }
        assert_eq!(values.nombre_productor.as_deref(), Some("nombre_productor"));
        assert_eq!(values.relacion_k_mg, values.number(Field::RelacionKMg));
    }

    #[test]
    fn test_significance() {
        let mut values = AnalysisValues::default();
        assert!(!values.is_significant());

        values.ph = Some(0.0);
        values.observaciones = Some("muestra perdida".to_string());
        assert!(!values.is_significant());

        values.ph = Some(6.5);
        assert!(values.is_significant());

        let only_key = AnalysisValues {
            localidad: Some("San Juan".to_string()),
            ..Default::default()
        };
        assert!(only_key.is_significant());
    }

    #[test]
    fn test_constraints() {
        let ok = AnalysisValues {
            ph: Some(7.2),
            arcilla: Some(35.0),
            fosforo: Some(120.0),
            ..Default::default()
        };
        assert_eq!(ok.check_constraints(), Ok(()));

        let long = AnalysisValues {
            municipio: Some("x".repeat(300)),
            ..Default::default()
        };
        let err = long.check_constraints().unwrap_err();
        assert_eq!(err.to_string(), "municipio has 300 characters, limit is 255");

        let long_key = AnalysisValues {
            clave_muestra: Some("A".repeat(51)),
            ..Default::default()
        };
        assert_eq!(
            long_key.check_constraints(),
            Err(RowError::TextTooLong {
                field: Field::ClaveMuestra,
                len: 51,
                max: 50
            })
        );
    }

    #[test]
    fn test_numeric_values_are_not_range_checked() {
        let unusual = AnalysisValues {
            ph: Some(72.0),
            arcilla: Some(-0.5),
            arena: Some(100.4),
            potasio: Some(1e12),
            ..Default::default()
        };
        assert_eq!(unusual.check_constraints(), Ok(()));
    }

    #[test]
    fn test_pending_record_defaults() {
        let owner = Uuid::new_v4();
        let values = AnalysisValues {
            municipio: Some("Oaxaca".to_string()),
            ..Default::default()
        };
        let record = PendingRecord::new(values, owner, "suelos.xlsx", None).unwrap();
        assert_eq!(record.status, RecordStatus::Pending);
        assert_eq!(record.owner_id, owner);
        assert_eq!(record.filename, "suelos.xlsx");
        assert!(record.invalid_comment.is_none());
    }

    #[test]
    fn test_pending_record_serialized_shape() {
        let values = AnalysisValues {
            ph: Some(6.1),
            ..Default::default()
        };
        let record = PendingRecord::new(values, Uuid::new_v4(), "a.csv", None).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["estatus"], "pendiente");
        assert_eq!(json["nombre_archivo"], "a.csv");
        assert_eq!(json["ph"], 6.1);
        assert!(json["comentario_invalido"].is_null());
        assert!(json.get("fecha_creacion").is_some());
        assert!(json["municipio"].is_null());
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [RecordStatus::Pending, RecordStatus::Validated, RecordStatus::Invalidated] {
            assert_eq!(status.as_str().parse::<RecordStatus>(), Ok(status));
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
        assert!("archivado".parse::<RecordStatus>().is_err());
    }
}
