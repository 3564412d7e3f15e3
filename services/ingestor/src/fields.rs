//! Canonical fields of a soil / chemical analysis record and the static
//! vocabularies used to recognize them in uploaded spreadsheets.
//!
//! Everything here is read-only reference data. Synonyms are written in
//! their normalized form (see [`crate::normalize::normalize_header`]) and
//! listed in priority order: the first exact match wins.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a canonical field is normalized and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// One of the fixed domain attributes a spreadsheet row is normalized into.
///
/// The serialized name is the persisted column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Municipio,
    Localidad,
    NombreProductor,
    CultivoAnterior,
    ClaveMuestra,
    FechaMuestreo,
    Arcilla,
    Limo,
    Arena,
    Textura,
    DensidadAparente,
    Ph,
    MateriaOrganica,
    ConductividadElectrica,
    Nitrogeno,
    Fosforo,
    Potasio,
    Calcio,
    Magnesio,
    Sodio,
    Azufre,
    Hierro,
    Cobre,
    Zinc,
    Manganeso,
    Boro,
    Cic,
    RelacionCaMg,
    RelacionMgK,
    RelacionCaK,
    RelacionCaMgK,
    RelacionKMg,
    Observaciones,
    Recomendaciones,
}

impl Field {
    /// All canonical fields, in mapping order.
    pub const ALL: [Field; 34] = [
        Field::Municipio,
        Field::Localidad,
        Field::NombreProductor,
        Field::CultivoAnterior,
        Field::ClaveMuestra,
        Field::FechaMuestreo,
        Field::Arcilla,
        Field::Limo,
        Field::Arena,
        Field::Textura,
        Field::DensidadAparente,
        Field::Ph,
        Field::MateriaOrganica,
        Field::ConductividadElectrica,
        Field::Nitrogeno,
        Field::Fosforo,
        Field::Potasio,
        Field::Calcio,
        Field::Magnesio,
        Field::Sodio,
        Field::Azufre,
        Field::Hierro,
        Field::Cobre,
        Field::Zinc,
        Field::Manganeso,
        Field::Boro,
        Field::Cic,
        Field::RelacionCaMg,
        Field::RelacionMgK,
        Field::RelacionCaK,
        Field::RelacionCaMgK,
        Field::RelacionKMg,
        Field::Observaciones,
        Field::Recomendaciones,
    ];

    /// Persisted column name.
    pub fn column(self) -> &'static str {
        match self {
            Field::Municipio => "municipio",
            Field::Localidad => "localidad",
            Field::NombreProductor => "nombre_productor",
            Field::CultivoAnterior => "cultivo_anterior",
            Field::ClaveMuestra => "clave_muestra",
            Field::FechaMuestreo => "fecha_muestreo",
            Field::Arcilla => "arcilla",
            Field::Limo => "limo",
            Field::Arena => "arena",
            Field::Textura => "textura",
            Field::DensidadAparente => "densidad_aparente",
            Field::Ph => "ph",
            Field::MateriaOrganica => "materia_organica",
            Field::ConductividadElectrica => "conductividad_electrica",
            Field::Nitrogeno => "nitrogeno",
            Field::Fosforo => "fosforo",
            Field::Potasio => "potasio",
            Field::Calcio => "calcio",
            Field::Magnesio => "magnesio",
            Field::Sodio => "sodio",
            Field::Azufre => "azufre",
            Field::Hierro => "hierro",
            Field::Cobre => "cobre",
            Field::Zinc => "zinc",
            Field::Manganeso => "manganeso",
            Field::Boro => "boro",
            Field::Cic => "cic",
            Field::RelacionCaMg => "relacion_ca_mg",
            Field::RelacionMgK => "relacion_mg_k",
            Field::RelacionCaK => "relacion_ca_k",
            Field::RelacionCaMgK => "relacion_ca_mg_k",
            Field::RelacionKMg => "relacion_k_mg",
            Field::Observaciones => "observaciones",
            Field::Recomendaciones => "recomendaciones",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Municipio
            | Field::Localidad
            | Field::NombreProductor
            | Field::CultivoAnterior
            | Field::ClaveMuestra
            | Field::FechaMuestreo
            | Field::Textura
            | Field::Observaciones
            | Field::Recomendaciones => FieldKind::Text,
            _ => FieldKind::Number,
        }
    }

    /// Header spellings seen in lab spreadsheets, most specific first.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::Municipio => &["municipio", "mpio", "municipality"],
            Field::Localidad => &["localidad", "comunidad", "loc", "ejido", "locality", "paraje"],
            Field::NombreProductor => &[
                "nombre_productor",
                "nombre_del_productor",
                "productor",
                "nombre",
                "agricultor",
                "producer",
            ],
            Field::CultivoAnterior => &[
                "cultivo_anterior",
                "cultivo_previo",
                "cultivo_ant",
                "cultivo",
            ],
            Field::ClaveMuestra => &[
                "clave_muestra",
                "num_muestra",
                "muestra",
                "folio",
                "clave",
            ],
            Field::FechaMuestreo => &["fecha_muestreo", "fecha_de_muestreo", "fecha"],
            Field::Arcilla => &["arcilla", "arcilla_pct", "clay"],
            Field::Limo => &["limo", "limo_pct", "silt"],
            Field::Arena => &["arena", "arena_pct", "sand"],
            Field::Textura => &["textura", "clase_textural", "texture"],
            Field::DensidadAparente => &["densidad_aparente", "dap", "da", "densidad"],
            Field::Ph => &["ph", "ph_agua", "ph_h2o", "potencial_hidrogeno"],
            Field::MateriaOrganica => &["materia_organica", "mo", "organic_matter"],
            Field::ConductividadElectrica => &[
                "conductividad_electrica",
                "ce",
                "conductividad",
            ],
            Field::Nitrogeno => &["nitrogeno", "nitrogeno_inorganico", "n"],
            Field::Fosforo => &["fosforo", "fosforo_olsen", "fosforo_bray", "p"],
            Field::Potasio => &["potasio", "k"],
            Field::Calcio => &["calcio", "ca"],
            Field::Magnesio => &["magnesio", "mg"],
            Field::Sodio => &["sodio", "na"],
            Field::Azufre => &["azufre", "s"],
            Field::Hierro => &["hierro", "fe"],
            Field::Cobre => &["cobre", "cu"],
            Field::Zinc => &["zinc", "zn"],
            Field::Manganeso => &["manganeso", "mn"],
            Field::Boro => &["boro", "b"],
            Field::Cic => &[
                "cic",
                "capacidad_de_intercambio_cationico",
                "capacidad_intercambio_cationico",
                "cice",
            ],
            Field::RelacionCaMg => &["ca_mg", "relacion_ca_mg"],
            Field::RelacionMgK => &["mg_k", "relacion_mg_k"],
            Field::RelacionCaK => &["ca_k", "relacion_ca_k"],
            Field::RelacionCaMgK => &["ca_mg_k", "relacion_ca_mg_k"],
            Field::RelacionKMg => &["k_mg", "relacion_k_mg"],
            Field::Observaciones => &["observaciones", "observacion", "obs", "notas", "comentarios"],
            Field::Recomendaciones => &["recomendaciones", "recomendacion", "sugerencias"],
        }
    }

    /// Longest text the store accepts for a text field.
    pub fn max_len(self) -> usize {
        match self {
            Field::Observaciones | Field::Recomendaciones => 2000,
            Field::ClaveMuestra | Field::FechaMuestreo => 50,
            _ => 255,
        }
    }

    pub fn text_fields() -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(|f| f.kind() == FieldKind::Text)
    }

    pub fn numeric_fields() -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(|f| f.kind() == FieldKind::Number)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Identifying columns repaired by fill-down; also the fields that make a
/// row worth keeping on their own.
pub const KEY_FIELDS: [Field; 3] = [Field::Municipio, Field::Localidad, Field::NombreProductor];

/// Cell values treated as "no value", compared case-insensitively.
pub const MISSING_TOKENS: &[&str] = &[
    "na", "nd", "n/a", "n/d", "nan", "none", "null", "nil", "#n/a", "#null!",
];

/// Fragments that hint a cell belongs to the header row.
pub const HEADER_KEYWORDS: &[&str] = &[
    "municipio",
    "localidad",
    "nombre",
    "productor",
    "cultivo",
    "anterior",
    "arcilla",
    "limo",
    "arena",
    "textura",
    "fosforo",
    "ph",
    "mo",
];

/// Header cells that are almost certainly column titles.
pub const EXACT_HEADERS: &[&str] = &[
    "municipio",
    "localidad",
    "nombre_productor",
    "cultivo_anterior",
    "ph",
    "mo",
    "textura",
];
