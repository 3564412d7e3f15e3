//! Matching sheet headers to canonical fields.
//!
//! Fields are visited in canonical order. Each one takes a header equal to
//! one of its synonyms after normalization, or else the best partially
//! matching header still available. A header is handed out at most once.
//!
//! [`MappingStrategy::ExactFirst`] resolves every exact match before any
//! partial one and only lets short synonyms match whole words.

use crate::fields::Field;
use crate::normalize::normalize_header;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Weight of raw containment, applied to the shorter string's length.
const CONTAINS_WEIGHT: f64 = 2.0;
/// Weight of a shared prefix, applied to the synonym's length.
const PREFIX_WEIGHT: f64 = 1.5;
/// Weight of a shared suffix, applied to the synonym's length.
const SUFFIX_WEIGHT: f64 = 1.2;
/// Points for each synonym word present in the header.
const WORD_POINTS: f64 = 3.0;
/// Under `ExactFirst`, shorter strings only count as whole words.
const MIN_SUBSTRING_LEN: usize = 3;

/// Order in which exact and partial matches are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MappingStrategy {
    /// Field by field: exact match, else best partial match.
    #[default]
    PerField,
    /// All exact matches first, then partial matches on whole words for
    /// synonyms shorter than three characters.
    ExactFirst,
}

/// Canonical field → original header text, `None` when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<Field, Option<String>>);

impl FieldMap {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).and_then(|h| h.as_deref())
    }

    pub fn mapped_count(&self) -> usize {
        self.0.values().filter(|h| h.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<&str>)> {
        self.0.iter().map(|(f, h)| (*f, h.as_deref()))
    }
}

/// Result of mapping a header row: the public [`FieldMap`] plus the column
/// positions the row materializer reads from.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    pub fields: FieldMap,
    pub columns: BTreeMap<Field, usize>,
    pub unmapped: Vec<String>,
}

impl ColumnMapping {
    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }
}

/// Maps original header strings onto canonical fields.
pub fn build_column_map(headers: &[String]) -> FieldMap {
    map_columns(headers).fields
}

/// Like [`build_column_map`], keeping column indices and the headers left
/// without a field.
pub fn map_columns(headers: &[String]) -> ColumnMapping {
    map_columns_with(headers, MappingStrategy::default())
}

pub fn map_columns_with(headers: &[String], strategy: MappingStrategy) -> ColumnMapping {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut available: Vec<bool> = normalized.iter().map(|h| !h.is_empty()).collect();
    let mut columns: BTreeMap<Field, usize> = BTreeMap::new();

    match strategy {
        MappingStrategy::PerField => {
            for field in Field::ALL {
                if let Some(idx) = exact_match(field, &normalized, &available) {
                    debug!(%field, header = %headers[idx], "exact header match");
                    available[idx] = false;
                    columns.insert(field, idx);
                } else if let Some((idx, score)) =
                    best_partial_match(field, &normalized, &available, partial_score)
                {
                    debug!(%field, header = %headers[idx], score, "partial header match");
                    available[idx] = false;
                    columns.insert(field, idx);
                }
            }
        }
        MappingStrategy::ExactFirst => {
            for field in Field::ALL {
                if let Some(idx) = exact_match(field, &normalized, &available) {
                    debug!(%field, header = %headers[idx], "exact header match");
                    available[idx] = false;
                    columns.insert(field, idx);
                }
            }
            for field in Field::ALL {
                if columns.contains_key(&field) {
                    continue;
                }
                if let Some((idx, score)) =
                    best_partial_match(field, &normalized, &available, whole_word_score)
                {
                    debug!(%field, header = %headers[idx], score, "partial header match");
                    available[idx] = false;
                    columns.insert(field, idx);
                }
            }
        }
    }

    let fields = FieldMap(
        Field::ALL
            .iter()
            .map(|f| (*f, columns.get(f).map(|&idx| headers[idx].clone())))
            .collect(),
    );
    let unmapped = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| !columns.values().any(|c| c == idx))
        .map(|(_, h)| h.clone())
        .collect();

    ColumnMapping {
        fields,
        columns,
        unmapped,
    }
}

fn exact_match(field: Field, normalized: &[String], available: &[bool]) -> Option<usize> {
    field.synonyms().iter().find_map(|syn| {
        normalized
            .iter()
            .enumerate()
            .find(|(idx, h)| available[*idx] && h.as_str() == *syn)
            .map(|(idx, _)| idx)
    })
}

fn best_partial_match(
    field: Field,
    normalized: &[String],
    available: &[bool],
    score_fn: fn(&str, &str) -> f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, header) in normalized.iter().enumerate() {
        if !available[idx] {
            continue;
        }
        let score = field
            .synonyms()
            .iter()
            .map(|syn| score_fn(header, syn))
            .fold(0.0, f64::max);
        if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((idx, score));
        }
    }
    best
}

/// Similarity of a normalized header and a synonym; 0 means unrelated.
///
/// Containment scores twice the shorter length, a shared prefix or suffix
/// adds 1.5 or 1.2 times the synonym length, and every `_`-separated word
/// of the synonym found anywhere in the header adds 3.
pub fn partial_score(header: &str, candidate: &str) -> f64 {
    score_with(header, candidate, 0)
}

/// [`partial_score`] where strings shorter than three characters only
/// count as whole words, so `b` does not match `observaciones`.
pub fn whole_word_score(header: &str, candidate: &str) -> f64 {
    score_with(header, candidate, MIN_SUBSTRING_LEN)
}

fn score_with(header: &str, candidate: &str, min_substring_len: usize) -> f64 {
    if header.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let header_len = header.chars().count();
    let candidate_len = candidate.chars().count();
    let mut score = 0.0;

    if header_len.min(candidate_len) >= min_substring_len {
        if header.contains(candidate) || candidate.contains(header) {
            score += CONTAINS_WEIGHT * header_len.min(candidate_len) as f64;
        }
        if header.starts_with(candidate) || candidate.starts_with(header) {
            score += PREFIX_WEIGHT * candidate_len as f64;
        }
        if header.ends_with(candidate) || candidate.ends_with(header) {
            score += SUFFIX_WEIGHT * candidate_len as f64;
        }
    }

    let header_words: Vec<&str> = header.split('_').collect();
    for word in candidate.split('_').filter(|w| !w.is_empty()) {
        let hit = if word.chars().count() < min_substring_len {
            header_words.contains(&word)
        } else {
            header.contains(word)
        };
        if hit {
            score += WORD_POINTS;
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    // -------------------------------------------------------------------------
    // EXACT MATCHES
    // -------------------------------------------------------------------------

    #[test]
    fn test_exact_matches_after_normalization() {
        let map = build_column_map(&headers(&[
            "Municipio",
            "Localidad",
            "Nombre del Productor",
            "Cultivo Anterior",
            "pH",
            "Materia orgánica",
        ]));
        assert_eq!(map.get(Field::Municipio), Some("Municipio"));
        assert_eq!(map.get(Field::Localidad), Some("Localidad"));
        assert_eq!(map.get(Field::NombreProductor), Some("Nombre del Productor"));
        assert_eq!(map.get(Field::CultivoAnterior), Some("Cultivo Anterior"));
        assert_eq!(map.get(Field::Ph), Some("pH"));
        assert_eq!(map.get(Field::MateriaOrganica), Some("Materia orgánica"));
        assert_eq!(map.mapped_count(), 6);
    }

    #[test]
    fn test_synonym_priority_order() {
        // "nombre_productor" outranks the bare "nombre" synonym.
        let map = build_column_map(&headers(&["Nombre", "Nombre_Productor"]));
        assert_eq!(map.get(Field::NombreProductor), Some("Nombre_Productor"));
    }

    #[test]
    fn test_earlier_field_takes_partial_match_before_later_exact_one() {
        // calcio comes before the ratio fields and has no exact header, so
        // its partial match wins the ratio column.
        let mapping = map_columns(&headers(&["Ca/Mg", "Mg"]));
        assert_eq!(mapping.fields.get(Field::Calcio), Some("Ca/Mg"));
        assert_eq!(mapping.fields.get(Field::Magnesio), Some("Mg"));
        assert_eq!(mapping.fields.get(Field::RelacionCaMg), None);
    }

    #[test]
    fn test_exact_first_strategy_keeps_exact_headers() {
        let mapping = map_columns_with(&headers(&["Ca/Mg", "Mg"]), MappingStrategy::ExactFirst);
        assert_eq!(mapping.fields.get(Field::RelacionCaMg), Some("Ca/Mg"));
        assert_eq!(mapping.fields.get(Field::Magnesio), Some("Mg"));
        assert_eq!(mapping.fields.get(Field::Calcio), None);
    }

    #[test]
    fn test_default_strategy_is_per_field() {
        assert_eq!(MappingStrategy::default(), MappingStrategy::PerField);
        let names = headers(&["Ca/Mg", "Mg"]);
        assert_eq!(
            map_columns(&names).columns,
            map_columns_with(&names, MappingStrategy::PerField).columns
        );
    }

    // -------------------------------------------------------------------------
    // PARTIAL MATCHES
    // -------------------------------------------------------------------------

    #[test]
    fn test_partial_matches_with_units() {
        let mapping = map_columns(&headers(&[
            "Municipio",
            "Arcilla %",
            "Limo %",
            "Arena %",
            "Textura (USDA)",
        ]));
        assert_eq!(mapping.fields.get(Field::Arcilla), Some("Arcilla %"));
        assert_eq!(mapping.fields.get(Field::Limo), Some("Limo %"));
        assert_eq!(mapping.fields.get(Field::Arena), Some("Arena %"));
        assert_eq!(mapping.fields.get(Field::Textura), Some("Textura (USDA)"));
        assert_eq!(mapping.column(Field::Arena), Some(3));
        assert!(mapping.unmapped.is_empty());
    }

    #[test]
    fn test_exact_first_partial_matches_with_units() {
        let mapping = map_columns_with(
            &headers(&[
                "Fósforo Olsen (ppm)",
                "Potasio (meq/100g)",
                "Arcilla %",
                "Ca meq/100g",
                "Zn (ppm)",
            ]),
            MappingStrategy::ExactFirst,
        );
        assert_eq!(mapping.fields.get(Field::Fosforo), Some("Fósforo Olsen (ppm)"));
        assert_eq!(mapping.fields.get(Field::Potasio), Some("Potasio (meq/100g)"));
        assert_eq!(mapping.fields.get(Field::Arcilla), Some("Arcilla %"));
        assert_eq!(mapping.fields.get(Field::Calcio), Some("Ca meq/100g"));
        assert_eq!(mapping.fields.get(Field::Zinc), Some("Zn (ppm)"));
        assert_eq!(mapping.column(Field::Zinc), Some(4));
        assert!(mapping.unmapped.is_empty());
    }

    #[test]
    fn test_short_synonyms_score_as_substrings() {
        // contains (2*1) + word (3)
        assert_eq!(partial_score("observaciones", "b"), 5.0);
        // contains (2*1) + prefix (1.5*1) + word (3)
        assert_eq!(partial_score("b_ppm", "b"), 6.5);
        // contains (2*2) + prefix (1.5*2) + word (3)
        assert_eq!(partial_score("ca_mg", "ca"), 10.0);
        assert!(partial_score("limo", "mo") > 0.0);
    }

    #[test]
    fn test_whole_word_score_ignores_short_substrings() {
        assert_eq!(whole_word_score("observaciones", "b"), 0.0);
        assert_eq!(whole_word_score("b_ppm", "b"), WORD_POINTS);
        assert_eq!(whole_word_score("ca_mg", "ca"), WORD_POINTS);
        assert_eq!(whole_word_score("limo", "mo"), 0.0);
    }

    #[test]
    fn test_partial_score_components() {
        // contains (2*7) + prefix (1.5*7) + word (3)
        let score = partial_score("fosforo_ppm", "fosforo");
        assert!((score - (14.0 + 10.5 + 3.0)).abs() < 1e-9);
        // contains (2*5) + suffix (1.2*5) + word (3)
        let score = partial_score("textura_arena", "arena");
        assert!((score - (10.0 + 6.0 + 3.0)).abs() < 1e-9);
        assert_eq!(partial_score("", "ph"), 0.0);
        assert_eq!(partial_score("municipio", "zinc"), 0.0);
    }

    #[test]
    fn test_unrelated_headers_are_unmapped() {
        let mapping = map_columns(&headers(&["Municipio", "Folio interno lab", "Lote 7"]));
        assert_eq!(mapping.fields.get(Field::Municipio), Some("Municipio"));
        assert_eq!(mapping.fields.get(Field::ClaveMuestra), Some("Folio interno lab"));
        assert_eq!(mapping.unmapped, vec!["Lote 7".to_string()]);
    }

    #[test]
    fn test_empty_headers_are_never_assigned() {
        for strategy in [MappingStrategy::PerField, MappingStrategy::ExactFirst] {
            let mapping = map_columns_with(&headers(&["", "pH", "  "]), strategy);
            assert_eq!(mapping.columns.len(), 1);
            assert_eq!(mapping.unmapped.len(), 2);
        }
    }

    // -------------------------------------------------------------------------
    // INJECTIVITY
    // -------------------------------------------------------------------------

    #[test]
    fn test_no_header_assigned_twice() {
        let sheets = [
            headers(&["Nombre", "Productor", "Nombre productor", "Cultivo", "Cultivo anterior"]),
            headers(&["Ca", "Ca/Mg", "Ca/K", "Mg/K", "K/Mg", "(Ca+Mg)/K", "K", "Mg"]),
            headers(&["P", "P Olsen", "P Bray", "pH", "pH agua", "MO", "M.O."]),
            headers(&["arena", "arena", "Arena %", "Textura arena"]),
        ];
        for strategy in [MappingStrategy::PerField, MappingStrategy::ExactFirst] {
            for sheet in &sheets {
                let mapping = map_columns_with(sheet, strategy);
                let indices: Vec<usize> = mapping.columns.values().copied().collect();
                let unique: HashSet<usize> = indices.iter().copied().collect();
                assert_eq!(indices.len(), unique.len(), "{:?} {:?}", strategy, sheet);
                assert_eq!(mapping.fields.mapped_count(), indices.len());
                assert_eq!(mapping.unmapped.len() + indices.len(), sheet.len());
            }
        }
    }

    #[test]
    fn test_field_map_serializes_every_field() {
        let map = build_column_map(&headers(&["pH"]));
        let json = serde_json::to_value(&map).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), Field::ALL.len());
        assert_eq!(obj["ph"], "pH");
        assert!(obj["municipio"].is_null());
    }
}
