//! Normalización de placas e identidades
//!
//! Reglas deterministas usadas tanto en la importación como en la búsqueda:
//! lo que entra en un lote y lo que teclea el ciudadano se comparan siempre
//! después de pasar por estas funciones.

/// Normaliza una placa: mayúsculas y solo caracteres ASCII alfanuméricos.
///
/// `"51a-123.45"` → `"51A12345"`.
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Normaliza un texto libre (nombre, dirección): mayúsculas Unicode,
/// recorte y espacios colapsados.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .map(|w| w.to_uppercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normaliza un número de documento (CCCD/CMND): solo alfanuméricos en mayúsculas
pub fn normalize_document(raw: &str) -> String {
    normalize_plate(raw)
}

/// Convierte una celda opcional en `Option<String>` recortado, vacío → `None`
pub fn clean_cell(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate("51a-123.45"), "51A12345");
        assert_eq!(normalize_plate("  60B1 001.29 "), "60B100129");
        assert_eq!(normalize_plate(" - "), "");
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Nguyễn   Văn a "), "NGUYỄN VĂN A");
        assert_eq!(normalize_text("KP8A,  Tân Biên"), "KP8A, TÂN BIÊN");
    }

    #[test]
    fn test_clean_cell() {
        assert_eq!(clean_cell(Some("  x ")), Some("x".to_string()));
        assert_eq!(clean_cell(Some("   ")), None);
        assert_eq!(clean_cell(None), None);
    }
}
