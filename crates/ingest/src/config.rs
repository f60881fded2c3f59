// Archivo: config.rs
// Propósito: configuración del motor de ingesta cargada desde el entorno
// (con soporte de `.env` vía dotenvy).
use std::env;

/// Separador por defecto para agrupar historias planas en segmentos.
pub const DEFAULT_PART_SEPARATOR: &str = ";";

/// Opciones del motor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Si está presente, el NRCS entrega una lista plana de historias y se
    /// agrupan en segmentos por el texto previo a este separador.
    pub part_name_separator: Option<String>,
    /// Intenta borrar los nodos huérfanos que ya no están en el aire en cada
    /// ingesta.
    pub cleanup_orphans_on_ingest: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { part_name_separator: None, cleanup_orphans_on_ingest: true }
    }
}

impl IngestConfig {
    /// Carga la configuración desde variables de entorno:
    /// - `INGEST_PART_SEPARATOR`: separador de agrupado (vacío = sin agrupar).
    /// - `INGEST_CLEANUP_ORPHANS`: `true`/`false` (por defecto `true`).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let part_name_separator = env::var("INGEST_PART_SEPARATOR").ok().filter(|s| !s.is_empty());
        let cleanup_orphans_on_ingest = env::var("INGEST_CLEANUP_ORPHANS").map(|v| parse_bool(&v).unwrap_or(true))
                                                                          .unwrap_or(true);
        Self { part_name_separator, cleanup_orphans_on_ingest }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn default_cleans_orphans_without_grouping() {
        let config = IngestConfig::default();
        assert!(config.cleanup_orphans_on_ingest);
        assert!(config.part_name_separator.is_none());
    }
}
