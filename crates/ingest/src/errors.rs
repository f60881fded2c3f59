// Archivo: errors.rs
// Propósito: errores del motor de ingesta y alias Result<T>. Se distinguen
// tres familias: violaciones de contrato (ids inexistentes, movimientos
// relativos a sí mismo), errores de usuario pensados para mostrarse, y fallos
// de consistencia interna.
use rundown_model::ModelError;
use std::fmt;
use thiserror::Error;

/// Tipo de nodo al que se refiere un error de contrato.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Rundown,
    Segment,
    Part,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Rundown => f.write_str("Rundown"),
            NodeKind::Segment => f.write_str("Segment"),
            NodeKind::Part => f.write_str("Part"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserErrorKind {
    /// Se intentó borrar un rundown que está en el aire sin `force`.
    RundownOnAir,
    /// La lógica de transformación rechazó los datos.
    TransformRejected,
}

/// Error pensado para mostrarse al usuario; no indica un bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    pub kind: UserErrorKind,
    pub message: String,
}

impl UserError {
    pub fn new(kind: UserErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Errores comunes del motor de ingesta.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Un id que la operación exige que exista no se encontró.
    #[error("{kind} \"{id}\" no encontrado")]
    NotFound { kind: NodeKind, id: String },
    /// Inserción o movimiento relativo al propio nodo.
    #[error("No se puede insertar/mover {kind} \"{id}\" antes/después de sí mismo")]
    RelativeToSelf { kind: NodeKind, id: String },
    /// El id destino ya está en uso.
    #[error("{kind} \"{id}\" ya existe")]
    AlreadyExists { kind: NodeKind, id: String },
    /// Error operativo para mostrar al usuario.
    #[error("Error de usuario: {0}")]
    User(UserError),
    /// Fallo de consistencia interna.
    #[error("Invariante violada: {0}")]
    Invariant(String),
    /// Error del repositorio (cache, modelo, estado de playout).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    #[error("Error de modelo: {0}")]
    Model(#[from] ModelError),
}

impl IngestError {
    pub fn not_found(kind: NodeKind, id: impl Into<String>) -> Self {
        IngestError::NotFound { kind, id: id.into() }
    }

    pub fn user(kind: UserErrorKind, message: impl Into<String>) -> Self {
        IngestError::User(UserError::new(kind, message))
    }

    pub fn is_user_error(&self) -> bool {
        matches!(self, IngestError::User(_))
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, IngestError>;
