use ingest::repository::{IngestRepository, PlayoutState};
use ingest::stubs::InMemoryIngestRepository;
use ingest::{CommitData, IngestConfig, IngestService, DEFAULT_PART_SEPARATOR};
use once_cell::sync::OnceCell;
use rundown_model::{IngestRundown, PartId, RundownId};
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

static LOGGING: OnceCell<()> = OnceCell::new();

/// Inicializa `tracing` una sola vez. El filtro se toma de `RUST_LOG`
/// (por defecto `info`).
fn init_logging() {
    LOGGING.get_or_init(|| {
               let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
               let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
           });
}

/// Pequeño menú interactivo que alimenta el motor de ingesta con snapshots
/// del NRCS leídos de archivos JSON, sobre el repositorio en memoria.
///
/// Opciones soportadas:
/// 1) Ingestar un snapshot desde un archivo JSON
/// 2) Ver el modelo persistido de un rundown
/// 3) Fijar la parte en el aire
/// 4) Eliminar un segmento
/// 5) Limpiar huérfanos
/// 6) Eliminar un rundown
/// 7) Salir
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let mut config = IngestConfig::from_env();
    if config.part_name_separator.is_none() {
        let answer = prompt(&format!("Separador para agrupar historias (enter = sin agrupar, 'd' = '{}'): ",
                                     DEFAULT_PART_SEPARATOR))?;
        config.part_name_separator = match answer.trim() {
            "" => None,
            "d" => Some(DEFAULT_PART_SEPARATOR.to_string()),
            other => Some(other.to_string()),
        };
    }
    info!(separator = ?config.part_name_separator, cleanup = config.cleanup_orphans_on_ingest, "motor de ingesta listo");
    let repo = Arc::new(InMemoryIngestRepository::new());
    let service = IngestService::new(repo.clone(), config);

    loop {
        println!("\n== Ingest CLI menu ==");
        println!("1) Ingestar snapshot (archivo JSON)");
        println!("2) Ver modelo de un rundown");
        println!("3) Fijar parte en el aire");
        println!("4) Eliminar segmento");
        println!("5) Limpiar huérfanos");
        println!("6) Eliminar rundown");
        println!("7) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                let path = prompt("Ruta del archivo JSON: ")?;
                let contents = match std::fs::read_to_string(path.trim()) {
                    Ok(c) => c,
                    Err(e) => { eprintln!("No se pudo leer el archivo: {}", e); continue; }
                };
                let rundown: IngestRundown = match serde_json::from_str(&contents) {
                    Ok(r) => r,
                    Err(e) => { eprintln!("JSON inválido: {}", e); continue; }
                };
                report("Ingest", service.ingest_rundown(rundown, None).await);
            }
            "2" => {
                let id = prompt("External id del rundown: ")?;
                match repo.load_model(&RundownId::from_external_id(id.trim())).await {
                    Ok(Some(model)) => {
                        println!("\nRUNDOWN {} ({})", model.rundown.name, model.rundown.external_id);
                        println!("-----------------------------------------------------------------------------------");
                        for segment in model.sorted_segments() {
                            let orphan = if segment.orphaned.is_some() { " [huérfano]" } else { "" };
                            println!("{:>6} | {}{} (gen {})", segment.rank, segment.external_id, orphan, segment.generation);
                            for part in model.parts_in_segment(&segment.id) {
                                println!("       |   {:>4} {} - {}", part.rank, part.external_id, part.name);
                            }
                        }
                    }
                    Ok(None) => println!("No existe el rundown {}", id.trim()),
                    Err(e) => eprintln!("Error cargando el modelo: {}", e),
                }
            }
            "3" => {
                let id = prompt("External id del rundown: ")?;
                let part = prompt("External id de la parte (enter = ninguna): ")?;
                let rundown_id = RundownId::from_external_id(id.trim());
                let current_part = if part.trim().is_empty() { None } else { Some(PartId::derive(&rundown_id, part.trim())) };
                match repo.set_playout_state(&rundown_id, PlayoutState { current_part, ..Default::default() }) {
                    Ok(()) => println!("Playout actualizado"),
                    Err(e) => eprintln!("Error fijando playout: {}", e),
                }
            }
            "4" => {
                let id = prompt("External id del rundown: ")?;
                let segment = prompt("External id del segmento: ")?;
                report("Eliminar segmento", service.remove_segment(id.trim(), segment.trim()).await);
            }
            "5" => {
                let id = prompt("External id del rundown: ")?;
                report("Limpieza", service.cleanup_orphans(id.trim()).await);
            }
            "6" => {
                let id = prompt("External id del rundown: ")?;
                let confirm = prompt("Forzar aunque esté en el aire? escribir 'yes' para forzar: ")?;
                let force = confirm.trim().to_lowercase() == "yes";
                report("Eliminar rundown", service.remove_rundown(id.trim(), force).await);
            }
            "7" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn report(label: &str, result: ingest::Result<CommitData>) {
    match result {
        Ok(commit) => match serde_json::to_string_pretty(&commit) {
            Ok(json) => println!("{} ok:\n{}", label, json),
            Err(_) => println!("{} ok: {:?}", label, commit),
        },
        Err(e) if e.is_user_error() => eprintln!("{} rechazado: {}", label, e),
        Err(e) => eprintln!("Error en {}: {}", label, e),
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
