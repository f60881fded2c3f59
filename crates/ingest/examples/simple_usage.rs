use ingest::errors::IngestError;
use ingest::repository::{IngestRepository, PlayoutState};
use ingest::stubs::InMemoryIngestRepository;
use ingest::{IngestConfig, IngestService};
use rundown_model::{IngestPart, IngestRundown, IngestSegment, PartId, RundownId};
use serde_json::json;
use std::sync::Arc;

fn story(id: &str, rank: f64) -> IngestPart {
    IngestPart::new(id, rank, id.to_uppercase(), json!({ "script": format!("texto de {}", id) }))
}

#[tokio::main]
async fn main() -> Result<(), IngestError> {
    // Repo en memoria y servicio con la configuración por defecto
    let repo = Arc::new(InMemoryIngestRepository::new());
    let service = IngestService::new(repo.clone(), IngestConfig::default());
    let rundown_id = RundownId::from_external_id("show-1");

    // Primer snapshot: dos segmentos
    let rundown = IngestRundown::new("show-1", "Noticiero", "nrcs").with_segments(vec![
        IngestSegment::new("intro", 0.0, "Intro", json!({})).with_parts(vec![story("titulares", 0.0), story("saludo", 1.0)]),
        IngestSegment::new("deportes", 1.0, "Deportes", json!({})).with_parts(vec![story("futbol", 0.0)]),
    ]);
    let commit = service.ingest_rundown(rundown, None).await?;
    println!("primer ingest: {:?}\n", commit.changed_segment_ids);

    // Mover "saludo" a deportes: la parte conserva su id
    let commit = service.update_part("show-1", "deportes", story("saludo", 1.0)).await?;
    println!("movimiento: segmentos cambiados {:?}", commit.changed_segment_ids);

    // Con "futbol" en el aire, borrar deportes deja el segmento huérfano
    repo.set_playout_state(&rundown_id,
                           PlayoutState { current_part: Some(PartId::derive(&rundown_id, "futbol")), ..Default::default() })?;
    let commit = service.remove_segment("show-1", "deportes").await?;
    println!("huérfanos: {:?}", commit.orphaned_segment_ids);

    // Al salir del aire, la limpieza lo elimina
    repo.set_playout_state(&rundown_id, PlayoutState::default())?;
    let commit = service.cleanup_orphans("show-1").await?;
    println!("eliminados: {:?}", commit.removed_segment_ids);

    if let Some(model) = repo.load_model(&rundown_id).await? {
        for segment in model.sorted_segments() {
            println!("{} -> {:?}",
                     segment.external_id,
                     model.parts_in_segment(&segment.id).iter().map(|p| p.external_id.as_str()).collect::<Vec<_>>());
        }
    }
    Ok(())
}
