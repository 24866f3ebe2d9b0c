use std::path::Path;

use anyhow::{Context, Result};
use livetrack_core::export::{snapshot_collection, to_geojson_string, with_diagnostics};
use livetrack_core::offset::RouteOffsetDiagnostic;
use livetrack_core::render::RenderFrame;
use livetrack_transit::StaticNetwork;

/// Write offset routes and the final frame's vehicles to one GeoJSON file
pub fn write_snapshot_geojson(
    network: &StaticNetwork,
    frame: Option<&RenderFrame>,
    diagnostics: &[RouteOffsetDiagnostic],
    output_path: &Path,
) -> Result<()> {
    let vehicles = frame.map_or(0, |f| f.footprints.len());
    tracing::info!(
        routes = network.routes().len(),
        vehicles,
        path = %output_path.display(),
        "writing GeoJSON"
    );

    let collection = with_diagnostics(snapshot_collection(network, frame), diagnostics);
    let json_string = to_geojson_string(collection).context("Failed to serialize GeoJSON")?;

    std::fs::write(output_path, json_string)
        .with_context(|| format!("Failed to write GeoJSON to {}", output_path.display()))?;

    Ok(())
}
