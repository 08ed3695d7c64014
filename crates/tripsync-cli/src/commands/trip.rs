//! Trip command handlers

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use tripsync_core::{EntityType, Identity, Store, Trip};

use super::confirm;
use crate::output::{short_id, Output, OutputFormat};

/// Fields accepted by `trip create`
pub struct NewTrip {
    pub name: String,
    pub destination: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Create a new trip
pub fn create(store: &mut Store, new: NewTrip, by: &Identity, output: &Output) -> Result<()> {
    let mut trip = Trip::new(new.name).with_dates(new.start, new.end);
    trip.destination = new.destination;
    trip.notes = new.notes;
    // The creator always has access
    trip.grant(by.as_str());

    let trip = store.create(trip, by).context("Failed to create trip")?;

    output.success(&format!("Created trip: {}", trip.id));
    if output.is_quiet() {
        println!("{}", trip.id);
    }
    Ok(())
}

/// List all local trips
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let trips = store.trips()?;
    output.print_trips(&trips);
    Ok(())
}

/// Show a trip with its flights, hotels, activities and restaurants
pub fn show(store: &Store, id: String, output: &Output) -> Result<()> {
    let trip_id = resolve_trip_id(store, &id)?;
    let itinerary = store.itinerary(&trip_id)?;
    output.print_itinerary(&itinerary);
    Ok(())
}

/// Delete a trip and everything under it
pub fn delete(
    store: &mut Store,
    id: String,
    yes: bool,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &id)?;
    let itinerary = store.itinerary(&trip_id)?;

    if !yes && output.format == OutputFormat::Human {
        println!(
            "Delete trip: {} - {} ({} item(s))",
            short_id(&trip_id),
            itinerary.trip.name,
            itinerary.item_count()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .delete(EntityType::Trip, &trip_id, by)
        .context("Failed to delete trip")?;

    output.success(&format!("Deleted trip: {}", trip_id));
    Ok(())
}

/// Give another identity access to a trip
pub fn share(
    store: &mut Store,
    id: String,
    with: String,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &id)?;
    let grantee =
        Identity::parse(&with).with_context(|| format!("Invalid identity '{}'", with))?;

    let trip = store
        .share_trip(&trip_id, &grantee, by)
        .context("Failed to share trip")?;

    output.success(&format!(
        "Shared {} with {} ({} member(s))",
        short_id(&trip.id),
        grantee,
        trip.shared_with.len()
    ));
    Ok(())
}

/// Resolve a full trip id or a unique prefix of one
pub fn resolve_trip_id(store: &Store, id: &str) -> Result<String> {
    let trips = store.trips()?;

    if trips.iter().any(|t| t.id == id) {
        return Ok(id.to_string());
    }

    let matches: Vec<_> = trips.iter().filter(|t| t.id.starts_with(id)).collect();

    match matches.as_slice() {
        [] => bail!("No trip found matching: {}", id),
        [trip] => Ok(trip.id.clone()),
        _ => {
            eprintln!("Multiple trips match '{}':", id);
            for trip in &matches {
                eprintln!("  {} - {}", trip.id, trip.name);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
