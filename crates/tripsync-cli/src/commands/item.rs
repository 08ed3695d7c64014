//! Handlers for records planned under a trip

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use tripsync_core::{Activity, Entity, EntityType, Flight, Hotel, Identity, Restaurant, Store};

use super::trip::resolve_trip_id;
use crate::output::{short_id, Output};

pub struct NewFlight {
    pub number: String,
    pub airline: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub departs: Option<DateTime<Utc>>,
    pub arrives: Option<DateTime<Utc>>,
    pub confirmation: Option<String>,
}

pub struct NewHotel {
    pub name: String,
    pub address: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub confirmation: Option<String>,
}

pub struct NewActivity {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

pub struct NewRestaurant {
    pub name: String,
    pub cuisine: Option<String>,
    pub address: Option<String>,
    pub reservation: Option<DateTime<Utc>>,
}

pub fn add_flight(
    store: &mut Store,
    trip: String,
    new: NewFlight,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &trip)?;

    let mut flight = Flight::new(&trip_id, new.number).with_times(new.departs, new.arrives);
    flight.airline = new.airline;
    flight.departure_airport = new.from;
    flight.arrival_airport = new.to;
    flight.confirmation = new.confirmation;

    let flight = store.create(flight, by).context("Failed to add flight")?;
    report_added(&flight, output);
    Ok(())
}

pub fn add_hotel(
    store: &mut Store,
    trip: String,
    new: NewHotel,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &trip)?;

    let mut hotel = Hotel::new(&trip_id, new.name).with_stay(new.check_in, new.check_out);
    hotel.address = new.address;
    hotel.confirmation = new.confirmation;

    let hotel = store.create(hotel, by).context("Failed to add hotel")?;
    report_added(&hotel, output);
    Ok(())
}

/// Add an activity at the end of the trip's list
pub fn add_activity(
    store: &mut Store,
    trip: String,
    new: NewActivity,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &trip)?;
    let next_position = store
        .activities(&trip_id)?
        .iter()
        .map(|a| a.position + 1)
        .max()
        .unwrap_or(0);

    let mut activity = Activity::new(&trip_id, new.name);
    activity.date = new.date;
    activity.time = new.time;
    activity.location = new.location;
    activity.notes = new.notes;
    activity.position = next_position;

    let activity = store.create(activity, by).context("Failed to add activity")?;
    report_added(&activity, output);
    Ok(())
}

/// Put activities in the given order; unlisted ones follow
pub fn reorder_activities(
    store: &mut Store,
    trip: String,
    ids: Vec<String>,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &trip)?;
    let before = store.pending_entries()?.len();

    let ordered = store
        .reorder_activities(&trip_id, &ids, by)
        .context("Failed to reorder activities")?;

    let moved = store.pending_entries()?.len() - before;
    output.success(&format!(
        "Reordered {} activit(ies), {} moved",
        ordered.len(),
        moved
    ));
    if output.is_json() {
        output.json(&ordered);
    }
    Ok(())
}

pub fn add_restaurant(
    store: &mut Store,
    trip: String,
    new: NewRestaurant,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    let trip_id = resolve_trip_id(store, &trip)?;

    let mut restaurant = Restaurant::new(&trip_id, new.name);
    restaurant.cuisine = new.cuisine;
    restaurant.address = new.address;
    restaurant.reservation_at = new.reservation;

    let restaurant = store
        .create(restaurant, by)
        .context("Failed to add restaurant")?;
    report_added(&restaurant, output);
    Ok(())
}

/// Remove any record by type and full id
pub fn remove(
    store: &mut Store,
    kind: EntityType,
    id: String,
    by: &Identity,
    output: &Output,
) -> Result<()> {
    store
        .delete(kind, &id, by)
        .with_context(|| format!("Failed to remove {}", kind))?;

    output.success(&format!("Removed {}: {}", kind, id));
    Ok(())
}

fn report_added<E: Entity>(entity: &E, output: &Output) {
    output.success(&format!(
        "Added {} {} to trip {}",
        E::TYPE,
        entity.id(),
        short_id(entity.trip_id().unwrap_or_default())
    ));
    if output.is_quiet() {
        println!("{}", entity.id());
    }
}
