//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;
use tracing::warn;

use tripsync_core::{Itinerary, QueueEntry, QueueStatus, Trip};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print any serializable value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Failed to serialize output: {}", e),
        }
    }

    /// Print a list of trips
    pub fn print_trips(&self, trips: &[Trip]) {
        match self.format {
            OutputFormat::Human => {
                if trips.is_empty() {
                    println!("No trips found.");
                    return;
                }
                for trip in trips {
                    println!(
                        "{} | {} | {} | {}",
                        short_id(&trip.id),
                        truncate(&trip.name, 30),
                        truncate(trip.destination.as_deref().unwrap_or("-"), 20),
                        date_range(trip)
                    );
                }
                println!("\n{} trip(s)", trips.len());
            }
            OutputFormat::Json => self.json(trips),
            OutputFormat::Quiet => {
                for trip in trips {
                    println!("{}", trip.id);
                }
            }
        }
    }

    /// Print a trip with everything planned under it
    pub fn print_itinerary(&self, itinerary: &Itinerary) {
        let trip = &itinerary.trip;
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", trip.id);
                println!("Name:        {}", trip.name);
                if let Some(ref destination) = trip.destination {
                    println!("Destination: {}", destination);
                }
                println!("Dates:       {}", date_range(trip));
                if !trip.shared_with.is_empty() {
                    println!("Shared with: {}", trip.shared_with.join(", "));
                }
                if let Some(ref notes) = trip.notes {
                    println!("Notes:       {}", truncate_line(notes, 60));
                }
                println!("Updated:     {}", trip.meta.updated_at.format("%Y-%m-%d %H:%M"));

                if !itinerary.flights.is_empty() {
                    println!();
                    println!("── Flights ({}) ──", itinerary.flights.len());
                    for flight in &itinerary.flights {
                        let route = match (&flight.departure_airport, &flight.arrival_airport) {
                            (Some(from), Some(to)) => format!("{} → {}", from, to),
                            _ => String::new(),
                        };
                        let departs = flight
                            .departs_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default();
                        println!(
                            "{} | {} {} | {}",
                            short_id(&flight.id),
                            flight.flight_number,
                            route,
                            departs
                        );
                    }
                }

                if !itinerary.hotels.is_empty() {
                    println!();
                    println!("── Hotels ({}) ──", itinerary.hotels.len());
                    for hotel in &itinerary.hotels {
                        let stay = match (hotel.check_in, hotel.check_out) {
                            (Some(check_in), Some(check_out)) => {
                                format!("{} to {}", check_in, check_out)
                            }
                            (Some(check_in), None) => format!("from {}", check_in),
                            _ => String::new(),
                        };
                        println!(
                            "{} | {} | {}",
                            short_id(&hotel.id),
                            truncate(&hotel.name, 30),
                            stay
                        );
                    }
                }

                if !itinerary.activities.is_empty() {
                    println!();
                    println!("── Activities ({}) ──", itinerary.activities.len());
                    for activity in &itinerary.activities {
                        let when = activity.date.map(|d| d.to_string()).unwrap_or_default();
                        println!(
                            "{:>3}. {} | {} | {}",
                            activity.position + 1,
                            short_id(&activity.id),
                            truncate(&activity.name, 30),
                            when
                        );
                    }
                }

                if !itinerary.restaurants.is_empty() {
                    println!();
                    println!("── Restaurants ({}) ──", itinerary.restaurants.len());
                    for restaurant in &itinerary.restaurants {
                        println!(
                            "{} | {} | {}",
                            short_id(&restaurant.id),
                            truncate(&restaurant.name, 30),
                            restaurant.cuisine.as_deref().unwrap_or("")
                        );
                    }
                }
            }
            OutputFormat::Json => self.json(itinerary),
            OutputFormat::Quiet => {
                println!("{}", trip.id);
            }
        }
    }

    /// Print the queued mutations, oldest first
    pub fn print_queue(&self, entries: &[QueueEntry], retry_ceiling: u32) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("Queue is empty.");
                    return;
                }
                for entry in entries {
                    let marker = if entry.is_exhausted(retry_ceiling) {
                        " [failed]"
                    } else {
                        ""
                    };
                    println!(
                        "{} | {:<6} {:<10} {} | retries {}{}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.operation.as_str(),
                        entry.entity_type.as_str(),
                        short_id(&entry.entity_id),
                        entry.retries,
                        marker
                    );
                    if let Some(ref error) = entry.last_error {
                        println!("    last error: {}", truncate_line(error, 70));
                    }
                }
                println!("\n{} entry(ies)", entries.len());
            }
            OutputFormat::Json => self.json(entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.id);
                }
            }
        }
    }

    pub fn print_queue_status(&self, status: &QueueStatus) {
        match self.format {
            OutputFormat::Human => {
                println!("Pending: {}", status.pending);
                println!("Failed:  {}", status.failed);
                println!("Total:   {}", status.total);
            }
            OutputFormat::Json => self.json(status),
            OutputFormat::Quiet => println!("{}", status.total),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// First eight characters of an id, for tables
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn date_range(trip: &Trip) -> String {
    match (trip.start_date, trip.end_date) {
        (Some(start), Some(end)) => format!("{} to {}", start, end),
        (Some(start), None) => format!("from {}", start),
        (None, Some(end)) => format!("until {}", end),
        (None, None) => "-".to_string(),
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("Café à Lisboa", 8), "Café ...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0f3c9a7e-1111-2222"), "0f3c9a7e");
        assert_eq!(short_id("t1"), "t1");
    }

    #[test]
    fn test_date_range() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 1);
        let end = NaiveDate::from_ymd_opt(2026, 5, 9);

        let trip = Trip::with_id("t1", "Lisbon").with_dates(start, end);
        assert_eq!(date_range(&trip), "2026-05-01 to 2026-05-09");
        assert_eq!(date_range(&Trip::with_id("t2", "Porto")), "-");
    }
}
