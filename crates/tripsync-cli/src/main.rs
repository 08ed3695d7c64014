//! Tripsync CLI
//!
//! Command-line interface for tripsync - offline-first trip planning with
//! queued cloud sync.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};

use tripsync_core::{Config, EntityType, Identity, Store};

mod commands;
mod logging;
mod output;

use commands::item::{NewActivity, NewFlight, NewHotel, NewRestaurant};
use commands::trip::NewTrip;
use commands::require_identity;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "tripsync")]
#[command(about = "Tripsync - Offline-first trip planning with cloud sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Act as this identity (overrides the configured one)
    #[arg(long = "as", global = true, value_name = "IDENTITY")]
    identity: Option<String>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage trips
    Trip {
        #[command(subcommand)]
        command: TripCommands,
    },
    /// Manage flights on a trip
    Flight {
        #[command(subcommand)]
        command: FlightCommands,
    },
    /// Manage hotel stays on a trip
    Hotel {
        #[command(subcommand)]
        command: HotelCommands,
    },
    /// Manage activities on a trip
    Activity {
        #[command(subcommand)]
        command: ActivityCommands,
    },
    /// Manage restaurants on a trip
    Restaurant {
        #[command(subcommand)]
        command: RestaurantCommands,
    },
    /// Remove any record by type and id
    #[command(alias = "rm")]
    Remove {
        /// Record type (trip, flight, hotel, activity, restaurant)
        kind: EntityType,
        /// Full record ID
        id: String,
    },
    /// Inspect or manage the sync queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Sync with the remote store
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (identity, queue, last sync)
    Status,
}

#[derive(Subcommand)]
enum TripCommands {
    /// Create a new trip
    #[command(alias = "add")]
    Create {
        /// Trip name
        name: String,
        #[arg(short, long)]
        destination: Option<String>,
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// List all trips
    #[command(alias = "ls")]
    List,
    /// Show a trip with everything planned under it
    Show {
        /// Trip ID (full or prefix)
        id: String,
    },
    /// Delete a trip and everything under it
    #[command(alias = "rm")]
    Delete {
        /// Trip ID (full or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Give another identity access to a trip
    Share {
        /// Trip ID (full or prefix)
        id: String,
        /// Identity to share with
        with: String,
    },
}

#[derive(Subcommand)]
enum FlightCommands {
    /// Add a flight
    Add {
        /// Trip ID (full or prefix)
        trip: String,
        /// Flight number, e.g. TP1351
        number: String,
        #[arg(long)]
        airline: Option<String>,
        /// Departure airport
        #[arg(long)]
        from: Option<String>,
        /// Arrival airport
        #[arg(long)]
        to: Option<String>,
        /// Departure time (RFC 3339)
        #[arg(long)]
        departs: Option<DateTime<Utc>>,
        /// Arrival time (RFC 3339)
        #[arg(long)]
        arrives: Option<DateTime<Utc>>,
        #[arg(long)]
        confirmation: Option<String>,
    },
}

#[derive(Subcommand)]
enum HotelCommands {
    /// Add a hotel stay
    Add {
        /// Trip ID (full or prefix)
        trip: String,
        /// Hotel name
        name: String,
        #[arg(long)]
        address: Option<String>,
        /// Check-in date (YYYY-MM-DD)
        #[arg(long)]
        check_in: Option<NaiveDate>,
        /// Check-out date (YYYY-MM-DD)
        #[arg(long)]
        check_out: Option<NaiveDate>,
        #[arg(long)]
        confirmation: Option<String>,
    },
}

#[derive(Subcommand)]
enum ActivityCommands {
    /// Add an activity at the end of the list
    Add {
        /// Trip ID (full or prefix)
        trip: String,
        /// Activity name
        name: String,
        /// Day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Start time (HH:MM)
        #[arg(long)]
        time: Option<NaiveTime>,
        #[arg(long)]
        location: Option<String>,
        #[arg(short, long)]
        notes: Option<String>,
    },
    /// Put activities in a new order
    Reorder {
        /// Trip ID (full or prefix)
        trip: String,
        /// Activity IDs in the desired order
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum RestaurantCommands {
    /// Add a restaurant
    Add {
        /// Trip ID (full or prefix)
        trip: String,
        /// Restaurant name
        name: String,
        #[arg(long)]
        cuisine: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Reservation time (RFC 3339)
        #[arg(long)]
        reservation: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Show pending and failed counts
    Status,
    /// List queued changes, oldest first
    #[command(alias = "ls")]
    List,
    /// Drop queued changes (local records are kept)
    Clear {
        /// Only drop entries past the retry ceiling
        #[arg(long)]
        failed: bool,
    },
    /// Give failed entries another round of attempts
    Retry,
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Push queued changes once
    Push,
    /// Pull every trip shared with you
    Pull,
    /// Keep syncing in the background until Ctrl-C
    Watch,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (remote_url, identity, sync_enabled, ...)
        key: String,
        /// Configuration value ("none" clears optional keys)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        json,
        quiet,
        config: config_path,
        identity,
        verbose,
        command,
    } = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(json, quiet));

    // Config commands don't need the store
    let command = match command {
        Commands::Config { command } => {
            return handle_config_command(command, config_path.as_ref(), &output);
        }
        other => other,
    };

    let config = Config::load_with_cli_override(config_path.as_ref())
        .context("Failed to load configuration")?;
    logging::init(&config, verbose);

    let identity = commands::resolve_identity(identity.as_deref(), &config)?;
    let mut store = Store::open_with_config(config)?;

    match command {
        Commands::Trip { command } => {
            handle_trip_command(command, &mut store, identity.as_ref(), &output)
        }
        Commands::Flight {
            command:
                FlightCommands::Add {
                    trip,
                    number,
                    airline,
                    from,
                    to,
                    departs,
                    arrives,
                    confirmation,
                },
        } => {
            let new = NewFlight {
                number,
                airline,
                from,
                to,
                departs,
                arrives,
                confirmation,
            };
            let by = require_identity(identity.as_ref())?;
            commands::item::add_flight(&mut store, trip, new, by, &output)
        }
        Commands::Hotel {
            command:
                HotelCommands::Add {
                    trip,
                    name,
                    address,
                    check_in,
                    check_out,
                    confirmation,
                },
        } => {
            let new = NewHotel {
                name,
                address,
                check_in,
                check_out,
                confirmation,
            };
            let by = require_identity(identity.as_ref())?;
            commands::item::add_hotel(&mut store, trip, new, by, &output)
        }
        Commands::Activity { command } => {
            handle_activity_command(command, &mut store, identity.as_ref(), &output)
        }
        Commands::Restaurant {
            command:
                RestaurantCommands::Add {
                    trip,
                    name,
                    cuisine,
                    address,
                    reservation,
                },
        } => {
            let new = NewRestaurant {
                name,
                cuisine,
                address,
                reservation,
            };
            let by = require_identity(identity.as_ref())?;
            commands::item::add_restaurant(&mut store, trip, new, by, &output)
        }
        Commands::Remove { kind, id } => {
            let by = require_identity(identity.as_ref())?;
            commands::item::remove(&mut store, kind, id, by, &output)
        }
        Commands::Queue { command } => handle_queue_command(command, &mut store, &output),
        Commands::Sync { command } => {
            let by = require_identity(identity.as_ref())?;
            handle_sync_command(command, store, by, &output).await
        }
        Commands::Status => commands::status::show(&store, &output),
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_trip_command(
    command: TripCommands,
    store: &mut Store,
    identity: Option<&Identity>,
    output: &Output,
) -> Result<()> {
    match command {
        TripCommands::Create {
            name,
            destination,
            start,
            end,
            notes,
        } => {
            let new = NewTrip {
                name,
                destination,
                start,
                end,
                notes,
            };
            commands::trip::create(store, new, require_identity(identity)?, output)
        }
        TripCommands::List => commands::trip::list(store, output),
        TripCommands::Show { id } => commands::trip::show(store, id, output),
        TripCommands::Delete { id, yes } => {
            commands::trip::delete(store, id, yes, require_identity(identity)?, output)
        }
        TripCommands::Share { id, with } => {
            commands::trip::share(store, id, with, require_identity(identity)?, output)
        }
    }
}

fn handle_activity_command(
    command: ActivityCommands,
    store: &mut Store,
    identity: Option<&Identity>,
    output: &Output,
) -> Result<()> {
    let by = require_identity(identity)?;
    match command {
        ActivityCommands::Add {
            trip,
            name,
            date,
            time,
            location,
            notes,
        } => {
            let new = NewActivity {
                name,
                date,
                time,
                location,
                notes,
            };
            commands::item::add_activity(store, trip, new, by, output)
        }
        ActivityCommands::Reorder { trip, ids } => {
            commands::item::reorder_activities(store, trip, ids, by, output)
        }
    }
}

fn handle_queue_command(command: QueueCommands, store: &mut Store, output: &Output) -> Result<()> {
    match command {
        QueueCommands::Status => commands::queue::status(store, output),
        QueueCommands::List => commands::queue::list(store, output),
        QueueCommands::Clear { failed } => commands::queue::clear(store, failed, output),
        QueueCommands::Retry => commands::queue::retry(store, output),
    }
}

async fn handle_sync_command(
    command: SyncCommands,
    store: Store,
    identity: &Identity,
    output: &Output,
) -> Result<()> {
    match command {
        SyncCommands::Push => commands::sync::push(store, identity, output).await,
        SyncCommands::Pull => commands::sync::pull(store, identity, output).await,
        SyncCommands::Watch => commands::sync::watch(store, identity, output).await,
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}
