//! Command-line front end for InkCAD drawings.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inkcad_core::entities::SerializableColor;
use inkcad_core::{
    Entity, EntityId, EntityKind, HistoryStep, Kernel, KernelConfig, Layer, Point, Segment, Style,
    VersionRow,
};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Edit an InkCAD drawing with full undo history", long_about = None)]
struct Cli {
    /// Drawing database. Defaults to the platform data directory.
    #[arg(long, env = "INKCAD_DB", global = true)]
    db: Option<PathBuf>,
    /// JSON kernel configuration file.
    #[arg(long, env = "INKCAD_CONFIG", global = true)]
    config: Option<PathBuf>,
    /// Style recorded on the geometry written by this command.
    #[arg(long, global = true)]
    style: Option<EntityId>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a point, or a new version of an existing one
    #[command(allow_negative_numbers = true)]
    Point {
        x: f64,
        y: f64,
        #[arg(long, help = "Existing entity to update")]
        id: Option<EntityId>,
    },
    /// Save a segment between two points
    #[command(allow_negative_numbers = true)]
    Segment {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        #[arg(long, help = "Existing entity to update")]
        id: Option<EntityId>,
    },
    /// Save a layer
    Layer {
        name: String,
        #[arg(long)]
        parent: Option<EntityId>,
    },
    /// Save a style
    Style {
        name: String,
        #[arg(long, help = "Color as #rrggbb or #rrggbbaa")]
        color: Option<String>,
        #[arg(long)]
        width: Option<f64>,
    },
    /// Delete an entity (undoable)
    Delete { id: EntityId },
    /// Step back one generation
    Undo,
    /// Step forward one generation
    Redo,
    /// Print the current version of an entity
    Show { id: EntityId },
    /// Print every stored version of an entity
    History { id: EntityId },
    /// List live entities
    List {
        #[arg(short, long, help = "Only entities of this kind")]
        kind: Option<String>,
    },
    /// Import a JSON array of entities as one undo step
    Import { file: PathBuf },
    /// Drop the undo history, keeping the drawing
    ClearHistory,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;
    let mut kernel = Kernel::open(config).context("Failed to open drawing")?;
    if let Some(style) = cli.style {
        kernel
            .set_active_style(style)
            .with_context(|| format!("Style {} is not available", style))?;
    }

    run(&mut kernel, cli.command)
}

fn resolve_config(cli: &Cli) -> Result<KernelConfig> {
    let mut config = match &cli.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default_location()?,
    };
    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    }
    log::debug!("Using database {:?}", config.database);
    Ok(config)
}

fn run(kernel: &mut Kernel, command: Commands) -> Result<()> {
    match command {
        Commands::Point { x, y, id } => {
            let mut entity = match id {
                Some(id) => updated(kernel, id, EntityKind::Point, |entity| {
                    if let Entity::Point(p) = entity {
                        p.x = x;
                        p.y = y;
                    }
                })?,
                None => Entity::from(Point::new(x, y)),
            };
            print_row(&kernel.save(&mut entity)?);
        }
        Commands::Segment { x0, y0, x1, y1, id } => {
            let start = kurbo::Point::new(x0, y0);
            let end = kurbo::Point::new(x1, y1);
            let mut entity = match id {
                Some(id) => updated(kernel, id, EntityKind::Segment, |entity| {
                    if let Entity::Segment(s) = entity {
                        s.start = start;
                        s.end = end;
                    }
                })?,
                None => Entity::from(Segment::new(start, end)),
            };
            print_row(&kernel.save(&mut entity)?);
        }
        Commands::Layer { name, parent } => {
            let mut layer = Layer::new(name);
            if let Some(parent) = parent {
                layer = layer.with_parent(parent);
            }
            print_row(&kernel.save(&mut Entity::from(layer))?);
        }
        Commands::Style { name, color, width } => {
            let mut style = Style::new(name);
            if let Some(color) = color {
                style = style.with_color(parse_color(&color)?);
            }
            if let Some(width) = width {
                style = style.with_line_width(width);
            }
            print_row(&kernel.save(&mut Entity::from(style))?);
        }
        Commands::Delete { id } => print_row(&kernel.delete_entity(id)?),
        Commands::Undo => print_step("undo", kernel.undo()?),
        Commands::Redo => print_step("redo", kernel.redo()?),
        Commands::Show { id } => match kernel.get_entity(id)? {
            Some(row) => print_row(&row),
            None => bail!("Entity {} has no current version", id),
        },
        Commands::History { id } => {
            let rows = kernel.history(id)?;
            if rows.is_empty() {
                bail!("Entity {} has no history", id);
            }
            rows.iter().for_each(print_row);
        }
        Commands::List { kind } => {
            let kinds = match kind {
                Some(kind) => vec![kind.parse::<EntityKind>()?],
                None => EntityKind::ALL.to_vec(),
            };
            for kind in kinds {
                kernel.entities_of_kind(kind)?.iter().for_each(print_row);
            }
        }
        Commands::Import { file } => {
            let json = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut entities: Vec<Entity> = serde_json::from_str(&json)
                .with_context(|| format!("Invalid entity list in {}", file.display()))?;
            let rows = import(kernel, &mut entities)?;
            println!("imported {} entities", rows.len());
        }
        Commands::ClearHistory => {
            kernel.clear_history()?;
            println!("history cleared at generation {}", kernel.max_generation());
        }
    }
    Ok(())
}

/// Load the live entity `id`, checking its kind, and apply `edit` to it.
fn updated(
    kernel: &Kernel,
    id: EntityId,
    kind: EntityKind,
    edit: impl FnOnce(&mut Entity),
) -> Result<Entity> {
    let mut entity = kernel
        .load_entity(id)?
        .with_context(|| format!("Entity {} has no live version", id))?;
    if entity.kind() != kind {
        bail!("Entity {} is a {}, not a {}", id, entity.kind(), kind);
    }
    edit(&mut entity);
    Ok(entity)
}

/// Save every entity in one bulk transaction.
fn import(kernel: &mut Kernel, entities: &mut [Entity]) -> Result<Vec<VersionRow>> {
    kernel.start_bulk()?;
    for entity in entities.iter_mut() {
        if let Err(e) = kernel.save(entity) {
            // A failed save already discarded the batch; this covers payload errors.
            if kernel.is_bulk_open() {
                kernel.abort_bulk()?;
            }
            return Err(e.into());
        }
    }
    Ok(kernel.end_bulk()?)
}

fn parse_color(s: &str) -> Result<SerializableColor> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        bail!("Invalid color '{}'", s);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).with_context(|| format!("Invalid color '{}'", s))
    };
    let a = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(SerializableColor::new(channel(0)?, channel(2)?, channel(4)?, a))
}

fn print_row(row: &VersionRow) {
    println!(
        "{:>6}  entity {:<5} {:<8} gen {:<4} {:<7} {}  {}",
        row.version_id,
        row.entity_id,
        row.kind,
        row.generation,
        row.state.as_str(),
        if row.visible { "visible" } else { "hidden" },
        String::from_utf8_lossy(&row.payload)
    );
}

fn print_step(action: &str, step: HistoryStep) {
    match step {
        HistoryStep::Moved { from, to } => println!("{}: generation {} -> {}", action, from, to),
        HistoryStep::Exhausted => println!("nothing to {}", action),
    }
}
